//! # dotcompile Prelude
//!
//! The types needed to create a compilation, query it and emit it, importable with
//! a single glob.

// ================================================================================================
// Core Types and Error Handling
// ================================================================================================

/// The main error type for all dotcompile operations
pub use crate::Error;

/// The result type used throughout dotcompile
pub use crate::Result;

/// Cooperative cancellation for long-running queries
pub use crate::utils::CancellationToken;

// ================================================================================================
// Compilation Model
// ================================================================================================

/// The compilation and its language plug-in seam
pub use crate::compilation::{Compilation, CompilationEvent, Language, ScriptCompilationInfo, SemanticModel};

/// The Mini language
pub use crate::lang::MiniLanguage;

// ================================================================================================
// Syntax, Options and References
// ================================================================================================

/// Source text and syntax trees
pub use crate::syntax::{SourceHashAlgorithm, SourceText, SyntaxNode, SyntaxTree, SyntaxTreeList, TextSpan};

/// Option records
pub use crate::options::{
    CompilationOptions, DebugInformationFormat, EmitOptions, OptimizationLevel, OutputKind,
    ParseOptions, Platform, SourceCodeKind,
};

/// Metadata references
pub use crate::references::{
    AssemblyIdentity, AssemblyMetadata, MetadataReference, MetadataReferenceProperties,
};

// ================================================================================================
// Symbols and Diagnostics
// ================================================================================================

/// Symbol model
pub use crate::symbols::{
    Accessibility, MethodSymbol, NamedTypeSymbol, SpecialType, Symbol, SymbolKind, TypeSymbol,
};

/// Diagnostics
pub use crate::diagnostics::{
    Diagnostic, DiagnosticBag, DiagnosticSeverity, ErrorCode, Location, ReportDiagnostic,
};

// ================================================================================================
// Emit and Keys
// ================================================================================================

/// Emit entry points and streams
pub use crate::emit::{
    EmitArguments, EmitBaseline, EmitDifferenceResult, EmitResult, MemoryStream, OutputStream,
    SemanticEdit, SemanticEditKind,
};

/// Deterministic keys
pub use crate::key::{DeterministicKeyBuilder, DeterministicKeyOptions};

// ================================================================================================
// Operations
// ================================================================================================

/// Operation trees and their traversal
pub use crate::operations::{Operation, OperationKind, OperationVisitor, OperationWalker};
