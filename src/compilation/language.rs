//! The seam between the language-neutral compilation model and a concrete language.
//!
//! A [`Language`] parses text into [`SyntaxTree`]s, declares the source types of a
//! compilation, and binds method bodies into [`Operation`] trees. Everything else
//! (reference binding, submissions, diagnostics filtering, emit) is shared.

use std::{
    fmt,
    sync::{Arc, Weak},
};

use crate::{
    compilation::{Compilation, SymbolLookup},
    diagnostics::Diagnostic,
    operations::Operation,
    options::{CompilationOptions, ParseOptions},
    symbols::{AssemblySymbol, MethodSymbol, NamedTypeSymbol},
    syntax::{SourceText, SyntaxTree, SyntaxTreeList, TextSpan},
    Result,
};

/// A `using` directive.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImportDirective {
    /// Imported namespace
    pub namespace: String,
    /// Span of the whole directive
    pub span: TextSpan,
}

/// What a language sees while attaching bases and members to its declared types.
pub struct DeclarationContext<'a> {
    /// The compilation being declared
    pub compilation: &'a Compilation,
    /// The source assembly; its types were created by [`Language::declare_types`]
    pub assembly: &'a Arc<AssemblySymbol>,
    /// Name lookup over the source assembly, previous submissions and references
    pub lookup: &'a SymbolLookup,
}

/// What a language sees while binding a method body.
pub struct BindingContext<'a> {
    /// The compilation the method belongs to
    pub compilation: &'a Compilation,
    /// The source assembly
    pub assembly: &'a Arc<AssemblySymbol>,
    /// Name lookup over the source assembly, previous submissions and references
    pub lookup: &'a SymbolLookup,
}

/// A bound method body.
#[derive(Debug, Clone)]
pub struct BoundBody {
    /// Body as an operation tree, normally a block
    pub operation: Operation,
    /// Binding diagnostics
    pub diagnostics: Vec<Diagnostic>,
}

/// A source language.
///
/// Implementations must be stateless or internally synchronized: one instance is
/// shared by every compilation created from it and is called from multiple threads
/// when concurrent builds are enabled.
pub trait Language: Send + Sync + fmt::Debug {
    /// Name stored in trees produced by this language.
    fn name(&self) -> &'static str;

    /// Parses `text` into a tree.
    fn parse_text(&self, text: SourceText, path: &str, options: &ParseOptions) -> SyntaxTree;

    /// Creates the source types of `trees`, without bases or members.
    ///
    /// Types must be built against `assembly`, which cannot be upgraded yet.
    fn declare_types(
        &self,
        trees: &SyntaxTreeList,
        options: &CompilationOptions,
        assembly: &Weak<AssemblySymbol>,
        diagnostics: &mut Vec<Diagnostic>,
    ) -> Vec<Arc<NamedTypeSymbol>>;

    /// Attaches base types and members to the declared types.
    ///
    /// # Errors
    ///
    /// Returns an error only for contract violations or cancellation; source problems
    /// are returned as diagnostics.
    fn complete_types(&self, context: &DeclarationContext<'_>) -> Result<Vec<Diagnostic>>;

    /// Binds the body of a source method, or returns `None` if it has none.
    ///
    /// # Errors
    ///
    /// Returns an error only for contract violations or cancellation.
    fn bind_method_body(
        &self,
        context: &BindingContext<'_>,
        method: &Arc<MethodSymbol>,
    ) -> Result<Option<BoundBody>>;

    /// `true` if `tree` contains anything that produces IL.
    fn has_code_to_emit(&self, tree: &SyntaxTree) -> bool;

    /// `#r` style reference directives, as (path, span).
    fn reference_directives(&self, tree: &SyntaxTree) -> Vec<(String, TextSpan)>;

    /// `using` directives of `tree`.
    fn import_directives(&self, tree: &SyntaxTree) -> Vec<ImportDirective>;
}
