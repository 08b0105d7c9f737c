//! Mini, the small C#-like language used to drive compilations.
//!
//! Mini covers what the compilation model needs to exercise end to end: `using`
//! directives, namespaces, classes with a base type, fields, methods and constructors,
//! `///` documentation comments, and method bodies made of locals, `if`/`while`/`do`,
//! `return`, `throw`, `break`/`continue`, calls, member access, object creation,
//! anonymous objects, and the usual arithmetic, relational and logical operators.
//! Script trees additionally accept top-level statements and `#r` directives.
//!
//! # Example
//!
//! ```rust
//! use dotcompile::{lang::MiniLanguage, options::{CompilationOptions, OutputKind}};
//! use dotcompile::references::{AssemblyMetadata, MetadataReference};
//! use dotcompile::utils::CancellationToken;
//!
//! let tree = MiniLanguage::parse("class Foo { int Answer() { return 42; } }", "foo.mini");
//! let compilation = MiniLanguage::create_compilation(
//!     Some("Foo"),
//!     [tree],
//!     [MetadataReference::from_metadata(AssemblyMetadata::core_library(), None)],
//!     CompilationOptions::new(OutputKind::DynamicallyLinkedLibrary),
//! )?;
//! assert!(compilation.get_diagnostics(&CancellationToken::none())?.is_empty());
//! # Ok::<(), dotcompile::Error>(())
//! ```

use std::sync::{Arc, Weak};

use crate::{
    compilation::{
        BindingContext, BoundBody, Compilation, DeclarationContext, ImportDirective, Language,
    },
    diagnostics::Diagnostic,
    options::{CompilationOptions, ParseOptions, SourceCodeKind},
    references::MetadataReference,
    symbols::{AssemblySymbol, MethodSymbol, NamedTypeSymbol},
    syntax::{SourceText, SyntaxTree, SyntaxTreeList, TextSpan},
    Result,
};

mod binder;
mod codes;
mod declare;
mod lexer;
mod parser;
mod syntax;

pub use codes::{MiniErrorCode, MINI_DIAGNOSTIC_PREFIX};
pub use lexer::{lex, Keyword, Token, TokenKind};
pub use parser::parse;
pub use syntax::SyntaxKind;

/// Name stored in every tree Mini produces.
pub const LANGUAGE_NAME: &str = "Mini";

/// The Mini language.
#[derive(Debug, Default, Clone, Copy)]
pub struct MiniLanguage;

impl MiniLanguage {
    /// Parses regular source.
    #[must_use]
    pub fn parse(text: &str, path: &str) -> SyntaxTree {
        Self::parse_with_options(text, path, &ParseOptions::regular())
    }

    /// Parses a script submission.
    #[must_use]
    pub fn parse_script(text: &str, path: &str) -> SyntaxTree {
        Self::parse_with_options(text, path, &ParseOptions::script())
    }

    /// Parses with explicit options. Option errors are attached to the tree.
    #[must_use]
    pub fn parse_with_options(text: &str, path: &str, options: &ParseOptions) -> SyntaxTree {
        MiniLanguage.parse_text(SourceText::new(text), path, options)
    }

    /// Creates a compilation of Mini trees.
    ///
    /// # Errors
    ///
    /// See [`Compilation::create`].
    pub fn create_compilation(
        assembly_name: Option<&str>,
        syntax_trees: impl IntoIterator<Item = SyntaxTree>,
        references: impl IntoIterator<Item = MetadataReference>,
        options: CompilationOptions,
    ) -> Result<Compilation> {
        Compilation::create(
            Arc::new(MiniLanguage),
            assembly_name,
            syntax_trees,
            references,
            options,
        )
    }

    /// Creates a script submission chained after `previous`.
    ///
    /// # Errors
    ///
    /// See [`Compilation::create_script_compilation`].
    pub fn create_script_compilation(
        assembly_name: &str,
        syntax_tree: Option<SyntaxTree>,
        references: impl IntoIterator<Item = MetadataReference>,
        options: CompilationOptions,
        previous: Option<&Compilation>,
    ) -> Result<Compilation> {
        Compilation::create_script_compilation(
            Arc::new(MiniLanguage),
            assembly_name,
            syntax_tree,
            references,
            options,
            previous,
        )
    }
}

impl Language for MiniLanguage {
    fn name(&self) -> &'static str {
        LANGUAGE_NAME
    }

    fn parse_text(&self, text: SourceText, path: &str, options: &ParseOptions) -> SyntaxTree {
        let (root, mut diagnostics) =
            parser::parse(text.as_str(), options.kind() == SourceCodeKind::Script);
        let option_errors = options
            .errors()
            .iter()
            .map(|d| (d.clone(), TextSpan::new(0, 0)));
        diagnostics.splice(0..0, option_errors);
        log::trace!(
            "parsed '{}' ({} bytes, {} diagnostics)",
            path,
            text.len(),
            diagnostics.len()
        );
        SyntaxTree::new(LANGUAGE_NAME, path, text, options.clone(), root, diagnostics)
    }

    fn declare_types(
        &self,
        trees: &SyntaxTreeList,
        options: &CompilationOptions,
        assembly: &Weak<AssemblySymbol>,
        diagnostics: &mut Vec<Diagnostic>,
    ) -> Vec<Arc<NamedTypeSymbol>> {
        declare::declare_types(trees, options, assembly, diagnostics)
    }

    fn complete_types(&self, context: &DeclarationContext<'_>) -> Result<Vec<Diagnostic>> {
        declare::complete_types(context)
    }

    fn bind_method_body(
        &self,
        context: &BindingContext<'_>,
        method: &Arc<MethodSymbol>,
    ) -> Result<Option<BoundBody>> {
        binder::bind_method_body(context, method)
    }

    fn has_code_to_emit(&self, tree: &SyntaxTree) -> bool {
        declare::has_code_to_emit(tree)
    }

    fn reference_directives(&self, tree: &SyntaxTree) -> Vec<(String, TextSpan)> {
        declare::reference_directives(tree)
    }

    fn import_directives(&self, tree: &SyntaxTree) -> Vec<ImportDirective> {
        declare::import_directives(tree)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_kinds() {
        let regular = MiniLanguage::parse("class A {}", "a.mini");
        assert!(!regular.is_script());
        assert_eq!(regular.language(), LANGUAGE_NAME);
        assert_eq!(SyntaxKind::of(regular.root()), Some(SyntaxKind::CompilationUnit));

        let script = MiniLanguage::parse_script("var x = 1;", "a.csx");
        assert!(script.is_script());
        assert!(script.diagnostics().is_empty());
    }

    #[test]
    fn test_parse_errors_are_located() {
        let tree = MiniLanguage::parse("class A { int }", "a.mini");
        let diagnostics = tree.diagnostics();
        assert!(!diagnostics.is_empty());
        assert!(diagnostics[0].id().starts_with(MINI_DIAGNOSTIC_PREFIX));
        assert!(diagnostics[0].location().source_tree().is_some());
    }
}
