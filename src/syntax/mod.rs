//! Language-neutral syntax abstractions.
//!
//! The compilation core never inspects grammar. It consumes syntax through three types:
//!
//! - [`SyntaxNode`] - An immutable node with a language-defined raw kind, a span, an
//!   optional token text and ordered children
//! - [`SyntaxTree`] - One parsed file: path, [`SourceText`], [`crate::options::ParseOptions`],
//!   root node and parse diagnostics
//! - [`SyntaxTreeList`] - The structure-sharing ordered collection a
//!   [`crate::Compilation`] keeps its trees in
//!
//! Language plug-ins (see [`crate::lang`]) produce trees; the core orders, hashes,
//! diffs and reports on them.

mod list;
mod text;

pub use list::{SyntaxTreeList, SyntaxTreeListBuilder};
pub use text::{SourceHashAlgorithm, SourceText};

use std::{collections::BTreeMap, fmt, sync::Arc};

use crate::{
    diagnostics::{Diagnostic, Location, ReportDiagnostic},
    options::{ParseOptions, SourceCodeKind},
};

/// A half-open byte range `[start, start + len)` within a source text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct TextSpan {
    /// Start offset in bytes
    pub start: usize,
    /// Length in bytes
    pub len: usize,
}

impl TextSpan {
    /// Creates a span.
    #[must_use]
    pub fn new(start: usize, len: usize) -> Self {
        TextSpan { start, len }
    }

    /// Creates a span from start and end offsets.
    #[must_use]
    pub fn from_bounds(start: usize, end: usize) -> Self {
        TextSpan {
            start,
            len: end.saturating_sub(start),
        }
    }

    /// Exclusive end offset.
    #[must_use]
    pub fn end(&self) -> usize {
        self.start + self.len
    }

    /// `true` if `position` lies within the span.
    #[must_use]
    pub fn contains(&self, position: usize) -> bool {
        position >= self.start && position < self.end()
    }

    /// `true` if `other` lies entirely within this span.
    #[must_use]
    pub fn contains_span(&self, other: TextSpan) -> bool {
        other.start >= self.start && other.end() <= self.end()
    }
}

/// A language-defined node kind.
///
/// The core treats it as opaque; languages map it to their own enumeration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RawSyntaxKind(pub u16);

struct SyntaxNodeData {
    kind: RawSyntaxKind,
    span: TextSpan,
    text: Option<Arc<str>>,
    children: Vec<SyntaxNode>,
}

/// An immutable syntax node shared through reference counting.
///
/// Equality is identity: two nodes are equal only if they are the same node.
#[derive(Clone)]
pub struct SyntaxNode {
    data: Arc<SyntaxNodeData>,
}

impl SyntaxNode {
    /// Creates an interior node.
    #[must_use]
    pub fn new(kind: RawSyntaxKind, span: TextSpan, children: Vec<SyntaxNode>) -> Self {
        SyntaxNode {
            data: Arc::new(SyntaxNodeData {
                kind,
                span,
                text: None,
                children,
            }),
        }
    }

    /// Creates a token carrying its text.
    #[must_use]
    pub fn token(kind: RawSyntaxKind, span: TextSpan, text: &str) -> Self {
        SyntaxNode {
            data: Arc::new(SyntaxNodeData {
                kind,
                span,
                text: Some(Arc::from(text)),
                children: Vec::new(),
            }),
        }
    }

    /// Raw kind.
    #[must_use]
    pub fn kind(&self) -> RawSyntaxKind {
        self.data.kind
    }

    /// Span in the source text.
    #[must_use]
    pub fn span(&self) -> TextSpan {
        self.data.span
    }

    /// Token text, `None` for interior nodes.
    #[must_use]
    pub fn text(&self) -> Option<&str> {
        self.data.text.as_deref()
    }

    /// Ordered children.
    #[must_use]
    pub fn children(&self) -> &[SyntaxNode] {
        &self.data.children
    }

    /// Child at `index`.
    #[must_use]
    pub fn child(&self, index: usize) -> Option<&SyntaxNode> {
        self.data.children.get(index)
    }

    /// First child with the given kind.
    #[must_use]
    pub fn child_of_kind(&self, kind: RawSyntaxKind) -> Option<&SyntaxNode> {
        self.data.children.iter().find(|c| c.kind() == kind)
    }

    /// Pre-order iterator over this node and all descendants.
    pub fn descendants(&self) -> impl Iterator<Item = SyntaxNode> {
        let mut stack = vec![self.clone()];
        std::iter::from_fn(move || {
            let node = stack.pop()?;
            stack.extend(node.children().iter().rev().cloned());
            Some(node)
        })
    }

    /// Innermost descendant whose span equals `span`.
    #[must_use]
    pub fn find_node(&self, span: TextSpan) -> Option<SyntaxNode> {
        if !self.span().contains_span(span) {
            return None;
        }
        for child in self.children() {
            if let Some(found) = child.find_node(span) {
                return Some(found);
            }
        }
        (self.span() == span).then(|| self.clone())
    }

    /// Stable address of this node, usable as a map key while the tree is alive.
    #[must_use]
    pub fn id(&self) -> usize {
        Arc::as_ptr(&self.data) as usize
    }
}

impl PartialEq for SyntaxNode {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.data, &other.data)
    }
}

impl Eq for SyntaxNode {}

impl std::hash::Hash for SyntaxNode {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.id().hash(state);
    }
}

impl fmt::Debug for SyntaxNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut s = f.debug_struct("SyntaxNode");
        s.field("kind", &self.kind().0).field("span", &self.span());
        if let Some(text) = self.text() {
            s.field("text", &text);
        }
        s.finish()
    }
}

struct SyntaxTreeData {
    language: &'static str,
    file_path: String,
    text: SourceText,
    options: ParseOptions,
    root: SyntaxNode,
    parse_diagnostics: Vec<(Diagnostic, TextSpan)>,
    diagnostic_options: BTreeMap<String, ReportDiagnostic>,
}

/// One parsed source file.
///
/// Trees are compared by identity: re-parsing the same text yields a different tree.
///
/// # Examples
///
/// ```rust
/// use dotcompile::lang::MiniLanguage;
///
/// let tree = MiniLanguage::parse("class Foo {}", "a.mini");
/// assert_eq!(tree.file_path(), "a.mini");
/// assert!(tree.diagnostics().is_empty());
/// assert_ne!(tree, MiniLanguage::parse("class Foo {}", "a.mini"));
/// ```
#[derive(Clone)]
pub struct SyntaxTree {
    data: Arc<SyntaxTreeData>,
}

impl SyntaxTree {
    /// Creates a tree. Parse diagnostics are stored with their spans and receive a
    /// location in this tree when retrieved.
    ///
    /// # Arguments
    ///
    /// * `language` - Name of the producing language
    /// * `file_path` - Path the tree was parsed from (may be empty)
    /// * `text` - Source text
    /// * `options` - Options the tree was parsed with
    /// * `root` - Root node
    /// * `parse_diagnostics` - Diagnostics with the span they apply to
    #[must_use]
    pub fn new(
        language: &'static str,
        file_path: impl Into<String>,
        text: SourceText,
        options: ParseOptions,
        root: SyntaxNode,
        parse_diagnostics: Vec<(Diagnostic, TextSpan)>,
    ) -> Self {
        SyntaxTree {
            data: Arc::new(SyntaxTreeData {
                language,
                file_path: file_path.into(),
                text,
                options,
                root,
                parse_diagnostics,
                diagnostic_options: BTreeMap::new(),
            }),
        }
    }

    /// Returns a new tree with per-tree diagnostic options.
    #[must_use]
    pub fn with_diagnostic_options(&self, options: BTreeMap<String, ReportDiagnostic>) -> Self {
        SyntaxTree {
            data: Arc::new(SyntaxTreeData {
                language: self.data.language,
                file_path: self.data.file_path.clone(),
                text: self.data.text.clone(),
                options: self.data.options.clone(),
                root: self.data.root.clone(),
                parse_diagnostics: self.data.parse_diagnostics.clone(),
                diagnostic_options: options,
            }),
        }
    }

    /// Name of the language that produced this tree.
    #[must_use]
    pub fn language(&self) -> &'static str {
        self.data.language
    }

    /// File path.
    #[must_use]
    pub fn file_path(&self) -> &str {
        &self.data.file_path
    }

    /// Source text.
    #[must_use]
    pub fn text(&self) -> &SourceText {
        &self.data.text
    }

    /// Parse options.
    #[must_use]
    pub fn options(&self) -> &ParseOptions {
        &self.data.options
    }

    /// Root node.
    #[must_use]
    pub fn root(&self) -> &SyntaxNode {
        &self.data.root
    }

    /// `true` if the tree was parsed as a script.
    #[must_use]
    pub fn is_script(&self) -> bool {
        self.data.options.kind() == SourceCodeKind::Script
    }

    /// Parse diagnostics located in this tree.
    #[must_use]
    pub fn diagnostics(&self) -> Vec<Diagnostic> {
        self.data
            .parse_diagnostics
            .iter()
            .map(|(d, span)| d.clone().with_location(Location::source(self, *span)))
            .collect()
    }

    /// Per-tree report option for a diagnostic id.
    #[must_use]
    pub fn diagnostic_option(&self, id: &str) -> Option<ReportDiagnostic> {
        self.data.diagnostic_options.get(id).copied()
    }

    /// Per-tree report options.
    #[must_use]
    pub fn diagnostic_options(&self) -> &BTreeMap<String, ReportDiagnostic> {
        &self.data.diagnostic_options
    }

    /// Stable address of this tree, usable as a map key while it is alive.
    #[must_use]
    pub fn id(&self) -> usize {
        Arc::as_ptr(&self.data) as usize
    }
}

impl PartialEq for SyntaxTree {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.data, &other.data)
    }
}

impl Eq for SyntaxTree {}

impl std::hash::Hash for SyntaxTree {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.id().hash(state);
    }
}

impl fmt::Debug for SyntaxTree {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SyntaxTree")
            .field("language", &self.data.language)
            .field("file_path", &self.data.file_path)
            .field("kind", &self.data.options.kind())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn leaf(start: usize, len: usize) -> SyntaxNode {
        SyntaxNode::token(RawSyntaxKind(1), TextSpan::new(start, len), "x")
    }

    #[test]
    fn test_span_bounds() {
        let span = TextSpan::from_bounds(3, 7);
        assert_eq!(span.len, 4);
        assert!(span.contains(3));
        assert!(!span.contains(7));
        assert!(span.contains_span(TextSpan::new(4, 3)));
    }

    #[test]
    fn test_descendants_preorder() {
        let a = leaf(0, 1);
        let b = leaf(2, 1);
        let root = SyntaxNode::new(RawSyntaxKind(0), TextSpan::new(0, 3), vec![a.clone(), b.clone()]);
        let order: Vec<_> = root.descendants().collect();
        assert_eq!(order, vec![root.clone(), a, b]);
    }

    #[test]
    fn test_find_node() {
        let a = leaf(0, 1);
        let root = SyntaxNode::new(RawSyntaxKind(0), TextSpan::new(0, 3), vec![a.clone()]);
        assert_eq!(root.find_node(TextSpan::new(0, 1)), Some(a));
        assert_eq!(root.find_node(TextSpan::new(0, 3)), Some(root.clone()));
        assert_eq!(root.find_node(TextSpan::new(1, 1)), None);
    }

    #[test]
    fn test_tree_diagnostics_receive_location() {
        let root = SyntaxNode::new(RawSyntaxKind(0), TextSpan::new(0, 3), Vec::new());
        let tree = SyntaxTree::new(
            "Test",
            "t.txt",
            SourceText::new("abc"),
            ParseOptions::default(),
            root,
            vec![(
                Diagnostic::new("P1", crate::diagnostics::DiagnosticSeverity::Error, "bad"),
                TextSpan::new(1, 1),
            )],
        );
        let diagnostics = tree.diagnostics();
        assert_eq!(diagnostics[0].location().source_tree(), Some(&tree));
        assert_eq!(diagnostics[0].to_string(), "t.txt(1,2): error P1: bad");
    }
}
