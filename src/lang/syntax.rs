//! Mini syntax kinds and typed accessors over [`SyntaxNode`].

use strum::{Display, FromRepr};

use crate::syntax::{RawSyntaxKind, SyntaxNode};

/// Node and token kinds of Mini trees.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, FromRepr)]
#[repr(u16)]
pub enum SyntaxKind {
    /// Identifier token.
    Identifier = 1,
    /// `123`
    IntegerLiteral,
    /// `"text"`, with escapes already processed in the token text
    StringLiteral,
    /// `true`
    TrueLiteral,
    /// `false`
    FalseLiteral,
    /// `null`
    NullLiteral,
    /// Operator token; the text is the operator.
    Operator,
    /// Modifier keyword token.
    Modifier,
    /// `void`, `int`, `bool`, `string`, `object` or `var`
    PredefinedType,
    /// One `///` line, without the slashes.
    DocComment,
    /// `this`
    ThisExpression,
    /// `base`
    BaseExpression,

    /// Root of every tree.
    CompilationUnit = 100,
    /// `#r "path"`
    ReferenceDirective,
    /// `using A.B;`
    UsingDirective,
    /// Dotted name; children are identifiers.
    QualifiedName,
    /// `namespace N { ... }`
    NamespaceDeclaration,
    /// `class C : B { ... }`
    ClassDeclaration,
    /// `: B` of a class.
    BaseType,
    /// Field declaration.
    FieldDeclaration,
    /// Method declaration.
    MethodDeclaration,
    /// Constructor declaration.
    ConstructorDeclaration,
    /// `(int a, string b)`
    ParameterList,
    /// `int a`
    Parameter,
    /// `T[]`
    ArrayType,

    /// `{ ... }`
    Block = 200,
    /// `int x = 1;`
    LocalDeclaration,
    /// `if (c) s else s`
    IfStatement,
    /// `while (c) s`
    WhileStatement,
    /// `do s while (c);`
    DoStatement,
    /// `return e;`
    ReturnStatement,
    /// `throw e;`
    ThrowStatement,
    /// `break;`
    BreakStatement,
    /// `continue;`
    ContinueStatement,
    /// `e;`
    ExpressionStatement,
    /// `;`
    EmptyStatement,
    /// A script top-level statement.
    GlobalStatement,

    /// `a = b`, `a += b`
    AssignmentExpression = 300,
    /// `a + b`
    BinaryExpression,
    /// `!a`, `-a`, `++a`
    UnaryExpression,
    /// `a++`
    PostfixExpression,
    /// `f(a)`
    InvocationExpression,
    /// `(a, b)` of a call or creation.
    ArgumentList,
    /// `a.b`
    MemberAccess,
    /// `new T(a)`
    ObjectCreation,
    /// `new { A = a }`
    AnonymousObjectCreation,
    /// `A = a` inside an anonymous object.
    AnonymousMember,
    /// `(a)`
    ParenthesizedExpression,
}

impl SyntaxKind {
    /// The raw kind stored in nodes.
    #[must_use]
    pub fn raw(self) -> RawSyntaxKind {
        RawSyntaxKind(self as u16)
    }

    /// Maps a raw kind back; `None` for kinds of other languages.
    #[must_use]
    pub fn from_raw(raw: RawSyntaxKind) -> Option<Self> {
        Self::from_repr(raw.0)
    }

    /// Kind of `node`.
    #[must_use]
    pub fn of(node: &SyntaxNode) -> Option<Self> {
        Self::from_raw(node.kind())
    }

    /// Statement kinds.
    #[must_use]
    pub fn is_statement(self) -> bool {
        (self as u16) >= 200 && (self as u16) < 300
    }

    /// Member declarations that may appear in a class body.
    #[must_use]
    pub fn is_member(self) -> bool {
        matches!(
            self,
            SyntaxKind::FieldDeclaration
                | SyntaxKind::MethodDeclaration
                | SyntaxKind::ConstructorDeclaration
        )
    }
}

/// `true` if `node` has kind `kind`.
pub(crate) fn is(node: &SyntaxNode, kind: SyntaxKind) -> bool {
    node.kind() == kind.raw()
}

/// Children of `node` with kind `kind`.
pub(crate) fn children_of(node: &SyntaxNode, kind: SyntaxKind) -> impl Iterator<Item = &SyntaxNode> {
    node.children().iter().filter(move |c| is(c, kind))
}

/// First child with kind `kind`.
pub(crate) fn child_of(node: &SyntaxNode, kind: SyntaxKind) -> Option<&SyntaxNode> {
    children_of(node, kind).next()
}

/// Modifier keywords of a declaration.
pub(crate) fn modifiers(node: &SyntaxNode) -> Vec<&str> {
    children_of(node, SyntaxKind::Modifier)
        .filter_map(SyntaxNode::text)
        .collect()
}

/// Joined `///` lines of a declaration.
pub(crate) fn documentation(node: &SyntaxNode) -> Option<String> {
    let lines: Vec<&str> = children_of(node, SyntaxKind::DocComment)
        .filter_map(SyntaxNode::text)
        .collect();
    (!lines.is_empty()).then(|| lines.join("\n"))
}

/// The declared name: the first identifier child.
pub(crate) fn declared_name(node: &SyntaxNode) -> Option<&str> {
    child_of(node, SyntaxKind::Identifier).and_then(SyntaxNode::text)
}

/// Dotted text of a qualified name.
pub(crate) fn qualified_name_text(node: &SyntaxNode) -> String {
    children_of(node, SyntaxKind::Identifier)
        .filter_map(SyntaxNode::text)
        .collect::<Vec<_>>()
        .join(".")
}

/// The type syntax of a declaration: the first predefined type, qualified name or
/// array type child.
pub(crate) fn type_syntax(node: &SyntaxNode) -> Option<&SyntaxNode> {
    node.children().iter().find(|c| {
        is(c, SyntaxKind::PredefinedType)
            || is(c, SyntaxKind::QualifiedName)
            || is(c, SyntaxKind::ArrayType)
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::syntax::TextSpan;

    #[test]
    fn test_raw_round_trip() {
        for kind in [
            SyntaxKind::Identifier,
            SyntaxKind::CompilationUnit,
            SyntaxKind::Block,
            SyntaxKind::ParenthesizedExpression,
        ] {
            assert_eq!(SyntaxKind::from_raw(kind.raw()), Some(kind));
        }
        assert_eq!(SyntaxKind::from_raw(RawSyntaxKind(0)), None);
        assert!(SyntaxKind::ReturnStatement.is_statement());
        assert!(!SyntaxKind::BinaryExpression.is_statement());
    }

    #[test]
    fn test_accessors() {
        let span = TextSpan::new(0, 1);
        let node = SyntaxNode::new(
            SyntaxKind::FieldDeclaration.raw(),
            span,
            vec![
                SyntaxNode::token(SyntaxKind::DocComment.raw(), span, "<summary>"),
                SyntaxNode::token(SyntaxKind::DocComment.raw(), span, "</summary>"),
                SyntaxNode::token(SyntaxKind::Modifier.raw(), span, "public"),
                SyntaxNode::token(SyntaxKind::PredefinedType.raw(), span, "int"),
                SyntaxNode::token(SyntaxKind::Identifier.raw(), span, "x"),
            ],
        );
        assert_eq!(modifiers(&node), ["public"]);
        assert_eq!(documentation(&node).as_deref(), Some("<summary>\n</summary>"));
        assert_eq!(declared_name(&node), Some("x"));
        assert_eq!(type_syntax(&node).and_then(SyntaxNode::text), Some("int"));
    }
}
