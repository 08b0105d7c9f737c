//! Mini recursive-descent parser.
//!
//! Every construct has its own parse function that consumes tokens and returns a
//! [`SyntaxNode`]. Punctuation is not kept in the tree; operators, modifiers, names
//! and literals are kept as token nodes. The parser never fails: unexpected input is
//! reported and skipped, and missing names become empty identifier tokens.

use crate::{
    diagnostics::{Diagnostic, Location},
    lang::{
        codes::MiniErrorCode,
        lexer::{lex, Keyword, Token, TokenKind},
        syntax::SyntaxKind,
    },
    syntax::{SyntaxNode, TextSpan},
};

const MAX_NESTING: usize = 256;

const ASSIGNMENT_OPERATORS: &[&str] = &["=", "+=", "-=", "*=", "/="];

const BINARY_PRECEDENCE: &[&[&str]] = &[
    &["||"],
    &["&&"],
    &["==", "!="],
    &["<", "<=", ">", ">="],
    &["+", "-"],
    &["*", "/", "%"],
];

/// Parses `source`. Statements at the top level are accepted in both modes but
/// reported outside scripts.
pub fn parse(source: &str, is_script: bool) -> (SyntaxNode, Vec<(Diagnostic, TextSpan)>) {
    let (tokens, diagnostics) = lex(source);
    let mut parser = Parser {
        tokens,
        position: 0,
        last_end: 0,
        depth: 0,
        is_script,
        diagnostics,
    };
    let root = parser.compilation_unit(source.len());
    (root, parser.diagnostics)
}

struct Parser {
    tokens: Vec<Token>,
    position: usize,
    last_end: usize,
    depth: usize,
    is_script: bool,
    diagnostics: Vec<(Diagnostic, TextSpan)>,
}

impl Parser {
    // Token access

    fn nth(&self, n: usize) -> &Token {
        let index = (self.position + n).min(self.tokens.len() - 1);
        &self.tokens[index]
    }

    fn current(&self) -> &Token {
        self.nth(0)
    }

    fn at_end(&self) -> bool {
        self.current().kind == TokenKind::EndOfFile
    }

    fn at(&self, punctuation: &str) -> bool {
        self.current().is_punctuation(punctuation)
    }

    fn at_keyword(&self, keyword: Keyword) -> bool {
        self.current().is_keyword(keyword)
    }

    fn bump(&mut self) -> Token {
        let token = self.current().clone();
        if token.kind != TokenKind::EndOfFile {
            self.position += 1;
            self.last_end = token.span.end();
        }
        token
    }

    fn eat(&mut self, punctuation: &str) -> bool {
        if self.at(punctuation) {
            self.bump();
            true
        } else {
            false
        }
    }

    fn expect(&mut self, punctuation: &str) {
        if !self.eat(punctuation) {
            self.error_expected(&format!("'{punctuation}'"));
        }
    }

    fn error_expected(&mut self, expected: &str) {
        let current = self.current();
        let found = if current.kind == TokenKind::EndOfFile {
            "end of file".to_string()
        } else {
            current.text.clone()
        };
        let span = current.span;
        self.error(MiniErrorCode::UnexpectedToken, span, &[&expected, &found]);
    }

    fn error(&mut self, code: MiniErrorCode, span: TextSpan, args: &[&dyn std::fmt::Display]) {
        self.diagnostics.push((code.diagnostic(Location::None, args), span));
    }

    // Node construction

    fn node(&self, kind: SyntaxKind, start: usize, children: Vec<SyntaxNode>) -> SyntaxNode {
        let end = self.last_end.max(start);
        SyntaxNode::new(kind.raw(), TextSpan::from_bounds(start, end), children)
    }

    fn token_node(kind: SyntaxKind, token: &Token) -> SyntaxNode {
        SyntaxNode::token(kind.raw(), token.span, &token.text)
    }

    fn start(&self) -> usize {
        self.current().span.start
    }

    fn enter(&mut self) -> bool {
        if self.depth >= MAX_NESTING {
            let span = self.current().span;
            self.error(MiniErrorCode::NestingTooDeep, span, &[]);
            return false;
        }
        self.depth += 1;
        true
    }

    fn leave(&mut self) {
        self.depth -= 1;
    }

    fn identifier(&mut self) -> SyntaxNode {
        if self.current().kind == TokenKind::Identifier {
            let token = self.bump();
            return Self::token_node(SyntaxKind::Identifier, &token);
        }
        self.error_expected("identifier");
        SyntaxNode::token(
            SyntaxKind::Identifier.raw(),
            TextSpan::new(self.start(), 0),
            "",
        )
    }

    // Declarations

    fn compilation_unit(&mut self, source_len: usize) -> SyntaxNode {
        let mut children = Vec::new();
        while self.current().kind == TokenKind::ReferenceDirective {
            children.push(self.reference_directive());
        }
        while self.at_keyword(Keyword::Using) {
            children.push(self.using_directive());
        }
        while !self.at_end() {
            let before = self.position;
            if self.at_type_declaration() {
                children.push(self.type_declaration());
            } else if self.current().kind == TokenKind::ReferenceDirective {
                let directive = self.reference_directive();
                self.error_expected("declaration or statement");
                children.push(directive);
            } else {
                let statement = self.statement();
                if !self.is_script {
                    self.error(
                        MiniErrorCode::TopLevelStatementOutsideScript,
                        statement.span(),
                        &[],
                    );
                }
                let span = statement.span();
                children.push(SyntaxNode::new(
                    SyntaxKind::GlobalStatement.raw(),
                    span,
                    vec![statement],
                ));
            }
            if self.position == before {
                self.bump();
            }
        }
        SyntaxNode::new(
            SyntaxKind::CompilationUnit.raw(),
            TextSpan::new(0, source_len),
            children,
        )
    }

    fn reference_directive(&mut self) -> SyntaxNode {
        let start = self.start();
        self.bump();
        if !self.is_script {
            self.error(
                MiniErrorCode::ReferenceDirectiveOutsideScript,
                TextSpan::new(start, 2),
                &[],
            );
        }
        let mut children = Vec::new();
        if self.current().kind == TokenKind::String {
            let token = self.bump();
            children.push(Self::token_node(SyntaxKind::StringLiteral, &token));
        } else {
            self.error_expected("string");
        }
        self.node(SyntaxKind::ReferenceDirective, start, children)
    }

    fn using_directive(&mut self) -> SyntaxNode {
        let start = self.start();
        self.bump();
        let name = self.qualified_name();
        self.expect(";");
        self.node(SyntaxKind::UsingDirective, start, vec![name])
    }

    fn qualified_name(&mut self) -> SyntaxNode {
        let start = self.start();
        let mut parts = vec![self.identifier()];
        while self.at(".") && self.nth(1).kind == TokenKind::Identifier {
            self.bump();
            parts.push(self.identifier());
        }
        self.node(SyntaxKind::QualifiedName, start, parts)
    }

    fn at_type_declaration(&self) -> bool {
        if self.at_keyword(Keyword::Namespace) {
            return true;
        }
        let mut n = 0;
        loop {
            let token = self.nth(n);
            match token.kind {
                TokenKind::DocComment => n += 1,
                TokenKind::Keyword(keyword) if keyword.is_modifier() => n += 1,
                TokenKind::Keyword(Keyword::Class) => return true,
                _ => return false,
            }
        }
    }

    fn type_declaration(&mut self) -> SyntaxNode {
        if self.at_keyword(Keyword::Namespace) {
            self.namespace_declaration()
        } else {
            self.class_declaration()
        }
    }

    fn namespace_declaration(&mut self) -> SyntaxNode {
        let start = self.start();
        self.bump();
        let mut children = vec![self.qualified_name()];
        self.expect("{");
        while self.at_keyword(Keyword::Using) {
            children.push(self.using_directive());
        }
        while !self.at("}") && !self.at_end() {
            if self.at_type_declaration() {
                children.push(self.type_declaration());
            } else {
                self.error_expected("type or namespace declaration");
                self.bump();
            }
        }
        self.expect("}");
        self.node(SyntaxKind::NamespaceDeclaration, start, children)
    }

    /// Doc comments and modifiers in front of a declaration.
    fn declaration_prefix(&mut self) -> Vec<SyntaxNode> {
        let mut prefix = Vec::new();
        loop {
            let token = self.current().clone();
            match token.kind {
                TokenKind::DocComment => {
                    self.bump();
                    prefix.push(Self::token_node(SyntaxKind::DocComment, &token));
                }
                TokenKind::Keyword(keyword) if keyword.is_modifier() => {
                    self.bump();
                    prefix.push(Self::token_node(SyntaxKind::Modifier, &token));
                }
                _ => return prefix,
            }
        }
    }

    fn class_declaration(&mut self) -> SyntaxNode {
        let start = self.start();
        let mut children = self.declaration_prefix();
        if self.at_keyword(Keyword::Class) {
            self.bump();
        } else {
            self.error_expected("'class'");
        }
        let name = self.identifier();
        let class_name = name.text().unwrap_or_default().to_string();
        children.push(name);
        if self.eat(":") {
            let base_start = self.start();
            let base = self.type_syntax();
            children.push(self.node(SyntaxKind::BaseType, base_start, vec![base]));
        }
        self.expect("{");
        while !self.at("}") && !self.at_end() {
            let before = self.position;
            if let Some(member) = self.class_member(&class_name) {
                children.push(member);
            }
            if self.position == before {
                self.bump();
            }
        }
        self.expect("}");
        self.node(SyntaxKind::ClassDeclaration, start, children)
    }

    fn class_member(&mut self, class_name: &str) -> Option<SyntaxNode> {
        let start = self.start();
        let mut children = self.declaration_prefix();

        let is_constructor = self.current().kind == TokenKind::Identifier
            && self.current().text == class_name
            && self.nth(1).is_punctuation("(");
        if is_constructor {
            children.push(self.identifier());
            children.push(self.parameter_list());
            children.push(self.block());
            return Some(self.node(SyntaxKind::ConstructorDeclaration, start, children));
        }

        if !self.at_type_start() {
            self.error_expected("member declaration");
            return None;
        }
        children.push(self.type_syntax());
        children.push(self.identifier());
        if self.at("(") {
            children.push(self.parameter_list());
            if !self.eat(";") {
                children.push(self.block());
            }
            return Some(self.node(SyntaxKind::MethodDeclaration, start, children));
        }
        if self.eat("=") {
            children.push(self.expression());
        }
        self.expect(";");
        Some(self.node(SyntaxKind::FieldDeclaration, start, children))
    }

    fn parameter_list(&mut self) -> SyntaxNode {
        let start = self.start();
        self.expect("(");
        let mut parameters = Vec::new();
        if !self.at(")") {
            loop {
                let parameter_start = self.start();
                let ty = self.type_syntax();
                let name = self.identifier();
                parameters.push(self.node(SyntaxKind::Parameter, parameter_start, vec![ty, name]));
                if !self.eat(",") {
                    break;
                }
            }
        }
        self.expect(")");
        self.node(SyntaxKind::ParameterList, start, parameters)
    }

    fn at_type_start(&self) -> bool {
        match self.current().kind {
            TokenKind::Identifier => true,
            TokenKind::Keyword(keyword) => keyword.is_predefined_type(),
            _ => false,
        }
    }

    fn type_syntax(&mut self) -> SyntaxNode {
        let start = self.start();
        let mut ty = match self.current().kind {
            TokenKind::Keyword(keyword) if keyword.is_predefined_type() => {
                let token = self.bump();
                Self::token_node(SyntaxKind::PredefinedType, &token)
            }
            _ => self.qualified_name(),
        };
        while self.at("[") && self.nth(1).is_punctuation("]") {
            self.bump();
            self.bump();
            ty = self.node(SyntaxKind::ArrayType, start, vec![ty]);
        }
        ty
    }

    // Statements

    fn block(&mut self) -> SyntaxNode {
        let start = self.start();
        self.expect("{");
        let mut statements = Vec::new();
        while !self.at("}") && !self.at_end() {
            let before = self.position;
            statements.push(self.statement());
            if self.position == before {
                self.bump();
            }
        }
        self.expect("}");
        self.node(SyntaxKind::Block, start, statements)
    }

    fn statement(&mut self) -> SyntaxNode {
        while self.current().kind == TokenKind::DocComment {
            self.bump();
        }
        let start = self.start();
        if !self.enter() {
            self.bump();
            return self.node(SyntaxKind::EmptyStatement, start, Vec::new());
        }
        let statement = self.statement_inner(start);
        self.leave();
        statement
    }

    fn statement_inner(&mut self, start: usize) -> SyntaxNode {
        let token = self.current().clone();
        match token.kind {
            TokenKind::Punctuation if token.text == "{" => self.block(),
            TokenKind::Punctuation if token.text == ";" => {
                self.bump();
                self.node(SyntaxKind::EmptyStatement, start, Vec::new())
            }
            TokenKind::Keyword(Keyword::If) => {
                self.bump();
                let condition = self.parenthesized_condition();
                let mut children = vec![condition, self.statement()];
                if self.at_keyword(Keyword::Else) {
                    self.bump();
                    children.push(self.statement());
                }
                self.node(SyntaxKind::IfStatement, start, children)
            }
            TokenKind::Keyword(Keyword::While) => {
                self.bump();
                let condition = self.parenthesized_condition();
                let body = self.statement();
                self.node(SyntaxKind::WhileStatement, start, vec![condition, body])
            }
            TokenKind::Keyword(Keyword::Do) => {
                self.bump();
                let body = self.statement();
                if self.at_keyword(Keyword::While) {
                    self.bump();
                } else {
                    self.error_expected("'while'");
                }
                let condition = self.parenthesized_condition();
                self.expect(";");
                self.node(SyntaxKind::DoStatement, start, vec![body, condition])
            }
            TokenKind::Keyword(Keyword::Return) | TokenKind::Keyword(Keyword::Throw) => {
                self.bump();
                let mut children = Vec::new();
                if !self.at(";") {
                    children.push(self.expression());
                }
                self.expect(";");
                let kind = if token.is_keyword(Keyword::Return) {
                    SyntaxKind::ReturnStatement
                } else {
                    SyntaxKind::ThrowStatement
                };
                self.node(kind, start, children)
            }
            TokenKind::Keyword(Keyword::Break) | TokenKind::Keyword(Keyword::Continue) => {
                self.bump();
                self.expect(";");
                let kind = if token.is_keyword(Keyword::Break) {
                    SyntaxKind::BreakStatement
                } else {
                    SyntaxKind::ContinueStatement
                };
                self.node(kind, start, Vec::new())
            }
            _ if self.at_local_declaration() => self.local_declaration(),
            _ => {
                let expression = self.expression();
                self.expect(";");
                self.node(SyntaxKind::ExpressionStatement, start, vec![expression])
            }
        }
    }

    fn parenthesized_condition(&mut self) -> SyntaxNode {
        self.expect("(");
        let condition = self.expression();
        self.expect(")");
        condition
    }

    fn at_local_declaration(&self) -> bool {
        match self.current().kind {
            TokenKind::Keyword(Keyword::Var) => true,
            TokenKind::Keyword(keyword) => keyword.is_predefined_type(),
            TokenKind::Identifier => {
                let mut n = 1;
                while self.nth(n).is_punctuation(".") && self.nth(n + 1).kind == TokenKind::Identifier {
                    n += 2;
                }
                while self.nth(n).is_punctuation("[") && self.nth(n + 1).is_punctuation("]") {
                    n += 2;
                }
                self.nth(n).kind == TokenKind::Identifier
            }
            _ => false,
        }
    }

    fn local_declaration(&mut self) -> SyntaxNode {
        let start = self.start();
        let ty = if self.at_keyword(Keyword::Var) {
            let token = self.bump();
            Self::token_node(SyntaxKind::PredefinedType, &token)
        } else {
            self.type_syntax()
        };
        let mut children = vec![ty, self.identifier()];
        if self.eat("=") {
            children.push(self.expression());
        }
        self.expect(";");
        self.node(SyntaxKind::LocalDeclaration, start, children)
    }

    // Expressions

    fn expression(&mut self) -> SyntaxNode {
        let start = self.start();
        if !self.enter() {
            self.bump();
            return SyntaxNode::token(
                SyntaxKind::Identifier.raw(),
                TextSpan::new(start, 0),
                "",
            );
        }
        let left = self.binary(0);
        let expression = if ASSIGNMENT_OPERATORS.iter().any(|op| self.at(op)) {
            let operator = self.bump();
            let right = self.expression();
            self.node(
                SyntaxKind::AssignmentExpression,
                start,
                vec![left, Self::token_node(SyntaxKind::Operator, &operator), right],
            )
        } else {
            left
        };
        self.leave();
        expression
    }

    fn binary(&mut self, level: usize) -> SyntaxNode {
        if level == BINARY_PRECEDENCE.len() {
            return self.unary();
        }
        let start = self.start();
        let mut left = self.binary(level + 1);
        while BINARY_PRECEDENCE[level].iter().any(|op| self.at(op)) {
            let operator = self.bump();
            let right = self.binary(level + 1);
            left = self.node(
                SyntaxKind::BinaryExpression,
                start,
                vec![left, Self::token_node(SyntaxKind::Operator, &operator), right],
            );
        }
        left
    }

    fn unary(&mut self) -> SyntaxNode {
        let start = self.start();
        if ["!", "-", "+", "++", "--"].iter().any(|op| self.at(op)) {
            if !self.enter() {
                self.bump();
                return self.node(SyntaxKind::EmptyStatement, start, Vec::new());
            }
            let operator = self.bump();
            let operand = self.unary();
            self.leave();
            return self.node(
                SyntaxKind::UnaryExpression,
                start,
                vec![Self::token_node(SyntaxKind::Operator, &operator), operand],
            );
        }
        self.postfix()
    }

    fn postfix(&mut self) -> SyntaxNode {
        let start = self.start();
        let mut expression = self.primary();
        loop {
            if self.at(".") {
                self.bump();
                let name = self.identifier();
                expression = self.node(SyntaxKind::MemberAccess, start, vec![expression, name]);
            } else if self.at("(") {
                let arguments = self.argument_list();
                expression = self.node(
                    SyntaxKind::InvocationExpression,
                    start,
                    vec![expression, arguments],
                );
            } else if self.at("++") || self.at("--") {
                let operator = self.bump();
                expression = self.node(
                    SyntaxKind::PostfixExpression,
                    start,
                    vec![expression, Self::token_node(SyntaxKind::Operator, &operator)],
                );
            } else {
                return expression;
            }
        }
    }

    fn argument_list(&mut self) -> SyntaxNode {
        let start = self.start();
        self.expect("(");
        let mut arguments = Vec::new();
        if !self.at(")") {
            loop {
                arguments.push(self.expression());
                if !self.eat(",") {
                    break;
                }
            }
        }
        self.expect(")");
        self.node(SyntaxKind::ArgumentList, start, arguments)
    }

    fn primary(&mut self) -> SyntaxNode {
        let start = self.start();
        let token = self.current().clone();
        let literal = match token.kind {
            TokenKind::Identifier => Some(SyntaxKind::Identifier),
            TokenKind::Integer => Some(SyntaxKind::IntegerLiteral),
            TokenKind::String => Some(SyntaxKind::StringLiteral),
            TokenKind::Keyword(Keyword::True) => Some(SyntaxKind::TrueLiteral),
            TokenKind::Keyword(Keyword::False) => Some(SyntaxKind::FalseLiteral),
            TokenKind::Keyword(Keyword::Null) => Some(SyntaxKind::NullLiteral),
            TokenKind::Keyword(Keyword::This) => Some(SyntaxKind::ThisExpression),
            TokenKind::Keyword(Keyword::Base) => Some(SyntaxKind::BaseExpression),
            _ => None,
        };
        if let Some(kind) = literal {
            self.bump();
            return Self::token_node(kind, &token);
        }

        if self.eat("(") {
            let inner = self.expression();
            self.expect(")");
            return self.node(SyntaxKind::ParenthesizedExpression, start, vec![inner]);
        }

        if token.is_keyword(Keyword::New) {
            self.bump();
            if self.at("{") {
                return self.anonymous_object(start);
            }
            let ty = self.type_syntax();
            let arguments = self.argument_list();
            return self.node(SyntaxKind::ObjectCreation, start, vec![ty, arguments]);
        }

        self.error_expected("expression");
        SyntaxNode::token(SyntaxKind::Identifier.raw(), TextSpan::new(start, 0), "")
    }

    fn anonymous_object(&mut self, start: usize) -> SyntaxNode {
        self.expect("{");
        let mut members = Vec::new();
        while !self.at("}") && !self.at_end() {
            let member_start = self.start();
            let name = self.identifier();
            self.expect("=");
            let value = self.expression();
            members.push(self.node(SyntaxKind::AnonymousMember, member_start, vec![name, value]));
            if !self.eat(",") {
                break;
            }
        }
        self.expect("}");
        self.node(SyntaxKind::AnonymousObjectCreation, start, members)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lang::syntax::{child_of, declared_name, is, modifiers};

    fn parse_ok(source: &str) -> SyntaxNode {
        let (root, diagnostics) = parse(source, false);
        assert!(diagnostics.is_empty(), "{diagnostics:?}");
        root
    }

    #[test]
    fn test_class_with_members() {
        let root = parse_ok(
            "using System;\n\
             namespace App {\n\
               /// <summary>Foo</summary>\n\
               public class Foo : Bar {\n\
                 private int count = 1;\n\
                 public Foo(int start) { count = start; }\n\
                 public static void Main() { }\n\
                 public abstract int Area();\n\
               }\n\
             }",
        );
        assert!(is(&root.children()[0], SyntaxKind::UsingDirective));
        let namespace = &root.children()[1];
        assert!(is(namespace, SyntaxKind::NamespaceDeclaration));
        let class = child_of(namespace, SyntaxKind::ClassDeclaration).unwrap();
        assert_eq!(declared_name(class), Some("Foo"));
        assert_eq!(modifiers(class), ["public"]);
        assert!(child_of(class, SyntaxKind::BaseType).is_some());
        assert!(child_of(class, SyntaxKind::FieldDeclaration).is_some());
        assert!(child_of(class, SyntaxKind::ConstructorDeclaration).is_some());
        let methods: Vec<_> = class
            .children()
            .iter()
            .filter(|c| is(c, SyntaxKind::MethodDeclaration))
            .collect();
        assert_eq!(methods.len(), 2);
        assert!(child_of(methods[1], SyntaxKind::Block).is_none());
    }

    #[test]
    fn test_precedence() {
        let (root, diagnostics) = parse("x = 1 + 2 * 3 == 7 && !done;", true);
        assert!(diagnostics.is_empty());
        let statement = &root.children()[0].children()[0];
        let assignment = &statement.children()[0];
        assert!(is(assignment, SyntaxKind::AssignmentExpression));
        let and = &assignment.children()[2];
        assert_eq!(and.children()[1].text(), Some("&&"));
        let equals = &and.children()[0];
        assert_eq!(equals.children()[1].text(), Some("=="));
        let sum = &equals.children()[0];
        assert_eq!(sum.children()[1].text(), Some("+"));
        assert!(is(&sum.children()[2], SyntaxKind::BinaryExpression));
    }

    #[test]
    fn test_statements() {
        let (root, diagnostics) = parse(
            "int i = 0; while (i < 3) { i++; if (i == 2) break; else continue; } \
             do { i--; } while (i > 0); var o = new { A = 1, B = \"b\" }; Foo.Bar(1, 2); return;",
            true,
        );
        assert!(diagnostics.is_empty(), "{diagnostics:?}");
        let kinds: Vec<_> = root
            .children()
            .iter()
            .map(|g| SyntaxKind::of(&g.children()[0]).unwrap())
            .collect();
        assert_eq!(
            kinds,
            [
                SyntaxKind::LocalDeclaration,
                SyntaxKind::WhileStatement,
                SyntaxKind::DoStatement,
                SyntaxKind::LocalDeclaration,
                SyntaxKind::ExpressionStatement,
                SyntaxKind::ReturnStatement,
            ]
        );
    }

    #[test]
    fn test_top_level_statement_outside_script() {
        let (_, diagnostics) = parse("x = 1;", false);
        assert_eq!(diagnostics.len(), 1);
        assert_eq!(diagnostics[0].0.id(), "MN1006");

        let (_, diagnostics) = parse("#r \"a.dll\"\nclass A {}", false);
        assert_eq!(diagnostics[0].0.id(), "MN1005");
    }

    #[test]
    fn test_recovery_makes_progress() {
        let (root, diagnostics) = parse("class A { int ; ) void M( { } }", false);
        assert!(!diagnostics.is_empty());
        assert!(is(&root.children()[0], SyntaxKind::ClassDeclaration));
    }

    #[test]
    fn test_deep_nesting_is_reported() {
        let source = format!("x = {}1{};", "(".repeat(400), ")".repeat(400));
        let (_, diagnostics) = parse(&source, true);
        assert!(diagnostics.iter().any(|(d, _)| d.id() == "MN1007"));
    }

    #[test]
    fn test_spans_cover_source() {
        let source = "class A { }";
        let root = parse_ok(source);
        assert_eq!(root.span(), TextSpan::new(0, source.len()));
        assert_eq!(root.children()[0].span(), TextSpan::new(0, source.len()));
    }
}
