//! Mini lexer.

use std::str::FromStr;

use strum::{AsRefStr, EnumString};

use crate::{
    diagnostics::{Diagnostic, Location},
    lang::codes::MiniErrorCode,
    syntax::TextSpan,
};

/// Reserved words.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, EnumString, AsRefStr)]
#[strum(serialize_all = "lowercase")]
pub enum Keyword {
    /// `using`
    Using,
    /// `namespace`
    Namespace,
    /// `class`
    Class,
    /// `public`
    Public,
    /// `private`
    Private,
    /// `internal`
    Internal,
    /// `protected`
    Protected,
    /// `static`
    Static,
    /// `virtual`
    Virtual,
    /// `abstract`
    Abstract,
    /// `sealed`
    Sealed,
    /// `override`
    Override,
    /// `void`
    Void,
    /// `int`
    Int,
    /// `bool`
    Bool,
    /// `string`
    String,
    /// `object`
    Object,
    /// `var`
    Var,
    /// `if`
    If,
    /// `else`
    Else,
    /// `while`
    While,
    /// `do`
    Do,
    /// `return`
    Return,
    /// `throw`
    Throw,
    /// `break`
    Break,
    /// `continue`
    Continue,
    /// `new`
    New,
    /// `this`
    This,
    /// `base`
    Base,
    /// `true`
    True,
    /// `false`
    False,
    /// `null`
    Null,
}

impl Keyword {
    /// Declaration modifiers.
    #[must_use]
    pub fn is_modifier(self) -> bool {
        matches!(
            self,
            Keyword::Public
                | Keyword::Private
                | Keyword::Internal
                | Keyword::Protected
                | Keyword::Static
                | Keyword::Virtual
                | Keyword::Abstract
                | Keyword::Sealed
                | Keyword::Override
        )
    }

    /// Keywords naming a predefined type.
    #[must_use]
    pub fn is_predefined_type(self) -> bool {
        matches!(
            self,
            Keyword::Void | Keyword::Int | Keyword::Bool | Keyword::String | Keyword::Object
        )
    }
}

/// Token kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenKind {
    /// An identifier.
    Identifier,
    /// A keyword.
    Keyword(Keyword),
    /// An integer literal.
    Integer,
    /// A string literal.
    String,
    /// Punctuation or operator; the token text says which.
    Punctuation,
    /// A `///` line.
    DocComment,
    /// `#r`
    ReferenceDirective,
    /// End of input.
    EndOfFile,
}

/// A token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Token {
    /// Kind
    pub kind: TokenKind,
    /// Source span
    pub span: TextSpan,
    /// Source text; the unescaped value for strings, the comment body for doc comments
    pub text: String,
}

impl Token {
    fn new(kind: TokenKind, span: TextSpan, text: impl Into<String>) -> Self {
        Token {
            kind,
            span,
            text: text.into(),
        }
    }

    /// `true` for punctuation `text`.
    #[must_use]
    pub fn is_punctuation(&self, text: &str) -> bool {
        self.kind == TokenKind::Punctuation && self.text == text
    }

    /// `true` for keyword `keyword`.
    #[must_use]
    pub fn is_keyword(&self, keyword: Keyword) -> bool {
        self.kind == TokenKind::Keyword(keyword)
    }
}

const PUNCTUATION: &[&str] = &[
    "==", "!=", "<=", ">=", "&&", "||", "++", "--", "+=", "-=", "*=", "/=", "+", "-", "*", "/",
    "%", "<", ">", "=", "!", "(", ")", "{", "}", "[", "]", ";", ",", ".", ":",
];

fn is_identifier_head(character: char) -> bool {
    character.is_ascii_alphabetic() || character == '_'
}

fn is_identifier_body(character: char) -> bool {
    character.is_ascii_alphanumeric() || character == '_'
}

/// Splits `source` into tokens. The result always ends with an end-of-file token;
/// lexical errors are reported with their spans and the offending text skipped.
pub fn lex(source: &str) -> (Vec<Token>, Vec<(Diagnostic, TextSpan)>) {
    let mut tokens = Vec::new();
    let mut diagnostics = Vec::new();
    let mut index = 0;

    while index < source.len() {
        let rest = &source[index..];
        let Some(character) = rest.chars().next() else {
            break;
        };

        if character.is_whitespace() {
            index += character.len_utf8();
        } else if rest.starts_with("///") {
            let end = rest.find('\n').map_or(source.len(), |n| index + n);
            let body = source[index + 3..end].trim_end_matches('\r');
            let body = body.strip_prefix(' ').unwrap_or(body);
            tokens.push(Token::new(
                TokenKind::DocComment,
                TextSpan::from_bounds(index, end),
                body,
            ));
            index = end;
        } else if rest.starts_with("//") {
            index = rest.find('\n').map_or(source.len(), |n| index + n);
        } else if rest.starts_with("/*") {
            index = rest[2..].find("*/").map_or(source.len(), |n| index + 2 + n + 2);
        } else if rest.starts_with("#r") {
            tokens.push(Token::new(
                TokenKind::ReferenceDirective,
                TextSpan::new(index, 2),
                "#r",
            ));
            index += 2;
        } else if is_identifier_head(character) {
            let len = rest
                .find(|c: char| !is_identifier_body(c))
                .unwrap_or(rest.len());
            let word = &rest[..len];
            let kind = match Keyword::from_str(word) {
                Ok(keyword) => TokenKind::Keyword(keyword),
                Err(_) => TokenKind::Identifier,
            };
            tokens.push(Token::new(kind, TextSpan::new(index, len), word));
            index += len;
        } else if character.is_ascii_digit() {
            let len = rest
                .find(|c: char| !c.is_ascii_digit())
                .unwrap_or(rest.len());
            let span = TextSpan::new(index, len);
            if rest[..len].parse::<i32>().is_err() {
                diagnostics.push((
                    MiniErrorCode::IntegerOverflow.diagnostic(Location::None, &[]),
                    span,
                ));
            }
            tokens.push(Token::new(TokenKind::Integer, span, &rest[..len]));
            index += len;
        } else if character == '"' {
            let (value, len, terminated) = lex_string(&rest[1..]);
            let span = TextSpan::new(index, len + 1);
            if !terminated {
                diagnostics.push((
                    MiniErrorCode::UnterminatedString.diagnostic(Location::None, &[]),
                    span,
                ));
            }
            tokens.push(Token::new(TokenKind::String, span, value));
            index += len + 1;
        } else if let Some(punctuation) = PUNCTUATION.iter().find(|p| rest.starts_with(**p)) {
            tokens.push(Token::new(
                TokenKind::Punctuation,
                TextSpan::new(index, punctuation.len()),
                *punctuation,
            ));
            index += punctuation.len();
        } else {
            let span = TextSpan::new(index, character.len_utf8());
            diagnostics.push((
                MiniErrorCode::UnexpectedCharacter.diagnostic(Location::None, &[&character]),
                span,
            ));
            index += character.len_utf8();
        }
    }

    tokens.push(Token::new(
        TokenKind::EndOfFile,
        TextSpan::new(source.len(), 0),
        "",
    ));
    (tokens, diagnostics)
}

/// Lexes a string body after the opening quote. Returns the unescaped value, the
/// number of bytes consumed (closing quote included) and whether it was closed.
fn lex_string(body: &str) -> (String, usize, bool) {
    let mut value = String::new();
    let mut characters = body.char_indices();
    while let Some((offset, character)) = characters.next() {
        match character {
            '"' => return (value, offset + 1, true),
            '\n' => return (value, offset, false),
            '\\' => match characters.next() {
                Some((_, 'n')) => value.push('\n'),
                Some((_, 't')) => value.push('\t'),
                Some((_, '0')) => value.push('\0'),
                Some((_, escaped)) => value.push(escaped),
                None => return (value, body.len(), false),
            },
            _ => value.push(character),
        }
    }
    (value, body.len(), false)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(source: &str) -> Vec<TokenKind> {
        lex(source).0.into_iter().map(|t| t.kind).collect()
    }

    #[test]
    fn test_keywords_and_identifiers() {
        assert_eq!(
            kinds("class Foo"),
            [
                TokenKind::Keyword(Keyword::Class),
                TokenKind::Identifier,
                TokenKind::EndOfFile
            ]
        );
        assert_eq!(Keyword::Namespace.as_ref(), "namespace");
    }

    #[test]
    fn test_spans() {
        let (tokens, diagnostics) = lex("int x = 42;");
        assert!(diagnostics.is_empty());
        assert_eq!(tokens[0].span, TextSpan::new(0, 3));
        assert_eq!(tokens[1].span, TextSpan::new(4, 1));
        assert_eq!(tokens[2].span, TextSpan::new(6, 1));
        assert_eq!(tokens[3].span, TextSpan::new(8, 2));
        assert_eq!(tokens[3].text, "42");
    }

    #[test]
    fn test_longest_operator_wins() {
        let (tokens, _) = lex("a += b == c");
        assert!(tokens[1].is_punctuation("+="));
        assert!(tokens[3].is_punctuation("=="));
    }

    #[test]
    fn test_comments() {
        let (tokens, _) = lex("/// <summary>Hi</summary>\n// plain\n/* block */ class");
        assert_eq!(tokens[0].kind, TokenKind::DocComment);
        assert_eq!(tokens[0].text, "<summary>Hi</summary>");
        assert!(tokens[1].is_keyword(Keyword::Class));
    }

    #[test]
    fn test_strings() {
        let (tokens, diagnostics) = lex(r#""a\"b\n""#);
        assert!(diagnostics.is_empty());
        assert_eq!(tokens[0].text, "a\"b\n");
        assert_eq!(tokens[0].span.len, 8);

        let (_, diagnostics) = lex("\"open\nclass");
        assert_eq!(diagnostics.len(), 1);
        assert_eq!(diagnostics[0].0.id(), "MN1002");
    }

    #[test]
    fn test_errors_are_skipped() {
        let (tokens, diagnostics) = lex("a @ b 99999999999");
        assert_eq!(diagnostics.len(), 2);
        assert_eq!(diagnostics[0].1, TextSpan::new(2, 1));
        assert_eq!(tokens.len(), 4);
    }

    #[test]
    fn test_reference_directive() {
        assert_eq!(
            kinds("#r \"lib.dll\""),
            [
                TokenKind::ReferenceDirective,
                TokenKind::String,
                TokenKind::EndOfFile
            ]
        );
    }
}
