//! Diagnostics reported by the Mini front end.

use std::fmt;

use crate::diagnostics::{format_message, Diagnostic, DiagnosticSeverity, Location};

/// Identifier prefix of Mini diagnostics.
pub const MINI_DIAGNOSTIC_PREFIX: &str = "MN";

/// Closed set of Mini diagnostics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MiniErrorCode {
    /// A character that starts no token.
    UnexpectedCharacter,
    /// A string literal without closing quote.
    UnterminatedString,
    /// An integer literal outside the `int` range.
    IntegerOverflow,
    /// The parser expected something else.
    UnexpectedToken,
    /// `#r` outside a script.
    ReferenceDirectiveOutsideScript,
    /// A statement at the top level of a regular file.
    TopLevelStatementOutsideScript,
    /// Nesting exceeds what the parser accepts.
    NestingTooDeep,
    /// A name that binds to nothing.
    UndefinedName,
    /// A type name that resolves to nothing.
    TypeNotFound,
    /// A member access that finds nothing.
    MemberNotFound,
    /// No method with the given name takes that many arguments.
    ArgumentCountMismatch,
    /// `break` or `continue` outside a loop.
    NoEnclosingLoop,
    /// Two types with the same full name.
    DuplicateType,
    /// Two members with the same name or signature.
    DuplicateMember,
    /// Assignment to something that is not a variable.
    InvalidAssignmentTarget,
    /// A local declared twice in overlapping scopes.
    DuplicateLocal,
    /// `var` without initializer.
    ImplicitlyTypedWithoutInitializer,
    /// `this` or `base` in a static context.
    InstanceInStaticContext,
    /// No implicit conversion between two types.
    CannotConvert,
}

impl MiniErrorCode {
    /// Numeric part of the identifier.
    #[must_use]
    pub fn number(self) -> u16 {
        match self {
            MiniErrorCode::UnexpectedCharacter => 1001,
            MiniErrorCode::UnterminatedString => 1002,
            MiniErrorCode::IntegerOverflow => 1003,
            MiniErrorCode::UnexpectedToken => 1004,
            MiniErrorCode::ReferenceDirectiveOutsideScript => 1005,
            MiniErrorCode::TopLevelStatementOutsideScript => 1006,
            MiniErrorCode::NestingTooDeep => 1007,
            MiniErrorCode::UndefinedName => 2001,
            MiniErrorCode::TypeNotFound => 2002,
            MiniErrorCode::MemberNotFound => 2003,
            MiniErrorCode::ArgumentCountMismatch => 2004,
            MiniErrorCode::NoEnclosingLoop => 2005,
            MiniErrorCode::DuplicateType => 2006,
            MiniErrorCode::DuplicateMember => 2007,
            MiniErrorCode::InvalidAssignmentTarget => 2008,
            MiniErrorCode::DuplicateLocal => 2009,
            MiniErrorCode::ImplicitlyTypedWithoutInitializer => 2010,
            MiniErrorCode::InstanceInStaticContext => 2011,
            MiniErrorCode::CannotConvert => 2012,
        }
    }

    /// Full identifier, e.g. `MN2001`.
    #[must_use]
    pub fn id(self) -> String {
        format!("{}{:04}", MINI_DIAGNOSTIC_PREFIX, self.number())
    }

    fn message_format(self) -> &'static str {
        match self {
            MiniErrorCode::UnexpectedCharacter => "Unexpected character '{0}'",
            MiniErrorCode::UnterminatedString => "Newline in constant",
            MiniErrorCode::IntegerOverflow => "Integral constant is too large",
            MiniErrorCode::UnexpectedToken => "{0} expected, found '{1}'",
            MiniErrorCode::ReferenceDirectiveOutsideScript => {
                "#r is only allowed in scripts"
            }
            MiniErrorCode::TopLevelStatementOutsideScript => {
                "Top-level statements are only allowed in scripts"
            }
            MiniErrorCode::NestingTooDeep => "Expression or statement is nested too deeply",
            MiniErrorCode::UndefinedName => "The name '{0}' does not exist in the current context",
            MiniErrorCode::TypeNotFound => "The type or namespace name '{0}' could not be found",
            MiniErrorCode::MemberNotFound => "'{0}' does not contain a definition for '{1}'",
            MiniErrorCode::ArgumentCountMismatch => {
                "No overload for method '{0}' takes {1} arguments"
            }
            MiniErrorCode::NoEnclosingLoop => {
                "No enclosing loop out of which to break or continue"
            }
            MiniErrorCode::DuplicateType => {
                "The namespace '{0}' already contains a definition for '{1}'"
            }
            MiniErrorCode::DuplicateMember => "Type '{0}' already defines a member called '{1}'",
            MiniErrorCode::InvalidAssignmentTarget => {
                "The left-hand side of an assignment must be a variable, field or parameter"
            }
            MiniErrorCode::DuplicateLocal => {
                "A local variable named '{0}' is already defined in this scope"
            }
            MiniErrorCode::ImplicitlyTypedWithoutInitializer => {
                "Implicitly-typed variables must be initialized"
            }
            MiniErrorCode::InstanceInStaticContext => {
                "Keyword '{0}' is not valid in a static member"
            }
            MiniErrorCode::CannotConvert => "Cannot implicitly convert type '{0}' to '{1}'",
        }
    }

    /// Builds an error diagnostic at `location`.
    #[must_use]
    pub fn diagnostic(self, location: Location, args: &[&dyn fmt::Display]) -> Diagnostic {
        Diagnostic::new(
            self.id(),
            DiagnosticSeverity::Error,
            format_message(self.message_format(), args),
        )
        .with_location(location)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ids_and_messages() {
        assert_eq!(MiniErrorCode::UndefinedName.id(), "MN2001");
        let d = MiniErrorCode::MemberNotFound.diagnostic(Location::None, &[&"Foo", &"Bar"]);
        assert_eq!(d.message(), "'Foo' does not contain a definition for 'Bar'");
        assert!(d.is_error());
    }
}
