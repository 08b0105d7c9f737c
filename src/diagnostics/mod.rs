//! Diagnostics produced while compiling and emitting.
//!
//! Diagnostics are the recoverable, user-facing error channel: problems with the
//! program text, the requested options, references or resources. They accumulate in a
//! [`DiagnosticBag`], are filtered and escalated according to
//! [`crate::options::CompilationOptions`], and are returned to the caller as values.
//! Caller bugs go through [`crate::Error`] instead.
//!
//! # Key Components
//!
//! - [`Diagnostic`] - A single diagnostic with identifier, severity, message and location
//! - [`DiagnosticSeverity`] - `Hidden < Info < Warning < Error`
//! - [`Location`] - Where a diagnostic applies
//! - [`DiagnosticBag`] - Thread-safe, append-only, order-preserving container
//! - [`ErrorCode`] - Diagnostics reported by the language-neutral core
//! - [`filter_diagnostic`] - Applies suppression and warning-as-error rules
//!
//! # Usage Examples
//!
//! ```rust
//! use dotcompile::diagnostics::{DiagnosticBag, ErrorCode};
//!
//! let bag = DiagnosticBag::new();
//! bag.add(ErrorCode::BadFileAlignment.at_none(&[&"123"]));
//! assert!(bag.has_any_errors());
//! assert_eq!(bag.to_vec()[0].id(), "DC0008");
//! ```
//!
//! # Thread Safety
//!
//! [`DiagnosticBag`] uses `boxcar::Vec` internally, which provides lock-free concurrent
//! append. Iteration yields entries in the order their slots were claimed, so a bag
//! filled by a single thread keeps exact input order.

mod codes;
mod filter;

pub use codes::{format_message, ErrorCode, CORE_DIAGNOSTIC_PREFIX};
pub use filter::{filter_diagnostic, ReportDiagnostic};

use std::fmt;

use crate::syntax::{SyntaxTree, TextSpan};

/// Severity level of a diagnostic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum DiagnosticSeverity {
    /// Not shown to users by default; used for IDE hints such as unused imports.
    Hidden,
    /// Informational message.
    Info,
    /// Something suspicious that does not prevent output.
    Warning,
    /// Prevents successful emission.
    Error,
}

impl fmt::Display for DiagnosticSeverity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DiagnosticSeverity::Hidden => write!(f, "hidden"),
            DiagnosticSeverity::Info => write!(f, "info"),
            DiagnosticSeverity::Warning => write!(f, "warning"),
            DiagnosticSeverity::Error => write!(f, "error"),
        }
    }
}

/// Where a diagnostic applies.
#[derive(Debug, Clone, Default)]
pub enum Location {
    /// No meaningful location (options, emit streams).
    #[default]
    None,
    /// A span within a syntax tree.
    Source {
        /// Tree containing the span
        tree: SyntaxTree,
        /// The span
        span: TextSpan,
    },
    /// Inside a referenced assembly.
    Metadata {
        /// Display name of the assembly
        assembly: String,
    },
}

impl Location {
    /// Creates a source location.
    #[must_use]
    pub fn source(tree: &SyntaxTree, span: TextSpan) -> Self {
        Location::Source {
            tree: tree.clone(),
            span,
        }
    }

    /// Returns the tree if this is a source location.
    #[must_use]
    pub fn source_tree(&self) -> Option<&SyntaxTree> {
        match self {
            Location::Source { tree, .. } => Some(tree),
            _ => None,
        }
    }

    /// Returns the span if this is a source location.
    #[must_use]
    pub fn source_span(&self) -> Option<TextSpan> {
        match self {
            Location::Source { span, .. } => Some(*span),
            _ => None,
        }
    }
}

impl PartialEq for Location {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Location::None, Location::None) => true,
            (
                Location::Source { tree: a, span: sa },
                Location::Source { tree: b, span: sb },
            ) => a == b && sa == sb,
            (Location::Metadata { assembly: a }, Location::Metadata { assembly: b }) => a == b,
            _ => false,
        }
    }
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Location::None => Ok(()),
            Location::Source { tree, span } => {
                let (line, column) = tree.text().line_position(span.start);
                write!(f, "{}({},{})", tree.file_path(), line + 1, column + 1)
            }
            Location::Metadata { assembly } => write!(f, "{assembly}"),
        }
    }
}

/// A single diagnostic.
#[derive(Debug, Clone, PartialEq)]
pub struct Diagnostic {
    id: String,
    severity: DiagnosticSeverity,
    default_severity: DiagnosticSeverity,
    warning_level: u8,
    is_warning_as_error: bool,
    is_suppressed: bool,
    message: String,
    location: Location,
}

impl Diagnostic {
    /// Creates a diagnostic with no location.
    ///
    /// # Arguments
    ///
    /// * `id` - Stable identifier, e.g. `DC0014`
    /// * `severity` - Default severity
    /// * `message` - Formatted message
    pub fn new(
        id: impl Into<String>,
        severity: DiagnosticSeverity,
        message: impl Into<String>,
    ) -> Self {
        Diagnostic {
            id: id.into(),
            severity,
            default_severity: severity,
            warning_level: u8::from(severity == DiagnosticSeverity::Warning),
            is_warning_as_error: false,
            is_suppressed: false,
            message: message.into(),
            location: Location::None,
        }
    }

    /// Attaches a location.
    #[must_use]
    pub fn with_location(mut self, location: Location) -> Self {
        self.location = location;
        self
    }

    /// Sets the warning level; only meaningful for warnings.
    #[must_use]
    pub fn with_warning_level(mut self, level: u8) -> Self {
        self.warning_level = level;
        self
    }

    /// Returns a copy with a different effective severity.
    #[must_use]
    pub fn with_severity(mut self, severity: DiagnosticSeverity) -> Self {
        self.is_warning_as_error = severity == DiagnosticSeverity::Error
            && self.default_severity == DiagnosticSeverity::Warning;
        self.severity = severity;
        self
    }

    /// Returns a copy marked as suppressed.
    #[must_use]
    pub fn with_suppressed(mut self) -> Self {
        self.is_suppressed = true;
        self
    }

    /// Stable identifier.
    #[must_use]
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Effective severity after filtering.
    #[must_use]
    pub fn severity(&self) -> DiagnosticSeverity {
        self.severity
    }

    /// Severity before filtering.
    #[must_use]
    pub fn default_severity(&self) -> DiagnosticSeverity {
        self.default_severity
    }

    /// Warning level (1 is most severe); 0 for non-warnings.
    #[must_use]
    pub fn warning_level(&self) -> u8 {
        self.warning_level
    }

    /// `true` if a warning was escalated to an error by options.
    #[must_use]
    pub fn is_warning_as_error(&self) -> bool {
        self.is_warning_as_error
    }

    /// `true` if the diagnostic was suppressed but still reported.
    #[must_use]
    pub fn is_suppressed(&self) -> bool {
        self.is_suppressed
    }

    /// `true` if this diagnostic prevents emission.
    #[must_use]
    pub fn is_error(&self) -> bool {
        self.severity == DiagnosticSeverity::Error && !self.is_suppressed
    }

    /// The formatted message.
    #[must_use]
    pub fn message(&self) -> &str {
        &self.message
    }

    /// Where the diagnostic applies.
    #[must_use]
    pub fn location(&self) -> &Location {
        &self.location
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if !matches!(self.location, Location::None) {
            write!(f, "{}: ", self.location)?;
        }
        write!(f, "{} {}: {}", self.severity, self.id, self.message)
    }
}

/// Thread-safe container for collecting diagnostics.
///
/// Uses `boxcar::Vec` internally for lock-free concurrent append operations. Entries
/// are never removed; iteration follows insertion order.
#[derive(Debug, Default)]
pub struct DiagnosticBag {
    entries: boxcar::Vec<Diagnostic>,
}

impl DiagnosticBag {
    /// Creates a new empty bag.
    #[must_use]
    pub fn new() -> Self {
        DiagnosticBag {
            entries: boxcar::Vec::new(),
        }
    }

    /// Adds a diagnostic.
    pub fn add(&self, diagnostic: Diagnostic) {
        self.entries.push(diagnostic);
    }

    /// Adds every diagnostic in `diagnostics`, preserving order.
    pub fn extend(&self, diagnostics: impl IntoIterator<Item = Diagnostic>) {
        for diagnostic in diagnostics {
            self.entries.push(diagnostic);
        }
    }

    /// Returns true if no diagnostics have been collected.
    pub fn is_empty(&self) -> bool {
        self.entries.count() == 0
    }

    /// Returns the total number of diagnostics.
    pub fn count(&self) -> usize {
        self.entries.count()
    }

    /// Returns true if any diagnostic is an (unsuppressed) error.
    pub fn has_any_errors(&self) -> bool {
        self.entries.iter().any(|(_, d)| d.is_error())
    }

    /// Returns an iterator over all diagnostics in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = &Diagnostic> {
        self.entries.iter().map(|(_, d)| d)
    }

    /// Clones the contents into a vector.
    pub fn to_vec(&self) -> Vec<Diagnostic> {
        self.iter().cloned().collect()
    }

    /// Filters `incoming` with [`filter_diagnostic`] and appends the survivors.
    ///
    /// Returns `false` if any surviving diagnostic is an error.
    pub fn filter_and_append(
        &self,
        incoming: impl IntoIterator<Item = Diagnostic>,
        options: &crate::options::CompilationOptions,
    ) -> bool {
        let mut has_error = false;
        for diagnostic in incoming {
            if let Some(filtered) = filter_diagnostic(&diagnostic, options) {
                has_error |= filtered.is_error();
                self.add(filtered);
            }
        }
        !has_error
    }
}

impl fmt::Display for DiagnosticBag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for diagnostic in self.iter() {
            writeln!(f, "{diagnostic}")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn test_bag_preserves_order() {
        let bag = DiagnosticBag::new();
        bag.add(Diagnostic::new("X1", DiagnosticSeverity::Warning, "first"));
        bag.add(Diagnostic::new("X2", DiagnosticSeverity::Error, "second"));
        bag.add(Diagnostic::new("X3", DiagnosticSeverity::Info, "third"));

        let ids: Vec<_> = bag.iter().map(|d| d.id().to_string()).collect();
        assert_eq!(ids, ["X1", "X2", "X3"]);
        assert!(bag.has_any_errors());
    }

    #[test]
    fn test_suppressed_error_is_not_error() {
        let d = Diagnostic::new("X1", DiagnosticSeverity::Error, "msg").with_suppressed();
        assert!(!d.is_error());
    }

    #[test]
    fn test_bag_concurrent_append() {
        let bag = Arc::new(DiagnosticBag::new());
        let handles: Vec<_> = (0..4)
            .map(|i| {
                let bag = Arc::clone(&bag);
                std::thread::spawn(move || {
                    for j in 0..25 {
                        bag.add(Diagnostic::new(
                            format!("T{i}"),
                            DiagnosticSeverity::Info,
                            j.to_string(),
                        ));
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }
        assert_eq!(bag.count(), 100);
    }

    #[test]
    fn test_display_without_location() {
        let d = ErrorCode::BadFileAlignment.at_none(&[&"3"]);
        assert_eq!(
            d.to_string(),
            "error DC0008: Invalid file section alignment '3'"
        );
    }
}
