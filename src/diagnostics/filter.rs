//! Option-driven diagnostic filtering.
//!
//! Filtering decides, per diagnostic, whether it is reported, at what severity, and
//! whether a warning becomes an error. The inputs are, in order of precedence:
//!
//! 1. per-tree options attached to the diagnostic's [`crate::syntax::SyntaxTree`]
//! 2. [`crate::options::CompilationOptions::specific_diagnostic_options`]
//! 3. the warning level gate
//! 4. [`crate::options::CompilationOptions::general_diagnostic_option`] (warnings only)
//!
//! Errors that were errors to begin with are never filtered.

use crate::{
    diagnostics::{Diagnostic, DiagnosticSeverity},
    options::CompilationOptions,
};

/// How a diagnostic should be reported.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub enum ReportDiagnostic {
    /// Use the diagnostic's own severity.
    #[default]
    Default,
    /// Report as an error.
    Error,
    /// Report as a warning.
    Warn,
    /// Report as information.
    Info,
    /// Report as hidden.
    Hidden,
    /// Do not report.
    Suppress,
}

impl ReportDiagnostic {
    /// Stable name used by the deterministic key.
    #[must_use]
    pub fn name(self) -> &'static str {
        match self {
            ReportDiagnostic::Default => "default",
            ReportDiagnostic::Error => "error",
            ReportDiagnostic::Warn => "warn",
            ReportDiagnostic::Info => "info",
            ReportDiagnostic::Hidden => "hidden",
            ReportDiagnostic::Suppress => "suppress",
        }
    }
}

/// Applies `options` to `diagnostic`.
///
/// Returns `None` if the diagnostic is dropped, otherwise the diagnostic with its
/// effective severity. Suppressed diagnostics survive, marked as suppressed, when
/// [`CompilationOptions::report_suppressed_diagnostics`] is set.
///
/// # Examples
///
/// ```rust
/// use dotcompile::diagnostics::{filter_diagnostic, Diagnostic, DiagnosticSeverity, ReportDiagnostic};
/// use dotcompile::options::{CompilationOptions, OutputKind};
///
/// let options = CompilationOptions::new(OutputKind::DynamicallyLinkedLibrary)
///     .with_general_diagnostic_option(ReportDiagnostic::Error);
/// let warning = Diagnostic::new("W1", DiagnosticSeverity::Warning, "careful");
///
/// let filtered = filter_diagnostic(&warning, &options).unwrap();
/// assert!(filtered.is_error());
/// assert!(filtered.is_warning_as_error());
/// ```
#[must_use]
pub fn filter_diagnostic(diagnostic: &Diagnostic, options: &CompilationOptions) -> Option<Diagnostic> {
    if diagnostic.default_severity() == DiagnosticSeverity::Error {
        return Some(diagnostic.clone());
    }

    let tree_option = diagnostic
        .location()
        .source_tree()
        .and_then(|tree| tree.diagnostic_option(diagnostic.id()));
    let specific = tree_option.or_else(|| {
        options
            .specific_diagnostic_options()
            .get(diagnostic.id())
            .copied()
    });

    let report = match specific {
        Some(report) => report,
        None if diagnostic.default_severity() == DiagnosticSeverity::Warning => {
            if u32::from(diagnostic.warning_level()) > options.warning_level() {
                ReportDiagnostic::Suppress
            } else {
                match options.general_diagnostic_option() {
                    ReportDiagnostic::Error => ReportDiagnostic::Error,
                    ReportDiagnostic::Suppress => ReportDiagnostic::Suppress,
                    _ => ReportDiagnostic::Default,
                }
            }
        }
        None => ReportDiagnostic::Default,
    };

    match report {
        ReportDiagnostic::Default => Some(diagnostic.clone()),
        ReportDiagnostic::Suppress => options
            .report_suppressed_diagnostics()
            .then(|| diagnostic.clone().with_suppressed()),
        ReportDiagnostic::Error => Some(diagnostic.clone().with_severity(DiagnosticSeverity::Error)),
        ReportDiagnostic::Warn => Some(diagnostic.clone().with_severity(DiagnosticSeverity::Warning)),
        ReportDiagnostic::Info => Some(diagnostic.clone().with_severity(DiagnosticSeverity::Info)),
        ReportDiagnostic::Hidden => Some(diagnostic.clone().with_severity(DiagnosticSeverity::Hidden)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::options::OutputKind;
    use std::collections::BTreeMap;

    fn warning(level: u8) -> Diagnostic {
        Diagnostic::new("W100", DiagnosticSeverity::Warning, "w").with_warning_level(level)
    }

    #[test]
    fn test_errors_are_not_filtered() {
        let mut specific = BTreeMap::new();
        specific.insert("E1".to_string(), ReportDiagnostic::Suppress);
        let options = CompilationOptions::new(OutputKind::DynamicallyLinkedLibrary)
            .with_specific_diagnostic_options(specific);
        let error = Diagnostic::new("E1", DiagnosticSeverity::Error, "e");
        assert_eq!(filter_diagnostic(&error, &options), Some(error));
    }

    #[test]
    fn test_warning_level_gate() {
        let options =
            CompilationOptions::new(OutputKind::DynamicallyLinkedLibrary).with_warning_level(2);
        assert!(filter_diagnostic(&warning(2), &options).is_some());
        assert!(filter_diagnostic(&warning(3), &options).is_none());
    }

    #[test]
    fn test_specific_option_wins_over_general() {
        let mut specific = BTreeMap::new();
        specific.insert("W100".to_string(), ReportDiagnostic::Info);
        let options = CompilationOptions::new(OutputKind::DynamicallyLinkedLibrary)
            .with_general_diagnostic_option(ReportDiagnostic::Error)
            .with_specific_diagnostic_options(specific);

        let filtered = filter_diagnostic(&warning(1), &options).unwrap();
        assert_eq!(filtered.severity(), DiagnosticSeverity::Info);
    }

    #[test]
    fn test_report_suppressed() {
        let options = CompilationOptions::new(OutputKind::DynamicallyLinkedLibrary)
            .with_general_diagnostic_option(ReportDiagnostic::Suppress)
            .with_report_suppressed_diagnostics(true);
        let filtered = filter_diagnostic(&warning(1), &options).unwrap();
        assert!(filtered.is_suppressed());
    }
}
