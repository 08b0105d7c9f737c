//! Diagnostic codes produced by the language-neutral core.
//!
//! Language plug-ins define their own identifiers; the core only reports problems
//! with options, references, resources and serialization.

use std::fmt;

use strum::{EnumCount, EnumIter};

use crate::diagnostics::{Diagnostic, DiagnosticSeverity, Location};

/// Identifier prefix of every core diagnostic.
pub const CORE_DIAGNOSTIC_PREFIX: &str = "DC";

/// Closed set of diagnostics the core itself can report.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, EnumIter, EnumCount)]
pub enum ErrorCode {
    /// Public signing combined with delay signing.
    PublicSignWithDelaySign,
    /// Public signing combined with a key container.
    PublicSignWithKeyContainer,
    /// Public signing without any key material.
    PublicSignNoKey,
    /// `AnyCpu32BitPreferred` on a non-application output.
    BadPrefer32OnLibrary,
    /// A main type name on a library.
    NoMainOnLibrary,
    /// Module name is empty or contains invalid characters.
    BadModuleName,
    /// Script class name is empty.
    BadScriptClassName,
    /// File alignment is not one of the accepted section alignments.
    BadFileAlignment,
    /// Subsystem version is not accepted.
    BadSubsystemVersion,
    /// PDB path is not a valid file path.
    BadPdbPath,
    /// Deterministic output was requested without a PDB checksum algorithm.
    MissingPdbChecksumAlgorithm,
    /// Two references resolve to the same assembly identity.
    DuplicateAssemblyIdentity,
    /// No reference provides `System.Object`.
    NoCoreLibrary,
    /// The Win32 resource stream could not be read.
    BadWin32Resource,
    /// A manifest resource could not be read.
    CantReadResource,
    /// Two manifest resources share a name.
    ResourceNotUnique,
    /// Linked resources were supplied while building a module.
    ResourceInModule,
    /// The PE writer failed.
    PeWritingFailure,
    /// The PDB writer failed.
    PdbWritingFailed,
    /// A file named by a permission set attribute could not be read.
    PermissionSetAttributeFileReadError,
    /// The debug entry point is not a method of this compilation.
    DebugEntryPointNotSourceMethodDefinition,
    /// An edited symbol has no counterpart in the baseline.
    EncUpdateMissingSymbol,
    /// An executable has no entry point.
    NoEntryPoint,
    /// An executable has more than one entry point.
    MultipleEntryPoints,
    /// An unused import directive.
    UnusedImport,
    /// A documentation comment is not well-formed XML.
    BadXmlDocComment,
    /// Language version is not supported.
    BadLanguageVersion,
    /// Preprocessor symbol is not an identifier.
    BadPreprocessorSymbol,
    /// A reference directive could not be resolved.
    MetadataFileNotFound,
    /// The strong-name provider failed to sign the output.
    SigningFailed,
    /// Code generation needs a core library member that is not available.
    MissingPredefinedMember,
}

impl ErrorCode {
    /// Numeric part of the diagnostic identifier.
    #[must_use]
    pub fn number(self) -> u16 {
        match self {
            ErrorCode::PublicSignWithDelaySign => 1,
            ErrorCode::PublicSignWithKeyContainer => 2,
            ErrorCode::PublicSignNoKey => 3,
            ErrorCode::BadPrefer32OnLibrary => 4,
            ErrorCode::NoMainOnLibrary => 5,
            ErrorCode::BadModuleName => 6,
            ErrorCode::BadScriptClassName => 7,
            ErrorCode::BadFileAlignment => 8,
            ErrorCode::BadSubsystemVersion => 9,
            ErrorCode::BadPdbPath => 10,
            ErrorCode::MissingPdbChecksumAlgorithm => 11,
            ErrorCode::DuplicateAssemblyIdentity => 12,
            ErrorCode::NoCoreLibrary => 13,
            ErrorCode::BadWin32Resource => 14,
            ErrorCode::CantReadResource => 15,
            ErrorCode::ResourceNotUnique => 16,
            ErrorCode::ResourceInModule => 17,
            ErrorCode::PeWritingFailure => 18,
            ErrorCode::PdbWritingFailed => 19,
            ErrorCode::PermissionSetAttributeFileReadError => 20,
            ErrorCode::DebugEntryPointNotSourceMethodDefinition => 21,
            ErrorCode::EncUpdateMissingSymbol => 22,
            ErrorCode::NoEntryPoint => 23,
            ErrorCode::MultipleEntryPoints => 24,
            ErrorCode::UnusedImport => 25,
            ErrorCode::BadXmlDocComment => 26,
            ErrorCode::BadLanguageVersion => 27,
            ErrorCode::BadPreprocessorSymbol => 28,
            ErrorCode::MetadataFileNotFound => 29,
            ErrorCode::SigningFailed => 30,
            ErrorCode::MissingPredefinedMember => 31,
        }
    }

    /// Full identifier, e.g. `DC0014`.
    #[must_use]
    pub fn id(self) -> String {
        format!("{}{:04}", CORE_DIAGNOSTIC_PREFIX, self.number())
    }

    /// Severity before any option-driven filtering.
    #[must_use]
    pub fn default_severity(self) -> DiagnosticSeverity {
        match self {
            ErrorCode::UnusedImport => DiagnosticSeverity::Hidden,
            ErrorCode::NoCoreLibrary | ErrorCode::BadXmlDocComment => DiagnosticSeverity::Warning,
            _ => DiagnosticSeverity::Error,
        }
    }

    /// Warning level at which a warning is reported; 0 for non-warnings.
    #[must_use]
    pub fn warning_level(self) -> u8 {
        match self.default_severity() {
            DiagnosticSeverity::Warning => 1,
            _ => 0,
        }
    }

    /// Message template with positional `{0}`, `{1}`, ... placeholders.
    #[must_use]
    pub fn message_format(self) -> &'static str {
        match self {
            ErrorCode::PublicSignWithDelaySign => {
                "Public signing and delay signing cannot be combined"
            }
            ErrorCode::PublicSignWithKeyContainer => {
                "Public signing is not supported with a key container"
            }
            ErrorCode::PublicSignNoKey => {
                "Public signing was requested but no public key was specified"
            }
            ErrorCode::BadPrefer32OnLibrary => {
                "AnyCpu32BitPreferred can only be used with executable output"
            }
            ErrorCode::NoMainOnLibrary => "Cannot specify a main type when building a library",
            ErrorCode::BadModuleName => "Invalid module name: {0}",
            ErrorCode::BadScriptClassName => "Invalid script class name '{0}'",
            ErrorCode::BadFileAlignment => "Invalid file section alignment '{0}'",
            ErrorCode::BadSubsystemVersion => "Invalid subsystem version '{0}'",
            ErrorCode::BadPdbPath => "Invalid debug information file path '{0}'",
            ErrorCode::MissingPdbChecksumAlgorithm => {
                "A PDB checksum algorithm is required for deterministic output"
            }
            ErrorCode::DuplicateAssemblyIdentity => {
                "Multiple assemblies with equivalent identity have been imported: '{0}'"
            }
            ErrorCode::NoCoreLibrary => {
                "No referenced assembly defines 'System.Object'; predefined types are unavailable"
            }
            ErrorCode::BadWin32Resource => "Error reading Win32 resources -- {0}",
            ErrorCode::CantReadResource => "Error reading resource '{0}' -- '{1}'",
            ErrorCode::ResourceNotUnique => {
                "Resource identifier '{0}' has already been used in this assembly"
            }
            ErrorCode::ResourceInModule => "Cannot link resource files when building a module",
            ErrorCode::PeWritingFailure => "An error occurred while writing the output file: {0}",
            ErrorCode::PdbWritingFailed => "Failed to emit debug information: {0}",
            ErrorCode::PermissionSetAttributeFileReadError => {
                "Error reading file '{0}' specified for the named argument '{1}' for PermissionSet attribute: '{2}'"
            }
            ErrorCode::DebugEntryPointNotSourceMethodDefinition => {
                "Debug entry point must be a definition of a method declared in the current compilation"
            }
            ErrorCode::EncUpdateMissingSymbol => {
                "Cannot update '{0}'; it was not found in the baseline"
            }
            ErrorCode::NoEntryPoint => {
                "Program does not contain a static 'Main' method suitable for an entry point"
            }
            ErrorCode::MultipleEntryPoints => "Program has more than one entry point defined: '{0}'",
            ErrorCode::UnusedImport => "Unnecessary using directive",
            ErrorCode::BadXmlDocComment => "XML comment has badly formed XML -- '{0}'",
            ErrorCode::BadLanguageVersion => "Invalid language version '{0}'",
            ErrorCode::BadPreprocessorSymbol => {
                "Invalid name for a preprocessing symbol; '{0}' is not a valid identifier"
            }
            ErrorCode::MetadataFileNotFound => "Metadata file '{0}' could not be found",
            ErrorCode::SigningFailed => "Cryptographic failure while signing assembly -- '{0}'",
            ErrorCode::MissingPredefinedMember => "Missing compiler required member '{0}.{1}'",
        }
    }

    /// Builds a diagnostic for this code at `location`.
    #[must_use]
    pub fn diagnostic(self, location: Location, args: &[&dyn fmt::Display]) -> Diagnostic {
        Diagnostic::new(
            self.id(),
            self.default_severity(),
            format_message(self.message_format(), args),
        )
        .with_warning_level(self.warning_level())
        .with_location(location)
    }

    /// Builds a location-less diagnostic for this code.
    #[must_use]
    pub fn at_none(self, args: &[&dyn fmt::Display]) -> Diagnostic {
        self.diagnostic(Location::None, args)
    }
}

/// Substitutes `{N}` placeholders in `template` with the matching argument.
///
/// Placeholders without a matching argument are left untouched.
#[must_use]
pub fn format_message(template: &str, args: &[&dyn fmt::Display]) -> String {
    let mut out = String::with_capacity(template.len());
    let mut rest = template;
    while let Some(open) = rest.find('{') {
        out.push_str(&rest[..open]);
        let tail = &rest[open + 1..];
        let parsed = tail.find('}').and_then(|close| {
            tail[..close]
                .parse::<usize>()
                .ok()
                .and_then(|index| args.get(index))
                .map(|arg| (close, arg))
        });
        match parsed {
            Some((close, arg)) => {
                out.push_str(&arg.to_string());
                rest = &tail[close + 1..];
            }
            None => {
                out.push('{');
                rest = tail;
            }
        }
    }
    out.push_str(rest);
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;
    use strum::IntoEnumIterator;

    #[test]
    fn test_ids_are_unique() {
        let ids: HashSet<_> = ErrorCode::iter().map(ErrorCode::id).collect();
        assert_eq!(ids.len(), ErrorCode::COUNT);
        assert_eq!(ErrorCode::BadWin32Resource.id(), "DC0014");
    }

    #[test]
    fn test_format_message() {
        assert_eq!(
            format_message("Error reading resource '{0}' -- '{1}'", &[&"a.txt", &42]),
            "Error reading resource 'a.txt' -- '42'"
        );
        assert_eq!(format_message("{x} {5}", &[&1]), "{x} {5}");
    }
}
