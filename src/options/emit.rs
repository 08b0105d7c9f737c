//! Options that affect serialization only.

use std::fmt;

use crate::{
    diagnostics::{Diagnostic, ErrorCode},
    options::{compilation::is_valid_file_name, DebugInformationFormat, InstrumentationKind},
    syntax::SourceHashAlgorithm,
};

/// Section alignments accepted for PE files.
pub const VALID_FILE_ALIGNMENTS: [u32; 5] = [512, 1024, 2048, 4096, 8192];

/// Subsystem version written to the optional header.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct SubsystemVersion {
    /// Major version
    pub major: u16,
    /// Minor version
    pub minor: u16,
}

impl SubsystemVersion {
    /// Creates a version.
    #[must_use]
    pub fn new(major: u16, minor: u16) -> Self {
        SubsystemVersion { major, minor }
    }

    /// `(0, 0)` means "use the default for the target".
    #[must_use]
    pub fn is_none(&self) -> bool {
        self.major == 0 && self.minor == 0
    }

    /// Default version for the target: 6.02 for Windows Runtime apps, otherwise 4.00.
    #[must_use]
    pub fn default_for(output_kind: crate::options::OutputKind) -> Self {
        if output_kind == crate::options::OutputKind::WindowsRuntimeApplication {
            SubsystemVersion::new(6, 2)
        } else {
            SubsystemVersion::new(4, 0)
        }
    }

    /// `true` for versions the loader accepts.
    #[must_use]
    pub fn is_valid(&self) -> bool {
        self.is_none() || (self.major, self.minor) >= (4, 0)
    }
}

impl fmt::Display for SubsystemVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{:02}", self.major, self.minor)
    }
}

/// Serialization options.
///
/// Plain value type: equality and hashing are derived field by field.
///
/// # Examples
///
/// ```rust
/// use dotcompile::options::EmitOptions;
///
/// let options = EmitOptions::default().with_file_alignment(1000);
/// let mut diagnostics = Vec::new();
/// options.validate(&mut diagnostics, false);
/// assert_eq!(diagnostics.len(), 1);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct EmitOptions {
    emit_metadata_only: bool,
    tolerate_errors: bool,
    include_private_members: bool,
    subsystem_version: SubsystemVersion,
    file_alignment: u32,
    high_entropy_virtual_address_space: bool,
    base_address: u64,
    debug_information_format: DebugInformationFormat,
    output_name_override: Option<String>,
    pdb_file_path: Option<String>,
    pdb_checksum_algorithm: Option<SourceHashAlgorithm>,
    runtime_metadata_version: Option<String>,
    instrumentation_kinds: Vec<InstrumentationKind>,
}

impl Default for EmitOptions {
    fn default() -> Self {
        EmitOptions {
            emit_metadata_only: false,
            tolerate_errors: false,
            include_private_members: true,
            subsystem_version: SubsystemVersion::default(),
            file_alignment: 0,
            high_entropy_virtual_address_space: false,
            base_address: 0,
            debug_information_format: DebugInformationFormat::PortablePdb,
            output_name_override: None,
            pdb_file_path: None,
            pdb_checksum_algorithm: Some(SourceHashAlgorithm::Sha1),
            runtime_metadata_version: None,
            instrumentation_kinds: Vec::new(),
        }
    }
}

impl EmitOptions {
    /// Options for a metadata-only reference assembly.
    #[must_use]
    pub fn metadata_only() -> Self {
        EmitOptions {
            emit_metadata_only: true,
            include_private_members: false,
            ..Self::default()
        }
    }

    /// Emit metadata without method bodies.
    #[must_use]
    pub fn emit_metadata_only(&self) -> bool {
        self.emit_metadata_only
    }

    /// Emit metadata even when there are errors (metadata-only only).
    #[must_use]
    pub fn tolerate_errors(&self) -> bool {
        self.tolerate_errors
    }

    /// Include private members in the metadata.
    #[must_use]
    pub fn include_private_members(&self) -> bool {
        self.include_private_members
    }

    /// Subsystem version.
    #[must_use]
    pub fn subsystem_version(&self) -> SubsystemVersion {
        self.subsystem_version
    }

    /// Requested file alignment; 0 selects the default.
    #[must_use]
    pub fn file_alignment(&self) -> u32 {
        self.file_alignment
    }

    /// Whether the image supports high-entropy ASLR.
    #[must_use]
    pub fn high_entropy_virtual_address_space(&self) -> bool {
        self.high_entropy_virtual_address_space
    }

    /// Requested base address; 0 selects the default.
    #[must_use]
    pub fn base_address(&self) -> u64 {
        self.base_address
    }

    /// Debug information format.
    #[must_use]
    pub fn debug_information_format(&self) -> DebugInformationFormat {
        self.debug_information_format
    }

    /// Output file name used in the assembly manifest.
    #[must_use]
    pub fn output_name_override(&self) -> Option<&str> {
        self.output_name_override.as_deref()
    }

    /// PDB path written into the debug directory.
    #[must_use]
    pub fn pdb_file_path(&self) -> Option<&str> {
        self.pdb_file_path.as_deref()
    }

    /// Algorithm for PDB content ids.
    #[must_use]
    pub fn pdb_checksum_algorithm(&self) -> Option<SourceHashAlgorithm> {
        self.pdb_checksum_algorithm
    }

    /// Runtime version string in the metadata root.
    #[must_use]
    pub fn runtime_metadata_version(&self) -> Option<&str> {
        self.runtime_metadata_version.as_deref()
    }

    /// Requested instrumentation.
    #[must_use]
    pub fn instrumentation_kinds(&self) -> &[InstrumentationKind] {
        &self.instrumentation_kinds
    }

    /// Returns options with a different metadata-only setting.
    #[must_use]
    pub fn with_emit_metadata_only(&self, value: bool) -> Self {
        EmitOptions {
            emit_metadata_only: value,
            ..self.clone()
        }
    }

    /// Returns options with a different tolerate-errors setting.
    #[must_use]
    pub fn with_tolerate_errors(&self, value: bool) -> Self {
        EmitOptions {
            tolerate_errors: value,
            ..self.clone()
        }
    }

    /// Returns options with a different private-members setting.
    #[must_use]
    pub fn with_include_private_members(&self, value: bool) -> Self {
        EmitOptions {
            include_private_members: value,
            ..self.clone()
        }
    }

    /// Returns options with a different subsystem version.
    #[must_use]
    pub fn with_subsystem_version(&self, value: SubsystemVersion) -> Self {
        EmitOptions {
            subsystem_version: value,
            ..self.clone()
        }
    }

    /// Returns options with a different file alignment.
    #[must_use]
    pub fn with_file_alignment(&self, value: u32) -> Self {
        EmitOptions {
            file_alignment: value,
            ..self.clone()
        }
    }

    /// Returns options with a different high-entropy setting.
    #[must_use]
    pub fn with_high_entropy_virtual_address_space(&self, value: bool) -> Self {
        EmitOptions {
            high_entropy_virtual_address_space: value,
            ..self.clone()
        }
    }

    /// Returns options with a different base address.
    #[must_use]
    pub fn with_base_address(&self, value: u64) -> Self {
        EmitOptions {
            base_address: value,
            ..self.clone()
        }
    }

    /// Returns options with a different debug information format.
    #[must_use]
    pub fn with_debug_information_format(&self, value: DebugInformationFormat) -> Self {
        EmitOptions {
            debug_information_format: value,
            ..self.clone()
        }
    }

    /// Returns options with a different output name.
    #[must_use]
    pub fn with_output_name_override(&self, value: Option<&str>) -> Self {
        EmitOptions {
            output_name_override: value.map(str::to_string),
            ..self.clone()
        }
    }

    /// Returns options with a different PDB path.
    #[must_use]
    pub fn with_pdb_file_path(&self, value: Option<&str>) -> Self {
        EmitOptions {
            pdb_file_path: value.map(str::to_string),
            ..self.clone()
        }
    }

    /// Returns options with a different PDB checksum algorithm.
    #[must_use]
    pub fn with_pdb_checksum_algorithm(&self, value: Option<SourceHashAlgorithm>) -> Self {
        EmitOptions {
            pdb_checksum_algorithm: value,
            ..self.clone()
        }
    }

    /// Returns options with a different runtime metadata version.
    #[must_use]
    pub fn with_runtime_metadata_version(&self, value: Option<&str>) -> Self {
        EmitOptions {
            runtime_metadata_version: value.map(str::to_string),
            ..self.clone()
        }
    }

    /// Returns options with different instrumentation.
    #[must_use]
    pub fn with_instrumentation_kinds(&self, value: &[InstrumentationKind]) -> Self {
        EmitOptions {
            instrumentation_kinds: value.to_vec(),
            ..self.clone()
        }
    }

    /// Appends diagnostics for invalid settings.
    ///
    /// # Arguments
    ///
    /// * `diagnostics` - Destination
    /// * `deterministic` - Whether the compilation requests deterministic output
    pub fn validate(&self, diagnostics: &mut Vec<Diagnostic>, deterministic: bool) {
        if self.file_alignment != 0 && !VALID_FILE_ALIGNMENTS.contains(&self.file_alignment) {
            diagnostics.push(ErrorCode::BadFileAlignment.at_none(&[&self.file_alignment]));
        }

        if !self.subsystem_version.is_valid() {
            diagnostics.push(ErrorCode::BadSubsystemVersion.at_none(&[&self.subsystem_version]));
        }

        if let Some(path) = &self.pdb_file_path {
            let file_name = path.rsplit(|c| c == '/' || c == '\\').next().unwrap_or_default();
            if !is_valid_file_name(file_name) {
                diagnostics.push(ErrorCode::BadPdbPath.at_none(&[path]));
            }
        }

        if deterministic && self.pdb_checksum_algorithm.is_none() {
            diagnostics.push(ErrorCode::MissingPdbChecksumAlgorithm.at_none(&[]));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_valid_alignments() {
        for alignment in VALID_FILE_ALIGNMENTS {
            let mut diagnostics = Vec::new();
            EmitOptions::default()
                .with_file_alignment(alignment)
                .validate(&mut diagnostics, false);
            assert!(diagnostics.is_empty(), "{alignment}");
        }

        let mut diagnostics = Vec::new();
        EmitOptions::default()
            .with_file_alignment(256)
            .validate(&mut diagnostics, false);
        assert_eq!(diagnostics[0].id(), ErrorCode::BadFileAlignment.id());
    }

    #[test]
    fn test_deterministic_requires_checksum() {
        let options = EmitOptions::default().with_pdb_checksum_algorithm(None);
        let mut diagnostics = Vec::new();
        options.validate(&mut diagnostics, false);
        assert!(diagnostics.is_empty());
        options.validate(&mut diagnostics, true);
        assert_eq!(diagnostics.len(), 1);
    }

    #[test]
    fn test_bad_pdb_path_and_subsystem() {
        let options = EmitOptions::default()
            .with_pdb_file_path(Some("out/bad?.pdb"))
            .with_subsystem_version(SubsystemVersion::new(3, 10));
        let mut diagnostics = Vec::new();
        options.validate(&mut diagnostics, false);
        assert_eq!(diagnostics.len(), 2);
    }

    #[test]
    fn test_subsystem_defaults() {
        use crate::options::OutputKind;
        assert_eq!(
            SubsystemVersion::default_for(OutputKind::WindowsRuntimeApplication).to_string(),
            "6.02"
        );
        assert_eq!(
            SubsystemVersion::default_for(OutputKind::ConsoleApplication),
            SubsystemVersion::new(4, 0)
        );
    }

    #[test]
    fn test_metadata_only_preset() {
        let options = EmitOptions::metadata_only();
        assert!(options.emit_metadata_only());
        assert!(!options.include_private_members());
    }
}
