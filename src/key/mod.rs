//! Deterministic compilation keys.
//!
//! A key is a JSON document describing every input that can influence the bytes a
//! compilation emits: options, the identity of each syntax tree (path, encoding,
//! checksum and parse options, never the text itself), and the identity of each
//! reference (file name, MVID and import properties). Two compilations that would
//! emit identical output produce identical keys. The converse does not hold: the key
//! is conservative, so a difference in, say, a path can change the key without
//! changing the output.
//!
//! Settings that are inherently environment dependent are listed in
//! [`SKIPPED_OPTIONS`] and never written.
//!
//! # Examples
//!
//! ```rust
//! use dotcompile::{
//!     key::DeterministicKeyOptions,
//!     lang::MiniLanguage,
//!     options::{CompilationOptions, OutputKind},
//! };
//!
//! let compilation = MiniLanguage::create_compilation(
//!     Some("Lib"),
//!     [MiniLanguage::parse("class C {}", "/src/c.mini")],
//!     [],
//!     CompilationOptions::new(OutputKind::DynamicallyLinkedLibrary),
//! )?;
//!
//! let key = compilation.get_deterministic_key(None, DeterministicKeyOptions::IGNORE_PATHS)?;
//! assert!(key.contains("\"c.mini\""));
//! assert!(!key.contains("/src/"));
//! # Ok::<(), dotcompile::Error>(())
//! ```

use bitflags::bitflags;
use serde_json::{json, Map, Value};

use crate::{
    compilation::Compilation,
    options::{CompilationOptions, EmitOptions, ParseOptions},
    references::{MetadataReference, MetadataReferenceKind},
    syntax::SyntaxTree,
    Error, Result,
};

/// Version of the key document layout.
pub const KEY_FORMAT_VERSION: u32 = 1;

/// Compilation options that never contribute to the key.
///
/// Concurrency only changes how the work is scheduled, the local time is a
/// wall-clock value and the resolvers and providers are service objects whose
/// results are already captured by the trees and references they produced.
pub const SKIPPED_OPTIONS: [&str; 7] = [
    "concurrentBuild",
    "currentLocalTime",
    "metadataReferenceResolver",
    "sourceReferenceResolver",
    "xmlReferenceResolver",
    "strongNameProvider",
    "eventQueue",
];

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    /// Toggles applied on top of the complete key.
    pub struct DeterministicKeyOptions: u32 {
        /// Write only file names instead of full paths
        const IGNORE_PATHS = 0x1;
        /// Leave out the compiler and language versions
        const IGNORE_TOOL_VERSIONS = 0x2;
    }
}

/// Builds deterministic keys.
#[derive(Debug, Clone, Default)]
pub struct DeterministicKeyBuilder {
    options: DeterministicKeyOptions,
    path_map: Vec<(String, String)>,
}

impl DeterministicKeyBuilder {
    /// Creates a builder with the given toggles.
    #[must_use]
    pub fn new(options: DeterministicKeyOptions) -> Self {
        DeterministicKeyBuilder {
            options,
            path_map: Vec::new(),
        }
    }

    /// Adds path prefix substitutions, applied in order to every path in the key.
    ///
    /// The first matching prefix wins. Ignored when
    /// [`DeterministicKeyOptions::IGNORE_PATHS`] is set.
    #[must_use]
    pub fn with_path_map<K: Into<String>, V: Into<String>>(
        mut self,
        map: impl IntoIterator<Item = (K, V)>,
    ) -> Self {
        self.path_map
            .extend(map.into_iter().map(|(k, v)| (k.into(), v.into())));
        self
    }

    /// Toggles of this builder.
    #[must_use]
    pub fn options(&self) -> DeterministicKeyOptions {
        self.options
    }

    /// Serializes `compilation` and optional emit options into a key document.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidOperation`] if a reference is not backed by a
    /// portable-executable image.
    pub fn write_compilation(
        &self,
        compilation: &Compilation,
        emit_options: Option<&EmitOptions>,
    ) -> Result<Value> {
        let mut document = Map::new();
        document.insert("version".into(), json!(KEY_FORMAT_VERSION));
        if !self.options.contains(DeterministicKeyOptions::IGNORE_TOOL_VERSIONS) {
            document.insert(
                "toolVersions".into(),
                json!({
                    "compilerVersion": env!("CARGO_PKG_VERSION"),
                    "keyFormat": KEY_FORMAT_VERSION,
                }),
            );
        }

        let mut section = Map::new();
        section.insert("language".into(), json!(compilation.language().name()));
        section.insert("assemblyName".into(), json!(compilation.assembly_name()));
        section.insert("isSubmission".into(), json!(compilation.is_submission()));
        section.insert("options".into(), self.write_options(compilation.options()));
        section.insert(
            "syntaxTrees".into(),
            Value::Array(
                compilation
                    .syntax_trees()
                    .iter()
                    .map(|tree| self.write_syntax_tree(tree))
                    .collect(),
            ),
        );
        let references = compilation
            .external_references()
            .iter()
            .map(|reference| self.write_reference(reference))
            .collect::<Result<Vec<_>>>()?;
        section.insert("references".into(), Value::Array(references));
        document.insert("compilation".into(), Value::Object(section));

        if let Some(emit_options) = emit_options {
            document.insert("emitOptions".into(), self.write_emit_options(emit_options));
        }
        Ok(Value::Object(document))
    }

    /// Builds the key string for `compilation`.
    ///
    /// # Errors
    ///
    /// See [`DeterministicKeyBuilder::write_compilation`].
    pub fn build(&self, compilation: &Compilation, emit_options: Option<&EmitOptions>) -> Result<String> {
        let document = self.write_compilation(compilation, emit_options)?;
        let key = serde_json::to_string_pretty(&document)
            .map_err(|e| Error::InvalidOperation(format!("cannot serialize key: {e}")))?;
        log::debug!("deterministic key: {} bytes", key.len());
        Ok(key)
    }

    fn write_options(&self, options: &CompilationOptions) -> Value {
        let specific: Map<String, Value> = options
            .specific_diagnostic_options()
            .iter()
            .map(|(id, report)| (id.clone(), json!(report.name())))
            .collect();
        json!({
            "outputKind": options.output_kind().name(),
            "moduleName": options.module_name(),
            "mainTypeName": options.main_type_name(),
            "scriptClassName": options.script_class_name(),
            "cryptoKeyContainer": options.crypto_key_container(),
            "cryptoKeyFile": options.crypto_key_file().map(|p| self.path(p)),
            "cryptoPublicKey": hex(options.crypto_public_key()),
            "delaySign": options.delay_sign(),
            "publicSign": options.public_sign(),
            "checkOverflow": options.check_overflow(),
            "platform": options.platform().name(),
            "optimizationLevel": options.optimization_level().name(),
            "generalDiagnosticOption": options.general_diagnostic_option().name(),
            "warningLevel": options.warning_level(),
            "specificDiagnosticOptions": specific,
            "reportSuppressedDiagnostics": options.report_suppressed_diagnostics(),
            "deterministic": options.deterministic(),
            "debugPlusMode": options.debug_plus_mode(),
            "metadataImportOptions": format!("{:?}", options.metadata_import_options()),
            "nullableContextOptions": options.nullable_context_options().name(),
            "allowUnsafe": options.allow_unsafe(),
            "usings": options.usings(),
        })
    }

    fn write_parse_options(options: &ParseOptions) -> Value {
        let mut symbols = options.preprocessor_symbols().to_vec();
        symbols.sort();
        json!({
            "kind": format!("{:?}", options.kind()),
            "languageVersion": options.language_version(),
            "documentationMode": format!("{:?}", options.documentation_mode()),
            "preprocessorSymbols": symbols,
            "features": options.features(),
        })
    }

    fn write_syntax_tree(&self, tree: &SyntaxTree) -> Value {
        let text = tree.text();
        json!({
            "fileName": self.path(tree.file_path()),
            "text": {
                "encodingName": text.encoding(),
                "checksum": hex(text.checksum()),
                "checksumAlgorithm": text.checksum_algorithm().name(),
            },
            "parseOptions": Self::write_parse_options(tree.options()),
        })
    }

    fn write_reference(&self, reference: &MetadataReference) -> Result<Value> {
        let MetadataReferenceKind::PortableExecutable {
            metadata,
            file_path,
        } = reference.kind()
        else {
            return Err(Error::InvalidOperation(format!(
                "reference '{}' is not a portable-executable reference and cannot be keyed",
                reference.display()
            )));
        };
        let properties = reference.properties();
        let file_name = match file_path {
            Some(path) => self.path(path),
            None => metadata.module_name().to_string(),
        };
        Ok(json!({
            "fileName": file_name,
            "identity": metadata.identity().display_name(),
            "mvid": metadata.mvid().to_string(),
            "properties": {
                "kind": properties.kind().name(),
                "embedInteropTypes": properties.embed_interop_types(),
                "aliases": properties.aliases(),
            },
        }))
    }

    fn write_emit_options(&self, options: &EmitOptions) -> Value {
        let subsystem = options.subsystem_version();
        let instrumentation: Vec<String> = options
            .instrumentation_kinds()
            .iter()
            .map(|k| format!("{k:?}"))
            .collect();
        json!({
            "emitMetadataOnly": options.emit_metadata_only(),
            "tolerateErrors": options.tolerate_errors(),
            "includePrivateMembers": options.include_private_members(),
            "subsystemVersion": { "major": subsystem.major, "minor": subsystem.minor },
            "fileAlignment": options.file_alignment(),
            "highEntropyVirtualAddressSpace": options.high_entropy_virtual_address_space(),
            "baseAddress": options.base_address().to_string(),
            "debugInformationFormat": options.debug_information_format().name(),
            "outputNameOverride": options.output_name_override(),
            "pdbFilePath": options.pdb_file_path().map(|p| self.path(p)),
            "pdbChecksumAlgorithm": options.pdb_checksum_algorithm().map(|a| a.name()),
            "runtimeMetadataVersion": options.runtime_metadata_version(),
            "instrumentationKinds": instrumentation,
        })
    }

    fn path(&self, path: &str) -> String {
        if self.options.contains(DeterministicKeyOptions::IGNORE_PATHS) {
            return path
                .rsplit(['/', '\\'])
                .next()
                .unwrap_or(path)
                .to_string();
        }
        let mapped = self
            .path_map
            .iter()
            .find_map(|(from, to)| path.strip_prefix(from.as_str()).map(|rest| format!("{to}{rest}")))
            .unwrap_or_else(|| path.to_string());
        mapped.replace('\\', "/")
    }
}

fn hex(bytes: &[u8]) -> String {
    use std::fmt::Write;
    bytes.iter().fold(String::with_capacity(bytes.len() * 2), |mut s, b| {
        let _ = write!(s, "{b:02x}");
        s
    })
}

impl Compilation {
    /// Deterministic key of this compilation, optionally including emit options.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidOperation`] if a reference is another compilation
    /// rather than a portable-executable image.
    pub fn get_deterministic_key(
        &self,
        emit_options: Option<&EmitOptions>,
        options: DeterministicKeyOptions,
    ) -> Result<String> {
        DeterministicKeyBuilder::new(options).build(self, emit_options)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        compilation::Language,
        lang::MiniLanguage,
        options::OutputKind,
        references::{AssemblyIdentity, AssemblyMetadata},
        syntax::{SourceHashAlgorithm, SourceText},
    };
    use uguid::guid;

    fn library() -> AssemblyMetadata {
        AssemblyMetadata::builder(AssemblyIdentity::new("Lib"))
            .mvid(guid!("01234567-89ab-cdef-0123-456789abcdef"))
            .build()
    }

    fn compilation(source: &str) -> Compilation {
        MiniLanguage::create_compilation(
            Some("App"),
            [MiniLanguage::parse(source, "C:\\work\\src\\a.mini")],
            [
                MetadataReference::from_metadata(AssemblyMetadata::core_library(), None),
                MetadataReference::from_metadata(library(), Some("/libs/Lib.dll")),
            ],
            CompilationOptions::new(OutputKind::DynamicallyLinkedLibrary),
        )
        .unwrap()
    }

    #[test]
    fn test_identical_inputs_give_identical_keys() {
        let a = compilation("class C {}");
        let b = compilation("class C {}");
        let options = DeterministicKeyOptions::default();
        assert_eq!(
            a.get_deterministic_key(None, options).unwrap(),
            b.get_deterministic_key(None, options).unwrap()
        );
    }

    #[test]
    fn test_source_change_changes_key() {
        let a = compilation("class C {}");
        let b = compilation("class D {}");
        let options = DeterministicKeyOptions::default();
        assert_ne!(
            a.get_deterministic_key(None, options).unwrap(),
            b.get_deterministic_key(None, options).unwrap()
        );
    }

    #[test]
    fn test_document_sections() {
        let key = DeterministicKeyBuilder::default()
            .write_compilation(&compilation("class C {}"), Some(&EmitOptions::default()))
            .unwrap();
        let section = &key["compilation"];
        assert_eq!(key["version"], json!(KEY_FORMAT_VERSION));
        assert!(section["options"].is_object());
        assert_eq!(section["syntaxTrees"].as_array().unwrap().len(), 1);
        assert_eq!(section["references"].as_array().unwrap().len(), 2);
        assert_eq!(
            section["references"][1]["mvid"],
            json!("01234567-89ab-cdef-0123-456789abcdef")
        );
        assert_eq!(section["references"][1]["fileName"], json!("/libs/Lib.dll"));
        assert_eq!(section["references"][1]["properties"]["kind"], json!("Assembly"));
        assert_eq!(
            section["syntaxTrees"][0]["text"]["checksumAlgorithm"],
            json!(SourceHashAlgorithm::Sha1.name())
        );
        assert!(key["emitOptions"].is_object());
        assert!(key["toolVersions"].is_object());
    }

    #[test]
    fn test_skipped_options_are_absent() {
        let key = compilation("class C {}")
            .get_deterministic_key(None, DeterministicKeyOptions::default())
            .unwrap();
        for skipped in SKIPPED_OPTIONS {
            assert!(!key.contains(skipped), "{skipped} should not be keyed");
        }
    }

    #[test]
    fn test_concurrent_build_does_not_change_key() {
        let a = compilation("class C {}");
        let b = a.with_options(a.options().with_concurrent_build(!a.options().concurrent_build()));
        let options = DeterministicKeyOptions::default();
        assert_eq!(
            a.get_deterministic_key(None, options).unwrap(),
            b.get_deterministic_key(None, options).unwrap()
        );
    }

    #[test]
    fn test_ignore_paths() {
        let c = compilation("class C {}");
        let full = c.get_deterministic_key(None, DeterministicKeyOptions::default()).unwrap();
        assert!(full.contains("C:/work/src/a.mini"));

        let names_only = c
            .get_deterministic_key(None, DeterministicKeyOptions::IGNORE_PATHS)
            .unwrap();
        assert!(names_only.contains("\"a.mini\""));
        assert!(names_only.contains("\"Lib.dll\""));
        assert!(!names_only.contains("work"));
    }

    #[test]
    fn test_path_map() {
        let key = DeterministicKeyBuilder::default()
            .with_path_map([("C:\\work\\", "/_/")])
            .build(&compilation("class C {}"), None)
            .unwrap();
        assert!(key.contains("/_/src/a.mini"));
    }

    #[test]
    fn test_ignore_tool_versions() {
        let key = DeterministicKeyBuilder::new(DeterministicKeyOptions::IGNORE_TOOL_VERSIONS)
            .write_compilation(&compilation("class C {}"), None)
            .unwrap();
        assert!(key.get("toolVersions").is_none());
        assert!(key.get("emitOptions").is_none());
    }

    #[test]
    fn test_compilation_reference_cannot_be_keyed() {
        let other = compilation("class C {}");
        let c = compilation("class D {}").add_references([MetadataReference::from_compilation(&other)]);
        let result = c.get_deterministic_key(None, DeterministicKeyOptions::default());
        assert!(matches!(result, Err(Error::InvalidOperation(_))));
    }

    #[test]
    fn test_checksum_algorithm_is_keyed() {
        let text = SourceText::new("class C {}");
        let md5 = text.with_checksum_algorithm(SourceHashAlgorithm::Md5);
        let options = CompilationOptions::default();
        let a = MiniLanguage::create_compilation(
            Some("App"),
            [MiniLanguage.parse_text(text, "a.mini", &ParseOptions::default())],
            [],
            options.clone(),
        )
        .unwrap();
        let b = MiniLanguage::create_compilation(
            Some("App"),
            [MiniLanguage.parse_text(md5, "a.mini", &ParseOptions::default())],
            [],
            options,
        )
        .unwrap();
        let flags = DeterministicKeyOptions::default();
        assert_ne!(
            a.get_deterministic_key(None, flags).unwrap(),
            b.get_deterministic_key(None, flags).unwrap()
        );
    }

    #[test]
    fn test_hex() {
        assert_eq!(hex(&[0x00, 0xab, 0x10]), "00ab10");
        assert_eq!(hex(&[]), "");
    }
}
