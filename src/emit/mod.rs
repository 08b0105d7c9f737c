//! Emit: turning a compilation into a PE image, a PDB and their companions.
//!
//! [`Compilation::emit`] runs a fixed sequence of stages, each folding its diagnostics
//! into one bag before the next starts:
//!
//! 1. **Validate arguments** - stream capabilities and option combinations. Violations
//!    are caller bugs and fail with [`crate::Error::Argument`] before any diagnostics.
//! 2. **Check options and create the module builder** - emit option diagnostics,
//!    manifest resource checks and the debug entry point. Any error stops here, as does
//!    a script submission without code.
//! 3. **Compile methods** - declaration and method body diagnostics; code generation.
//! 4. **Resources and documentation** - Win32 resources and the XML documentation
//!    file, then unused imports when everything so far succeeded. Skipped for
//!    metadata-only output.
//! 5. **Serialize** - the image (and PDB) through a [`PeSerializer`], plus the
//!    reference assembly when requested. Writer failures become diagnostics.
//!
//! [`Compilation::emit_difference`] writes Edit and Continue deltas against an
//! [`EmitBaseline`] instead.
//!
//! # Key Components
//!
//! - [`EmitArguments`] - Output streams and optional inputs of one emit
//! - [`EmitResult`] - Success flag and diagnostics
//! - [`PeSerializer`] - Seam between module building and image writing
//! - [`PortableExecutableSerializer`] - Built-in PE, metadata and portable PDB writer
//! - [`ModulePropertiesForSerialization`] - Header values derived from options
//! - [`EmitBaseline`] / [`SemanticEdit`] - Inputs of incremental emit
//!
//! # Usage Examples
//!
//! ```rust
//! use dotcompile::emit::{EmitArguments, MemoryStream};
//! use dotcompile::lang::MiniLanguage;
//! use dotcompile::options::{CompilationOptions, OutputKind};
//! use dotcompile::references::{AssemblyMetadata, MetadataReference};
//!
//! let compilation = MiniLanguage::create_compilation(
//!     Some("Hello"),
//!     [MiniLanguage::parse("class Program { static void Main() {} }", "hello.mini")],
//!     [MetadataReference::from_metadata(AssemblyMetadata::core_library(), None)],
//!     CompilationOptions::new(OutputKind::ConsoleApplication),
//! )?;
//!
//! let mut pe = MemoryStream::new();
//! let mut pdb = MemoryStream::new();
//! let result = compilation.emit(EmitArguments::new(&mut pe).with_pdb(&mut pdb))?;
//! assert!(result.success);
//! assert_eq!(&pe.as_slice()[..2], b"MZ");
//! # Ok::<(), dotcompile::Error>(())
//! ```

mod arguments;
mod builder;
mod codegen;
mod delta;
mod docs;
mod metadata;
mod pdb;
mod pe;
mod properties;
mod resources;
mod stream;

pub use arguments::{EmbeddedText, EmitArguments, ResourceData, ResourceDescription};
pub use builder::ModuleBuilder;
pub use delta::{EmitBaseline, EmitDifferenceResult, SemanticEdit, SemanticEditKind};
pub use metadata::Token;
pub use pe::PortableExecutableSerializer;
pub use properties::{
    compute_base_address, Characteristics, CorFlags, DllCharacteristics, Machine,
    ModulePropertiesForSerialization, Subsystem, DEFAULT_FILE_ALIGNMENT, SECTION_ALIGNMENT,
};
pub use resources::{ResourceKey, Win32Resource};
pub use stream::{FileOutput, InputStream, MemoryStream, OutputStream};

use crate::{
    compilation::Compilation,
    diagnostics::{Diagnostic, DiagnosticBag, ErrorCode},
    options::EmitOptions,
    utils::CancellationToken,
    Error, Result,
};

/// Outcome of [`Compilation::emit`].
#[derive(Debug, Clone)]
pub struct EmitResult {
    /// `true` if the image was written.
    pub success: bool,
    /// Every diagnostic reported during emit, in stage order.
    pub diagnostics: Vec<Diagnostic>,
}

impl EmitResult {
    fn new(success: bool, diagnostics: &DiagnosticBag) -> Self {
        EmitResult {
            success,
            diagnostics: diagnostics.to_vec(),
        }
    }

    /// Diagnostics with error severity.
    pub fn errors(&self) -> impl Iterator<Item = &Diagnostic> {
        self.diagnostics.iter().filter(|d| d.is_error())
    }
}

/// Writes a built module as an image.
///
/// The default is [`PortableExecutableSerializer`]; tests and hosts can substitute
/// their own through [`Compilation::emit_with_serializer`].
pub trait PeSerializer: Send + Sync {
    /// Writes `module` to `pe`, and its PDB to `pdb` when given.
    ///
    /// Returns `false` after reporting a diagnostic into `diagnostics`.
    ///
    /// # Errors
    ///
    /// Any error other than [`Error::Cancelled`] is reported by the caller as a
    /// writing failure diagnostic.
    fn serialize(
        &self,
        module: &ModuleBuilder,
        pe: &mut dyn OutputStream,
        pdb: Option<&mut dyn OutputStream>,
        diagnostics: &DiagnosticBag,
        cancel: &CancellationToken,
    ) -> Result<bool>;
}

impl Compilation {
    /// Emits this compilation with the built-in writer.
    ///
    /// Compile errors do not fail the call: they are returned in the result with
    /// `success == false`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Argument`] for streams or options that do not fit together and
    /// [`Error::Cancelled`] if the arguments' token is signalled.
    pub fn emit(&self, arguments: EmitArguments<'_>) -> Result<EmitResult> {
        self.emit_with_serializer(arguments, &PortableExecutableSerializer)
    }

    /// Emits this compilation, writing images through `serializer`.
    ///
    /// # Errors
    ///
    /// See [`Compilation::emit`].
    pub fn emit_with_serializer(
        &self,
        mut arguments: EmitArguments<'_>,
        serializer: &dyn PeSerializer,
    ) -> Result<EmitResult> {
        let options = arguments.validate(self.options().output_kind())?;
        let cancel = arguments.cancel.clone();
        log::debug!(
            "emit '{}': arguments validated",
            self.assembly_name().unwrap_or("<unnamed>")
        );

        let diagnostics = DiagnosticBag::new();
        let Some(mut module) =
            self.check_options_and_create_module_builder(&options, &mut arguments, &diagnostics, &cancel)?
        else {
            log::debug!("emit stopped before code generation");
            return Ok(EmitResult::new(false, &diagnostics));
        };
        log::debug!("module builder created for '{}'", module.module_name);

        diagnostics.extend(self.get_parse_diagnostics(&cancel)?);
        diagnostics.extend(self.get_declaration_diagnostics(&cancel)?);
        let mut success = module.compile_methods(self, &diagnostics, &cancel)?;
        success &= !diagnostics.has_any_errors();
        log::debug!("methods compiled, success: {}", success);

        if !options.emit_metadata_only() {
            if !self.generate_resources_and_documentation(&mut module, &mut arguments, &diagnostics, &cancel)? {
                success = false;
            }
            if success {
                self.report_unused_imports(&diagnostics, &cancel)?;
            }
            log::debug!("resources and documentation generated");
        }

        if success {
            module.compilation_state().freeze();
            success = Self::serialize_to_pe_stream(&module, serializer, arguments, &diagnostics, &cancel)?;
            log::debug!("serialized '{}', success: {}", module.module_name, success);
        }
        Ok(EmitResult::new(success, &diagnostics))
    }

    /// Stage 2. `None` stops emit; the reason is in `diagnostics`.
    fn check_options_and_create_module_builder(
        &self,
        options: &EmitOptions,
        arguments: &mut EmitArguments<'_>,
        diagnostics: &DiagnosticBag,
        cancel: &CancellationToken,
    ) -> Result<Option<ModuleBuilder>> {
        let mut option_diagnostics = Vec::new();
        options.validate(&mut option_diagnostics, self.options().deterministic());
        diagnostics.extend(option_diagnostics);
        resources::check_manifest_resources(
            &arguments.manifest_resources,
            self.options().output_kind(),
            diagnostics,
        );
        if diagnostics.has_any_errors() {
            return Ok(None);
        }

        // Submissions without code do not take a slot
        if self.is_submission() && !self.has_code_to_emit() {
            diagnostics.extend(self.get_diagnostics(cancel)?);
            return Ok(None);
        }

        let mut module = ModuleBuilder::new(self, options.clone(), cancel)?;
        if let Some(method) = arguments.debug_entry_point.take() {
            if !module.set_debug_entry_point(Some(method), diagnostics) {
                return Ok(None);
            }
        }
        module.manifest_resources = std::mem::take(&mut arguments.manifest_resources);
        module.embedded_texts = std::mem::take(&mut arguments.embedded_texts);
        if let Some(stream) = arguments.source_link.as_mut() {
            match stream.read_to_end() {
                Ok(bytes) => module.source_link = Some(bytes),
                Err(Error::Cancelled) => return Err(Error::Cancelled),
                Err(e) => {
                    diagnostics.add(ErrorCode::PdbWritingFailed.at_none(&[&e]));
                    return Ok(None);
                }
            }
        }
        Ok(Some(module))
    }

    /// Stage 4. Returns `false` if an error was reported.
    fn generate_resources_and_documentation(
        &self,
        module: &mut ModuleBuilder,
        arguments: &mut EmitArguments<'_>,
        diagnostics: &DiagnosticBag,
        cancel: &CancellationToken,
    ) -> Result<bool> {
        check_cancelled!(cancel);
        let mut success = true;
        if let Some(stream) = arguments.win32_resources.as_mut() {
            let parsed = stream
                .read_to_end()
                .map_err(|e| e.to_string())
                .and_then(|bytes| resources::Win32Resources::read(&bytes));
            match parsed {
                Ok(win32) => module.win32_resources = Some(win32),
                Err(message) => {
                    log::warn!("bad win32 resources: {}", message);
                    diagnostics.add(ErrorCode::BadWin32Resource.at_none(&[&message]));
                    success = false;
                }
            }
        }

        if let Some(stream) = arguments.xml_documentation.as_mut() {
            docs::write_documentation(module, &mut **stream, diagnostics, cancel)?;
        }
        Ok(success)
    }

    /// Stage 5.
    fn serialize_to_pe_stream(
        module: &ModuleBuilder,
        serializer: &dyn PeSerializer,
        arguments: EmitArguments<'_>,
        diagnostics: &DiagnosticBag,
        cancel: &CancellationToken,
    ) -> Result<bool> {
        let EmitArguments {
            pe,
            metadata_pe,
            pdb,
            ..
        } = arguments;

        let report = |result: Result<bool>| -> Result<bool> {
            match result {
                Ok(written) => Ok(written),
                Err(Error::Cancelled) => Err(Error::Cancelled),
                Err(e) => {
                    log::warn!("writing '{}' failed: {}", module.module_name, e);
                    diagnostics.add(ErrorCode::PeWritingFailure.at_none(&[&e]));
                    Ok(false)
                }
            }
        };

        if !report(serializer.serialize(module, pe, pdb, diagnostics, cancel))? {
            return Ok(false);
        }
        if let Some(metadata_pe) = metadata_pe {
            let reference = module.to_reference_assembly();
            return report(serializer.serialize(&reference, metadata_pe, None, diagnostics, cancel));
        }
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{
        atomic::{AtomicUsize, Ordering},
        Arc,
    };

    use super::*;
    use crate::{
        lang::MiniLanguage,
        options::{CompilationOptions, DebugInformationFormat, OutputKind},
        references::{AssemblyMetadata, MetadataReference},
    };

    fn compilation(source: &str, kind: OutputKind) -> Compilation {
        MiniLanguage::create_compilation(
            Some("Emit"),
            [MiniLanguage::parse(source, "a.mini")],
            [MetadataReference::from_metadata(AssemblyMetadata::core_library(), None)],
            CompilationOptions::new(kind),
        )
        .unwrap()
    }

    #[derive(Default)]
    struct CountingSerializer {
        calls: AtomicUsize,
        fail: bool,
    }

    impl PeSerializer for CountingSerializer {
        fn serialize(
            &self,
            module: &ModuleBuilder,
            pe: &mut dyn OutputStream,
            _pdb: Option<&mut dyn OutputStream>,
            _diagnostics: &DiagnosticBag,
            _cancel: &CancellationToken,
        ) -> Result<bool> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                return Err(malformed_error!("disk full"));
            }
            pe.write_all(module.module_name().as_bytes())?;
            Ok(true)
        }
    }

    #[test]
    fn test_emit_writes_image_and_pdb() {
        let compilation = compilation("class Program { static void Main() {} }", OutputKind::ConsoleApplication);
        let mut pe = MemoryStream::new();
        let mut pdb = MemoryStream::new();
        let result = compilation
            .emit(EmitArguments::new(&mut pe).with_pdb(&mut pdb))
            .unwrap();
        assert!(result.success, "{:?}", result.diagnostics);
        assert_eq!(&pe.as_slice()[..2], b"MZ");
        assert_eq!(&pdb.as_slice()[..4], b"BSJB");
    }

    #[test]
    fn test_method_body_error_skips_serialization() {
        let compilation = compilation("class C { void M() { undefined(); } }", OutputKind::DynamicallyLinkedLibrary);
        let serializer = CountingSerializer::default();
        let mut pe = MemoryStream::new();
        let result = compilation
            .emit_with_serializer(EmitArguments::new(&mut pe), &serializer)
            .unwrap();
        assert!(!result.success);
        assert!(result.errors().next().is_some());
        assert_eq!(serializer.calls.load(Ordering::SeqCst), 0);
        assert!(pe.is_empty());
    }

    #[test]
    fn test_serializer_failure_becomes_diagnostic() {
        let compilation = compilation("public class C {}", OutputKind::DynamicallyLinkedLibrary);
        let serializer = CountingSerializer {
            calls: AtomicUsize::new(0),
            fail: true,
        };
        let mut pe = MemoryStream::new();
        let result = compilation
            .emit_with_serializer(EmitArguments::new(&mut pe), &serializer)
            .unwrap();
        assert!(!result.success);
        assert!(result
            .diagnostics
            .iter()
            .any(|d| d.id() == ErrorCode::PeWritingFailure.id()));
    }

    #[test]
    fn test_reference_assembly_written_second() {
        let compilation = compilation("public class C { private int x; }", OutputKind::DynamicallyLinkedLibrary);
        let serializer = CountingSerializer::default();
        let mut pe = MemoryStream::new();
        let mut reference = MemoryStream::new();
        let result = compilation
            .emit_with_serializer(
                EmitArguments::new(&mut pe).with_metadata_pe(&mut reference),
                &serializer,
            )
            .unwrap();
        assert!(result.success);
        assert_eq!(serializer.calls.load(Ordering::SeqCst), 2);
        assert_eq!(reference.into_inner(), b"Emit.dll");
    }

    #[test]
    fn test_embedded_pdb_with_pdb_stream_is_rejected() {
        let compilation = compilation("public class C {}", OutputKind::DynamicallyLinkedLibrary);
        let mut pe = MemoryStream::new();
        let mut pdb = MemoryStream::new();
        let arguments = EmitArguments::new(&mut pe).with_pdb(&mut pdb).with_options(
            EmitOptions::default().with_debug_information_format(DebugInformationFormat::Embedded),
        );
        assert!(matches!(
            compilation.emit(arguments),
            Err(Error::Argument { .. })
        ));
    }

    #[test]
    fn test_duplicate_resources_stop_before_compilation() {
        let compilation = compilation("public class C {}", OutputKind::DynamicallyLinkedLibrary);
        let serializer = CountingSerializer::default();
        let mut pe = MemoryStream::new();
        let arguments = EmitArguments::new(&mut pe).with_manifest_resources([
            ResourceDescription::from_bytes("r", true, vec![1]).unwrap(),
            ResourceDescription::from_bytes("r", true, vec![2]).unwrap(),
        ]);
        let result = compilation.emit_with_serializer(arguments, &serializer).unwrap();
        assert!(!result.success);
        assert!(result
            .diagnostics
            .iter()
            .any(|d| d.id() == ErrorCode::ResourceNotUnique.id()));
        assert_eq!(serializer.calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_bad_win32_resources_reported() {
        let compilation = compilation("public class C {}", OutputKind::DynamicallyLinkedLibrary);
        let mut pe = MemoryStream::new();
        let mut win32 = MemoryStream::read_only(vec![1, 2, 3, 4, 5, 6]);
        let result = compilation
            .emit(EmitArguments::new(&mut pe).with_win32_resources(&mut win32))
            .unwrap();
        assert!(!result.success);
        assert!(result
            .diagnostics
            .iter()
            .any(|d| d.id() == ErrorCode::BadWin32Resource.id()));
    }

    #[test]
    fn test_cancelled_emit() {
        let compilation = compilation("public class C {}", OutputKind::DynamicallyLinkedLibrary);
        let cancel = CancellationToken::new();
        cancel.cancel();
        let mut pe = MemoryStream::new();
        let result = compilation.emit(EmitArguments::new(&mut pe).with_cancellation(cancel));
        assert!(matches!(result, Err(Error::Cancelled)));
    }

    #[test]
    fn test_serializer_is_object_safe() {
        let serializer: Arc<dyn PeSerializer> = Arc::new(PortableExecutableSerializer);
        let compilation = compilation("public class C {}", OutputKind::DynamicallyLinkedLibrary);
        let mut pe = MemoryStream::new();
        let result = compilation
            .emit_with_serializer(EmitArguments::new(&mut pe), serializer.as_ref())
            .unwrap();
        assert!(result.success);
    }
}
