//! Integration tests for emitting images, companions and deltas.

use std::sync::{
    atomic::{AtomicUsize, Ordering},
    Arc,
};

use dotcompile::{
    emit::{ModuleBuilder, PeSerializer},
    prelude::*,
};
use uguid::Guid;

const SOURCE: &str = "/// <summary>Adds numbers</summary>\npublic class Calculator {\n    public int Add(int a, int b) { return a + b; }\n}";

fn corlib() -> MetadataReference {
    MetadataReference::from_metadata(AssemblyMetadata::core_library(), None)
}

fn compile(source: &str, options: CompilationOptions) -> Result<Compilation> {
    MiniLanguage::create_compilation(
        Some("Calculator"),
        [MiniLanguage::parse(source, "calculator.mini")],
        [corlib()],
        options,
    )
}

fn library(source: &str) -> Result<Compilation> {
    compile(source, CompilationOptions::new(OutputKind::DynamicallyLinkedLibrary))
}

struct Outputs {
    pe: Vec<u8>,
    pdb: Vec<u8>,
    xml: Vec<u8>,
    result: EmitResult,
}

fn emit_all(compilation: &Compilation) -> Result<Outputs> {
    let mut pe = MemoryStream::new();
    let mut pdb = MemoryStream::new();
    let mut xml = MemoryStream::new();
    let result = compilation.emit(
        EmitArguments::new(&mut pe)
            .with_pdb(&mut pdb)
            .with_xml_documentation(&mut xml),
    )?;
    Ok(Outputs {
        pe: pe.into_inner(),
        pdb: pdb.into_inner(),
        xml: xml.into_inner(),
        result,
    })
}

#[test]
fn test_emit_writes_image_pdb_and_documentation() -> Result<()> {
    let outputs = emit_all(&library(SOURCE)?)?;
    assert!(outputs.result.success, "{:?}", outputs.result.diagnostics);
    assert_eq!(&outputs.pe[..2], b"MZ");
    assert_eq!(&outputs.pdb[..4], b"BSJB");

    let xml = String::from_utf8(outputs.xml).expect("documentation is UTF-8");
    assert!(xml.contains("<member name=\"T:Calculator\">"));
    assert!(xml.contains("Adds numbers"));
    Ok(())
}

#[test]
fn test_deterministic_emit_is_reproducible() -> Result<()> {
    let options = CompilationOptions::new(OutputKind::DynamicallyLinkedLibrary).with_deterministic(true);
    let first = emit_all(&compile(SOURCE, options.clone())?)?;
    let second = emit_all(&compile(SOURCE, options)?)?;
    assert!(first.result.success && second.result.success);
    assert_eq!(first.pe, second.pe);
    assert_eq!(first.pdb, second.pdb);

    let changed = emit_all(&compile(
        &SOURCE.replace("a + b", "a - b"),
        CompilationOptions::new(OutputKind::DynamicallyLinkedLibrary).with_deterministic(true),
    )?)?;
    assert_ne!(first.pe, changed.pe);
    Ok(())
}

#[derive(Default)]
struct RecordingSerializer {
    calls: AtomicUsize,
}

impl PeSerializer for RecordingSerializer {
    fn serialize(
        &self,
        module: &ModuleBuilder,
        pe: &mut dyn OutputStream,
        _pdb: Option<&mut dyn OutputStream>,
        _diagnostics: &DiagnosticBag,
        _cancel: &CancellationToken,
    ) -> Result<bool> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        pe.write_all(module.module_name().as_bytes())?;
        Ok(true)
    }
}

#[test]
fn test_method_body_error_prevents_serialization() -> Result<()> {
    let compilation = library("public class Broken { public void M() { undefined(); } }")?;
    let serializer = RecordingSerializer::default();
    let mut pe = MemoryStream::new();
    let result = compilation.emit_with_serializer(EmitArguments::new(&mut pe), &serializer)?;

    assert!(!result.success);
    assert!(result.diagnostics.iter().any(Diagnostic::is_error));
    assert_eq!(serializer.calls.load(Ordering::SeqCst), 0);
    assert!(pe.is_empty());
    Ok(())
}

#[test]
fn test_clean_compilation_is_serialized_once() -> Result<()> {
    let serializer = RecordingSerializer::default();
    let mut pe = MemoryStream::new();
    let result = library(SOURCE)?.emit_with_serializer(EmitArguments::new(&mut pe), &serializer)?;
    assert!(result.success);
    assert_eq!(serializer.calls.load(Ordering::SeqCst), 1);
    assert_eq!(pe.as_slice(), b"Calculator.dll");
    Ok(())
}

struct FrozenStateSerializer {
    method_key: String,
}

impl PeSerializer for FrozenStateSerializer {
    fn serialize(
        &self,
        module: &ModuleBuilder,
        pe: &mut dyn OutputStream,
        _pdb: Option<&mut dyn OutputStream>,
        _diagnostics: &DiagnosticBag,
        _cancel: &CancellationToken,
    ) -> Result<bool> {
        let state = module.compilation_state();
        assert!(state.is_frozen());
        let recorded = state.synthesized_types(&self.method_key);
        assert_eq!(recorded.len(), 1);

        let late = state.add_synthesized_type("M:Late", Arc::clone(&recorded[0]));
        assert!(matches!(late, Err(Error::InvalidOperation(_))));
        pe.write_all(b"ok")?;
        Ok(true)
    }
}

#[test]
fn test_compilation_state_is_frozen_before_serialization() -> Result<()> {
    let compilation = library("public class Shapes { public object Point() { return new { X = 1, Y = 2 }; } }")?;
    let shapes = compilation.get_type_by_metadata_name("Shapes")?.expect("Shapes");
    let point = shapes.methods().find(|m| m.name() == "Point").cloned().expect("Point");
    let serializer = FrozenStateSerializer {
        method_key: point.signature_key(),
    };

    let mut pe = MemoryStream::new();
    let result = compilation.emit_with_serializer(EmitArguments::new(&mut pe), &serializer)?;
    assert!(result.success, "{:?}", result.diagnostics);
    assert_eq!(pe.as_slice(), b"ok");
    Ok(())
}

#[test]
fn test_invalid_emit_options_are_diagnostics() -> Result<()> {
    let mut pe = MemoryStream::new();
    let result = library(SOURCE)?.emit(
        EmitArguments::new(&mut pe).with_options(EmitOptions::default().with_file_alignment(300)),
    )?;
    assert!(!result.success);
    assert!(result.errors().next().is_some());
    assert!(pe.is_empty());
    Ok(())
}

#[test]
fn test_two_generations_of_edits() -> Result<()> {
    let v1 = library(SOURCE)?;
    let baseline = EmitBaseline::create_initial(&v1, Guid::from_bytes([3; 16]))?;

    let method = |compilation: &Compilation| -> Result<Arc<MethodSymbol>> {
        let ty = compilation
            .get_type_by_metadata_name("Calculator")?
            .expect("Calculator");
        let found = ty.methods().find(|m| m.name() == "Add").cloned().expect("Add");
        Ok(found)
    };
    let update = |old: &Compilation, new: &Compilation| -> Result<SemanticEdit> {
        SemanticEdit::new(
            SemanticEditKind::Update,
            Some(Symbol::Method(method(old)?)),
            Some(Symbol::Method(method(new)?)),
        )
    };

    let mut generation = baseline;
    let mut previous = v1;
    for body in ["a - b", "a * b"] {
        let next = library(&SOURCE.replace("a + b", body))?;
        let mut metadata = MemoryStream::new();
        let mut il = MemoryStream::new();
        let mut pdb = MemoryStream::new();
        let result = next.emit_difference(
            &generation,
            &[update(&previous, &next)?],
            &|_| false,
            &mut metadata,
            &mut il,
            &mut pdb,
            &CancellationToken::none(),
        )?;
        assert!(result.success, "{:?}", result.diagnostics);
        assert_eq!(result.updated_methods.len(), 1);
        assert_eq!(&metadata.as_slice()[..4], b"BSJB");

        let next_baseline = result.baseline.expect("successful deltas produce a baseline");
        assert_eq!(next_baseline.ordinal(), generation.ordinal() + 1);
        assert_eq!(next_baseline.module_version_id(), Guid::from_bytes([3; 16]));
        generation = next_baseline;
        previous = next;
    }
    assert_eq!(generation.ordinal(), 2);
    Ok(())
}
