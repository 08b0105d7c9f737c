//! Integration tests for deterministic keys.

use dotcompile::{
    key::{DeterministicKeyBuilder, DeterministicKeyOptions},
    prelude::*,
};
use uguid::guid;

fn reference() -> MetadataReference {
    let metadata = AssemblyMetadata::builder(AssemblyIdentity::new("Contracts"))
        .mvid(guid!("6f9619ff-8b86-d011-b42d-00c04fc964ff"))
        .build();
    MetadataReference::from_metadata(metadata, Some("/packages/Contracts.dll"))
}

fn compilation(sources: &[(&str, &str)]) -> Result<Compilation> {
    MiniLanguage::create_compilation(
        Some("Keyed"),
        sources.iter().map(|(path, text)| MiniLanguage::parse(text, path)),
        [
            MetadataReference::from_metadata(AssemblyMetadata::core_library(), None),
            reference(),
        ],
        CompilationOptions::new(OutputKind::DynamicallyLinkedLibrary).with_deterministic(true),
    )
}

const TREES: [(&str, &str); 2] = [("/src/a.mini", "class A {}"), ("/src/b.mini", "class B : A {}")];

#[test]
fn test_identical_inputs_produce_identical_keys() -> Result<()> {
    let flags = DeterministicKeyOptions::default();
    let emit = EmitOptions::default();
    let first = compilation(&TREES)?.get_deterministic_key(Some(&emit), flags)?;
    let second = compilation(&TREES)?.get_deterministic_key(Some(&emit), flags)?;
    assert_eq!(first, second);
    Ok(())
}

#[test]
fn test_single_tree_change_changes_key() -> Result<()> {
    let flags = DeterministicKeyOptions::default();
    let original = compilation(&TREES)?.get_deterministic_key(None, flags)?;
    let edited = compilation(&[TREES[0], ("/src/b.mini", "class B : A { }")])?
        .get_deterministic_key(None, flags)?;
    assert_ne!(original, edited);
    Ok(())
}

#[test]
fn test_tree_order_is_significant() -> Result<()> {
    let flags = DeterministicKeyOptions::default();
    let forward = compilation(&TREES)?.get_deterministic_key(None, flags)?;
    let reversed = compilation(&[TREES[1], TREES[0]])?.get_deterministic_key(None, flags)?;
    assert_ne!(forward, reversed);
    Ok(())
}

#[test]
fn test_key_ignores_paths_on_request() -> Result<()> {
    let moved = [("/elsewhere/a.mini", TREES[0].1), ("/elsewhere/b.mini", TREES[1].1)];
    let flags = DeterministicKeyOptions::IGNORE_PATHS;
    assert_eq!(
        compilation(&TREES)?.get_deterministic_key(None, flags)?,
        compilation(&moved)?.get_deterministic_key(None, flags)?
    );
    assert_ne!(
        compilation(&TREES)?.get_deterministic_key(None, DeterministicKeyOptions::default())?,
        compilation(&moved)?.get_deterministic_key(None, DeterministicKeyOptions::default())?
    );
    Ok(())
}

#[test]
fn test_emit_options_participate() -> Result<()> {
    let c = compilation(&TREES)?;
    let flags = DeterministicKeyOptions::default();
    let portable = c.get_deterministic_key(Some(&EmitOptions::default()), flags)?;
    let embedded = c.get_deterministic_key(
        Some(&EmitOptions::default().with_debug_information_format(DebugInformationFormat::Embedded)),
        flags,
    )?;
    assert_ne!(portable, embedded);
    Ok(())
}

#[test]
fn test_key_is_json() -> Result<()> {
    let document = DeterministicKeyBuilder::new(DeterministicKeyOptions::IGNORE_TOOL_VERSIONS)
        .write_compilation(&compilation(&TREES)?, None)?;
    let references = document["compilation"]["references"]
        .as_array()
        .expect("references array");
    assert_eq!(references[1]["mvid"], "6f9619ff-8b86-d011-b42d-00c04fc964ff");
    assert_eq!(references[1]["properties"]["embedInteropTypes"], false);

    let text = DeterministicKeyBuilder::default().build(&compilation(&TREES)?, None)?;
    let parsed: serde_json::Value = serde_json::from_str(&text).expect("key parses as JSON");
    assert_eq!(parsed["compilation"]["options"]["deterministic"], true);
    Ok(())
}
