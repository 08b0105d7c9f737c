//! Integration tests for the compilation model.
//!
//! These cover the public contract of `Compilation`: derivation never mutates the
//! original, submissions chain their slots, references are removed completely and
//! semantic queries resolve across trees.

use std::sync::Arc;

use dotcompile::{
    compilation::Compilation,
    lang::MiniLanguage,
    options::{CompilationOptions, OutputKind},
    prelude::*,
    Result,
};

fn corlib() -> MetadataReference {
    MetadataReference::from_metadata(AssemblyMetadata::core_library(), None)
}

fn library(name: &str, sources: &[&str]) -> Result<Compilation> {
    MiniLanguage::create_compilation(
        Some(name),
        sources
            .iter()
            .enumerate()
            .map(|(i, s)| MiniLanguage::parse(s, &format!("{i}.mini"))),
        [corlib()],
        CompilationOptions::new(OutputKind::DynamicallyLinkedLibrary),
    )
}

#[test]
fn test_base_type_resolves_across_trees() -> Result<()> {
    let compilation = library("FooBar", &["class Foo {}", "class Bar : Foo {}"])?;
    let diagnostics = compilation.get_diagnostics(&CancellationToken::none())?;
    assert!(diagnostics.is_empty(), "unexpected diagnostics: {diagnostics:?}");

    let bar = compilation
        .get_type_by_metadata_name("Bar")?
        .expect("Bar is declared");
    let foo = compilation
        .get_type_by_metadata_name("Foo")?
        .expect("Foo is declared");
    let base = bar.base_type().expect("Bar has a base type");
    assert_eq!(base, TypeSymbol::Named(Arc::clone(&foo)));

    let foo_tree = &foo.declaring_syntax()[0].tree;
    assert_eq!(foo_tree.file_path(), "0.mini");
    Ok(())
}

#[test]
fn test_derivation_leaves_original_unchanged() -> Result<()> {
    let original = library("Lib", &["class A {}"])?;
    let trees_before = original.syntax_trees().len();
    let options_before = original.options().clone();

    let with_tree = original.add_syntax_trees([MiniLanguage::parse("class B {}", "b.mini")])?;
    let with_options = original.with_options(original.options().with_check_overflow(true));
    let without_refs = original.remove_all_references();

    assert_eq!(original.syntax_trees().len(), trees_before);
    assert_eq!(original.options(), &options_before);
    assert_eq!(original.external_references().len(), 1);

    assert_eq!(with_tree.syntax_trees().len(), trees_before + 1);
    assert!(with_options.options().check_overflow());
    assert!(without_refs.external_references().is_empty());

    // No-op derivations hand back the same compilation.
    assert!(Compilation::ptr_eq(&original, &original.add_references([])));
    assert!(Compilation::ptr_eq(&original, &original.remove_references([])?));
    assert!(Compilation::ptr_eq(&original, &original.remove_syntax_trees([])?));
    let emptied = original.remove_all_syntax_trees();
    assert!(!Compilation::ptr_eq(&original, &emptied));
    assert!(Compilation::ptr_eq(&emptied, &emptied.remove_all_syntax_trees()));
    Ok(())
}

#[test]
fn test_remove_references_contract() -> Result<()> {
    let extra = MetadataReference::from_metadata(
        AssemblyMetadata::builder(AssemblyIdentity::new("Extra")).build(),
        Some("Extra.dll"),
    );
    let compilation = library("Lib", &["class A {}"])?;

    match compilation.remove_references([&extra]) {
        Err(Error::Argument { param, .. }) => assert_eq!(param, "references"),
        other => panic!("expected an argument error, got {:?}", other.map(|_| ())),
    }

    let twice = compilation.add_references([extra.clone(), extra.clone()]);
    assert_eq!(twice.external_references().len(), 3);
    let removed = twice.remove_references([&extra])?;
    assert_eq!(removed.external_references().len(), 1);
    assert!(!removed.external_references().contains(&extra));
    Ok(())
}

#[test]
fn test_submission_slots() -> Result<()> {
    let options = CompilationOptions::new(OutputKind::DynamicallyLinkedLibrary);
    let sources = ["var a = 1;", "using System;", "var b = 2;", "var c = 3;"];
    let mut chain: Vec<Compilation> = Vec::new();
    for (i, source) in sources.iter().enumerate() {
        let submission = MiniLanguage::create_script_compilation(
            &format!("Submission{i}"),
            Some(MiniLanguage::parse_script(source, &format!("{i}.csx"))),
            [corlib()],
            options.clone(),
            chain.last(),
        )?;
        chain.push(submission);
    }

    let slots: Vec<i32> = chain
        .iter()
        .map(Compilation::get_submission_slot_index)
        .collect::<Result<_>>()?;
    assert_eq!(slots, vec![0, 0, 1, 2]);
    assert!(chain.iter().all(Compilation::is_submission));

    // Resolved once.
    assert_eq!(chain[3].get_submission_slot_index()?, 2);
    Ok(())
}

#[test]
fn test_accessibility_within_compilation() -> Result<()> {
    let compilation = library(
        "Access",
        &["public class Foo { private void Hidden() {} public void Shown() {} }\nclass Other {}"],
    )?;
    let foo = compilation.get_type_by_metadata_name("Foo")?.expect("Foo");
    let other = compilation.get_type_by_metadata_name("Other")?.expect("Other");
    let within = Symbol::Type(TypeSymbol::Named(other));

    let method = |name: &str| {
        foo.methods()
            .find(|m| m.name() == name)
            .cloned()
            .map(Symbol::Method)
            .expect("method exists")
    };
    assert!(compilation.is_symbol_accessible_within(&method("Shown"), &within, None)?);
    assert!(!compilation.is_symbol_accessible_within(&method("Hidden"), &within, None)?);

    let assembly = Symbol::Assembly(compilation.assembly()?);
    assert!(compilation.is_symbol_accessible_within(
        &Symbol::Type(TypeSymbol::Named(Arc::clone(&foo))),
        &assembly,
        None
    )?);
    Ok(())
}

#[test]
fn test_accessibility_rejects_foreign_symbols() -> Result<()> {
    let compilation = library("Access", &["class Mine {}"])?;
    let stranger = library("Stranger", &["public class Theirs {}"])?;
    let theirs = stranger.get_type_by_metadata_name("Theirs")?.expect("Theirs");
    let within = Symbol::Assembly(compilation.assembly()?);

    let result = compilation.is_symbol_accessible_within(
        &Symbol::Type(TypeSymbol::Named(theirs)),
        &within,
        None,
    );
    assert!(matches!(result, Err(Error::Argument { .. })));
    Ok(())
}

#[test]
fn test_referenced_compilation_symbols_are_accessible() -> Result<()> {
    let dependency = library("Dependency", &["public class Shared {}"])?;
    let consumer = library("Consumer", &["class User : Shared {}"])?
        .add_references([MetadataReference::from_compilation(&dependency)]);

    let user = consumer.get_type_by_metadata_name("User")?.expect("User");
    let shared = user.base_type().expect("base type");
    let within = Symbol::Type(TypeSymbol::Named(user));
    assert!(consumer.is_symbol_accessible_within(&Symbol::Type(shared), &within, None)?);
    Ok(())
}

#[test]
fn test_submission_sees_references_of_earlier_submissions() -> Result<()> {
    let options = CompilationOptions::new(OutputKind::DynamicallyLinkedLibrary);
    let dependency = library("Dependency", &["public class Shared {}"])?;
    let unrelated = library("Unrelated", &["public class Elsewhere {}"])?;

    let first = MiniLanguage::create_script_compilation(
        "Submission0",
        Some(MiniLanguage::parse_script("var a = 1;", "0.csx")),
        [corlib(), MetadataReference::from_compilation(&dependency)],
        options.clone(),
        None,
    )?;
    let second = MiniLanguage::create_script_compilation(
        "Submission1",
        Some(MiniLanguage::parse_script("var b = 2;", "1.csx")),
        [corlib()],
        options,
        Some(&first),
    )?;
    let within = Symbol::Assembly(second.assembly()?);

    let shared = dependency.get_type_by_metadata_name("Shared")?.expect("Shared");
    assert!(second.is_symbol_accessible_within(
        &Symbol::Type(TypeSymbol::Named(shared)),
        &within,
        None
    )?);

    let elsewhere = unrelated.get_type_by_metadata_name("Elsewhere")?.expect("Elsewhere");
    let outside = second.is_symbol_accessible_within(
        &Symbol::Type(TypeSymbol::Named(elsewhere)),
        &within,
        None,
    );
    assert!(matches!(outside, Err(Error::Argument { .. })));
    Ok(())
}

#[test]
fn test_cancelled_query() -> Result<()> {
    let compilation = library("Lib", &["class A {}"])?;
    let cancel = CancellationToken::new();
    cancel.cancel();
    assert!(matches!(
        compilation.get_diagnostics(&cancel),
        Err(Error::Cancelled)
    ));
    Ok(())
}
