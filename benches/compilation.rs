#![allow(unused)]
extern crate dotcompile;

use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion};
use dotcompile::{
    key::DeterministicKeyOptions,
    prelude::*,
};
use std::hint::black_box;

fn trees(count: usize) -> Vec<SyntaxTree> {
    (0..count)
        .map(|i| MiniLanguage::parse(&format!("class C{i} {{ int F() {{ return {i}; }} }}"), &format!("c{i}.mini")))
        .collect()
}

/// Benchmark replacing one tree in lists of growing size
///
/// Repeated edits at the same position only swap the middle element, so the
/// cost should stay flat as the list grows.
fn bench_tree_list_edits(c: &mut Criterion) {
    let mut group = c.benchmark_group("tree_list_set_item");
    for count in [16usize, 256, 4096] {
        let list = SyntaxTreeList::from_trees(trees(count));
        let replacement = MiniLanguage::parse("class Edited {}", "edited.mini");
        let index = count / 2;
        let primed = list.set_item(index, replacement.clone()).unwrap();

        group.bench_with_input(BenchmarkId::from_parameter(count), &primed, |b, list| {
            b.iter(|| {
                let edited = list.set_item(black_box(index), replacement.clone()).unwrap();
                black_box(edited)
            });
        });
    }
    group.finish();
}

/// Benchmark deriving a compilation by replacing one tree
fn bench_replace_syntax_tree(c: &mut Criterion) {
    let compilation = MiniLanguage::create_compilation(
        Some("Bench"),
        trees(256),
        [MetadataReference::from_metadata(AssemblyMetadata::core_library(), None)],
        CompilationOptions::default(),
    )
    .unwrap();
    let old = compilation.syntax_trees().get(128).unwrap().clone();
    let new = MiniLanguage::parse("class C128 { int F() { return -1; } }", "c128.mini");

    c.bench_function("replace_syntax_tree", |b| {
        b.iter(|| {
            let derived = compilation
                .replace_syntax_tree(black_box(&old), Some(new.clone()))
                .unwrap();
            black_box(derived)
        });
    });
}

/// Benchmark building deterministic keys
fn bench_deterministic_key(c: &mut Criterion) {
    let mut group = c.benchmark_group("deterministic_key");
    for count in [1usize, 64, 512] {
        let compilation = MiniLanguage::create_compilation(
            Some("Bench"),
            trees(count),
            [MetadataReference::from_metadata(AssemblyMetadata::core_library(), None)],
            CompilationOptions::default().with_deterministic(true),
        )
        .unwrap();
        let emit_options = EmitOptions::default();

        group.bench_with_input(BenchmarkId::from_parameter(count), &compilation, |b, compilation| {
            b.iter(|| {
                let key = compilation
                    .get_deterministic_key(Some(&emit_options), DeterministicKeyOptions::IGNORE_TOOL_VERSIONS)
                    .unwrap();
                black_box(key)
            });
        });
    }
    group.finish();
}

criterion_group!(
    benches,
    bench_tree_list_edits,
    bench_replace_syntax_tree,
    bench_deterministic_key
);
criterion_main!(benches);
