// Copyright 2025 Johann Kempter
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.
//
// SPDX-License-Identifier: Apache-2.0

#![doc(html_no_source)]
#![deny(missing_docs)]
#![allow(dead_code)]
#![allow(clippy::too_many_arguments)]

//! # dotcompile
//!
//! An immutable, incrementally derivable compilation model and emit pipeline for
//! .NET-targeting compilers, written in pure Rust.
//!
//! A [`Compilation`] is one invocation of the compiler: syntax trees, metadata
//! references and options. It is never mutated. Every `with_*`, `add_*`, `remove_*`
//! and `replace_*` call returns a new compilation that shares whatever state the
//! change did not affect, so replacing one tree keeps the bound references and
//! changing only the options keeps the declaration table.
//!
//! ## Features
//!
//! - **Incremental state reuse** - reference binding, declarations and symbol tables are shared between derived compilations
//! - **Deterministic emit** - byte-identical PE images and portable PDBs for identical inputs
//! - **Edit and Continue** - metadata, IL and PDB deltas against an [`emit::EmitBaseline`]
//! - **Deterministic keys** - a canonical JSON description of every compiler input
//! - **Operation trees** - a language-neutral semantic tree with visitors, walkers and flow analysis
//!
//! ## Quick Start
//!
//! ```rust
//! use dotcompile::prelude::*;
//!
//! let tree = MiniLanguage::parse("public class Greeter { public int Answer() { return 42; } }", "greeter.mini");
//! let compilation = MiniLanguage::create_compilation(
//!     Some("Greeter"),
//!     [tree],
//!     [MetadataReference::from_metadata(AssemblyMetadata::core_library(), None)],
//!     CompilationOptions::new(OutputKind::DynamicallyLinkedLibrary),
//! )?;
//!
//! let mut pe = MemoryStream::new();
//! let result = compilation.emit(EmitArguments::new(&mut pe))?;
//! assert!(result.success);
//! assert_eq!(&pe.as_slice()[..2], b"MZ");
//! # Ok::<(), dotcompile::Error>(())
//! ```
//!
//! ## Architecture
//!
//! - [`syntax`] - source text, language-neutral syntax nodes and the copy-on-write tree list
//! - [`options`] - parse, compilation and emit options, each an immutable record with builders
//! - [`references`] - metadata references, assembly identities and the reference manager
//! - [`symbols`] - assemblies, namespaces, types and members, plus accessibility rules
//! - [`compilation`] - the compilation itself, its derivation rules and semantic queries
//! - [`diagnostics`] - diagnostics, severities and option-driven filtering
//! - [`emit`] - module building, PE and PDB serialization, resources and EnC deltas
//! - [`key`] - deterministic keys
//! - [`operations`] - the operation tree and its traversal protocol
//! - [`lang`] - Mini, a small C#-like language plugged in through [`compilation::Language`]
//!
//! ## Error Handling
//!
//! Contract violations (a foreign tree, a negative arity, a reference that does not
//! belong to the compilation) are returned as [`Error`]. Problems with the user's
//! program are never errors: they are [`diagnostics::Diagnostic`]s collected by the
//! query or emit call that found them.

#[macro_use]
pub(crate) mod macros;

#[macro_use]
pub(crate) mod error;

pub mod compilation;
pub mod diagnostics;
pub mod emit;
pub mod key;
pub mod lang;
pub mod operations;
pub mod options;
pub mod references;
pub mod symbols;
pub mod syntax;
pub mod utils;

/// Convenient re-exports of the most commonly used types and traits.
///
/// # Example
///
/// ```rust
/// use dotcompile::prelude::*;
///
/// let options = CompilationOptions::new(OutputKind::ConsoleApplication)
///     .with_platform(Platform::X64);
/// assert!(options.platform().requires_64bit());
/// ```
pub mod prelude;

/// `dotcompile` Result type
///
/// A type alias for [`std::result::Result<T, Error>`] where the error type is always [`Error`].
///
/// # Examples
///
/// ```rust
/// use dotcompile::{lang::MiniLanguage, options::CompilationOptions, Compilation, Result};
///
/// fn empty_library() -> Result<Compilation> {
///     MiniLanguage::create_compilation(Some("Empty"), [], [], CompilationOptions::default())
/// }
/// # empty_library().unwrap();
/// ```
pub type Result<T> = std::result::Result<T, Error>;

/// `dotcompile` Error type
///
/// Returned for misuse of the API. Source-level problems are reported as diagnostics.
///
/// # Examples
///
/// ```rust
/// use dotcompile::{lang::MiniLanguage, options::CompilationOptions, Error};
///
/// let compilation =
///     MiniLanguage::create_compilation(Some("A"), [], [], CompilationOptions::default())?;
/// let foreign = MiniLanguage::parse("class C {}", "c.mini");
/// match compilation.replace_syntax_tree(&foreign, None) {
///     Err(Error::Argument { .. }) => {}
///     other => panic!("unexpected: {:?}", other.map(|_| ())),
/// }
/// # Ok::<(), dotcompile::Error>(())
/// ```
pub use error::Error;

/// The compilation model entry point.
///
/// See [`compilation::Compilation`].
pub use compilation::Compilation;
