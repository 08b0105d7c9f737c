//! The compilation model.
//!
//! A [`Compilation`] is an immutable snapshot of one compiler invocation: syntax trees,
//! references and options, plus everything derived from them on demand. Derived
//! state (reference binding, declared symbols, bound method bodies) is computed at
//! most once per instance and cached in write-once cells.
//!
//! Every `with_*`, `add_*`, `remove_*` and `replace_*` call returns a new compilation
//! and leaves the original untouched. Derived compilations share the reference
//! binding of their source whenever the inputs it depends on are unchanged: editing
//! trees keeps it unless `#r` directives change, and changing options keeps it unless
//! the import options or the metadata resolver change.
//!
//! # Key Components
//!
//! - [`Compilation`] - The snapshot and its query surface
//! - [`Language`] - Plug-in seam for parsing, declaration and binding
//! - [`SymbolLookup`] - Type name resolution across visible assemblies
//! - [`SemanticModel`] - Per-tree symbol, operation and flow queries
//! - [`CompilationEvent`] - Phase notifications posted to an [`AsyncQueue`]
//! - [`ModuleCompilationState`] - Write-then-freeze table used while compiling methods
//!
//! # Submissions
//!
//! Script submissions form a chain through [`Compilation::previous_submission`]. Each
//! submission with code is assigned the next slot index, while empty submissions share
//! the slot of their predecessor.
//!
//! # Usage Examples
//!
//! ```rust
//! use dotcompile::{
//!     lang::MiniLanguage,
//!     options::{CompilationOptions, OutputKind},
//!     references::{AssemblyMetadata, MetadataReference},
//!     utils::CancellationToken,
//! };
//!
//! let corlib = MetadataReference::from_metadata(AssemblyMetadata::core_library(), None);
//! let compilation = MiniLanguage::create_compilation(
//!     Some("App"),
//!     [MiniLanguage::parse("class Foo {}", "a.mini")],
//!     [corlib],
//!     CompilationOptions::new(OutputKind::DynamicallyLinkedLibrary),
//! )?;
//!
//! assert!(compilation.get_diagnostics(&CancellationToken::none())?.is_empty());
//! assert!(compilation.get_type_by_metadata_name("Foo")?.is_some());
//! # Ok::<(), dotcompile::Error>(())
//! ```

mod events;
mod language;
mod lookup;
mod semantic;
mod side_table;
mod state;

pub use events::CompilationEvent;
pub use language::{BindingContext, BoundBody, DeclarationContext, ImportDirective, Language};
pub use lookup::{ResolvedType, SymbolLookup};
pub use semantic::SemanticModel;
pub use side_table::{SideTable, SideTableKey};
pub use state::ModuleCompilationState;

use std::{
    collections::{BTreeMap, BTreeSet},
    fmt,
    sync::{
        atomic::{AtomicBool, AtomicI32, Ordering},
        Arc, OnceLock,
    },
};

use dashmap::DashSet;
use rayon::prelude::*;

use crate::{
    diagnostics::{Diagnostic, DiagnosticBag, ErrorCode, Location},
    options::CompilationOptions,
    references::{AssemblyIdentity, BoundReferences, MetadataReference, ReferenceManager},
    symbols::{
        is_symbol_accessible, AnonymousTypeManager, AnonymousTypeShape, ArrayTypeSymbol,
        AssemblyOrigin, AssemblySymbol, MethodKind, MethodSymbol, NamedTypeSymbol,
        NamespaceSymbol, PointerTypeSymbol, SpecialType, Symbol, TypeKind, TypeSymbol,
    },
    syntax::{SyntaxTree, SyntaxTreeList, TextSpan},
    utils::{AsyncQueue, CancellationToken, ConcurrentCache},
    Error, Result,
};

/// Slot index of a compilation that is not a submission.
pub const SUBMISSION_SLOT_NOT_APPLICABLE: i32 = -3;

/// Slot index of a submission whose slot has not been resolved yet.
pub const SUBMISSION_SLOT_TO_BE_ALLOCATED: i32 = -2;

const TYPE_CACHE_SIZE: usize = 64;

const MISSING_TYPES: SideTableKey<BTreeSet<String>> = SideTableKey::new("missing-types");
const MISSING_MEMBERS: SideTableKey<BTreeSet<String>> = SideTableKey::new("missing-members");

/// Script-specific inputs of a submission.
#[derive(Clone, Debug, Default)]
pub struct ScriptCompilationInfo {
    previous_submission: Option<Compilation>,
}

impl ScriptCompilationInfo {
    /// Creates script info chained to `previous_submission`.
    #[must_use]
    pub fn new(previous_submission: Option<Compilation>) -> Self {
        ScriptCompilationInfo {
            previous_submission,
        }
    }

    /// The submission this one continues.
    #[must_use]
    pub fn previous_submission(&self) -> Option<&Compilation> {
        self.previous_submission.as_ref()
    }
}

#[derive(Clone)]
struct Inputs {
    assembly_name: Option<String>,
    options: Arc<CompilationOptions>,
    syntax_trees: SyntaxTreeList,
    references: Arc<[MetadataReference]>,
    features: BTreeMap<String, String>,
    script: Option<ScriptCompilationInfo>,
    language: Arc<dyn Language>,
    event_queue: Option<Arc<AsyncQueue<CompilationEvent>>>,
}

/// Declared state: the source assembly and what it was declared against.
pub(crate) struct Declaration {
    pub(crate) assembly: Arc<AssemblySymbol>,
    pub(crate) references: Arc<BoundReferences>,
    pub(crate) lookup: SymbolLookup,
    pub(crate) diagnostics: Vec<Diagnostic>,
}

/// Bound bodies of every source method, in declaration order.
pub(crate) struct MethodBodies {
    pub(crate) bodies: Vec<(Arc<MethodSymbol>, Option<Arc<BoundBody>>)>,
    pub(crate) diagnostics: Vec<Diagnostic>,
}

struct EntryPoint {
    method: Option<Arc<MethodSymbol>>,
    diagnostics: Vec<Diagnostic>,
}

struct CompilationData {
    inputs: Inputs,
    reference_manager: Arc<ReferenceManager>,
    submission_slot: AtomicI32,
    side_table: SideTable,
    used_imports: DashSet<(usize, usize)>,
    type_cache: ConcurrentCache<String, Option<Arc<NamedTypeSymbol>>>,
    declaration: OnceLock<Arc<Declaration>>,
    method_bodies: OnceLock<Arc<MethodBodies>>,
    entry_point: OnceLock<Arc<EntryPoint>>,
    anonymous_types: AnonymousTypeManager,
    events_started: AtomicBool,
    events_completed: AtomicBool,
}

/// An immutable compilation.
///
/// Cloning is cheap and yields the same instance; derived compilations come from the
/// `with_*` family.
#[derive(Clone)]
pub struct Compilation(Arc<CompilationData>);

impl Compilation {
    /// Creates a regular (non-script) compilation.
    ///
    /// # Arguments
    ///
    /// * `language` - Language of every tree
    /// * `assembly_name` - Simple name of the produced assembly
    /// * `syntax_trees` - Source trees, in order
    /// * `references` - Metadata references, in order
    /// * `options` - Compilation options
    ///
    /// # Errors
    ///
    /// Returns [`Error::Argument`] if a tree belongs to another language, is added twice,
    /// or the trees disagree on parse option features.
    pub fn create(
        language: Arc<dyn Language>,
        assembly_name: Option<&str>,
        syntax_trees: impl IntoIterator<Item = SyntaxTree>,
        references: impl IntoIterator<Item = MetadataReference>,
        options: CompilationOptions,
    ) -> Result<Self> {
        let trees: Vec<SyntaxTree> = syntax_trees.into_iter().collect();
        let inputs = Inputs {
            assembly_name: assembly_name.map(str::to_string),
            options: Arc::new(options),
            syntax_trees: SyntaxTreeList::empty(),
            references: references.into_iter().collect(),
            features: BTreeMap::new(),
            script: None,
            language,
            event_queue: None,
        };
        check_new_trees(&inputs, &trees)?;
        let inputs = Inputs {
            syntax_trees: SyntaxTreeList::from_trees(trees),
            ..inputs
        };
        log::debug!(
            "created compilation '{}' with {} trees and {} references",
            inputs.assembly_name.as_deref().unwrap_or("?"),
            inputs.syntax_trees.len(),
            inputs.references.len()
        );
        Ok(Self::from_inputs(inputs, None))
    }

    /// Creates a script submission.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Argument`] if the options are not valid for a submission (see
    /// [`Compilation::check_submission_options`]), the tree is not a script, or the
    /// previous compilation is not a submission of the same language.
    pub fn create_script_compilation(
        language: Arc<dyn Language>,
        assembly_name: &str,
        syntax_tree: Option<SyntaxTree>,
        references: impl IntoIterator<Item = MetadataReference>,
        options: CompilationOptions,
        previous_submission: Option<&Compilation>,
    ) -> Result<Self> {
        Self::check_submission_options(&options)?;
        if let Some(previous) = previous_submission {
            check_previous_submission(language.name(), previous)?;
        }
        let trees: Vec<SyntaxTree> = syntax_tree.into_iter().collect();
        let inputs = Inputs {
            assembly_name: Some(assembly_name.to_string()),
            options: Arc::new(options),
            syntax_trees: SyntaxTreeList::empty(),
            references: references.into_iter().collect(),
            features: BTreeMap::new(),
            script: Some(ScriptCompilationInfo::new(previous_submission.cloned())),
            language,
            event_queue: None,
        };
        check_new_trees(&inputs, &trees)?;
        let inputs = Inputs {
            syntax_trees: SyntaxTreeList::from_trees(trees),
            ..inputs
        };
        log::debug!("created submission '{assembly_name}'");
        Ok(Self::from_inputs(inputs, None))
    }

    /// Validates options for use by a submission: the output must be a library and no
    /// signing option may be set.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Argument`] describing the first violation.
    pub fn check_submission_options(options: &CompilationOptions) -> Result<()> {
        if options.output_kind() != crate::options::OutputKind::DynamicallyLinkedLibrary {
            return Err(argument_error!(
                "options",
                "submissions must be compiled as dynamically linked libraries, not {}",
                options.output_kind().name()
            ));
        }
        if options.has_signing_options() {
            return Err(argument_error!(
                "options",
                "submissions cannot be signed"
            ));
        }
        Ok(())
    }

    fn from_inputs(inputs: Inputs, reference_manager: Option<Arc<ReferenceManager>>) -> Self {
        let slot = if inputs.script.is_some() {
            SUBMISSION_SLOT_TO_BE_ALLOCATED
        } else {
            SUBMISSION_SLOT_NOT_APPLICABLE
        };
        Compilation(Arc::new(CompilationData {
            inputs,
            reference_manager: reference_manager.unwrap_or_default(),
            submission_slot: AtomicI32::new(slot),
            side_table: SideTable::new(),
            used_imports: DashSet::new(),
            type_cache: ConcurrentCache::new(TYPE_CACHE_SIZE),
            declaration: OnceLock::new(),
            method_bodies: OnceLock::new(),
            entry_point: OnceLock::new(),
            anonymous_types: AnonymousTypeManager::new(),
            events_started: AtomicBool::new(false),
            events_completed: AtomicBool::new(false),
        }))
    }

    fn derive(&self, inputs: Inputs, reuse_references: bool) -> Self {
        let manager = reuse_references.then(|| Arc::clone(&self.0.reference_manager));
        Self::from_inputs(inputs, manager)
    }

    // Inputs

    /// Simple name of the produced assembly.
    #[must_use]
    pub fn assembly_name(&self) -> Option<&str> {
        self.0.inputs.assembly_name.as_deref()
    }

    /// Compilation options.
    #[must_use]
    pub fn options(&self) -> &CompilationOptions {
        &self.0.inputs.options
    }

    /// Source trees, in order.
    #[must_use]
    pub fn syntax_trees(&self) -> &SyntaxTreeList {
        &self.0.inputs.syntax_trees
    }

    /// References passed in by the caller, in order, duplicates included.
    #[must_use]
    pub fn external_references(&self) -> &[MetadataReference] {
        &self.0.inputs.references
    }

    /// The language of this compilation.
    #[must_use]
    pub fn language(&self) -> &dyn Language {
        self.0.inputs.language.as_ref()
    }

    /// Feature flags.
    #[must_use]
    pub fn features(&self) -> &BTreeMap<String, String> {
        &self.0.inputs.features
    }

    /// Value of feature `name`.
    #[must_use]
    pub fn feature(&self, name: &str) -> Option<&str> {
        self.0.inputs.features.get(name).map(String::as_str)
    }

    /// Script inputs, `None` for regular compilations.
    #[must_use]
    pub fn script_compilation_info(&self) -> Option<&ScriptCompilationInfo> {
        self.0.inputs.script.as_ref()
    }

    /// `true` for script submissions.
    #[must_use]
    pub fn is_submission(&self) -> bool {
        self.0.inputs.script.is_some()
    }

    /// The submission this one continues.
    #[must_use]
    pub fn previous_submission(&self) -> Option<&Compilation> {
        self.0
            .inputs
            .script
            .as_ref()
            .and_then(ScriptCompilationInfo::previous_submission)
    }

    /// Queue receiving [`CompilationEvent`]s.
    #[must_use]
    pub fn event_queue(&self) -> Option<&Arc<AsyncQueue<CompilationEvent>>> {
        self.0.inputs.event_queue.as_ref()
    }

    /// Identity of the assembly this compilation produces.
    #[must_use]
    pub fn assembly_identity(&self) -> AssemblyIdentity {
        AssemblyIdentity::new(self.assembly_name().unwrap_or_default())
    }

    /// The reference binder, shared with compilations derived without changing the
    /// references.
    #[must_use]
    pub fn reference_manager(&self) -> &Arc<ReferenceManager> {
        &self.0.reference_manager
    }

    /// Identity comparison.
    #[must_use]
    pub fn ptr_eq(a: &Compilation, b: &Compilation) -> bool {
        Arc::ptr_eq(&a.0, &b.0)
    }

    // Derivation

    /// A compilation with a different assembly name.
    #[must_use]
    pub fn with_assembly_name(&self, assembly_name: Option<&str>) -> Self {
        let inputs = Inputs {
            assembly_name: assembly_name.map(str::to_string),
            ..self.0.inputs.clone()
        };
        self.derive(inputs, false)
    }

    /// A compilation with different options.
    ///
    /// Reference binding is kept unless the import options or the metadata resolver
    /// change.
    #[must_use]
    pub fn with_options(&self, options: CompilationOptions) -> Self {
        let current = self.options();
        let same_resolver = match (
            current.metadata_reference_resolver(),
            options.metadata_reference_resolver(),
        ) {
            (None, None) => true,
            (Some(a), Some(b)) => Arc::ptr_eq(a, b),
            _ => false,
        };
        let reuse =
            same_resolver && current.metadata_import_options() == options.metadata_import_options();
        let inputs = Inputs {
            options: Arc::new(options),
            ..self.0.inputs.clone()
        };
        self.derive(inputs, reuse)
    }

    /// A compilation with exactly `references`.
    #[must_use]
    pub fn with_references(&self, references: impl IntoIterator<Item = MetadataReference>) -> Self {
        let inputs = Inputs {
            references: references.into_iter().collect(),
            ..self.0.inputs.clone()
        };
        self.derive(inputs, false)
    }

    /// Appends references; duplicates are kept. Adding nothing returns `self`.
    #[must_use]
    pub fn add_references(&self, references: impl IntoIterator<Item = MetadataReference>) -> Self {
        let added: Vec<MetadataReference> = references.into_iter().collect();
        if added.is_empty() {
            return self.clone();
        }
        self.with_references(self.external_references().iter().cloned().chain(added))
    }

    /// Removes every occurrence of each of `references`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Argument`] if one of them is not a reference of this compilation.
    pub fn remove_references<'r>(
        &self,
        references: impl IntoIterator<Item = &'r MetadataReference>,
    ) -> Result<Self> {
        let removed: Vec<&MetadataReference> = references.into_iter().collect();
        if removed.is_empty() {
            return Ok(self.clone());
        }
        for reference in &removed {
            if !self.external_references().contains(reference) {
                return Err(argument_error!(
                    "references",
                    "'{}' is not a reference of this compilation",
                    reference.display()
                ));
            }
        }
        Ok(self.with_references(
            self.external_references()
                .iter()
                .filter(|r| !removed.contains(r))
                .cloned()
                .collect::<Vec<_>>(),
        ))
    }

    /// Removes every reference. Returns `self` when there are none.
    #[must_use]
    pub fn remove_all_references(&self) -> Self {
        if self.external_references().is_empty() {
            return self.clone();
        }
        self.with_references(Vec::new())
    }

    /// Replaces every occurrence of `old` with `new`, or removes it when `new` is `None`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Argument`] if `old` is not a reference of this compilation.
    pub fn replace_reference(
        &self,
        old: &MetadataReference,
        new: Option<MetadataReference>,
    ) -> Result<Self> {
        let Some(new) = new else {
            return self.remove_references([old]);
        };
        if !self.external_references().contains(old) {
            return Err(argument_error!(
                "old_reference",
                "'{}' is not a reference of this compilation",
                old.display()
            ));
        }
        Ok(self.with_references(
            self.external_references()
                .iter()
                .map(|r| if r == old { new.clone() } else { r.clone() })
                .collect::<Vec<_>>(),
        ))
    }

    fn with_trees(&self, syntax_trees: SyntaxTreeList) -> Self {
        let language = self.language();
        let reuse = directive_paths(language, self.syntax_trees())
            == directive_paths(language, &syntax_trees);
        let inputs = Inputs {
            syntax_trees,
            ..self.0.inputs.clone()
        };
        self.derive(inputs, reuse)
    }

    /// Appends trees.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Argument`] if a tree belongs to another language, is already
    /// present, disagrees with the others on features, or would give a submission more
    /// than one tree.
    pub fn add_syntax_trees(&self, trees: impl IntoIterator<Item = SyntaxTree>) -> Result<Self> {
        let trees: Vec<SyntaxTree> = trees.into_iter().collect();
        if trees.is_empty() {
            return Ok(self.clone());
        }
        check_new_trees(&self.0.inputs, &trees)?;
        Ok(self.with_trees(self.syntax_trees().add_range(trees)))
    }

    /// Removes trees.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Argument`] if one of them is not in this compilation.
    pub fn remove_syntax_trees<'t>(
        &self,
        trees: impl IntoIterator<Item = &'t SyntaxTree>,
    ) -> Result<Self> {
        let removed: Vec<&SyntaxTree> = trees.into_iter().collect();
        if removed.is_empty() {
            return Ok(self.clone());
        }
        for tree in &removed {
            if !self.syntax_trees().contains(tree) {
                return Err(argument_error!(
                    "trees",
                    "'{}' is not part of this compilation",
                    tree.file_path()
                ));
            }
        }
        Ok(self.with_trees(self.syntax_trees().remove_all(|t| removed.contains(&t))))
    }

    /// Removes every tree.
    #[must_use]
    pub fn remove_all_syntax_trees(&self) -> Self {
        if self.syntax_trees().is_empty() {
            return self.clone();
        }
        self.with_trees(SyntaxTreeList::empty())
    }

    /// Replaces `old` with `new`, or removes `old` when `new` is `None`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Argument`] if `old` is missing or `new` is invalid for
    /// [`Compilation::add_syntax_trees`].
    pub fn replace_syntax_tree(&self, old: &SyntaxTree, new: Option<SyntaxTree>) -> Result<Self> {
        let Some(new) = new else {
            return self.remove_syntax_trees([old]);
        };
        if !self.syntax_trees().contains(old) {
            return Err(argument_error!(
                "old_tree",
                "'{}' is not part of this compilation",
                old.file_path()
            ));
        }
        if self.syntax_trees().contains(&new) {
            return Err(argument_error!(
                "new_tree",
                "'{}' is already part of this compilation",
                new.file_path()
            ));
        }
        check_tree_language(self.language().name(), &new)?;
        check_common_features(
            self.syntax_trees()
                .iter()
                .filter(|t| *t != old)
                .chain(std::iter::once(&new)),
        )?;
        Ok(self.with_trees(self.syntax_trees().replace(old, new)?))
    }

    /// Turns this compilation into a submission chained to `previous_submission`, or
    /// back into a regular compilation with `None`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Argument`] if the options or the previous compilation are not
    /// valid for a submission.
    pub fn with_script_compilation_info(&self, info: Option<ScriptCompilationInfo>) -> Result<Self> {
        if let Some(info) = &info {
            Self::check_submission_options(self.options())?;
            if let Some(previous) = info.previous_submission() {
                check_previous_submission(self.language().name(), previous)?;
            }
            if self.syntax_trees().len() > 1 {
                return Err(argument_error!(
                    "info",
                    "a submission can have at most one syntax tree"
                ));
            }
        }
        let inputs = Inputs {
            script: info,
            ..self.0.inputs.clone()
        };
        Ok(self.derive(inputs, false))
    }

    /// A compilation that posts [`CompilationEvent`]s to `queue`.
    #[must_use]
    pub fn with_event_queue(&self, queue: Option<Arc<AsyncQueue<CompilationEvent>>>) -> Self {
        let inputs = Inputs {
            event_queue: queue,
            ..self.0.inputs.clone()
        };
        self.derive(inputs, true)
    }

    /// A compilation with different feature flags.
    #[must_use]
    pub fn with_features<K: Into<String>, V: Into<String>>(
        &self,
        features: impl IntoIterator<Item = (K, V)>,
    ) -> Self {
        let inputs = Inputs {
            features: features
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
            ..self.0.inputs.clone()
        };
        self.derive(inputs, true)
    }

    // Declaration

    pub(crate) fn declaration(&self) -> Result<Arc<Declaration>> {
        if let Some(declaration) = self.0.declaration.get() {
            return Ok(Arc::clone(declaration));
        }

        let references = self.0.reference_manager.bind(self)?;
        let mut diagnostics = references.diagnostics().to_vec();
        let language = Arc::clone(&self.0.inputs.language);
        let options = self.options();
        let module_name = match options.module_name() {
            Some(name) => name.to_string(),
            None => format!(
                "{}{}",
                self.assembly_name().unwrap_or("?"),
                options.output_kind().default_extension()
            ),
        };

        let assembly = AssemblySymbol::new(
            self.assembly_identity(),
            AssemblyOrigin::Source,
            module_name,
            Vec::new(),
            |weak| language.declare_types(self.syntax_trees(), options, weak, &mut diagnostics),
        );

        let mut assemblies = vec![Arc::clone(&assembly)];
        let mut previous = self.previous_submission();
        while let Some(submission) = previous {
            assemblies.push(submission.assembly()?);
            previous = submission.previous_submission();
        }
        assemblies.extend(references.assemblies().iter().cloned());
        let lookup = SymbolLookup::new(
            assemblies,
            references.core_library().cloned(),
            options.usings().to_vec(),
            self.missing_types(),
        );

        let context = DeclarationContext {
            compilation: self,
            assembly: &assembly,
            lookup: &lookup,
        };
        diagnostics.extend(language.complete_types(&context)?);

        if references.core_library().is_none()
            && assembly.get_type_by_metadata_name("System.Object").is_none()
        {
            diagnostics.push(ErrorCode::NoCoreLibrary.at_none(&[]));
        }

        log::debug!(
            "declared {} source types in '{}' ({} diagnostics)",
            assembly.types().len(),
            assembly.identity().name(),
            diagnostics.len()
        );

        let computed = Arc::new(Declaration {
            assembly,
            references,
            lookup,
            diagnostics,
        });
        let declaration = Arc::clone(self.0.declaration.get_or_init(|| computed));
        self.post_declaration_events(&declaration);
        Ok(declaration)
    }

    fn post_declaration_events(&self, declaration: &Declaration) {
        let Some(queue) = self.event_queue() else {
            return;
        };
        if self.0.events_started.swap(true, Ordering::AcqRel) {
            return;
        }
        queue.try_enqueue(CompilationEvent::CompilationStarted);
        for ty in declaration.assembly.types() {
            queue.try_enqueue(CompilationEvent::SymbolDeclared(Symbol::from(Arc::clone(ty))));
            for member in ty.members() {
                queue.try_enqueue(CompilationEvent::SymbolDeclared(member.clone()));
            }
        }
    }

    /// The source assembly.
    ///
    /// # Errors
    ///
    /// Propagates failures binding references or declaring types.
    pub fn assembly(&self) -> Result<Arc<AssemblySymbol>> {
        Ok(Arc::clone(&self.declaration()?.assembly))
    }

    /// The source module. A compilation produces a single-module assembly, so this is
    /// the assembly symbol.
    ///
    /// # Errors
    ///
    /// See [`Compilation::assembly`].
    pub fn source_module_symbol(&self) -> Result<Arc<AssemblySymbol>> {
        self.assembly()
    }

    /// Global namespace of the source assembly.
    ///
    /// # Errors
    ///
    /// See [`Compilation::assembly`].
    pub fn global_namespace(&self) -> Result<Arc<NamespaceSymbol>> {
        Ok(Arc::clone(self.assembly()?.global_namespace()))
    }

    /// Every bound reference: external references followed by `#r` references.
    ///
    /// # Errors
    ///
    /// Propagates reference binding failures.
    pub fn references(&self) -> Result<Vec<MetadataReference>> {
        Ok(self.0.reference_manager.bind(self)?.references().to_vec())
    }

    /// Assemblies bound from the references.
    ///
    /// # Errors
    ///
    /// Propagates reference binding failures.
    pub fn referenced_assemblies(&self) -> Result<Vec<Arc<AssemblySymbol>>> {
        Ok(self.0.reference_manager.bind(self)?.assemblies().to_vec())
    }

    /// Assembly symbol bound for `reference`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Argument`] if `reference` is not a reference of this compilation.
    pub fn get_assembly_or_module_symbol(
        &self,
        reference: &MetadataReference,
    ) -> Result<Arc<AssemblySymbol>> {
        let bound = self.0.reference_manager.bind(self)?;
        bound.assembly_for(reference).cloned().ok_or_else(|| {
            argument_error!(
                "reference",
                "'{}' is not a reference of this compilation",
                reference.display()
            )
        })
    }

    /// Type lookup used by declaration and binding.
    ///
    /// # Errors
    ///
    /// See [`Compilation::assembly`].
    pub fn symbol_lookup(&self) -> Result<SymbolLookup> {
        Ok(self.declaration()?.lookup.clone())
    }

    /// Finds a type by full metadata name (`Namespace.Name` or ``Name`1``).
    ///
    /// The source assembly wins; otherwise a type is returned only when exactly one
    /// referenced assembly defines it. Results are cached.
    ///
    /// # Errors
    ///
    /// See [`Compilation::assembly`].
    pub fn get_type_by_metadata_name(&self, name: &str) -> Result<Option<Arc<NamedTypeSymbol>>> {
        if self.is_type_missing(name) {
            return Ok(None);
        }
        let key = name.to_string();
        if let Some(hit) = self.0.type_cache.get(&key) {
            return Ok(hit);
        }

        let declaration = self.declaration()?;
        let found = match declaration.assembly.get_type_by_metadata_name(name) {
            Some(found) => Some(found),
            None => {
                let mut candidates = declaration.references.find_types(name);
                if candidates.len() == 1 {
                    candidates.pop()
                } else {
                    None
                }
            }
        };
        self.0.type_cache.insert(key, found.clone());
        Ok(found)
    }

    /// A predefined type.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Argument`] for [`SpecialType::None`].
    pub fn get_special_type(&self, special: SpecialType) -> Result<TypeSymbol> {
        if special == SpecialType::None {
            return Err(argument_error!("special_type", "SpecialType::None has no type"));
        }
        Ok(self.declaration()?.lookup.special_type(special))
    }

    // Symbol factories

    /// Array of `element_type` with `rank` dimensions.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Argument`] if `rank` is zero.
    pub fn create_array_type_symbol(&self, element_type: TypeSymbol, rank: usize) -> Result<TypeSymbol> {
        Ok(TypeSymbol::Array(ArrayTypeSymbol::new(element_type, rank)?))
    }

    /// Pointer to `pointed_at`.
    #[must_use]
    pub fn create_pointer_type_symbol(&self, pointed_at: TypeSymbol) -> TypeSymbol {
        TypeSymbol::Pointer(PointerTypeSymbol::new(pointed_at))
    }

    /// Error type standing in for an unresolved name.
    #[must_use]
    pub fn create_error_type_symbol(
        &self,
        namespace: &str,
        name: &str,
        arity: usize,
    ) -> Arc<NamedTypeSymbol> {
        NamedTypeSymbol::error(namespace, name, arity)
    }

    /// Tuple of `element_types`, optionally with element names.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Argument`] if there are fewer than two or more than seven
    /// elements, or the names do not match the types in length.
    pub fn create_tuple_type_symbol(
        &self,
        element_types: Vec<TypeSymbol>,
        element_names: Option<Vec<Option<String>>>,
    ) -> Result<Arc<NamedTypeSymbol>> {
        let cardinality = element_types.len();
        if !(2..=7).contains(&cardinality) {
            return Err(argument_error!(
                "element_types",
                "tuples must have between 2 and 7 elements, got {}",
                cardinality
            ));
        }
        let names = match element_names {
            Some(names) if names.len() != cardinality => {
                return Err(argument_error!(
                    "element_names",
                    "{} element names for {} element types",
                    names.len(),
                    cardinality
                ))
            }
            Some(names) => names,
            None => vec![None; cardinality],
        };
        let definition = self
            .get_type_by_metadata_name(&format!("System.ValueTuple`{cardinality}"))?
            .unwrap_or_else(|| NamedTypeSymbol::error("System", "ValueTuple", cardinality));
        NamedTypeSymbol::construct_with_names(&definition, element_types, Some(names))
    }

    /// A standalone anonymous type with the given members.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Argument`] if names and types differ in length or a name is
    /// empty or repeated.
    pub fn create_anonymous_type_symbol(
        &self,
        member_types: Vec<TypeSymbol>,
        member_names: Vec<String>,
    ) -> Result<Arc<NamedTypeSymbol>> {
        let shape = AnonymousTypeShape::new(member_names, member_types)?;
        let declaration = self.declaration()?;
        let object = declaration.lookup.special_type(SpecialType::Object);
        AnonymousTypeManager::create_unregistered(
            &shape,
            &Arc::downgrade(&declaration.assembly),
            Some(object),
        )
    }

    /// The anonymous type template for `shape`, shared with previous submissions.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidOperation`] if a new template is needed after templates
    /// were sealed.
    pub fn get_or_create_anonymous_type_template(
        &self,
        shape: &AnonymousTypeShape,
    ) -> Result<Arc<NamedTypeSymbol>> {
        let mut previous = Vec::new();
        let mut current = self.previous_submission();
        while let Some(submission) = current {
            submission.ensure_anonymous_type_templates(&CancellationToken::none())?;
            previous.push(&submission.0.anonymous_types);
            current = submission.previous_submission();
        }
        let declaration = self.declaration()?;
        let object = declaration.lookup.special_type(SpecialType::Object);
        self.0.anonymous_types.get_or_create(
            shape,
            &previous,
            &Arc::downgrade(&declaration.assembly),
            Some(object),
        )
    }

    /// Anonymous type templates created by this compilation.
    #[must_use]
    pub fn anonymous_type_templates(&self) -> Vec<Arc<NamedTypeSymbol>> {
        self.0.anonymous_types.templates()
    }

    /// Binds this submission (or the nearest earlier one with code) so that every
    /// anonymous type template it needs exists, then seals its templates.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidOperation`] for regular compilations and propagates
    /// binding failures.
    pub fn ensure_anonymous_type_templates(&self, cancel: &CancellationToken) -> Result<()> {
        if !self.is_submission() {
            return Err(Error::InvalidOperation(
                "anonymous type templates are only shared between submissions".to_string(),
            ));
        }
        if self.has_code_to_emit() {
            if !self.0.anonymous_types.is_sealed() {
                self.method_bodies(cancel)?;
                self.0.anonymous_types.seal();
            }
            return Ok(());
        }
        match self.previous_submission() {
            Some(previous) => previous.ensure_anonymous_type_templates(cancel),
            None => Ok(()),
        }
    }

    // Accessibility

    /// `true` if `symbol` is accessible from `within` (an assembly or named type).
    ///
    /// # Errors
    ///
    /// Returns [`Error::Argument`] if `within` is neither an assembly nor a named type,
    /// or either symbol comes from an assembly that this compilation, its references
    /// and its previous submissions do not contain.
    pub fn is_symbol_accessible_within(
        &self,
        symbol: &Symbol,
        within: &Symbol,
        through_type: Option<&TypeSymbol>,
    ) -> Result<bool> {
        if !matches!(
            within,
            Symbol::Assembly(_) | Symbol::Type(TypeSymbol::Named(_))
        ) {
            return Err(argument_error!(
                "within",
                "must be an assembly or a named type, got {}",
                within.display_name()
            ));
        }
        self.check_symbol_in_compilation(symbol, "symbol")?;
        self.check_symbol_in_compilation(within, "within")?;
        if let Some(through) = through_type {
            self.check_symbol_in_compilation(&Symbol::Type(through.clone()), "through_type")?;
        }
        Ok(is_symbol_accessible(symbol, within, through_type))
    }

    fn check_symbol_in_compilation(&self, symbol: &Symbol, param: &'static str) -> Result<()> {
        let Some(assembly) = symbol.containing_assembly() else {
            return Ok(());
        };
        let mut current = Some(self);
        while let Some(compilation) = current {
            let declaration = compilation.declaration()?;
            if Arc::ptr_eq(&declaration.assembly, &assembly)
                || declaration.references.contains_assembly(&assembly)
            {
                return Ok(());
            }
            current = compilation.previous_submission();
        }
        Err(argument_error!(
            param,
            "'{}' is not defined in this compilation or its references",
            symbol.display_name()
        ))
    }

    // Submissions

    /// `true` if any tree produces IL.
    #[must_use]
    pub fn has_code_to_emit(&self) -> bool {
        self.syntax_trees()
            .iter()
            .any(|tree| self.language().has_code_to_emit(tree))
    }

    /// Slot of this submission in the submission array.
    ///
    /// Resolved once, after the previous submission's slot: a submission with code
    /// takes the next slot, one without shares its predecessor's. Regular compilations
    /// return [`SUBMISSION_SLOT_NOT_APPLICABLE`].
    ///
    /// # Errors
    ///
    /// Propagates failures resolving earlier submissions.
    pub fn get_submission_slot_index(&self) -> Result<i32> {
        let current = self.0.submission_slot.load(Ordering::Acquire);
        if current != SUBMISSION_SLOT_TO_BE_ALLOCATED {
            return Ok(current);
        }

        let last = match self.previous_submission() {
            Some(previous) => previous.get_submission_slot_index()?,
            None => -1,
        };
        let slot = if self.has_code_to_emit() { last + 1 } else { last };

        match self.0.submission_slot.compare_exchange(
            SUBMISSION_SLOT_TO_BE_ALLOCATED,
            slot,
            Ordering::AcqRel,
            Ordering::Acquire,
        ) {
            Ok(_) => Ok(slot),
            Err(existing) => Ok(existing),
        }
    }

    // Side table

    /// Makes `metadata_name` unresolvable in this compilation. Must be called before
    /// the first semantic query.
    pub fn make_type_missing(&self, metadata_name: &str) {
        self.0.side_table.update(&MISSING_TYPES, |names| {
            names.insert(metadata_name.to_string());
        });
    }

    /// Makes the member `Namespace.Type.Member` unresolvable in this compilation.
    pub fn make_member_missing(&self, qualified_name: &str) {
        self.0.side_table.update(&MISSING_MEMBERS, |names| {
            names.insert(qualified_name.to_string());
        });
    }

    /// `true` if [`Compilation::make_type_missing`] was called for `metadata_name`.
    #[must_use]
    pub fn is_type_missing(&self, metadata_name: &str) -> bool {
        self.0
            .side_table
            .read(&MISSING_TYPES, |names| names.contains(metadata_name))
            .unwrap_or(false)
    }

    /// `true` if [`Compilation::make_member_missing`] was called for `qualified_name`.
    #[must_use]
    pub fn is_member_missing(&self, qualified_name: &str) -> bool {
        self.0
            .side_table
            .read(&MISSING_MEMBERS, |names| names.contains(qualified_name))
            .unwrap_or(false)
    }

    fn missing_types(&self) -> BTreeSet<String> {
        self.0
            .side_table
            .read(&MISSING_TYPES, Clone::clone)
            .unwrap_or_default()
    }

    // Imports

    /// Marks the `using` directive at `span` of `tree` as used.
    pub fn record_import_usage(&self, tree: &SyntaxTree, span: TextSpan) {
        self.0.used_imports.insert((tree.id(), span.start));
    }

    /// `true` if the directive at `span` of `tree` has been used.
    #[must_use]
    pub fn is_import_used(&self, tree: &SyntaxTree, span: TextSpan) -> bool {
        self.0.used_imports.contains(&(tree.id(), span.start))
    }

    /// Adds a hidden diagnostic to `bag` for every `using` directive that binding
    /// never used.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Cancelled`] if `cancel` is signalled.
    pub fn report_unused_imports(&self, bag: &DiagnosticBag, cancel: &CancellationToken) -> Result<()> {
        let mut unused = Vec::new();
        for tree in self.syntax_trees().iter() {
            check_cancelled!(cancel);
            for directive in self.language().import_directives(tree) {
                if !self.is_import_used(tree, directive.span) {
                    unused.push(
                        ErrorCode::UnusedImport
                            .diagnostic(Location::source(tree, directive.span), &[]),
                    );
                }
            }
        }
        bag.filter_and_append(unused, self.options());
        Ok(())
    }

    // Method bodies

    pub(crate) fn method_bodies(&self, cancel: &CancellationToken) -> Result<Arc<MethodBodies>> {
        if let Some(bodies) = self.0.method_bodies.get() {
            return Ok(Arc::clone(bodies));
        }

        let declaration = self.declaration()?;
        let methods: Vec<Arc<MethodSymbol>> = declaration
            .assembly
            .types()
            .iter()
            .flat_map(|ty| ty.methods().cloned().collect::<Vec<_>>())
            .collect();

        let language = self.language();
        let context = BindingContext {
            compilation: self,
            assembly: &declaration.assembly,
            lookup: &declaration.lookup,
        };
        let bind = |method: &Arc<MethodSymbol>| -> Result<(Arc<MethodSymbol>, Option<Arc<BoundBody>>)> {
            check_cancelled!(cancel);
            let body = language.bind_method_body(&context, method)?;
            Ok((Arc::clone(method), body.map(Arc::new)))
        };

        let bodies: Vec<(Arc<MethodSymbol>, Option<Arc<BoundBody>>)> =
            if self.options().concurrent_build() {
                methods.par_iter().map(bind).collect::<Result<_>>()?
            } else {
                methods.iter().map(bind).collect::<Result<_>>()?
            };

        let mut diagnostics = Vec::new();
        for (_, body) in &bodies {
            if let Some(body) = body {
                diagnostics.extend(body.diagnostics.iter().cloned());
            }
        }
        diagnostics.extend(self.entry_point()?.diagnostics.iter().cloned());

        log::debug!(
            "bound {} method bodies ({} diagnostics)",
            bodies.len(),
            diagnostics.len()
        );

        let computed = Arc::new(MethodBodies {
            bodies,
            diagnostics,
        });
        let bodies = Arc::clone(self.0.method_bodies.get_or_init(|| computed));
        self.post_completion_events();
        Ok(bodies)
    }

    fn post_completion_events(&self) {
        let Some(queue) = self.event_queue() else {
            return;
        };
        if self.0.events_completed.swap(true, Ordering::AcqRel) {
            return;
        }
        for tree in self.syntax_trees().iter() {
            queue.try_enqueue(CompilationEvent::CompilationUnitCompleted(tree.clone()));
        }
        queue.try_enqueue(CompilationEvent::CompilationCompleted);
        queue.try_complete();
    }

    /// Bound body of a source method.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Argument`] if `method` is not declared in this compilation.
    pub fn get_method_body(
        &self,
        method: &Arc<MethodSymbol>,
        cancel: &CancellationToken,
    ) -> Result<Option<Arc<BoundBody>>> {
        let bodies = self.method_bodies(cancel)?;
        bodies
            .bodies
            .iter()
            .find(|(m, _)| Arc::ptr_eq(m, method))
            .map(|(_, body)| body.clone())
            .ok_or_else(|| {
                argument_error!(
                    "method",
                    "'{}' is not declared in this compilation",
                    method.documentation_id()
                )
            })
    }

    fn entry_point(&self) -> Result<Arc<EntryPoint>> {
        if let Some(entry) = self.0.entry_point.get() {
            return Ok(Arc::clone(entry));
        }
        let computed = Arc::new(self.find_entry_point()?);
        Ok(Arc::clone(self.0.entry_point.get_or_init(|| computed)))
    }

    fn find_entry_point(&self) -> Result<EntryPoint> {
        let options = self.options();
        if !options.output_kind().is_application() {
            return Ok(EntryPoint {
                method: None,
                diagnostics: Vec::new(),
            });
        }

        let assembly = self.assembly()?;
        if self.is_submission() || self.syntax_trees().iter().any(SyntaxTree::is_script) {
            let script = assembly
                .types()
                .iter()
                .filter(|t| t.type_kind() == TypeKind::Submission)
                .flat_map(|t| t.methods().cloned().collect::<Vec<_>>())
                .find(|m| m.method_kind() == MethodKind::ScriptEntryPoint);
            if script.is_some() {
                return Ok(EntryPoint {
                    method: script,
                    diagnostics: Vec::new(),
                });
            }
        }

        let candidates: Vec<Arc<MethodSymbol>> = assembly
            .types()
            .iter()
            .filter(|t| {
                options
                    .main_type_name()
                    .map_or(true, |main| t.full_name() == main)
            })
            .flat_map(|t| t.methods().cloned().collect::<Vec<_>>())
            .filter(|m| m.name() == "Main" && m.is_static())
            .collect();

        let diagnostics = match candidates.len() {
            0 => vec![ErrorCode::NoEntryPoint.at_none(&[])],
            1 => Vec::new(),
            _ => {
                let location = candidates[1]
                    .declaring_syntax()
                    .map_or(Location::None, |s| Location::source(&s.tree, s.node.span()));
                vec![ErrorCode::MultipleEntryPoints
                    .diagnostic(location, &[&candidates[1].documentation_id()])]
            }
        };
        Ok(EntryPoint {
            method: (candidates.len() == 1).then(|| Arc::clone(&candidates[0])),
            diagnostics,
        })
    }

    /// The method execution starts at, for application output kinds.
    ///
    /// # Errors
    ///
    /// See [`Compilation::assembly`].
    pub fn get_entry_point(&self) -> Result<Option<Arc<MethodSymbol>>> {
        Ok(self.entry_point()?.method.clone())
    }

    // Diagnostics

    fn filtered(&self, raw: impl IntoIterator<Item = Diagnostic>) -> Vec<Diagnostic> {
        let bag = DiagnosticBag::new();
        bag.filter_and_append(raw, self.options());
        bag.to_vec()
    }

    /// Option and parse diagnostics.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Cancelled`] if `cancel` is signalled.
    pub fn get_parse_diagnostics(&self, cancel: &CancellationToken) -> Result<Vec<Diagnostic>> {
        let mut raw = self.options().errors().to_vec();
        for tree in self.syntax_trees().iter() {
            check_cancelled!(cancel);
            raw.extend(tree.diagnostics());
        }
        Ok(self.filtered(raw))
    }

    /// Reference binding and declaration diagnostics.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Cancelled`] if `cancel` is signalled.
    pub fn get_declaration_diagnostics(&self, cancel: &CancellationToken) -> Result<Vec<Diagnostic>> {
        check_cancelled!(cancel);
        Ok(self.filtered(self.declaration()?.diagnostics.iter().cloned()))
    }

    /// Method body and entry point diagnostics.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Cancelled`] if `cancel` is signalled.
    pub fn get_method_body_diagnostics(&self, cancel: &CancellationToken) -> Result<Vec<Diagnostic>> {
        Ok(self.filtered(self.method_bodies(cancel)?.diagnostics.iter().cloned()))
    }

    /// Every diagnostic, in stage order: options and parsing, declaration, method
    /// bodies, unused imports.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Cancelled`] if `cancel` is signalled.
    pub fn get_diagnostics(&self, cancel: &CancellationToken) -> Result<Vec<Diagnostic>> {
        let mut all = self.get_parse_diagnostics(cancel)?;
        all.extend(self.get_declaration_diagnostics(cancel)?);
        all.extend(self.get_method_body_diagnostics(cancel)?);
        let imports = DiagnosticBag::new();
        self.report_unused_imports(&imports, cancel)?;
        all.extend(imports.to_vec());
        Ok(all)
    }

    // Semantic model

    /// Semantic queries over `tree`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Argument`] if `tree` is not part of this compilation.
    pub fn get_semantic_model(&self, tree: &SyntaxTree) -> Result<SemanticModel> {
        if !self.syntax_trees().contains(tree) {
            return Err(argument_error!(
                "tree",
                "'{}' is not part of this compilation",
                tree.file_path()
            ));
        }
        Ok(SemanticModel::new(self.clone(), tree.clone()))
    }
}

impl fmt::Debug for Compilation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Compilation")
            .field("assembly_name", &self.assembly_name())
            .field("language", &self.language().name())
            .field("syntax_trees", &self.syntax_trees().len())
            .field("references", &self.external_references().len())
            .field("is_submission", &self.is_submission())
            .finish_non_exhaustive()
    }
}

fn directive_paths(language: &dyn Language, trees: &SyntaxTreeList) -> Vec<String> {
    trees
        .iter()
        .flat_map(|tree| language.reference_directives(tree))
        .map(|(path, _)| path)
        .collect()
}

fn check_tree_language(language: &str, tree: &SyntaxTree) -> Result<()> {
    if tree.language() != language {
        return Err(argument_error!(
            "trees",
            "'{}' is a {} tree, expected {}",
            tree.file_path(),
            tree.language(),
            language
        ));
    }
    Ok(())
}

fn check_common_features<'t>(trees: impl IntoIterator<Item = &'t SyntaxTree>) -> Result<()> {
    let mut trees = trees.into_iter();
    let Some(first) = trees.next() else {
        return Ok(());
    };
    let features = first.options().features();
    for tree in trees {
        if tree.options().features() != features {
            return Err(argument_error!(
                "trees",
                "'{}' has different features than '{}'",
                tree.file_path(),
                first.file_path()
            ));
        }
    }
    Ok(())
}

fn check_previous_submission(language: &str, previous: &Compilation) -> Result<()> {
    if !previous.is_submission() {
        return Err(argument_error!(
            "previous_submission",
            "the previous compilation is not a submission"
        ));
    }
    if previous.language().name() != language {
        return Err(argument_error!(
            "previous_submission",
            "the previous submission is written in {}",
            previous.language().name()
        ));
    }
    Ok(())
}

fn check_new_trees(inputs: &Inputs, trees: &[SyntaxTree]) -> Result<()> {
    let language = inputs.language.name();
    for (i, tree) in trees.iter().enumerate() {
        check_tree_language(language, tree)?;
        if inputs.syntax_trees.contains(tree) || trees[..i].contains(tree) {
            return Err(argument_error!(
                "trees",
                "'{}' is already part of this compilation",
                tree.file_path()
            ));
        }
        if inputs.script.is_some() && !tree.is_script() {
            return Err(argument_error!(
                "trees",
                "'{}' is not a script; submissions only accept script trees",
                tree.file_path()
            ));
        }
    }
    if inputs.script.is_some() && inputs.syntax_trees.len() + trees.len() > 1 {
        return Err(argument_error!(
            "trees",
            "a submission can have at most one syntax tree"
        ));
    }
    check_common_features(inputs.syntax_trees.iter().chain(trees))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        lang::MiniLanguage,
        options::{OutputKind, ParseOptions},
        references::AssemblyMetadata,
    };

    fn corlib() -> MetadataReference {
        MetadataReference::from_metadata(AssemblyMetadata::core_library(), Some("mscorlib.dll"))
    }

    fn library(sources: &[&str]) -> Compilation {
        let trees: Vec<SyntaxTree> = sources
            .iter()
            .enumerate()
            .map(|(i, s)| MiniLanguage::parse(s, &format!("{i}.mini")))
            .collect();
        MiniLanguage::create_compilation(
            Some("Lib"),
            trees,
            [corlib()],
            CompilationOptions::new(OutputKind::DynamicallyLinkedLibrary),
        )
        .unwrap()
    }

    #[test]
    fn test_with_calls_leave_original_untouched() {
        let original = library(&["class A {}"]);
        let extra = MiniLanguage::parse("class B {}", "b.mini");
        let derived = original.add_syntax_trees([extra]).unwrap();
        assert_eq!(original.syntax_trees().len(), 1);
        assert_eq!(derived.syntax_trees().len(), 2);
        assert!(!Compilation::ptr_eq(&original, &derived));

        let same = original.add_references(Vec::new());
        assert!(Compilation::ptr_eq(&original, &same));
    }

    #[test]
    fn test_tree_edits_reuse_reference_binding() -> Result<()> {
        let original = library(&["class A {}"]);
        original.assembly()?;
        let edited = original.replace_syntax_tree(
            original.syntax_trees().get(0).unwrap(),
            Some(MiniLanguage::parse("class A { int x; }", "0.mini")),
        )?;
        assert!(Arc::ptr_eq(original.reference_manager(), edited.reference_manager()));
        assert!(edited.reference_manager().is_bound());

        let renamed = original.with_assembly_name(Some("Other"));
        assert!(!Arc::ptr_eq(original.reference_manager(), renamed.reference_manager()));

        let checked = original.with_options(original.options().with_check_overflow(true));
        assert!(Arc::ptr_eq(original.reference_manager(), checked.reference_manager()));
        let internal = original.with_options(
            original
                .options()
                .with_metadata_import_options(crate::options::MetadataImportOptions::All),
        );
        assert!(!Arc::ptr_eq(original.reference_manager(), internal.reference_manager()));
        Ok(())
    }

    #[test]
    fn test_tree_validation() {
        let compilation = library(&["class A {}"]);
        let existing = compilation.syntax_trees().get(0).unwrap().clone();
        assert!(matches!(
            compilation.add_syntax_trees([existing]),
            Err(Error::Argument { .. })
        ));

        let featured = MiniLanguage::parse_with_options(
            "class B {}",
            "b.mini",
            &ParseOptions::regular().with_features([("strict", "true")]),
        );
        assert!(matches!(
            compilation.add_syntax_trees([featured]),
            Err(Error::Argument { .. })
        ));

        let stranger = MiniLanguage::parse("class C {}", "c.mini");
        assert!(compilation.remove_syntax_trees([&stranger]).is_err());
    }

    #[test]
    fn test_type_lookup_and_cache() -> Result<()> {
        let compilation = library(&["namespace N { class A {} }"]);
        let a = compilation.get_type_by_metadata_name("N.A")?.unwrap();
        let again = compilation.get_type_by_metadata_name("N.A")?.unwrap();
        assert!(Arc::ptr_eq(&a, &again));
        assert!(compilation.get_type_by_metadata_name("System.String")?.is_some());
        assert!(compilation.get_type_by_metadata_name("N.Missing")?.is_none());

        let hidden = library(&["class A {}"]);
        hidden.make_type_missing("System.String");
        assert!(hidden.get_type_by_metadata_name("System.String")?.is_none());
        Ok(())
    }

    #[test]
    fn test_symbol_factories() -> Result<()> {
        let compilation = library(&["class A {}"]);
        let int = compilation.get_special_type(SpecialType::Int32)?;
        assert!(compilation.get_special_type(SpecialType::None).is_err());

        let array = compilation.create_array_type_symbol(int.clone(), 2)?;
        assert_eq!(array.display_name(), "System.Int32[,]");
        assert!(compilation.create_array_type_symbol(int.clone(), 0).is_err());

        let tuple = compilation.create_tuple_type_symbol(
            vec![int.clone(), int.clone()],
            Some(vec![Some("a".into()), None]),
        )?;
        assert!(tuple.is_tuple());
        assert!(compilation
            .create_tuple_type_symbol(vec![int.clone(), int.clone()], Some(vec![None]))
            .is_err());

        let anonymous =
            compilation.create_anonymous_type_symbol(vec![int.clone()], vec!["X".into()])?;
        assert!(anonymous.is_anonymous());
        assert!(compilation
            .create_anonymous_type_symbol(vec![int], Vec::new())
            .is_err());
        Ok(())
    }

    #[test]
    fn test_submission_requires_library_without_signing() {
        let exe = CompilationOptions::new(OutputKind::ConsoleApplication);
        assert!(Compilation::check_submission_options(&exe).is_err());
        let signed = CompilationOptions::new(OutputKind::DynamicallyLinkedLibrary)
            .with_crypto_key_file(Some("key.snk"));
        assert!(Compilation::check_submission_options(&signed).is_err());
        let plain = CompilationOptions::new(OutputKind::DynamicallyLinkedLibrary);
        assert!(Compilation::check_submission_options(&plain).is_ok());
    }

    #[test]
    fn test_regular_compilation_slot() -> Result<()> {
        let compilation = library(&["class A {}"]);
        assert_eq!(
            compilation.get_submission_slot_index()?,
            SUBMISSION_SLOT_NOT_APPLICABLE
        );
        assert!(compilation
            .ensure_anonymous_type_templates(&CancellationToken::none())
            .is_err());
        Ok(())
    }

    fn submission(source: &str, name: &str, previous: Option<&Compilation>) -> Compilation {
        MiniLanguage::create_script_compilation(
            name,
            Some(MiniLanguage::parse_script(source, &format!("{name}.csx"))),
            [corlib()],
            CompilationOptions::new(OutputKind::DynamicallyLinkedLibrary),
            previous,
        )
        .unwrap()
    }

    fn shape(compilation: &Compilation, member: &str) -> Result<AnonymousTypeShape> {
        let int = compilation.get_special_type(SpecialType::Int32)?;
        AnonymousTypeShape::new(vec![member.to_string()], vec![int])
    }

    #[test]
    fn test_anonymous_templates_unify_across_submissions() -> Result<()> {
        let cancel = CancellationToken::none();
        let s0 = submission("var a = new { X = 1 };", "S0", None);
        let s1 = submission("var b = new { X = 2 };", "S1", Some(&s0));
        let s2 = submission("var c = new { Y = 3 };", "S2", Some(&s1));
        for compilation in [&s0, &s1, &s2] {
            assert!(!compilation.get_diagnostics(&cancel)?.iter().any(Diagnostic::is_error));
        }

        assert_eq!(
            s0.get_special_type(SpecialType::Int32)?,
            s1.get_special_type(SpecialType::Int32)?
        );
        assert_eq!(s0.anonymous_type_templates().len(), 1);
        assert!(s1.anonymous_type_templates().is_empty());
        assert_eq!(s2.anonymous_type_templates().len(), 1);

        let shared = s1.get_or_create_anonymous_type_template(&shape(&s1, "X")?)?;
        assert!(Arc::ptr_eq(&shared, &s0.anonymous_type_templates()[0]));
        Ok(())
    }

    #[test]
    fn test_ensure_templates_seals() -> Result<()> {
        let s0 = submission("var a = new { X = 1 };", "S0", None);
        s0.ensure_anonymous_type_templates(&CancellationToken::none())?;
        assert!(s0.0.anonymous_types.is_sealed());
        assert_eq!(s0.anonymous_type_templates().len(), 1);

        assert!(s0.get_or_create_anonymous_type_template(&shape(&s0, "X")?).is_ok());
        assert!(matches!(
            s0.get_or_create_anonymous_type_template(&shape(&s0, "Y")?),
            Err(Error::InvalidOperation(_))
        ));
        Ok(())
    }

    #[test]
    fn test_ensure_templates_skips_code_free_submissions() -> Result<()> {
        let s0 = submission("var a = new { X = 1 };", "S0", None);
        let s1 = submission("using System;", "S1", Some(&s0));
        assert!(!s1.has_code_to_emit());

        s1.ensure_anonymous_type_templates(&CancellationToken::none())?;
        assert!(s0.0.anonymous_types.is_sealed());
        assert!(!s1.0.anonymous_types.is_sealed());
        assert_eq!(s0.anonymous_type_templates().len(), 1);
        Ok(())
    }

    #[test]
    fn test_ensure_templates_requires_submission() {
        let compilation = library(&["class A { object M() { return new { X = 1 }; } }"]);
        assert!(matches!(
            compilation.ensure_anonymous_type_templates(&CancellationToken::none()),
            Err(Error::InvalidOperation(_))
        ));
    }

    #[test]
    fn test_features() {
        let compilation = library(&["class A {}"]).with_features([("flow", "on")]);
        assert_eq!(compilation.feature("flow"), Some("on"));
        assert_eq!(compilation.feature("other"), None);
    }
}
