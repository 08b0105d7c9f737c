//! Edit and Continue deltas.
//!
//! An [`EmitBaseline`] remembers the row numbers and heap sizes of everything emitted so
//! far. [`Compilation::emit_difference`] writes only the definitions named by a set of
//! [`SemanticEdit`]s on top of it: updated rows keep their row ids, added rows continue
//! after the baseline's, and every touched row is listed in the `EncLog` and `EncMap`
//! tables of a `#-` metadata stream. Each delta returns the baseline for the next one.

use crossbeam_skiplist::SkipMap;
use uguid::Guid;

use crate::{
    compilation::Compilation,
    diagnostics::{Diagnostic, DiagnosticBag, ErrorCode, Location},
    emit::{
        builder::ModuleBuilder,
        codegen::MethodBody,
        metadata::{MetadataBase, MetadataBuilder, TableId, Token},
        pdb::write_portable_pdb,
        pe::build_metadata,
        OutputStream,
    },
    options::EmitOptions,
    symbols::{FieldSymbol, MethodSymbol, NamedTypeSymbol, Symbol, TypeSymbol},
    utils::{align_to_4_bytes, CancellationToken},
    Result,
};

const ENC_FUNC_DEFAULT: u32 = 0;
const ENC_FUNC_ADD_METHOD: u32 = 1;
const ENC_FUNC_ADD_FIELD: u32 = 2;
const ENC_FUNC_ADD_PARAMETER: u32 = 3;

/// State of the last emitted generation.
pub struct EmitBaseline {
    compilation: Compilation,
    ordinal: u32,
    module_name: String,
    module_version_id: Guid,
    encoding_id: Option<Guid>,
    encoding_id_index: u32,
    base: MetadataBase,
    type_defs: SkipMap<String, u32>,
    method_defs: SkipMap<String, u32>,
    field_defs: SkipMap<String, u32>,
    type_refs: SkipMap<(u32, String), u32>,
    member_refs: SkipMap<(Token, String, Vec<u8>), u32>,
    assembly_refs: SkipMap<String, u32>,
}

impl EmitBaseline {
    /// Baseline of the full image of `compilation` with module version id
    /// `module_version_id`.
    ///
    /// Row numbers are recomputed the way the image writer assigns them, so the
    /// compilation must be the one the image was emitted from.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::InvalidOperation`] if the compilation has errors.
    pub fn create_initial(compilation: &Compilation, module_version_id: Guid) -> Result<Self> {
        let cancel = CancellationToken::none();
        let diagnostics = DiagnosticBag::new();
        let mut module = ModuleBuilder::new(compilation, EmitOptions::default(), &cancel)?;
        if !module.compile_methods(compilation, &diagnostics, &cancel)? {
            return Err(crate::Error::InvalidOperation(
                "cannot create a baseline for a compilation with errors".to_string(),
            ));
        }
        let Some((metadata, _, _)) = build_metadata(&module, &diagnostics, &cancel)? else {
            return Err(crate::Error::InvalidOperation(
                "cannot create a baseline for a compilation with unreadable resources".to_string(),
            ));
        };
        Ok(Self::capture(
            compilation.clone(),
            0,
            module.module_name,
            module_version_id,
            None,
            0,
            &metadata,
        ))
    }

    fn capture(
        compilation: Compilation,
        ordinal: u32,
        module_name: String,
        module_version_id: Guid,
        encoding_id: Option<Guid>,
        encoding_id_index: u32,
        metadata: &MetadataBuilder,
    ) -> Self {
        let heap = |size: u32| align_to_4_bytes(u64::from(size)) as u32;
        let base = MetadataBase {
            generation: ordinal + 1,
            row_counts: metadata.aggregate_row_counts(),
            string_heap_size: heap(metadata.strings.aggregate_size()),
            user_string_heap_size: heap(metadata.user_strings.aggregate_size()),
            blob_heap_size: heap(metadata.blobs.aggregate_size()),
            guid_count: metadata.guids.aggregate_count(),
        };

        let baseline = EmitBaseline {
            compilation,
            ordinal,
            module_name,
            module_version_id,
            encoding_id,
            encoding_id_index,
            base,
            type_defs: SkipMap::new(),
            method_defs: SkipMap::new(),
            field_defs: SkipMap::new(),
            type_refs: SkipMap::new(),
            member_refs: SkipMap::new(),
            assembly_refs: SkipMap::new(),
        };
        for (key, &rid) in metadata.type_defs() {
            baseline.type_defs.insert(key.clone(), rid);
        }
        for (key, &rid) in metadata.method_defs() {
            baseline.method_defs.insert(key.clone(), rid);
        }
        for (key, &rid) in metadata.field_defs() {
            baseline.field_defs.insert(key.clone(), rid);
        }
        for (key, &rid) in metadata.type_refs() {
            baseline.type_refs.insert(key.clone(), rid);
        }
        for (key, &rid) in metadata.member_refs() {
            baseline.member_refs.insert(key.clone(), rid);
        }
        for (key, &rid) in metadata.assembly_refs() {
            baseline.assembly_refs.insert(key.clone(), rid);
        }
        baseline
    }

    /// Generation number: 0 for the full image, then 1, 2, ... for each delta.
    #[must_use]
    pub fn ordinal(&self) -> u32 {
        self.ordinal
    }

    /// Module version id of the full image.
    #[must_use]
    pub fn module_version_id(&self) -> Guid {
        self.module_version_id
    }

    /// Id of the last delta; `None` for the initial baseline.
    #[must_use]
    pub fn encoding_id(&self) -> Option<Guid> {
        self.encoding_id
    }

    /// Compilation the last generation was emitted from.
    #[must_use]
    pub fn compilation(&self) -> &Compilation {
        &self.compilation
    }

    /// Definition token of `method` in any earlier generation.
    #[must_use]
    pub fn method_token(&self, method: &MethodSymbol) -> Option<Token> {
        self.method_defs
            .get(&method.signature_key())
            .map(|entry| TableId::MethodDef.token(*entry.value()))
    }

    /// Definition token of `ty` in any earlier generation.
    #[must_use]
    pub fn type_token(&self, ty: &NamedTypeSymbol) -> Option<Token> {
        self.type_defs
            .get(&MetadataBuilder::type_key(ty))
            .map(|entry| TableId::TypeDef.token(*entry.value()))
    }

    /// Definition token of `field` in any earlier generation.
    #[must_use]
    pub fn field_token(&self, field: &FieldSymbol) -> Option<Token> {
        self.field_defs
            .get(&field.qualified_name())
            .map(|entry| TableId::Field.token(*entry.value()))
    }

    /// A builder for the next generation that sees every earlier definition and
    /// reference.
    fn delta_builder(&self, compilation: &Compilation) -> Result<MetadataBuilder> {
        let mut metadata = MetadataBuilder::new(self.base.clone(), Some(compilation.assembly()?));
        for entry in &self.type_defs {
            metadata.register_type(entry.key().clone(), *entry.value());
        }
        for entry in &self.method_defs {
            metadata.register_method(entry.key().clone(), *entry.value());
        }
        for entry in &self.field_defs {
            metadata.register_field(entry.key().clone(), *entry.value());
        }
        for entry in &self.type_refs {
            metadata.register_type_ref(entry.key().clone(), *entry.value());
        }
        for entry in &self.member_refs {
            metadata.register_member_ref(entry.key().clone(), *entry.value());
        }
        for entry in &self.assembly_refs {
            metadata.register_assembly_ref(entry.key().clone(), *entry.value());
        }
        Ok(metadata)
    }
}

impl std::fmt::Debug for EmitBaseline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EmitBaseline")
            .field("ordinal", &self.ordinal)
            .field("module_name", &self.module_name)
            .field("module_version_id", &self.module_version_id)
            .field("encoding_id", &self.encoding_id)
            .field("methods", &self.method_defs.len())
            .finish_non_exhaustive()
    }
}

/// What a [`SemanticEdit`] does.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SemanticEditKind {
    /// A method body changed; the definition keeps its row.
    Update,
    /// A new type, method or field.
    Insert,
    /// A method was removed; its body is replaced by one that throws.
    Delete,
}

/// One changed symbol between the baseline compilation and the current one.
#[derive(Debug, Clone)]
pub struct SemanticEdit {
    kind: SemanticEditKind,
    old: Option<Symbol>,
    new: Option<Symbol>,
}

impl SemanticEdit {
    /// Creates an edit.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::Argument`] if a symbol the kind needs is missing:
    /// updates need both, inserts the new symbol and deletes the old one.
    pub fn new(kind: SemanticEditKind, old: Option<Symbol>, new: Option<Symbol>) -> Result<Self> {
        match kind {
            SemanticEditKind::Update if old.is_none() || new.is_none() => {
                return Err(argument_error!("edit", "an update needs the old and new symbol"));
            }
            SemanticEditKind::Insert if new.is_none() => {
                return Err(argument_error!("edit", "an insert needs the new symbol"));
            }
            SemanticEditKind::Delete if old.is_none() => {
                return Err(argument_error!("edit", "a delete needs the old symbol"));
            }
            _ => {}
        }
        Ok(SemanticEdit { kind, old, new })
    }

    /// Kind of the edit.
    #[must_use]
    pub fn kind(&self) -> SemanticEditKind {
        self.kind
    }

    /// Symbol in the baseline compilation.
    #[must_use]
    pub fn old_symbol(&self) -> Option<&Symbol> {
        self.old.as_ref()
    }

    /// Symbol in the current compilation.
    #[must_use]
    pub fn new_symbol(&self) -> Option<&Symbol> {
        self.new.as_ref()
    }
}

/// Outcome of [`Compilation::emit_difference`].
#[derive(Debug)]
pub struct EmitDifferenceResult {
    /// `true` if the deltas were written.
    pub success: bool,
    /// Every diagnostic reported while compiling and writing.
    pub diagnostics: Vec<Diagnostic>,
    /// Baseline for the next edit; `None` on failure.
    pub baseline: Option<EmitBaseline>,
    /// MethodDef tokens whose bodies changed or were added.
    pub updated_methods: Vec<Token>,
    /// TypeDef tokens of types with changed or added members.
    pub changed_types: Vec<Token>,
}

impl EmitDifferenceResult {
    fn failed(diagnostics: &DiagnosticBag) -> Self {
        EmitDifferenceResult {
            success: false,
            diagnostics: diagnostics.to_vec(),
            baseline: None,
            updated_methods: Vec::new(),
            changed_types: Vec::new(),
        }
    }
}

/// Rows of one delta plus the EnC log entries they need.
struct DeltaWriter<'a> {
    module: &'a ModuleBuilder,
    metadata: MetadataBuilder,
    log: Vec<(Token, u32)>,
    methods: Vec<(u32, Option<MethodBody>)>,
    changed_types: Vec<Token>,
    diagnostics: &'a DiagnosticBag,
}

impl DeltaWriter<'_> {
    fn body_of(&self, method: &MethodSymbol) -> Option<MethodBody> {
        self.module.find_method(method).and_then(|m| m.body.clone())
    }

    fn report_missing(&self, symbol: &Symbol) {
        let location = symbol_location(symbol);
        self.diagnostics
            .add(ErrorCode::EncUpdateMissingSymbol.diagnostic(location, &[&symbol.name()]));
    }

    fn note_type(&mut self, ty: Option<std::sync::Arc<NamedTypeSymbol>>) -> Option<Token> {
        let ty = ty?;
        let rid = *self.metadata.type_defs().get(&MetadataBuilder::type_key(&ty))?;
        let token = TableId::TypeDef.token(rid);
        if !self.changed_types.contains(&token) {
            self.changed_types.push(token);
        }
        Some(token)
    }

    /// Rewrites the row of an existing method with a new body.
    fn update_method(&mut self, old: &MethodSymbol, new: &MethodSymbol, body: Option<MethodBody>) -> Result<bool> {
        let Some(&rid) = self.metadata.method_defs().get(&old.signature_key()) else {
            return Ok(false);
        };
        self.metadata.register_method(new.signature_key(), rid);
        self.metadata.add_method_def(rid, new, body.as_ref(), false)?;
        self.note_type(new.containing_type());
        self.log.push((TableId::MethodDef.token(rid), ENC_FUNC_DEFAULT));
        self.methods.push((rid, body));
        Ok(true)
    }

    fn insert_method(&mut self, method: &MethodSymbol) -> Result<bool> {
        let Some(parent) = self.note_type(method.containing_type()) else {
            return Ok(false);
        };
        let body = self.body_of(method);
        let rid = self.metadata.reserve_method(method);
        let token = TableId::MethodDef.token(rid);
        let params = self.metadata.add_method_def(rid, method, body.as_ref(), true)?;
        self.log.push((parent, ENC_FUNC_ADD_METHOD));
        self.log.push((token, ENC_FUNC_DEFAULT));
        for param in params {
            self.log.push((token, ENC_FUNC_ADD_PARAMETER));
            self.log.push((param, ENC_FUNC_DEFAULT));
        }
        self.methods.push((rid, body));
        Ok(true)
    }

    fn insert_field(&mut self, field: &FieldSymbol) -> Result<bool> {
        let Some(parent) = self.note_type(field.containing_type()) else {
            return Ok(false);
        };
        let rid = self.metadata.reserve_field(field);
        self.metadata.add_field_def(rid, field)?;
        self.log.push((parent, ENC_FUNC_ADD_FIELD));
        self.log.push((TableId::Field.token(rid), ENC_FUNC_DEFAULT));
        Ok(true)
    }

    /// Adds a new type with all its members.
    fn insert_type(&mut self, ty: &std::sync::Arc<NamedTypeSymbol>) -> Result<bool> {
        let Some(definition) = self
            .module
            .types
            .iter()
            .find(|t| t.symbol.full_metadata_name() == ty.full_metadata_name())
        else {
            return Ok(false);
        };
        let rid = self.metadata.reserve_type(ty);
        let field_list = self.metadata.next_row(TableId::Field);
        let method_list = self.metadata.next_row(TableId::MethodDef);
        self.metadata.add_type_def(rid, ty, field_list, method_list)?;
        self.log.push((TableId::TypeDef.token(rid), ENC_FUNC_DEFAULT));
        for field in &definition.fields {
            self.insert_field(field)?;
        }
        for method in &definition.methods {
            self.insert_method(&method.symbol)?;
        }
        Ok(true)
    }

    fn apply(&mut self, edit: &SemanticEdit, is_added_symbol: &dyn Fn(&Symbol) -> bool) -> Result<()> {
        let applied = match (edit.kind, &edit.old, &edit.new) {
            (SemanticEditKind::Update, Some(Symbol::Method(old)), Some(Symbol::Method(new))) => {
                let body = self.body_of(new);
                self.update_method(old, new, body)?
            }
            (SemanticEditKind::Delete, Some(Symbol::Method(old)), _) => {
                self.update_method(old, old, Some(MethodBody::throw_null()))?
            }
            (SemanticEditKind::Insert, _, Some(symbol)) if !is_added_symbol(symbol) => {
                return Err(argument_error!(
                    "edits",
                    "inserted symbol '{}' is not reported as added",
                    symbol.name()
                ));
            }
            (SemanticEditKind::Insert, _, Some(Symbol::Method(method))) => self.insert_method(method)?,
            (SemanticEditKind::Insert, _, Some(Symbol::Field(field))) => self.insert_field(field)?,
            (SemanticEditKind::Insert, _, Some(Symbol::Type(TypeSymbol::Named(ty)))) => {
                self.insert_type(ty)?
            }
            (kind, old, new) => {
                return Err(argument_error!(
                    "edits",
                    "{:?} is not supported for {:?}",
                    kind,
                    new.as_ref().or(old.as_ref())
                ));
            }
        };
        if !applied {
            if let Some(symbol) = edit.old.as_ref().or(edit.new.as_ref()) {
                self.report_missing(symbol);
            }
        }
        Ok(())
    }
}

fn symbol_location(symbol: &Symbol) -> Location {
    let syntax = match symbol {
        Symbol::Method(method) => method.declaring_syntax(),
        Symbol::Field(field) => field.declaring_syntax(),
        Symbol::Type(TypeSymbol::Named(ty)) => ty.declaring_syntax().first(),
        _ => None,
    };
    syntax
        .map(|s| Location::source(&s.tree, s.node.span()))
        .unwrap_or_default()
}

impl Compilation {
    /// Writes the metadata, IL and PDB deltas of `edits` on top of `baseline`.
    ///
    /// `is_added_symbol` must hold for every symbol an insert adds. Only the edited
    /// definitions and the references their bodies need are written.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::Argument`] for a stream that cannot be written or an edit
    /// whose symbols do not fit its kind, and [`crate::Error::Cancelled`] if `cancel`
    /// is signalled. Compile errors and symbols missing from the baseline are reported
    /// as diagnostics.
    #[allow(clippy::too_many_arguments)]
    pub fn emit_difference(
        &self,
        baseline: &EmitBaseline,
        edits: &[SemanticEdit],
        is_added_symbol: &dyn Fn(&Symbol) -> bool,
        metadata_stream: &mut dyn OutputStream,
        il_stream: &mut dyn OutputStream,
        pdb_stream: &mut dyn OutputStream,
        cancel: &CancellationToken,
    ) -> Result<EmitDifferenceResult> {
        for (name, stream) in [
            ("metadata_stream", &*metadata_stream),
            ("il_stream", &*il_stream),
            ("pdb_stream", &*pdb_stream),
        ] {
            if !stream.can_write() {
                return Err(argument_error!(name, "stream must support writing"));
            }
        }
        log::debug!(
            "emitting generation {} of '{}' with {} edits",
            baseline.ordinal + 1,
            baseline.module_name,
            edits.len()
        );

        let diagnostics = DiagnosticBag::new();
        diagnostics.extend(self.get_parse_diagnostics(cancel)?);
        diagnostics.extend(self.get_declaration_diagnostics(cancel)?);
        let mut module = ModuleBuilder::new(self, EmitOptions::default(), cancel)?;
        let compiled = module.compile_methods(self, &diagnostics, cancel)?;
        if !compiled || diagnostics.has_any_errors() {
            return Ok(EmitDifferenceResult::failed(&diagnostics));
        }
        module.module_name.clone_from(&baseline.module_name);

        let mut writer = DeltaWriter {
            module: &module,
            metadata: baseline.delta_builder(self)?,
            log: Vec::new(),
            methods: Vec::new(),
            changed_types: Vec::new(),
            diagnostics: &diagnostics,
        };
        let encoding_id = Guid::from_bytes(rand::random());
        writer.metadata.add_module(
            &baseline.module_name,
            Some(1),
            Guid::ZERO,
            Some(encoding_id),
            Some(baseline.encoding_id_index),
        )?;
        for edit in edits {
            check_cancelled!(cancel);
            writer.apply(edit, is_added_symbol)?;
        }
        if diagnostics.has_any_errors() {
            return Ok(EmitDifferenceResult::failed(&diagnostics));
        }

        let DeltaWriter {
            mut metadata,
            log,
            mut methods,
            changed_types,
            ..
        } = writer;

        // References first, then definitions in edit order
        let tokens = metadata.added_tokens();
        let definitions = [TableId::TypeDef, TableId::Field, TableId::MethodDef, TableId::Param];
        for &token in &tokens {
            if !definitions.iter().any(|&t| t as u8 == token.table()) {
                metadata.add_enc_log(token, ENC_FUNC_DEFAULT);
            }
        }
        for &(token, func) in &log {
            metadata.add_enc_log(token, func);
        }
        for &token in &tokens {
            metadata.add_enc_map(token);
        }

        let version = &module.properties.runtime_metadata_version;
        let serialized = metadata.serialize(version, 0)?;
        metadata_stream.write_all(&serialized.bytes)?;
        il_stream.write_all(metadata.il())?;

        methods.sort_by_key(|(rid, _)| *rid);
        let method_rows: Vec<(u32, Option<&MethodBody>)> =
            methods.iter().map(|(rid, body)| (*rid, body.as_ref())).collect();
        let pdb = write_portable_pdb(&module, &method_rows, &metadata.aggregate_row_counts(), None)?;
        pdb_stream.write_all(&pdb.bytes)?;

        let mut updated_methods: Vec<Token> = methods
            .iter()
            .map(|(rid, _)| TableId::MethodDef.token(*rid))
            .collect();
        updated_methods.dedup();
        log::debug!(
            "generation {}: {} methods, {} metadata bytes",
            baseline.ordinal + 1,
            updated_methods.len(),
            serialized.bytes.len()
        );

        // The delta's EncId is the first GUID it adds
        let encoding_id_index = baseline.base.guid_count + 1;
        let next = EmitBaseline::capture(
            self.clone(),
            baseline.ordinal + 1,
            baseline.module_name.clone(),
            baseline.module_version_id,
            Some(encoding_id),
            encoding_id_index,
            &metadata,
        );
        Ok(EmitDifferenceResult {
            success: true,
            diagnostics: diagnostics.to_vec(),
            baseline: Some(next),
            updated_methods,
            changed_types,
        })
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::{
        emit::MemoryStream,
        lang::MiniLanguage,
        options::{CompilationOptions, OutputKind},
        references::{AssemblyMetadata, MetadataReference},
    };

    fn compilation(source: &str) -> Compilation {
        MiniLanguage::create_compilation(
            Some("Delta"),
            [MiniLanguage::parse(source, "a.mini")],
            [MetadataReference::from_metadata(AssemblyMetadata::core_library(), None)],
            CompilationOptions::new(OutputKind::DynamicallyLinkedLibrary),
        )
        .unwrap()
    }

    fn method(compilation: &Compilation, ty: &str, name: &str) -> Arc<MethodSymbol> {
        compilation
            .get_type_by_metadata_name(ty)
            .unwrap()
            .unwrap()
            .methods()
            .find(|m| m.name() == name)
            .cloned()
            .unwrap()
    }

    struct Streams {
        metadata: MemoryStream,
        il: MemoryStream,
        pdb: MemoryStream,
    }

    fn emit(
        current: &Compilation,
        baseline: &EmitBaseline,
        edits: &[SemanticEdit],
    ) -> (EmitDifferenceResult, Streams) {
        let mut streams = Streams {
            metadata: MemoryStream::new(),
            il: MemoryStream::new(),
            pdb: MemoryStream::new(),
        };
        let result = current
            .emit_difference(
                baseline,
                edits,
                &|_| true,
                &mut streams.metadata,
                &mut streams.il,
                &mut streams.pdb,
                &CancellationToken::none(),
            )
            .unwrap();
        (result, streams)
    }

    const V1: &str = "public class C { public int F() { return 1; } }";
    const V2: &str = "public class C { public int F() { return 2; } }";

    #[test]
    fn test_update_keeps_row() {
        let v1 = compilation(V1);
        let baseline = EmitBaseline::create_initial(&v1, Guid::from_bytes([7; 16])).unwrap();
        let original = baseline.method_token(&method(&v1, "C", "F")).unwrap();
        assert_eq!(baseline.ordinal(), 0);

        let v2 = compilation(V2);
        let edit = SemanticEdit::new(
            SemanticEditKind::Update,
            Some(Symbol::Method(method(&v1, "C", "F"))),
            Some(Symbol::Method(method(&v2, "C", "F"))),
        )
        .unwrap();
        let (result, streams) = emit(&v2, &baseline, &[edit]);
        assert!(result.success, "{:?}", result.diagnostics);
        assert_eq!(result.updated_methods, vec![original]);
        assert_eq!(result.changed_types.len(), 1);

        let metadata = streams.metadata.into_inner();
        assert_eq!(&metadata[..4], b"BSJB");
        assert!(metadata.windows(3).any(|w| w == b"#-\0"));
        // Four zero bytes precede the first body
        assert_eq!(&streams.il.into_inner()[..4], &[0, 0, 0, 0]);
        assert_eq!(&streams.pdb.into_inner()[..4], b"BSJB");

        let next = result.baseline.unwrap();
        assert_eq!(next.ordinal(), 1);
        assert_eq!(next.module_version_id(), Guid::from_bytes([7; 16]));
        assert!(next.encoding_id().is_some());
        assert_eq!(next.method_token(&method(&v2, "C", "F")), Some(original));
    }

    #[test]
    fn test_insert_appends_rows() {
        let v1 = compilation(V1);
        let baseline = EmitBaseline::create_initial(&v1, Guid::ZERO).unwrap();
        let v2 = compilation(
            "public class C { public int F() { return 1; } public int G(int x) { return x; } }",
        );
        let edit = SemanticEdit::new(
            SemanticEditKind::Insert,
            None,
            Some(Symbol::Method(method(&v2, "C", "G"))),
        )
        .unwrap();
        let (result, _) = emit(&v2, &baseline, &[edit]);
        assert!(result.success);
        let added = result.updated_methods[0];
        let existing = baseline.method_token(&method(&v1, "C", "F")).unwrap();
        assert!(added.row() > existing.row());

        // The next generation continues after the added row
        let next = result.baseline.unwrap();
        assert_eq!(next.method_token(&method(&v2, "C", "G")), Some(added));
    }

    #[test]
    fn test_update_of_unknown_method_is_reported() {
        let v1 = compilation(V1);
        let baseline = EmitBaseline::create_initial(&v1, Guid::ZERO).unwrap();
        let v2 = compilation("public class C { public int F() { return 1; } public int H() { return 3; } }");
        let h = Symbol::Method(method(&v2, "C", "H"));
        let edit = SemanticEdit::new(SemanticEditKind::Update, Some(h.clone()), Some(h)).unwrap();
        let (result, _) = emit(&v2, &baseline, &[edit]);
        assert!(!result.success);
        assert!(result.baseline.is_none());
        assert_eq!(
            result.diagnostics[0].id(),
            ErrorCode::EncUpdateMissingSymbol.id()
        );
    }

    #[test]
    fn test_edit_requires_symbols() {
        assert!(SemanticEdit::new(SemanticEditKind::Update, None, None).is_err());
        assert!(SemanticEdit::new(SemanticEditKind::Delete, None, None).is_err());
        assert!(SemanticEdit::new(SemanticEditKind::Insert, None, None).is_err());
    }

    #[test]
    fn test_delete_throws() {
        let v1 = compilation(V1);
        let baseline = EmitBaseline::create_initial(&v1, Guid::ZERO).unwrap();
        let edit = SemanticEdit::new(
            SemanticEditKind::Delete,
            Some(Symbol::Method(method(&v1, "C", "F"))),
            None,
        )
        .unwrap();
        let (result, streams) = emit(&v1, &baseline, &[edit]);
        assert!(result.success);
        let il = streams.il.into_inner();
        // Tiny header for two bytes of IL, then ldnull; throw
        assert_eq!(&il[4..], &[0x0A, 0x14, 0x7A]);
    }
}
