//! The module being emitted: type definitions, generated bodies and the remaining
//! inputs of serialization.

use std::{collections::HashMap, sync::Arc};

use rayon::prelude::*;

use crate::{
    compilation::{Compilation, ModuleCompilationState},
    diagnostics::{Diagnostic, DiagnosticBag, ErrorCode},
    emit::{
        codegen::{CodeGenContext, CodeGenerator, MethodBody, WellKnownMembers},
        resources::Win32Resources,
        EmbeddedText, ModulePropertiesForSerialization, ResourceDescription,
    },
    operations::{Operation, OperationVisitor, OperationWalker},
    options::{EmitOptions, OutputKind, StrongNameProvider},
    references::AssemblyIdentity,
    symbols::{
        Accessibility, AssemblySymbol, FieldSymbol, MethodKind, MethodSymbol, NamedTypeSymbol,
        SpecialType,
    },
    syntax::SyntaxTreeList,
    utils::CancellationToken,
    Result,
};

/// A method and its generated body; abstract methods have none.
#[derive(Debug, Clone)]
pub(crate) struct MethodDefinition {
    pub(crate) symbol: Arc<MethodSymbol>,
    pub(crate) body: Option<MethodBody>,
}

/// A type with the members that are emitted for it.
#[derive(Debug, Clone)]
pub(crate) struct TypeDefinition {
    pub(crate) symbol: Arc<NamedTypeSymbol>,
    pub(crate) fields: Vec<Arc<FieldSymbol>>,
    pub(crate) methods: Vec<MethodDefinition>,
}

/// Strong-name signing inputs.
#[derive(Clone)]
pub(crate) struct SigningInput {
    pub(crate) provider: Option<Arc<dyn StrongNameProvider>>,
    pub(crate) key_file: Option<String>,
    pub(crate) key_container: Option<String>,
    pub(crate) public_sign: bool,
}

/// Everything the serializer needs to write one module.
///
/// Created by [`Compilation::emit`] once options are checked, then filled with
/// generated method bodies. A [`PeSerializer`](crate::emit::PeSerializer) receives it
/// read-only.
#[derive(Clone)]
pub struct ModuleBuilder {
    pub(crate) assembly: Arc<AssemblySymbol>,
    pub(crate) identity: AssemblyIdentity,
    pub(crate) module_name: String,
    pub(crate) output_kind: OutputKind,
    pub(crate) properties: ModulePropertiesForSerialization,
    pub(crate) emit_options: EmitOptions,
    pub(crate) types: Vec<TypeDefinition>,
    pub(crate) entry_point: Option<Arc<MethodSymbol>>,
    pub(crate) debug_entry_point: Option<Arc<MethodSymbol>>,
    pub(crate) trees: SyntaxTreeList,
    pub(crate) embedded_texts: Vec<EmbeddedText>,
    pub(crate) source_link: Option<Vec<u8>>,
    pub(crate) manifest_resources: Vec<ResourceDescription>,
    pub(crate) win32_resources: Option<Win32Resources>,
    pub(crate) signing: Option<SigningInput>,
    pub(crate) is_reference_assembly: bool,
    anonymous_constructors: HashMap<String, Arc<MethodSymbol>>,
    well_known: WellKnownMembers,
    compilation_state: Arc<ModuleCompilationState>,
}

/// Anonymous type templates instantiated by one body.
#[derive(Default)]
struct SynthesizedTypeCollector(Vec<Arc<NamedTypeSymbol>>);

impl OperationVisitor for SynthesizedTypeCollector {
    fn visit_anonymous_object_creation(&mut self, operation: &Operation) {
        if let Some(ty) = operation.result_type().and_then(|t| t.as_named()) {
            self.0.push(Arc::clone(ty));
        }
    }
}

impl ModuleBuilder {
    /// Collects the definitions of `compilation`. Bodies are filled in by
    /// [`ModuleBuilder::compile_methods`].
    pub(crate) fn new(
        compilation: &Compilation,
        emit_options: EmitOptions,
        cancel: &CancellationToken,
    ) -> Result<Self> {
        let declaration = compilation.declaration()?;
        let options = compilation.options();
        let output_kind = options.output_kind();

        let mut identity = declaration.assembly.identity().clone();
        if !options.crypto_public_key().is_empty() {
            identity = identity.with_public_key(options.crypto_public_key());
        }

        let module_name = emit_options
            .output_name_override()
            .or(options.module_name())
            .map(str::to_string)
            .unwrap_or_else(|| format!("{}{}", identity.name(), output_kind.default_extension()));

        // Binding creates anonymous type templates, so bodies come first
        compilation.method_bodies(cancel)?;
        let anonymous_constructors = anonymous_constructors(compilation)?;

        let include_private = emit_options.include_private_members();
        let mut types: Vec<TypeDefinition> = declaration
            .assembly
            .types()
            .iter()
            .map(|ty| type_definition(ty, include_private))
            .collect();
        for template in compilation.anonymous_type_templates() {
            if !template.is_in_assembly(&declaration.assembly) {
                continue;
            }
            let mut definition = type_definition(&template, true);
            if let Some(constructor) = anonymous_constructors.get(&template.full_metadata_name()) {
                definition.methods.push(MethodDefinition {
                    symbol: Arc::clone(constructor),
                    body: None,
                });
            }
            types.push(definition);
        }

        let signing = options.is_signed().then(|| SigningInput {
            provider: options.strong_name_provider().cloned(),
            key_file: options.crypto_key_file().map(str::to_string),
            key_container: options.crypto_key_container().map(str::to_string),
            public_sign: options.public_sign(),
        });

        log::debug!(
            "module '{}' has {} types ({} anonymous templates)",
            module_name,
            types.len(),
            anonymous_constructors.len()
        );

        Ok(ModuleBuilder {
            assembly: Arc::clone(&declaration.assembly),
            identity,
            module_name,
            output_kind,
            properties: ModulePropertiesForSerialization::new(options, &emit_options),
            emit_options,
            types,
            entry_point: None,
            debug_entry_point: None,
            trees: compilation.syntax_trees().clone(),
            embedded_texts: Vec::new(),
            source_link: None,
            manifest_resources: Vec::new(),
            win32_resources: None,
            signing,
            is_reference_assembly: false,
            anonymous_constructors,
            well_known: WellKnownMembers::resolve(&declaration.lookup),
            compilation_state: Arc::new(ModuleCompilationState::new()),
        })
    }

    /// Generates every method body, reporting into `diagnostics`.
    ///
    /// Returns `false` when an error survives filtering.
    pub(crate) fn compile_methods(
        &mut self,
        compilation: &Compilation,
        diagnostics: &DiagnosticBag,
        cancel: &CancellationToken,
    ) -> Result<bool> {
        let bodies = compilation.method_bodies(cancel)?;
        let mut success =
            diagnostics.filter_and_append(bodies.diagnostics.iter().cloned(), compilation.options());

        if compilation.options().output_kind().is_application() {
            self.entry_point = compilation.get_entry_point()?;
        }

        let metadata_only = self.emit_options.emit_metadata_only();
        let bound: HashMap<String, _> = bodies
            .bodies
            .iter()
            .map(|(method, body)| (method.signature_key(), body.clone()))
            .collect();

        let object_constructor = self.well_known.object_constructor.clone();
        let state = &self.compilation_state;
        let context = CodeGenContext {
            well_known: self.well_known.clone(),
            anonymous_constructors: self.anonymous_constructors.clone(),
            trees: &self.trees,
        };

        let generate = |method: &Arc<MethodSymbol>| -> Result<(Option<MethodBody>, Vec<Diagnostic>)> {
            check_cancelled!(cancel);
            if method.is_abstract() {
                return Ok((None, Vec::new()));
            }
            if metadata_only {
                return Ok((Some(MethodBody::throw_null()), Vec::new()));
            }
            if method.declaring_syntax().is_none()
                && method.method_kind() == MethodKind::Constructor
            {
                return Ok((
                    Some(MethodBody::default_constructor(object_constructor.as_ref())),
                    Vec::new(),
                ));
            }
            match bound.get(&method.signature_key()).cloned().flatten() {
                Some(body) => {
                    let mut walker = OperationWalker::new(SynthesizedTypeCollector::default());
                    walker.walk(&body.operation)?;
                    let key = method.signature_key();
                    for ty in walker.into_inner().0 {
                        state.add_synthesized_type(&key, ty)?;
                    }
                    let (body, diagnostics) =
                        CodeGenerator::generate(&context, method, &body.operation)?;
                    Ok((Some(body), diagnostics))
                }
                None => Ok((Some(MethodBody::throw_null()), Vec::new())),
            }
        };

        let methods: Vec<Arc<MethodSymbol>> = self
            .types
            .iter()
            .flat_map(|t| t.methods.iter().map(|m| Arc::clone(&m.symbol)))
            .collect();
        let generated: Vec<(Option<MethodBody>, Vec<Diagnostic>)> =
            if compilation.options().concurrent_build() {
                methods.par_iter().map(generate).collect::<Result<_>>()?
            } else {
                methods.iter().map(generate).collect::<Result<_>>()?
            };

        let mut generated = generated.into_iter();
        let mut codegen_diagnostics = Vec::new();
        for method in self.types.iter_mut().flat_map(|t| t.methods.iter_mut()) {
            if let Some((body, diagnostics)) = generated.next() {
                method.body = body;
                codegen_diagnostics.extend(diagnostics);
            }
        }
        success &= diagnostics.filter_and_append(codegen_diagnostics, compilation.options());

        log::debug!(
            "generated {} method bodies for '{}'",
            methods.len(),
            self.module_name
        );
        Ok(success)
    }

    /// Sets the method recorded as the PDB entry point.
    ///
    /// Reports a diagnostic and returns `false` when `method` is not defined in this
    /// module.
    pub(crate) fn set_debug_entry_point(
        &mut self,
        method: Option<Arc<MethodSymbol>>,
        diagnostics: &DiagnosticBag,
    ) -> bool {
        let Some(method) = method else {
            self.debug_entry_point = self.entry_point.clone();
            return true;
        };
        let is_source = method
            .containing_type()
            .is_some_and(|ty| ty.is_in_assembly(&self.assembly))
            && self.find_method(&method).is_some();
        if !is_source {
            diagnostics.add(ErrorCode::DebugEntryPointNotSourceMethodDefinition.at_none(&[]));
            return false;
        }
        self.debug_entry_point = Some(method);
        true
    }

    /// The metadata-only projection written as a reference assembly: no private
    /// members, every body `throw null`, no debug information.
    pub(crate) fn to_reference_assembly(&self) -> Self {
        let mut reference = self.clone();
        reference.is_reference_assembly = true;
        reference.emit_options = self
            .emit_options
            .with_emit_metadata_only(true)
            .with_include_private_members(false);
        reference.embedded_texts.clear();
        reference.source_link = None;
        reference.debug_entry_point = None;
        for ty in &mut reference.types {
            ty.fields.retain(|f| is_emitted(f.declared_accessibility(), false));
            ty.methods
                .retain(|m| is_emitted(m.symbol.declared_accessibility(), false));
            for method in &mut ty.methods {
                if method.body.is_some() {
                    method.body = Some(MethodBody::throw_null());
                }
            }
        }
        reference
    }

    pub(crate) fn find_method(&self, method: &MethodSymbol) -> Option<&MethodDefinition> {
        let key = method.signature_key();
        self.types
            .iter()
            .flat_map(|t| t.methods.iter())
            .find(|m| m.symbol.signature_key() == key)
    }

    /// Name of the assembly being built.
    #[must_use]
    pub fn assembly_name(&self) -> &str {
        self.identity.name()
    }

    /// Synthesized types recorded while compiling method bodies. Frozen before the
    /// module reaches a serializer.
    #[must_use]
    pub fn compilation_state(&self) -> &ModuleCompilationState {
        &self.compilation_state
    }

    /// Name of the module file.
    #[must_use]
    pub fn module_name(&self) -> &str {
        &self.module_name
    }

    /// Output kind of the module.
    #[must_use]
    pub fn output_kind(&self) -> OutputKind {
        self.output_kind
    }

    /// Header values the PE writer uses.
    #[must_use]
    pub fn properties(&self) -> &ModulePropertiesForSerialization {
        &self.properties
    }

    /// Effective emit options.
    #[must_use]
    pub fn emit_options(&self) -> &EmitOptions {
        &self.emit_options
    }

    /// Full metadata names of the emitted types, in definition order.
    #[must_use]
    pub fn type_names(&self) -> Vec<String> {
        self.types
            .iter()
            .map(|t| t.symbol.full_metadata_name())
            .collect()
    }

    /// Number of emitted methods.
    #[must_use]
    pub fn method_count(&self) -> usize {
        self.types.iter().map(|t| t.methods.len()).sum()
    }

    /// Method execution starts at.
    #[must_use]
    pub fn entry_point(&self) -> Option<&Arc<MethodSymbol>> {
        self.entry_point.as_ref()
    }

    /// `true` for the metadata-only reference assembly projection.
    #[must_use]
    pub fn is_reference_assembly(&self) -> bool {
        self.is_reference_assembly
    }
}

fn is_emitted(accessibility: Accessibility, include_private: bool) -> bool {
    include_private || accessibility != Accessibility::Private
}

fn type_definition(ty: &Arc<NamedTypeSymbol>, include_private: bool) -> TypeDefinition {
    TypeDefinition {
        symbol: Arc::clone(ty),
        fields: ty
            .fields()
            .filter(|f| is_emitted(f.declared_accessibility(), include_private))
            .cloned()
            .collect(),
        methods: ty
            .methods()
            .filter(|m| is_emitted(m.declared_accessibility(), include_private))
            .map(|m| MethodDefinition {
                symbol: Arc::clone(m),
                body: None,
            })
            .collect(),
    }
}

/// Synthesized constructors of every anonymous type template visible to
/// `compilation`, including templates of earlier submissions.
fn anonymous_constructors(compilation: &Compilation) -> Result<HashMap<String, Arc<MethodSymbol>>> {
    let void = compilation.get_special_type(SpecialType::Void)?;
    let mut constructors = HashMap::new();
    let mut current = Some(compilation);
    while let Some(submission) = current {
        for template in submission.anonymous_type_templates() {
            constructors
                .entry(template.full_metadata_name())
                .or_insert_with(|| {
                    Arc::new(
                        MethodSymbol::new(&template, ".ctor", void.clone())
                            .with_kind(MethodKind::Constructor)
                            .with_accessibility(Accessibility::Public),
                    )
                });
        }
        current = submission.previous_submission();
    }
    Ok(constructors)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        lang::MiniLanguage,
        options::CompilationOptions,
        references::{AssemblyMetadata, MetadataReference},
    };

    fn compilation(source: &str, kind: OutputKind) -> Compilation {
        MiniLanguage::create_compilation(
            Some("Lib"),
            [MiniLanguage::parse(source, "a.mini")],
            [MetadataReference::from_metadata(AssemblyMetadata::core_library(), None)],
            CompilationOptions::new(kind),
        )
        .unwrap()
    }

    #[test]
    fn test_module_names() {
        let cancel = CancellationToken::none();
        let exe = compilation("class C { static void Main() {} }", OutputKind::ConsoleApplication);
        let module = ModuleBuilder::new(&exe, EmitOptions::default(), &cancel).unwrap();
        assert_eq!(module.module_name(), "Lib.exe");

        let renamed = ModuleBuilder::new(
            &exe,
            EmitOptions::default().with_output_name_override(Some("Other.exe")),
            &cancel,
        )
        .unwrap();
        assert_eq!(renamed.module_name(), "Other.exe");
    }

    #[test]
    fn test_private_members_filtered() {
        let source = "public class C { private int hidden; public int shown; private void M() {} }";
        let compilation = compilation(source, OutputKind::DynamicallyLinkedLibrary);
        let cancel = CancellationToken::none();

        let full = ModuleBuilder::new(
            &compilation,
            EmitOptions::default().with_include_private_members(true),
            &cancel,
        )
        .unwrap();
        let c = full.types.iter().find(|t| t.symbol.name() == "C").unwrap();
        assert_eq!(c.fields.len(), 2);
        assert!(c.methods.iter().any(|m| m.symbol.name() == "M"));

        let reference = full.to_reference_assembly();
        let c = reference.types.iter().find(|t| t.symbol.name() == "C").unwrap();
        assert_eq!(c.fields.len(), 1);
        assert!(!c.methods.iter().any(|m| m.symbol.name() == "M"));
        assert!(reference.is_reference_assembly());
        assert!(reference.emit_options().emit_metadata_only());
    }

    #[test]
    fn test_compile_methods_fills_bodies() {
        let source = "class C { int F(int a) { return a + 1; } }";
        let compilation = compilation(source, OutputKind::DynamicallyLinkedLibrary);
        let cancel = CancellationToken::none();
        let mut module = ModuleBuilder::new(&compilation, EmitOptions::default(), &cancel).unwrap();
        let bag = DiagnosticBag::new();
        assert!(module.compile_methods(&compilation, &bag, &cancel).unwrap());
        assert!(module
            .types
            .iter()
            .flat_map(|t| t.methods.iter())
            .all(|m| m.body.is_some()));
        assert_eq!(module.method_count(), 2);
        assert_eq!(module.type_names(), vec!["C".to_string()]);
    }

    #[test]
    fn test_compile_methods_records_synthesized_types() {
        let source = "class C { object P() { return new { X = 1 }; } int F() { return 1; } }";
        let compilation = compilation(source, OutputKind::DynamicallyLinkedLibrary);
        let cancel = CancellationToken::none();
        let mut module = ModuleBuilder::new(&compilation, EmitOptions::default(), &cancel).unwrap();
        let bag = DiagnosticBag::new();
        assert!(module.compile_methods(&compilation, &bag, &cancel).unwrap());

        let ty = compilation.get_type_by_metadata_name("C").unwrap().unwrap();
        let key = |name: &str| ty.methods().find(|m| m.name() == name).unwrap().signature_key();
        let recorded = module.compilation_state().synthesized_types(&key("P"));
        assert_eq!(recorded.len(), 1);
        assert!(recorded[0].is_anonymous());
        assert!(module.compilation_state().synthesized_types(&key("F")).is_empty());
        assert!(!module.compilation_state().is_frozen());
    }

    #[test]
    fn test_metadata_only_bodies_throw() {
        let source = "class C { int F() { return 1; } }";
        let compilation = compilation(source, OutputKind::DynamicallyLinkedLibrary);
        let cancel = CancellationToken::none();
        let mut module =
            ModuleBuilder::new(&compilation, EmitOptions::metadata_only(), &cancel).unwrap();
        module
            .compile_methods(&compilation, &DiagnosticBag::new(), &cancel)
            .unwrap();
        let throw = MethodBody::throw_null().il;
        assert!(module
            .types
            .iter()
            .flat_map(|t| t.methods.iter())
            .all(|m| m.body.as_ref().is_some_and(|b| b.il == throw)));
    }

    #[test]
    fn test_debug_entry_point_must_be_local() {
        let compilation = compilation("class C { static void Main() {} }", OutputKind::ConsoleApplication);
        let cancel = CancellationToken::none();
        let mut module = ModuleBuilder::new(&compilation, EmitOptions::default(), &cancel).unwrap();
        let bag = DiagnosticBag::new();
        module.compile_methods(&compilation, &bag, &cancel).unwrap();
        assert!(module.entry_point().is_some());

        let object = compilation.get_special_type(SpecialType::Object).unwrap();
        let foreign = object.as_named().unwrap().methods().next().cloned();
        assert!(!module.set_debug_entry_point(foreign, &bag));
        assert!(bag
            .iter()
            .any(|d| d.id() == ErrorCode::DebugEntryPointNotSourceMethodDefinition.id()));

        assert!(module.set_debug_entry_point(None, &DiagnosticBag::new()));
        assert_eq!(module.debug_entry_point, module.entry_point);
    }
}
