//! Reference binding.
//!
//! A [`ReferenceManager`] turns a compilation's references into assembly symbols. The
//! result is computed once and then shared by every compilation derived without
//! changing the inputs binding depends on (references, assembly name, import options,
//! resolver, reference directives, previous submission). Editing a tree therefore
//! never rebinds references.

use std::{
    collections::HashMap,
    sync::{Arc, OnceLock},
};

use crate::{
    diagnostics::{Diagnostic, ErrorCode, Location},
    options::MetadataImportOptions,
    references::{AssemblyMetadata, MetadataReference, MetadataReferenceKind},
    symbols::{
        Accessibility, ArrayTypeSymbol, AssemblyOrigin, AssemblySymbol, FieldSymbol,
        MethodSymbol, NamedTypeBuilder, NamedTypeSymbol, Symbol, TypeSymbol,
    },
    Compilation, Result,
};

/// Binds references once per reference set.
#[derive(Debug, Default)]
pub struct ReferenceManager {
    bound: OnceLock<Arc<BoundReferences>>,
}

impl ReferenceManager {
    /// Creates an unbound manager.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// `true` once references have been bound.
    #[must_use]
    pub fn is_bound(&self) -> bool {
        self.bound.get().is_some()
    }

    /// Binds the references of `compilation`, or returns the earlier result.
    ///
    /// # Errors
    ///
    /// Propagates failures declaring a referenced compilation's source.
    pub fn bind(&self, compilation: &Compilation) -> Result<Arc<BoundReferences>> {
        if let Some(bound) = self.bound.get() {
            return Ok(Arc::clone(bound));
        }
        let computed = Arc::new(BoundReferences::compute(compilation)?);
        Ok(Arc::clone(self.bound.get_or_init(|| computed)))
    }
}

/// Assembly symbols for a compilation's references.
#[derive(Debug)]
pub struct BoundReferences {
    references: Vec<MetadataReference>,
    assemblies: Vec<Arc<AssemblySymbol>>,
    by_reference: HashMap<usize, usize>,
    directive_references: Vec<(String, MetadataReference)>,
    previous_submission: Option<Arc<AssemblySymbol>>,
    core_library: Option<Arc<AssemblySymbol>>,
    diagnostics: Vec<Diagnostic>,
}

impl BoundReferences {
    fn compute(compilation: &Compilation) -> Result<Self> {
        let options = compilation.options();
        let mut diagnostics = Vec::new();

        let mut references: Vec<MetadataReference> = compilation.external_references().to_vec();
        let mut directive_references = Vec::new();
        for tree in compilation.syntax_trees().iter() {
            for (path, span) in compilation.language().reference_directives(tree) {
                let resolved = options
                    .metadata_reference_resolver()
                    .map(|resolver| {
                        resolver.resolve_reference(&path, Some(tree.file_path()), &Default::default())
                    })
                    .unwrap_or_default();
                if resolved.is_empty() {
                    diagnostics.push(
                        ErrorCode::MetadataFileNotFound
                            .diagnostic(Location::source(tree, span), &[&path]),
                    );
                }
                for reference in resolved {
                    directive_references.push((path.clone(), reference.clone()));
                    references.push(reference);
                }
            }
        }

        let import = options.metadata_import_options();
        let previous_submission = match compilation.previous_submission() {
            Some(previous) => Some(previous.assembly()?),
            None => None,
        };

        // Images the previous submission already declared keep their symbols, so
        // types from one image are the same symbol across the whole chain.
        let reusable: Vec<Arc<AssemblySymbol>> = match compilation.previous_submission() {
            Some(previous) if previous.options().metadata_import_options() == import => previous
                .reference_manager()
                .bind(previous)?
                .assemblies()
                .iter()
                .filter(|assembly| assembly.mvid().is_some())
                .cloned()
                .collect(),
            _ => Vec::new(),
        };
        let mut assemblies: Vec<Arc<AssemblySymbol>> = Vec::new();
        let mut images: Vec<Option<AssemblyMetadata>> = Vec::new();
        let mut by_reference = HashMap::new();

        for reference in &references {
            let identity = reference.identity();
            let mvid = reference.metadata().map(AssemblyMetadata::mvid);

            if let Some(existing) = assemblies.iter().position(|a| *a.identity() == identity) {
                let same_image = matches!(
                    (mvid, assemblies[existing].mvid()),
                    (Some(a), Some(b)) if a == b
                );
                if !same_image {
                    diagnostics.push(
                        ErrorCode::DuplicateAssemblyIdentity.at_none(&[&identity.display_name()]),
                    );
                }
                by_reference.insert(reference.id(), existing);
                continue;
            }

            let (symbol, image) = match reference.kind() {
                MetadataReferenceKind::PortableExecutable { metadata, .. } => {
                    match reusable
                        .iter()
                        .find(|a| *a.identity() == identity && a.mvid() == mvid)
                    {
                        Some(shared) => (Arc::clone(shared), None),
                        None => (declare_metadata_types(metadata, import), Some(metadata.clone())),
                    }
                }
                MetadataReferenceKind::Compilation(referenced) => (referenced.assembly()?, None),
            };
            by_reference.insert(reference.id(), assemblies.len());
            images.push(image);
            assemblies.push(symbol);
        }

        let mut lookup_order: Vec<Arc<AssemblySymbol>> = assemblies.clone();
        if let Some(previous) = &previous_submission {
            lookup_order.push(Arc::clone(previous));
        }
        for (assembly, image) in assemblies.iter().zip(&images) {
            if let Some(image) = image {
                complete_metadata_types(assembly, image, import, &lookup_order)?;
            }
        }

        let core_library = assemblies.iter().find(|a| a.is_core_library()).cloned();
        log::debug!(
            "bound {} references to {} assemblies ({} diagnostics)",
            references.len(),
            assemblies.len(),
            diagnostics.len()
        );

        Ok(BoundReferences {
            references,
            assemblies,
            by_reference,
            directive_references,
            previous_submission,
            core_library,
            diagnostics,
        })
    }

    /// Every bound reference: external references followed by directive references.
    #[must_use]
    pub fn references(&self) -> &[MetadataReference] {
        &self.references
    }

    /// Distinct referenced assemblies, in reference order.
    #[must_use]
    pub fn assemblies(&self) -> &[Arc<AssemblySymbol>] {
        &self.assemblies
    }

    /// Assembly a reference was bound to.
    #[must_use]
    pub fn assembly_for(&self, reference: &MetadataReference) -> Option<&Arc<AssemblySymbol>> {
        self.by_reference
            .get(&reference.id())
            .and_then(|index| self.assemblies.get(*index))
    }

    /// References produced by `#r` style directives, with the directive text.
    #[must_use]
    pub fn directive_references(&self) -> &[(String, MetadataReference)] {
        &self.directive_references
    }

    /// Source assembly of the previous submission.
    #[must_use]
    pub fn previous_submission(&self) -> Option<&Arc<AssemblySymbol>> {
        self.previous_submission.as_ref()
    }

    /// The assembly defining `System.Object`, if any reference does.
    #[must_use]
    pub fn core_library(&self) -> Option<&Arc<AssemblySymbol>> {
        self.core_library.as_ref()
    }

    /// Binding diagnostics.
    #[must_use]
    pub fn diagnostics(&self) -> &[Diagnostic] {
        &self.diagnostics
    }

    /// Every type named `name` across referenced assemblies and the previous submission.
    #[must_use]
    pub fn find_types(&self, name: &str) -> Vec<Arc<NamedTypeSymbol>> {
        self.assemblies
            .iter()
            .chain(self.previous_submission.iter())
            .filter_map(|a| a.get_type_by_metadata_name(name))
            .collect()
    }

    /// `true` if `assembly` is one of the bound assemblies or the previous submission.
    #[must_use]
    pub fn contains_assembly(&self, assembly: &Arc<AssemblySymbol>) -> bool {
        self.assemblies
            .iter()
            .chain(self.previous_submission.iter())
            .any(|a| Arc::ptr_eq(a, assembly))
    }
}

fn imports(accessibility: Accessibility, import: MetadataImportOptions) -> bool {
    match accessibility {
        Accessibility::Public
        | Accessibility::Protected
        | Accessibility::ProtectedOrInternal
        | Accessibility::NotApplicable => true,
        Accessibility::Internal | Accessibility::ProtectedAndInternal => {
            import != MetadataImportOptions::Public
        }
        Accessibility::Private => import == MetadataImportOptions::All,
    }
}

fn declare_metadata_types(
    metadata: &AssemblyMetadata,
    import: MetadataImportOptions,
) -> Arc<AssemblySymbol> {
    AssemblySymbol::new(
        metadata.identity().clone(),
        AssemblyOrigin::Metadata {
            mvid: metadata.mvid(),
        },
        metadata.module_name().to_string(),
        metadata.internals_visible_to().to_vec(),
        |weak| {
            metadata
                .types()
                .iter()
                .filter(|def| {
                    imports(def.accessibility, import) || !metadata.internals_visible_to().is_empty()
                })
                .map(|def| {
                    NamedTypeBuilder::new(&def.namespace, &def.name)
                        .kind(def.kind)
                        .arity(def.arity)
                        .accessibility(def.accessibility)
                        .sealed(def.is_sealed)
                        .abstract_type(def.is_abstract)
                        .static_type(def.is_sealed && def.is_abstract)
                        .build(weak.clone())
                })
                .collect()
        },
    )
}

fn complete_metadata_types(
    assembly: &Arc<AssemblySymbol>,
    metadata: &AssemblyMetadata,
    import: MetadataImportOptions,
    all: &[Arc<AssemblySymbol>],
) -> Result<()> {
    for def in metadata.types() {
        let Some(ty) = assembly.get_type_by_metadata_name(&def.full_metadata_name()) else {
            continue;
        };

        let base = def
            .base_type
            .as_deref()
            .map(|name| resolve_type_name(name, assembly, all));
        ty.set_base_type(base)?;

        let mut members = Vec::with_capacity(def.fields.len() + def.methods.len());
        for field in def.fields.iter().filter(|f| imports(f.accessibility, import)) {
            let field_type = resolve_type_name(&field.field_type, assembly, all);
            members.push(Symbol::Field(Arc::new(
                FieldSymbol::new(&ty, &field.name, field_type)
                    .with_accessibility(field.accessibility)
                    .with_static(field.is_static),
            )));
        }
        for method in def.methods.iter().filter(|m| imports(m.accessibility, import)) {
            let return_type = resolve_type_name(&method.return_type, assembly, all);
            let parameters = method
                .parameters
                .iter()
                .map(|(name, type_name)| (name.clone(), resolve_type_name(type_name, assembly, all)))
                .collect();
            members.push(Symbol::Method(Arc::new(
                MethodSymbol::new(&ty, &method.name, return_type)
                    .with_accessibility(method.accessibility)
                    .with_static(method.is_static)
                    .with_virtual(method.is_virtual)
                    .with_parameters(parameters),
            )));
        }
        ty.set_members(members)?;
    }
    Ok(())
}

/// Resolves a full metadata name (optionally with `[]` suffixes) against `own` first,
/// then `all`; unresolved names become error types.
pub(crate) fn resolve_type_name(
    name: &str,
    own: &Arc<AssemblySymbol>,
    all: &[Arc<AssemblySymbol>],
) -> TypeSymbol {
    if let Some(element) = name.strip_suffix("[]") {
        let element = resolve_type_name(element, own, all);
        return match ArrayTypeSymbol::new(element.clone(), 1) {
            Ok(array) => TypeSymbol::Array(array),
            Err(_) => element,
        };
    }
    if let Some(found) = own.get_type_by_metadata_name(name) {
        return TypeSymbol::Named(found);
    }
    if let Some(found) = all.iter().find_map(|a| a.get_type_by_metadata_name(name)) {
        return TypeSymbol::Named(found);
    }
    let (namespace, simple) = name.rsplit_once('.').unwrap_or(("", name));
    TypeSymbol::Named(NamedTypeSymbol::error(namespace, simple, 0))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        references::{AssemblyIdentity, MethodDefinition, TypeDefinition},
        symbols::SpecialType,
    };

    #[test]
    fn test_metadata_types_are_completed() -> Result<()> {
        let corlib = AssemblyMetadata::core_library();
        let symbol = declare_metadata_types(&corlib, MetadataImportOptions::Public);
        complete_metadata_types(&symbol, &corlib, MetadataImportOptions::Public, &[])?;

        let int = symbol.get_type_by_metadata_name("System.Int32").unwrap();
        assert_eq!(int.special_type(), SpecialType::Int32);
        let base = int.base_type().unwrap();
        assert_eq!(base.display_name(), "System.ValueType");
        assert_eq!(
            base.as_named().unwrap().base_type().unwrap().special_type(),
            SpecialType::Object
        );

        let console = symbol.get_type_by_metadata_name("System.Console").unwrap();
        assert_eq!(console.methods().count(), 2);
        assert!(console.is_static());
        Ok(())
    }

    #[test]
    fn test_import_options_filter_members() -> Result<()> {
        let metadata = AssemblyMetadata::builder(AssemblyIdentity::new("Lib"))
            .add_type(
                TypeDefinition::class("Lib", "C")
                    .with_base_type(None)
                    .with_method(MethodDefinition::new("Open", "System.Void"))
                    .with_method(
                        MethodDefinition::new("Hidden", "System.Void")
                            .with_accessibility(Accessibility::Private),
                    ),
            )
            .build();

        for (import, expected) in [(MetadataImportOptions::Public, 1), (MetadataImportOptions::All, 2)] {
            let symbol = declare_metadata_types(&metadata, import);
            complete_metadata_types(&symbol, &metadata, import, &[])?;
            let c = symbol.get_type_by_metadata_name("Lib.C").unwrap();
            assert_eq!(c.methods().count(), expected);
            // Unresolvable names become error types instead of failing.
            assert!(c.methods().next().unwrap().return_type().is_error());
        }
        Ok(())
    }

    #[test]
    fn test_resolve_array_names() {
        let corlib = AssemblyMetadata::core_library();
        let symbol = declare_metadata_types(&corlib, MetadataImportOptions::Public);
        let resolved = resolve_type_name("System.String[]", &symbol, &[]);
        assert_eq!(resolved.display_name(), "System.String[]");
    }
}
