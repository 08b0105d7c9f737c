//! Assembly and namespace symbols.

use std::{
    collections::{BTreeSet, HashMap},
    sync::{Arc, Weak},
};

use uguid::Guid;

use crate::{references::AssemblyIdentity, symbols::NamedTypeSymbol};

/// Where an assembly symbol came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AssemblyOrigin {
    /// Declared by the source of a compilation.
    Source,
    /// Imported from metadata with the given module version id.
    Metadata {
        /// Module version id of the imported image
        mvid: Guid,
    },
}

/// An assembly and the types it defines.
///
/// Created once with all of its types; base types and members of those types are
/// attached afterwards through their write-once cells.
pub struct AssemblySymbol {
    identity: AssemblyIdentity,
    origin: AssemblyOrigin,
    module_name: String,
    internals_visible_to: Vec<String>,
    types: Vec<Arc<NamedTypeSymbol>>,
    by_metadata_name: HashMap<String, Arc<NamedTypeSymbol>>,
    global_namespace: Arc<NamespaceSymbol>,
}

impl AssemblySymbol {
    /// Creates an assembly, building its types with a back-pointer to it.
    ///
    /// # Arguments
    ///
    /// * `identity` - Assembly identity
    /// * `origin` - Source or metadata
    /// * `module_name` - Name of the manifest module
    /// * `internals_visible_to` - Simple names of assemblies granted internal access
    /// * `build_types` - Creates the types given the (not yet upgradable) assembly pointer
    pub fn new(
        identity: AssemblyIdentity,
        origin: AssemblyOrigin,
        module_name: String,
        internals_visible_to: Vec<String>,
        build_types: impl FnOnce(&Weak<AssemblySymbol>) -> Vec<Arc<NamedTypeSymbol>>,
    ) -> Arc<Self> {
        Arc::new_cyclic(|weak| {
            let types = build_types(weak);
            let mut by_metadata_name = HashMap::with_capacity(types.len());
            for ty in &types {
                by_metadata_name
                    .entry(ty.full_metadata_name())
                    .or_insert_with(|| Arc::clone(ty));
            }
            let global_namespace = NamespaceSymbol::build(weak, "", &types);
            AssemblySymbol {
                identity,
                origin,
                module_name,
                internals_visible_to,
                types,
                by_metadata_name,
                global_namespace,
            }
        })
    }

    /// Assembly identity.
    #[must_use]
    pub fn identity(&self) -> &AssemblyIdentity {
        &self.identity
    }

    /// Source or metadata.
    #[must_use]
    pub fn origin(&self) -> AssemblyOrigin {
        self.origin
    }

    /// `true` for the assembly declared by a compilation's source.
    #[must_use]
    pub fn is_source(&self) -> bool {
        self.origin == AssemblyOrigin::Source
    }

    /// Module version id of an imported assembly.
    #[must_use]
    pub fn mvid(&self) -> Option<Guid> {
        match self.origin {
            AssemblyOrigin::Metadata { mvid } => Some(mvid),
            AssemblyOrigin::Source => None,
        }
    }

    /// Name of the manifest module.
    #[must_use]
    pub fn module_name(&self) -> &str {
        &self.module_name
    }

    /// All types, in definition order.
    #[must_use]
    pub fn types(&self) -> &[Arc<NamedTypeSymbol>] {
        &self.types
    }

    /// Global namespace.
    #[must_use]
    pub fn global_namespace(&self) -> &Arc<NamespaceSymbol> {
        &self.global_namespace
    }

    /// Looks up a type by namespace-qualified metadata name.
    #[must_use]
    pub fn get_type_by_metadata_name(&self, name: &str) -> Option<Arc<NamedTypeSymbol>> {
        self.by_metadata_name.get(name).cloned()
    }

    /// `true` if this assembly defines `System.Object`.
    #[must_use]
    pub fn is_core_library(&self) -> bool {
        self.by_metadata_name.contains_key("System.Object")
    }

    /// `true` if code in `other` may use this assembly's internal members.
    #[must_use]
    pub fn gives_internal_access_to(&self, other: &AssemblySymbol) -> bool {
        std::ptr::eq(self, other)
            || self
                .internals_visible_to
                .iter()
                .any(|name| name.eq_ignore_ascii_case(other.identity.name()))
    }

    /// `true` if `a` and `b` are the same assembly.
    #[must_use]
    pub fn ptr_eq(a: &Arc<AssemblySymbol>, b: &Arc<AssemblySymbol>) -> bool {
        Arc::ptr_eq(a, b)
    }
}

impl std::fmt::Debug for AssemblySymbol {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AssemblySymbol")
            .field("identity", &self.identity.display_name())
            .field("origin", &self.origin)
            .field("types", &self.types.len())
            .finish()
    }
}

/// A namespace within one assembly.
pub struct NamespaceSymbol {
    name: String,
    full_name: String,
    containing_assembly: Weak<AssemblySymbol>,
    namespaces: Vec<Arc<NamespaceSymbol>>,
    types: Vec<Arc<NamedTypeSymbol>>,
}

impl NamespaceSymbol {
    fn build(
        assembly: &Weak<AssemblySymbol>,
        full_name: &str,
        all_types: &[Arc<NamedTypeSymbol>],
    ) -> Arc<Self> {
        let types: Vec<_> = all_types
            .iter()
            .filter(|t| t.namespace() == full_name)
            .cloned()
            .collect();

        let children: BTreeSet<&str> = all_types
            .iter()
            .filter_map(|t| {
                let ns = t.namespace();
                let rest = if full_name.is_empty() {
                    ns
                } else {
                    ns.strip_prefix(full_name)?.strip_prefix('.')?
                };
                rest.split('.').next().filter(|s| !s.is_empty())
            })
            .collect();

        let namespaces = children
            .into_iter()
            .map(|child| {
                let child_full = if full_name.is_empty() {
                    child.to_string()
                } else {
                    format!("{full_name}.{child}")
                };
                NamespaceSymbol::build(assembly, &child_full, all_types)
            })
            .collect();

        Arc::new(NamespaceSymbol {
            name: full_name.rsplit('.').next().unwrap_or_default().to_string(),
            full_name: full_name.to_string(),
            containing_assembly: assembly.clone(),
            namespaces,
            types,
        })
    }

    /// Simple name, empty for the global namespace.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Dotted name, empty for the global namespace.
    #[must_use]
    pub fn full_name(&self) -> &str {
        &self.full_name
    }

    /// `true` for the global namespace.
    #[must_use]
    pub fn is_global(&self) -> bool {
        self.full_name.is_empty()
    }

    /// Containing assembly.
    #[must_use]
    pub fn containing_assembly(&self) -> Option<Arc<AssemblySymbol>> {
        self.containing_assembly.upgrade()
    }

    /// Nested namespaces, ordered by name.
    #[must_use]
    pub fn namespaces(&self) -> &[Arc<NamespaceSymbol>] {
        &self.namespaces
    }

    /// Types declared directly in this namespace.
    #[must_use]
    pub fn types(&self) -> &[Arc<NamedTypeSymbol>] {
        &self.types
    }

    /// Nested namespace named `name`.
    #[must_use]
    pub fn get_namespace(&self, name: &str) -> Option<&Arc<NamespaceSymbol>> {
        self.namespaces.iter().find(|n| n.name == name)
    }
}

impl std::fmt::Debug for NamespaceSymbol {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NamespaceSymbol")
            .field("full_name", &self.full_name)
            .field("namespaces", &self.namespaces.len())
            .field("types", &self.types.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::symbols::NamedTypeBuilder;

    fn assembly(namespaces: &[&str]) -> Arc<AssemblySymbol> {
        let identity = AssemblyIdentity::new("Lib");
        let names: Vec<String> = namespaces.iter().map(|s| s.to_string()).collect();
        AssemblySymbol::new(identity, AssemblyOrigin::Source, "Lib.dll".into(), Vec::new(), |weak| {
            names
                .iter()
                .enumerate()
                .map(|(i, ns)| NamedTypeBuilder::new(ns, &format!("T{i}")).build(weak.clone()))
                .collect()
        })
    }

    #[test]
    fn test_namespace_tree() {
        let asm = assembly(&["", "A", "A.B", "C"]);
        let global = asm.global_namespace();
        assert!(global.is_global());
        assert_eq!(global.types().len(), 1);
        let names: Vec<_> = global.namespaces().iter().map(|n| n.name().to_string()).collect();
        assert_eq!(names, ["A", "C"]);
        let a = global.get_namespace("A").unwrap();
        assert_eq!(a.get_namespace("B").unwrap().full_name(), "A.B");
    }

    #[test]
    fn test_back_pointers() {
        let asm = assembly(&["X"]);
        let ty = asm.get_type_by_metadata_name("X.T0").unwrap();
        assert!(ty.is_in_assembly(&asm));
        assert!(Arc::ptr_eq(&ty.containing_assembly().unwrap(), &asm));
        assert!(!asm.is_core_library());
    }
}
