//! Type name lookup across the assemblies visible to a compilation.

use std::{collections::BTreeSet, sync::Arc};

use crate::{
    compilation::ImportDirective,
    symbols::{AssemblySymbol, NamedTypeSymbol, SpecialType, TypeSymbol},
};

/// Resolves type names for one compilation.
///
/// Assemblies are searched in a fixed order: the source assembly, then previous
/// submissions from nearest to oldest, then references. Types made missing through
/// [`crate::Compilation::make_type_missing`] are never found.
#[derive(Debug, Clone)]
pub struct SymbolLookup {
    assemblies: Vec<Arc<AssemblySymbol>>,
    core_library: Option<Arc<AssemblySymbol>>,
    global_usings: Vec<String>,
    missing_types: BTreeSet<String>,
}

/// A successful name resolution.
#[derive(Debug, Clone)]
pub struct ResolvedType {
    /// The type
    pub symbol: Arc<NamedTypeSymbol>,
    /// Index of the `using` directive that made it visible
    pub via_import: Option<usize>,
}

impl SymbolLookup {
    /// Creates a lookup over `assemblies`, searched in order.
    #[must_use]
    pub fn new(
        assemblies: Vec<Arc<AssemblySymbol>>,
        core_library: Option<Arc<AssemblySymbol>>,
        global_usings: Vec<String>,
        missing_types: BTreeSet<String>,
    ) -> Self {
        SymbolLookup {
            assemblies,
            core_library,
            global_usings,
            missing_types,
        }
    }

    /// Searched assemblies, in order.
    #[must_use]
    pub fn assemblies(&self) -> &[Arc<AssemblySymbol>] {
        &self.assemblies
    }

    /// The first type with full metadata name `name`.
    #[must_use]
    pub fn get_type_by_metadata_name(&self, name: &str) -> Option<Arc<NamedTypeSymbol>> {
        if self.missing_types.contains(name) {
            return None;
        }
        self.assemblies
            .iter()
            .find_map(|a| a.get_type_by_metadata_name(name))
    }

    /// Resolves a possibly dotted source name written inside `namespace`.
    ///
    /// Enclosing namespaces are tried innermost first, then `usings` in order, then
    /// the compilation's global usings.
    #[must_use]
    pub fn resolve_type_name(
        &self,
        name: &str,
        usings: &[ImportDirective],
        namespace: &str,
    ) -> Option<ResolvedType> {
        let mut scope = namespace;
        loop {
            let candidate = if scope.is_empty() {
                name.to_string()
            } else {
                format!("{scope}.{name}")
            };
            if let Some(symbol) = self.get_type_by_metadata_name(&candidate) {
                return Some(ResolvedType {
                    symbol,
                    via_import: None,
                });
            }
            if scope.is_empty() {
                break;
            }
            scope = scope.rsplit_once('.').map_or("", |(outer, _)| outer);
        }

        for (index, using) in usings.iter().enumerate() {
            if let Some(symbol) = self.get_type_by_metadata_name(&format!("{}.{name}", using.namespace)) {
                return Some(ResolvedType {
                    symbol,
                    via_import: Some(index),
                });
            }
        }

        self.global_usings.iter().find_map(|using| {
            self.get_type_by_metadata_name(&format!("{using}.{name}"))
                .map(|symbol| ResolvedType {
                    symbol,
                    via_import: None,
                })
        })
    }

    /// The special type, from the core library when one is bound; an error type when
    /// nothing defines it.
    #[must_use]
    pub fn special_type(&self, special: SpecialType) -> TypeSymbol {
        let Some(name) = special.metadata_name() else {
            return TypeSymbol::Named(NamedTypeSymbol::error("", "?", 0));
        };
        if !self.missing_types.contains(name) {
            if let Some(found) = self
                .core_library
                .as_ref()
                .and_then(|core| core.get_type_by_metadata_name(name))
            {
                return TypeSymbol::Named(found);
            }
        }
        match self.get_type_by_metadata_name(name) {
            Some(found) => TypeSymbol::Named(found),
            None => {
                let (namespace, simple) = name.rsplit_once('.').unwrap_or(("", name));
                TypeSymbol::Named(NamedTypeSymbol::error(namespace, simple, 0))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        references::AssemblyIdentity,
        symbols::{AssemblyOrigin, NamedTypeBuilder},
        syntax::TextSpan,
    };

    fn assembly(name: &str, types: &[(&str, &str)]) -> Arc<AssemblySymbol> {
        AssemblySymbol::new(
            AssemblyIdentity::new(name),
            AssemblyOrigin::Source,
            format!("{name}.dll"),
            Vec::new(),
            |weak| {
                types
                    .iter()
                    .map(|(ns, n)| NamedTypeBuilder::new(ns, n).build(weak.clone()))
                    .collect()
            },
        )
    }

    #[test]
    fn test_enclosing_namespaces_before_usings() {
        let own = assembly("A", &[("Outer", "T"), ("Outer.Inner", "T"), ("Lib", "U")]);
        let lookup = SymbolLookup::new(vec![own], None, Vec::new(), BTreeSet::new());
        let usings = [ImportDirective {
            namespace: "Lib".into(),
            span: TextSpan::new(0, 10),
        }];

        let found = lookup.resolve_type_name("T", &usings, "Outer.Inner").unwrap();
        assert_eq!(found.symbol.full_name(), "Outer.Inner.T");
        assert!(found.via_import.is_none());

        let found = lookup.resolve_type_name("T", &usings, "Outer").unwrap();
        assert_eq!(found.symbol.full_name(), "Outer.T");

        let found = lookup.resolve_type_name("U", &usings, "Outer").unwrap();
        assert_eq!(found.via_import, Some(0));
        assert!(lookup.resolve_type_name("V", &usings, "").is_none());
    }

    #[test]
    fn test_missing_types_and_special_types() {
        let own = assembly("A", &[("System", "Object")]);
        let mut missing = BTreeSet::new();
        missing.insert("System.Object".to_string());
        let lookup = SymbolLookup::new(vec![own.clone()], None, Vec::new(), missing);
        assert!(lookup.get_type_by_metadata_name("System.Object").is_none());
        assert!(lookup.special_type(SpecialType::Object).is_error());

        let lookup = SymbolLookup::new(vec![own], None, vec!["System".into()], BTreeSet::new());
        assert!(!lookup.special_type(SpecialType::Object).is_error());
        assert!(lookup.resolve_type_name("Object", &[], "").is_some());
    }
}
