//! Default accessibility rules.
//!
//! These mirror the usual CLI rules: public is visible everywhere, internal within the
//! declaring assembly (and assemblies it grants access to), private within the
//! declaring type, protected within derived types.

use std::sync::Arc;

use crate::symbols::{AssemblySymbol, NamedTypeSymbol, Symbol, TypeSymbol};

/// Declared accessibility of a type or member.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Accessibility {
    /// Accessibility does not apply (namespaces, locals).
    NotApplicable,
    /// Declaring type only.
    Private,
    /// Derived types within the same assembly.
    ProtectedAndInternal,
    /// Declaring and derived types.
    Protected,
    /// Same assembly.
    Internal,
    /// Same assembly or derived types.
    ProtectedOrInternal,
    /// Everywhere.
    Public,
}

/// `true` if `symbol` can be referenced from `within`.
///
/// `within` must be an assembly or a named type; any other symbol makes the answer
/// `false`. `through_type` is the type of the receiver for instance member access and
/// narrows protected access.
#[must_use]
pub fn is_symbol_accessible(
    symbol: &Symbol,
    within: &Symbol,
    through_type: Option<&TypeSymbol>,
) -> bool {
    let (within_assembly, within_type) = match within {
        Symbol::Assembly(a) => (Some(Arc::clone(a)), None),
        Symbol::Type(TypeSymbol::Named(t)) => (t.containing_assembly(), Some(Arc::clone(t))),
        _ => return false,
    };
    let context = Context {
        assembly: within_assembly,
        ty: within_type,
    };

    match symbol {
        Symbol::Assembly(_) | Symbol::Namespace(_) | Symbol::Parameter(_) | Symbol::Local(_) => {
            true
        }
        Symbol::Type(ty) => context.type_accessible(ty),
        Symbol::Method(method) => match method.containing_type() {
            Some(container) => context.member_accessible(
                &container,
                method.declared_accessibility(),
                method.is_static(),
                through_type,
            ),
            None => false,
        },
        Symbol::Field(field) => match field.containing_type() {
            Some(container) => context.member_accessible(
                &container,
                field.declared_accessibility(),
                field.is_static(),
                through_type,
            ),
            None => false,
        },
    }
}

struct Context {
    assembly: Option<Arc<AssemblySymbol>>,
    ty: Option<Arc<NamedTypeSymbol>>,
}

impl Context {
    fn type_accessible(&self, ty: &TypeSymbol) -> bool {
        match ty {
            TypeSymbol::Array(array) => self.type_accessible(array.element_type()),
            TypeSymbol::Pointer(pointer) => self.type_accessible(pointer.pointed_at_type()),
            TypeSymbol::Named(named) => self.named_type_accessible(named),
        }
    }

    fn named_type_accessible(&self, ty: &Arc<NamedTypeSymbol>) -> bool {
        if ty.is_error() {
            return true;
        }
        if let Some(original) = ty.original_definition() {
            return self.named_type_accessible(original)
                && ty.type_arguments().iter().all(|arg| self.type_accessible(arg));
        }
        match ty.declared_accessibility() {
            Accessibility::Public | Accessibility::NotApplicable => true,
            Accessibility::Internal | Accessibility::ProtectedOrInternal => {
                self.has_internal_access(ty)
            }
            Accessibility::Private | Accessibility::Protected => self.is_within(ty),
            Accessibility::ProtectedAndInternal => self.has_internal_access(ty) && self.is_within(ty),
        }
    }

    fn member_accessible(
        &self,
        container: &Arc<NamedTypeSymbol>,
        accessibility: Accessibility,
        is_static: bool,
        through_type: Option<&TypeSymbol>,
    ) -> bool {
        if !self.named_type_accessible(container) {
            return false;
        }
        match accessibility {
            Accessibility::Public | Accessibility::NotApplicable => true,
            Accessibility::Internal => self.has_internal_access(container),
            Accessibility::Private => self.is_within(container),
            Accessibility::Protected => self.protected_access(container, is_static, through_type),
            Accessibility::ProtectedOrInternal => {
                self.has_internal_access(container)
                    || self.protected_access(container, is_static, through_type)
            }
            Accessibility::ProtectedAndInternal => {
                self.has_internal_access(container)
                    && self.protected_access(container, is_static, through_type)
            }
        }
    }

    fn has_internal_access(&self, ty: &NamedTypeSymbol) -> bool {
        match (&self.assembly, ty.containing_assembly()) {
            (Some(within), Some(target)) => target.gives_internal_access_to(within),
            _ => false,
        }
    }

    fn is_within(&self, ty: &Arc<NamedTypeSymbol>) -> bool {
        self.ty
            .as_ref()
            .is_some_and(|within| TypeSymbol::Named(Arc::clone(within)) == TypeSymbol::Named(Arc::clone(ty)))
    }

    fn protected_access(
        &self,
        container: &Arc<NamedTypeSymbol>,
        is_static: bool,
        through_type: Option<&TypeSymbol>,
    ) -> bool {
        let Some(within) = &self.ty else {
            return false;
        };
        let within = TypeSymbol::Named(Arc::clone(within));
        if !within.is_or_derives_from(&TypeSymbol::Named(Arc::clone(container))) {
            return false;
        }
        if within.as_named().is_some_and(|w| Arc::ptr_eq(w, container)) || is_static {
            return true;
        }
        through_type.map_or(true, |through| through.is_or_derives_from(&within))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        references::AssemblyIdentity,
        symbols::{AssemblyOrigin, FieldSymbol, NamedTypeBuilder},
    };

    struct Fixture {
        lib: Arc<AssemblySymbol>,
        app: Arc<AssemblySymbol>,
    }

    fn fixture() -> Fixture {
        let lib = AssemblySymbol::new(
            AssemblyIdentity::new("Lib"),
            AssemblyOrigin::Source,
            "Lib.dll".into(),
            Vec::new(),
            |weak| {
                vec![
                    NamedTypeBuilder::new("L", "Base").build(weak.clone()),
                    NamedTypeBuilder::new("L", "Hidden")
                        .accessibility(Accessibility::Internal)
                        .build(weak.clone()),
                ]
            },
        );
        let base = lib.types()[0].clone();
        base.set_members(vec![
            Symbol::Field(Arc::new(
                FieldSymbol::new(&base, "secret", TypeSymbol::Named(base.clone()))
                    .with_accessibility(Accessibility::Private),
            )),
            Symbol::Field(Arc::new(
                FieldSymbol::new(&base, "shared", TypeSymbol::Named(base.clone()))
                    .with_accessibility(Accessibility::Protected),
            )),
        ])
        .unwrap();

        let app = AssemblySymbol::new(
            AssemblyIdentity::new("App"),
            AssemblyOrigin::Source,
            "App.dll".into(),
            Vec::new(),
            |weak| vec![NamedTypeBuilder::new("A", "Derived").build(weak.clone())],
        );
        app.types()[0]
            .set_base_type(Some(TypeSymbol::Named(base)))
            .unwrap();
        Fixture { lib, app }
    }

    #[test]
    fn test_internal_type_across_assemblies() {
        let f = fixture();
        let hidden = Symbol::from(f.lib.types()[1].clone());
        assert!(is_symbol_accessible(&hidden, &Symbol::Assembly(f.lib.clone()), None));
        assert!(!is_symbol_accessible(&hidden, &Symbol::Assembly(f.app.clone()), None));
    }

    #[test]
    fn test_private_and_protected_members() {
        let f = fixture();
        let base = f.lib.types()[0].clone();
        let derived = Symbol::from(f.app.types()[0].clone());
        let secret = base.members()[0].clone();
        let shared = base.members()[1].clone();

        assert!(is_symbol_accessible(&secret, &Symbol::from(base.clone()), None));
        assert!(!is_symbol_accessible(&secret, &derived, None));
        assert!(is_symbol_accessible(&shared, &derived, None));
        assert!(!is_symbol_accessible(&shared, &Symbol::Assembly(f.app.clone()), None));

        // Protected access through a receiver that is not the deriving type is denied.
        let through = TypeSymbol::Named(base);
        assert!(!is_symbol_accessible(&shared, &derived, Some(&through)));
    }
}
