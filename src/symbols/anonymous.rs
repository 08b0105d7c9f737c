//! Anonymous type templates.
//!
//! Every distinct shape (ordered member names and types) of anonymous object creation
//! in a compilation maps to one template type. Templates are created while method bodies
//! are bound and sealed before emission; a sealed manager hands out existing templates
//! only. Script submissions look in their predecessors' managers first so that equal
//! shapes unify across the chain.

use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc, Mutex, Weak,
};

use crate::{
    symbols::{
        Accessibility, AssemblySymbol, FieldSymbol, NamedTypeBuilder, NamedTypeSymbol, Symbol,
        TypeSymbol,
    },
    Error, Result,
};

/// Ordered member names and types of an anonymous type.
#[derive(Debug, Clone, PartialEq)]
pub struct AnonymousTypeShape {
    /// Member names
    pub names: Vec<String>,
    /// Member types, parallel to `names`
    pub types: Vec<TypeSymbol>,
}

impl AnonymousTypeShape {
    /// Creates a shape.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Argument`] if the two lists differ in length or a name repeats.
    pub fn new(names: Vec<String>, types: Vec<TypeSymbol>) -> Result<Self> {
        if names.len() != types.len() {
            return Err(argument_error!(
                "member_names",
                "{} member names for {} member types",
                names.len(),
                types.len()
            ));
        }
        for (i, name) in names.iter().enumerate() {
            if name.is_empty() || names[..i].contains(name) {
                return Err(argument_error!("member_names", "invalid member name '{}'", name));
            }
        }
        Ok(AnonymousTypeShape { names, types })
    }
}

/// Per-compilation table of anonymous type templates.
#[derive(Debug, Default)]
pub struct AnonymousTypeManager {
    templates: Mutex<Vec<(AnonymousTypeShape, Arc<NamedTypeSymbol>)>>,
    sealed: AtomicBool,
}

impl AnonymousTypeManager {
    /// Creates an empty, unsealed manager.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Existing template for `shape`, if any.
    #[must_use]
    pub fn find(&self, shape: &AnonymousTypeShape) -> Option<Arc<NamedTypeSymbol>> {
        let templates = lock_recover!(self.templates);
        templates
            .iter()
            .find(|(s, _)| s == shape)
            .map(|(_, t)| Arc::clone(t))
    }

    /// Returns the template for `shape`, creating it if needed.
    ///
    /// # Arguments
    ///
    /// * `shape` - Member names and types
    /// * `previous` - Managers of earlier submissions, nearest first
    /// * `assembly` - Assembly new templates belong to
    /// * `object` - `System.Object`, the base of every template
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidOperation`] when a new template would be needed after
    /// [`AnonymousTypeManager::seal`].
    pub fn get_or_create(
        &self,
        shape: &AnonymousTypeShape,
        previous: &[&AnonymousTypeManager],
        assembly: &Weak<AssemblySymbol>,
        object: Option<TypeSymbol>,
    ) -> Result<Arc<NamedTypeSymbol>> {
        for manager in previous.iter().copied() {
            if let Some(found) = manager.find(shape) {
                return Ok(found);
            }
        }

        let mut templates = lock!(self.templates);
        if let Some((_, found)) = templates.iter().find(|(s, _)| s == shape) {
            return Ok(Arc::clone(found));
        }
        if self.sealed.load(Ordering::Acquire) {
            return Err(Error::InvalidOperation(
                "anonymous type templates are sealed".to_string(),
            ));
        }
        let template = Self::create_type(
            &format!("<>f__AnonymousType{}", templates.len()),
            shape,
            assembly,
            object,
        )?;
        templates.push((shape.clone(), Arc::clone(&template)));
        log::trace!("created anonymous type template {}", template.name());
        Ok(template)
    }

    /// Creates a type for `shape` without registering it as a template.
    ///
    /// # Errors
    ///
    /// Propagates failures attaching base type or members.
    pub fn create_unregistered(
        shape: &AnonymousTypeShape,
        assembly: &Weak<AssemblySymbol>,
        object: Option<TypeSymbol>,
    ) -> Result<Arc<NamedTypeSymbol>> {
        Self::create_type("<>f__AnonymousType", shape, assembly, object)
    }

    fn create_type(
        name: &str,
        shape: &AnonymousTypeShape,
        assembly: &Weak<AssemblySymbol>,
        object: Option<TypeSymbol>,
    ) -> Result<Arc<NamedTypeSymbol>> {
        let ty = NamedTypeBuilder::new("", name)
            .accessibility(Accessibility::Internal)
            .sealed(true)
            .build(assembly.clone());
        ty.set_base_type(object)?;
        let members = shape
            .names
            .iter()
            .zip(&shape.types)
            .map(|(name, member_type)| {
                Symbol::Field(Arc::new(
                    FieldSymbol::new(&ty, name, member_type.clone())
                        .with_accessibility(Accessibility::Public),
                ))
            })
            .collect();
        ty.set_members(members)?;
        Ok(ty)
    }

    /// Stops creation of new templates. Idempotent.
    pub fn seal(&self) {
        self.sealed.store(true, Ordering::Release);
    }

    /// `true` once sealed.
    #[must_use]
    pub fn is_sealed(&self) -> bool {
        self.sealed.load(Ordering::Acquire)
    }

    /// Templates in creation order.
    #[must_use]
    pub fn templates(&self) -> Vec<Arc<NamedTypeSymbol>> {
        lock_recover!(self.templates)
            .iter()
            .map(|(_, t)| Arc::clone(t))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn int() -> TypeSymbol {
        TypeSymbol::Named(NamedTypeBuilder::new("System", "Int32").build(Weak::new()))
    }

    #[test]
    fn test_shape_validation() {
        assert!(AnonymousTypeShape::new(vec!["a".into()], Vec::new()).is_err());
        assert!(AnonymousTypeShape::new(vec!["a".into(), "a".into()], vec![int(), int()]).is_err());
        assert!(AnonymousTypeShape::new(vec!["a".into()], vec![int()]).is_ok());
    }

    #[test]
    fn test_templates_are_shared_and_sealed() -> Result<()> {
        let int = int();
        let manager = AnonymousTypeManager::new();
        let shape = AnonymousTypeShape::new(vec!["X".into()], vec![int.clone()])?;

        let first = manager.get_or_create(&shape, &[], &Weak::new(), None)?;
        let second = manager.get_or_create(&shape, &[], &Weak::new(), None)?;
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(first.fields().count(), 1);

        manager.seal();
        let other = AnonymousTypeShape::new(vec!["Y".into()], vec![int])?;
        assert!(manager.get_or_create(&other, &[], &Weak::new(), None).is_err());
        assert!(manager.get_or_create(&shape, &[], &Weak::new(), None).is_ok());
        Ok(())
    }

    #[test]
    fn test_previous_submission_templates_win() -> Result<()> {
        let shape = AnonymousTypeShape::new(vec!["X".into()], vec![int()])?;
        let previous = AnonymousTypeManager::new();
        let template = previous.get_or_create(&shape, &[], &Weak::new(), None)?;
        previous.seal();

        let current = AnonymousTypeManager::new();
        let found = current.get_or_create(&shape, &[&previous], &Weak::new(), None)?;
        assert!(Arc::ptr_eq(&template, &found));
        assert!(current.templates().is_empty());
        Ok(())
    }
}
