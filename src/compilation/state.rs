//! State shared by the methods of one module while they are compiled.

use std::{
    collections::HashMap,
    sync::{
        atomic::{fence, AtomicBool, Ordering},
        Arc, Mutex, OnceLock,
    },
};

use crate::{symbols::NamedTypeSymbol, Error, Result};

/// Types synthesized for method bodies, keyed by method.
///
/// Code generation records here every synthesized type a body depends on (anonymous
/// type templates, state machines). The table is writable until
/// [`ModuleCompilationState::freeze`], which emit calls before serialization, and
/// read-only afterwards. The map itself is created on first insert.
#[derive(Debug, Default)]
pub struct ModuleCompilationState {
    synthesized_types: OnceLock<Mutex<HashMap<String, Vec<Arc<NamedTypeSymbol>>>>>,
    frozen: AtomicBool,
}

impl ModuleCompilationState {
    /// Creates a writable state.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Records that the body of `method_id` uses the synthesized type `ty`.
    ///
    /// Recording the same type twice for one method keeps a single entry.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidOperation`] once the state is frozen and
    /// [`Error::LockError`] if the table lock is poisoned.
    pub fn add_synthesized_type(&self, method_id: &str, ty: Arc<NamedTypeSymbol>) -> Result<()> {
        if self.is_frozen() {
            return Err(Error::InvalidOperation(
                "module compilation state is frozen".to_string(),
            ));
        }
        let table = self
            .synthesized_types
            .get_or_init(|| Mutex::new(HashMap::new()));
        let mut table = lock!(table);
        let types = table.entry(method_id.to_string()).or_default();
        if !types.iter().any(|t| Arc::ptr_eq(t, &ty)) {
            types.push(ty);
        }
        Ok(())
    }

    /// Synthesized types recorded for `method_id`, in recording order.
    #[must_use]
    pub fn synthesized_types(&self, method_id: &str) -> Vec<Arc<NamedTypeSymbol>> {
        let Some(table) = self.synthesized_types.get() else {
            return Vec::new();
        };
        lock_recover!(table).get(method_id).cloned().unwrap_or_default()
    }

    /// Number of methods with at least one synthesized type.
    #[must_use]
    pub fn method_count(&self) -> usize {
        self.synthesized_types
            .get()
            .map_or(0, |table| lock_recover!(table).len())
    }

    /// Makes the state read-only. Writes made before this call are visible to every
    /// thread that observes [`ModuleCompilationState::is_frozen`] as `true`.
    pub fn freeze(&self) {
        fence(Ordering::SeqCst);
        self.frozen.store(true, Ordering::Release);
    }

    /// `true` after [`ModuleCompilationState::freeze`].
    #[must_use]
    pub fn is_frozen(&self) -> bool {
        self.frozen.load(Ordering::Acquire)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Weak;

    use super::*;
    use crate::symbols::NamedTypeBuilder;

    #[test]
    fn test_freeze_is_one_way() -> Result<()> {
        let state = ModuleCompilationState::new();
        assert_eq!(state.method_count(), 0);
        let ty = NamedTypeBuilder::new("", "<>f__AnonymousType0").build(Weak::new());
        state.add_synthesized_type("M:C.M", Arc::clone(&ty))?;
        state.add_synthesized_type("M:C.M", ty)?;
        assert_eq!(state.synthesized_types("M:C.M").len(), 1);

        state.freeze();
        assert!(state.is_frozen());
        let ty = NamedTypeBuilder::new("", "<N>d__1").build(Weak::new());
        assert!(matches!(
            state.add_synthesized_type("M:C.N", ty),
            Err(Error::InvalidOperation(_))
        ));
        assert_eq!(state.method_count(), 1);
        assert!(state.synthesized_types("M:C.N").is_empty());
        Ok(())
    }

    #[test]
    fn test_concurrent_writers() -> Result<()> {
        let state = Arc::new(ModuleCompilationState::new());
        let handles: Vec<_> = (0..8)
            .map(|i| {
                let state = Arc::clone(&state);
                std::thread::spawn(move || {
                    let ty = NamedTypeBuilder::new("", &format!("<>T{i}")).build(Weak::new());
                    state.add_synthesized_type(&format!("M:C.M{i}"), ty)
                })
            })
            .collect();
        for handle in handles {
            handle.join().expect("writer thread")?;
        }
        state.freeze();
        assert_eq!(state.method_count(), 8);
        Ok(())
    }
}
