//! Per-compilation side table keyed by typed tokens.

use std::{
    any::Any,
    fmt,
    marker::PhantomData,
    sync::{Arc, Mutex},
};

use dashmap::DashMap;

/// A typed key into a [`SideTable`].
///
/// Two keys with the same name address the same entry, so names must be unique per
/// value type.
pub struct SideTableKey<T> {
    name: &'static str,
    _marker: PhantomData<fn() -> T>,
}

impl<T> SideTableKey<T> {
    /// Creates a key.
    #[must_use]
    pub const fn new(name: &'static str) -> Self {
        SideTableKey {
            name,
            _marker: PhantomData,
        }
    }

    /// Name of the entry.
    #[must_use]
    pub fn name(&self) -> &'static str {
        self.name
    }
}

/// Heterogeneous values owned by one compilation.
///
/// Each entry is created on first use and guarded by its own lock, so updates to
/// different keys never contend.
#[derive(Default)]
pub struct SideTable {
    entries: DashMap<&'static str, Arc<dyn Any + Send + Sync>>,
}

impl SideTable {
    /// Creates an empty table.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn entry<T: Default + Send + 'static>(&self, key: &SideTableKey<T>) -> Option<Arc<Mutex<T>>> {
        let value = self
            .entries
            .entry(key.name)
            .or_insert_with(|| Arc::new(Mutex::new(T::default())) as Arc<dyn Any + Send + Sync>)
            .clone();
        value.downcast::<Mutex<T>>().ok()
    }

    /// Updates the entry for `key`, creating it with `T::default()` first if needed.
    ///
    /// Returns `false` if the name is already used with a different value type.
    pub fn update<T: Default + Send + 'static>(
        &self,
        key: &SideTableKey<T>,
        update: impl FnOnce(&mut T),
    ) -> bool {
        match self.entry(key) {
            Some(cell) => {
                update(&mut lock_recover!(cell));
                true
            }
            None => false,
        }
    }

    /// Reads the entry for `key` without creating it.
    pub fn read<T: Send + 'static, R>(
        &self,
        key: &SideTableKey<T>,
        read: impl FnOnce(&T) -> R,
    ) -> Option<R> {
        let value = self.entries.get(key.name)?.clone();
        let cell = value.downcast::<Mutex<T>>().ok()?;
        let guard = lock_recover!(cell);
        Some(read(&guard))
    }

    /// `true` if nothing has been stored.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl fmt::Debug for SideTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let keys: Vec<&str> = self.entries.iter().map(|e| *e.key()).collect();
        f.debug_struct("SideTable").field("keys", &keys).finish()
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeSet;

    use super::*;

    const NAMES: SideTableKey<BTreeSet<String>> = SideTableKey::new("names");
    const COUNT: SideTableKey<u32> = SideTableKey::new("count");

    #[test]
    fn test_typed_entries() {
        let table = SideTable::new();
        assert!(table.is_empty());
        assert_eq!(table.read(&COUNT, |c| *c), None);

        assert!(table.update(&COUNT, |c| *c += 2));
        assert!(table.update(&NAMES, |n| {
            n.insert("a".to_string());
        }));
        assert_eq!(table.read(&COUNT, |c| *c), Some(2));
        assert_eq!(table.read(&NAMES, |n| n.contains("a")), Some(true));
    }

    #[test]
    fn test_name_reused_with_other_type() {
        let table = SideTable::new();
        let clash: SideTableKey<String> = SideTableKey::new("count");
        assert!(table.update(&COUNT, |c| *c = 1));
        assert!(!table.update(&clash, |s| s.push('x')));
        assert_eq!(table.read(&clash, |s| s.len()), None);
    }
}
