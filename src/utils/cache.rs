//! A small fixed-capacity cache.
//!
//! [`ConcurrentCache`] is direct-mapped: each key hashes to exactly one slot and a new
//! entry simply overwrites whatever occupied that slot. There is no recency tracking.
//! Each slot has its own lock, so concurrent lookups of different names rarely contend.

use std::{hash::Hash, sync::Mutex};

use crate::utils::stable_hash;

/// A thread-safe direct-mapped cache with a power-of-two number of slots.
///
/// # Examples
///
/// ```rust
/// use dotcompile::utils::ConcurrentCache;
///
/// let cache: ConcurrentCache<String, u32> = ConcurrentCache::new(50);
/// assert_eq!(cache.capacity(), 64);
///
/// cache.insert("System.Object".to_string(), 1);
/// assert_eq!(cache.get(&"System.Object".to_string()), Some(1));
/// assert_eq!(cache.get(&"System.String".to_string()), None);
/// ```
pub struct ConcurrentCache<K, V> {
    slots: Box<[Mutex<Option<(K, V)>>]>,
    mask: usize,
}

impl<K: Hash + Eq + Clone, V: Clone> ConcurrentCache<K, V> {
    /// Creates a cache with at least `size` slots, rounded up to a power of two.
    #[must_use]
    pub fn new(size: usize) -> Self {
        let capacity = size.max(1).next_power_of_two();
        let slots = (0..capacity).map(|_| Mutex::new(None)).collect();
        ConcurrentCache {
            slots,
            mask: capacity - 1,
        }
    }

    /// Number of slots.
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    fn slot(&self, key: &K) -> &Mutex<Option<(K, V)>> {
        let index = (stable_hash(key) as usize) & self.mask;
        &self.slots[index]
    }

    /// Returns the cached value for `key`, if its slot currently holds that key.
    pub fn get(&self, key: &K) -> Option<V> {
        let guard = lock_recover!(self.slot(key));
        match guard.as_ref() {
            Some((cached, value)) if cached == key => Some(value.clone()),
            _ => None,
        }
    }

    /// Stores `value` for `key`, evicting whatever occupied the slot.
    pub fn insert(&self, key: K, value: V) {
        let mut guard = lock_recover!(self.slot(&key));
        *guard = Some((key, value));
    }

    /// Returns the cached value or computes, stores and returns it.
    pub fn get_or_insert_with(&self, key: K, compute: impl FnOnce() -> V) -> V {
        if let Some(value) = self.get(&key) {
            return value;
        }
        let value = compute();
        self.insert(key, value.clone());
        value
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_collision_evicts() {
        let cache: ConcurrentCache<u32, u32> = ConcurrentCache::new(1);
        cache.insert(1, 10);
        cache.insert(2, 20);
        assert_eq!(cache.get(&1), None);
        assert_eq!(cache.get(&2), Some(20));
    }

    #[test]
    fn test_get_or_insert_with_computes_once() {
        let cache: ConcurrentCache<&str, usize> = ConcurrentCache::new(8);
        let mut calls = 0;
        let first = cache.get_or_insert_with("Foo", || {
            calls += 1;
            7
        });
        let second = cache.get_or_insert_with("Foo", || 99);
        assert_eq!((first, second, calls), (7, 7, 1));
    }
}
