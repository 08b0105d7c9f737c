//! Stable hashing.
//!
//! Option records and caches need hash values that do not change between processes,
//! so `std`'s randomly seeded `RandomState` is not usable for them. [`StableHasher`]
//! wraps `FxHasher` from `rustc-hash`, which is unseeded and fast on the short keys
//! (type names, option fields) hashed here.

use std::hash::{Hash, Hasher};

use rustc_hash::FxHasher;

/// A deterministic [`Hasher`] backed by `FxHasher`.
#[derive(Clone, Default)]
pub struct StableHasher {
    inner: FxHasher,
}

impl StableHasher {
    /// Creates a hasher with the fixed initial state.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl std::fmt::Debug for StableHasher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StableHasher")
            .field("state", &self.inner.finish())
            .finish()
    }
}

impl Hasher for StableHasher {
    fn finish(&self) -> u64 {
        self.inner.finish()
    }

    fn write(&mut self, bytes: &[u8]) {
        self.inner.write(bytes);
    }

    fn write_u8(&mut self, i: u8) {
        self.inner.write_u8(i);
    }

    fn write_u32(&mut self, i: u32) {
        self.inner.write_u32(i);
    }

    fn write_u64(&mut self, i: u64) {
        self.inner.write_u64(i);
    }

    fn write_usize(&mut self, i: usize) {
        self.inner.write_usize(i);
    }
}

/// Hashes any value with a fresh [`StableHasher`].
///
/// # Arguments
///
/// * `value` - The value to hash
///
/// # Returns
///
/// A 64-bit hash that is identical in every process for equal input.
#[must_use]
pub fn stable_hash<T: Hash + ?Sized>(value: &T) -> u64 {
    let mut hasher = StableHasher::new();
    value.hash(&mut hasher);
    hasher.finish()
}

/// Mixes `value` into an accumulated hash `current`, order-sensitively.
#[must_use]
pub fn combine_hash(value: u64, current: u64) -> u64 {
    current.wrapping_mul(0xA555_5529).wrapping_add(value)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stable_hash_is_repeatable() {
        assert_eq!(stable_hash("System.Object"), stable_hash("System.Object"));
        assert_ne!(stable_hash("System.Object"), stable_hash("System.String"));
    }

    #[test]
    fn test_stable_hash_matches_fx_hasher() {
        let mut fx = FxHasher::default();
        "System.Int32".hash(&mut fx);
        assert_eq!(stable_hash("System.Int32"), fx.finish());
    }

    #[test]
    fn test_combine_is_order_sensitive() {
        let a = combine_hash(1, combine_hash(2, 0));
        let b = combine_hash(2, combine_hash(1, 0));
        assert_ne!(a, b);
    }
}
