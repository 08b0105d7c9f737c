//! Shared utilities used across the compilation pipeline.
//!
//! # Key Components
//!
//! - [`CancellationToken`] - Cooperative cancellation signal threaded through long operations
//! - [`AsyncQueue`] - Producer/multi-consumer queue with idempotent completion
//! - [`ConcurrentCache`] - Fixed-capacity direct-mapped cache
//! - [`StableHasher`] - Process-independent hasher for option and key hashing

mod cache;
mod cancellation;
mod hash;
mod synchronization;

pub use cache::ConcurrentCache;
pub use cancellation::CancellationToken;
pub use hash::{combine_hash, stable_hash, StableHasher};
pub use synchronization::AsyncQueue;

/// Aligns `value` up to the next multiple of `alignment` (which must be a power of two).
///
/// ```rust
/// use dotcompile::utils::align_to;
///
/// assert_eq!(align_to(5, 4), 8);
/// assert_eq!(align_to(8, 4), 8);
/// assert_eq!(align_to(0, 4), 0);
/// ```
#[must_use]
pub fn align_to(value: u64, alignment: u64) -> u64 {
    (value + alignment - 1) & !(alignment - 1)
}

/// Aligns a value to the next 4-byte boundary, the alignment of every metadata heap.
#[must_use]
pub fn align_to_4_bytes(value: u64) -> u64 {
    align_to(value, 4)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_alignment_functions() {
        assert_eq!(align_to(0, 512), 0);
        assert_eq!(align_to(1, 512), 512);
        assert_eq!(align_to(513, 512), 1024);
        assert_eq!(align_to_4_bytes(1), 4);
        assert_eq!(align_to_4_bytes(4), 4);
        assert_eq!(align_to_4_bytes(5), 8);
    }
}
