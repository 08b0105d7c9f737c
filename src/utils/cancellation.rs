//! Cooperative cancellation.
//!
//! Every long-running public entry point (diagnostics retrieval, emit, lookups over
//! large symbol tables) accepts a [`CancellationToken`] and polls it once per unit of
//! work: per syntax tree, per method compiled, per reference bound. A signalled token
//! surfaces as [`crate::Error::Cancelled`], never as a diagnostic.

use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};

use crate::{Error, Result};

/// A cloneable handle to a shared cancellation flag.
///
/// Clones observe the same flag, so a host can keep one clone and hand another to the
/// compiler.
///
/// # Examples
///
/// ```rust
/// use dotcompile::utils::CancellationToken;
///
/// let token = CancellationToken::new();
/// let worker = token.clone();
/// assert!(worker.throw_if_cancellation_requested().is_ok());
///
/// token.cancel();
/// assert!(worker.is_cancellation_requested());
/// assert!(worker.throw_if_cancellation_requested().is_err());
/// ```
#[derive(Clone, Debug, Default)]
pub struct CancellationToken {
    flag: Option<Arc<AtomicBool>>,
}

impl CancellationToken {
    /// Creates a new token that can be signalled.
    #[must_use]
    pub fn new() -> Self {
        CancellationToken {
            flag: Some(Arc::new(AtomicBool::new(false))),
        }
    }

    /// A token that can never be cancelled.
    #[must_use]
    pub fn none() -> Self {
        CancellationToken { flag: None }
    }

    /// Requests cancellation. Has no effect on [`CancellationToken::none`].
    pub fn cancel(&self) {
        if let Some(flag) = &self.flag {
            flag.store(true, Ordering::Release);
        }
    }

    /// Returns `true` once [`CancellationToken::cancel`] has been called on any clone.
    #[must_use]
    pub fn is_cancellation_requested(&self) -> bool {
        self.flag
            .as_ref()
            .is_some_and(|flag| flag.load(Ordering::Acquire))
    }

    /// Returns `Err(Error::Cancelled)` if cancellation was requested.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Cancelled`] when the token has been signalled.
    pub fn throw_if_cancellation_requested(&self) -> Result<()> {
        if self.is_cancellation_requested() {
            Err(Error::Cancelled)
        } else {
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_none_token_never_cancels() {
        let token = CancellationToken::none();
        token.cancel();
        assert!(!token.is_cancellation_requested());
    }

    #[test]
    fn test_clones_share_flag() {
        let token = CancellationToken::new();
        let other = token.clone();
        other.cancel();
        assert!(matches!(
            token.throw_if_cancellation_requested(),
            Err(Error::Cancelled)
        ));
    }
}
