#![allow(unused_macros)]

/// Helper macro for locking items
///
/// ```rust, ignore
///  let mut data = lock!(my_mutex);
///  data.some_field = 42;
/// ```
macro_rules! lock {
    ($lock:expr) => {
        $lock.lock().map_err(|_| crate::Error::LockError)?
    };
}

/// Helper macro for locking items in functions that cannot propagate errors.
///
/// A poisoned lock only means another thread panicked while holding it; the
/// protected data in this crate is always left consistent, so the guard is recovered.
///
/// ```rust, ignore
///  let mut data = lock_recover!(my_mutex);
/// ```
macro_rules! lock_recover {
    ($lock:expr) => {
        $lock
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    };
}

/// Returns early with [`crate::Error::Cancelled`] if the token has been signalled.
///
/// ```rust, ignore
///  check_cancelled!(cancel);
/// ```
macro_rules! check_cancelled {
    ($token:expr) => {
        $token.throw_if_cancellation_requested()?
    };
}
