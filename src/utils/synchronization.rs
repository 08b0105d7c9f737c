//! Synchronization utilities for compiler event delivery.
//!
//! # Key Components
//!
//! - [`AsyncQueue`] - A producer/multi-consumer queue whose completion can be signalled
//!   exactly once, used to stream [`crate::compilation::CompilationEvent`]s to hosts
//!
//! # Design Principles
//!
//! - **Idempotent completion**: completing twice is harmless and reports whether this
//!   call was the one that completed the queue
//! - **Race freedom**: completion and enqueue take the same lock, so an item is either
//!   enqueued before completion or rejected
//! - **No lost wakeups**: consumers block on a condition variable that every enqueue and
//!   the completion notify

use std::{
    collections::VecDeque,
    sync::{Condvar, Mutex},
};

use crate::{Error, Result};

struct QueueState<T> {
    items: VecDeque<T>,
    completed: bool,
}

/// A blocking queue that many producers may fill and many consumers may drain until it
/// is completed.
///
/// # Examples
///
/// ```rust
/// use dotcompile::utils::AsyncQueue;
/// use std::sync::Arc;
/// use std::thread;
///
/// let queue = Arc::new(AsyncQueue::new());
/// let consumer = {
///     let queue = Arc::clone(&queue);
///     thread::spawn(move || {
///         let mut seen = Vec::new();
///         while let Some(item) = queue.dequeue() {
///             seen.push(item);
///         }
///         seen
///     })
/// };
///
/// queue.enqueue(1)?;
/// queue.enqueue(2)?;
/// assert!(queue.try_complete());
/// assert!(!queue.try_complete());
///
/// assert_eq!(consumer.join().unwrap(), vec![1, 2]);
/// # Ok::<(), dotcompile::Error>(())
/// ```
pub struct AsyncQueue<T> {
    state: Mutex<QueueState<T>>,
    condvar: Condvar,
}

impl<T> Default for AsyncQueue<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> AsyncQueue<T> {
    /// Creates an empty, open queue.
    #[must_use]
    pub fn new() -> Self {
        AsyncQueue {
            state: Mutex::new(QueueState {
                items: VecDeque::new(),
                completed: false,
            }),
            condvar: Condvar::new(),
        }
    }

    /// Adds an item to the queue.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidOperation`] if the queue has already been completed.
    pub fn enqueue(&self, item: T) -> Result<()> {
        if self.try_enqueue(item) {
            Ok(())
        } else {
            Err(Error::InvalidOperation(
                "cannot enqueue into a completed queue".to_string(),
            ))
        }
    }

    /// Adds an item unless the queue has been completed. Returns whether it was added.
    pub fn try_enqueue(&self, item: T) -> bool {
        let mut state = lock_recover!(self.state);
        if state.completed {
            return false;
        }
        state.items.push_back(item);
        drop(state);
        self.condvar.notify_one();
        true
    }

    /// Signals that no further items will be added.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidOperation`] if the queue was already completed.
    pub fn complete(&self) -> Result<()> {
        if self.try_complete() {
            Ok(())
        } else {
            Err(Error::InvalidOperation("queue already completed".to_string()))
        }
    }

    /// Completes the queue if it is still open. Returns `true` only for the call that
    /// performed the transition.
    pub fn try_complete(&self) -> bool {
        let mut state = lock_recover!(self.state);
        if state.completed {
            return false;
        }
        state.completed = true;
        drop(state);
        self.condvar.notify_all();
        true
    }

    /// Returns `true` once the queue has been completed.
    pub fn is_completed(&self) -> bool {
        lock_recover!(self.state).completed
    }

    /// Number of items currently waiting.
    pub fn len(&self) -> usize {
        lock_recover!(self.state).items.len()
    }

    /// Returns `true` if no items are waiting.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Removes the next item without blocking.
    pub fn try_dequeue(&self) -> Option<T> {
        lock_recover!(self.state).items.pop_front()
    }

    /// Blocks until an item is available or the queue is completed and drained.
    ///
    /// Returns `None` only when the queue is completed and empty.
    pub fn dequeue(&self) -> Option<T> {
        let mut state = lock_recover!(self.state);
        loop {
            if let Some(item) = state.items.pop_front() {
                return Some(item);
            }
            if state.completed {
                return None;
            }
            state = self
                .condvar
                .wait(state)
                .unwrap_or_else(std::sync::PoisonError::into_inner);
        }
    }

    /// Removes and returns every waiting item.
    pub fn drain(&self) -> Vec<T> {
        lock_recover!(self.state).items.drain(..).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn test_enqueue_after_complete_fails() {
        let queue = AsyncQueue::new();
        queue.enqueue(1).unwrap();
        queue.complete().unwrap();
        assert!(queue.enqueue(2).is_err());
        assert!(queue.complete().is_err());
        assert_eq!(queue.drain(), vec![1]);
    }

    #[test]
    fn test_concurrent_completion_is_idempotent() {
        let queue = Arc::new(AsyncQueue::<u32>::new());
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let queue = Arc::clone(&queue);
                thread::spawn(move || queue.try_complete())
            })
            .collect();

        let winners = handles
            .into_iter()
            .map(|h| h.join().unwrap())
            .filter(|won| *won)
            .count();
        assert_eq!(winners, 1);
        assert!(queue.is_completed());
    }

    #[test]
    fn test_multiple_consumers_drain_everything() {
        let queue = Arc::new(AsyncQueue::new());
        let consumers: Vec<_> = (0..3)
            .map(|_| {
                let queue = Arc::clone(&queue);
                thread::spawn(move || {
                    let mut count = 0;
                    while queue.dequeue().is_some() {
                        count += 1;
                    }
                    count
                })
            })
            .collect();

        for i in 0..100 {
            queue.enqueue(i).unwrap();
        }
        queue.complete().unwrap();

        let total: usize = consumers.into_iter().map(|h| h.join().unwrap()).sum();
        assert_eq!(total, 100);
    }
}
