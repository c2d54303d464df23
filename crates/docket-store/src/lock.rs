//! FIFO mutual exclusion for async call sequences.
//!
//! One ticket is active at a time. Waiters are granted in the order they
//! called [`AsyncLock::acquire`]. A ticket releases on drop, so every early
//! return or `?` inside a critical section hands the lock on.

use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard};

/// A fair, in-process async lock.
///
/// Cloning yields another handle to the same lock.
#[derive(Debug, Clone, Default)]
pub struct AsyncLock {
    inner: Arc<Mutex<()>>,
}

/// Proof of holding an [`AsyncLock`].
#[derive(Debug)]
#[must_use = "the lock is released as soon as the ticket is dropped"]
pub struct LockTicket {
    _guard: OwnedMutexGuard<()>,
}

impl LockTicket {
    /// Hand the lock to the next waiter, or mark it free.
    pub fn release(self) {}
}

impl AsyncLock {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wait for the lock. Resolves once every earlier acquirer has released.
    ///
    /// Dropping the returned future before it resolves gives up the place
    /// in line without blocking later waiters.
    pub async fn acquire(&self) -> LockTicket {
        LockTicket {
            _guard: Arc::clone(&self.inner).lock_owned().await,
        }
    }

    /// Wait for all earlier holders, then release immediately.
    ///
    /// Readers use this to observe state strictly after any write that
    /// started before them.
    pub async fn barrier(&self) {
        self.acquire().await.release();
    }

    /// Whether a ticket is currently held.
    pub fn is_locked(&self) -> bool {
        self.inner.try_lock().is_err()
    }
}
