//! Per-message resolve locks.

use std::collections::HashSet;
use std::sync::{Arc, Mutex, PoisonError};

use crate::{AppError, Result};

/// Registry of message identifiers currently being resolved.
///
/// Acquisition never waits: a second caller for the same identifier gets
/// [`AppError::Busy`] immediately. The returned guard releases the
/// identifier when dropped, on every exit path.
#[derive(Clone, Default)]
pub struct ResolveLocks {
    inner: Arc<Mutex<HashSet<String>>>,
}

/// Exclusive claim on one message identifier.
#[must_use = "the lock is released as soon as the guard is dropped"]
pub struct ResolveGuard {
    id: String,
    inner: Arc<Mutex<HashSet<String>>>,
}

impl ResolveLocks {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Claim `message_id`.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Busy` if another resolve holds it.
    pub fn try_acquire(&self, message_id: &str) -> Result<ResolveGuard> {
        let mut held = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        if !held.insert(message_id.to_owned()) {
            return Err(AppError::Busy(format!("message #{message_id} is being processed")));
        }
        Ok(ResolveGuard {
            id: message_id.to_owned(),
            inner: Arc::clone(&self.inner),
        })
    }

    /// Whether `message_id` is currently claimed.
    #[must_use]
    pub fn is_held(&self, message_id: &str) -> bool {
        self.inner
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .contains(message_id)
    }

    /// Number of identifiers currently claimed.
    #[must_use]
    pub fn held_count(&self) -> usize {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner).len()
    }
}

impl ResolveGuard {
    /// The claimed identifier.
    #[must_use]
    pub fn message_id(&self) -> &str {
        &self.id
    }
}

impl Drop for ResolveGuard {
    fn drop(&mut self) {
        self.inner
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&self.id);
    }
}
