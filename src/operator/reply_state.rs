//! Per-channel "awaiting reply text" mode.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use tokio::time::Instant;

#[derive(Debug, Clone)]
struct AwaitingReply {
    target: String,
    created_at: Instant,
}

/// Reply-mode sessions keyed by operator chat.
///
/// At most one target per chat; a new [`begin`](Self::begin) replaces any
/// prior one. Entries older than the TTL are treated as absent.
#[derive(Clone)]
pub struct ReplyStates {
    ttl: Duration,
    inner: Arc<Mutex<HashMap<i64, AwaitingReply>>>,
}

impl ReplyStates {
    /// Create an empty registry whose entries expire after `ttl`.
    #[must_use]
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            inner: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Enter reply mode for `chat_id`, targeting `message_id`.
    pub fn begin(&self, chat_id: i64, message_id: &str) {
        let mut states = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        states.insert(
            chat_id,
            AwaitingReply {
                target: message_id.to_owned(),
                created_at: Instant::now(),
            },
        );
    }

    /// Consume the pending target for `chat_id`, if one exists and has not expired.
    pub fn take(&self, chat_id: i64) -> Option<String> {
        let mut states = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        let state = states.remove(&chat_id)?;
        (state.created_at.elapsed() < self.ttl).then_some(state.target)
    }

    /// Current target for `chat_id` without consuming it.
    #[must_use]
    pub fn peek(&self, chat_id: i64) -> Option<String> {
        let states = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        states
            .get(&chat_id)
            .filter(|s| s.created_at.elapsed() < self.ttl)
            .map(|s| s.target.clone())
    }

    /// Leave reply mode; returns the abandoned target, if any.
    pub fn cancel(&self, chat_id: i64) -> Option<String> {
        let mut states = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        let state = states.remove(&chat_id)?;
        (state.created_at.elapsed() < self.ttl).then_some(state.target)
    }

    /// Drop every expired entry; returns how many were removed.
    pub fn purge_expired(&self) -> usize {
        let ttl = self.ttl;
        let mut states = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        let before = states.len();
        states.retain(|_, s| s.created_at.elapsed() < ttl);
        before - states.len()
    }

    /// Entries held, expired or not.
    #[must_use]
    pub fn len(&self) -> usize {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    /// Whether no entry is held.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
