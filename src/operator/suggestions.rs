//! AI suggestions awaiting operator confirmation.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use tokio::time::Instant;

use crate::ai::AiReply;

/// Suggestions produced by `ai #ID`, keyed by message identifier.
///
/// `confirm #ID` consumes the cached suggestion so one buyer message is
/// classified and recorded once.
#[derive(Clone)]
pub struct SuggestionCache {
    ttl: Duration,
    inner: Arc<Mutex<HashMap<String, (AiReply, Instant)>>>,
}

impl SuggestionCache {
    /// Create an empty cache whose entries expire after `ttl`.
    #[must_use]
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            inner: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Store the suggestion for `message_id`, replacing any prior one.
    pub fn store(&self, message_id: &str, reply: AiReply) {
        let mut map = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        map.insert(message_id.to_owned(), (reply, Instant::now()));
    }

    /// Cached suggestion for `message_id`, if still fresh.
    #[must_use]
    pub fn get(&self, message_id: &str) -> Option<AiReply> {
        let map = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        map.get(message_id)
            .filter(|(_, at)| at.elapsed() < self.ttl)
            .map(|(reply, _)| reply.clone())
    }

    /// Remove the suggestion for `message_id`.
    pub fn discard(&self, message_id: &str) {
        self.inner
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(message_id);
    }

    /// Drop every expired suggestion; returns how many were removed.
    pub fn purge_expired(&self) -> usize {
        let ttl = self.ttl;
        let mut map = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        let before = map.len();
        map.retain(|_, (_, at)| at.elapsed() < ttl);
        before - map.len()
    }

    /// Suggestions held, expired or not.
    #[must_use]
    pub fn len(&self) -> usize {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    /// Whether no suggestion is held.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
