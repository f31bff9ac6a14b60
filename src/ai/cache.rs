//! Per-account completion client cache.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use tracing::info;

use crate::models::settings::AiSettings;

use super::backend::{BackendError, CompletionBackend};

struct CachedClient {
    settings: AiSettings,
    backend: Arc<CompletionBackend>,
}

/// Completion clients keyed by seller account.
///
/// An entry is rebuilt whenever the stored settings no longer equal the
/// settings it was built from, so edits take effect on the next request.
pub struct ClientCache {
    timeout: Duration,
    entries: Mutex<HashMap<String, CachedClient>>,
}

impl ClientCache {
    /// Create an empty cache whose clients use `timeout` per request.
    #[must_use]
    pub fn new(timeout: Duration) -> Self {
        Self {
            timeout,
            entries: Mutex::new(HashMap::new()),
        }
    }

    /// Return the cached client for `settings.cookie_id`, building it if
    /// absent or stale.
    ///
    /// # Errors
    ///
    /// Returns `BackendError::Config` if a new client cannot be built.
    pub fn get_or_build(
        &self,
        settings: &AiSettings,
    ) -> Result<Arc<CompletionBackend>, BackendError> {
        let mut entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(cached) = entries.get(&settings.cookie_id) {
            if cached.settings == *settings {
                return Ok(Arc::clone(&cached.backend));
            }
        }

        let backend = Arc::new(CompletionBackend::from_settings(settings, self.timeout)?);
        info!(
            cookie_id = %settings.cookie_id,
            base_url = %settings.base_url,
            api_key = %settings.masked_key(),
            "built completion client"
        );
        entries.insert(
            settings.cookie_id.clone(),
            CachedClient {
                settings: settings.clone(),
                backend: Arc::clone(&backend),
            },
        );
        Ok(backend)
    }

    /// Drop one account's client, or every client when `cookie_id` is `None`.
    pub fn clear_cache(&self, cookie_id: Option<&str>) {
        let mut entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        match cookie_id {
            Some(id) => {
                entries.remove(id);
                info!(cookie_id = %id, "cleared completion client");
            }
            None => {
                entries.clear();
                info!("cleared all completion clients");
            }
        }
    }

    /// Number of cached clients.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    /// Whether no client is cached.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
