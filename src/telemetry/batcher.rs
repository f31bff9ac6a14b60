//! In-memory usage event batching with bounded re-queue.

use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;
use sha2::{Digest, Sha256};
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::TelemetryConfig;
use crate::persistence::settings_repo::SettingsRepo;

use super::sink::TelemetrySink;

/// Failed uploads an event survives before it is dropped.
pub const MAX_ATTEMPTS: u32 = 3;

const ANONYMOUS_ID_SETTING: &str = "anonymous_user_id";

/// One tracked event.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct UsageEvent {
    /// Event name, e.g. `message_resolved`.
    #[serde(rename = "type")]
    pub event_type: String,
    /// Event payload.
    pub data: Value,
    /// When the event was tracked.
    pub timestamp: DateTime<Utc>,
    /// Installation identifier.
    pub anonymous_id: String,
    /// Process identifier.
    pub session_id: String,
}

#[derive(Debug, Clone)]
struct Queued {
    event: UsageEvent,
    failures: u32,
}

struct BatchState {
    queue: Vec<Queued>,
    last_flush: Instant,
}

/// Accumulates usage events and flushes them to a [`TelemetrySink`].
///
/// [`track`](Self::track) only enqueues. Uploads run on the task from
/// [`spawn_flush_task`], which wakes every `batch_interval` and as soon as
/// the queue reaches `batch_size` or the interval has passed since the
/// last flush. Failed items are re-queued until they have failed
/// [`MAX_ATTEMPTS`] times.
pub struct UsageBatcher {
    sink: Arc<dyn TelemetrySink>,
    enabled: bool,
    batch_size: usize,
    interval: Duration,
    anonymous_id: String,
    session_id: String,
    state: Mutex<BatchState>,
    due: Notify,
}

impl UsageBatcher {
    /// Create a batcher.
    #[must_use]
    pub fn new(
        sink: Arc<dyn TelemetrySink>,
        config: &TelemetryConfig,
        anonymous_id: String,
    ) -> Self {
        Self {
            sink,
            enabled: config.enabled,
            batch_size: config.batch_size.max(1),
            interval: Duration::from_secs(config.batch_interval_seconds),
            anonymous_id,
            session_id: uuid::Uuid::new_v4().simple().to_string()[..16].to_owned(),
            state: Mutex::new(BatchState {
                queue: Vec::new(),
                last_flush: Instant::now(),
            }),
            due: Notify::new(),
        }
    }

    /// Installation identifier attached to every event.
    #[must_use]
    pub fn anonymous_id(&self) -> &str {
        &self.anonymous_id
    }

    /// Queue an event and wake the flush task when a batch is due.
    /// Never waits on the sink. No-op when disabled.
    pub fn track(&self, event_type: &str, data: Value) {
        if !self.enabled {
            return;
        }
        let due = {
            let mut state = self.lock_state();
            state.queue.push(Queued {
                event: UsageEvent {
                    event_type: event_type.to_owned(),
                    data,
                    timestamp: Utc::now(),
                    anonymous_id: self.anonymous_id.clone(),
                    session_id: self.session_id.clone(),
                },
                failures: 0,
            });
            state.queue.len() >= self.batch_size || state.last_flush.elapsed() >= self.interval
        };
        if due {
            self.due.notify_one();
        }
    }

    /// Send everything queued; returns how many events were accepted.
    pub async fn flush(&self) -> usize {
        let batch = {
            let mut state = self.lock_state();
            state.last_flush = Instant::now();
            std::mem::take(&mut state.queue)
        };
        if batch.is_empty() {
            return 0;
        }

        let events: Vec<UsageEvent> = batch.iter().map(|q| q.event.clone()).collect();
        match self.sink.send(&events).await {
            Ok(()) => {
                debug!(count = events.len(), "usage batch flushed");
                events.len()
            }
            Err(err) => {
                let retry: Vec<Queued> = batch
                    .into_iter()
                    .filter_map(|mut q| {
                        q.failures += 1;
                        (q.failures < MAX_ATTEMPTS).then_some(q)
                    })
                    .collect();
                let dropped = events.len() - retry.len();
                warn!(%err, requeued = retry.len(), dropped, "usage batch upload failed");
                let mut state = self.lock_state();
                let newer = std::mem::replace(&mut state.queue, retry);
                state.queue.extend(newer);
                0
            }
        }
    }

    /// Events waiting to be sent.
    #[must_use]
    pub fn pending(&self) -> usize {
        self.lock_state().queue.len()
    }

    fn lock_state(&self) -> std::sync::MutexGuard<'_, BatchState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Spawn the periodic flush task; flushes once more on cancellation.
#[must_use]
pub fn spawn_flush_task(batcher: Arc<UsageBatcher>, cancel: CancellationToken) -> JoinHandle<()> {
    tokio::spawn(async move {
        let period = batcher.interval.max(Duration::from_secs(1));
        let mut interval = tokio::time::interval(period);
        loop {
            tokio::select! {
                () = cancel.cancelled() => {
                    let sent = batcher.flush().await;
                    info!(sent, "telemetry task shutting down");
                    break;
                }
                _ = interval.tick() => {
                    batcher.flush().await;
                }
                () = batcher.due.notified() => {
                    batcher.flush().await;
                }
            }
        }
    })
}

/// Load the persisted installation identifier, creating it on first use.
///
/// New identifiers are the first 16 hex characters of a SHA-256 over host
/// facts and a random nonce.
pub async fn load_or_create_anonymous_id(settings: &SettingsRepo) -> String {
    match settings.system_setting(ANONYMOUS_ID_SETTING).await {
        Ok(Some(id)) if !id.is_empty() => return id,
        Ok(_) => {}
        Err(err) => warn!(%err, "failed to read anonymous id"),
    }

    let host = std::env::var("HOSTNAME")
        .or_else(|_| std::env::var("COMPUTERNAME"))
        .unwrap_or_default();
    let facts = format!(
        "{host}-{}-{}-{}",
        std::env::consts::OS,
        std::env::consts::ARCH,
        uuid::Uuid::new_v4()
    );
    let digest = Sha256::digest(facts.as_bytes());
    let id: String = digest.iter().take(8).map(|b| format!("{b:02x}")).collect();

    if let Err(err) = settings.set_system_setting(ANONYMOUS_ID_SETTING, &id).await {
        warn!(%err, "failed to persist anonymous id");
    }
    id
}
