//! Periodic eviction of expired reply-mode sessions and AI suggestions.

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::state::AppState;

/// How often expired entries are swept in production.
pub const PURGE_INTERVAL: Duration = Duration::from_secs(60);

/// Spawn the sweep task; it stops when `cancel` fires.
#[must_use]
pub fn spawn_housekeeping_task(
    state: Arc<AppState>,
    period: Duration,
    cancel: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(period);
        loop {
            tokio::select! {
                () = cancel.cancelled() => {
                    info!("housekeeping task shutting down");
                    break;
                }
                _ = interval.tick() => {
                    let reply_modes = state.reply_states.purge_expired();
                    let suggestions = state.suggestions.purge_expired();
                    if reply_modes + suggestions > 0 {
                        debug!(reply_modes, suggestions, "purged expired entries");
                    }
                }
            }
        }
    })
}
