//! Shared application state handed to every handler.

use std::sync::Arc;

use serde_json::Value;

use crate::ai::AiReplyEngine;
use crate::config::GlobalConfig;
use crate::marketplace::MarketplaceDelivery;
use crate::operator::locks::ResolveLocks;
use crate::operator::reply_state::ReplyStates;
use crate::operator::suggestions::SuggestionCache;
use crate::persistence::db::Database;
use crate::persistence::message_repo::MessageRepo;
use crate::persistence::settings_repo::SettingsRepo;
use crate::telegram::gateway::OutboundGateway;
use crate::telemetry::UsageBatcher;

/// Process-wide handles.
pub struct AppState {
    /// Loaded configuration.
    pub config: Arc<GlobalConfig>,
    /// Database pool.
    pub db: Arc<Database>,
    /// Bot API gateway; `None` runs without operator notifications.
    pub gateway: Option<Arc<OutboundGateway>>,
    /// Marketplace send path.
    pub delivery: Arc<dyn MarketplaceDelivery>,
    /// AI reply orchestration.
    pub ai: Arc<AiReplyEngine>,
    /// Per-message resolve locks.
    pub locks: ResolveLocks,
    /// Per-channel reply mode.
    pub reply_states: ReplyStates,
    /// AI suggestions awaiting confirmation.
    pub suggestions: SuggestionCache,
    /// Usage telemetry; `None` when disabled.
    pub telemetry: Option<Arc<UsageBatcher>>,
}

impl AppState {
    /// Message record repository over the shared pool.
    #[must_use]
    pub fn messages(&self) -> MessageRepo {
        MessageRepo::new(Arc::clone(&self.db))
    }

    /// Settings repository over the shared pool.
    #[must_use]
    pub fn settings(&self) -> SettingsRepo {
        SettingsRepo::new(Arc::clone(&self.db))
    }

    /// Queue a usage event when telemetry is on.
    pub fn track(&self, event_type: &str, data: Value) {
        if let Some(telemetry) = &self.telemetry {
            telemetry.track(event_type, data);
        }
    }
}
