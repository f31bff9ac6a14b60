//! AI reply orchestration: classify, enforce bargaining limits, generate,
//! and record the exchange.

use std::sync::Arc;
use std::time::Duration;

use tracing::{info, warn};

use crate::models::conversation::{ConversationTurn, Intent, TurnRole};
use crate::models::message::MessageRecord;
use crate::models::settings::{AiSettings, ItemInfo};
use crate::persistence::conversation_repo::ConversationRepo;
use crate::persistence::db::Database;
use crate::persistence::settings_repo::SettingsRepo;

use super::backend::{CompletionBackend, Sampling};
use super::cache::ClientCache;
use super::prompts::{self, PromptContext, REFUSAL_REPLY};

/// Turns of history included in the generation prompt.
pub const CONTEXT_TURNS: u32 = 10;

/// One buyer message to answer.
#[derive(Debug, Clone, Copy)]
pub struct ReplyRequest<'a> {
    /// Buyer message text.
    pub message: &'a str,
    /// Seller account identifier.
    pub cookie_id: &'a str,
    /// Marketplace conversation identifier.
    pub chat_id: &'a str,
    /// Buyer user identifier.
    pub user_id: &'a str,
    /// Item the conversation is about.
    pub item_id: &'a str,
}

impl<'a> From<&'a MessageRecord> for ReplyRequest<'a> {
    fn from(record: &'a MessageRecord) -> Self {
        Self {
            message: &record.text,
            cookie_id: &record.cookie_id,
            chat_id: &record.chat_id,
            user_id: &record.sender_user_id,
            item_id: &record.item_id,
        }
    }
}

/// A generated (or refused) reply.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AiReply {
    /// Text to send to the buyer.
    pub text: String,
    /// Classified intent of the buyer message.
    pub intent: Intent,
    /// Whether this is the fixed bargaining refusal.
    pub refused: bool,
}

/// Orchestrates classification and generation against per-account backends.
pub struct AiReplyEngine {
    conversations: ConversationRepo,
    settings: SettingsRepo,
    clients: ClientCache,
}

impl AiReplyEngine {
    /// Create an engine over `db` whose backend calls time out after `timeout`.
    #[must_use]
    pub fn new(db: Arc<Database>, timeout: Duration) -> Self {
        Self {
            conversations: ConversationRepo::new(Arc::clone(&db)),
            settings: SettingsRepo::new(db),
            clients: ClientCache::new(timeout),
        }
    }

    /// Per-account completion clients.
    #[must_use]
    pub fn clients(&self) -> &ClientCache {
        &self.clients
    }

    /// Generate a reply for the record's buyer message.
    pub async fn generate_for_record(&self, record: &MessageRecord) -> Option<AiReply> {
        self.generate_reply(&ReplyRequest::from(record)).await
    }

    /// Generate a reply.
    ///
    /// Returns `None` when AI is unavailable for the account or generation
    /// fails; nothing is recorded in that case. A price message at the
    /// bargaining limit returns the fixed refusal without a backend call.
    pub async fn generate_reply(&self, req: &ReplyRequest<'_>) -> Option<AiReply> {
        let (settings, backend) = self.backend_for(req.cookie_id).await?;

        let intent = classify(&settings, &backend, req.message).await;
        info!(
            cookie_id = %req.cookie_id,
            chat_id = %req.chat_id,
            intent = intent.as_str(),
            "classified buyer message"
        );

        let history = match self
            .conversations
            .recent_turns(req.chat_id, req.cookie_id, CONTEXT_TURNS)
            .await
        {
            Ok(turns) => turns,
            Err(err) => {
                warn!(chat_id = %req.chat_id, %err, "failed to load conversation history");
                return None;
            }
        };
        let bargain_count = match self
            .conversations
            .count_price_turns(req.chat_id, req.cookie_id)
            .await
        {
            Ok(n) => n,
            Err(err) => {
                warn!(chat_id = %req.chat_id, %err, "failed to count bargaining rounds");
                return None;
            }
        };

        // The in-flight buyer turn counts as a round.
        if intent == Intent::Price && bargain_count + 1 >= settings.max_bargain_rounds {
            info!(
                chat_id = %req.chat_id,
                bargain_count,
                max_rounds = settings.max_bargain_rounds,
                "bargaining limit reached"
            );
            self.record_exchange(req, intent, REFUSAL_REPLY).await;
            return Some(AiReply {
                text: REFUSAL_REPLY.to_owned(),
                intent,
                refused: true,
            });
        }

        let item = self.item_info(req.cookie_id, req.item_id).await;
        let user_prompt = prompts::build_user_prompt(&PromptContext {
            item: &item,
            history: &history,
            bargain_count,
            settings: &settings,
            message: req.message,
        });
        let system_prompt = prompts::system_prompt(&settings, intent);

        let text = match backend
            .complete(system_prompt, &user_prompt, Sampling::GENERATE)
            .await
        {
            Ok(text) if !text.is_empty() => text,
            Ok(_) => {
                warn!(cookie_id = %req.cookie_id, "backend returned an empty reply");
                return None;
            }
            Err(err) => {
                warn!(cookie_id = %req.cookie_id, %err, "reply generation failed");
                return None;
            }
        };

        self.record_exchange(req, intent, &text).await;
        info!(
            cookie_id = %req.cookie_id,
            chat_id = %req.chat_id,
            intent = intent.as_str(),
            "generated ai reply"
        );
        Some(AiReply {
            text,
            intent,
            refused: false,
        })
    }

    async fn backend_for(&self, cookie_id: &str) -> Option<(AiSettings, Arc<CompletionBackend>)> {
        let settings = match self.settings.ai_settings(cookie_id).await {
            Ok(settings) => settings,
            Err(err) => {
                warn!(%cookie_id, %err, "failed to load ai settings");
                return None;
            }
        };
        if !settings.is_usable() {
            return None;
        }
        match self.clients.get_or_build(&settings) {
            Ok(backend) => Some((settings, backend)),
            Err(err) => {
                warn!(%cookie_id, %err, "completion backend unavailable");
                None
            }
        }
    }

    async fn item_info(&self, cookie_id: &str, item_id: &str) -> ItemInfo {
        match self.settings.item_info(cookie_id, item_id).await {
            Ok(Some(item)) => item,
            Ok(None) => ItemInfo::unknown(),
            Err(err) => {
                warn!(%cookie_id, %item_id, %err, "failed to load item info");
                ItemInfo::unknown()
            }
        }
    }

    async fn record_exchange(&self, req: &ReplyRequest<'_>, intent: Intent, reply: &str) {
        let user = ConversationTurn::new(
            req.chat_id,
            req.cookie_id,
            req.user_id,
            req.item_id,
            TurnRole::User,
            req.message.to_owned(),
            Some(intent),
        );
        let assistant = ConversationTurn::new(
            req.chat_id,
            req.cookie_id,
            req.user_id,
            req.item_id,
            TurnRole::Assistant,
            reply.to_owned(),
            Some(intent),
        );
        if let Err(err) = self.conversations.append_exchange(&user, &assistant).await {
            warn!(chat_id = %req.chat_id, %err, "failed to record conversation turns");
        }
    }
}

async fn classify(settings: &AiSettings, backend: &CompletionBackend, message: &str) -> Intent {
    match backend
        .classify(prompts::classify_prompt(settings), message)
        .await
    {
        Ok(label) => Intent::from_label(&label),
        Err(err) => {
            warn!(cookie_id = %settings.cookie_id, %err, "intent classification failed");
            Intent::Default
        }
    }
}
