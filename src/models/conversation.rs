//! Conversation turns used as AI prompt context.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Speaker of a conversation turn.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum TurnRole {
    /// The buyer.
    User,
    /// The seller side (AI or refusal text).
    Assistant,
}

impl TurnRole {
    /// Storage representation.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::User => "user",
            Self::Assistant => "assistant",
        }
    }

    /// Parse the storage representation.
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "user" => Some(Self::User),
            "assistant" => Some(Self::Assistant),
            _ => None,
        }
    }
}

/// Classified intent of a buyer message.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum Intent {
    /// Bargaining over the price.
    Price,
    /// Technical or usage question.
    Tech,
    /// Anything else.
    Default,
}

impl Intent {
    /// Label the classifier is asked to produce.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Price => "price",
            Self::Tech => "tech",
            Self::Default => "default",
        }
    }

    /// Map raw classifier output to an intent.
    ///
    /// Anything other than one of the three labels falls back to `Default`.
    #[must_use]
    pub fn from_label(raw: &str) -> Self {
        match raw.trim().to_lowercase().as_str() {
            "price" => Self::Price,
            "tech" => Self::Tech,
            _ => Self::Default,
        }
    }
}

/// One persisted turn in a (chat, account) conversation.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ConversationTurn {
    /// Marketplace conversation identifier.
    pub chat_id: String,
    /// Seller account identifier.
    pub cookie_id: String,
    /// Buyer user identifier.
    pub user_id: String,
    /// Item the conversation is about.
    pub item_id: String,
    /// Speaker.
    pub role: TurnRole,
    /// Turn text.
    pub content: String,
    /// Intent tag of the exchange this turn belongs to.
    pub intent: Option<Intent>,
    /// Creation timestamp.
    pub created_at: DateTime<Utc>,
}

impl ConversationTurn {
    /// Construct a turn stamped with the current time.
    #[must_use]
    pub fn new(
        chat_id: &str,
        cookie_id: &str,
        user_id: &str,
        item_id: &str,
        role: TurnRole,
        content: String,
        intent: Option<Intent>,
    ) -> Self {
        Self {
            chat_id: chat_id.to_owned(),
            cookie_id: cookie_id.to_owned(),
            user_id: user_id.to_owned(),
            item_id: item_id.to_owned(),
            role,
            content,
            intent,
            created_at: Utc::now(),
        }
    }
}
