//! Inbound buyer message record awaiting operator disposition.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Lifecycle status for a message record.
///
/// `Replied` and `Ignored` are terminal: once reached, the record never
/// transitions again.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum MessageStatus {
    /// Awaiting operator action.
    Pending,
    /// A reply was delivered to the buyer.
    Replied,
    /// Operator chose not to answer.
    Ignored,
}

impl MessageStatus {
    /// Whether no further transition is permitted.
    #[must_use]
    pub fn is_terminal(self) -> bool {
        !matches!(self, Self::Pending)
    }

    /// Storage representation.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Replied => "replied",
            Self::Ignored => "ignored",
        }
    }

    /// Parse the storage representation.
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(Self::Pending),
            "replied" => Some(Self::Replied),
            "ignored" => Some(Self::Ignored),
            _ => None,
        }
    }
}

/// How a record was resolved.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum ReplySource {
    /// Operator typed the reply (command, reply mode, or quoted reply).
    Manual,
    /// AI-generated text confirmed by the operator.
    Ai,
    /// Canned reply template.
    Template,
    /// Batch ignore.
    Batch,
}

impl ReplySource {
    /// Storage representation.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Manual => "manual",
            Self::Ai => "ai",
            Self::Template => "template",
            Self::Batch => "batch",
        }
    }

    /// Parse the storage representation.
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "manual" => Some(Self::Manual),
            "ai" => Some(Self::Ai),
            "template" => Some(Self::Template),
            "batch" => Some(Self::Batch),
            _ => None,
        }
    }
}

/// One inbound buyer message requiring operator attention.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MessageRecord {
    /// Human-readable identifier embedding account, conversation and sequence.
    pub message_id: String,
    /// Seller account identifier.
    pub cookie_id: String,
    /// Marketplace conversation identifier.
    pub chat_id: String,
    /// Item the conversation is about.
    pub item_id: String,
    /// Buyer user identifier.
    pub sender_user_id: String,
    /// Buyer display name.
    pub sender_name: String,
    /// Buyer message text.
    pub text: String,
    /// Opaque context: original notification text and item metadata.
    pub context_data: Value,
    /// Operator chat the notification was sent to.
    pub notification_chat_id: i64,
    /// Current lifecycle status.
    pub status: MessageStatus,
    /// Creation timestamp.
    pub created_at: DateTime<Utc>,
    /// Resolution timestamp.
    pub replied_at: Option<DateTime<Utc>>,
    /// Delivered reply text, if any.
    pub reply_content: Option<String>,
    /// How the record was resolved.
    pub reply_source: Option<ReplySource>,
}

impl MessageRecord {
    /// The notification text stored alongside the record, if any.
    #[must_use]
    pub fn original_notification(&self) -> Option<&str> {
        self.context_data
            .get("original_message")
            .and_then(Value::as_str)
    }

    /// Whether `chat_id` is the operator channel that owns this record.
    #[must_use]
    pub fn is_owned_by(&self, chat_id: i64) -> bool {
        self.notification_chat_id == chat_id
    }
}

/// A buyer message as handed over by the marketplace side.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct InboundBuyerMessage {
    /// Seller account identifier.
    pub cookie_id: String,
    /// Marketplace conversation identifier.
    pub chat_id: String,
    /// Item the conversation is about.
    #[serde(default)]
    pub item_id: Option<String>,
    /// Buyer user identifier.
    pub sender_user_id: String,
    /// Buyer display name.
    pub sender_name: String,
    /// Buyer message text.
    pub text: String,
}
