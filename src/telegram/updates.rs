//! Subset of the Bot API `Update` object this service consumes.

use serde::Deserialize;

/// Incoming update delivered to the webhook.
#[derive(Debug, Clone, Deserialize)]
pub struct Update {
    /// Monotonic update identifier.
    pub update_id: i64,
    /// New message, if any.
    #[serde(default)]
    pub message: Option<Message>,
    /// Inline button tap, if any.
    #[serde(default)]
    pub callback_query: Option<CallbackQuery>,
}

/// A chat message.
#[derive(Debug, Clone, Deserialize)]
pub struct Message {
    /// Message identifier within the chat.
    pub message_id: i64,
    /// Chat the message belongs to.
    pub chat: Chat,
    /// Sender.
    #[serde(default)]
    pub from: Option<User>,
    /// Text body.
    #[serde(default)]
    pub text: Option<String>,
    /// The message this one replies to.
    #[serde(default)]
    pub reply_to_message: Option<Box<Message>>,
}

/// A chat.
#[derive(Debug, Clone, Deserialize)]
pub struct Chat {
    /// Chat identifier.
    pub id: i64,
}

/// A Telegram user.
#[derive(Debug, Clone, Deserialize)]
pub struct User {
    /// User identifier.
    pub id: i64,
    /// Whether the user is a bot.
    #[serde(default)]
    pub is_bot: bool,
    /// Username without `@`.
    #[serde(default)]
    pub username: Option<String>,
}

/// An inline button tap.
#[derive(Debug, Clone, Deserialize)]
pub struct CallbackQuery {
    /// Query identifier to answer.
    pub id: String,
    /// User who tapped.
    pub from: User,
    /// Message carrying the button.
    #[serde(default)]
    pub message: Option<Message>,
    /// Callback data of the tapped button.
    #[serde(default)]
    pub data: Option<String>,
}

impl Message {
    /// Text of the message this one quotes, when it quotes a bot message.
    #[must_use]
    pub fn quoted_bot_text(&self) -> Option<&str> {
        let quoted = self.reply_to_message.as_deref()?;
        let from_bot = quoted.from.as_ref().is_some_and(|u| u.is_bot);
        if from_bot {
            quoted.text.as_deref()
        } else {
            None
        }
    }
}
