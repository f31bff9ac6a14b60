//! Bot API transport.
//!
//! [`BotTransport`] is the seam between the gateway's rate limiting and
//! retry policy and the raw HTTP calls. [`TelegramTransport`] implements it
//! over the Bot API with `reqwest`.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::StatusCode;
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::debug;

use crate::config::TelegramConfig;
use crate::{AppError, Result};

use super::keyboard::InlineKeyboard;

/// One Bot API call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OutboundRequest {
    /// `sendMessage`.
    SendMessage {
        /// Destination chat.
        chat_id: i64,
        /// Message text.
        text: String,
        /// Optional inline keyboard.
        keyboard: Option<InlineKeyboard>,
    },
    /// `editMessageText`.
    EditMessage {
        /// Chat holding the message.
        chat_id: i64,
        /// Message to edit.
        message_id: i64,
        /// Replacement text.
        text: String,
        /// Optional replacement keyboard.
        keyboard: Option<InlineKeyboard>,
    },
    /// `answerCallbackQuery`.
    AnswerCallback {
        /// Query to answer.
        callback_query_id: String,
        /// Optional toast text.
        text: Option<String>,
    },
}

impl OutboundRequest {
    /// Plain text message.
    #[must_use]
    pub fn text(chat_id: i64, text: impl Into<String>) -> Self {
        Self::SendMessage {
            chat_id,
            text: text.into(),
            keyboard: None,
        }
    }

    /// Chat the request is rate limited against, if any.
    #[must_use]
    pub fn chat_id(&self) -> Option<i64> {
        match self {
            Self::SendMessage { chat_id, .. } | Self::EditMessage { chat_id, .. } => Some(*chat_id),
            Self::AnswerCallback { .. } => None,
        }
    }

    fn method(&self) -> &'static str {
        match self {
            Self::SendMessage { .. } => "sendMessage",
            Self::EditMessage { .. } => "editMessageText",
            Self::AnswerCallback { .. } => "answerCallbackQuery",
        }
    }

    fn body(&self) -> Value {
        match self {
            Self::SendMessage {
                chat_id,
                text,
                keyboard,
            } => {
                let mut body = json!({"chat_id": chat_id, "text": text});
                if let Some(kb) = keyboard {
                    body["reply_markup"] = json!(kb);
                }
                body
            }
            Self::EditMessage {
                chat_id,
                message_id,
                text,
                keyboard,
            } => {
                let mut body = json!({"chat_id": chat_id, "message_id": message_id, "text": text});
                if let Some(kb) = keyboard {
                    body["reply_markup"] = json!(kb);
                }
                body
            }
            Self::AnswerCallback {
                callback_query_id,
                text,
            } => {
                let mut body = json!({"callback_query_id": callback_query_id});
                if let Some(text) = text {
                    body["text"] = json!(text);
                }
                body
            }
        }
    }
}

/// Result of one transport attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SendOutcome {
    /// Accepted.
    Ok,
    /// Rate limited; retry after this many seconds.
    RetryAfter(u64),
    /// Rejected or failed.
    Failed {
        /// Whether a retry may succeed.
        transient: bool,
        /// Human-readable reason.
        description: String,
    },
}

/// Executes Bot API calls.
#[async_trait]
pub trait BotTransport: Send + Sync {
    /// Perform one attempt of `request`.
    async fn execute(&self, request: &OutboundRequest) -> SendOutcome;
}

#[derive(Deserialize)]
struct ApiResponse {
    #[serde(default)]
    ok: bool,
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    parameters: Option<ResponseParameters>,
}

#[derive(Deserialize)]
struct ResponseParameters {
    #[serde(default)]
    retry_after: Option<u64>,
}

/// Bot API over HTTPS.
pub struct TelegramTransport {
    http: reqwest::Client,
    api_base: String,
    bot_token: String,
}

impl TelegramTransport {
    /// Build a transport from the telegram config section.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` if the bot token is empty, or
    /// `AppError::Telegram` if the HTTP client cannot be built.
    pub fn new(config: &TelegramConfig, timeout: Duration) -> Result<Self> {
        if config.bot_token.is_empty() {
            return Err(AppError::Config("telegram bot token is not configured".into()));
        }
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| AppError::Telegram(format!("failed to build bot client: {e}")))?;
        Ok(Self {
            http,
            api_base: config.api_base.trim_end_matches('/').to_owned(),
            bot_token: config.bot_token.clone(),
        })
    }

    fn url(&self, method: &str) -> String {
        format!("{}/bot{}/{method}", self.api_base, self.bot_token)
    }
}

#[async_trait]
impl BotTransport for TelegramTransport {
    async fn execute(&self, request: &OutboundRequest) -> SendOutcome {
        let method = request.method();
        let response = match self
            .http
            .post(self.url(method))
            .json(&request.body())
            .send()
            .await
        {
            Ok(response) => response,
            Err(err) => {
                return SendOutcome::Failed {
                    transient: err.is_timeout() || err.is_connect() || err.is_request(),
                    description: format!("{method}: {err}"),
                };
            }
        };

        let status = response.status();
        let parsed: Option<ApiResponse> = response.json().await.ok();
        debug!(method, %status, "bot api response");

        if status.is_success() && parsed.as_ref().is_some_and(|r| r.ok) {
            return SendOutcome::Ok;
        }

        let description = parsed
            .as_ref()
            .and_then(|r| r.description.clone())
            .unwrap_or_else(|| status.to_string());
        if status == StatusCode::TOO_MANY_REQUESTS {
            let retry_after = parsed
                .as_ref()
                .and_then(|r| r.parameters.as_ref())
                .and_then(|p| p.retry_after)
                .unwrap_or(1);
            return SendOutcome::RetryAfter(retry_after);
        }
        SendOutcome::Failed {
            transient: status.is_server_error() || status == StatusCode::REQUEST_TIMEOUT,
            description: format!("{method}: {description}"),
        }
    }
}
