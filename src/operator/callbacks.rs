//! Inline button actions.

use tracing::info;

use crate::models::message::ReplySource;
use crate::state::AppState;

use super::command::Command;
use super::dispatcher;
use super::render;
use super::resolve::{self, ResolveAction};

/// A decoded `callback_data` value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CallbackAction {
    /// Enter reply mode for a record.
    Reply(String),
    /// Generate and send an AI reply.
    Ai(String),
    /// Ignore a record.
    Ignore(String),
    /// Show a record.
    View(String),
    /// Pending records.
    List,
    /// Status counts.
    Status,
    /// Command reference.
    Help,
    /// Anything else.
    Unknown,
}

impl CallbackAction {
    /// Decode `data` such as `reply_acc_123456_001`.
    #[must_use]
    pub fn parse(data: &str) -> Self {
        let with_id = |prefix: &str| {
            data.strip_prefix(prefix)
                .filter(|id| !id.is_empty())
                .map(str::to_owned)
        };
        if let Some(id) = with_id("reply_") {
            Self::Reply(id)
        } else if let Some(id) = with_id("ai_") {
            Self::Ai(id)
        } else if let Some(id) = with_id("ignore_") {
            Self::Ignore(id)
        } else if let Some(id) = with_id("view_") {
            Self::View(id)
        } else {
            match data {
                "list" => Self::List,
                "status" => Self::Status,
                "help" => Self::Help,
                _ => Self::Unknown,
            }
        }
    }
}

/// Run a button action for channel `chat_id` and return the result text.
pub async fn handle_callback(state: &AppState, chat_id: i64, data: &str) -> String {
    let action = CallbackAction::parse(data);
    info!(%chat_id, ?action, "callback action");
    match action {
        CallbackAction::Reply(id) => match resolve::check_actionable(state, chat_id, &id).await {
            Ok(record) => {
                state.reply_states.begin(chat_id, &id);
                render::reply_prompt(&record)
            }
            Err(err) => render::failure(&err),
        },
        CallbackAction::Ai(id) => {
            dispatcher::complete(state, chat_id, &id, ResolveAction::AiConfirm).await
        }
        CallbackAction::Ignore(id) => {
            let action = ResolveAction::Ignore {
                source: ReplySource::Manual,
            };
            dispatcher::complete(state, chat_id, &id, action).await
        }
        CallbackAction::View(id) => {
            dispatcher::handle_command(state, chat_id, Command::View { id }).await
        }
        CallbackAction::List => dispatcher::handle_command(state, chat_id, Command::List).await,
        CallbackAction::Status => {
            dispatcher::handle_command(state, chat_id, Command::Status).await
        }
        CallbackAction::Help => render::help(),
        CallbackAction::Unknown => "\u{274c} Unknown action".into(),
    }
}
