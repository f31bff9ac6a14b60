//! Routes Bot API updates to the operator handlers.
//!
//! Text messages get a new reply message. Button taps are answered and the
//! tapped message is edited in place with the outcome appended below the
//! original notification text.

use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::models::message::MessageStatus;
use crate::operator::callbacks::{self, CallbackAction};
use crate::operator::command::{self, Command};
use crate::operator::dispatcher;
use crate::state::AppState;

use super::keyboard::{self, InlineKeyboard};
use super::updates::{CallbackQuery, Message, Update};

/// Separates the notification from the appended outcome.
pub const RESULT_SEPARATOR: &str = "\n\n\u{2500}\u{2500}\u{2500}\u{2500}\u{2500}\u{2500}\n";

/// Handle one update.
pub async fn handle_update(state: Arc<AppState>, update: Update) {
    if let Some(query) = update.callback_query {
        handle_callback_query(&state, query).await;
    } else if let Some(message) = update.message {
        handle_message(&state, message).await;
    } else {
        debug!(update_id = update.update_id, "ignoring unsupported update");
    }
}

async fn handle_message(state: &AppState, message: Message) {
    if message.from.as_ref().is_some_and(|u| u.is_bot) {
        return;
    }
    let Some(text) = message.text.as_deref().filter(|t| !t.trim().is_empty()) else {
        return;
    };
    let chat_id = message.chat.id;
    info!(%chat_id, "operator message received");

    let response = dispatcher::handle_text(state, chat_id, text, message.quoted_bot_text()).await;

    let Some(gateway) = &state.gateway else {
        warn!(%chat_id, "no bot gateway configured; dropping response");
        return;
    };
    let sent = if command::parse(text) == Some(Command::Help) {
        gateway
            .send_with_keyboard(chat_id, response, keyboard::overview_keyboard())
            .await
    } else {
        gateway.send_text(chat_id, response).await
    };
    if !sent {
        warn!(%chat_id, "failed to send operator response");
    }
}

async fn handle_callback_query(state: &AppState, query: CallbackQuery) {
    let Some(data) = query.data.as_deref() else {
        return;
    };
    let chat_id = query
        .message
        .as_ref()
        .map_or(query.from.id, |m| m.chat.id);

    let result = callbacks::handle_callback(state, chat_id, data).await;

    let Some(gateway) = &state.gateway else {
        warn!(%chat_id, "no bot gateway configured; dropping callback result");
        return;
    };
    let toast = result.lines().next().map(str::to_owned);
    if !gateway.answer_callback(&query.id, toast).await {
        warn!(callback_id = %query.id, "failed to answer callback query");
    }

    let Some(original) = query.message else {
        return;
    };
    let keyboard = follow_up_keyboard(state, &CallbackAction::parse(data)).await;
    let text = append_result(original.text.as_deref().unwrap_or_default(), &result);
    if !gateway
        .edit_text(chat_id, original.message_id, text, keyboard)
        .await
    {
        warn!(%chat_id, message_id = original.message_id, "failed to edit notification");
    }
}

/// Buttons to keep on the edited message.
///
/// Notifications keep their buttons while the record is still pending;
/// the overview buttons survive list/status/help taps.
async fn follow_up_keyboard(state: &AppState, action: &CallbackAction) -> Option<InlineKeyboard> {
    let id = match action {
        CallbackAction::Reply(id)
        | CallbackAction::Ai(id)
        | CallbackAction::Ignore(id)
        | CallbackAction::View(id) => id,
        CallbackAction::List | CallbackAction::Status | CallbackAction::Help => {
            return Some(keyboard::overview_keyboard());
        }
        CallbackAction::Unknown => return None,
    };
    match state.messages().get_by_id(id).await {
        Ok(Some(record)) if record.status == MessageStatus::Pending => {
            Some(keyboard::notification_keyboard(id))
        }
        Ok(_) => None,
        Err(err) => {
            warn!(message_id = %id, %err, "failed to reload record after callback");
            None
        }
    }
}

/// `original` with any earlier outcome replaced by `result`.
#[must_use]
pub fn append_result(original: &str, result: &str) -> String {
    let base = original
        .split_once(RESULT_SEPARATOR)
        .map_or(original, |(head, _)| head);
    format!("{base}{RESULT_SEPARATOR}{result}")
}
