//! Buyer message intake: persist a pending record and alert the operator.

use chrono::Utc;
use serde_json::json;
use tracing::{info, warn};

use crate::models::message::{InboundBuyerMessage, MessageRecord, MessageStatus};
use crate::models::settings::ItemInfo;
use crate::state::AppState;
use crate::telegram::keyboard;
use crate::{AppError, Result};

/// Insert attempts before giving up on identifier collisions.
pub const ID_ATTEMPTS: u64 = 3;

/// Account part of a message identifier: non-word characters become `_`.
#[must_use]
pub fn account_slug(cookie_id: &str) -> String {
    cookie_id
        .chars()
        .map(|c| if c.is_alphanumeric() || c == '_' { c } else { '_' })
        .collect()
}

/// Build `<account>_<last 6 of chat>_<seq:03>`.
#[must_use]
pub fn message_id(cookie_id: &str, chat_id: &str, seq: u64) -> String {
    let chat = account_slug(chat_id);
    let tail: String = {
        let chars: Vec<char> = chat.chars().collect();
        chars[chars.len().saturating_sub(6)..].iter().collect()
    };
    format!("{}_{tail}_{seq:03}", account_slug(cookie_id))
}

/// Operator notification for a new record.
///
/// The labelled lines are what quoted-reply matching reads back.
#[must_use]
pub fn notification_text(
    message_id: &str,
    inbound: &InboundBuyerMessage,
    item_id: &str,
    item: Option<&ItemInfo>,
) -> String {
    let item_line = match item {
        Some(info) => format!("{item_id} ({})", info.title),
        None => item_id.to_owned(),
    };
    format!(
        "\u{1f4e9} New buyer message\n\nMessage ID: #{message_id}\nAccount: {}\nBuyer: {} ({})\nItem: {item_line}\nChat ID: {}\nMessage: {}",
        inbound.cookie_id,
        inbound.sender_name,
        inbound.sender_user_id,
        inbound.chat_id,
        inbound.text
    )
}

fn validate(inbound: &InboundBuyerMessage) -> Result<()> {
    let required = [
        ("cookie_id", &inbound.cookie_id),
        ("chat_id", &inbound.chat_id),
        ("sender_user_id", &inbound.sender_user_id),
        ("text", &inbound.text),
    ];
    for (field, value) in required {
        if value.trim().is_empty() {
            return Err(AppError::Validation(format!("{field} must not be empty")));
        }
    }
    Ok(())
}

async fn resolve_channel(state: &AppState, cookie_id: &str) -> Result<i64> {
    if let Some(chat_id) = state.settings().channel_for_account(cookie_id).await? {
        return Ok(chat_id);
    }
    state.config.default_chat_id.ok_or_else(|| {
        AppError::Config(format!(
            "no notification channel configured for account {cookie_id}"
        ))
    })
}

/// Persist a buyer message as a pending record and notify its channel.
///
/// A failed notification is logged; the record stays pending either way.
///
/// # Errors
///
/// Returns `Validation` for missing fields, `Config` when no channel is
/// known for the account, or `Db` if the record cannot be stored.
pub async fn ingest(state: &AppState, inbound: InboundBuyerMessage) -> Result<MessageRecord> {
    validate(&inbound)?;
    let channel = resolve_channel(state, &inbound.cookie_id).await?;

    let item_id = inbound
        .item_id
        .clone()
        .filter(|id| !id.is_empty())
        .unwrap_or_else(|| "unknown".into());
    let item = match state.settings().item_info(&inbound.cookie_id, &item_id).await {
        Ok(item) => item,
        Err(err) => {
            warn!(cookie_id = %inbound.cookie_id, %item_id, %err, "failed to load item info");
            None
        }
    };

    let repo = state.messages();
    let first = repo.next_sequence(&inbound.cookie_id, &inbound.chat_id).await?;
    let mut stored = None;
    for seq in first..first + ID_ATTEMPTS {
        let id = message_id(&inbound.cookie_id, &inbound.chat_id, seq);
        let text = notification_text(&id, &inbound, &item_id, item.as_ref());
        let record = MessageRecord {
            message_id: id,
            cookie_id: inbound.cookie_id.clone(),
            chat_id: inbound.chat_id.clone(),
            item_id: item_id.clone(),
            sender_user_id: inbound.sender_user_id.clone(),
            sender_name: inbound.sender_name.clone(),
            text: inbound.text.clone(),
            context_data: json!({
                "original_message": text,
                "item_id": item_id,
                "item_title": item.as_ref().map(|i| i.title.clone()),
                "item_price": item.as_ref().map(|i| i.price),
            }),
            notification_chat_id: channel,
            status: MessageStatus::Pending,
            created_at: Utc::now(),
            replied_at: None,
            reply_content: None,
            reply_source: None,
        };
        if repo.create(&record).await? {
            stored = Some(record);
            break;
        }
        warn!(message_id = %record.message_id, "message id collision, trying next sequence");
    }
    let record = stored.ok_or_else(|| {
        AppError::Db(format!(
            "could not allocate a message id for chat {}",
            inbound.chat_id
        ))
    })?;
    info!(message_id = %record.message_id, notification_chat_id = channel, "buyer message stored");

    notify(state, &record).await;
    state.track("message_received", json!({ "has_item": item.is_some() }));
    Ok(record)
}

async fn notify(state: &AppState, record: &MessageRecord) {
    let Some(gateway) = &state.gateway else {
        warn!(message_id = %record.message_id, "no bot gateway configured; notification skipped");
        return;
    };
    let text = record.original_notification().unwrap_or(&record.text).to_owned();
    let sent = gateway
        .send_with_keyboard(
            record.notification_chat_id,
            text,
            keyboard::notification_keyboard(&record.message_id),
        )
        .await;
    if !sent {
        warn!(message_id = %record.message_id, "operator notification failed");
    }
}
