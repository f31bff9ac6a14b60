//! The guarded resolve path shared by every status-changing operation.
//!
//! Order: resolve lock, existence, ownership, pending check, side effect,
//! conditional status update. The lock is held until the update lands and
//! released before any bookkeeping.

use serde_json::json;
use tracing::{info, warn};

use crate::marketplace::DeliveryRequest;
use crate::models::message::{MessageRecord, MessageStatus, ReplySource};
use crate::state::AppState;
use crate::{AppError, Result};

/// What to do with a pending record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResolveAction {
    /// Deliver operator-supplied text.
    Reply {
        /// Reply body.
        text: String,
        /// How the text was produced.
        source: ReplySource,
    },
    /// Deliver the cached AI suggestion, generating one if absent.
    AiConfirm,
    /// Deliver a named template of the record's account.
    Template {
        /// Template name.
        name: String,
    },
    /// Mark ignored without delivery.
    Ignore {
        /// `manual` for single ignores, `batch` for bulk.
        source: ReplySource,
    },
}

/// Result of a successful resolve.
#[derive(Debug, Clone, PartialEq)]
pub struct Resolved {
    /// The record as it was before the update.
    pub record: MessageRecord,
    /// Terminal status written.
    pub status: MessageStatus,
    /// Text delivered, if any.
    pub reply: Option<String>,
    /// Source written.
    pub source: ReplySource,
}

/// Load `message_id` and check it can be acted on by `requester`.
///
/// # Errors
///
/// Returns `NotFound`, `Unauthorized`, or `AlreadyResolved` when a check
/// fails, or `Db` on a storage failure.
pub async fn check_actionable(
    state: &AppState,
    requester: i64,
    message_id: &str,
) -> Result<MessageRecord> {
    let record = state
        .messages()
        .get_by_id(message_id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("message #{message_id} does not exist")))?;
    if !record.is_owned_by(requester) {
        return Err(AppError::Unauthorized(format!(
            "no permission to handle message #{message_id}"
        )));
    }
    if record.status.is_terminal() {
        return Err(AppError::AlreadyResolved(format!(
            "message #{message_id} was already handled ({})",
            record.status.as_str()
        )));
    }
    Ok(record)
}

/// Apply `action` to `message_id` on behalf of channel `requester`.
///
/// # Errors
///
/// Returns `Busy` if another operation holds the record, any error from
/// [`check_actionable`], `NotFound` for an unknown template, `Backend` if
/// no AI reply could be produced, `Delivery` if the marketplace rejected
/// the reply, or `AlreadyResolved` if the conditional update lost a race.
pub async fn resolve(
    state: &AppState,
    requester: i64,
    message_id: &str,
    action: ResolveAction,
) -> Result<Resolved> {
    let guard = state.locks.try_acquire(message_id)?;
    let record = check_actionable(state, requester, message_id).await?;

    let (status, reply, source) = match action {
        ResolveAction::Ignore { source } => (MessageStatus::Ignored, None, source),
        ResolveAction::Reply { text, source } => (MessageStatus::Replied, Some(text), source),
        ResolveAction::AiConfirm => {
            let text = ai_text(state, &record).await?;
            (MessageStatus::Replied, Some(text), ReplySource::Ai)
        }
        ResolveAction::Template { name } => {
            let template = state
                .settings()
                .template(&record.cookie_id, &name)
                .await?
                .ok_or_else(|| AppError::NotFound(format!("template '{name}' does not exist")))?;
            (
                MessageStatus::Replied,
                Some(template.reply_content),
                ReplySource::Template,
            )
        }
    };

    if let Some(text) = &reply {
        if let Err(err) = state
            .delivery
            .deliver(&DeliveryRequest::for_record(&record, text))
            .await
        {
            warn!(%message_id, %err, "reply delivery failed");
            return Err(err);
        }
    }

    let updated = state
        .messages()
        .update_status(message_id, status, reply.as_deref(), source)
        .await?;
    if !updated {
        warn!(%message_id, "record left pending during resolve");
        return Err(AppError::AlreadyResolved(format!(
            "message #{message_id} was already handled"
        )));
    }

    state.suggestions.discard(message_id);
    drop(guard);
    info!(
        %message_id,
        status = status.as_str(),
        source = source.as_str(),
        "message resolved"
    );
    let event = if status == MessageStatus::Replied {
        "message_replied"
    } else {
        "message_ignored"
    };
    state.track(event, json!({ "source": source.as_str() }));

    Ok(Resolved {
        record,
        status,
        reply,
        source,
    })
}

async fn ai_text(state: &AppState, record: &MessageRecord) -> Result<String> {
    if let Some(cached) = state.suggestions.get(&record.message_id) {
        return Ok(cached.text);
    }
    state
        .ai
        .generate_for_record(record)
        .await
        .map(|reply| reply.text)
        .ok_or_else(|| AppError::Backend("AI reply generation failed".into()))
}
