//! Routes operator text to the command handlers.

use chrono::Utc;
use tracing::{debug, info, warn};

use crate::models::message::{MessageStatus, ReplySource};
use crate::state::AppState;
use crate::{AppError, Result};

use super::command::{self, Command, DEFAULT_STATS_DAYS};
use super::matcher;
use super::render;
use super::resolve::{self, ResolveAction};

/// Accepted `stats` window.
pub const STATS_DAY_RANGE: std::ops::RangeInclusive<u64> = 1..=30;

/// Handle one free-text message from operator channel `chat_id`.
///
/// `quoted` is the text of the bot notification the operator replied to.
pub async fn handle_text(
    state: &AppState,
    chat_id: i64,
    text: &str,
    quoted: Option<&str>,
) -> String {
    let text = text.trim();
    if command::is_cancel(text) {
        return render::cancelled(state.reply_states.cancel(chat_id).as_deref());
    }

    if let Some(quoted) = quoted {
        return match matcher::resolve_quoted(&state.messages(), chat_id, quoted).await {
            Ok(Some(record)) => {
                debug!(message_id = %record.message_id, "quoted reply matched");
                reply(state, chat_id, &record.message_id, text.to_owned()).await
            }
            Ok(None) => {
                info!(%chat_id, "quoted reply did not match a pending message");
                render::unidentified_target()
            }
            Err(err) => render::failure(&err),
        };
    }

    if let Some(target) = state.reply_states.take(chat_id) {
        return reply(state, chat_id, &target, text.to_owned()).await;
    }

    match command::parse(text) {
        Some(cmd) => handle_command(state, chat_id, cmd).await,
        None => render::help(),
    }
}

/// Execute a parsed command for channel `chat_id`.
pub async fn handle_command(state: &AppState, chat_id: i64, cmd: Command) -> String {
    match cmd {
        Command::Reply { id, text } => reply(state, chat_id, &id, text).await,
        Command::Ai { id } => suggest(state, chat_id, &id).await,
        Command::Confirm { id } => {
            complete(state, chat_id, &id, ResolveAction::AiConfirm).await
        }
        Command::Template { id, name } => {
            complete(state, chat_id, &id, ResolveAction::Template { name }).await
        }
        Command::Ignore { id } => {
            let action = ResolveAction::Ignore {
                source: ReplySource::Manual,
            };
            complete(state, chat_id, &id, action).await
        }
        Command::View { id } => view(state, chat_id, &id)
            .await
            .unwrap_or_else(|e| render::failure(&e)),
        Command::List => state
            .messages()
            .list_by_channel(chat_id, Some(MessageStatus::Pending), render::LIST_LIMIT)
            .await
            .map_or_else(|e| render::failure(&e), |records| render::list(&records, Utc::now())),
        Command::Status => state
            .messages()
            .status_counts(chat_id)
            .await
            .map_or_else(|e| render::failure(&e), |counts| render::status(&counts)),
        Command::Help => render::help(),
        Command::Templates => templates(state, chat_id)
            .await
            .unwrap_or_else(|e| render::failure(&e)),
        Command::BatchIgnore { ids } => batch_ignore(state, chat_id, &ids).await,
        Command::Search { term } => state
            .messages()
            .search(chat_id, &term)
            .await
            .map_or_else(|e| render::failure(&e), |found| render::search(&term, &found)),
        Command::Stats { days } => stats(state, chat_id, days)
            .await
            .unwrap_or_else(|e| render::failure(&e)),
        Command::Cancel => render::cancelled(state.reply_states.cancel(chat_id).as_deref()),
    }
}

async fn reply(state: &AppState, chat_id: i64, id: &str, text: String) -> String {
    let action = ResolveAction::Reply {
        text,
        source: ReplySource::Manual,
    };
    complete(state, chat_id, id, action).await
}

/// Run the guarded resolve and render its outcome.
pub(crate) async fn complete(
    state: &AppState,
    chat_id: i64,
    id: &str,
    action: ResolveAction,
) -> String {
    match resolve::resolve(state, chat_id, id, action).await {
        Ok(done) => match done.reply {
            Some(text) => render::replied(id, done.source, &text),
            None => render::ignored(id),
        },
        Err(err) => render::failure(&err),
    }
}

async fn suggest(state: &AppState, chat_id: i64, id: &str) -> String {
    let guard = match state.locks.try_acquire(id) {
        Ok(guard) => guard,
        Err(err) => return render::failure(&err),
    };
    let record = match resolve::check_actionable(state, chat_id, id).await {
        Ok(record) => record,
        Err(err) => return render::failure(&err),
    };
    let Some(suggestion) = state.ai.generate_for_record(&record).await else {
        return render::failure(&AppError::Backend(
            "AI reply generation failed, check the AI settings for this account".into(),
        ));
    };
    drop(guard);

    state.suggestions.store(id, suggestion.clone());
    state.track(
        "ai_suggestion",
        serde_json::json!({
            "intent": suggestion.intent.as_str(),
            "refused": suggestion.refused,
        }),
    );
    render::ai_suggestion(id, &suggestion)
}

async fn view(state: &AppState, chat_id: i64, id: &str) -> Result<String> {
    let record = state
        .messages()
        .get_by_id(id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("message #{id} does not exist")))?;
    if !record.is_owned_by(chat_id) {
        return Err(AppError::Unauthorized(format!(
            "no permission to view message #{id}"
        )));
    }
    Ok(render::view(&record, Utc::now()))
}

async fn templates(state: &AppState, chat_id: i64) -> Result<String> {
    let settings = state.settings();
    let accounts = settings.accounts_for_chat(chat_id).await?;
    let Some(cookie_id) = accounts.first() else {
        return Err(AppError::NotFound(
            "no account is linked to this channel".into(),
        ));
    };
    let templates = settings.templates(cookie_id).await?;
    Ok(render::templates(cookie_id, &templates))
}

async fn batch_ignore(state: &AppState, chat_id: i64, ids: &[String]) -> String {
    let mut succeeded = 0;
    let mut failures = Vec::new();
    for id in ids {
        let action = ResolveAction::Ignore {
            source: ReplySource::Batch,
        };
        match resolve::resolve(state, chat_id, id, action).await {
            Ok(_) => succeeded += 1,
            Err(err) => {
                warn!(message_id = %id, %err, "batch ignore item failed");
                failures.push((id.clone(), err_reason(&err)));
            }
        }
    }
    info!(%chat_id, succeeded, failed = failures.len(), "batch ignore finished");
    render::batch(succeeded, &failures)
}

fn err_reason(err: &AppError) -> String {
    match err {
        AppError::NotFound(msg)
        | AppError::Unauthorized(msg)
        | AppError::AlreadyResolved(msg)
        | AppError::Busy(msg) => msg.clone(),
        other => other.to_string(),
    }
}

async fn stats(state: &AppState, chat_id: i64, days: Option<u64>) -> Result<String> {
    let days = match days {
        None => DEFAULT_STATS_DAYS,
        Some(d) if STATS_DAY_RANGE.contains(&d) => u32::try_from(d).unwrap_or(DEFAULT_STATS_DAYS),
        Some(_) => {
            return Err(AppError::Validation(
                "Days must be between 1 and 30".into(),
            ))
        }
    };
    let stats = state.messages().stats_window(chat_id, days).await?;
    Ok(render::stats(&stats))
}
