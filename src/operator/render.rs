//! Operator-facing response text.
//!
//! Every handler answers with a short string; errors become a one-line
//! reason through [`failure`].

use std::fmt::Write as _;

use chrono::{DateTime, Utc};

use crate::ai::AiReply;
use crate::errors::AppError;
use crate::models::message::{MessageRecord, MessageStatus, ReplySource};
use crate::models::settings::ReplyTemplate;
use crate::models::stats::{MessageStats, StatusCounts};

const OK: &str = "\u{2705}";
const FAIL: &str = "\u{274c}";
const WAIT: &str = "\u{23f3}";

/// Records shown by `list`.
pub const LIST_LIMIT: u32 = 10;
/// Matches shown by `search`.
pub const SEARCH_LIMIT: usize = 5;
/// Templates shown by `templates`.
pub const TEMPLATE_LIMIT: usize = 10;

/// One-line reason for a failed operation.
#[must_use]
pub fn failure(err: &AppError) -> String {
    match err {
        AppError::Busy(_) => format!("{WAIT} Message is being processed, please wait..."),
        AppError::NotFound(msg)
        | AppError::Unauthorized(msg)
        | AppError::AlreadyResolved(msg)
        | AppError::Validation(msg) => format!("{FAIL} {msg}"),
        AppError::Delivery(_) => {
            format!("{FAIL} Sending failed, please check the account connection")
        }
        AppError::Backend(msg) => format!("{FAIL} {msg}"),
        AppError::Config(msg) => format!("{FAIL} Feature unavailable: {msg}"),
        AppError::Db(_)
        | AppError::Telegram(_)
        | AppError::Telemetry(_)
        | AppError::Io(_) => format!("{FAIL} Operation failed, please try again later"),
    }
}

/// Truncate to `max` characters, appending `...` when shortened.
#[must_use]
pub fn truncate(text: &str, max: usize) -> String {
    if text.chars().count() <= max {
        text.to_owned()
    } else {
        let head: String = text.chars().take(max).collect();
        format!("{head}...")
    }
}

/// Coarse age of a timestamp relative to `now`.
#[must_use]
pub fn time_ago(ts: DateTime<Utc>, now: DateTime<Utc>) -> String {
    let secs = (now - ts).num_seconds().max(0);
    match secs {
        s if s >= 86_400 => format!("{}d ago", s / 86_400),
        s if s >= 3_600 => format!("{}h ago", s / 3_600),
        s if s >= 60 => format!("{}m ago", s / 60),
        _ => "just now".into(),
    }
}

fn status_icon(status: MessageStatus) -> &'static str {
    match status {
        MessageStatus::Pending => WAIT,
        MessageStatus::Replied => OK,
        MessageStatus::Ignored => "\u{1f6ab}",
    }
}

/// Reply delivered.
#[must_use]
pub fn replied(message_id: &str, source: ReplySource, text: &str) -> String {
    let label = match source {
        ReplySource::Ai => "Sent AI reply to",
        ReplySource::Template => "Sent template reply to",
        ReplySource::Manual | ReplySource::Batch => "Replied to",
    };
    format!("{OK} {label} message #{message_id}\nReply: {text}")
}

/// Record ignored.
#[must_use]
pub fn ignored(message_id: &str) -> String {
    format!("{OK} Ignored message #{message_id}")
}

/// AI suggestion awaiting confirmation.
#[must_use]
pub fn ai_suggestion(message_id: &str, reply: &AiReply) -> String {
    let mut out = format!(
        "\u{1f916} AI suggestion for #{message_id} (intent: {}):\n\n{}\n\n",
        reply.intent.as_str(),
        reply.text
    );
    let _ = write!(
        out,
        "Send it with: confirm #{message_id}\nOr write your own: reply #{message_id} <text>"
    );
    out
}

/// Reply mode entered.
#[must_use]
pub fn reply_prompt(record: &MessageRecord) -> String {
    format!(
        "\u{1f4ac} Replying to #{}\n\u{1f464} {}: {}\n\nSend your reply as the next message, or 'cancel' to abort.",
        record.message_id,
        record.sender_name,
        truncate(&record.text, 100)
    )
}

/// Reply mode left.
#[must_use]
pub fn cancelled(target: Option<&str>) -> String {
    match target {
        Some(id) => format!("{OK} Reply to #{id} cancelled"),
        None => "\u{2139}\u{fe0f} Nothing to cancel".into(),
    }
}

/// Target of a quoted reply could not be identified.
#[must_use]
pub fn unidentified_target() -> String {
    format!("{FAIL} Cannot identify the message to reply to; reply to a notification sent by the bot")
}

/// Full record details.
#[must_use]
pub fn view(record: &MessageRecord, now: DateTime<Utc>) -> String {
    let mut out = format!("\u{1f4cb} Message #{}\n\n", record.message_id);
    let _ = writeln!(out, "Account: {}", record.cookie_id);
    let _ = writeln!(out, "Buyer: {} ({})", record.sender_name, record.sender_user_id);
    let _ = writeln!(out, "Item: {}", record.item_id);
    let _ = writeln!(out, "Chat ID: {}", record.chat_id);
    let _ = writeln!(out, "Message: {}", record.text);
    let _ = writeln!(
        out,
        "Status: {} {}",
        status_icon(record.status),
        record.status.as_str()
    );
    let _ = writeln!(out, "Received: {}", time_ago(record.created_at, now));
    if let Some(reply) = &record.reply_content {
        let _ = writeln!(out, "Reply: {reply}");
    }
    if let Some(source) = record.reply_source {
        let _ = writeln!(out, "Source: {}", source.as_str());
    }
    out.trim_end().to_owned()
}

/// Pending records.
#[must_use]
pub fn list(records: &[MessageRecord], now: DateTime<Utc>) -> String {
    if records.is_empty() {
        return "\u{1f4ed} No pending messages".into();
    }
    let mut out = format!("\u{1f4cb} Pending messages ({}):\n\n", records.len());
    for r in records {
        let _ = writeln!(out, "#{} ({})", r.message_id, time_ago(r.created_at, now));
        let _ = writeln!(out, "\u{1f464} {}: {}", r.sender_name, truncate(&r.text, 50));
        let _ = writeln!(out, "\u{1f3ea} {}\n", r.cookie_id);
    }
    out.push_str("Reply with: reply #<id> <text>");
    out
}

/// Per-status counts.
#[must_use]
pub fn status(counts: &StatusCounts) -> String {
    format!(
        "\u{1f4ca} Message status\n\n{WAIT} Pending: {}\n{OK} Replied: {}\n\u{1f6ab} Ignored: {}\n\u{1f4c8} Total: {}\n\nUse 'list' to see pending messages",
        counts.pending,
        counts.replied,
        counts.ignored,
        counts.total()
    )
}

/// Templates of an account.
#[must_use]
pub fn templates(cookie_id: &str, templates: &[ReplyTemplate]) -> String {
    if templates.is_empty() {
        return format!("\u{1f4dd} Account {cookie_id} has no templates");
    }
    let mut out = format!("\u{1f4dd} Templates (account: {cookie_id}):\n\n");
    for (i, t) in templates.iter().take(TEMPLATE_LIMIT).enumerate() {
        let _ = writeln!(out, "{}. {}\n   {}\n", i + 1, t.keyword, truncate(&t.reply_content, 30));
    }
    if templates.len() > TEMPLATE_LIMIT {
        let _ = writeln!(out, "... and {} more\n", templates.len() - TEMPLATE_LIMIT);
    }
    out.push_str("Use: template #<id> <name>");
    out
}

/// Outcome of a batch ignore.
#[must_use]
pub fn batch(succeeded: usize, failures: &[(String, String)]) -> String {
    let mut out = format!(
        "{OK} Batch ignore finished\nSucceeded: {succeeded}\nFailed: {}",
        failures.len()
    );
    for (id, reason) in failures {
        let _ = write!(out, "\n  #{id}: {reason}");
    }
    out
}

/// Search results; `matches` is newest first.
#[must_use]
pub fn search(term: &str, matches: &[MessageRecord]) -> String {
    if matches.is_empty() {
        return format!("\u{1f50d} No messages containing '{term}'");
    }
    let mut out = format!("\u{1f50d} Search results for '{term}':\n\n");
    for (i, r) in matches.iter().take(SEARCH_LIMIT).enumerate() {
        let _ = writeln!(out, "{}. {} #{}", i + 1, status_icon(r.status), r.message_id);
        let _ = writeln!(out, "   \u{1f464} {}", r.sender_name);
        let _ = writeln!(out, "   \u{1f4ac} {}\n", truncate(&r.text, 50));
    }
    if matches.len() > SEARCH_LIMIT {
        let _ = writeln!(out, "... and {} more matches\n", matches.len() - SEARCH_LIMIT);
    }
    out.push_str("Use 'view #<id>' for details");
    out
}

/// Statistics summary.
#[must_use]
pub fn stats(stats: &MessageStats) -> String {
    let c = &stats.counts;
    let mut out = format!("\u{1f4ca} Message statistics (last {} days)\n\n", stats.days);
    let _ = writeln!(out, "Overview:");
    let _ = writeln!(out, "- Total: {}", c.total());
    let _ = writeln!(out, "- Pending: {}", c.pending);
    let _ = writeln!(out, "- Replied: {}", c.replied);
    let _ = writeln!(out, "- Ignored: {}", c.ignored);
    let _ = writeln!(out, "- Reply rate: {:.1}%\n", stats.reply_rate);

    if c.replied > 0 {
        let _ = writeln!(out, "Reply methods:");
        let _ = writeln!(out, "- AI: {}", stats.ai_replies);
        let _ = writeln!(out, "- Manual: {}", stats.manual_replies);
        let _ = writeln!(out, "- Template: {}", stats.template_replies);
        if stats.batch_ignored > 0 {
            let _ = writeln!(out, "- Batch ignored: {}", stats.batch_ignored);
        }
        out.push('\n');
    }

    if stats.avg_response_minutes > 0.0 {
        let latency = if stats.avg_response_minutes < 60.0 {
            format!("{:.1} minutes", stats.avg_response_minutes)
        } else {
            format!("{:.1} hours", stats.avg_response_minutes / 60.0)
        };
        let _ = writeln!(out, "Average response time: {latency}\n");
    }

    if !stats.top_senders.is_empty() {
        let _ = writeln!(out, "Most active buyers:");
        for (i, s) in stats.top_senders.iter().enumerate() {
            let _ = writeln!(
                out,
                "{}. {} - {} messages, reply rate {:.1}%",
                i + 1,
                s.sender_name,
                s.message_count,
                s.reply_rate
            );
        }
        out.push('\n');
    }

    if !stats.daily.is_empty() {
        let _ = writeln!(out, "Daily trend:");
        for d in &stats.daily {
            let _ = writeln!(out, "- {}: {}", d.date, d.count);
        }
    }
    out.trim_end().to_owned()
}

/// Command reference.
#[must_use]
pub fn help() -> String {
    "\u{1f916} Commands

Replying:
- reply #<id> <text> - send a reply
- ai #<id> - get an AI suggestion
- confirm #<id> - send the AI suggestion
- template #<id> <name> - reply with a template
- ignore #<id> - ignore a message

Browsing:
- view #<id> - message details
- list - pending messages
- status - counts by status
- templates - available templates

More:
- batch-ignore #<id>,#<id> - ignore several messages
- search <term> - search messages
- stats [days] - statistics (default 7, max 30)
- cancel - leave reply mode
- help - this reference

You can also reply directly to a notification, or tap its Reply button and send the text."
        .into()
}
