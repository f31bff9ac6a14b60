//! Recovers the target record from quoted notification text.
//!
//! Two strategies run in order: an explicit identifier in the quoted text,
//! then structural field matching against the channel's pending records.
//! Both only ever return a pending record owned by the requesting channel.

use std::sync::LazyLock;

use regex::Regex;

use crate::models::message::{MessageRecord, MessageStatus};
use crate::persistence::message_repo::MessageRepo;
use crate::Result;

/// Pending records scanned per lookup.
pub const SEARCH_WINDOW: u32 = 50;

/// Labelled fields pulled from notification text.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct KeyFields {
    /// `Account:` value.
    pub account: Option<String>,
    /// `Buyer:` display name, without the trailing `(user id)`.
    pub buyer: Option<String>,
    /// `Message:` value.
    pub content: Option<String>,
    /// `Chat ID:` value.
    pub chat_id: Option<String>,
}

struct FieldPatterns {
    account: Option<Regex>,
    buyer: Option<Regex>,
    content: Option<Regex>,
    chat_id: Option<Regex>,
}

static FIELDS: LazyLock<FieldPatterns> = LazyLock::new(|| FieldPatterns {
    account: Regex::new(r"(?i)\bAccount\s*[:：]\s*([^\n]+)").ok(),
    buyer: Regex::new(r"(?i)\bBuyer\s*[:：]\s*([^\n(（]+)").ok(),
    content: Regex::new(r"(?i)\bMessage\s*[:：]\s*([^\n]+)").ok(),
    chat_id: Regex::new(r"(?i)\bChat ID\s*[:：]\s*([^\n]+)").ok(),
});

static ID_PATTERNS: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    [
        r"(?i)Message ID\s*[:：]\s*#?(\w+)",
        r"#(\w+)",
        r"(\w+_\d+_\d+)",
    ]
    .into_iter()
    .filter_map(|p| Regex::new(p).ok())
    .collect()
});

fn capture(re: Option<&Regex>, text: &str) -> Option<String> {
    re?.captures(text)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().trim().to_owned())
        .filter(|s| !s.is_empty())
}

/// Extract labelled fields; absent labels stay `None`.
#[must_use]
pub fn extract_fields(text: &str) -> KeyFields {
    let p = &*FIELDS;
    KeyFields {
        account: capture(p.account.as_ref(), text),
        buyer: capture(p.buyer.as_ref(), text),
        content: capture(p.content.as_ref(), text),
        chat_id: capture(p.chat_id.as_ref(), text),
    }
}

fn both_present_eq(a: Option<&String>, b: Option<&String>) -> bool {
    matches!((a, b), (Some(x), Some(y)) if x == y)
}

/// Whether two field sets describe the same message.
///
/// Same account and content, or same buyer and conversation. A field
/// missing on either side never matches.
#[must_use]
pub fn fields_match(a: &KeyFields, b: &KeyFields) -> bool {
    let by_content = both_present_eq(a.account.as_ref(), b.account.as_ref())
        && both_present_eq(a.content.as_ref(), b.content.as_ref());
    let by_conversation = both_present_eq(a.buyer.as_ref(), b.buyer.as_ref())
        && both_present_eq(a.chat_id.as_ref(), b.chat_id.as_ref());
    by_content || by_conversation
}

/// Identifier candidates found in `text`, in pattern priority order.
#[must_use]
pub fn extract_message_ids(text: &str) -> Vec<String> {
    let mut ids = Vec::new();
    for re in ID_PATTERNS.iter() {
        for caps in re.captures_iter(text) {
            if let Some(m) = caps.get(1) {
                let id = m.as_str().to_owned();
                if !ids.contains(&id) {
                    ids.push(id);
                }
            }
        }
    }
    ids
}

/// First pending candidate whose stored notification matches `quoted`.
#[must_use]
pub fn find_by_content<'a>(
    quoted: &str,
    candidates: &'a [MessageRecord],
) -> Option<&'a MessageRecord> {
    let wanted = extract_fields(quoted);
    candidates
        .iter()
        .filter(|r| r.status == MessageStatus::Pending)
        .find(|r| {
            r.original_notification()
                .is_some_and(|stored| fields_match(&wanted, &extract_fields(stored)))
        })
}

/// Resolve the record an operator reply refers to.
///
/// Returns `None` when neither strategy identifies a pending record owned
/// by `channel`.
///
/// # Errors
///
/// Returns `AppError::Db` if loading the channel's pending records fails.
pub async fn resolve_quoted(
    repo: &MessageRepo,
    channel: i64,
    quoted: &str,
) -> Result<Option<MessageRecord>> {
    let pending = repo
        .list_by_channel(channel, Some(MessageStatus::Pending), SEARCH_WINDOW)
        .await?;

    for id in extract_message_ids(quoted) {
        if let Some(record) = pending.iter().find(|r| r.message_id == id) {
            return Ok(Some(record.clone()));
        }
    }
    Ok(find_by_content(quoted, &pending).cloned())
}
