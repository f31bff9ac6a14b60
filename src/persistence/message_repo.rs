//! Message record repository for `SQLite` persistence.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{Duration, Utc};

use crate::models::message::{MessageRecord, MessageStatus, ReplySource};
use crate::models::stats::{DailyCount, MessageStats, StatusCounts, TopSender};
use crate::{AppError, Result};

use super::db::Database;
use super::{decode_ts, encode_ts};

const COLUMNS: &str = "message_id, cookie_id, chat_id, item_id, sender_user_id, sender_name, \
     message_content, context_data, notification_chat_id, status, created_at, replied_at, \
     reply_content, reply_source";

/// Repository for inbound message records.
#[derive(Clone)]
pub struct MessageRepo {
    db: Arc<Database>,
}

/// Internal row struct for `SQLite` deserialization.
#[derive(sqlx::FromRow)]
struct MessageRow {
    message_id: String,
    cookie_id: String,
    chat_id: String,
    item_id: String,
    sender_user_id: String,
    sender_name: String,
    message_content: String,
    context_data: String,
    notification_chat_id: i64,
    status: String,
    created_at: String,
    replied_at: Option<String>,
    reply_content: Option<String>,
    reply_source: Option<String>,
}

impl MessageRow {
    fn into_record(self) -> Result<MessageRecord> {
        let status = MessageStatus::parse(&self.status)
            .ok_or_else(|| AppError::Db(format!("invalid message status: {}", self.status)))?;
        let reply_source = match self.reply_source.as_deref() {
            Some(raw) => Some(
                ReplySource::parse(raw)
                    .ok_or_else(|| AppError::Db(format!("invalid reply source: {raw}")))?,
            ),
            None => None,
        };
        let replied_at = match self.replied_at.as_deref() {
            Some(raw) => Some(decode_ts("replied_at", raw)?),
            None => None,
        };

        Ok(MessageRecord {
            message_id: self.message_id,
            cookie_id: self.cookie_id,
            chat_id: self.chat_id,
            item_id: self.item_id,
            sender_user_id: self.sender_user_id,
            sender_name: self.sender_name,
            text: self.message_content,
            context_data: serde_json::from_str(&self.context_data)?,
            notification_chat_id: self.notification_chat_id,
            status,
            created_at: decode_ts("created_at", &self.created_at)?,
            replied_at,
            reply_content: self.reply_content,
            reply_source,
        })
    }
}

fn into_records(rows: Vec<MessageRow>) -> Result<Vec<MessageRecord>> {
    rows.into_iter().map(MessageRow::into_record).collect()
}

#[allow(clippy::cast_sign_loss)]
fn count(raw: i64) -> u64 {
    raw.max(0) as u64
}

impl MessageRepo {
    /// Create a new repository instance.
    #[must_use]
    pub fn new(db: Arc<Database>) -> Self {
        Self { db }
    }

    /// Insert a new record.
    ///
    /// Returns `false` without writing when `message_id` already exists.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Db` if the insert fails for any other reason.
    pub async fn create(&self, record: &MessageRecord) -> Result<bool> {
        let result = sqlx::query(
            "INSERT INTO message_record (message_id, cookie_id, chat_id, item_id, sender_user_id,
                 sender_name, message_content, context_data, notification_chat_id, status,
                 created_at, replied_at, reply_content, reply_source)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14)",
        )
        .bind(&record.message_id)
        .bind(&record.cookie_id)
        .bind(&record.chat_id)
        .bind(&record.item_id)
        .bind(&record.sender_user_id)
        .bind(&record.sender_name)
        .bind(&record.text)
        .bind(serde_json::to_string(&record.context_data)?)
        .bind(record.notification_chat_id)
        .bind(record.status.as_str())
        .bind(encode_ts(record.created_at))
        .bind(record.replied_at.map(encode_ts))
        .bind(&record.reply_content)
        .bind(record.reply_source.map(ReplySource::as_str))
        .execute(self.db.as_ref())
        .await;

        match result {
            Ok(_) => Ok(true),
            Err(sqlx::Error::Database(err)) if err.is_unique_violation() => Ok(false),
            Err(err) => Err(err.into()),
        }
    }

    /// Next per-conversation sequence number: one more than the records
    /// already stored for `(cookie_id, chat_id)`.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Db` if the query fails.
    pub async fn next_sequence(&self, cookie_id: &str, chat_id: &str) -> Result<u64> {
        let (n,): (i64,) = sqlx::query_as(
            "SELECT COUNT(*) FROM message_record WHERE cookie_id = ?1 AND chat_id = ?2",
        )
        .bind(cookie_id)
        .bind(chat_id)
        .fetch_one(self.db.as_ref())
        .await?;
        Ok(count(n) + 1)
    }

    /// Retrieve a record by identifier.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Db` if the query fails or the row is corrupt.
    pub async fn get_by_id(&self, message_id: &str) -> Result<Option<MessageRecord>> {
        let row: Option<MessageRow> = sqlx::query_as(&format!(
            "SELECT {COLUMNS} FROM message_record WHERE message_id = ?1"
        ))
        .bind(message_id)
        .fetch_optional(self.db.as_ref())
        .await?;
        row.map(MessageRow::into_record).transpose()
    }

    /// Records owned by operator channel `channel`, newest first.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Db` if the query fails.
    pub async fn list_by_channel(
        &self,
        channel: i64,
        status: Option<MessageStatus>,
        limit: u32,
    ) -> Result<Vec<MessageRecord>> {
        let rows: Vec<MessageRow> = if let Some(status) = status {
            sqlx::query_as(&format!(
                "SELECT {COLUMNS} FROM message_record
                 WHERE notification_chat_id = ?1 AND status = ?2
                 ORDER BY created_at DESC LIMIT ?3"
            ))
            .bind(channel)
            .bind(status.as_str())
            .bind(i64::from(limit))
            .fetch_all(self.db.as_ref())
            .await?
        } else {
            sqlx::query_as(&format!(
                "SELECT {COLUMNS} FROM message_record
                 WHERE notification_chat_id = ?1
                 ORDER BY created_at DESC LIMIT ?2"
            ))
            .bind(channel)
            .bind(i64::from(limit))
            .fetch_all(self.db.as_ref())
            .await?
        };
        into_records(rows)
    }

    /// Move a pending record to a terminal status.
    ///
    /// The update is conditional on the stored status still being `pending`;
    /// returns whether a row changed.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Validation` if `status` is not terminal, or
    /// `AppError::Db` if the update fails.
    pub async fn update_status(
        &self,
        message_id: &str,
        status: MessageStatus,
        reply_content: Option<&str>,
        source: ReplySource,
    ) -> Result<bool> {
        if !status.is_terminal() {
            return Err(AppError::Validation(
                "records can only move to replied or ignored".into(),
            ));
        }

        let result = sqlx::query(
            "UPDATE message_record
             SET status = ?1, replied_at = ?2, reply_content = ?3, reply_source = ?4
             WHERE message_id = ?5 AND status = 'pending'",
        )
        .bind(status.as_str())
        .bind(encode_ts(Utc::now()))
        .bind(reply_content)
        .bind(source.as_str())
        .bind(message_id)
        .execute(self.db.as_ref())
        .await?;

        Ok(result.rows_affected() == 1)
    }

    /// Per-status counts for a channel.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Db` if the query fails.
    pub async fn status_counts(&self, channel: i64) -> Result<StatusCounts> {
        let rows: Vec<(String, i64)> = sqlx::query_as(
            "SELECT status, COUNT(*) FROM message_record
             WHERE notification_chat_id = ?1 GROUP BY status",
        )
        .bind(channel)
        .fetch_all(self.db.as_ref())
        .await?;

        let mut counts = StatusCounts::default();
        for (status, n) in rows {
            match MessageStatus::parse(&status) {
                Some(MessageStatus::Pending) => counts.pending = count(n),
                Some(MessageStatus::Replied) => counts.replied = count(n),
                Some(MessageStatus::Ignored) => counts.ignored = count(n),
                None => return Err(AppError::Db(format!("invalid message status: {status}"))),
            }
        }
        Ok(counts)
    }

    /// Case-insensitive substring search over text, sender name and
    /// identifier for a channel, newest first.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Db` if the query fails.
    pub async fn search(&self, channel: i64, term: &str) -> Result<Vec<MessageRecord>> {
        let needle = term.to_lowercase();
        let records = self.list_by_channel(channel, None, 500).await?;
        Ok(records
            .into_iter()
            .filter(|r| {
                r.text.to_lowercase().contains(&needle)
                    || r.sender_name.to_lowercase().contains(&needle)
                    || r.message_id.to_lowercase().contains(&needle)
            })
            .collect())
    }

    /// Aggregate statistics for a channel over the last `days` days.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Db` if the query fails.
    #[allow(clippy::cast_precision_loss)]
    pub async fn stats_window(&self, channel: i64, days: u32) -> Result<MessageStats> {
        let cutoff = Utc::now() - Duration::days(i64::from(days));
        let rows: Vec<MessageRow> = sqlx::query_as(&format!(
            "SELECT {COLUMNS} FROM message_record
             WHERE notification_chat_id = ?1 AND created_at >= ?2
             ORDER BY created_at DESC"
        ))
        .bind(channel)
        .bind(encode_ts(cutoff))
        .fetch_all(self.db.as_ref())
        .await?;
        let records = into_records(rows)?;

        let mut stats = MessageStats {
            days,
            ..MessageStats::default()
        };
        let mut latency_minutes = Vec::new();
        let mut senders: HashMap<&str, (u64, u64)> = HashMap::new();
        let mut daily: Vec<DailyCount> = Vec::new();

        for record in &records {
            match record.status {
                MessageStatus::Pending => stats.counts.pending += 1,
                MessageStatus::Replied => stats.counts.replied += 1,
                MessageStatus::Ignored => stats.counts.ignored += 1,
            }
            match (record.status, record.reply_source) {
                (MessageStatus::Replied, Some(ReplySource::Ai)) => stats.ai_replies += 1,
                (MessageStatus::Replied, Some(ReplySource::Manual)) => stats.manual_replies += 1,
                (MessageStatus::Replied, Some(ReplySource::Template)) => {
                    stats.template_replies += 1;
                }
                (MessageStatus::Ignored, Some(ReplySource::Batch)) => stats.batch_ignored += 1,
                _ => {}
            }
            if let (MessageStatus::Replied, Some(at)) = (record.status, record.replied_at) {
                latency_minutes.push((at - record.created_at).num_seconds() as f64 / 60.0);
            }

            let entry = senders.entry(record.sender_name.as_str()).or_default();
            entry.0 += 1;
            if record.status == MessageStatus::Replied {
                entry.1 += 1;
            }

            // Records are newest first, so days arrive in descending order.
            let date = record.created_at.format("%Y-%m-%d").to_string();
            match daily.last_mut() {
                Some(last) if last.date == date => last.count += 1,
                _ => daily.push(DailyCount { date, count: 1 }),
            }
        }

        let total = stats.counts.total();
        if total > 0 {
            stats.reply_rate = round1(stats.counts.replied as f64 * 100.0 / total as f64);
        }
        if !latency_minutes.is_empty() {
            stats.avg_response_minutes =
                round1(latency_minutes.iter().sum::<f64>() / latency_minutes.len() as f64);
        }

        let mut top: Vec<TopSender> = senders
            .into_iter()
            .map(|(name, (messages, replied))| TopSender {
                sender_name: name.to_owned(),
                message_count: messages,
                reply_rate: round1(replied as f64 * 100.0 / messages as f64),
            })
            .collect();
        top.sort_by(|a, b| {
            b.message_count
                .cmp(&a.message_count)
                .then_with(|| a.sender_name.cmp(&b.sender_name))
        });
        top.truncate(5);
        stats.top_senders = top;

        daily.truncate(5);
        stats.daily = daily;

        Ok(stats)
    }
}

fn round1(v: f64) -> f64 {
    (v * 10.0).round() / 10.0
}
