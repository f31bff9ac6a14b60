//! AI conversation history repository.

use std::sync::Arc;

use crate::models::conversation::{ConversationTurn, Intent, TurnRole};
use crate::{AppError, Result};

use super::db::Database;
use super::{decode_ts, encode_ts};

/// Repository for persisted conversation turns.
#[derive(Clone)]
pub struct ConversationRepo {
    db: Arc<Database>,
}

#[derive(sqlx::FromRow)]
struct TurnRow {
    chat_id: String,
    cookie_id: String,
    user_id: String,
    item_id: String,
    role: String,
    content: String,
    intent: Option<String>,
    created_at: String,
}

impl TurnRow {
    fn into_turn(self) -> Result<ConversationTurn> {
        let role = TurnRole::parse(&self.role)
            .ok_or_else(|| AppError::Db(format!("invalid turn role: {}", self.role)))?;
        Ok(ConversationTurn {
            chat_id: self.chat_id,
            cookie_id: self.cookie_id,
            user_id: self.user_id,
            item_id: self.item_id,
            role,
            content: self.content,
            intent: self.intent.as_deref().map(Intent::from_label),
            created_at: decode_ts("created_at", &self.created_at)?,
        })
    }
}

impl ConversationRepo {
    /// Create a new repository instance.
    #[must_use]
    pub fn new(db: Arc<Database>) -> Self {
        Self { db }
    }

    /// Append one turn.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Db` if the insert fails.
    pub async fn append_turn(&self, turn: &ConversationTurn) -> Result<()> {
        sqlx::query(
            "INSERT INTO ai_conversation
                 (chat_id, cookie_id, user_id, item_id, role, content, intent, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
        )
        .bind(&turn.chat_id)
        .bind(&turn.cookie_id)
        .bind(&turn.user_id)
        .bind(&turn.item_id)
        .bind(turn.role.as_str())
        .bind(&turn.content)
        .bind(turn.intent.map(Intent::as_str))
        .bind(encode_ts(turn.created_at))
        .execute(self.db.as_ref())
        .await?;
        Ok(())
    }

    /// Append a user turn and its reply in one transaction.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Db` if either insert fails; neither turn is kept.
    pub async fn append_exchange(
        &self,
        user: &ConversationTurn,
        assistant: &ConversationTurn,
    ) -> Result<()> {
        let mut tx = self.db.begin().await?;
        for turn in [user, assistant] {
            sqlx::query(
                "INSERT INTO ai_conversation
                     (chat_id, cookie_id, user_id, item_id, role, content, intent, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            )
            .bind(&turn.chat_id)
            .bind(&turn.cookie_id)
            .bind(&turn.user_id)
            .bind(&turn.item_id)
            .bind(turn.role.as_str())
            .bind(&turn.content)
            .bind(turn.intent.map(Intent::as_str))
            .bind(encode_ts(turn.created_at))
            .execute(&mut *tx)
            .await?;
        }
        tx.commit().await?;
        Ok(())
    }

    /// The most recent `limit` turns for a conversation, oldest first.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Db` if the query fails.
    pub async fn recent_turns(
        &self,
        chat_id: &str,
        cookie_id: &str,
        limit: u32,
    ) -> Result<Vec<ConversationTurn>> {
        let rows: Vec<TurnRow> = sqlx::query_as(
            "SELECT chat_id, cookie_id, user_id, item_id, role, content, intent, created_at
             FROM ai_conversation
             WHERE chat_id = ?1 AND cookie_id = ?2
             ORDER BY id DESC LIMIT ?3",
        )
        .bind(chat_id)
        .bind(cookie_id)
        .bind(i64::from(limit))
        .fetch_all(self.db.as_ref())
        .await?;

        let mut turns = rows
            .into_iter()
            .map(TurnRow::into_turn)
            .collect::<Result<Vec<_>>>()?;
        turns.reverse();
        Ok(turns)
    }

    /// Number of persisted buyer turns tagged `price` for a conversation.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Db` if the query fails.
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    pub async fn count_price_turns(&self, chat_id: &str, cookie_id: &str) -> Result<u32> {
        let (n,): (i64,) = sqlx::query_as(
            "SELECT COUNT(*) FROM ai_conversation
             WHERE chat_id = ?1 AND cookie_id = ?2 AND role = 'user' AND intent = 'price'",
        )
        .bind(chat_id)
        .bind(cookie_id)
        .fetch_one(self.db.as_ref())
        .await?;
        Ok(n.clamp(0, i64::from(u32::MAX)) as u32)
    }
}
