//! Account settings repository: AI settings, templates, channels, items,
//! and system key/value settings.

use std::collections::HashMap;
use std::sync::Arc;

use crate::models::settings::{
    parse_price, AiSettings, ItemInfo, NotificationChannel, ReplyTemplate,
};
use crate::Result;

use super::db::Database;

/// Channel type routed through the bot.
pub const TELEGRAM_CHANNEL: &str = "telegram";

/// Repository for per-account configuration rows.
#[derive(Clone)]
pub struct SettingsRepo {
    db: Arc<Database>,
}

#[derive(sqlx::FromRow)]
struct AiSettingsRow {
    cookie_id: String,
    ai_enabled: i64,
    model_name: String,
    api_key: String,
    base_url: String,
    max_discount_percent: i64,
    max_discount_amount: i64,
    max_bargain_rounds: i64,
    custom_prompts: String,
}

impl AiSettingsRow {
    fn into_settings(self) -> AiSettings {
        // A malformed prompt map only loses the overrides.
        let custom_prompts: HashMap<String, String> =
            serde_json::from_str(&self.custom_prompts).unwrap_or_else(|err| {
                tracing::warn!(
                    cookie_id = %self.cookie_id,
                    %err,
                    "ignoring malformed custom prompts"
                );
                HashMap::new()
            });
        AiSettings {
            cookie_id: self.cookie_id,
            ai_enabled: self.ai_enabled != 0,
            model_name: self.model_name,
            api_key: self.api_key,
            base_url: self.base_url,
            max_discount_percent: to_u32(self.max_discount_percent),
            max_discount_amount: to_u32(self.max_discount_amount),
            max_bargain_rounds: to_u32(self.max_bargain_rounds),
            custom_prompts,
        }
    }
}

#[derive(sqlx::FromRow)]
struct TemplateRow {
    cookie_id: String,
    keyword: String,
    reply_content: String,
}

impl TemplateRow {
    fn into_template(self) -> ReplyTemplate {
        ReplyTemplate {
            cookie_id: self.cookie_id,
            keyword: self.keyword,
            reply_content: self.reply_content,
        }
    }
}

#[derive(sqlx::FromRow)]
struct ChannelRow {
    id: i64,
    user_id: String,
    channel_type: String,
    chat_id: i64,
}

impl ChannelRow {
    fn into_channel(self) -> NotificationChannel {
        NotificationChannel {
            id: self.id,
            user_id: self.user_id,
            channel_type: self.channel_type,
            chat_id: self.chat_id,
        }
    }
}

#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
fn to_u32(v: i64) -> u32 {
    v.clamp(0, i64::from(u32::MAX)) as u32
}

impl SettingsRepo {
    /// Create a new repository instance.
    #[must_use]
    pub fn new(db: Arc<Database>) -> Self {
        Self { db }
    }

    /// AI settings for an account; a missing row yields disabled settings.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Db` if the query fails.
    pub async fn ai_settings(&self, cookie_id: &str) -> Result<AiSettings> {
        let row: Option<AiSettingsRow> = sqlx::query_as(
            "SELECT cookie_id, ai_enabled, model_name, api_key, base_url, max_discount_percent,
                    max_discount_amount, max_bargain_rounds, custom_prompts
             FROM ai_reply_settings WHERE cookie_id = ?1",
        )
        .bind(cookie_id)
        .fetch_optional(self.db.as_ref())
        .await?;
        Ok(row.map_or_else(|| AiSettings::disabled(cookie_id), AiSettingsRow::into_settings))
    }

    /// Insert or replace the AI settings for `settings.cookie_id`.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Db` if the write fails.
    pub async fn upsert_ai_settings(&self, settings: &AiSettings) -> Result<()> {
        sqlx::query(
            "INSERT INTO ai_reply_settings (cookie_id, ai_enabled, model_name, api_key, base_url,
                 max_discount_percent, max_discount_amount, max_bargain_rounds, custom_prompts)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
             ON CONFLICT(cookie_id) DO UPDATE SET
                 ai_enabled = excluded.ai_enabled,
                 model_name = excluded.model_name,
                 api_key = excluded.api_key,
                 base_url = excluded.base_url,
                 max_discount_percent = excluded.max_discount_percent,
                 max_discount_amount = excluded.max_discount_amount,
                 max_bargain_rounds = excluded.max_bargain_rounds,
                 custom_prompts = excluded.custom_prompts",
        )
        .bind(&settings.cookie_id)
        .bind(i64::from(settings.ai_enabled))
        .bind(&settings.model_name)
        .bind(&settings.api_key)
        .bind(&settings.base_url)
        .bind(i64::from(settings.max_discount_percent))
        .bind(i64::from(settings.max_discount_amount))
        .bind(i64::from(settings.max_bargain_rounds))
        .bind(serde_json::to_string(&settings.custom_prompts)?)
        .execute(self.db.as_ref())
        .await?;
        Ok(())
    }

    /// All reply templates for an account, ordered by name.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Db` if the query fails.
    pub async fn templates(&self, cookie_id: &str) -> Result<Vec<ReplyTemplate>> {
        let rows: Vec<TemplateRow> = sqlx::query_as(
            "SELECT cookie_id, keyword, reply_content FROM reply_template
             WHERE cookie_id = ?1 ORDER BY keyword",
        )
        .bind(cookie_id)
        .fetch_all(self.db.as_ref())
        .await?;
        Ok(rows.into_iter().map(TemplateRow::into_template).collect())
    }

    /// One template by name, compared case-insensitively.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Db` if the query fails.
    pub async fn template(&self, cookie_id: &str, keyword: &str) -> Result<Option<ReplyTemplate>> {
        let row: Option<TemplateRow> = sqlx::query_as(
            "SELECT cookie_id, keyword, reply_content FROM reply_template
             WHERE cookie_id = ?1 AND lower(keyword) = lower(?2)",
        )
        .bind(cookie_id)
        .bind(keyword)
        .fetch_optional(self.db.as_ref())
        .await?;
        Ok(row.map(TemplateRow::into_template))
    }

    /// Insert or replace a template.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Db` if the write fails.
    pub async fn add_template(&self, template: &ReplyTemplate) -> Result<()> {
        sqlx::query(
            "INSERT INTO reply_template (cookie_id, keyword, reply_content) VALUES (?1, ?2, ?3)
             ON CONFLICT(cookie_id, keyword) DO UPDATE SET reply_content = excluded.reply_content",
        )
        .bind(&template.cookie_id)
        .bind(&template.keyword)
        .bind(&template.reply_content)
        .execute(self.db.as_ref())
        .await?;
        Ok(())
    }

    /// Every registered notification channel.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Db` if the query fails.
    pub async fn notification_channels(&self) -> Result<Vec<NotificationChannel>> {
        let rows: Vec<ChannelRow> = sqlx::query_as(
            "SELECT id, user_id, channel_type, chat_id FROM notification_channel ORDER BY id",
        )
        .fetch_all(self.db.as_ref())
        .await?;
        Ok(rows.into_iter().map(ChannelRow::into_channel).collect())
    }

    /// Register a telegram notification channel for a platform user.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Db` if the insert fails.
    pub async fn add_channel(&self, user_id: &str, chat_id: i64) -> Result<()> {
        sqlx::query(
            "INSERT INTO notification_channel (user_id, channel_type, chat_id) VALUES (?1, ?2, ?3)",
        )
        .bind(user_id)
        .bind(TELEGRAM_CHANNEL)
        .bind(chat_id)
        .execute(self.db.as_ref())
        .await?;
        Ok(())
    }

    /// Register a seller account under a platform user.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Db` if the write fails.
    pub async fn add_account(&self, cookie_id: &str, user_id: &str) -> Result<()> {
        sqlx::query(
            "INSERT INTO account (cookie_id, user_id) VALUES (?1, ?2)
             ON CONFLICT(cookie_id) DO UPDATE SET user_id = excluded.user_id",
        )
        .bind(cookie_id)
        .bind(user_id)
        .execute(self.db.as_ref())
        .await?;
        Ok(())
    }

    /// Telegram chat that receives notifications for `cookie_id`, if any.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Db` if the query fails.
    pub async fn channel_for_account(&self, cookie_id: &str) -> Result<Option<i64>> {
        let row: Option<(i64,)> = sqlx::query_as(
            "SELECT n.chat_id FROM notification_channel n
             JOIN account a ON a.user_id = n.user_id
             WHERE a.cookie_id = ?1 AND n.channel_type = ?2
             ORDER BY n.id LIMIT 1",
        )
        .bind(cookie_id)
        .bind(TELEGRAM_CHANNEL)
        .fetch_optional(self.db.as_ref())
        .await?;
        Ok(row.map(|(chat_id,)| chat_id))
    }

    /// Accounts whose owner is notified on telegram chat `chat_id`.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Db` if the query fails.
    pub async fn accounts_for_chat(&self, chat_id: i64) -> Result<Vec<String>> {
        let rows: Vec<(String,)> = sqlx::query_as(
            "SELECT DISTINCT a.cookie_id FROM account a
             JOIN notification_channel n ON n.user_id = a.user_id
             WHERE n.chat_id = ?1 AND n.channel_type = ?2
             ORDER BY a.cookie_id",
        )
        .bind(chat_id)
        .bind(TELEGRAM_CHANNEL)
        .fetch_all(self.db.as_ref())
        .await?;
        Ok(rows.into_iter().map(|(c,)| c).collect())
    }

    /// Item metadata for prompt grounding.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Db` if the query fails.
    pub async fn item_info(&self, cookie_id: &str, item_id: &str) -> Result<Option<ItemInfo>> {
        let row: Option<(String, String, String)> = sqlx::query_as(
            "SELECT title, price, description FROM item_info
             WHERE cookie_id = ?1 AND item_id = ?2",
        )
        .bind(cookie_id)
        .bind(item_id)
        .fetch_optional(self.db.as_ref())
        .await?;
        Ok(row.map(|(title, price, description)| ItemInfo {
            title,
            price: parse_price(&price),
            description,
        }))
    }

    /// Insert or replace item metadata; `price` is the display string.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Db` if the write fails.
    pub async fn upsert_item(
        &self,
        cookie_id: &str,
        item_id: &str,
        title: &str,
        price: &str,
        description: &str,
    ) -> Result<()> {
        sqlx::query(
            "INSERT INTO item_info (cookie_id, item_id, title, price, description)
             VALUES (?1, ?2, ?3, ?4, ?5)
             ON CONFLICT(cookie_id, item_id) DO UPDATE SET
                 title = excluded.title, price = excluded.price, description = excluded.description",
        )
        .bind(cookie_id)
        .bind(item_id)
        .bind(title)
        .bind(price)
        .bind(description)
        .execute(self.db.as_ref())
        .await?;
        Ok(())
    }

    /// Value of a system setting.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Db` if the query fails.
    pub async fn system_setting(&self, key: &str) -> Result<Option<String>> {
        let row: Option<(String,)> =
            sqlx::query_as("SELECT value FROM system_setting WHERE key = ?1")
                .bind(key)
                .fetch_optional(self.db.as_ref())
                .await?;
        Ok(row.map(|(v,)| v))
    }

    /// Insert or replace a system setting.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Db` if the write fails.
    pub async fn set_system_setting(&self, key: &str, value: &str) -> Result<()> {
        sqlx::query(
            "INSERT INTO system_setting (key, value) VALUES (?1, ?2)
             ON CONFLICT(key) DO UPDATE SET value = excluded.value",
        )
        .bind(key)
        .bind(value)
        .execute(self.db.as_ref())
        .await?;
        Ok(())
    }
}
