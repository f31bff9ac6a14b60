//! `SQLite` schema bootstrap logic.
//!
//! Every statement uses `CREATE ... IF NOT EXISTS` so bootstrap can run on
//! every startup.

use sqlx::SqlitePool;

use crate::Result;

/// Apply all table and index definitions.
///
/// # Errors
///
/// Returns `AppError::Db` if any DDL statement fails.
pub async fn bootstrap_schema(pool: &SqlitePool) -> Result<()> {
    let ddl = r"
CREATE TABLE IF NOT EXISTS message_record (
    message_id            TEXT PRIMARY KEY NOT NULL,
    cookie_id             TEXT NOT NULL,
    chat_id               TEXT NOT NULL,
    item_id               TEXT NOT NULL,
    sender_user_id        TEXT NOT NULL,
    sender_name           TEXT NOT NULL,
    message_content       TEXT NOT NULL,
    context_data          TEXT NOT NULL,
    notification_chat_id  INTEGER NOT NULL,
    status                TEXT NOT NULL CHECK(status IN ('pending','replied','ignored')),
    created_at            TEXT NOT NULL,
    replied_at            TEXT,
    reply_content         TEXT,
    reply_source          TEXT CHECK(reply_source IS NULL OR reply_source IN ('manual','ai','template','batch'))
);

CREATE TABLE IF NOT EXISTS ai_conversation (
    id          INTEGER PRIMARY KEY AUTOINCREMENT,
    chat_id     TEXT NOT NULL,
    cookie_id   TEXT NOT NULL,
    user_id     TEXT NOT NULL,
    item_id     TEXT NOT NULL,
    role        TEXT NOT NULL CHECK(role IN ('user','assistant')),
    content     TEXT NOT NULL,
    intent      TEXT,
    created_at  TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS ai_reply_settings (
    cookie_id             TEXT PRIMARY KEY NOT NULL,
    ai_enabled            INTEGER NOT NULL DEFAULT 0,
    model_name            TEXT NOT NULL DEFAULT 'qwen-plus',
    api_key               TEXT NOT NULL DEFAULT '',
    base_url              TEXT NOT NULL DEFAULT 'https://dashscope.aliyuncs.com/compatible-mode/v1',
    max_discount_percent  INTEGER NOT NULL DEFAULT 10,
    max_discount_amount   INTEGER NOT NULL DEFAULT 100,
    max_bargain_rounds    INTEGER NOT NULL DEFAULT 3,
    custom_prompts        TEXT NOT NULL DEFAULT '{}'
);

CREATE TABLE IF NOT EXISTS reply_template (
    id             INTEGER PRIMARY KEY AUTOINCREMENT,
    cookie_id      TEXT NOT NULL,
    keyword        TEXT NOT NULL,
    reply_content  TEXT NOT NULL,
    UNIQUE(cookie_id, keyword)
);

CREATE TABLE IF NOT EXISTS notification_channel (
    id            INTEGER PRIMARY KEY AUTOINCREMENT,
    user_id       TEXT NOT NULL,
    channel_type  TEXT NOT NULL,
    chat_id       INTEGER NOT NULL
);

CREATE TABLE IF NOT EXISTS account (
    cookie_id  TEXT PRIMARY KEY NOT NULL,
    user_id    TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS item_info (
    cookie_id    TEXT NOT NULL,
    item_id      TEXT NOT NULL,
    title        TEXT NOT NULL,
    price        TEXT NOT NULL,
    description  TEXT NOT NULL,
    PRIMARY KEY (cookie_id, item_id)
);

CREATE TABLE IF NOT EXISTS system_setting (
    key    TEXT PRIMARY KEY NOT NULL,
    value  TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_message_channel_status
    ON message_record(notification_chat_id, status, created_at);
CREATE INDEX IF NOT EXISTS idx_message_conversation
    ON message_record(cookie_id, chat_id);
CREATE INDEX IF NOT EXISTS idx_conversation_pair
    ON ai_conversation(chat_id, cookie_id, id);
";

    sqlx::raw_sql(ddl).execute(pool).await?;
    Ok(())
}
