//! Error types shared across the application.

use std::fmt::{Display, Formatter};

/// Shared application result type.
pub type Result<T> = std::result::Result<T, AppError>;

/// Application error enumeration covering all domain failure modes.
#[derive(Debug)]
pub enum AppError {
    /// Configuration parsing, validation, or missing-credential failure.
    Config(String),
    /// Persistence failure when interacting with `SQLite`.
    Db(String),
    /// Telegram Bot API failure after the gateway gave up.
    Telegram(String),
    /// Completion backend failure.
    Backend(String),
    /// Marketplace delivery failure.
    Delivery(String),
    /// Usage statistics upload failure.
    Telemetry(String),
    /// Requested entity does not exist.
    NotFound(String),
    /// Requesting channel does not own the record.
    Unauthorized(String),
    /// Record already left the `pending` state.
    AlreadyResolved(String),
    /// Another operation currently holds the record's resolve lock.
    Busy(String),
    /// Operator input failed validation.
    Validation(String),
    /// File-system or I/O operation failure.
    Io(String),
}

impl Display for AppError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Config(msg) => write!(f, "config: {msg}"),
            Self::Db(msg) => write!(f, "db: {msg}"),
            Self::Telegram(msg) => write!(f, "telegram: {msg}"),
            Self::Backend(msg) => write!(f, "backend: {msg}"),
            Self::Delivery(msg) => write!(f, "delivery: {msg}"),
            Self::Telemetry(msg) => write!(f, "telemetry: {msg}"),
            Self::NotFound(msg) => write!(f, "not found: {msg}"),
            Self::Unauthorized(msg) => write!(f, "unauthorized: {msg}"),
            Self::AlreadyResolved(msg) => write!(f, "already resolved: {msg}"),
            Self::Busy(msg) => write!(f, "busy: {msg}"),
            Self::Validation(msg) => write!(f, "validation: {msg}"),
            Self::Io(msg) => write!(f, "io: {msg}"),
        }
    }
}

impl std::error::Error for AppError {}

impl From<toml::de::Error> for AppError {
    fn from(err: toml::de::Error) -> Self {
        Self::Config(format!("invalid config: {err}"))
    }
}

impl From<sqlx::Error> for AppError {
    fn from(err: sqlx::Error) -> Self {
        Self::Db(err.to_string())
    }
}

impl From<serde_json::Error> for AppError {
    fn from(err: serde_json::Error) -> Self {
        Self::Db(format!("invalid json: {err}"))
    }
}

impl From<std::io::Error> for AppError {
    fn from(err: std::io::Error) -> Self {
        Self::Io(err.to_string())
    }
}
