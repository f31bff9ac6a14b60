//! Global configuration parsing, validation, and credential loading.

use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;
use tracing::warn;

use crate::{AppError, Result};

/// Keychain service name used for all runtime secrets.
const KEYRING_SERVICE: &str = "reply-desk";

/// Telegram Bot API connectivity.
///
/// The bot token is loaded at runtime via OS keychain or environment
/// variables, never from the TOML file.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct TelegramConfig {
    /// Bot API base URL.
    #[serde(default = "default_telegram_api_base")]
    pub api_base: String,
    /// Expected value of the `X-Telegram-Bot-Api-Secret-Token` webhook header.
    #[serde(default)]
    pub webhook_secret: Option<String>,
    /// Bot token (populated at runtime).
    #[serde(skip)]
    pub bot_token: String,
}

impl Default for TelegramConfig {
    fn default() -> Self {
        Self {
            api_base: default_telegram_api_base(),
            webhook_secret: None,
            bot_token: String::new(),
        }
    }
}

fn default_telegram_api_base() -> String {
    "https://api.telegram.org".into()
}

/// Outbound gateway rate limiting and retry policy.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct GatewayConfig {
    /// Global request ceiling per one-second window.
    #[serde(default = "default_max_requests_per_second")]
    pub max_requests_per_second: u32,
    /// Minimum spacing between two requests to the same chat.
    #[serde(default = "default_per_chat_interval_ms")]
    pub per_chat_interval_ms: u64,
    /// Attempts per request before reporting failure.
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    /// First transient-failure backoff.
    #[serde(default = "default_initial_backoff_ms")]
    pub initial_backoff_ms: u64,
    /// Backoff ceiling.
    #[serde(default = "default_max_backoff_ms")]
    pub max_backoff_ms: u64,
    /// HTTP timeout for a single Bot API call.
    #[serde(default = "default_request_timeout_seconds")]
    pub request_timeout_seconds: u64,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            max_requests_per_second: default_max_requests_per_second(),
            per_chat_interval_ms: default_per_chat_interval_ms(),
            max_attempts: default_max_attempts(),
            initial_backoff_ms: default_initial_backoff_ms(),
            max_backoff_ms: default_max_backoff_ms(),
            request_timeout_seconds: default_request_timeout_seconds(),
        }
    }
}

fn default_max_requests_per_second() -> u32 {
    30
}

fn default_per_chat_interval_ms() -> u64 {
    1000
}

fn default_max_attempts() -> u32 {
    3
}

fn default_initial_backoff_ms() -> u64 {
    1000
}

fn default_max_backoff_ms() -> u64 {
    30_000
}

fn default_request_timeout_seconds() -> u64 {
    10
}

/// Marketplace send-path configuration.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct MarketplaceConfig {
    /// Local endpoint that relays a reply to the marketplace conversation.
    #[serde(default = "default_marketplace_endpoint")]
    pub endpoint: String,
    /// HTTP timeout for a single delivery.
    #[serde(default = "default_request_timeout_seconds")]
    pub request_timeout_seconds: u64,
    /// Expected value of the intake secret header on `POST /messages`.
    #[serde(default)]
    pub intake_secret: Option<String>,
    /// Shared secret sent with each delivery (populated at runtime).
    #[serde(skip)]
    pub api_key: Option<String>,
}

impl Default for MarketplaceConfig {
    fn default() -> Self {
        Self {
            endpoint: default_marketplace_endpoint(),
            request_timeout_seconds: default_request_timeout_seconds(),
            intake_secret: None,
            api_key: None,
        }
    }
}

fn default_marketplace_endpoint() -> String {
    "http://localhost:8080/telegram/send-message".into()
}

/// Completion backend call settings shared by all accounts.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct AiConfig {
    /// HTTP timeout for a single completion call.
    #[serde(default = "default_ai_timeout_seconds")]
    pub request_timeout_seconds: u64,
}

impl Default for AiConfig {
    fn default() -> Self {
        Self {
            request_timeout_seconds: default_ai_timeout_seconds(),
        }
    }
}

fn default_ai_timeout_seconds() -> u64 {
    30
}

/// Usage statistics batching and upload settings.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct TelemetryConfig {
    /// Whether usage events are collected at all.
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Statistics collector base URL; batches go to `<endpoint>/batch`.
    #[serde(default = "default_telemetry_endpoint")]
    pub endpoint: String,
    /// Queue length that triggers an immediate flush.
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    /// Maximum time between flushes.
    #[serde(default = "default_batch_interval_seconds")]
    pub batch_interval_seconds: u64,
    /// HTTP timeout per upload attempt.
    #[serde(default = "default_request_timeout_seconds")]
    pub timeout_seconds: u64,
    /// Upload attempts per flush.
    #[serde(default = "default_max_attempts")]
    pub retry_count: u32,
    /// Bearer token (populated at runtime).
    #[serde(skip)]
    pub token: Option<String>,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            endpoint: default_telemetry_endpoint(),
            batch_size: default_batch_size(),
            batch_interval_seconds: default_batch_interval_seconds(),
            timeout_seconds: default_request_timeout_seconds(),
            retry_count: default_max_attempts(),
            token: None,
        }
    }
}

fn default_true() -> bool {
    true
}

fn default_telemetry_endpoint() -> String {
    "http://localhost:8081/api/v1/statistics".into()
}

fn default_batch_size() -> usize {
    10
}

fn default_batch_interval_seconds() -> u64 {
    60
}

fn default_http_port() -> u16 {
    8090
}

fn default_db_path() -> PathBuf {
    PathBuf::from("data/reply-desk.db")
}

fn default_reply_state_ttl_seconds() -> u64 {
    1800
}

/// Global configuration parsed from `config.toml`.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct GlobalConfig {
    /// HTTP port for the webhook and intake endpoints.
    #[serde(default = "default_http_port")]
    pub http_port: u16,
    /// `SQLite` database file.
    #[serde(default = "default_db_path")]
    pub db_path: PathBuf,
    /// How long a channel stays in free-text reply mode.
    #[serde(default = "default_reply_state_ttl_seconds")]
    pub reply_state_ttl_seconds: u64,
    /// Operator chat used when an account has no notification channel.
    #[serde(default)]
    pub default_chat_id: Option<i64>,
    /// Telegram connectivity settings.
    #[serde(default)]
    pub telegram: TelegramConfig,
    /// Outbound gateway policy.
    #[serde(default)]
    pub gateway: GatewayConfig,
    /// Marketplace delivery settings.
    #[serde(default)]
    pub marketplace: MarketplaceConfig,
    /// Completion backend call settings.
    #[serde(default)]
    pub ai: AiConfig,
    /// Usage statistics settings.
    #[serde(default)]
    pub telemetry: TelemetryConfig,
}

impl GlobalConfig {
    /// Load and validate configuration from a TOML file path.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` if the file cannot be read or contains
    /// invalid TOML, or if validation fails.
    pub fn load_from_path(path: impl AsRef<Path>) -> Result<Self> {
        let raw = fs::read_to_string(path)
            .map_err(|err| AppError::Config(format!("failed to read config: {err}")))?;
        Self::from_toml_str(&raw)
    }

    /// Parse configuration from a TOML string.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` if parsing or validation fails.
    pub fn from_toml_str(raw: &str) -> Result<Self> {
        let config: Self = toml::from_str(raw)?;
        config.validate()?;
        Ok(config)
    }

    /// Load runtime secrets from OS keychain with env-var fallback.
    ///
    /// The bot token is mandatory. The marketplace key and statistics
    /// token are optional and stay `None` when absent. An intake secret
    /// set in the file wins over the keychain.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` if the bot token cannot be found.
    pub async fn load_credentials(&mut self) -> Result<()> {
        self.telegram.bot_token = load_credential("telegram_bot_token", "TELEGRAM_BOT_TOKEN")
            .await?;
        self.marketplace.api_key = load_credential("marketplace_api_key", "MARKETPLACE_API_KEY")
            .await
            .ok();
        self.telemetry.token = load_credential("stats_token", "STATS_TOKEN").await.ok();
        if self.marketplace.intake_secret.is_none() {
            self.marketplace.intake_secret =
                load_credential("intake_secret", "INTAKE_SECRET").await.ok();
        }
        Ok(())
    }

    /// Reply-mode expiry as a [`Duration`].
    #[must_use]
    pub fn reply_state_ttl(&self) -> Duration {
        Duration::from_secs(self.reply_state_ttl_seconds)
    }

    fn validate(&self) -> Result<()> {
        if self.gateway.max_requests_per_second == 0 {
            return Err(AppError::Config(
                "gateway.max_requests_per_second must be greater than zero".into(),
            ));
        }

        if self.gateway.max_attempts == 0 {
            return Err(AppError::Config(
                "gateway.max_attempts must be greater than zero".into(),
            ));
        }

        if self.gateway.initial_backoff_ms > self.gateway.max_backoff_ms {
            return Err(AppError::Config(
                "gateway.initial_backoff_ms must not exceed gateway.max_backoff_ms".into(),
            ));
        }

        if self.telemetry.batch_size == 0 {
            return Err(AppError::Config(
                "telemetry.batch_size must be greater than zero".into(),
            ));
        }

        if self.reply_state_ttl_seconds == 0 {
            return Err(AppError::Config(
                "reply_state_ttl_seconds must be greater than zero".into(),
            ));
        }

        Ok(())
    }
}

/// Load a single credential from OS keychain with env-var fallback.
async fn load_credential(keyring_key: &str, env_key: &str) -> Result<String> {
    let key = keyring_key.to_owned();

    // keyring is synchronous I/O.
    let keychain_result = tokio::task::spawn_blocking(move || {
        keyring::Entry::new(KEYRING_SERVICE, &key).and_then(|entry| entry.get_password())
    })
    .await
    .map_err(|err| AppError::Config(format!("keychain task panicked: {err}")))?;

    match keychain_result {
        Ok(value) if !value.is_empty() => return Ok(value),
        Ok(_) => {
            warn!(key = keyring_key, "keychain entry is empty, trying env var");
        }
        Err(err) => {
            warn!(
                key = keyring_key,
                ?err,
                "keychain lookup failed, trying env var"
            );
        }
    }

    env::var(env_key)
        .ok()
        .filter(|value| !value.is_empty())
        .ok_or_else(|| {
            AppError::Config(format!(
                "credential {keyring_key} not found in keychain or {env_key} env var"
            ))
        })
}
