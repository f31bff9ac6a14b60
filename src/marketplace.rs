//! Marketplace send path: delivers an operator-approved reply to the buyer.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::config::MarketplaceConfig;
use crate::models::message::MessageRecord;
use crate::persistence::db::Database;
use crate::persistence::settings_repo::SettingsRepo;
use crate::{AppError, Result};

/// System setting holding the shared secret for the send endpoint.
pub const API_KEY_SETTING: &str = "telegram_reply_secret_key";

/// One reply to deliver.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeliveryRequest {
    /// Seller account sending the reply.
    pub cookie_id: String,
    /// Marketplace conversation identifier.
    pub chat_id: String,
    /// Buyer user identifier.
    pub to_user_id: String,
    /// Item the conversation is about.
    pub item_id: String,
    /// Reply text.
    pub text: String,
}

impl DeliveryRequest {
    /// Address `text` to the buyer of `record`.
    #[must_use]
    pub fn for_record(record: &MessageRecord, text: &str) -> Self {
        let item_id = record
            .context_data
            .get("item_id")
            .and_then(serde_json::Value::as_str)
            .filter(|s| !s.is_empty())
            .unwrap_or(if record.item_id.is_empty() {
                "unknown"
            } else {
                &record.item_id
            })
            .to_owned();
        Self {
            cookie_id: record.cookie_id.clone(),
            chat_id: record.chat_id.clone(),
            to_user_id: record.sender_user_id.clone(),
            item_id,
            text: text.to_owned(),
        }
    }
}

/// Capability to deliver a reply to a marketplace buyer.
#[async_trait]
pub trait MarketplaceDelivery: Send + Sync {
    /// Deliver one reply.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Delivery` if the marketplace did not accept it.
    async fn deliver(&self, request: &DeliveryRequest) -> Result<()>;
}

#[derive(Serialize)]
struct SendPayload<'a> {
    api_key: &'a str,
    cookie_id: &'a str,
    chat_id: &'a str,
    to_user_id: &'a str,
    item_id: &'a str,
    message: &'a str,
}

#[derive(Deserialize)]
struct SendResponse {
    #[serde(default)]
    success: bool,
    #[serde(default)]
    message: Option<String>,
}

/// Delivers replies through the marketplace service's HTTP send endpoint.
pub struct HttpDelivery {
    http: reqwest::Client,
    endpoint: String,
    api_key: Option<String>,
    settings: SettingsRepo,
}

impl HttpDelivery {
    /// Build a client for `config.endpoint`.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` if the HTTP client cannot be built.
    pub fn new(config: &MarketplaceConfig, db: Arc<Database>) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_seconds))
            .build()
            .map_err(|e| AppError::Config(format!("failed to build marketplace client: {e}")))?;
        Ok(Self {
            http,
            endpoint: config.endpoint.clone(),
            api_key: config.api_key.clone(),
            settings: SettingsRepo::new(db),
        })
    }

    async fn api_key(&self) -> Result<String> {
        if let Some(key) = self.api_key.as_ref().filter(|k| !k.is_empty()) {
            return Ok(key.clone());
        }
        self.settings
            .system_setting(API_KEY_SETTING)
            .await?
            .filter(|k| !k.is_empty())
            .ok_or_else(|| AppError::Config("marketplace api key is not configured".into()))
    }
}

#[async_trait]
impl MarketplaceDelivery for HttpDelivery {
    async fn deliver(&self, request: &DeliveryRequest) -> Result<()> {
        let api_key = self.api_key().await?;
        let payload = SendPayload {
            api_key: &api_key,
            cookie_id: &request.cookie_id,
            chat_id: &request.chat_id,
            to_user_id: &request.to_user_id,
            item_id: &request.item_id,
            message: &request.text,
        };

        let response = self
            .http
            .post(&self.endpoint)
            .json(&payload)
            .send()
            .await
            .map_err(|e| AppError::Delivery(format!("send request failed: {e}")))?;
        let status = response.status();
        let body: SendResponse = response
            .json()
            .await
            .map_err(|e| AppError::Delivery(format!("invalid send response ({status}): {e}")))?;

        if body.success {
            info!(
                cookie_id = %request.cookie_id,
                to_user_id = %request.to_user_id,
                "reply delivered"
            );
            Ok(())
        } else {
            let reason = body.message.unwrap_or_else(|| "unknown error".into());
            warn!(cookie_id = %request.cookie_id, %reason, "marketplace rejected reply");
            Err(AppError::Delivery(reason))
        }
    }
}
