//! Destinations for flushed usage batches.

use std::time::Duration;

use async_trait::async_trait;
use serde_json::json;
use tracing::debug;

use crate::config::TelemetryConfig;
use crate::{AppError, Result};

use super::batcher::UsageEvent;

/// Receives flushed batches.
#[async_trait]
pub trait TelemetrySink: Send + Sync {
    /// Deliver one batch.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Telemetry` if the batch was not accepted.
    async fn send(&self, events: &[UsageEvent]) -> Result<()>;
}

/// Posts `{"data": [...]}` to `<endpoint>/batch`.
pub struct HttpTelemetrySink {
    http: reqwest::Client,
    url: String,
    token: Option<String>,
    retry_count: u32,
}

impl HttpTelemetrySink {
    /// Build a sink from the telemetry config section.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` if the HTTP client cannot be built.
    pub fn new(config: &TelemetryConfig) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_seconds))
            .build()
            .map_err(|e| AppError::Config(format!("failed to build telemetry client: {e}")))?;
        Ok(Self {
            http,
            url: format!("{}/batch", config.endpoint.trim_end_matches('/')),
            token: config.token.clone(),
            retry_count: config.retry_count.max(1),
        })
    }
}

#[async_trait]
impl TelemetrySink for HttpTelemetrySink {
    async fn send(&self, events: &[UsageEvent]) -> Result<()> {
        let body = json!({ "data": events });
        let mut last_error = String::new();

        for attempt in 0..self.retry_count {
            let mut request = self.http.post(&self.url).json(&body);
            if let Some(token) = &self.token {
                request = request.bearer_auth(token);
            }
            match request.send().await {
                Ok(response) if response.status().is_success() => return Ok(()),
                Ok(response) => {
                    last_error = format!("status {}", response.status());
                }
                Err(err) => last_error = err.to_string(),
            }
            debug!(attempt, error = %last_error, "telemetry upload failed");
            if attempt + 1 < self.retry_count {
                tokio::time::sleep(Duration::from_secs(1 << attempt.min(6))).await;
            }
        }
        Err(AppError::Telemetry(last_error))
    }
}
