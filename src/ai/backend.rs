//! Completion backends for the two supported request conventions.
//!
//! [`CompletionBackend::Chat`] speaks the `OpenAI`-compatible
//! `/chat/completions` shape. [`CompletionBackend::App`] speaks the
//! single-prompt app-completion shape used by hosted `DashScope` apps.

use std::fmt;
use std::time::Duration;

use reqwest::StatusCode;
use serde::Deserialize;
use serde_json::json;
use tracing::{debug, warn};

use crate::models::settings::AiSettings;

/// Host that identifies the app-completion provider.
const APP_PROVIDER_HOST: &str = "dashscope.aliyuncs.com";

/// Extra attempts after a transient failure.
pub const MAX_RETRIES: u32 = 2;

/// Delay before the first retry; doubles for each further one.
const RETRY_DELAY: Duration = Duration::from_millis(200);

/// Model names that opt an account into the app-completion convention.
const APP_MODEL_ALIASES: &[&str] = &["custom", "自定义", "dashscope", "qwen-custom"];

/// Failure from a completion call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BackendError {
    /// The request exceeded its deadline.
    Timeout,
    /// The provider rejected the credential.
    Auth(String),
    /// The response could not be interpreted.
    Malformed(String),
    /// Any other non-success HTTP status.
    Http {
        /// Response status code.
        status: u16,
        /// Response body, as text.
        body: String,
    },
    /// Connection-level failure.
    Transport(String),
    /// Settings cannot produce a usable backend.
    Config(String),
}

impl fmt::Display for BackendError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Timeout => write!(f, "request timed out"),
            Self::Auth(msg) => write!(f, "authentication failed: {msg}"),
            Self::Malformed(msg) => write!(f, "malformed response: {msg}"),
            Self::Http { status, body } => write!(f, "http {status}: {body}"),
            Self::Transport(msg) => write!(f, "transport: {msg}"),
            Self::Config(msg) => write!(f, "config: {msg}"),
        }
    }
}

impl std::error::Error for BackendError {}

impl BackendError {
    /// Whether a later attempt may succeed: timeouts, connection
    /// failures, rate limits and server errors.
    #[must_use]
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Timeout | Self::Transport(_) => true,
            Self::Http { status, .. } => *status == 429 || (500..600).contains(status),
            Self::Auth(_) | Self::Malformed(_) | Self::Config(_) => false,
        }
    }
}

impl From<reqwest::Error> for BackendError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            Self::Timeout
        } else if err.is_decode() {
            Self::Malformed(err.to_string())
        } else {
            Self::Transport(err.to_string())
        }
    }
}

/// Sampling parameters for one call.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Sampling {
    /// Upper bound on generated tokens.
    pub max_tokens: u32,
    /// Sampling temperature.
    pub temperature: f32,
}

impl Sampling {
    /// Short, near-deterministic output for intent labels.
    pub const CLASSIFY: Self = Self {
        max_tokens: 10,
        temperature: 0.1,
    };

    /// Reply generation.
    pub const GENERATE: Self = Self {
        max_tokens: 100,
        temperature: 0.7,
    };
}

/// Which request convention an account's settings select.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BackendKind {
    /// `POST {base_url}/chat/completions`.
    Chat,
    /// `POST {endpoint}` with a single combined prompt.
    App {
        /// Full completion URL including the app identifier.
        endpoint: String,
    },
}

impl BackendKind {
    /// Pick the convention for `settings`.
    ///
    /// The app convention is chosen only when the model name is one of the
    /// custom aliases and the endpoint is on the app provider's host.
    ///
    /// # Errors
    ///
    /// Returns `BackendError::Config` if the app convention is selected but
    /// the endpoint carries no `/apps/<id>` segment.
    pub fn select(settings: &AiSettings) -> Result<Self, BackendError> {
        let model = settings.model_name.to_lowercase();
        let is_custom_model = APP_MODEL_ALIASES.contains(&model.as_str());
        let is_app_host = settings.base_url.contains(APP_PROVIDER_HOST);
        if !(is_custom_model && is_app_host) {
            return Ok(Self::Chat);
        }

        let (prefix, rest) = settings
            .base_url
            .split_once("/apps/")
            .ok_or_else(|| BackendError::Config("app endpoint is missing /apps/<id>".into()))?;
        let app_id = rest.split('/').next().unwrap_or_default();
        if app_id.is_empty() {
            return Err(BackendError::Config("app endpoint has an empty app id".into()));
        }
        Ok(Self::App {
            endpoint: format!("{prefix}/apps/{app_id}/completion"),
        })
    }
}

/// A ready-to-use completion client for one account.
#[derive(Debug, Clone)]
pub enum CompletionBackend {
    /// Chat-completions convention.
    Chat {
        /// Shared HTTP client.
        http: reqwest::Client,
        /// Endpoint base, without the `/chat/completions` suffix.
        base_url: String,
        /// Bearer credential.
        api_key: String,
        /// Model name sent with every request.
        model: String,
    },
    /// App-completion convention.
    App {
        /// Shared HTTP client.
        http: reqwest::Client,
        /// Full completion URL.
        endpoint: String,
        /// Bearer credential.
        api_key: String,
    },
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatMessage,
}

#[derive(Deserialize)]
struct ChatMessage {
    content: Option<String>,
}

#[derive(Deserialize)]
struct AppResponse {
    output: Option<AppOutput>,
}

#[derive(Deserialize)]
struct AppOutput {
    text: Option<String>,
}

impl CompletionBackend {
    /// Build the backend selected by `settings`.
    ///
    /// # Errors
    ///
    /// Returns `BackendError::Config` if the credential is missing, the app
    /// endpoint is malformed, or the HTTP client cannot be built.
    pub fn from_settings(settings: &AiSettings, timeout: Duration) -> Result<Self, BackendError> {
        if settings.api_key.is_empty() {
            return Err(BackendError::Config("missing api key".into()));
        }
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| BackendError::Config(format!("failed to build HTTP client: {e}")))?;

        Ok(match BackendKind::select(settings)? {
            BackendKind::Chat => Self::Chat {
                http,
                base_url: settings.base_url.trim_end_matches('/').to_owned(),
                api_key: settings.api_key.clone(),
                model: settings.model_name.clone(),
            },
            BackendKind::App { endpoint } => Self::App {
                http,
                endpoint,
                api_key: settings.api_key.clone(),
            },
        })
    }

    /// Ask for an intent label.
    ///
    /// # Errors
    ///
    /// Propagates any [`BackendError`] from the call.
    pub async fn classify(
        &self,
        system_prompt: &str,
        user_text: &str,
    ) -> Result<String, BackendError> {
        self.complete(system_prompt, user_text, Sampling::CLASSIFY).await
    }

    /// Run one completion and return the trimmed text.
    ///
    /// Transient failures are retried up to [`MAX_RETRIES`] times with a
    /// doubling delay.
    ///
    /// # Errors
    ///
    /// Returns `BackendError::Timeout`, `Auth`, `Http`, `Transport`, or
    /// `Malformed` depending on how the call failed.
    pub async fn complete(
        &self,
        system_prompt: &str,
        user_prompt: &str,
        sampling: Sampling,
    ) -> Result<String, BackendError> {
        match self {
            Self::Chat {
                http,
                base_url,
                api_key,
                model,
            } => {
                let body = json!({
                    "model": model,
                    "messages": [
                        {"role": "system", "content": system_prompt},
                        {"role": "user", "content": user_prompt},
                    ],
                    "max_tokens": sampling.max_tokens,
                    "temperature": sampling.temperature,
                });
                let url = format!("{base_url}/chat/completions");
                debug!(%url, "chat completion request");
                let raw = post_json(http, &url, api_key, &body).await?;
                let parsed: ChatResponse = serde_json::from_str(&raw)
                    .map_err(|e| BackendError::Malformed(e.to_string()))?;
                parsed
                    .choices
                    .into_iter()
                    .next()
                    .and_then(|c| c.message.content)
                    .map(|text| text.trim().to_owned())
                    .ok_or_else(|| BackendError::Malformed("no choices in response".into()))
            }
            Self::App {
                http,
                endpoint,
                api_key,
            } => {
                let body = json!({
                    "input": {"prompt": app_prompt(system_prompt, user_prompt)},
                    "parameters": {
                        "max_tokens": sampling.max_tokens,
                        "temperature": sampling.temperature,
                    },
                    "debug": {},
                });
                debug!(url = %endpoint, "app completion request");
                let raw = post_json(http, endpoint, api_key, &body).await?;
                let parsed: AppResponse = serde_json::from_str(&raw)
                    .map_err(|e| BackendError::Malformed(e.to_string()))?;
                parsed
                    .output
                    .and_then(|o| o.text)
                    .map(|text| text.trim().to_owned())
                    .ok_or_else(|| BackendError::Malformed("missing output.text".into()))
            }
        }
    }
}

/// Fold a system and user prompt into the single prompt the app
/// convention accepts.
#[must_use]
pub fn app_prompt(system_prompt: &str, user_prompt: &str) -> String {
    match (system_prompt.is_empty(), user_prompt.is_empty()) {
        (false, false) => format!(
            "{system_prompt}\n\nUser question: {user_prompt}\n\nPlease answer the user's question directly:"
        ),
        (true, _) => user_prompt.to_owned(),
        (false, true) => system_prompt.to_owned(),
    }
}

async fn post_json(
    http: &reqwest::Client,
    url: &str,
    api_key: &str,
    body: &serde_json::Value,
) -> Result<String, BackendError> {
    let mut delay = RETRY_DELAY;
    let mut attempt = 0;
    loop {
        match post_once(http, url, api_key, body).await {
            Err(err) if err.is_transient() && attempt < MAX_RETRIES => {
                attempt += 1;
                warn!(%url, attempt, %err, "transient backend failure, retrying");
                tokio::time::sleep(delay).await;
                delay *= 2;
            }
            result => return result,
        }
    }
}

async fn post_once(
    http: &reqwest::Client,
    url: &str,
    api_key: &str,
    body: &serde_json::Value,
) -> Result<String, BackendError> {
    let response = http.post(url).bearer_auth(api_key).json(body).send().await?;
    let status = response.status();
    let text = response.text().await?;

    if status.is_success() {
        return Ok(text);
    }
    if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
        return Err(BackendError::Auth(text));
    }
    if status == StatusCode::REQUEST_TIMEOUT || status == StatusCode::GATEWAY_TIMEOUT {
        return Err(BackendError::Timeout);
    }
    Err(BackendError::Http {
        status: status.as_u16(),
        body: text,
    })
}
