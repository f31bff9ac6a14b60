//! Rate-limited, retrying outbound gateway over a [`BotTransport`].

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use tokio::time::{sleep, Instant};
use tracing::{error, warn};

use crate::config::GatewayConfig;

use super::client::{BotTransport, OutboundRequest, SendOutcome};
use super::keyboard::InlineKeyboard;

const WINDOW: Duration = Duration::from_secs(1);

struct LimiterState {
    window: VecDeque<Instant>,
    last_by_chat: HashMap<i64, Instant>,
}

/// Sliding one-second global window plus minimum spacing per chat.
struct RateLimiter {
    max_per_window: usize,
    per_chat_interval: Duration,
    state: Mutex<LimiterState>,
}

impl RateLimiter {
    fn new(max_per_second: u32, per_chat_interval: Duration) -> Self {
        Self {
            max_per_window: usize::try_from(max_per_second.max(1)).unwrap_or(usize::MAX),
            per_chat_interval,
            state: Mutex::new(LimiterState {
                window: VecDeque::new(),
                last_by_chat: HashMap::new(),
            }),
        }
    }

    /// Wait until a request to `chat` may go out, then reserve the slot.
    async fn acquire(&self, chat: Option<i64>) {
        loop {
            let wait = self.try_reserve(chat, Instant::now());
            if wait.is_zero() {
                return;
            }
            sleep(wait).await;
        }
    }

    /// Reserve a slot at `now`, or return how long to wait before retrying.
    fn try_reserve(&self, chat: Option<i64>, now: Instant) -> Duration {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);

        while state
            .window
            .front()
            .is_some_and(|t| now.duration_since(*t) >= WINDOW)
        {
            state.window.pop_front();
        }
        let interval = self.per_chat_interval;
        state
            .last_by_chat
            .retain(|_, t| now.duration_since(*t) < interval);

        let global_wait = if state.window.len() >= self.max_per_window {
            state
                .window
                .front()
                .map_or(Duration::ZERO, |t| (*t + WINDOW).saturating_duration_since(now))
        } else {
            Duration::ZERO
        };
        let chat_wait = chat
            .and_then(|c| state.last_by_chat.get(&c))
            .map_or(Duration::ZERO, |t| (*t + interval).saturating_duration_since(now));

        let wait = global_wait.max(chat_wait);
        if wait.is_zero() {
            state.window.push_back(now);
            if let Some(c) = chat {
                state.last_by_chat.insert(c, now);
            }
        }
        wait
    }
}

/// Outbound Bot API gateway.
///
/// Every call waits for the limiter, then retries according to
/// [`GatewayConfig`]: server-specified delays are honoured exactly,
/// transient failures back off exponentially, permanent failures stop.
/// The outcome is always a `bool`.
pub struct OutboundGateway {
    transport: Arc<dyn BotTransport>,
    limiter: RateLimiter,
    max_attempts: u32,
    initial_backoff: Duration,
    max_backoff: Duration,
}

impl OutboundGateway {
    /// Wrap `transport` with the limits in `config`.
    #[must_use]
    pub fn new(transport: Arc<dyn BotTransport>, config: &GatewayConfig) -> Self {
        Self {
            transport,
            limiter: RateLimiter::new(
                config.max_requests_per_second,
                Duration::from_millis(config.per_chat_interval_ms),
            ),
            max_attempts: config.max_attempts.max(1),
            initial_backoff: Duration::from_millis(config.initial_backoff_ms),
            max_backoff: Duration::from_millis(config.max_backoff_ms),
        }
    }

    /// Execute `request`, returning whether it eventually succeeded.
    pub async fn send(&self, request: &OutboundRequest) -> bool {
        let mut backoff = self.initial_backoff;
        for attempt in 1..=self.max_attempts {
            self.limiter.acquire(request.chat_id()).await;
            let last = attempt == self.max_attempts;

            match self.transport.execute(request).await {
                SendOutcome::Ok => return true,
                SendOutcome::RetryAfter(secs) => {
                    warn!(attempt, retry_after = secs, "bot api rate limited");
                    if !last {
                        sleep(Duration::from_secs(secs)).await;
                    }
                }
                SendOutcome::Failed {
                    transient: true,
                    description,
                } => {
                    warn!(attempt, %description, ?backoff, "transient bot api failure");
                    if !last {
                        sleep(backoff).await;
                        backoff = (backoff * 2).min(self.max_backoff);
                    }
                }
                SendOutcome::Failed {
                    transient: false,
                    description,
                } => {
                    error!(%description, "bot api request rejected");
                    return false;
                }
            }
        }
        error!(attempts = self.max_attempts, "bot api request failed after retries");
        false
    }

    /// Send plain text.
    pub async fn send_text(&self, chat_id: i64, text: impl Into<String>) -> bool {
        self.send(&OutboundRequest::text(chat_id, text)).await
    }

    /// Send text with an inline keyboard.
    pub async fn send_with_keyboard(
        &self,
        chat_id: i64,
        text: impl Into<String>,
        keyboard: InlineKeyboard,
    ) -> bool {
        self.send(&OutboundRequest::SendMessage {
            chat_id,
            text: text.into(),
            keyboard: Some(keyboard),
        })
        .await
    }

    /// Replace the text (and keyboard) of an existing message.
    pub async fn edit_text(
        &self,
        chat_id: i64,
        message_id: i64,
        text: impl Into<String>,
        keyboard: Option<InlineKeyboard>,
    ) -> bool {
        self.send(&OutboundRequest::EditMessage {
            chat_id,
            message_id,
            text: text.into(),
            keyboard,
        })
        .await
    }

    /// Acknowledge a button tap.
    pub async fn answer_callback(&self, callback_query_id: &str, text: Option<String>) -> bool {
        self.send(&OutboundRequest::AnswerCallback {
            callback_query_id: callback_query_id.to_owned(),
            text,
        })
        .await
    }
}
