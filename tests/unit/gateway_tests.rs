use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::json;
use tokio::time::Instant;
use wiremock::matchers::{body_partial_json, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use reply_desk::config::{GatewayConfig, TelegramConfig};
use reply_desk::telegram::client::{BotTransport, OutboundRequest, SendOutcome, TelegramTransport};
use reply_desk::telegram::gateway::OutboundGateway;
use reply_desk::telegram::keyboard::notification_keyboard;

/// Transport that replays scripted outcomes and records call times.
#[derive(Default)]
struct ScriptedTransport {
    script: Mutex<VecDeque<SendOutcome>>,
    calls: Mutex<Vec<(Instant, Option<i64>)>>,
}

impl ScriptedTransport {
    fn new(outcomes: Vec<SendOutcome>) -> Arc<Self> {
        Arc::new(Self {
            script: Mutex::new(outcomes.into()),
            calls: Mutex::new(Vec::new()),
        })
    }

    fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }

    fn call_times(&self) -> Vec<Instant> {
        self.calls.lock().unwrap().iter().map(|(t, _)| *t).collect()
    }
}

#[async_trait]
impl BotTransport for ScriptedTransport {
    async fn execute(&self, request: &OutboundRequest) -> SendOutcome {
        self.calls
            .lock()
            .unwrap()
            .push((Instant::now(), request.chat_id()));
        self.script
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or(SendOutcome::Ok)
    }
}

fn config(
    per_second: u32,
    per_chat_ms: u64,
    attempts: u32,
    initial_ms: u64,
    max_ms: u64,
) -> GatewayConfig {
    GatewayConfig {
        max_requests_per_second: per_second,
        per_chat_interval_ms: per_chat_ms,
        max_attempts: attempts,
        initial_backoff_ms: initial_ms,
        max_backoff_ms: max_ms,
        request_timeout_seconds: 5,
    }
}

fn transient() -> SendOutcome {
    SendOutcome::Failed {
        transient: true,
        description: "timeout".into(),
    }
}

#[tokio::test(start_paused = true)]
async fn retry_after_sleeps_exactly_the_server_delay() {
    let transport = ScriptedTransport::new(vec![SendOutcome::RetryAfter(3), SendOutcome::Ok]);
    let gateway = OutboundGateway::new(transport.clone(), &config(30, 1000, 3, 1000, 30_000));

    assert!(gateway.send_text(1, "hi").await);
    let times = transport.call_times();
    assert_eq!(times.len(), 2);
    assert_eq!(times[1] - times[0], Duration::from_secs(3));
}

#[tokio::test(start_paused = true)]
async fn transient_failures_back_off_exponentially() {
    let transport = ScriptedTransport::new(vec![transient(), transient(), SendOutcome::Ok]);
    let gateway = OutboundGateway::new(transport.clone(), &config(30, 0, 5, 1000, 30_000));

    assert!(gateway.send_text(1, "hi").await);
    let times = transport.call_times();
    assert_eq!(times.len(), 3);
    assert_eq!(times[1] - times[0], Duration::from_secs(1));
    assert_eq!(times[2] - times[1], Duration::from_secs(2));
}

#[tokio::test(start_paused = true)]
async fn backoff_is_capped_and_attempts_are_bounded() {
    let transport = ScriptedTransport::new(vec![transient(); 5]);
    let gateway = OutboundGateway::new(transport.clone(), &config(30, 0, 4, 1000, 1500));

    assert!(!gateway.send_text(1, "hi").await);
    let times = transport.call_times();
    assert_eq!(times.len(), 4);
    assert_eq!(times[2] - times[1], Duration::from_millis(1500));
    assert_eq!(times[3] - times[2], Duration::from_millis(1500));
}

#[tokio::test(start_paused = true)]
async fn permanent_failure_stops_immediately() {
    let transport = ScriptedTransport::new(vec![SendOutcome::Failed {
        transient: false,
        description: "chat not found".into(),
    }]);
    let gateway = OutboundGateway::new(transport.clone(), &config(30, 0, 3, 1000, 30_000));

    assert!(!gateway.send_text(1, "hi").await);
    assert_eq!(transport.call_count(), 1);
}

#[tokio::test(start_paused = true)]
async fn repeated_rate_limits_exhaust_attempts() {
    let transport = ScriptedTransport::new(vec![
        SendOutcome::RetryAfter(1),
        SendOutcome::RetryAfter(1),
        SendOutcome::RetryAfter(1),
    ]);
    let gateway = OutboundGateway::new(transport.clone(), &config(30, 0, 3, 1000, 30_000));
    assert!(!gateway.send_text(1, "hi").await);
    assert_eq!(transport.call_count(), 3);
}

#[tokio::test(start_paused = true)]
async fn global_window_limits_throughput() {
    let transport = ScriptedTransport::new(Vec::new());
    let gateway = OutboundGateway::new(transport.clone(), &config(2, 0, 1, 1000, 30_000));

    for chat in 1..=3 {
        assert!(gateway.send_text(chat, "hi").await);
    }
    let times = transport.call_times();
    assert_eq!(times[1], times[0]);
    assert_eq!(times[2] - times[0], Duration::from_secs(1));
}

#[tokio::test(start_paused = true)]
async fn per_chat_spacing_applies_only_to_same_chat() {
    let transport = ScriptedTransport::new(Vec::new());
    let gateway = OutboundGateway::new(transport.clone(), &config(30, 1000, 1, 1000, 30_000));

    assert!(gateway.send_text(1, "a").await);
    assert!(gateway.send_text(2, "b").await);
    assert!(gateway.send_text(1, "c").await);
    let times = transport.call_times();
    assert_eq!(times[1], times[0]);
    assert_eq!(times[2] - times[0], Duration::from_secs(1));
}

#[tokio::test(start_paused = true)]
async fn callback_answers_are_not_chat_limited() {
    let transport = ScriptedTransport::new(Vec::new());
    let gateway = OutboundGateway::new(transport.clone(), &config(30, 1000, 1, 1000, 30_000));

    assert!(gateway.send_text(1, "a").await);
    assert!(gateway.answer_callback("q1", None).await);
    let times = transport.call_times();
    assert_eq!(times[1], times[0]);
}

fn telegram_config(api_base: String) -> TelegramConfig {
    TelegramConfig {
        api_base,
        webhook_secret: None,
        bot_token: "123:ABC".into(),
    }
}

#[tokio::test]
async fn transport_maps_bot_api_responses() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/bot123:ABC/sendMessage"))
        .and(body_partial_json(json!({ "chat_id": 1, "text": "ok" })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "ok": true, "result": {} })))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/bot123:ABC/sendMessage"))
        .and(body_partial_json(json!({ "chat_id": 2 })))
        .respond_with(ResponseTemplate::new(429).set_body_json(json!({
            "ok": false,
            "description": "Too Many Requests",
            "parameters": { "retry_after": 7 }
        })))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/bot123:ABC/sendMessage"))
        .and(body_partial_json(json!({ "chat_id": 3 })))
        .respond_with(ResponseTemplate::new(400).set_body_json(json!({
            "ok": false,
            "description": "Bad Request: chat not found"
        })))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/bot123:ABC/sendMessage"))
        .and(body_partial_json(json!({ "chat_id": 4 })))
        .respond_with(ResponseTemplate::new(502))
        .mount(&server)
        .await;

    let transport = TelegramTransport::new(&telegram_config(server.uri()), Duration::from_secs(5))
        .expect("transport");

    assert_eq!(transport.execute(&OutboundRequest::text(1, "ok")).await, SendOutcome::Ok);
    assert_eq!(
        transport.execute(&OutboundRequest::text(2, "x")).await,
        SendOutcome::RetryAfter(7)
    );
    assert!(matches!(
        transport.execute(&OutboundRequest::text(3, "x")).await,
        SendOutcome::Failed {
            transient: false,
            ref description,
        } if description.contains("chat not found")
    ));
    assert!(matches!(
        transport.execute(&OutboundRequest::text(4, "x")).await,
        SendOutcome::Failed { transient: true, .. }
    ));
}

#[tokio::test]
async fn transport_sends_inline_keyboard() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/bot123:ABC/sendMessage"))
        .and(body_partial_json(json!({
            "reply_markup": { "inline_keyboard": [[
                { "text": "\u{1f4ac} Reply", "callback_data": "reply_m1" }
            ]] }
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "ok": true })))
        .expect(1)
        .mount(&server)
        .await;

    let transport = TelegramTransport::new(&telegram_config(server.uri()), Duration::from_secs(5))
        .expect("transport");
    let request = OutboundRequest::SendMessage {
        chat_id: 1,
        text: "new message".into(),
        keyboard: Some(notification_keyboard("m1")),
    };
    assert_eq!(transport.execute(&request).await, SendOutcome::Ok);
}

#[test]
fn transport_requires_token() {
    let mut cfg = telegram_config("http://localhost".into());
    cfg.bot_token.clear();
    assert!(TelegramTransport::new(&cfg, Duration::from_secs(1)).is_err());
}
