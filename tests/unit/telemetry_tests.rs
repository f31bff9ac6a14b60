use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::json;
use tokio_util::sync::CancellationToken;
use wiremock::matchers::{header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use reply_desk::config::TelemetryConfig;
use reply_desk::persistence::{db, settings_repo::SettingsRepo};
use reply_desk::telemetry::batcher::{load_or_create_anonymous_id, spawn_flush_task};
use reply_desk::telemetry::{HttpTelemetrySink, TelemetrySink, UsageBatcher, UsageEvent};
use reply_desk::{AppError, Result};

/// Sink that fails the first `failures` calls and records accepted batches.
#[derive(Default)]
struct RecordingSink {
    failures: Mutex<u32>,
    batches: Mutex<Vec<Vec<String>>>,
    calls: Mutex<u32>,
}

impl RecordingSink {
    fn failing(times: u32) -> Arc<Self> {
        Arc::new(Self {
            failures: Mutex::new(times),
            ..Self::default()
        })
    }

    fn batches(&self) -> Vec<Vec<String>> {
        self.batches.lock().unwrap().clone()
    }
}

#[async_trait]
impl TelemetrySink for RecordingSink {
    async fn send(&self, events: &[UsageEvent]) -> Result<()> {
        *self.calls.lock().unwrap() += 1;
        let mut failures = self.failures.lock().unwrap();
        if *failures > 0 {
            *failures -= 1;
            return Err(AppError::Telemetry("collector down".into()));
        }
        self.batches
            .lock()
            .unwrap()
            .push(events.iter().map(|e| e.event_type.clone()).collect());
        Ok(())
    }
}

fn config(batch_size: usize, interval_secs: u64) -> TelemetryConfig {
    TelemetryConfig {
        enabled: true,
        batch_size,
        batch_interval_seconds: interval_secs,
        ..TelemetryConfig::default()
    }
}

/// Let spawned tasks run; the paused clock only advances once they idle.
async fn settle() {
    tokio::time::sleep(Duration::from_millis(10)).await;
}

#[tokio::test(start_paused = true)]
async fn full_batch_wakes_the_flush_task() {
    let sink = RecordingSink::failing(0);
    let batcher = Arc::new(UsageBatcher::new(sink.clone(), &config(3, 600), "anon".into()));
    let ct = CancellationToken::new();
    let handle = spawn_flush_task(Arc::clone(&batcher), ct.clone());
    settle().await;

    batcher.track("a", json!({}));
    batcher.track("b", json!({}));
    settle().await;
    assert!(sink.batches().is_empty());

    batcher.track("c", json!({}));
    assert!(sink.batches().is_empty(), "track never uploads inline");
    settle().await;
    assert_eq!(sink.batches(), vec![vec!["a", "b", "c"]]);
    assert_eq!(batcher.pending(), 0);

    ct.cancel();
    handle.await.expect("flush task");
}

#[tokio::test(start_paused = true)]
async fn flush_task_sends_after_interval() {
    let sink = RecordingSink::failing(0);
    let batcher = Arc::new(UsageBatcher::new(sink.clone(), &config(100, 60), "anon".into()));
    let ct = CancellationToken::new();
    let handle = spawn_flush_task(Arc::clone(&batcher), ct.clone());
    settle().await;

    batcher.track("a", json!({}));
    batcher.track("b", json!({}));
    settle().await;
    assert_eq!(batcher.pending(), 2);

    tokio::time::sleep(Duration::from_secs(61)).await;
    assert_eq!(sink.batches(), vec![vec!["a", "b"]]);

    ct.cancel();
    handle.await.expect("flush task");
}

#[tokio::test(start_paused = true)]
async fn track_does_not_wait_for_a_slow_sink() {
    struct SlowSink;

    #[async_trait]
    impl TelemetrySink for SlowSink {
        async fn send(&self, _events: &[UsageEvent]) -> Result<()> {
            tokio::time::sleep(Duration::from_secs(30)).await;
            Ok(())
        }
    }

    let batcher = Arc::new(UsageBatcher::new(
        Arc::new(SlowSink),
        &config(1, 600),
        "anon".into(),
    ));
    let ct = CancellationToken::new();
    let _handle = spawn_flush_task(Arc::clone(&batcher), ct.clone());
    settle().await;

    let started = tokio::time::Instant::now();
    batcher.track("a", json!({}));
    batcher.track("b", json!({}));
    assert_eq!(started.elapsed(), Duration::ZERO);
    ct.cancel();
}

#[tokio::test(start_paused = true)]
async fn failed_items_are_dropped_after_three_attempts() {
    let sink = RecordingSink::failing(u32::MAX);
    let batcher = UsageBatcher::new(sink.clone(), &config(100, 600), "anon".into());
    batcher.track("a", json!({}));

    assert_eq!(batcher.flush().await, 0);
    assert_eq!(batcher.pending(), 1);
    assert_eq!(batcher.flush().await, 0);
    assert_eq!(batcher.pending(), 1);
    assert_eq!(batcher.flush().await, 0);
    assert_eq!(batcher.pending(), 0, "third failure drops the item");
}

#[tokio::test(start_paused = true)]
async fn requeued_items_go_before_newer_ones() {
    let sink = RecordingSink::failing(1);
    let batcher = UsageBatcher::new(sink.clone(), &config(100, 600), "anon".into());
    batcher.track("first", json!({}));
    assert_eq!(batcher.flush().await, 0);
    batcher.track("second", json!({}));
    assert_eq!(batcher.flush().await, 2);
    assert_eq!(sink.batches(), vec![vec!["first", "second"]]);
}

#[tokio::test(start_paused = true)]
async fn disabled_batcher_is_a_no_op() {
    let sink = RecordingSink::failing(0);
    let cfg = TelemetryConfig {
        enabled: false,
        ..config(1, 600)
    };
    let batcher = UsageBatcher::new(sink.clone(), &cfg, "anon".into());
    batcher.track("a", json!({}));
    assert_eq!(batcher.pending(), 0);
    assert_eq!(*sink.calls.lock().unwrap(), 0);
}

#[tokio::test(start_paused = true)]
async fn background_task_flushes_on_cancel() {
    let sink = RecordingSink::failing(0);
    let batcher = Arc::new(UsageBatcher::new(
        sink.clone(),
        &config(100, 3600),
        "anon".into(),
    ));
    let ct = CancellationToken::new();
    let handle = spawn_flush_task(Arc::clone(&batcher), ct.clone());

    batcher.track("a", json!({}));
    ct.cancel();
    handle.await.expect("flush task");
    assert_eq!(sink.batches(), vec![vec!["a"]]);
}

#[tokio::test]
async fn anonymous_id_is_created_once() {
    let pool = db::connect_memory().await.expect("db");
    let settings = SettingsRepo::new(Arc::new(pool));
    let first = load_or_create_anonymous_id(&settings).await;
    assert_eq!(first.len(), 16);
    assert!(first.chars().all(|c| c.is_ascii_hexdigit()));
    assert_eq!(load_or_create_anonymous_id(&settings).await, first);
}

#[tokio::test]
async fn http_sink_posts_batch_with_token() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/stats/batch"))
        .and(header("authorization", "Bearer t0k"))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&server)
        .await;

    let cfg = TelemetryConfig {
        endpoint: format!("{}/stats/", server.uri()),
        token: Some("t0k".into()),
        ..TelemetryConfig::default()
    };
    let sink = HttpTelemetrySink::new(&cfg).expect("sink");
    let batcher = UsageBatcher::new(Arc::new(sink), &config(100, 600), "anon".into());
    batcher.track("message_replied", json!({ "source": "ai" }));
    assert_eq!(batcher.flush().await, 1);

    let requests = server.received_requests().await.expect("recorded");
    let body: serde_json::Value = serde_json::from_slice(&requests[0].body).expect("json body");
    assert_eq!(body["data"][0]["type"], "message_replied");
    assert_eq!(body["data"][0]["anonymous_id"], "anon");
    assert_eq!(body["data"][0]["data"]["source"], "ai");
}

#[tokio::test]
async fn http_sink_reports_failure() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(503))
        .mount(&server)
        .await;

    let cfg = TelemetryConfig {
        endpoint: server.uri(),
        retry_count: 1,
        ..TelemetryConfig::default()
    };
    let sink = HttpTelemetrySink::new(&cfg).expect("sink");
    let err = sink.send(&[]).await.expect_err("503 must fail");
    assert!(matches!(err, AppError::Telemetry(_)));
}
