use std::time::Duration;

use serde_json::json;
use wiremock::matchers::{body_partial_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use reply_desk::ai::backend::{
    app_prompt, BackendError, BackendKind, CompletionBackend, Sampling, MAX_RETRIES,
};
use reply_desk::ai::cache::ClientCache;
use reply_desk::ai::prompts::{self, PromptContext};
use reply_desk::models::conversation::{ConversationTurn, Intent, TurnRole};
use reply_desk::models::settings::{AiSettings, ItemInfo};

fn settings(base_url: &str) -> AiSettings {
    let mut s = AiSettings::disabled("acc");
    s.ai_enabled = true;
    s.api_key = "sk-test".into();
    s.model_name = "gpt-test".into();
    s.base_url = base_url.into();
    s
}

fn chat_reply(text: &str) -> ResponseTemplate {
    ResponseTemplate::new(200).set_body_json(json!({
        "choices": [{ "message": { "role": "assistant", "content": text } }]
    }))
}

#[test]
fn app_convention_needs_alias_and_host() {
    let mut s = settings("https://dashscope.aliyuncs.com/api/v1/apps/abc123");
    assert_eq!(BackendKind::select(&s), Ok(BackendKind::Chat));

    s.model_name = "Custom".into();
    assert_eq!(
        BackendKind::select(&s),
        Ok(BackendKind::App {
            endpoint: "https://dashscope.aliyuncs.com/api/v1/apps/abc123/completion".into()
        })
    );

    s.base_url = "https://example.com/api/v1/apps/abc123".into();
    assert_eq!(BackendKind::select(&s), Ok(BackendKind::Chat));
}

#[test]
fn app_convention_requires_app_id() {
    let mut s = settings("https://dashscope.aliyuncs.com/compatible-mode/v1");
    s.model_name = "qwen-custom".into();
    assert!(matches!(BackendKind::select(&s), Err(BackendError::Config(_))));
}

#[test]
fn missing_key_is_a_config_error() {
    let mut s = settings("http://localhost");
    s.api_key.clear();
    assert!(matches!(
        CompletionBackend::from_settings(&s, Duration::from_secs(1)),
        Err(BackendError::Config(_))
    ));
}

#[test]
fn app_prompt_folds_system_and_user() {
    let folded = app_prompt("Be nice.", "Is it new?");
    assert!(folded.starts_with("Be nice."));
    assert!(folded.contains("User question: Is it new?"));
    assert_eq!(app_prompt("", "only user"), "only user");
}

#[tokio::test]
async fn chat_completion_sends_bounds_and_reads_first_choice() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .and(header("authorization", "Bearer sk-test"))
        .and(body_partial_json(json!({ "model": "gpt-test", "max_tokens": 10 })))
        .respond_with(chat_reply("  price \n"))
        .expect(1)
        .mount(&server)
        .await;

    let backend = CompletionBackend::from_settings(&settings(&server.uri()), Duration::from_secs(5))
        .expect("backend");
    let label = backend.classify("classify", "cheaper?").await.expect("classify");
    assert_eq!(label, "price");
}

#[tokio::test]
async fn generation_uses_generation_token_bound() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .and(body_partial_json(json!({ "max_tokens": 100 })))
        .respond_with(chat_reply("Happy to help!"))
        .expect(1)
        .mount(&server)
        .await;

    let backend = CompletionBackend::from_settings(&settings(&server.uri()), Duration::from_secs(5))
        .expect("backend");
    let text = backend
        .complete("system", "user", Sampling::GENERATE)
        .await
        .expect("complete");
    assert_eq!(text, "Happy to help!");
}

#[tokio::test]
async fn failures_are_classified() {
    let server = MockServer::start().await;
    Mock::given(path("/auth/chat/completions"))
        .respond_with(ResponseTemplate::new(401).set_body_string("bad key"))
        .mount(&server)
        .await;
    Mock::given(path("/broken/chat/completions"))
        .respond_with(ResponseTemplate::new(200).set_body_string("not json"))
        .mount(&server)
        .await;
    Mock::given(path("/empty/chat/completions"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "choices": [] })))
        .mount(&server)
        .await;
    Mock::given(path("/down/chat/completions"))
        .respond_with(ResponseTemplate::new(500).set_body_string("oops"))
        .mount(&server)
        .await;
    Mock::given(path("/slow/chat/completions"))
        .respond_with(chat_reply("late").set_delay(Duration::from_millis(500)))
        .mount(&server)
        .await;

    let call = |suffix: &str, timeout: Duration| {
        let url = format!("{}/{suffix}", server.uri());
        let backend = CompletionBackend::from_settings(&settings(&url), timeout).expect("backend");
        async move { backend.complete("s", "u", Sampling::CLASSIFY).await }
    };

    let long = Duration::from_secs(5);
    assert!(matches!(call("auth", long).await, Err(BackendError::Auth(_))));
    assert!(matches!(call("broken", long).await, Err(BackendError::Malformed(_))));
    assert!(matches!(call("empty", long).await, Err(BackendError::Malformed(_))));
    assert!(matches!(
        call("down", long).await,
        Err(BackendError::Http { status: 500, .. })
    ));
    assert_eq!(
        call("slow", Duration::from_millis(50)).await,
        Err(BackendError::Timeout)
    );
}

#[test]
fn cache_rebuilds_when_settings_change() {
    let cache = ClientCache::new(Duration::from_secs(1));
    let mut s = settings("http://localhost:1");
    let first = cache.get_or_build(&s).expect("build");
    let again = cache.get_or_build(&s).expect("cached");
    assert!(std::sync::Arc::ptr_eq(&first, &again));

    s.api_key = "sk-rotated".into();
    let rebuilt = cache.get_or_build(&s).expect("rebuild");
    assert!(!std::sync::Arc::ptr_eq(&first, &rebuilt));
    assert_eq!(cache.len(), 1);

    let mut other = settings("http://localhost:2");
    other.cookie_id = "acc-2".into();
    cache.get_or_build(&other).expect("second account");
    cache.clear_cache(Some("acc"));
    assert_eq!(cache.len(), 1);
    cache.clear_cache(None);
    assert!(cache.is_empty());
}

#[test]
fn prompt_overrides_and_defaults() {
    let mut s = settings("http://localhost");
    assert_eq!(prompts::system_prompt(&s, Intent::Tech), prompts::default_prompt(Intent::Tech));
    s.custom_prompts.insert("tech".into(), "Answer like an engineer.".into());
    assert_eq!(prompts::system_prompt(&s, Intent::Tech), "Answer like an engineer.");
    assert_eq!(prompts::classify_prompt(&s), prompts::default_classify_prompt());
}

#[test]
fn user_prompt_carries_item_history_and_limits() {
    let s = settings("http://localhost");
    let item = ItemInfo {
        title: "Road bike".into(),
        price: 850.0,
        description: "Carbon frame".into(),
    };
    let history = vec![ConversationTurn::new(
        "c1",
        "acc",
        "buyer",
        "item",
        TurnRole::User,
        "hi".into(),
        None,
    )];
    let prompt = prompts::build_user_prompt(&PromptContext {
        item: &item,
        history: &history,
        bargain_count: 1,
        settings: &s,
        message: "Can you do 800?",
    });
    assert!(prompt.contains("Title: Road bike"));
    assert!(prompt.contains("Price: 850.00"));
    assert!(prompt.contains("user: hi"));
    assert!(prompt.contains("Current round: 2"));
    assert!(prompt.contains("Max rounds: 3"));
    assert!(prompt.contains("Buyer message: Can you do 800?"));
}

#[tokio::test]
async fn transient_failure_is_retried() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .respond_with(ResponseTemplate::new(503).set_body_string("overloaded"))
        .up_to_n_times(1)
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .respond_with(chat_reply("Back online."))
        .expect(1)
        .mount(&server)
        .await;

    let backend = CompletionBackend::from_settings(
        &settings(&format!("{}/v1", server.uri())),
        Duration::from_secs(5),
    )
    .expect("backend");
    let text = backend
        .complete("s", "u", Sampling::GENERATE)
        .await
        .expect("second attempt succeeds");
    assert_eq!(text, "Back online.");
}

#[tokio::test]
async fn retries_are_bounded_and_skip_auth_errors() {
    let server = MockServer::start().await;
    Mock::given(path("/busy/chat/completions"))
        .respond_with(ResponseTemplate::new(429))
        .expect(u64::from(MAX_RETRIES) + 1)
        .mount(&server)
        .await;
    Mock::given(path("/denied/chat/completions"))
        .respond_with(ResponseTemplate::new(403).set_body_string("forbidden"))
        .expect(1)
        .mount(&server)
        .await;

    let call = |suffix: &str| {
        let backend = CompletionBackend::from_settings(
            &settings(&format!("{}/{suffix}", server.uri())),
            Duration::from_secs(5),
        )
        .expect("backend");
        async move { backend.complete("s", "u", Sampling::CLASSIFY).await }
    };

    assert!(matches!(
        call("busy").await,
        Err(BackendError::Http { status: 429, .. })
    ));
    assert!(matches!(call("denied").await, Err(BackendError::Auth(_))));
}

#[test]
fn transient_errors_are_recognised() {
    assert!(BackendError::Timeout.is_transient());
    assert!(BackendError::Transport("reset".into()).is_transient());
    assert!(BackendError::Http { status: 502, body: String::new() }.is_transient());
    assert!(!BackendError::Http { status: 404, body: String::new() }.is_transient());
    assert!(!BackendError::Auth("bad key".into()).is_transient());
    assert!(!BackendError::Malformed("eof".into()).is_transient());
}
