use std::sync::Arc;

use chrono::{Duration, Utc};
use serde_json::json;

use reply_desk::models::message::{MessageRecord, MessageStatus, ReplySource};
use reply_desk::persistence::{db, message_repo::MessageRepo};
use reply_desk::AppError;

const CHANNEL: i64 = 1001;

fn record(id: &str, channel: i64, minutes_ago: i64) -> MessageRecord {
    MessageRecord {
        message_id: id.into(),
        cookie_id: "acc".into(),
        chat_id: "chat-1".into(),
        item_id: "item-1".into(),
        sender_user_id: "buyer-1".into(),
        sender_name: "Alice".into(),
        text: format!("message {id}"),
        context_data: json!({ "original_message": format!("Message ID: #{id}") }),
        notification_chat_id: channel,
        status: MessageStatus::Pending,
        created_at: Utc::now() - Duration::minutes(minutes_ago),
        replied_at: None,
        reply_content: None,
        reply_source: None,
    }
}

async fn repo() -> MessageRepo {
    let pool = db::connect_memory().await.expect("db connect");
    MessageRepo::new(Arc::new(pool))
}

#[tokio::test]
async fn create_and_fetch_round_trip() {
    let repo = repo().await;
    let rec = record("acc_1_001", CHANNEL, 0);
    assert!(repo.create(&rec).await.expect("create"));

    let loaded = repo
        .get_by_id("acc_1_001")
        .await
        .expect("get")
        .expect("record exists");
    assert_eq!(loaded.message_id, rec.message_id);
    assert_eq!(loaded.text, rec.text);
    assert_eq!(loaded.status, MessageStatus::Pending);
    assert_eq!(loaded.notification_chat_id, CHANNEL);
    assert_eq!(loaded.original_notification(), Some("Message ID: #acc_1_001"));
    assert!(loaded.reply_source.is_none());
}

#[tokio::test]
async fn duplicate_id_is_not_inserted() {
    let repo = repo().await;
    let rec = record("dup_1_001", CHANNEL, 0);
    assert!(repo.create(&rec).await.expect("first insert"));
    assert!(!repo.create(&rec).await.expect("second insert reports collision"));
}

#[tokio::test]
async fn missing_record_is_none() {
    let repo = repo().await;
    assert!(repo.get_by_id("nope").await.expect("get").is_none());
}

#[tokio::test]
async fn next_sequence_counts_per_conversation() {
    let repo = repo().await;
    assert_eq!(repo.next_sequence("acc", "chat-1").await.expect("seq"), 1);
    repo.create(&record("a_1_001", CHANNEL, 0)).await.expect("create");
    repo.create(&record("a_1_002", CHANNEL, 0)).await.expect("create");
    assert_eq!(repo.next_sequence("acc", "chat-1").await.expect("seq"), 3);
    assert_eq!(repo.next_sequence("acc", "chat-2").await.expect("seq"), 1);
}

#[tokio::test]
async fn list_is_scoped_newest_first_and_limited() {
    let repo = repo().await;
    repo.create(&record("old", CHANNEL, 30)).await.expect("create");
    repo.create(&record("mid", CHANNEL, 20)).await.expect("create");
    repo.create(&record("new", CHANNEL, 10)).await.expect("create");
    repo.create(&record("other", 2002, 5)).await.expect("create");

    let all = repo.list_by_channel(CHANNEL, None, 10).await.expect("list");
    let ids: Vec<_> = all.iter().map(|r| r.message_id.as_str()).collect();
    assert_eq!(ids, ["new", "mid", "old"]);

    let limited = repo.list_by_channel(CHANNEL, None, 2).await.expect("list");
    assert_eq!(limited.len(), 2);

    repo.update_status("mid", MessageStatus::Ignored, None, ReplySource::Manual)
        .await
        .expect("update");
    let pending = repo
        .list_by_channel(CHANNEL, Some(MessageStatus::Pending), 10)
        .await
        .expect("list pending");
    let ids: Vec<_> = pending.iter().map(|r| r.message_id.as_str()).collect();
    assert_eq!(ids, ["new", "old"]);
}

#[tokio::test]
async fn update_status_only_moves_pending_records() {
    let repo = repo().await;
    repo.create(&record("m1", CHANNEL, 0)).await.expect("create");

    let first = repo
        .update_status("m1", MessageStatus::Replied, Some("hello"), ReplySource::Manual)
        .await
        .expect("first update");
    assert!(first);

    let second = repo
        .update_status("m1", MessageStatus::Ignored, None, ReplySource::Manual)
        .await
        .expect("second update");
    assert!(!second, "a terminal record must not change again");

    let loaded = repo.get_by_id("m1").await.expect("get").expect("exists");
    assert_eq!(loaded.status, MessageStatus::Replied);
    assert_eq!(loaded.reply_content.as_deref(), Some("hello"));
    assert_eq!(loaded.reply_source, Some(ReplySource::Manual));
    assert!(loaded.replied_at.is_some());
}

#[tokio::test]
async fn update_to_pending_is_rejected() {
    let repo = repo().await;
    repo.create(&record("m1", CHANNEL, 0)).await.expect("create");
    let err = repo
        .update_status("m1", MessageStatus::Pending, None, ReplySource::Manual)
        .await
        .expect_err("pending is not a target status");
    assert!(matches!(err, AppError::Validation(_)));
}

#[tokio::test]
async fn status_counts_per_channel() {
    let repo = repo().await;
    for id in ["a", "b", "c", "d"] {
        repo.create(&record(id, CHANNEL, 0)).await.expect("create");
    }
    repo.create(&record("x", 2002, 0)).await.expect("create");
    repo.update_status("a", MessageStatus::Replied, Some("ok"), ReplySource::Ai)
        .await
        .expect("update");
    repo.update_status("b", MessageStatus::Ignored, None, ReplySource::Batch)
        .await
        .expect("update");

    let counts = repo.status_counts(CHANNEL).await.expect("counts");
    assert_eq!(counts.pending, 2);
    assert_eq!(counts.replied, 1);
    assert_eq!(counts.ignored, 1);
    assert_eq!(counts.total(), 4);
}

#[tokio::test]
async fn search_matches_text_name_and_id_case_insensitively() {
    let repo = repo().await;
    let mut shipping = record("acc_1_001", CHANNEL, 3);
    shipping.text = "When will it SHIP?".into();
    let mut bob = record("acc_1_002", CHANNEL, 2);
    bob.sender_name = "Bob Shipley".into();
    let other = record("zzz_9_001", CHANNEL, 1);
    let mut foreign = record("acc_1_003", 2002, 0);
    foreign.text = "ship please".into();
    for r in [&shipping, &bob, &other, &foreign] {
        repo.create(r).await.expect("create");
    }

    let found = repo.search(CHANNEL, "ship").await.expect("search");
    let ids: Vec<_> = found.iter().map(|r| r.message_id.as_str()).collect();
    assert_eq!(ids, ["acc_1_002", "acc_1_001"]);

    let by_id = repo.search(CHANNEL, "ZZZ_9").await.expect("search");
    assert_eq!(by_id.len(), 1);
}

#[tokio::test]
async fn stats_window_aggregates() {
    let repo = repo().await;
    let mut alice = Vec::new();
    for i in 0..3 {
        let r = record(&format!("al_{i}"), CHANNEL, 60);
        repo.create(&r).await.expect("create");
        alice.push(r);
    }
    let mut bob = record("bob_0", CHANNEL, 30);
    bob.sender_name = "Bob".into();
    repo.create(&bob).await.expect("create");
    let mut stale = record("stale", CHANNEL, 0);
    stale.created_at = Utc::now() - Duration::days(40);
    repo.create(&stale).await.expect("create");

    repo.update_status("al_0", MessageStatus::Replied, Some("a"), ReplySource::Ai)
        .await
        .expect("update");
    repo.update_status("al_1", MessageStatus::Replied, Some("b"), ReplySource::Template)
        .await
        .expect("update");
    repo.update_status("bob_0", MessageStatus::Ignored, None, ReplySource::Batch)
        .await
        .expect("update");

    let stats = repo.stats_window(CHANNEL, 7).await.expect("stats");
    assert_eq!(stats.days, 7);
    assert_eq!(stats.counts.total(), 4, "records outside the window are excluded");
    assert_eq!(stats.counts.replied, 2);
    assert_eq!(stats.counts.pending, 1);
    assert_eq!(stats.counts.ignored, 1);
    assert!((stats.reply_rate - 50.0).abs() < f64::EPSILON);
    assert_eq!(stats.ai_replies, 1);
    assert_eq!(stats.template_replies, 1);
    assert_eq!(stats.manual_replies, 0);
    assert_eq!(stats.batch_ignored, 1);
    assert!(stats.avg_response_minutes >= 59.0);

    assert_eq!(stats.top_senders[0].sender_name, "Alice");
    assert_eq!(stats.top_senders[0].message_count, 3);
    assert!((stats.top_senders[0].reply_rate - 66.7).abs() < 1e-9);
    assert_eq!(stats.top_senders[1].sender_name, "Bob");
    assert!(!stats.daily.is_empty());
}

#[tokio::test]
async fn empty_stats_are_zero() {
    let repo = repo().await;
    let stats = repo.stats_window(CHANNEL, 30).await.expect("stats");
    assert_eq!(stats.counts.total(), 0);
    assert!(stats.reply_rate.abs() < f64::EPSILON);
    assert!(stats.top_senders.is_empty());
    assert!(stats.daily.is_empty());
}
