use std::time::Duration;

use reply_desk::ai::AiReply;
use reply_desk::models::conversation::Intent;
use reply_desk::operator::reply_state::ReplyStates;
use reply_desk::operator::suggestions::SuggestionCache;

#[tokio::test(start_paused = true)]
async fn take_consumes_target() {
    let states = ReplyStates::new(Duration::from_secs(60));
    states.begin(1, "m1");
    assert_eq!(states.peek(1).as_deref(), Some("m1"));
    assert_eq!(states.take(1).as_deref(), Some("m1"));
    assert_eq!(states.take(1), None);
}

#[tokio::test(start_paused = true)]
async fn new_target_replaces_previous() {
    let states = ReplyStates::new(Duration::from_secs(60));
    states.begin(1, "m1");
    states.begin(1, "m2");
    assert_eq!(states.take(1).as_deref(), Some("m2"));
}

#[tokio::test(start_paused = true)]
async fn channels_are_independent() {
    let states = ReplyStates::new(Duration::from_secs(60));
    states.begin(1, "m1");
    states.begin(2, "m2");
    assert_eq!(states.cancel(1).as_deref(), Some("m1"));
    assert_eq!(states.peek(2).as_deref(), Some("m2"));
}

#[tokio::test(start_paused = true)]
async fn expired_target_is_absent() {
    let states = ReplyStates::new(Duration::from_secs(60));
    states.begin(1, "m1");
    tokio::time::advance(Duration::from_secs(61)).await;
    assert_eq!(states.peek(1), None);
    assert_eq!(states.take(1), None);
}

#[tokio::test(start_paused = true)]
async fn cancel_without_state_is_none() {
    let states = ReplyStates::new(Duration::from_secs(60));
    assert_eq!(states.cancel(1), None);
}

#[tokio::test(start_paused = true)]
async fn purge_drops_only_expired() {
    let states = ReplyStates::new(Duration::from_secs(60));
    states.begin(1, "old");
    tokio::time::advance(Duration::from_secs(45)).await;
    states.begin(2, "fresh");
    tokio::time::advance(Duration::from_secs(20)).await;
    assert_eq!(states.len(), 2);
    assert_eq!(states.purge_expired(), 1);
    assert_eq!(states.len(), 1);
    assert_eq!(states.peek(1), None);
    assert_eq!(states.peek(2).as_deref(), Some("fresh"));
}

#[tokio::test(start_paused = true)]
async fn suggestions_expire_and_can_be_discarded() {
    let cache = SuggestionCache::new(Duration::from_secs(30));
    let reply = AiReply {
        text: "Yes, it is available.".into(),
        intent: Intent::Default,
        refused: false,
    };
    cache.store("m1", reply.clone());
    cache.store("m2", reply.clone());
    assert_eq!(cache.get("m1"), Some(reply));

    cache.discard("m1");
    assert_eq!(cache.get("m1"), None);

    tokio::time::advance(Duration::from_secs(31)).await;
    assert_eq!(cache.get("m2"), None);
    assert_eq!(cache.purge_expired(), 1);
    assert!(cache.is_empty());
}
