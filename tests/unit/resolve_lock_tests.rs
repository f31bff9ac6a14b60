use reply_desk::operator::locks::ResolveLocks;
use reply_desk::AppError;

#[test]
fn second_acquire_is_busy_until_release() {
    let locks = ResolveLocks::new();
    let guard = locks.try_acquire("m1").expect("first acquire");
    assert_eq!(guard.message_id(), "m1");
    assert!(locks.is_held("m1"));

    let err = locks.try_acquire("m1").err().expect("second acquire must fail");
    assert!(matches!(err, AppError::Busy(_)));

    drop(guard);
    assert!(!locks.is_held("m1"));
    assert!(locks.try_acquire("m1").is_ok());
}

#[test]
fn different_ids_do_not_contend() {
    let locks = ResolveLocks::new();
    let _a = locks.try_acquire("a").expect("a");
    let _b = locks.try_acquire("b").expect("b");
    assert_eq!(locks.held_count(), 2);
}

#[test]
fn guard_releases_on_early_return() {
    fn fails(locks: &ResolveLocks) -> Result<(), AppError> {
        let _guard = locks.try_acquire("m1")?;
        Err(AppError::Validation("boom".into()))
    }

    let locks = ResolveLocks::new();
    assert!(fails(&locks).is_err());
    assert_eq!(locks.held_count(), 0);
}

#[test]
fn clones_share_state() {
    let locks = ResolveLocks::new();
    let other = locks.clone();
    let _guard = locks.try_acquire("m1").expect("acquire");
    assert!(other.try_acquire("m1").is_err());
}

#[tokio::test]
async fn concurrent_acquires_admit_exactly_one() {
    let locks = ResolveLocks::new();
    let barrier = std::sync::Arc::new(tokio::sync::Barrier::new(8));
    let mut handles = Vec::new();
    for _ in 0..8 {
        let locks = locks.clone();
        let barrier = std::sync::Arc::clone(&barrier);
        handles.push(tokio::spawn(async move {
            let guard = locks.try_acquire("m1");
            barrier.wait().await;
            guard.is_ok()
        }));
    }
    let mut winners = 0;
    for handle in handles {
        if handle.await.expect("task") {
            winners += 1;
        }
    }
    assert_eq!(winners, 1);
    assert_eq!(locks.held_count(), 0);
}
