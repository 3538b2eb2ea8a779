//! Unit tests for the outstanding-call registry.

use serde_json::json;

use agent_switchboard::acp::correlator::PendingCalls;
use agent_switchboard::AppError;

#[tokio::test]
async fn resolve_delivers_exactly_once() {
    let pending = PendingCalls::new();
    let rx = pending.register(1).await.unwrap();

    assert!(pending.resolve(1, json!({ "result": "first" })).await);
    assert!(!pending.resolve(1, json!({ "result": "second" })).await);

    assert_eq!(rx.await.unwrap()["result"], "first");
    assert!(pending.is_empty().await);
}

#[tokio::test]
async fn duplicate_registration_is_refused() {
    let pending = PendingCalls::new();
    let _rx = pending.register(7).await.unwrap();
    assert!(matches!(pending.register(7).await, Err(AppError::Acp(_))));
    assert_eq!(pending.len().await, 1);
}

#[tokio::test]
async fn close_rejects_waiters_and_new_registrations() {
    let pending = PendingCalls::new();
    let a = pending.register(1).await.unwrap();
    let b = pending.register(2).await.unwrap();

    assert_eq!(pending.close("agent exited").await, 2);
    assert!(a.await.is_err());
    assert!(b.await.is_err());

    match pending.register(3).await {
        Err(AppError::NotConnected(reason)) => assert_eq!(reason, "agent exited"),
        other => panic!("expected NotConnected, got {other:?}"),
    }

    assert_eq!(pending.close("second reason").await, 0);
    assert_eq!(pending.close_reason().await.as_deref(), Some("agent exited"));
}

#[tokio::test]
async fn cancel_forgets_without_resolving() {
    let pending = PendingCalls::new();
    let rx = pending.register(4).await.unwrap();

    assert!(pending.cancel(4).await);
    assert!(!pending.cancel(4).await);
    assert!(!pending.resolve(4, json!({})).await);
    assert!(rx.await.is_err());
}
