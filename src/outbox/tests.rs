use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use uuid::Uuid;

use super::*;
use crate::bus::MockEventBus;
use crate::checkout::{MemoryCheckoutRepository, RepositoryError};
use crate::config::PollerConfig;
use crate::domain::{CartSnapshot, CartSnapshotItem, CheckoutSession, CheckoutStatus};

fn snapshot() -> CartSnapshot {
    CartSnapshot {
        items: vec![CartSnapshotItem {
            product_id: 1,
            product_name: "Widget".to_string(),
            quantity: 2,
            unit_price: 29.99,
            subtotal: 59.98,
        }],
        total_amount: 59.98,
        currency: "USD".to_string(),
        captured_at: Utc::now(),
    }
}

fn session(status: CheckoutStatus, cart_snapshot: serde_json::Value) -> CheckoutSession {
    CheckoutSession {
        id: Uuid::new_v4(),
        user_id: "123".to_string(),
        cart_snapshot,
        status,
        idempotency_key: Uuid::new_v4().to_string(),
        inventory_reservation_id: None,
        payment_id: Some("pay-1".to_string()),
        total_amount: "59.98".to_string(),
        currency: "USD".to_string(),
        created_at: Utc::now(),
        updated_at: Utc::now(),
    }
}

fn poller(
    repo: Arc<MemoryCheckoutRepository>,
    bus: Arc<MockEventBus>,
) -> OutboxPoller {
    OutboxPoller::new(repo, bus, PollerConfig::default())
}

/// Create a completed session with its co-committed event in the repo.
async fn completed_session(repo: &MemoryCheckoutRepository) -> Uuid {
    let s = session(
        CheckoutStatus::PaymentCompleted,
        serde_json::to_value(snapshot()).unwrap(),
    );
    let id = s.id;
    repo.create_session(&s).await.unwrap();
    repo.complete_session(id, serde_json::json!({"checkout_id": id.to_string()}), CheckoutStatus::Completed)
        .await
        .unwrap();
    id
}

#[tokio::test]
async fn publishes_unprocessed_events_and_marks_them() {
    let repo = Arc::new(MemoryCheckoutRepository::new());
    let bus = Arc::new(MockEventBus::new());
    let id = completed_session(&repo).await;

    let published = poller(repo.clone(), bus.clone()).process_unpublished().await;
    assert_eq!(published, 1);

    let messages = bus.published().await;
    assert_eq!(messages.len(), 1);
    assert_eq!(messages[0].key, id.to_string());
    assert_eq!(messages[0].event_type, "CheckoutCompleted");

    let body: serde_json::Value = serde_json::from_slice(&messages[0].payload).unwrap();
    assert_eq!(body["checkout_id"], id.to_string());

    // Nothing left to publish.
    assert!(repo.get_unprocessed_events(100).await.unwrap().is_empty());
}

#[tokio::test]
async fn publish_failure_leaves_event_for_retry() {
    let repo = Arc::new(MemoryCheckoutRepository::new());
    let bus = Arc::new(MockEventBus::new());
    completed_session(&repo).await;

    bus.set_fail_on_publish(true).await;
    let poller = poller(repo.clone(), bus.clone());
    assert_eq!(poller.process_unpublished().await, 0);
    assert_eq!(repo.get_unprocessed_events(100).await.unwrap().len(), 1);

    // Next tick succeeds.
    bus.set_fail_on_publish(false).await;
    assert_eq!(poller.process_unpublished().await, 1);
    assert!(repo.get_unprocessed_events(100).await.unwrap().is_empty());
}

#[tokio::test]
async fn batch_survives_individual_failures() {
    let repo = Arc::new(MemoryCheckoutRepository::new());
    let bus = Arc::new(MockEventBus::new());
    completed_session(&repo).await;
    completed_session(&repo).await;
    completed_session(&repo).await;

    // All fail this tick, all remain, none are lost.
    bus.set_fail_on_publish(true).await;
    let poller = poller(repo.clone(), bus.clone());
    assert_eq!(poller.process_unpublished().await, 0);
    assert_eq!(repo.get_unprocessed_events(100).await.unwrap().len(), 3);

    bus.set_fail_on_publish(false).await;
    assert_eq!(poller.process_unpublished().await, 3);
}

#[tokio::test]
async fn recovers_stuck_sessions_with_the_missing_co_commit() {
    let repo = Arc::new(MemoryCheckoutRepository::new());
    let bus = Arc::new(MockEventBus::new());

    // A session that paid but never co-committed, older than the threshold.
    let s = session(
        CheckoutStatus::PaymentCompleted,
        serde_json::to_value(snapshot()).unwrap(),
    );
    let id = s.id;
    repo.create_session(&s).await.unwrap();
    repo.backdate_session(id, 6 * 60).await;

    let recovered = poller(repo.clone(), bus.clone()).recover_stuck().await;
    assert_eq!(recovered, 1);

    let session = repo.session(id).await.unwrap();
    assert_eq!(session.status, CheckoutStatus::Completed);

    let events = repo.events_for(id).await;
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].payload["user_id"], "123");
    assert_eq!(events[0].payload["currency"], "USD");

    // Recovered once, not again.
    assert!(repo.get_stuck_sessions().await.unwrap().is_empty());
}

#[tokio::test]
async fn fresh_payment_completed_sessions_are_not_stuck() {
    let repo = Arc::new(MemoryCheckoutRepository::new());
    let bus = Arc::new(MockEventBus::new());

    let s = session(
        CheckoutStatus::PaymentCompleted,
        serde_json::to_value(snapshot()).unwrap(),
    );
    repo.create_session(&s).await.unwrap();

    // Younger than the stuck threshold: leave it alone, the coordinator may
    // still be running.
    assert_eq!(poller(repo.clone(), bus).recover_stuck().await, 0);
    assert_eq!(
        repo.session(s.id).await.unwrap().status,
        CheckoutStatus::PaymentCompleted
    );
}

#[tokio::test]
async fn malformed_snapshot_is_skipped_not_fatal() {
    let repo = Arc::new(MemoryCheckoutRepository::new());
    let bus = Arc::new(MockEventBus::new());

    let broken = session(
        CheckoutStatus::PaymentCompleted,
        serde_json::json!("not a snapshot"),
    );
    let healthy = session(
        CheckoutStatus::PaymentCompleted,
        serde_json::to_value(snapshot()).unwrap(),
    );
    repo.create_session(&broken).await.unwrap();
    repo.create_session(&healthy).await.unwrap();
    repo.backdate_session(broken.id, 6 * 60).await;
    repo.backdate_session(healthy.id, 6 * 60).await;

    // The broken one is skipped; the sweep still recovers the healthy one.
    let recovered = poller(repo.clone(), bus).recover_stuck().await;
    assert_eq!(recovered, 1);

    assert_eq!(
        repo.session(broken.id).await.unwrap().status,
        CheckoutStatus::PaymentCompleted
    );
    assert_eq!(
        repo.session(healthy.id).await.unwrap().status,
        CheckoutStatus::Completed
    );
}

#[tokio::test]
async fn failed_co_commit_retries_on_the_next_tick() {
    let repo = Arc::new(MemoryCheckoutRepository::new());
    let bus = Arc::new(MockEventBus::new());

    let s = session(
        CheckoutStatus::PaymentCompleted,
        serde_json::to_value(snapshot()).unwrap(),
    );
    repo.create_session(&s).await.unwrap();
    repo.backdate_session(s.id, 6 * 60).await;

    repo.set_fail_complete(true).await;
    let poller = poller(repo.clone(), bus);
    assert_eq!(poller.recover_stuck().await, 0);

    repo.set_fail_complete(false).await;
    assert_eq!(poller.recover_stuck().await, 1);
    assert_eq!(
        repo.session(s.id).await.unwrap().status,
        CheckoutStatus::Completed
    );
}

#[tokio::test]
async fn repository_errors_do_not_panic_the_tick() {
    /// Repository wrapper that fails reads.
    struct FailingRepo;

    #[async_trait::async_trait]
    impl crate::checkout::CheckoutRepository for FailingRepo {
        async fn get_by_idempotency_key(
            &self,
            _key: &str,
        ) -> crate::checkout::repository::Result<(Uuid, CheckoutStatus)> {
            Err(RepositoryError::Database(sqlx::Error::PoolClosed))
        }
        async fn create_session(
            &self,
            _session: &CheckoutSession,
        ) -> crate::checkout::repository::Result<()> {
            Err(RepositoryError::Database(sqlx::Error::PoolClosed))
        }
        async fn update_status(
            &self,
            id: Uuid,
            _status: CheckoutStatus,
        ) -> crate::checkout::repository::Result<()> {
            Err(RepositoryError::SessionNotFound(id))
        }
        async fn set_reservation(
            &self,
            id: Uuid,
            _status: CheckoutStatus,
            _reservation_id: &str,
        ) -> crate::checkout::repository::Result<()> {
            Err(RepositoryError::SessionNotFound(id))
        }
        async fn set_payment(
            &self,
            id: Uuid,
            _status: CheckoutStatus,
            _payment_id: &str,
        ) -> crate::checkout::repository::Result<()> {
            Err(RepositoryError::SessionNotFound(id))
        }
        async fn complete_session(
            &self,
            id: Uuid,
            _payload: serde_json::Value,
            _status: CheckoutStatus,
        ) -> crate::checkout::repository::Result<()> {
            Err(RepositoryError::SessionNotFound(id))
        }
        async fn get_unprocessed_events(
            &self,
            _limit: i64,
        ) -> crate::checkout::repository::Result<Vec<crate::checkout::OutboxEvent>> {
            Err(RepositoryError::Database(sqlx::Error::PoolClosed))
        }
        async fn mark_event_processed(
            &self,
            _event_id: i64,
        ) -> crate::checkout::repository::Result<()> {
            Err(RepositoryError::Database(sqlx::Error::PoolClosed))
        }
        async fn get_stuck_sessions(
            &self,
        ) -> crate::checkout::repository::Result<Vec<CheckoutSession>> {
            Err(RepositoryError::Database(sqlx::Error::PoolClosed))
        }
    }

    let poller = OutboxPoller::new(
        Arc::new(FailingRepo),
        Arc::new(MockEventBus::new()),
        PollerConfig::default(),
    );

    assert_eq!(poller.process_unpublished().await, 0);
    assert_eq!(poller.recover_stuck().await, 0);
}

#[tokio::test]
async fn poller_task_runs_both_ticks_and_stops() {
    let repo = Arc::new(MemoryCheckoutRepository::new());
    let bus = Arc::new(MockEventBus::new());
    completed_session(&repo).await;

    let stuck = session(
        CheckoutStatus::PaymentCompleted,
        serde_json::to_value(snapshot()).unwrap(),
    );
    repo.create_session(&stuck).await.unwrap();
    repo.backdate_session(stuck.id, 6 * 60).await;

    let poller = Arc::new(OutboxPoller::new(
        repo.clone(),
        bus.clone(),
        PollerConfig {
            event_tick_ms: 10,
            recovery_tick_ms: 10,
            batch_size: 100,
        },
    ));
    let handle = spawn_poller(poller);

    tokio::time::sleep(Duration::from_millis(100)).await;
    handle.stop();

    // The pre-existing event went out, and the stuck session was recovered
    // and its synthesized event published too.
    assert!(bus.published_count().await >= 2);
    assert_eq!(
        repo.session(stuck.id).await.unwrap().status,
        CheckoutStatus::Completed
    );
}
