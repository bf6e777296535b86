//! In-memory checkout repository for tests and single-process runs.
//!
//! The co-commit of `complete_session` is simulated by holding one lock
//! across the status write and the outbox append.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{Duration, Utc};
use tokio::sync::Mutex;
use uuid::Uuid;

use super::repository::{
    CheckoutRepository, OutboxEvent, RepositoryError, Result, STUCK_THRESHOLD_SECS,
};
use crate::domain::{CheckoutSession, CheckoutStatus};

#[derive(Default)]
struct State {
    sessions: HashMap<Uuid, CheckoutSession>,
    by_key: HashMap<String, Uuid>,
    events: Vec<OutboxEvent>,
    next_event_id: i64,
}

/// In-memory implementation of [`CheckoutRepository`].
#[derive(Default)]
pub struct MemoryCheckoutRepository {
    state: Mutex<State>,
    fail_complete: Mutex<bool>,
}

impl MemoryCheckoutRepository {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make `complete_session` fail, to exercise recovery paths.
    pub async fn set_fail_complete(&self, fail: bool) {
        *self.fail_complete.lock().await = fail;
    }

    /// Fetch a session by id.
    pub async fn session(&self, id: Uuid) -> Option<CheckoutSession> {
        self.state.lock().await.sessions.get(&id).cloned()
    }

    /// All outbox events, including processed ones.
    pub async fn events(&self) -> Vec<OutboxEvent> {
        self.state.lock().await.events.clone()
    }

    /// Outbox events for one aggregate.
    pub async fn events_for(&self, aggregate_id: Uuid) -> Vec<OutboxEvent> {
        self.state
            .lock()
            .await
            .events
            .iter()
            .filter(|e| e.aggregate_id == aggregate_id)
            .cloned()
            .collect()
    }

    /// Age a session's `updated_at` so it qualifies as stuck.
    pub async fn backdate_session(&self, id: Uuid, by_secs: i64) {
        if let Some(session) = self.state.lock().await.sessions.get_mut(&id) {
            session.updated_at = session.updated_at - Duration::seconds(by_secs);
        }
    }
}

#[async_trait]
impl CheckoutRepository for MemoryCheckoutRepository {
    async fn get_by_idempotency_key(&self, key: &str) -> Result<(Uuid, CheckoutStatus)> {
        let state = self.state.lock().await;
        let id = state
            .by_key
            .get(key)
            .ok_or(RepositoryError::IdempotencyKeyNotFound)?;
        let session = &state.sessions[id];
        Ok((session.id, session.status))
    }

    async fn create_session(&self, session: &CheckoutSession) -> Result<()> {
        let mut state = self.state.lock().await;
        if state.by_key.contains_key(&session.idempotency_key) {
            return Err(RepositoryError::DuplicateIdempotencyKey(
                session.idempotency_key.clone(),
            ));
        }
        state
            .by_key
            .insert(session.idempotency_key.clone(), session.id);
        state.sessions.insert(session.id, session.clone());
        Ok(())
    }

    async fn update_status(&self, id: Uuid, status: CheckoutStatus) -> Result<()> {
        let mut state = self.state.lock().await;
        let session = state
            .sessions
            .get_mut(&id)
            .ok_or(RepositoryError::SessionNotFound(id))?;
        session.status = status;
        session.updated_at = Utc::now();
        Ok(())
    }

    async fn set_reservation(
        &self,
        id: Uuid,
        status: CheckoutStatus,
        reservation_id: &str,
    ) -> Result<()> {
        let mut state = self.state.lock().await;
        let session = state
            .sessions
            .get_mut(&id)
            .ok_or(RepositoryError::SessionNotFound(id))?;
        session.status = status;
        session.inventory_reservation_id = Some(reservation_id.to_string());
        session.updated_at = Utc::now();
        Ok(())
    }

    async fn set_payment(&self, id: Uuid, status: CheckoutStatus, payment_id: &str) -> Result<()> {
        let mut state = self.state.lock().await;
        let session = state
            .sessions
            .get_mut(&id)
            .ok_or(RepositoryError::SessionNotFound(id))?;
        session.status = status;
        session.payment_id = Some(payment_id.to_string());
        session.updated_at = Utc::now();
        Ok(())
    }

    async fn complete_session(
        &self,
        id: Uuid,
        payload: serde_json::Value,
        status: CheckoutStatus,
    ) -> Result<()> {
        if *self.fail_complete.lock().await {
            return Err(RepositoryError::Database(sqlx::Error::PoolClosed));
        }

        let mut state = self.state.lock().await;
        let session = state
            .sessions
            .get_mut(&id)
            .ok_or(RepositoryError::SessionNotFound(id))?;
        session.status = status;
        session.updated_at = Utc::now();

        state.next_event_id += 1;
        let event = OutboxEvent {
            id: state.next_event_id,
            aggregate_id: id,
            event_type: crate::domain::checkout::CHECKOUT_COMPLETED_EVENT.to_string(),
            payload,
            created_at: Utc::now(),
            processed_at: None,
        };
        state.events.push(event);
        Ok(())
    }

    async fn get_unprocessed_events(&self, limit: i64) -> Result<Vec<OutboxEvent>> {
        let state = self.state.lock().await;
        Ok(state
            .events
            .iter()
            .filter(|e| e.processed_at.is_none())
            .take(limit as usize)
            .cloned()
            .collect())
    }

    async fn mark_event_processed(&self, event_id: i64) -> Result<()> {
        let mut state = self.state.lock().await;
        if let Some(event) = state.events.iter_mut().find(|e| e.id == event_id) {
            event.processed_at = Some(Utc::now());
        }
        Ok(())
    }

    async fn get_stuck_sessions(&self) -> Result<Vec<CheckoutSession>> {
        let cutoff = Utc::now() - Duration::seconds(STUCK_THRESHOLD_SECS);
        let state = self.state.lock().await;
        Ok(state
            .sessions
            .values()
            .filter(|s| {
                s.status == CheckoutStatus::PaymentCompleted
                    && s.updated_at < cutoff
                    && !state.events.iter().any(|e| e.aggregate_id == s.id)
            })
            .cloned()
            .collect())
    }
}
