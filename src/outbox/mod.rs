//! Outbox event fan-out and stuck-session recovery.
//!
//! Two periodic tasks share one cooperative loop:
//!
//! - **Event tick**: read unpublished outbox rows, publish each to the bus
//!   keyed by its aggregate id, and stamp `processed_at` on success. A row
//!   that fails to publish keeps `processed_at = NULL` and is retried on the
//!   next tick, so delivery is at-least-once.
//! - **Recovery tick**: find sessions that reached `PAYMENT_COMPLETED` but
//!   lost their outbox row (a crash between the payment write and the
//!   co-commit), rebuild the event payload from the stored cart snapshot,
//!   and re-run the co-commit.

use std::sync::Arc;

use tokio::sync::watch;
use tracing::{debug, error, info, warn};

use crate::bus::{BusMessage, EventBus};
use crate::checkout::{CheckoutRepository, OutboxEvent};
use crate::config::PollerConfig;
use crate::domain::{CartSnapshot, CheckoutCompleted, CheckoutSession, CheckoutStatus};

/// Publishes outbox events and repairs stuck sessions.
pub struct OutboxPoller {
    repo: Arc<dyn CheckoutRepository>,
    bus: Arc<dyn EventBus>,
    config: PollerConfig,
}

impl OutboxPoller {
    pub fn new(
        repo: Arc<dyn CheckoutRepository>,
        bus: Arc<dyn EventBus>,
        config: PollerConfig,
    ) -> Self {
        Self { repo, bus, config }
    }

    /// Run both ticks until cancelled.
    pub async fn run(&self, mut cancel_rx: watch::Receiver<bool>) {
        let mut event_tick = tokio::time::interval(self.config.event_tick());
        let mut recovery_tick = tokio::time::interval(self.config.recovery_tick());

        info!(
            event_tick_ms = self.config.event_tick_ms,
            recovery_tick_ms = self.config.recovery_tick_ms,
            "Outbox poller started"
        );

        loop {
            tokio::select! {
                _ = event_tick.tick() => {
                    self.process_unpublished().await;
                }
                _ = recovery_tick.tick() => {
                    self.recover_stuck().await;
                }
                _ = cancel_rx.changed() => {
                    if *cancel_rx.borrow() {
                        info!("Outbox poller stopped");
                        break;
                    }
                }
            }
        }
    }

    /// One event tick. Returns the number of events published and marked.
    ///
    /// Per-event failures never abort the batch: a poisoned event only costs
    /// itself, everything after it still goes out.
    pub async fn process_unpublished(&self) -> usize {
        let events = match self.repo.get_unprocessed_events(self.config.batch_size).await {
            Ok(events) => events,
            Err(e) => {
                error!(error = %e, "Failed to fetch unprocessed events");
                return 0;
            }
        };

        let mut published = 0;
        for event in events {
            if let Err(e) = self.publish_event(&event).await {
                warn!(event_id = event.id, error = %e, "Failed to publish event, will retry");
                continue;
            }

            if let Err(e) = self.repo.mark_event_processed(event.id).await {
                // The event went out but the stamp failed; the next tick
                // republishes it. Consumers are idempotent, so duplicates
                // are harmless.
                error!(event_id = event.id, error = %e, "Failed to mark event processed");
                continue;
            }

            published += 1;
            debug!(event_id = event.id, aggregate_id = %event.aggregate_id, "Event published");
        }

        published
    }

    /// One recovery tick. Returns the number of sessions repaired.
    pub async fn recover_stuck(&self) -> usize {
        let sessions = match self.repo.get_stuck_sessions().await {
            Ok(sessions) => sessions,
            Err(e) => {
                error!(error = %e, "Failed to fetch stuck sessions");
                return 0;
            }
        };

        let mut recovered = 0;
        for session in sessions {
            info!(checkout_id = %session.id, "Recovering stuck session");

            match self.recover_session(&session).await {
                Ok(()) => {
                    recovered += 1;
                    info!(checkout_id = %session.id, "Session recovered");
                }
                Err(e) => {
                    // Skip and retry on the next tick; the sweep continues.
                    warn!(checkout_id = %session.id, error = %e, "Failed to recover session");
                }
            }
        }

        recovered
    }

    async fn publish_event(&self, event: &OutboxEvent) -> Result<(), crate::bus::BusError> {
        let payload = serde_json::to_vec(&event.payload)
            .map_err(|e| crate::bus::BusError::Publish(format!("payload encode failed: {e}")))?;

        self.bus
            .publish(BusMessage {
                key: event.aggregate_id.to_string(),
                event_type: event.event_type.clone(),
                payload,
            })
            .await
    }

    /// Re-run the missing co-commit for one stuck session, rebuilding the
    /// payload the coordinator would have written. `completed_at` comes from
    /// the session's `updated_at` so repeated recoveries are stable.
    async fn recover_session(
        &self,
        session: &CheckoutSession,
    ) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        let snapshot: CartSnapshot = serde_json::from_value(session.cart_snapshot.clone())?;

        let event = CheckoutCompleted {
            checkout_id: session.id.to_string(),
            user_id: session.user_id.clone(),
            items: snapshot.items,
            total_amount: snapshot.total_amount,
            currency: snapshot.currency,
            completed_at: session.updated_at,
        };
        let payload = serde_json::to_value(&event)?;

        self.repo
            .complete_session(session.id, payload, CheckoutStatus::Completed)
            .await?;
        Ok(())
    }
}

/// Handle to a running poller task.
pub struct PollerHandle {
    cancel: watch::Sender<bool>,
}

impl PollerHandle {
    /// Signal the poller to stop.
    pub fn stop(&self) {
        let _ = self.cancel.send(true);
    }
}

/// Spawn the poller on a background task.
///
/// Returns a handle that can be used to stop the task.
pub fn spawn_poller(poller: Arc<OutboxPoller>) -> PollerHandle {
    let (cancel_tx, cancel_rx) = watch::channel(false);

    tokio::spawn(async move {
        poller.run(cancel_rx).await;
    });

    PollerHandle { cancel: cancel_tx }
}

#[cfg(test)]
mod tests;
