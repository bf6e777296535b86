//! Checkout saga coordination.
//!
//! `CheckoutCoordinator` drives one checkout through its state machine:
//!
//! ```text
//! Initiated -> InventoryReserved -> PaymentPending -> PaymentCompleted -> Completed
//!     \              \                   \                  \
//!      +-> Failed     +-> Failed          +-> Failed         +-> Failed
//! ```
//!
//! Each step persists its state before moving on, every downstream call
//! carries a deadline, and failures after the reservation compensate by
//! releasing the hold. The terminal write co-commits the session status with
//! the outbox event so a completed checkout can never lose its event.

pub mod memory;
pub mod repository;

pub use memory::MemoryCheckoutRepository;
pub use repository::{
    CheckoutRepository, OutboxEvent, PostgresCheckoutRepository, RepositoryError,
};

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::cart::{CartError, CartService};
use crate::clients::{CatalogError, ChargeOutcome, PaymentGateway, ProductCatalog};
use crate::domain::{
    CartSnapshot, CartSnapshotItem, CheckoutCompleted, CheckoutSession, CheckoutStatus,
    Reservation, ReservationItem,
};
use crate::inventory::{InventoryError, InventoryStore};

/// Result type for checkout operations.
pub type Result<T> = std::result::Result<T, CheckoutError>;

/// Errors from checkout coordination.
///
/// Failure variants that occur after a session exists carry the checkout id,
/// so callers always learn which session ended up `FAILED`.
#[derive(Debug, thiserror::Error)]
pub enum CheckoutError {
    #[error("cart is empty, nothing to check out")]
    EmptyCart,

    #[error("illegal checkout status transition: {from} -> {to}")]
    IllegalTransition {
        from: CheckoutStatus,
        to: CheckoutStatus,
    },

    #[error("inventory reservation failed for checkout {checkout_id}: {source}")]
    ReservationFailed {
        checkout_id: Uuid,
        #[source]
        source: InventoryError,
    },

    #[error("payment failed for checkout {checkout_id}: {reason}")]
    PaymentFailed { checkout_id: Uuid, reason: String },

    #[error(
        "payment failed for checkout {checkout_id} ({reason}) and releasing \
         reservation {reservation_id} also failed: {release_error}"
    )]
    CompensationFailed {
        checkout_id: Uuid,
        reason: String,
        reservation_id: Uuid,
        release_error: String,
    },

    #[error("product lookup failed: {0}")]
    Catalog(#[from] CatalogError),

    #[error("cart fetch failed: {0}")]
    Cart(#[from] CartError),

    #[error("repository error: {0}")]
    Repository(#[from] RepositoryError),

    #[error("downstream call timed out after {0:?}")]
    DeadlineExceeded(Duration),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// What `initiate_checkout` hands back: the session and where it ended up.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CheckoutOutcome {
    pub checkout_id: Uuid,
    pub status: CheckoutStatus,
}

/// Drives checkouts across the cart, catalog, inventory, and payment
/// collaborators, persisting progress in the checkout repository.
pub struct CheckoutCoordinator {
    repo: Arc<dyn CheckoutRepository>,
    carts: Arc<CartService>,
    catalog: Arc<dyn ProductCatalog>,
    inventory: Arc<dyn InventoryStore>,
    payments: Arc<dyn PaymentGateway>,
    call_timeout: Duration,
}

impl CheckoutCoordinator {
    pub fn new(
        repo: Arc<dyn CheckoutRepository>,
        carts: Arc<CartService>,
        catalog: Arc<dyn ProductCatalog>,
        inventory: Arc<dyn InventoryStore>,
        payments: Arc<dyn PaymentGateway>,
        call_timeout: Duration,
    ) -> Self {
        Self {
            repo,
            carts,
            catalog,
            inventory,
            payments,
            call_timeout,
        }
    }

    /// Run one checkout to a terminal state.
    ///
    /// Replays with a known idempotency key return the stored outcome
    /// immediately, whatever state it is in, with no further side effects.
    pub async fn initiate_checkout(
        &self,
        user_id: i64,
        idempotency_key: &str,
    ) -> Result<CheckoutOutcome> {
        // Idempotency probe. A hit short-circuits the whole saga.
        match self.repo.get_by_idempotency_key(idempotency_key).await {
            Ok((checkout_id, status)) => {
                info!(
                    idempotency_key = %idempotency_key,
                    checkout_id = %checkout_id,
                    status = %status,
                    "Duplicate checkout request, returning stored outcome"
                );
                return Ok(CheckoutOutcome {
                    checkout_id,
                    status,
                });
            }
            Err(RepositoryError::IdempotencyKeyNotFound) => {}
            Err(e) => return Err(e.into()),
        }

        let user_id = user_id.to_string();
        let snapshot = self.build_snapshot(&user_id).await?;

        let session = CheckoutSession {
            id: Uuid::new_v4(),
            user_id: user_id.clone(),
            cart_snapshot: serde_json::to_value(&snapshot)?,
            status: CheckoutStatus::Initiated,
            idempotency_key: idempotency_key.to_string(),
            inventory_reservation_id: None,
            payment_id: None,
            total_amount: format!("{:.2}", snapshot.total_amount),
            currency: snapshot.currency.clone(),
            created_at: Utc::now(),
            updated_at: Utc::now(),
        };
        self.repo.create_session(&session).await?;

        info!(checkout_id = %session.id, user_id = %user_id, "Checkout session created");

        let reservation = self.reserve_inventory(&session, &snapshot).await?;
        self.process_payment(&session, &reservation).await?;
        self.complete(&session, &snapshot).await?;

        info!(checkout_id = %session.id, "Checkout completed");
        Ok(CheckoutOutcome {
            checkout_id: session.id,
            status: CheckoutStatus::Completed,
        })
    }

    /// Fetch the cart and freeze current catalog prices into a snapshot.
    async fn build_snapshot(&self, user_id: &str) -> Result<CartSnapshot> {
        let cart = self
            .with_deadline(self.carts.get_cart(user_id))
            .await??;

        if cart.items.is_empty() {
            return Err(CheckoutError::EmptyCart);
        }

        let mut items = Vec::with_capacity(cart.items.len());
        let mut total_amount = 0.0;

        for item in &cart.items {
            let product = self
                .with_deadline(self.catalog.get_product(item.product_id))
                .await??;

            let subtotal = product.price * f64::from(item.quantity);
            items.push(CartSnapshotItem {
                product_id: item.product_id,
                product_name: product.name,
                quantity: item.quantity,
                unit_price: product.price,
                subtotal,
            });
            total_amount += subtotal;
        }

        Ok(CartSnapshot {
            items,
            total_amount,
            currency: "USD".to_string(),
            captured_at: Utc::now(),
        })
    }

    /// Place the inventory hold. On refusal the session goes `FAILED` and the
    /// refusal is surfaced with the checkout id attached.
    async fn reserve_inventory(
        &self,
        session: &CheckoutSession,
        snapshot: &CartSnapshot,
    ) -> Result<Reservation> {
        Self::ensure_transition(CheckoutStatus::Initiated, CheckoutStatus::InventoryReserved)?;

        let items: Vec<ReservationItem> = snapshot
            .items
            .iter()
            .map(|i| ReservationItem {
                product_id: i.product_id,
                quantity: i.quantity,
            })
            .collect();

        let reserved = self
            .with_deadline(self.inventory.reserve(&session.id.to_string(), items))
            .await?;

        match reserved {
            Ok(reservation) => {
                self.repo
                    .set_reservation(
                        session.id,
                        CheckoutStatus::InventoryReserved,
                        &reservation.id.to_string(),
                    )
                    .await?;
                Ok(reservation)
            }
            Err(e) => {
                self.mark_failed(session.id).await;
                Err(CheckoutError::ReservationFailed {
                    checkout_id: session.id,
                    source: e,
                })
            }
        }
    }

    /// Charge the payment. Refusals and transport failures both fail the
    /// session and release the hold; if the release itself fails, the error
    /// says so explicitly.
    async fn process_payment(
        &self,
        session: &CheckoutSession,
        reservation: &Reservation,
    ) -> Result<()> {
        Self::ensure_transition(
            CheckoutStatus::InventoryReserved,
            CheckoutStatus::PaymentPending,
        )?;
        self.repo
            .update_status(session.id, CheckoutStatus::PaymentPending)
            .await?;

        let charge = self
            .with_deadline(
                self.payments
                    .charge(&session.id.to_string(), &session.total_amount),
            )
            .await;

        let failure_reason = match charge {
            Ok(Ok(ChargeOutcome::Approved { payment_id })) => {
                Self::ensure_transition(
                    CheckoutStatus::PaymentPending,
                    CheckoutStatus::PaymentCompleted,
                )?;
                self.repo
                    .set_payment(session.id, CheckoutStatus::PaymentCompleted, &payment_id)
                    .await?;
                return Ok(());
            }
            Ok(Ok(ChargeOutcome::Refused { reason })) => format!("payment refused: {reason}"),
            Ok(Err(e)) => e.to_string(),
            Err(CheckoutError::DeadlineExceeded(d)) => {
                format!("payment call timed out after {d:?}")
            }
            Err(e) => return Err(e),
        };

        warn!(
            checkout_id = %session.id,
            reason = %failure_reason,
            "Payment failed, compensating"
        );

        self.repo
            .update_status(session.id, CheckoutStatus::Failed)
            .await?;

        // Compensation: give the hold back. A failed release is a distinct,
        // louder error than the payment failure alone.
        let released = self
            .with_deadline(self.inventory.release(reservation.id))
            .await;
        match released {
            Ok(Ok(())) => Err(CheckoutError::PaymentFailed {
                checkout_id: session.id,
                reason: failure_reason,
            }),
            Ok(Err(e)) => Err(CheckoutError::CompensationFailed {
                checkout_id: session.id,
                reason: failure_reason,
                reservation_id: reservation.id,
                release_error: e.to_string(),
            }),
            Err(e) => Err(CheckoutError::CompensationFailed {
                checkout_id: session.id,
                reason: failure_reason,
                reservation_id: reservation.id,
                release_error: e.to_string(),
            }),
        }
    }

    /// Terminal step: co-commit status `COMPLETED` with the outbox event.
    async fn complete(&self, session: &CheckoutSession, snapshot: &CartSnapshot) -> Result<()> {
        Self::ensure_transition(CheckoutStatus::PaymentCompleted, CheckoutStatus::Completed)?;

        let event = CheckoutCompleted {
            checkout_id: session.id.to_string(),
            user_id: session.user_id.clone(),
            items: snapshot.items.clone(),
            total_amount: snapshot.total_amount,
            currency: snapshot.currency.clone(),
            completed_at: Utc::now(),
        };
        let payload = serde_json::to_value(&event)?;

        self.repo
            .complete_session(session.id, payload, CheckoutStatus::Completed)
            .await?;
        Ok(())
    }

    /// Best-effort status write on a failure path. The primary error is the
    /// one worth surfacing; a failed failure-write is only logged.
    async fn mark_failed(&self, checkout_id: Uuid) {
        if let Err(e) = self
            .repo
            .update_status(checkout_id, CheckoutStatus::Failed)
            .await
        {
            error!(checkout_id = %checkout_id, error = %e, "Failed to mark session FAILED");
        }
    }

    /// Reject transitions the state machine does not allow. A hit here means
    /// a coordinator bug or an out-of-band writer, both of which must be loud.
    fn ensure_transition(from: CheckoutStatus, to: CheckoutStatus) -> Result<()> {
        if !from.can_transition_to(to) {
            return Err(CheckoutError::IllegalTransition { from, to });
        }
        Ok(())
    }

    /// Apply the per-downstream-call deadline.
    async fn with_deadline<T>(&self, fut: impl Future<Output = T>) -> Result<T> {
        tokio::time::timeout(self.call_timeout, fut)
            .await
            .map_err(|_| CheckoutError::DeadlineExceeded(self.call_timeout))
    }
}
