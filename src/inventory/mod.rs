//! In-memory inventory with timed reservations.
//!
//! Stock is held per product as `(total, reserved)`. A reservation is a
//! short-lived hold taken during checkout: it auto-expires after
//! [`RESERVATION_TTL`] unless confirmed (payment succeeded, stock leaves the
//! building) or released (payment failed, hold returns to the pool).
//!
//! All state changes are serialized under one exclusive lock; reads take a
//! shared lock. The background sweeper competes for the same exclusive lock,
//! so expiry and reservation can never interleave mid-operation.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::RwLock;
use tracing::{debug, info};
use uuid::Uuid;

use crate::domain::{Reservation, ReservationItem, ReservationStatus, StockInfo};

/// How long a reservation is valid before auto-expiring.
pub const RESERVATION_TTL: Duration = Duration::from_secs(5 * 60);

/// How often the background sweeper runs.
pub const SWEEP_INTERVAL: Duration = Duration::from_secs(30);

/// Result type for inventory operations.
pub type Result<T> = std::result::Result<T, InventoryError>;

/// Errors from inventory operations.
#[derive(Debug, thiserror::Error)]
pub enum InventoryError {
    #[error("product not found: {0}")]
    ProductNotFound(i64),

    #[error("insufficient stock for product {product_id}: requested {requested}, available {available}")]
    InsufficientStock {
        product_id: i64,
        requested: i32,
        available: i32,
    },

    #[error("reservation not found: {0}")]
    ReservationNotFound(Uuid),

    #[error("reservation expired: {0}")]
    ReservationExpired(Uuid),

    #[error("reservation {id} is {status:?}, expected reserved")]
    InvalidStatus {
        id: Uuid,
        status: ReservationStatus,
    },
}

/// Interface for stock reservation during checkout.
#[async_trait]
pub trait InventoryStore: Send + Sync {
    /// Stock counts for the given products. Unknown products are omitted.
    async fn get_stock(&self, product_ids: &[i64]) -> Result<Vec<StockInfo>>;

    /// Place a hold on every item, all-or-nothing.
    async fn reserve(&self, checkout_id: &str, items: Vec<ReservationItem>)
        -> Result<Reservation>;

    /// Finalize a reservation after successful payment. Deducts the held
    /// quantities from total stock.
    async fn confirm(&self, reservation_id: Uuid) -> Result<()>;

    /// Cancel a reservation, returning the held quantities to the pool.
    async fn release(&self, reservation_id: Uuid) -> Result<()>;

    /// Set the stock level for a product (bootstrap only).
    async fn set_stock(&self, product_id: i64, quantity: i32) -> Result<()>;
}

struct State {
    stocks: HashMap<i64, StockInfo>,
    reservations: HashMap<Uuid, Reservation>,
}

/// In-memory implementation of [`InventoryStore`].
pub struct MemoryInventoryStore {
    state: RwLock<State>,
    ttl: chrono::Duration,
}

impl MemoryInventoryStore {
    pub fn new() -> Self {
        Self::with_ttl(RESERVATION_TTL)
    }

    /// Create a store with a custom reservation TTL.
    pub fn with_ttl(ttl: Duration) -> Self {
        Self {
            state: RwLock::new(State {
                stocks: HashMap::new(),
                reservations: HashMap::new(),
            }),
            ttl: chrono::Duration::from_std(ttl).unwrap_or(chrono::Duration::minutes(5)),
        }
    }

    /// Transition every overdue `Reserved` reservation to `Expired` and
    /// return the held quantities to availability.
    ///
    /// Returns the number of reservations expired.
    pub async fn sweep_expired(&self) -> usize {
        let now = Utc::now();
        let mut state = self.state.write().await;
        let state = &mut *state;

        let mut expired = 0;
        for reservation in state.reservations.values_mut() {
            if reservation.status == ReservationStatus::Reserved && reservation.is_expired(now) {
                reservation.status = ReservationStatus::Expired;
                for item in &reservation.items {
                    if let Some(stock) = state.stocks.get_mut(&item.product_id) {
                        stock.reserved -= item.quantity;
                    }
                }
                expired += 1;
                debug!(reservation_id = %reservation.id, "Reservation expired");
            }
        }

        expired
    }

    /// Fetch a reservation by id (primarily for tests and diagnostics).
    pub async fn get_reservation(&self, reservation_id: Uuid) -> Option<Reservation> {
        self.state
            .read()
            .await
            .reservations
            .get(&reservation_id)
            .cloned()
    }
}

impl Default for MemoryInventoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl InventoryStore for MemoryInventoryStore {
    async fn get_stock(&self, product_ids: &[i64]) -> Result<Vec<StockInfo>> {
        let state = self.state.read().await;
        Ok(product_ids
            .iter()
            .filter_map(|id| state.stocks.get(id).copied())
            .collect())
    }

    async fn reserve(
        &self,
        checkout_id: &str,
        items: Vec<ReservationItem>,
    ) -> Result<Reservation> {
        let mut state = self.state.write().await;

        // First pass: verify every item without mutating. A failure here
        // must leave no trace, so no increments happen until all items pass.
        for item in &items {
            let stock = state
                .stocks
                .get(&item.product_id)
                .ok_or(InventoryError::ProductNotFound(item.product_id))?;
            if stock.available() < item.quantity {
                return Err(InventoryError::InsufficientStock {
                    product_id: item.product_id,
                    requested: item.quantity,
                    available: stock.available(),
                });
            }
        }

        // Second pass: take the holds.
        for item in &items {
            if let Some(stock) = state.stocks.get_mut(&item.product_id) {
                stock.reserved += item.quantity;
            }
        }

        let now = Utc::now();
        let reservation = Reservation {
            id: Uuid::new_v4(),
            checkout_id: checkout_id.to_string(),
            items,
            status: ReservationStatus::Reserved,
            created_at: now,
            expires_at: now + self.ttl,
        };

        debug!(
            reservation_id = %reservation.id,
            checkout_id = %checkout_id,
            items = reservation.items.len(),
            "Stock reserved"
        );

        state.reservations.insert(reservation.id, reservation.clone());
        Ok(reservation)
    }

    async fn confirm(&self, reservation_id: Uuid) -> Result<()> {
        let mut state = self.state.write().await;
        let state = &mut *state;

        let reservation = state
            .reservations
            .get_mut(&reservation_id)
            .ok_or(InventoryError::ReservationNotFound(reservation_id))?;

        if reservation.status != ReservationStatus::Reserved {
            return Err(InventoryError::InvalidStatus {
                id: reservation_id,
                status: reservation.status,
            });
        }

        if reservation.is_expired(Utc::now()) {
            return Err(InventoryError::ReservationExpired(reservation_id));
        }

        // The hold becomes a sale: the quantity leaves both counters, so
        // available stays unchanged.
        for item in &reservation.items {
            if let Some(stock) = state.stocks.get_mut(&item.product_id) {
                stock.total -= item.quantity;
                stock.reserved -= item.quantity;
            }
        }

        reservation.status = ReservationStatus::Confirmed;
        debug!(reservation_id = %reservation_id, "Reservation confirmed");
        Ok(())
    }

    async fn release(&self, reservation_id: Uuid) -> Result<()> {
        let mut state = self.state.write().await;
        let state = &mut *state;

        let reservation = state
            .reservations
            .get_mut(&reservation_id)
            .ok_or(InventoryError::ReservationNotFound(reservation_id))?;

        if reservation.status != ReservationStatus::Reserved {
            return Err(InventoryError::InvalidStatus {
                id: reservation_id,
                status: reservation.status,
            });
        }

        for item in &reservation.items {
            if let Some(stock) = state.stocks.get_mut(&item.product_id) {
                stock.reserved -= item.quantity;
            }
        }

        reservation.status = ReservationStatus::Released;
        debug!(reservation_id = %reservation_id, "Reservation released");
        Ok(())
    }

    async fn set_stock(&self, product_id: i64, quantity: i32) -> Result<()> {
        let mut state = self.state.write().await;
        state.stocks.insert(
            product_id,
            StockInfo {
                product_id,
                total: quantity,
                reserved: 0,
            },
        );
        Ok(())
    }
}

/// Handle to a running sweeper task.
pub struct SweeperHandle {
    cancel: tokio::sync::watch::Sender<bool>,
}

impl SweeperHandle {
    /// Signal the sweeper to stop.
    pub fn stop(&self) {
        let _ = self.cancel.send(true);
    }
}

/// Spawn a background task that periodically expires overdue reservations.
///
/// Returns a handle that can be used to stop the task.
pub fn spawn_sweeper(store: Arc<MemoryInventoryStore>, interval: Duration) -> SweeperHandle {
    let (cancel_tx, mut cancel_rx) = tokio::sync::watch::channel(false);

    tokio::spawn(async move {
        info!(interval_secs = interval.as_secs(), "Reservation sweeper started");

        loop {
            tokio::select! {
                _ = tokio::time::sleep(interval) => {
                    let expired = store.sweep_expired().await;
                    if expired > 0 {
                        info!(expired = expired, "Expired overdue reservations");
                    }
                }
                _ = cancel_rx.changed() => {
                    if *cancel_rx.borrow() {
                        info!("Reservation sweeper stopped");
                        break;
                    }
                }
            }
        }
    });

    SweeperHandle { cancel: cancel_tx }
}

#[cfg(test)]
mod tests;
