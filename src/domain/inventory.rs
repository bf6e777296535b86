//! Reservation and stock types for the inventory store.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// State of a stock reservation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReservationStatus {
    Reserved,
    Confirmed,
    Released,
    Expired,
}

/// A single product hold within a reservation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReservationItem {
    pub product_id: i64,
    pub quantity: i32,
}

/// A short-lived hold on stock taken during checkout.
///
/// Only `Reserved` reservations can move to any other state; the hold
/// auto-expires after its TTL unless confirmed or released first.
#[derive(Debug, Clone, PartialEq)]
pub struct Reservation {
    pub id: Uuid,
    pub checkout_id: String,
    pub items: Vec<ReservationItem>,
    pub status: ReservationStatus,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl Reservation {
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now > self.expires_at
    }
}

/// Stock counts for a product. Invariant: `0 <= reserved <= total`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StockInfo {
    pub product_id: i64,
    /// Total units in inventory.
    pub total: i32,
    /// Units currently held by pending checkouts.
    pub reserved: i32,
}

impl StockInfo {
    pub fn available(&self) -> i32 {
        self.total - self.reserved
    }
}
