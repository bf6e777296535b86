//! Checkout session state machine and snapshot types.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Lifecycle state of a checkout session.
///
/// The serialized form matches the strings persisted in the
/// `checkout_sessions.status` column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CheckoutStatus {
    #[serde(rename = "INITIATED")]
    Initiated,
    #[serde(rename = "INVENTORY_RESERVED")]
    InventoryReserved,
    #[serde(rename = "PAYMENT_PENDING")]
    PaymentPending,
    #[serde(rename = "PAYMENT_COMPLETED")]
    PaymentCompleted,
    #[serde(rename = "COMPLETED")]
    Completed,
    #[serde(rename = "FAILED")]
    Failed,
}

impl CheckoutStatus {
    /// Terminal statuses are never left.
    pub fn is_terminal(self) -> bool {
        matches!(self, CheckoutStatus::Completed | CheckoutStatus::Failed)
    }

    /// Authoritative transition table.
    ///
    /// Everything not listed here is an illegal transition and must be
    /// rejected loudly by the coordinator.
    pub fn can_transition_to(self, next: CheckoutStatus) -> bool {
        use CheckoutStatus::*;
        matches!(
            (self, next),
            (Initiated, InventoryReserved)
                | (Initiated, Failed)
                | (InventoryReserved, PaymentPending)
                | (InventoryReserved, Failed)
                | (PaymentPending, PaymentCompleted)
                | (PaymentPending, Failed)
                | (PaymentCompleted, Completed)
                | (PaymentCompleted, Failed)
        )
    }

    /// Database representation.
    pub fn as_str(self) -> &'static str {
        match self {
            CheckoutStatus::Initiated => "INITIATED",
            CheckoutStatus::InventoryReserved => "INVENTORY_RESERVED",
            CheckoutStatus::PaymentPending => "PAYMENT_PENDING",
            CheckoutStatus::PaymentCompleted => "PAYMENT_COMPLETED",
            CheckoutStatus::Completed => "COMPLETED",
            CheckoutStatus::Failed => "FAILED",
        }
    }

    /// Parse the database representation.
    pub fn parse(s: &str) -> Option<CheckoutStatus> {
        match s {
            "INITIATED" => Some(CheckoutStatus::Initiated),
            "INVENTORY_RESERVED" => Some(CheckoutStatus::InventoryReserved),
            "PAYMENT_PENDING" => Some(CheckoutStatus::PaymentPending),
            "PAYMENT_COMPLETED" => Some(CheckoutStatus::PaymentCompleted),
            "COMPLETED" => Some(CheckoutStatus::Completed),
            "FAILED" => Some(CheckoutStatus::Failed),
            _ => None,
        }
    }
}

impl std::fmt::Display for CheckoutStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One line of a cart snapshot, with the price captured at checkout time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CartSnapshotItem {
    pub product_id: i64,
    pub product_name: String,
    pub quantity: i32,
    pub unit_price: f64,
    pub subtotal: f64,
}

/// Immutable copy of the cart taken when checkout starts.
///
/// Prices are frozen here; later catalog changes do not affect an
/// in-flight checkout.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CartSnapshot {
    pub items: Vec<CartSnapshotItem>,
    pub total_amount: f64,
    pub currency: String,
    pub captured_at: DateTime<Utc>,
}

/// Durable checkout session row.
#[derive(Debug, Clone)]
pub struct CheckoutSession {
    pub id: Uuid,
    pub user_id: String,
    /// Serialized [`CartSnapshot`].
    pub cart_snapshot: serde_json::Value,
    pub status: CheckoutStatus,
    /// Client-supplied token binding retries to a single outcome.
    /// Globally unique at the store level.
    pub idempotency_key: String,
    pub inventory_reservation_id: Option<String>,
    pub payment_id: Option<String>,
    /// Formatted decimal string, e.g. "109.97".
    pub total_amount: String,
    pub currency: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Payload published on the event stream when a checkout completes.
///
/// Items carry `unit_price`; the orders consumer maps that onto the order
/// item's `price` column (the mapping is one-way, consumers tolerate both).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CheckoutCompleted {
    pub checkout_id: String,
    pub user_id: String,
    pub items: Vec<CartSnapshotItem>,
    pub total_amount: f64,
    pub currency: String,
    pub completed_at: DateTime<Utc>,
}

/// Event type header value for [`CheckoutCompleted`].
pub const CHECKOUT_COMPLETED_EVENT: &str = "CheckoutCompleted";

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn terminal_statuses_have_no_outgoing_transitions() {
        use CheckoutStatus::*;
        for terminal in [Completed, Failed] {
            for next in [
                Initiated,
                InventoryReserved,
                PaymentPending,
                PaymentCompleted,
                Completed,
                Failed,
            ] {
                assert!(!terminal.can_transition_to(next), "{terminal} -> {next}");
            }
        }
    }

    #[test]
    fn happy_path_transitions_are_legal() {
        use CheckoutStatus::*;
        assert!(Initiated.can_transition_to(InventoryReserved));
        assert!(InventoryReserved.can_transition_to(PaymentPending));
        assert!(PaymentPending.can_transition_to(PaymentCompleted));
        assert!(PaymentCompleted.can_transition_to(Completed));
    }

    #[test]
    fn every_non_terminal_state_can_fail() {
        use CheckoutStatus::*;
        for from in [Initiated, InventoryReserved, PaymentPending, PaymentCompleted] {
            assert!(from.can_transition_to(Failed), "{from} -> FAILED");
        }
    }

    #[test]
    fn skipping_states_is_illegal() {
        use CheckoutStatus::*;
        assert!(!Initiated.can_transition_to(PaymentPending));
        assert!(!Initiated.can_transition_to(Completed));
        assert!(!InventoryReserved.can_transition_to(Completed));
        assert!(!PaymentPending.can_transition_to(Completed));
    }

    #[test]
    fn status_round_trips_through_db_representation() {
        use CheckoutStatus::*;
        for status in [
            Initiated,
            InventoryReserved,
            PaymentPending,
            PaymentCompleted,
            Completed,
            Failed,
        ] {
            assert_eq!(CheckoutStatus::parse(status.as_str()), Some(status));
        }
        assert_eq!(CheckoutStatus::parse("bogus"), None);
    }

    #[test]
    fn snapshot_serializes_with_unit_price_key() {
        let snapshot = CartSnapshot {
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
        };

        let json = serde_json::to_value(&snapshot).unwrap();
        assert!(json["items"][0].get("unit_price").is_some());
        assert!(json["items"][0].get("price").is_none());
    }
}
