//! Order types for the orders store.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Order lifecycle status. Orders are created `Confirmed`; later states
/// belong to fulfillment flows outside this backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OrderStatus {
    #[serde(rename = "CONFIRMED")]
    Confirmed,
}

impl OrderStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            OrderStatus::Confirmed => "CONFIRMED",
        }
    }

    pub fn parse(s: &str) -> Option<OrderStatus> {
        match s {
            "CONFIRMED" => Some(OrderStatus::Confirmed),
            _ => None,
        }
    }
}

/// One product line on an order.
///
/// The price key is `price` in the orders table, while the checkout event
/// publishes it as `unit_price`; the consumer performs that mapping.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderItem {
    pub product_id: i64,
    pub product_name: String,
    pub quantity: i32,
    pub price: f64,
}

/// The authoritative order record, created exactly once per checkout.
#[derive(Debug, Clone)]
pub struct Order {
    pub id: Uuid,
    /// Unique across the table; the at-least-once -> exactly-once bridge.
    pub checkout_id: Uuid,
    pub user_id: String,
    pub total_amount: f64,
    pub currency: String,
    pub status: OrderStatus,
    pub items: Vec<OrderItem>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}
