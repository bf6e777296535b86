//! Orders writer: turns "checkout completed" events into order rows.

use std::sync::Arc;

use chrono::Utc;
use futures::future::BoxFuture;
use serde::Deserialize;
use tracing::{info, warn};
use uuid::Uuid;

use crate::bus::{BusError, BusMessage, MessageHandler};
use crate::domain::{Order, OrderItem, OrderStatus};
use crate::orders::{OrderError, OrderStore};

/// Payload item as published by the checkout outbox. The wire key for the
/// price is `unit_price`; older producers used `price`, so both are accepted.
#[derive(Debug, Deserialize)]
struct EventItem {
    product_id: i64,
    #[serde(default)]
    product_name: String,
    quantity: i32,
    #[serde(rename = "unit_price", alias = "price", default)]
    price: f64,
}

#[derive(Debug, Deserialize)]
struct CheckoutCompletedPayload {
    checkout_id: String,
    user_id: String,
    #[serde(default)]
    items: Vec<EventItem>,
    total_amount: f64,
    #[serde(default)]
    currency: String,
}

/// Consumes the checkout event stream and creates orders, exactly once per
/// checkout: redeliveries collapse on the unique `checkout_id`.
pub struct OrdersConsumer {
    store: Arc<dyn OrderStore>,
}

impl OrdersConsumer {
    pub fn new(store: Arc<dyn OrderStore>) -> Self {
        Self { store }
    }

    async fn process(store: Arc<dyn OrderStore>, msg: BusMessage) -> Result<(), BusError> {
        let payload: CheckoutCompletedPayload = match serde_json::from_slice(&msg.payload) {
            Ok(payload) => payload,
            Err(e) => {
                // Malformed payloads are skipped, not retried: redelivery
                // would fail the same way forever.
                warn!(key = %msg.key, error = %e, "Skipping malformed checkout event");
                return Ok(());
            }
        };

        let checkout_id = match Uuid::parse_str(&payload.checkout_id) {
            Ok(id) => id,
            Err(e) => {
                warn!(checkout_id = %payload.checkout_id, error = %e, "Skipping event with invalid checkout id");
                return Ok(());
            }
        };

        let currency = if payload.currency.is_empty() {
            "USD".to_string()
        } else {
            payload.currency
        };

        let items = payload
            .items
            .into_iter()
            .map(|item| OrderItem {
                product_id: item.product_id,
                product_name: item.product_name,
                quantity: item.quantity,
                price: item.price,
            })
            .collect();

        let order = Order {
            id: Uuid::new_v4(),
            checkout_id,
            user_id: payload.user_id,
            total_amount: payload.total_amount,
            currency,
            status: OrderStatus::Confirmed,
            items,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        };

        match store.create_order(&order).await {
            Ok(()) => {
                info!(order_id = %order.id, checkout_id = %checkout_id, "Order created");
                Ok(())
            }
            Err(OrderError::Duplicate(_)) => {
                // The at-least-once -> exactly-once bridge: a redelivered
                // event finds its order already written.
                info!(checkout_id = %checkout_id, "Order already exists, acknowledging");
                Ok(())
            }
            Err(e) => Err(BusError::Subscribe(format!(
                "failed to create order for checkout {checkout_id}: {e}"
            ))),
        }
    }
}

impl MessageHandler for OrdersConsumer {
    fn handle(&self, msg: BusMessage) -> BoxFuture<'static, Result<(), BusError>> {
        let store = self.store.clone();
        Box::pin(Self::process(store, msg))
    }
}
