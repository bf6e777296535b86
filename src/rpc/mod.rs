//! Transport-neutral request surface.
//!
//! Validates requests, carries caller metadata, and maps every domain error
//! onto a small set of error kinds with a fixed HTTP projection. The wire
//! layer (gateway, codecs) lives outside this crate; these facades are the
//! interface it consumes.

mod error;

pub use error::{ErrorKind, RpcError};

use std::sync::Arc;

use tracing::debug;
use uuid::Uuid;

use crate::cart::CartService;
use crate::checkout::{CheckoutCoordinator, CheckoutOutcome};
use crate::domain::{Cart, Order, ReservationItem, StockInfo};
use crate::inventory::InventoryStore;
use crate::orders::OrderStore;

/// Result type for RPC operations.
pub type Result<T> = std::result::Result<T, RpcError>;

/// Caller metadata propagated to downstream calls.
#[derive(Debug, Clone, Default)]
pub struct RequestMeta {
    pub user_id: Option<String>,
    pub request_id: Option<String>,
}

impl RequestMeta {
    /// Metadata pairs for outbound calls, preserving the inbound keys.
    pub fn outbound(&self) -> Vec<(&'static str, String)> {
        let mut pairs = Vec::new();
        if let Some(ref user_id) = self.user_id {
            pairs.push(("user-id", user_id.clone()));
        }
        if let Some(ref request_id) = self.request_id {
            pairs.push(("request-id", request_id.clone()));
        }
        pairs
    }

    fn trace(&self, rpc: &'static str) {
        debug!(
            rpc = rpc,
            user_id = self.user_id.as_deref().unwrap_or(""),
            request_id = self.request_id.as_deref().unwrap_or(""),
            "Request received"
        );
    }
}

// ============================================================================
// Validation
// ============================================================================

/// Quantities a cart line may carry.
const QUANTITY_RANGE: std::ops::RangeInclusive<i32> = 1..=99;

fn validate_user_id(user_id: i64) -> Result<()> {
    if user_id <= 0 {
        return Err(RpcError::invalid_argument("user_id must be greater than 0"));
    }
    Ok(())
}

fn validate_product_id(product_id: i64) -> Result<()> {
    if product_id <= 0 {
        return Err(RpcError::invalid_argument(
            "product_id must be greater than 0",
        ));
    }
    Ok(())
}

fn validate_quantity(quantity: i32) -> Result<()> {
    if !QUANTITY_RANGE.contains(&quantity) {
        return Err(RpcError::invalid_argument("quantity must be in [1, 99]"));
    }
    Ok(())
}

fn parse_uuid(value: &str, field: &str) -> Result<Uuid> {
    if value.is_empty() {
        return Err(RpcError::invalid_argument(format!("{field} is required")));
    }
    Uuid::parse_str(value)
        .map_err(|_| RpcError::invalid_argument(format!("{field} is not a valid UUID")))
}

// ============================================================================
// Cart surface
// ============================================================================

/// Cart RPC facade.
pub struct CartRpc {
    service: Arc<CartService>,
}

impl CartRpc {
    pub fn new(service: Arc<CartService>) -> Self {
        Self { service }
    }

    pub async fn get_cart(&self, meta: &RequestMeta, user_id: i64) -> Result<Cart> {
        meta.trace("cart.get");
        validate_user_id(user_id)?;
        Ok(self.service.get_cart(&user_id.to_string()).await?)
    }

    pub async fn add_item(
        &self,
        meta: &RequestMeta,
        user_id: i64,
        product_id: i64,
        quantity: i32,
    ) -> Result<()> {
        meta.trace("cart.add_item");
        validate_user_id(user_id)?;
        validate_product_id(product_id)?;
        validate_quantity(quantity)?;
        Ok(self
            .service
            .add_item(&user_id.to_string(), product_id, quantity)
            .await?)
    }

    pub async fn update_quantity(
        &self,
        meta: &RequestMeta,
        user_id: i64,
        product_id: i64,
        quantity: i32,
    ) -> Result<()> {
        meta.trace("cart.update_quantity");
        validate_user_id(user_id)?;
        validate_product_id(product_id)?;
        validate_quantity(quantity)?;
        Ok(self
            .service
            .update_quantity(&user_id.to_string(), product_id, quantity)
            .await?)
    }

    pub async fn remove_item(
        &self,
        meta: &RequestMeta,
        user_id: i64,
        product_id: i64,
    ) -> Result<()> {
        meta.trace("cart.remove_item");
        validate_user_id(user_id)?;
        validate_product_id(product_id)?;
        Ok(self
            .service
            .remove_item(&user_id.to_string(), product_id)
            .await?)
    }

    pub async fn clear_cart(&self, meta: &RequestMeta, user_id: i64) -> Result<()> {
        meta.trace("cart.clear");
        validate_user_id(user_id)?;
        Ok(self.service.clear_cart(&user_id.to_string()).await?)
    }
}

// ============================================================================
// Checkout surface
// ============================================================================

/// Checkout response: where the session ended up.
#[derive(Debug, Clone)]
pub struct CheckoutResponse {
    pub checkout_id: String,
    pub status: String,
}

impl From<CheckoutOutcome> for CheckoutResponse {
    fn from(outcome: CheckoutOutcome) -> Self {
        Self {
            checkout_id: outcome.checkout_id.to_string(),
            status: outcome.status.to_string(),
        }
    }
}

/// Checkout RPC facade.
pub struct CheckoutRpc {
    coordinator: Arc<CheckoutCoordinator>,
}

impl CheckoutRpc {
    pub fn new(coordinator: Arc<CheckoutCoordinator>) -> Self {
        Self { coordinator }
    }

    pub async fn initiate_checkout(
        &self,
        meta: &RequestMeta,
        user_id: i64,
        idempotency_key: &str,
    ) -> Result<CheckoutResponse> {
        meta.trace("checkout.initiate");
        validate_user_id(user_id)?;
        if idempotency_key.is_empty() {
            return Err(RpcError::invalid_argument("idempotency_key is required"));
        }

        let outcome = self
            .coordinator
            .initiate_checkout(user_id, idempotency_key)
            .await?;
        Ok(outcome.into())
    }
}

// ============================================================================
// Orders surface
// ============================================================================

/// Orders RPC facade.
pub struct OrdersRpc {
    store: Arc<dyn OrderStore>,
}

impl OrdersRpc {
    pub fn new(store: Arc<dyn OrderStore>) -> Self {
        Self { store }
    }

    pub async fn get_order(&self, meta: &RequestMeta, order_id: &str) -> Result<Order> {
        meta.trace("orders.get");
        let id = parse_uuid(order_id, "order_id")?;
        Ok(self.store.get_order(id).await?)
    }

    pub async fn list_orders(&self, meta: &RequestMeta, user_id: i64) -> Result<Vec<Order>> {
        meta.trace("orders.list");
        validate_user_id(user_id)?;
        Ok(self.store.list_orders(&user_id.to_string()).await?)
    }
}

// ============================================================================
// Inventory surface
// ============================================================================

/// Inventory RPC facade.
pub struct InventoryRpc {
    store: Arc<dyn InventoryStore>,
}

impl InventoryRpc {
    pub fn new(store: Arc<dyn InventoryStore>) -> Self {
        Self { store }
    }

    pub async fn get_stock(&self, meta: &RequestMeta, product_ids: &[i64]) -> Result<Vec<StockInfo>> {
        meta.trace("inventory.get_stock");
        for product_id in product_ids {
            validate_product_id(*product_id)?;
        }
        Ok(self.store.get_stock(product_ids).await?)
    }

    pub async fn reserve(
        &self,
        meta: &RequestMeta,
        checkout_id: &str,
        items: Vec<ReservationItem>,
    ) -> Result<String> {
        meta.trace("inventory.reserve");
        if checkout_id.is_empty() {
            return Err(RpcError::invalid_argument("checkout_id is required"));
        }
        if items.is_empty() {
            return Err(RpcError::invalid_argument("items must not be empty"));
        }
        for item in &items {
            validate_product_id(item.product_id)?;
            validate_quantity(item.quantity)?;
        }

        let reservation = self.store.reserve(checkout_id, items).await?;
        Ok(reservation.id.to_string())
    }

    pub async fn confirm(&self, meta: &RequestMeta, reservation_id: &str) -> Result<()> {
        meta.trace("inventory.confirm");
        let id = parse_uuid(reservation_id, "reservation_id")?;
        Ok(self.store.confirm(id).await?)
    }

    pub async fn release(&self, meta: &RequestMeta, reservation_id: &str) -> Result<()> {
        meta.trace("inventory.release");
        let id = parse_uuid(reservation_id, "reservation_id")?;
        Ok(self.store.release(id).await?)
    }
}

#[cfg(test)]
mod tests;
