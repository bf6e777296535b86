//! In-memory cart store for tests and single-process runs.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::RwLock;

use super::{CartError, CartStore, Result};
use crate::domain::Cart;

/// In-memory implementation of [`CartStore`].
#[derive(Default)]
pub struct MemoryCartStore {
    carts: RwLock<HashMap<String, Cart>>,
}

impl MemoryCartStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl CartStore for MemoryCartStore {
    async fn get_cart(&self, user_id: &str) -> Result<Cart> {
        self.carts
            .read()
            .await
            .get(user_id)
            .cloned()
            .ok_or_else(|| CartError::CartNotFound(user_id.to_string()))
    }

    async fn add_item(&self, user_id: &str, product_id: i64, quantity: i32) -> Result<()> {
        let mut carts = self.carts.write().await;
        let cart = carts
            .entry(user_id.to_string())
            .or_insert_with(|| Cart::empty(user_id));
        cart.upsert_item(product_id, quantity);
        Ok(())
    }

    async fn update_item_quantity(
        &self,
        user_id: &str,
        product_id: i64,
        quantity: i32,
    ) -> Result<()> {
        let mut carts = self.carts.write().await;
        let cart = carts
            .get_mut(user_id)
            .ok_or_else(|| CartError::CartNotFound(user_id.to_string()))?;

        let item = cart
            .items
            .iter_mut()
            .find(|i| i.product_id == product_id)
            .ok_or(CartError::ItemNotFound(product_id))?;

        item.quantity = quantity;
        cart.updated_at = Utc::now();
        Ok(())
    }

    async fn remove_item(&self, user_id: &str, product_id: i64) -> Result<()> {
        let mut carts = self.carts.write().await;
        let cart = carts
            .get_mut(user_id)
            .ok_or_else(|| CartError::CartNotFound(user_id.to_string()))?;

        let before = cart.items.len();
        cart.items.retain(|i| i.product_id != product_id);
        if cart.items.len() == before {
            return Err(CartError::ItemNotFound(product_id));
        }

        cart.updated_at = Utc::now();
        Ok(())
    }

    async fn delete_cart(&self, user_id: &str) -> Result<()> {
        self.carts
            .write()
            .await
            .remove(user_id)
            .map(|_| ())
            .ok_or_else(|| CartError::CartNotFound(user_id.to_string()))
    }
}
