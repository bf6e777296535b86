//! Cart document types.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One product line in a cart.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CartItem {
    pub product_id: i64,
    pub quantity: i32,
    pub added_at: DateTime<Utc>,
}

/// Per-user cart document. At most one item entry per product id; adding an
/// existing product overwrites its quantity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Cart {
    pub user_id: String,
    pub items: Vec<CartItem>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Cart {
    /// An empty cart for a user. Returned in place of "not found" so callers
    /// never have to special-case missing carts on the read path.
    pub fn empty(user_id: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            user_id: user_id.into(),
            items: Vec::new(),
            created_at: now,
            updated_at: now,
        }
    }

    /// Insert or overwrite the entry for `product_id`.
    pub fn upsert_item(&mut self, product_id: i64, quantity: i32) {
        let now = Utc::now();
        match self.items.iter_mut().find(|i| i.product_id == product_id) {
            Some(item) => {
                item.quantity = quantity;
                item.added_at = now;
            }
            None => self.items.push(CartItem {
                product_id,
                quantity,
                added_at: now,
            }),
        }
        self.updated_at = now;
    }
}
