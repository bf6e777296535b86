//! Cart storage with a cache-aside read path.
//!
//! Reads go through the cache; concurrent misses for the same user collapse
//! into a single durable-store read, and the cache is filled asynchronously
//! after the caller already has its answer. Mutations write the store first
//! and then invalidate the cache in the background; a failed invalidation
//! leaves a stale entry whose lifetime is bounded by the cache TTL.

pub mod cache;
pub mod memory;
pub mod mongo;
pub mod single_flight;

pub use cache::{CacheError, CartCache, MemoryCartCache, RedisCartCache};
pub use memory::MemoryCartStore;
pub use mongo::MongoCartStore;
pub use single_flight::SingleFlight;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tracing::warn;

use crate::domain::Cart;

/// Result type for cart operations.
pub type Result<T> = std::result::Result<T, CartError>;

/// Errors from cart operations.
#[derive(Debug, thiserror::Error)]
pub enum CartError {
    #[error("cart not found for user {0}")]
    CartNotFound(String),

    #[error("item not found in cart: product {0}")]
    ItemNotFound(i64),

    #[error("malformed cart document: {0}")]
    Malformed(String),

    #[error("mongodb error: {0}")]
    Mongo(#[from] mongodb::error::Error),
}

/// Interface for durable cart persistence.
#[async_trait]
pub trait CartStore: Send + Sync {
    /// Fetch the cart. `CartError::CartNotFound` when absent.
    async fn get_cart(&self, user_id: &str) -> Result<Cart>;

    /// Insert or overwrite the entry for `product_id`.
    async fn add_item(&self, user_id: &str, product_id: i64, quantity: i32) -> Result<()>;

    /// Change the quantity of an existing entry.
    async fn update_item_quantity(
        &self,
        user_id: &str,
        product_id: i64,
        quantity: i32,
    ) -> Result<()>;

    /// Remove the entry for `product_id`.
    async fn remove_item(&self, user_id: &str, product_id: i64) -> Result<()>;

    /// Delete the whole cart document.
    async fn delete_cart(&self, user_id: &str) -> Result<()>;
}

/// How long a background cache invalidation may run before being dropped.
const INVALIDATE_TIMEOUT: Duration = Duration::from_secs(1);

/// Cart service: durable store + cache-aside read path.
pub struct CartService {
    store: Arc<dyn CartStore>,
    cache: Arc<dyn CartCache>,
    flights: SingleFlight<Cart>,
}

impl CartService {
    pub fn new(store: Arc<dyn CartStore>, cache: Arc<dyn CartCache>) -> Self {
        Self {
            store,
            cache,
            flights: SingleFlight::new(),
        }
    }

    /// Fetch the user's cart.
    ///
    /// Cache hit returns immediately. On a miss, concurrent callers for the
    /// same user share one store read; the cache is filled asynchronously
    /// after the value is returned. A missing cart reads as an empty cart.
    pub async fn get_cart(&self, user_id: &str) -> Result<Cart> {
        let store = self.store.clone();
        let cache = self.cache.clone();
        let key = user_id.to_string();

        self.flights
            .run(user_id, || async move {
                match cache.get(&key).await {
                    Ok(cart) => return Ok(cart),
                    Err(CacheError::Miss) => {}
                    // A broken cache degrades to store reads, never to errors.
                    Err(e) => warn!(user_id = %key, error = %e, "Cart cache read failed"),
                }

                let cart = match store.get_cart(&key).await {
                    Ok(cart) => cart,
                    Err(CartError::CartNotFound(_)) => Cart::empty(key.as_str()),
                    Err(e) => return Err(e),
                };

                // Fill the cache off the request path.
                let fill = cart.clone();
                tokio::spawn(async move {
                    if let Err(e) = cache.set(&key, &fill).await {
                        warn!(user_id = %key, error = %e, "Cart cache fill failed");
                    }
                });

                Ok(cart)
            })
            .await
    }

    pub async fn add_item(&self, user_id: &str, product_id: i64, quantity: i32) -> Result<()> {
        self.store.add_item(user_id, product_id, quantity).await?;
        self.invalidate_async(user_id);
        Ok(())
    }

    pub async fn update_quantity(
        &self,
        user_id: &str,
        product_id: i64,
        quantity: i32,
    ) -> Result<()> {
        self.store
            .update_item_quantity(user_id, product_id, quantity)
            .await?;
        self.invalidate_async(user_id);
        Ok(())
    }

    pub async fn remove_item(&self, user_id: &str, product_id: i64) -> Result<()> {
        self.store.remove_item(user_id, product_id).await?;
        self.invalidate_async(user_id);
        Ok(())
    }

    pub async fn clear_cart(&self, user_id: &str) -> Result<()> {
        self.store.delete_cart(user_id).await?;
        self.invalidate_async(user_id);
        Ok(())
    }

    /// Delete the cache entry in the background with a bounded timeout.
    /// Failure is logged, never surfaced: the mutation already succeeded.
    fn invalidate_async(&self, user_id: &str) {
        let cache = self.cache.clone();
        let user_id = user_id.to_string();

        tokio::spawn(async move {
            match tokio::time::timeout(INVALIDATE_TIMEOUT, cache.delete(&user_id)).await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => warn!(user_id = %user_id, error = %e, "Cart cache invalidation failed"),
                Err(_) => warn!(user_id = %user_id, "Cart cache invalidation timed out"),
            }
        });
    }
}
