//! Cart clearer: empties the user's cart once their checkout completes.

use std::sync::Arc;

use futures::future::BoxFuture;
use tracing::{info, warn};

use crate::bus::{BusError, BusMessage, MessageHandler};
use crate::cart::{CartCache, CartError, CartStore};

/// Consumes the checkout event stream and deletes the user's cart document
/// and its cache entry. Both deletions are best-effort: a missing cart means
/// someone already cleared it, and the cache entry expires on its own.
pub struct CartClearer {
    store: Arc<dyn CartStore>,
    cache: Arc<dyn CartCache>,
}

impl CartClearer {
    pub fn new(store: Arc<dyn CartStore>, cache: Arc<dyn CartCache>) -> Self {
        Self { store, cache }
    }

    async fn process(
        store: Arc<dyn CartStore>,
        cache: Arc<dyn CartCache>,
        msg: BusMessage,
    ) -> Result<(), BusError> {
        let payload: serde_json::Value = match serde_json::from_slice(&msg.payload) {
            Ok(payload) => payload,
            Err(e) => {
                warn!(key = %msg.key, error = %e, "Skipping malformed checkout event");
                return Ok(());
            }
        };

        let user_id = match payload["user_id"].as_str() {
            Some(user_id) => user_id.to_string(),
            None => {
                warn!(key = %msg.key, "Skipping event with missing or invalid user_id");
                return Ok(());
            }
        };

        match store.delete_cart(&user_id).await {
            Ok(()) => info!(user_id = %user_id, "Cart cleared after checkout"),
            Err(CartError::CartNotFound(_)) => {
                info!(user_id = %user_id, "Cart already empty")
            }
            Err(e) => warn!(user_id = %user_id, error = %e, "Failed to delete cart"),
        }

        if let Err(e) = cache.delete(&user_id).await {
            warn!(user_id = %user_id, error = %e, "Failed to delete cart cache entry");
        }

        // Acknowledged only after both attempts returned.
        Ok(())
    }
}

impl MessageHandler for CartClearer {
    fn handle(&self, msg: BusMessage) -> BoxFuture<'static, Result<(), BusError>> {
        let store = self.store.clone();
        let cache = self.cache.clone();
        Box::pin(Self::process(store, cache, msg))
    }
}
