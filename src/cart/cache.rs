//! Cart cache implementations.
//!
//! Keys are `cart:{user_id}`. Entries carry a base TTL plus uniform jitter so
//! a burst of fills does not produce a burst of synchronized expiries.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use rand::Rng;
use redis::{aio::ConnectionManager, AsyncCommands, Client};
use tokio::sync::RwLock;
use tracing::{debug, info};

use crate::config::CacheConfig;
use crate::domain::Cart;

/// Result type for cache operations.
pub type Result<T> = std::result::Result<T, CacheError>;

/// Errors from cache operations.
#[derive(Debug, thiserror::Error)]
pub enum CacheError {
    #[error("cache miss")]
    Miss,

    #[error("redis error: {0}")]
    Redis(#[from] redis::RedisError),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Interface for the cart cache.
#[async_trait]
pub trait CartCache: Send + Sync {
    /// Fetch the cached cart. `CacheError::Miss` when absent.
    async fn get(&self, user_id: &str) -> Result<Cart>;

    /// Store the cart with TTL + jitter.
    async fn set(&self, user_id: &str, cart: &Cart) -> Result<()>;

    /// Drop the cached entry. Missing entries are not an error.
    async fn delete(&self, user_id: &str) -> Result<()>;
}

fn cache_key(user_id: &str) -> String {
    format!("cart:{user_id}")
}

/// Redis-backed cart cache.
pub struct RedisCartCache {
    conn: ConnectionManager,
    base_ttl: Duration,
    jitter: Duration,
}

impl RedisCartCache {
    /// Connect to Redis and build the cache.
    pub async fn new(config: &CacheConfig) -> Result<Self> {
        let client = Client::open(config.url())?;
        let conn = ConnectionManager::new(client).await?;

        info!(addr = %config.addr, "Connected to Redis");

        Ok(Self {
            conn,
            base_ttl: Duration::from_secs(config.ttl_secs),
            jitter: Duration::from_secs(config.ttl_jitter_secs),
        })
    }

    fn ttl_with_jitter(&self) -> u64 {
        let jitter = if self.jitter.as_secs() == 0 {
            0
        } else {
            rand::thread_rng().gen_range(0..self.jitter.as_secs())
        };
        self.base_ttl.as_secs() + jitter
    }
}

#[async_trait]
impl CartCache for RedisCartCache {
    async fn get(&self, user_id: &str) -> Result<Cart> {
        let mut conn = self.conn.clone();
        let data: Option<String> = conn.get(cache_key(user_id)).await?;

        match data {
            Some(json) => Ok(serde_json::from_str(&json)?),
            None => Err(CacheError::Miss),
        }
    }

    async fn set(&self, user_id: &str, cart: &Cart) -> Result<()> {
        let json = serde_json::to_string(cart)?;
        let ttl = self.ttl_with_jitter();

        let mut conn = self.conn.clone();
        let _: () = conn.set_ex(cache_key(user_id), json, ttl).await?;

        debug!(user_id = %user_id, ttl_secs = ttl, "Cart cached");
        Ok(())
    }

    async fn delete(&self, user_id: &str) -> Result<()> {
        let mut conn = self.conn.clone();
        let _: () = conn.del(cache_key(user_id)).await?;
        Ok(())
    }
}

/// In-memory cart cache for tests and single-process runs.
///
/// Entries never expire; invalidation is the only eviction path.
#[derive(Default)]
pub struct MemoryCartCache {
    entries: RwLock<HashMap<String, Cart>>,
    fail_ops: RwLock<bool>,
}

impl MemoryCartCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every operation fail, to exercise cache-degradation paths.
    pub async fn set_fail_ops(&self, fail: bool) {
        *self.fail_ops.write().await = fail;
    }

    pub async fn contains(&self, user_id: &str) -> bool {
        self.entries.read().await.contains_key(user_id)
    }

    async fn check_fail(&self) -> Result<()> {
        if *self.fail_ops.read().await {
            return Err(CacheError::Redis(redis::RedisError::from((
                redis::ErrorKind::IoError,
                "simulated cache failure",
            ))));
        }
        Ok(())
    }
}

#[async_trait]
impl CartCache for MemoryCartCache {
    async fn get(&self, user_id: &str) -> Result<Cart> {
        self.check_fail().await?;
        self.entries
            .read()
            .await
            .get(user_id)
            .cloned()
            .ok_or(CacheError::Miss)
    }

    async fn set(&self, user_id: &str, cart: &Cart) -> Result<()> {
        self.check_fail().await?;
        self.entries
            .write()
            .await
            .insert(user_id.to_string(), cart.clone());
        Ok(())
    }

    async fn delete(&self, user_id: &str) -> Result<()> {
        self.check_fail().await?;
        self.entries.write().await.remove(user_id);
        Ok(())
    }
}
