//! cartflow-cart-worker: cart clearing from the checkout event stream.
//!
//! Consumes the checkout topic on the `cart-service-consumer` group and
//! deletes each completed checkout's cart document and cache entry.

use std::sync::Arc;

use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use cartflow::bus::{EventBus, KafkaEventBus, KafkaEventBusConfig};
use cartflow::cart::{MongoCartStore, RedisCartCache};
use cartflow::config::{self, Config};
use cartflow::consumers::CartClearer;
use cartflow::shutdown;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_env("CARTFLOW_LOG")
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::load().map_err(|e| {
        error!("Failed to load configuration: {}", e);
        e
    })?;

    info!("Starting cartflow-cart-worker");

    let store = Arc::new(MongoCartStore::new(&config.storage.mongodb).await?);
    let cache = Arc::new(RedisCartCache::new(&config.storage.cache).await?);

    let bus = KafkaEventBus::new(KafkaEventBusConfig::subscriber(
        config.messaging.bootstrap_servers(),
        &config.messaging.topic,
        config::CART_CLEARER_GROUP,
    ))
    .await?;

    bus.subscribe(Box::new(CartClearer::new(store, cache))).await?;
    bus.start_consuming().await?;

    info!("cartflow-cart-worker ready");

    shutdown::wait_for_signal().await?;
    info!("cartflow-cart-worker stopped");
    Ok(())
}
