//! cartflow-checkout: checkout coordination service.
//!
//! Owns the checkout session store and the outbox. Runs the outbox poller
//! (event publication + stuck-session recovery) and the inventory
//! reservation sweeper alongside the coordinator. The request surface in
//! [`cartflow::rpc`] is attached by the host gateway.

use std::sync::Arc;

use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use cartflow::bus::{EventBus, KafkaEventBus, KafkaEventBusConfig};
use cartflow::cart::{CartService, MongoCartStore, RedisCartCache};
use cartflow::checkout::{CheckoutCoordinator, PostgresCheckoutRepository};
use cartflow::clients::{Product, SimulatedPaymentGateway, StaticProductCatalog};
use cartflow::config::Config;
use cartflow::inventory::{spawn_sweeper, MemoryInventoryStore, InventoryStore, SWEEP_INTERVAL};
use cartflow::outbox::{spawn_poller, OutboxPoller};
use cartflow::rpc::CheckoutRpc;
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

    info!("Starting cartflow-checkout");

    let repo = Arc::new(PostgresCheckoutRepository::connect(&config.storage.postgres).await?);

    let cart_store = Arc::new(MongoCartStore::new(&config.storage.mongodb).await?);
    let cart_cache = Arc::new(RedisCartCache::new(&config.storage.cache).await?);
    let carts = Arc::new(CartService::new(cart_store, cart_cache));

    let catalog = Arc::new(StaticProductCatalog::new());
    catalog.seed(demo_products()).await;

    let inventory = Arc::new(MemoryInventoryStore::new());
    for product_id in [1, 2, 3, 4] {
        inventory.set_stock(product_id, 100).await?;
    }
    let sweeper = spawn_sweeper(inventory.clone(), SWEEP_INTERVAL);

    let payments = Arc::new(SimulatedPaymentGateway::new());

    let coordinator = Arc::new(CheckoutCoordinator::new(
        repo.clone(),
        carts,
        catalog,
        inventory,
        payments,
        config.server.call_timeout(),
    ));
    let _surface = CheckoutRpc::new(coordinator);

    let bus: Arc<dyn EventBus> = Arc::new(
        KafkaEventBus::new(KafkaEventBusConfig::publisher(
            config.messaging.bootstrap_servers(),
            &config.messaging.topic,
        ))
        .await?,
    );

    let poller = Arc::new(OutboxPoller::new(
        repo,
        bus,
        config.messaging.poller.clone(),
    ));
    let poller_handle = spawn_poller(poller);

    info!("cartflow-checkout ready");

    shutdown::wait_for_signal().await?;
    info!("Shutting down cartflow-checkout");

    poller_handle.stop();
    sweeper.stop();
    tokio::time::sleep(std::time::Duration::from_millis(100)).await;

    info!("cartflow-checkout stopped");
    Ok(())
}

fn demo_products() -> Vec<Product> {
    vec![
        Product {
            id: 1,
            name: "Laptop".to_string(),
            price: 999.99,
        },
        Product {
            id: 2,
            name: "Mouse".to_string(),
            price: 29.99,
        },
        Product {
            id: 3,
            name: "Keyboard".to_string(),
            price: 49.99,
        },
        Product {
            id: 4,
            name: "Monitor".to_string(),
            price: 299.99,
        },
    ]
}
