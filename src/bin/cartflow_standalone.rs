//! cartflow-standalone: the whole stack in one process.
//!
//! In-memory stores and the in-process channel bus replace Postgres, Mongo,
//! Redis, and Kafka. On startup a demo checkout runs end to end: cart ->
//! snapshot -> reservation -> payment -> co-committed outbox event ->
//! consumers (order created, cart cleared). Useful for local exploration
//! without any infrastructure.

use std::sync::Arc;
use std::time::Duration;

use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use cartflow::bus::{ChannelEventBus, EventBus};
use cartflow::cart::{CartService, MemoryCartCache, MemoryCartStore};
use cartflow::checkout::{CheckoutCoordinator, MemoryCheckoutRepository};
use cartflow::clients::{Product, SimulatedPaymentGateway, StaticProductCatalog};
use cartflow::config::Config;
use cartflow::consumers::{CartClearer, OrdersConsumer};
use cartflow::inventory::{spawn_sweeper, InventoryStore, MemoryInventoryStore, SWEEP_INTERVAL};
use cartflow::orders::{MemoryOrderStore, OrderStore};
use cartflow::outbox::{spawn_poller, OutboxPoller};
use cartflow::rpc::{CheckoutRpc, RequestMeta};
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

    info!("Starting cartflow-standalone");

    // Stores
    let repo = Arc::new(MemoryCheckoutRepository::new());
    let cart_store = Arc::new(MemoryCartStore::new());
    let cart_cache = Arc::new(MemoryCartCache::new());
    let carts = Arc::new(CartService::new(cart_store.clone(), cart_cache.clone()));
    let orders = Arc::new(MemoryOrderStore::new());

    // Catalog + inventory + payments
    let catalog = Arc::new(StaticProductCatalog::new());
    catalog
        .seed(vec![
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
        ])
        .await;

    let inventory = Arc::new(MemoryInventoryStore::new());
    inventory.set_stock(1, 100).await?;
    inventory.set_stock(2, 100).await?;
    let sweeper = spawn_sweeper(inventory.clone(), SWEEP_INTERVAL);

    let payments = Arc::new(SimulatedPaymentGateway::new());

    // Bus: one channel, two subscriber "groups"
    let bus = Arc::new(ChannelEventBus::new());

    let orders_group = bus.subscriber();
    orders_group
        .subscribe(Box::new(OrdersConsumer::new(orders.clone())))
        .await?;
    orders_group.start_consuming().await?;

    let cart_group = bus.subscriber();
    cart_group
        .subscribe(Box::new(CartClearer::new(cart_store.clone(), cart_cache)))
        .await?;
    cart_group.start_consuming().await?;

    // Coordinator + poller
    let coordinator = Arc::new(CheckoutCoordinator::new(
        repo.clone(),
        carts.clone(),
        catalog,
        inventory,
        payments,
        config.server.call_timeout(),
    ));
    let poller = Arc::new(OutboxPoller::new(
        repo.clone(),
        bus,
        config.messaging.poller.clone(),
    ));
    let poller_handle = spawn_poller(poller);

    // Demo checkout through the request surface
    let surface = CheckoutRpc::new(coordinator);
    let meta = RequestMeta {
        user_id: Some("123".to_string()),
        request_id: Some("demo".to_string()),
    };

    carts.add_item("123", 1, 1).await?;
    carts.add_item("123", 2, 2).await?;

    let response = surface.initiate_checkout(&meta, 123, "demo-checkout").await?;
    info!(
        checkout_id = %response.checkout_id,
        status = %response.status,
        "Demo checkout finished"
    );

    // Give the poller and consumers a moment to fan the event out.
    tokio::time::sleep(Duration::from_millis(1500)).await;

    let created = orders.list_orders("123").await?;
    info!(orders = created.len(), "Orders written from the event stream");
    let remaining = carts.get_cart("123").await?;
    info!(items = remaining.items.len(), "Cart after clearing");

    info!("cartflow-standalone ready (Ctrl-C to exit)");

    shutdown::wait_for_signal().await?;
    info!("Shutting down cartflow-standalone");

    poller_handle.stop();
    sweeper.stop();
    tokio::time::sleep(Duration::from_millis(100)).await;

    info!("cartflow-standalone stopped");
    Ok(())
}
