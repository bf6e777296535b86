//! cartflow-orders: order creation from the checkout event stream.
//!
//! Consumes the checkout topic on the `orders-service` consumer group and
//! writes one order per checkout; the query surface in [`cartflow::rpc`] is
//! attached by the host gateway.

use std::sync::Arc;

use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use cartflow::bus::{EventBus, KafkaEventBus, KafkaEventBusConfig};
use cartflow::config::{self, Config};
use cartflow::consumers::OrdersConsumer;
use cartflow::orders::PostgresOrderStore;
use cartflow::rpc::OrdersRpc;
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

    info!("Starting cartflow-orders");

    let store = Arc::new(PostgresOrderStore::connect(&config.storage.postgres).await?);
    let _surface = OrdersRpc::new(store.clone());

    let bus = KafkaEventBus::new(KafkaEventBusConfig::subscriber(
        config.messaging.bootstrap_servers(),
        &config.messaging.topic,
        config::ORDERS_GROUP,
    ))
    .await?;

    bus.subscribe(Box::new(OrdersConsumer::new(store))).await?;
    bus.start_consuming().await?;

    info!("cartflow-orders ready");

    shutdown::wait_for_signal().await?;
    info!("cartflow-orders stopped");
    Ok(())
}
