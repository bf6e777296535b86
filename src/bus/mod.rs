//! Event bus for checkout event fan-out.
//!
//! This module contains:
//! - `EventBus` trait: publish and consume checkout events
//! - `MessageHandler` trait: for processing consumed messages
//! - Implementations: Kafka, in-process channel, mock

pub mod channel;
pub mod kafka;
pub mod mock;

pub use channel::ChannelEventBus;
pub use kafka::{KafkaEventBus, KafkaEventBusConfig};
pub use mock::MockEventBus;

use std::sync::Arc;

use async_trait::async_trait;
use futures::future::BoxFuture;
use tokio::sync::RwLock;
use tracing::error;

/// Result type for bus operations.
pub type Result<T> = std::result::Result<T, BusError>;

/// Errors that can occur during bus operations.
#[derive(Debug, thiserror::Error)]
pub enum BusError {
    #[error("connection failed: {0}")]
    Connection(String),

    #[error("publish failed: {0}")]
    Publish(String),

    #[error("subscribe failed: {0}")]
    Subscribe(String),

    #[error("subscribe not supported for this bus type")]
    SubscribeNotSupported,
}

/// A message on the checkout event stream.
///
/// The key is the checkout id, so a partitioned bus delivers events for one
/// checkout in order. The event type travels as a header; the payload is the
/// JSON event body.
#[derive(Debug, Clone)]
pub struct BusMessage {
    pub key: String,
    pub event_type: String,
    pub payload: Vec<u8>,
}

/// Handler for processing messages from the bus.
pub trait MessageHandler: Send + Sync {
    /// Process one message.
    fn handle(&self, msg: BusMessage) -> BoxFuture<'static, Result<()>>;
}

/// Interface for event delivery to downstream consumers.
#[async_trait]
pub trait EventBus: Send + Sync {
    /// Publish one message. At-least-once: callers retry until this returns Ok.
    async fn publish(&self, msg: BusMessage) -> Result<()>;

    /// Register a handler for consumed messages.
    async fn subscribe(&self, handler: Box<dyn MessageHandler>) -> Result<()>;

    /// Start consuming (for bus implementations that require explicit start).
    async fn start_consuming(&self) -> Result<()> {
        Ok(())
    }
}

/// Run every registered handler against a message. Handler failures are
/// logged, never propagated: one consumer's bug must not starve the rest.
pub(crate) async fn dispatch_to_handlers(
    handlers: &Arc<RwLock<Vec<Box<dyn MessageHandler>>>>,
    msg: &BusMessage,
) {
    let handlers = handlers.read().await;
    for handler in handlers.iter() {
        if let Err(e) = handler.handle(msg.clone()).await {
            error!(key = %msg.key, error = %e, "Message handler failed");
        }
    }
}
