//! Mock event bus implementation for testing.

use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::RwLock;

use super::{BusError, BusMessage, EventBus, MessageHandler, Result};

/// Mock event bus for testing.
///
/// Records published messages and can be told to fail publishes. Messages
/// can also be injected directly into subscribed handlers to exercise
/// consumers without a broker.
#[derive(Default)]
pub struct MockEventBus {
    published: RwLock<Vec<BusMessage>>,
    handlers: Arc<RwLock<Vec<Box<dyn MessageHandler>>>>,
    fail_on_publish: RwLock<bool>,
}

impl MockEventBus {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn set_fail_on_publish(&self, fail: bool) {
        *self.fail_on_publish.write().await = fail;
    }

    pub async fn published_count(&self) -> usize {
        self.published.read().await.len()
    }

    pub async fn published(&self) -> Vec<BusMessage> {
        self.published.read().await.clone()
    }

    pub async fn take_published(&self) -> Vec<BusMessage> {
        std::mem::take(&mut *self.published.write().await)
    }

    /// Deliver a message straight to the subscribed handlers, as a broker
    /// redelivery would.
    pub async fn inject(&self, msg: BusMessage) {
        super::dispatch_to_handlers(&self.handlers, &msg).await;
    }
}

#[async_trait]
impl EventBus for MockEventBus {
    async fn publish(&self, msg: BusMessage) -> Result<()> {
        if *self.fail_on_publish.read().await {
            return Err(BusError::Connection("Mock publish failure".to_string()));
        }
        self.published.write().await.push(msg);
        Ok(())
    }

    async fn subscribe(&self, handler: Box<dyn MessageHandler>) -> Result<()> {
        self.handlers.write().await.push(handler);
        Ok(())
    }
}
