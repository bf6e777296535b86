//! In-memory channel-based event bus for single-process mode.
//!
//! Uses a tokio broadcast channel for pub/sub within one process. Useful for
//! local development and tests without external brokers.

use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::{broadcast, RwLock};
use tracing::{debug, error, info};

use super::{BusMessage, EventBus, MessageHandler, Result};

/// Channel capacity for broadcast.
const CHANNEL_CAPACITY: usize = 1024;

/// In-memory event bus using a tokio broadcast channel.
///
/// Each subscriber bus created with [`ChannelEventBus::subscriber`] has its
/// own receiver, so every subscriber sees every message, the in-process
/// equivalent of independent consumer groups.
pub struct ChannelEventBus {
    sender: broadcast::Sender<BusMessage>,
    handlers: Arc<RwLock<Vec<Box<dyn MessageHandler>>>>,
    consuming: Arc<RwLock<bool>>,
}

impl ChannelEventBus {
    pub fn new() -> Self {
        let (sender, _) = broadcast::channel(CHANNEL_CAPACITY);

        info!("Channel event bus initialized");

        Self {
            sender,
            handlers: Arc::new(RwLock::new(Vec::new())),
            consuming: Arc::new(RwLock::new(false)),
        }
    }

    /// Create a subscriber that shares this bus's channel but has its own
    /// handler set and receiver.
    pub fn subscriber(&self) -> Self {
        Self {
            sender: self.sender.clone(),
            handlers: Arc::new(RwLock::new(Vec::new())),
            consuming: Arc::new(RwLock::new(false)),
        }
    }

    async fn start_consuming_impl(&self) -> Result<()> {
        {
            let mut consuming = self.consuming.write().await;
            if *consuming {
                return Ok(());
            }
            *consuming = true;
        }

        let mut receiver = self.sender.subscribe();
        let handlers = self.handlers.clone();

        tokio::spawn(async move {
            loop {
                match receiver.recv().await {
                    Ok(msg) => {
                        debug!(key = %msg.key, "Received message via channel");
                        super::dispatch_to_handlers(&handlers, &msg).await;
                    }
                    Err(broadcast::error::RecvError::Lagged(n)) => {
                        error!(skipped = n, "Channel consumer lagged, skipped messages");
                    }
                    Err(broadcast::error::RecvError::Closed) => {
                        info!("Channel closed, stopping consumer");
                        break;
                    }
                }
            }
        });

        info!("Channel consumer started");
        Ok(())
    }
}

impl Default for ChannelEventBus {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl EventBus for ChannelEventBus {
    async fn publish(&self, msg: BusMessage) -> Result<()> {
        // Ignore the error when no receivers exist; publish-only setups are
        // legitimate.
        match self.sender.send(msg) {
            Ok(receivers) => debug!(receivers = receivers, "Published message to channel"),
            Err(_) => debug!("Published message (no receivers)"),
        }
        Ok(())
    }

    async fn subscribe(&self, handler: Box<dyn MessageHandler>) -> Result<()> {
        let mut handlers = self.handlers.write().await;
        handlers.push(handler);
        Ok(())
    }

    async fn start_consuming(&self) -> Result<()> {
        self.start_consuming_impl().await
    }
}
