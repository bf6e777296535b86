//! Kafka event bus implementation.
//!
//! One topic, partitioned by checkout id: the message key is the aggregate
//! id, which keeps per-checkout ordering inside a partition. The event type
//! travels as a message header. Consumer groups fan the stream out to
//! independent side effects.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use rdkafka::consumer::{Consumer, StreamConsumer};
use rdkafka::message::{Header, Headers, OwnedHeaders};
use rdkafka::producer::{FutureProducer, FutureRecord};
use rdkafka::ClientConfig;
use tokio::sync::RwLock;
use tracing::{debug, error, info, warn};

use super::{BusError, BusMessage, EventBus, MessageHandler, Result};

const EVENT_TYPE_HEADER: &str = "event_type";

/// Configuration for Kafka connection.
#[derive(Clone, Debug)]
pub struct KafkaEventBusConfig {
    /// Kafka bootstrap servers (comma-separated).
    pub bootstrap_servers: String,
    /// Topic carrying checkout events.
    pub topic: String,
    /// Consumer group ID (required for subscribing).
    pub group_id: Option<String>,
}

impl KafkaEventBusConfig {
    /// Create config for publishing only.
    pub fn publisher(bootstrap_servers: impl Into<String>, topic: impl Into<String>) -> Self {
        Self {
            bootstrap_servers: bootstrap_servers.into(),
            topic: topic.into(),
            group_id: None,
        }
    }

    /// Create config for a consumer group subscription.
    pub fn subscriber(
        bootstrap_servers: impl Into<String>,
        topic: impl Into<String>,
        group_id: impl Into<String>,
    ) -> Self {
        Self {
            bootstrap_servers: bootstrap_servers.into(),
            topic: topic.into(),
            group_id: Some(group_id.into()),
        }
    }

    fn build_producer_config(&self) -> ClientConfig {
        let mut config = ClientConfig::new();
        config.set("bootstrap.servers", &self.bootstrap_servers);
        config.set("message.timeout.ms", "5000");
        config.set("acks", "all");
        config.set("enable.idempotence", "true");
        config
    }

    fn build_consumer_config(&self) -> ClientConfig {
        let mut config = ClientConfig::new();
        config.set("bootstrap.servers", &self.bootstrap_servers);
        config.set("enable.auto.commit", "false");
        config.set("auto.offset.reset", "earliest");

        if let Some(ref group_id) = self.group_id {
            config.set("group.id", group_id);
        }

        config
    }
}

/// Kafka event bus implementation.
pub struct KafkaEventBus {
    producer: FutureProducer,
    config: KafkaEventBusConfig,
    handlers: Arc<RwLock<Vec<Box<dyn MessageHandler>>>>,
    consumer: Option<Arc<StreamConsumer>>,
}

impl KafkaEventBus {
    /// Create a new Kafka event bus.
    pub async fn new(config: KafkaEventBusConfig) -> Result<Self> {
        let producer: FutureProducer = config
            .build_producer_config()
            .create()
            .map_err(|e| BusError::Connection(format!("Failed to create Kafka producer: {e}")))?;

        info!(
            bootstrap_servers = %config.bootstrap_servers,
            topic = %config.topic,
            "Connected to Kafka"
        );

        // Create consumer if group_id is configured
        let consumer = if config.group_id.is_some() {
            let consumer: StreamConsumer = config.build_consumer_config().create().map_err(|e| {
                BusError::Connection(format!("Failed to create Kafka consumer: {e}"))
            })?;
            Some(Arc::new(consumer))
        } else {
            None
        };

        Ok(Self {
            producer,
            config,
            handlers: Arc::new(RwLock::new(Vec::new())),
            consumer,
        })
    }

    /// Subscribe to the topic and start the consume loop.
    async fn consume(&self) -> Result<()> {
        let consumer = self
            .consumer
            .as_ref()
            .ok_or_else(|| {
                BusError::Subscribe(
                    "No consumer configured. Use KafkaEventBusConfig::subscriber()".to_string(),
                )
            })?
            .clone();

        consumer
            .subscribe(&[self.config.topic.as_str()])
            .map_err(|e| BusError::Subscribe(format!("Failed to subscribe to topic: {e}")))?;

        info!(topic = %self.config.topic, group = ?self.config.group_id, "Subscribed to Kafka topic");

        let handlers = self.handlers.clone();

        // Spawn consumer task
        tokio::spawn(async move {
            use futures::StreamExt;
            use rdkafka::message::Message as KafkaMessage;

            let mut stream = consumer.stream();

            while let Some(result) = stream.next().await {
                match result {
                    Ok(message) => {
                        let payload = match message.payload() {
                            Some(p) => p.to_vec(),
                            None => {
                                warn!("Received message with no payload");
                                continue;
                            }
                        };

                        let key = message
                            .key()
                            .map(|k| String::from_utf8_lossy(k).into_owned())
                            .unwrap_or_default();

                        let event_type = message
                            .headers()
                            .and_then(|headers| {
                                headers.iter().find_map(|h| {
                                    (h.key == EVENT_TYPE_HEADER)
                                        .then(|| h.value)
                                        .flatten()
                                        .map(|v| String::from_utf8_lossy(v).into_owned())
                                })
                            })
                            .unwrap_or_default();

                        debug!(
                            topic = %message.topic(),
                            partition = message.partition(),
                            offset = message.offset(),
                            key = %key,
                            "Received message"
                        );

                        let msg = BusMessage {
                            key,
                            event_type,
                            payload,
                        };
                        super::dispatch_to_handlers(&handlers, &msg).await;

                        // Commit after handlers ran; handler errors are
                        // logged, not retried via redelivery.
                        if let Err(e) =
                            consumer.commit_message(&message, rdkafka::consumer::CommitMode::Async)
                        {
                            error!(error = %e, "Failed to commit offset");
                        }
                    }
                    Err(e) => {
                        error!(error = %e, "Kafka consumer error");
                    }
                }
            }
        });

        Ok(())
    }
}

#[async_trait]
impl EventBus for KafkaEventBus {
    async fn publish(&self, msg: BusMessage) -> Result<()> {
        let headers = OwnedHeaders::new().insert(Header {
            key: EVENT_TYPE_HEADER,
            value: Some(msg.event_type.as_bytes()),
        });

        let record = FutureRecord::to(&self.config.topic)
            .key(&msg.key)
            .payload(&msg.payload)
            .headers(headers);

        self.producer
            .send(record, Duration::from_secs(5))
            .await
            .map_err(|(e, _)| BusError::Publish(format!("Failed to publish: {e}")))?;

        debug!(
            topic = %self.config.topic,
            key = %msg.key,
            event_type = %msg.event_type,
            "Published message to Kafka"
        );

        Ok(())
    }

    async fn subscribe(&self, handler: Box<dyn MessageHandler>) -> Result<()> {
        if self.consumer.is_none() {
            return Err(BusError::Subscribe(
                "Cannot subscribe: no consumer configured. Use KafkaEventBusConfig::subscriber()"
                    .to_string(),
            ));
        }

        let mut handlers = self.handlers.write().await;
        handlers.push(handler);

        Ok(())
    }

    async fn start_consuming(&self) -> Result<()> {
        self.consume().await
    }
}
