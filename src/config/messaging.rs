//! Messaging and poller configuration types.

use std::time::Duration;

use serde::Deserialize;

/// Kafka consumer group for the orders writer.
pub const ORDERS_GROUP: &str = "orders-service";
/// Kafka consumer group for the cart clearer.
pub const CART_CLEARER_GROUP: &str = "cart-service-consumer";

/// Messaging configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct MessagingConfig {
    /// Kafka bootstrap servers.
    pub brokers: Vec<String>,
    /// Topic for checkout events, partitioned by checkout id.
    pub topic: String,
    /// Outbox poller intervals.
    pub poller: PollerConfig,
}

impl Default for MessagingConfig {
    fn default() -> Self {
        Self {
            brokers: vec!["localhost:9092".to_string()],
            topic: "checkout-outbox".to_string(),
            poller: PollerConfig::default(),
        }
    }
}

impl MessagingConfig {
    /// Comma-joined broker list for rdkafka.
    pub fn bootstrap_servers(&self) -> String {
        self.brokers.join(",")
    }
}

/// Outbox poller configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PollerConfig {
    /// Interval between unpublished-event scans, in milliseconds.
    pub event_tick_ms: u64,
    /// Interval between stuck-session scans, in milliseconds.
    pub recovery_tick_ms: u64,
    /// Maximum events fetched per tick.
    pub batch_size: i64,
}

impl Default for PollerConfig {
    fn default() -> Self {
        Self {
            event_tick_ms: 1_000,
            recovery_tick_ms: 5_000,
            batch_size: 100,
        }
    }
}

impl PollerConfig {
    pub fn event_tick(&self) -> Duration {
        Duration::from_millis(self.event_tick_ms)
    }

    pub fn recovery_tick(&self) -> Duration {
        Duration::from_millis(self.recovery_tick_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_messaging_defaults() {
        let config = MessagingConfig::default();
        assert_eq!(config.topic, "checkout-outbox");
        assert_eq!(config.bootstrap_servers(), "localhost:9092");
        assert_eq!(config.poller.event_tick(), Duration::from_secs(1));
        assert_eq!(config.poller.recovery_tick(), Duration::from_secs(5));
    }
}
