//! Application configuration.
//!
//! Aggregates configuration from all modules into a single `Config` struct
//! that can be loaded from YAML files or environment variables.

mod messaging;
mod server;
mod storage;

pub use messaging::{MessagingConfig, PollerConfig, CART_CLEARER_GROUP, ORDERS_GROUP};
pub use server::{ServerConfig, ServiceEndpoints};
pub use storage::{CacheConfig, MongodbConfig, PostgresConfig, StorageConfig};

use serde::Deserialize;

/// Main application configuration.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Server configuration (ports, shutdown grace).
    pub server: ServerConfig,
    /// Storage configuration (Postgres, MongoDB, Redis).
    pub storage: StorageConfig,
    /// Messaging configuration (Kafka, poller intervals).
    pub messaging: MessagingConfig,
    /// Downstream service endpoints for the checkout coordinator.
    pub services: ServiceEndpoints,
}

impl Config {
    /// Load configuration from file and environment.
    ///
    /// Configuration sources (in order of priority, later overrides earlier):
    /// 1. `config.yaml` in current directory (if exists)
    /// 2. File specified by `CARTFLOW_CONFIG` environment variable (if set)
    /// 3. Environment variables with `CARTFLOW` prefix (`__` separator)
    /// 4. Legacy unprefixed environment variables (`DB_HOST`, `KAFKA_BROKERS`, ...)
    pub fn load() -> Result<Self, Box<dyn std::error::Error>> {
        use ::config::{Config as ConfigLib, Environment, File, FileFormat};

        let mut builder = ConfigLib::builder()
            .add_source(File::new("config", FileFormat::Yaml).required(false))
            .add_source(File::new("config.yaml", FileFormat::Yaml).required(false));

        if let Ok(config_path) = std::env::var("CARTFLOW_CONFIG") {
            builder = builder.add_source(File::new(&config_path, FileFormat::Yaml).required(true));
        }

        let config = builder
            .add_source(
                Environment::with_prefix("CARTFLOW")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        let mut config: Config = config.try_deserialize()?;
        config.apply_legacy_env();
        Ok(config)
    }

    /// Apply the legacy unprefixed environment variables used by the
    /// deployment manifests.
    fn apply_legacy_env(&mut self) {
        if let Ok(host) = std::env::var("DB_HOST") {
            self.storage.postgres.host = host;
        }
        if let Ok(port) = std::env::var("DB_PORT") {
            if let Ok(p) = port.parse() {
                self.storage.postgres.port = p;
            }
        }
        if let Ok(user) = std::env::var("DB_USER") {
            self.storage.postgres.user = user;
        }
        if let Ok(password) = std::env::var("DB_PASSWORD") {
            self.storage.postgres.password = password;
        }
        if let Ok(name) = std::env::var("DB_NAME") {
            self.storage.postgres.database = name;
        }
        if let Ok(uri) = std::env::var("MONGO_URI") {
            self.storage.mongodb.uri = uri;
        }
        if let Ok(name) = std::env::var("MONGO_DB_NAME") {
            self.storage.mongodb.database = name;
        }
        if let Ok(addr) = std::env::var("REDIS_ADDR") {
            self.storage.cache.addr = addr;
        }
        if let Ok(brokers) = std::env::var("KAFKA_BROKERS") {
            self.messaging.brokers = brokers.split(',').map(|s| s.trim().to_string()).collect();
        }
        if let Ok(port) = std::env::var("GRPC_PORT") {
            if let Ok(p) = port.parse() {
                self.server.port = p;
            }
        }
        if let Ok(addr) = std::env::var("CART_SERVICE_ADDR") {
            self.services.cart = addr;
        }
        if let Ok(addr) = std::env::var("PRODUCT_SERVICE_ADDR") {
            self.services.product = addr;
        }
        if let Ok(addr) = std::env::var("INVENTORY_SERVICE_ADDR") {
            self.services.inventory = addr;
        }
        if let Ok(addr) = std::env::var("PAYMENT_SERVICE_ADDR") {
            self.services.payment = addr;
        }
    }

    /// Create config for testing.
    pub fn for_test() -> Self {
        Self::default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_default() {
        let config = Config::default();
        assert_eq!(config.server.port, 50056);
        assert_eq!(config.messaging.topic, "checkout-outbox");
        assert_eq!(config.storage.postgres.port, 5432);
    }

    #[test]
    fn test_config_for_test() {
        let config = Config::for_test();
        assert_eq!(config.server.host, "0.0.0.0");
    }
}
