//! Server and endpoint configuration types.

use std::time::Duration;

use serde::Deserialize;

/// Server configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Host to bind to.
    pub host: String,
    /// Port for the request surface.
    pub port: u16,
    /// Per-downstream-call deadline in seconds.
    pub call_timeout_secs: u64,
    /// Grace window for in-flight work on shutdown, in seconds.
    pub shutdown_grace_secs: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 50056,
            call_timeout_secs: 5,
            shutdown_grace_secs: 10,
        }
    }
}

impl ServerConfig {
    pub fn call_timeout(&self) -> Duration {
        Duration::from_secs(self.call_timeout_secs)
    }

    pub fn shutdown_grace(&self) -> Duration {
        Duration::from_secs(self.shutdown_grace_secs)
    }
}

/// Downstream service endpoints dialed by the checkout coordinator.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServiceEndpoints {
    /// Cart service address.
    pub cart: String,
    /// Product catalog address.
    pub product: String,
    /// Inventory service address.
    pub inventory: String,
    /// Payment gateway address.
    pub payment: String,
}

impl Default for ServiceEndpoints {
    fn default() -> Self {
        Self {
            cart: "localhost:50052".to_string(),
            product: "localhost:50051".to_string(),
            inventory: "localhost:50053".to_string(),
            payment: "localhost:50054".to_string(),
        }
    }
}
