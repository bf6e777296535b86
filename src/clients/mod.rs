//! Ports for the external collaborators of the checkout saga.
//!
//! The product catalog and payment gateway are separate services; the
//! coordinator only sees these interfaces. The in-crate implementations are
//! a static catalog and a simulated gateway, enough to run a full stack in
//! one process.

use std::collections::HashMap;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use uuid::Uuid;

/// A product as served by the catalog.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Product {
    pub id: i64,
    pub name: String,
    pub price: f64,
}

/// Errors from the product catalog.
#[derive(Debug, thiserror::Error)]
pub enum CatalogError {
    #[error("product not found: {0}")]
    ProductNotFound(i64),

    #[error("catalog unavailable: {0}")]
    Unavailable(String),
}

/// Read-only product catalog.
#[async_trait]
pub trait ProductCatalog: Send + Sync {
    async fn get_product(&self, id: i64) -> Result<Product, CatalogError>;
}

/// Static in-memory catalog.
#[derive(Default)]
pub struct StaticProductCatalog {
    products: RwLock<HashMap<i64, Product>>,
}

impl StaticProductCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn seed(&self, products: Vec<Product>) {
        let mut map = self.products.write().await;
        for product in products {
            map.insert(product.id, product);
        }
    }
}

#[async_trait]
impl ProductCatalog for StaticProductCatalog {
    async fn get_product(&self, id: i64) -> Result<Product, CatalogError> {
        self.products
            .read()
            .await
            .get(&id)
            .cloned()
            .ok_or(CatalogError::ProductNotFound(id))
    }
}

/// Why a charge was refused.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RefusalReason {
    InsufficientFunds,
    PaymentMethodInvalid,
    Other(String),
}

impl std::fmt::Display for RefusalReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RefusalReason::InsufficientFunds => f.write_str("NO_FUNDS"),
            RefusalReason::PaymentMethodInvalid => f.write_str("INVALID_METHOD"),
            RefusalReason::Other(reason) => f.write_str(reason),
        }
    }
}

/// Outcome of a charge attempt. A refusal is a normal outcome, not a
/// transport error.
#[derive(Debug, Clone, PartialEq)]
pub enum ChargeOutcome {
    Approved { payment_id: String },
    Refused { reason: RefusalReason },
}

/// Errors from the payment gateway (transport-level, not refusals).
#[derive(Debug, thiserror::Error)]
pub enum PaymentError {
    #[error("payment gateway unavailable: {0}")]
    Unavailable(String),
}

/// Payment gateway port.
#[async_trait]
pub trait PaymentGateway: Send + Sync {
    async fn charge(&self, checkout_id: &str, amount: &str) -> Result<ChargeOutcome, PaymentError>;
}

/// Simulated payment gateway. Approves everything unless scripted otherwise.
#[derive(Default)]
pub struct SimulatedPaymentGateway {
    refuse_with: RwLock<Option<RefusalReason>>,
    fail_transport: RwLock<bool>,
}

impl SimulatedPaymentGateway {
    pub fn new() -> Self {
        Self::default()
    }

    /// Refuse every subsequent charge with the given reason.
    pub async fn refuse_with(&self, reason: Option<RefusalReason>) {
        *self.refuse_with.write().await = reason;
    }

    /// Fail every subsequent charge at the transport level.
    pub async fn set_fail_transport(&self, fail: bool) {
        *self.fail_transport.write().await = fail;
    }
}

#[async_trait]
impl PaymentGateway for SimulatedPaymentGateway {
    async fn charge(
        &self,
        _checkout_id: &str,
        _amount: &str,
    ) -> Result<ChargeOutcome, PaymentError> {
        if *self.fail_transport.read().await {
            return Err(PaymentError::Unavailable(
                "simulated gateway outage".to_string(),
            ));
        }

        if let Some(reason) = self.refuse_with.read().await.clone() {
            return Ok(ChargeOutcome::Refused { reason });
        }

        Ok(ChargeOutcome::Approved {
            payment_id: Uuid::new_v4().to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn static_catalog_serves_seeded_products() {
        let catalog = StaticProductCatalog::new();
        catalog
            .seed(vec![Product {
                id: 1,
                name: "Widget".to_string(),
                price: 29.99,
            }])
            .await;

        let product = catalog.get_product(1).await.unwrap();
        assert_eq!(product.price, 29.99);

        let missing = catalog.get_product(2).await;
        assert!(matches!(missing, Err(CatalogError::ProductNotFound(2))));
    }

    #[tokio::test]
    async fn simulated_gateway_approves_by_default() {
        let gateway = SimulatedPaymentGateway::new();
        let outcome = gateway.charge("c1", "10.00").await.unwrap();
        assert!(matches!(outcome, ChargeOutcome::Approved { .. }));
    }

    #[tokio::test]
    async fn simulated_gateway_scripted_refusal() {
        let gateway = SimulatedPaymentGateway::new();
        gateway
            .refuse_with(Some(RefusalReason::InsufficientFunds))
            .await;

        let outcome = gateway.charge("c1", "10.00").await.unwrap();
        assert_eq!(
            outcome,
            ChargeOutcome::Refused {
                reason: RefusalReason::InsufficientFunds
            }
        );
    }
}
