//! Cartflow - order-fulfillment backend.
//!
//! Cooperating services that take a user's shopping cart through checkout:
//! reserve inventory, charge payment, persist the order, and empty the cart,
//! with exactly-once order creation across service and process failures.
//!
//! The moving parts:
//! - `checkout`: the saga coordinator and its durable session repository
//! - `outbox`: at-least-once event fan-out plus stuck-session recovery
//! - `inventory`: in-memory stock with TTL'd reservations
//! - `cart`: durable carts with a cache-aside read path
//! - `orders`: the idempotent order store fed from the event stream
//! - `consumers`: bus handlers for order creation and cart clearing
//! - `rpc`: request validation, metadata propagation, error mapping

pub mod bus;
pub mod cart;
pub mod checkout;
pub mod clients;
pub mod config;
pub mod consumers;
pub mod domain;
pub mod inventory;
pub mod orders;
pub mod outbox;
pub mod rpc;
pub mod shutdown;

// Re-export common types for library usage
pub use bus::{BusError, BusMessage, EventBus, MessageHandler};
pub use checkout::{CheckoutCoordinator, CheckoutError, CheckoutRepository};
pub use config::Config;
pub use domain::{CheckoutSession, CheckoutStatus};
