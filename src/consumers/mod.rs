//! Downstream consumers of the checkout event stream.
//!
//! Each consumer runs on its own consumer group, so every side effect sees
//! every event independently: the orders writer creates the authoritative
//! order record, the cart clearer empties the user's cart. Adding a new side
//! effect is adding a new consumer group.

pub mod cart_clearer;
pub mod orders;

pub use cart_clearer::CartClearer;
pub use orders::OrdersConsumer;
