//! Core domain types shared across services.

pub mod cart;
pub mod checkout;
pub mod inventory;
pub mod order;

pub use cart::{Cart, CartItem};
pub use checkout::{
    CartSnapshot, CartSnapshotItem, CheckoutCompleted, CheckoutSession, CheckoutStatus,
};
pub use inventory::{Reservation, ReservationItem, ReservationStatus, StockInfo};
pub use order::{Order, OrderItem, OrderStatus};
