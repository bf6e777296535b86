//! Error kinds for the request surface.

use crate::cart::CartError;
use crate::checkout::{CheckoutError, RepositoryError};
use crate::clients::CatalogError;
use crate::inventory::InventoryError;
use crate::orders::OrderError;

/// Transport-neutral error kinds, one per class of caller-visible failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    InvalidArgument,
    NotFound,
    AlreadyExists,
    Unauthenticated,
    PermissionDenied,
    FailedPrecondition,
    ResourceExhausted,
    Unavailable,
    DeadlineExceeded,
    Internal,
}

impl ErrorKind {
    /// HTTP projection applied at the gateway. `FailedPrecondition` is folded
    /// to 400 there rather than 412.
    pub fn http_status(self) -> u16 {
        match self {
            ErrorKind::InvalidArgument => 400,
            ErrorKind::NotFound => 404,
            ErrorKind::AlreadyExists => 409,
            ErrorKind::Unauthenticated => 401,
            ErrorKind::PermissionDenied => 403,
            ErrorKind::FailedPrecondition => 400,
            ErrorKind::ResourceExhausted => 429,
            ErrorKind::Unavailable => 503,
            ErrorKind::DeadlineExceeded => 504,
            ErrorKind::Internal => 500,
        }
    }
}

/// An error crossing the request surface: a kind plus a human-readable
/// message.
#[derive(Debug, thiserror::Error)]
#[error("{kind:?}: {message}")]
pub struct RpcError {
    pub kind: ErrorKind,
    pub message: String,
}

impl RpcError {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    pub fn invalid_argument(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::InvalidArgument, message)
    }
}

impl From<CartError> for RpcError {
    fn from(e: CartError) -> Self {
        let kind = match e {
            CartError::CartNotFound(_) | CartError::ItemNotFound(_) => ErrorKind::NotFound,
            CartError::Malformed(_) => ErrorKind::Internal,
            CartError::Mongo(_) => ErrorKind::Unavailable,
        };
        Self::new(kind, e.to_string())
    }
}

impl From<InventoryError> for RpcError {
    fn from(e: InventoryError) -> Self {
        let kind = match e {
            InventoryError::ProductNotFound(_) | InventoryError::ReservationNotFound(_) => {
                ErrorKind::NotFound
            }
            InventoryError::InsufficientStock { .. }
            | InventoryError::ReservationExpired(_)
            | InventoryError::InvalidStatus { .. } => ErrorKind::FailedPrecondition,
        };
        Self::new(kind, e.to_string())
    }
}

impl From<OrderError> for RpcError {
    fn from(e: OrderError) -> Self {
        let kind = match e {
            OrderError::OrderNotFound(_) => ErrorKind::NotFound,
            OrderError::Duplicate(_) => ErrorKind::AlreadyExists,
            OrderError::Database(_) => ErrorKind::Unavailable,
            OrderError::InvalidStatus(_) | OrderError::Items(_) => ErrorKind::Internal,
        };
        Self::new(kind, e.to_string())
    }
}

impl From<CatalogError> for RpcError {
    fn from(e: CatalogError) -> Self {
        let kind = match e {
            CatalogError::ProductNotFound(_) => ErrorKind::NotFound,
            CatalogError::Unavailable(_) => ErrorKind::Unavailable,
        };
        Self::new(kind, e.to_string())
    }
}

impl From<RepositoryError> for RpcError {
    fn from(e: RepositoryError) -> Self {
        let kind = match e {
            RepositoryError::IdempotencyKeyNotFound | RepositoryError::SessionNotFound(_) => {
                ErrorKind::NotFound
            }
            RepositoryError::DuplicateIdempotencyKey(_) => ErrorKind::AlreadyExists,
            RepositoryError::Database(_) => ErrorKind::Unavailable,
            RepositoryError::InvalidStatus(_) => ErrorKind::Internal,
        };
        Self::new(kind, e.to_string())
    }
}

impl From<CheckoutError> for RpcError {
    fn from(e: CheckoutError) -> Self {
        let kind = match &e {
            CheckoutError::EmptyCart => ErrorKind::FailedPrecondition,
            // A state machine violation is a fault, but callers see it as a
            // precondition failure rather than a 500 with internals attached.
            CheckoutError::IllegalTransition { .. } => ErrorKind::FailedPrecondition,
            CheckoutError::ReservationFailed { source, .. } => {
                return Self::new(RpcError::from_inventory_kind(source), e.to_string())
            }
            CheckoutError::PaymentFailed { .. } => ErrorKind::FailedPrecondition,
            CheckoutError::CompensationFailed { .. } => ErrorKind::Internal,
            CheckoutError::Catalog(CatalogError::ProductNotFound(_)) => ErrorKind::NotFound,
            CheckoutError::Catalog(CatalogError::Unavailable(_)) => ErrorKind::Unavailable,
            CheckoutError::Cart(_) => ErrorKind::Unavailable,
            CheckoutError::Repository(RepositoryError::DuplicateIdempotencyKey(_)) => {
                ErrorKind::AlreadyExists
            }
            CheckoutError::Repository(_) => ErrorKind::Unavailable,
            CheckoutError::DeadlineExceeded(_) => ErrorKind::DeadlineExceeded,
            CheckoutError::Serialization(_) => ErrorKind::Internal,
        };
        Self::new(kind, e.to_string())
    }
}

impl RpcError {
    fn from_inventory_kind(e: &InventoryError) -> ErrorKind {
        match e {
            InventoryError::ProductNotFound(_) | InventoryError::ReservationNotFound(_) => {
                ErrorKind::NotFound
            }
            InventoryError::InsufficientStock { .. }
            | InventoryError::ReservationExpired(_)
            | InventoryError::InvalidStatus { .. } => ErrorKind::FailedPrecondition,
        }
    }
}
