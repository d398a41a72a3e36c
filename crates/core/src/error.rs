//! Domain error model.

use thiserror::Error;

use crate::id::AggregateId;

/// Result type used across the domain layer.
pub type DomainResult<T> = Result<T, DomainError>;

/// Domain-level error.
///
/// Keep this focused on deterministic, business/domain failures (validation,
/// invariants, illegal transitions). Infrastructure failures are mapped in at
/// the service boundary via `Storage`.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DomainError {
    /// A referenced product does not exist in the ledger.
    #[error("product not found: {0}")]
    ProductNotFound(AggregateId),

    /// A referenced purchase order does not exist.
    #[error("purchase order not found: {0}")]
    OrderNotFound(AggregateId),

    /// A zero/negative quantity or a negative cost was supplied.
    #[error("invalid quantity: {0}")]
    InvalidQuantity(String),

    /// The requested status change is not reachable from the current status.
    #[error("illegal transition for order {order_id}: '{from}' -> '{to}'")]
    IllegalTransition {
        order_id: AggregateId,
        from: &'static str,
        to: &'static str,
    },

    /// A domain invariant was violated (e.g. a delta would drive a ledger
    /// quantity negative).
    #[error("invariant violated: {0}")]
    InvariantViolation(String),

    /// A value failed validation (e.g. malformed input).
    #[error("validation failed: {0}")]
    Validation(String),

    /// An identifier was invalid (e.g. parse failure).
    #[error("invalid identifier: {0}")]
    InvalidId(String),

    /// A conflict occurred (stale version / optimistic concurrency).
    #[error("conflict: {0}")]
    Conflict(String),

    /// The storage backend failed; the logical operation may be retried.
    #[error("storage failure: {0}")]
    Storage(String),
}

impl DomainError {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn invariant(msg: impl Into<String>) -> Self {
        Self::InvariantViolation(msg.into())
    }

    pub fn invalid_quantity(msg: impl Into<String>) -> Self {
        Self::InvalidQuantity(msg.into())
    }

    pub fn invalid_id(msg: impl Into<String>) -> Self {
        Self::InvalidId(msg.into())
    }

    pub fn conflict(msg: impl Into<String>) -> Self {
        Self::Conflict(msg.into())
    }

    pub fn storage(msg: impl Into<String>) -> Self {
        Self::Storage(msg.into())
    }
}
