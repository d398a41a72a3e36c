//! Storage abstractions for the product ledger and purchase orders.
//!
//! Two backends per store: an in-memory twin for tests/dev and a Postgres
//! implementation for production. Domain code only ever sees the traits.

pub mod ledger;
pub mod orders;
pub mod postgres;

pub use ledger::{InMemoryProductLedger, ProductLedger};
pub use orders::{InMemoryPurchaseOrderStore, PurchaseOrderStore};
pub use postgres::{PostgresProductLedger, PostgresPurchaseOrderStore};

use thiserror::Error;

use restock_core::DomainError;

/// Storage-layer error.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Optimistic concurrency failure (stale version, duplicate insert).
    #[error("concurrency conflict: {0}")]
    Concurrency(String),

    /// The addressed row does not exist.
    #[error("not found: {0}")]
    NotFound(String),

    /// Backend failure (lock poisoning, connectivity, SQL errors).
    #[error("storage backend error: {0}")]
    Backend(String),

    /// A domain rule rejected the mutation inside the store's atomic boundary.
    #[error(transparent)]
    Domain(#[from] DomainError),
}

impl StoreError {
    pub fn concurrency(msg: impl Into<String>) -> Self {
        Self::Concurrency(msg.into())
    }

    pub fn backend(msg: impl Into<String>) -> Self {
        Self::Backend(msg.into())
    }
}
