//! Product ledger domain module.
//!
//! This crate contains the per-product ledger state (stock, transit,
//! weighted-average purchase cost) and the cost averaging engine, implemented
//! purely as deterministic domain logic (no IO, no HTTP, no storage).

pub mod costing;
pub mod product;

pub use costing::new_avg_price;
pub use product::{Product, ProductId};
