//! Purchasing domain module (purchase orders and their lifecycle).
//!
//! This crate contains business rules for purchase orders, implemented purely
//! as deterministic domain logic (no IO, no HTTP, no storage).

pub mod order;
pub mod status;

pub use order::{
    validate_cost_price, validate_quantity, PurchaseItem, PurchaseItemId, PurchaseOrder,
    PurchaseOrderId,
};
pub use status::{PurchaseOrderStatus, TransitionEffect};
