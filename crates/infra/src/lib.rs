//! Infrastructure layer: storage adapters, orchestration, reconciliation.

pub mod notify;
pub mod service;
pub mod stores;
pub mod sync;


pub use notify::{LogNotifier, NoopNotifier, TransitionNotifier};
pub use service::{
    ActiveOrderLine, ItemEdit, NewPurchaseItem, NewPurchaseOrder, PurchasingService,
    TransitSummaryRow,
};
pub use stores::{
    InMemoryProductLedger, InMemoryPurchaseOrderStore, PostgresProductLedger,
    PostgresPurchaseOrderStore, ProductLedger, PurchaseOrderStore, StoreError,
};
pub use sync::SyncReport;
