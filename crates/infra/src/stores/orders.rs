//! Purchase order storage.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use restock_core::ExpectedVersion;
use restock_purchasing::{PurchaseOrder, PurchaseOrderId};

use super::StoreError;

/// Repository contract for purchase orders.
///
/// Orders and their line items are owned exclusively by one order, so no
/// cross-order locking is needed; writes use optimistic concurrency on the
/// order's version instead.
pub trait PurchaseOrderStore: Send + Sync {
    /// Persist a new order. Fails if the id already exists.
    fn insert(&self, order: &PurchaseOrder) -> Result<(), StoreError>;

    fn get(&self, id: PurchaseOrderId) -> Result<Option<PurchaseOrder>, StoreError>;

    /// Compare-and-swap overwrite: `expected` is checked against the stored
    /// version; a mismatch fails with `StoreError::Concurrency` and leaves
    /// the stored order untouched.
    fn update(&self, order: &PurchaseOrder, expected: ExpectedVersion) -> Result<(), StoreError>;

    fn list(&self) -> Result<Vec<PurchaseOrder>, StoreError>;

    /// Orders currently in an active status — the transit-bearing set the
    /// sync routine and the summary report recompute from.
    fn list_active(&self) -> Result<Vec<PurchaseOrder>, StoreError>;
}

impl<S> PurchaseOrderStore for Arc<S>
where
    S: PurchaseOrderStore + ?Sized,
{
    fn insert(&self, order: &PurchaseOrder) -> Result<(), StoreError> {
        (**self).insert(order)
    }

    fn get(&self, id: PurchaseOrderId) -> Result<Option<PurchaseOrder>, StoreError> {
        (**self).get(id)
    }

    fn update(&self, order: &PurchaseOrder, expected: ExpectedVersion) -> Result<(), StoreError> {
        (**self).update(order, expected)
    }

    fn list(&self) -> Result<Vec<PurchaseOrder>, StoreError> {
        (**self).list()
    }

    fn list_active(&self) -> Result<Vec<PurchaseOrder>, StoreError> {
        (**self).list_active()
    }
}

/// In-memory purchase order store for tests/dev.
#[derive(Debug, Default)]
pub struct InMemoryPurchaseOrderStore {
    inner: RwLock<HashMap<PurchaseOrderId, PurchaseOrder>>,
}

impl InMemoryPurchaseOrderStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl PurchaseOrderStore for InMemoryPurchaseOrderStore {
    fn insert(&self, order: &PurchaseOrder) -> Result<(), StoreError> {
        let mut map = self
            .inner
            .write()
            .map_err(|_| StoreError::backend("order store lock poisoned"))?;
        if map.contains_key(&order.id()) {
            return Err(StoreError::concurrency(format!(
                "purchase order {} already exists",
                order.id()
            )));
        }
        map.insert(order.id(), order.clone());
        Ok(())
    }

    fn get(&self, id: PurchaseOrderId) -> Result<Option<PurchaseOrder>, StoreError> {
        let map = self
            .inner
            .read()
            .map_err(|_| StoreError::backend("order store lock poisoned"))?;
        Ok(map.get(&id).cloned())
    }

    fn update(&self, order: &PurchaseOrder, expected: ExpectedVersion) -> Result<(), StoreError> {
        let mut map = self
            .inner
            .write()
            .map_err(|_| StoreError::backend("order store lock poisoned"))?;
        let existing = map
            .get(&order.id())
            .ok_or_else(|| StoreError::NotFound(order.id().to_string()))?;
        if !expected.matches(existing.version()) {
            return Err(StoreError::concurrency(format!(
                "purchase order {}: expected {expected:?}, found version {}",
                order.id(),
                existing.version()
            )));
        }
        map.insert(order.id(), order.clone());
        Ok(())
    }

    fn list(&self) -> Result<Vec<PurchaseOrder>, StoreError> {
        let map = self
            .inner
            .read()
            .map_err(|_| StoreError::backend("order store lock poisoned"))?;
        Ok(map.values().cloned().collect())
    }

    fn list_active(&self) -> Result<Vec<PurchaseOrder>, StoreError> {
        let map = self
            .inner
            .read()
            .map_err(|_| StoreError::backend("order store lock poisoned"))?;
        Ok(map
            .values()
            .filter(|o| o.status().is_active())
            .cloned()
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use std::str::FromStr;

    use chrono::Utc;
    use rust_decimal::Decimal;
    use serde_json::Value as JsonValue;

    use super::*;
    use restock_core::AggregateId;
    use restock_inventory::ProductId;
    use restock_purchasing::{PurchaseItem, PurchaseItemId, PurchaseOrderStatus};

    fn test_order() -> PurchaseOrder {
        let item = PurchaseItem::new(
            PurchaseItemId::new(AggregateId::new()),
            ProductId::new(AggregateId::new()),
            5,
            Decimal::from_str("2.00").unwrap(),
        )
        .unwrap();
        PurchaseOrder::new(
            PurchaseOrderId::new(AggregateId::new()),
            vec![item],
            JsonValue::Null,
            false,
            None,
            Utc::now(),
        )
        .unwrap()
    }

    #[test]
    fn stale_update_is_rejected() {
        let store = InMemoryPurchaseOrderStore::new();
        let mut order = test_order();
        store.insert(&order).unwrap();

        order.transition_to(PurchaseOrderStatus::Sent).unwrap();
        store
            .update(&order, ExpectedVersion::Exact(0))
            .unwrap();

        // A second writer still holding version 0 must lose.
        let err = store
            .update(&order, ExpectedVersion::Exact(0))
            .unwrap_err();
        assert!(matches!(err, StoreError::Concurrency(_)));

        let stored = store.get(order.id()).unwrap().unwrap();
        assert_eq!(stored.status(), PurchaseOrderStatus::Sent);
    }

    #[test]
    fn list_active_filters_on_status() {
        let store = InMemoryPurchaseOrderStore::new();

        let draft = test_order();
        store.insert(&draft).unwrap();

        let mut sent = test_order();
        store.insert(&sent).unwrap();
        sent.transition_to(PurchaseOrderStatus::Sent).unwrap();
        store.update(&sent, ExpectedVersion::Exact(0)).unwrap();

        let mut cancelled = test_order();
        store.insert(&cancelled).unwrap();
        cancelled
            .transition_to(PurchaseOrderStatus::Cancelled)
            .unwrap();
        store
            .update(&cancelled, ExpectedVersion::Exact(0))
            .unwrap();

        let active = store.list_active().unwrap();
        assert_eq!(active.len(), 1);
        assert_eq!(active[0].id(), sent.id());
    }
}
