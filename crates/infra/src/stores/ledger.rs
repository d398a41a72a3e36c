//! Product ledger storage: the one resource shared across concurrent orders.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use rust_decimal::Decimal;

use restock_inventory::{Product, ProductId};

use super::StoreError;

/// Repository contract for the product ledger.
///
/// Every mutating operation is atomic and linearizable per product: two
/// concurrent commits touching the same product must never lose an
/// increment. Implementations enforce this with a lock (in-memory), or with
/// guarded atomic updates / row locks (Postgres).
pub trait ProductLedger: Send + Sync {
    fn get(&self, id: ProductId) -> Result<Option<Product>, StoreError>;

    /// Register a product row (invoked by the catalog when a product is
    /// first created). Fails if the row already exists.
    fn insert(&self, product: Product) -> Result<(), StoreError>;

    fn list(&self) -> Result<Vec<Product>, StoreError>;

    /// Atomically add `delta` (positive or negative) to the product's
    /// transit quantity. Strict: a delta that would drive the quantity
    /// negative fails with `StoreError::Domain(InvariantViolation)` and
    /// leaves the row untouched.
    fn apply_transit_delta(&self, id: ProductId, delta: i64) -> Result<Product, StoreError>;

    /// Atomically release up to `quantity` units from transit, clamping at
    /// zero. Returns the updated product and the clamped drift.
    fn release_transit(&self, id: ProductId, quantity: i64)
    -> Result<(Product, i64), StoreError>;

    /// Atomically receive `quantity` units at `unit_cost`: clamped transit
    /// decrement, stock increment, weighted-average recompute. Returns the
    /// updated product and the clamped drift.
    fn receive(
        &self,
        id: ProductId,
        quantity: i64,
        unit_cost: Decimal,
    ) -> Result<(Product, i64), StoreError>;

    /// Overwrite the stored transit quantity (reconciliation only).
    /// Returns the previous value.
    fn set_transit(&self, id: ProductId, value: i64) -> Result<i64, StoreError>;
}

impl<S> ProductLedger for Arc<S>
where
    S: ProductLedger + ?Sized,
{
    fn get(&self, id: ProductId) -> Result<Option<Product>, StoreError> {
        (**self).get(id)
    }

    fn insert(&self, product: Product) -> Result<(), StoreError> {
        (**self).insert(product)
    }

    fn list(&self) -> Result<Vec<Product>, StoreError> {
        (**self).list()
    }

    fn apply_transit_delta(&self, id: ProductId, delta: i64) -> Result<Product, StoreError> {
        (**self).apply_transit_delta(id, delta)
    }

    fn release_transit(
        &self,
        id: ProductId,
        quantity: i64,
    ) -> Result<(Product, i64), StoreError> {
        (**self).release_transit(id, quantity)
    }

    fn receive(
        &self,
        id: ProductId,
        quantity: i64,
        unit_cost: Decimal,
    ) -> Result<(Product, i64), StoreError> {
        (**self).receive(id, quantity, unit_cost)
    }

    fn set_transit(&self, id: ProductId, value: i64) -> Result<i64, StoreError> {
        (**self).set_transit(id, value)
    }
}

/// In-memory product ledger for tests/dev.
///
/// Mutations run under a single write lock, which makes them linearizable
/// per product (conservatively, across all products). Not optimized for
/// performance.
#[derive(Debug, Default)]
pub struct InMemoryProductLedger {
    inner: RwLock<HashMap<ProductId, Product>>,
}

impl InMemoryProductLedger {
    pub fn new() -> Self {
        Self::default()
    }

    fn with_product<T>(
        &self,
        id: ProductId,
        f: impl FnOnce(&mut Product) -> Result<T, StoreError>,
    ) -> Result<T, StoreError> {
        let mut map = self
            .inner
            .write()
            .map_err(|_| StoreError::backend("product ledger lock poisoned"))?;
        let product = map
            .get_mut(&id)
            .ok_or_else(|| StoreError::NotFound(id.to_string()))?;
        f(product)
    }
}

impl ProductLedger for InMemoryProductLedger {
    fn get(&self, id: ProductId) -> Result<Option<Product>, StoreError> {
        let map = self
            .inner
            .read()
            .map_err(|_| StoreError::backend("product ledger lock poisoned"))?;
        Ok(map.get(&id).cloned())
    }

    fn insert(&self, product: Product) -> Result<(), StoreError> {
        let mut map = self
            .inner
            .write()
            .map_err(|_| StoreError::backend("product ledger lock poisoned"))?;
        if map.contains_key(&product.id()) {
            return Err(StoreError::concurrency(format!(
                "product {} already exists",
                product.id()
            )));
        }
        map.insert(product.id(), product);
        Ok(())
    }

    fn list(&self) -> Result<Vec<Product>, StoreError> {
        let map = self
            .inner
            .read()
            .map_err(|_| StoreError::backend("product ledger lock poisoned"))?;
        Ok(map.values().cloned().collect())
    }

    fn apply_transit_delta(&self, id: ProductId, delta: i64) -> Result<Product, StoreError> {
        self.with_product(id, |product| {
            product.apply_transit_delta(delta)?;
            Ok(product.clone())
        })
    }

    fn release_transit(
        &self,
        id: ProductId,
        quantity: i64,
    ) -> Result<(Product, i64), StoreError> {
        self.with_product(id, |product| {
            let drift = product.release_transit(quantity)?;
            Ok((product.clone(), drift))
        })
    }

    fn receive(
        &self,
        id: ProductId,
        quantity: i64,
        unit_cost: Decimal,
    ) -> Result<(Product, i64), StoreError> {
        self.with_product(id, |product| {
            let drift = product.receive(quantity, unit_cost)?;
            Ok((product.clone(), drift))
        })
    }

    fn set_transit(&self, id: ProductId, value: i64) -> Result<i64, StoreError> {
        self.with_product(id, |product| {
            let previous = product.quantity_in_transit();
            product.set_transit(value)?;
            Ok(previous)
        })
    }
}

#[cfg(test)]
mod tests {
    use std::str::FromStr;

    use super::*;
    use restock_core::{AggregateId, DomainError};

    fn dec(s: &str) -> Decimal {
        Decimal::from_str(s).unwrap()
    }

    fn seeded_ledger() -> (InMemoryProductLedger, ProductId) {
        let ledger = InMemoryProductLedger::new();
        let id = ProductId::new(AggregateId::new());
        ledger.insert(Product::new(id)).unwrap();
        (ledger, id)
    }

    #[test]
    fn unknown_product_is_not_found() {
        let ledger = InMemoryProductLedger::new();
        let id = ProductId::new(AggregateId::new());

        assert!(ledger.get(id).unwrap().is_none());
        assert!(matches!(
            ledger.apply_transit_delta(id, 1),
            Err(StoreError::NotFound(_))
        ));
    }

    #[test]
    fn duplicate_insert_is_a_conflict() {
        let (ledger, id) = seeded_ledger();
        assert!(matches!(
            ledger.insert(Product::new(id)),
            Err(StoreError::Concurrency(_))
        ));
    }

    #[test]
    fn strict_delta_surfaces_the_domain_error() {
        let (ledger, id) = seeded_ledger();
        let err = ledger.apply_transit_delta(id, -1).unwrap_err();
        assert!(matches!(
            err,
            StoreError::Domain(DomainError::InvariantViolation(_))
        ));
        assert_eq!(ledger.get(id).unwrap().unwrap().quantity_in_transit(), 0);
    }

    #[test]
    fn receive_updates_the_row_atomically() {
        let (ledger, id) = seeded_ledger();
        ledger.apply_transit_delta(id, 10).unwrap();

        let (product, drift) = ledger.receive(id, 10, dec("100.00")).unwrap();
        assert_eq!(drift, 0);
        assert_eq!(product.stock_quantity(), 10);
        assert_eq!(product.quantity_in_transit(), 0);
        assert_eq!(product.avg_purchase_price(), dec("100.00"));
    }

    #[test]
    fn concurrent_deltas_lose_no_increment() {
        let (ledger, id) = seeded_ledger();
        let ledger = Arc::new(ledger);

        let mut handles = Vec::new();
        for _ in 0..8 {
            let ledger = Arc::clone(&ledger);
            handles.push(std::thread::spawn(move || {
                for _ in 0..50 {
                    ledger.apply_transit_delta(id, 1).unwrap();
                }
            }));
        }
        for handle in handles {
            handle.join().unwrap();
        }

        assert_eq!(ledger.get(id).unwrap().unwrap().quantity_in_transit(), 400);
    }
}
