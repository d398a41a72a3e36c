use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use restock_core::{AggregateId, DomainError, DomainResult};

use crate::costing;

/// Product identifier.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ProductId(pub AggregateId);

impl ProductId {
    pub fn new(id: AggregateId) -> Self {
        Self(id)
    }
}

impl core::fmt::Display for ProductId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        core::fmt::Display::fmt(&self.0, f)
    }
}

/// Per-product ledger state.
///
/// `quantity_in_transit` counts units committed to open purchase orders but
/// not yet received; `stock_quantity` counts units physically on hand. Both
/// are invariantly non-negative. Sales/fulfillment deduct stock elsewhere;
/// this aggregate only ever *increases* stock, on receipt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Product {
    id: ProductId,
    stock_quantity: i64,
    quantity_in_transit: i64,
    avg_purchase_price: Decimal,
    version: u64,
}

impl Product {
    /// A freshly cataloged product: nothing on hand, nothing in transit.
    pub fn new(id: ProductId) -> Self {
        Self {
            id,
            stock_quantity: 0,
            quantity_in_transit: 0,
            avg_purchase_price: Decimal::ZERO,
            version: 0,
        }
    }

    /// Rehydrate from stored fields, re-checking the non-negativity
    /// invariants a buggy backend could have violated.
    pub fn from_parts(
        id: ProductId,
        stock_quantity: i64,
        quantity_in_transit: i64,
        avg_purchase_price: Decimal,
        version: u64,
    ) -> DomainResult<Self> {
        if stock_quantity < 0 {
            return Err(DomainError::invariant(format!(
                "product {id}: stored stock quantity is negative ({stock_quantity})"
            )));
        }
        if quantity_in_transit < 0 {
            return Err(DomainError::invariant(format!(
                "product {id}: stored transit quantity is negative ({quantity_in_transit})"
            )));
        }
        if avg_purchase_price < Decimal::ZERO {
            return Err(DomainError::invariant(format!(
                "product {id}: stored average price is negative ({avg_purchase_price})"
            )));
        }
        Ok(Self {
            id,
            stock_quantity,
            quantity_in_transit,
            avg_purchase_price,
            version,
        })
    }

    pub fn id(&self) -> ProductId {
        self.id
    }

    pub fn stock_quantity(&self) -> i64 {
        self.stock_quantity
    }

    pub fn quantity_in_transit(&self) -> i64 {
        self.quantity_in_transit
    }

    pub fn avg_purchase_price(&self) -> Decimal {
        self.avg_purchase_price
    }

    pub fn version(&self) -> u64 {
        self.version
    }

    /// Add `delta` (positive or negative) to the transit quantity.
    ///
    /// Strict: fails without mutating if the result would go negative.
    /// Used when committing an order and when editing a committed line item,
    /// where rejecting the operation is the correct outcome.
    pub fn apply_transit_delta(&mut self, delta: i64) -> DomainResult<()> {
        let new_transit = self.quantity_in_transit + delta;
        if new_transit < 0 {
            return Err(DomainError::invariant(format!(
                "product {}: transit delta {delta:+} would drive quantity in transit negative (currently {})",
                self.id, self.quantity_in_transit
            )));
        }
        self.quantity_in_transit = new_transit;
        self.version += 1;
        Ok(())
    }

    /// Remove up to `quantity` units from transit, clamping at zero.
    ///
    /// Returns the drift: how many of the requested units were *not* in
    /// transit. Callers log and count a non-zero drift; terminal transitions
    /// are never blocked on bookkeeping drift.
    pub fn release_transit(&mut self, quantity: i64) -> DomainResult<i64> {
        if quantity < 0 {
            return Err(DomainError::invalid_quantity(format!(
                "release quantity must not be negative (got {quantity})"
            )));
        }
        let drift = (quantity - self.quantity_in_transit).max(0);
        self.quantity_in_transit = (self.quantity_in_transit - quantity).max(0);
        self.version += 1;
        Ok(drift)
    }

    /// Receive `quantity` units at `unit_cost`: move them from transit into
    /// stock and fold them into the weighted-average purchase price, using
    /// the pre-receipt stock quantity as the weight base.
    ///
    /// The transit decrement clamps at zero like [`release_transit`];
    /// the returned drift reports how far the books were off.
    ///
    /// [`release_transit`]: Product::release_transit
    pub fn receive(&mut self, quantity: i64, unit_cost: Decimal) -> DomainResult<i64> {
        // Validates quantity/cost; computed before any mutation so a
        // rejected receipt leaves the ledger untouched.
        let new_avg = costing::new_avg_price(
            self.stock_quantity,
            self.avg_purchase_price,
            quantity,
            unit_cost,
        )?;

        let drift = (quantity - self.quantity_in_transit).max(0);
        self.quantity_in_transit = (self.quantity_in_transit - quantity).max(0);
        self.stock_quantity += quantity;
        self.avg_purchase_price = new_avg;
        self.version += 1;
        Ok(drift)
    }

    /// Overwrite the transit quantity (reconciliation only).
    ///
    /// Returns whether the stored value actually changed.
    pub fn set_transit(&mut self, value: i64) -> DomainResult<bool> {
        if value < 0 {
            return Err(DomainError::invalid_quantity(format!(
                "transit quantity must not be negative (got {value})"
            )));
        }
        if self.quantity_in_transit == value {
            return Ok(false);
        }
        self.quantity_in_transit = value;
        self.version += 1;
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use std::str::FromStr;

    use super::*;
    use proptest::prelude::*;

    fn dec(s: &str) -> Decimal {
        Decimal::from_str(s).unwrap()
    }

    fn test_product() -> Product {
        Product::new(ProductId::new(AggregateId::new()))
    }

    #[test]
    fn transit_delta_cannot_go_negative() {
        let mut product = test_product();
        product.apply_transit_delta(5).unwrap();

        let err = product.apply_transit_delta(-6).unwrap_err();
        assert!(matches!(err, DomainError::InvariantViolation(_)));
        // Failed delta must not mutate.
        assert_eq!(product.quantity_in_transit(), 5);
    }

    #[test]
    fn receive_moves_transit_into_stock_and_sets_price() {
        let mut product = test_product();
        product.apply_transit_delta(10).unwrap();

        let drift = product.receive(10, dec("100.00")).unwrap();
        assert_eq!(drift, 0);
        assert_eq!(product.quantity_in_transit(), 0);
        assert_eq!(product.stock_quantity(), 10);
        assert_eq!(product.avg_purchase_price(), dec("100.00"));
    }

    #[test]
    fn receive_weights_existing_stock() {
        let mut product = test_product();
        product.apply_transit_delta(20).unwrap();
        product.receive(10, dec("5.00")).unwrap();

        product.receive(10, dec("7.00")).unwrap();
        assert_eq!(product.stock_quantity(), 20);
        assert_eq!(product.avg_purchase_price(), dec("6.00"));
    }

    #[test]
    fn receive_clamps_transit_and_reports_drift() {
        let mut product = test_product();
        product.apply_transit_delta(3).unwrap();

        let drift = product.receive(10, dec("2.00")).unwrap();
        assert_eq!(drift, 7);
        assert_eq!(product.quantity_in_transit(), 0);
        assert_eq!(product.stock_quantity(), 10);
    }

    #[test]
    fn rejected_receive_leaves_state_untouched() {
        let mut product = test_product();
        product.apply_transit_delta(10).unwrap();
        let before = product.clone();

        let err = product.receive(0, dec("2.00")).unwrap_err();
        assert!(matches!(err, DomainError::InvalidQuantity(_)));
        assert_eq!(product, before);
    }

    #[test]
    fn release_clamps_at_zero() {
        let mut product = test_product();
        product.apply_transit_delta(4).unwrap();

        let drift = product.release_transit(10).unwrap();
        assert_eq!(drift, 6);
        assert_eq!(product.quantity_in_transit(), 0);
        assert_eq!(product.stock_quantity(), 0);
    }

    #[test]
    fn set_transit_reports_changes_only() {
        let mut product = test_product();
        product.apply_transit_delta(4).unwrap();

        assert!(!product.set_transit(4).unwrap());
        assert!(product.set_transit(9).unwrap());
        assert_eq!(product.quantity_in_transit(), 9);
    }

    #[test]
    fn rehydration_rejects_negative_fields() {
        let id = ProductId::new(AggregateId::new());
        assert!(Product::from_parts(id, -1, 0, Decimal::ZERO, 1).is_err());
        assert!(Product::from_parts(id, 0, -1, Decimal::ZERO, 1).is_err());
        assert!(Product::from_parts(id, 0, 0, dec("-0.01"), 1).is_err());
    }

    #[derive(Debug, Clone)]
    enum Op {
        Commit(i64),
        Release(i64),
        Receive(i64),
    }

    fn op() -> impl Strategy<Value = Op> {
        prop_oneof![
            (1i64..=100).prop_map(Op::Commit),
            (1i64..=100).prop_map(Op::Release),
            (1i64..=100).prop_map(Op::Receive),
        ]
    }

    proptest! {
        /// No sequence of commit/release/receive operations ever drives
        /// either ledger quantity negative.
        #[test]
        fn quantities_never_go_negative(ops in prop::collection::vec(op(), 1..40)) {
            let mut product = test_product();

            for op in ops {
                match op {
                    Op::Commit(q) => {
                        product.apply_transit_delta(q).unwrap();
                    }
                    Op::Release(q) => {
                        product.release_transit(q).unwrap();
                    }
                    Op::Receive(q) => {
                        product.receive(q, dec("3.00")).unwrap();
                    }
                }
                prop_assert!(product.quantity_in_transit() >= 0);
                prop_assert!(product.stock_quantity() >= 0);
                prop_assert!(product.avg_purchase_price() >= Decimal::ZERO);
            }
        }
    }
}
