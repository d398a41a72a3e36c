use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

use restock_core::{AggregateId, DomainError, DomainResult};
use restock_inventory::ProductId;

use crate::status::PurchaseOrderStatus;

/// Purchase order identifier.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PurchaseOrderId(pub AggregateId);

impl PurchaseOrderId {
    pub fn new(id: AggregateId) -> Self {
        Self(id)
    }
}

impl core::fmt::Display for PurchaseOrderId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        core::fmt::Display::fmt(&self.0, f)
    }
}

/// Purchase order line item identifier.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PurchaseItemId(pub AggregateId);

impl PurchaseItemId {
    pub fn new(id: AggregateId) -> Self {
        Self(id)
    }
}

impl core::fmt::Display for PurchaseItemId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        core::fmt::Display::fmt(&self.0, f)
    }
}

pub fn validate_quantity(quantity: i64) -> DomainResult<()> {
    if quantity <= 0 {
        return Err(DomainError::invalid_quantity(format!(
            "line item quantity must be positive (got {quantity})"
        )));
    }
    Ok(())
}

pub fn validate_cost_price(cost_price: Decimal) -> DomainResult<()> {
    if cost_price < Decimal::ZERO {
        return Err(DomainError::invalid_quantity(format!(
            "line item cost price must not be negative (got {cost_price})"
        )));
    }
    Ok(())
}

/// Purchase order line item.
///
/// `total` is derived (`quantity * cost_price`) and recomputed atomically
/// with every edit. The `committed`/`received` flags are the idempotency
/// guard for transition effects: an item's transit delta is applied at most
/// once, and its receipt is applied at most once.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PurchaseItem {
    id: PurchaseItemId,
    product_id: ProductId,
    quantity: i64,
    cost_price: Decimal,
    total: Decimal,
    committed: bool,
    received: bool,
}

impl PurchaseItem {
    pub fn new(
        id: PurchaseItemId,
        product_id: ProductId,
        quantity: i64,
        cost_price: Decimal,
    ) -> DomainResult<Self> {
        validate_quantity(quantity)?;
        validate_cost_price(cost_price)?;
        Ok(Self {
            id,
            product_id,
            quantity,
            cost_price,
            total: Decimal::from(quantity) * cost_price,
            committed: false,
            received: false,
        })
    }

    pub fn id(&self) -> PurchaseItemId {
        self.id
    }

    pub fn product_id(&self) -> ProductId {
        self.product_id
    }

    pub fn quantity(&self) -> i64 {
        self.quantity
    }

    pub fn cost_price(&self) -> Decimal {
        self.cost_price
    }

    pub fn total(&self) -> Decimal {
        self.total
    }

    /// Whether this item's quantity is currently counted in transit.
    pub fn committed(&self) -> bool {
        self.committed
    }

    /// Whether this item has already been received into stock.
    pub fn received(&self) -> bool {
        self.received
    }

    fn set_quantity(&mut self, quantity: i64) -> DomainResult<()> {
        validate_quantity(quantity)?;
        self.quantity = quantity;
        self.recompute_total();
        Ok(())
    }

    fn set_cost_price(&mut self, cost_price: Decimal) -> DomainResult<()> {
        validate_cost_price(cost_price)?;
        self.cost_price = cost_price;
        self.recompute_total();
        Ok(())
    }

    fn recompute_total(&mut self) {
        self.total = Decimal::from(self.quantity) * self.cost_price;
    }
}

/// Aggregate root: PurchaseOrder.
///
/// Owns its line items exclusively. Once a terminal status (`received` or
/// `cancelled`) is reached the order is immutable.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PurchaseOrder {
    id: PurchaseOrderId,
    status: PurchaseOrderStatus,
    created_at: DateTime<Utc>,
    is_urgent: bool,
    expenses: Option<Decimal>,
    /// Supplier metadata, opaque to the engine.
    supplier: JsonValue,
    items: Vec<PurchaseItem>,
    version: u64,
}

impl PurchaseOrder {
    pub fn new(
        id: PurchaseOrderId,
        items: Vec<PurchaseItem>,
        supplier: JsonValue,
        is_urgent: bool,
        expenses: Option<Decimal>,
        created_at: DateTime<Utc>,
    ) -> DomainResult<Self> {
        if items.is_empty() {
            return Err(DomainError::validation(
                "purchase order must have at least one line item",
            ));
        }
        if let Some(expenses) = expenses {
            if expenses < Decimal::ZERO {
                return Err(DomainError::validation(format!(
                    "incidental expenses must not be negative (got {expenses})"
                )));
            }
        }
        Ok(Self {
            id,
            status: PurchaseOrderStatus::Draft,
            created_at,
            is_urgent,
            expenses,
            supplier,
            items,
            version: 0,
        })
    }

    pub fn id(&self) -> PurchaseOrderId {
        self.id
    }

    pub fn status(&self) -> PurchaseOrderStatus {
        self.status
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn is_urgent(&self) -> bool {
        self.is_urgent
    }

    pub fn expenses(&self) -> Option<Decimal> {
        self.expenses
    }

    pub fn supplier(&self) -> &JsonValue {
        &self.supplier
    }

    pub fn items(&self) -> &[PurchaseItem] {
        &self.items
    }

    pub fn version(&self) -> u64 {
        self.version
    }

    /// Sum of line totals. Derived, never trusted from callers.
    pub fn total_amount(&self) -> Decimal {
        self.items.iter().map(PurchaseItem::total).sum()
    }

    pub fn item(&self, item_id: PurchaseItemId) -> Option<&PurchaseItem> {
        self.items.iter().find(|i| i.id == item_id)
    }

    /// Check that `target` is reachable from the current status without
    /// changing anything.
    pub fn ensure_transition(&self, target: PurchaseOrderStatus) -> DomainResult<()> {
        if self.status.can_transition_to(target) {
            Ok(())
        } else {
            Err(DomainError::IllegalTransition {
                order_id: self.id.0,
                from: self.status.as_str(),
                to: target.as_str(),
            })
        }
    }

    /// Move to `target` if the transition table allows it.
    pub fn transition_to(&mut self, target: PurchaseOrderStatus) -> DomainResult<()> {
        self.ensure_transition(target)?;
        self.status = target;
        self.version += 1;
        Ok(())
    }

    /// Line items may be edited while the order is a draft or active, with
    /// the service adjusting transit for committed items. Terminal orders
    /// are immutable.
    pub fn ensure_editable(&self) -> DomainResult<()> {
        if self.status.is_terminal() {
            return Err(DomainError::validation(format!(
                "purchase order {} is {} and can no longer be edited",
                self.id, self.status
            )));
        }
        Ok(())
    }

    /// Record that the item's quantity has been added to transit.
    pub fn mark_item_committed(&mut self, item_id: PurchaseItemId) -> DomainResult<()> {
        let item = self.item_mut(item_id)?;
        item.committed = true;
        self.version += 1;
        Ok(())
    }

    /// Record that the item's quantity has left transit (cancel/release).
    pub fn clear_item_committed(&mut self, item_id: PurchaseItemId) -> DomainResult<()> {
        let item = self.item_mut(item_id)?;
        item.committed = false;
        self.version += 1;
        Ok(())
    }

    /// Record that the item has been received into stock. A received item is
    /// no longer in transit, so the committed flag is cleared with it.
    pub fn mark_item_received(&mut self, item_id: PurchaseItemId) -> DomainResult<()> {
        let item = self.item_mut(item_id)?;
        item.received = true;
        item.committed = false;
        self.version += 1;
        Ok(())
    }

    /// Change an item's quantity; returns the delta (`new - old`) the caller
    /// must reconcile against transit if the item is committed.
    pub fn update_item_quantity(
        &mut self,
        item_id: PurchaseItemId,
        quantity: i64,
    ) -> DomainResult<i64> {
        self.ensure_editable()?;
        let item = self.item_mut(item_id)?;
        let old = item.quantity;
        item.set_quantity(quantity)?;
        self.version += 1;
        Ok(quantity - old)
    }

    /// Change an item's unit cost. Never affects transit.
    pub fn update_item_cost(
        &mut self,
        item_id: PurchaseItemId,
        cost_price: Decimal,
    ) -> DomainResult<()> {
        self.ensure_editable()?;
        let item = self.item_mut(item_id)?;
        item.set_cost_price(cost_price)?;
        self.version += 1;
        Ok(())
    }

    pub fn add_item(&mut self, item: PurchaseItem) -> DomainResult<()> {
        self.ensure_editable()?;
        if self.item(item.id).is_some() {
            return Err(DomainError::validation(format!(
                "purchase order {} already has line item {}",
                self.id, item.id
            )));
        }
        self.items.push(item);
        self.version += 1;
        Ok(())
    }

    pub fn remove_item(&mut self, item_id: PurchaseItemId) -> DomainResult<PurchaseItem> {
        self.ensure_editable()?;
        if self.items.len() == 1 {
            return Err(DomainError::validation(format!(
                "cannot remove the last line item of purchase order {}",
                self.id
            )));
        }
        let idx = self
            .items
            .iter()
            .position(|i| i.id == item_id)
            .ok_or_else(|| self.missing_item(item_id))?;
        self.version += 1;
        Ok(self.items.remove(idx))
    }

    fn item_mut(&mut self, item_id: PurchaseItemId) -> DomainResult<&mut PurchaseItem> {
        let id = self.id;
        self.items
            .iter_mut()
            .find(|i| i.id == item_id)
            .ok_or_else(|| {
                DomainError::validation(format!(
                    "purchase order {id} has no line item {item_id}"
                ))
            })
    }

    fn missing_item(&self, item_id: PurchaseItemId) -> DomainError {
        DomainError::validation(format!(
            "purchase order {} has no line item {item_id}",
            self.id
        ))
    }
}
