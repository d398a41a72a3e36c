//! Purchase order orchestration: creation, lifecycle transitions, line-item
//! edits and the transit summary report.
//!
//! ## Execution model
//!
//! The service composes the two repository traits and the notifier seam; it
//! owns no state beyond a drift counter. Per request it loads the order,
//! decides through the purchasing domain (transition table + effect table),
//! applies ledger effects through the atomic ledger operations, and persists
//! the order with an optimistic version check.
//!
//! ## Failure semantics
//!
//! - Committing (`draft -> sent`) is all-or-nothing: if any line item's
//!   transit delta is rejected, or the final order write loses a version
//!   race, every applied delta is rolled back and the order stays `draft`.
//! - Receiving and cancelling claim each item's idempotency flag through an
//!   order-version compare-and-swap *before* touching the ledger, so a
//!   retried or concurrent transition can never double-apply an item.
//!   Re-requesting the order's current status resumes any pending per-item
//!   effects and is otherwise a no-op.
//! - A version race surfaces as `Conflict`; the engine never silently
//!   retries a transition. Callers retry the whole logical operation.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};

use chrono::Utc;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use tracing::{info, warn};

use restock_core::{AggregateId, DomainError, DomainResult, ExpectedVersion};
use restock_inventory::ProductId;
use restock_purchasing::{
    PurchaseItem, PurchaseItemId, PurchaseOrder, PurchaseOrderId, PurchaseOrderStatus,
    TransitionEffect,
};

use crate::notify::TransitionNotifier;
use crate::stores::{ProductLedger, PurchaseOrderStore, StoreError};

/// Line-item input for order creation.
#[derive(Debug, Clone, Deserialize)]
pub struct NewPurchaseItem {
    pub product_id: ProductId,
    pub quantity: i64,
    pub cost_price: Decimal,
}

/// Order creation input.
///
/// Totals are always computed server-side from `quantity * cost_price`;
/// caller-supplied totals are never trusted.
#[derive(Debug, Clone, Deserialize)]
pub struct NewPurchaseOrder {
    pub items: Vec<NewPurchaseItem>,
    /// Supplier metadata, opaque to the engine.
    #[serde(default)]
    pub supplier: JsonValue,
    #[serde(default)]
    pub is_urgent: bool,
    #[serde(default)]
    pub expenses: Option<Decimal>,
    /// Submit immediately: the created order is committed to transit and
    /// returned as `sent` instead of `draft`.
    #[serde(default)]
    pub submit: bool,
}

/// Partial line-item edit.
#[derive(Debug, Clone, Copy, Default, Deserialize)]
pub struct ItemEdit {
    pub quantity: Option<i64>,
    pub cost_price: Option<Decimal>,
}

/// One row of the transit summary report.
#[derive(Debug, Clone, Serialize)]
pub struct TransitSummaryRow {
    pub product_id: ProductId,
    pub stock_quantity: i64,
    pub quantity_in_transit: i64,
    pub active_orders: Vec<ActiveOrderLine>,
}

/// An active order's contribution to a product's transit quantity.
#[derive(Debug, Clone, Serialize)]
pub struct ActiveOrderLine {
    pub order_id: PurchaseOrderId,
    pub quantity: i64,
    pub status: PurchaseOrderStatus,
}

#[derive(Debug, Clone, Copy)]
enum TerminalOp {
    Receive,
    Release,
}

/// Application service for the purchase/inventory reconciliation engine.
pub struct PurchasingService<L, O, N> {
    pub(crate) ledger: L,
    pub(crate) orders: O,
    notifier: N,
    drift_events: AtomicU64,
}

impl<L, O, N> PurchasingService<L, O, N>
where
    L: ProductLedger,
    O: PurchaseOrderStore,
    N: TransitionNotifier,
{
    pub fn new(ledger: L, orders: O, notifier: N) -> Self {
        Self {
            ledger,
            orders,
            notifier,
            drift_events: AtomicU64::new(0),
        }
    }

    /// Clamped-drift events observed by this instance since construction.
    /// Exposed for alerting; drift is corrected by the sync routine.
    pub fn drift_count(&self) -> u64 {
        self.drift_events.load(Ordering::Relaxed)
    }

    /// Create a purchase order from validated input.
    ///
    /// Every line is validated and every product resolved *before* any
    /// mutation: creation either fully succeeds or leaves no partial state.
    pub fn create_purchase_order(&self, input: NewPurchaseOrder) -> DomainResult<PurchaseOrder> {
        if input.items.is_empty() {
            return Err(DomainError::validation(
                "purchase order must have at least one line item",
            ));
        }

        let mut items = Vec::with_capacity(input.items.len());
        for line in &input.items {
            if self
                .ledger
                .get(line.product_id)
                .map_err(Self::store_err)?
                .is_none()
            {
                return Err(DomainError::ProductNotFound(line.product_id.0));
            }
            items.push(PurchaseItem::new(
                PurchaseItemId::new(AggregateId::new()),
                line.product_id,
                line.quantity,
                line.cost_price,
            )?);
        }

        let order = PurchaseOrder::new(
            PurchaseOrderId::new(AggregateId::new()),
            items,
            input.supplier,
            input.is_urgent,
            input.expenses,
            Utc::now(),
        )?;
        let order_id = order.id();
        self.orders.insert(&order).map_err(Self::store_err)?;
        info!(order_id = %order_id, total = %order.total_amount(), "purchase order created");

        if input.submit {
            self.transition_purchase_order(order_id, PurchaseOrderStatus::Sent)
        } else {
            Ok(order)
        }
    }

    pub fn get_purchase_order(&self, order_id: PurchaseOrderId) -> DomainResult<PurchaseOrder> {
        self.load_order(order_id)
    }

    pub fn list_purchase_orders(&self) -> DomainResult<Vec<PurchaseOrder>> {
        self.orders.list().map_err(Self::store_err)
    }

    /// Drive an order through the lifecycle state machine.
    ///
    /// Illegal transitions fail with `IllegalTransition` and have no side
    /// effect. Requesting the order's *current* status is an idempotent
    /// retry: it completes any per-item effects a crashed run left pending.
    pub fn transition_purchase_order(
        &self,
        order_id: PurchaseOrderId,
        target: PurchaseOrderStatus,
    ) -> DomainResult<PurchaseOrder> {
        let order = self.load_order(order_id)?;
        let from = order.status();

        let updated = if target == from {
            self.resume_pending_effects(order)?
        } else {
            order.ensure_transition(target)?;
            match TransitionEffect::for_transition(from, target) {
                TransitionEffect::CommitTransit => self.commit_transit(order, target)?,
                TransitionEffect::ReceiveStock => {
                    self.apply_terminal(order, target, TerminalOp::Receive)?
                }
                TransitionEffect::ReleaseTransit => {
                    self.apply_terminal(order, target, TerminalOp::Release)?
                }
                TransitionEffect::StatusOnly => self.status_only(order, target)?,
            }
        };

        if updated.status() != from {
            info!(
                order_id = %order_id,
                from = from.as_str(),
                to = updated.status().as_str(),
                "purchase order transitioned"
            );
            self.notifier.order_transitioned(&updated, from);
        }
        Ok(updated)
    }

    /// Edit a line item. Policy: *apply the delta of the delta*.
    ///
    /// While the order is active, a quantity change applies `new - old` to
    /// the product's transit strictly — an edit that would drive transit
    /// negative is rejected and nothing changes. Cost-only edits recompute
    /// the line total and never touch the ledger.
    pub fn update_item(
        &self,
        order_id: PurchaseOrderId,
        item_id: PurchaseItemId,
        edit: ItemEdit,
    ) -> DomainResult<PurchaseOrder> {
        let mut order = self.load_order(order_id)?;
        order.ensure_editable()?;
        let base = order.version();

        let item = order.item(item_id).ok_or_else(|| {
            DomainError::validation(format!(
                "purchase order {order_id} has no line item {item_id}"
            ))
        })?;
        let product_id = item.product_id();
        let committed = item.committed();

        // Mutate the loaded copy first: all input validation happens before
        // the ledger is touched.
        let mut quantity_delta = 0i64;
        if let Some(quantity) = edit.quantity {
            quantity_delta = order.update_item_quantity(item_id, quantity)?;
        }
        if let Some(cost_price) = edit.cost_price {
            order.update_item_cost(item_id, cost_price)?;
        }

        let ledger_delta = if committed { quantity_delta } else { 0 };
        if ledger_delta != 0 {
            self.ledger
                .apply_transit_delta(product_id, ledger_delta)
                .map_err(|e| Self::ledger_err(product_id, e))?;
        }

        if let Err(err) = self.orders.update(&order, ExpectedVersion::Exact(base)) {
            self.undo_transit_delta(product_id, ledger_delta);
            return Err(Self::order_store_err(order_id, err));
        }
        Ok(order)
    }

    /// Add a line item. On an active order the new quantity enters transit
    /// immediately.
    pub fn add_item(
        &self,
        order_id: PurchaseOrderId,
        line: NewPurchaseItem,
    ) -> DomainResult<PurchaseOrder> {
        let mut order = self.load_order(order_id)?;
        order.ensure_editable()?;
        let base = order.version();

        if self
            .ledger
            .get(line.product_id)
            .map_err(Self::store_err)?
            .is_none()
        {
            return Err(DomainError::ProductNotFound(line.product_id.0));
        }

        let item = PurchaseItem::new(
            PurchaseItemId::new(AggregateId::new()),
            line.product_id,
            line.quantity,
            line.cost_price,
        )?;
        let item_id = item.id();
        order.add_item(item)?;

        let mut ledger_delta = 0i64;
        if order.status().is_active() {
            self.ledger
                .apply_transit_delta(line.product_id, line.quantity)
                .map_err(|e| Self::ledger_err(line.product_id, e))?;
            ledger_delta = line.quantity;
            order.mark_item_committed(item_id)?;
        }

        if let Err(err) = self.orders.update(&order, ExpectedVersion::Exact(base)) {
            self.undo_transit_delta(line.product_id, ledger_delta);
            return Err(Self::order_store_err(order_id, err));
        }
        Ok(order)
    }

    /// Remove a line item, releasing its quantity from transit if it was
    /// committed. The last line item of an order cannot be removed.
    pub fn remove_item(
        &self,
        order_id: PurchaseOrderId,
        item_id: PurchaseItemId,
    ) -> DomainResult<PurchaseOrder> {
        let mut order = self.load_order(order_id)?;
        order.ensure_editable()?;
        let base = order.version();

        let removed = order.remove_item(item_id)?;

        let mut released = 0i64;
        if removed.committed() {
            let (_, drift) = self
                .ledger
                .release_transit(removed.product_id(), removed.quantity())
                .map_err(|e| Self::ledger_err(removed.product_id(), e))?;
            self.note_drift(removed.product_id(), drift, "item removal");
            released = removed.quantity() - drift;
        }

        if let Err(err) = self.orders.update(&order, ExpectedVersion::Exact(base)) {
            // Undo of a release is re-applying what actually left transit.
            self.undo_transit_delta(removed.product_id(), -released);
            return Err(Self::order_store_err(order_id, err));
        }
        Ok(order)
    }

    /// Read-only report: per product, the ledger quantities plus the active
    /// orders contributing to transit.
    pub fn get_transit_summary(&self) -> DomainResult<Vec<TransitSummaryRow>> {
        let products = self.ledger.list().map_err(Self::store_err)?;
        let active = self.orders.list_active().map_err(Self::store_err)?;

        let mut contributions: HashMap<ProductId, Vec<ActiveOrderLine>> = HashMap::new();
        for order in &active {
            for item in order.items() {
                contributions
                    .entry(item.product_id())
                    .or_default()
                    .push(ActiveOrderLine {
                        order_id: order.id(),
                        quantity: item.quantity(),
                        status: order.status(),
                    });
            }
        }

        let mut rows: Vec<TransitSummaryRow> = products
            .into_iter()
            .map(|product| TransitSummaryRow {
                product_id: product.id(),
                stock_quantity: product.stock_quantity(),
                quantity_in_transit: product.quantity_in_transit(),
                active_orders: contributions.remove(&product.id()).unwrap_or_default(),
            })
            .collect();
        rows.sort_by_key(|row| row.product_id.0);
        Ok(rows)
    }

    // ---- transition internals ----

    /// `draft -> sent`: all-or-nothing commit of every line item to transit.
    fn commit_transit(
        &self,
        mut order: PurchaseOrder,
        target: PurchaseOrderStatus,
    ) -> DomainResult<PurchaseOrder> {
        let order_id = order.id();
        let base = order.version();

        let pending: Vec<(PurchaseItemId, ProductId, i64)> = order
            .items()
            .iter()
            .filter(|item| !item.committed())
            .map(|item| (item.id(), item.product_id(), item.quantity()))
            .collect();

        let mut applied: Vec<(ProductId, i64)> = Vec::with_capacity(pending.len());
        for (_, product_id, quantity) in &pending {
            match self.ledger.apply_transit_delta(*product_id, *quantity) {
                Ok(_) => applied.push((*product_id, *quantity)),
                Err(err) => {
                    self.rollback_transit(&applied);
                    return Err(Self::ledger_err(*product_id, err));
                }
            }
        }

        for (item_id, _, _) in &pending {
            order.mark_item_committed(*item_id)?;
        }
        order.transition_to(target)?;

        if let Err(err) = self.orders.update(&order, ExpectedVersion::Exact(base)) {
            // A concurrent writer claimed the order; undo our deltas so the
            // ledger matches whatever state won.
            self.rollback_transit(&applied);
            return Err(Self::order_store_err(order_id, err));
        }
        Ok(order)
    }

    /// Receive or cancel: claim each item's idempotency flag through the
    /// order version *before* touching the ledger.
    fn apply_terminal(
        &self,
        mut order: PurchaseOrder,
        target: PurchaseOrderStatus,
        op: TerminalOp,
    ) -> DomainResult<PurchaseOrder> {
        let order_id = order.id();

        loop {
            let next = order
                .items()
                .iter()
                .find(|item| match op {
                    TerminalOp::Receive => !item.received(),
                    TerminalOp::Release => item.committed(),
                })
                .map(|item| (item.id(), item.product_id(), item.quantity(), item.cost_price()));

            let Some((item_id, product_id, quantity, cost_price)) = next else {
                break;
            };

            let base = order.version();
            match op {
                TerminalOp::Receive => order.mark_item_received(item_id)?,
                TerminalOp::Release => order.clear_item_committed(item_id)?,
            }
            self.orders
                .update(&order, ExpectedVersion::Exact(base))
                .map_err(|e| Self::order_store_err(order_id, e))?;

            let drift = match op {
                TerminalOp::Receive => {
                    let (_, drift) = self
                        .ledger
                        .receive(product_id, quantity, cost_price)
                        .map_err(|e| Self::ledger_err(product_id, e))?;
                    drift
                }
                TerminalOp::Release => {
                    let (_, drift) = self
                        .ledger
                        .release_transit(product_id, quantity)
                        .map_err(|e| Self::ledger_err(product_id, e))?;
                    drift
                }
            };
            let context = match op {
                TerminalOp::Receive => "receive",
                TerminalOp::Release => "cancel",
            };
            self.note_drift(product_id, drift, context);
        }

        if order.status() != target {
            let base = order.version();
            order.transition_to(target)?;
            self.orders
                .update(&order, ExpectedVersion::Exact(base))
                .map_err(|e| Self::order_store_err(order_id, e))?;
        }
        Ok(order)
    }

    /// A transition with no ledger effect (including `draft -> cancelled`,
    /// whose items were never committed).
    fn status_only(
        &self,
        mut order: PurchaseOrder,
        target: PurchaseOrderStatus,
    ) -> DomainResult<PurchaseOrder> {
        let order_id = order.id();
        let base = order.version();
        order.transition_to(target)?;
        self.orders
            .update(&order, ExpectedVersion::Exact(base))
            .map_err(|e| Self::order_store_err(order_id, e))?;
        Ok(order)
    }

    /// Idempotent retry of the current status: finish whatever per-item
    /// effects a crashed run left behind.
    fn resume_pending_effects(&self, order: PurchaseOrder) -> DomainResult<PurchaseOrder> {
        match order.status() {
            PurchaseOrderStatus::Received => {
                self.apply_terminal(order, PurchaseOrderStatus::Received, TerminalOp::Receive)
            }
            PurchaseOrderStatus::Cancelled => {
                self.apply_terminal(order, PurchaseOrderStatus::Cancelled, TerminalOp::Release)
            }
            _ => Ok(order),
        }
    }

    /// Undo strictly-applied transit deltas after a failed commit or edit.
    fn rollback_transit(&self, applied: &[(ProductId, i64)]) {
        for (product_id, quantity) in applied {
            match self.ledger.release_transit(*product_id, *quantity) {
                Ok((_, 0)) => {}
                Ok((_, drift)) => self.note_drift(*product_id, drift, "commit rollback"),
                Err(err) => warn!(
                    product_id = %product_id,
                    error = %err,
                    "failed to roll back transit delta; reconciliation will repair"
                ),
            }
        }
    }

    fn undo_transit_delta(&self, product_id: ProductId, delta: i64) {
        if delta == 0 {
            return;
        }
        if let Err(err) = self.ledger.apply_transit_delta(product_id, -delta) {
            warn!(
                product_id = %product_id,
                delta = -delta,
                error = %err,
                "failed to undo transit delta; reconciliation will repair"
            );
        }
    }

    pub(crate) fn note_drift(&self, product_id: ProductId, drift: i64, context: &str) {
        if drift > 0 {
            self.drift_events.fetch_add(1, Ordering::Relaxed);
            warn!(
                product_id = %product_id,
                drift,
                context,
                "quantity in transit clamped at zero; reconciliation will repair"
            );
        }
    }

    fn load_order(&self, id: PurchaseOrderId) -> DomainResult<PurchaseOrder> {
        self.orders
            .get(id)
            .map_err(Self::store_err)?
            .ok_or(DomainError::OrderNotFound(id.0))
    }

    pub(crate) fn store_err(err: StoreError) -> DomainError {
        match err {
            StoreError::Domain(e) => e,
            StoreError::Concurrency(msg) => DomainError::conflict(msg),
            StoreError::NotFound(msg) => DomainError::storage(format!("row vanished: {msg}")),
            StoreError::Backend(msg) => DomainError::storage(msg),
        }
    }

    pub(crate) fn ledger_err(id: ProductId, err: StoreError) -> DomainError {
        match err {
            StoreError::NotFound(_) => DomainError::ProductNotFound(id.0),
            other => Self::store_err(other),
        }
    }

    fn order_store_err(id: PurchaseOrderId, err: StoreError) -> DomainError {
        match err {
            StoreError::NotFound(_) => DomainError::OrderNotFound(id.0),
            other => Self::store_err(other),
        }
    }
}
