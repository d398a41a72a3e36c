//! Transit reconciliation: the authoritative repair for transit drift.
//!
//! The invariant being restored: a product's `quantity_in_transit` equals the
//! sum of line-item quantities over purchase orders currently in an active
//! status. Individual transitions keep this true in the steady state; crashes
//! mid-transition, partial commits and manual data edits can break it, and
//! this routine closes the gap.

use std::collections::HashMap;

use serde::Serialize;
use tracing::{info, warn};

use restock_core::DomainResult;
use restock_inventory::ProductId;

use crate::notify::TransitionNotifier;
use crate::service::PurchasingService;
use crate::stores::{ProductLedger, PurchaseOrderStore};

/// Outcome of a reconciliation run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct SyncReport {
    /// Number of products whose transit quantity was overwritten.
    pub corrected: usize,
}

impl<L, O, N> PurchasingService<L, O, N>
where
    L: ProductLedger,
    O: PurchaseOrderStore,
    N: TransitionNotifier,
{
    /// Recompute every product's transit quantity from the line items of
    /// active orders and overwrite the stored value where it differs.
    ///
    /// Idempotent, and safe to run concurrently with live transitions: the
    /// result is consistent as of the active-order snapshot taken at the
    /// start of the run, which is all a corrective routine needs. Running it
    /// twice in a row corrects nothing on the second pass.
    pub fn sync_transit_quantities(&self) -> DomainResult<SyncReport> {
        let active = self.orders.list_active().map_err(Self::store_err)?;

        let mut expected: HashMap<ProductId, i64> = HashMap::new();
        for order in &active {
            for item in order.items() {
                *expected.entry(item.product_id()).or_default() += item.quantity();
            }
        }

        let mut corrected = 0usize;
        for product in self.ledger.list().map_err(Self::store_err)? {
            let want = expected.get(&product.id()).copied().unwrap_or(0);
            if product.quantity_in_transit() == want {
                continue;
            }
            let previous = self
                .ledger
                .set_transit(product.id(), want)
                .map_err(|e| Self::ledger_err(product.id(), e))?;
            warn!(
                product_id = %product.id(),
                previous,
                corrected_to = want,
                "transit quantity drifted from the active-order set; corrected"
            );
            corrected += 1;
        }

        if corrected > 0 {
            info!(corrected, "transit reconciliation corrected drifted products");
        }
        Ok(SyncReport { corrected })
    }
}
