//! Post-transition notification seam.
//!
//! Supplier messaging itself is an external collaborator; the engine only
//! guarantees that the hook fires *after* a transition has fully succeeded
//! and that it can never gate or fail the transition.

use std::sync::Arc;

use tracing::info;

use restock_purchasing::{PurchaseOrder, PurchaseOrderStatus};

pub trait TransitionNotifier: Send + Sync {
    /// Called after a successful status transition. Implementations must not
    /// block the caller on delivery; failures are theirs to log and swallow.
    fn order_transitioned(&self, order: &PurchaseOrder, previous: PurchaseOrderStatus);
}

impl<T> TransitionNotifier for Arc<T>
where
    T: TransitionNotifier + ?Sized,
{
    fn order_transitioned(&self, order: &PurchaseOrder, previous: PurchaseOrderStatus) {
        (**self).order_transitioned(order, previous)
    }
}

/// Notifier that drops everything (tests, embedded use).
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopNotifier;

impl TransitionNotifier for NoopNotifier {
    fn order_transitioned(&self, _order: &PurchaseOrder, _previous: PurchaseOrderStatus) {}
}

/// Notifier that emits a tracing event; the default wiring until a real
/// messaging collaborator is attached.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogNotifier;

impl TransitionNotifier for LogNotifier {
    fn order_transitioned(&self, order: &PurchaseOrder, previous: PurchaseOrderStatus) {
        info!(
            order_id = %order.id(),
            from = previous.as_str(),
            to = order.status().as_str(),
            urgent = order.is_urgent(),
            "purchase order status changed"
        );
    }
}
