//! Purchase order lifecycle: the closed status set, the transition table and
//! the transition → ledger-effect mapping.
//!
//! Every legality question goes through [`PurchaseOrderStatus::can_transition_to`];
//! there are no scattered status checks anywhere else in the engine.

use serde::{Deserialize, Serialize};

/// Purchase order status lifecycle.
///
/// `Draft -> Sent <-> SupplierEditing`, then
/// `Sent -> AwaitingPayment -> Paid -> Shipped`. Every active status can
/// terminate in `Received` or `Cancelled`; `Draft` can only be sent or
/// cancelled. `Received` and `Cancelled` are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PurchaseOrderStatus {
    Draft,
    Sent,
    SupplierEditing,
    AwaitingPayment,
    Paid,
    Shipped,
    Received,
    Cancelled,
}

impl PurchaseOrderStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            PurchaseOrderStatus::Draft => "draft",
            PurchaseOrderStatus::Sent => "sent",
            PurchaseOrderStatus::SupplierEditing => "supplier_editing",
            PurchaseOrderStatus::AwaitingPayment => "awaiting_payment",
            PurchaseOrderStatus::Paid => "paid",
            PurchaseOrderStatus::Shipped => "shipped",
            PurchaseOrderStatus::Received => "received",
            PurchaseOrderStatus::Cancelled => "cancelled",
        }
    }

    /// Active orders hold units in transit: committed, not yet terminal.
    pub fn is_active(self) -> bool {
        matches!(
            self,
            PurchaseOrderStatus::Sent
                | PurchaseOrderStatus::SupplierEditing
                | PurchaseOrderStatus::AwaitingPayment
                | PurchaseOrderStatus::Paid
                | PurchaseOrderStatus::Shipped
        )
    }

    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            PurchaseOrderStatus::Received | PurchaseOrderStatus::Cancelled
        )
    }

    /// The transition table.
    pub fn can_transition_to(self, target: Self) -> bool {
        use PurchaseOrderStatus::*;

        match (self, target) {
            (Draft, Sent) | (Draft, Cancelled) => true,
            (Sent, SupplierEditing) | (SupplierEditing, Sent) => true,
            (Sent, AwaitingPayment) => true,
            (AwaitingPayment, Paid) => true,
            (Paid, Shipped) => true,
            (from, Received) | (from, Cancelled) => from.is_active(),
            _ => false,
        }
    }
}

impl core::fmt::Display for PurchaseOrderStatus {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Ledger effect fired by a legal status transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransitionEffect {
    /// Commit every line item's quantity to transit (all or nothing).
    CommitTransit,
    /// Receive every line item into stock: transit -> stock + cost basis.
    ReceiveStock,
    /// Release every committed line item's quantity from transit.
    ReleaseTransit,
    /// Status-only change, the ledger is untouched.
    StatusOnly,
}

impl TransitionEffect {
    /// Which ledger operation a (legal) transition fires.
    ///
    /// `Draft -> Cancelled` is deliberately `StatusOnly`: a draft's items
    /// were never committed to transit.
    pub fn for_transition(from: PurchaseOrderStatus, to: PurchaseOrderStatus) -> Self {
        use PurchaseOrderStatus::*;

        match (from, to) {
            (Draft, Sent) => TransitionEffect::CommitTransit,
            (from, Received) if from.is_active() => TransitionEffect::ReceiveStock,
            (from, Cancelled) if from.is_active() => TransitionEffect::ReleaseTransit,
            _ => TransitionEffect::StatusOnly,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::PurchaseOrderStatus::*;
    use super::*;

    const ALL: [PurchaseOrderStatus; 8] = [
        Draft,
        Sent,
        SupplierEditing,
        AwaitingPayment,
        Paid,
        Shipped,
        Received,
        Cancelled,
    ];

    #[test]
    fn terminal_statuses_have_no_outgoing_transitions() {
        for terminal in [Received, Cancelled] {
            for target in ALL {
                assert!(
                    !terminal.can_transition_to(target),
                    "{terminal} -> {target} must be illegal"
                );
            }
        }
    }

    #[test]
    fn every_active_status_can_be_received_or_cancelled() {
        for status in ALL.into_iter().filter(|s| s.is_active()) {
            assert!(status.can_transition_to(Received));
            assert!(status.can_transition_to(Cancelled));
        }
    }

    #[test]
    fn draft_cannot_be_received_directly() {
        assert!(!Draft.can_transition_to(Received));
        assert!(Draft.can_transition_to(Sent));
        assert!(Draft.can_transition_to(Cancelled));
    }

    #[test]
    fn supplier_editing_round_trips_with_sent() {
        assert!(Sent.can_transition_to(SupplierEditing));
        assert!(SupplierEditing.can_transition_to(Sent));
        assert!(!SupplierEditing.can_transition_to(AwaitingPayment));
    }

    #[test]
    fn payment_chain_is_ordered() {
        assert!(Sent.can_transition_to(AwaitingPayment));
        assert!(AwaitingPayment.can_transition_to(Paid));
        assert!(Paid.can_transition_to(Shipped));
        assert!(!Paid.can_transition_to(AwaitingPayment));
        assert!(!Shipped.can_transition_to(Paid));
    }

    #[test]
    fn effects_match_the_lifecycle() {
        assert_eq!(
            TransitionEffect::for_transition(Draft, Sent),
            TransitionEffect::CommitTransit
        );
        assert_eq!(
            TransitionEffect::for_transition(Shipped, Received),
            TransitionEffect::ReceiveStock
        );
        assert_eq!(
            TransitionEffect::for_transition(Sent, Cancelled),
            TransitionEffect::ReleaseTransit
        );
        assert_eq!(
            TransitionEffect::for_transition(Draft, Cancelled),
            TransitionEffect::StatusOnly
        );
        assert_eq!(
            TransitionEffect::for_transition(Sent, AwaitingPayment),
            TransitionEffect::StatusOnly
        );
    }

    #[test]
    fn active_statuses_are_exactly_the_non_terminal_non_draft_ones() {
        for status in ALL {
            let expected = status != Draft && !status.is_terminal();
            assert_eq!(status.is_active(), expected, "{status}");
        }
    }
}
