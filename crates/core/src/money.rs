//! Settlement-currency arithmetic helpers.
//!
//! All monetary fields in the engine are `rust_decimal::Decimal` denominated
//! in the store's settlement currency. Rounding happens once, at the end of a
//! computation, so repeated receipts do not compound rounding error.

use rust_decimal::{Decimal, RoundingStrategy};

/// Minor-unit digits of the settlement currency.
pub const MINOR_UNITS: u32 = 2;

/// Round an amount to minor-unit precision, half to even.
pub fn round_minor(amount: Decimal) -> Decimal {
    amount.round_dp_with_strategy(MINOR_UNITS, RoundingStrategy::MidpointNearestEven)
}
