//! Weighted-average purchase cost computation.

use rust_decimal::Decimal;

use restock_core::money;
use restock_core::{DomainError, DomainResult};

/// Compute the new weighted-average purchase price after a receipt.
///
/// `old_stock_qty` is the stock quantity *before* the receipt is applied; it
/// weights the existing cost basis against the incoming units:
///
/// ```text
/// (old_stock_qty * old_avg_price + incoming_qty * incoming_unit_price)
///     / (old_stock_qty + incoming_qty)
/// ```
///
/// The result is rounded to minor-unit precision (half to even) once, at the
/// end, so repeated receipts do not accumulate rounding error.
pub fn new_avg_price(
    old_stock_qty: i64,
    old_avg_price: Decimal,
    incoming_qty: i64,
    incoming_unit_price: Decimal,
) -> DomainResult<Decimal> {
    if incoming_qty <= 0 {
        return Err(DomainError::invalid_quantity(format!(
            "receipt quantity must be positive (got {incoming_qty})"
        )));
    }
    if incoming_unit_price < Decimal::ZERO {
        return Err(DomainError::invalid_quantity(format!(
            "receipt unit price must not be negative (got {incoming_unit_price})"
        )));
    }

    let total_qty = old_stock_qty + incoming_qty;
    if total_qty == 0 {
        // Defined as zero rather than a division-by-zero error.
        return Ok(Decimal::ZERO);
    }

    let old_value = Decimal::from(old_stock_qty) * old_avg_price;
    let incoming_value = Decimal::from(incoming_qty) * incoming_unit_price;
    let avg = (old_value + incoming_value) / Decimal::from(total_qty);

    Ok(money::round_minor(avg))
}
