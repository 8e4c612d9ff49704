//! Invoice totals.

use rust_decimal::Decimal;
use service_core::error::AppError;
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
#[error("Order total exceeds the representable range")]
pub struct AmountOverflow;

impl From<AmountOverflow> for AppError {
    fn from(err: AmountOverflow) -> Self {
        AppError::BadRequest(anyhow::anyhow!(err))
    }
}

/// A priced line: unit amount times quantity.
pub trait Priced {
    fn amount(&self) -> Decimal;
    fn quantity(&self) -> i32;
}

/// Sum of `amount * quantity` over all lines. Empty input sums to zero.
///
/// No rounding is applied; presentation code decides the scale.
pub fn calculate_order_amount<T: Priced>(items: &[T]) -> Result<Decimal, AmountOverflow> {
    items.iter().try_fold(Decimal::ZERO, |total, item| {
        item.amount()
            .checked_mul(Decimal::from(item.quantity()))
            .and_then(|line| total.checked_add(line))
            .ok_or(AmountOverflow)
    })
}
