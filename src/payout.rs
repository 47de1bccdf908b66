//! Payout calculation.
//!
//! Constant-price payouts: backing an outcome priced at `p` returns
//! `amount / p`. No fees or slippage. Every function here is total and
//! returns zero instead of failing on an unusable price.

use rust_decimal::Decimal;

use crate::types::{Outcome, Prediction};

/// Payout for staking `amount` on an outcome priced at `outcome_price`.
///
/// Returns zero when the price is zero or negative, or when the division
/// overflows.
pub fn payout(outcome_price: Decimal, amount: Decimal) -> Decimal {
    if outcome_price <= Decimal::ZERO {
        return Decimal::ZERO;
    }
    amount.checked_div(outcome_price).unwrap_or(Decimal::ZERO)
}

/// Payout for an outcome of a prediction. Price forecasts have no
/// outcome prices and always pay zero here.
pub fn payout_for(prediction: &Prediction, outcome: Outcome, amount: Decimal) -> Decimal {
    prediction
        .outcome_price(outcome)
        .map(|price| payout(price, amount))
        .unwrap_or(Decimal::ZERO)
}

/// Payout multiple per unit staked (`1 / price`), zero if undefined.
pub fn multiplier(outcome_price: Decimal) -> Decimal {
    payout(outcome_price, Decimal::ONE)
}

/// `(predicted - current) / current * 100`. Zero if `current` is not positive.
pub fn price_change_percent(current: Decimal, predicted: Decimal) -> Decimal {
    if current <= Decimal::ZERO {
        return Decimal::ZERO;
    }
    (predicted - current)
        .checked_div(current)
        .and_then(|ratio| ratio.checked_mul(Decimal::ONE_HUNDRED))
        .unwrap_or(Decimal::ZERO)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
