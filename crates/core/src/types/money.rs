//! Decimal money helpers.
//!
//! All amounts are `rust_decimal::Decimal` in the campus currency's standard
//! unit. Derived amounts are rounded to two places, midpoint away from zero,
//! at the point they are stored on an order row.

use rust_decimal::{Decimal, RoundingStrategy};

/// Round an amount to two decimal places, midpoint away from zero.
#[must_use]
pub fn round_money(amount: Decimal) -> Decimal {
    amount.round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero)
}

/// Unit price after a percentage discount: `price * (1 - pct / 100)`.
///
/// `discount_percentage` is clamped to `0..=100`.
#[must_use]
pub fn discounted_unit_price(unit_price: Decimal, discount_percentage: Decimal) -> Decimal {
    let pct = discount_percentage.clamp(Decimal::ZERO, Decimal::ONE_HUNDRED);
    round_money(unit_price * (Decimal::ONE - pct / Decimal::ONE_HUNDRED))
}

/// Subtotal of one line: discounted unit price times quantity.
#[must_use]
pub fn line_subtotal(unit_price: Decimal, discount_percentage: Decimal, quantity: u32) -> Decimal {
    discounted_unit_price(unit_price, discount_percentage) * Decimal::from(quantity)
}

/// Split `total` into `parts` equal shares, rounded down to cents.
///
/// The cents lost to rounding go to the last share, so the shares always sum
/// to `total` (when `total` is already in whole cents). Empty if `parts` is 0.
#[must_use]
pub fn split_money(total: Decimal, parts: usize) -> Vec<Decimal> {
    let Some(rest) = parts.checked_sub(1) else {
        return Vec::new();
    };
    let share = (total / Decimal::from(parts)).round_dp_with_strategy(2, RoundingStrategy::ToZero);
    let last = total - share * Decimal::from(rest);
    let mut shares = vec![share; rest];
    shares.push(last);
    shares
}
