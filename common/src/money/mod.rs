//! Money type utilities for listing prices
//!
//! All prices are fixed-point to 2 decimal places. Rounding is
//! round-half-up everywhere a strategy computes a new price, so a
//! computed value compares cleanly against the stored one.

use rust_decimal::{Decimal, RoundingStrategy};
pub use rust_decimal_macros::dec;

/// Listing price type
pub type Price = Decimal;

/// Currency amount type (reduction magnitudes, deltas)
pub type Amount = Decimal;

/// Number of decimal places carried by all money values
pub const MONEY_PRECISION: u32 = 2;

/// Round a money value to 2 decimal places, half-up
pub fn round_money(value: Decimal) -> Decimal {
    value.round_dp_with_strategy(MONEY_PRECISION, RoundingStrategy::MidpointAwayFromZero)
}

/// One percent of a value, unrounded
pub fn percent_of(value: Decimal, percent: Decimal) -> Decimal {
    value * percent / Decimal::ONE_HUNDRED
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rounds_half_up() {
        assert_eq!(round_money(dec!(10.005)), dec!(10.01));
        assert_eq!(round_money(dec!(10.004)), dec!(10.00));
        assert_eq!(round_money(dec!(84.999)), dec!(85.00));
    }

    #[test]
    fn percent_of_whole_value() {
        assert_eq!(round_money(percent_of(dec!(100), dec!(15))), dec!(15.00));
        assert_eq!(round_money(percent_of(dec!(19.99), dec!(10))), dec!(2.00));
    }
}
