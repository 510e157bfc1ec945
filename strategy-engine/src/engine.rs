//! Next-price computation
//!
//! One pure function per strategy kind, each mapping (current price,
//! floor, listing age, market signal) to a candidate next price. Nothing
//! here touches the network or the store; the scheduler owns commits.
//! Out-of-range computations are absorbed by floor clamping; the only
//! error path is malformed configuration.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;

use common::error::{Error, Result};
use common::model::listing::{Listing, MarketSignal};
use common::model::strategy::{Strategy, StrategyKind};
use common::money::{dec, percent_of, round_money, Price};

/// Largest single-step percentage cut the time-based strategy may reach
const MAX_TIME_BASED_PERCENT: Decimal = dec!(50);

/// Result of one strategy computation
#[derive(Debug, Clone)]
pub struct Computation {
    /// The price to commit; equals the current price when not applied
    pub new_price: Price,
    /// Whether a reduction should be committed
    pub applied: bool,
    /// Why the computation did or did not apply
    pub reason: String,
    /// Market signal was usable but thinly sourced
    pub low_confidence: bool,
}

impl Computation {
    fn applied(new_price: Price, reason: impl Into<String>) -> Self {
        Self {
            new_price,
            applied: true,
            reason: reason.into(),
            low_confidence: false,
        }
    }

    fn skipped(current_price: Price, reason: impl Into<String>) -> Self {
        Self {
            new_price: current_price,
            applied: false,
            reason: reason.into(),
            low_confidence: false,
        }
    }
}

/// Compute the next price for a listing under a strategy.
///
/// Pure: identical inputs always yield the identical output, and the
/// result never goes below the listing floor nor above the current
/// price. A candidate that rounds back to the current price is reported
/// as not applied.
pub fn compute_next_price(
    listing: &Listing,
    strategy: &Strategy,
    signal: &MarketSignal,
    now: DateTime<Utc>,
) -> Result<Computation> {
    strategy.validate()?;
    validate_pricing(listing)?;

    let current = listing.current_price;
    let floor = listing.minimum_price;

    if current <= floor {
        return Ok(Computation::skipped(current, "already at minimum price"));
    }

    let mut computation = match strategy.kind {
        StrategyKind::FixedPercentage => fixed_percentage(current, floor, strategy.magnitude),
        StrategyKind::FixedAmount => fixed_amount(current, floor, strategy.magnitude),
        StrategyKind::MarketBased => market_based(current, floor, signal),
        StrategyKind::TimeBased => time_based(listing, strategy, now),
    };

    // A cut that rounds away is no cut at all
    if computation.applied && computation.new_price >= current {
        computation.applied = false;
        computation.new_price = current;
        computation.reason = "computed price does not reduce the current price".to_string();
    }

    Ok(computation)
}

fn validate_pricing(listing: &Listing) -> Result<()> {
    if listing.minimum_price < Price::ZERO {
        return Err(Error::Validation(format!(
            "Listing {} has a negative minimum price",
            listing.id
        )));
    }
    if listing.minimum_price > listing.original_price {
        return Err(Error::Validation(format!(
            "Listing {} minimum price {} exceeds original price {}",
            listing.id, listing.minimum_price, listing.original_price
        )));
    }
    Ok(())
}

fn fixed_percentage(current: Price, floor: Price, magnitude: Decimal) -> Computation {
    let raw = current - percent_of(current, magnitude);
    let new_price = round_money(raw).max(floor);
    Computation::applied(new_price, format!("{}% reduction", magnitude))
}

fn fixed_amount(current: Price, floor: Price, magnitude: Decimal) -> Computation {
    let new_price = round_money(current - magnitude).max(floor);
    Computation::applied(new_price, format!("{} reduction", magnitude))
}

fn market_based(current: Price, floor: Price, signal: &MarketSignal) -> Computation {
    if !signal.is_usable() {
        return Computation::skipped(current, "no usable market signal");
    }
    let average = signal
        .average_price
        .expect("usable signal carries an average price");

    if average >= current {
        return Computation::skipped(current, "market average is not below the current price");
    }

    let new_price = round_money(average).max(floor);
    let mut computation = Computation::applied(new_price, "matched market average");
    computation.low_confidence = signal.is_low_confidence();
    computation
}

fn time_based(listing: &Listing, strategy: &Strategy, now: DateTime<Utc>) -> Computation {
    let current = listing.current_price;
    let floor = listing.minimum_price;

    // The longer a listing sits unsold, the deeper the single-step cut
    let age_days = (now - listing.created_at).num_days().max(0);
    let elapsed_intervals = Decimal::from((age_days / strategy.interval_days as i64).max(1));
    let percent = (strategy.magnitude * elapsed_intervals).min(MAX_TIME_BASED_PERCENT);

    let raw = current - percent_of(current, percent);
    let new_price = round_money(raw).max(floor);
    Computation::applied(new_price, format!("{}% age-scaled reduction", percent))
}
