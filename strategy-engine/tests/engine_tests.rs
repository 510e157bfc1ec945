use chrono::{Duration, Utc};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use uuid::Uuid;

use common::error::Error;
use common::model::listing::{Listing, MarketSignal};
use common::model::strategy::{Strategy, StrategyKind};
use strategy_engine::compute_next_price;

fn listing_with_prices(current: Decimal, original: Decimal, floor: Decimal) -> Listing {
    let mut listing = Listing::imported(
        Uuid::new_v4(),
        "ITEM-1".to_string(),
        "Test item".to_string(),
        original,
        1,
    );
    listing.current_price = current;
    listing.minimum_price = floor;
    listing
}

fn strategy(kind: StrategyKind, magnitude: Decimal, interval_days: i32) -> Strategy {
    Strategy::new(Uuid::new_v4(), "test".to_string(), kind, magnitude, interval_days)
}

fn no_signal() -> MarketSignal {
    MarketSignal::default()
}

mod fixed_percentage {
    use super::*;

    #[test]
    fn reduces_by_percentage() {
        let listing = listing_with_prices(dec!(100), dec!(100), dec!(50));
        let strategy = strategy(StrategyKind::FixedPercentage, dec!(10), 7);

        let result = compute_next_price(&listing, &strategy, &no_signal(), Utc::now()).unwrap();

        assert!(result.applied);
        assert_eq!(result.new_price, dec!(90.00));
    }

    #[test]
    fn clamps_to_floor() {
        // 15% of 100 computes 85, below the 90 floor
        let listing = listing_with_prices(dec!(100), dec!(100), dec!(90));
        let strategy = strategy(StrategyKind::FixedPercentage, dec!(15), 7);

        let result = compute_next_price(&listing, &strategy, &no_signal(), Utc::now()).unwrap();

        assert!(result.applied);
        assert_eq!(result.new_price, dec!(90));
    }

    #[test]
    fn skips_when_already_at_floor() {
        let listing = listing_with_prices(dec!(90), dec!(100), dec!(90));
        let strategy = strategy(StrategyKind::FixedPercentage, dec!(15), 7);

        let result = compute_next_price(&listing, &strategy, &no_signal(), Utc::now()).unwrap();

        assert!(!result.applied);
        assert_eq!(result.new_price, dec!(90));
    }

    #[test]
    fn rounds_half_up_to_cents() {
        // 19.99 * 0.90 = 17.991, rounds to 17.99
        let listing = listing_with_prices(dec!(19.99), dec!(19.99), dec!(1));
        let strategy = strategy(StrategyKind::FixedPercentage, dec!(10), 7);

        let result = compute_next_price(&listing, &strategy, &no_signal(), Utc::now()).unwrap();

        assert_eq!(result.new_price, dec!(17.99));
    }

    #[test]
    fn cut_that_rounds_away_is_not_applied() {
        // 1% of 0.05 is 0.0005; the result rounds back to 0.05
        let listing = listing_with_prices(dec!(0.05), dec!(0.05), dec!(0.01));
        let strategy = strategy(StrategyKind::FixedPercentage, dec!(1), 7);

        let result = compute_next_price(&listing, &strategy, &no_signal(), Utc::now()).unwrap();

        assert!(!result.applied);
        assert_eq!(result.new_price, dec!(0.05));
    }
}

mod fixed_amount {
    use super::*;

    #[test]
    fn reduces_by_amount() {
        let listing = listing_with_prices(dec!(100), dec!(100), dec!(50));
        let strategy = strategy(StrategyKind::FixedAmount, dec!(5), 7);

        let result = compute_next_price(&listing, &strategy, &no_signal(), Utc::now()).unwrap();

        assert!(result.applied);
        assert_eq!(result.new_price, dec!(95.00));
    }

    #[test]
    fn clamps_to_floor() {
        let listing = listing_with_prices(dec!(100), dec!(100), dec!(98));
        let strategy = strategy(StrategyKind::FixedAmount, dec!(5), 7);

        let result = compute_next_price(&listing, &strategy, &no_signal(), Utc::now()).unwrap();

        assert!(result.applied);
        assert_eq!(result.new_price, dec!(98));
    }
}

mod market_based {
    use super::*;

    fn signal(average: Decimal, competitors: i32) -> MarketSignal {
        MarketSignal {
            average_price: Some(average),
            lowest_price: None,
            competitor_count: Some(competitors),
        }
    }

    #[test]
    fn follows_average_below_current() {
        let listing = listing_with_prices(dec!(100), dec!(100), dec!(50));
        let strategy = strategy(StrategyKind::MarketBased, dec!(5), 7);

        let result =
            compute_next_price(&listing, &strategy, &signal(dec!(95), 8), Utc::now()).unwrap();

        assert!(result.applied);
        assert_eq!(result.new_price, dec!(95));
        assert!(!result.low_confidence);
    }

    #[test]
    fn noop_when_average_above_current() {
        let listing = listing_with_prices(dec!(100), dec!(100), dec!(50));
        let strategy = strategy(StrategyKind::MarketBased, dec!(5), 7);

        let result =
            compute_next_price(&listing, &strategy, &signal(dec!(105), 8), Utc::now()).unwrap();

        assert!(!result.applied);
        assert_eq!(result.new_price, dec!(100));
    }

    #[test]
    fn average_clamped_to_floor() {
        let listing = listing_with_prices(dec!(100), dec!(100), dec!(97));
        let strategy = strategy(StrategyKind::MarketBased, dec!(5), 7);

        let result =
            compute_next_price(&listing, &strategy, &signal(dec!(80), 8), Utc::now()).unwrap();

        assert!(result.applied);
        assert_eq!(result.new_price, dec!(97));
    }

    #[test]
    fn skips_without_usable_signal() {
        let listing = listing_with_prices(dec!(100), dec!(100), dec!(50));
        let strategy = strategy(StrategyKind::MarketBased, dec!(5), 7);

        let result = compute_next_price(&listing, &strategy, &no_signal(), Utc::now()).unwrap();
        assert!(!result.applied);

        let zero_competitors =
            compute_next_price(&listing, &strategy, &signal(dec!(95), 0), Utc::now()).unwrap();
        assert!(!zero_competitors.applied);
    }

    #[test]
    fn thin_signal_is_flagged_but_used() {
        let listing = listing_with_prices(dec!(100), dec!(100), dec!(50));
        let strategy = strategy(StrategyKind::MarketBased, dec!(5), 7);

        let result =
            compute_next_price(&listing, &strategy, &signal(dec!(95), 3), Utc::now()).unwrap();

        assert!(result.applied);
        assert!(result.low_confidence);
        assert_eq!(result.new_price, dec!(95));
    }
}

mod time_based {
    use super::*;

    #[test]
    fn cut_grows_with_listing_age() {
        let mut listing = listing_with_prices(dec!(100), dec!(100), dec!(50));
        listing.created_at = Utc::now() - Duration::days(30);
        let strategy = strategy(StrategyKind::TimeBased, dec!(5), 7);

        // Four full intervals elapsed: a 20% single-step cut
        let result = compute_next_price(&listing, &strategy, &no_signal(), Utc::now()).unwrap();

        assert!(result.applied);
        assert_eq!(result.new_price, dec!(80.00));
    }

    #[test]
    fn young_listing_gets_single_magnitude() {
        let mut listing = listing_with_prices(dec!(100), dec!(100), dec!(50));
        listing.created_at = Utc::now() - Duration::days(3);
        let strategy = strategy(StrategyKind::TimeBased, dec!(5), 7);

        let result = compute_next_price(&listing, &strategy, &no_signal(), Utc::now()).unwrap();

        assert!(result.applied);
        assert_eq!(result.new_price, dec!(95.00));
    }

    #[test]
    fn cut_is_capped() {
        let mut listing = listing_with_prices(dec!(100), dec!(100), dec!(10));
        listing.created_at = Utc::now() - Duration::days(365);
        let strategy = strategy(StrategyKind::TimeBased, dec!(10), 7);

        // 52 intervals at 10% would be 520%; the cap holds it at 50%
        let result = compute_next_price(&listing, &strategy, &no_signal(), Utc::now()).unwrap();

        assert!(result.applied);
        assert_eq!(result.new_price, dec!(50.00));
    }
}

mod validation {
    use super::*;

    #[test]
    fn rejects_out_of_range_magnitude() {
        let listing = listing_with_prices(dec!(100), dec!(100), dec!(50));
        let strategy = strategy(StrategyKind::FixedPercentage, dec!(0), 7);

        let result = compute_next_price(&listing, &strategy, &no_signal(), Utc::now());
        assert!(matches!(result, Err(Error::Validation(_))));
    }

    #[test]
    fn rejects_out_of_range_interval() {
        let listing = listing_with_prices(dec!(100), dec!(100), dec!(50));
        let strategy = strategy(StrategyKind::FixedPercentage, dec!(10), 0);

        let result = compute_next_price(&listing, &strategy, &no_signal(), Utc::now());
        assert!(matches!(result, Err(Error::Validation(_))));
    }

    #[test]
    fn rejects_floor_above_original() {
        let listing = listing_with_prices(dec!(100), dec!(100), dec!(150));
        let strategy = strategy(StrategyKind::FixedPercentage, dec!(10), 7);

        let result = compute_next_price(&listing, &strategy, &no_signal(), Utc::now());
        assert!(matches!(result, Err(Error::Validation(_))));
    }
}

#[test]
fn computation_is_pure() {
    let listing = listing_with_prices(dec!(100), dec!(100), dec!(90));
    let strategy = strategy(StrategyKind::FixedPercentage, dec!(15), 7);
    let now = Utc::now();

    let first = compute_next_price(&listing, &strategy, &no_signal(), now).unwrap();
    let second = compute_next_price(&listing, &strategy, &no_signal(), now).unwrap();

    assert_eq!(first.applied, second.applied);
    assert_eq!(first.new_price, second.new_price);
    assert!(first.new_price >= listing.minimum_price);
}
