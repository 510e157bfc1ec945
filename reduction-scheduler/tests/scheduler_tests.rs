use std::sync::Arc;

use chrono::{Duration, Utc};
use rust_decimal_macros::dec;
use uuid::Uuid;

use common::model::event::ReductionTrigger;
use common::model::listing::{Listing, SyncStatus};
use common::model::strategy::{Strategy, StrategyKind};
use listing_sync::repository::{
    InMemoryListingRepository, InMemoryStrategyRepository, InMemoryUserSettingsRepository,
    ListingRepository, StrategyRepository, UserSettingsRepository,
};
use marketplace_client::{InMemoryMarketplace, RemoteListing};
use reduction_scheduler::{CycleReport, ReductionScheduler, SchedulerConfig};
use tokio::runtime::Runtime;

// Helper function to run async tests
fn run_async<F>(test: F)
where
    F: FnOnce() -> futures::future::BoxFuture<'static, ()> + Send + 'static,
{
    let rt = Runtime::new().unwrap();
    rt.block_on(async {
        test().await;
    });
}

struct Harness {
    listings: Arc<InMemoryListingRepository>,
    strategies: Arc<InMemoryStrategyRepository>,
    settings: Arc<InMemoryUserSettingsRepository>,
    marketplace: Arc<InMemoryMarketplace>,
    scheduler: ReductionScheduler,
}

fn harness() -> Harness {
    let listings = Arc::new(InMemoryListingRepository::new());
    let strategies = Arc::new(InMemoryStrategyRepository::new());
    let settings = Arc::new(InMemoryUserSettingsRepository::new());
    let marketplace = Arc::new(InMemoryMarketplace::new());
    let scheduler = ReductionScheduler::new(
        listings.clone(),
        strategies.clone(),
        settings.clone(),
        marketplace.clone(),
        SchedulerConfig { max_concurrency: 1 },
    );
    Harness {
        listings,
        strategies,
        settings,
        marketplace,
        scheduler,
    }
}

impl Harness {
    /// A due, monitored listing with a seeded marketplace twin
    async fn seed_monitored_listing(
        &self,
        user: Uuid,
        item_id: &str,
        current: rust_decimal::Decimal,
        floor: rust_decimal::Decimal,
        strategy_id: Uuid,
    ) -> Listing {
        self.marketplace.seed_listing(
            user,
            RemoteListing {
                item_id: item_id.to_string(),
                title: format!("Item {}", item_id),
                price: current,
                quantity: 1,
                view_count: 0,
                watch_count: 0,
            },
        );

        let mut listing = Listing::imported(
            user,
            item_id.to_string(),
            format!("Item {}", item_id),
            current,
            1,
        );
        listing.minimum_price = floor;
        listing.strategy_id = Some(strategy_id);
        listing.enable_auto_reduction = true;
        // Old enough that a never-reduced listing is due
        listing.created_at = Utc::now() - Duration::days(10);
        self.listings.insert(listing).await.unwrap()
    }

    async fn seed_strategy(&self, user: Uuid, magnitude: rust_decimal::Decimal) -> Strategy {
        let strategy = Strategy::new(
            user,
            "default".to_string(),
            StrategyKind::FixedPercentage,
            magnitude,
            7,
        );
        self.strategies.insert(strategy).await.unwrap()
    }
}

#[test]
fn reduces_due_listing_and_clamps_to_floor() {
    run_async(|| {
        Box::pin(async move {
            let h = harness();
            let user = Uuid::new_v4();
            let strategy = h.seed_strategy(user, dec!(15)).await;
            let listing = h
                .seed_monitored_listing(user, "M-1", dec!(100), dec!(90), strategy.id)
                .await;

            let report = h.scheduler.run_cycle(Utc::now()).await.unwrap();

            assert_eq!(report.processed, 1);
            assert_eq!(report.reduced, 1);
            assert_eq!(report.failed, 0);

            // 15% of 100 computes 85, clamped up to the 90 floor
            let after = h.listings.get(listing.id).await.unwrap().unwrap();
            assert_eq!(after.current_price, dec!(90));
            assert!(after.last_price_reduction.is_some());
            assert_eq!(h.marketplace.price_of(user, "M-1").unwrap(), dec!(90));

            let events = h.listings.events_for(listing.id).await.unwrap();
            assert_eq!(events.len(), 1);
            assert_eq!(events[0].old_price, dec!(100));
            assert_eq!(events[0].new_price, dec!(90));
            assert_eq!(events[0].trigger, ReductionTrigger::Scheduled);
        })
    });
}

#[test]
fn freshly_reduced_listing_is_not_a_candidate() {
    run_async(|| {
        Box::pin(async move {
            let h = harness();
            let user = Uuid::new_v4();
            let strategy = h.seed_strategy(user, dec!(15)).await;
            let listing = h
                .seed_monitored_listing(user, "M-1", dec!(100), dec!(50), strategy.id)
                .await;

            h.scheduler.run_cycle(Utc::now()).await.unwrap();

            // Immediately again, before the interval elapses
            let second = h.scheduler.run_cycle(Utc::now()).await.unwrap();
            assert_eq!(second, CycleReport::default());

            let events = h.listings.events_for(listing.id).await.unwrap();
            assert_eq!(events.len(), 1);
        })
    });
}

#[test]
fn listing_at_floor_is_skipped_without_a_marketplace_call() {
    run_async(|| {
        Box::pin(async move {
            let h = harness();
            let user = Uuid::new_v4();
            let strategy = h.seed_strategy(user, dec!(15)).await;
            h.seed_monitored_listing(user, "M-1", dec!(90), dec!(90), strategy.id)
                .await;

            let report = h.scheduler.run_cycle(Utc::now()).await.unwrap();

            assert_eq!(report.processed, 1);
            assert_eq!(report.skipped, 1);
            assert_eq!(report.reduced, 0);
            assert_eq!(h.marketplace.update_calls(), 0);
        })
    });
}

#[test]
fn vacation_gate_excludes_without_losing_configuration() {
    run_async(|| {
        Box::pin(async move {
            let h = harness();
            let user = Uuid::new_v4();
            let strategy = h.seed_strategy(user, dec!(10)).await;
            let listing = h
                .seed_monitored_listing(user, "M-1", dec!(100), dec!(50), strategy.id)
                .await;

            h.settings.set_vacation(user, true).await.unwrap();
            let paused = h.scheduler.run_cycle(Utc::now()).await.unwrap();
            assert_eq!(paused, CycleReport::default());

            // Per-listing configuration is untouched by the pause
            let during = h.listings.get(listing.id).await.unwrap().unwrap();
            assert!(during.enable_auto_reduction);

            h.settings.set_vacation(user, false).await.unwrap();
            let resumed = h.scheduler.run_cycle(Utc::now()).await.unwrap();
            assert_eq!(resumed.reduced, 1);
        })
    });
}

#[test]
fn business_rejection_fails_without_disabling_monitoring() {
    run_async(|| {
        Box::pin(async move {
            let h = harness();
            let user = Uuid::new_v4();
            let strategy = h.seed_strategy(user, dec!(10)).await;
            let listing = h
                .seed_monitored_listing(user, "M-1", dec!(100), dec!(50), strategy.id)
                .await;
            h.marketplace.reject_business("M-1", "price below category minimum");

            let report = h.scheduler.run_cycle(Utc::now()).await.unwrap();

            assert_eq!(report.failed, 1);
            assert_eq!(report.reduced, 0);

            let after = h.listings.get(listing.id).await.unwrap().unwrap();
            // Price unchanged, error surfaced, monitoring intact
            assert_eq!(after.current_price, dec!(100));
            assert_eq!(after.sync_status, SyncStatus::Error);
            assert!(after.enable_auto_reduction);
            // No reduction committed, so it stays eligible next cycle
            assert!(after.last_price_reduction.is_none());
            assert!(h.listings.events_for(listing.id).await.unwrap().is_empty());
        })
    });
}

#[test]
fn auth_failure_pauses_the_rest_of_the_user() {
    run_async(|| {
        Box::pin(async move {
            let h = harness();
            let user = Uuid::new_v4();
            let strategy = h.seed_strategy(user, dec!(10)).await;
            h.seed_monitored_listing(user, "M-1", dec!(100), dec!(50), strategy.id)
                .await;
            h.seed_monitored_listing(user, "M-2", dec!(80), dec!(40), strategy.id)
                .await;
            h.marketplace.reject_auth("M-1");
            h.marketplace.reject_auth("M-2");

            let report = h.scheduler.run_cycle(Utc::now()).await.unwrap();

            assert_eq!(report.processed, 2);
            assert_eq!(report.failed, 2);
            // Fail-fast: only the first listing reached the marketplace
            assert_eq!(h.marketplace.update_calls(), 1);
        })
    });
}

#[test]
fn inactive_strategy_is_never_scheduled() {
    run_async(|| {
        Box::pin(async move {
            let h = harness();
            let user = Uuid::new_v4();
            let mut strategy = h.seed_strategy(user, dec!(10)).await;
            h.seed_monitored_listing(user, "M-1", dec!(100), dec!(50), strategy.id)
                .await;

            strategy.active = false;
            h.strategies.update(strategy).await.unwrap();

            let report = h.scheduler.run_cycle(Utc::now()).await.unwrap();
            assert_eq!(report, CycleReport::default());
        })
    });
}

#[test]
fn concurrent_cycles_commit_exactly_one_reduction() {
    run_async(|| {
        Box::pin(async move {
            let h = harness();
            let user = Uuid::new_v4();
            let strategy = h.seed_strategy(user, dec!(10)).await;
            let listing = h
                .seed_monitored_listing(user, "M-1", dec!(100), dec!(50), strategy.id)
                .await;

            let now = Utc::now();
            let (a, b) = tokio::join!(h.scheduler.run_cycle(now), h.scheduler.run_cycle(now));
            let (a, b) = (a.unwrap(), b.unwrap());

            // However the cycles interleave, one reduction commits
            assert_eq!(a.reduced + b.reduced, 1);
            let events = h.listings.events_for(listing.id).await.unwrap();
            assert_eq!(events.len(), 1);

            let after = h.listings.get(listing.id).await.unwrap().unwrap();
            assert_eq!(after.current_price, dec!(90.00));
        })
    });
}

#[test]
fn manual_reduction_records_a_manual_event() {
    run_async(|| {
        Box::pin(async move {
            let h = harness();
            let user = Uuid::new_v4();
            let strategy = h.seed_strategy(user, dec!(10)).await;
            let listing = h
                .seed_monitored_listing(user, "M-1", dec!(100), dec!(50), strategy.id)
                .await;

            let updated = h
                .scheduler
                .reduce_listing_now(listing.id, Utc::now())
                .await
                .unwrap();
            assert_eq!(updated.current_price, dec!(90.00));

            let events = h.listings.events_for(listing.id).await.unwrap();
            assert_eq!(events.len(), 1);
            assert_eq!(events[0].trigger, ReductionTrigger::Manual);
        })
    });
}
