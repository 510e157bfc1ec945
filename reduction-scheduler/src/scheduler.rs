//! The reduction cycle
//!
//! One `run_cycle` invocation is a discrete, stateless pass over every
//! monitored listing: select the due ones (skipping owners on vacation),
//! compute the next price, push it to the marketplace, and commit price
//! plus history atomically under an optimistic version check. Per-listing
//! failures are isolated; a cycle never aborts because one listing did.
//! Overlapping cycles race only at the version compare-and-swap, which
//! commits exactly one reduction per listing.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use common::error::{Error, ErrorExt, Result};
use common::model::event::{PriceReductionEvent, ReductionTrigger};
use common::model::listing::{Listing, SyncStatus};
use common::model::strategy::Strategy;
use dashmap::DashSet;
use futures::stream::{self, StreamExt};
use listing_sync::repository::{ListingRepository, StrategyRepository, UserSettingsRepository};
use marketplace_client::MarketplaceApi;
use strategy_engine::compute_next_price;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::config::SchedulerConfig;

/// Outcome counts for one scheduler cycle
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct CycleReport {
    /// Due candidates the cycle attempted
    pub processed: u64,
    /// Reductions committed
    pub reduced: u64,
    /// Candidates skipped without a marketplace call (at floor, lost a
    /// version race, signal unusable)
    pub skipped: u64,
    /// Candidates that failed (validation, rejection, transient, auth)
    pub failed: u64,
}

enum Outcome {
    Reduced,
    Skipped,
    Failed,
}

/// Runs scheduled price reductions across all monitored listings
pub struct ReductionScheduler {
    listings: Arc<dyn ListingRepository>,
    strategies: Arc<dyn StrategyRepository>,
    settings: Arc<dyn UserSettingsRepository>,
    marketplace: Arc<dyn MarketplaceApi>,
    config: SchedulerConfig,
}

impl ReductionScheduler {
    /// Create a scheduler over the given repositories and client
    pub fn new(
        listings: Arc<dyn ListingRepository>,
        strategies: Arc<dyn StrategyRepository>,
        settings: Arc<dyn UserSettingsRepository>,
        marketplace: Arc<dyn MarketplaceApi>,
        config: SchedulerConfig,
    ) -> Self {
        Self {
            listings,
            strategies,
            settings,
            marketplace,
            config,
        }
    }

    /// Run one reduction cycle at `now`.
    ///
    /// Selection: auto-reduction enabled, active, owner not on vacation
    /// (the flag is read fresh from the store, never cached), strategy
    /// active, and due by the strategy interval. Listings are processed
    /// with bounded concurrency to respect marketplace rate limits.
    pub async fn run_cycle(&self, now: DateTime<Utc>) -> Result<CycleReport> {
        let monitored = self.listings.monitored_active().await?;
        debug!("Cycle start: {} monitored listings", monitored.len());

        // Vacation gate, one fresh read per owner per cycle
        let mut on_vacation: HashMap<Uuid, bool> = HashMap::new();
        let mut strategy_cache: HashMap<Uuid, Option<Strategy>> = HashMap::new();
        let mut candidates: Vec<(Listing, Strategy)> = Vec::new();

        for listing in monitored {
            let vacation = match on_vacation.get(&listing.user_id) {
                Some(flag) => *flag,
                None => {
                    let flag = self
                        .settings
                        .get_or_default(listing.user_id)
                        .await?
                        .vacation_mode;
                    on_vacation.insert(listing.user_id, flag);
                    flag
                }
            };
            if vacation {
                continue;
            }

            let strategy_id = match listing.strategy_id {
                Some(id) => id,
                None => continue,
            };
            let strategy = match strategy_cache.get(&strategy_id) {
                Some(cached) => cached.clone(),
                None => {
                    let fetched = self.strategies.get(strategy_id).await?;
                    strategy_cache.insert(strategy_id, fetched.clone());
                    fetched
                }
            };
            let strategy = match strategy {
                Some(s) if s.active => s,
                _ => continue,
            };

            if listing.is_due(strategy.interval_days, now) {
                candidates.push((listing, strategy));
            }
        }

        info!("Cycle start: {} due candidates", candidates.len());

        // Once a user's refresh token is known dead, the rest of their
        // listings fail fast instead of hammering the token endpoint
        let auth_failed: DashSet<Uuid> = DashSet::new();

        let processed = candidates.len() as u64;
        let outcomes: Vec<Outcome> = stream::iter(candidates)
            .map(|(listing, strategy)| {
                let auth_failed = &auth_failed;
                async move { self.process_listing(listing, strategy, now, auth_failed).await }
            })
            .buffer_unordered(self.config.max_concurrency)
            .collect()
            .await;

        let mut report = CycleReport {
            processed,
            ..CycleReport::default()
        };
        for outcome in outcomes {
            match outcome {
                Outcome::Reduced => report.reduced += 1,
                Outcome::Skipped => report.skipped += 1,
                Outcome::Failed => report.failed += 1,
            }
        }

        info!(
            "Cycle done: {} processed, {} reduced, {} skipped, {} failed",
            report.processed, report.reduced, report.skipped, report.failed
        );
        Ok(report)
    }

    /// Reduce one listing immediately, bypassing due-ness but keeping
    /// every safety check (floor, version race, vacation excluded on
    /// purpose: an explicit user action overrides the pause).
    pub async fn reduce_listing_now(&self, listing_id: Uuid, now: DateTime<Utc>) -> Result<Listing> {
        let listing = self.listings.get(listing_id).await?.ok_or_else(|| {
            Error::ListingNotFound(format!("Listing not found: {}", listing_id))
        })?;
        let strategy_id = listing.strategy_id.ok_or_else(|| {
            Error::Validation(format!("Listing {} has no strategy assigned", listing_id))
        })?;
        let strategy = self.strategies.get(strategy_id).await?.ok_or_else(|| {
            Error::StrategyNotFound(format!("Strategy not found: {}", strategy_id))
        })?;

        let computation = compute_next_price(&listing, &strategy, &listing.market_signal(), now)?;
        if !computation.applied {
            return Err(Error::Validation(format!(
                "No reduction possible for listing {}: {}",
                listing_id, computation.reason
            )));
        }

        let item_id = listing.marketplace_item_id.clone().ok_or_else(|| {
            Error::Validation(format!("Listing {} has no marketplace item", listing_id))
        })?;
        self.marketplace
            .update_price(listing.user_id, &item_id, computation.new_price)
            .await?;

        let event = PriceReductionEvent::record(
            listing.id,
            listing.current_price,
            computation.new_price,
            Some(strategy.id),
            ReductionTrigger::Manual,
        );
        self.listings
            .commit_reduction(listing.id, listing.version, computation.new_price, event, now)
            .await
            .with_context(|| format!("Failed to commit manual reduction for listing {}", listing_id))
    }

    /// Process one due candidate; never propagates, every failure is
    /// absorbed into an outcome so the cycle continues
    async fn process_listing(
        &self,
        candidate: Listing,
        strategy: Strategy,
        now: DateTime<Utc>,
        auth_failed: &DashSet<Uuid>,
    ) -> Outcome {
        let listing_id = candidate.id;

        // Re-read before acting so the computation never starts from a
        // snapshot a reconciliation has already replaced
        let listing = match self.listings.get(listing_id).await {
            Ok(Some(listing)) => listing,
            Ok(None) => {
                warn!("Listing {} vanished before processing", listing_id);
                return Outcome::Skipped;
            }
            Err(e) => {
                error!("Failed to re-read listing {}: {}", listing_id, e);
                return Outcome::Failed;
            }
        };
        if !listing.is_monitored() || !listing.is_due(strategy.interval_days, now) {
            debug!("Listing {} no longer eligible, skipping", listing_id);
            return Outcome::Skipped;
        }

        if auth_failed.contains(&listing.user_id) {
            debug!("Skipping listing {}: owner auth already failed", listing_id);
            return Outcome::Failed;
        }

        let computation =
            match compute_next_price(&listing, &strategy, &listing.market_signal(), now) {
                Ok(computation) => computation,
                Err(e) => {
                    error!("Strategy computation failed for {}: {}", listing_id, e);
                    let _ = self
                        .listings
                        .mark_sync_status(listing_id, SyncStatus::Error)
                        .await;
                    return Outcome::Failed;
                }
            };

        if !computation.applied {
            debug!("Listing {} skipped: {}", listing_id, computation.reason);
            return Outcome::Skipped;
        }
        if computation.low_confidence {
            warn!(
                "Listing {} reduced on a low-confidence market signal",
                listing_id
            );
        }

        let item_id = match listing.marketplace_item_id.as_deref() {
            Some(item_id) => item_id,
            None => {
                error!("Listing {} has no marketplace item id", listing_id);
                return Outcome::Failed;
            }
        };

        // The client retries transient failures internally; whatever
        // reaches us here is final for this cycle
        if let Err(e) = self
            .marketplace
            .update_price(listing.user_id, item_id, computation.new_price)
            .await
        {
            return self.record_failure(&listing, e, auth_failed).await;
        }

        let event = PriceReductionEvent::record(
            listing.id,
            listing.current_price,
            computation.new_price,
            Some(strategy.id),
            ReductionTrigger::Scheduled,
        );
        match self
            .listings
            .commit_reduction(listing.id, listing.version, computation.new_price, event, now)
            .await
        {
            Ok(updated) => {
                info!(
                    "Reduced listing {} from {} to {} ({}); next due {}",
                    listing_id,
                    listing.current_price,
                    updated.current_price,
                    computation.reason,
                    updated.next_price_reduction(strategy.interval_days)
                );
                Outcome::Reduced
            }
            Err(Error::Conflict(msg)) => {
                // Single-flight: a concurrent writer committed first
                warn!("Reduction of {} lost the version race: {}", listing_id, msg);
                Outcome::Skipped
            }
            Err(e) => {
                error!("Failed to commit reduction of {}: {}", listing_id, e);
                Outcome::Failed
            }
        }
    }

    async fn record_failure(
        &self,
        listing: &Listing,
        err: Error,
        auth_failed: &DashSet<Uuid>,
    ) -> Outcome {
        match &err {
            Error::Auth(_) => {
                // The owner must reconnect; their remaining listings
                // fail fast this cycle and monitoring stays configured
                warn!(
                    "Auth failure reducing listing {}: {}; pausing user {}",
                    listing.id, err, listing.user_id
                );
                auth_failed.insert(listing.user_id);
            }
            Error::MarketplaceRejection(_) => {
                error!(
                    "Marketplace rejected reduction of listing {}: {}",
                    listing.id, err
                );
            }
            Error::Transient(_) => {
                warn!(
                    "Transient failure reducing listing {}: {}; retrying next cycle",
                    listing.id, err
                );
            }
            _ => {
                error!("Failed to reduce listing {}: {}", listing.id, err);
            }
        }

        // Price unchanged, error surfaced to the user, monitoring intact
        if let Err(mark_err) = self
            .listings
            .mark_sync_status(listing.id, SyncStatus::Error)
            .await
        {
            error!(
                "Failed to flag sync error on listing {}: {}",
                listing.id, mark_err
            );
        }
        Outcome::Failed
    }
}
