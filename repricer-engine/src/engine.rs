//! Application facade
//!
//! The surface the surrounding application calls: trigger cycles and
//! reconciliations, preview strategies, drive the OAuth connection, and
//! flip vacation mode. Everything stateful lives in the repositories and
//! the vault; this type only wires components together and enforces the
//! reconciliation freshness gate.

use std::env;
use std::sync::Arc;

use chrono::{Duration, Utc};
use common::error::{Error, ErrorExt, Result};
use common::money::Price;
use common::model::credential::ConnectionInfo;
use common::model::event::PriceReductionEvent;
use common::model::settings::UserSettings;
use common::model::strategy::Strategy;
use credential_vault::{CredentialVault, DeveloperKeys};
use listing_sync::repository::{ListingRepository, StrategyRepository, UserSettingsRepository};
use listing_sync::{ListingSynchronizer, SyncReport};
use marketplace_client::{AuthorizationRequest, TokenManager};
use reduction_scheduler::{CycleReport, ReductionScheduler};
use strategy_engine::{compute_next_price, Computation};
use tracing::{debug, info};
use uuid::Uuid;

/// Configuration for the facade
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Reconciliation is expensive; skip re-runs within this window
    pub sync_freshness_hours: i64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            sync_freshness_hours: env::var("SYNC_FRESHNESS_HOURS")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(4),
        }
    }
}

impl EngineConfig {
    /// Read the configuration from environment variables
    pub fn from_env() -> Self {
        Self::default()
    }
}

/// The repricing engine, fully wired
pub struct Engine {
    listings: Arc<dyn ListingRepository>,
    strategies: Arc<dyn StrategyRepository>,
    settings: Arc<dyn UserSettingsRepository>,
    vault: Arc<CredentialVault>,
    tokens: Arc<TokenManager>,
    synchronizer: ListingSynchronizer,
    scheduler: ReductionScheduler,
    config: EngineConfig,
}

impl Engine {
    /// Assemble an engine from its parts
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        listings: Arc<dyn ListingRepository>,
        strategies: Arc<dyn StrategyRepository>,
        settings: Arc<dyn UserSettingsRepository>,
        vault: Arc<CredentialVault>,
        tokens: Arc<TokenManager>,
        synchronizer: ListingSynchronizer,
        scheduler: ReductionScheduler,
        config: EngineConfig,
    ) -> Self {
        Self {
            listings,
            strategies,
            settings,
            vault,
            tokens,
            synchronizer,
            scheduler,
            config,
        }
    }

    /// Reconcile a user's listings unless a recent run already did.
    ///
    /// Returns `None` when the freshness window suppressed the run; the
    /// synchronizer itself never refuses a call, the gate lives here.
    pub async fn trigger_reconciliation(&self, user_id: Uuid) -> Result<Option<SyncReport>> {
        let settings = self.settings.get_or_default(user_id).await?;
        let freshness = Duration::hours(self.config.sync_freshness_hours);
        if let Some(last) = settings.last_reconciled_at {
            if Utc::now() - last < freshness {
                debug!(
                    "Skipping reconciliation for user {}: last run {} is fresh",
                    user_id, last
                );
                return Ok(None);
            }
        }

        let report = self
            .synchronizer
            .reconcile(user_id)
            .await
            .with_context(|| format!("Reconciliation failed for user {}", user_id))?;
        self.settings.mark_reconciled(user_id, Utc::now()).await?;
        Ok(Some(report))
    }

    /// Run one reduction cycle now
    pub async fn trigger_reduction_cycle(&self) -> Result<CycleReport> {
        self.scheduler.run_cycle(Utc::now()).await
    }

    /// What a strategy would do to a listing, with nothing committed
    pub async fn compute_strategy_preview(
        &self,
        listing_id: Uuid,
        strategy_id: Uuid,
    ) -> Result<Computation> {
        let listing = self.listings.get(listing_id).await?.ok_or_else(|| {
            Error::ListingNotFound(format!("Listing not found: {}", listing_id))
        })?;
        let strategy = self.strategies.get(strategy_id).await?.ok_or_else(|| {
            Error::StrategyNotFound(format!("Strategy not found: {}", strategy_id))
        })?;
        compute_next_price(&listing, &strategy, &listing.market_signal(), Utc::now())
    }

    /// Store developer keys for a user's marketplace application
    pub async fn store_developer_keys(&self, user_id: Uuid, keys: DeveloperKeys) -> Result<()> {
        self.vault.put_developer_keys(user_id, keys).await
    }

    /// Begin the OAuth connection flow; returns the URL to send the
    /// user to
    pub async fn connect_marketplace(&self, user_id: Uuid) -> Result<AuthorizationRequest> {
        self.tokens.begin_authorization(user_id).await
    }

    /// Complete the OAuth flow from the marketplace callback
    pub async fn handle_oauth_callback(&self, code: &str, state: &str) -> Result<Uuid> {
        self.tokens.handle_callback(code, state).await
    }

    /// Disconnect a user's marketplace connection
    pub async fn disconnect_marketplace(&self, user_id: Uuid) -> Result<()> {
        self.tokens.disconnect(user_id).await
    }

    /// The secret-free connection status for a user
    pub async fn connection_status(&self, user_id: Uuid) -> Result<Option<ConnectionInfo>> {
        self.tokens.connection_status(user_id).await
    }

    /// Flip the vacation gate for a user
    pub async fn set_vacation_mode(&self, user_id: Uuid, vacation: bool) -> Result<UserSettings> {
        info!("Setting vacation mode {} for user {}", vacation, user_id);
        self.settings.set_vacation(user_id, vacation).await
    }

    /// Price history for a listing, oldest first
    pub async fn price_history(&self, listing_id: Uuid) -> Result<Vec<PriceReductionEvent>> {
        self.listings.events_for(listing_id).await
    }

    /// Configure monitoring for a listing: floor, strategy, enable flag.
    ///
    /// The pricing invariants are validated before anything persists;
    /// enabling auto-reduction without a positive floor is rejected.
    pub async fn configure_monitoring(
        &self,
        listing_id: Uuid,
        minimum_price: Price,
        strategy_id: Option<Uuid>,
        enabled: bool,
    ) -> Result<()> {
        let mut listing = self.listings.get(listing_id).await?.ok_or_else(|| {
            Error::ListingNotFound(format!("Listing not found: {}", listing_id))
        })?;

        if let Some(strategy_id) = strategy_id {
            if self.strategies.get(strategy_id).await?.is_none() {
                return Err(Error::StrategyNotFound(format!(
                    "Strategy not found: {}",
                    strategy_id
                )));
            }
        }
        if enabled && strategy_id.is_none() {
            return Err(Error::Validation(format!(
                "Listing {} cannot enable auto-reduction without a strategy",
                listing_id
            )));
        }

        listing.minimum_price = minimum_price;
        listing.strategy_id = strategy_id;
        listing.enable_auto_reduction = enabled;
        listing.validate_monitoring()?;

        self.listings.update(listing).await?;
        Ok(())
    }

    /// Create a strategy after validating its configuration
    pub async fn create_strategy(&self, strategy: Strategy) -> Result<Strategy> {
        strategy.validate()?;
        self.strategies.insert(strategy).await
    }

    /// Delete a strategy, rejected while any listing still references it
    pub async fn delete_strategy(&self, strategy_id: Uuid) -> Result<()> {
        let references = self.listings.count_for_strategy(strategy_id).await?;
        if references > 0 {
            return Err(Error::StrategyInUse(format!(
                "Strategy {} is assigned to {} listings",
                strategy_id, references
            )));
        }
        self.strategies.delete(strategy_id).await
    }

    /// The synchronizer, for catalog-driven listing creation
    pub fn synchronizer(&self) -> &ListingSynchronizer {
        &self.synchronizer
    }

    /// The scheduler, for manual one-off reductions
    pub fn scheduler(&self) -> &ReductionScheduler {
        &self.scheduler
    }
}
