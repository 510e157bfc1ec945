//! Repositories for listings, strategies, user settings, and price history
//!
//! Every price-field write goes through a compare-and-swap on the listing
//! `version`: the scheduler's reduction commit and the synchronizer's
//! remote-field update both lose cleanly (with `Error::Conflict`) when the
//! other got there first. User-intent fields travel a separate, plain
//! update path that sync never touches.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use common::db::{InMemoryTransactionManager, TransactionManager};
use common::error::{Error, Result};
use common::model::event::PriceReductionEvent;
use common::model::listing::{Listing, ListingStatus, SyncStatus};
use common::model::settings::UserSettings;
use common::model::strategy::Strategy;
use common::money::Price;
use dashmap::DashMap;
use uuid::Uuid;

pub mod postgres;

pub use postgres::{
    PostgresListingRepository, PostgresStrategyRepository, PostgresUserSettingsRepository,
};

/// Marketplace-sourced fields applied during reconciliation.
///
/// Deliberately excludes everything the user owns: strategy assignment,
/// floor, and the enable flag never appear here.
#[derive(Debug, Clone)]
pub struct RemoteFields {
    /// Current asking price on the marketplace
    pub price: Price,
    /// Units available
    pub quantity: i32,
    /// View counter
    pub view_count: i64,
    /// Watch counter
    pub watch_count: i64,
}

/// Listing repository trait defining the interface for listing storage
/// and the append-only price history that belongs to it
#[async_trait]
pub trait ListingRepository: Send + Sync {
    /// Get the transaction manager
    fn transaction_manager(&self) -> &dyn TransactionManager;

    /// Insert a new listing
    async fn insert(&self, listing: Listing) -> Result<Listing>;

    /// Get a listing by internal id
    async fn get(&self, id: Uuid) -> Result<Option<Listing>>;

    /// Find a listing by its marketplace item id
    async fn find_by_marketplace_item(&self, user_id: Uuid, item_id: &str)
        -> Result<Option<Listing>>;

    /// Find a listing by SKU
    async fn find_by_sku(&self, user_id: Uuid, sku: &str) -> Result<Option<Listing>>;

    /// All listings belonging to a user
    async fn list_for_user(&self, user_id: Uuid) -> Result<Vec<Listing>>;

    /// All listings with monitoring switched on: auto-reduction enabled,
    /// active, and a strategy assigned. Due-ness and the vacation gate
    /// are the scheduler's concern.
    async fn monitored_active(&self) -> Result<Vec<Listing>>;

    /// Number of listings referencing a strategy
    async fn count_for_strategy(&self, strategy_id: Uuid) -> Result<u64>;

    /// Replace user-owned fields of a listing (strategy assignment,
    /// floor, enable flag); bumps the version
    async fn update(&self, listing: Listing) -> Result<Listing>;

    /// Apply marketplace-sourced fields if the version still matches;
    /// `Error::Conflict` when a concurrent writer won
    async fn apply_remote_fields(
        &self,
        id: Uuid,
        expected_version: i64,
        fields: RemoteFields,
        now: DateTime<Utc>,
    ) -> Result<Listing>;

    /// Commit a price reduction if the version still matches, recording
    /// the history event atomically with the price write;
    /// `Error::Conflict` when a concurrent writer won
    async fn commit_reduction(
        &self,
        id: Uuid,
        expected_version: i64,
        new_price: Price,
        event: PriceReductionEvent,
        now: DateTime<Utc>,
    ) -> Result<Listing>;

    /// Soft-close a listing the marketplace no longer reports
    async fn close(&self, id: Uuid) -> Result<()>;

    /// Update only the sync status, for surfacing failed operations
    async fn mark_sync_status(&self, id: Uuid, status: SyncStatus) -> Result<()>;

    /// Append a history event outside the reduction commit path
    /// (manual price changes)
    async fn append_event(&self, event: PriceReductionEvent) -> Result<()>;

    /// Price history for a listing, oldest first; survives soft-close
    async fn events_for(&self, listing_id: Uuid) -> Result<Vec<PriceReductionEvent>>;
}

/// Strategy repository trait
#[async_trait]
pub trait StrategyRepository: Send + Sync {
    /// Insert a new strategy
    async fn insert(&self, strategy: Strategy) -> Result<Strategy>;

    /// Get a strategy by id
    async fn get(&self, id: Uuid) -> Result<Option<Strategy>>;

    /// All strategies belonging to a user
    async fn list_for_user(&self, user_id: Uuid) -> Result<Vec<Strategy>>;

    /// Replace a strategy
    async fn update(&self, strategy: Strategy) -> Result<Strategy>;

    /// Hard-delete a strategy; the caller guards the referenced-by-
    /// listings invariant
    async fn delete(&self, id: Uuid) -> Result<()>;
}

/// Per-user settings repository trait
#[async_trait]
pub trait UserSettingsRepository: Send + Sync {
    /// Settings for a user, defaults if none stored yet
    async fn get_or_default(&self, user_id: Uuid) -> Result<UserSettings>;

    /// Flip the vacation gate
    async fn set_vacation(&self, user_id: Uuid, vacation: bool) -> Result<UserSettings>;

    /// Record a completed reconciliation
    async fn mark_reconciled(&self, user_id: Uuid, at: DateTime<Utc>) -> Result<()>;
}

/// In-memory repository for listings and price history
pub struct InMemoryListingRepository {
    /// Listings by internal id
    listings: DashMap<Uuid, Listing>,
    /// Price history by listing id
    events: DashMap<Uuid, Vec<PriceReductionEvent>>,
    /// Transaction manager
    transaction_manager: InMemoryTransactionManager,
}

impl InMemoryListingRepository {
    /// Create a new in-memory listing repository
    pub fn new() -> Self {
        Self {
            listings: DashMap::new(),
            events: DashMap::new(),
            transaction_manager: InMemoryTransactionManager::new(),
        }
    }
}

impl Default for InMemoryListingRepository {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ListingRepository for InMemoryListingRepository {
    fn transaction_manager(&self) -> &dyn TransactionManager {
        &self.transaction_manager
    }

    async fn insert(&self, listing: Listing) -> Result<Listing> {
        self.listings.insert(listing.id, listing.clone());
        Ok(listing)
    }

    async fn get(&self, id: Uuid) -> Result<Option<Listing>> {
        Ok(self.listings.get(&id).map(|l| l.clone()))
    }

    async fn find_by_marketplace_item(
        &self,
        user_id: Uuid,
        item_id: &str,
    ) -> Result<Option<Listing>> {
        Ok(self
            .listings
            .iter()
            .find(|entry| {
                entry.user_id == user_id
                    && entry.marketplace_item_id.as_deref() == Some(item_id)
            })
            .map(|entry| entry.clone()))
    }

    async fn find_by_sku(&self, user_id: Uuid, sku: &str) -> Result<Option<Listing>> {
        Ok(self
            .listings
            .iter()
            .find(|entry| entry.user_id == user_id && entry.sku.as_deref() == Some(sku))
            .map(|entry| entry.clone()))
    }

    async fn list_for_user(&self, user_id: Uuid) -> Result<Vec<Listing>> {
        Ok(self
            .listings
            .iter()
            .filter(|entry| entry.user_id == user_id)
            .map(|entry| entry.clone())
            .collect())
    }

    async fn monitored_active(&self) -> Result<Vec<Listing>> {
        Ok(self
            .listings
            .iter()
            .filter(|entry| entry.is_monitored())
            .map(|entry| entry.clone())
            .collect())
    }

    async fn count_for_strategy(&self, strategy_id: Uuid) -> Result<u64> {
        Ok(self
            .listings
            .iter()
            .filter(|entry| entry.strategy_id == Some(strategy_id))
            .count() as u64)
    }

    async fn update(&self, mut listing: Listing) -> Result<Listing> {
        match self.listings.get_mut(&listing.id) {
            Some(mut existing) => {
                listing.version = existing.version + 1;
                listing.updated_at = Utc::now();
                *existing = listing.clone();
                Ok(listing)
            }
            None => Err(Error::ListingNotFound(format!(
                "Listing not found: {}",
                listing.id
            ))),
        }
    }

    async fn apply_remote_fields(
        &self,
        id: Uuid,
        expected_version: i64,
        fields: RemoteFields,
        now: DateTime<Utc>,
    ) -> Result<Listing> {
        let mut entry = self
            .listings
            .get_mut(&id)
            .ok_or_else(|| Error::ListingNotFound(format!("Listing not found: {}", id)))?;

        if entry.version != expected_version {
            return Err(Error::Conflict(format!(
                "Listing {} moved from version {} to {}",
                id, expected_version, entry.version
            )));
        }

        entry.current_price = fields.price;
        entry.quantity_available = fields.quantity;
        entry.view_count = fields.view_count;
        entry.watch_count = fields.watch_count;
        entry.last_synced_at = Some(now);
        entry.sync_status = SyncStatus::Synced;
        entry.version += 1;
        entry.updated_at = now;
        Ok(entry.clone())
    }

    async fn commit_reduction(
        &self,
        id: Uuid,
        expected_version: i64,
        new_price: Price,
        event: PriceReductionEvent,
        now: DateTime<Utc>,
    ) -> Result<Listing> {
        let mut entry = self
            .listings
            .get_mut(&id)
            .ok_or_else(|| Error::ListingNotFound(format!("Listing not found: {}", id)))?;

        if entry.version != expected_version {
            return Err(Error::Conflict(format!(
                "Listing {} moved from version {} to {}",
                id, expected_version, entry.version
            )));
        }

        entry.current_price = new_price;
        entry.last_price_reduction = Some(now);
        entry.sync_status = SyncStatus::Synced;
        entry.version += 1;
        entry.updated_at = now;

        self.events.entry(id).or_default().push(event);
        Ok(entry.clone())
    }

    async fn close(&self, id: Uuid) -> Result<()> {
        let mut entry = self
            .listings
            .get_mut(&id)
            .ok_or_else(|| Error::ListingNotFound(format!("Listing not found: {}", id)))?;
        entry.listing_status = ListingStatus::Ended;
        entry.version += 1;
        entry.updated_at = Utc::now();
        Ok(())
    }

    async fn mark_sync_status(&self, id: Uuid, status: SyncStatus) -> Result<()> {
        let mut entry = self
            .listings
            .get_mut(&id)
            .ok_or_else(|| Error::ListingNotFound(format!("Listing not found: {}", id)))?;
        entry.sync_status = status;
        entry.updated_at = Utc::now();
        Ok(())
    }

    async fn append_event(&self, event: PriceReductionEvent) -> Result<()> {
        self.events.entry(event.listing_id).or_default().push(event);
        Ok(())
    }

    async fn events_for(&self, listing_id: Uuid) -> Result<Vec<PriceReductionEvent>> {
        Ok(self
            .events
            .get(&listing_id)
            .map(|events| events.clone())
            .unwrap_or_default())
    }
}

/// In-memory repository for strategies
pub struct InMemoryStrategyRepository {
    strategies: DashMap<Uuid, Strategy>,
}

impl InMemoryStrategyRepository {
    /// Create a new in-memory strategy repository
    pub fn new() -> Self {
        Self {
            strategies: DashMap::new(),
        }
    }
}

impl Default for InMemoryStrategyRepository {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl StrategyRepository for InMemoryStrategyRepository {
    async fn insert(&self, strategy: Strategy) -> Result<Strategy> {
        self.strategies.insert(strategy.id, strategy.clone());
        Ok(strategy)
    }

    async fn get(&self, id: Uuid) -> Result<Option<Strategy>> {
        Ok(self.strategies.get(&id).map(|s| s.clone()))
    }

    async fn list_for_user(&self, user_id: Uuid) -> Result<Vec<Strategy>> {
        Ok(self
            .strategies
            .iter()
            .filter(|entry| entry.user_id == user_id)
            .map(|entry| entry.clone())
            .collect())
    }

    async fn update(&self, mut strategy: Strategy) -> Result<Strategy> {
        match self.strategies.get_mut(&strategy.id) {
            Some(mut existing) => {
                strategy.updated_at = Utc::now();
                *existing = strategy.clone();
                Ok(strategy)
            }
            None => Err(Error::StrategyNotFound(format!(
                "Strategy not found: {}",
                strategy.id
            ))),
        }
    }

    async fn delete(&self, id: Uuid) -> Result<()> {
        self.strategies
            .remove(&id)
            .map(|_| ())
            .ok_or_else(|| Error::StrategyNotFound(format!("Strategy not found: {}", id)))
    }
}

/// In-memory repository for user settings
pub struct InMemoryUserSettingsRepository {
    settings: DashMap<Uuid, UserSettings>,
}

impl InMemoryUserSettingsRepository {
    /// Create a new in-memory settings repository
    pub fn new() -> Self {
        Self {
            settings: DashMap::new(),
        }
    }
}

impl Default for InMemoryUserSettingsRepository {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl UserSettingsRepository for InMemoryUserSettingsRepository {
    async fn get_or_default(&self, user_id: Uuid) -> Result<UserSettings> {
        Ok(self
            .settings
            .entry(user_id)
            .or_insert_with(|| UserSettings::new(user_id))
            .clone())
    }

    async fn set_vacation(&self, user_id: Uuid, vacation: bool) -> Result<UserSettings> {
        let mut entry = self
            .settings
            .entry(user_id)
            .or_insert_with(|| UserSettings::new(user_id));
        entry.vacation_mode = vacation;
        entry.updated_at = Utc::now();
        Ok(entry.clone())
    }

    async fn mark_reconciled(&self, user_id: Uuid, at: DateTime<Utc>) -> Result<()> {
        let mut entry = self
            .settings
            .entry(user_id)
            .or_insert_with(|| UserSettings::new(user_id));
        entry.last_reconciled_at = Some(at);
        entry.updated_at = Utc::now();
        Ok(())
    }
}
