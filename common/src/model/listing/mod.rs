//! Listing model and related types

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{Error, Result};
use crate::money::Price;

/// Listing lifecycle status on the marketplace
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ListingStatus {
    /// Live on the marketplace and eligible for monitoring
    Active,
    /// Gone from the marketplace; soft-closed, history preserved
    Ended,
}

impl ListingStatus {
    /// Database representation
    pub fn as_str(&self) -> &'static str {
        match self {
            ListingStatus::Active => "active",
            ListingStatus::Ended => "ended",
        }
    }

    /// Parse the database representation
    pub fn parse(s: &str) -> Result<Self> {
        match s {
            "active" => Ok(ListingStatus::Active),
            "ended" => Ok(ListingStatus::Ended),
            other => Err(Error::Internal(format!("Unknown listing status: {}", other))),
        }
    }
}

/// Synchronization state against the marketplace
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SyncStatus {
    /// Local record matches the last marketplace response
    Synced,
    /// A local change has not been pushed yet
    Pending,
    /// The last marketplace operation for this listing failed
    Error,
}

impl SyncStatus {
    /// Database representation
    pub fn as_str(&self) -> &'static str {
        match self {
            SyncStatus::Synced => "synced",
            SyncStatus::Pending => "pending",
            SyncStatus::Error => "error",
        }
    }

    /// Parse the database representation
    pub fn parse(s: &str) -> Result<Self> {
        match s {
            "synced" => Ok(SyncStatus::Synced),
            "pending" => Ok(SyncStatus::Pending),
            "error" => Ok(SyncStatus::Error),
            other => Err(Error::Internal(format!("Unknown sync status: {}", other))),
        }
    }
}

/// Competitor pricing signal produced by external market analysis.
///
/// All fields are optional at the model level; the market-based strategy
/// decides whether the signal is usable.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MarketSignal {
    /// Average competitor price
    pub average_price: Option<Price>,
    /// Lowest competitor price
    pub lowest_price: Option<Price>,
    /// Number of competitors behind the averages
    pub competitor_count: Option<i32>,
}

impl MarketSignal {
    /// A signal based on fewer than this many competitors is flagged
    /// low-confidence (but still used).
    pub const CONFIDENCE_THRESHOLD: i32 = 5;

    /// Whether the signal carries enough data for a market-based reduction
    pub fn is_usable(&self) -> bool {
        self.average_price.is_some() && self.competitor_count.unwrap_or(0) > 0
    }

    /// Whether the signal is usable but thinly sourced
    pub fn is_low_confidence(&self) -> bool {
        self.is_usable() && self.competitor_count.unwrap_or(0) < Self::CONFIDENCE_THRESHOLD
    }
}

/// A marketplace item under monitoring
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Listing {
    /// Internal id, owned by this system
    pub id: Uuid,
    /// Owning user
    pub user_id: Uuid,
    /// Marketplace item id; immutable once assigned
    pub marketplace_item_id: Option<String>,
    /// Deterministic SKU for catalog-created listings
    pub sku: Option<String>,
    /// Listing title
    pub title: String,
    /// Current asking price
    pub current_price: Price,
    /// Price at enrollment; reductions never exceed it
    pub original_price: Price,
    /// Floor; reductions never go below it
    pub minimum_price: Price,
    /// Reduction strategy assigned by the user, if any
    pub strategy_id: Option<Uuid>,
    /// Whether the scheduler may reduce this listing
    pub enable_auto_reduction: bool,
    /// Marketplace lifecycle status
    pub listing_status: ListingStatus,
    /// Units available
    pub quantity_available: i32,
    /// Marketplace view counter
    pub view_count: i64,
    /// Marketplace watch counter
    pub watch_count: i64,
    /// Competitor average price, when analysis has run
    pub market_average_price: Option<Price>,
    /// Competitor lowest price
    pub market_lowest_price: Option<Price>,
    /// Number of competitors behind the signal
    pub market_competitor_count: Option<i32>,
    /// Last successful marketplace sync for this record
    pub last_synced_at: Option<DateTime<Utc>>,
    /// Synchronization state
    pub sync_status: SyncStatus,
    /// Timestamp of the last committed reduction
    pub last_price_reduction: Option<DateTime<Utc>>,
    /// Optimistic-concurrency token; bumped on every price-field write
    pub version: i64,
    /// Creation timestamp
    pub created_at: DateTime<Utc>,
    /// Last update timestamp
    pub updated_at: DateTime<Utc>,
}

impl Listing {
    /// Create a listing imported from the marketplace.
    ///
    /// Imported listings start unmonitored: auto-reduction is strictly
    /// opt-in and never enabled by a sync.
    pub fn imported(
        user_id: Uuid,
        marketplace_item_id: String,
        title: String,
        price: Price,
        quantity_available: i32,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            user_id,
            marketplace_item_id: Some(marketplace_item_id),
            sku: None,
            title,
            current_price: price,
            original_price: price,
            minimum_price: Price::ZERO,
            strategy_id: None,
            enable_auto_reduction: false,
            listing_status: ListingStatus::Active,
            quantity_available,
            view_count: 0,
            watch_count: 0,
            market_average_price: None,
            market_lowest_price: None,
            market_competitor_count: None,
            last_synced_at: Some(now),
            sync_status: SyncStatus::Synced,
            last_price_reduction: None,
            version: 0,
            created_at: now,
            updated_at: now,
        }
    }

    /// Create a listing from catalog data, pending its first marketplace push
    pub fn from_catalog(user_id: Uuid, sku: String, title: String, price: Price) -> Self {
        let mut listing = Self::imported(user_id, String::new(), title, price, 1);
        listing.marketplace_item_id = None;
        listing.sku = Some(sku);
        listing.last_synced_at = None;
        listing.sync_status = SyncStatus::Pending;
        listing
    }

    /// The market signal embedded in this record
    pub fn market_signal(&self) -> MarketSignal {
        MarketSignal {
            average_price: self.market_average_price,
            lowest_price: self.market_lowest_price,
            competitor_count: self.market_competitor_count,
        }
    }

    /// Whether the listing itself qualifies for reduction, ignoring
    /// due-ness and the owner's vacation flag
    pub fn is_monitored(&self) -> bool {
        self.enable_auto_reduction
            && self.listing_status == ListingStatus::Active
            && self.strategy_id.is_some()
    }

    /// Whether a reduction is due at `now` for the given interval.
    ///
    /// A listing that has never been reduced becomes due once its age
    /// reaches the interval.
    pub fn is_due(&self, interval_days: i32, now: DateTime<Utc>) -> bool {
        let interval = Duration::days(interval_days as i64);
        match self.last_price_reduction {
            Some(last) => now - last >= interval,
            None => now - self.created_at >= interval,
        }
    }

    /// The next scheduled reduction time, derived rather than stored
    pub fn next_price_reduction(&self, interval_days: i32) -> DateTime<Utc> {
        let interval = Duration::days(interval_days as i64);
        match self.last_price_reduction {
            Some(last) => last + interval,
            None => self.created_at + interval,
        }
    }

    /// Validate the pricing invariants before enabling monitoring.
    ///
    /// `enable_auto_reduction` requires a positive floor, and the floor
    /// may never exceed the original price.
    pub fn validate_monitoring(&self) -> Result<()> {
        if self.enable_auto_reduction && self.minimum_price <= Price::ZERO {
            return Err(Error::Validation(format!(
                "Listing {} has auto-reduction enabled without a positive minimum price",
                self.id
            )));
        }
        if self.minimum_price > self.original_price {
            return Err(Error::Validation(format!(
                "Listing {} minimum price {} exceeds original price {}",
                self.id, self.minimum_price, self.original_price
            )));
        }
        Ok(())
    }
}
