//! PostgreSQL repositories

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use common::db::{PgTransactionManager, TransactionManager};
use common::error::{Error, Result};
use common::model::event::{PriceReductionEvent, ReductionTrigger};
use common::model::listing::{Listing, ListingStatus, SyncStatus};
use common::model::settings::UserSettings;
use common::model::strategy::{Strategy, StrategyKind};
use common::money::Price;
use rust_decimal::Decimal;
use sqlx::{postgres::PgPoolOptions, PgPool, Row};
use tracing::{debug, info};
use uuid::Uuid;

use super::{ListingRepository, RemoteFields, StrategyRepository, UserSettingsRepository};

/// Parse a money column stored as text
fn parse_price(value: String, column: &str) -> Result<Decimal> {
    value
        .parse::<Decimal>()
        .map_err(|e| Error::Internal(format!("Invalid {} format: {}", column, e)))
}

fn row_to_listing(row: &sqlx::postgres::PgRow) -> Result<Listing> {
    let status: String = row.get("listing_status");
    let sync_status: String = row.get("sync_status");
    Ok(Listing {
        id: row.get("id"),
        user_id: row.get("user_id"),
        marketplace_item_id: row.get("marketplace_item_id"),
        sku: row.get("sku"),
        title: row.get("title"),
        current_price: parse_price(row.get("current_price"), "current_price")?,
        original_price: parse_price(row.get("original_price"), "original_price")?,
        minimum_price: parse_price(row.get("minimum_price"), "minimum_price")?,
        strategy_id: row.get("strategy_id"),
        enable_auto_reduction: row.get("enable_auto_reduction"),
        listing_status: ListingStatus::parse(&status)?,
        quantity_available: row.get("quantity_available"),
        view_count: row.get("view_count"),
        watch_count: row.get("watch_count"),
        market_average_price: row
            .get::<Option<String>, _>("market_average_price")
            .map(|v| parse_price(v, "market_average_price"))
            .transpose()?,
        market_lowest_price: row
            .get::<Option<String>, _>("market_lowest_price")
            .map(|v| parse_price(v, "market_lowest_price"))
            .transpose()?,
        market_competitor_count: row.get("market_competitor_count"),
        last_synced_at: row.get("last_synced_at"),
        sync_status: SyncStatus::parse(&sync_status)?,
        last_price_reduction: row.get("last_price_reduction"),
        version: row.get("version"),
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
    })
}

const LISTING_COLUMNS: &str = "id, user_id, marketplace_item_id, sku, title, current_price, \
     original_price, minimum_price, strategy_id, enable_auto_reduction, listing_status, \
     quantity_available, view_count, watch_count, market_average_price, market_lowest_price, \
     market_competitor_count, last_synced_at, sync_status, last_price_reduction, version, \
     created_at, updated_at";

/// PostgreSQL repository for listings and price history
pub struct PostgresListingRepository {
    pool: PgPool,
    transaction_manager: PgTransactionManager,
}

impl PostgresListingRepository {
    /// Create a new PostgreSQL listing repository
    pub async fn new(database_url: Option<String>) -> Result<Self> {
        let url = match database_url {
            Some(url) => url,
            None => std::env::var("DATABASE_URL")
                .map_err(|_| Error::Configuration("DATABASE_URL must be set".to_string()))?,
        };

        let pool = PgPoolOptions::new()
            .max_connections(5)
            .connect(&url)
            .await
            .map_err(Error::Database)?;

        info!("Listing repository connected to PostgreSQL");
        Ok(Self {
            transaction_manager: PgTransactionManager::new(pool.clone()),
            pool,
        })
    }

    /// Create a repository over an existing pool
    pub fn with_pool(pool: PgPool) -> Self {
        Self {
            transaction_manager: PgTransactionManager::new(pool.clone()),
            pool,
        }
    }
}

#[async_trait]
impl ListingRepository for PostgresListingRepository {
    fn transaction_manager(&self) -> &dyn TransactionManager {
        &self.transaction_manager
    }

    async fn insert(&self, listing: Listing) -> Result<Listing> {
        debug!("Inserting listing {} for user {}", listing.id, listing.user_id);

        sqlx::query(
            "INSERT INTO listings (id, user_id, marketplace_item_id, sku, title, current_price,
                original_price, minimum_price, strategy_id, enable_auto_reduction, listing_status,
                quantity_available, view_count, watch_count, market_average_price,
                market_lowest_price, market_competitor_count, last_synced_at, sync_status,
                last_price_reduction, version, created_at, updated_at)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17,
                $18, $19, $20, $21, $22, $23)",
        )
        .bind(listing.id)
        .bind(listing.user_id)
        .bind(&listing.marketplace_item_id)
        .bind(&listing.sku)
        .bind(&listing.title)
        .bind(listing.current_price.to_string())
        .bind(listing.original_price.to_string())
        .bind(listing.minimum_price.to_string())
        .bind(listing.strategy_id)
        .bind(listing.enable_auto_reduction)
        .bind(listing.listing_status.as_str())
        .bind(listing.quantity_available)
        .bind(listing.view_count)
        .bind(listing.watch_count)
        .bind(listing.market_average_price.map(|p| p.to_string()))
        .bind(listing.market_lowest_price.map(|p| p.to_string()))
        .bind(listing.market_competitor_count)
        .bind(listing.last_synced_at)
        .bind(listing.sync_status.as_str())
        .bind(listing.last_price_reduction)
        .bind(listing.version)
        .bind(listing.created_at)
        .bind(listing.updated_at)
        .execute(&self.pool)
        .await?;

        Ok(listing)
    }

    async fn get(&self, id: Uuid) -> Result<Option<Listing>> {
        let row = sqlx::query(&format!(
            "SELECT {} FROM listings WHERE id = $1",
            LISTING_COLUMNS
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(|r| row_to_listing(&r)).transpose()
    }

    async fn find_by_marketplace_item(
        &self,
        user_id: Uuid,
        item_id: &str,
    ) -> Result<Option<Listing>> {
        let row = sqlx::query(&format!(
            "SELECT {} FROM listings WHERE user_id = $1 AND marketplace_item_id = $2",
            LISTING_COLUMNS
        ))
        .bind(user_id)
        .bind(item_id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(|r| row_to_listing(&r)).transpose()
    }

    async fn find_by_sku(&self, user_id: Uuid, sku: &str) -> Result<Option<Listing>> {
        let row = sqlx::query(&format!(
            "SELECT {} FROM listings WHERE user_id = $1 AND sku = $2",
            LISTING_COLUMNS
        ))
        .bind(user_id)
        .bind(sku)
        .fetch_optional(&self.pool)
        .await?;

        row.map(|r| row_to_listing(&r)).transpose()
    }

    async fn list_for_user(&self, user_id: Uuid) -> Result<Vec<Listing>> {
        let rows = sqlx::query(&format!(
            "SELECT {} FROM listings WHERE user_id = $1",
            LISTING_COLUMNS
        ))
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(row_to_listing).collect()
    }

    async fn monitored_active(&self) -> Result<Vec<Listing>> {
        let rows = sqlx::query(&format!(
            "SELECT {} FROM listings
             WHERE enable_auto_reduction = TRUE
               AND listing_status = 'active'
               AND strategy_id IS NOT NULL",
            LISTING_COLUMNS
        ))
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(row_to_listing).collect()
    }

    async fn count_for_strategy(&self, strategy_id: Uuid) -> Result<u64> {
        let row = sqlx::query("SELECT COUNT(*) AS n FROM listings WHERE strategy_id = $1")
            .bind(strategy_id)
            .fetch_one(&self.pool)
            .await?;
        let count: i64 = row.get("n");
        Ok(count as u64)
    }

    async fn update(&self, mut listing: Listing) -> Result<Listing> {
        debug!("Updating listing {}", listing.id);
        listing.updated_at = Utc::now();

        let result = sqlx::query(
            "UPDATE listings SET
                title = $2, current_price = $3, original_price = $4, minimum_price = $5,
                strategy_id = $6, enable_auto_reduction = $7, quantity_available = $8,
                market_average_price = $9, market_lowest_price = $10,
                market_competitor_count = $11, version = version + 1, updated_at = $12
             WHERE id = $1",
        )
        .bind(listing.id)
        .bind(&listing.title)
        .bind(listing.current_price.to_string())
        .bind(listing.original_price.to_string())
        .bind(listing.minimum_price.to_string())
        .bind(listing.strategy_id)
        .bind(listing.enable_auto_reduction)
        .bind(listing.quantity_available)
        .bind(listing.market_average_price.map(|p| p.to_string()))
        .bind(listing.market_lowest_price.map(|p| p.to_string()))
        .bind(listing.market_competitor_count)
        .bind(listing.updated_at)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(Error::ListingNotFound(format!(
                "Listing not found: {}",
                listing.id
            )));
        }

        listing.version += 1;
        Ok(listing)
    }

    async fn apply_remote_fields(
        &self,
        id: Uuid,
        expected_version: i64,
        fields: RemoteFields,
        now: DateTime<Utc>,
    ) -> Result<Listing> {
        let result = sqlx::query(
            "UPDATE listings SET
                current_price = $3, quantity_available = $4, view_count = $5, watch_count = $6,
                last_synced_at = $7, sync_status = 'synced', version = version + 1,
                updated_at = $7
             WHERE id = $1 AND version = $2",
        )
        .bind(id)
        .bind(expected_version)
        .bind(fields.price.to_string())
        .bind(fields.quantity)
        .bind(fields.view_count)
        .bind(fields.watch_count)
        .bind(now)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return match self.get(id).await? {
                Some(current) => Err(Error::Conflict(format!(
                    "Listing {} moved from version {} to {}",
                    id, expected_version, current.version
                ))),
                None => Err(Error::ListingNotFound(format!("Listing not found: {}", id))),
            };
        }

        self.get(id)
            .await?
            .ok_or_else(|| Error::ListingNotFound(format!("Listing not found: {}", id)))
    }

    async fn commit_reduction(
        &self,
        id: Uuid,
        expected_version: i64,
        new_price: Price,
        event: PriceReductionEvent,
        now: DateTime<Utc>,
    ) -> Result<Listing> {
        debug!("Committing reduction of listing {} to {}", id, new_price);

        // The price write and the history row land in one transaction;
        // a version mismatch rolls both back.
        let mut tx = self.transaction_manager.begin_transaction().await?;

        let affected = tx
            .execute(
                sqlx::query(
                    "UPDATE listings SET
                        current_price = $3, last_price_reduction = $4, sync_status = 'synced',
                        version = version + 1, updated_at = $4
                     WHERE id = $1 AND version = $2",
                )
                .bind(id)
                .bind(expected_version)
                .bind(new_price.to_string())
                .bind(now),
            )
            .await?;

        if affected == 0 {
            tx.rollback().await?;
            return match self.get(id).await? {
                Some(current) => Err(Error::Conflict(format!(
                    "Listing {} moved from version {} to {}",
                    id, expected_version, current.version
                ))),
                None => Err(Error::ListingNotFound(format!("Listing not found: {}", id))),
            };
        }

        tx.execute(
            sqlx::query(
                "INSERT INTO price_reduction_events
                    (id, listing_id, old_price, new_price, strategy_id, triggered_by, created_at)
                 VALUES ($1, $2, $3, $4, $5, $6, $7)",
            )
            .bind(event.id)
            .bind(event.listing_id)
            .bind(event.old_price.to_string())
            .bind(event.new_price.to_string())
            .bind(event.strategy_id)
            .bind(event.trigger.as_str())
            .bind(event.created_at),
        )
        .await?;

        tx.commit().await?;

        self.get(id)
            .await?
            .ok_or_else(|| Error::ListingNotFound(format!("Listing not found: {}", id)))
    }

    async fn close(&self, id: Uuid) -> Result<()> {
        let result = sqlx::query(
            "UPDATE listings SET listing_status = 'ended', version = version + 1, updated_at = $2
             WHERE id = $1",
        )
        .bind(id)
        .bind(Utc::now())
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(Error::ListingNotFound(format!("Listing not found: {}", id)));
        }
        Ok(())
    }

    async fn mark_sync_status(&self, id: Uuid, status: SyncStatus) -> Result<()> {
        let result = sqlx::query(
            "UPDATE listings SET sync_status = $2, updated_at = $3 WHERE id = $1",
        )
        .bind(id)
        .bind(status.as_str())
        .bind(Utc::now())
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(Error::ListingNotFound(format!("Listing not found: {}", id)));
        }
        Ok(())
    }

    async fn append_event(&self, event: PriceReductionEvent) -> Result<()> {
        sqlx::query(
            "INSERT INTO price_reduction_events
                (id, listing_id, old_price, new_price, strategy_id, triggered_by, created_at)
             VALUES ($1, $2, $3, $4, $5, $6, $7)",
        )
        .bind(event.id)
        .bind(event.listing_id)
        .bind(event.old_price.to_string())
        .bind(event.new_price.to_string())
        .bind(event.strategy_id)
        .bind(event.trigger.as_str())
        .bind(event.created_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn events_for(&self, listing_id: Uuid) -> Result<Vec<PriceReductionEvent>> {
        let rows = sqlx::query(
            "SELECT id, listing_id, old_price, new_price, strategy_id, triggered_by, created_at
             FROM price_reduction_events
             WHERE listing_id = $1
             ORDER BY created_at ASC",
        )
        .bind(listing_id)
        .fetch_all(&self.pool)
        .await?;

        let mut events = Vec::with_capacity(rows.len());
        for row in rows {
            let trigger: String = row.get("triggered_by");
            events.push(PriceReductionEvent {
                id: row.get("id"),
                listing_id: row.get("listing_id"),
                old_price: parse_price(row.get("old_price"), "old_price")?,
                new_price: parse_price(row.get("new_price"), "new_price")?,
                strategy_id: row.get("strategy_id"),
                trigger: ReductionTrigger::parse(&trigger)?,
                created_at: row.get("created_at"),
            });
        }
        Ok(events)
    }
}

/// PostgreSQL repository for strategies
pub struct PostgresStrategyRepository {
    pool: PgPool,
}

impl PostgresStrategyRepository {
    /// Create a repository over an existing pool
    pub fn with_pool(pool: PgPool) -> Self {
        Self { pool }
    }

    fn row_to_strategy(row: &sqlx::postgres::PgRow) -> Result<Strategy> {
        let kind: String = row.get("kind");
        Ok(Strategy {
            id: row.get("id"),
            user_id: row.get("user_id"),
            name: row.get("name"),
            kind: StrategyKind::parse(&kind)?,
            magnitude: parse_price(row.get("magnitude"), "magnitude")?,
            interval_days: row.get("interval_days"),
            active: row.get("active"),
            created_at: row.get("created_at"),
            updated_at: row.get("updated_at"),
        })
    }
}

#[async_trait]
impl StrategyRepository for PostgresStrategyRepository {
    async fn insert(&self, strategy: Strategy) -> Result<Strategy> {
        debug!("Inserting strategy {} for user {}", strategy.id, strategy.user_id);

        sqlx::query(
            "INSERT INTO strategies
                (id, user_id, name, kind, magnitude, interval_days, active, created_at, updated_at)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)",
        )
        .bind(strategy.id)
        .bind(strategy.user_id)
        .bind(&strategy.name)
        .bind(strategy.kind.as_str())
        .bind(strategy.magnitude.to_string())
        .bind(strategy.interval_days)
        .bind(strategy.active)
        .bind(strategy.created_at)
        .bind(strategy.updated_at)
        .execute(&self.pool)
        .await?;

        Ok(strategy)
    }

    async fn get(&self, id: Uuid) -> Result<Option<Strategy>> {
        let row = sqlx::query(
            "SELECT id, user_id, name, kind, magnitude, interval_days, active, created_at,
                    updated_at
             FROM strategies WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(|r| Self::row_to_strategy(&r)).transpose()
    }

    async fn list_for_user(&self, user_id: Uuid) -> Result<Vec<Strategy>> {
        let rows = sqlx::query(
            "SELECT id, user_id, name, kind, magnitude, interval_days, active, created_at,
                    updated_at
             FROM strategies WHERE user_id = $1",
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(Self::row_to_strategy).collect()
    }

    async fn update(&self, mut strategy: Strategy) -> Result<Strategy> {
        strategy.updated_at = Utc::now();

        let result = sqlx::query(
            "UPDATE strategies SET
                name = $2, kind = $3, magnitude = $4, interval_days = $5, active = $6,
                updated_at = $7
             WHERE id = $1",
        )
        .bind(strategy.id)
        .bind(&strategy.name)
        .bind(strategy.kind.as_str())
        .bind(strategy.magnitude.to_string())
        .bind(strategy.interval_days)
        .bind(strategy.active)
        .bind(strategy.updated_at)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(Error::StrategyNotFound(format!(
                "Strategy not found: {}",
                strategy.id
            )));
        }
        Ok(strategy)
    }

    async fn delete(&self, id: Uuid) -> Result<()> {
        let result = sqlx::query("DELETE FROM strategies WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(Error::StrategyNotFound(format!("Strategy not found: {}", id)));
        }
        Ok(())
    }
}

/// PostgreSQL repository for user settings
pub struct PostgresUserSettingsRepository {
    pool: PgPool,
}

impl PostgresUserSettingsRepository {
    /// Create a repository over an existing pool
    pub fn with_pool(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl UserSettingsRepository for PostgresUserSettingsRepository {
    async fn get_or_default(&self, user_id: Uuid) -> Result<UserSettings> {
        let row = sqlx::query(
            "SELECT user_id, vacation_mode, last_reconciled_at, created_at, updated_at
             FROM user_settings WHERE user_id = $1",
        )
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some(row) => Ok(UserSettings {
                user_id: row.get("user_id"),
                vacation_mode: row.get("vacation_mode"),
                last_reconciled_at: row.get("last_reconciled_at"),
                created_at: row.get("created_at"),
                updated_at: row.get("updated_at"),
            }),
            None => Ok(UserSettings::new(user_id)),
        }
    }

    async fn set_vacation(&self, user_id: Uuid, vacation: bool) -> Result<UserSettings> {
        debug!("Setting vacation mode {} for user {}", vacation, user_id);
        let now = Utc::now();

        sqlx::query(
            "INSERT INTO user_settings (user_id, vacation_mode, created_at, updated_at)
             VALUES ($1, $2, $3, $3)
             ON CONFLICT (user_id)
             DO UPDATE SET vacation_mode = $2, updated_at = $3",
        )
        .bind(user_id)
        .bind(vacation)
        .bind(now)
        .execute(&self.pool)
        .await?;

        self.get_or_default(user_id).await
    }

    async fn mark_reconciled(&self, user_id: Uuid, at: DateTime<Utc>) -> Result<()> {
        sqlx::query(
            "INSERT INTO user_settings (user_id, last_reconciled_at, created_at, updated_at)
             VALUES ($1, $2, $3, $3)
             ON CONFLICT (user_id)
             DO UPDATE SET last_reconciled_at = $2, updated_at = $3",
        )
        .bind(user_id)
        .bind(at)
        .bind(Utc::now())
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}
