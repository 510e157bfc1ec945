//! Listing synchronizer
//!
//! One-way reconciliation of marketplace truth into local records:
//! unknown remote listings are imported, known ones get their
//! marketplace-sourced fields refreshed, and local records the
//! marketplace no longer reports are soft-closed. User-owned fields
//! (strategy assignment, floor, enable flag) are never touched by a
//! sync.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::Utc;
use common::error::{Error, Result};
use common::model::listing::{Listing, ListingStatus, SyncStatus};
use common::money::Price;
use marketplace_client::{CatalogApi, ListingDraft, MarketplaceApi};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::repository::{ListingRepository, RemoteFields};
use crate::sku::generate_sku;

/// Outcome of one reconciliation run
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct SyncReport {
    /// Remote listings imported as new local records
    pub imported: u64,
    /// Local records whose marketplace-sourced fields changed
    pub updated: u64,
    /// Local records soft-closed because the marketplace dropped them
    pub closed: u64,
    /// Per-record failures, isolated and counted
    pub errors: u64,
}

/// Reconciles marketplace listing state into the local store
pub struct ListingSynchronizer {
    listings: Arc<dyn ListingRepository>,
    marketplace: Arc<dyn MarketplaceApi>,
    catalog: Arc<dyn CatalogApi>,
}

impl ListingSynchronizer {
    /// Create a synchronizer over the given repository and clients
    pub fn new(
        listings: Arc<dyn ListingRepository>,
        marketplace: Arc<dyn MarketplaceApi>,
        catalog: Arc<dyn CatalogApi>,
    ) -> Self {
        Self {
            listings,
            marketplace,
            catalog,
        }
    }

    /// Reconcile the authoritative marketplace listing set for one user.
    ///
    /// Idempotent: a second run with no intervening marketplace change
    /// performs zero creates and zero updates. Per-record failures are
    /// counted, logged, and never abort the run; an auth failure on the
    /// initial pull aborts, since nothing can be fetched without it.
    pub async fn reconcile(&self, user_id: Uuid) -> Result<SyncReport> {
        info!("Reconciling listings for user {}", user_id);
        let mut report = SyncReport::default();
        let now = Utc::now();

        let remote = self.marketplace.active_listings(user_id).await?;
        let remote_by_item: HashMap<&str, _> = remote
            .iter()
            .map(|listing| (listing.item_id.as_str(), listing))
            .collect();

        let local = self.listings.list_for_user(user_id).await?;
        let mut local_by_item: HashMap<String, Listing> = HashMap::new();
        for listing in local {
            if let Some(item_id) = listing.marketplace_item_id.clone() {
                local_by_item.insert(item_id, listing);
            }
        }

        for remote_listing in &remote {
            match local_by_item.get(remote_listing.item_id.as_str()) {
                None => {
                    // Import; monitoring is opt-in, never enabled here
                    let listing = Listing::imported(
                        user_id,
                        remote_listing.item_id.clone(),
                        remote_listing.title.clone(),
                        remote_listing.price,
                        remote_listing.quantity,
                    );
                    match self.listings.insert(listing).await {
                        Ok(_) => report.imported += 1,
                        Err(e) => {
                            error!("Failed to import {}: {}", remote_listing.item_id, e);
                            report.errors += 1;
                        }
                    }
                }
                Some(local_listing) => {
                    let unchanged = local_listing.current_price == remote_listing.price
                        && local_listing.quantity_available == remote_listing.quantity
                        && local_listing.view_count == remote_listing.view_count
                        && local_listing.watch_count == remote_listing.watch_count;
                    if unchanged {
                        continue;
                    }

                    let fields = RemoteFields {
                        price: remote_listing.price,
                        quantity: remote_listing.quantity,
                        view_count: remote_listing.view_count,
                        watch_count: remote_listing.watch_count,
                    };
                    match self
                        .listings
                        .apply_remote_fields(local_listing.id, local_listing.version, fields, now)
                        .await
                    {
                        Ok(_) => report.updated += 1,
                        Err(Error::Conflict(msg)) => {
                            // A reduction commit won the race; its write is
                            // fresher than our snapshot, so leave it be
                            warn!("Skipping remote update for {}: {}", local_listing.id, msg);
                        }
                        Err(e) => {
                            error!("Failed to update {}: {}", local_listing.id, e);
                            report.errors += 1;
                        }
                    }
                }
            }
        }

        // Soft-close whatever the marketplace stopped reporting
        for (item_id, local_listing) in &local_by_item {
            if local_listing.listing_status == ListingStatus::Active
                && !remote_by_item.contains_key(item_id.as_str())
            {
                match self.listings.close(local_listing.id).await {
                    Ok(()) => {
                        debug!("Closed listing {} (item {})", local_listing.id, item_id);
                        report.closed += 1;
                    }
                    Err(e) => {
                        error!("Failed to close {}: {}", local_listing.id, e);
                        report.errors += 1;
                    }
                }
            }
        }

        info!(
            "Reconciled user {}: {} imported, {} updated, {} closed, {} errors",
            user_id, report.imported, report.updated, report.closed, report.errors
        );
        Ok(report)
    }

    /// Create a marketplace listing from catalog data.
    ///
    /// The SKU is derived deterministically from the owner, the catalog
    /// id, and a content fingerprint, so re-submitting the same request
    /// finds the existing record and never produces a duplicate remote
    /// listing.
    pub async fn create_from_catalog(
        &self,
        user_id: Uuid,
        catalog_external_id: &str,
        price: Price,
        quantity: i32,
    ) -> Result<Listing> {
        let product = self
            .catalog
            .lookup(catalog_external_id)
            .await?
            .ok_or_else(|| {
                Error::Validation(format!("Unknown catalog product: {}", catalog_external_id))
            })?;

        let fingerprint = format!("{}|{}", product.title, product.description);
        let sku = generate_sku(user_id, Some(catalog_external_id), &fingerprint);

        if let Some(existing) = self.listings.find_by_sku(user_id, &sku).await? {
            // Idempotent re-submit: push the price through the update
            // path instead of creating a second remote listing
            info!("SKU {} already exists as listing {}", sku, existing.id);
            if existing.current_price != price {
                if let Some(item_id) = existing.marketplace_item_id.as_deref() {
                    self.marketplace.update_price(user_id, item_id, price).await?;
                    let fields = RemoteFields {
                        price,
                        quantity: existing.quantity_available,
                        view_count: existing.view_count,
                        watch_count: existing.watch_count,
                    };
                    return self
                        .listings
                        .apply_remote_fields(existing.id, existing.version, fields, Utc::now())
                        .await;
                }
            }
            return Ok(existing);
        }

        let image_urls = product
            .ranked_images()
            .into_iter()
            .map(|image| image.url)
            .collect();
        let draft = ListingDraft {
            sku: sku.clone(),
            title: product.title.clone(),
            description: product.description.clone(),
            price,
            quantity,
            image_urls,
        };

        let item_id = self.marketplace.create_listing(user_id, &draft).await?;

        let mut listing = Listing::from_catalog(user_id, sku, product.title, price);
        listing.marketplace_item_id = Some(item_id);
        listing.quantity_available = quantity;
        listing.sync_status = SyncStatus::Synced;
        listing.last_synced_at = Some(Utc::now());

        self.listings.insert(listing).await
    }
}
