use std::sync::Arc;

use rust_decimal_macros::dec;
use uuid::Uuid;

use common::model::listing::{ListingStatus, SyncStatus};
use listing_sync::repository::{InMemoryListingRepository, ListingRepository};
use listing_sync::service::{ListingSynchronizer, SyncReport};
use marketplace_client::{
    CatalogImage, CatalogProduct, InMemoryCatalog, InMemoryMarketplace, RemoteListing,
};
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

fn remote_listing(item_id: &str, price: rust_decimal::Decimal, quantity: i32) -> RemoteListing {
    RemoteListing {
        item_id: item_id.to_string(),
        title: format!("Item {}", item_id),
        price,
        quantity,
        view_count: 0,
        watch_count: 0,
    }
}

fn synchronizer() -> (
    Arc<InMemoryListingRepository>,
    Arc<InMemoryMarketplace>,
    Arc<InMemoryCatalog>,
    ListingSynchronizer,
) {
    let listings = Arc::new(InMemoryListingRepository::new());
    let marketplace = Arc::new(InMemoryMarketplace::new());
    let catalog = Arc::new(InMemoryCatalog::new());
    let sync = ListingSynchronizer::new(listings.clone(), marketplace.clone(), catalog.clone());
    (listings, marketplace, catalog, sync)
}

#[test]
fn imports_unknown_remote_listings() {
    run_async(|| {
        Box::pin(async move {
            let (listings, marketplace, _catalog, sync) = synchronizer();
            let user = Uuid::new_v4();
            marketplace.seed_listing(user, remote_listing("M-1", dec!(25.00), 3));
            marketplace.seed_listing(user, remote_listing("M-2", dec!(10.00), 1));

            let report = sync.reconcile(user).await.unwrap();

            assert_eq!(report.imported, 2);
            assert_eq!(report.updated, 0);
            assert_eq!(report.closed, 0);

            let imported = listings
                .find_by_marketplace_item(user, "M-1")
                .await
                .unwrap()
                .unwrap();
            // Monitoring is opt-in; imports never enable it
            assert!(!imported.enable_auto_reduction);
            assert!(imported.strategy_id.is_none());
            assert_eq!(imported.current_price, dec!(25.00));
            assert_eq!(imported.sync_status, SyncStatus::Synced);
        })
    });
}

#[test]
fn second_reconcile_is_a_noop() {
    run_async(|| {
        Box::pin(async move {
            let (_listings, marketplace, _catalog, sync) = synchronizer();
            let user = Uuid::new_v4();
            marketplace.seed_listing(user, remote_listing("M-1", dec!(25.00), 3));

            let first = sync.reconcile(user).await.unwrap();
            assert_eq!(first.imported, 1);

            let second = sync.reconcile(user).await.unwrap();
            assert_eq!(second, SyncReport::default());
        })
    });
}

#[test]
fn updates_marketplace_fields_without_touching_user_intent() {
    run_async(|| {
        Box::pin(async move {
            let (listings, marketplace, _catalog, sync) = synchronizer();
            let user = Uuid::new_v4();
            marketplace.seed_listing(user, remote_listing("M-1", dec!(25.00), 3));
            sync.reconcile(user).await.unwrap();

            // The user configures monitoring locally
            let mut listing = listings
                .find_by_marketplace_item(user, "M-1")
                .await
                .unwrap()
                .unwrap();
            listing.minimum_price = dec!(15.00);
            listing.enable_auto_reduction = true;
            listing.strategy_id = Some(Uuid::new_v4());
            listings.update(listing).await.unwrap();

            // The marketplace price moves
            marketplace.seed_listing(user, remote_listing("M-1", dec!(22.50), 2));
            let report = sync.reconcile(user).await.unwrap();
            assert_eq!(report.updated, 1);

            let after = listings
                .find_by_marketplace_item(user, "M-1")
                .await
                .unwrap()
                .unwrap();
            assert_eq!(after.current_price, dec!(22.50));
            assert_eq!(after.quantity_available, 2);
            // User-owned fields survive the sync untouched
            assert_eq!(after.minimum_price, dec!(15.00));
            assert!(after.enable_auto_reduction);
            assert!(after.strategy_id.is_some());
        })
    });
}

#[test]
fn vanished_listing_is_soft_closed_with_history_intact() {
    run_async(|| {
        Box::pin(async move {
            let (listings, marketplace, _catalog, sync) = synchronizer();
            let user = Uuid::new_v4();
            marketplace.seed_listing(user, remote_listing("M-1", dec!(25.00), 3));
            sync.reconcile(user).await.unwrap();

            let listing = listings
                .find_by_marketplace_item(user, "M-1")
                .await
                .unwrap()
                .unwrap();
            listings
                .append_event(common::model::event::PriceReductionEvent::record(
                    listing.id,
                    dec!(25.00),
                    dec!(22.00),
                    None,
                    common::model::event::ReductionTrigger::Manual,
                ))
                .await
                .unwrap();

            marketplace.remove_listing(user, "M-1");
            let report = sync.reconcile(user).await.unwrap();
            assert_eq!(report.closed, 1);

            let closed = listings.get(listing.id).await.unwrap().unwrap();
            assert_eq!(closed.listing_status, ListingStatus::Ended);

            // Soft close: the price history stays queryable
            let history = listings.events_for(listing.id).await.unwrap();
            assert_eq!(history.len(), 1);
        })
    });
}

#[test]
fn catalog_creation_is_idempotent() {
    run_async(|| {
        Box::pin(async move {
            let (listings, _marketplace, catalog, sync) = synchronizer();
            let user = Uuid::new_v4();
            catalog.seed_product(CatalogProduct {
                external_id: "CAT-42".to_string(),
                title: "Widget".to_string(),
                description: "A fine widget".to_string(),
                images: vec![
                    CatalogImage {
                        url: "https://img.example/small.jpg".to_string(),
                        width: 100,
                        height: 100,
                    },
                    CatalogImage {
                        url: "https://img.example/large.jpg".to_string(),
                        width: 1600,
                        height: 1200,
                    },
                ],
                attributes: vec![],
            });

            let first = sync
                .create_from_catalog(user, "CAT-42", dec!(30.00), 2)
                .await
                .unwrap();
            assert!(first.marketplace_item_id.is_some());
            assert!(first.sku.is_some());

            // Re-submitting the identical request finds the same record
            let second = sync
                .create_from_catalog(user, "CAT-42", dec!(30.00), 2)
                .await
                .unwrap();
            assert_eq!(second.id, first.id);

            let all = listings.list_for_user(user).await.unwrap();
            assert_eq!(all.len(), 1);
        })
    });
}
