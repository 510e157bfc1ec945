// File: tests/integration_tests.rs

mod test_helpers;

use chrono::{Duration, Utc};
use rust_decimal_macros::dec;
use uuid::Uuid;

use common::error::Error;
use common::model::credential::ConnectionStatus;
use common::model::strategy::{Strategy, StrategyKind};
use credential_vault::DeveloperKeys;
use listing_sync::repository::{ListingRepository, StrategyRepository, UserSettingsRepository};
use marketplace_client::RemoteListing;
use test_helpers::{build_test_engine, TestHarness};
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

async fn connect_user(h: &TestHarness, user: Uuid) {
    h.engine
        .store_developer_keys(
            user,
            DeveloperKeys {
                app_id: "app-123".to_string(),
                client_secret: "shhh".to_string(),
                dev_id: None,
            },
        )
        .await
        .unwrap();
    let request = h.engine.connect_marketplace(user).await.unwrap();
    h.engine
        .handle_oauth_callback("auth-code", &request.state)
        .await
        .unwrap();
}

#[test]
fn oauth_flow_connects_a_user() {
    run_async(|| {
        Box::pin(async move {
            let h = build_test_engine();
            let user = Uuid::new_v4();
            h.engine
                .store_developer_keys(
                    user,
                    DeveloperKeys {
                        app_id: "app-123".to_string(),
                        client_secret: "shhh".to_string(),
                        dev_id: Some("dev-1".to_string()),
                    },
                )
                .await
                .unwrap();

            let request = h.engine.connect_marketplace(user).await.unwrap();
            assert!(request.url.contains("code_challenge="));
            assert!(request.url.contains("code_challenge_method=S256"));
            assert!(request.url.contains("state="));
            // The URL never carries the verifier or the client secret
            assert!(!request.url.contains("shhh"));

            let connected = h
                .engine
                .handle_oauth_callback("auth-code", &request.state)
                .await
                .unwrap();
            assert_eq!(connected, user);

            let info = h.engine.connection_status(user).await.unwrap().unwrap();
            assert_eq!(info.status, ConnectionStatus::Connected);
            assert_eq!(info.marketplace_username.as_deref(), Some("test-seller"));
        })
    });
}

#[test]
fn oauth_state_is_single_use() {
    run_async(|| {
        Box::pin(async move {
            let h = build_test_engine();
            let user = Uuid::new_v4();
            h.engine
                .store_developer_keys(
                    user,
                    DeveloperKeys {
                        app_id: "app-123".to_string(),
                        client_secret: "shhh".to_string(),
                        dev_id: None,
                    },
                )
                .await
                .unwrap();

            let request = h.engine.connect_marketplace(user).await.unwrap();
            h.engine
                .handle_oauth_callback("auth-code", &request.state)
                .await
                .unwrap();

            // Replaying the consumed state must fail
            let replay = h.engine.handle_oauth_callback("auth-code", &request.state).await;
            assert!(matches!(replay, Err(Error::Auth(_))));

            // As must a state that was never issued
            let forged = h.engine.handle_oauth_callback("auth-code", "forged-state").await;
            assert!(matches!(forged, Err(Error::Auth(_))));
        })
    });
}

#[test]
fn expiring_token_is_refreshed_silently() {
    run_async(|| {
        Box::pin(async move {
            let h = build_test_engine();
            let user = Uuid::new_v4();
            // Tokens expire well inside the refresh safety margin
            h.auth_server.set_expires_in_secs(60);
            connect_user(&h, user).await;

            let refreshes_before = h.auth_server.refresh_calls();
            let token = h.tokens.access_token(user).await.unwrap();
            assert!(!token.is_empty());
            assert!(h.auth_server.refresh_calls() > refreshes_before);

            // The operation completed without surfacing any error and
            // the connection stays live
            let info = h.engine.connection_status(user).await.unwrap().unwrap();
            assert_eq!(info.status, ConnectionStatus::Connected);
        })
    });
}

#[test]
fn revoked_refresh_token_expires_the_connection() {
    run_async(|| {
        Box::pin(async move {
            let h = build_test_engine();
            let user = Uuid::new_v4();
            h.auth_server.set_expires_in_secs(60);
            connect_user(&h, user).await;
            h.auth_server.revoke_refresh_tokens();

            let result = h.tokens.access_token(user).await;
            assert!(matches!(result, Err(Error::Auth(_))));

            let info = h.engine.connection_status(user).await.unwrap().unwrap();
            assert_eq!(info.status, ConnectionStatus::Expired);

            // Subsequent attempts fail as auth, not transient: the
            // token endpoint is not called again
            let refreshes = h.auth_server.refresh_calls();
            let again = h.tokens.access_token(user).await;
            assert!(matches!(again, Err(Error::Auth(_))));
            assert_eq!(h.auth_server.refresh_calls(), refreshes);
        })
    });
}

#[test]
fn vault_projection_carries_no_secrets() {
    run_async(|| {
        Box::pin(async move {
            let h = build_test_engine();
            let user = Uuid::new_v4();
            connect_user(&h, user).await;

            // Everything above the token manager sees only the
            // status projection
            let info = h.vault.connection_info(user).await.unwrap().unwrap();
            assert_eq!(info.status, ConnectionStatus::Connected);
            assert_eq!(info.marketplace_username.as_deref(), Some("test-seller"));
            assert!(info.access_token_expires_at.is_some());
        })
    });
}

#[test]
fn vacation_mode_is_durable_per_user_state() {
    run_async(|| {
        Box::pin(async move {
            let h = build_test_engine();
            let user = Uuid::new_v4();

            let settings = h.engine.set_vacation_mode(user, true).await.unwrap();
            assert!(settings.vacation_mode);

            // The flag is stored, not process state
            let stored = h.settings.get_or_default(user).await.unwrap();
            assert!(stored.vacation_mode);

            let resumed = h.engine.set_vacation_mode(user, false).await.unwrap();
            assert!(!resumed.vacation_mode);
        })
    });
}

#[test]
fn catalog_creation_through_the_facade() {
    run_async(|| {
        Box::pin(async move {
            let h = build_test_engine();
            let user = Uuid::new_v4();
            h.catalog.seed_product(marketplace_client::CatalogProduct {
                external_id: "CAT-7".to_string(),
                title: "Ceramic vase".to_string(),
                description: "Hand thrown".to_string(),
                images: vec![],
                attributes: vec![],
            });

            let listing = h
                .engine
                .synchronizer()
                .create_from_catalog(user, "CAT-7", dec!(45.00), 1)
                .await
                .unwrap();

            assert!(listing.sku.as_deref().unwrap().starts_with("RP1-"));
            assert!(listing.marketplace_item_id.is_some());
            assert_eq!(listing.current_price, dec!(45.00));
        })
    });
}

#[test]
fn disconnect_keeps_developer_keys() {
    run_async(|| {
        Box::pin(async move {
            let h = build_test_engine();
            let user = Uuid::new_v4();
            connect_user(&h, user).await;

            h.engine.disconnect_marketplace(user).await.unwrap();
            let info = h.engine.connection_status(user).await.unwrap().unwrap();
            assert_eq!(info.status, ConnectionStatus::Disconnected);

            // Reconnecting needs no re-entered keys
            let request = h.engine.connect_marketplace(user).await.unwrap();
            assert!(request.url.contains("client_id=app-123"));
        })
    });
}

#[test]
fn import_enable_reduce_history_end_to_end() {
    run_async(|| {
        Box::pin(async move {
            let h = build_test_engine();
            let user = Uuid::new_v4();
            h.marketplace.seed_listing(
                user,
                RemoteListing {
                    item_id: "M-1".to_string(),
                    title: "Vintage lamp".to_string(),
                    price: dec!(100.00),
                    quantity: 1,
                    view_count: 12,
                    watch_count: 3,
                },
            );

            // Import
            let report = h.engine.trigger_reconciliation(user).await.unwrap().unwrap();
            assert_eq!(report.imported, 1);

            // A second trigger inside the freshness window is suppressed
            assert!(h.engine.trigger_reconciliation(user).await.unwrap().is_none());

            // The user opts in with a floor and a strategy
            let strategy = h
                .engine
                .create_strategy(Strategy::new(
                    user,
                    "weekly 15%".to_string(),
                    StrategyKind::FixedPercentage,
                    dec!(15),
                    7,
                ))
                .await
                .unwrap();

            let mut listing = h
                .listings
                .find_by_marketplace_item(user, "M-1")
                .await
                .unwrap()
                .unwrap();
            listing.minimum_price = dec!(90.00);
            listing.strategy_id = Some(strategy.id);
            listing.enable_auto_reduction = true;
            listing.created_at = Utc::now() - Duration::days(8);
            listing.validate_monitoring().unwrap();
            h.listings.update(listing.clone()).await.unwrap();

            // One cycle reduces and records history
            let cycle = h.engine.trigger_reduction_cycle().await.unwrap();
            assert_eq!(cycle.reduced, 1);

            let after = h.listings.get(listing.id).await.unwrap().unwrap();
            assert_eq!(after.current_price, dec!(90.00));
            // The pricing invariant holds after any reduction
            assert!(after.minimum_price <= after.current_price);
            assert!(after.current_price <= after.original_price);

            let history = h.engine.price_history(listing.id).await.unwrap();
            assert_eq!(history.len(), 1);
            assert_eq!(history[0].old_price, dec!(100.00));
            assert_eq!(history[0].new_price, dec!(90.00));

            // The strategy is now referenced and cannot be deleted
            let delete = h.engine.delete_strategy(strategy.id).await;
            assert!(matches!(delete, Err(Error::StrategyInUse(_))));
        })
    });
}

#[test]
fn strategy_preview_commits_nothing() {
    run_async(|| {
        Box::pin(async move {
            let h = build_test_engine();
            let user = Uuid::new_v4();
            h.marketplace.seed_listing(
                user,
                RemoteListing {
                    item_id: "M-1".to_string(),
                    title: "Vintage lamp".to_string(),
                    price: dec!(100.00),
                    quantity: 1,
                    view_count: 0,
                    watch_count: 0,
                },
            );
            let _ = h.engine.trigger_reconciliation(user).await.unwrap();

            let strategy = h
                .engine
                .create_strategy(Strategy::new(
                    user,
                    "preview".to_string(),
                    StrategyKind::FixedPercentage,
                    dec!(20),
                    7,
                ))
                .await
                .unwrap();
            let listing = h
                .listings
                .find_by_marketplace_item(user, "M-1")
                .await
                .unwrap()
                .unwrap();

            let preview = h
                .engine
                .compute_strategy_preview(listing.id, strategy.id)
                .await
                .unwrap();
            assert!(preview.applied);
            assert_eq!(preview.new_price, dec!(80.00));

            // Nothing moved: no event, no price change
            let unchanged = h.listings.get(listing.id).await.unwrap().unwrap();
            assert_eq!(unchanged.current_price, dec!(100.00));
            assert!(h.engine.price_history(listing.id).await.unwrap().is_empty());
        })
    });
}

#[test]
fn monitoring_requires_a_positive_floor() {
    run_async(|| {
        Box::pin(async move {
            let h = build_test_engine();
            let user = Uuid::new_v4();
            h.marketplace.seed_listing(
                user,
                RemoteListing {
                    item_id: "M-1".to_string(),
                    title: "Vintage lamp".to_string(),
                    price: dec!(100.00),
                    quantity: 1,
                    view_count: 0,
                    watch_count: 0,
                },
            );
            let _ = h.engine.trigger_reconciliation(user).await.unwrap();

            let strategy = h
                .engine
                .create_strategy(Strategy::new(
                    user,
                    "weekly".to_string(),
                    StrategyKind::FixedPercentage,
                    dec!(10),
                    7,
                ))
                .await
                .unwrap();
            let listing = h
                .listings
                .find_by_marketplace_item(user, "M-1")
                .await
                .unwrap()
                .unwrap();

            // Enabling without a floor is rejected before persisting
            let no_floor = h
                .engine
                .configure_monitoring(listing.id, dec!(0), Some(strategy.id), true)
                .await;
            assert!(matches!(no_floor, Err(Error::Validation(_))));

            // And without a strategy
            let no_strategy = h
                .engine
                .configure_monitoring(listing.id, dec!(80), None, true)
                .await;
            assert!(matches!(no_strategy, Err(Error::Validation(_))));

            h.engine
                .configure_monitoring(listing.id, dec!(80), Some(strategy.id), true)
                .await
                .unwrap();
            let configured = h.listings.get(listing.id).await.unwrap().unwrap();
            assert!(configured.enable_auto_reduction);
            assert_eq!(configured.minimum_price, dec!(80));
        })
    });
}

#[test]
fn rejected_strategy_configuration_never_persists() {
    run_async(|| {
        Box::pin(async move {
            let h = build_test_engine();
            let user = Uuid::new_v4();

            let too_steep = Strategy::new(
                user,
                "too steep".to_string(),
                StrategyKind::FixedPercentage,
                dec!(75),
                7,
            );
            let result = h.engine.create_strategy(too_steep).await;
            assert!(matches!(result, Err(Error::Validation(_))));

            assert!(h.strategies.list_for_user(user).await.unwrap().is_empty());
        })
    });
}
