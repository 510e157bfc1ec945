//! Shared helpers for the integration tests

use std::sync::Arc;

use credential_vault::{CredentialVault, VaultConfig};
use listing_sync::repository::{
    InMemoryListingRepository, InMemoryStrategyRepository, InMemoryUserSettingsRepository,
};
use listing_sync::ListingSynchronizer;
use marketplace_client::{InMemoryAuthServer, InMemoryCatalog, InMemoryMarketplace, MarketplaceConfig, TokenManager};
use reduction_scheduler::{ReductionScheduler, SchedulerConfig};
use repricer_engine::{Engine, EngineConfig};

/// Test key for the vault cipher
pub const TEST_VAULT_KEY: &str = "000102030405060708090a0b0c0d0e0f101112131415161718191a1b1c1d1e1f";

/// Every in-memory collaborator, shared with the engine under test
pub struct TestHarness {
    pub engine: Engine,
    pub listings: Arc<InMemoryListingRepository>,
    pub strategies: Arc<InMemoryStrategyRepository>,
    pub settings: Arc<InMemoryUserSettingsRepository>,
    pub marketplace: Arc<InMemoryMarketplace>,
    pub catalog: Arc<InMemoryCatalog>,
    pub auth_server: Arc<InMemoryAuthServer>,
    pub vault: Arc<CredentialVault>,
    pub tokens: Arc<TokenManager>,
}

/// Build a fully wired engine over in-memory backends
pub fn build_test_engine() -> TestHarness {
    let listings = Arc::new(InMemoryListingRepository::new());
    let strategies = Arc::new(InMemoryStrategyRepository::new());
    let settings = Arc::new(InMemoryUserSettingsRepository::new());
    let marketplace = Arc::new(InMemoryMarketplace::new());
    let catalog = Arc::new(InMemoryCatalog::new());
    let auth_server = Arc::new(InMemoryAuthServer::new());

    let vault = Arc::new(
        CredentialVault::in_memory(&VaultConfig::new(TEST_VAULT_KEY.to_string()))
            .expect("test vault key is valid"),
    );
    let tokens = Arc::new(TokenManager::new(
        vault.clone(),
        auth_server.clone(),
        MarketplaceConfig::default(),
    ));

    let synchronizer =
        ListingSynchronizer::new(listings.clone(), marketplace.clone(), catalog.clone());
    let scheduler = ReductionScheduler::new(
        listings.clone(),
        strategies.clone(),
        settings.clone(),
        marketplace.clone(),
        SchedulerConfig { max_concurrency: 2 },
    );

    let engine = Engine::new(
        listings.clone(),
        strategies.clone(),
        settings.clone(),
        vault.clone(),
        tokens.clone(),
        synchronizer,
        scheduler,
        EngineConfig {
            sync_freshness_hours: 4,
        },
    );

    TestHarness {
        engine,
        listings,
        strategies,
        settings,
        marketplace,
        catalog,
        auth_server,
        vault,
        tokens,
    }
}
