//! Repricing engine wiring

use std::sync::Arc;

use common::error::Result;
use credential_vault::{CredentialVault, PostgresCredentialRepository, VaultConfig};
use listing_sync::repository::{
    PostgresListingRepository, PostgresStrategyRepository, PostgresUserSettingsRepository,
};
use listing_sync::ListingSynchronizer;
use marketplace_client::{
    CatalogConfig, HttpAuthClient, HttpCatalogClient, HttpMarketplaceClient, MarketplaceConfig,
    TokenManager,
};
use reduction_scheduler::{ReductionScheduler, SchedulerConfig};
use sqlx::PgPool;

pub mod engine;

pub use engine::{Engine, EngineConfig};

/// Build a fully wired engine over PostgreSQL and the live marketplace,
/// with every component configured from the environment
pub fn build_postgres_engine(pool: PgPool) -> Result<Engine> {
    let vault_config = VaultConfig::from_env()?;
    let marketplace_config = MarketplaceConfig::from_env();
    let catalog_config = CatalogConfig::from_env();

    let listings = Arc::new(PostgresListingRepository::with_pool(pool.clone()));
    let strategies = Arc::new(PostgresStrategyRepository::with_pool(pool.clone()));
    let settings = Arc::new(PostgresUserSettingsRepository::with_pool(pool.clone()));
    let credentials = Arc::new(PostgresCredentialRepository::with_pool(pool));

    let vault = Arc::new(CredentialVault::new(credentials, &vault_config)?);
    let auth = Arc::new(HttpAuthClient::new(&marketplace_config)?);
    let tokens = Arc::new(TokenManager::new(
        vault.clone(),
        auth,
        marketplace_config.clone(),
    ));

    let marketplace = Arc::new(HttpMarketplaceClient::new(
        marketplace_config,
        tokens.clone(),
    )?);
    let catalog = Arc::new(HttpCatalogClient::new(catalog_config)?);

    let synchronizer = ListingSynchronizer::new(
        listings.clone(),
        marketplace.clone(),
        catalog,
    );
    let scheduler = ReductionScheduler::new(
        listings.clone(),
        strategies.clone(),
        settings.clone(),
        marketplace,
        SchedulerConfig::from_env(),
    );

    Ok(Engine::new(
        listings,
        strategies,
        settings,
        vault,
        tokens,
        synchronizer,
        scheduler,
        EngineConfig::from_env(),
    ))
}
