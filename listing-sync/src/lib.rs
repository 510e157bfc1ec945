//! Listing storage and marketplace reconciliation

pub mod repository;
pub mod service;
pub mod sku;

pub use repository::{
    InMemoryListingRepository, InMemoryStrategyRepository, InMemoryUserSettingsRepository,
    ListingRepository, PostgresListingRepository, PostgresStrategyRepository,
    PostgresUserSettingsRepository, RemoteFields, StrategyRepository, UserSettingsRepository,
};
pub use service::{ListingSynchronizer, SyncReport};
pub use sku::generate_sku;
