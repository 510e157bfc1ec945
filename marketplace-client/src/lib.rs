//! Typed clients for the marketplace and catalog provider, plus the
//! OAuth2 token lifecycle manager that authenticates them

pub mod auth;
pub mod catalog;
pub mod client;
pub mod config;
pub mod types;

pub use auth::{
    AuthApi, AuthorizationRequest, ClientKeys, HttpAuthClient, InMemoryAuthServer, TokenGrant,
    TokenManager,
};
pub use catalog::{CatalogApi, HttpCatalogClient, InMemoryCatalog};
pub use client::{HttpMarketplaceClient, InMemoryMarketplace, MarketplaceApi};
pub use config::{CatalogConfig, MarketplaceConfig};
pub use types::{CatalogImage, CatalogProduct, ListingDraft, ProductAttribute, RemoteListing, TokenResponse};
