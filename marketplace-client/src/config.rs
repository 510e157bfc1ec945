//! Configuration for the marketplace and catalog clients

use std::env;

/// Configuration for the marketplace client and token lifecycle
#[derive(Debug, Clone)]
pub struct MarketplaceConfig {
    /// Base URL of the marketplace REST API
    pub api_base_url: String,
    /// Authorization endpoint the user is redirected to
    pub authorize_url: String,
    /// Token endpoint for code exchange and refresh
    pub token_url: String,
    /// Redirect URI registered with the marketplace application
    pub redirect_uri: String,
    /// Space-separated OAuth scopes
    pub scopes: String,
    /// Per-request timeout in seconds
    pub http_timeout_secs: u64,
    /// Transient-failure retries per call
    pub max_retries: u32,
    /// Base delay for exponential backoff, in milliseconds
    pub backoff_base_ms: u64,
    /// Refresh the access token when less than this much validity remains
    pub refresh_margin_secs: i64,
    /// Lifetime of a pending authorization state token
    pub state_ttl_secs: i64,
}

impl Default for MarketplaceConfig {
    fn default() -> Self {
        Self {
            api_base_url: env::var("MARKETPLACE_API_URL")
                .unwrap_or_else(|_| "https://api.marketplace.example".to_string()),
            authorize_url: env::var("MARKETPLACE_AUTHORIZE_URL")
                .unwrap_or_else(|_| "https://auth.marketplace.example/oauth2/authorize".to_string()),
            token_url: env::var("MARKETPLACE_TOKEN_URL")
                .unwrap_or_else(|_| "https://auth.marketplace.example/oauth2/token".to_string()),
            redirect_uri: env::var("MARKETPLACE_REDIRECT_URI")
                .unwrap_or_else(|_| "https://localhost/oauth/callback".to_string()),
            scopes: env::var("MARKETPLACE_SCOPES")
                .unwrap_or_else(|_| "sell.inventory sell.account".to_string()),
            http_timeout_secs: env::var("MARKETPLACE_HTTP_TIMEOUT_SECS")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(30),
            max_retries: env::var("MARKETPLACE_MAX_RETRIES")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(3),
            backoff_base_ms: env::var("MARKETPLACE_BACKOFF_BASE_MS")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(500),
            refresh_margin_secs: env::var("MARKETPLACE_REFRESH_MARGIN_SECS")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(300),
            state_ttl_secs: env::var("MARKETPLACE_STATE_TTL_SECS")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(600),
        }
    }
}

impl MarketplaceConfig {
    /// Read the configuration from environment variables
    pub fn from_env() -> Self {
        Self::default()
    }
}

/// Configuration for the catalog provider client
#[derive(Debug, Clone)]
pub struct CatalogConfig {
    /// Base URL of the catalog provider API
    pub base_url: String,
    /// API token for the metered catalog budget
    pub api_token: Option<String>,
    /// Per-request timeout in seconds
    pub http_timeout_secs: u64,
}

impl Default for CatalogConfig {
    fn default() -> Self {
        Self {
            base_url: env::var("CATALOG_API_URL")
                .unwrap_or_else(|_| "https://api.catalog.example".to_string()),
            api_token: env::var("CATALOG_API_TOKEN").ok(),
            http_timeout_secs: env::var("CATALOG_HTTP_TIMEOUT_SECS")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(30),
        }
    }
}

impl CatalogConfig {
    /// Read the configuration from environment variables
    pub fn from_env() -> Self {
        Self::default()
    }
}
