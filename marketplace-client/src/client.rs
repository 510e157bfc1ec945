//! Typed marketplace API client
//!
//! Wraps the marketplace REST endpoints with bearer authentication from
//! the token lifecycle manager, a per-request timeout, and bounded
//! exponential backoff for transient failures. Status codes map onto the
//! engine's failure taxonomy: 401/403 is an auth failure, 429 and 5xx are
//! transient, any other 4xx is a business-rule rejection that is never
//! retried.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use common::error::{Error, Result};
use common::money::Price;
use dashmap::DashMap;
use reqwest::{RequestBuilder, Response, StatusCode};
use tracing::{debug, warn};
use uuid::Uuid;

use crate::auth::TokenManager;
use crate::config::MarketplaceConfig;
use crate::types::{ListingDraft, RemoteListing};

/// Marketplace API surface used by the synchronizer and scheduler
#[async_trait]
pub trait MarketplaceApi: Send + Sync {
    /// Fetch the full active listing set for a user
    async fn active_listings(&self, user_id: Uuid) -> Result<Vec<RemoteListing>>;

    /// Change the asking price of a listing
    async fn update_price(&self, user_id: Uuid, item_id: &str, new_price: Price) -> Result<()>;

    /// End a listing on the marketplace
    async fn end_listing(&self, user_id: Uuid, item_id: &str) -> Result<()>;

    /// Create a listing; returns the marketplace item id
    async fn create_listing(&self, user_id: Uuid, draft: &ListingDraft) -> Result<String>;
}

/// Map an HTTP status onto the engine failure taxonomy
fn classify_status(status: StatusCode, body: &str) -> Error {
    match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
            Error::Auth(format!("Marketplace returned {}: {}", status, body))
        }
        StatusCode::TOO_MANY_REQUESTS => {
            Error::Transient(format!("Marketplace rate limit: {}", body))
        }
        s if s.is_client_error() => {
            Error::MarketplaceRejection(format!("Marketplace returned {}: {}", status, body))
        }
        _ => Error::Transient(format!("Marketplace returned {}: {}", status, body)),
    }
}

/// HTTP implementation of [`MarketplaceApi`]
pub struct HttpMarketplaceClient {
    http: reqwest::Client,
    config: MarketplaceConfig,
    tokens: Arc<TokenManager>,
}

impl HttpMarketplaceClient {
    /// Create a client over the given token manager
    pub fn new(config: MarketplaceConfig, tokens: Arc<TokenManager>) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.http_timeout_secs))
            .build()
            .map_err(|e| Error::Configuration(format!("Failed to build HTTP client: {}", e)))?;
        Ok(Self {
            http,
            config,
            tokens,
        })
    }

    /// Issue a request, retrying transient failures with exponential
    /// backoff, honoring `Retry-After` when the marketplace sends one.
    ///
    /// A timed-out call is a transient failure, never a success.
    async fn send_with_retry<F>(&self, build: F) -> Result<Response>
    where
        F: Fn() -> RequestBuilder,
    {
        let mut attempt: u32 = 0;
        loop {
            let result = build().send().await;
            let err = match result {
                Ok(response) if response.status().is_success() => return Ok(response),
                Ok(response) => {
                    let status = response.status();
                    let retry_after = response
                        .headers()
                        .get(reqwest::header::RETRY_AFTER)
                        .and_then(|v| v.to_str().ok())
                        .and_then(|v| v.parse::<u64>().ok());
                    let body = response.text().await.unwrap_or_default();
                    let err = classify_status(status, &body);
                    if err.is_transient() && attempt < self.config.max_retries {
                        let delay = self.backoff_delay(attempt, retry_after);
                        warn!("Transient marketplace failure ({}), retrying in {:?}", status, delay);
                        tokio::time::sleep(delay).await;
                        attempt += 1;
                        continue;
                    }
                    err
                }
                Err(e) => {
                    let err = Error::Transient(format!("Marketplace request failed: {}", e));
                    if attempt < self.config.max_retries {
                        let delay = self.backoff_delay(attempt, None);
                        warn!("Marketplace request error ({}), retrying in {:?}", e, delay);
                        tokio::time::sleep(delay).await;
                        attempt += 1;
                        continue;
                    }
                    err
                }
            };
            return Err(err);
        }
    }

    fn backoff_delay(&self, attempt: u32, retry_after_secs: Option<u64>) -> Duration {
        let backoff = Duration::from_millis(self.config.backoff_base_ms * (1u64 << attempt));
        match retry_after_secs {
            Some(secs) => backoff.max(Duration::from_secs(secs)),
            None => backoff,
        }
    }
}

#[async_trait]
impl MarketplaceApi for HttpMarketplaceClient {
    async fn active_listings(&self, user_id: Uuid) -> Result<Vec<RemoteListing>> {
        let token = self.tokens.access_token(user_id).await?;
        let url = format!("{}/sell/listings?status=active", self.config.api_base_url);

        debug!("Fetching active listings for user {}", user_id);
        let response = self
            .send_with_retry(|| self.http.get(&url).bearer_auth(&token))
            .await?;

        let listings: Vec<RemoteListing> = response
            .json()
            .await
            .map_err(|e| Error::Transient(format!("Malformed listing response: {}", e)))?;
        Ok(listings)
    }

    async fn update_price(&self, user_id: Uuid, item_id: &str, new_price: Price) -> Result<()> {
        let token = self.tokens.access_token(user_id).await?;
        let url = format!("{}/sell/listings/{}/price", self.config.api_base_url, item_id);
        let body = serde_json::json!({ "price": new_price });

        debug!("Updating price of {} to {} for user {}", item_id, new_price, user_id);
        self.send_with_retry(|| self.http.put(&url).bearer_auth(&token).json(&body))
            .await?;
        Ok(())
    }

    async fn end_listing(&self, user_id: Uuid, item_id: &str) -> Result<()> {
        let token = self.tokens.access_token(user_id).await?;
        let url = format!("{}/sell/listings/{}/end", self.config.api_base_url, item_id);

        debug!("Ending listing {} for user {}", item_id, user_id);
        self.send_with_retry(|| self.http.post(&url).bearer_auth(&token))
            .await?;
        Ok(())
    }

    async fn create_listing(&self, user_id: Uuid, draft: &ListingDraft) -> Result<String> {
        let token = self.tokens.access_token(user_id).await?;
        let url = format!("{}/sell/listings", self.config.api_base_url);

        debug!("Creating listing with SKU {} for user {}", draft.sku, user_id);
        let response = self
            .send_with_retry(|| self.http.post(&url).bearer_auth(&token).json(draft))
            .await?;

        #[derive(serde::Deserialize)]
        struct Created {
            item_id: String,
        }
        let created: Created = response
            .json()
            .await
            .map_err(|e| Error::Transient(format!("Malformed create response: {}", e)))?;
        Ok(created.item_id)
    }
}

/// Scripted failure for one item on the in-memory marketplace
#[derive(Debug, Clone)]
enum ScriptedFailure {
    /// Business-rule rejection on every attempt
    Business(String),
    /// Transient failure for the next N attempts
    Transient(u32),
    /// Auth failure on every attempt
    Auth,
}

/// In-memory marketplace double for tests and local runs.
///
/// Holds listings per user, applies price updates directly, and can be
/// scripted to fail specific items so retry and error paths are
/// exercisable without a network.
pub struct InMemoryMarketplace {
    listings: DashMap<Uuid, HashMap<String, RemoteListing>>,
    failures: DashMap<String, ScriptedFailure>,
    update_calls: AtomicU64,
    next_item: AtomicU64,
}

impl InMemoryMarketplace {
    /// Create an empty in-memory marketplace
    pub fn new() -> Self {
        Self {
            listings: DashMap::new(),
            failures: DashMap::new(),
            update_calls: AtomicU64::new(0),
            next_item: AtomicU64::new(1),
        }
    }

    /// Seed a remote listing for a user
    pub fn seed_listing(&self, user_id: Uuid, listing: RemoteListing) {
        self.listings
            .entry(user_id)
            .or_default()
            .insert(listing.item_id.clone(), listing);
    }

    /// Remove a remote listing, as if it sold or was ended elsewhere
    pub fn remove_listing(&self, user_id: Uuid, item_id: &str) {
        if let Some(mut set) = self.listings.get_mut(&user_id) {
            set.remove(item_id);
        }
    }

    /// Script a business-rule rejection for an item
    pub fn reject_business(&self, item_id: &str, reason: &str) {
        self.failures
            .insert(item_id.to_string(), ScriptedFailure::Business(reason.to_string()));
    }

    /// Script N transient failures for an item
    pub fn fail_transient(&self, item_id: &str, times: u32) {
        self.failures
            .insert(item_id.to_string(), ScriptedFailure::Transient(times));
    }

    /// Script auth failures for an item
    pub fn reject_auth(&self, item_id: &str) {
        self.failures.insert(item_id.to_string(), ScriptedFailure::Auth);
    }

    /// Number of price-update calls observed
    pub fn update_calls(&self) -> u64 {
        self.update_calls.load(Ordering::SeqCst)
    }

    /// Current price of a seeded listing
    pub fn price_of(&self, user_id: Uuid, item_id: &str) -> Option<Price> {
        self.listings
            .get(&user_id)
            .and_then(|set| set.get(item_id).map(|l| l.price))
    }

    fn check_failure(&self, item_id: &str) -> Result<()> {
        if let Some(mut entry) = self.failures.get_mut(item_id) {
            match entry.value_mut() {
                ScriptedFailure::Business(reason) => {
                    return Err(Error::MarketplaceRejection(reason.clone()));
                }
                ScriptedFailure::Auth => {
                    return Err(Error::Auth("Scripted auth failure".to_string()));
                }
                ScriptedFailure::Transient(remaining) => {
                    if *remaining > 0 {
                        *remaining -= 1;
                        return Err(Error::Transient("Scripted transient failure".to_string()));
                    }
                }
            }
        }
        Ok(())
    }
}

impl Default for InMemoryMarketplace {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl MarketplaceApi for InMemoryMarketplace {
    async fn active_listings(&self, user_id: Uuid) -> Result<Vec<RemoteListing>> {
        Ok(self
            .listings
            .get(&user_id)
            .map(|set| set.values().cloned().collect())
            .unwrap_or_default())
    }

    async fn update_price(&self, user_id: Uuid, item_id: &str, new_price: Price) -> Result<()> {
        self.update_calls.fetch_add(1, Ordering::SeqCst);
        self.check_failure(item_id)?;

        let mut set = self.listings.get_mut(&user_id).ok_or_else(|| {
            Error::MarketplaceRejection(format!("Unknown seller {}", user_id))
        })?;
        match set.get_mut(item_id) {
            Some(listing) => {
                listing.price = new_price;
                Ok(())
            }
            None => Err(Error::MarketplaceRejection(format!(
                "Unknown item {}",
                item_id
            ))),
        }
    }

    async fn end_listing(&self, user_id: Uuid, item_id: &str) -> Result<()> {
        self.check_failure(item_id)?;
        if let Some(mut set) = self.listings.get_mut(&user_id) {
            set.remove(item_id);
        }
        Ok(())
    }

    async fn create_listing(&self, user_id: Uuid, draft: &ListingDraft) -> Result<String> {
        let item_id = format!("ITEM-{}", self.next_item.fetch_add(1, Ordering::SeqCst));
        self.seed_listing(
            user_id,
            RemoteListing {
                item_id: item_id.clone(),
                title: draft.title.clone(),
                price: draft.price,
                quantity: draft.quantity,
                view_count: 0,
                watch_count: 0,
            },
        );
        Ok(item_id)
    }
}
