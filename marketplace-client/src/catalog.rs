//! Catalog provider client
//!
//! Looks up product data (title, description, ranked images, structured
//! attributes) by external identifier. The provider meters lookups; a
//! quota rejection surfaces as a transient failure so callers defer
//! rather than fail hard.

use std::time::Duration;

use async_trait::async_trait;
use common::error::{Error, Result};
use dashmap::DashMap;
use reqwest::StatusCode;
use tracing::debug;

use crate::config::CatalogConfig;
use crate::types::CatalogProduct;

/// Catalog provider surface used by catalog-driven listing creation
#[async_trait]
pub trait CatalogApi: Send + Sync {
    /// Look a product up by its provider identifier
    async fn lookup(&self, external_id: &str) -> Result<Option<CatalogProduct>>;
}

/// HTTP implementation of [`CatalogApi`]
pub struct HttpCatalogClient {
    http: reqwest::Client,
    config: CatalogConfig,
}

impl HttpCatalogClient {
    /// Create a client from the catalog configuration
    pub fn new(config: CatalogConfig) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.http_timeout_secs))
            .build()
            .map_err(|e| Error::Configuration(format!("Failed to build HTTP client: {}", e)))?;
        Ok(Self { http, config })
    }
}

#[async_trait]
impl CatalogApi for HttpCatalogClient {
    async fn lookup(&self, external_id: &str) -> Result<Option<CatalogProduct>> {
        let url = format!("{}/products/{}", self.config.base_url, external_id);
        debug!("Catalog lookup for {}", external_id);

        let mut request = self.http.get(&url);
        if let Some(token) = self.config.api_token.as_deref() {
            request = request.bearer_auth(token);
        }

        let response = request
            .send()
            .await
            .map_err(|e| Error::Transient(format!("Catalog request failed: {}", e)))?;

        match response.status() {
            StatusCode::NOT_FOUND => Ok(None),
            StatusCode::TOO_MANY_REQUESTS => Err(Error::Transient(
                "Catalog lookup budget exhausted".to_string(),
            )),
            status if status.is_success() => {
                let product: CatalogProduct = response
                    .json()
                    .await
                    .map_err(|e| Error::Transient(format!("Malformed catalog response: {}", e)))?;
                Ok(Some(product))
            }
            status => {
                let body = response.text().await.unwrap_or_default();
                Err(Error::Transient(format!(
                    "Catalog returned {}: {}",
                    status, body
                )))
            }
        }
    }
}

/// In-memory catalog for tests
pub struct InMemoryCatalog {
    products: DashMap<String, CatalogProduct>,
}

impl InMemoryCatalog {
    /// Create an empty catalog
    pub fn new() -> Self {
        Self {
            products: DashMap::new(),
        }
    }

    /// Seed a product
    pub fn seed_product(&self, product: CatalogProduct) {
        self.products.insert(product.external_id.clone(), product);
    }
}

impl Default for InMemoryCatalog {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl CatalogApi for InMemoryCatalog {
    async fn lookup(&self, external_id: &str) -> Result<Option<CatalogProduct>> {
        Ok(self.products.get(external_id).map(|p| p.clone()))
    }
}
