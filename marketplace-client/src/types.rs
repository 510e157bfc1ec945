//! Wire types for the marketplace and catalog APIs

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// One listing as reported by the marketplace
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RemoteListing {
    /// Marketplace item id
    pub item_id: String,
    /// Listing title
    pub title: String,
    /// Current asking price
    pub price: Decimal,
    /// Units available
    pub quantity: i32,
    /// View counter
    #[serde(default)]
    pub view_count: i64,
    /// Watch counter
    #[serde(default)]
    pub watch_count: i64,
}

/// Payload for creating a listing on the marketplace
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ListingDraft {
    /// Seller SKU
    pub sku: String,
    /// Listing title
    pub title: String,
    /// Listing description
    pub description: String,
    /// Asking price
    pub price: Decimal,
    /// Units offered
    pub quantity: i32,
    /// Image URLs, best resolution first
    pub image_urls: Vec<String>,
}

/// Token endpoint response
#[derive(Debug, Clone, Deserialize)]
pub struct TokenResponse {
    /// Bearer access token
    pub access_token: String,
    /// Seconds until the access token expires
    pub expires_in: i64,
    /// Refresh token, present on code exchange and sometimes on refresh
    #[serde(default)]
    pub refresh_token: Option<String>,
    /// Marketplace account the tokens belong to
    #[serde(default)]
    pub marketplace_username: Option<String>,
}

/// One product image from the catalog provider
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CatalogImage {
    /// Image URL
    pub url: String,
    /// Pixel width
    #[serde(default)]
    pub width: u32,
    /// Pixel height
    #[serde(default)]
    pub height: u32,
}

impl CatalogImage {
    /// Resolution rank, larger is better
    pub fn resolution(&self) -> u64 {
        self.width as u64 * self.height as u64
    }
}

/// One structured product attribute
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProductAttribute {
    /// Attribute name
    pub name: String,
    /// Attribute value
    pub value: String,
}

/// Product data returned by the catalog provider
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CatalogProduct {
    /// Provider-side product identifier
    pub external_id: String,
    /// Product title
    pub title: String,
    /// Product description
    #[serde(default)]
    pub description: String,
    /// Product images in provider order
    #[serde(default)]
    pub images: Vec<CatalogImage>,
    /// Structured attributes
    #[serde(default)]
    pub attributes: Vec<ProductAttribute>,
}

impl CatalogProduct {
    /// Images sorted best resolution first
    pub fn ranked_images(&self) -> Vec<CatalogImage> {
        let mut images = self.images.clone();
        images.sort_by(|a, b| b.resolution().cmp(&a.resolution()));
        images
    }
}
