//! Deterministic SKU generation
//!
//! SKUs are content-addressed: identical inputs always produce the
//! identical string, which is what makes catalog-driven listing creation
//! idempotent. The format is versioned by its prefix so historical SKUs
//! stay parseable if the layout ever changes:
//!
//! `RP1-<owner hash, 8 hex>[-<catalog id>]-<content hash, 12 hex>`
//!
//! The catalog-id segment keeps downstream catalog lookups possible
//! without a second index; the content hash keeps the SKU unique when no
//! catalog id exists.

use sha2::{Digest, Sha256};
use uuid::Uuid;

/// Format version prefix
pub const SKU_PREFIX: &str = "RP1";

const OWNER_HASH_LEN: usize = 8;
const CONTENT_HASH_LEN: usize = 12;

fn short_hash(input: &[u8], len: usize) -> String {
    let digest = Sha256::digest(input);
    hex::encode(digest)[..len].to_string()
}

/// Generate the SKU for a listing created from catalog data
pub fn generate_sku(owner_id: Uuid, catalog_id: Option<&str>, content_fingerprint: &str) -> String {
    let owner = short_hash(owner_id.as_bytes(), OWNER_HASH_LEN);
    let content = short_hash(content_fingerprint.as_bytes(), CONTENT_HASH_LEN);

    match catalog_id {
        Some(catalog) => format!("{}-{}-{}-{}", SKU_PREFIX, owner, catalog, content),
        None => format!("{}-{}-{}", SKU_PREFIX, owner, content),
    }
}
