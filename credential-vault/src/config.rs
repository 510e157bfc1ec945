//! Configuration for the credential vault

use std::env;

use common::error::{Error, Result};

/// Configuration for the credential vault
#[derive(Debug, Clone)]
pub struct VaultConfig {
    /// Hex-encoded 32-byte AES-256 key; process-wide, never user-derived
    pub encryption_key_hex: String,
}

impl VaultConfig {
    /// Read the configuration from environment variables
    pub fn from_env() -> Result<Self> {
        let encryption_key_hex = env::var("VAULT_KEY")
            .map_err(|_| Error::Configuration("VAULT_KEY must be set".to_string()))?;
        Ok(Self { encryption_key_hex })
    }

    /// Create a configuration with an explicit key
    pub fn new(encryption_key_hex: String) -> Self {
        Self { encryption_key_hex }
    }
}
