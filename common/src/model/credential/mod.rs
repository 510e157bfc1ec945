//! Marketplace credential records
//!
//! The at-rest form of a user's marketplace connection. Secret fields
//! (`client_secret_enc`, `refresh_token_enc`, `access_token_enc`) hold
//! vault ciphertext; plaintext secrets exist only inside the token
//! lifecycle manager. Everything else sees [`ConnectionInfo`].

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{Error, Result};

/// State of a user's marketplace connection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConnectionStatus {
    /// Tokens on file and believed valid
    Connected,
    /// No tokens on file, or the user disconnected
    Disconnected,
    /// Refresh token was rejected; user must reauthorize
    Expired,
}

impl ConnectionStatus {
    /// Database representation
    pub fn as_str(&self) -> &'static str {
        match self {
            ConnectionStatus::Connected => "connected",
            ConnectionStatus::Disconnected => "disconnected",
            ConnectionStatus::Expired => "expired",
        }
    }

    /// Parse the database representation
    pub fn parse(s: &str) -> Result<Self> {
        match s {
            "connected" => Ok(ConnectionStatus::Connected),
            "disconnected" => Ok(ConnectionStatus::Disconnected),
            "expired" => Ok(ConnectionStatus::Expired),
            other => Err(Error::Internal(format!("Unknown connection status: {}", other))),
        }
    }
}

/// One marketplace connection per user, secrets encrypted at rest
#[derive(Debug, Clone)]
pub struct MarketplaceCredential {
    /// Owning user
    pub user_id: Uuid,
    /// Developer application id (public)
    pub app_id: String,
    /// Encrypted application client secret
    pub client_secret_enc: String,
    /// Optional developer id (public)
    pub dev_id: Option<String>,
    /// Encrypted OAuth refresh token
    pub refresh_token_enc: Option<String>,
    /// Encrypted OAuth access token
    pub access_token_enc: Option<String>,
    /// Access-token expiry
    pub access_token_expires_at: Option<DateTime<Utc>>,
    /// Marketplace account name (public)
    pub marketplace_username: Option<String>,
    /// Connection state
    pub status: ConnectionStatus,
    /// Creation timestamp
    pub created_at: DateTime<Utc>,
    /// Last update timestamp
    pub updated_at: DateTime<Utc>,
}

impl MarketplaceCredential {
    /// The secret-free projection handed to everything above the token
    /// lifecycle manager
    pub fn connection_info(&self) -> ConnectionInfo {
        ConnectionInfo {
            user_id: self.user_id,
            status: self.status,
            marketplace_username: self.marketplace_username.clone(),
            access_token_expires_at: self.access_token_expires_at,
        }
    }
}

/// Secret-free view of a marketplace connection
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConnectionInfo {
    /// Owning user
    pub user_id: Uuid,
    /// Connection state
    pub status: ConnectionStatus,
    /// Marketplace account name
    pub marketplace_username: Option<String>,
    /// Access-token expiry, for diagnostics
    pub access_token_expires_at: Option<DateTime<Utc>>,
}
