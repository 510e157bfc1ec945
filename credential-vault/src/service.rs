//! Credential vault service
//!
//! The only component that sees plaintext secrets is the token lifecycle
//! manager, through [`CredentialVault::unseal`]. Everything else gets the
//! [`ConnectionInfo`] projection.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use common::error::{Error, Result};
use common::model::credential::{ConnectionInfo, ConnectionStatus, MarketplaceCredential};
use tracing::{debug, info};
use uuid::Uuid;

use crate::config::VaultConfig;
use crate::crypto::SecretCipher;
use crate::repository::{CredentialRepository, InMemoryCredentialRepository};

/// Developer application keys entered by the user
#[derive(Debug, Clone)]
pub struct DeveloperKeys {
    /// Application id (public)
    pub app_id: String,
    /// Application client secret (plaintext on input only)
    pub client_secret: String,
    /// Optional developer id (public)
    pub dev_id: Option<String>,
}

/// Token material produced by an OAuth exchange or refresh
#[derive(Debug, Clone)]
pub struct TokenSet {
    /// Bearer access token
    pub access_token: String,
    /// Access-token expiry
    pub access_token_expires_at: DateTime<Utc>,
    /// Refresh token, absent on access-only rotations
    pub refresh_token: Option<String>,
}

/// Decrypted credential view, handed only to the token lifecycle manager
#[derive(Debug, Clone)]
pub struct UnsealedCredential {
    /// Owning user
    pub user_id: Uuid,
    /// Application id
    pub app_id: String,
    /// Application client secret
    pub client_secret: String,
    /// Optional developer id
    pub dev_id: Option<String>,
    /// Refresh token, if connected
    pub refresh_token: Option<String>,
    /// Access token, if one has been issued
    pub access_token: Option<String>,
    /// Access-token expiry
    pub access_token_expires_at: Option<DateTime<Utc>>,
    /// Connection state
    pub status: ConnectionStatus,
    /// Marketplace account name
    pub marketplace_username: Option<String>,
}

/// Encrypted store for per-user marketplace credentials
pub struct CredentialVault {
    repo: Arc<dyn CredentialRepository>,
    cipher: SecretCipher,
}

impl CredentialVault {
    /// Create a vault over the given repository
    pub fn new(repo: Arc<dyn CredentialRepository>, config: &VaultConfig) -> Result<Self> {
        Ok(Self {
            repo,
            cipher: SecretCipher::from_hex_key(&config.encryption_key_hex)?,
        })
    }

    /// Create an in-memory vault, for tests and local runs
    pub fn in_memory(config: &VaultConfig) -> Result<Self> {
        Self::new(Arc::new(InMemoryCredentialRepository::new()), config)
    }

    /// Store developer keys for a user, creating the record if needed.
    ///
    /// Tokens already on file are preserved so re-entering keys does not
    /// force a reconnect.
    pub async fn put_developer_keys(&self, user_id: Uuid, keys: DeveloperKeys) -> Result<()> {
        info!("Storing developer keys for user {}", user_id);
        let client_secret_enc = self.cipher.encrypt(&keys.client_secret)?;
        let now = Utc::now();

        let record = match self.repo.get(user_id).await? {
            Some(mut existing) => {
                existing.app_id = keys.app_id;
                existing.client_secret_enc = client_secret_enc;
                existing.dev_id = keys.dev_id;
                existing.updated_at = now;
                existing
            }
            None => MarketplaceCredential {
                user_id,
                app_id: keys.app_id,
                client_secret_enc,
                dev_id: keys.dev_id,
                refresh_token_enc: None,
                access_token_enc: None,
                access_token_expires_at: None,
                marketplace_username: None,
                status: ConnectionStatus::Disconnected,
                created_at: now,
                updated_at: now,
            },
        };

        self.repo.upsert(record).await
    }

    /// The secret-free status projection for a user, if a record exists
    pub async fn connection_info(&self, user_id: Uuid) -> Result<Option<ConnectionInfo>> {
        Ok(self.repo.get(user_id).await?.map(|c| c.connection_info()))
    }

    /// Decrypt the full credential record.
    ///
    /// Restricted to the token lifecycle manager; nothing above it may
    /// receive plaintext secrets.
    pub async fn unseal(&self, user_id: Uuid) -> Result<UnsealedCredential> {
        let record = self.repo.get(user_id).await?.ok_or_else(|| {
            Error::CredentialNotFound(format!("No credentials for user {}", user_id))
        })?;

        let client_secret = self.cipher.decrypt(&record.client_secret_enc)?;
        let refresh_token = record
            .refresh_token_enc
            .as_deref()
            .map(|enc| self.cipher.decrypt(enc))
            .transpose()?;
        let access_token = record
            .access_token_enc
            .as_deref()
            .map(|enc| self.cipher.decrypt(enc))
            .transpose()?;

        Ok(UnsealedCredential {
            user_id: record.user_id,
            app_id: record.app_id,
            client_secret,
            dev_id: record.dev_id,
            refresh_token,
            access_token,
            access_token_expires_at: record.access_token_expires_at,
            status: record.status,
            marketplace_username: record.marketplace_username,
        })
    }

    /// Store a full token set after an OAuth exchange and mark the
    /// connection live
    pub async fn store_tokens(
        &self,
        user_id: Uuid,
        tokens: TokenSet,
        marketplace_username: Option<String>,
    ) -> Result<()> {
        debug!("Storing token set for user {}", user_id);
        let mut record = self.repo.get(user_id).await?.ok_or_else(|| {
            Error::CredentialNotFound(format!("No credentials for user {}", user_id))
        })?;

        record.access_token_enc = Some(self.cipher.encrypt(&tokens.access_token)?);
        record.access_token_expires_at = Some(tokens.access_token_expires_at);
        if let Some(refresh) = tokens.refresh_token.as_deref() {
            record.refresh_token_enc = Some(self.cipher.encrypt(refresh)?);
        }
        if marketplace_username.is_some() {
            record.marketplace_username = marketplace_username;
        }
        record.status = ConnectionStatus::Connected;
        record.updated_at = Utc::now();

        self.repo.upsert(record).await
    }

    /// Rotate the access token after a silent refresh
    pub async fn rotate_access_token(
        &self,
        user_id: Uuid,
        access_token: &str,
        expires_at: DateTime<Utc>,
    ) -> Result<()> {
        debug!("Rotating access token for user {}", user_id);
        let mut record = self.repo.get(user_id).await?.ok_or_else(|| {
            Error::CredentialNotFound(format!("No credentials for user {}", user_id))
        })?;

        record.access_token_enc = Some(self.cipher.encrypt(access_token)?);
        record.access_token_expires_at = Some(expires_at);
        record.updated_at = Utc::now();
        self.repo.upsert(record).await
    }

    /// Rotate the refresh token
    pub async fn rotate_refresh_token(&self, user_id: Uuid, new_token: &str) -> Result<()> {
        debug!("Rotating refresh token for user {}", user_id);
        let mut record = self.repo.get(user_id).await?.ok_or_else(|| {
            Error::CredentialNotFound(format!("No credentials for user {}", user_id))
        })?;

        record.refresh_token_enc = Some(self.cipher.encrypt(new_token)?);
        record.updated_at = Utc::now();
        self.repo.upsert(record).await
    }

    /// Update the connection status only
    pub async fn mark_status(&self, user_id: Uuid, status: ConnectionStatus) -> Result<()> {
        self.repo.set_status(user_id, status).await
    }

    /// Drop stored tokens on disconnect, keeping developer keys so a
    /// later reconnect needs no re-entry
    pub async fn clear_tokens(&self, user_id: Uuid) -> Result<()> {
        info!("Clearing tokens for user {}", user_id);
        let mut record = self.repo.get(user_id).await?.ok_or_else(|| {
            Error::CredentialNotFound(format!("No credentials for user {}", user_id))
        })?;

        record.refresh_token_enc = None;
        record.access_token_enc = None;
        record.access_token_expires_at = None;
        record.status = ConnectionStatus::Disconnected;
        record.updated_at = Utc::now();
        self.repo.upsert(record).await
    }
}
