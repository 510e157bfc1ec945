//! Repository for marketplace credential records

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use common::error::{Error, Result};
use common::model::credential::{ConnectionStatus, MarketplaceCredential};
use dashmap::DashMap;
use sqlx::{postgres::PgPoolOptions, PgPool, Row};
use tracing::{debug, info};
use uuid::Uuid;

/// Credential repository trait defining the interface for credential storage.
///
/// Rows hold ciphertext only; encryption and decryption happen in the
/// vault service above this layer.
#[async_trait]
pub trait CredentialRepository: Send + Sync {
    /// Get the credential record for a user
    async fn get(&self, user_id: Uuid) -> Result<Option<MarketplaceCredential>>;

    /// Insert or replace the credential record for a user
    async fn upsert(&self, credential: MarketplaceCredential) -> Result<()>;

    /// Update only the connection status for a user
    async fn set_status(&self, user_id: Uuid, status: ConnectionStatus) -> Result<()>;
}

/// In-memory repository for credential records
pub struct InMemoryCredentialRepository {
    records: DashMap<Uuid, MarketplaceCredential>,
}

impl InMemoryCredentialRepository {
    /// Create a new in-memory credential repository
    pub fn new() -> Self {
        Self {
            records: DashMap::new(),
        }
    }
}

impl Default for InMemoryCredentialRepository {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl CredentialRepository for InMemoryCredentialRepository {
    async fn get(&self, user_id: Uuid) -> Result<Option<MarketplaceCredential>> {
        Ok(self.records.get(&user_id).map(|c| c.clone()))
    }

    async fn upsert(&self, credential: MarketplaceCredential) -> Result<()> {
        self.records.insert(credential.user_id, credential);
        Ok(())
    }

    async fn set_status(&self, user_id: Uuid, status: ConnectionStatus) -> Result<()> {
        match self.records.get_mut(&user_id) {
            Some(mut record) => {
                record.status = status;
                record.updated_at = Utc::now();
                Ok(())
            }
            None => Err(Error::CredentialNotFound(format!(
                "No credentials for user {}",
                user_id
            ))),
        }
    }
}

/// PostgreSQL repository for credential records
pub struct PostgresCredentialRepository {
    pool: PgPool,
}

impl PostgresCredentialRepository {
    /// Create a new PostgreSQL credential repository
    pub async fn new(database_url: Option<String>) -> Result<Self> {
        let url = match database_url {
            Some(url) => url,
            None => std::env::var("DATABASE_URL")
                .map_err(|_| Error::Configuration("DATABASE_URL must be set".to_string()))?,
        };

        let pool = PgPoolOptions::new()
            .max_connections(5)
            .connect(&url)
            .await
            .map_err(Error::Database)?;

        info!("Credential repository connected to PostgreSQL");
        Ok(Self { pool })
    }

    /// Create a repository over an existing pool
    pub fn with_pool(pool: PgPool) -> Self {
        Self { pool }
    }

    fn row_to_credential(row: &sqlx::postgres::PgRow) -> Result<MarketplaceCredential> {
        let status: String = row.get("status");
        Ok(MarketplaceCredential {
            user_id: row.get("user_id"),
            app_id: row.get("app_id"),
            client_secret_enc: row.get("client_secret_enc"),
            dev_id: row.get("dev_id"),
            refresh_token_enc: row.get("refresh_token_enc"),
            access_token_enc: row.get("access_token_enc"),
            access_token_expires_at: row.get::<Option<DateTime<Utc>>, _>("access_token_expires_at"),
            marketplace_username: row.get("marketplace_username"),
            status: ConnectionStatus::parse(&status)?,
            created_at: row.get("created_at"),
            updated_at: row.get("updated_at"),
        })
    }
}

#[async_trait]
impl CredentialRepository for PostgresCredentialRepository {
    async fn get(&self, user_id: Uuid) -> Result<Option<MarketplaceCredential>> {
        debug!("Getting credentials for user {}", user_id);

        let row = sqlx::query(
            "SELECT user_id, app_id, client_secret_enc, dev_id, refresh_token_enc,
                    access_token_enc, access_token_expires_at, marketplace_username,
                    status, created_at, updated_at
             FROM marketplace_credentials
             WHERE user_id = $1",
        )
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some(row) => Ok(Some(Self::row_to_credential(&row)?)),
            None => Ok(None),
        }
    }

    async fn upsert(&self, credential: MarketplaceCredential) -> Result<()> {
        debug!("Upserting credentials for user {}", credential.user_id);

        sqlx::query(
            "INSERT INTO marketplace_credentials
                (user_id, app_id, client_secret_enc, dev_id, refresh_token_enc,
                 access_token_enc, access_token_expires_at, marketplace_username,
                 status, created_at, updated_at)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
             ON CONFLICT (user_id)
             DO UPDATE SET
                app_id = $2,
                client_secret_enc = $3,
                dev_id = $4,
                refresh_token_enc = $5,
                access_token_enc = $6,
                access_token_expires_at = $7,
                marketplace_username = $8,
                status = $9,
                updated_at = $11",
        )
        .bind(credential.user_id)
        .bind(&credential.app_id)
        .bind(&credential.client_secret_enc)
        .bind(&credential.dev_id)
        .bind(&credential.refresh_token_enc)
        .bind(&credential.access_token_enc)
        .bind(credential.access_token_expires_at)
        .bind(&credential.marketplace_username)
        .bind(credential.status.as_str())
        .bind(credential.created_at)
        .bind(Utc::now())
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn set_status(&self, user_id: Uuid, status: ConnectionStatus) -> Result<()> {
        debug!("Setting connection status {} for user {}", status.as_str(), user_id);

        let result = sqlx::query(
            "UPDATE marketplace_credentials SET status = $2, updated_at = $3 WHERE user_id = $1",
        )
        .bind(user_id)
        .bind(status.as_str())
        .bind(Utc::now())
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(Error::CredentialNotFound(format!(
                "No credentials for user {}",
                user_id
            )));
        }
        Ok(())
    }
}
