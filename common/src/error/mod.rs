//! Error types for the repricing engine
//!
//! This module provides a unified error handling system for all crates in
//! the workspace. The variants mirror the failure taxonomy the scheduler
//! and synchronizer act on: validation failures are rejected before any
//! external call, auth failures surface reconnection, marketplace
//! rejections are terminal for the cycle, transient failures are retried,
//! and conflicts are skipped.

use std::fmt::Display;
use thiserror::Error;

/// Repricing engine error type
#[derive(Debug, Error)]
pub enum Error {
    /// Bad strategy magnitude, floor above original price, or other input
    /// rejected before any external call
    #[error("Validation error: {0}")]
    Validation(String),

    /// Token expired or revoked; the connection needs to be re-established
    #[error("Authentication error: {0}")]
    Auth(String),

    /// Business-rule rejection from the marketplace (4xx); not retried
    #[error("Marketplace rejected the request: {0}")]
    MarketplaceRejection(String),

    /// Timeout, rate limit, or 5xx; retried with backoff and then
    /// deferred to the next cycle
    #[error("Transient failure: {0}")]
    Transient(String),

    /// Optimistic-concurrency version mismatch; the losing writer skips
    #[error("Concurrent update conflict: {0}")]
    Conflict(String),

    /// Error when a listing cannot be found
    #[error("Listing not found: {0}")]
    ListingNotFound(String),

    /// Error when a strategy cannot be found
    #[error("Strategy not found: {0}")]
    StrategyNotFound(String),

    /// Error when no marketplace credentials exist for a user
    #[error("Credentials not found: {0}")]
    CredentialNotFound(String),

    /// Error when deleting a strategy still referenced by listings
    #[error("Strategy in use: {0}")]
    StrategyInUse(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Encryption or decryption failure in the credential vault
    #[error("Crypto error: {0}")]
    Crypto(String),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),

    /// Database error
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Database migration error
    #[error("Migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    /// Serialization/deserialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Decimal conversion error
    #[error("Decimal conversion error: {0}")]
    DecimalError(String),
}

impl Error {
    /// Whether the failure is worth retrying with backoff
    pub fn is_transient(&self) -> bool {
        matches!(self, Error::Transient(_))
    }

    /// Whether the failure requires the user to reconnect the marketplace
    pub fn is_auth(&self) -> bool {
        matches!(self, Error::Auth(_))
    }

    /// Whether the failure came from a concurrent writer winning the race
    pub fn is_conflict(&self) -> bool {
        matches!(self, Error::Conflict(_))
    }
}

/// Result type alias
pub type Result<T> = std::result::Result<T, Error>;

/// Extension trait to add context to error results
pub trait ErrorExt<T> {
    /// Add context information to an error
    fn with_context<C, F>(self, context_fn: F) -> Result<T>
    where
        F: FnOnce() -> C,
        C: Display;
}

impl<T> ErrorExt<T> for Result<T> {
    fn with_context<C, F>(self, context_fn: F) -> Result<T>
    where
        F: FnOnce() -> C,
        C: Display,
    {
        self.map_err(|e| {
            let context = context_fn().to_string();
            match e {
                Error::Validation(msg) => Error::Validation(format!("{}: {}", context, msg)),
                Error::Auth(msg) => Error::Auth(format!("{}: {}", context, msg)),
                Error::MarketplaceRejection(msg) => Error::MarketplaceRejection(format!("{}: {}", context, msg)),
                Error::Transient(msg) => Error::Transient(format!("{}: {}", context, msg)),
                Error::Conflict(msg) => Error::Conflict(format!("{}: {}", context, msg)),
                Error::ListingNotFound(msg) => Error::ListingNotFound(format!("{}: {}", context, msg)),
                Error::StrategyNotFound(msg) => Error::StrategyNotFound(format!("{}: {}", context, msg)),
                Error::CredentialNotFound(msg) => Error::CredentialNotFound(format!("{}: {}", context, msg)),
                Error::StrategyInUse(msg) => Error::StrategyInUse(format!("{}: {}", context, msg)),
                Error::Configuration(msg) => Error::Configuration(format!("{}: {}", context, msg)),
                Error::Crypto(msg) => Error::Crypto(format!("{}: {}", context, msg)),
                Error::Internal(msg) => Error::Internal(format!("{}: {}", context, msg)),
                Error::Database(e) => Error::Database(e),
                Error::Migration(e) => Error::Migration(e),
                Error::Serialization(e) => Error::Serialization(e),
                Error::DecimalError(msg) => Error::DecimalError(format!("{}: {}", context, msg)),
            }
        })
    }
}

/// Convert string messages into an error
impl From<String> for Error {
    fn from(message: String) -> Self {
        Error::Internal(message)
    }
}

/// Convert static string references into an error
impl From<&str> for Error {
    fn from(message: &str) -> Self {
        Error::Internal(message.to_string())
    }
}

/// From rust_decimal::Error
impl From<rust_decimal::Error> for Error {
    fn from(err: rust_decimal::Error) -> Self {
        Error::DecimalError(err.to_string())
    }
}
