//! Encrypted storage for per-user marketplace credentials

pub mod config;
pub mod crypto;
pub mod repository;
pub mod service;

pub use config::VaultConfig;
pub use repository::{CredentialRepository, InMemoryCredentialRepository, PostgresCredentialRepository};
pub use service::{CredentialVault, DeveloperKeys, TokenSet, UnsealedCredential};
