//! OAuth2 token lifecycle manager
//!
//! Drives the authorization-code-with-PKCE exchange and keeps access
//! tokens fresh. Per user connection the state machine is
//! `Disconnected -> Authorizing -> Connected -> (Expired | Disconnected)`:
//! authorization issues a single-use state token bound to a PKCE
//! verifier, the callback consumes it (constant-time compared, TTL
//! bounded), and every authenticated call goes through
//! [`TokenManager::access_token`], which refreshes inside a safety margin
//! and marks the connection expired when the refresh token is rejected.

use std::sync::Arc;

use async_trait::async_trait;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use chrono::{DateTime, Duration, Utc};
use common::error::{Error, Result};
use common::model::credential::{ConnectionInfo, ConnectionStatus};
use credential_vault::{CredentialVault, TokenSet};
use dashmap::DashMap;
use rand::RngCore;
use sha2::{Digest, Sha256};
use tracing::{debug, info, warn};
use url::Url;
use uuid::Uuid;

use crate::config::MarketplaceConfig;

/// Public client identification for token endpoint calls
#[derive(Debug, Clone)]
pub struct ClientKeys {
    /// Application id
    pub app_id: String,
    /// Application client secret
    pub client_secret: String,
}

/// Tokens granted by the authorization server
#[derive(Debug, Clone)]
pub struct TokenGrant {
    /// Bearer access token
    pub access_token: String,
    /// Seconds of validity
    pub expires_in_secs: i64,
    /// Refresh token, when the server rotates or first issues one
    pub refresh_token: Option<String>,
    /// Marketplace account name, when the server reports it
    pub marketplace_username: Option<String>,
}

/// Authorization-server operations used by the token manager
#[async_trait]
pub trait AuthApi: Send + Sync {
    /// Exchange an authorization code plus PKCE verifier for tokens
    async fn exchange_code(
        &self,
        keys: &ClientKeys,
        code: &str,
        verifier: &str,
        redirect_uri: &str,
    ) -> Result<TokenGrant>;

    /// Refresh an access token
    async fn refresh(&self, keys: &ClientKeys, refresh_token: &str) -> Result<TokenGrant>;

    /// Revoke a refresh token (best-effort)
    async fn revoke(&self, keys: &ClientKeys, refresh_token: &str) -> Result<()>;
}

/// What a user is redirected to when connecting the marketplace
#[derive(Debug, Clone)]
pub struct AuthorizationRequest {
    /// Full authorization URL including PKCE challenge and state
    pub url: String,
    /// The opaque state token the callback must present
    pub state: String,
}

/// A PKCE exchange awaiting its callback
struct PendingAuthorization {
    user_id: Uuid,
    state: String,
    verifier: String,
    created_at: DateTime<Utc>,
}

/// Compare two byte strings without early exit.
///
/// The state token is an unguessable capability; comparison must not
/// leak a prefix-length timing signal.
fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    let mut diff = 0u8;
    for (x, y) in a.iter().zip(b.iter()) {
        diff |= x ^ y;
    }
    diff == 0
}

fn random_urlsafe(bytes: usize) -> String {
    let mut buf = vec![0u8; bytes];
    rand::thread_rng().fill_bytes(&mut buf);
    URL_SAFE_NO_PAD.encode(buf)
}

/// S256 code challenge for a PKCE verifier
fn pkce_challenge(verifier: &str) -> String {
    let digest = Sha256::digest(verifier.as_bytes());
    URL_SAFE_NO_PAD.encode(digest)
}

/// Manages OAuth tokens for every user connection
pub struct TokenManager {
    vault: Arc<CredentialVault>,
    auth: Arc<dyn AuthApi>,
    config: MarketplaceConfig,
    pending: DashMap<String, PendingAuthorization>,
}

impl TokenManager {
    /// Create a token manager over the vault and an authorization server
    pub fn new(vault: Arc<CredentialVault>, auth: Arc<dyn AuthApi>, config: MarketplaceConfig) -> Self {
        Self {
            vault,
            auth,
            config,
            pending: DashMap::new(),
        }
    }

    /// Start the authorization flow for a user.
    ///
    /// Generates a PKCE verifier/challenge pair and a single-use state
    /// token, and returns the URL to send the user to. Requires
    /// developer keys already in the vault.
    pub async fn begin_authorization(&self, user_id: Uuid) -> Result<AuthorizationRequest> {
        self.purge_expired_pending();

        let credential = self.vault.unseal(user_id).await?;
        let verifier = random_urlsafe(32);
        let challenge = pkce_challenge(&verifier);
        let state = random_urlsafe(24);

        let mut url = Url::parse(&self.config.authorize_url)
            .map_err(|e| Error::Configuration(format!("Bad authorize URL: {}", e)))?;
        url.query_pairs_mut()
            .append_pair("client_id", &credential.app_id)
            .append_pair("redirect_uri", &self.config.redirect_uri)
            .append_pair("response_type", "code")
            .append_pair("scope", &self.config.scopes)
            .append_pair("state", &state)
            .append_pair("code_challenge", &challenge)
            .append_pair("code_challenge_method", "S256");

        self.pending.insert(
            state.clone(),
            PendingAuthorization {
                user_id,
                state: state.clone(),
                verifier,
                created_at: Utc::now(),
            },
        );

        info!("Issued authorization request for user {}", user_id);
        Ok(AuthorizationRequest {
            url: url.to_string(),
            state,
        })
    }

    /// Complete the authorization flow from the marketplace callback.
    ///
    /// The state is matched in constant time and consumed on first use;
    /// an expired or unknown state is rejected outright. On success the
    /// exchanged tokens are stored encrypted and the connection is
    /// marked connected. Returns the user the connection belongs to.
    pub async fn handle_callback(&self, code: &str, state: &str) -> Result<Uuid> {
        self.purge_expired_pending();

        let matched_key = self
            .pending
            .iter()
            .find(|entry| constant_time_eq(entry.value().state.as_bytes(), state.as_bytes()))
            .map(|entry| entry.key().clone());

        let pending = matched_key
            .and_then(|key| self.pending.remove(&key))
            .map(|(_, pending)| pending)
            .ok_or_else(|| Error::Auth("Unknown or already-used authorization state".to_string()))?;

        if Utc::now() - pending.created_at > Duration::seconds(self.config.state_ttl_secs) {
            return Err(Error::Auth("Authorization state expired".to_string()));
        }

        let credential = self.vault.unseal(pending.user_id).await?;
        let keys = ClientKeys {
            app_id: credential.app_id,
            client_secret: credential.client_secret,
        };

        let grant = self
            .auth
            .exchange_code(&keys, code, &pending.verifier, &self.config.redirect_uri)
            .await?;

        self.vault
            .store_tokens(
                pending.user_id,
                TokenSet {
                    access_token: grant.access_token,
                    access_token_expires_at: Utc::now() + Duration::seconds(grant.expires_in_secs),
                    refresh_token: grant.refresh_token,
                },
                grant.marketplace_username,
            )
            .await?;

        info!("Marketplace connection established for user {}", pending.user_id);
        Ok(pending.user_id)
    }

    /// A valid access token for the user, refreshed if needed.
    ///
    /// Refreshes when less than the configured safety margin of validity
    /// remains. A rejected refresh marks the connection expired and
    /// surfaces `Error::Auth` so callers prompt reconnection instead of
    /// retrying forever.
    pub async fn access_token(&self, user_id: Uuid) -> Result<String> {
        let credential = self.vault.unseal(user_id).await?;

        match credential.status {
            ConnectionStatus::Connected => {}
            ConnectionStatus::Expired => {
                return Err(Error::Auth(format!(
                    "Marketplace connection for user {} is expired; reconnect required",
                    user_id
                )))
            }
            ConnectionStatus::Disconnected => {
                return Err(Error::Auth(format!(
                    "User {} has no marketplace connection",
                    user_id
                )))
            }
        }

        let margin = Duration::seconds(self.config.refresh_margin_secs);
        if let (Some(token), Some(expires_at)) =
            (credential.access_token.as_ref(), credential.access_token_expires_at)
        {
            if expires_at - Utc::now() > margin {
                return Ok(token.clone());
            }
        }

        let refresh_token = credential.refresh_token.ok_or_else(|| {
            Error::Auth(format!("User {} has no refresh token on file", user_id))
        })?;
        let keys = ClientKeys {
            app_id: credential.app_id,
            client_secret: credential.client_secret,
        };

        debug!("Refreshing access token for user {}", user_id);
        match self.auth.refresh(&keys, &refresh_token).await {
            Ok(grant) => {
                let expires_at = Utc::now() + Duration::seconds(grant.expires_in_secs);
                self.vault
                    .rotate_access_token(user_id, &grant.access_token, expires_at)
                    .await?;
                if let Some(new_refresh) = grant.refresh_token.as_deref() {
                    self.vault.rotate_refresh_token(user_id, new_refresh).await?;
                }
                Ok(grant.access_token)
            }
            Err(e) if e.is_auth() => {
                warn!("Refresh token rejected for user {}; marking connection expired", user_id);
                self.vault
                    .mark_status(user_id, ConnectionStatus::Expired)
                    .await?;
                Err(Error::Auth(format!(
                    "Refresh token for user {} was revoked; reconnect required",
                    user_id
                )))
            }
            Err(e) => Err(e),
        }
    }

    /// Disconnect a user: invalidate tokens locally at once, revoke
    /// upstream best-effort, keep developer keys for a later reconnect.
    pub async fn disconnect(&self, user_id: Uuid) -> Result<()> {
        let credential = self.vault.unseal(user_id).await?;

        if let Some(refresh_token) = credential.refresh_token.as_deref() {
            let keys = ClientKeys {
                app_id: credential.app_id.clone(),
                client_secret: credential.client_secret.clone(),
            };
            if let Err(e) = self.auth.revoke(&keys, refresh_token).await {
                warn!("Upstream revocation failed for user {}: {}", user_id, e);
            }
        }

        self.vault.clear_tokens(user_id).await?;
        info!("Marketplace connection removed for user {}", user_id);
        Ok(())
    }

    /// The secret-free connection projection for a user
    pub async fn connection_status(&self, user_id: Uuid) -> Result<Option<ConnectionInfo>> {
        self.vault.connection_info(user_id).await
    }

    fn purge_expired_pending(&self) {
        let ttl = Duration::seconds(self.config.state_ttl_secs);
        let now = Utc::now();
        self.pending.retain(|_, pending| now - pending.created_at <= ttl);
    }
}

/// HTTP client for the marketplace authorization server
pub struct HttpAuthClient {
    http: reqwest::Client,
    token_url: String,
    revoke_url: String,
}

impl HttpAuthClient {
    /// Create a client from the marketplace configuration
    pub fn new(config: &MarketplaceConfig) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(config.http_timeout_secs))
            .build()
            .map_err(|e| Error::Configuration(format!("Failed to build HTTP client: {}", e)))?;
        // Revocation lives next to the token endpoint
        let revoke_url = format!("{}/revoke", config.token_url.trim_end_matches("/token"));
        Ok(Self {
            http,
            token_url: config.token_url.clone(),
            revoke_url,
        })
    }

    async fn token_request(&self, keys: &ClientKeys, form: &[(&str, &str)]) -> Result<TokenGrant> {
        let response = self
            .http
            .post(&self.token_url)
            .basic_auth(&keys.app_id, Some(&keys.client_secret))
            .form(form)
            .send()
            .await
            .map_err(|e| Error::Transient(format!("Token endpoint unreachable: {}", e)))?;

        let status = response.status();
        if status.is_success() {
            let parsed: crate::types::TokenResponse = response
                .json()
                .await
                .map_err(|e| Error::Transient(format!("Malformed token response: {}", e)))?;
            return Ok(TokenGrant {
                access_token: parsed.access_token,
                expires_in_secs: parsed.expires_in,
                refresh_token: parsed.refresh_token,
                marketplace_username: parsed.marketplace_username,
            });
        }

        let body = response.text().await.unwrap_or_default();
        if status.as_u16() == 400 || status.as_u16() == 401 {
            // invalid_grant / invalid_client: the credential is bad, not the network
            Err(Error::Auth(format!("Token endpoint returned {}: {}", status, body)))
        } else {
            Err(Error::Transient(format!(
                "Token endpoint returned {}: {}",
                status, body
            )))
        }
    }
}

#[async_trait]
impl AuthApi for HttpAuthClient {
    async fn exchange_code(
        &self,
        keys: &ClientKeys,
        code: &str,
        verifier: &str,
        redirect_uri: &str,
    ) -> Result<TokenGrant> {
        self.token_request(
            keys,
            &[
                ("grant_type", "authorization_code"),
                ("code", code),
                ("redirect_uri", redirect_uri),
                ("code_verifier", verifier),
            ],
        )
        .await
    }

    async fn refresh(&self, keys: &ClientKeys, refresh_token: &str) -> Result<TokenGrant> {
        self.token_request(
            keys,
            &[
                ("grant_type", "refresh_token"),
                ("refresh_token", refresh_token),
            ],
        )
        .await
    }

    async fn revoke(&self, keys: &ClientKeys, refresh_token: &str) -> Result<()> {
        self.http
            .post(&self.revoke_url)
            .basic_auth(&keys.app_id, Some(&keys.client_secret))
            .form(&[("token", refresh_token)])
            .send()
            .await
            .map_err(|e| Error::Transient(format!("Revoke endpoint unreachable: {}", e)))?;
        Ok(())
    }
}

/// In-memory authorization server for tests.
///
/// Issues sequenced tokens, can be flipped to reject refreshes as
/// revoked, and exposes counters so tests can assert on silent
/// refreshes.
pub struct InMemoryAuthServer {
    revoked: std::sync::atomic::AtomicBool,
    issued: std::sync::atomic::AtomicU64,
    refresh_calls: std::sync::atomic::AtomicU64,
    expires_in_secs: std::sync::atomic::AtomicI64,
}

impl InMemoryAuthServer {
    /// Create a server issuing hour-long tokens
    pub fn new() -> Self {
        Self {
            revoked: std::sync::atomic::AtomicBool::new(false),
            issued: std::sync::atomic::AtomicU64::new(0),
            refresh_calls: std::sync::atomic::AtomicU64::new(0),
            expires_in_secs: std::sync::atomic::AtomicI64::new(3600),
        }
    }

    /// Make future tokens expire this quickly
    pub fn set_expires_in_secs(&self, secs: i64) {
        self.expires_in_secs.store(secs, std::sync::atomic::Ordering::SeqCst);
    }

    /// Reject all further refreshes as revoked
    pub fn revoke_refresh_tokens(&self) {
        self.revoked.store(true, std::sync::atomic::Ordering::SeqCst);
    }

    /// Number of refresh calls observed
    pub fn refresh_calls(&self) -> u64 {
        self.refresh_calls.load(std::sync::atomic::Ordering::SeqCst)
    }

    fn grant(&self) -> TokenGrant {
        let n = self.issued.fetch_add(1, std::sync::atomic::Ordering::SeqCst) + 1;
        TokenGrant {
            access_token: format!("access-{}", n),
            expires_in_secs: self.expires_in_secs.load(std::sync::atomic::Ordering::SeqCst),
            refresh_token: Some(format!("refresh-{}", n)),
            marketplace_username: Some("test-seller".to_string()),
        }
    }
}

impl Default for InMemoryAuthServer {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl AuthApi for InMemoryAuthServer {
    async fn exchange_code(
        &self,
        _keys: &ClientKeys,
        code: &str,
        verifier: &str,
        _redirect_uri: &str,
    ) -> Result<TokenGrant> {
        if code.is_empty() || verifier.is_empty() {
            return Err(Error::Auth("invalid_grant".to_string()));
        }
        Ok(self.grant())
    }

    async fn refresh(&self, _keys: &ClientKeys, _refresh_token: &str) -> Result<TokenGrant> {
        self.refresh_calls.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
        if self.revoked.load(std::sync::atomic::Ordering::SeqCst) {
            return Err(Error::Auth("invalid_grant: token revoked".to_string()));
        }
        Ok(self.grant())
    }

    async fn revoke(&self, _keys: &ClientKeys, _refresh_token: &str) -> Result<()> {
        self.revoked.store(true, std::sync::atomic::Ordering::SeqCst);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn challenge_is_deterministic() {
        let a = pkce_challenge("some-verifier");
        let b = pkce_challenge("some-verifier");
        assert_eq!(a, b);
        assert_ne!(a, pkce_challenge("other-verifier"));
    }

    #[test]
    fn challenge_is_urlsafe_unpadded() {
        let challenge = pkce_challenge("verifier");
        assert!(!challenge.contains('='));
        assert!(!challenge.contains('+'));
        assert!(!challenge.contains('/'));
        // SHA-256 digest encodes to 43 base64url characters
        assert_eq!(challenge.len(), 43);
    }

    #[test]
    fn constant_time_eq_basic() {
        assert!(constant_time_eq(b"abc", b"abc"));
        assert!(!constant_time_eq(b"abc", b"abd"));
        assert!(!constant_time_eq(b"abc", b"abcd"));
    }
}
