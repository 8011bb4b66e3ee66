//! Credential provider abstraction.
//!
//! The call client never stores or refreshes user tokens itself. It asks a
//! [`CredentialProvider`] for "the current valid credential" before every
//! backend call and before every connection attempt, and calls
//! [`CredentialProvider::invalidate`] when the coordinator rejects a token so
//! the next request fetches a fresh one.
//!
//! # Providers
//!
//! - [`StaticCredentialProvider`]: a fixed token (tests, long-lived dev tokens)
//! - [`CachedCredentialProvider`]: wraps a [`CredentialFetcher`], reuses the
//!   token until it is close to expiry and single-flights refreshes
//!
//! # Security
//!
//! - Tokens are held as `SecretString` and never logged
//! - Refresh events are logged without values

use crate::secret::SecretString;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::Mutex;
use tracing::{debug, info, instrument, warn};

/// Default refresh threshold (refetch this long before expiration).
pub const DEFAULT_REFRESH_THRESHOLD: Duration = Duration::from_secs(60);

// =============================================================================
// Error Types
// =============================================================================

/// Errors that can occur while producing a credential.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CredentialError {
    /// Token acquisition failed (network, endpoint down).
    #[error("Token acquisition failed: {0}")]
    AcquisitionFailed(String),

    /// The token endpoint refused to issue a token.
    #[error("Authentication rejected: {0}")]
    AuthenticationRejected(String),

    /// Token response parsing failed.
    #[error("Invalid token response: {0}")]
    InvalidResponse(String),

    /// Configuration error.
    #[error("Configuration error: {0}")]
    Configuration(String),
}

// =============================================================================
// Credential
// =============================================================================

/// A user token plus its expiry, if known.
#[derive(Clone)]
pub struct Credential {
    /// The bearer token.
    pub token: SecretString,
    /// When the token stops being accepted. `None` means it does not expire.
    pub expires_at: Option<DateTime<Utc>>,
}

impl Credential {
    /// Create a credential that never expires.
    #[must_use]
    pub fn non_expiring(token: SecretString) -> Self {
        Self {
            token,
            expires_at: None,
        }
    }

    /// Create a credential that expires at `expires_at`.
    #[must_use]
    pub fn expiring(token: SecretString, expires_at: DateTime<Utc>) -> Self {
        Self {
            token,
            expires_at: Some(expires_at),
        }
    }

    /// Whether the credential is still usable at `now`, keeping `threshold`
    /// of headroom before expiry.
    #[must_use]
    pub fn is_fresh_at(&self, now: DateTime<Utc>, threshold: Duration) -> bool {
        match self.expires_at {
            None => true,
            Some(expires_at) => {
                let headroom = chrono::Duration::from_std(threshold)
                    .unwrap_or_else(|_| chrono::Duration::zero());
                expires_at - headroom > now
            }
        }
    }
}

impl std::fmt::Debug for Credential {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credential")
            .field("token", &"[REDACTED]")
            .field("expires_at", &self.expires_at)
            .finish()
    }
}

// =============================================================================
// Traits
// =============================================================================

/// Produces the current valid credential for the bound user.
#[async_trait]
pub trait CredentialProvider: Send + Sync {
    /// Return a token that is valid right now.
    async fn get_token(&self) -> Result<SecretString, CredentialError>;

    /// Drop any cached token so the next `get_token` fetches a new one.
    ///
    /// Called after the coordinator rejects a token. The default does nothing,
    /// which is right for providers without a cache.
    async fn invalidate(&self) {}
}

/// Fetches a brand-new credential from wherever tokens are issued.
#[async_trait]
pub trait CredentialFetcher: Send + Sync {
    /// Fetch a new credential.
    async fn fetch(&self) -> Result<Credential, CredentialError>;
}

// =============================================================================
// Static Provider
// =============================================================================

/// Provider that always returns the same token.
#[derive(Clone)]
pub struct StaticCredentialProvider {
    token: SecretString,
}

impl StaticCredentialProvider {
    /// Create a provider for a fixed token.
    #[must_use]
    pub fn new(token: SecretString) -> Self {
        Self { token }
    }
}

impl std::fmt::Debug for StaticCredentialProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StaticCredentialProvider")
            .field("token", &"[REDACTED]")
            .finish()
    }
}

#[async_trait]
impl CredentialProvider for StaticCredentialProvider {
    async fn get_token(&self) -> Result<SecretString, CredentialError> {
        Ok(self.token.clone())
    }
}

// =============================================================================
// Cached Provider
// =============================================================================

/// Provider that caches a fetched credential until it nears expiry.
///
/// The cache lock is held across the fetch, so concurrent callers that find
/// the cache empty wait for one fetch instead of issuing several.
pub struct CachedCredentialProvider {
    fetcher: Arc<dyn CredentialFetcher>,
    refresh_threshold: Duration,
    cached: Mutex<Option<Credential>>,
}

impl CachedCredentialProvider {
    /// Create a caching provider with the default refresh threshold.
    #[must_use]
    pub fn new(fetcher: Arc<dyn CredentialFetcher>) -> Self {
        Self {
            fetcher,
            refresh_threshold: DEFAULT_REFRESH_THRESHOLD,
            cached: Mutex::new(None),
        }
    }

    /// Set the refresh threshold.
    #[must_use]
    pub fn with_refresh_threshold(mut self, threshold: Duration) -> Self {
        self.refresh_threshold = threshold;
        self
    }
}

impl std::fmt::Debug for CachedCredentialProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CachedCredentialProvider")
            .field("refresh_threshold", &self.refresh_threshold)
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl CredentialProvider for CachedCredentialProvider {
    #[instrument(skip_all)]
    async fn get_token(&self) -> Result<SecretString, CredentialError> {
        let mut cached = self.cached.lock().await;

        if let Some(credential) = cached.as_ref() {
            if credential.is_fresh_at(Utc::now(), self.refresh_threshold) {
                return Ok(credential.token.clone());
            }
            debug!(
                target: "common.credentials",
                "Cached token is near expiry, fetching a new one"
            );
        }

        match self.fetcher.fetch().await {
            Ok(credential) => {
                info!(
                    target: "common.credentials",
                    expires_at = ?credential.expires_at,
                    "Token acquired"
                );
                let token = credential.token.clone();
                *cached = Some(credential);
                Ok(token)
            }
            Err(e) => {
                warn!(
                    target: "common.credentials",
                    error = %e,
                    "Token acquisition failed"
                );
                Err(e)
            }
        }
    }

    async fn invalidate(&self) {
        debug!(target: "common.credentials", "Invalidating cached token");
        *self.cached.lock().await = None;
    }
}

// =============================================================================
// Tests
// =============================================================================
