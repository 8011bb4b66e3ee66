//! Token endpoint fetcher.
//!
//! Fetches user tokens from the application's own token endpoint, the usual
//! deployment where the app backend mints coordinator tokens for its users.
//!
//! ```text
//! GET {endpoint}?user_id=<id>
//! 200 {"token": "<jwt>", "expires_in": 3600}
//! ```
//!
//! Plug it into [`CachedCredentialProvider`](crate::credentials::CachedCredentialProvider)
//! to get caching and refresh-on-rejection.
//!
//! # Security
//!
//! - Issued tokens are wrapped in `SecretString` immediately
//! - Response bodies of rejections are only logged at trace level
//! - HTTP timeouts prevent hanging connections

use crate::credentials::{Credential, CredentialError, CredentialFetcher};
use crate::secret::SecretString;
use crate::types::UserId;
use async_trait::async_trait;
use serde::Deserialize;
use std::time::Duration;
use tracing::{debug, instrument, trace, warn};

/// Default HTTP request timeout.
pub const DEFAULT_HTTP_TIMEOUT: Duration = Duration::from_secs(10);

/// Default connection timeout for HTTP client.
const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

/// Token response from the endpoint.
#[derive(Deserialize)]
struct TokenResponse {
    token: String,
    #[serde(default)]
    expires_in: Option<u64>,
}

impl std::fmt::Debug for TokenResponse {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenResponse")
            .field("token", &"[REDACTED]")
            .field("expires_in", &self.expires_in)
            .finish()
    }
}

/// Fetches tokens for one user from an HTTP token endpoint.
#[derive(Debug, Clone)]
pub struct HttpTokenFetcher {
    endpoint: String,
    user_id: UserId,
    http_client: reqwest::Client,
}

impl HttpTokenFetcher {
    /// Create a fetcher.
    ///
    /// # Errors
    ///
    /// Returns `CredentialError::Configuration` if the HTTP client cannot be built.
    pub fn new(endpoint: String, user_id: UserId) -> Result<Self, CredentialError> {
        Self::with_timeout(endpoint, user_id, DEFAULT_HTTP_TIMEOUT)
    }

    /// Create a fetcher with a custom request timeout.
    ///
    /// # Errors
    ///
    /// Returns `CredentialError::Configuration` if the HTTP client cannot be built.
    pub fn with_timeout(
        endpoint: String,
        user_id: UserId,
        timeout: Duration,
    ) -> Result<Self, CredentialError> {
        let http_client = reqwest::Client::builder()
            .timeout(timeout)
            .connect_timeout(DEFAULT_CONNECT_TIMEOUT)
            .build()
            .map_err(|e| {
                CredentialError::Configuration(format!("Failed to build HTTP client: {e}"))
            })?;

        Ok(Self {
            endpoint,
            user_id,
            http_client,
        })
    }
}

#[async_trait]
impl CredentialFetcher for HttpTokenFetcher {
    #[instrument(skip_all, fields(user_id = %self.user_id))]
    async fn fetch(&self) -> Result<Credential, CredentialError> {
        debug!(
            target: "common.token_endpoint",
            endpoint = %self.endpoint,
            "Requesting user token"
        );

        let response = self
            .http_client
            .get(&self.endpoint)
            .query(&[("user_id", self.user_id.as_str())])
            .send()
            .await
            .map_err(|e| {
                debug!(target: "common.token_endpoint", error = %e, "HTTP request failed");
                CredentialError::AcquisitionFailed(e.to_string())
            })?;

        let status = response.status();

        if status.is_success() {
            let body: TokenResponse = response.json().await.map_err(|e| {
                warn!(target: "common.token_endpoint", error = %e, "Failed to parse token response");
                CredentialError::InvalidResponse(e.to_string())
            })?;

            if body.token.is_empty() {
                return Err(CredentialError::InvalidResponse(
                    "Token endpoint returned an empty token".into(),
                ));
            }

            let token = SecretString::from(body.token);
            Ok(match body.expires_in {
                Some(secs) => Credential::expiring(token, expiry_after(secs)?),
                None => Credential::non_expiring(token),
            })
        } else if status.as_u16() == 401 || status.as_u16() == 403 {
            let body = response.text().await.unwrap_or_else(|e| {
                trace!(target: "common.token_endpoint", error = %e, "Failed to read error response body");
                "<failed to read body>".to_string()
            });
            warn!(
                target: "common.token_endpoint",
                status = %status,
                "Token endpoint refused to issue a token"
            );
            trace!(
                target: "common.token_endpoint",
                body = %body,
                "Token rejection response body"
            );
            Err(CredentialError::AuthenticationRejected(format!(
                "Status {status}"
            )))
        } else {
            warn!(
                target: "common.token_endpoint",
                status = %status,
                "Unexpected response from token endpoint"
            );
            Err(CredentialError::AcquisitionFailed(format!(
                "Unexpected status: {status}"
            )))
        }
    }
}

/// Absolute expiry for a lifetime of `expires_in` seconds from now.
fn expiry_after(expires_in: u64) -> Result<chrono::DateTime<chrono::Utc>, CredentialError> {
    i64::try_from(expires_in)
        .ok()
        .and_then(chrono::Duration::try_seconds)
        .and_then(|lifetime| chrono::Utc::now().checked_add_signed(lifetime))
        .ok_or_else(|| {
            warn!(
                target: "common.token_endpoint",
                expires_in = expires_in,
                "Token lifetime out of range"
            );
            CredentialError::InvalidResponse(format!("expires_in out of range: {expires_in}"))
        })
}
