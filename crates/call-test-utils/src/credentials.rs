//! Credential providers for tests.

use async_trait::async_trait;
use common::credentials::{CredentialError, CredentialProvider};
use common::secret::SecretString;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};

/// Hands out `token-1` until invalidated, then `token-2`, and so on.
///
/// Counts how often it was asked and invalidated, so tests can assert that a
/// rejection caused exactly one refresh.
#[derive(Debug)]
pub struct RotatingCredentialProvider {
    generation: AtomicU32,
    token_requests: AtomicU32,
    invalidations: AtomicU32,
    unavailable: AtomicBool,
}

impl Default for RotatingCredentialProvider {
    fn default() -> Self {
        Self::new()
    }
}

impl RotatingCredentialProvider {
    #[must_use]
    pub fn new() -> Self {
        Self {
            generation: AtomicU32::new(1),
            token_requests: AtomicU32::new(0),
            invalidations: AtomicU32::new(0),
            unavailable: AtomicBool::new(false),
        }
    }

    /// A provider whose `get_token` always fails.
    #[must_use]
    pub fn unavailable() -> Self {
        let provider = Self::new();
        provider.set_unavailable(true);
        provider
    }

    /// Toggle failure of `get_token`.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    /// The token `get_token` currently returns.
    #[must_use]
    pub fn current_token(&self) -> String {
        format!("token-{}", self.generation.load(Ordering::SeqCst))
    }

    #[must_use]
    pub fn token_requests(&self) -> u32 {
        self.token_requests.load(Ordering::SeqCst)
    }

    #[must_use]
    pub fn invalidations(&self) -> u32 {
        self.invalidations.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl CredentialProvider for RotatingCredentialProvider {
    async fn get_token(&self) -> Result<SecretString, CredentialError> {
        self.token_requests.fetch_add(1, Ordering::SeqCst);
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(CredentialError::AcquisitionFailed(
                "token service unavailable".into(),
            ));
        }
        Ok(SecretString::from(self.current_token()))
    }

    async fn invalidate(&self) {
        self.invalidations.fetch_add(1, Ordering::SeqCst);
        self.generation.fetch_add(1, Ordering::SeqCst);
    }
}
