//! Request signing.
//!
//! Every backend call carries the user's current credential, the API key,
//! the live connection id (when a connection is open) and a fresh request id.
//! The credential is fetched before anything goes on the wire, so a
//! credential failure aborts the call with `Authentication` and no I/O.

use common::credentials::CredentialProvider;
use common::secret::SecretString;
use common::types::{ConnectionId, RequestId};
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

use crate::backend::RequestContext;
use crate::errors::CallError;

/// Builds [`RequestContext`]s.
#[derive(Clone)]
pub struct RequestSigner {
    credentials: Arc<dyn CredentialProvider>,
    api_key: SecretString,
}

impl RequestSigner {
    pub fn new(credentials: Arc<dyn CredentialProvider>, api_key: SecretString) -> Self {
        Self {
            credentials,
            api_key,
        }
    }

    /// Sign a request for `operation`.
    pub async fn sign(
        &self,
        operation: &'static str,
        connection_id: Option<ConnectionId>,
        deadline: Duration,
    ) -> Result<RequestContext, CallError> {
        let authorization = self.credentials.get_token().await.map_err(|e| {
            debug!(
                target: "call.session",
                operation = operation,
                error = %e,
                "Credential unavailable, request not sent"
            );
            CallError::from(e)
        })?;

        Ok(RequestContext {
            authorization,
            api_key: self.api_key.clone(),
            connection_id,
            request_id: RequestId::new(),
            deadline,
        })
    }

    /// Drop the cached credential after the coordinator rejected it.
    pub async fn invalidate_credential(&self) {
        self.credentials.invalidate().await;
    }
}
