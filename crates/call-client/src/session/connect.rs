//! Connection attempt loop.
//!
//! Runs in its own task so the actor stays responsive while waiting out a
//! backoff. Each attempt fetches the current credential, opens the transport
//! and is bounded by the policy's connect timeout. What happens after a
//! failure is entirely the [`RetryPolicy`]'s call.

use common::credentials::CredentialProvider;
use common::secret::SecretString;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

use super::messages::EstablishedLink;
use crate::errors::CallError;
use crate::models::User;
use crate::observability::metrics;
use crate::retry::{FailureKind, RetryDecision, RetryPolicy, TerminationReason};
use crate::transport::{ConnectRequest, Transport};

pub(super) struct ConnectAttempt {
    pub transport: Arc<dyn Transport>,
    pub credentials: Arc<dyn CredentialProvider>,
    pub api_key: SecretString,
    pub policy: RetryPolicy,
    pub user: User,
    /// Cancelled when the actor abandons this connection cycle.
    pub cancel: CancellationToken,
    /// Wait this long before the first attempt.
    pub initial_delay: Duration,
    /// Attempts already counted against the policy in this cycle.
    pub attempts_made: u32,
    /// Whether the credential was already refreshed for this cycle.
    pub credential_refreshed: bool,
}

fn cancelled() -> CallError {
    CallError::transport("connection attempt cancelled", false)
}

fn outcome_label(kind: FailureKind) -> &'static str {
    match kind {
        FailureKind::Network => "network",
        FailureKind::Authentication { .. } => "authentication",
        FailureKind::Rejected => "rejected",
    }
}

impl ConnectAttempt {
    /// Try until connected, cancelled or the policy gives up.
    #[instrument(skip_all, name = "call.session.connect", fields(user_id = %self.user.id))]
    pub(super) async fn run(mut self) -> Result<EstablishedLink, CallError> {
        let mut delay = self.initial_delay;
        let mut attempt = self.attempts_made;

        loop {
            if !delay.is_zero() {
                debug!(
                    target: "call.retry",
                    delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
                    next_attempt = attempt.saturating_add(1),
                    "Waiting before connection attempt"
                );
                tokio::select! {
                    () = self.cancel.cancelled() => return Err(cancelled()),
                    () = tokio::time::sleep(delay) => {}
                }
            }

            attempt = attempt.saturating_add(1);

            let outcome = tokio::select! {
                () = self.cancel.cancelled() => return Err(cancelled()),
                outcome = tokio::time::timeout(self.policy.connect_timeout(), self.attempt_once()) => outcome,
            };

            let err = match outcome {
                Ok(Ok(established)) => {
                    metrics::record_connection_attempt("success");
                    info!(
                        target: "call.session",
                        attempt = attempt,
                        connection_id = %established.link.connection_id,
                        "Coordinator connection established"
                    );
                    return Ok(established);
                }
                Ok(Err(err)) => {
                    metrics::record_connection_attempt(outcome_label(
                        err.failure_kind(self.credential_refreshed),
                    ));
                    err
                }
                Err(_elapsed) => {
                    metrics::record_connection_attempt("timeout");
                    CallError::transport("connection attempt timed out", true)
                }
            };

            let reason = TerminationReason::Error(err.failure_kind(self.credential_refreshed));
            match self.policy.decide(attempt, &reason) {
                RetryDecision::RetryAfter(next_delay) => {
                    warn!(
                        target: "call.retry",
                        error = %err,
                        attempt = attempt,
                        delay_ms = u64::try_from(next_delay.as_millis()).unwrap_or(u64::MAX),
                        "Connection attempt failed, retrying"
                    );
                    delay = next_delay;
                }
                RetryDecision::RefreshCredentialAndRetry => {
                    warn!(
                        target: "call.retry",
                        attempt = attempt,
                        "Credential rejected, refreshing before retry"
                    );
                    self.credentials.invalidate().await;
                    metrics::record_credential_refresh("connect");
                    self.credential_refreshed = true;
                    delay = Duration::ZERO;
                }
                RetryDecision::GiveUp => {
                    warn!(
                        target: "call.retry",
                        error = %err,
                        attempts = attempt,
                        reason = reason.as_str(),
                        "Giving up on coordinator connection"
                    );
                    return Err(err);
                }
            }
        }
    }

    async fn attempt_once(&self) -> Result<EstablishedLink, CallError> {
        let credential = self.credentials.get_token().await?;
        let shutdown = self.cancel.child_token();

        let opened = self
            .transport
            .open(ConnectRequest {
                user: self.user.clone(),
                credential,
                api_key: self.api_key.clone(),
                shutdown: shutdown.clone(),
            })
            .await;

        match opened {
            Ok(link) => Ok(EstablishedLink { link, shutdown }),
            Err(err) => {
                shutdown.cancel();
                Err(err)
            }
        }
    }
}
