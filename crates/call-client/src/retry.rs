//! Reconnect policy for the coordinator transport.
//!
//! [`RetryPolicy`] is stateless: the connect loop owns the attempt counter and
//! asks the policy what to do after each failure.
//!
//! - Network failures back off exponentially (`base * 2^(attempt-1)`, capped)
//! - Normal closes and explicit cancels never retry
//! - Authentication failures are never retried with the same credential: the
//!   first one asks for a fresh credential and an immediate retry, a second
//!   one with an already refreshed credential gives up
//! - Non-auth rejections give up

use rand::Rng;
use std::time::Duration;

/// Default base delay for exponential backoff.
pub const DEFAULT_BASE_DELAY: Duration = Duration::from_millis(250);

/// Default maximum backoff delay.
pub const DEFAULT_MAX_DELAY: Duration = Duration::from_secs(30);

/// Default upper bound for a single connection attempt.
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Default maximum number of connection attempts.
pub const DEFAULT_MAX_ATTEMPTS: u32 = 8;

/// Why a connection attempt failed or a live connection ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    /// Network-level failure or timeout. Worth retrying.
    Network,
    /// The coordinator rejected the credential.
    Authentication {
        /// Whether the failing attempt already used a freshly fetched credential.
        credential_refreshed: bool,
    },
    /// The coordinator refused the connection for a non-auth reason.
    Rejected,
}

/// How a connection terminated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TerminationReason {
    /// The server closed the connection cleanly.
    NormalClose,
    /// The client closed the connection on purpose.
    Cancelled,
    /// The connection failed.
    Error(FailureKind),
}

impl TerminationReason {
    /// Label for logs and metrics.
    pub fn as_str(&self) -> &'static str {
        match self {
            TerminationReason::NormalClose => "normal_close",
            TerminationReason::Cancelled => "cancelled",
            TerminationReason::Error(FailureKind::Network) => "network",
            TerminationReason::Error(FailureKind::Authentication { .. }) => "authentication",
            TerminationReason::Error(FailureKind::Rejected) => "rejected",
        }
    }
}

/// What the connect loop should do next.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDecision {
    /// Wait, then try again with the current credential.
    RetryAfter(Duration),
    /// Fetch a fresh credential, then try again immediately.
    RefreshCredentialAndRetry,
    /// Stop trying.
    GiveUp,
}

/// Capped exponential backoff with an optional attempt limit.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    base_delay: Duration,
    max_delay: Duration,
    /// `None` retries forever.
    max_attempts: Option<u32>,
    connect_timeout: Duration,
    /// Fraction of each delay that may be randomly shaved off (0.0..=1.0).
    jitter: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            base_delay: DEFAULT_BASE_DELAY,
            max_delay: DEFAULT_MAX_DELAY,
            max_attempts: Some(DEFAULT_MAX_ATTEMPTS),
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            jitter: 0.0,
        }
    }
}

impl RetryPolicy {
    /// Create a policy with explicit backoff bounds.
    #[must_use]
    pub fn new(base_delay: Duration, max_delay: Duration, max_attempts: Option<u32>) -> Self {
        Self {
            base_delay,
            max_delay: max_delay.max(base_delay),
            max_attempts,
            ..Self::default()
        }
    }

    /// Set the per-attempt connect timeout.
    #[must_use]
    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    /// Set the jitter fraction, clamped to `0.0..=1.0`. Non-finite values
    /// disable jitter.
    #[must_use]
    pub fn with_jitter(mut self, jitter: f64) -> Self {
        self.jitter = if jitter.is_finite() {
            jitter.clamp(0.0, 1.0)
        } else {
            0.0
        };
        self
    }

    /// Upper bound for one connection attempt.
    #[must_use]
    pub fn connect_timeout(&self) -> Duration {
        self.connect_timeout
    }

    /// Maximum attempts, `None` for unlimited.
    #[must_use]
    pub fn max_attempts(&self) -> Option<u32> {
        self.max_attempts
    }

    /// Backoff before attempt `attempt + 1`, without jitter.
    ///
    /// `attempt` is the number of attempts made so far (1-based).
    #[must_use]
    pub fn backoff(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(31);
        let factor = 1u32 << exponent;
        self.base_delay
            .checked_mul(factor)
            .unwrap_or(self.max_delay)
            .min(self.max_delay)
    }

    /// Decide what to do after `attempt` attempts ended with `reason`.
    #[must_use]
    pub fn decide(&self, attempt: u32, reason: &TerminationReason) -> RetryDecision {
        let kind = match reason {
            TerminationReason::NormalClose | TerminationReason::Cancelled => {
                return RetryDecision::GiveUp
            }
            TerminationReason::Error(kind) => kind,
        };

        if self.max_attempts.is_some_and(|max| attempt >= max) {
            return RetryDecision::GiveUp;
        }

        match kind {
            FailureKind::Network => RetryDecision::RetryAfter(self.jittered(self.backoff(attempt))),
            FailureKind::Authentication {
                credential_refreshed: false,
            } => RetryDecision::RefreshCredentialAndRetry,
            FailureKind::Authentication {
                credential_refreshed: true,
            }
            | FailureKind::Rejected => RetryDecision::GiveUp,
        }
    }

    fn jittered(&self, delay: Duration) -> Duration {
        if self.jitter <= 0.0 {
            return delay;
        }
        let shave = rand::thread_rng().gen_range(0.0..=self.jitter);
        delay.mul_f64(1.0 - shave)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    fn policy() -> RetryPolicy {
        RetryPolicy::new(Duration::from_secs(1), Duration::from_secs(30), Some(5))
    }

    #[test]
    fn test_backoff_doubles_and_caps() {
        let policy = policy();
        assert_eq!(policy.backoff(1), Duration::from_secs(1));
        assert_eq!(policy.backoff(2), Duration::from_secs(2));
        assert_eq!(policy.backoff(3), Duration::from_secs(4));
        assert_eq!(policy.backoff(5), Duration::from_secs(16));
        assert_eq!(policy.backoff(6), Duration::from_secs(30));
        assert_eq!(policy.backoff(200), Duration::from_secs(30));
    }

    #[test]
    fn test_network_failure_retries_with_backoff() {
        let policy = policy();
        let reason = TerminationReason::Error(FailureKind::Network);

        assert_eq!(
            policy.decide(1, &reason),
            RetryDecision::RetryAfter(Duration::from_secs(1))
        );
        assert_eq!(
            policy.decide(3, &reason),
            RetryDecision::RetryAfter(Duration::from_secs(4))
        );
    }

    #[test]
    fn test_max_attempts_gives_up() {
        let policy = policy();
        let reason = TerminationReason::Error(FailureKind::Network);

        assert!(matches!(policy.decide(4, &reason), RetryDecision::RetryAfter(_)));
        assert_eq!(policy.decide(5, &reason), RetryDecision::GiveUp);
    }

    #[test]
    fn test_unlimited_attempts() {
        let policy = RetryPolicy::new(Duration::from_millis(10), Duration::from_secs(1), None);
        let reason = TerminationReason::Error(FailureKind::Network);

        assert_eq!(
            policy.decide(10_000, &reason),
            RetryDecision::RetryAfter(Duration::from_secs(1))
        );
    }

    #[test]
    fn test_normal_close_and_cancel_never_retry() {
        let policy = policy();
        assert_eq!(
            policy.decide(1, &TerminationReason::NormalClose),
            RetryDecision::GiveUp
        );
        assert_eq!(
            policy.decide(1, &TerminationReason::Cancelled),
            RetryDecision::GiveUp
        );
    }

    #[test]
    fn test_authentication_failure_refreshes_once() {
        let policy = policy();

        assert_eq!(
            policy.decide(
                1,
                &TerminationReason::Error(FailureKind::Authentication {
                    credential_refreshed: false
                })
            ),
            RetryDecision::RefreshCredentialAndRetry
        );
        assert_eq!(
            policy.decide(
                2,
                &TerminationReason::Error(FailureKind::Authentication {
                    credential_refreshed: true
                })
            ),
            RetryDecision::GiveUp
        );
    }

    #[test]
    fn test_rejection_gives_up() {
        assert_eq!(
            policy().decide(1, &TerminationReason::Error(FailureKind::Rejected)),
            RetryDecision::GiveUp
        );
    }

    #[test]
    fn test_jitter_never_exceeds_backoff() {
        let policy = policy().with_jitter(0.5);
        let reason = TerminationReason::Error(FailureKind::Network);

        for _ in 0..100 {
            let decision = policy.decide(2, &reason);
            assert!(
                matches!(
                    decision,
                    RetryDecision::RetryAfter(delay)
                        if delay <= Duration::from_secs(2) && delay >= Duration::from_secs(1)
                ),
                "unexpected decision {decision:?}"
            );
        }
    }

    #[test]
    fn test_non_finite_jitter_is_disabled() {
        let reason = TerminationReason::Error(FailureKind::Network);

        for jitter in [f64::NAN, f64::INFINITY, f64::NEG_INFINITY] {
            let policy = policy().with_jitter(jitter);
            assert_eq!(
                policy.decide(2, &reason),
                RetryDecision::RetryAfter(Duration::from_secs(2))
            );
        }
    }

    #[test]
    fn test_max_delay_never_below_base() {
        let policy = RetryPolicy::new(Duration::from_secs(5), Duration::from_secs(1), None);
        assert_eq!(policy.backoff(1), Duration::from_secs(5));
    }
}
