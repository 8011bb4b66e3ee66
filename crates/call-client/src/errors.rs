//! Call client error types.
//!
//! Every backend-facing and lifecycle operation returns `Result<_, CallError>`.
//! The reducer has no error type: it cannot fail.

use crate::retry::FailureKind;
use common::credentials::CredentialError;
use common::types::UserId;
use thiserror::Error;

/// Precondition failures. The caller used the API in the wrong state and can
/// recover by inspecting the state and retrying correctly.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    /// `connect_user` while a user is already bound.
    #[error("Session already bound to user {user_id}")]
    SessionAlreadyBound { user_id: UserId },

    /// A lifecycle call that needs a bound user was made without one.
    #[error("No user is bound to the session")]
    NoUserBound,

    /// `open_connection` while the transport is already open.
    #[error("Connection is already open")]
    ConnectionAlreadyOpen,

    /// `close_connection` while the transport is already closed.
    #[error("Connection is already closed")]
    ConnectionAlreadyClosed,

    /// A result produced under an earlier session was offered to a newer one.
    #[error("Result belongs to a stale session")]
    StaleSession,

    /// An argument failed validation before any I/O.
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),
}

/// Call client error type.
///
/// Error codes:
/// - `Validation`: 1
/// - `Authentication`: 2
/// - `Transport`: 3
/// - `Backend`: 4
/// - `UnexpectedNullResult`: 5
/// - `Internal`: 6
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CallError {
    /// Precondition not met.
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    /// Credential fetch failed or the coordinator rejected the credential.
    #[error("Authentication error: {0}")]
    Authentication(String),

    /// Network failure. `retryable` says whether trying again can help.
    #[error("Transport error: {message}")]
    Transport { message: String, retryable: bool },

    /// Well-formed response carrying a server-side rejection.
    #[error("Backend error {status} (code {code}): {message}")]
    Backend {
        status: u16,
        code: i32,
        message: String,
    },

    /// The call succeeded on the wire but returned no payload where one was
    /// required. Carries the operation name.
    #[error("Unexpected empty result from {0}")]
    UnexpectedNullResult(&'static str),

    /// Actor channel closed or similar local plumbing failure.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl CallError {
    /// Build a transport error.
    pub fn transport(message: impl Into<String>, retryable: bool) -> Self {
        CallError::Transport {
            message: message.into(),
            retryable,
        }
    }

    /// Stable numeric code for the error category.
    pub fn error_code(&self) -> i32 {
        match self {
            CallError::Validation(_) => 1,
            CallError::Authentication(_) => 2,
            CallError::Transport { .. } => 3,
            CallError::Backend { .. } => 4,
            CallError::UnexpectedNullResult(_) => 5,
            CallError::Internal(_) => 6,
        }
    }

    /// Whether retrying the same call may succeed.
    pub fn is_retryable(&self) -> bool {
        match self {
            CallError::Transport { retryable, .. } => *retryable,
            CallError::Backend { status, .. } => *status >= 500,
            _ => false,
        }
    }

    /// Short label for metrics.
    pub fn kind_label(&self) -> &'static str {
        match self {
            CallError::Validation(_) => "validation",
            CallError::Authentication(_) => "authentication",
            CallError::Transport { .. } => "transport",
            CallError::Backend { .. } => "backend",
            CallError::UnexpectedNullResult(_) => "null_result",
            CallError::Internal(_) => "internal",
        }
    }

    /// Classify a failed connection attempt for the retry policy.
    ///
    /// `credential_refreshed` records whether the attempt already used a
    /// freshly fetched credential.
    pub fn failure_kind(&self, credential_refreshed: bool) -> FailureKind {
        match self {
            CallError::Authentication(_) => FailureKind::Authentication {
                credential_refreshed,
            },
            CallError::Transport {
                retryable: true, ..
            } => FailureKind::Network,
            CallError::Backend { status, .. } if *status >= 500 => FailureKind::Network,
            _ => FailureKind::Rejected,
        }
    }
}

impl From<CredentialError> for CallError {
    fn from(err: CredentialError) -> Self {
        CallError::Authentication(err.to_string())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_error_code_mapping() {
        assert_eq!(CallError::from(ValidationError::NoUserBound).error_code(), 1);
        assert_eq!(CallError::Authentication("expired".into()).error_code(), 2);
        assert_eq!(CallError::transport("reset", true).error_code(), 3);
        assert_eq!(
            CallError::Backend {
                status: 404,
                code: 16,
                message: "call not found".into()
            }
            .error_code(),
            4
        );
        assert_eq!(CallError::UnexpectedNullResult("join_call").error_code(), 5);
        assert_eq!(CallError::Internal("closed".into()).error_code(), 6);
    }

    #[test]
    fn test_retryable_classification() {
        assert!(CallError::transport("reset", true).is_retryable());
        assert!(!CallError::transport("bad frame", false).is_retryable());
        assert!(CallError::Backend {
            status: 503,
            code: 0,
            message: "unavailable".into()
        }
        .is_retryable());
        assert!(!CallError::Backend {
            status: 400,
            code: 4,
            message: "bad input".into()
        }
        .is_retryable());
        assert!(!CallError::Authentication("expired".into()).is_retryable());
        assert!(!CallError::from(ValidationError::ConnectionAlreadyOpen).is_retryable());
    }

    #[test]
    fn test_failure_kind_for_retry_policy() {
        assert_eq!(
            CallError::Authentication("expired".into()).failure_kind(false),
            FailureKind::Authentication {
                credential_refreshed: false
            }
        );
        assert_eq!(
            CallError::Authentication("expired".into()).failure_kind(true),
            FailureKind::Authentication {
                credential_refreshed: true
            }
        );
        assert_eq!(
            CallError::transport("reset", true).failure_kind(false),
            FailureKind::Network
        );
        assert_eq!(
            CallError::transport("protocol", false).failure_kind(false),
            FailureKind::Rejected
        );
    }

    #[test]
    fn test_credential_error_becomes_authentication() {
        let err: CallError = CredentialError::AcquisitionFailed("down".into()).into();
        assert!(matches!(err, CallError::Authentication(_)));
    }

    #[test]
    fn test_display_formatting() {
        assert_eq!(
            format!(
                "{}",
                CallError::from(ValidationError::SessionAlreadyBound {
                    user_id: UserId::from("alice")
                })
            ),
            "Validation error: Session already bound to user alice"
        );
        assert_eq!(
            format!("{}", CallError::UnexpectedNullResult("get_or_create_call")),
            "Unexpected empty result from get_or_create_call"
        );
    }
}
