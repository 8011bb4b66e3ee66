//! Coordinator push transport.
//!
//! A [`Transport`] opens one persistent connection for a user and hands back
//! a [`TransportLink`]: the connection id the coordinator assigned and a
//! receiver of decoded inbound frames. The session client owns the link and
//! never exposes it.
//!
//! # Closing
//!
//! The link is closed by cancelling the `shutdown` token passed in the
//! [`ConnectRequest`]. Implementations must stop reading and drop their
//! sender once it fires. A link whose receiver ends without a
//! [`InboundFrame::Closed`] frame is treated as a network failure unless the
//! client cancelled it.

use async_trait::async_trait;
use common::secret::SecretString;
use common::types::ConnectionId;
use std::fmt;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::errors::CallError;
use crate::events::CoordinatorEvent;
use crate::models::User;
use crate::retry::TerminationReason;

/// Parameters for one connection attempt.
pub struct ConnectRequest {
    pub user: User,
    pub credential: SecretString,
    pub api_key: SecretString,
    /// Cancelled by the session client to close the link.
    pub shutdown: CancellationToken,
}

impl fmt::Debug for ConnectRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectRequest")
            .field("user", &self.user.id)
            .field("credential", &"[REDACTED]")
            .field("api_key", &"[REDACTED]")
            .finish_non_exhaustive()
    }
}

/// One item read from the connection.
#[derive(Debug, Clone, PartialEq)]
pub enum InboundFrame {
    Event(CoordinatorEvent),
    /// The connection ended. No frames follow.
    Closed(TerminationReason),
}

/// A live connection.
#[derive(Debug)]
pub struct TransportLink {
    pub connection_id: ConnectionId,
    pub inbound: mpsc::Receiver<InboundFrame>,
}

/// Opens coordinator connections (enables mocking).
///
/// `open` resolves once the coordinator has acknowledged the connection.
/// Errors are classified with [`CallError::failure_kind`]: an
/// `Authentication` error triggers a credential refresh, a retryable
/// `Transport` error triggers backoff, anything else gives up.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn open(&self, request: ConnectRequest) -> Result<TransportLink, CallError>;
}
