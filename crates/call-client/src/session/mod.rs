//! Coordinator session client.
//!
//! One [`SessionClient`] actor owns the persistent coordinator connection for
//! at most one bound user. Lifecycle calls go through its mailbox and are
//! handled one at a time; connection attempts and event forwarding run in
//! tasks the actor supervises.
//!
//! # State machine
//!
//! ```text
//! Idle ──connect_user/open──▶ Connecting ──ok──▶ Connected ──close──▶ Disconnecting ──▶ Idle
//!   ▲                              │                  │
//!   └────────── give up ───────────┘                  └─ link lost ─▶ Reconnecting ─▶ Connected
//! ```
//!
//! # Events
//!
//! Inbound events are delivered on a bounded channel in arrival order:
//! `Connected`, then the coordinator's pushes, then `Disconnected`. Every
//! event carries the session epoch it belongs to; a final `Disconnected`
//! carries the epoch that replaces it. The forwarder awaits channel
//! capacity; nothing is dropped.

mod actor;
mod calls;
mod connect;
mod messages;

pub use actor::{SessionClient, SessionClientHandle, SessionDependencies, SessionSettings};

use common::types::{ConnectionId, UserId};

use crate::events::CoordinatorEvent;
use crate::retry::TerminationReason;

/// Connection lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConnectionState {
    #[default]
    Idle,
    Connecting,
    Connected,
    /// A live connection was lost and another attempt is scheduled.
    Reconnecting,
    Disconnecting,
}

impl ConnectionState {
    /// Label for logs.
    pub fn as_str(&self) -> &'static str {
        match self {
            ConnectionState::Idle => "idle",
            ConnectionState::Connecting => "connecting",
            ConnectionState::Connected => "connected",
            ConnectionState::Reconnecting => "reconnecting",
            ConnectionState::Disconnecting => "disconnecting",
        }
    }
}

/// Snapshot of the session published on a watch channel.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct SessionStatus {
    pub state: ConnectionState,
    /// The bound user, if any. A user can stay bound while the connection is idle.
    pub user_id: Option<UserId>,
    /// Set only while `Connected`.
    pub connection_id: Option<ConnectionId>,
    /// Incremented each time a user is bound and each time the session
    /// ends for good.
    pub epoch: u64,
}

/// What the session client tells the rest of the system.
#[derive(Debug, Clone, PartialEq)]
pub enum SessionEvent {
    /// A connection is up.
    Connected {
        epoch: u64,
        user_id: UserId,
        connection_id: ConnectionId,
    },
    /// A server push received on the live connection.
    Coordinator { epoch: u64, event: CoordinatorEvent },
    /// The connection ended. `will_reconnect` is false when no further
    /// attempt will be made without a new lifecycle call; `epoch` is then
    /// the new epoch and everything from earlier ones is stale.
    Disconnected {
        epoch: u64,
        reason: TerminationReason,
        will_reconnect: bool,
    },
}

impl SessionEvent {
    pub fn epoch(&self) -> u64 {
        match self {
            SessionEvent::Connected { epoch, .. }
            | SessionEvent::Coordinator { epoch, .. }
            | SessionEvent::Disconnected { epoch, .. } => *epoch,
        }
    }
}
