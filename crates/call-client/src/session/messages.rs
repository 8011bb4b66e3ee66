//! Messages handled by the session actor.

use tokio::sync::oneshot;
use tokio_util::sync::CancellationToken;

use crate::errors::CallError;
use crate::models::User;
use crate::retry::TerminationReason;
use crate::transport::TransportLink;

pub(super) type Responder = oneshot::Sender<Result<(), CallError>>;

/// Lifecycle requests from handles.
#[derive(Debug)]
pub(super) enum SessionMessage {
    ConnectUser { user: User, respond_to: Responder },
    OpenConnection { respond_to: Responder },
    CloseConnection { respond_to: Responder },
    DisconnectUser { respond_to: Responder },
}

impl SessionMessage {
    pub(super) fn name(&self) -> &'static str {
        match self {
            SessionMessage::ConnectUser { .. } => "connect_user",
            SessionMessage::OpenConnection { .. } => "open_connection",
            SessionMessage::CloseConnection { .. } => "close_connection",
            SessionMessage::DisconnectUser { .. } => "disconnect_user",
        }
    }
}

/// A link the connect task managed to open, with the token that closes it.
#[derive(Debug)]
pub(super) struct EstablishedLink {
    pub link: TransportLink,
    pub shutdown: CancellationToken,
}

/// Reports from tasks the actor spawned. `generation` identifies the
/// connection cycle; signals from an older cycle are ignored.
#[derive(Debug)]
pub(super) enum Signal {
    ConnectFinished {
        generation: u64,
        outcome: Result<EstablishedLink, CallError>,
    },
    LinkTerminated {
        generation: u64,
        reason: TerminationReason,
    },
}
