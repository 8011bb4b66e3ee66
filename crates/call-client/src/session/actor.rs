//! `SessionClient` actor and its handle.
//!
//! The actor is the single owner of the bound user, the connection phase
//! and the live link. Handles talk to it through a bounded mailbox with
//! oneshot replies; spawned tasks report back on an internal signal channel.
//!
//! # Generations
//!
//! Every connection cycle (an attempt loop plus the link it produces) gets a
//! new generation number. Closing or restarting a cycle bumps the number, so
//! late reports from abandoned attempts, stale reconnect timers and
//! forwarders that were already told to stop are recognised and ignored.
//!
//! # Epochs
//!
//! The session epoch identifies one stretch of session state. It advances
//! when a user is bound and again whenever the session ends for good
//! (close, unbind, a failed connect or an abandoned reconnect). The final
//! `Disconnected` event carries the new value, so anything stamped with the
//! old one, such as a join that was still in flight, is stale downstream.

use common::credentials::CredentialProvider;
use common::secret::SecretString;
use common::types::ConnectionId;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, trace, warn};

use super::connect::ConnectAttempt;
use super::messages::{EstablishedLink, Responder, SessionMessage, Signal};
use super::{ConnectionState, SessionEvent, SessionStatus};
use crate::backend::CoordinatorApi;
use crate::config::{ClientConfig, DEFAULT_EVENT_BUFFER, DEFAULT_REQUEST_TIMEOUT};
use crate::errors::{CallError, ValidationError};
use crate::location::LocationProvider;
use crate::models::User;
use crate::observability::metrics;
use crate::retry::{FailureKind, RetryDecision, RetryPolicy, TerminationReason};
use crate::signing::RequestSigner;
use crate::transport::{InboundFrame, Transport};

/// Mailbox capacity for lifecycle requests.
const SESSION_CHANNEL_BUFFER: usize = 32;

/// Attempts a reconnect cycle starts with: the lost link counts as the first.
const LOST_LINK_ATTEMPTS: u32 = 1;

/// External collaborators the session client drives.
#[derive(Clone)]
pub struct SessionDependencies {
    pub transport: Arc<dyn Transport>,
    pub api: Arc<dyn CoordinatorApi>,
    pub credentials: Arc<dyn CredentialProvider>,
    pub location: Arc<dyn LocationProvider>,
}

/// Session client tuning.
#[derive(Clone)]
pub struct SessionSettings {
    pub api_key: SecretString,
    pub retry_policy: RetryPolicy,
    /// Capacity of the outbound event channel.
    pub event_buffer: usize,
    /// Deadline for backend calls without an explicit one.
    pub request_timeout: Duration,
}

impl SessionSettings {
    /// Settings with default policy, buffer and timeout.
    #[must_use]
    pub fn new(api_key: SecretString) -> Self {
        Self {
            api_key,
            retry_policy: RetryPolicy::default(),
            event_buffer: DEFAULT_EVENT_BUFFER,
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
        }
    }

    /// Settings derived from a loaded [`ClientConfig`].
    #[must_use]
    pub fn from_config(config: &ClientConfig) -> Self {
        Self {
            api_key: config.api_key.clone(),
            retry_policy: config.retry_policy(),
            event_buffer: config.event_buffer,
            request_timeout: config.request_timeout,
        }
    }

    #[must_use]
    pub fn with_retry_policy(mut self, policy: RetryPolicy) -> Self {
        self.retry_policy = policy;
        self
    }

    #[must_use]
    pub fn with_event_buffer(mut self, event_buffer: usize) -> Self {
        self.event_buffer = event_buffer.max(1);
        self
    }

    #[must_use]
    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }
}

impl fmt::Debug for SessionSettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionSettings")
            .field("api_key", &"[REDACTED]")
            .field("retry_policy", &self.retry_policy)
            .field("event_buffer", &self.event_buffer)
            .field("request_timeout", &self.request_timeout)
            .finish()
    }
}

/// What backend calls need, shared by every handle clone.
pub(super) struct CallContext {
    pub api: Arc<dyn CoordinatorApi>,
    pub signer: RequestSigner,
    pub location: Arc<dyn LocationProvider>,
    pub request_timeout: Duration,
}

/// Handle to the session client.
///
/// Cheap to clone. Lifecycle calls are serialized by the actor; backend
/// calls run on the caller's task and are never cancelled by lifecycle
/// changes.
#[derive(Clone)]
pub struct SessionClientHandle {
    pub(super) sender: mpsc::Sender<SessionMessage>,
    pub(super) status: watch::Receiver<SessionStatus>,
    pub(super) calls: Arc<CallContext>,
    pub(super) deadline: Option<Duration>,
    cancel_token: CancellationToken,
}

impl fmt::Debug for SessionClientHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionClientHandle")
            .field("status", &*self.status.borrow())
            .field("deadline", &self.deadline)
            .finish_non_exhaustive()
    }
}

impl SessionClientHandle {
    /// Bind `user` and connect.
    ///
    /// Fails with `SessionAlreadyBound` if a user is already bound; the
    /// existing session is left untouched. If connecting fails for good the
    /// user is unbound again.
    pub async fn connect_user(&self, user: User) -> Result<(), CallError> {
        self.request(|respond_to| SessionMessage::ConnectUser { user, respond_to })
            .await
    }

    /// Open the connection for the already bound user.
    pub async fn open_connection(&self) -> Result<(), CallError> {
        self.request(|respond_to| SessionMessage::OpenConnection { respond_to })
            .await
    }

    /// Close the connection and wait until the close is observed. The user
    /// stays bound. Cancels a pending reconnect.
    pub async fn close_connection(&self) -> Result<(), CallError> {
        self.request(|respond_to| SessionMessage::CloseConnection { respond_to })
            .await
    }

    /// Close the connection and unbind the user. Idempotent.
    pub async fn disconnect_user(&self) -> Result<(), CallError> {
        self.request(|respond_to| SessionMessage::DisconnectUser { respond_to })
            .await
    }

    /// Current session status.
    #[must_use]
    pub fn status(&self) -> SessionStatus {
        self.status.borrow().clone()
    }

    /// Receiver that observes every status change.
    #[must_use]
    pub fn watch_status(&self) -> watch::Receiver<SessionStatus> {
        self.status.clone()
    }

    /// A handle whose backend calls use `deadline` instead of the default.
    #[must_use]
    pub fn with_deadline(&self, deadline: Duration) -> Self {
        Self {
            deadline: Some(deadline),
            ..self.clone()
        }
    }

    /// Stop the actor. The live connection, if any, is closed.
    pub fn shutdown(&self) {
        self.cancel_token.cancel();
    }

    async fn request<F>(&self, build: F) -> Result<(), CallError>
    where
        F: FnOnce(Responder) -> SessionMessage,
    {
        let (tx, rx) = oneshot::channel();
        self.sender
            .send(build(tx))
            .await
            .map_err(|e| CallError::Internal(format!("channel send failed: {e}")))?;

        rx.await
            .map_err(|e| CallError::Internal(format!("response receive failed: {e}")))?
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ConnectPurpose {
    /// Started by `connect_user`; failure unbinds the user.
    ConnectUser,
    /// Started by `open_connection`.
    Open,
    /// Started after a live link was lost.
    Reconnect,
}

enum Phase {
    Idle,
    Connecting {
        purpose: ConnectPurpose,
        cancel: CancellationToken,
        waiters: Vec<Responder>,
    },
    Connected {
        connection_id: ConnectionId,
        shutdown: CancellationToken,
        forwarder: JoinHandle<()>,
    },
    Disconnecting,
}

/// The session actor.
pub struct SessionClient {
    receiver: mpsc::Receiver<SessionMessage>,
    signals_tx: mpsc::UnboundedSender<Signal>,
    signals_rx: mpsc::UnboundedReceiver<Signal>,
    events_tx: mpsc::Sender<SessionEvent>,
    status_tx: watch::Sender<SessionStatus>,
    transport: Arc<dyn Transport>,
    credentials: Arc<dyn CredentialProvider>,
    api_key: SecretString,
    policy: RetryPolicy,
    cancel_token: CancellationToken,
    user: Option<User>,
    epoch: u64,
    generation: u64,
    phase: Phase,
}

impl SessionClient {
    /// Spawn the session actor.
    ///
    /// Returns the handle, the receiving end of the session event stream and
    /// the actor's join handle.
    pub fn spawn(
        dependencies: SessionDependencies,
        settings: SessionSettings,
    ) -> (
        SessionClientHandle,
        mpsc::Receiver<SessionEvent>,
        JoinHandle<()>,
    ) {
        let (sender, receiver) = mpsc::channel(SESSION_CHANNEL_BUFFER);
        let (signals_tx, signals_rx) = mpsc::unbounded_channel();
        let (events_tx, events_rx) = mpsc::channel(settings.event_buffer.max(1));
        let (status_tx, status_rx) = watch::channel(SessionStatus::default());
        let cancel_token = CancellationToken::new();

        let actor = Self {
            receiver,
            signals_tx,
            signals_rx,
            events_tx,
            status_tx,
            transport: Arc::clone(&dependencies.transport),
            credentials: Arc::clone(&dependencies.credentials),
            api_key: settings.api_key.clone(),
            policy: settings.retry_policy.clone(),
            cancel_token: cancel_token.clone(),
            user: None,
            epoch: 0,
            generation: 0,
            phase: Phase::Idle,
        };

        let task_handle = tokio::spawn(actor.run());

        let calls = CallContext {
            api: dependencies.api,
            signer: RequestSigner::new(dependencies.credentials, settings.api_key),
            location: dependencies.location,
            request_timeout: settings.request_timeout,
        };

        let handle = SessionClientHandle {
            sender,
            status: status_rx,
            calls: Arc::new(calls),
            deadline: None,
            cancel_token,
        };

        (handle, events_rx, task_handle)
    }

    #[instrument(skip_all, name = "call.session")]
    async fn run(mut self) {
        debug!(target: "call.session", "Session client started");

        loop {
            tokio::select! {
                () = self.cancel_token.cancelled() => {
                    debug!(target: "call.session", "Session client received cancellation signal");
                    break;
                }

                msg = self.receiver.recv() => {
                    match msg {
                        Some(message) => self.handle_message(message).await,
                        None => {
                            debug!(target: "call.session", "All session handles dropped");
                            break;
                        }
                    }
                }

                Some(signal) = self.signals_rx.recv() => {
                    self.handle_signal(signal).await;
                }
            }
        }

        self.teardown().await;
        debug!(target: "call.session", "Session client stopped");
    }

    async fn handle_message(&mut self, message: SessionMessage) {
        trace!(target: "call.session", message = message.name(), "Handling lifecycle request");

        match message {
            SessionMessage::ConnectUser { user, respond_to } => {
                self.handle_connect_user(user, respond_to);
            }
            SessionMessage::OpenConnection { respond_to } => {
                self.handle_open(respond_to);
            }
            SessionMessage::CloseConnection { respond_to } => {
                let result = self.handle_close().await;
                let _ = respond_to.send(result);
            }
            SessionMessage::DisconnectUser { respond_to } => {
                self.handle_disconnect().await;
                let _ = respond_to.send(Ok(()));
            }
        }
    }

    fn handle_connect_user(&mut self, user: User, respond_to: Responder) {
        if let Some(bound) = &self.user {
            warn!(
                target: "call.session",
                bound_user = %bound.id,
                requested_user = %user.id,
                "connect_user rejected, session already bound"
            );
            let _ = respond_to.send(Err(ValidationError::SessionAlreadyBound {
                user_id: bound.id.clone(),
            }
            .into()));
            return;
        }

        self.epoch = self.epoch.saturating_add(1);
        info!(
            target: "call.session",
            user_id = %user.id,
            epoch = self.epoch,
            "Binding user to session"
        );
        self.user = Some(user);
        self.start_connect(ConnectPurpose::ConnectUser, Duration::ZERO, false, Some(respond_to));
    }

    fn handle_open(&mut self, respond_to: Responder) {
        if self.user.is_none() {
            let _ = respond_to.send(Err(ValidationError::NoUserBound.into()));
            return;
        }

        if matches!(self.phase, Phase::Idle) {
            self.start_connect(ConnectPurpose::Open, Duration::ZERO, false, Some(respond_to));
        } else {
            let _ = respond_to.send(Err(ValidationError::ConnectionAlreadyOpen.into()));
        }
    }

    async fn handle_close(&mut self) -> Result<(), CallError> {
        if self.user.is_none() {
            return Err(ValidationError::NoUserBound.into());
        }

        match std::mem::replace(&mut self.phase, Phase::Idle) {
            Phase::Idle | Phase::Disconnecting => Err(ValidationError::ConnectionAlreadyClosed.into()),
            Phase::Connecting {
                purpose,
                cancel,
                waiters,
            } => {
                self.abandon_connect(purpose, &cancel, waiters).await;
                Ok(())
            }
            Phase::Connected {
                connection_id,
                shutdown,
                forwarder,
            } => {
                self.close_link(connection_id, &shutdown, forwarder).await;
                Ok(())
            }
        }
    }

    async fn handle_disconnect(&mut self) {
        let Some(user) = self.user.as_ref() else {
            debug!(target: "call.session", "disconnect_user with no bound user");
            return;
        };
        info!(target: "call.session", user_id = %user.id, "Unbinding user from session");

        // Closing a link or a pending reconnect ends the session itself.
        let ended = match std::mem::replace(&mut self.phase, Phase::Idle) {
            Phase::Idle | Phase::Disconnecting => false,
            Phase::Connecting {
                purpose,
                cancel,
                waiters,
            } => {
                self.abandon_connect(purpose, &cancel, waiters).await;
                purpose == ConnectPurpose::Reconnect
            }
            Phase::Connected {
                connection_id,
                shutdown,
                forwarder,
            } => {
                self.close_link(connection_id, &shutdown, forwarder).await;
                true
            }
        };

        self.user = None;
        if !ended {
            self.end_session(TerminationReason::Cancelled).await;
        }
        self.publish_status();
    }

    /// Stop an in-flight connection cycle.
    async fn abandon_connect(
        &mut self,
        purpose: ConnectPurpose,
        cancel: &CancellationToken,
        waiters: Vec<Responder>,
    ) {
        self.generation = self.generation.saturating_add(1);
        cancel.cancel();

        for waiter in waiters {
            let _ = waiter.send(Err(CallError::transport(
                "connection closed before it was established",
                false,
            )));
        }

        if purpose == ConnectPurpose::Reconnect {
            info!(target: "call.session", "Pending reconnect cancelled");
            self.end_session(TerminationReason::Cancelled).await;
        }

        self.phase = Phase::Idle;
        self.publish_status();
    }

    /// Close a live link and wait for its forwarder to stop.
    async fn close_link(
        &mut self,
        connection_id: ConnectionId,
        shutdown: &CancellationToken,
        forwarder: JoinHandle<()>,
    ) {
        self.generation = self.generation.saturating_add(1);
        self.phase = Phase::Disconnecting;
        self.publish_status();

        info!(target: "call.session", connection_id = %connection_id, "Closing coordinator connection");
        shutdown.cancel();
        if let Err(e) = forwarder.await {
            warn!(target: "call.session", error = %e, "Event forwarder ended abnormally");
        }

        metrics::set_connected(false);
        self.end_session(TerminationReason::Cancelled).await;

        self.phase = Phase::Idle;
        self.publish_status();
    }

    fn start_connect(
        &mut self,
        purpose: ConnectPurpose,
        initial_delay: Duration,
        credential_refreshed: bool,
        waiter: Option<Responder>,
    ) {
        let attempts_made = if purpose == ConnectPurpose::Reconnect {
            LOST_LINK_ATTEMPTS
        } else {
            0
        };

        let Some(user) = self.user.clone() else {
            if let Some(waiter) = waiter {
                let _ = waiter.send(Err(ValidationError::NoUserBound.into()));
            }
            return;
        };

        self.generation = self.generation.saturating_add(1);
        let generation = self.generation;
        let cancel = self.cancel_token.child_token();

        let attempt = ConnectAttempt {
            transport: Arc::clone(&self.transport),
            credentials: Arc::clone(&self.credentials),
            api_key: self.api_key.clone(),
            policy: self.policy.clone(),
            user,
            cancel: cancel.clone(),
            initial_delay,
            attempts_made,
            credential_refreshed,
        };
        let signals = self.signals_tx.clone();
        tokio::spawn(async move {
            let outcome = attempt.run().await;
            let _ = signals.send(Signal::ConnectFinished {
                generation,
                outcome,
            });
        });

        self.phase = Phase::Connecting {
            purpose,
            cancel,
            waiters: waiter.into_iter().collect(),
        };
        self.publish_status();
    }

    async fn handle_signal(&mut self, signal: Signal) {
        match signal {
            Signal::ConnectFinished {
                generation,
                outcome,
            } => self.on_connect_finished(generation, outcome).await,
            Signal::LinkTerminated { generation, reason } => {
                self.on_link_terminated(generation, reason).await;
            }
        }
    }

    async fn on_connect_finished(
        &mut self,
        generation: u64,
        outcome: Result<EstablishedLink, CallError>,
    ) {
        if generation != self.generation || !matches!(self.phase, Phase::Connecting { .. }) {
            debug!(
                target: "call.session",
                generation = generation,
                current_generation = self.generation,
                "Ignoring result of abandoned connection attempt"
            );
            if let Ok(established) = outcome {
                established.shutdown.cancel();
            }
            return;
        }

        let Phase::Connecting {
            purpose, waiters, ..
        } = std::mem::replace(&mut self.phase, Phase::Idle)
        else {
            return;
        };

        match outcome {
            Ok(EstablishedLink { link, shutdown }) => {
                let Some(user_id) = self.user.as_ref().map(|u| u.id.clone()) else {
                    shutdown.cancel();
                    return;
                };
                let connection_id = link.connection_id.clone();

                // Connected goes out before any pushed event.
                self.emit(SessionEvent::Connected {
                    epoch: self.epoch,
                    user_id,
                    connection_id: connection_id.clone(),
                })
                .await;

                let forwarder = tokio::spawn(forward_events(
                    generation,
                    self.epoch,
                    link.inbound,
                    shutdown.clone(),
                    self.events_tx.clone(),
                    self.signals_tx.clone(),
                ));

                self.phase = Phase::Connected {
                    connection_id,
                    shutdown,
                    forwarder,
                };
                metrics::set_connected(true);
                self.publish_status();

                for waiter in waiters {
                    let _ = waiter.send(Ok(()));
                }
            }
            Err(err) => {
                warn!(
                    target: "call.session",
                    error = %err,
                    purpose = ?purpose,
                    "Connection could not be established"
                );

                match purpose {
                    ConnectPurpose::ConnectUser => {
                        self.user = None;
                        self.end_session(TerminationReason::Error(err.failure_kind(true)))
                            .await;
                    }
                    ConnectPurpose::Open => {}
                    ConnectPurpose::Reconnect => {
                        self.end_session(TerminationReason::Error(err.failure_kind(true)))
                            .await;
                    }
                }

                self.publish_status();
                for waiter in waiters {
                    let _ = waiter.send(Err(err.clone()));
                }
            }
        }
    }

    async fn on_link_terminated(&mut self, generation: u64, reason: TerminationReason) {
        if generation != self.generation || !matches!(self.phase, Phase::Connected { .. }) {
            debug!(
                target: "call.session",
                generation = generation,
                current_generation = self.generation,
                "Ignoring termination of superseded link"
            );
            return;
        }

        let Phase::Connected {
            connection_id,
            shutdown,
            ..
        } = std::mem::replace(&mut self.phase, Phase::Idle)
        else {
            return;
        };
        shutdown.cancel();
        metrics::set_connected(false);

        match self.policy.decide(LOST_LINK_ATTEMPTS, &reason) {
            RetryDecision::GiveUp => {
                info!(
                    target: "call.session",
                    connection_id = %connection_id,
                    reason = reason.as_str(),
                    "Coordinator connection ended"
                );
                self.end_session(reason).await;
                self.publish_status();
            }
            RetryDecision::RetryAfter(delay) => {
                warn!(
                    target: "call.session",
                    connection_id = %connection_id,
                    reason = reason.as_str(),
                    delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
                    "Coordinator connection lost, reconnecting"
                );
                metrics::record_reconnect(reason.as_str());
                self.emit(SessionEvent::Disconnected {
                    epoch: self.epoch,
                    reason,
                    will_reconnect: true,
                })
                .await;
                self.start_connect(ConnectPurpose::Reconnect, delay, false, None);
            }
            RetryDecision::RefreshCredentialAndRetry => {
                warn!(
                    target: "call.session",
                    connection_id = %connection_id,
                    "Coordinator rejected credential on live connection, refreshing"
                );
                self.credentials.invalidate().await;
                metrics::record_credential_refresh("connect");
                metrics::record_reconnect(reason.as_str());
                self.emit(SessionEvent::Disconnected {
                    epoch: self.epoch,
                    reason,
                    will_reconnect: true,
                })
                .await;
                self.start_connect(ConnectPurpose::Reconnect, Duration::ZERO, true, None);
            }
        }
    }

    async fn teardown(&mut self) {
        match std::mem::replace(&mut self.phase, Phase::Idle) {
            Phase::Idle | Phase::Disconnecting => {}
            Phase::Connecting {
                cancel, waiters, ..
            } => {
                cancel.cancel();
                for waiter in waiters {
                    let _ = waiter.send(Err(CallError::Internal(
                        "session client shut down".to_string(),
                    )));
                }
            }
            Phase::Connected {
                connection_id,
                shutdown,
                forwarder,
            } => self.close_link(connection_id, &shutdown, forwarder).await,
        }
        self.user = None;
        self.publish_status();
    }

    /// Advance the epoch and report the permanent disconnect under it.
    async fn end_session(&mut self, reason: TerminationReason) {
        self.epoch = self.epoch.saturating_add(1);
        debug!(
            target: "call.session",
            epoch = self.epoch,
            reason = reason.as_str(),
            "Session ended"
        );
        self.emit(SessionEvent::Disconnected {
            epoch: self.epoch,
            reason,
            will_reconnect: false,
        })
        .await;
    }

    async fn emit(&self, event: SessionEvent) {
        if self.events_tx.send(event).await.is_err() {
            debug!(target: "call.session", "Session event receiver dropped");
        }
    }

    fn publish_status(&self) {
        let (state, connection_id) = match &self.phase {
            Phase::Idle => (ConnectionState::Idle, None),
            Phase::Connecting {
                purpose: ConnectPurpose::Reconnect,
                ..
            } => (ConnectionState::Reconnecting, None),
            Phase::Connecting { .. } => (ConnectionState::Connecting, None),
            Phase::Connected { connection_id, .. } => {
                (ConnectionState::Connected, Some(connection_id.clone()))
            }
            Phase::Disconnecting => (ConnectionState::Disconnecting, None),
        };

        let status = SessionStatus {
            state,
            user_id: self.user.as_ref().map(|u| u.id.clone()),
            connection_id,
            epoch: self.epoch,
        };
        trace!(target: "call.session", state = state.as_str(), "Session status changed");
        self.status_tx.send_replace(status);
    }
}

/// Forward inbound frames of one link until it ends or is cancelled, then
/// report how it ended.
async fn forward_events(
    generation: u64,
    epoch: u64,
    mut inbound: mpsc::Receiver<InboundFrame>,
    shutdown: CancellationToken,
    events_tx: mpsc::Sender<SessionEvent>,
    signals_tx: mpsc::UnboundedSender<Signal>,
) {
    let reason = loop {
        tokio::select! {
            biased;

            () = shutdown.cancelled() => break TerminationReason::Cancelled,

            frame = inbound.recv() => match frame {
                Some(InboundFrame::Event(event)) => {
                    trace!(
                        target: "call.session",
                        event_type = event.event_type(),
                        "Forwarding coordinator event"
                    );
                    if events_tx
                        .send(SessionEvent::Coordinator { epoch, event })
                        .await
                        .is_err()
                    {
                        break TerminationReason::Cancelled;
                    }
                }
                Some(InboundFrame::Closed(reason)) => break reason,
                None if shutdown.is_cancelled() => break TerminationReason::Cancelled,
                None => break TerminationReason::Error(FailureKind::Network),
            },
        }
    };

    debug!(
        target: "call.session",
        reason = reason.as_str(),
        "Event forwarding stopped"
    );
    let _ = signals_tx.send(Signal::LinkTerminated { generation, reason });
}
