//! `CallStore` actor: the single owner of [`CallState`].
//!
//! Local actions, direct patches, join results and session events all go
//! through one bounded queue and are applied in the order they were queued.
//! Every change is published on a watch channel; server pushes that only
//! inform (reactions, custom events, call ended) go out on a broadcast
//! channel.
//!
//! # Epochs
//!
//! The store remembers the newest session epoch it has seen. Session events
//! and join results from an older epoch belong to a session that has since
//! ended and are dropped.
//!
//! # Pending joins
//!
//! Between [`StoreHandle::begin_join`] and the matching join result the
//! state does not know the call yet, so pushes for it would be discarded.
//! They are held instead and replayed in arrival order once the join is
//! applied. A refused or abandoned join drops them.

use common::types::{CallCid, UserId};
use std::sync::Arc;
use tokio::sync::{broadcast, mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, trace, warn};

use crate::action::Action;
use crate::errors::{CallError, ValidationError};
use crate::events::{translate, CoordinatorEvent, Translated};
use crate::models::JoinedCall;
use crate::observability::metrics;
use crate::reducer::{apply_patch, reduce, StatePatch};
use crate::session::SessionEvent;
use crate::state::CallState;

/// Capacity of the notification broadcast channel.
const NOTIFICATION_BUFFER: usize = 64;

type Snapshot = Arc<CallState>;
type Reply = oneshot::Sender<Result<Snapshot, CallError>>;

enum StoreCommand {
    BeginJoin { cid: CallCid, respond_to: Reply },
    AbandonJoin { cid: CallCid, respond_to: Reply },
    Dispatch { action: Action, respond_to: Reply },
    ApplyPatch { patch: StatePatch, respond_to: Reply },
    ApplyJoin { joined: Box<JoinedCall>, respond_to: Reply },
    Session(SessionEvent),
}

/// Handle to the call store.
#[derive(Clone)]
pub struct StoreHandle {
    sender: mpsc::Sender<StoreCommand>,
    state: watch::Receiver<Snapshot>,
    notifications: broadcast::Sender<CoordinatorEvent>,
    cancel_token: CancellationToken,
}

impl std::fmt::Debug for StoreHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StoreHandle")
            .field("participants", &self.state.borrow().participants().len())
            .finish_non_exhaustive()
    }
}

impl StoreHandle {
    /// Reduce `action` into the state. Resolves with the resulting snapshot.
    pub async fn dispatch(&self, action: Action) -> Result<Snapshot, CallError> {
        self.request(|respond_to| StoreCommand::Dispatch { action, respond_to })
            .await
    }

    /// Apply a server-owned change directly.
    pub async fn apply_patch(&self, patch: StatePatch) -> Result<Snapshot, CallError> {
        self.request(|respond_to| StoreCommand::ApplyPatch { patch, respond_to })
            .await
    }

    /// Announce a join of `cid` that is about to be made. Pushes for `cid`
    /// are held until [`apply_join`](Self::apply_join) or
    /// [`abandon_join`](Self::abandon_join).
    pub async fn begin_join(&self, cid: CallCid) -> Result<Snapshot, CallError> {
        self.request(|respond_to| StoreCommand::BeginJoin { cid, respond_to })
            .await
    }

    /// Give up on a pending join of `cid`, dropping the pushes held for it.
    pub async fn abandon_join(&self, cid: CallCid) -> Result<Snapshot, CallError> {
        self.request(|respond_to| StoreCommand::AbandonJoin { cid, respond_to })
            .await
    }

    /// Seed the state from a join result, then replay pushes held for the
    /// call since [`begin_join`](Self::begin_join).
    ///
    /// Fails with `StaleSession` if the join was made under a session epoch
    /// that has since ended.
    pub async fn apply_join(&self, joined: JoinedCall) -> Result<Snapshot, CallError> {
        self.request(|respond_to| StoreCommand::ApplyJoin {
            joined: Box::new(joined),
            respond_to,
        })
        .await
    }

    /// Current snapshot.
    #[must_use]
    pub fn state(&self) -> Snapshot {
        Arc::clone(&self.state.borrow())
    }

    /// Receiver that observes every published snapshot.
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<Snapshot> {
        self.state.clone()
    }

    /// Receiver for notification-only server pushes.
    #[must_use]
    pub fn notifications(&self) -> broadcast::Receiver<CoordinatorEvent> {
        self.notifications.subscribe()
    }

    /// Stop the store.
    pub fn shutdown(&self) {
        self.cancel_token.cancel();
    }

    async fn request<F>(&self, build: F) -> Result<Snapshot, CallError>
    where
        F: FnOnce(Reply) -> StoreCommand,
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

/// A join announced with `begin_join` that has no result yet.
struct PendingJoin {
    cid: CallCid,
    held: Vec<CoordinatorEvent>,
}

/// The store actor.
pub struct CallStore {
    receiver: mpsc::Receiver<StoreCommand>,
    state_tx: watch::Sender<Snapshot>,
    notifications: broadcast::Sender<CoordinatorEvent>,
    cancel_token: CancellationToken,
    state: Snapshot,
    /// Newest session epoch seen.
    epoch: u64,
    local_user: Option<UserId>,
    pending_join: Option<PendingJoin>,
}

impl CallStore {
    /// Spawn the store, consuming `session_events` through its queue.
    ///
    /// `buffer` bounds the queue; producers wait when it is full.
    pub fn spawn(
        session_events: mpsc::Receiver<SessionEvent>,
        buffer: usize,
    ) -> (StoreHandle, JoinHandle<()>) {
        let (sender, receiver) = mpsc::channel(buffer.max(1));
        let initial: Snapshot = Arc::new(CallState::default());
        let (state_tx, state_rx) = watch::channel(Arc::clone(&initial));
        let (notifications, _) = broadcast::channel(NOTIFICATION_BUFFER);
        let cancel_token = CancellationToken::new();

        tokio::spawn(pump_session_events(
            session_events,
            sender.clone(),
            cancel_token.clone(),
        ));

        let store = Self {
            receiver,
            state_tx,
            notifications: notifications.clone(),
            cancel_token: cancel_token.clone(),
            state: initial,
            epoch: 0,
            local_user: None,
            pending_join: None,
        };
        let task_handle = tokio::spawn(store.run());

        let handle = StoreHandle {
            sender,
            state: state_rx,
            notifications,
            cancel_token,
        };

        (handle, task_handle)
    }

    #[instrument(skip_all, name = "call.store")]
    async fn run(mut self) {
        debug!(target: "call.store", "Call store started");

        loop {
            tokio::select! {
                () = self.cancel_token.cancelled() => {
                    debug!(target: "call.store", "Call store received cancellation signal");
                    break;
                }

                command = self.receiver.recv() => {
                    match command {
                        Some(command) => self.handle_command(command),
                        None => {
                            debug!(target: "call.store", "All store handles dropped");
                            break;
                        }
                    }
                }
            }
        }

        debug!(target: "call.store", "Call store stopped");
    }

    fn handle_command(&mut self, command: StoreCommand) {
        match command {
            StoreCommand::BeginJoin { cid, respond_to } => {
                debug!(target: "call.store", cid = %cid, "Holding pushes until join completes");
                self.pending_join = Some(PendingJoin {
                    cid,
                    held: Vec::new(),
                });
                let _ = respond_to.send(Ok(Arc::clone(&self.state)));
            }
            StoreCommand::AbandonJoin { cid, respond_to } => {
                self.drop_pending_join(&cid);
                let _ = respond_to.send(Ok(Arc::clone(&self.state)));
            }
            StoreCommand::Dispatch { action, respond_to } => {
                trace!(target: "call.store", action = action.name(), "Dispatching action");
                metrics::record_action_dispatched(action.name());
                let next = reduce(&self.state, &action);
                self.commit(next);
                let _ = respond_to.send(Ok(Arc::clone(&self.state)));
            }
            StoreCommand::ApplyPatch { patch, respond_to } => {
                trace!(target: "call.store", patch = patch.name(), "Applying patch");
                let next = apply_patch(&self.state, &patch);
                self.commit(next);
                let _ = respond_to.send(Ok(Arc::clone(&self.state)));
            }
            StoreCommand::ApplyJoin { joined, respond_to } => {
                let result = self.handle_join(*joined);
                let _ = respond_to.send(result);
            }
            StoreCommand::Session(event) => self.handle_session_event(event),
        }
    }

    fn handle_join(&mut self, joined: JoinedCall) -> Result<Snapshot, CallError> {
        if joined.epoch < self.epoch {
            warn!(
                target: "call.store",
                join_epoch = joined.epoch,
                current_epoch = self.epoch,
                "Refusing join result from a stale session"
            );
            self.drop_pending_join(&joined.call.cid);
            return Err(ValidationError::StaleSession.into());
        }
        self.adopt_epoch(joined.epoch, &joined.user_id);

        info!(
            target: "call.store",
            cid = %joined.call.cid,
            session_id = %joined.session_id,
            participants = joined.participants.len(),
            "Applying join result"
        );

        let cid = joined.call.cid.clone();
        let mut next = apply_patch(&self.state, &StatePatch::CallUpdated(joined.call));
        next = apply_patch(
            &next,
            &StatePatch::CapabilitiesUpdated(joined.own_capabilities),
        );
        next = apply_patch(
            &next,
            &StatePatch::LocalJoined {
                user_id: joined.user_id,
                session_id: joined.session_id.clone(),
            },
        );
        for info in joined.participants {
            if info.session_id == joined.session_id {
                continue;
            }
            next = apply_patch(&next, &StatePatch::ParticipantJoined(info));
        }
        self.commit(next);

        if let Some(pending) = self.take_pending_join(&cid) {
            debug!(
                target: "call.store",
                cid = %cid,
                held = pending.held.len(),
                "Replaying pushes received during join"
            );
            for event in pending.held {
                self.apply_event(&event);
            }
        }

        Ok(Arc::clone(&self.state))
    }

    fn take_pending_join(&mut self, cid: &CallCid) -> Option<PendingJoin> {
        match self.pending_join.take() {
            Some(pending) if &pending.cid == cid => Some(pending),
            other => {
                self.pending_join = other;
                None
            }
        }
    }

    fn drop_pending_join(&mut self, cid: &CallCid) {
        if let Some(pending) = self.take_pending_join(cid) {
            debug!(
                target: "call.store",
                cid = %cid,
                dropped = pending.held.len(),
                "Pending join abandoned"
            );
        }
    }

    /// Whether `event` belongs to a call that is being joined but is not in
    /// the state yet.
    fn should_hold(&self, event: &CoordinatorEvent) -> bool {
        self.pending_join.as_ref().is_some_and(|pending| {
            event.call_cid() == Some(&pending.cid)
                && self.state.call().cid.as_ref() != Some(&pending.cid)
        })
    }

    fn apply_event(&mut self, event: &CoordinatorEvent) {
        for unit in translate(&self.state, self.local_user.as_ref(), event) {
            self.apply_translated(unit);
        }
    }

    fn handle_session_event(&mut self, event: SessionEvent) {
        if event.epoch() < self.epoch {
            debug!(
                target: "call.store",
                event_epoch = event.epoch(),
                current_epoch = self.epoch,
                "Dropping session event from a stale epoch"
            );
            metrics::record_stale_event_dropped();
            return;
        }

        match event {
            SessionEvent::Connected {
                epoch,
                user_id,
                connection_id,
            } => {
                debug!(
                    target: "call.store",
                    epoch = epoch,
                    connection_id = %connection_id,
                    "Session connected"
                );
                self.adopt_epoch(epoch, &user_id);
            }
            SessionEvent::Coordinator { event, .. } => {
                metrics::record_event_processed(event.event_type());
                if self.should_hold(&event) {
                    trace!(
                        target: "call.store",
                        event_type = event.event_type(),
                        "Holding push for pending join"
                    );
                    if let Some(pending) = self.pending_join.as_mut() {
                        pending.held.push(event);
                    }
                    return;
                }
                self.apply_event(&event);
            }
            SessionEvent::Disconnected {
                epoch,
                reason,
                will_reconnect,
            } => {
                if will_reconnect {
                    debug!(
                        target: "call.store",
                        reason = reason.as_str(),
                        "Session interrupted, keeping state"
                    );
                } else {
                    info!(
                        target: "call.store",
                        reason = reason.as_str(),
                        epoch = epoch,
                        "Session ended, discarding call state"
                    );
                    self.advance_epoch(epoch);
                    self.local_user = None;
                    self.pending_join = None;
                    self.commit(apply_patch(&self.state, &StatePatch::Reset));
                }
            }
        }
    }

    fn apply_translated(&mut self, unit: Translated) {
        match unit {
            Translated::Action(action) => {
                metrics::record_action_dispatched(action.name());
                let next = reduce(&self.state, &action);
                self.commit(next);
            }
            Translated::Patch(patch) => {
                let next = apply_patch(&self.state, &patch);
                self.commit(next);
            }
            Translated::Notify(event) => {
                trace!(
                    target: "call.store",
                    event_type = event.event_type(),
                    "Publishing notification"
                );
                // No subscribers is fine.
                let _ = self.notifications.send(event);
            }
        }
    }

    fn adopt_epoch(&mut self, epoch: u64, user_id: &UserId) {
        self.advance_epoch(epoch);
        self.local_user = Some(user_id.clone());
    }

    fn advance_epoch(&mut self, epoch: u64) {
        if epoch > self.epoch {
            debug!(
                target: "call.store",
                previous_epoch = self.epoch,
                epoch = epoch,
                "Adopting new session epoch"
            );
            self.epoch = epoch;
        }
    }

    /// Publish `next` if it differs from the current snapshot.
    fn commit(&mut self, next: CallState) {
        if next == *self.state {
            return;
        }
        self.state = Arc::new(next);
        metrics::set_participants(self.state.participants().len());
        self.state_tx.send_replace(Arc::clone(&self.state));
    }
}

/// Move session events into the store queue, preserving their order.
async fn pump_session_events(
    mut session_events: mpsc::Receiver<SessionEvent>,
    sender: mpsc::Sender<StoreCommand>,
    cancel_token: CancellationToken,
) {
    loop {
        let event = tokio::select! {
            () = cancel_token.cancelled() => break,
            event = session_events.recv() => event,
        };
        let Some(event) = event else {
            debug!(target: "call.store", "Session event stream ended");
            break;
        };
        if sender.send(StoreCommand::Session(event)).await.is_err() {
            break;
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::indexing_slicing)]
mod tests {
    use super::*;
    use crate::models::{CallDetails, EdgeCredentials, ParticipantInfo};
    use crate::retry::TerminationReason;
    use crate::state::TrackType;
    use common::secret::SecretString;
    use common::types::{CallCid, ConnectionId, SessionId};

    fn joined(epoch: u64) -> JoinedCall {
        JoinedCall {
            epoch,
            user_id: UserId::from("alice"),
            call: CallDetails::new(CallCid::new("default", "standup")),
            members: Vec::new(),
            session_id: SessionId::from("s-alice"),
            credentials: EdgeCredentials {
                server_url: "wss://edge.example".into(),
                token: SecretString::from("edge-token"),
            },
            own_capabilities: Vec::new(),
            participants: vec![
                ParticipantInfo {
                    user_id: UserId::from("alice"),
                    session_id: SessionId::from("s-alice"),
                    published_tracks: Vec::new(),
                },
                ParticipantInfo {
                    user_id: UserId::from("bob"),
                    session_id: SessionId::from("s-bob"),
                    published_tracks: vec![TrackType::Audio],
                },
            ],
        }
    }

    fn connected(epoch: u64) -> SessionEvent {
        SessionEvent::Connected {
            epoch,
            user_id: UserId::from("alice"),
            connection_id: ConnectionId::from("conn-1"),
        }
    }

    #[tokio::test]
    async fn test_dispatch_returns_new_snapshot() {
        let (_events_tx, events_rx) = mpsc::channel(8);
        let (store, _task) = CallStore::spawn(events_rx, 8);
        store.apply_join(joined(1)).await.unwrap();

        let snapshot = store
            .dispatch(Action::SetMicrophoneEnabled(true))
            .await
            .unwrap();

        let local = snapshot.local_participant().unwrap();
        assert!(!local.local_track(TrackType::Audio).unwrap().muted);
        assert_eq!(store.state(), snapshot);
    }

    #[tokio::test]
    async fn test_join_seeds_local_and_remote_participants() {
        let (_events_tx, events_rx) = mpsc::channel(8);
        let (store, _task) = CallStore::spawn(events_rx, 8);

        let snapshot = store.apply_join(joined(1)).await.unwrap();

        assert_eq!(snapshot.participants().len(), 2);
        assert!(snapshot.participants()[0].is_local());
        assert_eq!(snapshot.session_id(), Some(&SessionId::from("s-alice")));
        assert!(snapshot
            .participant(&UserId::from("bob"), &SessionId::from("s-bob"))
            .unwrap()
            .remote_track(TrackType::Audio)
            .is_some());
    }

    #[tokio::test]
    async fn test_join_from_stale_epoch_is_refused() {
        let (_events_tx, events_rx) = mpsc::channel(8);
        let (store, _task) = CallStore::spawn(events_rx, 8);

        let current = store.apply_join(joined(2)).await.unwrap();

        let err = store.apply_join(joined(1)).await.unwrap_err();
        assert_eq!(err, CallError::from(ValidationError::StaleSession));
        assert_eq!(store.state(), current);
    }

    #[tokio::test]
    async fn test_events_from_stale_epoch_are_dropped() {
        let (events_tx, events_rx) = mpsc::channel(8);
        let (store, _task) = CallStore::spawn(events_rx, 8);
        let mut watcher = store.subscribe();
        store.apply_join(joined(1)).await.unwrap();

        events_tx.send(connected(2)).await.unwrap();
        for (epoch, user) in [(1, "dave"), (2, "erin")] {
            events_tx
                .send(SessionEvent::Coordinator {
                    epoch,
                    event: CoordinatorEvent::ParticipantJoined {
                        call_cid: CallCid::new("default", "standup"),
                        user_id: UserId::from(user),
                        session_id: SessionId::from(format!("s-{user}")),
                        published_tracks: Vec::new(),
                    },
                })
                .await
                .unwrap();
        }

        // Events are applied in order, so erin's arrival means dave's was handled.
        let state = watcher
            .wait_for(|state| state.participants().len() == 3)
            .await
            .unwrap()
            .clone();
        assert!(state
            .participant(&UserId::from("erin"), &SessionId::from("s-erin"))
            .is_some());
        assert!(state
            .participant(&UserId::from("dave"), &SessionId::from("s-dave"))
            .is_none());
    }

    #[tokio::test]
    async fn test_permanent_disconnect_resets_state() {
        let (events_tx, events_rx) = mpsc::channel(8);
        let (store, _task) = CallStore::spawn(events_rx, 8);
        let mut watcher = store.subscribe();

        store.apply_join(joined(1)).await.unwrap();
        events_tx
            .send(SessionEvent::Disconnected {
                epoch: 1,
                reason: TerminationReason::Cancelled,
                will_reconnect: false,
            })
            .await
            .unwrap();

        watcher
            .wait_for(|state| state.participants().is_empty())
            .await
            .unwrap();
        assert_eq!(*store.state(), CallState::default());
    }

    #[tokio::test]
    async fn test_join_from_ended_session_is_refused() {
        let (events_tx, events_rx) = mpsc::channel(8);
        let (store, _task) = CallStore::spawn(events_rx, 8);
        let mut watcher = store.subscribe();
        store.apply_join(joined(1)).await.unwrap();

        events_tx
            .send(SessionEvent::Disconnected {
                epoch: 2,
                reason: TerminationReason::Cancelled,
                will_reconnect: false,
            })
            .await
            .unwrap();
        watcher
            .wait_for(|state| state.participants().is_empty())
            .await
            .unwrap();

        // Same epoch the session ran under before it ended.
        let err = store.apply_join(joined(1)).await.unwrap_err();

        assert_eq!(err, CallError::from(ValidationError::StaleSession));
        assert_eq!(*store.state(), CallState::default());
    }

    #[tokio::test]
    async fn test_abandoned_join_drops_held_pushes() {
        let (events_tx, events_rx) = mpsc::channel(8);
        let (store, _task) = CallStore::spawn(events_rx, 8);
        let cid = CallCid::new("default", "standup");

        store.begin_join(cid.clone()).await.unwrap();
        events_tx
            .send(SessionEvent::Coordinator {
                epoch: 0,
                event: CoordinatorEvent::ParticipantJoined {
                    call_cid: cid.clone(),
                    user_id: UserId::from("carol"),
                    session_id: SessionId::from("s-carol"),
                    published_tracks: Vec::new(),
                },
            })
            .await
            .unwrap();
        tokio::time::sleep(std::time::Duration::from_millis(50)).await;
        store.abandon_join(cid).await.unwrap();

        let snapshot = store.apply_join(joined(1)).await.unwrap();

        assert_eq!(snapshot.participants().len(), 2);
        assert!(snapshot
            .participant(&UserId::from("carol"), &SessionId::from("s-carol"))
            .is_none());
    }

    #[tokio::test]
    async fn test_unchanged_state_is_not_republished() {
        let (_events_tx, events_rx) = mpsc::channel(8);
        let (store, _task) = CallStore::spawn(events_rx, 8);
        let mut watcher = store.subscribe();
        watcher.mark_unchanged();

        // No local participant: nothing to toggle.
        store
            .dispatch(Action::SetCameraEnabled(true))
            .await
            .unwrap();

        assert!(!watcher.has_changed().unwrap());
    }
}
