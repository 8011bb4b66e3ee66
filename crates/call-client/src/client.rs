//! `CallClient`: a session client and a call store wired together.
//!
//! The session client's event stream feeds the store's queue, so a single
//! task applies everything to the call state. Join results go through the
//! same queue, and pushes for a call being joined wait there for the join.

use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::{info, warn};

use crate::action::Action;
use crate::backend::JoinCallOptions;
use crate::errors::{CallError, ValidationError};
use crate::models::{JoinedCall, User};
use crate::session::{SessionClient, SessionClientHandle, SessionDependencies, SessionSettings};
use crate::state::CallState;
use crate::store::{CallStore, StoreHandle};

/// A running call client.
#[derive(Debug)]
pub struct CallClient {
    session: SessionClientHandle,
    store: StoreHandle,
    session_task: JoinHandle<()>,
    store_task: JoinHandle<()>,
}

impl CallClient {
    /// Spawn the session client and the store.
    pub fn start(dependencies: SessionDependencies, settings: SessionSettings) -> Self {
        let buffer = settings.event_buffer;
        let (session, events, session_task) = SessionClient::spawn(dependencies, settings);
        let (store, store_task) = CallStore::spawn(events, buffer);

        Self {
            session,
            store,
            session_task,
            store_task,
        }
    }

    /// Lifecycle and backend calls.
    #[must_use]
    pub fn session(&self) -> &SessionClientHandle {
        &self.session
    }

    /// State access and local actions.
    #[must_use]
    pub fn store(&self) -> &StoreHandle {
        &self.store
    }

    pub async fn connect_user(&self, user: User) -> Result<(), CallError> {
        self.session.connect_user(user).await
    }

    /// Join a call and seed the state from the result.
    ///
    /// Pushes for the call that arrive while the backend join is in flight
    /// are applied right after the join result. Fails with `StaleSession`
    /// if the session ended while the join was in flight.
    pub async fn join_call(
        &self,
        options: JoinCallOptions,
    ) -> Result<(JoinedCall, Arc<CallState>), CallError> {
        let cid = options.cid.clone();
        self.store.begin_join(cid.clone()).await?;

        let joined = match self.session.join_call(options).await {
            Ok(joined) => joined,
            Err(err) => {
                let _ = self.store.abandon_join(cid).await;
                return Err(err);
            }
        };

        let current_epoch = self.session.status().epoch;
        if joined.epoch != current_epoch {
            warn!(
                target: "call.session",
                cid = %cid,
                join_epoch = joined.epoch,
                current_epoch = current_epoch,
                "Session ended while joining, discarding join result"
            );
            let _ = self.store.abandon_join(cid).await;
            return Err(ValidationError::StaleSession.into());
        }

        let state = self.store.apply_join(joined.clone()).await?;
        info!(
            target: "call.session",
            cid = %joined.call.cid,
            session_id = %joined.session_id,
            "Joined call"
        );
        Ok((joined, state))
    }

    pub async fn dispatch(&self, action: Action) -> Result<Arc<CallState>, CallError> {
        self.store.dispatch(action).await
    }

    /// Disconnect the user and stop both actors.
    pub async fn shutdown(self) {
        // Best effort: the session may already be idle.
        let _ = self.session.disconnect_user().await;
        self.session.shutdown();
        let _ = self.session_task.await;
        self.store.shutdown();
        let _ = self.store_task.await;
    }
}
