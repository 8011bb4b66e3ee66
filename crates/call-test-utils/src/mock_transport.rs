//! Mock coordinator transport.
//!
//! Each `open` consumes the next scripted outcome (accept when the script is
//! empty). Accepted connections become [`MockLink`]s that tests drive
//! directly: push events, close with a reason, or drop the connection.
//!
//! # Example
//!
//! ```rust,ignore
//! let transport = MockTransport::new();
//! transport.fail_next(CallError::transport("connection refused", true));
//!
//! // First attempt fails, the retry is accepted.
//! session.connect_user(test_user("alice")).await.unwrap();
//! assert_eq!(transport.open_count(), 2);
//! ```

use async_trait::async_trait;
use call_client::errors::CallError;
use call_client::events::CoordinatorEvent;
use call_client::retry::TerminationReason;
use call_client::transport::{ConnectRequest, InboundFrame, Transport, TransportLink};
use common::secret::ExposeSecret;
use common::types::{ConnectionId, UserId};
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use tokio::sync::{mpsc, Notify};
use tokio_util::sync::CancellationToken;

/// Capacity of each mock link's frame channel.
const LINK_BUFFER: usize = 64;

/// What the next `open` does.
#[derive(Debug, Clone)]
pub enum ScriptedOpen {
    Accept,
    Fail(CallError),
    /// Never resolves on its own; ends only when the attempt is cancelled or
    /// times out.
    Hang,
}

/// A connection attempt as the transport saw it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordedConnect {
    pub user_id: UserId,
    pub credential: String,
    pub api_key: String,
}

/// Test-side control of one accepted connection.
#[derive(Clone)]
pub struct MockLink {
    connection_id: ConnectionId,
    sender: Arc<Mutex<Option<mpsc::Sender<InboundFrame>>>>,
    shutdown: CancellationToken,
}

impl std::fmt::Debug for MockLink {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MockLink")
            .field("connection_id", &self.connection_id)
            .field("shut_down", &self.shutdown.is_cancelled())
            .finish()
    }
}

impl MockLink {
    #[must_use]
    pub fn connection_id(&self) -> &ConnectionId {
        &self.connection_id
    }

    fn sender(&self) -> Option<mpsc::Sender<InboundFrame>> {
        self.sender.lock().unwrap().clone()
    }

    /// Push a coordinator event. Waits for channel capacity; does nothing if
    /// the link is already gone.
    pub async fn push(&self, event: CoordinatorEvent) {
        if let Some(sender) = self.sender() {
            let _ = sender.send(InboundFrame::Event(event)).await;
        }
    }

    /// End the connection with an explicit reason.
    pub async fn close(&self, reason: TerminationReason) {
        if let Some(sender) = self.sender.lock().unwrap().take() {
            let _ = sender.try_send(InboundFrame::Closed(reason));
        }
    }

    /// Drop the connection without a close frame (network failure).
    pub fn drop_connection(&self) {
        self.sender.lock().unwrap().take();
    }

    /// Whether the client cancelled this link.
    #[must_use]
    pub fn is_shut_down(&self) -> bool {
        self.shutdown.is_cancelled()
    }

    /// Wait until the client cancels this link.
    pub async fn wait_for_shutdown(&self) {
        self.shutdown.cancelled().await;
    }
}

#[derive(Default)]
struct MockTransportState {
    script: VecDeque<ScriptedOpen>,
    requests: Vec<RecordedConnect>,
    links: Vec<MockLink>,
}

/// Mock implementation of [`Transport`].
#[derive(Clone, Default)]
pub struct MockTransport {
    state: Arc<Mutex<MockTransportState>>,
    opened: Arc<Notify>,
}

impl std::fmt::Debug for MockTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.state.lock().unwrap();
        f.debug_struct("MockTransport")
            .field("scripted", &state.script.len())
            .field("opens", &state.requests.len())
            .field("links", &state.links.len())
            .finish()
    }
}

impl MockTransport {
    /// A transport that accepts every connection.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue an outcome for a future `open`.
    pub fn script(&self, outcome: ScriptedOpen) -> &Self {
        self.state.lock().unwrap().script.push_back(outcome);
        self
    }

    /// The next `open` fails with `error`.
    pub fn fail_next(&self, error: CallError) -> &Self {
        self.script(ScriptedOpen::Fail(error))
    }

    /// The next `open` never completes.
    pub fn hang_next(&self) -> &Self {
        self.script(ScriptedOpen::Hang)
    }

    /// Number of `open` calls so far.
    #[must_use]
    pub fn open_count(&self) -> usize {
        self.state.lock().unwrap().requests.len()
    }

    /// Every `open` call so far, in order.
    #[must_use]
    pub fn requests(&self) -> Vec<RecordedConnect> {
        self.state.lock().unwrap().requests.clone()
    }

    /// Accepted links, in order.
    #[must_use]
    pub fn links(&self) -> Vec<MockLink> {
        self.state.lock().unwrap().links.clone()
    }

    /// The most recently accepted link.
    ///
    /// # Panics
    ///
    /// Panics if no connection was accepted yet.
    #[must_use]
    pub fn latest_link(&self) -> MockLink {
        self.state
            .lock()
            .unwrap()
            .links
            .last()
            .cloned()
            .expect("no connection has been accepted")
    }

    /// Wait until at least `count` connections were accepted.
    pub async fn wait_for_links(&self, count: usize) {
        loop {
            let notified = self.opened.notified();
            if self.state.lock().unwrap().links.len() >= count {
                return;
            }
            notified.await;
        }
    }
}

#[async_trait]
impl Transport for MockTransport {
    async fn open(&self, request: ConnectRequest) -> Result<TransportLink, CallError> {
        let outcome = {
            let mut state = self.state.lock().unwrap();
            state.requests.push(RecordedConnect {
                user_id: request.user.id.clone(),
                credential: request.credential.expose_secret().to_string(),
                api_key: request.api_key.expose_secret().to_string(),
            });
            state.script.pop_front().unwrap_or(ScriptedOpen::Accept)
        };

        match outcome {
            ScriptedOpen::Accept => {}
            ScriptedOpen::Fail(error) => return Err(error),
            ScriptedOpen::Hang => {
                request.shutdown.cancelled().await;
                return Err(CallError::transport("connection attempt abandoned", false));
            }
        }

        let (tx, rx) = mpsc::channel(LINK_BUFFER);
        let link = {
            let mut state = self.state.lock().unwrap();
            let link = MockLink {
                connection_id: ConnectionId::from(format!("conn-{}", state.links.len() + 1)),
                sender: Arc::new(Mutex::new(Some(tx))),
                shutdown: request.shutdown.clone(),
            };
            state.links.push(link.clone());
            link
        };

        // Like a real socket: the sender goes away once the client closes.
        let watched = link.clone();
        tokio::spawn(async move {
            watched.shutdown.cancelled().await;
            watched.drop_connection();
        });

        self.opened.notify_waiters();

        Ok(TransportLink {
            connection_id: link.connection_id.clone(),
            inbound: rx,
        })
    }
}
