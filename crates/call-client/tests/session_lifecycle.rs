//! Session client lifecycle tests.
//!
//! Covers binding, single ownership, open/close and unbinding against the
//! mock transport.

#![allow(clippy::unwrap_used, clippy::expect_used, clippy::indexing_slicing)]

use std::sync::Arc;
use std::time::Duration;

use call_client::errors::{CallError, ValidationError};
use call_client::retry::TerminationReason;
use call_client::session::{ConnectionState, SessionClient, SessionEvent};
use call_test_utils::*;
use common::types::{ConnectionId, UserId};
use tokio::sync::mpsc;

async fn next_event(events: &mut mpsc::Receiver<SessionEvent>) -> SessionEvent {
    tokio::time::timeout(Duration::from_secs(5), events.recv())
        .await
        .expect("timed out waiting for session event")
        .expect("session event stream ended")
}

struct Harness {
    transport: MockTransport,
    credentials: Arc<RotatingCredentialProvider>,
    session: call_client::session::SessionClientHandle,
    events: mpsc::Receiver<SessionEvent>,
}

fn harness() -> Harness {
    let transport = MockTransport::new();
    let api = MockCoordinatorApi::builder().build();
    let credentials = Arc::new(RotatingCredentialProvider::new());
    let (session, events, _task) = SessionClient::spawn(
        test_dependencies(&transport, &api, &credentials),
        test_settings(),
    );
    Harness {
        transport,
        credentials,
        session,
        events,
    }
}

// ============================================================================
// connect_user
// ============================================================================

#[tokio::test]
async fn test_connect_user_opens_connection() {
    let mut h = harness();

    h.session.connect_user(test_user("alice")).await.unwrap();

    let status = h.session.status();
    assert_eq!(status.state, ConnectionState::Connected);
    assert_eq!(status.user_id, Some(UserId::from("alice")));
    assert_eq!(status.connection_id, Some(ConnectionId::from("conn-1")));
    assert_eq!(status.epoch, 1);

    assert_eq!(
        next_event(&mut h.events).await,
        SessionEvent::Connected {
            epoch: 1,
            user_id: UserId::from("alice"),
            connection_id: ConnectionId::from("conn-1"),
        }
    );

    let requests = h.transport.requests();
    assert_eq!(requests.len(), 1);
    assert_eq!(requests[0].credential, "token-1");
    assert_eq!(requests[0].api_key, TEST_API_KEY);
    assert_eq!(requests[0].user_id, UserId::from("alice"));
}

#[tokio::test]
async fn test_second_connect_user_is_rejected() {
    let h = harness();
    h.session.connect_user(test_user("alice")).await.unwrap();

    let err = h.session.connect_user(test_user("bob")).await.unwrap_err();

    assert_eq!(
        err,
        CallError::from(ValidationError::SessionAlreadyBound {
            user_id: UserId::from("alice")
        })
    );
    assert_eq!(h.transport.open_count(), 1);
    assert_eq!(h.session.status().user_id, Some(UserId::from("alice")));
    assert!(!h.transport.latest_link().is_shut_down());
}

#[tokio::test]
async fn test_concurrent_connect_user_admits_one() {
    let h = harness();
    let first = h.session.clone();
    let second = h.session.clone();

    let (a, b) = tokio::join!(
        first.connect_user(test_user("alice")),
        second.connect_user(test_user("bob")),
    );

    let results = [a, b];
    let succeeded = results.iter().filter(|r| r.is_ok()).count();
    let rejected = results
        .iter()
        .filter(|r| {
            matches!(
                r,
                Err(CallError::Validation(
                    ValidationError::SessionAlreadyBound { .. }
                ))
            )
        })
        .count();
    assert_eq!(succeeded, 1);
    assert_eq!(rejected, 1);
    assert_eq!(h.transport.open_count(), 1);
}

#[tokio::test]
async fn test_rejected_connect_unbinds_user() {
    let h = harness();
    h.transport
        .fail_next(CallError::transport("protocol mismatch", false));

    let err = h.session.connect_user(test_user("alice")).await.unwrap_err();

    assert!(!err.is_retryable());
    let status = h.session.status();
    assert_eq!(status.state, ConnectionState::Idle);
    assert!(status.user_id.is_none());

    // The session is free again, under a fresh epoch.
    h.session.connect_user(test_user("alice")).await.unwrap();
    assert_eq!(h.session.status().epoch, 3);
}

#[tokio::test]
async fn test_unavailable_credential_fails_without_io() {
    let h = harness();
    h.credentials.set_unavailable(true);

    let err = h.session.connect_user(test_user("alice")).await.unwrap_err();

    assert!(matches!(err, CallError::Authentication(_)));
    assert_eq!(h.transport.open_count(), 0);
    // One refresh was tried before giving up.
    assert_eq!(h.credentials.invalidations(), 1);
    assert!(h.session.status().user_id.is_none());
}

// ============================================================================
// open_connection / close_connection
// ============================================================================

#[tokio::test]
async fn test_open_connection_preconditions() {
    let h = harness();

    assert_eq!(
        h.session.open_connection().await.unwrap_err(),
        CallError::from(ValidationError::NoUserBound)
    );
    assert_eq!(
        h.session.close_connection().await.unwrap_err(),
        CallError::from(ValidationError::NoUserBound)
    );

    h.session.connect_user(test_user("alice")).await.unwrap();
    assert_eq!(
        h.session.open_connection().await.unwrap_err(),
        CallError::from(ValidationError::ConnectionAlreadyOpen)
    );
}

#[tokio::test]
async fn test_close_connection_keeps_user_bound() {
    let mut h = harness();
    h.session.connect_user(test_user("alice")).await.unwrap();
    let link = h.transport.latest_link();

    h.session.close_connection().await.unwrap();

    assert!(link.is_shut_down());
    let status = h.session.status();
    assert_eq!(status.state, ConnectionState::Idle);
    assert_eq!(status.user_id, Some(UserId::from("alice")));
    assert!(status.connection_id.is_none());

    assert!(matches!(
        next_event(&mut h.events).await,
        SessionEvent::Connected { .. }
    ));
    // Closing ends the epoch the connection ran under.
    assert_eq!(
        next_event(&mut h.events).await,
        SessionEvent::Disconnected {
            epoch: 2,
            reason: TerminationReason::Cancelled,
            will_reconnect: false,
        }
    );
    assert_eq!(status.epoch, 2);

    assert_eq!(
        h.session.close_connection().await.unwrap_err(),
        CallError::from(ValidationError::ConnectionAlreadyClosed)
    );
}

#[tokio::test]
async fn test_reopen_after_close_runs_under_new_epoch() {
    let mut h = harness();
    h.session.connect_user(test_user("alice")).await.unwrap();
    h.session.close_connection().await.unwrap();

    h.session.open_connection().await.unwrap();

    let status = h.session.status();
    assert_eq!(status.state, ConnectionState::Connected);
    assert_eq!(status.connection_id, Some(ConnectionId::from("conn-2")));
    assert_eq!(status.epoch, 2);
    assert_eq!(status.user_id, Some(UserId::from("alice")));

    let epochs: Vec<u64> = [
        next_event(&mut h.events).await,
        next_event(&mut h.events).await,
        next_event(&mut h.events).await,
    ]
    .iter()
    .map(SessionEvent::epoch)
    .collect();
    assert_eq!(epochs, vec![1, 2, 2]);
}

#[tokio::test]
async fn test_events_are_forwarded_in_order() {
    let mut h = harness();
    h.session.connect_user(test_user("alice")).await.unwrap();
    let link = h.transport.latest_link();

    link.push(participant_joined_event("bob", "s-bob")).await;
    link.push(participant_left_event("bob", "s-bob")).await;

    assert!(matches!(
        next_event(&mut h.events).await,
        SessionEvent::Connected { .. }
    ));
    assert_eq!(
        next_event(&mut h.events).await,
        SessionEvent::Coordinator {
            epoch: 1,
            event: participant_joined_event("bob", "s-bob"),
        }
    );
    assert_eq!(
        next_event(&mut h.events).await,
        SessionEvent::Coordinator {
            epoch: 1,
            event: participant_left_event("bob", "s-bob"),
        }
    );
}

// ============================================================================
// disconnect_user
// ============================================================================

#[tokio::test]
async fn test_disconnect_user_is_idempotent() {
    let h = harness();
    h.session.connect_user(test_user("alice")).await.unwrap();
    let link = h.transport.latest_link();

    h.session.disconnect_user().await.unwrap();
    h.session.disconnect_user().await.unwrap();

    assert!(link.is_shut_down());
    let status = h.session.status();
    assert_eq!(status.state, ConnectionState::Idle);
    assert!(status.user_id.is_none());
    assert_eq!(status.epoch, 2);
}

#[tokio::test]
async fn test_disconnect_user_while_idle_ends_epoch() {
    let mut h = harness();
    h.session.connect_user(test_user("alice")).await.unwrap();
    h.session.close_connection().await.unwrap();

    h.session.disconnect_user().await.unwrap();

    let events = [
        next_event(&mut h.events).await,
        next_event(&mut h.events).await,
        next_event(&mut h.events).await,
    ];
    assert_eq!(
        events[2],
        SessionEvent::Disconnected {
            epoch: 3,
            reason: TerminationReason::Cancelled,
            will_reconnect: false,
        }
    );
    assert_eq!(h.session.status().epoch, 3);
}

#[tokio::test]
async fn test_rebinding_starts_new_epoch() {
    let mut h = harness();
    h.session.connect_user(test_user("alice")).await.unwrap();
    h.session.disconnect_user().await.unwrap();

    h.session.connect_user(test_user("bob")).await.unwrap();

    // alice's session ran under 1, ending it moved to 2, binding bob to 3.
    assert_eq!(h.session.status().epoch, 3);
    let mut last = None;
    for _ in 0..3 {
        last = Some(next_event(&mut h.events).await);
    }
    assert_eq!(
        last,
        Some(SessionEvent::Connected {
            epoch: 3,
            user_id: UserId::from("bob"),
            connection_id: ConnectionId::from("conn-2"),
        })
    );
}

#[tokio::test]
async fn test_shutdown_closes_live_link() {
    let h = harness();
    h.session.connect_user(test_user("alice")).await.unwrap();
    let link = h.transport.latest_link();

    h.session.shutdown();

    tokio::time::timeout(Duration::from_secs(5), link.wait_for_shutdown())
        .await
        .expect("link was not closed on shutdown");
}
