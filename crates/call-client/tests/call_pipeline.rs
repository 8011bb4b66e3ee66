//! End-to-end tests: session events flowing through the store into state.

#![allow(clippy::unwrap_used, clippy::expect_used, clippy::indexing_slicing)]

use std::sync::Arc;
use std::time::Duration;

use call_client::action::{Action, RemoveSubscription, SubscriptionChange, UpdateSubscription};
use call_client::backend::JoinCallOptions;
use call_client::errors::{CallError, ValidationError};
use call_client::events::CoordinatorEvent;
use call_client::models::JoinCallResponse;
use call_client::session::ConnectionState;
use call_client::state::{CallState, CameraPosition, TrackType, VideoDimension};
use call_client::CallClient;
use call_test_utils::*;
use common::types::{SessionId, UserId};

struct Harness {
    transport: MockTransport,
    client: CallClient,
}

fn standup_join_response() -> JoinCallResponse {
    join_response(
        test_cid(),
        "s-alice",
        vec![
            participant_info("alice", "s-alice", &[]),
            participant_info("bob", "s-bob", &[TrackType::Audio, TrackType::Video]),
        ],
    )
}

/// A connected client whose backend join takes `join_latency`.
async fn connected_client(join_latency: Duration) -> Harness {
    let transport = MockTransport::new();
    let api = MockCoordinatorApi::builder()
        .with_join_response(standup_join_response())
        .with_latency(join_latency)
        .build();
    let credentials = Arc::new(RotatingCredentialProvider::new());
    let client = CallClient::start(
        test_dependencies(&transport, &api, &credentials),
        test_settings(),
    );

    client.connect_user(test_user("alice")).await.unwrap();
    Harness { transport, client }
}

async fn joined_client() -> Harness {
    let h = connected_client(Duration::ZERO).await;
    h.client
        .join_call(JoinCallOptions::new(test_cid()))
        .await
        .unwrap();
    h
}

async fn wait_for_state<F>(client: &CallClient, predicate: F) -> Arc<CallState>
where
    F: Fn(&CallState) -> bool,
{
    let mut rx = client.store().subscribe();
    let state = tokio::time::timeout(Duration::from_secs(5), rx.wait_for(|s| predicate(s)))
        .await
        .expect("timed out waiting for state")
        .expect("store stopped");
    Arc::clone(&state)
}

fn key(user: &str) -> (UserId, SessionId) {
    (UserId::from(user), SessionId::from(format!("s-{user}")))
}

#[tokio::test]
async fn test_join_seeds_state() {
    let h = joined_client().await;

    let state = h.client.store().state();
    assert_eq!(state.session_id(), Some(&SessionId::from("s-alice")));
    assert_eq!(state.participants().len(), 2);
    assert_eq!(state.participants().iter().filter(|p| p.is_local()).count(), 1);
    assert_eq!(state.call().cid, Some(test_cid()));

    let (bob, bob_session) = key("bob");
    let bob = state.participant(&bob, &bob_session).unwrap();
    assert!(!bob.remote_track(TrackType::Video).unwrap().subscribed);
}

#[tokio::test]
async fn test_pushes_during_join_are_applied_after_it() {
    let h = connected_client(Duration::from_millis(300)).await;
    let link = h.transport.latest_link();

    let (joined, ()) = tokio::join!(
        h.client.join_call(JoinCallOptions::new(test_cid())),
        async {
            tokio::time::sleep(Duration::from_millis(50)).await;
            link.push(participant_joined_event("carol", "s-carol")).await;
            link.push(track_published_event("carol", "s-carol", TrackType::Audio))
                .await;
        },
    );

    let (_, state) = joined.unwrap();
    let (carol, carol_session) = key("carol");
    let carol = state.participant(&carol, &carol_session).unwrap();
    assert!(carol.remote_track(TrackType::Audio).is_some());
    assert_eq!(state.participants().len(), 3);
}

#[tokio::test]
async fn test_join_finishing_after_disconnect_is_discarded() {
    let h = connected_client(Duration::from_millis(300)).await;

    let (joined, ()) = tokio::join!(
        h.client.join_call(JoinCallOptions::new(test_cid())),
        async {
            tokio::time::sleep(Duration::from_millis(50)).await;
            h.client.session().disconnect_user().await.unwrap();
        },
    );

    assert_eq!(
        joined.unwrap_err(),
        CallError::from(ValidationError::StaleSession)
    );
    // Give any queued session events time to land.
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(*h.client.store().state(), CallState::default());
    assert!(h.client.session().status().user_id.is_none());
}

#[tokio::test]
async fn test_join_finishing_after_close_is_discarded() {
    let h = connected_client(Duration::from_millis(300)).await;

    let (joined, ()) = tokio::join!(
        h.client.join_call(JoinCallOptions::new(test_cid())),
        async {
            tokio::time::sleep(Duration::from_millis(50)).await;
            h.client.session().close_connection().await.unwrap();
        },
    );

    assert!(joined.is_err());
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(h.client.store().state().participants().is_empty());
}

#[tokio::test]
async fn test_toggle_camera_on_fresh_local_participant() {
    let h = joined_client().await;

    let state = h
        .client
        .dispatch(Action::SetCameraEnabled(true))
        .await
        .unwrap();

    let video = state
        .local_participant()
        .unwrap()
        .local_track(TrackType::Video)
        .unwrap();
    assert!(!video.muted);
    assert_eq!(video.camera_position, Some(CameraPosition::Front));
}

#[tokio::test]
async fn test_batched_subscription_update() {
    let h = joined_client().await;
    let link = h.transport.latest_link();
    link.push(participant_joined_event("carol", "s-carol")).await;
    link.push(track_published_event("carol", "s-carol", TrackType::Audio))
        .await;
    wait_for_state(&h.client, |s| {
        let (carol, session) = key("carol");
        s.participant(&carol, &session)
            .is_some_and(|p| p.remote_track(TrackType::Audio).is_some())
    })
    .await;

    // Subscribe to carol's audio first so the removal has something to reset.
    let (carol, carol_session) = key("carol");
    h.client
        .dispatch(Action::UpdateSubscription(UpdateSubscription {
            user_id: carol.clone(),
            session_id: carol_session.clone(),
            track_type: TrackType::Audio,
            dimension: None,
        }))
        .await
        .unwrap();

    let (bob, bob_session) = key("bob");
    let hd = VideoDimension {
        width: 1280,
        height: 720,
    };
    let state = h
        .client
        .dispatch(Action::UpdateSubscriptions(vec![
            SubscriptionChange::Update(UpdateSubscription {
                user_id: bob.clone(),
                session_id: bob_session.clone(),
                track_type: TrackType::Video,
                dimension: Some(hd),
            }),
            SubscriptionChange::Remove(RemoveSubscription {
                user_id: carol.clone(),
                session_id: carol_session.clone(),
                track_type: TrackType::Audio,
            }),
        ]))
        .await
        .unwrap();

    let bob_video = state
        .participant(&bob, &bob_session)
        .unwrap()
        .remote_track(TrackType::Video)
        .unwrap();
    assert!(bob_video.subscribed);
    assert_eq!(bob_video.video_dimension, Some(hd));

    let carol = state.participant(&carol, &carol_session).unwrap();
    assert!(!carol.remote_track(TrackType::Audio).unwrap().subscribed);
}

#[tokio::test]
async fn test_pushed_events_apply_in_arrival_order() {
    let h = joined_client().await;
    let link = h.transport.latest_link();

    // Join, leave, join again: only the final presence matters.
    link.push(participant_joined_event("dave", "s-dave")).await;
    link.push(participant_left_event("dave", "s-dave")).await;
    link.push(participant_joined_event("dave", "s-dave")).await;
    link.push(participant_left_event("bob", "s-bob")).await;

    let state = wait_for_state(&h.client, |s| {
        let (bob, bob_session) = key("bob");
        s.participant(&bob, &bob_session).is_none()
    })
    .await;

    let (dave, dave_session) = key("dave");
    assert!(state.participant(&dave, &dave_session).is_some());
    assert_eq!(state.participants().len(), 2);
}

#[tokio::test]
async fn test_events_for_other_calls_are_ignored() {
    let h = joined_client().await;
    let link = h.transport.latest_link();

    link.push(CoordinatorEvent::ParticipantJoined {
        call_cid: common::types::CallCid::new("default", "other"),
        user_id: UserId::from("eve"),
        session_id: SessionId::from("s-eve"),
        published_tracks: Vec::new(),
    })
    .await;
    link.push(participant_joined_event("frank", "s-frank")).await;

    let state = wait_for_state(&h.client, |s| s.participants().len() == 3).await;
    let (eve, eve_session) = key("eve");
    assert!(state.participant(&eve, &eve_session).is_none());
}

#[tokio::test]
async fn test_forced_mute_disables_local_microphone() {
    let h = joined_client().await;
    let mut notifications = h.client.store().notifications();
    h.client
        .dispatch(Action::SetMicrophoneEnabled(true))
        .await
        .unwrap();

    h.transport
        .latest_link()
        .push(CoordinatorEvent::UserMuted {
            call_cid: test_cid(),
            from_user_id: UserId::from("bob"),
            muted_user_ids: vec![UserId::from("alice")],
            audio: true,
            video: false,
            screenshare: false,
        })
        .await;

    let state = wait_for_state(&h.client, |s| {
        s.local_participant()
            .and_then(|p| p.local_track(TrackType::Audio))
            .is_some_and(|t| t.muted)
    })
    .await;
    assert!(state.local_participant().is_some());

    let notification = tokio::time::timeout(Duration::from_secs(5), notifications.recv())
        .await
        .unwrap()
        .unwrap();
    assert!(matches!(notification, CoordinatorEvent::UserMuted { .. }));
}

#[tokio::test]
async fn test_call_ended_discards_participants() {
    let h = joined_client().await;
    let mut notifications = h.client.store().notifications();

    h.transport
        .latest_link()
        .push(CoordinatorEvent::CallEnded {
            call_cid: test_cid(),
        })
        .await;

    let state = wait_for_state(&h.client, |s| s.call().ended).await;
    assert!(state.participants().is_empty());
    assert_eq!(state.call().cid, Some(test_cid()));

    let notification = tokio::time::timeout(Duration::from_secs(5), notifications.recv())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(
        notification,
        CoordinatorEvent::CallEnded {
            call_cid: test_cid()
        }
    );
}

#[tokio::test]
async fn test_state_survives_reconnect() {
    let h = joined_client().await;
    h.transport.latest_link().drop_connection();
    h.transport.wait_for_links(2).await;

    // Events on the new link still apply to the same call.
    h.transport
        .latest_link()
        .push(participant_joined_event("grace", "s-grace"))
        .await;

    let state = wait_for_state(&h.client, |s| s.participants().len() == 3).await;
    assert_eq!(state.session_id(), Some(&SessionId::from("s-alice")));
    assert_eq!(
        h.client.session().status().state,
        ConnectionState::Connected
    );
}

#[tokio::test]
async fn test_close_connection_discards_state() {
    let h = joined_client().await;

    h.client.session().close_connection().await.unwrap();

    let state = wait_for_state(&h.client, |s| s.participants().is_empty()).await;
    assert_eq!(*state, CallState::default());
}

#[tokio::test]
async fn test_shutdown_stops_both_actors() {
    let h = joined_client().await;
    let link = h.transport.latest_link();

    tokio::time::timeout(Duration::from_secs(5), h.client.shutdown())
        .await
        .expect("shutdown hung");

    assert!(link.is_shut_down());
}
