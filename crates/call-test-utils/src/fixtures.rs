//! Test fixtures: users, calls, events and ready-made session wiring.

use call_client::events::CoordinatorEvent;
use call_client::location::StaticLocationProvider;
use call_client::models::{
    CallDetails, Capability, EdgeCredentials, JoinCallResponse, ParticipantInfo, User,
};
use call_client::retry::RetryPolicy;
use call_client::session::{SessionDependencies, SessionSettings};
use call_client::state::TrackType;
use common::secret::SecretString;
use common::types::{CallCid, SessionId, UserId};
use std::sync::Arc;
use std::time::Duration;

use crate::credentials::RotatingCredentialProvider;
use crate::mock_api::MockCoordinatorApi;
use crate::mock_transport::MockTransport;

/// API key every test session is configured with.
pub const TEST_API_KEY: &str = "test-api-key";

/// Location the static provider reports.
pub const TEST_LOCATION: &str = "FRA";

#[must_use]
pub fn test_user(id: &str) -> User {
    User {
        name: Some(format!("{id} (test)")),
        ..User::new(id)
    }
}

/// `default:standup`
#[must_use]
pub fn test_cid() -> CallCid {
    CallCid::new("default", "standup")
}

#[must_use]
pub fn participant_info(user_id: &str, session_id: &str, tracks: &[TrackType]) -> ParticipantInfo {
    ParticipantInfo {
        user_id: UserId::from(user_id),
        session_id: SessionId::from(session_id),
        published_tracks: tracks.to_vec(),
    }
}

/// Join response for `cid` where this client got `session_id`.
#[must_use]
pub fn join_response(
    cid: CallCid,
    session_id: &str,
    participants: Vec<ParticipantInfo>,
) -> JoinCallResponse {
    JoinCallResponse {
        call: CallDetails::new(cid),
        members: Vec::new(),
        session_id: SessionId::from(session_id),
        credentials: EdgeCredentials {
            server_url: "wss://edge.example.test".into(),
            token: SecretString::from("edge-token"),
        },
        own_capabilities: vec![
            Capability::SendAudio,
            Capability::SendVideo,
            Capability::Screenshare,
        ],
        participants,
    }
}

#[must_use]
pub fn participant_joined_event(user_id: &str, session_id: &str) -> CoordinatorEvent {
    CoordinatorEvent::ParticipantJoined {
        call_cid: test_cid(),
        user_id: UserId::from(user_id),
        session_id: SessionId::from(session_id),
        published_tracks: Vec::new(),
    }
}

#[must_use]
pub fn participant_left_event(user_id: &str, session_id: &str) -> CoordinatorEvent {
    CoordinatorEvent::ParticipantLeft {
        call_cid: test_cid(),
        user_id: UserId::from(user_id),
        session_id: SessionId::from(session_id),
    }
}

#[must_use]
pub fn track_published_event(
    user_id: &str,
    session_id: &str,
    track_type: TrackType,
) -> CoordinatorEvent {
    CoordinatorEvent::TrackPublished {
        call_cid: test_cid(),
        user_id: UserId::from(user_id),
        session_id: SessionId::from(session_id),
        track_type,
    }
}

/// Short, deterministic backoff: 100ms doubling to 1s, five attempts.
#[must_use]
pub fn fast_retry_policy() -> RetryPolicy {
    RetryPolicy::new(Duration::from_millis(100), Duration::from_secs(1), Some(5))
        .with_connect_timeout(Duration::from_secs(2))
}

#[must_use]
pub fn test_settings() -> SessionSettings {
    SessionSettings::new(SecretString::from(TEST_API_KEY))
        .with_retry_policy(fast_retry_policy())
        .with_event_buffer(16)
        .with_request_timeout(Duration::from_secs(5))
}

/// Session dependencies backed by the given mocks and a static location.
#[must_use]
pub fn test_dependencies(
    transport: &MockTransport,
    api: &MockCoordinatorApi,
    credentials: &Arc<RotatingCredentialProvider>,
) -> SessionDependencies {
    SessionDependencies {
        transport: Arc::new(transport.clone()),
        api: Arc::new(api.clone()),
        credentials: Arc::clone(credentials) as _,
        location: Arc::new(StaticLocationProvider::new(TEST_LOCATION)),
    }
}
