//! Coordinator push events and their translation into state changes.
//!
//! Events arrive as tagged JSON (`{"type": "call.session_participant_joined", ...}`).
//! Unknown event types decode to [`CoordinatorEvent::Unknown`] and are ignored,
//! so a newer coordinator never breaks an older client.
//!
//! [`translate`] is pure: it looks at the current snapshot and an event and
//! returns what the store should do, in order. It never touches state itself.

use common::types::{CallCid, ConnectionId, SessionId, UserId};
use serde::{Deserialize, Serialize};

use crate::action::Action;
use crate::models::{CallDetails, Capability, ParticipantInfo, Reaction};
use crate::reducer::StatePatch;
use crate::state::{CallState, TrackType};

/// A server-push message from the coordinator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum CoordinatorEvent {
    #[serde(rename = "connection.ok")]
    ConnectionOk { connection_id: ConnectionId },

    #[serde(rename = "health.check")]
    HealthCheck { connection_id: ConnectionId },

    #[serde(rename = "call.created")]
    CallCreated { call_cid: CallCid, call: CallDetails },

    #[serde(rename = "call.updated")]
    CallUpdated { call_cid: CallCid, call: CallDetails },

    #[serde(rename = "call.ended")]
    CallEnded { call_cid: CallCid },

    #[serde(rename = "call.session_participant_joined")]
    ParticipantJoined {
        call_cid: CallCid,
        user_id: UserId,
        session_id: SessionId,
        #[serde(default)]
        published_tracks: Vec<TrackType>,
    },

    #[serde(rename = "call.session_participant_left")]
    ParticipantLeft {
        call_cid: CallCid,
        user_id: UserId,
        session_id: SessionId,
    },

    #[serde(rename = "call.track_published")]
    TrackPublished {
        call_cid: CallCid,
        user_id: UserId,
        session_id: SessionId,
        track_type: TrackType,
    },

    #[serde(rename = "call.track_unpublished")]
    TrackUnpublished {
        call_cid: CallCid,
        user_id: UserId,
        session_id: SessionId,
        track_type: TrackType,
    },

    #[serde(rename = "call.recording_started")]
    RecordingStarted { call_cid: CallCid },

    #[serde(rename = "call.recording_stopped")]
    RecordingStopped { call_cid: CallCid },

    #[serde(rename = "call.broadcasting_started")]
    BroadcastingStarted {
        call_cid: CallCid,
        #[serde(default)]
        hls_playlist_url: Option<String>,
    },

    #[serde(rename = "call.broadcasting_stopped")]
    BroadcastingStopped { call_cid: CallCid },

    #[serde(rename = "call.blocked_user")]
    BlockedUser { call_cid: CallCid, user_id: UserId },

    #[serde(rename = "call.unblocked_user")]
    UnblockedUser { call_cid: CallCid, user_id: UserId },

    #[serde(rename = "call.permissions_updated")]
    PermissionsUpdated {
        call_cid: CallCid,
        user_id: UserId,
        own_capabilities: Vec<Capability>,
    },

    #[serde(rename = "call.permission_request")]
    PermissionRequest {
        call_cid: CallCid,
        user_id: UserId,
        permissions: Vec<String>,
    },

    /// Someone with the right capability muted other users. When no track
    /// flag is set the mute applies to audio.
    #[serde(rename = "call.user_muted")]
    UserMuted {
        call_cid: CallCid,
        from_user_id: UserId,
        muted_user_ids: Vec<UserId>,
        #[serde(default)]
        audio: bool,
        #[serde(default)]
        video: bool,
        #[serde(default)]
        screenshare: bool,
    },

    #[serde(rename = "call.reaction_new")]
    ReactionNew {
        call_cid: CallCid,
        user_id: UserId,
        reaction: Reaction,
    },

    #[serde(rename = "custom")]
    Custom {
        call_cid: CallCid,
        user_id: UserId,
        #[serde(default)]
        custom: serde_json::Value,
    },

    #[serde(other)]
    Unknown,
}

impl CoordinatorEvent {
    /// Decode one JSON frame.
    pub fn from_json(raw: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(raw)
    }

    /// Wire type name, for logs and metrics.
    pub fn event_type(&self) -> &'static str {
        match self {
            CoordinatorEvent::ConnectionOk { .. } => "connection.ok",
            CoordinatorEvent::HealthCheck { .. } => "health.check",
            CoordinatorEvent::CallCreated { .. } => "call.created",
            CoordinatorEvent::CallUpdated { .. } => "call.updated",
            CoordinatorEvent::CallEnded { .. } => "call.ended",
            CoordinatorEvent::ParticipantJoined { .. } => "call.session_participant_joined",
            CoordinatorEvent::ParticipantLeft { .. } => "call.session_participant_left",
            CoordinatorEvent::TrackPublished { .. } => "call.track_published",
            CoordinatorEvent::TrackUnpublished { .. } => "call.track_unpublished",
            CoordinatorEvent::RecordingStarted { .. } => "call.recording_started",
            CoordinatorEvent::RecordingStopped { .. } => "call.recording_stopped",
            CoordinatorEvent::BroadcastingStarted { .. } => "call.broadcasting_started",
            CoordinatorEvent::BroadcastingStopped { .. } => "call.broadcasting_stopped",
            CoordinatorEvent::BlockedUser { .. } => "call.blocked_user",
            CoordinatorEvent::UnblockedUser { .. } => "call.unblocked_user",
            CoordinatorEvent::PermissionsUpdated { .. } => "call.permissions_updated",
            CoordinatorEvent::PermissionRequest { .. } => "call.permission_request",
            CoordinatorEvent::UserMuted { .. } => "call.user_muted",
            CoordinatorEvent::ReactionNew { .. } => "call.reaction_new",
            CoordinatorEvent::Custom { .. } => "custom",
            CoordinatorEvent::Unknown => "unknown",
        }
    }

    /// The call this event is about, if it is call-scoped.
    pub fn call_cid(&self) -> Option<&CallCid> {
        match self {
            CoordinatorEvent::ConnectionOk { .. }
            | CoordinatorEvent::HealthCheck { .. }
            | CoordinatorEvent::Unknown => None,
            CoordinatorEvent::CallCreated { call_cid, .. }
            | CoordinatorEvent::CallUpdated { call_cid, .. }
            | CoordinatorEvent::CallEnded { call_cid }
            | CoordinatorEvent::ParticipantJoined { call_cid, .. }
            | CoordinatorEvent::ParticipantLeft { call_cid, .. }
            | CoordinatorEvent::TrackPublished { call_cid, .. }
            | CoordinatorEvent::TrackUnpublished { call_cid, .. }
            | CoordinatorEvent::RecordingStarted { call_cid }
            | CoordinatorEvent::RecordingStopped { call_cid }
            | CoordinatorEvent::BroadcastingStarted { call_cid, .. }
            | CoordinatorEvent::BroadcastingStopped { call_cid }
            | CoordinatorEvent::BlockedUser { call_cid, .. }
            | CoordinatorEvent::UnblockedUser { call_cid, .. }
            | CoordinatorEvent::PermissionsUpdated { call_cid, .. }
            | CoordinatorEvent::PermissionRequest { call_cid, .. }
            | CoordinatorEvent::UserMuted { call_cid, .. }
            | CoordinatorEvent::ReactionNew { call_cid, .. }
            | CoordinatorEvent::Custom { call_cid, .. } => Some(call_cid),
        }
    }
}

/// One unit of work produced by [`translate`].
#[derive(Debug, Clone, PartialEq)]
pub enum Translated {
    /// Run through the reducer.
    Action(Action),
    /// Apply with `apply_patch`.
    Patch(StatePatch),
    /// Forward to notification observers; state is untouched.
    Notify(CoordinatorEvent),
}

/// Translate `event` against the current snapshot.
///
/// `local_user` is the user the session is bound to; server-forced changes
/// aimed at that user become local actions. Call-scoped events for a call
/// other than `state.call().cid` produce nothing. With no active call only
/// `call.created` is surfaced, as a notification.
pub fn translate(
    state: &CallState,
    local_user: Option<&UserId>,
    event: &CoordinatorEvent,
) -> Vec<Translated> {
    let Some(event_cid) = event.call_cid() else {
        return Vec::new();
    };

    match state.call().cid.as_ref() {
        Some(current) if current == event_cid => {}
        None if matches!(event, CoordinatorEvent::CallCreated { .. }) => {
            return vec![Translated::Notify(event.clone())];
        }
        _ => return Vec::new(),
    }

    let is_local = |user_id: &UserId| local_user == Some(user_id);

    match event {
        CoordinatorEvent::CallCreated { call, .. } | CoordinatorEvent::CallUpdated { call, .. } => {
            vec![Translated::Patch(StatePatch::CallUpdated(call.clone()))]
        }
        CoordinatorEvent::CallEnded { .. } => vec![
            Translated::Patch(StatePatch::CallEnded),
            Translated::Notify(event.clone()),
        ],
        CoordinatorEvent::ParticipantJoined {
            user_id,
            session_id,
            published_tracks,
            ..
        } => vec![Translated::Patch(StatePatch::ParticipantJoined(
            ParticipantInfo {
                user_id: user_id.clone(),
                session_id: session_id.clone(),
                published_tracks: published_tracks.clone(),
            },
        ))],
        CoordinatorEvent::ParticipantLeft {
            user_id,
            session_id,
            ..
        } => vec![Translated::Patch(StatePatch::ParticipantLeft {
            user_id: user_id.clone(),
            session_id: session_id.clone(),
        })],
        CoordinatorEvent::TrackPublished {
            user_id,
            session_id,
            track_type,
            ..
        } => vec![Translated::Patch(StatePatch::TrackPublished {
            user_id: user_id.clone(),
            session_id: session_id.clone(),
            track_type: *track_type,
        })],
        CoordinatorEvent::TrackUnpublished {
            user_id,
            session_id,
            track_type,
            ..
        } => vec![Translated::Patch(StatePatch::TrackUnpublished {
            user_id: user_id.clone(),
            session_id: session_id.clone(),
            track_type: *track_type,
        })],
        CoordinatorEvent::RecordingStarted { .. } => {
            vec![Translated::Patch(StatePatch::RecordingChanged(true))]
        }
        CoordinatorEvent::RecordingStopped { .. } => {
            vec![Translated::Patch(StatePatch::RecordingChanged(false))]
        }
        CoordinatorEvent::BroadcastingStarted { .. } => {
            vec![Translated::Patch(StatePatch::BroadcastingChanged(true))]
        }
        CoordinatorEvent::BroadcastingStopped { .. } => {
            vec![Translated::Patch(StatePatch::BroadcastingChanged(false))]
        }
        CoordinatorEvent::BlockedUser { user_id, .. } => {
            let mut out = vec![Translated::Patch(StatePatch::UserBlocked(user_id.clone()))];
            if is_local(user_id) {
                out.push(Translated::Notify(event.clone()));
            }
            out
        }
        CoordinatorEvent::UnblockedUser { user_id, .. } => {
            vec![Translated::Patch(StatePatch::UserUnblocked(user_id.clone()))]
        }
        CoordinatorEvent::PermissionsUpdated {
            user_id,
            own_capabilities,
            ..
        } => {
            if !is_local(user_id) {
                return Vec::new();
            }
            let mut out = vec![Translated::Patch(StatePatch::CapabilitiesUpdated(
                own_capabilities.clone(),
            ))];
            out.extend(
                revoked_tracks(state, own_capabilities)
                    .map(|track| Translated::Action(Action::set_track_enabled(track, false))),
            );
            out
        }
        CoordinatorEvent::UserMuted {
            muted_user_ids,
            audio,
            video,
            screenshare,
            ..
        } => {
            let mut out = Vec::new();
            if local_user.is_some_and(|me| muted_user_ids.contains(me)) {
                let tracks: Vec<TrackType> = if *audio || *video || *screenshare {
                    [
                        (*audio, TrackType::Audio),
                        (*video, TrackType::Video),
                        (*screenshare, TrackType::ScreenShare),
                    ]
                    .into_iter()
                    .filter_map(|(flag, track)| flag.then_some(track))
                    .collect()
                } else {
                    vec![TrackType::Audio]
                };
                out.extend(
                    tracks
                        .into_iter()
                        .map(|track| Translated::Action(Action::set_track_enabled(track, false))),
                );
            }
            out.push(Translated::Notify(event.clone()));
            out
        }
        CoordinatorEvent::PermissionRequest { .. }
        | CoordinatorEvent::ReactionNew { .. }
        | CoordinatorEvent::Custom { .. } => vec![Translated::Notify(event.clone())],
        CoordinatorEvent::ConnectionOk { .. }
        | CoordinatorEvent::HealthCheck { .. }
        | CoordinatorEvent::Unknown => Vec::new(),
    }
}

/// Local tracks that are live but whose publish capability is gone.
fn revoked_tracks<'a>(
    state: &'a CallState,
    capabilities: &'a [Capability],
) -> impl Iterator<Item = TrackType> + 'a {
    TrackType::ALL.into_iter().filter(move |track| {
        let live = state
            .local_participant()
            .and_then(|p| p.local_track(*track))
            .is_some_and(|t| !t.muted);
        live && !capabilities.contains(&Capability::for_track(*track))
    })
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::reducer::{apply_patch, reduce};

    fn cid() -> CallCid {
        CallCid::new("default", "standup")
    }

    fn in_call() -> CallState {
        let state = apply_patch(
            &CallState::default(),
            &StatePatch::CallUpdated(CallDetails::new(cid())),
        );
        apply_patch(
            &state,
            &StatePatch::LocalJoined {
                user_id: UserId::from("me"),
                session_id: SessionId::from("me-1"),
            },
        )
    }

    fn me() -> UserId {
        UserId::from("me")
    }

    #[test]
    fn test_decode_participant_joined() {
        let raw = r#"{
            "type": "call.session_participant_joined",
            "call_cid": "default:standup",
            "user_id": "bob",
            "session_id": "bob-1",
            "published_tracks": ["audio", "screen_share"]
        }"#;

        let event = CoordinatorEvent::from_json(raw).unwrap();
        assert_eq!(
            event,
            CoordinatorEvent::ParticipantJoined {
                call_cid: cid(),
                user_id: UserId::from("bob"),
                session_id: SessionId::from("bob-1"),
                published_tracks: vec![TrackType::Audio, TrackType::ScreenShare],
            }
        );
        assert_eq!(event.event_type(), "call.session_participant_joined");
    }

    #[test]
    fn test_decode_unknown_event_type() {
        let event =
            CoordinatorEvent::from_json(r#"{"type":"call.closed_captions_started","x":1}"#).unwrap();
        assert_eq!(event, CoordinatorEvent::Unknown);
        assert!(translate(&in_call(), Some(&me()), &event).is_empty());
    }

    #[test]
    fn test_decode_malformed_frame_is_error() {
        assert!(CoordinatorEvent::from_json(r#"{"type":"call.ended"}"#).is_err());
        assert!(CoordinatorEvent::from_json("not json").is_err());
    }

    #[test]
    fn test_events_for_other_call_are_ignored() {
        let event = CoordinatorEvent::ParticipantJoined {
            call_cid: CallCid::new("default", "other"),
            user_id: UserId::from("bob"),
            session_id: SessionId::from("bob-1"),
            published_tracks: vec![],
        };
        assert!(translate(&in_call(), Some(&me()), &event).is_empty());
    }

    #[test]
    fn test_call_created_without_active_call_is_notification() {
        let event = CoordinatorEvent::CallCreated {
            call_cid: cid(),
            call: CallDetails::new(cid()),
        };
        assert_eq!(
            translate(&CallState::default(), Some(&me()), &event),
            vec![Translated::Notify(event.clone())]
        );
    }

    #[test]
    fn test_membership_events_become_patches() {
        let joined = CoordinatorEvent::ParticipantJoined {
            call_cid: cid(),
            user_id: UserId::from("bob"),
            session_id: SessionId::from("bob-1"),
            published_tracks: vec![TrackType::Video],
        };
        let out = translate(&in_call(), Some(&me()), &joined);
        assert!(matches!(
            out.as_slice(),
            [Translated::Patch(StatePatch::ParticipantJoined(info))] if info.user_id.as_str() == "bob"
        ));

        let left = CoordinatorEvent::ParticipantLeft {
            call_cid: cid(),
            user_id: UserId::from("bob"),
            session_id: SessionId::from("bob-1"),
        };
        assert_eq!(
            translate(&in_call(), Some(&me()), &left),
            vec![Translated::Patch(StatePatch::ParticipantLeft {
                user_id: UserId::from("bob"),
                session_id: SessionId::from("bob-1"),
            })]
        );
    }

    #[test]
    fn test_forced_mute_of_local_user_disables_tracks() {
        let event = CoordinatorEvent::UserMuted {
            call_cid: cid(),
            from_user_id: UserId::from("host"),
            muted_user_ids: vec![me(), UserId::from("bob")],
            audio: true,
            video: true,
            screenshare: false,
        };

        let out = translate(&in_call(), Some(&me()), &event);
        assert_eq!(
            out,
            vec![
                Translated::Action(Action::SetMicrophoneEnabled(false)),
                Translated::Action(Action::SetCameraEnabled(false)),
                Translated::Notify(event.clone()),
            ]
        );
    }

    #[test]
    fn test_mute_without_flags_defaults_to_audio() {
        let event = CoordinatorEvent::UserMuted {
            call_cid: cid(),
            from_user_id: UserId::from("host"),
            muted_user_ids: vec![me()],
            audio: false,
            video: false,
            screenshare: false,
        };
        let out = translate(&in_call(), Some(&me()), &event);
        assert_eq!(
            out.first(),
            Some(&Translated::Action(Action::SetMicrophoneEnabled(false)))
        );
    }

    #[test]
    fn test_mute_of_other_user_only_notifies() {
        let event = CoordinatorEvent::UserMuted {
            call_cid: cid(),
            from_user_id: UserId::from("host"),
            muted_user_ids: vec![UserId::from("bob")],
            audio: true,
            video: false,
            screenshare: false,
        };
        assert_eq!(
            translate(&in_call(), Some(&me()), &event),
            vec![Translated::Notify(event.clone())]
        );
    }

    #[test]
    fn test_capability_revocation_disables_live_tracks() {
        let state = reduce(&in_call(), &Action::SetCameraEnabled(true));
        let state = reduce(&state, &Action::SetMicrophoneEnabled(true));

        let event = CoordinatorEvent::PermissionsUpdated {
            call_cid: cid(),
            user_id: me(),
            own_capabilities: vec![Capability::SendAudio],
        };

        let out = translate(&state, Some(&me()), &event);
        assert_eq!(
            out,
            vec![
                Translated::Patch(StatePatch::CapabilitiesUpdated(vec![Capability::SendAudio])),
                Translated::Action(Action::SetCameraEnabled(false)),
            ]
        );
    }

    #[test]
    fn test_permissions_for_other_user_are_ignored() {
        let event = CoordinatorEvent::PermissionsUpdated {
            call_cid: cid(),
            user_id: UserId::from("bob"),
            own_capabilities: vec![],
        };
        assert!(translate(&in_call(), Some(&me()), &event).is_empty());
    }

    #[test]
    fn test_reactions_and_custom_events_only_notify() {
        let reaction = CoordinatorEvent::from_json(
            r#"{"type":"call.reaction_new","call_cid":"default:standup","user_id":"bob",
                "reaction":{"type":"like","emoji_code":":+1:"}}"#,
        )
        .unwrap();
        assert_eq!(
            translate(&in_call(), Some(&me()), &reaction),
            vec![Translated::Notify(reaction.clone())]
        );

        let custom = CoordinatorEvent::Custom {
            call_cid: cid(),
            user_id: UserId::from("bob"),
            custom: serde_json::json!({"hand": "raised"}),
        };
        assert_eq!(
            translate(&in_call(), Some(&me()), &custom),
            vec![Translated::Notify(custom.clone())]
        );
    }

    #[test]
    fn test_call_ended_patches_and_notifies() {
        let event = CoordinatorEvent::CallEnded { call_cid: cid() };
        assert_eq!(
            translate(&in_call(), Some(&me()), &event),
            vec![
                Translated::Patch(StatePatch::CallEnded),
                Translated::Notify(event.clone()),
            ]
        );
    }

    #[test]
    fn test_connection_events_produce_nothing() {
        let event = CoordinatorEvent::HealthCheck {
            connection_id: ConnectionId::from("conn-1"),
        };
        assert!(translate(&in_call(), Some(&me()), &event).is_empty());
        assert!(event.call_cid().is_none());
    }
}
