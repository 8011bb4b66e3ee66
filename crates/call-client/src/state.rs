//! Immutable call-state snapshot.
//!
//! A [`CallState`] is a value: it is never mutated in place. The reducer builds
//! a new state for every transition and shares untouched participants with the
//! previous one through `Arc`, so observers always see a whole transition.
//!
//! Outside this crate a `CallState` can only be obtained empty
//! (`CallState::default()`) or as the output of the reducer.

use common::types::{CallCid, SessionId, UserId};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use crate::models::{CallDetails, Capability};

/// Kind of media track a participant can publish.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TrackType {
    Audio,
    Video,
    ScreenShare,
}

impl TrackType {
    /// All track types.
    pub const ALL: [TrackType; 3] = [TrackType::Audio, TrackType::Video, TrackType::ScreenShare];
}

/// Which way the local camera faces.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CameraPosition {
    #[default]
    Front,
    Back,
}

impl CameraPosition {
    /// The opposite position.
    #[must_use]
    pub fn flipped(self) -> Self {
        match self {
            CameraPosition::Front => CameraPosition::Back,
            CameraPosition::Back => CameraPosition::Front,
        }
    }
}

/// A local media device (camera, microphone, speaker).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Device {
    pub id: String,
    pub label: String,
}

impl Device {
    #[must_use]
    pub fn new(id: impl Into<String>, label: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            label: label.into(),
        }
    }
}

/// Requested video resolution for a subscription.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct VideoDimension {
    pub width: u32,
    pub height: u32,
}

impl VideoDimension {
    /// 1280x720.
    pub const HD_720P: VideoDimension = VideoDimension::new(1280, 720);
    /// 640x360.
    pub const SD_360P: VideoDimension = VideoDimension::new(640, 360);

    #[must_use]
    pub const fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }
}

/// The local user's intent for one of their own tracks.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LocalTrackState {
    pub muted: bool,
    pub source_device: Option<Device>,
    /// Only meaningful for video tracks.
    pub camera_position: Option<CameraPosition>,
}

impl Default for LocalTrackState {
    fn default() -> Self {
        Self {
            muted: true,
            source_device: None,
            camera_position: None,
        }
    }
}

/// What the local client does with a track announced by a remote participant.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteTrackState {
    pub subscribed: bool,
    pub video_dimension: Option<VideoDimension>,
    pub audio_sink_device: Option<Device>,
}

/// Per-track state. The variant is fixed by whether the owner is local.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum TrackState {
    Local(LocalTrackState),
    Remote(RemoteTrackState),
}

impl TrackState {
    #[must_use]
    pub fn as_local(&self) -> Option<&LocalTrackState> {
        match self {
            TrackState::Local(local) => Some(local),
            TrackState::Remote(_) => None,
        }
    }

    #[must_use]
    pub fn as_remote(&self) -> Option<&RemoteTrackState> {
        match self {
            TrackState::Remote(remote) => Some(remote),
            TrackState::Local(_) => None,
        }
    }
}

/// A user's presence in the call, keyed by `(user_id, session_id)`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Participant {
    user_id: UserId,
    session_id: SessionId,
    is_local: bool,
    published_tracks: BTreeMap<TrackType, TrackState>,
}

impl Participant {
    pub(crate) fn local(user_id: UserId, session_id: SessionId) -> Self {
        Self {
            user_id,
            session_id,
            is_local: true,
            published_tracks: BTreeMap::new(),
        }
    }

    pub(crate) fn remote(user_id: UserId, session_id: SessionId) -> Self {
        Self {
            user_id,
            session_id,
            is_local: false,
            published_tracks: BTreeMap::new(),
        }
    }

    pub fn user_id(&self) -> &UserId {
        &self.user_id
    }

    pub fn session_id(&self) -> &SessionId {
        &self.session_id
    }

    pub fn is_local(&self) -> bool {
        self.is_local
    }

    pub fn published_tracks(&self) -> &BTreeMap<TrackType, TrackState> {
        &self.published_tracks
    }

    pub fn track(&self, track_type: TrackType) -> Option<&TrackState> {
        self.published_tracks.get(&track_type)
    }

    /// The local track state for `track_type`, if present and local.
    pub fn local_track(&self, track_type: TrackType) -> Option<&LocalTrackState> {
        self.track(track_type).and_then(TrackState::as_local)
    }

    /// The remote track state for `track_type`, if present and remote.
    pub fn remote_track(&self, track_type: TrackType) -> Option<&RemoteTrackState> {
        self.track(track_type).and_then(TrackState::as_remote)
    }

    /// Whether this participant has key `(user_id, session_id)`.
    pub fn is(&self, user_id: &UserId, session_id: &SessionId) -> bool {
        &self.user_id == user_id && &self.session_id == session_id
    }

    pub(crate) fn with_track(&self, track_type: TrackType, track: TrackState) -> Self {
        let mut next = self.clone();
        next.published_tracks.insert(track_type, track);
        next
    }

    pub(crate) fn without_track(&self, track_type: TrackType) -> Self {
        let mut next = self.clone();
        next.published_tracks.remove(&track_type);
        next
    }

    pub(crate) fn with_session(&self, user_id: UserId, session_id: SessionId) -> Self {
        Self {
            user_id,
            session_id,
            is_local: self.is_local,
            published_tracks: self.published_tracks.clone(),
        }
    }
}

/// Call-level metadata kept alongside the participants.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CallMetadata {
    pub cid: Option<CallCid>,
    pub created_by: Option<UserId>,
    pub custom: serde_json::Value,
    pub recording: bool,
    pub broadcasting: bool,
    pub blocked_user_ids: BTreeSet<UserId>,
    pub own_capabilities: BTreeSet<Capability>,
    pub ended: bool,
}

impl CallMetadata {
    pub(crate) fn merged_with(&self, details: &CallDetails) -> Self {
        Self {
            cid: Some(details.cid.clone()),
            created_by: details.created_by.clone(),
            custom: details.custom.clone(),
            recording: details.recording,
            broadcasting: details.broadcasting,
            blocked_user_ids: details.blocked_user_ids.iter().cloned().collect(),
            own_capabilities: self.own_capabilities.clone(),
            ended: self.ended,
        }
    }
}

/// Snapshot of the current call.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CallState {
    session_id: Option<SessionId>,
    call_participants: Arc<Vec<Arc<Participant>>>,
    audio_input_device: Option<Device>,
    video_input_device: Option<Device>,
    audio_output_device: Option<Device>,
    call: Arc<CallMetadata>,
}

impl CallState {
    /// This client's session id, once joined.
    pub fn session_id(&self) -> Option<&SessionId> {
        self.session_id.as_ref()
    }

    /// Participants in join order.
    pub fn participants(&self) -> &[Arc<Participant>] {
        &self.call_participants
    }

    /// The single local participant, if joined.
    pub fn local_participant(&self) -> Option<&Participant> {
        self.call_participants
            .iter()
            .find(|p| p.is_local())
            .map(AsRef::as_ref)
    }

    /// Look up a participant by key.
    pub fn participant(&self, user_id: &UserId, session_id: &SessionId) -> Option<&Participant> {
        self.call_participants
            .iter()
            .find(|p| p.is(user_id, session_id))
            .map(AsRef::as_ref)
    }

    pub fn audio_input_device(&self) -> Option<&Device> {
        self.audio_input_device.as_ref()
    }

    pub fn video_input_device(&self) -> Option<&Device> {
        self.video_input_device.as_ref()
    }

    pub fn audio_output_device(&self) -> Option<&Device> {
        self.audio_output_device.as_ref()
    }

    pub fn call(&self) -> &CallMetadata {
        &self.call
    }

    pub(crate) fn with_participants(&self, participants: Vec<Arc<Participant>>) -> Self {
        Self {
            call_participants: Arc::new(participants),
            ..self.clone()
        }
    }

    pub(crate) fn with_session_id(&self, session_id: Option<SessionId>) -> Self {
        Self {
            session_id,
            ..self.clone()
        }
    }

    pub(crate) fn with_audio_input_device(&self, device: Option<Device>) -> Self {
        Self {
            audio_input_device: device,
            ..self.clone()
        }
    }

    pub(crate) fn with_video_input_device(&self, device: Option<Device>) -> Self {
        Self {
            video_input_device: device,
            ..self.clone()
        }
    }

    pub(crate) fn with_audio_output_device(&self, device: Option<Device>) -> Self {
        Self {
            audio_output_device: device,
            ..self.clone()
        }
    }

    pub(crate) fn with_call(&self, call: CallMetadata) -> Self {
        Self {
            call: Arc::new(call),
            ..self.clone()
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_camera_flip() {
        assert_eq!(CameraPosition::Front.flipped(), CameraPosition::Back);
        assert_eq!(CameraPosition::Back.flipped(), CameraPosition::Front);
    }

    #[test]
    fn test_local_track_default_is_muted() {
        let track = LocalTrackState::default();
        assert!(track.muted);
        assert!(track.source_device.is_none());
        assert!(track.camera_position.is_none());
    }

    #[test]
    fn test_empty_state() {
        let state = CallState::default();
        assert!(state.session_id().is_none());
        assert!(state.participants().is_empty());
        assert!(state.local_participant().is_none());
        assert!(state.call().cid.is_none());
    }

    #[test]
    fn test_participant_track_accessors() {
        let participant = Participant::remote("bob".into(), "s1".into()).with_track(
            TrackType::Audio,
            TrackState::Remote(RemoteTrackState::default()),
        );

        assert!(participant.remote_track(TrackType::Audio).is_some());
        assert!(participant.local_track(TrackType::Audio).is_none());
        assert!(participant.track(TrackType::Video).is_none());
        assert!(participant.is(&"bob".into(), &"s1".into()));
        assert!(!participant.is(&"bob".into(), &"s2".into()));
    }

    #[test]
    fn test_builders_share_untouched_parts() {
        let state = CallState::default().with_participants(vec![Arc::new(Participant::local(
            "alice".into(),
            "s1".into(),
        ))]);
        let next = state.with_audio_output_device(Some(Device::new("spk", "Speaker")));

        assert!(Arc::ptr_eq(&state.call_participants, &next.call_participants));
        assert_eq!(next.audio_output_device().map(|d| d.id.as_str()), Some("spk"));
    }

    #[test]
    fn test_track_type_wire_names() {
        assert_eq!(
            serde_json::to_string(&TrackType::ScreenShare).unwrap(),
            "\"screen_share\""
        );
    }
}
