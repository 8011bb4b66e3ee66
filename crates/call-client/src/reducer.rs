//! The reducer: the only code that produces a new [`CallState`].
//!
//! [`reduce`] applies an [`Action`]; [`apply_patch`] applies a [`StatePatch`]
//! carrying server-owned facts the action vocabulary does not model
//! (membership, published tracks, call metadata). Both are pure and total:
//! an input that does not apply returns a state equal to the input.
//!
//! Every transition rebuilds the participant list by mapping over it. Only
//! participants that actually change get a new `Arc`; the rest are shared
//! with the previous snapshot.
//!
//! Targeting rules:
//! - local actions match `is_local` and never a remote participant
//! - remote actions match `(user_id, session_id)` and never the local participant

use common::types::{SessionId, UserId};
use std::collections::BTreeSet;
use std::sync::Arc;

use crate::action::{Action, RemoveSubscription, SubscriptionChange, UpdateSubscription};
use crate::models::{CallDetails, Capability, ParticipantInfo};
use crate::state::{
    CallMetadata, CallState, CameraPosition, Device, LocalTrackState, Participant,
    RemoteTrackState, TrackState, TrackType,
};

/// A direct state change for server-owned information.
#[derive(Debug, Clone, PartialEq)]
pub enum StatePatch {
    /// This client joined with `session_id`. Replaces any previous local
    /// participant, carrying its track intent over.
    LocalJoined {
        user_id: UserId,
        session_id: SessionId,
    },
    /// A remote participant session joined.
    ParticipantJoined(ParticipantInfo),
    /// A remote participant session left.
    ParticipantLeft {
        user_id: UserId,
        session_id: SessionId,
    },
    /// A remote participant announced a track.
    TrackPublished {
        user_id: UserId,
        session_id: SessionId,
        track_type: TrackType,
    },
    /// A remote participant withdrew a track.
    TrackUnpublished {
        user_id: UserId,
        session_id: SessionId,
        track_type: TrackType,
    },
    CallUpdated(CallDetails),
    RecordingChanged(bool),
    BroadcastingChanged(bool),
    UserBlocked(UserId),
    UserUnblocked(UserId),
    CapabilitiesUpdated(Vec<Capability>),
    /// The call ended: participants are discarded, the cid is kept.
    CallEnded,
    /// Back to the empty state.
    Reset,
}

impl StatePatch {
    /// Bounded label for logs and metrics.
    pub fn name(&self) -> &'static str {
        match self {
            StatePatch::LocalJoined { .. } => "local_joined",
            StatePatch::ParticipantJoined(_) => "participant_joined",
            StatePatch::ParticipantLeft { .. } => "participant_left",
            StatePatch::TrackPublished { .. } => "track_published",
            StatePatch::TrackUnpublished { .. } => "track_unpublished",
            StatePatch::CallUpdated(_) => "call_updated",
            StatePatch::RecordingChanged(_) => "recording_changed",
            StatePatch::BroadcastingChanged(_) => "broadcasting_changed",
            StatePatch::UserBlocked(_) => "user_blocked",
            StatePatch::UserUnblocked(_) => "user_unblocked",
            StatePatch::CapabilitiesUpdated(_) => "capabilities_updated",
            StatePatch::CallEnded => "call_ended",
            StatePatch::Reset => "reset",
        }
    }
}

// =============================================================================
// Actions
// =============================================================================

/// Apply `action` to `state`.
#[must_use]
pub fn reduce(state: &CallState, action: &Action) -> CallState {
    match action {
        Action::SetCameraEnabled(enabled) => {
            set_local_track_enabled(state, TrackType::Video, *enabled)
        }
        Action::SetMicrophoneEnabled(enabled) => {
            set_local_track_enabled(state, TrackType::Audio, *enabled)
        }
        Action::SetScreenShareEnabled(enabled) => {
            set_local_track_enabled(state, TrackType::ScreenShare, *enabled)
        }
        Action::SetVideoInputDevice(device) => set_video_input_device(state, device.as_ref()),
        Action::SetAudioInputDevice(device) => set_audio_input_device(state, device.as_ref()),
        Action::SetAudioOutputDevice(device) => set_audio_output_device(state, device.as_ref()),
        Action::FlipCamera => {
            replace_camera_position(state, |current| current.unwrap_or_default().flipped())
        }
        Action::SetCameraPosition(position) => replace_camera_position(state, |_| *position),
        Action::UpdateSubscription(update) => update_subscription(state, update),
        Action::RemoveSubscription(remove) => remove_subscription(state, remove),
        Action::UpdateSubscriptions(changes) => {
            changes
                .iter()
                .fold(state.clone(), |current, change| match change {
                    SubscriptionChange::Update(update) => update_subscription(&current, update),
                    SubscriptionChange::Remove(remove) => remove_subscription(&current, remove),
                })
        }
    }
}

fn map_participants<F>(state: &CallState, mut f: F) -> CallState
where
    F: FnMut(&Participant) -> Option<Participant>,
{
    let mut changed = false;
    let participants = state
        .participants()
        .iter()
        .map(|participant| match f(participant) {
            Some(next) => {
                changed = true;
                Arc::new(next)
            }
            None => Arc::clone(participant),
        })
        .collect();

    if changed {
        state.with_participants(participants)
    } else {
        state.clone()
    }
}

fn update_local<F>(state: &CallState, mut f: F) -> CallState
where
    F: FnMut(&Participant) -> Option<Participant>,
{
    map_participants(state, |p| if p.is_local() { f(p) } else { None })
}

fn update_remote<F>(state: &CallState, user_id: &UserId, session_id: &SessionId, mut f: F) -> CallState
where
    F: FnMut(&Participant) -> Option<Participant>,
{
    map_participants(state, |p| {
        if !p.is_local() && p.is(user_id, session_id) {
            f(p)
        } else {
            None
        }
    })
}

fn local_track_or_default(participant: &Participant, track_type: TrackType) -> LocalTrackState {
    participant
        .local_track(track_type)
        .cloned()
        .unwrap_or_default()
}

fn set_local_track_enabled(state: &CallState, track_type: TrackType, enabled: bool) -> CallState {
    update_local(state, |p| {
        let mut track = local_track_or_default(p, track_type);
        if track_type == TrackType::Video && track.camera_position.is_none() {
            track.camera_position = Some(CameraPosition::Front);
        }
        track.muted = !enabled;
        Some(p.with_track(track_type, TrackState::Local(track)))
    })
}

fn set_video_input_device(state: &CallState, device: Option<&Device>) -> CallState {
    let state = state.with_video_input_device(device.cloned());
    update_local(&state, |p| {
        let mut track = local_track_or_default(p, TrackType::Video);
        track.source_device = device.cloned();
        // A different camera invalidates the chosen facing direction.
        track.camera_position = Some(CameraPosition::Front);
        Some(p.with_track(TrackType::Video, TrackState::Local(track)))
    })
}

fn set_audio_input_device(state: &CallState, device: Option<&Device>) -> CallState {
    let state = state.with_audio_input_device(device.cloned());
    update_local(&state, |p| {
        let mut track = local_track_or_default(p, TrackType::Audio);
        track.source_device = device.cloned();
        Some(p.with_track(TrackType::Audio, TrackState::Local(track)))
    })
}

fn set_audio_output_device(state: &CallState, device: Option<&Device>) -> CallState {
    let state = state.with_audio_output_device(device.cloned());
    map_participants(&state, |p| {
        if p.is_local() {
            return None;
        }
        let remote = p.remote_track(TrackType::Audio)?;
        Some(p.with_track(
            TrackType::Audio,
            TrackState::Remote(RemoteTrackState {
                audio_sink_device: device.cloned(),
                ..remote.clone()
            }),
        ))
    })
}

/// Replace the local video track with a fresh state holding only `muted` and
/// the new position. `source_device` is cleared on purpose.
fn replace_camera_position<F>(state: &CallState, next_position: F) -> CallState
where
    F: Fn(Option<CameraPosition>) -> CameraPosition,
{
    update_local(state, |p| {
        let current = local_track_or_default(p, TrackType::Video);
        let fresh = LocalTrackState {
            muted: current.muted,
            source_device: None,
            camera_position: Some(next_position(current.camera_position)),
        };
        Some(p.with_track(TrackType::Video, TrackState::Local(fresh)))
    })
}

fn update_subscription(state: &CallState, update: &UpdateSubscription) -> CallState {
    update_remote(state, &update.user_id, &update.session_id, |p| {
        let remote = p.remote_track(update.track_type)?;
        Some(p.with_track(
            update.track_type,
            TrackState::Remote(RemoteTrackState {
                subscribed: true,
                video_dimension: update.dimension,
                ..remote.clone()
            }),
        ))
    })
}

fn remove_subscription(state: &CallState, remove: &RemoveSubscription) -> CallState {
    update_remote(state, &remove.user_id, &remove.session_id, |p| {
        let remote = p.remote_track(remove.track_type)?;
        Some(p.with_track(
            remove.track_type,
            TrackState::Remote(RemoteTrackState {
                subscribed: false,
                ..remote.clone()
            }),
        ))
    })
}

// =============================================================================
// Patches
// =============================================================================

/// Apply `patch` to `state`.
#[must_use]
pub fn apply_patch(state: &CallState, patch: &StatePatch) -> CallState {
    match patch {
        StatePatch::LocalJoined {
            user_id,
            session_id,
        } => local_joined(state, user_id, session_id),
        StatePatch::ParticipantJoined(info) => participant_joined(state, info),
        StatePatch::ParticipantLeft {
            user_id,
            session_id,
        } => participant_left(state, user_id, session_id),
        StatePatch::TrackPublished {
            user_id,
            session_id,
            track_type,
        } => track_published(state, user_id, session_id, *track_type),
        StatePatch::TrackUnpublished {
            user_id,
            session_id,
            track_type,
        } => update_remote(state, user_id, session_id, |p| {
            p.track(*track_type)?;
            Some(p.without_track(*track_type))
        }),
        StatePatch::CallUpdated(details) => state.with_call(state.call().merged_with(details)),
        StatePatch::RecordingChanged(recording) => update_call(state, |call| {
            (call.recording != *recording).then(|| CallMetadata {
                recording: *recording,
                ..call.clone()
            })
        }),
        StatePatch::BroadcastingChanged(broadcasting) => update_call(state, |call| {
            (call.broadcasting != *broadcasting).then(|| CallMetadata {
                broadcasting: *broadcasting,
                ..call.clone()
            })
        }),
        StatePatch::UserBlocked(user_id) => update_call(state, |call| {
            (!call.blocked_user_ids.contains(user_id)).then(|| {
                let mut next = call.clone();
                next.blocked_user_ids.insert(user_id.clone());
                next
            })
        }),
        StatePatch::UserUnblocked(user_id) => update_call(state, |call| {
            call.blocked_user_ids.contains(user_id).then(|| {
                let mut next = call.clone();
                next.blocked_user_ids.remove(user_id);
                next
            })
        }),
        StatePatch::CapabilitiesUpdated(capabilities) => update_call(state, |call| {
            let own_capabilities: BTreeSet<Capability> = capabilities.iter().copied().collect();
            (call.own_capabilities != own_capabilities).then(|| CallMetadata {
                own_capabilities,
                ..call.clone()
            })
        }),
        StatePatch::CallEnded => CallState::default().with_call(CallMetadata {
            cid: state.call().cid.clone(),
            ended: true,
            ..CallMetadata::default()
        }),
        StatePatch::Reset => CallState::default(),
    }
}

fn update_call<F>(state: &CallState, f: F) -> CallState
where
    F: FnOnce(&CallMetadata) -> Option<CallMetadata>,
{
    match f(state.call()) {
        Some(call) => state.with_call(call),
        None => state.clone(),
    }
}

fn local_joined(state: &CallState, user_id: &UserId, session_id: &SessionId) -> CallState {
    let state = state.with_session_id(Some(session_id.clone()));
    let same_session = state
        .local_participant()
        .map(|local| local.is(user_id, session_id));

    match same_session {
        Some(true) => state,
        Some(false) => {
            // New session for the local user: same participant slot, same intent.
            let participants = state
                .participants()
                .iter()
                .filter(|p| p.is_local() || !p.is(user_id, session_id))
                .map(|p| {
                    if p.is_local() {
                        Arc::new(p.with_session(user_id.clone(), session_id.clone()))
                    } else {
                        Arc::clone(p)
                    }
                })
                .collect();
            state.with_participants(participants)
        }
        None => {
            let mut participants: Vec<Arc<Participant>> = state
                .participants()
                .iter()
                .filter(|p| !p.is(user_id, session_id))
                .cloned()
                .collect();
            participants.push(Arc::new(Participant::local(
                user_id.clone(),
                session_id.clone(),
            )));
            state.with_participants(participants)
        }
    }
}

fn new_remote_track(state: &CallState, track_type: TrackType) -> TrackState {
    let audio_sink_device = match track_type {
        TrackType::Audio => state.audio_output_device().cloned(),
        TrackType::Video | TrackType::ScreenShare => None,
    };
    TrackState::Remote(RemoteTrackState {
        audio_sink_device,
        ..RemoteTrackState::default()
    })
}

fn participant_joined(state: &CallState, info: &ParticipantInfo) -> CallState {
    if state.participant(&info.user_id, &info.session_id).is_some() {
        return state.clone();
    }

    let participant = info.published_tracks.iter().fold(
        Participant::remote(info.user_id.clone(), info.session_id.clone()),
        |p, track_type| p.with_track(*track_type, new_remote_track(state, *track_type)),
    );

    let mut participants = state.participants().to_vec();
    participants.push(Arc::new(participant));
    state.with_participants(participants)
}

fn participant_left(state: &CallState, user_id: &UserId, session_id: &SessionId) -> CallState {
    let remaining: Vec<Arc<Participant>> = state
        .participants()
        .iter()
        .filter(|p| p.is_local() || !p.is(user_id, session_id))
        .cloned()
        .collect();

    if remaining.len() == state.participants().len() {
        state.clone()
    } else {
        state.with_participants(remaining)
    }
}

fn track_published(
    state: &CallState,
    user_id: &UserId,
    session_id: &SessionId,
    track_type: TrackType,
) -> CallState {
    let track = new_remote_track(state, track_type);
    update_remote(state, user_id, session_id, |p| {
        if p.track(track_type).is_some() {
            None
        } else {
            Some(p.with_track(track_type, track.clone()))
        }
    })
}
