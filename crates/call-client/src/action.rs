//! Actions: pure descriptions of an intended state change.
//!
//! Actions never carry a result. The reducer decides what each one does to
//! the current [`CallState`](crate::state::CallState).

use common::types::{SessionId, UserId};

use crate::state::{CameraPosition, Device, TrackType, VideoDimension};

/// Subscribe to (or re-dimension) a remote participant's track.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpdateSubscription {
    pub user_id: UserId,
    pub session_id: SessionId,
    pub track_type: TrackType,
    pub dimension: Option<VideoDimension>,
}

/// Stop receiving a remote participant's track.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoveSubscription {
    pub user_id: UserId,
    pub session_id: SessionId,
    pub track_type: TrackType,
}

/// One entry of a batched subscription update.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SubscriptionChange {
    Update(UpdateSubscription),
    Remove(RemoveSubscription),
}

/// Every state change the application (or a translated server event) can ask for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Action {
    SetCameraEnabled(bool),
    SetMicrophoneEnabled(bool),
    SetScreenShareEnabled(bool),
    SetVideoInputDevice(Option<Device>),
    SetAudioInputDevice(Option<Device>),
    SetAudioOutputDevice(Option<Device>),
    FlipCamera,
    SetCameraPosition(CameraPosition),
    UpdateSubscription(UpdateSubscription),
    RemoveSubscription(RemoveSubscription),
    /// Applied entry by entry, in order. Not atomic.
    UpdateSubscriptions(Vec<SubscriptionChange>),
}

impl Action {
    /// Bounded label for logs and metrics.
    pub fn name(&self) -> &'static str {
        match self {
            Action::SetCameraEnabled(_) => "set_camera_enabled",
            Action::SetMicrophoneEnabled(_) => "set_microphone_enabled",
            Action::SetScreenShareEnabled(_) => "set_screen_share_enabled",
            Action::SetVideoInputDevice(_) => "set_video_input_device",
            Action::SetAudioInputDevice(_) => "set_audio_input_device",
            Action::SetAudioOutputDevice(_) => "set_audio_output_device",
            Action::FlipCamera => "flip_camera",
            Action::SetCameraPosition(_) => "set_camera_position",
            Action::UpdateSubscription(_) => "update_subscription",
            Action::RemoveSubscription(_) => "remove_subscription",
            Action::UpdateSubscriptions(_) => "update_subscriptions",
        }
    }

    /// Enable or disable the local track of `track_type`.
    pub fn set_track_enabled(track_type: TrackType, enabled: bool) -> Self {
        match track_type {
            TrackType::Audio => Action::SetMicrophoneEnabled(enabled),
            TrackType::Video => Action::SetCameraEnabled(enabled),
            TrackType::ScreenShare => Action::SetScreenShareEnabled(enabled),
        }
    }
}

impl From<UpdateSubscription> for SubscriptionChange {
    fn from(update: UpdateSubscription) -> Self {
        SubscriptionChange::Update(update)
    }
}

impl From<RemoveSubscription> for SubscriptionChange {
    fn from(remove: RemoveSubscription) -> Self {
        SubscriptionChange::Remove(remove)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_set_track_enabled_maps_track_types() {
        assert_eq!(
            Action::set_track_enabled(TrackType::Audio, false),
            Action::SetMicrophoneEnabled(false)
        );
        assert_eq!(
            Action::set_track_enabled(TrackType::Video, true),
            Action::SetCameraEnabled(true)
        );
        assert_eq!(
            Action::set_track_enabled(TrackType::ScreenShare, true),
            Action::SetScreenShareEnabled(true)
        );
    }

    #[test]
    fn test_names_are_distinct() {
        let actions = [
            Action::SetCameraEnabled(true),
            Action::SetMicrophoneEnabled(true),
            Action::SetScreenShareEnabled(true),
            Action::SetVideoInputDevice(None),
            Action::SetAudioInputDevice(None),
            Action::SetAudioOutputDevice(None),
            Action::FlipCamera,
            Action::SetCameraPosition(CameraPosition::Back),
            Action::UpdateSubscriptions(Vec::new()),
        ];
        let mut names: Vec<_> = actions.iter().map(Action::name).collect();
        names.sort_unstable();
        names.dedup();
        assert_eq!(names.len(), actions.len());
    }
}
