//! Domain models exchanged with the coordinator.
//!
//! These are the shapes the core works with. Mapping them to and from the
//! coordinator's generated wire types is the backend implementation's job.

use common::secret::SecretString;
use common::types::{CallCid, SessionId, UserId};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::state::TrackType;

/// The user a session is opened for.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct User {
    pub id: UserId,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub image: Option<String>,
    #[serde(default)]
    pub custom: serde_json::Value,
}

impl User {
    /// A user with only an id.
    #[must_use]
    pub fn new(id: impl Into<UserId>) -> Self {
        Self {
            id: id.into(),
            name: None,
            image: None,
            custom: serde_json::Value::Null,
        }
    }
}

/// Something a participant is allowed to do in a call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Capability {
    SendAudio,
    SendVideo,
    Screenshare,
    MuteUsers,
    EndCall,
    UpdateCall,
    StartRecordCall,
    StopRecordCall,
    StartBroadcastCall,
    StopBroadcastCall,
    BlockUsers,
    UpdateCallPermissions,
    #[serde(other)]
    Unknown,
}

impl Capability {
    /// The capability needed to publish a track of this type.
    #[must_use]
    pub fn for_track(track_type: TrackType) -> Self {
        match track_type {
            TrackType::Audio => Capability::SendAudio,
            TrackType::Video => Capability::SendVideo,
            TrackType::ScreenShare => Capability::Screenshare,
        }
    }
}

/// Call-level metadata as reported by the coordinator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CallDetails {
    pub cid: CallCid,
    #[serde(default)]
    pub created_by: Option<UserId>,
    #[serde(default)]
    pub custom: serde_json::Value,
    #[serde(default)]
    pub recording: bool,
    #[serde(default)]
    pub broadcasting: bool,
    #[serde(default)]
    pub blocked_user_ids: Vec<UserId>,
}

impl CallDetails {
    /// Details with only a cid.
    #[must_use]
    pub fn new(cid: CallCid) -> Self {
        Self {
            cid,
            created_by: None,
            custom: serde_json::Value::Null,
            recording: false,
            broadcasting: false,
            blocked_user_ids: Vec::new(),
        }
    }
}

/// A call member (persistent membership, not a live participant).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Member {
    pub user_id: UserId,
    #[serde(default)]
    pub role: Option<String>,
    #[serde(default)]
    pub custom: serde_json::Value,
}

/// A live participant session reported by the coordinator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParticipantInfo {
    pub user_id: UserId,
    pub session_id: SessionId,
    #[serde(default)]
    pub published_tracks: Vec<TrackType>,
}

/// Media edge credentials returned by a join.
#[derive(Clone)]
pub struct EdgeCredentials {
    pub server_url: String,
    pub token: SecretString,
}

impl fmt::Debug for EdgeCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EdgeCredentials")
            .field("server_url", &self.server_url)
            .field("token", &"[REDACTED]")
            .finish()
    }
}

/// Backend response to a join, before the session stamps it.
#[derive(Debug, Clone)]
pub struct JoinCallResponse {
    pub call: CallDetails,
    pub members: Vec<Member>,
    pub session_id: SessionId,
    pub credentials: EdgeCredentials,
    pub own_capabilities: Vec<Capability>,
    pub participants: Vec<ParticipantInfo>,
}

/// A successful join, tagged with the session epoch it was obtained under.
///
/// The store refuses to apply a join from an older epoch.
#[derive(Debug, Clone)]
pub struct JoinedCall {
    pub epoch: u64,
    pub user_id: UserId,
    pub call: CallDetails,
    pub members: Vec<Member>,
    pub session_id: SessionId,
    pub credentials: EdgeCredentials,
    pub own_capabilities: Vec<Capability>,
    pub participants: Vec<ParticipantInfo>,
}

/// One page of calls.
#[derive(Debug, Clone, PartialEq)]
pub struct QueryCallsResult {
    pub calls: Vec<CallDetails>,
    pub next: Option<String>,
}

/// One page of members.
#[derive(Debug, Clone, PartialEq)]
pub struct QueryMembersResult {
    pub members: Vec<Member>,
    pub next: Option<String>,
}

/// A device registered for push notifications.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PushDevice {
    pub id: String,
    pub push_provider: String,
}

/// An emoji reaction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Reaction {
    #[serde(rename = "type")]
    pub reaction_type: String,
    #[serde(default)]
    pub emoji_code: Option<String>,
    #[serde(default)]
    pub custom: serde_json::Value,
}

/// Where a broadcast can be watched.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BroadcastInfo {
    pub playlist_url: String,
}
