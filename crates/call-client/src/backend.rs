//! Outbound coordinator API.
//!
//! [`CoordinatorApi`] is the seam between the session client and whatever
//! speaks the coordinator's request/response protocol (generated REST
//! bindings in production, `MockCoordinatorApi` in tests). Implementations map
//! their wire types to the domain models in [`crate::models`] and report
//! failures as [`ApiFailure`]; the session client turns those into
//! [`CallError`].
//!
//! Operations whose response carries a payload return `Option<T>`: `None`
//! means the call succeeded on the wire but the payload was missing, which
//! the session client reports as `UnexpectedNullResult`.

use async_trait::async_trait;
use common::secret::SecretString;
use common::types::{CallCid, ConnectionId, RequestId, UserId};
use serde::Serialize;
use std::fmt;
use std::time::Duration;
use thiserror::Error;

use crate::errors::CallError;
use crate::models::{
    BroadcastInfo, CallDetails, Capability, JoinCallResponse, Member, PushDevice,
    QueryCallsResult, QueryMembersResult, Reaction,
};

// =============================================================================
// Request context
// =============================================================================

/// Everything a backend call is signed with.
#[derive(Clone)]
pub struct RequestContext {
    /// The user's current credential.
    pub authorization: SecretString,
    /// Application API key.
    pub api_key: SecretString,
    /// Live coordinator connection, when one is open.
    pub connection_id: Option<ConnectionId>,
    /// Unique per request.
    pub request_id: RequestId,
    /// How long the caller is willing to wait.
    pub deadline: Duration,
}

impl fmt::Debug for RequestContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RequestContext")
            .field("authorization", &"[REDACTED]")
            .field("api_key", &"[REDACTED]")
            .field("connection_id", &self.connection_id)
            .field("request_id", &self.request_id)
            .field("deadline", &self.deadline)
            .finish()
    }
}

// =============================================================================
// Failures
// =============================================================================

/// How a backend call failed, as reported by the API implementation.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ApiFailure {
    /// The request never got a response.
    #[error("network failure: {message}")]
    Network { message: String },

    /// The coordinator rejected the credential (HTTP 401).
    #[error("unauthorized: {message}")]
    Unauthorized { message: String },

    /// Well-formed error response.
    #[error("rejected with status {status} (code {code}): {message}")]
    Rejected {
        status: u16,
        code: i32,
        message: String,
    },

    /// A response arrived but could not be decoded.
    #[error("malformed response: {message}")]
    Malformed { message: String },
}

impl From<ApiFailure> for CallError {
    fn from(failure: ApiFailure) -> Self {
        match failure {
            ApiFailure::Network { message } => CallError::transport(message, true),
            ApiFailure::Unauthorized { message } => CallError::Authentication(message),
            ApiFailure::Rejected {
                status,
                code,
                message,
            } => CallError::Backend {
                status,
                code,
                message,
            },
            ApiFailure::Malformed { message } => CallError::transport(message, false),
        }
    }
}

// =============================================================================
// Requests
// =============================================================================

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GetOrCreateCallRequest {
    pub cid: CallCid,
    pub members: Vec<UserId>,
    pub custom: serde_json::Value,
    pub ring: bool,
}

impl GetOrCreateCallRequest {
    #[must_use]
    pub fn new(cid: CallCid) -> Self {
        Self {
            cid,
            members: Vec::new(),
            custom: serde_json::Value::Null,
            ring: false,
        }
    }
}

/// What the application asks for when joining.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JoinCallOptions {
    pub cid: CallCid,
    /// Create the call if it does not exist.
    pub create: bool,
    /// Edge the client is migrating away from, if any.
    pub migrating_from: Option<String>,
}

impl JoinCallOptions {
    #[must_use]
    pub fn new(cid: CallCid) -> Self {
        Self {
            cid,
            create: false,
            migrating_from: None,
        }
    }

    #[must_use]
    pub fn create(mut self, create: bool) -> Self {
        self.create = create;
        self
    }
}

/// The join request sent on the wire, including the location hint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct JoinCallRequest {
    pub cid: CallCid,
    pub create: bool,
    pub location: String,
    pub migrating_from: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct UpdateCallRequest {
    pub cid: CallCid,
    pub custom: serde_json::Value,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct InviteUsersRequest {
    pub cid: CallCid,
    pub user_ids: Vec<UserId>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct QueryCallsRequest {
    pub filter: serde_json::Value,
    pub limit: Option<u32>,
    pub next: Option<String>,
    /// Subscribe to updates for the returned calls.
    pub watch: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct QueryMembersRequest {
    pub cid: CallCid,
    pub filter: serde_json::Value,
    pub limit: Option<u32>,
    pub next: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CreateDeviceRequest {
    pub id: String,
    pub push_provider: String,
    pub voip: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SendReactionRequest {
    pub cid: CallCid,
    pub reaction: Reaction,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MuteUsersRequest {
    pub cid: CallCid,
    pub user_ids: Vec<UserId>,
    pub audio: bool,
    pub video: bool,
    pub screenshare: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RequestPermissionsRequest {
    pub cid: CallCid,
    pub permissions: Vec<Capability>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UpdateUserPermissionsRequest {
    pub cid: CallCid,
    pub user_id: UserId,
    pub grant: Vec<Capability>,
    pub revoke: Vec<Capability>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SendCustomEventRequest {
    pub cid: CallCid,
    pub custom: serde_json::Value,
}

// =============================================================================
// Trait
// =============================================================================

/// Coordinator request/response operations (enables mocking).
#[async_trait]
pub trait CoordinatorApi: Send + Sync {
    async fn get_or_create_call(
        &self,
        ctx: &RequestContext,
        request: GetOrCreateCallRequest,
    ) -> Result<Option<CallDetails>, ApiFailure>;

    async fn join_call(
        &self,
        ctx: &RequestContext,
        request: JoinCallRequest,
    ) -> Result<Option<JoinCallResponse>, ApiFailure>;

    async fn update_call(
        &self,
        ctx: &RequestContext,
        request: UpdateCallRequest,
    ) -> Result<Option<CallDetails>, ApiFailure>;

    async fn end_call(&self, ctx: &RequestContext, cid: CallCid) -> Result<(), ApiFailure>;

    async fn invite_users(
        &self,
        ctx: &RequestContext,
        request: InviteUsersRequest,
    ) -> Result<Option<Vec<Member>>, ApiFailure>;

    async fn query_calls(
        &self,
        ctx: &RequestContext,
        request: QueryCallsRequest,
    ) -> Result<Option<QueryCallsResult>, ApiFailure>;

    async fn query_members(
        &self,
        ctx: &RequestContext,
        request: QueryMembersRequest,
    ) -> Result<Option<QueryMembersResult>, ApiFailure>;

    async fn create_device(
        &self,
        ctx: &RequestContext,
        request: CreateDeviceRequest,
    ) -> Result<(), ApiFailure>;

    async fn delete_device(&self, ctx: &RequestContext, device_id: String)
        -> Result<(), ApiFailure>;

    async fn list_devices(&self, ctx: &RequestContext)
        -> Result<Option<Vec<PushDevice>>, ApiFailure>;

    async fn start_recording(&self, ctx: &RequestContext, cid: CallCid) -> Result<(), ApiFailure>;

    async fn stop_recording(&self, ctx: &RequestContext, cid: CallCid) -> Result<(), ApiFailure>;

    async fn start_broadcasting(
        &self,
        ctx: &RequestContext,
        cid: CallCid,
    ) -> Result<Option<BroadcastInfo>, ApiFailure>;

    async fn stop_broadcasting(&self, ctx: &RequestContext, cid: CallCid)
        -> Result<(), ApiFailure>;

    async fn send_reaction(
        &self,
        ctx: &RequestContext,
        request: SendReactionRequest,
    ) -> Result<Option<Reaction>, ApiFailure>;

    async fn mute_users(
        &self,
        ctx: &RequestContext,
        request: MuteUsersRequest,
    ) -> Result<(), ApiFailure>;

    async fn block_user(
        &self,
        ctx: &RequestContext,
        cid: CallCid,
        user_id: UserId,
    ) -> Result<(), ApiFailure>;

    async fn unblock_user(
        &self,
        ctx: &RequestContext,
        cid: CallCid,
        user_id: UserId,
    ) -> Result<(), ApiFailure>;

    async fn request_permissions(
        &self,
        ctx: &RequestContext,
        request: RequestPermissionsRequest,
    ) -> Result<(), ApiFailure>;

    async fn update_user_permissions(
        &self,
        ctx: &RequestContext,
        request: UpdateUserPermissionsRequest,
    ) -> Result<(), ApiFailure>;

    async fn send_custom_event(
        &self,
        ctx: &RequestContext,
        request: SendCustomEventRequest,
    ) -> Result<(), ApiFailure>;
}
