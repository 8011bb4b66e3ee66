//! Mock coordinator API.
//!
//! Records every call with the context it was signed with and the request
//! serialized to JSON, and answers with plausible payloads. Failures and
//! missing payloads can be scripted per operation.
//!
//! # Example
//!
//! ```rust,ignore
//! let api = MockCoordinatorApi::builder()
//!     .fail_once("end_call", ApiFailure::Unauthorized { message: "expired".into() })
//!     .null_result("get_or_create_call")
//!     .build();
//!
//! let err = session.end_call(test_cid()).await.unwrap_err();
//! assert_eq!(api.calls_to("end_call").len(), 1);
//! ```

use async_trait::async_trait;
use call_client::backend::{
    ApiFailure, CoordinatorApi, CreateDeviceRequest, GetOrCreateCallRequest, InviteUsersRequest,
    JoinCallRequest, MuteUsersRequest, QueryCallsRequest, QueryMembersRequest, RequestContext,
    RequestPermissionsRequest, SendCustomEventRequest, SendReactionRequest, UpdateCallRequest,
    UpdateUserPermissionsRequest,
};
use call_client::models::{
    BroadcastInfo, CallDetails, JoinCallResponse, Member, PushDevice, QueryCallsResult,
    QueryMembersResult, Reaction,
};
use common::secret::ExposeSecret;
use common::types::{CallCid, ConnectionId, RequestId, UserId};
use serde_json::json;
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use crate::fixtures::join_response;

/// One call as the mock saw it.
#[derive(Debug, Clone, PartialEq)]
pub struct RecordedCall {
    pub operation: &'static str,
    pub authorization: String,
    pub api_key: String,
    pub connection_id: Option<ConnectionId>,
    pub request_id: RequestId,
    pub deadline: Duration,
    pub body: serde_json::Value,
}

#[derive(Default)]
struct MockApiState {
    calls: Vec<RecordedCall>,
    failures: HashMap<&'static str, VecDeque<ApiFailure>>,
    null_results: HashSet<&'static str>,
    join_response: Option<JoinCallResponse>,
    devices: Vec<PushDevice>,
    latency: Option<Duration>,
}

/// Mock implementation of [`CoordinatorApi`].
#[derive(Clone, Default)]
pub struct MockCoordinatorApi {
    state: Arc<Mutex<MockApiState>>,
}

impl std::fmt::Debug for MockCoordinatorApi {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MockCoordinatorApi")
            .field("calls", &self.state.lock().unwrap().calls.len())
            .finish_non_exhaustive()
    }
}

impl MockCoordinatorApi {
    #[must_use]
    pub fn builder() -> MockCoordinatorApiBuilder {
        MockCoordinatorApiBuilder::default()
    }

    /// Make the next call to `operation` fail.
    pub fn fail_next(&self, operation: &'static str, failure: ApiFailure) {
        self.state
            .lock()
            .unwrap()
            .failures
            .entry(operation)
            .or_default()
            .push_back(failure);
    }

    /// Every call so far, in order.
    #[must_use]
    pub fn calls(&self) -> Vec<RecordedCall> {
        self.state.lock().unwrap().calls.clone()
    }

    /// Calls to one operation.
    #[must_use]
    pub fn calls_to(&self, operation: &str) -> Vec<RecordedCall> {
        self.calls()
            .into_iter()
            .filter(|c| c.operation == operation)
            .collect()
    }

    /// The most recent call.
    ///
    /// # Panics
    ///
    /// Panics if nothing was called yet.
    #[must_use]
    pub fn last_call(&self) -> RecordedCall {
        self.calls().pop().expect("no backend call recorded")
    }

    /// Record a call and return the scripted failure, if any.
    async fn enter(
        &self,
        operation: &'static str,
        ctx: &RequestContext,
        body: serde_json::Value,
    ) -> Result<bool, ApiFailure> {
        let (failure, null_result, latency) = {
            let mut state = self.state.lock().unwrap();
            state.calls.push(RecordedCall {
                operation,
                authorization: ctx.authorization.expose_secret().to_string(),
                api_key: ctx.api_key.expose_secret().to_string(),
                connection_id: ctx.connection_id.clone(),
                request_id: ctx.request_id,
                deadline: ctx.deadline,
                body,
            });
            let failure = state
                .failures
                .get_mut(operation)
                .and_then(VecDeque::pop_front);
            (
                failure,
                state.null_results.contains(operation),
                state.latency,
            )
        };

        if let Some(latency) = latency {
            tokio::time::sleep(latency).await;
        }
        match failure {
            Some(failure) => Err(failure),
            None => Ok(null_result),
        }
    }

    /// Like [`Self::enter`] for operations with a payload.
    async fn respond<T>(
        &self,
        operation: &'static str,
        ctx: &RequestContext,
        body: serde_json::Value,
        payload: impl FnOnce() -> T,
    ) -> Result<Option<T>, ApiFailure> {
        let null_result = self.enter(operation, ctx, body).await?;
        Ok((!null_result).then(payload))
    }
}

/// Builder for [`MockCoordinatorApi`].
#[derive(Default)]
pub struct MockCoordinatorApiBuilder {
    state: MockApiState,
}

impl MockCoordinatorApiBuilder {
    /// The first call to `operation` fails with `failure`.
    #[must_use]
    pub fn fail_once(mut self, operation: &'static str, failure: ApiFailure) -> Self {
        self.state
            .failures
            .entry(operation)
            .or_default()
            .push_back(failure);
        self
    }

    /// `operation` succeeds without a payload.
    #[must_use]
    pub fn null_result(mut self, operation: &'static str) -> Self {
        self.state.null_results.insert(operation);
        self
    }

    /// Answer `join_call` with `response` instead of the default fixture.
    #[must_use]
    pub fn with_join_response(mut self, response: JoinCallResponse) -> Self {
        self.state.join_response = Some(response);
        self
    }

    /// Every call takes `latency` before answering.
    #[must_use]
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.state.latency = Some(latency);
        self
    }

    #[must_use]
    pub fn build(self) -> MockCoordinatorApi {
        MockCoordinatorApi {
            state: Arc::new(Mutex::new(self.state)),
        }
    }
}

fn to_json<T: serde::Serialize>(value: &T) -> serde_json::Value {
    serde_json::to_value(value).unwrap()
}

#[async_trait]
impl CoordinatorApi for MockCoordinatorApi {
    async fn get_or_create_call(
        &self,
        ctx: &RequestContext,
        request: GetOrCreateCallRequest,
    ) -> Result<Option<CallDetails>, ApiFailure> {
        let body = to_json(&request);
        self.respond("get_or_create_call", ctx, body, || {
            CallDetails::new(request.cid)
        })
        .await
    }

    async fn join_call(
        &self,
        ctx: &RequestContext,
        request: JoinCallRequest,
    ) -> Result<Option<JoinCallResponse>, ApiFailure> {
        let body = to_json(&request);
        let scripted = self.state.lock().unwrap().join_response.clone();
        self.respond("join_call", ctx, body, || {
            scripted.unwrap_or_else(|| join_response(request.cid, "s-local", Vec::new()))
        })
        .await
    }

    async fn update_call(
        &self,
        ctx: &RequestContext,
        request: UpdateCallRequest,
    ) -> Result<Option<CallDetails>, ApiFailure> {
        let body = to_json(&request);
        self.respond("update_call", ctx, body, || CallDetails {
            custom: request.custom,
            ..CallDetails::new(request.cid)
        })
        .await
    }

    async fn end_call(&self, ctx: &RequestContext, cid: CallCid) -> Result<(), ApiFailure> {
        self.enter("end_call", ctx, json!({ "cid": cid })).await?;
        Ok(())
    }

    async fn invite_users(
        &self,
        ctx: &RequestContext,
        request: InviteUsersRequest,
    ) -> Result<Option<Vec<Member>>, ApiFailure> {
        let body = to_json(&request);
        self.respond("invite_users", ctx, body, || {
            request
                .user_ids
                .into_iter()
                .map(|user_id| Member {
                    user_id,
                    role: Some("user".into()),
                    custom: serde_json::Value::Null,
                })
                .collect()
        })
        .await
    }

    async fn query_calls(
        &self,
        ctx: &RequestContext,
        request: QueryCallsRequest,
    ) -> Result<Option<QueryCallsResult>, ApiFailure> {
        self.respond("query_calls", ctx, to_json(&request), || QueryCallsResult {
            calls: Vec::new(),
            next: None,
        })
        .await
    }

    async fn query_members(
        &self,
        ctx: &RequestContext,
        request: QueryMembersRequest,
    ) -> Result<Option<QueryMembersResult>, ApiFailure> {
        self.respond("query_members", ctx, to_json(&request), || QueryMembersResult {
            members: Vec::new(),
            next: None,
        })
        .await
    }

    async fn create_device(
        &self,
        ctx: &RequestContext,
        request: CreateDeviceRequest,
    ) -> Result<(), ApiFailure> {
        self.enter("create_device", ctx, to_json(&request)).await?;
        self.state.lock().unwrap().devices.push(PushDevice {
            id: request.id,
            push_provider: request.push_provider,
        });
        Ok(())
    }

    async fn delete_device(
        &self,
        ctx: &RequestContext,
        device_id: String,
    ) -> Result<(), ApiFailure> {
        self.enter("delete_device", ctx, json!({ "id": device_id }))
            .await?;
        self.state
            .lock()
            .unwrap()
            .devices
            .retain(|d| d.id != device_id);
        Ok(())
    }

    async fn list_devices(
        &self,
        ctx: &RequestContext,
    ) -> Result<Option<Vec<PushDevice>>, ApiFailure> {
        let devices = self.state.lock().unwrap().devices.clone();
        self.respond("list_devices", ctx, serde_json::Value::Null, || devices)
            .await
    }

    async fn start_recording(&self, ctx: &RequestContext, cid: CallCid) -> Result<(), ApiFailure> {
        self.enter("start_recording", ctx, json!({ "cid": cid })).await?;
        Ok(())
    }

    async fn stop_recording(&self, ctx: &RequestContext, cid: CallCid) -> Result<(), ApiFailure> {
        self.enter("stop_recording", ctx, json!({ "cid": cid })).await?;
        Ok(())
    }

    async fn start_broadcasting(
        &self,
        ctx: &RequestContext,
        cid: CallCid,
    ) -> Result<Option<BroadcastInfo>, ApiFailure> {
        let playlist_url = format!("https://hls.example.test/{cid}/playlist.m3u8");
        self.respond("start_broadcasting", ctx, json!({ "cid": cid }), || {
            BroadcastInfo { playlist_url }
        })
        .await
    }

    async fn stop_broadcasting(
        &self,
        ctx: &RequestContext,
        cid: CallCid,
    ) -> Result<(), ApiFailure> {
        self.enter("stop_broadcasting", ctx, json!({ "cid": cid }))
            .await?;
        Ok(())
    }

    async fn send_reaction(
        &self,
        ctx: &RequestContext,
        request: SendReactionRequest,
    ) -> Result<Option<Reaction>, ApiFailure> {
        let body = to_json(&request);
        self.respond("send_reaction", ctx, body, || request.reaction)
            .await
    }

    async fn mute_users(
        &self,
        ctx: &RequestContext,
        request: MuteUsersRequest,
    ) -> Result<(), ApiFailure> {
        self.enter("mute_users", ctx, to_json(&request)).await?;
        Ok(())
    }

    async fn block_user(
        &self,
        ctx: &RequestContext,
        cid: CallCid,
        user_id: UserId,
    ) -> Result<(), ApiFailure> {
        self.enter("block_user", ctx, json!({ "cid": cid, "user_id": user_id }))
            .await?;
        Ok(())
    }

    async fn unblock_user(
        &self,
        ctx: &RequestContext,
        cid: CallCid,
        user_id: UserId,
    ) -> Result<(), ApiFailure> {
        self.enter(
            "unblock_user",
            ctx,
            json!({ "cid": cid, "user_id": user_id }),
        )
        .await?;
        Ok(())
    }

    async fn request_permissions(
        &self,
        ctx: &RequestContext,
        request: RequestPermissionsRequest,
    ) -> Result<(), ApiFailure> {
        self.enter("request_permissions", ctx, to_json(&request))
            .await?;
        Ok(())
    }

    async fn update_user_permissions(
        &self,
        ctx: &RequestContext,
        request: UpdateUserPermissionsRequest,
    ) -> Result<(), ApiFailure> {
        self.enter("update_user_permissions", ctx, to_json(&request))
            .await?;
        Ok(())
    }

    async fn send_custom_event(
        &self,
        ctx: &RequestContext,
        request: SendCustomEventRequest,
    ) -> Result<(), ApiFailure> {
        self.enter("send_custom_event", ctx, to_json(&request))
            .await?;
        Ok(())
    }
}
