//! Outbound backend calls.
//!
//! Every call follows the same path: validate arguments, sign, invoke the
//! [`CoordinatorApi`] under the handle's deadline, map the response. A
//! credential rejection invalidates the cached credential so the next call
//! fetches a fresh one; the failed call itself is not retried.

use common::types::{CallCid, ConnectionId, UserId};
use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, instrument, warn};

use super::actor::SessionClientHandle;
use super::ConnectionState;
use crate::backend::{
    ApiFailure, CoordinatorApi, CreateDeviceRequest, GetOrCreateCallRequest, InviteUsersRequest,
    JoinCallOptions, JoinCallRequest, MuteUsersRequest, QueryCallsRequest, QueryMembersRequest,
    RequestContext, RequestPermissionsRequest, SendCustomEventRequest, SendReactionRequest,
    UpdateCallRequest, UpdateUserPermissionsRequest,
};
use crate::errors::{CallError, ValidationError};
use crate::models::{
    BroadcastInfo, CallDetails, JoinedCall, Member, PushDevice, QueryCallsResult,
    QueryMembersResult, Reaction,
};
use crate::observability::metrics;

fn require<T>(operation: &'static str, value: Option<T>) -> Result<T, CallError> {
    value.ok_or(CallError::UnexpectedNullResult(operation))
}

fn invalid(message: impl Into<String>) -> CallError {
    ValidationError::InvalidArgument(message.into()).into()
}

fn ensure_not_empty<T>(field: &str, values: &[T]) -> Result<(), CallError> {
    if values.is_empty() {
        return Err(invalid(format!("{field} must not be empty")));
    }
    Ok(())
}

fn ensure_not_blank(field: &str, value: &str) -> Result<(), CallError> {
    if value.trim().is_empty() {
        return Err(invalid(format!("{field} must not be blank")));
    }
    Ok(())
}

impl SessionClientHandle {
    fn deadline(&self) -> Duration {
        self.deadline.unwrap_or(self.calls.request_timeout)
    }

    fn live_connection_id(&self) -> Option<ConnectionId> {
        let status = self.status.borrow();
        match status.state {
            ConnectionState::Connected => status.connection_id.clone(),
            _ => None,
        }
    }

    /// Sign, invoke and account for one backend call.
    async fn execute<T, F, Fut>(&self, operation: &'static str, call: F) -> Result<T, CallError>
    where
        F: FnOnce(Arc<dyn CoordinatorApi>, RequestContext) -> Fut,
        Fut: Future<Output = Result<T, ApiFailure>>,
    {
        let deadline = self.deadline();
        let ctx = self
            .calls
            .signer
            .sign(operation, self.live_connection_id(), deadline)
            .await
            .inspect_err(|e| metrics::record_backend_error(operation, e.kind_label()))?;
        let request_id = ctx.request_id;

        let start = Instant::now();
        let outcome = tokio::time::timeout(deadline, call(Arc::clone(&self.calls.api), ctx)).await;
        let elapsed = start.elapsed();

        let result = match outcome {
            Ok(Ok(value)) => {
                metrics::record_backend_call(operation, "success", elapsed);
                debug!(
                    target: "call.session",
                    operation = operation,
                    request_id = %request_id.0,
                    elapsed_ms = u64::try_from(elapsed.as_millis()).unwrap_or(u64::MAX),
                    "Backend call succeeded"
                );
                return Ok(value);
            }
            Ok(Err(failure)) => {
                if matches!(failure, ApiFailure::Unauthorized { .. }) {
                    self.calls.signer.invalidate_credential().await;
                    metrics::record_credential_refresh("backend_call");
                }
                CallError::from(failure)
            }
            Err(_elapsed) => CallError::transport(
                format!("{operation} exceeded deadline of {}ms", deadline.as_millis()),
                true,
            ),
        };

        metrics::record_backend_call(operation, "error", elapsed);
        metrics::record_backend_error(operation, result.kind_label());
        warn!(
            target: "call.session",
            operation = operation,
            request_id = %request_id.0,
            error = %result,
            "Backend call failed"
        );
        Err(result)
    }

    /// Fetch a call, creating it if it does not exist.
    #[instrument(skip_all, fields(cid = %request.cid))]
    pub async fn get_or_create_call(
        &self,
        request: GetOrCreateCallRequest,
    ) -> Result<CallDetails, CallError> {
        let value = self
            .execute("get_or_create_call", |api, ctx| async move {
                api.get_or_create_call(&ctx, request).await
            })
            .await?;
        require("get_or_create_call", value)
    }

    /// Join a call.
    ///
    /// Needs a bound user. The result is stamped with the session epoch it was
    /// obtained under so the store can refuse it after a rebind.
    #[instrument(skip_all, fields(cid = %options.cid))]
    pub async fn join_call(&self, options: JoinCallOptions) -> Result<JoinedCall, CallError> {
        let (user_id, epoch) = {
            let status = self.status.borrow();
            let Some(user_id) = status.user_id.clone() else {
                return Err(ValidationError::NoUserBound.into());
            };
            (user_id, status.epoch)
        };

        let location = self.calls.location.get_location().await?;
        let request = JoinCallRequest {
            cid: options.cid,
            create: options.create,
            location,
            migrating_from: options.migrating_from,
        };

        let value = self
            .execute("join_call", |api, ctx| async move {
                api.join_call(&ctx, request).await
            })
            .await?;
        let response = require("join_call", value)?;

        Ok(JoinedCall {
            epoch,
            user_id,
            call: response.call,
            members: response.members,
            session_id: response.session_id,
            credentials: response.credentials,
            own_capabilities: response.own_capabilities,
            participants: response.participants,
        })
    }

    /// Replace the call's custom data.
    pub async fn update_call(
        &self,
        cid: CallCid,
        custom: serde_json::Value,
    ) -> Result<CallDetails, CallError> {
        let request = UpdateCallRequest { cid, custom };
        let value = self
            .execute("update_call", |api, ctx| async move {
                api.update_call(&ctx, request).await
            })
            .await?;
        require("update_call", value)
    }

    pub async fn end_call(&self, cid: CallCid) -> Result<(), CallError> {
        self.execute("end_call", |api, ctx| async move {
            api.end_call(&ctx, cid).await
        })
        .await
    }

    /// Add members to a call. Returns the resulting member list.
    pub async fn invite_users(
        &self,
        cid: CallCid,
        user_ids: Vec<UserId>,
    ) -> Result<Vec<Member>, CallError> {
        ensure_not_empty("user_ids", &user_ids)?;
        let request = InviteUsersRequest { cid, user_ids };
        let value = self
            .execute("invite_users", |api, ctx| async move {
                api.invite_users(&ctx, request).await
            })
            .await?;
        require("invite_users", value)
    }

    pub async fn query_calls(
        &self,
        request: QueryCallsRequest,
    ) -> Result<QueryCallsResult, CallError> {
        let value = self
            .execute("query_calls", |api, ctx| async move {
                api.query_calls(&ctx, request).await
            })
            .await?;
        require("query_calls", value)
    }

    pub async fn query_members(
        &self,
        request: QueryMembersRequest,
    ) -> Result<QueryMembersResult, CallError> {
        let value = self
            .execute("query_members", |api, ctx| async move {
                api.query_members(&ctx, request).await
            })
            .await?;
        require("query_members", value)
    }

    /// Register a push device for the bound user.
    pub async fn create_device(&self, request: CreateDeviceRequest) -> Result<(), CallError> {
        ensure_not_blank("device id", &request.id)?;
        ensure_not_blank("push provider", &request.push_provider)?;
        self.execute("create_device", |api, ctx| async move {
            api.create_device(&ctx, request).await
        })
        .await
    }

    pub async fn delete_device(&self, device_id: impl Into<String>) -> Result<(), CallError> {
        let device_id = device_id.into();
        ensure_not_blank("device id", &device_id)?;
        self.execute("delete_device", |api, ctx| async move {
            api.delete_device(&ctx, device_id).await
        })
        .await
    }

    pub async fn list_devices(&self) -> Result<Vec<PushDevice>, CallError> {
        let value = self
            .execute("list_devices", |api, ctx| async move {
                api.list_devices(&ctx).await
            })
            .await?;
        require("list_devices", value)
    }

    pub async fn start_recording(&self, cid: CallCid) -> Result<(), CallError> {
        self.execute("start_recording", |api, ctx| async move {
            api.start_recording(&ctx, cid).await
        })
        .await
    }

    pub async fn stop_recording(&self, cid: CallCid) -> Result<(), CallError> {
        self.execute("stop_recording", |api, ctx| async move {
            api.stop_recording(&ctx, cid).await
        })
        .await
    }

    /// Start HLS broadcasting. Returns the playlist location.
    pub async fn start_broadcasting(&self, cid: CallCid) -> Result<BroadcastInfo, CallError> {
        let value = self
            .execute("start_broadcasting", |api, ctx| async move {
                api.start_broadcasting(&ctx, cid).await
            })
            .await?;
        require("start_broadcasting", value)
    }

    pub async fn stop_broadcasting(&self, cid: CallCid) -> Result<(), CallError> {
        self.execute("stop_broadcasting", |api, ctx| async move {
            api.stop_broadcasting(&ctx, cid).await
        })
        .await
    }

    pub async fn send_reaction(
        &self,
        cid: CallCid,
        reaction: Reaction,
    ) -> Result<Reaction, CallError> {
        ensure_not_blank("reaction type", &reaction.reaction_type)?;
        let request = SendReactionRequest { cid, reaction };
        let value = self
            .execute("send_reaction", |api, ctx| async move {
                api.send_reaction(&ctx, request).await
            })
            .await?;
        require("send_reaction", value)
    }

    /// Force-mute other participants. At least one track kind must be named.
    pub async fn mute_users(&self, request: MuteUsersRequest) -> Result<(), CallError> {
        ensure_not_empty("user_ids", &request.user_ids)?;
        if !(request.audio || request.video || request.screenshare) {
            return Err(invalid("at least one of audio, video or screenshare must be set"));
        }
        self.execute("mute_users", |api, ctx| async move {
            api.mute_users(&ctx, request).await
        })
        .await
    }

    pub async fn block_user(&self, cid: CallCid, user_id: UserId) -> Result<(), CallError> {
        self.execute("block_user", |api, ctx| async move {
            api.block_user(&ctx, cid, user_id).await
        })
        .await
    }

    pub async fn unblock_user(&self, cid: CallCid, user_id: UserId) -> Result<(), CallError> {
        self.execute("unblock_user", |api, ctx| async move {
            api.unblock_user(&ctx, cid, user_id).await
        })
        .await
    }

    pub async fn request_permissions(
        &self,
        request: RequestPermissionsRequest,
    ) -> Result<(), CallError> {
        ensure_not_empty("permissions", &request.permissions)?;
        self.execute("request_permissions", |api, ctx| async move {
            api.request_permissions(&ctx, request).await
        })
        .await
    }

    pub async fn update_user_permissions(
        &self,
        request: UpdateUserPermissionsRequest,
    ) -> Result<(), CallError> {
        if request.grant.is_empty() && request.revoke.is_empty() {
            return Err(invalid("nothing to grant or revoke"));
        }
        self.execute("update_user_permissions", |api, ctx| async move {
            api.update_user_permissions(&ctx, request).await
        })
        .await
    }

    /// Send an application-defined event to everyone in the call.
    /// `custom` must be a JSON object.
    pub async fn send_custom_event(
        &self,
        cid: CallCid,
        custom: serde_json::Value,
    ) -> Result<(), CallError> {
        if !custom.is_object() {
            return Err(invalid("custom event payload must be a JSON object"));
        }
        let request = SendCustomEventRequest { cid, custom };
        self.execute("send_custom_event", |api, ctx| async move {
            api.send_custom_event(&ctx, request).await
        })
        .await
    }
}
