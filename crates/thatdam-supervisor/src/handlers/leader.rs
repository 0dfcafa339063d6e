use std::sync::Arc;

use axum::extract::State;
use axum::Json;
use thatdam_policy::Action;
use tracing::debug;

use crate::api::LeaderClaimRequest;
use crate::api::LeaderClaimResponse;
use crate::error::ApiError;
use crate::extract::Caller;
use crate::extract::JsonBody;
use crate::state::SupervisorState;

/// `POST /v1/leader/claim`
///
/// Advisory only: a grant says who the supervisor currently considers leader.
pub async fn claim(
    State(state): State<Arc<SupervisorState>>,
    caller: Caller,
    JsonBody(req): JsonBody<LeaderClaimRequest>,
) -> Result<Json<LeaderClaimResponse>, ApiError> {
    caller.authorize(&state, Action::LeaderClaim)?;
    if req.node_id.trim().is_empty() {
        return Err(ApiError::bad_request("missing node_id"));
    }
    let grant = state.leader.claim(req.node_id.trim());
    debug!(node_id = %req.node_id, granted = grant.granted, epoch = grant.epoch, "leader claim");
    Ok(Json(LeaderClaimResponse {
        granted: grant.granted,
        leader_url: state.config.leader_url().to_string(),
        epoch: grant.epoch,
        holder: grant.holder,
    }))
}
