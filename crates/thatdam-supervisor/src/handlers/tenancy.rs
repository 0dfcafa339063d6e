use std::sync::Arc;

use axum::extract::State;
use axum::Json;
use thatdam_policy::Action;
use thatdam_reconcile::plan_for;
use thatdam_reconcile::TenancyPlan;
use thatdam_reconcile::TenancyProfile;

use crate::api::TenancyRequest;
use crate::error::ApiError;
use crate::extract::Caller;
use crate::extract::JsonBody;
use crate::state::SupervisorState;

/// `POST /v1/tenancy/plan`
pub async fn plan(
    State(state): State<Arc<SupervisorState>>,
    caller: Caller,
    JsonBody(req): JsonBody<TenancyRequest>,
) -> Result<Json<TenancyPlan>, ApiError> {
    caller.authorize(&state, Action::PlanRead)?;
    let profile: TenancyProfile = req.profile.parse().map_err(|e| ApiError::bad_request(format!("{e}")))?;
    Ok(Json(plan_for(profile, req.cluster)))
}
