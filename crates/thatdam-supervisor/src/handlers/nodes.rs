//! Node lifecycle: register, plan, heartbeat and listing.

use std::sync::Arc;

use axum::extract::State;
use axum::http::StatusCode;
use axum::Json;
use thatdam_plan::DesiredPlan;
use thatdam_policy::Action;
use tracing::debug;

use crate::api::pick_id;
use crate::api::HeartbeatRequest;
use crate::api::PlanRequest;
use crate::api::PlanResponse;
use crate::api::RegisterRequest;
use crate::api::RegisterResponse;
use crate::error::ApiError;
use crate::extract::Caller;
use crate::extract::JsonBody;
use crate::plan::select_template;
use crate::registry::Agent;
use crate::registry::Registration;
use crate::state::SupervisorState;

/// Plans are re-rendered from templates on every request.
const PLAN_VERSION: u64 = 1;

/// `POST /v1/nodes/register`
pub async fn register(
    State(state): State<Arc<SupervisorState>>,
    caller: Caller,
    JsonBody(req): JsonBody<RegisterRequest>,
) -> Result<Json<RegisterResponse>, ApiError> {
    caller.authorize(&state, Action::Register)?;
    let id = pick_id(req.id.as_deref(), req.node_id.as_deref()).ok_or_else(|| ApiError::bad_request("missing id"))?;

    let agent = state.registry.register(Registration {
        id,
        class: req.class,
        version: req.version,
        features: req.features,
        address: req.address,
        meta: req.meta,
    })?;
    debug!(agent = %agent.id, class = %agent.class, sub = %caller.principal.sub, "register");
    state.events.agent("register", &agent).await;

    Ok(Json(RegisterResponse {
        registered: true,
        node_id: agent.id,
        ttl: state.registry.ttl().as_secs(),
    }))
}

/// `POST /v1/nodes/heartbeat`
pub async fn heartbeat(
    State(state): State<Arc<SupervisorState>>,
    caller: Caller,
    JsonBody(req): JsonBody<HeartbeatRequest>,
) -> Result<StatusCode, ApiError> {
    caller.authorize(&state, Action::Heartbeat)?;
    let id = pick_id(req.id.as_deref(), req.node_id.as_deref()).ok_or_else(|| ApiError::bad_request("missing id"))?;

    let agent = state.registry.heartbeat(&id, req.meta)?;
    debug!(agent = %agent.id, "heartbeat");
    state.events.agent("heartbeat", &agent).await;
    Ok(StatusCode::NO_CONTENT)
}

/// `POST /v1/nodes/plan`
pub async fn plan(
    State(state): State<Arc<SupervisorState>>,
    caller: Caller,
    JsonBody(req): JsonBody<PlanRequest>,
) -> Result<Json<PlanResponse>, ApiError> {
    caller.authorize(&state, Action::PlanRead)?;
    let node_id = req.node_id.trim();
    if node_id.is_empty() {
        return Err(ApiError::bad_request("missing node_id"));
    }

    let template = select_template(
        &req.role_hint,
        &req.capabilities,
        caller.principal.is_anonymous(),
        state.allow_anonymous_proxy(),
    );
    let plan = match template {
        Some(name) => state.templates.render(name, node_id, PLAN_VERSION)?,
        None => DesiredPlan::new(PLAN_VERSION, node_id, Vec::new()),
    };
    debug!(
        node_id,
        hint = %req.role_hint,
        template = template.unwrap_or("empty"),
        apps = plan.apps.len(),
        "plan"
    );

    let role = if state.leader.holder().as_deref() == Some(node_id) {
        "leader"
    } else {
        "agent"
    };
    Ok(Json(PlanResponse {
        plan,
        role: Some(role.to_string()),
        epoch: Some(state.leader.epoch()),
    }))
}

/// `GET /v1/nodes`
pub async fn list(State(state): State<Arc<SupervisorState>>, caller: Caller) -> Result<Json<Vec<Agent>>, ApiError> {
    caller.authorize(&state, Action::PlanRead)?;
    Ok(Json(state.registry.snapshot()))
}
