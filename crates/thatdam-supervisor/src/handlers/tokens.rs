//! Token issuance for device onboarding.
//!
//! An operator mints a node join token (NJT); the device trades it for a
//! node access token (NAT) scoped for register and plan reads.

use std::sync::Arc;

use axum::extract::State;
use axum::Json;
use thatdam_auth::TokenType;
use thatdam_constants::tokens::NAT_TTL_SECS;
use thatdam_constants::tokens::NJT_TTL_SECS;
use thatdam_policy::scopes;
use tracing::info;

use crate::api::ExchangeRequest;
use crate::api::JoinTokenRequest;
use crate::api::TokenResponse;
use crate::error::ApiError;
use crate::extract::Caller;
use crate::extract::JsonBody;
use crate::state::SupervisorState;

/// `POST /v1/tokens/join` (admin)
pub async fn join(
    State(state): State<Arc<SupervisorState>>,
    caller: Caller,
    JsonBody(req): JsonBody<JoinTokenRequest>,
) -> Result<Json<TokenResponse>, ApiError> {
    caller.require_scope(scopes::ADMIN)?;
    if req.device_id.trim().is_empty() {
        return Err(ApiError::bad_request("missing device_id"));
    }
    let token = state.issuer.sign_njt(req.device_id.trim(), req.tenant.as_deref())?;
    info!(device_id = %req.device_id, sub = %caller.principal.sub, "join token issued");
    Ok(Json(TokenResponse {
        token,
        expires_in: NJT_TTL_SECS,
    }))
}

/// `POST /v1/tokens/exchange` (bearer NJT)
pub async fn exchange(
    State(state): State<Arc<SupervisorState>>,
    caller: Caller,
    JsonBody(req): JsonBody<ExchangeRequest>,
) -> Result<Json<TokenResponse>, ApiError> {
    caller.require_authenticated()?;
    if caller.token_type != Some(TokenType::Njt) {
        return Err(ApiError::forbidden());
    }
    caller.require_scope(scopes::NODE_JOIN)?;
    if req.node_id.trim().is_empty() {
        return Err(ApiError::bad_request("missing node_id"));
    }

    let granted = [scopes::REGISTER.to_string(), scopes::READ.to_string()];
    let token = state
        .issuer
        .sign_nat(req.node_id.trim(), caller.principal.tenant.as_deref(), &granted)?;
    info!(node_id = %req.node_id, device = %caller.principal.sub, "join token exchanged");
    Ok(Json(TokenResponse {
        token,
        expires_in: NAT_TTL_SECS,
    }))
}
