use std::sync::Arc;

use axum::extract::State;
use axum::Json;
use thatdam_auth::Jwks;

use crate::api::HealthResponse;
use crate::state::SupervisorState;

/// `GET /health` (unauthenticated)
pub async fn health(State(state): State<Arc<SupervisorState>>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        agents: state.registry.len(),
    })
}

/// `GET /.well-known/jwks.json`
pub async fn jwks(State(state): State<Arc<SupervisorState>>) -> Json<Jwks> {
    Json(state.issuer.jwks())
}
