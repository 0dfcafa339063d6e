//! Axum router configuration.
//!
//! ```text
//! /
//! ├── /health                    - liveness (unauthenticated)
//! ├── /.well-known/jwks.json     - token verification keys
//! ├── /v1/nodes/*                - register, plan, heartbeat, listing
//! ├── /v1/leader/claim           - advisory leader lease
//! ├── /v1/tenancy/plan           - tenancy planner
//! ├── /v1/tokens/*               - join token issue and exchange
//! └── /api/claims/*              - device pairing
//! ```

use std::sync::Arc;

use axum::extract::DefaultBodyLimit;
use axum::routing::get;
use axum::routing::post;
use axum::Router;
use thatdam_constants::supervisor::MAX_REQUEST_BODY_BYTES;

use crate::handlers::claims;
use crate::handlers::health;
use crate::handlers::leader;
use crate::handlers::nodes;
use crate::handlers::tenancy;
use crate::handlers::tokens;
use crate::state::SupervisorState;

/// Build the complete router.
pub fn build_router(state: Arc<SupervisorState>) -> Router {
    Router::new()
        .route("/health", get(health::health))
        .route("/.well-known/jwks.json", get(health::jwks))
        .nest("/v1", v1_router())
        .nest("/api/claims", claims_router())
        .layer(DefaultBodyLimit::max(MAX_REQUEST_BODY_BYTES))
        .with_state(state)
}

/// Routes:
/// - `POST /v1/nodes/register`
/// - `POST /v1/nodes/plan`
/// - `POST /v1/nodes/heartbeat`
/// - `GET  /v1/nodes`
/// - `POST /v1/leader/claim`
/// - `POST /v1/tenancy/plan`
/// - `POST /v1/tokens/join`
/// - `POST /v1/tokens/exchange`
fn v1_router() -> Router<Arc<SupervisorState>> {
    Router::new()
        .route("/nodes", get(nodes::list))
        .route("/nodes/register", post(nodes::register))
        .route("/nodes/plan", post(nodes::plan))
        .route("/nodes/heartbeat", post(nodes::heartbeat))
        .route("/leader/claim", post(leader::claim))
        .route("/tenancy/plan", post(tenancy::plan))
        .route("/tokens/join", post(tokens::join))
        .route("/tokens/exchange", post(tokens::exchange))
}

/// Routes:
/// - `POST /api/claims/new`
/// - `GET  /api/claims/:id/watch`
/// - `POST /api/claims/fulfill`
fn claims_router() -> Router<Arc<SupervisorState>> {
    Router::new()
        .route("/new", post(claims::create))
        .route("/:id/watch", get(claims::watch))
        .route("/fulfill", post(claims::fulfill))
}
