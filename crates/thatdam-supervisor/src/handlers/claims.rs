//! Device pairing claims.
//!
//! Any authenticated principal may create, watch and fulfil claims.

use std::convert::Infallible;
use std::sync::Arc;
use std::time::Duration;

use axum::extract::Path;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::sse::Event;
use axum::response::sse::KeepAlive;
use axum::response::sse::Sse;
use axum::Json;
use futures::stream;
use futures::Stream;
use futures::StreamExt;
use thatdam_claims::Claim;
use thatdam_constants::claims::CLAIM_KEEPALIVE_SECS;
use tracing::debug;
use tracing::info;

use crate::api::FulfillRequest;
use crate::error::ApiError;
use crate::extract::Caller;
use crate::extract::JsonBody;
use crate::state::SupervisorState;

/// `POST /api/claims/new`
pub async fn create(State(state): State<Arc<SupervisorState>>, caller: Caller) -> Result<Json<Claim>, ApiError> {
    caller.require_authenticated()?;
    let claim = state.claims.create()?;
    info!(claim = %claim.id, sub = %caller.principal.sub, "claim created");
    Ok(Json(claim))
}

/// `GET /api/claims/:id/watch`
///
/// Emits `data: fulfilled` once and closes. Keepalive comments go out
/// every 15 seconds while waiting.
pub async fn watch(
    State(state): State<Arc<SupervisorState>>,
    caller: Caller,
    Path(id): Path<String>,
) -> Result<Sse<impl Stream<Item = Result<Event, Infallible>>>, ApiError> {
    caller.require_authenticated()?;
    let handle = state.claims.watch(&id).ok_or_else(|| ApiError::not_found("claim not found"))?;
    debug!(claim = %id, "claim watch opened");

    let events = stream::once(handle.fulfilled()).filter_map(|done| async move {
        done.then(|| Ok(Event::default().data("fulfilled")))
    });
    let keep_alive = KeepAlive::new()
        .interval(Duration::from_secs(CLAIM_KEEPALIVE_SECS))
        .text("heartbeat");
    Ok(Sse::new(events).keep_alive(keep_alive))
}

/// `POST /api/claims/fulfill`
pub async fn fulfill(
    State(state): State<Arc<SupervisorState>>,
    caller: Caller,
    JsonBody(req): JsonBody<FulfillRequest>,
) -> Result<StatusCode, ApiError> {
    caller.require_authenticated()?;
    if !state.claims.fulfill(&req.id, &req.token) {
        return Err(ApiError::not_found("claim not found"));
    }
    info!(
        claim = %req.id,
        node_id = req.node_id.as_deref().unwrap_or(""),
        info = ?req.info,
        "claim fulfilled"
    );
    Ok(StatusCode::NO_CONTENT)
}
