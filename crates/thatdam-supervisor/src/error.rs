//! HTTP error responses.
//!
//! Every failure leaves the service as a small JSON object
//! `{"error": "<kind>", "detail": "<text>"}` with a status matching the kind.

use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::response::Response;
use axum::Json;
use serde::Serialize;
use snafu::Snafu;
use thatdam_auth::AuthError;
use thatdam_claims::ClaimError;
use thatdam_plan::TemplateError;

/// Errors raised by the agent registry.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum RegistryError {
    #[snafu(display("agent registry full: {count} agents, maximum is {max}"))]
    RegistryFull { count: usize, max: usize },

    #[snafu(display("unknown agent {id}"))]
    UnknownAgent { id: String },

    #[snafu(display("agent {id} sent {count} meta entries, maximum is {max}"))]
    TooMuchMeta { id: String, count: usize, max: usize },
}

/// Error returned by every handler.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApiError {
    pub status: StatusCode,
    pub kind: &'static str,
    pub detail: Option<String>,
}

#[derive(Serialize)]
struct ErrorBody<'a> {
    error: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    detail: Option<&'a str>,
}

impl ApiError {
    pub fn new(status: StatusCode, kind: &'static str, detail: Option<String>) -> Self {
        Self { status, kind, detail }
    }

    pub fn bad_request(detail: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, "bad_request", Some(detail.into()))
    }

    pub fn unauthorized() -> Self {
        Self::new(StatusCode::UNAUTHORIZED, "unauthorized", None)
    }

    pub fn invalid_token() -> Self {
        Self::new(StatusCode::UNAUTHORIZED, "invalid_token", None)
    }

    pub fn forbidden() -> Self {
        Self::new(StatusCode::FORBIDDEN, "forbidden", None)
    }

    pub fn not_found(detail: impl Into<String>) -> Self {
        Self::new(StatusCode::NOT_FOUND, "not_found", Some(detail.into()))
    }

    pub fn conflict(detail: impl Into<String>) -> Self {
        Self::new(StatusCode::CONFLICT, "conflict", Some(detail.into()))
    }

    pub fn internal(detail: impl Into<String>) -> Self {
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, "internal", Some(detail.into()))
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = ErrorBody {
            error: self.kind,
            detail: self.detail.as_deref(),
        };
        (self.status, Json(body)).into_response()
    }
}

impl From<RegistryError> for ApiError {
    fn from(err: RegistryError) -> Self {
        match err {
            RegistryError::UnknownAgent { .. } => ApiError::not_found(err.to_string()),
            RegistryError::RegistryFull { .. } => ApiError::conflict(err.to_string()),
            RegistryError::TooMuchMeta { .. } => ApiError::bad_request(err.to_string()),
        }
    }
}

impl From<ClaimError> for ApiError {
    fn from(err: ClaimError) -> Self {
        ApiError::conflict(err.to_string())
    }
}

impl From<TemplateError> for ApiError {
    fn from(err: TemplateError) -> Self {
        ApiError::internal(err.to_string())
    }
}

impl From<AuthError> for ApiError {
    fn from(err: AuthError) -> Self {
        if err.is_rejection() {
            ApiError::invalid_token()
        } else {
            ApiError::internal(err.to_string())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_registry_errors_map_to_status() {
        let unknown: ApiError = RegistryError::UnknownAgent { id: "n1".into() }.into();
        assert_eq!(unknown.status, StatusCode::NOT_FOUND);
        assert_eq!(unknown.detail.as_deref(), Some("unknown agent n1"));

        let full: ApiError = RegistryError::RegistryFull { count: 2, max: 2 }.into();
        assert_eq!(full.status, StatusCode::CONFLICT);
    }

    #[test]
    fn test_template_errors_are_internal() {
        let err: ApiError = TemplateError::UnknownTemplate { name: "x".into() }.into();
        assert_eq!(err.status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(err.kind, "internal");
    }
}
