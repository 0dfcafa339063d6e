//! Request extractors: the calling principal and JSON bodies.

use std::sync::Arc;

use axum::async_trait;
use axum::extract::FromRequest;
use axum::extract::FromRequestParts;
use axum::extract::Request;
use axum::http::header::AUTHORIZATION;
use axum::http::request::Parts;
use axum::Json;
use serde::de::DeserializeOwned;
use thatdam_auth::bearer_token;
use thatdam_auth::TokenType;
use thatdam_policy::scopes;
use thatdam_policy::Action;
use thatdam_policy::Principal;
use tracing::debug;

use crate::error::ApiError;
use crate::state::SupervisorState;

pub const API_KEY_HEADER: &str = "x-api-key";

/// Who is calling, and whether they presented any credentials.
#[derive(Debug, Clone)]
pub struct Caller {
    pub principal: Principal,
    /// A bearer token or API key was supplied (and accepted).
    pub credentials: bool,
    /// Type of the bearer token, if one was used.
    pub token_type: Option<TokenType>,
}

impl Caller {
    pub fn anonymous() -> Self {
        Self {
            principal: Principal::anonymous(),
            credentials: false,
            token_type: None,
        }
    }

    /// Consult the policy; 401 without credentials, 403 with.
    pub fn authorize(&self, state: &SupervisorState, action: Action) -> Result<(), ApiError> {
        if state.policy.allow(&self.principal, action) {
            return Ok(());
        }
        debug!(action = %action, sub = %self.principal.sub, "policy denied");
        Err(self.denied())
    }

    /// Any authenticated principal.
    pub fn require_authenticated(&self) -> Result<(), ApiError> {
        if self.principal.is_anonymous() {
            return Err(ApiError::unauthorized());
        }
        Ok(())
    }

    pub fn require_scope(&self, scope: &str) -> Result<(), ApiError> {
        if self.principal.has_scope(scope) {
            return Ok(());
        }
        debug!(scope, sub = %self.principal.sub, "missing scope");
        Err(self.denied())
    }

    fn denied(&self) -> ApiError {
        if self.credentials {
            ApiError::forbidden()
        } else {
            ApiError::unauthorized()
        }
    }
}

#[async_trait]
impl FromRequestParts<Arc<SupervisorState>> for Caller {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &Arc<SupervisorState>) -> Result<Self, Self::Rejection> {
        if let Some(key) = parts.headers.get(API_KEY_HEADER) {
            let expected = state.config.api_key.as_deref().filter(|k| !k.is_empty());
            return match (key.to_str().ok(), expected) {
                (Some(given), Some(expected)) if given == expected => Ok(Self {
                    principal: Principal::new("apikey", scopes::ALL_THATDAM),
                    credentials: true,
                    token_type: None,
                }),
                _ => {
                    debug!("rejected api key");
                    Err(ApiError::invalid_token())
                }
            };
        }

        let Some(header) = parts.headers.get(AUTHORIZATION) else {
            return Ok(Self::anonymous());
        };
        let token = header.to_str().ok().and_then(bearer_token).ok_or_else(ApiError::invalid_token)?;
        match state.validator.validate_claims(token).await {
            Ok(claims) => {
                let token_type = Some(claims.typ);
                Ok(Self {
                    principal: claims.into_principal(),
                    credentials: true,
                    token_type,
                })
            }
            Err(e) => {
                debug!(error = %e, "bearer token rejected");
                Err(e.into())
            }
        }
    }
}

/// `Json<T>` whose rejections are `400 bad_request`.
#[derive(Debug, Clone)]
pub struct JsonBody<T>(pub T);

#[async_trait]
impl<S, T> FromRequest<S> for JsonBody<T>
where
    T: DeserializeOwned,
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        match Json::<T>::from_request(req, state).await {
            Ok(Json(value)) => Ok(JsonBody(value)),
            Err(rejection) => Err(ApiError::bad_request(rejection.body_text())),
        }
    }
}
