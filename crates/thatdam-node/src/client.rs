//! HTTP client for the supervisor API.

use std::time::Duration;

use reqwest::RequestBuilder;
use serde::de::DeserializeOwned;
use serde::Serialize;
use snafu::ResultExt;
use thatdam_constants::network::HTTP_TIMEOUT_SECS;
use thatdam_supervisor::api::ExchangeRequest;
use thatdam_supervisor::api::FulfillRequest;
use thatdam_supervisor::api::HeartbeatRequest;
use thatdam_supervisor::api::PlanRequest;
use thatdam_supervisor::api::PlanResponse;
use thatdam_supervisor::api::RegisterRequest;
use thatdam_supervisor::api::RegisterResponse;
use thatdam_supervisor::api::TokenResponse;

use crate::error::ClientError;
use crate::error::DecodeSnafu;
use crate::error::TransportSnafu;

/// How a request authenticates.
#[derive(Clone, Default, PartialEq, Eq)]
pub enum Credential {
    #[default]
    Anonymous,
    Bearer(String),
    ApiKey(String),
}

impl Credential {
    fn apply(&self, request: RequestBuilder) -> RequestBuilder {
        match self {
            Credential::Anonymous => request,
            Credential::Bearer(token) => request.bearer_auth(token),
            Credential::ApiKey(key) => request.header("X-API-Key", key),
        }
    }
}

impl std::fmt::Debug for Credential {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Credential::Anonymous => f.write_str("Anonymous"),
            Credential::Bearer(_) => f.write_str("Bearer(..)"),
            Credential::ApiKey(_) => f.write_str("ApiKey(..)"),
        }
    }
}

/// Talks to one supervisor base URL. Every call carries the default
/// outbound timeout.
#[derive(Debug, Clone)]
pub struct SupervisorClient {
    base: String,
    http: reqwest::Client,
}

impl SupervisorClient {
    pub fn new(base: impl Into<String>) -> Self {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(HTTP_TIMEOUT_SECS))
            .build()
            .unwrap_or_default();
        Self::with_http(base, http)
    }

    pub fn with_http(base: impl Into<String>, http: reqwest::Client) -> Self {
        let base = base.into().trim_end_matches('/').to_string();
        Self { base, http }
    }

    pub fn base_url(&self) -> &str {
        &self.base
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base, path)
    }

    /// `GET /health`; any 2xx counts as alive.
    pub async fn health(&self) -> Result<(), ClientError> {
        let url = self.url("/health");
        let response = self.http.get(&url).send().await.context(TransportSnafu { url: url.as_str() })?;
        let status = response.status();
        if !status.is_success() {
            return Err(ClientError::Status {
                url,
                status: status.as_u16(),
            });
        }
        Ok(())
    }

    pub async fn register(&self, body: &RegisterRequest, cred: &Credential) -> Result<RegisterResponse, ClientError> {
        self.post_json("/v1/nodes/register", body, cred).await
    }

    pub async fn plan(&self, body: &PlanRequest, cred: &Credential) -> Result<PlanResponse, ClientError> {
        self.post_json("/v1/nodes/plan", body, cred).await
    }

    pub async fn heartbeat(&self, body: &HeartbeatRequest, cred: &Credential) -> Result<(), ClientError> {
        self.post_empty("/v1/nodes/heartbeat", body, cred).await
    }

    /// Trade a join token for a node access token.
    pub async fn exchange(&self, join_token: &str, node_id: &str) -> Result<TokenResponse, ClientError> {
        let body = ExchangeRequest {
            node_id: node_id.to_string(),
        };
        self.post_json("/v1/tokens/exchange", &body, &Credential::Bearer(join_token.to_string())).await
    }

    pub async fn fulfill_claim(&self, body: &FulfillRequest, cred: &Credential) -> Result<(), ClientError> {
        self.post_empty("/api/claims/fulfill", body, cred).await
    }

    async fn post_json<B, R>(&self, path: &str, body: &B, cred: &Credential) -> Result<R, ClientError>
    where
        B: Serialize + ?Sized,
        R: DeserializeOwned,
    {
        let url = self.url(path);
        let response = self.send(&url, body, cred).await?;
        response.json::<R>().await.context(DecodeSnafu { url })
    }

    async fn post_empty<B: Serialize + ?Sized>(&self, path: &str, body: &B, cred: &Credential) -> Result<(), ClientError> {
        let url = self.url(path);
        self.send(&url, body, cred).await.map(|_| ())
    }

    async fn send<B: Serialize + ?Sized>(
        &self,
        url: &str,
        body: &B,
        cred: &Credential,
    ) -> Result<reqwest::Response, ClientError> {
        let request = cred.apply(self.http.post(url).json(body));
        let response = request.send().await.context(TransportSnafu { url })?;
        let status = response.status();
        if !status.is_success() {
            return Err(ClientError::Status {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }
        Ok(response)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_base_url_trailing_slash_trimmed() {
        let client = SupervisorClient::new("http://sup:8080/");
        assert_eq!(client.url("/v1/nodes/plan"), "http://sup:8080/v1/nodes/plan");
    }

    #[test]
    fn test_credential_debug_hides_secret() {
        let rendered = format!("{:?}", Credential::Bearer("secret".into()));
        assert!(!rendered.contains("secret"));
    }
}
