//! Request and response payloads of the control-plane HTTP surface.
//!
//! Shared with the node-side client so both ends agree on field names.
//! Unknown fields are ignored; missing required fields are `bad_request`.

use std::collections::BTreeMap;

use serde::Deserialize;
use serde::Serialize;
use thatdam_plan::DesiredPlan;

pub use crate::plan::Capabilities;

/// Body of `POST /v1/nodes/register`. Either `id` or `node_id` names the node.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RegisterRequest {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub node_id: Option<String>,
    #[serde(default)]
    pub class: String,
    #[serde(default)]
    pub version: String,
    #[serde(default)]
    pub features: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub address: Option<String>,
    #[serde(default)]
    pub meta: BTreeMap<String, serde_json::Value>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegisterResponse {
    pub registered: bool,
    #[serde(default)]
    pub node_id: String,
    /// Heartbeat TTL in seconds.
    #[serde(default)]
    pub ttl: u64,
}

/// Body of `POST /v1/nodes/heartbeat`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct HeartbeatRequest {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub node_id: Option<String>,
    #[serde(default)]
    pub meta: BTreeMap<String, serde_json::Value>,
}

/// Body of `POST /v1/nodes/plan`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlanRequest {
    pub node_id: String,
    #[serde(default)]
    pub role_hint: String,
    #[serde(default)]
    pub capabilities: Capabilities,
}

/// A plan plus the role the supervisor sees the node in.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlanResponse {
    #[serde(flatten)]
    pub plan: DesiredPlan,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub epoch: Option<u64>,
}

/// Body of `POST /v1/leader/claim`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LeaderClaimRequest {
    pub node_id: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LeaderClaimResponse {
    pub granted: bool,
    pub leader_url: String,
    pub epoch: u64,
    #[serde(default)]
    pub holder: Option<String>,
}

/// Body of `POST /api/claims/fulfill`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FulfillRequest {
    pub id: String,
    pub token: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub node_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub info: Option<serde_json::Value>,
}

/// Body of `POST /v1/tenancy/plan`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TenancyRequest {
    pub profile: String,
    #[serde(default)]
    pub cluster: thatdam_reconcile::ClusterState,
}

/// Body of `POST /v1/tokens/join`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JoinTokenRequest {
    pub device_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tenant: Option<String>,
}

/// Body of `POST /v1/tokens/exchange`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExchangeRequest {
    pub node_id: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenResponse {
    pub token: String,
    /// Lifetime in seconds.
    pub expires_in: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub agents: usize,
}

/// First non-empty of `id` and `node_id`.
pub fn pick_id(id: Option<&str>, node_id: Option<&str>) -> Option<String> {
    id.into_iter()
        .chain(node_id)
        .map(str::trim)
        .find(|s| !s.is_empty())
        .map(str::to_string)
}
