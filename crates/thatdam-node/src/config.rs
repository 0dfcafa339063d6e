//! Node configuration.
//!
//! Defaults come from [`Default`], overridden by environment variables via
//! [`NodeConfig::apply_env_overrides`]. The root config layer parses the
//! numeric variables so a malformed value fails startup there.

use std::path::PathBuf;

use serde::Deserialize;
use serde::Serialize;
use thatdam_constants::network::NODE_HEALTH_PORT;

pub use thatdam_constants::node::DEFAULT_PLAN_REFRESH_SECS;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NodeConfig {
    /// Directory holding `cluster.json`.
    pub data_dir: PathBuf,
    /// Fixed node id. Generated and persisted when unset.
    pub node_id: Option<String>,
    /// Passed to the supervisor when asking for a plan.
    pub role_hint: String,
    /// Static supervisor endpoint, trusted without a health probe.
    pub supervisor_url: Option<String>,
    pub api_key: Option<String>,
    pub token: Option<String>,
    pub token_file: Option<PathBuf>,
    pub join_token: Option<String>,
    /// Pairing claim fulfilled on first boot.
    pub claim_id: Option<String>,
    pub claim_token: Option<String>,
    /// Force a single discovery backend.
    pub discovery_backend: Option<String>,
    /// Address handed to `serf join` before listing members.
    pub serf_join: Option<String>,
    /// `HOST=`/`PORT=` file naming the supervisor.
    pub leader_file: Option<PathBuf>,
    pub health_listen: String,
    pub plan_refresh_secs: u64,
    /// Run an embedded supervisor after self-election.
    pub host_supervisor: bool,
    /// Advertise over mDNS after self-election.
    pub advertise_mdns: bool,
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("data").join("discovery"),
            node_id: None,
            role_hint: String::new(),
            supervisor_url: None,
            api_key: None,
            token: None,
            token_file: None,
            join_token: None,
            claim_id: None,
            claim_token: None,
            discovery_backend: None,
            serf_join: None,
            leader_file: None,
            health_listen: format!("0.0.0.0:{NODE_HEALTH_PORT}"),
            plan_refresh_secs: DEFAULT_PLAN_REFRESH_SECS,
            host_supervisor: false,
            advertise_mdns: true,
        }
    }
}

impl NodeConfig {
    pub fn from_env() -> Self {
        let mut config = Self::default();
        config.apply_env_overrides();
        config
    }

    pub fn apply_env_overrides(&mut self) {
        if let Some(v) = env_non_empty("DISCOVERY_DATA_DIR") {
            self.data_dir = PathBuf::from(v);
        }
        set_opt(&mut self.node_id, "NODE_ID");
        if let Some(v) = env_non_empty("ROLE_HINT") {
            self.role_hint = v;
        }
        set_opt(&mut self.supervisor_url, "SUPERVISOR_URL");
        set_opt(&mut self.api_key, "SUPERVISOR_API_KEY");
        set_opt(&mut self.token, "SUPERVISOR_TOKEN");
        if let Some(v) = env_non_empty("SUPERVISOR_TOKEN_FILE") {
            self.token_file = Some(PathBuf::from(v));
        }
        set_opt(&mut self.join_token, "SUPERVISOR_JOIN_TOKEN");
        set_opt(&mut self.claim_id, "CLAIM_ID");
        set_opt(&mut self.claim_token, "CLAIM_TOKEN");
        set_opt(&mut self.discovery_backend, "DISCOVERY_BACKEND");
        set_opt(&mut self.serf_join, "SERF_JOIN");
        if let Some(v) = env_non_empty("LEADER_FILE") {
            self.leader_file = Some(PathBuf::from(v));
        }
        if let Some(v) = env_non_empty("NODE_HEALTH_LISTEN") {
            self.health_listen = v;
        }
        if let Some(v) = env_non_empty("HOST_SUPERVISOR").and_then(|v| parse_bool(&v)) {
            self.host_supervisor = v;
        }
        if let Some(v) = env_non_empty("MDNS_ADVERTISE").and_then(|v| parse_bool(&v)) {
            self.advertise_mdns = v;
        }
    }

    /// Pairing claim to fulfil on first boot, when both halves are set.
    pub fn claim(&self) -> Option<(&str, &str)> {
        match (self.claim_id.as_deref(), self.claim_token.as_deref()) {
            (Some(id), Some(token)) => Some((id, token)),
            _ => None,
        }
    }
}

fn set_opt(slot: &mut Option<String>, key: &str) {
    if let Some(v) = env_non_empty(key) {
        *slot = Some(v);
    }
}

fn parse_bool(raw: &str) -> Option<bool> {
    match raw.to_ascii_lowercase().as_str() {
        "1" | "t" | "true" | "yes" | "on" => Some(true),
        "0" | "f" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

fn env_non_empty(key: &str) -> Option<String> {
    std::env::var(key).ok().map(|v| v.trim().to_string()).filter(|v| !v.is_empty())
}
