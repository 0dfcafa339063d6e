//! Supervisor settings.

use std::path::PathBuf;
use std::time::Duration;

use serde::Deserialize;
use serde::Serialize;
use thatdam_constants::network::SUPERVISOR_PORT;
use thatdam_constants::supervisor::DEFAULT_AGENT_TTL_SECS;
use thatdam_constants::supervisor::DEFAULT_EVENT_PREFIX;
use thatdam_constants::supervisor::DEFAULT_LEADER_URL;

/// Listener, registry and plan settings for the control plane.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SupervisorConfig {
    /// Socket address to bind, `host:port`.
    pub listen: String,
    /// URL handed out as `leader_url`.
    pub public_url: Option<String>,
    /// Extra template directory searched before `./plans`.
    pub plan_dir: Option<PathBuf>,
    /// Heartbeat TTL; also the stale sweep period.
    pub agent_ttl_secs: u64,
    /// Topic prefix for lifecycle events.
    pub event_prefix: String,
    /// Shared key accepted in `X-API-Key`.
    pub api_key: Option<String>,
}

impl Default for SupervisorConfig {
    fn default() -> Self {
        Self {
            listen: format!("0.0.0.0:{SUPERVISOR_PORT}"),
            public_url: None,
            plan_dir: None,
            agent_ttl_secs: DEFAULT_AGENT_TTL_SECS,
            event_prefix: DEFAULT_EVENT_PREFIX.to_string(),
            api_key: None,
        }
    }
}

impl SupervisorConfig {
    pub fn from_env() -> Self {
        let mut config = Self::default();
        config.apply_env_overrides();
        config
    }

    /// Apply `SUPERVISOR_LISTEN`, `SUPERVISOR_PUBLIC_URL`, `PLAN_DIR`,
    /// `EVENT_PREFIX` and `SUPERVISOR_API_KEY`.
    ///
    /// Numeric settings (`AGENT_TTL_SECS`) are validated by the binary's
    /// config layer.
    pub fn apply_env_overrides(&mut self) {
        if let Some(v) = env_nonempty("SUPERVISOR_LISTEN") {
            self.listen = v;
        }
        if let Some(v) = env_nonempty("SUPERVISOR_PUBLIC_URL") {
            self.public_url = Some(v);
        }
        if let Some(v) = env_nonempty("PLAN_DIR") {
            self.plan_dir = Some(PathBuf::from(v));
        }
        if let Some(v) = env_nonempty("EVENT_PREFIX") {
            self.event_prefix = v;
        }
        if let Some(v) = env_nonempty("SUPERVISOR_API_KEY") {
            self.api_key = Some(v);
        }
    }

    pub fn agent_ttl(&self) -> Duration {
        Duration::from_secs(self.agent_ttl_secs.max(1))
    }

    pub fn leader_url(&self) -> &str {
        self.public_url.as_deref().unwrap_or(DEFAULT_LEADER_URL)
    }
}

fn env_nonempty(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.trim().is_empty())
}
