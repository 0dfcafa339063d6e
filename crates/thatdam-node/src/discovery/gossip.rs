//! Serf membership: `serf members -format=json`.

use async_trait::async_trait;
use serde::Deserialize;
use snafu::ResultExt;
use thatdam_constants::network::SUPERVISOR_PORT;
use tracing::warn;

use super::http_url;
use super::run_json;
use super::Discovery;
use crate::error::DiscoveryError;
use crate::error::ParseOutputSnafu;

pub const SERF_BIN: &str = "serf";

#[derive(Debug, Clone)]
pub struct SerfDiscovery {
    join: Option<String>,
    port: u16,
}

impl SerfDiscovery {
    pub fn new(join: Option<String>) -> Self {
        Self {
            join,
            port: SUPERVISOR_PORT,
        }
    }
}

#[derive(Debug, Deserialize)]
struct Members {
    #[serde(default)]
    members: Vec<Member>,
}

#[derive(Debug, Deserialize)]
struct Member {
    #[serde(default)]
    addr: String,
    #[serde(default)]
    status: String,
}

/// Alive members' hosts, with the gossip port stripped.
fn alive_hosts(doc: serde_json::Value) -> Result<Vec<String>, serde_json::Error> {
    let members: Members = serde_json::from_value(doc)?;
    Ok(members
        .members
        .into_iter()
        .filter(|m| m.status.eq_ignore_ascii_case("alive"))
        .filter_map(|m| host_of(&m.addr))
        .collect())
}

fn host_of(addr: &str) -> Option<String> {
    if let Ok(sock) = addr.parse::<std::net::SocketAddr>() {
        return Some(sock.ip().to_string());
    }
    let host = addr.rsplit_once(':').map_or(addr, |(h, _)| h);
    if host.is_empty() {
        None
    } else {
        Some(host.to_string())
    }
}

#[async_trait]
impl Discovery for SerfDiscovery {
    fn name(&self) -> &'static str {
        "gossip"
    }

    async fn candidates(&self) -> Result<Vec<String>, DiscoveryError> {
        if let Some(join) = &self.join {
            let status = tokio::process::Command::new(SERF_BIN)
                .args(["join", join])
                .kill_on_drop(true)
                .status()
                .await;
            match status {
                Ok(s) if s.success() => {}
                Ok(s) => warn!(join, code = ?s.code(), "serf join failed"),
                Err(e) => warn!(join, error = %e, "serf join failed"),
            }
        }
        let doc = run_json(SERF_BIN, &["members", "-format=json"]).await?;
        let hosts = alive_hosts(doc).context(ParseOutputSnafu { program: SERF_BIN })?;
        Ok(hosts.iter().map(|h| http_url(h, self.port)).collect())
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn test_alive_members_only() {
        let doc = json!({
            "members": [
                {"name": "a", "addr": "10.0.0.1:7946", "status": "alive"},
                {"name": "b", "addr": "10.0.0.2:7946", "status": "failed"},
                {"name": "c", "addr": "[fe80::1]:7946", "status": "alive"}
            ]
        });
        assert_eq!(alive_hosts(doc).unwrap(), vec!["10.0.0.1".to_string(), "fe80::1".to_string()]);
    }

    #[test]
    fn test_empty_document() {
        assert!(alive_hosts(json!({})).unwrap().is_empty());
    }
}
