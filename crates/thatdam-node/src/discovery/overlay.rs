//! Tailscale peers: `tailscale status --json`.

use async_trait::async_trait;
use thatdam_constants::network::SUPERVISOR_PORT;

use super::http_url;
use super::run_json;
use super::Discovery;
use crate::error::DiscoveryError;

pub const TAILSCALE_BIN: &str = "tailscale";

#[derive(Debug, Clone)]
pub struct TailscaleDiscovery {
    port: u16,
}

impl Default for TailscaleDiscovery {
    fn default() -> Self {
        Self { port: SUPERVISOR_PORT }
    }
}

/// Peer DNS names with the trailing dot removed, sorted for a stable
/// probe order.
fn peer_names(doc: &serde_json::Value) -> Vec<String> {
    let mut names: Vec<String> = doc
        .get("Peer")
        .and_then(|p| p.as_object())
        .map(|peers| {
            peers
                .values()
                .filter_map(|peer| peer.get("DNSName").and_then(|d| d.as_str()))
                .map(|d| d.trim_end_matches('.').to_string())
                .filter(|d| !d.is_empty())
                .collect()
        })
        .unwrap_or_default();
    names.sort();
    names
}

#[async_trait]
impl Discovery for TailscaleDiscovery {
    fn name(&self) -> &'static str {
        "overlay"
    }

    async fn candidates(&self) -> Result<Vec<String>, DiscoveryError> {
        let doc = run_json(TAILSCALE_BIN, &["status", "--json"]).await?;
        Ok(peer_names(&doc).iter().map(|h| http_url(h, self.port)).collect())
    }
}
