//! mDNS browse and advertise for `_thatdam-server._tcp.local.`.

use std::collections::HashMap;
use std::net::IpAddr;
use std::net::SocketAddr;
use std::time::Duration;

use async_trait::async_trait;
use mdns_sd::ServiceDaemon;
use mdns_sd::ServiceEvent;
use mdns_sd::ServiceInfo;
use snafu::ResultExt;
use thatdam_constants::network::MDNS_SERVICE_TYPE;
use tokio::time::Instant;
use tracing::debug;
use tracing::info;
use tracing::warn;

use super::Discovery;
use crate::error::DiscoveryError;
use crate::error::MdnsSnafu;

/// How long one browse listens for resolutions.
pub const MDNS_BROWSE_SECS: u64 = 3;

#[derive(Debug, Clone)]
pub struct MdnsDiscovery {
    service_type: String,
    browse: Duration,
}

impl Default for MdnsDiscovery {
    fn default() -> Self {
        Self {
            service_type: MDNS_SERVICE_TYPE.to_string(),
            browse: Duration::from_secs(MDNS_BROWSE_SECS),
        }
    }
}

#[async_trait]
impl Discovery for MdnsDiscovery {
    fn name(&self) -> &'static str {
        "mdns"
    }

    async fn candidates(&self) -> Result<Vec<String>, DiscoveryError> {
        let daemon = ServiceDaemon::new().context(MdnsSnafu)?;
        let events = daemon.browse(&self.service_type).context(MdnsSnafu)?;
        let deadline = Instant::now() + self.browse;

        let mut found = Vec::new();
        while let Ok(Ok(event)) = tokio::time::timeout_at(deadline, events.recv_async()).await {
            if let ServiceEvent::ServiceResolved(info) = event {
                let port = info.get_port();
                for ip in info.get_addresses() {
                    let url = format!("http://{}", SocketAddr::new(IpAddr::from(*ip), port));
                    debug!(%url, instance = info.get_fullname(), "mdns resolved supervisor");
                    if !found.contains(&url) {
                        found.push(url);
                    }
                }
            }
        }

        if let Err(e) = daemon.shutdown() {
            debug!(error = %e, "mdns daemon shutdown failed");
        }
        Ok(found)
    }
}

/// Advertises this node as a supervisor until dropped.
pub struct MdnsAdvertiser {
    daemon: ServiceDaemon,
    fullname: String,
}

impl MdnsAdvertiser {
    pub fn start(node_id: &str, port: u16) -> Result<Self, DiscoveryError> {
        let daemon = ServiceDaemon::new().context(MdnsSnafu)?;
        let instance = sanitize_label(node_id);
        let host_name = format!("{instance}.local.");
        let properties = HashMap::from([("node_id".to_string(), node_id.to_string())]);
        let service = ServiceInfo::new(MDNS_SERVICE_TYPE, &instance, &host_name, "", port, properties)
            .context(MdnsSnafu)?
            .enable_addr_auto();
        let fullname = service.get_fullname().to_string();
        daemon.register(service).context(MdnsSnafu)?;
        info!(%fullname, port, "advertising supervisor over mdns");
        Ok(Self { daemon, fullname })
    }

    pub fn fullname(&self) -> &str {
        &self.fullname
    }
}

impl Drop for MdnsAdvertiser {
    fn drop(&mut self) {
        if let Err(e) = self.daemon.unregister(&self.fullname) {
            warn!(fullname = %self.fullname, error = %e, "mdns unregister failed");
        }
        if let Err(e) = self.daemon.shutdown() {
            debug!(error = %e, "mdns daemon shutdown failed");
        }
    }
}

impl std::fmt::Debug for MdnsAdvertiser {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MdnsAdvertiser").field("fullname", &self.fullname).finish()
    }
}

/// DNS label: ASCII alphanumerics and `-`, at most 63 bytes.
fn sanitize_label(raw: &str) -> String {
    let label: String = raw
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '-' { c } else { '-' })
        .take(63)
        .collect();
    let label = label.trim_matches('-');
    if label.is_empty() {
        "thatdam".to_string()
    } else {
        label.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sanitize_label() {
        assert_eq!(sanitize_label("edge_01.lab"), "edge-01-lab");
        assert_eq!(sanitize_label("__"), "thatdam");
        assert_eq!(sanitize_label(&"a".repeat(80)).len(), 63);
    }
}
