//! Supervisor discovery.
//!
//! Each [`Discovery`] backend yields candidate base URLs. Trusted backends
//! (a configured URL) win outright; every other candidate must answer
//! `GET <url>/health` with a 2xx inside the discovery window. Backends are
//! tried in order and the first passing candidate wins.

pub mod gossip;
pub mod leader_file;
pub mod mdns;
pub mod overlay;
pub mod static_url;

use std::time::Duration;

use async_trait::async_trait;
use snafu::ResultExt;
use thatdam_constants::network::DISCOVERY_WINDOW_SECS;
use thatdam_constants::network::HTTP_TIMEOUT_SECS;
use thatdam_constants::network::MAX_DISCOVERY_CANDIDATES;
use tokio::time::Instant;
use tracing::debug;
use tracing::info;
use tracing::warn;

pub use self::gossip::SerfDiscovery;
pub use self::leader_file::LeaderFileDiscovery;
pub use self::mdns::MdnsAdvertiser;
pub use self::mdns::MdnsDiscovery;
pub use self::overlay::TailscaleDiscovery;
pub use self::static_url::StaticDiscovery;
use crate::config::NodeConfig;
use crate::error::CommandFailedSnafu;
use crate::error::CommandSnafu;
use crate::error::DiscoveryError;
use crate::error::ParseOutputSnafu;

/// One way of finding supervisor candidates.
#[async_trait]
pub trait Discovery: Send + Sync {
    fn name(&self) -> &'static str;

    /// Candidate base URLs, best first.
    async fn candidates(&self) -> Result<Vec<String>, DiscoveryError>;

    /// Trusted candidates skip the health probe.
    fn trusted(&self) -> bool {
        false
    }
}

/// Anything that can produce a supervisor URL. The handshake depends on
/// this rather than on [`Discoverer`] so tests can pin the answer.
#[async_trait]
pub trait Locate: Send + Sync {
    async fn locate(&self) -> Option<String>;
}

/// Ordered set of backends sharing one discovery window.
pub struct Discoverer {
    backends: Vec<Box<dyn Discovery>>,
    http: reqwest::Client,
    window: Duration,
}

impl Discoverer {
    pub fn new(backends: Vec<Box<dyn Discovery>>) -> Self {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(HTTP_TIMEOUT_SECS))
            .build()
            .unwrap_or_default();
        Self {
            backends,
            http,
            window: Duration::from_secs(DISCOVERY_WINDOW_SECS),
        }
    }

    pub fn with_window(mut self, window: Duration) -> Self {
        self.window = window;
        self
    }

    pub fn backend_names(&self) -> Vec<&'static str> {
        self.backends.iter().map(|b| b.name()).collect()
    }

    /// Backends for a node configuration.
    ///
    /// `DISCOVERY_BACKEND` forces a single backend. Otherwise the order is
    /// static URL, leader file, mDNS, gossip, overlay; command-line based
    /// backends are only added when their tool is installed.
    pub fn from_config(config: &NodeConfig) -> Result<Self, DiscoveryError> {
        if let Some(name) = config.discovery_backend.as_deref() {
            let backend = backend_by_name(name, config)?;
            return Ok(Self::new(vec![backend]));
        }

        let mut backends: Vec<Box<dyn Discovery>> = Vec::new();
        if let Some(url) = &config.supervisor_url {
            backends.push(Box::new(StaticDiscovery::new(url.clone())));
        }
        let leader_file = leader_file_path(config);
        if leader_file.exists() {
            backends.push(Box::new(LeaderFileDiscovery::new(leader_file)));
        }
        backends.push(Box::new(MdnsDiscovery::default()));
        if config.serf_join.is_some() || on_path(gossip::SERF_BIN) {
            backends.push(Box::new(SerfDiscovery::new(config.serf_join.clone())));
        }
        if on_path(overlay::TAILSCALE_BIN) {
            backends.push(Box::new(TailscaleDiscovery::default()));
        }
        Ok(Self::new(backends))
    }

    async fn probe(&self, url: &str) -> bool {
        let health = format!("{}/health", url.trim_end_matches('/'));
        match self.http.get(&health).send().await {
            Ok(response) => response.status().is_success(),
            Err(e) => {
                debug!(url = %health, error = %e, "health probe failed");
                false
            }
        }
    }

    async fn locate_inner(&self) -> Option<String> {
        for backend in &self.backends {
            let candidates = match backend.candidates().await {
                Ok(candidates) => candidates,
                Err(e) => {
                    debug!(backend = backend.name(), error = %e, "discovery backend failed");
                    continue;
                }
            };
            for url in candidates.into_iter().take(MAX_DISCOVERY_CANDIDATES) {
                if backend.trusted() || self.probe(&url).await {
                    info!(backend = backend.name(), %url, "located supervisor");
                    return Some(url);
                }
            }
        }
        None
    }
}

#[async_trait]
impl Locate for Discoverer {
    async fn locate(&self) -> Option<String> {
        let started = Instant::now();
        match tokio::time::timeout(self.window, self.locate_inner()).await {
            Ok(found) => found,
            Err(_) => {
                warn!(elapsed_ms = started.elapsed().as_millis() as u64, "discovery window elapsed");
                None
            }
        }
    }
}

impl std::fmt::Debug for Discoverer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Discoverer")
            .field("backends", &self.backend_names())
            .field("window", &self.window)
            .finish()
    }
}

fn backend_by_name(name: &str, config: &NodeConfig) -> Result<Box<dyn Discovery>, DiscoveryError> {
    match name.trim().to_ascii_lowercase().as_str() {
        "static" => Ok(Box::new(StaticDiscovery::new(config.supervisor_url.clone().unwrap_or_default()))),
        "leader-file" | "file" => Ok(Box::new(LeaderFileDiscovery::new(leader_file_path(config)))),
        "mdns" => Ok(Box::new(MdnsDiscovery::default())),
        "gossip" | "serf" => Ok(Box::new(SerfDiscovery::new(config.serf_join.clone()))),
        "overlay" | "tailscale" => Ok(Box::new(TailscaleDiscovery::default())),
        other => Err(DiscoveryError::UnknownBackend { name: other.to_string() }),
    }
}

fn leader_file_path(config: &NodeConfig) -> std::path::PathBuf {
    config
        .leader_file
        .clone()
        .unwrap_or_else(|| config.data_dir.join(leader_file::DEFAULT_LEADER_FILE))
}

/// Whether `bin` resolves on `PATH`.
pub(crate) fn on_path(bin: &str) -> bool {
    thatdam_plan::build::find_on_path(bin).is_some()
}

/// Run a tool and parse its stdout as JSON.
pub(crate) async fn run_json(program: &str, args: &[&str]) -> Result<serde_json::Value, DiscoveryError> {
    let output = tokio::process::Command::new(program)
        .args(args)
        .kill_on_drop(true)
        .output()
        .await
        .context(CommandSnafu { program })?;
    if !output.status.success() {
        return CommandFailedSnafu {
            program,
            code: output.status.code(),
        }
        .fail();
    }
    serde_json::from_slice(&output.stdout).context(ParseOutputSnafu { program })
}

/// `http://host:port`, bracketing IPv6 literals.
pub(crate) fn http_url(host: &str, port: u16) -> String {
    if host.contains(':') && !host.starts_with('[') {
        format!("http://[{host}]:{port}")
    } else {
        format!("http://{host}:{port}")
    }
}
