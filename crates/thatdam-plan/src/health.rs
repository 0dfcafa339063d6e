//! HTTP health gate applied after a unit is started.

use std::time::Duration;

use async_trait::async_trait;
use thatdam_constants::network::HEALTH_PROBE_TIMEOUT_SECS;
use thatdam_constants::plan::DEFAULT_HEALTH_INTERVAL_SECS;
use thatdam_constants::plan::DEFAULT_HEALTH_TIMEOUT_SECS;
use tokio::time::Instant;
use tracing::debug;

use crate::model::HealthCheck;

/// One health probe attempt.
#[async_trait]
pub trait HealthProbe: Send + Sync {
    /// True when `url` currently reports healthy.
    async fn check(&self, url: &str) -> bool;
}

/// `GET` probe; any 2xx is healthy.
#[derive(Debug, Clone)]
pub struct HttpHealthProbe {
    client: reqwest::Client,
}

impl HttpHealthProbe {
    pub fn new() -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(HEALTH_PROBE_TIMEOUT_SECS))
            .build()
            .unwrap_or_default();
        Self { client }
    }
}

impl Default for HttpHealthProbe {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl HealthProbe for HttpHealthProbe {
    async fn check(&self, url: &str) -> bool {
        match self.client.get(url).send().await {
            Ok(resp) => resp.status().is_success(),
            Err(e) => {
                debug!(url, error = %e, "health probe failed");
                false
            }
        }
    }
}

/// Poll interval and overall deadline for `check`; zero means default.
pub fn poll_window(check: &HealthCheck) -> (Duration, Duration) {
    let interval = if check.interval_sec == 0 { DEFAULT_HEALTH_INTERVAL_SECS } else { check.interval_sec };
    let timeout = if check.timeout_sec == 0 { DEFAULT_HEALTH_TIMEOUT_SECS } else { check.timeout_sec };
    (Duration::from_secs(interval), Duration::from_secs(timeout))
}

/// Probe `url` every `interval` until healthy or `timeout` elapses.
///
/// Probes immediately, so a unit that is already up passes without waiting.
pub async fn wait_healthy(probe: &dyn HealthProbe, url: &str, interval: Duration, timeout: Duration) -> bool {
    let deadline = Instant::now() + timeout;
    loop {
        if probe.check(url).await {
            return true;
        }
        let now = Instant::now();
        if now >= deadline {
            return false;
        }
        tokio::time::sleep(interval.min(deadline - now)).await;
    }
}
