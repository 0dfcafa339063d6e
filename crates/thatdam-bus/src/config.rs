//! Bus configuration.

use std::path::PathBuf;

use serde::Deserialize;
use serde::Serialize;
use thatdam_constants::bus::DEFAULT_EXCHANGE;

/// Transport selection and audit location.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BusConfig {
    /// AMQP URL. `None` selects the in-process transport.
    pub url: Option<String>,

    /// Topic exchange used on the broker.
    pub exchange: String,

    /// JSON-lines file receiving `tenant.*` events.
    pub audit_log: PathBuf,
}

impl Default for BusConfig {
    fn default() -> Self {
        Self {
            url: None,
            exchange: DEFAULT_EXCHANGE.to_string(),
            audit_log: PathBuf::from("data").join("audit.log"),
        }
    }
}

impl BusConfig {
    pub fn from_env() -> Self {
        let mut config = Self::default();
        config.apply_env_overrides();
        config
    }

    /// `BROKER_URL` (or `EVENT_BROKER_URL`), `BROKER_EXCHANGE` (or
    /// `AMQP_EXCHANGE`), `AUDIT_LOG`.
    pub fn apply_env_overrides(&mut self) {
        if let Some(url) = env_non_empty("BROKER_URL").or_else(|| env_non_empty("EVENT_BROKER_URL")) {
            self.url = Some(url);
        }
        if let Some(exchange) = env_non_empty("BROKER_EXCHANGE").or_else(|| env_non_empty("AMQP_EXCHANGE")) {
            self.exchange = exchange;
        }
        if let Some(path) = env_non_empty("AUDIT_LOG") {
            self.audit_log = PathBuf::from(path);
        }
    }

    pub fn in_process() -> Self {
        Self::default()
    }
}

fn env_non_empty(key: &str) -> Option<String> {
    std::env::var(key).ok().map(|v| v.trim().to_string()).filter(|v| !v.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_select_in_process() {
        let config = BusConfig::default();
        assert!(config.url.is_none());
        assert_eq!(config.exchange, "thatdam");
        assert_eq!(config.audit_log, PathBuf::from("data/audit.log"));
    }

    #[test]
    fn test_partial_section_keeps_defaults() {
        let config: BusConfig = serde_json::from_str(r#"{"url":"amqp://localhost","exchange":"events"}"#).unwrap();
        assert_eq!(config.url.as_deref(), Some("amqp://localhost"));
        assert_eq!(config.exchange, "events");
        assert_eq!(config.audit_log, PathBuf::from("data/audit.log"));
    }
}
