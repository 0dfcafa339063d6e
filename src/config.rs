//! Layered application configuration.
//!
//! Sources, lowest precedence first:
//!
//! 1. Built-in defaults of each section
//! 2. A TOML file: `--config`, else `CONFIG_FILE`, else `./config.toml` when present
//! 3. Environment variables
//! 4. Command-line flags, applied by the binaries
//!
//! Numeric environment variables are parsed here so a malformed value
//! fails startup instead of being silently ignored.

use std::path::Path;
use std::path::PathBuf;

use serde::Deserialize;
use serde::Serialize;
use snafu::Snafu;
use thatdam_auth::AuthConfig;
use thatdam_bus::BusConfig;
use thatdam_node::NodeConfig;
use thatdam_policy::PolicyConfig;
use thatdam_supervisor::SupervisorConfig;

/// Environment variable naming the config file.
pub const CONFIG_FILE_ENV: &str = "CONFIG_FILE";

/// File picked up from the working directory when nothing else is named.
pub const DEFAULT_CONFIG_FILE: &str = "config.toml";

/// Configuration error types.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum ConfigError {
    /// A configuration value is invalid.
    #[snafu(display("invalid configuration for {key}: '{value}' ({reason})"))]
    InvalidValue { key: String, value: String, reason: String },

    /// A required configuration value is missing.
    #[snafu(display("missing required configuration: {key} ({hint})"))]
    MissingRequired { key: String, hint: String },
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub supervisor: SupervisorConfig,
    pub node: NodeConfig,
    pub auth: AuthConfig,
    pub bus: BusConfig,
    pub policy: PolicyConfig,
}

impl AppConfig {
    /// Defaults, then the config file, then the environment; validated.
    pub fn load(explicit: Option<&Path>) -> Result<Self, ConfigError> {
        let mut config = match config_path(explicit) {
            Some(path) => {
                tracing::info!(path = %path.display(), "loading configuration file");
                Self::from_toml_file(&path)?
            }
            None => Self::default(),
        };
        config.apply_env_overrides()?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_toml_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path).map_err(|e| ConfigError::InvalidValue {
            key: "config_file".to_string(),
            value: path.display().to_string(),
            reason: format!("failed to read file: {e}"),
        })?;
        Self::from_toml_str(&contents, &path.display().to_string())
    }

    pub fn from_toml_str(contents: &str, source: &str) -> Result<Self, ConfigError> {
        toml::from_str(contents).map_err(|e| ConfigError::InvalidValue {
            key: "config_file".to_string(),
            value: source.to_string(),
            reason: format!("failed to parse TOML: {e}"),
        })
    }

    /// Overlay every section's environment variables.
    pub fn apply_env_overrides(&mut self) -> Result<(), ConfigError> {
        self.supervisor.apply_env_overrides();
        self.node.apply_env_overrides();
        self.auth.apply_env_overrides();
        self.bus.apply_env_overrides();
        self.policy.apply_env_overrides();

        if let Some(ttl) = env_u64("AGENT_TTL_SECS")? {
            self.supervisor.agent_ttl_secs = ttl;
        }
        if let Some(secs) = env_u64("PLAN_REFRESH_SECS")? {
            self.node.plan_refresh_secs = secs;
        }
        Ok(())
    }

    /// Check values the libraries assume are sane.
    pub fn validate(&self) -> Result<(), ConfigError> {
        check_listen("supervisor.listen", &self.supervisor.listen)?;
        check_listen("node.health_listen", &self.node.health_listen)?;
        if self.supervisor.agent_ttl_secs == 0 {
            return Err(invalid("AGENT_TTL_SECS", "0", "must be at least 1"));
        }
        if self.node.plan_refresh_secs == 0 {
            return Err(invalid("PLAN_REFRESH_SECS", "0", "must be at least 1"));
        }
        if let Some(url) = &self.node.supervisor_url {
            check_http_url("SUPERVISOR_URL", url)?;
        }
        if let Some(url) = &self.auth.jwks_url {
            check_http_url("JWKS_URL", url)?;
        }
        if let Some(path) = &self.auth.signing_key_file {
            if !path.exists() {
                return Err(ConfigError::MissingRequired {
                    key: "JWT_SIGNING_KEY_FILE".to_string(),
                    hint: format!("{} does not exist", path.display()),
                });
            }
        }
        Ok(())
    }
}

fn config_path(explicit: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = explicit {
        return Some(path.to_path_buf());
    }
    if let Some(path) = std::env::var_os(CONFIG_FILE_ENV).filter(|v| !v.is_empty()) {
        return Some(PathBuf::from(path));
    }
    let local = PathBuf::from(DEFAULT_CONFIG_FILE);
    local.exists().then_some(local)
}

fn invalid(key: &str, value: &str, reason: &str) -> ConfigError {
    ConfigError::InvalidValue {
        key: key.to_string(),
        value: value.to_string(),
        reason: reason.to_string(),
    }
}

/// Parse a non-negative integer setting.
pub fn parse_u64(key: &str, raw: &str) -> Result<u64, ConfigError> {
    raw.trim()
        .parse::<u64>()
        .map_err(|e| invalid(key, raw, &format!("must be a non-negative integer: {e}")))
}

fn env_u64(key: &str) -> Result<Option<u64>, ConfigError> {
    match std::env::var(key) {
        Ok(raw) if !raw.trim().is_empty() => parse_u64(key, &raw).map(Some),
        _ => Ok(None),
    }
}

fn check_listen(key: &str, addr: &str) -> Result<(), ConfigError> {
    let port = addr.rsplit_once(':').map(|(_, port)| port);
    match port.map(str::parse::<u16>) {
        Some(Ok(_)) => Ok(()),
        _ => Err(invalid(key, addr, "must be host:port")),
    }
}

fn check_http_url(key: &str, raw: &str) -> Result<(), ConfigError> {
    let parsed = url::Url::parse(raw).map_err(|e| invalid(key, raw, &e.to_string()))?;
    match parsed.scheme() {
        "http" | "https" => Ok(()),
        other => Err(invalid(key, raw, &format!("unsupported scheme {other}"))),
    }
}
