//! `HOST=` / `PORT=` file written by whoever hosts the supervisor.

use std::path::PathBuf;

use async_trait::async_trait;
use snafu::ResultExt;
use thatdam_constants::network::SUPERVISOR_PORT;

use super::http_url;
use super::Discovery;
use crate::error::DiscoveryError;
use crate::error::LeaderFileSnafu;

/// File name looked up in the data directory when `LEADER_FILE` is unset.
pub const DEFAULT_LEADER_FILE: &str = "leader.env";

#[derive(Debug, Clone)]
pub struct LeaderFileDiscovery {
    path: PathBuf,
}

impl LeaderFileDiscovery {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

/// Parse dotenv-style `HOST=`/`PORT=` lines. Quotes and `export ` prefixes
/// are tolerated; a missing port means the default supervisor port.
pub fn parse_leader_file(contents: &str) -> Option<String> {
    let mut host = None;
    let mut port = SUPERVISOR_PORT;
    for line in contents.lines() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let line = line.strip_prefix("export ").unwrap_or(line);
        let Some((key, value)) = line.split_once('=') else {
            continue;
        };
        let value = value.trim().trim_matches('"').trim_matches('\'');
        match key.trim() {
            "HOST" if !value.is_empty() => host = Some(value.to_string()),
            "PORT" => {
                if let Ok(p) = value.parse() {
                    port = p;
                }
            }
            _ => {}
        }
    }
    host.map(|h| http_url(&h, port))
}

#[async_trait]
impl Discovery for LeaderFileDiscovery {
    fn name(&self) -> &'static str {
        "leader-file"
    }

    async fn candidates(&self) -> Result<Vec<String>, DiscoveryError> {
        let contents = tokio::fs::read_to_string(&self.path).await.context(LeaderFileSnafu {
            path: self.path.display().to_string(),
        })?;
        Ok(parse_leader_file(&contents).into_iter().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_host_and_port() {
        let url = parse_leader_file("# leader\nHOST=10.0.0.5\nPORT=8070\n");
        assert_eq!(url.as_deref(), Some("http://10.0.0.5:8070"));
    }

    #[test]
    fn test_parse_quotes_and_export() {
        let url = parse_leader_file("export HOST=\"leader.local\"\n");
        assert_eq!(url.as_deref(), Some("http://leader.local:8080"));
    }

    #[test]
    fn test_parse_without_host() {
        assert_eq!(parse_leader_file("PORT=8080\n"), None);
    }

    #[tokio::test]
    async fn test_reads_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("leader.env");
        std::fs::write(&path, "HOST=sup\nPORT=9000\n").unwrap();
        let found = LeaderFileDiscovery::new(&path).candidates().await.unwrap();
        assert_eq!(found, vec!["http://sup:9000".to_string()]);
    }
}
