//! Where the node's supervisor credentials come from.

use std::path::PathBuf;
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::PoisonError;

use async_trait::async_trait;
use snafu::ResultExt;
use tracing::debug;
use tracing::info;

use crate::client::Credential;
use crate::client::SupervisorClient;
use crate::config::NodeConfig;
use crate::error::ClientError;
use crate::error::TokenFileSnafu;

/// Supplies the credential attached to supervisor calls.
///
/// `invalidate` is called after a 401/403 so the next `credential` call
/// produces a fresh one where the source can.
#[async_trait]
pub trait TokenSource: Send + Sync {
    async fn credential(&self, client: &SupervisorClient, node_id: &str) -> Result<Credential, ClientError>;

    fn invalidate(&self) {}
}

#[async_trait]
impl<T: TokenSource + ?Sized> TokenSource for Arc<T> {
    async fn credential(&self, client: &SupervisorClient, node_id: &str) -> Result<Credential, ClientError> {
        (**self).credential(client, node_id).await
    }

    fn invalidate(&self) {
        (**self).invalidate()
    }
}

/// A fixed credential: an API key, a bearer token or nothing.
#[derive(Debug, Clone, Default)]
pub struct StaticToken(pub Credential);

#[async_trait]
impl TokenSource for StaticToken {
    async fn credential(&self, _client: &SupervisorClient, _node_id: &str) -> Result<Credential, ClientError> {
        Ok(self.0.clone())
    }
}

/// Bearer token read from a file on every call, so rotated tokens are
/// picked up without a restart.
#[derive(Debug, Clone)]
pub struct FileToken {
    path: PathBuf,
}

impl FileToken {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

#[async_trait]
impl TokenSource for FileToken {
    async fn credential(&self, _client: &SupervisorClient, _node_id: &str) -> Result<Credential, ClientError> {
        let raw = tokio::fs::read_to_string(&self.path).await.context(TokenFileSnafu {
            path: self.path.display().to_string(),
        })?;
        let token = raw.trim();
        if token.is_empty() {
            return Ok(Credential::Anonymous);
        }
        Ok(Credential::Bearer(token.to_string()))
    }
}

/// Exchanges a join token for a node access token and caches the result
/// until invalidated.
pub struct JoinExchange {
    join_token: String,
    cached: Mutex<Option<String>>,
}

impl JoinExchange {
    pub fn new(join_token: impl Into<String>) -> Self {
        Self {
            join_token: join_token.into(),
            cached: Mutex::new(None),
        }
    }
}

impl std::fmt::Debug for JoinExchange {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JoinExchange").finish_non_exhaustive()
    }
}

#[async_trait]
impl TokenSource for JoinExchange {
    async fn credential(&self, client: &SupervisorClient, node_id: &str) -> Result<Credential, ClientError> {
        let cached = self.cached.lock().unwrap_or_else(PoisonError::into_inner).clone();
        if let Some(token) = cached {
            return Ok(Credential::Bearer(token));
        }

        let response = client.exchange(&self.join_token, node_id).await?;
        info!(node_id, expires_in = response.expires_in, "exchanged join token for node access token");
        *self.cached.lock().unwrap_or_else(PoisonError::into_inner) = Some(response.token.clone());
        Ok(Credential::Bearer(response.token))
    }

    fn invalidate(&self) {
        debug!("dropping cached node access token");
        self.cached.lock().unwrap_or_else(PoisonError::into_inner).take();
    }
}

/// Pick a source from configuration.
///
/// Precedence: API key, token file, static token, join token, anonymous.
pub fn token_source(config: &NodeConfig) -> Arc<dyn TokenSource> {
    if let Some(key) = &config.api_key {
        return Arc::new(StaticToken(Credential::ApiKey(key.clone())));
    }
    if let Some(path) = &config.token_file {
        return Arc::new(FileToken::new(path.clone()));
    }
    if let Some(token) = &config.token {
        return Arc::new(StaticToken(Credential::Bearer(token.clone())));
    }
    if let Some(join) = &config.join_token {
        return Arc::new(JoinExchange::new(join.clone()));
    }
    Arc::new(StaticToken(Credential::Anonymous))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_file_token_is_reread() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("token");
        std::fs::write(&path, "first\n").unwrap();

        let source = FileToken::new(&path);
        let client = SupervisorClient::new("http://127.0.0.1:1");
        assert_eq!(source.credential(&client, "n").await.unwrap(), Credential::Bearer("first".into()));

        std::fs::write(&path, "second").unwrap();
        source.invalidate();
        assert_eq!(source.credential(&client, "n").await.unwrap(), Credential::Bearer("second".into()));
    }

    #[tokio::test]
    async fn test_missing_token_file_is_an_error() {
        let source = FileToken::new("/nonexistent/token");
        let client = SupervisorClient::new("http://127.0.0.1:1");
        let err = source.credential(&client, "n").await.unwrap_err();
        assert!(matches!(err, ClientError::TokenFile { .. }));
    }

    #[tokio::test]
    async fn test_precedence_api_key_first() {
        let config = NodeConfig {
            api_key: Some("k".into()),
            token: Some("t".into()),
            ..Default::default()
        };
        let client = SupervisorClient::new("http://127.0.0.1:1");
        let cred = token_source(&config).credential(&client, "n").await.unwrap();
        assert_eq!(cred, Credential::ApiKey("k".into()));
    }

    #[tokio::test]
    async fn test_no_credentials_is_anonymous() {
        let client = SupervisorClient::new("http://127.0.0.1:1");
        let cred = token_source(&NodeConfig::default()).credential(&client, "n").await.unwrap();
        assert_eq!(cred, Credential::Anonymous);
    }
}
