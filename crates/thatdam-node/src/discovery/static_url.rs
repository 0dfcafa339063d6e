use async_trait::async_trait;

use super::Discovery;
use crate::error::DiscoveryError;

/// A configured supervisor URL, trusted without a health probe.
#[derive(Debug, Clone)]
pub struct StaticDiscovery {
    url: String,
}

impl StaticDiscovery {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into().trim().trim_end_matches('/').to_string(),
        }
    }
}

#[async_trait]
impl Discovery for StaticDiscovery {
    fn name(&self) -> &'static str {
        "static"
    }

    async fn candidates(&self) -> Result<Vec<String>, DiscoveryError> {
        if self.url.is_empty() {
            return Ok(Vec::new());
        }
        Ok(vec![self.url.clone()])
    }

    fn trusted(&self) -> bool {
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_empty_url_yields_nothing() {
        assert!(StaticDiscovery::new(" ").candidates().await.unwrap().is_empty());
        assert_eq!(
            StaticDiscovery::new("http://sup:8080/").candidates().await.unwrap(),
            vec!["http://sup:8080".to_string()]
        );
    }
}
