//! Filesystem object storage: one directory per bucket.
//!
//! Versioning, lifecycle and tags have no filesystem meaning and are
//! accepted as no-ops once the bucket exists.

use std::collections::BTreeMap;
use std::path::Path;
use std::path::PathBuf;

use async_trait::async_trait;
use snafu::ResultExt;

use super::validate_name;
use crate::error::IoSnafu;
use crate::error::PortError;
use crate::ports::LifecycleRule;
use crate::ports::ObjectStorage;

#[derive(Debug, Clone)]
pub struct FsStorage {
    root: PathBuf,
}

impl FsStorage {
    /// Root the store at `root`, creating it if needed.
    pub async fn new(root: impl Into<PathBuf>) -> Result<Self, PortError> {
        let root = root.into();
        tokio::fs::create_dir_all(&root).await.context(IoSnafu {
            op: "create root",
            path: root.display().to_string(),
        })?;
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn bucket_path(&self, name: &str) -> PathBuf {
        self.root.join(name)
    }

    async fn require_bucket(&self, name: &str) -> Result<(), PortError> {
        validate_name(name)?;
        let path = self.bucket_path(name);
        tokio::fs::metadata(&path).await.map(|_| ()).context(IoSnafu {
            op: "stat bucket",
            path: path.display().to_string(),
        })
    }
}

#[async_trait]
impl ObjectStorage for FsStorage {
    async fn ensure_bucket(&self, name: &str) -> Result<(), PortError> {
        validate_name(name)?;
        let path = self.bucket_path(name);
        tokio::fs::create_dir_all(&path).await.context(IoSnafu {
            op: "create bucket",
            path: path.display().to_string(),
        })
    }

    async fn ensure_versioning(&self, name: &str, _enabled: bool) -> Result<(), PortError> {
        self.require_bucket(name).await
    }

    async fn ensure_lifecycle(&self, name: &str, _rules: &[LifecycleRule]) -> Result<(), PortError> {
        self.require_bucket(name).await
    }

    async fn ensure_tags(&self, name: &str, _tags: &BTreeMap<String, String>) -> Result<(), PortError> {
        self.require_bucket(name).await
    }
}
