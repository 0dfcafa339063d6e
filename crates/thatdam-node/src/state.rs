//! On-disk node identity: `cluster.json`.
//!
//! Writes go to a temporary file in the same directory followed by a
//! rename, so readers see either the previous or the new document and
//! never a partial one.

use std::path::Path;
use std::path::PathBuf;

use chrono::DateTime;
use chrono::Utc;
use serde::Deserialize;
use serde::Serialize;
use snafu::ResultExt;
use tokio::io::AsyncWriteExt;

use crate::error::EncodeStateSnafu;
use crate::error::ParseStateSnafu;
use crate::error::ReadStateSnafu;
use crate::error::Result;
use crate::error::WriteStateSnafu;

pub const STATE_FILE_NAME: &str = "cluster.json";

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    #[default]
    Agent,
    Leader,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Agent => "agent",
            Role::Leader => "leader",
        }
    }

    /// `leader` is the only non-agent role; anything else is an agent.
    pub fn from_wire(role: &str) -> Self {
        if role.eq_ignore_ascii_case("leader") {
            Role::Leader
        } else {
            Role::Agent
        }
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Persisted identity and role.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClusterRecord {
    pub node_id: String,
    #[serde(default)]
    pub role: Role,
    #[serde(default)]
    pub epoch: u64,
    #[serde(default)]
    pub plan_version: u64,
    #[serde(default)]
    pub ttl_sec: u64,
    pub updated_utc: DateTime<Utc>,
    /// Hash of the last plan applied successfully.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub plan_generation: Option<String>,
}

impl ClusterRecord {
    pub fn new(node_id: impl Into<String>) -> Self {
        Self {
            node_id: node_id.into(),
            role: Role::Agent,
            epoch: 0,
            plan_version: 0,
            ttl_sec: 0,
            updated_utc: Utc::now(),
            plan_generation: None,
        }
    }
}

/// Reads and atomically rewrites `cluster.json` in a directory.
#[derive(Debug, Clone)]
pub struct StateStore {
    path: PathBuf,
}

impl StateStore {
    pub fn new(dir: impl AsRef<Path>) -> Self {
        Self {
            path: dir.as_ref().join(STATE_FILE_NAME),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn tmp_path(&self) -> PathBuf {
        self.path.with_extension("json.tmp")
    }

    /// `None` when no state has been written yet.
    pub async fn load(&self) -> Result<Option<ClusterRecord>> {
        let path = self.path.display().to_string();
        let bytes = match tokio::fs::read(&self.path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e).context(ReadStateSnafu { path }),
        };
        let record = serde_json::from_slice(&bytes).context(ParseStateSnafu { path })?;
        Ok(Some(record))
    }

    /// Stamp `updated_utc` and replace the file.
    pub async fn save(&self, record: &mut ClusterRecord) -> Result<()> {
        record.updated_utc = Utc::now();
        let body = serde_json::to_vec_pretty(record).context(EncodeStateSnafu)?;

        let path = self.path.display().to_string();
        if let Some(dir) = self.path.parent().filter(|d| !d.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(dir).await.context(WriteStateSnafu { path: path.clone() })?;
        }
        let tmp = self.tmp_path();
        let mut file = tokio::fs::File::create(&tmp).await.context(WriteStateSnafu { path: path.clone() })?;
        file.write_all(&body).await.context(WriteStateSnafu { path: path.clone() })?;
        file.sync_all().await.context(WriteStateSnafu { path: path.clone() })?;
        drop(file);
        tokio::fs::rename(&tmp, &self.path).await.context(WriteStateSnafu { path })?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_load_missing_is_none() {
        let dir = tempfile::tempdir().unwrap();
        assert!(StateStore::new(dir.path()).load().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_save_then_load() {
        let dir = tempfile::tempdir().unwrap();
        let store = StateStore::new(dir.path().join("nested"));
        let mut record = ClusterRecord::new("n1");
        record.role = Role::Leader;
        record.epoch = 3;
        store.save(&mut record).await.unwrap();

        let loaded = store.load().await.unwrap().unwrap();
        assert_eq!(loaded, record);

        let raw: serde_json::Value = serde_json::from_slice(&std::fs::read(store.path()).unwrap()).unwrap();
        assert_eq!(raw["role"], "leader");
        assert_eq!(raw["node_id"], "n1");
        assert!(raw["updated_utc"].is_string());
    }

    #[tokio::test]
    async fn test_interrupted_write_keeps_previous_file() {
        let dir = tempfile::tempdir().unwrap();
        let store = StateStore::new(dir.path());
        let mut record = ClusterRecord::new("n1");
        store.save(&mut record).await.unwrap();

        // A crash after writing the temp file but before the rename.
        std::fs::write(store.tmp_path(), b"{\"node_id\": \"half").unwrap();

        let loaded = store.load().await.unwrap().unwrap();
        assert_eq!(loaded.node_id, "n1");

        record.epoch = 1;
        store.save(&mut record).await.unwrap();
        assert_eq!(store.load().await.unwrap().unwrap().epoch, 1);
        assert!(!store.tmp_path().exists());
    }

    #[test]
    fn test_role_from_wire() {
        assert_eq!(Role::from_wire("leader"), Role::Leader);
        assert_eq!(Role::from_wire("agent"), Role::Agent);
        assert_eq!(Role::from_wire("server"), Role::Agent);
    }
}
