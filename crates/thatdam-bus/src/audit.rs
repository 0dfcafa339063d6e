//! Append-only JSON-lines audit log for tenant events.

use std::path::Path;
use std::path::PathBuf;

use serde::Serialize;
use snafu::ResultExt;
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;

use crate::error::AuditEncodeSnafu;
use crate::error::AuditSnafu;
use crate::error::Result;

#[derive(Debug, Serialize)]
struct AuditEntry<'a, T: Serialize + ?Sized> {
    topic: &'a str,
    payload: &'a T,
    /// RFC 3339, UTC.
    ts: String,
}

/// Serialises appends so lines never interleave.
#[derive(Debug)]
pub struct AuditLog {
    path: PathBuf,
    lock: Mutex<()>,
}

impl AuditLog {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Append one `{topic, payload, ts}` line, creating parent directories.
    pub async fn append<T: Serialize + ?Sized>(&self, topic: &str, payload: &T) -> Result<()> {
        let entry = AuditEntry {
            topic,
            payload,
            ts: chrono::Utc::now().to_rfc3339(),
        };
        let mut line = serde_json::to_vec(&entry).context(AuditEncodeSnafu { topic })?;
        line.push(b'\n');

        let _guard = self.lock.lock().await;
        let path = self.path.display().to_string();
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await.context(AuditSnafu { path: path.clone() })?;
        }
        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .await
            .context(AuditSnafu { path: path.clone() })?;
        file.write_all(&line).await.context(AuditSnafu { path: path.clone() })?;
        file.flush().await.context(AuditSnafu { path })?;
        Ok(())
    }
}
