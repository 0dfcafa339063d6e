//! Namespaced process runtime.

use async_trait::async_trait;

use super::ExecRuntime;
use super::ServiceRuntime;
use super::UnitSpec;
use super::UnitState;
use crate::error::RuntimeError;

/// Command prefix giving each unit its own PID and mount namespaces.
pub const UNSHARE_PREFIX: [&str; 5] = ["unshare", "--fork", "--pid", "--mount-proc", "--"];

/// [`ExecRuntime`] with every command wrapped in `unshare`.
pub struct NsRuntime {
    inner: ExecRuntime,
}

impl NsRuntime {
    pub fn new() -> Self {
        Self {
            inner: ExecRuntime::with_prefix(UNSHARE_PREFIX.iter().map(|s| s.to_string()).collect()),
        }
    }
}

impl Default for NsRuntime {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ServiceRuntime for NsRuntime {
    async fn ensure(&self, spec: &UnitSpec) -> Result<(), RuntimeError> {
        self.inner.ensure(spec).await
    }

    async fn stop(&self, name: &str) -> Result<(), RuntimeError> {
        self.inner.stop(name).await
    }

    async fn state(&self, name: &str) -> Result<UnitState, RuntimeError> {
        self.inner.state(name).await
    }
}
