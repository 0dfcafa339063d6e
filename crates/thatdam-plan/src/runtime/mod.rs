//! Service runtime port and its adapters.
//!
//! A [`ServiceRuntime`] turns a [`UnitSpec`] into something running on the
//! host. `ensure` must be idempotent: two calls with the same spec leave
//! exactly one unit running.

mod docker;
mod exec;
mod ns;

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use serde::Deserialize;
use serde::Serialize;

pub use self::docker::DockerRuntime;
pub use self::exec::ExecRuntime;
pub use self::ns::NsRuntime;
use crate::error::RuntimeError;
use crate::model::AppSpec;
use crate::model::Executor;
use crate::model::RestartPolicy;

/// What a runtime needs to start one unit.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnitSpec {
    pub name: String,
    /// Program and arguments. For docker the first element is the image.
    pub command: Vec<String>,
    pub env: BTreeMap<String, String>,
    pub cwd: Option<PathBuf>,
    pub ports: Vec<u16>,
    pub restart: RestartPolicy,
}

impl UnitSpec {
    pub fn new<I, S>(name: impl Into<String>, command: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            name: name.into(),
            command: command.into_iter().map(Into::into).collect(),
            ..Default::default()
        }
    }
}

impl From<&AppSpec> for UnitSpec {
    fn from(app: &AppSpec) -> Self {
        Self {
            name: app.name.clone(),
            command: app.command.clone(),
            env: app.env.clone(),
            cwd: (!app.cwd.is_empty()).then(|| PathBuf::from(&app.cwd)),
            ports: app.ports.clone(),
            restart: app.restart,
        }
    }
}

/// Observed state of a unit.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnitState {
    pub name: String,
    pub active: bool,
    pub pid: Option<u32>,
    pub exit_code: Option<i32>,
    /// Free-form status text from the runtime.
    pub message: String,
}

impl UnitState {
    pub fn unknown(name: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            message: message.into(),
            ..Default::default()
        }
    }
}

/// Host-side service manager.
#[async_trait]
pub trait ServiceRuntime: Send + Sync {
    /// Start the unit unless an identical one is already running.
    async fn ensure(&self, spec: &UnitSpec) -> Result<(), RuntimeError>;

    /// Stop the unit. Stopping an unknown unit is not an error.
    async fn stop(&self, name: &str) -> Result<(), RuntimeError>;

    /// Report the unit's state. Unknown units are inactive.
    async fn state(&self, name: &str) -> Result<UnitState, RuntimeError>;
}

/// Picks a runtime for a plan's [`Executor`].
#[derive(Clone)]
pub struct RuntimeRegistry {
    exec: Arc<dyn ServiceRuntime>,
    docker: Arc<dyn ServiceRuntime>,
    ns: Arc<dyn ServiceRuntime>,
}

impl RuntimeRegistry {
    /// Host adapters: local processes, docker CLI and `unshare`.
    pub fn host() -> Self {
        Self {
            exec: Arc::new(ExecRuntime::new()),
            docker: Arc::new(DockerRuntime::new("docker")),
            ns: Arc::new(NsRuntime::new()),
        }
    }

    /// Route every executor to the same runtime.
    pub fn single(runtime: Arc<dyn ServiceRuntime>) -> Self {
        Self {
            exec: runtime.clone(),
            docker: runtime.clone(),
            ns: runtime,
        }
    }

    pub fn get(&self, executor: Executor) -> Arc<dyn ServiceRuntime> {
        match executor {
            Executor::Exec => self.exec.clone(),
            Executor::Docker => self.docker.clone(),
            Executor::Ns => self.ns.clone(),
        }
    }
}

impl std::fmt::Debug for RuntimeRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RuntimeRegistry").finish_non_exhaustive()
    }
}
