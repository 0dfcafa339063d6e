//! Local process runtime.
//!
//! Each unit is a child process owned by a supervision task. The task waits
//! on the child, applies the restart policy with exponential backoff, and
//! kills the child when the unit is stopped or the runtime is dropped.

use std::collections::HashMap;
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;
use std::time::Instant;

use async_trait::async_trait;
use thatdam_constants::plan::RESTART_BACKOFF_INITIAL_SECS;
use thatdam_constants::plan::RESTART_BACKOFF_MAX_SECS;
use thatdam_constants::supervisor::TASK_SHUTDOWN_GRACE_SECS;
use tokio::process::Child;
use tokio::process::Command;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::debug;
use tracing::info;
use tracing::warn;

use super::ServiceRuntime;
use super::UnitSpec;
use super::UnitState;
use crate::error::RuntimeError;
use crate::model::RestartPolicy;

struct TrackedUnit {
    spec: UnitSpec,
    status: Arc<std::sync::Mutex<UnitState>>,
    cancel: CancellationToken,
    task: JoinHandle<()>,
}

impl TrackedUnit {
    fn is_live(&self) -> bool {
        !self.task.is_finished()
    }
}

/// Runs units as local child processes.
///
/// Children inherit the runtime's environment with the unit's env layered
/// on top. An optional command prefix wraps every launch (see
/// [`super::NsRuntime`]).
pub struct ExecRuntime {
    prefix: Vec<String>,
    units: Mutex<HashMap<String, TrackedUnit>>,
    cancel: CancellationToken,
}

impl ExecRuntime {
    pub fn new() -> Self {
        Self::with_prefix(Vec::new())
    }

    /// Prepend `prefix` to every unit command.
    pub fn with_prefix(prefix: Vec<String>) -> Self {
        Self {
            prefix,
            units: Mutex::new(HashMap::new()),
            cancel: CancellationToken::new(),
        }
    }

    /// Names of units with a live supervision task.
    pub async fn tracked(&self) -> Vec<String> {
        let units = self.units.lock().await;
        let mut names: Vec<String> = units.iter().filter(|(_, u)| u.is_live()).map(|(n, _)| n.clone()).collect();
        names.sort();
        names
    }

    async fn stop_unit(unit: TrackedUnit) {
        unit.cancel.cancel();
        let grace = Duration::from_secs(TASK_SHUTDOWN_GRACE_SECS);
        let mut task = unit.task;
        if tokio::time::timeout(grace, &mut task).await.is_err() {
            warn!(unit = %unit.spec.name, "unit did not stop within grace period, aborting");
            task.abort();
        }
    }
}

impl Default for ExecRuntime {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for ExecRuntime {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

fn spawn_child(prefix: &[String], spec: &UnitSpec) -> Result<Child, RuntimeError> {
    let mut argv = prefix.iter().chain(spec.command.iter());
    let program = argv.next().cloned().unwrap_or_default();
    let mut cmd = Command::new(&program);
    cmd.args(argv).envs(&spec.env).stdin(Stdio::null()).kill_on_drop(true);
    if let Some(cwd) = &spec.cwd {
        cmd.current_dir(cwd);
    }
    cmd.spawn().map_err(|source| RuntimeError::Spawn {
        unit: spec.name.clone(),
        program,
        source,
    })
}

fn should_restart(policy: RestartPolicy, code: Option<i32>) -> bool {
    match policy {
        RestartPolicy::No => false,
        RestartPolicy::OnFailure => code != Some(0),
        RestartPolicy::Always => true,
    }
}

fn set_running(status: &std::sync::Mutex<UnitState>, pid: Option<u32>) {
    if let Ok(mut s) = status.lock() {
        s.active = true;
        s.pid = pid;
        s.exit_code = None;
        s.message = "running".to_string();
    }
}

fn set_exited(status: &std::sync::Mutex<UnitState>, code: Option<i32>, message: &str) {
    if let Ok(mut s) = status.lock() {
        s.active = false;
        s.pid = None;
        s.exit_code = code;
        s.message = message.to_string();
    }
}

async fn supervise(
    prefix: Vec<String>,
    spec: UnitSpec,
    first: Child,
    status: Arc<std::sync::Mutex<UnitState>>,
    cancel: CancellationToken,
) {
    let initial = Duration::from_secs(RESTART_BACKOFF_INITIAL_SECS);
    let max = Duration::from_secs(RESTART_BACKOFF_MAX_SECS);
    let mut backoff = initial;
    let mut child = Some(first);

    loop {
        if let Some(mut running) = child.take() {
            let started = Instant::now();
            let exit = tokio::select! {
                res = running.wait() => res,
                _ = cancel.cancelled() => {
                    if let Err(e) = running.kill().await {
                        debug!(unit = %spec.name, error = %e, "kill after stop");
                    }
                    set_exited(&status, None, "stopped");
                    return;
                }
            };
            let code = match exit {
                Ok(s) => s.code(),
                Err(e) => {
                    warn!(unit = %spec.name, error = %e, "wait on unit failed");
                    None
                }
            };
            set_exited(&status, code, "exited");
            if !should_restart(spec.restart, code) {
                info!(unit = %spec.name, ?code, "unit exited");
                return;
            }
            if started.elapsed() >= max {
                backoff = initial;
            }
            warn!(unit = %spec.name, ?code, backoff_ms = backoff.as_millis() as u64, "unit exited, restarting");
        }

        tokio::select! {
            _ = tokio::time::sleep(backoff) => {}
            _ = cancel.cancelled() => {
                set_exited(&status, None, "stopped");
                return;
            }
        }
        backoff = (backoff * 2).min(max);

        match spawn_child(&prefix, &spec) {
            Ok(c) => {
                set_running(&status, c.id());
                child = Some(c);
            }
            Err(e) => {
                warn!(unit = %spec.name, error = %e, "restart failed");
                if spec.restart == RestartPolicy::No {
                    return;
                }
            }
        }
    }
}

#[async_trait]
impl ServiceRuntime for ExecRuntime {
    async fn ensure(&self, spec: &UnitSpec) -> Result<(), RuntimeError> {
        if spec.command.is_empty() {
            debug!(unit = %spec.name, "unit has no command, nothing to run");
            return Ok(());
        }

        let mut units = self.units.lock().await;
        if let Some(existing) = units.get(&spec.name) {
            if existing.spec == *spec && existing.is_live() {
                debug!(unit = %spec.name, "unit already running");
                return Ok(());
            }
        }
        if let Some(previous) = units.remove(&spec.name) {
            info!(unit = %spec.name, "unit spec changed or exited, replacing");
            Self::stop_unit(previous).await;
        }

        let child = spawn_child(&self.prefix, spec)?;
        let status = Arc::new(std::sync::Mutex::new(UnitState {
            name: spec.name.clone(),
            ..Default::default()
        }));
        set_running(&status, child.id());
        info!(unit = %spec.name, pid = ?child.id(), "unit started");

        let cancel = self.cancel.child_token();
        let task = tokio::spawn(supervise(self.prefix.clone(), spec.clone(), child, status.clone(), cancel.clone()));
        units.insert(spec.name.clone(), TrackedUnit {
            spec: spec.clone(),
            status,
            cancel,
            task,
        });
        Ok(())
    }

    async fn stop(&self, name: &str) -> Result<(), RuntimeError> {
        let unit = self.units.lock().await.remove(name);
        if let Some(unit) = unit {
            Self::stop_unit(unit).await;
            info!(unit = %name, "unit stopped");
        }
        Ok(())
    }

    async fn state(&self, name: &str) -> Result<UnitState, RuntimeError> {
        let units = self.units.lock().await;
        let state = match units.get(name) {
            Some(unit) => unit.status.lock().map(|s| s.clone()).unwrap_or_else(|_| UnitState::unknown(name, "poisoned")),
            None => UnitState::unknown(name, "not tracked"),
        };
        Ok(state)
    }
}
