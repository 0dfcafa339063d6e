//! Docker CLI runtime.

use std::process::Output;

use async_trait::async_trait;
use serde::Deserialize;
use sha2::Digest;
use sha2::Sha256;
use tokio::process::Command;
use tracing::debug;
use tracing::info;

use super::ServiceRuntime;
use super::UnitSpec;
use super::UnitState;
use crate::error::RuntimeError;
use crate::model::RestartPolicy;

/// Label carrying the hash of the spec a container was started from.
const SPEC_LABEL: &str = "thatdam.spec";

/// Runs units as detached containers through the `docker` binary.
///
/// The first element of a unit's command is the image.
#[derive(Debug, Clone)]
pub struct DockerRuntime {
    bin: String,
}

#[derive(Debug, Deserialize)]
struct ContainerState {
    #[serde(rename = "Running", default)]
    running: bool,
    #[serde(rename = "Pid", default)]
    pid: u32,
    #[serde(rename = "ExitCode", default)]
    exit_code: i32,
    #[serde(rename = "Status", default)]
    status: String,
}

impl DockerRuntime {
    /// Use `bin` as the docker CLI. An empty string means `docker`.
    pub fn new(bin: impl Into<String>) -> Self {
        let bin = bin.into();
        Self {
            bin: if bin.is_empty() { "docker".to_string() } else { bin },
        }
    }

    async fn cli(&self, action: &str, unit: &str, args: &[String]) -> Result<Output, RuntimeError> {
        Command::new(&self.bin).args(args).output().await.map_err(|source| RuntimeError::Spawn {
            unit: unit.to_string(),
            program: format!("{} {action}", self.bin),
            source,
        })
    }

    /// `(running, spec hash)` of an existing container, `None` if absent.
    async fn inspect_existing(&self, name: &str) -> Result<Option<(bool, String)>, RuntimeError> {
        let format = format!("{{{{.State.Running}}}} {{{{index .Config.Labels \"{SPEC_LABEL}\"}}}}");
        let args = vec!["inspect".to_string(), "--format".to_string(), format, name.to_string()];
        let out = self.cli("inspect", name, &args).await?;
        if !out.status.success() {
            return Ok(None);
        }
        let text = String::from_utf8_lossy(&out.stdout);
        let mut parts = text.trim().splitn(2, ' ');
        let running = parts.next() == Some("true");
        let hash = parts.next().unwrap_or_default().to_string();
        Ok(Some((running, hash)))
    }
}

/// Stable hash of the unit spec, stored as a container label.
pub fn spec_hash(spec: &UnitSpec) -> String {
    let json = serde_json::to_vec(spec).unwrap_or_default();
    hex::encode(Sha256::digest(&json))
}

/// Arguments for `docker run` for `spec`.
pub fn run_args(spec: &UnitSpec) -> Vec<String> {
    let mut args = vec!["run".to_string(), "-d".to_string(), "--name".to_string(), spec.name.clone()];
    match spec.restart {
        RestartPolicy::No => args.push("--rm".to_string()),
        policy => {
            args.push("--restart".to_string());
            args.push(policy.to_string());
        }
    }
    args.push("--label".to_string());
    args.push(format!("{SPEC_LABEL}={}", spec_hash(spec)));
    for (key, value) in &spec.env {
        args.push("-e".to_string());
        args.push(format!("{key}={value}"));
    }
    for port in &spec.ports {
        args.push("-p".to_string());
        args.push(format!("{port}:{port}"));
    }
    args.extend(spec.command.iter().cloned());
    args
}

fn cli_failure(program: &str, action: &str, unit: &str, out: &Output) -> RuntimeError {
    let stderr = String::from_utf8_lossy(&out.stderr).trim().to_string();
    RuntimeError::Cli {
        program: program.to_string(),
        action: action.to_string(),
        unit: unit.to_string(),
        detail: if stderr.is_empty() { format!("exit {:?}", out.status.code()) } else { stderr },
    }
}

#[async_trait]
impl ServiceRuntime for DockerRuntime {
    async fn ensure(&self, spec: &UnitSpec) -> Result<(), RuntimeError> {
        if spec.command.is_empty() {
            debug!(unit = %spec.name, "unit has no image, nothing to run");
            return Ok(());
        }

        match self.inspect_existing(&spec.name).await? {
            Some((true, hash)) if hash == spec_hash(spec) => {
                debug!(unit = %spec.name, "container already running");
                return Ok(());
            }
            Some(_) => {
                info!(unit = %spec.name, "replacing container");
                self.stop(&spec.name).await?;
            }
            None => {}
        }

        let out = self.cli("run", &spec.name, &run_args(spec)).await?;
        if !out.status.success() {
            return Err(cli_failure(&self.bin, "run", &spec.name, &out));
        }
        info!(unit = %spec.name, "container started");
        Ok(())
    }

    async fn stop(&self, name: &str) -> Result<(), RuntimeError> {
        let args = vec!["rm".to_string(), "-f".to_string(), name.to_string()];
        let out = self.cli("rm", name, &args).await?;
        if !out.status.success() {
            debug!(unit = %name, "docker rm reported failure, treating as absent");
        }
        Ok(())
    }

    async fn state(&self, name: &str) -> Result<UnitState, RuntimeError> {
        let args = vec![
            "inspect".to_string(),
            name.to_string(),
            "--format".to_string(),
            "{{json .State}}".to_string(),
        ];
        let out = self.cli("inspect", name, &args).await?;
        if !out.status.success() {
            let message = String::from_utf8_lossy(&out.stderr).trim().to_string();
            return Ok(UnitState::unknown(name, message));
        }
        let state: ContainerState =
            serde_json::from_slice(&out.stdout).map_err(|source| RuntimeError::ParseState {
                unit: name.to_string(),
                source,
            })?;
        Ok(UnitState {
            name: name.to_string(),
            active: state.running,
            pid: (state.pid != 0).then_some(state.pid),
            exit_code: Some(state.exit_code),
            message: state.status,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_run_args_without_restart_use_rm() {
        let mut spec = UnitSpec::new("web", ["nginx:alpine"]);
        spec.ports = vec![8080];
        spec.env.insert("MODE".into(), "prod".into());

        let args = run_args(&spec);
        assert_eq!(&args[..5], &["run", "-d", "--name", "web", "--rm"]);
        assert!(args.windows(2).any(|w| w[0] == "-e" && w[1] == "MODE=prod"));
        assert!(args.windows(2).any(|w| w[0] == "-p" && w[1] == "8080:8080"));
        assert_eq!(args.last().map(String::as_str), Some("nginx:alpine"));
    }

    #[test]
    fn test_run_args_with_restart_policy() {
        let mut spec = UnitSpec::new("api", ["img", "serve"]);
        spec.restart = RestartPolicy::OnFailure;

        let args = run_args(&spec);
        assert!(!args.contains(&"--rm".to_string()));
        assert!(args.windows(2).any(|w| w[0] == "--restart" && w[1] == "on-failure"));
        assert_eq!(&args[args.len() - 2..], &["img", "serve"]);
    }

    #[test]
    fn test_spec_hash_tracks_changes() {
        let a = UnitSpec::new("api", ["img"]);
        let mut b = a.clone();
        assert_eq!(spec_hash(&a), spec_hash(&b));
        b.ports.push(1);
        assert_ne!(spec_hash(&a), spec_hash(&b));
    }

    #[cfg(unix)]
    fn stub_docker(dir: &std::path::Path, script: &str) -> String {
        use std::os::unix::fs::PermissionsExt;
        let path = dir.join("docker");
        std::fs::write(&path, format!("#!/bin/sh\n{script}\n")).unwrap();
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
        path.display().to_string()
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_state_parses_inspect_output() {
        let dir = tempfile::tempdir().unwrap();
        let bin = stub_docker(
            dir.path(),
            r#"if [ "$2" = "running" ]; then
  echo '{"Running":true,"Pid":111,"ExitCode":0,"Status":"running"}'
else
  echo '{"Running":false,"Pid":0,"ExitCode":7,"Status":"exited"}'
fi"#,
        );
        let rt = DockerRuntime::new(bin);

        let running = rt.state("running").await.unwrap();
        assert!(running.active);
        assert_eq!(running.pid, Some(111));
        assert_eq!(running.message, "running");

        let stopped = rt.state("stopped").await.unwrap();
        assert!(!stopped.active);
        assert_eq!(stopped.exit_code, Some(7));
        assert_eq!(stopped.pid, None);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_ensure_skips_run_when_matching_container_runs() {
        let dir = tempfile::tempdir().unwrap();
        let spec = UnitSpec::new("api", ["img"]);
        let log = dir.path().join("calls.log");
        let script = format!(
            r#"echo "$1" >> {log}
if [ "$1" = "inspect" ]; then echo "true {hash}"; fi"#,
            log = log.display(),
            hash = spec_hash(&spec),
        );
        let rt = DockerRuntime::new(stub_docker(dir.path(), &script));

        rt.ensure(&spec).await.unwrap();

        let calls = std::fs::read_to_string(&log).unwrap();
        assert_eq!(calls.lines().collect::<Vec<_>>(), vec!["inspect"]);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_ensure_runs_when_container_absent() {
        let dir = tempfile::tempdir().unwrap();
        let log = dir.path().join("calls.log");
        let script = format!(
            r#"echo "$1" >> {log}
if [ "$1" = "inspect" ]; then exit 1; fi"#,
            log = log.display(),
        );
        let rt = DockerRuntime::new(stub_docker(dir.path(), &script));

        rt.ensure(&UnitSpec::new("api", ["img"])).await.unwrap();

        let calls = std::fs::read_to_string(&log).unwrap();
        assert_eq!(calls.lines().collect::<Vec<_>>(), vec!["inspect", "run"]);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_run_failure_surfaces_stderr() {
        let dir = tempfile::tempdir().unwrap();
        let script = r#"if [ "$1" = "inspect" ]; then exit 1; fi
echo "no such image" >&2
exit 125"#;
        let rt = DockerRuntime::new(stub_docker(dir.path(), script));

        let err = rt.ensure(&UnitSpec::new("api", ["img"])).await.unwrap_err();
        assert!(err.to_string().contains("no such image"));
    }
}
