//! Pre-start builds.
//!
//! Only Next.js builds are supported. A local node toolchain is preferred;
//! without one the build runs inside a throwaway node container.

use std::path::Path;
use std::path::PathBuf;

use async_trait::async_trait;
use thatdam_constants::plan::NEXTJS_BUILD_IMAGE;
use tokio::process::Command;
use tracing::info;

use crate::error::BuildError;
use crate::model::AppSpec;
use crate::model::BuildKind;

/// Runs an app's build step before it is started.
#[async_trait]
pub trait AppBuilder: Send + Sync {
    async fn build(&self, app: &AppSpec) -> Result<(), BuildError>;
}

/// Where a Next.js build runs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Toolchain {
    /// Local `npm` next to a local `node`.
    Local { npm: PathBuf },
    /// `docker run` of [`NEXTJS_BUILD_IMAGE`].
    Container { docker: PathBuf },
}

/// Find an executable named `name` on `PATH`.
pub fn find_on_path(name: &str) -> Option<PathBuf> {
    let path = std::env::var_os("PATH")?;
    std::env::split_paths(&path).map(|dir| dir.join(name)).find(|candidate| is_executable(candidate))
}

#[cfg(unix)]
fn is_executable(path: &Path) -> bool {
    use std::os::unix::fs::PermissionsExt;
    std::fs::metadata(path).map(|m| m.is_file() && m.permissions().mode() & 0o111 != 0).unwrap_or(false)
}

#[cfg(not(unix))]
fn is_executable(path: &Path) -> bool {
    path.is_file()
}

/// Builds Next.js apps with the first available toolchain.
#[derive(Debug, Clone, Default)]
pub struct NextjsBuilder {
    toolchain: Option<Toolchain>,
}

impl NextjsBuilder {
    /// Probe `PATH` for node/npm, then docker.
    pub fn detect() -> Self {
        let local = find_on_path("node").and(find_on_path("npm")).map(|npm| Toolchain::Local { npm });
        let toolchain = local.or_else(|| find_on_path("docker").map(|docker| Toolchain::Container { docker }));
        Self { toolchain }
    }

    pub fn with_toolchain(toolchain: Option<Toolchain>) -> Self {
        Self { toolchain }
    }

    pub fn toolchain(&self) -> Option<&Toolchain> {
        self.toolchain.as_ref()
    }
}

/// `sh -lc` script run inside the build container.
pub fn container_script(pre: &[String]) -> String {
    let mut script = String::from("set -e; ");
    if !pre.is_empty() {
        script.push_str(&pre.join(" "));
        script.push_str("; ");
    }
    script.push_str("npm run build");
    script
}

async fn run(mut cmd: Command, label: String) -> Result<(), BuildError> {
    let status = cmd.status().await.map_err(|source| BuildError::BuildSpawn {
        command: label.clone(),
        source,
    })?;
    if status.success() {
        Ok(())
    } else {
        Err(BuildError::BuildFailed {
            command: label,
            code: status.code(),
        })
    }
}

#[async_trait]
impl AppBuilder for NextjsBuilder {
    async fn build(&self, app: &AppSpec) -> Result<(), BuildError> {
        let Some(spec) = app.build.as_ref().filter(|b| b.kind == BuildKind::Nextjs) else {
            return Ok(());
        };
        let toolchain = self.toolchain.as_ref().ok_or(BuildError::NoBuilder)?;
        let cwd = if app.cwd.is_empty() { PathBuf::from(".") } else { PathBuf::from(&app.cwd) };

        match toolchain {
            Toolchain::Local { npm } => {
                info!(app = %app.name, cwd = %cwd.display(), "building nextjs app locally");
                if let Some((program, args)) = spec.command.split_first() {
                    let mut cmd = Command::new(program);
                    cmd.args(args).current_dir(&cwd).envs(&spec.env);
                    run(cmd, spec.command.join(" ")).await?;
                }
                let mut cmd = Command::new(npm);
                cmd.args(["run", "build"]).current_dir(&cwd).envs(&spec.env);
                run(cmd, "npm run build".to_string()).await
            }
            Toolchain::Container { docker } => {
                info!(app = %app.name, image = NEXTJS_BUILD_IMAGE, "building nextjs app in container");
                let abs = std::fs::canonicalize(&cwd).unwrap_or(cwd);
                let mut cmd = Command::new(docker);
                cmd.args(["run", "--rm", "-v"]).arg(format!("{}:/app", abs.display())).args(["-w", "/app"]);
                for (key, value) in &spec.env {
                    cmd.arg("-e").arg(format!("{key}={value}"));
                }
                cmd.args([NEXTJS_BUILD_IMAGE, "sh", "-lc"]).arg(container_script(&spec.command));
                run(cmd, format!("docker run {NEXTJS_BUILD_IMAGE}")).await
            }
        }
    }
}
