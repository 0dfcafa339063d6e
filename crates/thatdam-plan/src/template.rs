//! YAML plan templates.
//!
//! Templates are looked up by name as `<dir>/<name>.yaml` (or `.yml`)
//! across a search path. `server` and `camera-proxy` are compiled in as
//! the final fallback.

use std::path::PathBuf;

use serde::Deserialize;
use serde::Serialize;
use snafu::ResultExt;
use tracing::debug;

use crate::error::InvalidNameSnafu;
use crate::error::ParseTemplateSnafu;
use crate::error::ReadTemplateSnafu;
use crate::error::TemplateError;
use crate::error::UnknownTemplateSnafu;
use crate::model::AppSpec;
use crate::model::DesiredPlan;
use crate::model::Executor;

const BUILTIN_SERVER: &str = include_str!("../templates/server.yaml");
const BUILTIN_CAMERA_PROXY: &str = include_str!("../templates/camera-proxy.yaml");

/// Contents of a template file.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlanTemplate {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub executor: Option<Executor>,
    #[serde(default)]
    pub apps: Vec<AppSpec>,
}

impl PlanTemplate {
    /// Instantiate for `node`.
    pub fn render(&self, node: &str, version: u64) -> DesiredPlan {
        DesiredPlan {
            version,
            node: node.to_string(),
            executor: self.executor.unwrap_or_default(),
            apps: self.apps.clone(),
        }
    }
}

/// Template loader over an ordered list of directories.
#[derive(Debug, Clone, Default)]
pub struct PlanTemplates {
    search_path: Vec<PathBuf>,
}

impl PlanTemplates {
    pub fn new(search_path: Vec<PathBuf>) -> Self {
        Self { search_path }
    }

    /// `plan_dir` (if any) then `./plans`.
    pub fn with_plan_dir(plan_dir: Option<PathBuf>) -> Self {
        let mut search_path: Vec<PathBuf> = plan_dir.into_iter().collect();
        search_path.push(PathBuf::from("plans"));
        Self { search_path }
    }

    /// Search path from `PLAN_DIR`, then `./plans`.
    pub fn from_env() -> Self {
        Self::with_plan_dir(std::env::var_os("PLAN_DIR").filter(|v| !v.is_empty()).map(PathBuf::from))
    }

    pub fn search_path(&self) -> &[PathBuf] {
        &self.search_path
    }

    pub fn load(&self, name: &str) -> Result<PlanTemplate, TemplateError> {
        if name.is_empty() || name.contains(['/', '\\']) || name.starts_with('.') {
            return InvalidNameSnafu { name }.fail();
        }

        for dir in &self.search_path {
            for ext in ["yaml", "yml"] {
                let path = dir.join(format!("{name}.{ext}"));
                if !path.is_file() {
                    continue;
                }
                let shown = path.display().to_string();
                let raw = std::fs::read_to_string(&path).context(ReadTemplateSnafu { path: shown.clone() })?;
                debug!(template = name, path = %shown, "loaded plan template");
                return serde_yaml::from_str(&raw).context(ParseTemplateSnafu { path: shown });
            }
        }

        let builtin = match name {
            "server" => BUILTIN_SERVER,
            "camera-proxy" => BUILTIN_CAMERA_PROXY,
            _ => return UnknownTemplateSnafu { name }.fail(),
        };
        serde_yaml::from_str(builtin).context(ParseTemplateSnafu {
            path: format!("builtin:{name}"),
        })
    }

    /// Load `name` and render it for `node`.
    pub fn render(&self, name: &str, node: &str, version: u64) -> Result<DesiredPlan, TemplateError> {
        Ok(self.load(name)?.render(node, version))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::order_apps;
    use crate::model::BuildKind;
    use crate::model::RestartPolicy;

    #[test]
    fn test_builtin_server_template() {
        let plan = PlanTemplates::new(Vec::new()).render("server", "node-1", 1).unwrap();
        assert_eq!(plan.node, "node-1");
        assert_eq!(plan.executor, Executor::Exec);
        let names: Vec<&str> = order_apps(&plan.apps).unwrap().iter().map(|a| a.name.as_str()).collect();
        assert_eq!(names, vec!["media-api", "video-web"]);
        let web = &plan.apps[1];
        assert!(web.needs_nextjs_build());
        assert_eq!(web.build.as_ref().map(|b| b.kind), Some(BuildKind::Nextjs));
        assert_eq!(web.restart, RestartPolicy::Always);
    }

    #[test]
    fn test_builtin_camera_proxy_template() {
        let tpl = PlanTemplates::new(Vec::new()).load("camera-proxy").unwrap();
        assert_eq!(tpl.apps.len(), 1);
        assert_eq!(tpl.apps[0].name, "camera-proxy");
        assert_eq!(tpl.apps[0].env.get("UPSTREAM_PORT").map(String::as_str), Some("8080"));
    }

    #[test]
    fn test_search_path_overrides_builtin() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("server.yaml"), "executor: docker\napps:\n  - name: only\n    command: [img]\n")
            .unwrap();

        let plan = PlanTemplates::new(vec![dir.path().to_path_buf()]).render("server", "n", 3).unwrap();
        assert_eq!(plan.executor, Executor::Docker);
        assert_eq!(plan.version, 3);
        assert_eq!(plan.apps.len(), 1);
        assert_eq!(plan.apps[0].name, "only");
    }

    #[test]
    fn test_first_directory_wins() {
        let first = tempfile::tempdir().unwrap();
        let second = tempfile::tempdir().unwrap();
        std::fs::write(first.path().join("edge.yml"), "apps:\n  - name: a\n").unwrap();
        std::fs::write(second.path().join("edge.yaml"), "apps:\n  - name: b\n").unwrap();

        let templates = PlanTemplates::new(vec![first.path().to_path_buf(), second.path().to_path_buf()]);
        assert_eq!(templates.load("edge").unwrap().apps[0].name, "a");
    }

    #[test]
    fn test_unknown_and_invalid_names() {
        let templates = PlanTemplates::new(Vec::new());
        assert!(matches!(templates.load("nope"), Err(TemplateError::UnknownTemplate { .. })));
        assert!(matches!(templates.load("../etc/passwd"), Err(TemplateError::InvalidName { .. })));
        assert!(matches!(templates.load(""), Err(TemplateError::InvalidName { .. })));
    }

    #[test]
    fn test_malformed_template_is_parse_error() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("bad.yaml"), "apps: {not: [a list").unwrap();
        let err = PlanTemplates::new(vec![dir.path().to_path_buf()]).load("bad").unwrap_err();
        assert!(matches!(err, TemplateError::ParseTemplate { .. }));
    }
}
