//! Plan records exchanged between supervisor and node.

use std::collections::BTreeMap;
use std::fmt;

use serde::Deserialize;
use serde::Serialize;

/// Runtime family used to start the plan's apps.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Executor {
    /// Local processes.
    #[default]
    Exec,
    /// Containers via the docker CLI.
    Docker,
    /// Local processes in fresh PID and mount namespaces.
    Ns,
}

impl fmt::Display for Executor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Executor::Exec => "exec",
            Executor::Docker => "docker",
            Executor::Ns => "ns",
        })
    }
}

/// What the runtime does when a unit exits.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RestartPolicy {
    #[default]
    No,
    OnFailure,
    Always,
}

impl fmt::Display for RestartPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            RestartPolicy::No => "no",
            RestartPolicy::OnFailure => "on-failure",
            RestartPolicy::Always => "always",
        })
    }
}

/// HTTP endpoint polled after start until it answers 2xx.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct HealthCheck {
    #[serde(default)]
    pub http: String,
    #[serde(default)]
    pub interval_sec: u64,
    #[serde(default)]
    pub timeout_sec: u64,
}

/// Supported pre-start build steps.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BuildKind {
    #[default]
    None,
    Nextjs,
}

/// How an app is built before it runs.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BuildSpec {
    #[serde(default)]
    pub kind: BuildKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub strategy: Option<String>,
    /// Runs before `npm run build` (e.g. `npm ci`).
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub command: Vec<String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub env: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub out_dir: String,
}

/// One app in a plan.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppSpec {
    /// Unique within the plan.
    pub name: String,
    #[serde(default)]
    pub kind: String,
    #[serde(default)]
    pub cwd: String,
    #[serde(default)]
    pub command: Vec<String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub env: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub ports: Vec<u16>,
    /// Names of apps in the same plan that must be up first.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub after: Vec<String>,
    #[serde(default)]
    pub restart: RestartPolicy,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub health: Option<HealthCheck>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub build: Option<BuildSpec>,
}

impl AppSpec {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    pub fn after<I, S>(mut self, deps: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.after = deps.into_iter().map(Into::into).collect();
        self
    }

    pub fn command<I, S>(mut self, argv: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.command = argv.into_iter().map(Into::into).collect();
        self
    }

    /// Whether a Next.js build must run before start.
    pub fn needs_nextjs_build(&self) -> bool {
        self.build.as_ref().is_some_and(|b| b.kind == BuildKind::Nextjs)
    }

    /// Health check with a non-empty URL, if any.
    pub fn http_health(&self) -> Option<&HealthCheck> {
        self.health.as_ref().filter(|h| !h.http.is_empty())
    }
}

/// Apps a node should be running.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DesiredPlan {
    #[serde(default)]
    pub version: u64,
    #[serde(default)]
    pub node: String,
    #[serde(default)]
    pub executor: Executor,
    #[serde(default)]
    pub apps: Vec<AppSpec>,
}

impl DesiredPlan {
    pub fn new(version: u64, node: impl Into<String>, apps: Vec<AppSpec>) -> Self {
        Self {
            version,
            node: node.into(),
            executor: Executor::default(),
            apps,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.apps.is_empty()
    }
}
