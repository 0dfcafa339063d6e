//! Error types for plan validation, building, running and applying.
//!
//! Uses snafu for structured error handling with context.

use snafu::Snafu;

/// Dependency-graph problems. Fatal for the plan, never retried.
#[derive(Debug, Clone, PartialEq, Eq, Snafu)]
#[snafu(visibility(pub))]
pub enum PlanError {
    /// No app could be scheduled in a full pass (cycle).
    #[snafu(display("plan dependency deadlock"))]
    DependencyDeadlock {
        /// Apps left unscheduled.
        stalled: Vec<String>,
    },

    /// An `after` entry names an app that is not in the plan.
    #[snafu(display("plan dependency deadlock: {app} depends on unknown app {dependency}"))]
    UnknownDependency { app: String, dependency: String },

    /// Two apps share a name.
    #[snafu(display("duplicate app name: {name}"))]
    DuplicateApp { name: String },

    /// An app has an empty name.
    #[snafu(display("app at index {index} has no name"))]
    MissingName { index: usize },

    /// The plan exceeds the app bound.
    #[snafu(display("plan has {count} apps, maximum is {max}"))]
    TooManyApps { count: usize, max: usize },
}

/// Failures of a service runtime.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum RuntimeError {
    /// The unit's process could not be spawned.
    #[snafu(display("failed to spawn {unit} ({program}): {source}"))]
    Spawn {
        unit: String,
        program: String,
        source: std::io::Error,
    },

    /// A runtime CLI exited unsuccessfully.
    #[snafu(display("{program} {action} {unit} failed: {detail}"))]
    Cli {
        program: String,
        action: String,
        unit: String,
        detail: String,
    },

    /// Runtime state output could not be parsed.
    #[snafu(display("failed to parse state of {unit}: {source}"))]
    ParseState { unit: String, source: serde_json::Error },
}

/// Failures of a pre-start build.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum BuildError {
    /// Neither a local node toolchain nor docker was found.
    #[snafu(display("no nextjs builder available (need node or docker on PATH)"))]
    NoBuilder,

    /// The build command could not be spawned.
    #[snafu(display("failed to run {command}: {source}"))]
    BuildSpawn { command: String, source: std::io::Error },

    /// The build command exited non-zero.
    #[snafu(display("{command} exited with {code:?}"))]
    BuildFailed { command: String, code: Option<i32> },
}

/// Why a single app failed to come up.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum AppError {
    #[snafu(display("build: {source}"))]
    Build { source: BuildError },

    #[snafu(display("ensure: {source}"))]
    Ensure { source: RuntimeError },

    #[snafu(display("health timeout: {url}"))]
    HealthTimeout { url: String },
}

/// Result of [`crate::Applier::apply`].
#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum ApplyError {
    /// Validation failed; nothing was started.
    #[snafu(display("{source}"))]
    InvalidPlan { source: PlanError },

    /// One app failed; apps before it stay running.
    #[snafu(display("{app}: {source}"))]
    AppFailed { app: String, source: AppError },
}

impl ApplyError {
    /// Taxonomy kind: `plan_invalid` or `apply_failed`.
    pub fn kind(&self) -> &'static str {
        match self {
            ApplyError::InvalidPlan { .. } => "plan_invalid",
            ApplyError::AppFailed { .. } => "apply_failed",
        }
    }
}

/// Plan template loading failures.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum TemplateError {
    /// No template by that name on the search path or built in.
    #[snafu(display("unknown plan template: {name}"))]
    UnknownTemplate { name: String },

    /// The template name contains path separators or is empty.
    #[snafu(display("invalid plan template name: {name:?}"))]
    InvalidName { name: String },

    #[snafu(display("failed to read plan template {path}: {source}"))]
    ReadTemplate { path: String, source: std::io::Error },

    #[snafu(display("failed to parse plan template {path}: {source}"))]
    ParseTemplate { path: String, source: serde_yaml::Error },
}
