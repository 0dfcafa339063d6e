//! Desired-state plans and the applier that drives a node toward them.
//!
//! A [`DesiredPlan`] lists apps with `after` dependencies. The [`Applier`]
//! validates the dependency graph up front, then builds, starts and
//! health-gates each app in a stable topological order through a
//! [`ServiceRuntime`].
//!
//! # Modules
//!
//! - [`model`]: Plan, app, health and build records
//! - [`graph`]: Dependency validation and ordering
//! - [`runtime`]: `ServiceRuntime` port with exec, docker and namespace adapters
//! - [`build`]: Next.js builder with local and containerised toolchains
//! - [`health`]: HTTP health gate
//! - [`applier`]: The apply loop
//! - [`template`]: YAML plan templates
//! - [`generation`]: Content hash used to skip drift-free applies

pub mod applier;
pub mod build;
pub mod error;
pub mod generation;
pub mod graph;
pub mod health;
pub mod model;
pub mod runtime;
pub mod template;

pub use applier::Applier;
pub use applier::ApplyReport;
pub use applier::PlanApplier;
pub use build::AppBuilder;
pub use build::NextjsBuilder;
pub use error::AppError;
pub use error::ApplyError;
pub use error::BuildError;
pub use error::PlanError;
pub use error::RuntimeError;
pub use error::TemplateError;
pub use generation::plan_generation;
pub use graph::order_apps;
pub use health::HealthProbe;
pub use health::HttpHealthProbe;
pub use model::AppSpec;
pub use model::BuildKind;
pub use model::BuildSpec;
pub use model::DesiredPlan;
pub use model::Executor;
pub use model::HealthCheck;
pub use model::RestartPolicy;
pub use runtime::DockerRuntime;
pub use runtime::ExecRuntime;
pub use runtime::NsRuntime;
pub use runtime::RuntimeRegistry;
pub use runtime::ServiceRuntime;
pub use runtime::UnitSpec;
pub use runtime::UnitState;
pub use template::PlanTemplate;
pub use template::PlanTemplates;
