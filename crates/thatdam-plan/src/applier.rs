//! Drives a node toward a [`DesiredPlan`].
//!
//! The dependency graph is validated before anything is started, so an
//! invalid plan never reaches the runtime. Each app is then built, ensured
//! and health-gated in [`order_apps`] order. The first failing app aborts
//! the apply; apps already started stay up for the next cycle.
//!
//! Cancellation is by dropping the returned future.

use std::sync::Arc;

use async_trait::async_trait;
use serde::Serialize;
use tracing::info;
use tracing::warn;

use crate::build::AppBuilder;
use crate::build::NextjsBuilder;
use crate::error::AppError;
use crate::error::ApplyError;
use crate::graph::order_apps;
use crate::health::poll_window;
use crate::health::wait_healthy;
use crate::health::HealthProbe;
use crate::health::HttpHealthProbe;
use crate::model::DesiredPlan;
use crate::runtime::RuntimeRegistry;
use crate::runtime::ServiceRuntime;
use crate::runtime::UnitSpec;

/// Outcome of a successful apply.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ApplyReport {
    pub version: u64,
    /// App names in the order they were brought up.
    pub started: Vec<String>,
}

/// Anything that can apply a plan. The node handshake depends on this.
#[async_trait]
pub trait PlanApplier: Send + Sync {
    async fn apply(&self, plan: &DesiredPlan) -> Result<ApplyReport, ApplyError>;
}

/// Default applier: runtime per executor, Next.js builder, HTTP health gate.
#[derive(Clone)]
pub struct Applier {
    runtimes: RuntimeRegistry,
    builder: Arc<dyn AppBuilder>,
    probe: Arc<dyn HealthProbe>,
}

impl Applier {
    /// Use `runtime` for every executor.
    pub fn new(runtime: Arc<dyn ServiceRuntime>) -> Self {
        Self::with_registry(RuntimeRegistry::single(runtime))
    }

    /// Host runtimes selected by plan executor.
    pub fn host() -> Self {
        Self::with_registry(RuntimeRegistry::host())
    }

    pub fn with_registry(runtimes: RuntimeRegistry) -> Self {
        Self {
            runtimes,
            builder: Arc::new(NextjsBuilder::detect()),
            probe: Arc::new(HttpHealthProbe::new()),
        }
    }

    pub fn with_builder(mut self, builder: Arc<dyn AppBuilder>) -> Self {
        self.builder = builder;
        self
    }

    pub fn with_probe(mut self, probe: Arc<dyn HealthProbe>) -> Self {
        self.probe = probe;
        self
    }

    /// Validate, then bring up every app in dependency order.
    pub async fn apply(&self, plan: &DesiredPlan) -> Result<ApplyReport, ApplyError> {
        let ordered = order_apps(&plan.apps).map_err(|source| ApplyError::InvalidPlan { source })?;
        let runtime = self.runtimes.get(plan.executor);
        info!(version = plan.version, node = %plan.node, executor = %plan.executor, apps = ordered.len(), "applying plan");

        let mut report = ApplyReport {
            version: plan.version,
            started: Vec::with_capacity(ordered.len()),
        };
        for app in ordered {
            let fail = |source: AppError| {
                warn!(app = %app.name, error = %source, "app failed");
                ApplyError::AppFailed {
                    app: app.name.clone(),
                    source,
                }
            };

            if app.needs_nextjs_build() {
                self.builder.build(app).await.map_err(|source| fail(AppError::Build { source }))?;
            }

            runtime
                .ensure(&UnitSpec::from(app))
                .await
                .map_err(|source| fail(AppError::Ensure { source }))?;

            if let Some(check) = app.http_health() {
                let (interval, timeout) = poll_window(check);
                if !wait_healthy(self.probe.as_ref(), &check.http, interval, timeout).await {
                    return Err(fail(AppError::HealthTimeout { url: check.http.clone() }));
                }
            }

            info!(app = %app.name, "app ready");
            report.started.push(app.name.clone());
        }
        Ok(report)
    }
}

#[async_trait]
impl PlanApplier for Applier {
    async fn apply(&self, plan: &DesiredPlan) -> Result<ApplyReport, ApplyError> {
        Applier::apply(self, plan).await
    }
}

impl std::fmt::Debug for Applier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Applier").field("runtimes", &self.runtimes).finish_non_exhaustive()
    }
}
