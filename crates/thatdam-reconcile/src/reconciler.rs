//! Reconcilers: declared state in, idempotent port calls out.
//!
//! Each reconciler keeps going after a failed element and returns every
//! failure joined. [`Reconciler::apply`] runs storage, then broker, then
//! index, and joins across all three.

use std::sync::Arc;

use tracing::debug;
use tracing::info;
use tracing::warn;

use crate::error::PortError;
use crate::error::ReconcileError;
use crate::ports::EventBus;
use crate::ports::ObjectStorage;
use crate::ports::VectorIndex;
use crate::profile::BrokerSpec;
use crate::profile::IndexSpec;
use crate::profile::Profile;
use crate::profile::StorageBucket;

fn step_error(target: &str, step: &'static str, source: PortError) -> ReconcileError {
    warn!(target_name = %target, step, error = %source, "reconcile step failed");
    ReconcileError::Step {
        target: target.to_string(),
        step,
        source,
    }
}

/// Buckets: existence, then versioning, lifecycle and tags.
#[derive(Clone)]
pub struct StorageReconciler {
    store: Arc<dyn ObjectStorage>,
}

impl StorageReconciler {
    pub fn new(store: Arc<dyn ObjectStorage>) -> Self {
        Self { store }
    }

    pub async fn apply(&self, buckets: &[StorageBucket]) -> Result<(), ReconcileError> {
        let mut errors = Vec::new();
        for bucket in buckets {
            let name = bucket.name.as_str();
            if let Err(e) = self.store.ensure_bucket(name).await {
                errors.push(step_error(name, "ensure bucket", e));
                continue;
            }
            if let Err(e) = self.store.ensure_versioning(name, bucket.versioned).await {
                errors.push(step_error(name, "versioning", e));
                continue;
            }
            if let Err(e) = self.store.ensure_lifecycle(name, &bucket.lifecycle).await {
                errors.push(step_error(name, "lifecycle", e));
                continue;
            }
            if let Err(e) = self.store.ensure_tags(name, &bucket.tags).await {
                errors.push(step_error(name, "tags", e));
                continue;
            }
            debug!(bucket = name, "bucket reconciled");
        }
        ReconcileError::join(errors)
    }
}

/// Broker topology: exchanges, queues, then bindings.
#[derive(Clone)]
pub struct BrokerReconciler {
    bus: Arc<dyn EventBus>,
}

impl BrokerReconciler {
    pub fn new(bus: Arc<dyn EventBus>) -> Self {
        Self { bus }
    }

    pub async fn apply(&self, spec: &BrokerSpec) -> Result<(), ReconcileError> {
        let mut errors = Vec::new();
        for exchange in &spec.exchanges {
            if let Err(e) = self.bus.ensure_exchange(exchange).await {
                errors.push(step_error(&exchange.name, "exchange", e));
            }
        }
        for queue in &spec.queues {
            if let Err(e) = self.bus.ensure_queue(queue).await {
                errors.push(step_error(&queue.name, "queue", e));
            }
        }
        for binding in &spec.bindings {
            if let Err(e) = self.bus.ensure_binding(binding).await {
                let target = format!("{}->{}", binding.exchange, binding.queue);
                errors.push(step_error(&target, "binding", e));
            }
        }
        ReconcileError::join(errors)
    }
}

/// Vector classes, then their properties.
#[derive(Clone)]
pub struct IndexReconciler {
    index: Arc<dyn VectorIndex>,
}

impl IndexReconciler {
    pub fn new(index: Arc<dyn VectorIndex>) -> Self {
        Self { index }
    }

    pub async fn apply(&self, spec: &IndexSpec) -> Result<(), ReconcileError> {
        let mut errors = Vec::new();
        for class in &spec.classes {
            if let Err(e) = self.index.ensure_class(class).await {
                errors.push(step_error(&class.name, "class", e));
                continue;
            }
            if class.properties.is_empty() {
                continue;
            }
            if let Err(e) = self.index.ensure_properties(&class.name, &class.properties).await {
                errors.push(step_error(&class.name, "properties", e));
            }
        }
        ReconcileError::join(errors)
    }
}

/// Runs the three reconcilers in order and joins their failures.
#[derive(Clone)]
pub struct Reconciler {
    storage: StorageReconciler,
    broker: BrokerReconciler,
    index: IndexReconciler,
}

impl Reconciler {
    pub fn new(storage: StorageReconciler, broker: BrokerReconciler, index: IndexReconciler) -> Self {
        Self { storage, broker, index }
    }

    /// One full pass. Later stages run even when earlier ones fail.
    pub async fn apply(&self, profile: &Profile) -> Result<(), ReconcileError> {
        let mut errors = Vec::new();
        if let Err(e) = self.storage.apply(&profile.storage).await {
            errors.push(e);
        }
        if let Err(e) = self.broker.apply(&profile.broker).await {
            errors.push(e);
        }
        if let Err(e) = self.index.apply(&profile.index).await {
            errors.push(e);
        }
        let result = ReconcileError::join(errors);
        match &result {
            Ok(()) => info!(
                buckets = profile.storage.len(),
                queues = profile.broker.queues.len(),
                classes = profile.index.classes.len(),
                "profile reconciled"
            ),
            Err(e) => warn!(error = %e, "profile reconciled with errors"),
        }
        result
    }
}
