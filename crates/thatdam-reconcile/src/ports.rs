//! Ports the reconcilers drive.
//!
//! Every `ensure_*` call must be idempotent: repeating it with the same
//! argument converges to the same state and succeeds.

use std::collections::BTreeMap;

use async_trait::async_trait;
use serde::Deserialize;
use serde::Serialize;
use tokio::sync::mpsc;

use crate::error::PortError;

/// Object expiry rule for a bucket.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LifecycleRule {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub prefix: String,
    #[serde(default)]
    pub expire_days: u32,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Exchange {
    pub name: String,
    /// `topic`, `fanout`, `direct` or `headers`.
    #[serde(rename = "type", default)]
    pub kind: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Queue {
    pub name: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Binding {
    pub exchange: String,
    pub queue: String,
    #[serde(default)]
    pub key: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PropertySpec {
    pub name: String,
    #[serde(rename = "type", default)]
    pub data_type: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClassSpec {
    pub name: String,
    #[serde(default)]
    pub properties: Vec<PropertySpec>,
}

/// Metadata stored alongside a vector.
pub type VectorMeta = BTreeMap<String, String>;

type CancelFn = Box<dyn FnOnce() + Send + Sync>;

/// Bounded message stream for one queue.
///
/// Dropping or cancelling the subscription detaches it from the bus.
pub struct Subscription {
    receiver: mpsc::Receiver<Vec<u8>>,
    cancel: Option<CancelFn>,
}

impl Subscription {
    pub fn new(receiver: mpsc::Receiver<Vec<u8>>, cancel: impl FnOnce() + Send + Sync + 'static) -> Self {
        Self {
            receiver,
            cancel: Some(Box::new(cancel)),
        }
    }

    /// Next message, or `None` once detached.
    pub async fn recv(&mut self) -> Option<Vec<u8>> {
        self.receiver.recv().await
    }

    pub fn try_recv(&mut self) -> Option<Vec<u8>> {
        self.receiver.try_recv().ok()
    }

    /// Detach from the bus.
    pub fn cancel(mut self) {
        if let Some(cancel) = self.cancel.take() {
            cancel();
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(cancel) = self.cancel.take() {
            cancel();
        }
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription").field("active", &self.cancel.is_some()).finish()
    }
}

#[async_trait]
pub trait ObjectStorage: Send + Sync {
    async fn ensure_bucket(&self, name: &str) -> Result<(), PortError>;
    async fn ensure_versioning(&self, name: &str, enabled: bool) -> Result<(), PortError>;
    async fn ensure_lifecycle(&self, name: &str, rules: &[LifecycleRule]) -> Result<(), PortError>;
    async fn ensure_tags(&self, name: &str, tags: &BTreeMap<String, String>) -> Result<(), PortError>;
}

#[async_trait]
pub trait EventBus: Send + Sync {
    async fn ensure_exchange(&self, exchange: &Exchange) -> Result<(), PortError>;
    async fn ensure_queue(&self, queue: &Queue) -> Result<(), PortError>;
    async fn ensure_binding(&self, binding: &Binding) -> Result<(), PortError>;

    /// Best-effort delivery to every queue routed by `topic`.
    async fn publish(&self, topic: &str, body: &[u8], message_id: &str) -> Result<(), PortError>;

    /// Attach to a declared queue.
    async fn subscribe(&self, queue: &str) -> Result<Subscription, PortError>;
}

#[async_trait]
pub trait VectorIndex: Send + Sync {
    async fn ensure_class(&self, class: &ClassSpec) -> Result<(), PortError>;

    /// Add properties missing from `class`. Existing properties are untouched.
    async fn ensure_properties(&self, class: &str, properties: &[PropertySpec]) -> Result<(), PortError>;

    async fn upsert_vector(
        &self,
        class: &str,
        id: &str,
        vector: &[f32],
        meta: Option<&VectorMeta>,
    ) -> Result<(), PortError>;
}


#[async_trait]
impl<T: ObjectStorage + ?Sized> ObjectStorage for std::sync::Arc<T> {
    async fn ensure_bucket(&self, name: &str) -> Result<(), PortError> {
        (**self).ensure_bucket(name).await
    }

    async fn ensure_versioning(&self, name: &str, enabled: bool) -> Result<(), PortError> {
        (**self).ensure_versioning(name, enabled).await
    }

    async fn ensure_lifecycle(&self, name: &str, rules: &[LifecycleRule]) -> Result<(), PortError> {
        (**self).ensure_lifecycle(name, rules).await
    }

    async fn ensure_tags(&self, name: &str, tags: &BTreeMap<String, String>) -> Result<(), PortError> {
        (**self).ensure_tags(name, tags).await
    }
}

#[async_trait]
impl<T: EventBus + ?Sized> EventBus for std::sync::Arc<T> {
    async fn ensure_exchange(&self, exchange: &Exchange) -> Result<(), PortError> {
        (**self).ensure_exchange(exchange).await
    }

    async fn ensure_queue(&self, queue: &Queue) -> Result<(), PortError> {
        (**self).ensure_queue(queue).await
    }

    async fn ensure_binding(&self, binding: &Binding) -> Result<(), PortError> {
        (**self).ensure_binding(binding).await
    }

    async fn publish(&self, topic: &str, body: &[u8], message_id: &str) -> Result<(), PortError> {
        (**self).publish(topic, body, message_id).await
    }

    async fn subscribe(&self, queue: &str) -> Result<Subscription, PortError> {
        (**self).subscribe(queue).await
    }
}

#[async_trait]
impl<T: VectorIndex + ?Sized> VectorIndex for std::sync::Arc<T> {
    async fn ensure_class(&self, class: &ClassSpec) -> Result<(), PortError> {
        (**self).ensure_class(class).await
    }

    async fn ensure_properties(&self, class: &str, properties: &[PropertySpec]) -> Result<(), PortError> {
        (**self).ensure_properties(class, properties).await
    }

    async fn upsert_vector(
        &self,
        class: &str,
        id: &str,
        vector: &[f32],
        meta: Option<&VectorMeta>,
    ) -> Result<(), PortError> {
        (**self).upsert_vector(class, id, vector, meta).await
    }
}
