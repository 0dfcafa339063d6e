//! Declared state for the reconcilers.

use std::collections::BTreeMap;

use serde::Deserialize;
use serde::Serialize;

use crate::ports::Binding;
use crate::ports::ClassSpec;
use crate::ports::Exchange;
use crate::ports::LifecycleRule;
use crate::ports::Queue;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StorageBucket {
    pub name: String,
    #[serde(default)]
    pub versioned: bool,
    #[serde(default)]
    pub lifecycle: Vec<LifecycleRule>,
    #[serde(default)]
    pub tags: BTreeMap<String, String>,
}

impl StorageBucket {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BrokerSpec {
    #[serde(default)]
    pub exchanges: Vec<Exchange>,
    #[serde(default)]
    pub queues: Vec<Queue>,
    #[serde(default)]
    pub bindings: Vec<Binding>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexSpec {
    #[serde(default)]
    pub classes: Vec<ClassSpec>,
}

/// Everything one reconcile pass converges.
///
/// Declaring the same element twice is harmless.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Profile {
    #[serde(default)]
    pub storage: Vec<StorageBucket>,
    #[serde(default)]
    pub broker: BrokerSpec,
    #[serde(default)]
    pub index: IndexSpec,
}
