//! Lifecycle events published on the bus.

use serde::Serialize;
use thatdam_bus::BusHandle;
use tracing::warn;

use crate::registry::Agent;

#[derive(Serialize)]
struct AgentEvent<'a> {
    action: &'a str,
    agent: &'a Agent,
}

/// Publishes `<prefix>.<action>` with payload `{action, agent}`.
#[derive(Debug, Clone)]
pub struct EventPublisher {
    bus: BusHandle,
    prefix: String,
}

impl EventPublisher {
    pub fn new(bus: BusHandle, prefix: impl Into<String>) -> Self {
        Self {
            bus,
            prefix: prefix.into(),
        }
    }

    pub fn topic(&self, action: &str) -> String {
        format!("{}.{action}", self.prefix)
    }

    /// Publish after the state change it describes. Failures are logged only.
    pub async fn agent(&self, action: &str, agent: &Agent) {
        let topic = self.topic(action);
        if let Err(e) = self.bus.publish(&topic, &AgentEvent { action, agent }).await {
            warn!(topic = %topic, agent = %agent.id, error = %e, "event publish failed");
        }
    }

    pub fn bus(&self) -> &BusHandle {
        &self.bus
    }
}
