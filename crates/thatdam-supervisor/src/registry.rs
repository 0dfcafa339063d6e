//! Agent registry.
//!
//! The supervisor owns every agent record. Mutations take the write lock;
//! snapshots take the read lock and copy out.
//!
//! Status lifecycle:
//!
//! ```text
//! register ──► registered ──heartbeat──► healthy ──TTL elapsed──► stale
//!                  ▲                        ▲                       │
//!                  └──────re-register───────┴───────heartbeat───────┘
//! ```

use std::collections::BTreeMap;
use std::collections::BTreeSet;
use std::collections::HashMap;
use std::sync::PoisonError;
use std::sync::RwLock;
use std::time::Duration;
use std::time::Instant;

use chrono::DateTime;
use chrono::Utc;
use serde::Deserialize;
use serde::Serialize;
use thatdam_constants::supervisor::MAX_AGENTS;
use thatdam_constants::supervisor::MAX_AGENT_META_ENTRIES;
use tracing::debug;

use crate::error::RegistryError;

/// Liveness of a registered agent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AgentStatus {
    Registered,
    Healthy,
    Stale,
}

/// Registry entry as returned by `GET /v1/nodes`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Agent {
    pub id: String,
    #[serde(default)]
    pub class: String,
    #[serde(default)]
    pub version: String,
    #[serde(default)]
    pub features: Vec<String>,
    pub status: AgentStatus,
    pub last_heartbeat: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub address: Option<String>,
    #[serde(default)]
    pub meta: BTreeMap<String, serde_json::Value>,
}

/// Fields a node supplies when registering.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Registration {
    pub id: String,
    pub class: String,
    pub version: String,
    pub features: Vec<String>,
    pub address: Option<String>,
    pub meta: BTreeMap<String, serde_json::Value>,
}

impl Registration {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            ..Default::default()
        }
    }
}

struct Entry {
    agent: Agent,
    seen: Instant,
}

pub struct AgentRegistry {
    agents: RwLock<HashMap<String, Entry>>,
    ttl: Duration,
    capacity: usize,
}

impl AgentRegistry {
    pub fn new(ttl: Duration) -> Self {
        Self::with_capacity(ttl, MAX_AGENTS)
    }

    pub fn with_capacity(ttl: Duration, capacity: usize) -> Self {
        Self {
            agents: RwLock::new(HashMap::new()),
            ttl,
            capacity,
        }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Insert or replace an agent; status resets to `registered`.
    pub fn register(&self, reg: Registration) -> Result<Agent, RegistryError> {
        check_meta(&reg.id, &reg.meta)?;
        let mut agents = self.agents.write().unwrap_or_else(PoisonError::into_inner);
        if !agents.contains_key(&reg.id) && agents.len() >= self.capacity {
            return Err(RegistryError::RegistryFull {
                count: agents.len(),
                max: self.capacity,
            });
        }
        let agent = Agent {
            id: reg.id.clone(),
            class: reg.class,
            version: reg.version,
            features: reg.features,
            status: AgentStatus::Registered,
            last_heartbeat: Utc::now(),
            address: reg.address,
            meta: reg.meta,
        };
        agents.insert(
            reg.id,
            Entry {
                agent: agent.clone(),
                seen: Instant::now(),
            },
        );
        debug!(agent = %agent.id, "agent registered");
        Ok(agent)
    }

    /// Mark `id` healthy and merge `meta` into its record.
    pub fn heartbeat(&self, id: &str, meta: BTreeMap<String, serde_json::Value>) -> Result<Agent, RegistryError> {
        let mut agents = self.agents.write().unwrap_or_else(PoisonError::into_inner);
        let entry = agents.get_mut(id).ok_or_else(|| RegistryError::UnknownAgent { id: id.to_string() })?;

        let merged = entry.agent.meta.keys().chain(meta.keys()).collect::<BTreeSet<_>>().len();
        if merged > MAX_AGENT_META_ENTRIES {
            return Err(RegistryError::TooMuchMeta {
                id: id.to_string(),
                count: merged,
                max: MAX_AGENT_META_ENTRIES,
            });
        }
        entry.agent.meta.extend(meta);
        entry.agent.status = AgentStatus::Healthy;
        entry.agent.last_heartbeat = Utc::now();
        entry.seen = Instant::now();
        Ok(entry.agent.clone())
    }

    /// Flip every `healthy` agent not heard from within the TTL to `stale`.
    ///
    /// Returns the ids that changed.
    pub fn mark_stale(&self) -> Vec<String> {
        self.mark_stale_at(Instant::now())
    }

    fn mark_stale_at(&self, now: Instant) -> Vec<String> {
        let mut agents = self.agents.write().unwrap_or_else(PoisonError::into_inner);
        let mut changed = Vec::new();
        for entry in agents.values_mut() {
            if entry.agent.status == AgentStatus::Healthy && now.saturating_duration_since(entry.seen) > self.ttl {
                entry.agent.status = AgentStatus::Stale;
                changed.push(entry.agent.id.clone());
            }
        }
        changed.sort();
        changed
    }

    pub fn get(&self, id: &str) -> Option<Agent> {
        let agents = self.agents.read().unwrap_or_else(PoisonError::into_inner);
        agents.get(id).map(|e| e.agent.clone())
    }

    /// Copy of every record, ordered by id.
    pub fn snapshot(&self) -> Vec<Agent> {
        let agents = self.agents.read().unwrap_or_else(PoisonError::into_inner);
        let mut out: Vec<Agent> = agents.values().map(|e| e.agent.clone()).collect();
        out.sort_by(|a, b| a.id.cmp(&b.id));
        out
    }

    pub fn len(&self) -> usize {
        self.agents.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

fn check_meta(id: &str, meta: &BTreeMap<String, serde_json::Value>) -> Result<(), RegistryError> {
    if meta.len() > MAX_AGENT_META_ENTRIES {
        return Err(RegistryError::TooMuchMeta {
            id: id.to_string(),
            count: meta.len(),
            max: MAX_AGENT_META_ENTRIES,
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn registry() -> AgentRegistry {
        AgentRegistry::new(Duration::from_secs(30))
    }

    #[test]
    fn test_register_then_heartbeat_is_healthy() {
        let reg = registry();
        let agent = reg.register(Registration::new("n1")).unwrap();
        assert_eq!(agent.status, AgentStatus::Registered);

        let agent = reg.heartbeat("n1", BTreeMap::from([("load".to_string(), json!(0.5))])).unwrap();
        assert_eq!(agent.status, AgentStatus::Healthy);
        assert_eq!(agent.meta["load"], json!(0.5));
    }

    #[test]
    fn test_heartbeat_unknown_agent() {
        let err = registry().heartbeat("ghost", BTreeMap::new()).unwrap_err();
        assert!(matches!(err, RegistryError::UnknownAgent { .. }));
    }

    #[test]
    fn test_stale_after_ttl_and_heartbeat_restores() {
        let reg = registry();
        reg.register(Registration::new("n1")).unwrap();
        reg.register(Registration::new("n2")).unwrap();
        reg.heartbeat("n1", BTreeMap::new()).unwrap();

        let later = Instant::now() + Duration::from_secs(31);
        assert_eq!(reg.mark_stale_at(later), vec!["n1".to_string()]);
        assert_eq!(reg.get("n1").unwrap().status, AgentStatus::Stale);
        // Registered agents are left alone.
        assert_eq!(reg.get("n2").unwrap().status, AgentStatus::Registered);

        reg.heartbeat("n1", BTreeMap::new()).unwrap();
        assert_eq!(reg.get("n1").unwrap().status, AgentStatus::Healthy);
    }

    #[test]
    fn test_fresh_heartbeat_is_not_stale() {
        let reg = registry();
        reg.register(Registration::new("n1")).unwrap();
        reg.heartbeat("n1", BTreeMap::new()).unwrap();
        assert!(reg.mark_stale().is_empty());
    }

    #[test]
    fn test_reregister_resets_status() {
        let reg = registry();
        reg.register(Registration::new("n1")).unwrap();
        reg.heartbeat("n1", BTreeMap::new()).unwrap();
        reg.register(Registration::new("n1")).unwrap();
        assert_eq!(reg.get("n1").unwrap().status, AgentStatus::Registered);
        assert_eq!(reg.len(), 1);
    }

    #[test]
    fn test_capacity_bound() {
        let reg = AgentRegistry::with_capacity(Duration::from_secs(30), 1);
        reg.register(Registration::new("n1")).unwrap();
        assert!(matches!(reg.register(Registration::new("n2")), Err(RegistryError::RegistryFull { .. })));
        // Re-registering an existing id is still allowed.
        reg.register(Registration::new("n1")).unwrap();
    }

    #[test]
    fn test_snapshot_sorted() {
        let reg = registry();
        for id in ["c", "a", "b"] {
            reg.register(Registration::new(id)).unwrap();
        }
        let ids: Vec<String> = reg.snapshot().into_iter().map(|a| a.id).collect();
        assert_eq!(ids, ["a", "b", "c"]);
    }
}
