//! Tenancy planner.
//!
//! [`plan_for`] is a pure function from a runtime profile and the observed
//! cluster size to the storage and queue shape tenants get. Node count maps
//! to a tier:
//!
//! | nodes | tier  | storage             | queue replicas | quorum |
//! |-------|-------|---------------------|----------------|--------|
//! | <= 1  | Solo  | fs, 1 x 1           | 1              | no     |
//! | 2     | Party | distributed, 2 x 2  | 2              | no     |
//! | 3     | Guild | distributed, 3 x 2  | 3              | yes    |
//! | >= 4  | Realm | distributed, n x 2  | 3              | yes    |
//!
//! TLS is enforced for every profile except `dev`.

use std::fmt;
use std::str::FromStr;

use serde::Deserialize;
use serde::Serialize;
use thiserror::Error;

/// Runtime stance of a deployment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TenancyProfile {
    Dev,
    Edge,
    Prod,
}

impl TenancyProfile {
    pub fn as_str(&self) -> &'static str {
        match self {
            TenancyProfile::Dev => "dev",
            TenancyProfile::Edge => "edge",
            TenancyProfile::Prod => "prod",
        }
    }
}

impl fmt::Display for TenancyProfile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown profile {0:?} (expected dev, edge or prod)")]
pub struct ParseProfileError(pub String);

impl FromStr for TenancyProfile {
    type Err = ParseProfileError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "dev" => Ok(TenancyProfile::Dev),
            "edge" => Ok(TenancyProfile::Edge),
            "prod" => Ok(TenancyProfile::Prod),
            other => Err(ParseProfileError(other.to_string())),
        }
    }
}

/// Observed capacity.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClusterState {
    #[serde(default)]
    pub nodes: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Achievement {
    Solo,
    Party,
    Guild,
    Realm,
}

impl Achievement {
    pub fn for_nodes(nodes: u32) -> Self {
        match nodes {
            0 | 1 => Achievement::Solo,
            2 => Achievement::Party,
            3 => Achievement::Guild,
            _ => Achievement::Realm,
        }
    }

    pub fn title(&self) -> &'static str {
        match self {
            Achievement::Solo => "Single-node development mode.",
            Achievement::Party => "Distributed storage unlocked; limited HA queues.",
            Achievement::Guild => "Consensus achieved; production-grade queues.",
            Achievement::Realm => "High availability at scale; multi-pool storage.",
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AchievementCapabilities {
    pub distributed_storage: bool,
    pub quorum_queues: bool,
    pub tls_enforced: bool,
    pub audit_streaming: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AchievementInfo {
    pub code: Achievement,
    pub title: String,
    pub capabilities: AchievementCapabilities,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoragePlan {
    /// `fs` or `distributed`.
    pub mode: String,
    pub servers: u32,
    pub volumes_per_server: u32,
    pub versioning: bool,
    pub require_tls: bool,
    pub audit_hook: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueuePlan {
    pub replicas: u32,
    pub quorum: bool,
    pub require_tls: bool,
    pub dlx_per_tenant: bool,
    pub tracing_to_audit: bool,
}

/// Storage and queue expectations for a profile at a cluster size.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TenancyPlan {
    pub profile: TenancyProfile,
    pub achievement: AchievementInfo,
    pub storage: StoragePlan,
    pub queue: QueuePlan,
    pub require_tls: bool,
}

/// Compute the tenancy plan. Total, deterministic and side-effect free.
pub fn plan_for(profile: TenancyProfile, cluster: ClusterState) -> TenancyPlan {
    let code = Achievement::for_nodes(cluster.nodes);
    let require_tls = profile != TenancyProfile::Dev;

    let (mode, servers, volumes_per_server, replicas) = match code {
        Achievement::Solo => ("fs", 1, 1, 1),
        Achievement::Party => ("distributed", 2, 2, 2),
        Achievement::Guild => ("distributed", 3, 2, 3),
        Achievement::Realm => ("distributed", cluster.nodes.max(4), 2, 3),
    };
    // Quorum queues need at least three replicas to form a majority.
    let quorum = matches!(code, Achievement::Guild | Achievement::Realm) && replicas >= 3;

    let distributed = code != Achievement::Solo;
    TenancyPlan {
        profile,
        achievement: AchievementInfo {
            code,
            title: code.title().to_string(),
            capabilities: AchievementCapabilities {
                distributed_storage: distributed,
                quorum_queues: quorum,
                tls_enforced: require_tls,
                audit_streaming: true,
            },
        },
        storage: StoragePlan {
            mode: mode.to_string(),
            servers,
            volumes_per_server,
            versioning: true,
            require_tls,
            audit_hook: true,
        },
        queue: QueuePlan {
            replicas,
            quorum,
            require_tls,
            dlx_per_tenant: true,
            tracing_to_audit: true,
        },
        require_tls,
    }
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;

    use super::*;

    fn nodes(n: u32) -> ClusterState {
        ClusterState { nodes: n }
    }

    #[test]
    fn test_dev_single_node_is_solo() {
        let plan = plan_for(TenancyProfile::Dev, nodes(1));
        assert_eq!(plan.achievement.code, Achievement::Solo);
        assert_eq!(plan.achievement.title, "Single-node development mode.");
        assert_eq!((plan.storage.mode.as_str(), plan.storage.servers, plan.storage.volumes_per_server), ("fs", 1, 1));
        assert!(!plan.queue.quorum);
        assert!(!plan.require_tls);
        assert!(!plan.achievement.capabilities.tls_enforced);
    }

    #[test]
    fn test_prod_three_nodes_is_guild() {
        let plan = plan_for(TenancyProfile::Prod, nodes(3));
        assert_eq!(plan.achievement.code, Achievement::Guild);
        assert_eq!(
            (plan.storage.mode.as_str(), plan.storage.servers, plan.storage.volumes_per_server),
            ("distributed", 3, 2)
        );
        assert_eq!(plan.queue.replicas, 3);
        assert!(plan.queue.quorum);
        assert!(plan.require_tls);
        assert!(plan.storage.require_tls && plan.queue.require_tls);
    }

    #[test]
    fn test_prod_five_nodes_is_realm() {
        let plan = plan_for(TenancyProfile::Prod, nodes(5));
        assert_eq!(plan.achievement.code, Achievement::Realm);
        assert_eq!(
            (plan.storage.mode.as_str(), plan.storage.servers, plan.storage.volumes_per_server),
            ("distributed", 5, 2)
        );
        assert_eq!(plan.queue.replicas, 3);
        assert!(plan.queue.quorum);
    }

    #[test]
    fn test_party_has_no_quorum() {
        let plan = plan_for(TenancyProfile::Edge, nodes(2));
        assert_eq!(plan.achievement.code, Achievement::Party);
        assert_eq!(plan.queue.replicas, 2);
        assert!(!plan.queue.quorum);
        assert!(plan.achievement.capabilities.distributed_storage);
        assert!(plan.require_tls);
    }

    #[test]
    fn test_zero_nodes_is_solo() {
        assert_eq!(plan_for(TenancyProfile::Dev, nodes(0)).achievement.code, Achievement::Solo);
    }

    #[test]
    fn test_profile_parse_and_display() {
        assert_eq!("edge".parse::<TenancyProfile>().unwrap(), TenancyProfile::Edge);
        assert!("staging".parse::<TenancyProfile>().is_err());
        assert_eq!(TenancyProfile::Prod.to_string(), "prod");
    }

    #[test]
    fn test_plan_wire_shape() {
        let json = serde_json::to_value(plan_for(TenancyProfile::Prod, nodes(3))).unwrap();
        assert_eq!(json["profile"], "prod");
        assert_eq!(json["achievement"]["code"], "Guild");
        assert_eq!(json["achievement"]["capabilities"]["quorum_queues"], true);
        assert_eq!(json["storage"]["mode"], "distributed");
    }

    fn any_profile() -> impl Strategy<Value = TenancyProfile> {
        prop_oneof![Just(TenancyProfile::Dev), Just(TenancyProfile::Edge), Just(TenancyProfile::Prod)]
    }

    proptest! {
        #[test]
        fn prop_plan_is_pure(profile in any_profile(), n in 0u32..64) {
            prop_assert_eq!(plan_for(profile, nodes(n)), plan_for(profile, nodes(n)));
        }

        #[test]
        fn prop_small_clusters_never_quorum(profile in any_profile(), n in 0u32..3) {
            let plan = plan_for(profile, nodes(n));
            prop_assert!(!plan.queue.quorum);
            prop_assert!(!plan.achievement.capabilities.quorum_queues);
        }

        #[test]
        fn prop_quorum_implies_three_replicas(profile in any_profile(), n in 0u32..1000) {
            let plan = plan_for(profile, nodes(n));
            prop_assert!(!plan.queue.quorum || plan.queue.replicas >= 3);
            prop_assert_eq!(plan.require_tls, profile != TenancyProfile::Dev);
        }

        #[test]
        fn prop_realm_servers_track_nodes(n in 4u32..1000) {
            prop_assert_eq!(plan_for(TenancyProfile::Prod, nodes(n)).storage.servers, n);
        }
    }
}
