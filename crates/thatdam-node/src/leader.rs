//! What a node does once it elects itself leader.
//!
//! [`StandardDuties`] optionally takes a bus lease, advertises the node
//! over mDNS and starts an embedded supervisor the node then registers
//! with. Everything is undone by [`LeaderDuties::resign`].

use std::sync::Arc;

use async_trait::async_trait;
use thatdam_auth::TokenIssuer;
use thatdam_bus::BusHandle;
use thatdam_bus::LeaderLease;
use thatdam_bus::LeaseKeeper;
use thatdam_constants::network::SUPERVISOR_PORT;
use thatdam_policy::PolicyEngine;
use thatdam_supervisor::SupervisorConfig;
use thatdam_supervisor::SupervisorServer;
use thatdam_supervisor::SupervisorState;
use tokio::sync::watch;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::info;
use tracing::warn;

use crate::client::Credential;
use crate::discovery::MdnsAdvertiser;
use crate::error::NodeError;
use crate::state::ClusterRecord;

/// Ring used for the leadership lease.
pub const DEFAULT_LEASE_RING: &str = "default";

/// A supervisor this node is now serving, and how to talk to it.
#[derive(Debug, Clone)]
pub struct LocalSupervisor {
    pub url: String,
    pub credential: Credential,
}

/// Result of taking up leadership.
#[derive(Debug, Default)]
pub struct Leadership {
    /// Set when the node now hosts the supervisor.
    pub supervisor: Option<LocalSupervisor>,
    /// Flips to `false` when a held lease is lost.
    pub lease: Option<watch::Receiver<bool>>,
}

#[async_trait]
pub trait LeaderDuties: Send + Sync {
    /// Take up leadership. An error means another node holds it.
    async fn elect(&self, record: &ClusterRecord) -> Result<Leadership, NodeError>;

    /// Give up everything `elect` started.
    async fn resign(&self);
}

/// No duties: a leader that only re-runs discovery.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoDuties;

#[async_trait]
impl LeaderDuties for NoDuties {
    async fn elect(&self, _record: &ClusterRecord) -> Result<Leadership, NodeError> {
        Ok(Leadership::default())
    }

    async fn resign(&self) {}
}

/// Embedded supervisor started on election.
pub struct HostedSupervisor {
    config: SupervisorConfig,
    issuer: Arc<TokenIssuer>,
    bus: BusHandle,
    policy: Option<Arc<dyn PolicyEngine>>,
}

impl HostedSupervisor {
    /// The node authenticates against its own supervisor with an API key;
    /// one is generated when the config has none.
    pub fn new(mut config: SupervisorConfig, issuer: Arc<TokenIssuer>, bus: BusHandle) -> Self {
        if config.api_key.is_none() {
            let key: [u8; 24] = rand::random();
            config.api_key = Some(hex::encode(key));
        }
        Self {
            config,
            issuer,
            bus,
            policy: None,
        }
    }

    pub fn with_policy(mut self, policy: Arc<dyn PolicyEngine>) -> Self {
        self.policy = Some(policy);
        self
    }

    pub fn port(&self) -> u16 {
        self.config
            .listen
            .rsplit_once(':')
            .and_then(|(_, p)| p.parse().ok())
            .unwrap_or(SUPERVISOR_PORT)
    }

    async fn start(&self, parent: &CancellationToken) -> Result<(SupervisorServer, LocalSupervisor), NodeError> {
        let mut state = SupervisorState::new(self.config.clone(), self.issuer.clone(), self.bus.clone());
        if let Some(policy) = &self.policy {
            state = state.with_policy(policy.clone());
        }
        let server = SupervisorServer::bind(&self.config.listen, Arc::new(state), parent)
            .await
            .map_err(|source| NodeError::HostSupervisor { source })?;
        let credential = self.config.api_key.clone().map(Credential::ApiKey).unwrap_or_default();
        let local = LocalSupervisor {
            url: server.url(),
            credential,
        };
        Ok((server, local))
    }
}

impl std::fmt::Debug for HostedSupervisor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HostedSupervisor").field("listen", &self.config.listen).finish_non_exhaustive()
    }
}

#[derive(Default)]
struct Active {
    keeper: Option<LeaseKeeper>,
    advertiser: Option<MdnsAdvertiser>,
    server: Option<SupervisorServer>,
}

/// Lease, mDNS advertisement and embedded supervisor, each optional.
pub struct StandardDuties {
    advertise: bool,
    host: Option<HostedSupervisor>,
    lease: Option<Arc<dyn LeaderLease>>,
    ring: String,
    cancel: CancellationToken,
    active: Mutex<Active>,
}

impl StandardDuties {
    pub fn new(parent: &CancellationToken) -> Self {
        Self {
            advertise: false,
            host: None,
            lease: None,
            ring: DEFAULT_LEASE_RING.to_string(),
            cancel: parent.child_token(),
            active: Mutex::new(Active::default()),
        }
    }

    pub fn with_mdns(mut self, advertise: bool) -> Self {
        self.advertise = advertise;
        self
    }

    pub fn with_hosted_supervisor(mut self, host: HostedSupervisor) -> Self {
        self.host = Some(host);
        self
    }

    pub fn with_lease(mut self, lease: Arc<dyn LeaderLease>, ring: impl Into<String>) -> Self {
        self.lease = Some(lease);
        self.ring = ring.into();
        self
    }

    fn advertised_port(&self) -> u16 {
        self.host.as_ref().map_or(SUPERVISOR_PORT, HostedSupervisor::port)
    }
}

#[async_trait]
impl LeaderDuties for StandardDuties {
    async fn elect(&self, record: &ClusterRecord) -> Result<Leadership, NodeError> {
        let mut active = self.active.lock().await;
        let mut leadership = Leadership::default();

        if let Some(lease) = &self.lease {
            let acquired = lease
                .acquire(&self.ring, &record.node_id)
                .await
                .map_err(|source| NodeError::Bus { source })?;
            if !acquired {
                return Err(NodeError::Leadership {
                    reason: format!("lease for ring {} is held elsewhere", self.ring),
                });
            }
            let keeper = LeaseKeeper::spawn(lease.clone(), &self.ring, &record.node_id, &self.cancel);
            leadership.lease = Some(keeper.watch());
            active.keeper = Some(keeper);
        }

        if let Some(host) = &self.host {
            if let Some(server) = active.server.as_ref() {
                leadership.supervisor = Some(LocalSupervisor {
                    url: server.url(),
                    credential: host.config.api_key.clone().map(Credential::ApiKey).unwrap_or_default(),
                });
            } else {
                let (server, local) = host.start(&self.cancel).await?;
                info!(url = %local.url, "hosting supervisor");
                leadership.supervisor = Some(local);
                active.server = Some(server);
            }
        }

        if self.advertise && active.advertiser.is_none() {
            match MdnsAdvertiser::start(&record.node_id, self.advertised_port()) {
                Ok(advertiser) => active.advertiser = Some(advertiser),
                Err(e) => warn!(error = %e, "mdns advertisement failed"),
            }
        }

        Ok(leadership)
    }

    async fn resign(&self) {
        let mut active = self.active.lock().await;
        if let Some(mut keeper) = active.keeper.take() {
            keeper.shutdown().await;
        }
        active.advertiser.take();
        if let Some(server) = active.server.take() {
            server.shutdown().await;
        }
        info!("resigned leadership");
    }
}

impl std::fmt::Debug for StandardDuties {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StandardDuties")
            .field("advertise", &self.advertise)
            .field("host", &self.host)
            .field("lease", &self.lease.is_some())
            .field("ring", &self.ring)
            .finish()
    }
}
