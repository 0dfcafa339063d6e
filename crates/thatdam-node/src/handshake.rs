//! The node handshake state machine.
//!
//! ```text
//! Init ─► Discovering ─found─► Registering ─2xx─► Planning ─► Applying ─► Heartbeating
//!              │                    │  ▲                                     │  │
//!              │ nothing            │  └──────── 401/403/404 ────────────────┘  │
//!              ▼                    │ transport failure on every attempt       │ 3 transport
//!         SelfElecting ◄────────────┘                                          │ failures
//!              │                                                               ▼
//!              └─► Heartbeating (as leader)                               Discovering
//! ```
//!
//! The current state is published on a watch channel after every
//! transition. `cluster.json` is rewritten after each successful
//! registration, plan and self-election.
//!
//! # Tiger Style
//!
//! - Registration attempts, heartbeat misses and discovery windows are bounded
//! - Every wait races the cancellation token
//! - Backoff between failed rounds is capped

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use serde_json::json;
use thatdam_constants::network::BACKOFF_INITIAL_SECS;
use thatdam_constants::network::BACKOFF_MAX_SECS;
use thatdam_constants::node::LEADER_DISCOVERY_TICK_SECS;
use thatdam_constants::node::MAX_HEARTBEAT_FAILURES;
use thatdam_constants::node::MIN_HEARTBEAT_INTERVAL_MS;
use thatdam_constants::node::REGISTER_ATTEMPTS;
use thatdam_constants::node::REGISTER_RETRY_PAUSE_SECS;
use thatdam_constants::supervisor::DEFAULT_AGENT_TTL_SECS;
use thatdam_plan::plan_generation;
use thatdam_plan::DesiredPlan;
use thatdam_plan::PlanApplier;
use thatdam_supervisor::api::Capabilities;
use thatdam_supervisor::api::FulfillRequest;
use thatdam_supervisor::api::HeartbeatRequest;
use thatdam_supervisor::api::PlanRequest;
use thatdam_supervisor::api::RegisterRequest;
use thatdam_supervisor::api::RegisterResponse;
use tokio::sync::watch;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::debug;
use tracing::info;
use tracing::warn;

use crate::client::Credential;
use crate::client::SupervisorClient;
use crate::config::NodeConfig;
use crate::discovery::Locate;
use crate::error::ClientError;
use crate::error::NodeError;
use crate::error::Result;
use crate::leader::LeaderDuties;
use crate::leader::NoDuties;
use crate::state::ClusterRecord;
use crate::state::Role;
use crate::state::StateStore;
use crate::status::HandshakeState;
use crate::status::NodeStatus;
use crate::token::TokenSource;

/// Class reported at registration.
pub const NODE_CLASS: &str = "node";

/// Retry counts and intervals.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HandshakeTimings {
    pub register_attempts: u32,
    pub register_pause: Duration,
    /// Used when the supervisor reports a zero TTL.
    pub default_ttl: Duration,
    pub min_heartbeat: Duration,
    pub plan_refresh: Duration,
    pub max_heartbeat_failures: u32,
    /// How often a leader without a hosted supervisor re-runs discovery.
    pub leader_tick: Duration,
    pub backoff_initial: Duration,
    pub backoff_max: Duration,
}

impl Default for HandshakeTimings {
    fn default() -> Self {
        Self {
            register_attempts: REGISTER_ATTEMPTS,
            register_pause: Duration::from_secs(REGISTER_RETRY_PAUSE_SECS),
            default_ttl: Duration::from_secs(DEFAULT_AGENT_TTL_SECS),
            min_heartbeat: Duration::from_millis(MIN_HEARTBEAT_INTERVAL_MS),
            plan_refresh: Duration::from_secs(thatdam_constants::node::DEFAULT_PLAN_REFRESH_SECS),
            max_heartbeat_failures: MAX_HEARTBEAT_FAILURES,
            leader_tick: Duration::from_secs(LEADER_DISCOVERY_TICK_SECS),
            backoff_initial: Duration::from_secs(BACKOFF_INITIAL_SECS),
            backoff_max: Duration::from_secs(BACKOFF_MAX_SECS),
        }
    }
}

impl HandshakeTimings {
    pub fn from_config(config: &NodeConfig) -> Self {
        Self {
            plan_refresh: Duration::from_secs(config.plan_refresh_secs.max(1)),
            ..Self::default()
        }
    }

    /// A third of the TTL, floored at `min_heartbeat`.
    pub fn heartbeat_interval(&self, ttl: Duration) -> Duration {
        (ttl / 3).max(self.min_heartbeat)
    }

    /// Exponential backoff after `failures` failed rounds, capped.
    pub fn backoff(&self, failures: u32) -> Duration {
        if failures == 0 {
            return Duration::ZERO;
        }
        let factor = 1u32.checked_shl(failures.saturating_sub(1).min(16)).unwrap_or(u32::MAX);
        self.backoff_initial.saturating_mul(factor).min(self.backoff_max)
    }
}

/// `<hostname>-<unix nanos>`.
pub fn generate_node_id() -> String {
    let host = std::env::var("HOSTNAME")
        .ok()
        .or_else(|| std::fs::read_to_string("/etc/hostname").ok())
        .map(|h| h.trim().to_string())
        .filter(|h| !h.is_empty())
        .unwrap_or_else(|| "node".to_string());
    let nanos = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_nanos())
        .unwrap_or_default();
    format!("{host}-{nanos}")
}

/// Features advertised at registration, derived from capabilities.
fn features(caps: &Capabilities) -> Vec<String> {
    let mut features = Vec::new();
    if !caps.video_devices.is_empty() {
        features.push("video".to_string());
    }
    if caps.gpu {
        features.push("gpu".to_string());
    }
    features
}

/// Mutable data carried across transitions.
struct Session {
    record: ClusterRecord,
    first_boot: bool,
    client: Option<SupervisorClient>,
    /// Credential for a supervisor this node hosts.
    local_credential: Option<Credential>,
    hosting: bool,
    lease: Option<watch::Receiver<bool>>,
    ttl: Duration,
    heartbeat_failures: u32,
    round_failures: u32,
    last_plan: Option<Instant>,
    pending_plan: Option<DesiredPlan>,
    last_error: Option<String>,
}

impl Session {
    fn new(default_ttl: Duration) -> Self {
        Self {
            record: ClusterRecord::new(String::new()),
            first_boot: false,
            client: None,
            local_credential: None,
            hosting: false,
            lease: None,
            ttl: default_ttl,
            heartbeat_failures: 0,
            round_failures: 0,
            last_plan: None,
            pending_plan: None,
            last_error: None,
        }
    }
}

/// Resolves once a held lease is lost. Never resolves without a lease.
async fn lease_lost(lease: &mut Option<watch::Receiver<bool>>) {
    let Some(rx) = lease.as_mut() else {
        return std::future::pending().await;
    };
    loop {
        if !*rx.borrow_and_update() {
            return;
        }
        if rx.changed().await.is_err() {
            return;
        }
    }
}

/// Drives one node from boot to shutdown.
pub struct Handshake {
    node_id: Option<String>,
    role_hint: String,
    claim: Option<(String, String)>,
    capabilities: Capabilities,
    timings: HandshakeTimings,
    store: StateStore,
    locator: Arc<dyn Locate>,
    tokens: Arc<dyn TokenSource>,
    applier: Arc<dyn PlanApplier>,
    duties: Arc<dyn LeaderDuties>,
    status: watch::Sender<NodeStatus>,
}

impl Handshake {
    pub fn new(
        store: StateStore,
        locator: Arc<dyn Locate>,
        tokens: Arc<dyn TokenSource>,
        applier: Arc<dyn PlanApplier>,
    ) -> Self {
        let (status, _) = watch::channel(NodeStatus::default());
        Self {
            node_id: None,
            role_hint: String::new(),
            claim: None,
            capabilities: Capabilities::default(),
            timings: HandshakeTimings::default(),
            store,
            locator,
            tokens,
            applier,
            duties: Arc::new(NoDuties),
            status,
        }
    }

    /// Apply node id, role hint, claim and timings from configuration.
    pub fn configure(mut self, config: &NodeConfig) -> Self {
        self.node_id = config.node_id.clone();
        self.role_hint = config.role_hint.clone();
        self.claim = config.claim().map(|(id, token)| (id.to_string(), token.to_string()));
        self.timings = HandshakeTimings::from_config(config);
        self
    }

    pub fn with_node_id(mut self, node_id: impl Into<String>) -> Self {
        self.node_id = Some(node_id.into());
        self
    }

    pub fn with_role_hint(mut self, role_hint: impl Into<String>) -> Self {
        self.role_hint = role_hint.into();
        self
    }

    pub fn with_claim(mut self, id: impl Into<String>, token: impl Into<String>) -> Self {
        self.claim = Some((id.into(), token.into()));
        self
    }

    pub fn with_capabilities(mut self, capabilities: Capabilities) -> Self {
        self.capabilities = capabilities;
        self
    }

    pub fn with_timings(mut self, timings: HandshakeTimings) -> Self {
        self.timings = timings;
        self
    }

    pub fn with_duties(mut self, duties: Arc<dyn LeaderDuties>) -> Self {
        self.duties = duties;
        self
    }

    /// Watch the node's state. Holds the latest status only.
    pub fn subscribe(&self) -> watch::Receiver<NodeStatus> {
        self.status.subscribe()
    }

    /// Run until `cancel` fires. Leadership is resigned on the way out.
    pub async fn run(self, cancel: CancellationToken) -> Result<()> {
        let mut session = Session::new(self.timings.default_ttl);
        let mut state = HandshakeState::Init;

        loop {
            self.publish(&session, state);
            let step = tokio::select! {
                _ = cancel.cancelled() => break,
                step = self.step(state, &mut session) => step,
            };
            match step {
                Ok(next) => {
                    if next != state {
                        debug!(from = %state, to = %next, "handshake transition");
                    }
                    state = next;
                }
                Err(e) => {
                    self.publish(&session, HandshakeState::Terminated);
                    return Err(e);
                }
            }
        }

        if session.record.role == Role::Leader {
            self.duties.resign().await;
        }
        self.publish(&session, HandshakeState::Terminated);
        info!(node_id = %session.record.node_id, "handshake stopped");
        Ok(())
    }

    fn publish(&self, s: &Session, state: HandshakeState) {
        self.status.send_replace(NodeStatus {
            node_id: s.record.node_id.clone(),
            role: s.record.role,
            epoch: s.record.epoch,
            state,
            supervisor: s.client.as_ref().map(|c| c.base_url().to_string()),
        });
    }

    async fn step(&self, state: HandshakeState, s: &mut Session) -> Result<HandshakeState> {
        match state {
            HandshakeState::Init => self.init(s).await,
            HandshakeState::Discovering => Ok(self.discover(s).await),
            HandshakeState::Registering => self.register(s).await,
            HandshakeState::Planning => self.plan(s).await,
            HandshakeState::Applying => self.apply(s).await,
            HandshakeState::Heartbeating => self.heartbeat(s).await,
            HandshakeState::SelfElecting => self.self_elect(s).await,
            HandshakeState::Terminated => Ok(HandshakeState::Terminated),
        }
    }

    // ========================================================================
    // Init / Discovering
    // ========================================================================

    async fn init(&self, s: &mut Session) -> Result<HandshakeState> {
        let persisted = match self.store.load().await {
            Ok(record) => record,
            Err(e @ NodeError::ParseState { .. }) => {
                warn!(error = %e, "ignoring unreadable node state");
                None
            }
            Err(e) => return Err(e),
        };
        s.first_boot = persisted.is_none();

        let mut record = persisted.unwrap_or_else(|| ClusterRecord::new(String::new()));
        if let Some(id) = &self.node_id {
            record.node_id = id.clone();
        }
        if record.node_id.is_empty() {
            record.node_id = generate_node_id();
        }
        // Leadership does not survive a restart; it is re-earned.
        record.role = Role::Agent;
        if record.ttl_sec > 0 {
            s.ttl = Duration::from_secs(record.ttl_sec);
        }
        info!(node_id = %record.node_id, epoch = record.epoch, first_boot = s.first_boot, "node starting");
        s.record = record;
        Ok(HandshakeState::Discovering)
    }

    async fn discover(&self, s: &mut Session) -> HandshakeState {
        let backoff = self.timings.backoff(s.round_failures);
        if !backoff.is_zero() {
            debug!(delay_ms = backoff.as_millis() as u64, "backing off before discovery");
            tokio::time::sleep(backoff).await;
        }
        s.local_credential = None;
        s.hosting = false;
        match self.locator.locate().await {
            Some(url) => {
                s.client = Some(SupervisorClient::new(url));
                HandshakeState::Registering
            }
            None => {
                info!("no supervisor found");
                s.client = None;
                HandshakeState::SelfElecting
            }
        }
    }

    // ========================================================================
    // Registering
    // ========================================================================

    async fn credential(&self, s: &Session, client: &SupervisorClient) -> Result<Credential, ClientError> {
        if let Some(cred) = &s.local_credential {
            return Ok(cred.clone());
        }
        self.tokens.credential(client, &s.record.node_id).await
    }

    fn register_request(&self, s: &Session) -> RegisterRequest {
        RegisterRequest {
            node_id: Some(s.record.node_id.clone()),
            class: NODE_CLASS.to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            features: features(&self.capabilities),
            meta: BTreeMap::from([
                ("role".to_string(), json!(s.record.role)),
                ("epoch".to_string(), json!(s.record.epoch)),
                ("role_hint".to_string(), json!(self.role_hint)),
            ]),
            ..Default::default()
        }
    }

    async fn register(&self, s: &mut Session) -> Result<HandshakeState> {
        let Some(client) = s.client.clone() else {
            return Ok(HandshakeState::Discovering);
        };

        let attempts = self.timings.register_attempts.max(1);
        let mut transport_only = true;
        for attempt in 1..=attempts {
            let outcome = match self.credential(s, &client).await {
                Ok(cred) => client.register(&self.register_request(s), &cred).await.map(|r| (r, cred)),
                Err(e) => Err(e),
            };
            match outcome {
                Ok((response, cred)) => {
                    self.adopt_registration(s, response).await?;
                    self.fulfil_claim(s, &client, &cred).await;
                    s.round_failures = 0;
                    return Ok(HandshakeState::Planning);
                }
                Err(e) => {
                    transport_only &= e.is_transport();
                    if e.is_auth_rejection() {
                        self.tokens.invalidate();
                    }
                    warn!(url = client.base_url(), attempt, attempts, error = %e, "registration failed");
                    if attempt < attempts {
                        tokio::time::sleep(self.timings.register_pause).await;
                    }
                }
            }
        }

        s.round_failures = s.round_failures.saturating_add(1);
        if transport_only && !s.hosting {
            info!(url = client.base_url(), "supervisor unreachable");
            return Ok(HandshakeState::SelfElecting);
        }
        Ok(HandshakeState::Discovering)
    }

    async fn adopt_registration(&self, s: &mut Session, response: RegisterResponse) -> Result<()> {
        let assigned = response.node_id.trim();
        if !assigned.is_empty() && assigned != s.record.node_id {
            info!(from = %s.record.node_id, to = assigned, "supervisor assigned node id");
            s.record.node_id = assigned.to_string();
        }
        s.ttl = if response.ttl > 0 {
            Duration::from_secs(response.ttl)
        } else {
            self.timings.default_ttl
        };
        s.record.ttl_sec = s.ttl.as_secs();
        s.heartbeat_failures = 0;
        self.store.save(&mut s.record).await?;
        info!(node_id = %s.record.node_id, ttl_sec = s.record.ttl_sec, "registered");
        Ok(())
    }

    /// First boot only, one attempt; failure is logged and not retried.
    async fn fulfil_claim(&self, s: &mut Session, client: &SupervisorClient, cred: &Credential) {
        if !s.first_boot {
            return;
        }
        s.first_boot = false;
        let Some((id, token)) = &self.claim else {
            return;
        };
        let body = FulfillRequest {
            id: id.clone(),
            token: token.clone(),
            node_id: Some(s.record.node_id.clone()),
            info: Some(json!({ "capabilities": self.capabilities })),
        };
        match client.fulfill_claim(&body, cred).await {
            Ok(()) => info!(claim_id = %id, "pairing claim fulfilled"),
            Err(e) => warn!(claim_id = %id, error = %e, "pairing claim not fulfilled"),
        }
    }

    // ========================================================================
    // Planning / Applying
    // ========================================================================

    async fn plan(&self, s: &mut Session) -> Result<HandshakeState> {
        let Some(client) = s.client.clone() else {
            return Ok(HandshakeState::Heartbeating);
        };
        let request = PlanRequest {
            node_id: s.record.node_id.clone(),
            role_hint: self.role_hint.clone(),
            capabilities: self.capabilities.clone(),
        };
        let response = match self.credential(s, &client).await {
            Ok(cred) => client.plan(&request, &cred).await,
            Err(e) => Err(e),
        };
        s.last_plan = Some(Instant::now());

        match response {
            Ok(response) => {
                s.record.role = if s.hosting {
                    Role::Leader
                } else {
                    response.role.as_deref().map(Role::from_wire).unwrap_or_default()
                };
                if let Some(epoch) = response.epoch {
                    s.record.epoch = s.record.epoch.max(epoch);
                }
                s.record.plan_version = response.plan.version;
                self.store.save(&mut s.record).await?;
                debug!(version = response.plan.version, apps = response.plan.apps.len(), role = %s.record.role, "plan received");
                s.pending_plan = Some(response.plan);
                Ok(HandshakeState::Applying)
            }
            Err(e) if e.needs_reregistration() => {
                if e.is_auth_rejection() {
                    self.tokens.invalidate();
                }
                warn!(error = %e, "plan refused, re-registering");
                Ok(HandshakeState::Registering)
            }
            Err(e) => {
                warn!(error = %e, "plan fetch failed, retrying at next refresh");
                s.last_error = Some(e.to_string());
                Ok(HandshakeState::Heartbeating)
            }
        }
    }

    async fn apply(&self, s: &mut Session) -> Result<HandshakeState> {
        let Some(plan) = s.pending_plan.take() else {
            return Ok(HandshakeState::Heartbeating);
        };
        let generation = plan_generation(&plan);
        if s.record.plan_generation.as_deref() == Some(generation.as_str()) {
            debug!(version = plan.version, "plan unchanged, skipping apply");
            return Ok(HandshakeState::Heartbeating);
        }

        match self.applier.apply(&plan).await {
            Ok(report) => {
                info!(version = report.version, started = ?report.started, "plan applied");
                s.record.plan_generation = Some(generation);
                s.last_error = None;
                self.store.save(&mut s.record).await?;
            }
            Err(e) => {
                warn!(version = plan.version, kind = e.kind(), error = %e, "plan apply failed");
                s.last_error = Some(e.to_string());
            }
        }
        Ok(HandshakeState::Heartbeating)
    }

    // ========================================================================
    // Heartbeating
    // ========================================================================

    fn heartbeat_request(&self, s: &Session) -> HeartbeatRequest {
        let mut meta = BTreeMap::from([
            ("state".to_string(), json!(HandshakeState::Heartbeating)),
            ("role".to_string(), json!(s.record.role)),
            ("epoch".to_string(), json!(s.record.epoch)),
            ("plan_version".to_string(), json!(s.record.plan_version)),
        ]);
        if let Some(generation) = &s.record.plan_generation {
            meta.insert("plan_generation".to_string(), json!(generation));
        }
        if let Some(err) = &s.last_error {
            meta.insert("last_error".to_string(), json!(err));
        }
        HeartbeatRequest {
            node_id: Some(s.record.node_id.clone()),
            meta,
            ..Default::default()
        }
    }

    async fn heartbeat(&self, s: &mut Session) -> Result<HandshakeState> {
        let Some(client) = s.client.clone() else {
            return self.lead(s).await;
        };

        let interval = self.timings.heartbeat_interval(s.ttl);
        let lost = tokio::select! {
            _ = tokio::time::sleep(interval) => false,
            _ = lease_lost(&mut s.lease) => true,
        };
        if lost {
            self.step_down(s, "leader lease lost").await?;
            s.client = None;
            return Ok(HandshakeState::Discovering);
        }

        let sent = match self.credential(s, &client).await {
            Ok(cred) => client.heartbeat(&self.heartbeat_request(s), &cred).await,
            Err(e) => Err(e),
        };
        match sent {
            Ok(()) => {
                s.heartbeat_failures = 0;
                let refresh_due = s.last_plan.map_or(true, |at| at.elapsed() >= self.timings.plan_refresh);
                if refresh_due {
                    return Ok(HandshakeState::Planning);
                }
                Ok(HandshakeState::Heartbeating)
            }
            Err(e) if e.needs_reregistration() => {
                if e.is_auth_rejection() {
                    self.tokens.invalidate();
                }
                warn!(error = %e, "heartbeat refused, re-registering");
                Ok(HandshakeState::Registering)
            }
            Err(e) if e.is_transport() => {
                s.heartbeat_failures += 1;
                warn!(failures = s.heartbeat_failures, error = %e, "heartbeat failed");
                if s.heartbeat_failures >= self.timings.max_heartbeat_failures {
                    s.heartbeat_failures = 0;
                    if s.record.role == Role::Leader {
                        self.step_down(s, "supervisor unreachable").await?;
                    }
                    return Ok(HandshakeState::Discovering);
                }
                Ok(HandshakeState::Heartbeating)
            }
            Err(e) => {
                warn!(error = %e, "heartbeat rejected");
                Ok(HandshakeState::Heartbeating)
            }
        }
    }

    /// Leader without a supervisor: re-run discovery each tick and rejoin
    /// once one answers.
    async fn lead(&self, s: &mut Session) -> Result<HandshakeState> {
        let lost = tokio::select! {
            _ = tokio::time::sleep(self.timings.leader_tick) => false,
            _ = lease_lost(&mut s.lease) => true,
        };
        if lost {
            self.step_down(s, "leader lease lost").await?;
            return Ok(HandshakeState::Discovering);
        }
        let Some(url) = self.locator.locate().await else {
            return Ok(HandshakeState::Heartbeating);
        };
        // Trusted candidates skip the discovery probe; a leader only yields
        // to a supervisor that answers.
        let client = SupervisorClient::new(url);
        if let Err(e) = client.health().await {
            debug!(url = client.base_url(), error = %e, "candidate supervisor not answering, keeping leadership");
            return Ok(HandshakeState::Heartbeating);
        }
        self.step_down(s, "supervisor appeared").await?;
        s.client = Some(client);
        Ok(HandshakeState::Registering)
    }

    /// Resign and persist the agent role.
    async fn step_down(&self, s: &mut Session, reason: &str) -> Result<()> {
        info!(reason, epoch = s.record.epoch, "stepping down");
        self.duties.resign().await;
        s.lease = None;
        s.hosting = false;
        s.local_credential = None;
        s.record.role = Role::Agent;
        self.store.save(&mut s.record).await
    }

    // ========================================================================
    // SelfElecting
    // ========================================================================

    async fn self_elect(&self, s: &mut Session) -> Result<HandshakeState> {
        let mut candidate = s.record.clone();
        candidate.role = Role::Leader;
        candidate.epoch = candidate.epoch.saturating_add(1);

        let leadership = match self.duties.elect(&candidate).await {
            Ok(leadership) => leadership,
            Err(e) => {
                warn!(error = %e, "self-election refused");
                s.round_failures = s.round_failures.saturating_add(1);
                return Ok(HandshakeState::Discovering);
            }
        };

        s.record = candidate;
        s.lease = leadership.lease;
        self.store.save(&mut s.record).await?;
        info!(node_id = %s.record.node_id, epoch = s.record.epoch, "self-elected leader");

        match leadership.supervisor {
            Some(local) => {
                s.hosting = true;
                s.client = Some(SupervisorClient::new(local.url));
                s.local_credential = Some(local.credential);
                Ok(HandshakeState::Registering)
            }
            None => {
                s.hosting = false;
                s.client = None;
                Ok(HandshakeState::Heartbeating)
            }
        }
    }
}

impl std::fmt::Debug for Handshake {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Handshake")
            .field("node_id", &self.node_id)
            .field("role_hint", &self.role_hint)
            .field("store", &self.store)
            .field("timings", &self.timings)
            .finish_non_exhaustive()
    }
}
