//! Handshake runs against a counting stub supervisor on an ephemeral port.

use std::sync::atomic::AtomicBool;
use std::sync::atomic::AtomicUsize;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::get;
use axum::routing::post;
use axum::Json;
use axum::Router;
use serde_json::json;
use serde_json::Value;
use tempfile::TempDir;
use thatdam_auth::TokenIssuer;
use thatdam_bus::AuditLog;
use thatdam_bus::BusHandle;
use thatdam_node::ClusterRecord;
use thatdam_node::Handshake;
use thatdam_node::HandshakeState;
use thatdam_node::HandshakeTimings;
use thatdam_node::HealthServer;
use thatdam_node::HostedSupervisor;
use thatdam_node::Locate;
use thatdam_node::NodeStatus;
use thatdam_node::Role;
use thatdam_node::StandardDuties;
use thatdam_node::StateStore;
use thatdam_plan::ApplyError;
use thatdam_plan::ApplyReport;
use thatdam_plan::DesiredPlan;
use thatdam_plan::PlanApplier;
use thatdam_supervisor::api::FulfillRequest;
use thatdam_supervisor::api::RegisterRequest;
use thatdam_supervisor::api::RegisterResponse;
use thatdam_supervisor::SupervisorConfig;
use tokio::net::TcpListener;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

const WAIT: Duration = Duration::from_secs(10);

// ============================================================================
// Stub supervisor
// ============================================================================

#[derive(Default)]
struct Stub {
    /// Node id handed back at registration; echoes the request when unset.
    assign: Option<String>,
    reject_first_heartbeat: AtomicBool,
    registers: AtomicUsize,
    plans: AtomicUsize,
    heartbeats: AtomicUsize,
    claims: Mutex<Vec<FulfillRequest>>,
}

async fn stub_register(State(stub): State<Arc<Stub>>, Json(body): Json<RegisterRequest>) -> Json<RegisterResponse> {
    stub.registers.fetch_add(1, Ordering::SeqCst);
    let node_id = stub.assign.clone().or(body.node_id).unwrap_or_default();
    Json(RegisterResponse {
        registered: true,
        node_id,
        ttl: 1,
    })
}

async fn stub_plan(State(stub): State<Arc<Stub>>) -> Json<Value> {
    stub.plans.fetch_add(1, Ordering::SeqCst);
    Json(json!({"role": "agent"}))
}

async fn stub_heartbeat(State(stub): State<Arc<Stub>>) -> StatusCode {
    let n = stub.heartbeats.fetch_add(1, Ordering::SeqCst);
    if n == 0 && stub.reject_first_heartbeat.load(Ordering::SeqCst) {
        return StatusCode::UNAUTHORIZED;
    }
    StatusCode::NO_CONTENT
}

async fn stub_fulfill(State(stub): State<Arc<Stub>>, Json(body): Json<FulfillRequest>) -> StatusCode {
    stub.claims.lock().unwrap().push(body);
    StatusCode::NO_CONTENT
}

async fn start_stub(stub: Arc<Stub>) -> (String, JoinHandle<()>) {
    let app = Router::new()
        .route("/health", get(|| async { Json(json!({"status": "ok"})) }))
        .route("/v1/nodes/register", post(stub_register))
        .route("/v1/nodes/plan", post(stub_plan))
        .route("/v1/nodes/heartbeat", post(stub_heartbeat))
        .route("/api/claims/fulfill", post(stub_fulfill))
        .with_state(stub);
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let task = tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    (format!("http://{addr}"), task)
}

// ============================================================================
// Fakes
// ============================================================================

/// Answers with whatever URL the test sets.
#[derive(Default)]
struct SetLocator(Mutex<Option<String>>);

impl SetLocator {
    fn at(url: &str) -> Arc<Self> {
        Arc::new(Self(Mutex::new(Some(url.to_string()))))
    }

    fn set(&self, url: &str) {
        *self.0.lock().unwrap() = Some(url.to_string());
    }
}

#[async_trait]
impl Locate for SetLocator {
    async fn locate(&self) -> Option<String> {
        self.0.lock().unwrap().clone()
    }
}

#[derive(Default)]
struct CountingApplier {
    applied: AtomicUsize,
}

#[async_trait]
impl PlanApplier for CountingApplier {
    async fn apply(&self, plan: &DesiredPlan) -> Result<ApplyReport, ApplyError> {
        self.applied.fetch_add(1, Ordering::SeqCst);
        Ok(ApplyReport {
            version: plan.version,
            started: Vec::new(),
        })
    }
}

fn fast_timings() -> HandshakeTimings {
    HandshakeTimings {
        register_pause: Duration::from_millis(50),
        leader_tick: Duration::from_millis(100),
        backoff_initial: Duration::from_millis(50),
        backoff_max: Duration::from_millis(200),
        ..HandshakeTimings::default()
    }
}

struct Node {
    dir: TempDir,
    applier: Arc<CountingApplier>,
    status: watch::Receiver<NodeStatus>,
    cancel: CancellationToken,
    task: JoinHandle<thatdam_node::error::Result<()>>,
}

impl Node {
    fn spawn(locator: Arc<dyn Locate>, configure: impl FnOnce(Handshake) -> Handshake) -> Self {
        let dir = tempfile::tempdir().unwrap();
        Self::spawn_in(dir, locator, configure)
    }

    fn spawn_in(dir: TempDir, locator: Arc<dyn Locate>, configure: impl FnOnce(Handshake) -> Handshake) -> Self {
        let applier = Arc::new(CountingApplier::default());
        let handshake = Handshake::new(
            StateStore::new(dir.path()),
            locator,
            Arc::new(thatdam_node::token::StaticToken::default()),
            applier.clone(),
        )
        .with_timings(fast_timings());
        let handshake = configure(handshake);
        let status = handshake.subscribe();
        let cancel = CancellationToken::new();
        let task = tokio::spawn(handshake.run(cancel.clone()));
        Self {
            dir,
            applier,
            status,
            cancel,
            task,
        }
    }

    async fn wait_for(&mut self, what: &str, pred: impl FnMut(&NodeStatus) -> bool) -> NodeStatus {
        let seen = tokio::time::timeout(WAIT, self.status.wait_for(pred))
            .await
            .map(|r| r.map(|status| (*status).clone()));
        match seen {
            Ok(Ok(status)) => status,
            Ok(Err(_)) => panic!("status channel closed while waiting for {what}"),
            Err(_) => panic!("timed out waiting for {what}; last status {:?}", *self.status.borrow()),
        }
    }

    async fn record(&self) -> ClusterRecord {
        StateStore::new(self.dir.path()).load().await.unwrap().unwrap()
    }

    async fn stop(self) -> TempDir {
        self.cancel.cancel();
        self.task.await.unwrap().unwrap();
        self.dir
    }
}

async fn wait_until(what: &str, mut cond: impl FnMut() -> bool) {
    let deadline = tokio::time::Instant::now() + WAIT;
    while !cond() {
        assert!(tokio::time::Instant::now() < deadline, "timed out waiting for {what}");
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
}

// ============================================================================
// Agent path
// ============================================================================

#[tokio::test]
async fn test_fresh_node_registers_once_and_persists_identity() {
    let stub = Arc::new(Stub {
        assign: Some("n".into()),
        ..Default::default()
    });
    let (url, _server) = start_stub(stub.clone()).await;
    let node = Node::spawn(SetLocator::at(&url), |h| h);

    wait_until("first heartbeat", || stub.heartbeats.load(Ordering::SeqCst) >= 1).await;

    assert_eq!(stub.registers.load(Ordering::SeqCst), 1);
    assert_eq!(stub.plans.load(Ordering::SeqCst), 1);
    assert_eq!(node.applier.applied.load(Ordering::SeqCst), 1);

    let record = node.record().await;
    assert_eq!(record.node_id, "n");
    assert_eq!(record.role, Role::Agent);
    assert_eq!(record.ttl_sec, 1);
    assert!(record.plan_generation.is_some());

    let raw: Value = serde_json::from_slice(&std::fs::read(node.dir.path().join("cluster.json")).unwrap()).unwrap();
    assert_eq!(raw["node_id"], "n");
    assert_eq!(raw["role"], "agent");

    node.stop().await;
}

#[tokio::test]
async fn test_unauthorized_heartbeat_reregisters_exactly_once() {
    let stub = Arc::new(Stub {
        assign: Some("n".into()),
        reject_first_heartbeat: AtomicBool::new(true),
        ..Default::default()
    });
    let (url, _server) = start_stub(stub.clone()).await;
    let mut node = Node::spawn(SetLocator::at(&url), |h| h);

    wait_until("second heartbeat", || stub.heartbeats.load(Ordering::SeqCst) >= 2).await;
    assert_eq!(stub.registers.load(Ordering::SeqCst), 2);

    let status = node.wait_for("heartbeating", |s| s.state == HandshakeState::Heartbeating).await;
    assert_eq!(status.node_id, "n");

    // Same plan after re-registration: nothing re-applied.
    assert_eq!(stub.plans.load(Ordering::SeqCst), 2);
    assert_eq!(node.applier.applied.load(Ordering::SeqCst), 1);
    node.stop().await;
}

#[tokio::test]
async fn test_first_boot_fulfils_pairing_claim() {
    let stub = Arc::new(Stub {
        assign: Some("n".into()),
        ..Default::default()
    });
    let (url, _server) = start_stub(stub.clone()).await;
    let node = Node::spawn(SetLocator::at(&url), |h| h.with_claim("c1", "t1"));

    wait_until("first heartbeat", || stub.heartbeats.load(Ordering::SeqCst) >= 1).await;
    {
        let claims = stub.claims.lock().unwrap();
        assert_eq!(claims.len(), 1);
        assert_eq!(claims[0].id, "c1");
        assert_eq!(claims[0].token, "t1");
        assert_eq!(claims[0].node_id.as_deref(), Some("n"));
    }
    node.stop().await;
}

#[tokio::test]
async fn test_restart_keeps_identity_and_skips_claim() {
    let dir = tempfile::tempdir().unwrap();
    let mut previous = ClusterRecord::new("persisted");
    previous.epoch = 4;
    StateStore::new(dir.path()).save(&mut previous).await.unwrap();

    let stub = Arc::new(Stub::default());
    let (url, _server) = start_stub(stub.clone()).await;
    let node = Node::spawn_in(dir, SetLocator::at(&url), |h| h.with_claim("c1", "t1"));

    wait_until("first heartbeat", || stub.heartbeats.load(Ordering::SeqCst) >= 1).await;
    assert!(stub.claims.lock().unwrap().is_empty());

    let record = node.record().await;
    assert_eq!(record.node_id, "persisted");
    assert_eq!(record.epoch, 4);
    node.stop().await;
}

#[tokio::test]
async fn test_health_endpoint_reports_status() {
    let stub = Arc::new(Stub {
        assign: Some("n".into()),
        ..Default::default()
    });
    let (url, _server) = start_stub(stub.clone()).await;
    let mut node = Node::spawn(SetLocator::at(&url), |h| h);

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let health = HealthServer::start(listener, node.status.clone(), &node.cancel).unwrap();
    node.wait_for("heartbeating", |s| s.state == HandshakeState::Heartbeating).await;

    let body: Value = reqwest::get(format!("http://{}/health", health.local_addr()))
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(body["node_id"], "n");
    assert_eq!(body["role"], "agent");
    assert_eq!(body["epoch"], 0);
    assert!(body["state"].is_string());

    health.shutdown().await;
    node.stop().await;
}

#[tokio::test]
async fn test_cancel_terminates() {
    let stub = Arc::new(Stub::default());
    let (url, _server) = start_stub(stub.clone()).await;
    let mut node = Node::spawn(SetLocator::at(&url), |h| h.with_node_id("n1"));
    node.wait_for("heartbeating", |s| s.state == HandshakeState::Heartbeating).await;

    let mut status = node.status.clone();
    node.stop().await;
    assert_eq!(status.borrow_and_update().state, HandshakeState::Terminated);
}

// ============================================================================
// Self-election
// ============================================================================

#[tokio::test]
async fn test_self_elects_without_supervisor() {
    let mut node = Node::spawn(Arc::new(SetLocator::default()), |h| h.with_node_id("lonely"));

    let status = node
        .wait_for("leader", |s| s.role == Role::Leader && s.state == HandshakeState::Heartbeating)
        .await;
    assert_eq!(status.epoch, 1);
    assert_eq!(status.supervisor, None);

    let record = node.record().await;
    assert_eq!(record.role, Role::Leader);
    assert_eq!(record.epoch, 1);
    node.stop().await;
}

#[tokio::test]
async fn test_unreachable_supervisor_self_elects() {
    let mut node = Node::spawn(SetLocator::at("http://127.0.0.1:1"), |h| h.with_node_id("cut-off"));
    let status = node.wait_for("leader", |s| s.role == Role::Leader).await;
    assert_eq!(status.epoch, 1);
    node.stop().await;
}

#[tokio::test]
async fn test_leader_holds_epoch_while_configured_supervisor_is_down() {
    let mut node = Node::spawn(SetLocator::at("http://127.0.0.1:1"), |h| h.with_node_id("cut-off"));
    node.wait_for("leader", |s| s.role == Role::Leader).await;

    // Many leader ticks against the dead URL.
    tokio::time::sleep(Duration::from_secs(2)).await;

    let status = node.status.borrow().clone();
    assert_eq!(status.role, Role::Leader);
    assert_eq!(status.epoch, 1);
    let record = node.record().await;
    assert_eq!(record.epoch, 1);
    assert_eq!(record.role, Role::Leader);
    node.stop().await;
}

#[tokio::test]
async fn test_leader_rejoins_when_supervisor_appears() {
    let locator = Arc::new(SetLocator::default());
    let mut node = Node::spawn(locator.clone(), |h| h.with_node_id("n1"));
    node.wait_for("leader", |s| s.role == Role::Leader).await;

    let stub = Arc::new(Stub::default());
    let (url, _server) = start_stub(stub.clone()).await;
    locator.set(&url);

    let status = node
        .wait_for("rejoined agent", |s| s.role == Role::Agent && s.state == HandshakeState::Heartbeating)
        .await;
    assert_eq!(status.epoch, 1);
    assert_eq!(status.supervisor.as_deref(), Some(url.as_str()));
    assert_eq!(stub.registers.load(Ordering::SeqCst), 1);
    assert_eq!(node.record().await.role, Role::Agent);
    node.stop().await;
}

#[tokio::test]
async fn test_leader_hosts_supervisor_and_registers_with_itself() {
    let audit = tempfile::tempdir().unwrap();
    let issuer = Arc::new(TokenIssuer::generate("k1", "https://auth.test", "thatdam").unwrap());
    let bus = BusHandle::in_process(AuditLog::new(audit.path().join("audit.log")));
    let config = SupervisorConfig {
        listen: "127.0.0.1:0".into(),
        ..Default::default()
    };
    let parent = CancellationToken::new();
    let duties = Arc::new(StandardDuties::new(&parent).with_hosted_supervisor(HostedSupervisor::new(config, issuer, bus)));

    let mut node = Node::spawn(Arc::new(SetLocator::default()), |h| h.with_node_id("host-1").with_duties(duties));
    let status = node
        .wait_for("hosting leader", |s| s.role == Role::Leader && s.state == HandshakeState::Heartbeating)
        .await;
    let local = status.supervisor.clone().expect("leader should use its own supervisor");

    let health: Value = reqwest::get(format!("{local}/health")).await.unwrap().json().await.unwrap();
    assert_eq!(health["agents"], 1);
    assert_eq!(node.record().await.role, Role::Leader);

    node.stop().await;
    parent.cancel();
}
