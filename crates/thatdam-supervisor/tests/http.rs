//! End-to-end tests against a live supervisor on an ephemeral port.

use std::sync::Arc;
use std::time::Duration;

use reqwest::StatusCode;
use serde_json::json;
use serde_json::Value;
use tempfile::TempDir;
use thatdam_auth::TokenIssuer;
use thatdam_bus::AuditLog;
use thatdam_bus::BusHandle;
use thatdam_policy::scopes;
use thatdam_policy::EnvPolicy;
use thatdam_policy::PolicyConfig;
use thatdam_supervisor::SupervisorConfig;
use thatdam_supervisor::SupervisorServer;
use thatdam_supervisor::SupervisorState;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;

const ISS: &str = "https://auth.test";
const AUD: &str = "thatdam";

struct Harness {
    base: String,
    client: reqwest::Client,
    issuer: Arc<TokenIssuer>,
    bus: BusHandle,
    server: Option<SupervisorServer>,
    _dir: TempDir,
}

impl Harness {
    async fn start() -> Self {
        Self::start_with(SupervisorConfig::default(), PolicyConfig::default()).await
    }

    async fn start_with(config: SupervisorConfig, policy: PolicyConfig) -> Self {
        let dir = tempfile::tempdir().unwrap();
        let issuer = Arc::new(TokenIssuer::generate("k1", ISS, AUD).unwrap());
        let bus = BusHandle::in_process(AuditLog::new(dir.path().join("audit.log")));
        let state = SupervisorState::new(config, issuer.clone(), bus.clone()).with_policy(Arc::new(EnvPolicy::new(policy)));

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let server = SupervisorServer::start(listener, Arc::new(state), &CancellationToken::new()).unwrap();
        Self {
            base: server.url(),
            client: reqwest::Client::new(),
            issuer,
            bus,
            server: Some(server),
            _dir: dir,
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{path}", self.base)
    }

    fn token(&self, scopes: &[&str]) -> String {
        let scopes: Vec<String> = scopes.iter().map(|s| s.to_string()).collect();
        self.issuer.sign_pat("tester", None, &[], &scopes).unwrap()
    }

    fn node_token(&self) -> String {
        self.token(&[scopes::REGISTER, scopes::READ])
    }

    async fn post(&self, path: &str, token: Option<&str>, body: Value) -> reqwest::Response {
        let mut req = self.client.post(self.url(path)).json(&body);
        if let Some(token) = token {
            req = req.bearer_auth(token);
        }
        req.send().await.unwrap()
    }

    async fn get(&self, path: &str, token: Option<&str>) -> reqwest::Response {
        let mut req = self.client.get(self.url(path));
        if let Some(token) = token {
            req = req.bearer_auth(token);
        }
        req.send().await.unwrap()
    }

    async fn shutdown(mut self) {
        if let Some(server) = self.server.take() {
            server.shutdown().await;
        }
    }
}

// ============================================================================
// Pairing claims
// ============================================================================

#[tokio::test]
async fn test_pair_and_adopt() {
    let h = Harness::start().await;
    let admin = h.token(&[scopes::ADMIN]);

    let resp = h.post("/api/claims/new", Some(&admin), json!({})).await;
    assert_eq!(resp.status(), StatusCode::OK);
    let claim: Value = resp.json().await.unwrap();
    let id = claim["id"].as_str().unwrap().to_string();
    let secret = claim["token"].as_str().unwrap().to_string();

    let mut watch = h.get(&format!("/api/claims/{id}/watch"), Some(&admin)).await;
    assert_eq!(watch.status(), StatusCode::OK);
    assert!(watch.headers()["content-type"].to_str().unwrap().starts_with("text/event-stream"));

    let resp = h.post("/api/claims/fulfill", Some(&admin), json!({"id": id, "token": secret})).await;
    assert_eq!(resp.status(), StatusCode::NO_CONTENT);

    let mut received = String::new();
    let read = async {
        while let Some(chunk) = watch.chunk().await.unwrap() {
            received.push_str(&String::from_utf8_lossy(&chunk));
        }
    };
    tokio::time::timeout(Duration::from_secs(5), read).await.unwrap();
    assert_eq!(received.matches("fulfilled").count(), 1);
    assert!(received.starts_with("data:"));

    let again = h.post("/api/claims/fulfill", Some(&admin), json!({"id": id, "token": secret})).await;
    assert_eq!(again.status(), StatusCode::NOT_FOUND);
    h.shutdown().await;
}

#[tokio::test]
async fn test_claims_require_authentication() {
    let h = Harness::start().await;
    let resp = h.post("/api/claims/new", None, json!({})).await;
    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);

    let resp = h.get("/api/claims/nope/watch", Some(&h.node_token())).await;
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["error"], "not_found");
    h.shutdown().await;
}

#[tokio::test]
async fn test_fulfill_with_wrong_token_is_not_found() {
    let h = Harness::start().await;
    let admin = h.token(&[scopes::ADMIN]);
    let claim: Value = h.post("/api/claims/new", Some(&admin), json!({})).await.json().await.unwrap();
    let resp = h
        .post("/api/claims/fulfill", Some(&admin), json!({"id": claim["id"], "token": "wrong"}))
        .await;
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    h.shutdown().await;
}

// ============================================================================
// Policy gating
// ============================================================================

#[tokio::test]
async fn test_anonymous_register_denied_without_proxy_flag() {
    let h = Harness::start().await;
    let resp = h.post("/v1/nodes/register", None, json!({"id": "n1"})).await;
    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["error"], "unauthorized");
    h.shutdown().await;
}

#[tokio::test]
async fn test_anonymous_register_allowed_with_proxy_flag() {
    let policy = PolicyConfig {
        allow_anonymous_proxy: true,
        ..Default::default()
    };
    let h = Harness::start_with(SupervisorConfig::default(), policy).await;
    let resp = h.post("/v1/nodes/register", None, json!({"id": "cam-1"})).await;
    assert_eq!(resp.status(), StatusCode::OK);

    // Heartbeat is never anonymous.
    let resp = h.post("/v1/nodes/heartbeat", None, json!({"id": "cam-1"})).await;
    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
    h.shutdown().await;
}

#[tokio::test]
async fn test_missing_scope_is_forbidden() {
    let h = Harness::start().await;
    let reader = h.token(&[scopes::READ]);
    for (path, body) in [
        ("/v1/nodes/register", json!({"id": "n1"})),
        ("/v1/nodes/heartbeat", json!({"id": "n1"})),
        ("/v1/leader/claim", json!({"node_id": "n1"})),
    ] {
        let resp = h.post(path, Some(&reader), body).await;
        assert_eq!(resp.status(), StatusCode::FORBIDDEN, "{path}");
    }
    h.shutdown().await;
}

#[tokio::test]
async fn test_invalid_bearer_is_rejected() {
    let h = Harness::start().await;
    let forger = TokenIssuer::generate("k1", ISS, AUD).unwrap();
    let forged = forger.sign_pat("mallory", None, &[], &[scopes::ADMIN.to_string()]).unwrap();

    let resp = h.post("/v1/leader/claim", Some(&forged), json!({"node_id": "m"})).await;
    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["error"], "invalid_token");
    h.shutdown().await;
}

#[tokio::test]
async fn test_api_key_grants_all_scopes() {
    let config = SupervisorConfig {
        api_key: Some("sekret".into()),
        ..Default::default()
    };
    let h = Harness::start_with(config, PolicyConfig::default()).await;

    let ok = h
        .client
        .post(h.url("/v1/leader/claim"))
        .header("X-API-Key", "sekret")
        .json(&json!({"node_id": "n1"}))
        .send()
        .await
        .unwrap();
    assert_eq!(ok.status(), StatusCode::OK);

    let bad = h
        .client
        .post(h.url("/v1/leader/claim"))
        .header("X-API-Key", "guess")
        .json(&json!({"node_id": "n1"}))
        .send()
        .await
        .unwrap();
    assert_eq!(bad.status(), StatusCode::UNAUTHORIZED);
    h.shutdown().await;
}

// ============================================================================
// Node lifecycle
// ============================================================================

#[tokio::test]
async fn test_register_heartbeat_and_list() {
    let h = Harness::start().await;
    let token = h.node_token();

    let resp = h
        .post(
            "/v1/nodes/register",
            Some(&token),
            json!({"node_id": "n1", "class": "capture", "version": "1.2.0", "features": ["v4l2"]}),
        )
        .await;
    assert_eq!(resp.status(), StatusCode::OK);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body, json!({"registered": true, "node_id": "n1", "ttl": 30}));

    let resp = h.post("/v1/nodes/heartbeat", Some(&token), json!({"id": "n1", "meta": {"load": 1}})).await;
    assert_eq!(resp.status(), StatusCode::NO_CONTENT);

    let nodes: Value = h.get("/v1/nodes", Some(&token)).await.json().await.unwrap();
    assert_eq!(nodes[0]["id"], "n1");
    assert_eq!(nodes[0]["status"], "healthy");
    assert_eq!(nodes[0]["meta"]["load"], 1);
    assert_eq!(nodes[0]["features"], json!(["v4l2"]));
    h.shutdown().await;
}

#[tokio::test]
async fn test_heartbeat_for_unknown_agent_is_not_found() {
    let h = Harness::start().await;
    let resp = h.post("/v1/nodes/heartbeat", Some(&h.node_token()), json!({"id": "ghost"})).await;
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    h.shutdown().await;
}

#[tokio::test]
async fn test_healthy_agent_goes_stale() {
    let config = SupervisorConfig {
        agent_ttl_secs: 1,
        ..Default::default()
    };
    let h = Harness::start_with(config, PolicyConfig::default()).await;
    let token = h.node_token();
    h.post("/v1/nodes/register", Some(&token), json!({"id": "n1"})).await;
    h.post("/v1/nodes/heartbeat", Some(&token), json!({"id": "n1"})).await;

    tokio::time::sleep(Duration::from_millis(3200)).await;
    let nodes: Value = h.get("/v1/nodes", Some(&token)).await.json().await.unwrap();
    assert_eq!(nodes[0]["status"], "stale");

    h.post("/v1/nodes/heartbeat", Some(&token), json!({"id": "n1"})).await;
    let nodes: Value = h.get("/v1/nodes", Some(&token)).await.json().await.unwrap();
    assert_eq!(nodes[0]["status"], "healthy");
    h.shutdown().await;
}

#[tokio::test]
async fn test_register_publishes_event() {
    let h = Harness::start().await;
    let mut events = h.bus.subscribe("overlay.*").await.unwrap();

    h.post("/v1/nodes/register", Some(&h.node_token()), json!({"id": "n1"})).await;

    let envelope = tokio::time::timeout(Duration::from_secs(2), events.recv()).await.unwrap().unwrap();
    assert_eq!(envelope.topic, "overlay.register");
    assert_eq!(envelope.payload["action"], "register");
    assert_eq!(envelope.payload["agent"]["id"], "n1");
    h.shutdown().await;
}

#[tokio::test]
async fn test_malformed_body_is_bad_request() {
    let h = Harness::start().await;
    let resp = h
        .client
        .post(h.url("/v1/nodes/register"))
        .bearer_auth(h.node_token())
        .header("content-type", "application/json")
        .body("{not json")
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["error"], "bad_request");

    let resp = h.post("/v1/nodes/register", Some(&h.node_token()), json!({"class": "x"})).await;
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    h.shutdown().await;
}

#[tokio::test]
async fn test_wrong_method_is_405() {
    let h = Harness::start().await;
    let resp = h.get("/v1/nodes/register", None).await;
    assert_eq!(resp.status(), StatusCode::METHOD_NOT_ALLOWED);
    h.shutdown().await;
}

// ============================================================================
// Plans
// ============================================================================

#[tokio::test]
async fn test_plan_for_camera_node() {
    let h = Harness::start().await;
    let body = json!({"node_id": "cam-1", "role_hint": "", "capabilities": {"video_devices": ["/dev/video0"]}});
    let plan: Value = h.post("/v1/nodes/plan", Some(&h.node_token()), body).await.json().await.unwrap();
    assert_eq!(plan["version"], 1);
    assert_eq!(plan["node"], "cam-1");
    assert_eq!(plan["apps"][0]["name"], "camera-proxy");
    assert_eq!(plan["role"], "agent");
    h.shutdown().await;
}

#[tokio::test]
async fn test_plan_for_server_hint() {
    let h = Harness::start().await;
    let plan: Value = h
        .post("/v1/nodes/plan", None, json!({"node_id": "srv", "role_hint": "server"}))
        .await
        .json()
        .await
        .unwrap();
    let names: Vec<&str> = plan["apps"].as_array().unwrap().iter().map(|a| a["name"].as_str().unwrap()).collect();
    assert_eq!(names, ["media-api", "video-web"]);
    h.shutdown().await;
}

#[tokio::test]
async fn test_anonymous_camera_node_gets_empty_plan_unless_allowed() {
    let h = Harness::start().await;
    let body = json!({"node_id": "cam-1", "capabilities": {"video_devices": ["/dev/video0"]}});
    let plan: Value = h.post("/v1/nodes/plan", None, body.clone()).await.json().await.unwrap();
    assert_eq!(plan["apps"], json!([]));
    h.shutdown().await;

    let policy = PolicyConfig {
        allow_anonymous_proxy: true,
        ..Default::default()
    };
    let h = Harness::start_with(SupervisorConfig::default(), policy).await;
    let plan: Value = h.post("/v1/nodes/plan", None, body).await.json().await.unwrap();
    assert_eq!(plan["apps"][0]["name"], "camera-proxy");
    h.shutdown().await;
}

#[tokio::test]
async fn test_plan_requires_auth_when_configured() {
    let policy = PolicyConfig {
        require_auth_for_plan: true,
        ..Default::default()
    };
    let h = Harness::start_with(SupervisorConfig::default(), policy).await;
    let resp = h.post("/v1/nodes/plan", None, json!({"node_id": "n1"})).await;
    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
    h.shutdown().await;
}

#[tokio::test]
async fn test_plan_dir_template_overrides_builtin() {
    let plans = tempfile::tempdir().unwrap();
    std::fs::write(
        plans.path().join("server.yaml"),
        "executor: docker\napps:\n  - name: custom\n    command: [\"nginx\"]\n",
    )
    .unwrap();
    let config = SupervisorConfig {
        plan_dir: Some(plans.path().to_path_buf()),
        ..Default::default()
    };
    let h = Harness::start_with(config, PolicyConfig::default()).await;
    let plan: Value = h
        .post("/v1/nodes/plan", None, json!({"node_id": "srv", "role_hint": "server"}))
        .await
        .json()
        .await
        .unwrap();
    assert_eq!(plan["executor"], "docker");
    assert_eq!(plan["apps"][0]["name"], "custom");
    h.shutdown().await;
}

// ============================================================================
// Leader, tenancy, tokens
// ============================================================================

#[tokio::test]
async fn test_leader_claim_is_exclusive() {
    let h = Harness::start().await;
    let admin = h.token(&[scopes::ADMIN]);

    let first: Value = h.post("/v1/leader/claim", Some(&admin), json!({"node_id": "a"})).await.json().await.unwrap();
    assert_eq!(first["granted"], true);
    assert_eq!(first["epoch"], 1);
    assert_eq!(first["leader_url"], "http://supervisor:8070");

    let second: Value = h.post("/v1/leader/claim", Some(&admin), json!({"node_id": "b"})).await.json().await.unwrap();
    assert_eq!(second["granted"], false);
    assert_eq!(second["holder"], "a");

    let anon = h.post("/v1/leader/claim", None, json!({"node_id": "c"})).await;
    assert_eq!(anon.status(), StatusCode::UNAUTHORIZED);
    h.shutdown().await;
}

#[tokio::test]
async fn test_tenancy_plan() {
    let h = Harness::start().await;
    let token = h.node_token();
    let plan: Value = h
        .post("/v1/tenancy/plan", Some(&token), json!({"profile": "prod", "cluster": {"nodes": 3}}))
        .await
        .json()
        .await
        .unwrap();
    assert_eq!(plan["queue"]["replicas"], 3);
    assert_eq!(plan["queue"]["quorum"], true);
    assert_eq!(plan["storage"]["mode"], "distributed");
    assert_eq!(plan["require_tls"], true);

    let resp = h.post("/v1/tenancy/plan", Some(&token), json!({"profile": "galaxy"})).await;
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    h.shutdown().await;
}

#[tokio::test]
async fn test_join_token_exchange_flow() {
    let h = Harness::start().await;
    let admin = h.token(&[scopes::ADMIN]);

    let resp = h.post("/v1/tokens/join", None, json!({"device_id": "cam-1"})).await;
    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);

    let join: Value = h
        .post("/v1/tokens/join", Some(&admin), json!({"device_id": "cam-1", "tenant": "acme"}))
        .await
        .json()
        .await
        .unwrap();
    assert_eq!(join["expires_in"], 600);
    let njt = join["token"].as_str().unwrap();

    let nat: Value = h
        .post("/v1/tokens/exchange", Some(njt), json!({"node_id": "cam-1"}))
        .await
        .json()
        .await
        .unwrap();
    let nat = nat["token"].as_str().unwrap();

    let resp = h.post("/v1/nodes/register", Some(nat), json!({"id": "cam-1"})).await;
    assert_eq!(resp.status(), StatusCode::OK);

    // A platform token cannot be exchanged.
    let resp = h.post("/v1/tokens/exchange", Some(&admin), json!({"node_id": "x"})).await;
    assert_eq!(resp.status(), StatusCode::FORBIDDEN);
    h.shutdown().await;
}

#[tokio::test]
async fn test_health_and_jwks() {
    let h = Harness::start().await;
    let health: Value = h.get("/health", None).await.json().await.unwrap();
    assert_eq!(health, json!({"status": "ok", "agents": 0}));

    let jwks: Value = h.get("/.well-known/jwks.json", None).await.json().await.unwrap();
    assert_eq!(jwks["keys"][0]["kid"], "k1");
    assert_eq!(jwks["keys"][0]["kty"], "OKP");
    h.shutdown().await;
}
