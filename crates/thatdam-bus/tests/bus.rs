//! Bus facade and lease keeper behaviour over in-process transports.

use std::sync::Arc;
use std::time::Duration;

use serde_json::json;
use thatdam_bus::AuditLog;
use thatdam_bus::BusHandle;
use thatdam_bus::InProcLease;
use thatdam_bus::LeaderLease;
use thatdam_bus::LeaseKeeper;
use tokio_util::sync::CancellationToken;

// ============================================================================
// Facade
// ============================================================================

#[tokio::test]
async fn test_publish_reaches_matching_subscriber() {
    let dir = tempfile::tempdir().unwrap();
    let bus = BusHandle::in_process(AuditLog::new(dir.path().join("audit.log")));
    assert_eq!(bus.transport_name(), "inproc");

    let mut overlay = bus.subscribe("overlay.*").await.unwrap();
    let mut tenants = bus.subscribe("tenant.#").await.unwrap();

    bus.publish("overlay.register", &json!({"action": "register", "agent": "n1"})).await.unwrap();

    let envelope = tokio::time::timeout(Duration::from_secs(1), overlay.recv()).await.unwrap().unwrap();
    assert_eq!(envelope.topic, "overlay.register");
    assert_eq!(envelope.payload["agent"], "n1");
    assert!(tenants.try_recv().is_err());
}

#[tokio::test]
async fn test_tenant_event_is_published_and_audited() {
    let dir = tempfile::tempdir().unwrap();
    let audit_path = dir.path().join("data").join("audit.log");
    let bus = BusHandle::in_process(AuditLog::new(&audit_path));
    let mut tenants = bus.subscribe("tenant.*").await.unwrap();

    bus.publish_tenant_event("created", &json!({"tenant": "acme"})).await.unwrap();

    let envelope = tokio::time::timeout(Duration::from_secs(1), tenants.recv()).await.unwrap().unwrap();
    assert_eq!(envelope.topic, "tenant.created");

    let text = std::fs::read_to_string(&audit_path).unwrap();
    let line: serde_json::Value = serde_json::from_str(text.trim()).unwrap();
    assert_eq!(line["topic"], "tenant.created");
    assert_eq!(line["payload"]["tenant"], "acme");
}

#[tokio::test]
async fn test_publish_after_close_fails() {
    let dir = tempfile::tempdir().unwrap();
    let bus = BusHandle::in_process(AuditLog::new(dir.path().join("audit.log")));
    bus.close().await;
    assert!(bus.publish("overlay.register", &json!({})).await.is_err());
}

// ============================================================================
// Lease keeper
// ============================================================================

#[tokio::test]
async fn test_keeper_holds_lease_across_renewals() {
    let lease = Arc::new(InProcLease::new(Duration::from_millis(200)));
    assert!(lease.acquire("default", "sup-1").await.unwrap());

    let root = CancellationToken::new();
    let mut keeper =
        LeaseKeeper::spawn_with_interval(lease.clone(), "default", "sup-1", &root, Duration::from_millis(20));
    tokio::time::sleep(Duration::from_millis(300)).await;
    assert!(keeper.is_held());
    assert_eq!(lease.holder("default").as_deref(), Some("sup-1"));

    keeper.shutdown().await;
    assert!(lease.holder("default").is_none());
}

#[tokio::test]
async fn test_keeper_reports_lost_lease() {
    let lease = Arc::new(InProcLease::new(Duration::from_secs(20)));
    assert!(lease.acquire("default", "sup-1").await.unwrap());

    let root = CancellationToken::new();
    let keeper = LeaseKeeper::spawn_with_interval(lease.clone(), "default", "sup-1", &root, Duration::from_millis(20));
    let mut held = keeper.watch();

    // Someone else takes over once the lease is released out from under us.
    lease.release("default", "sup-1").await.unwrap();
    assert!(lease.acquire("default", "sup-2").await.unwrap());

    tokio::time::timeout(Duration::from_secs(1), held.wait_for(|h| !h)).await.unwrap().unwrap();
    assert!(!keeper.is_held());
    assert_eq!(lease.holder("default").as_deref(), Some("sup-2"));
}
