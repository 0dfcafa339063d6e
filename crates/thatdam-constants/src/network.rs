//! Network timeouts, retry backoff and well-known ports.

// ============================================================================
// Outbound HTTP
// ============================================================================

/// Default timeout for every outbound HTTP call (5 seconds).
///
/// Tiger Style: No request may block a task indefinitely.
pub const HTTP_TIMEOUT_SECS: u64 = 5;

/// Per-request timeout used by health polling (3 seconds).
pub const HEALTH_PROBE_TIMEOUT_SECS: u64 = 3;

// ============================================================================
// Retry / Backoff
// ============================================================================

/// Initial delay for exponential backoff (1 second).
pub const BACKOFF_INITIAL_SECS: u64 = 1;

/// Cap for exponential backoff on transient upstream failures (30 seconds).
///
/// Tiger Style: Bounded backoff keeps recovery latency predictable.
pub const BACKOFF_MAX_SECS: u64 = 30;

// ============================================================================
// Discovery
// ============================================================================

/// mDNS service type advertised by a node hosting the supervisor.
pub const MDNS_SERVICE_TYPE: &str = "_thatdam-server._tcp.local.";

/// Port the supervisor listens on by default.
pub const SUPERVISOR_PORT: u16 = 8080;

/// Port of the node-local health endpoint.
pub const NODE_HEALTH_PORT: u16 = 9999;

/// Total window a node spends probing discovery backends (10 seconds).
pub const DISCOVERY_WINDOW_SECS: u64 = 10;

/// Maximum candidate supervisors probed per discovery round.
pub const MAX_DISCOVERY_CANDIDATES: usize = 32;
