//! Supervisor registry bounds and heartbeat timing.

/// Default agent heartbeat TTL (30 seconds).
///
/// A healthy agent whose last heartbeat is older than this becomes stale.
pub const DEFAULT_AGENT_TTL_SECS: u64 = 30;

/// Maximum number of agent records held by the registry.
///
/// Tiger Style: Bounded to prevent unbounded memory growth from
/// misbehaving or spoofed nodes.
pub const MAX_AGENTS: usize = 4096;

/// Maximum number of metadata entries kept per agent.
pub const MAX_AGENT_META_ENTRIES: usize = 64;

/// Maximum accepted request body size (256 KB).
pub const MAX_REQUEST_BODY_BYTES: usize = 256 * 1024;

/// Grace period for background tasks to exit after cancellation (5 seconds).
pub const TASK_SHUTDOWN_GRACE_SECS: u64 = 5;

/// Default prefix for lifecycle events published on the bus.
pub const DEFAULT_EVENT_PREFIX: &str = "overlay";

/// Default leader URL handed out by the advisory leader claim.
pub const DEFAULT_LEADER_URL: &str = "http://supervisor:8070";
