//! Node handshake timing.

/// Registration attempts per Registering pass.
pub const REGISTER_ATTEMPTS: u32 = 3;

/// Pause between registration attempts (1 second).
pub const REGISTER_RETRY_PAUSE_SECS: u64 = 1;

/// Consecutive heartbeat transport failures before rediscovery.
///
/// Tiger Style: A partitioned node gives up on its supervisor after a
/// bounded number of misses instead of retrying forever.
pub const MAX_HEARTBEAT_FAILURES: u32 = 3;

/// Interval between plan refreshes while heartbeating (60 seconds).
pub const DEFAULT_PLAN_REFRESH_SECS: u64 = 60;

/// How often a leader without a hosted supervisor re-runs discovery
/// (10 seconds).
pub const LEADER_DISCOVERY_TICK_SECS: u64 = 10;

/// Lower bound on the heartbeat interval (100 milliseconds).
pub const MIN_HEARTBEAT_INTERVAL_MS: u64 = 100;
