//! Desired-plan bounds and health polling defaults.

/// Maximum apps in a single desired plan.
///
/// Tiger Style: Bounded so the O(n^2) ordering scan stays cheap.
pub const MAX_APPS_PER_PLAN: usize = 256;

/// Health poll interval used when a check leaves it unset (3 seconds).
pub const DEFAULT_HEALTH_INTERVAL_SECS: u64 = 3;

/// Health timeout used when a check leaves it unset (30 seconds).
pub const DEFAULT_HEALTH_TIMEOUT_SECS: u64 = 30;

/// Container image used when a Next.js build falls back to docker.
pub const NEXTJS_BUILD_IMAGE: &str = "node:20-alpine";

/// Initial restart delay for `restart=always` units (1 second).
pub const RESTART_BACKOFF_INITIAL_SECS: u64 = 1;

/// Cap on the restart delay for `restart=always` units (30 seconds).
pub const RESTART_BACKOFF_MAX_SECS: u64 = 30;
