//! Pairing claim bounds.

/// Number of random bytes behind each claim id and token (hex encoded to 32 chars).
pub const CLAIM_RANDOM_BYTES: usize = 16;

/// Lifetime of an unfulfilled claim (10 minutes).
pub const CLAIM_TTL_SECS: u64 = 600;

/// Keepalive interval on the claim watch stream (15 seconds).
pub const CLAIM_KEEPALIVE_SECS: u64 = 15;

/// Maximum number of claims held at once.
///
/// Tiger Style: Bounded so a flood of `new` calls cannot exhaust memory.
pub const MAX_PENDING_CLAIMS: usize = 10_000;

/// Interval of the claim expiry sweep (60 seconds).
pub const CLAIM_SWEEP_INTERVAL_SECS: u64 = 60;
