//! Message bus and advisory lease timing.

/// Maximum envelopes buffered while the broker is unreachable.
///
/// Tiger Style: Overflow drops the oldest envelope rather than blocking publishers.
pub const MAX_PENDING_PUBLISHES: usize = 1024;

/// Capacity of each in-process subscriber channel.
pub const SUBSCRIBER_CHANNEL_CAPACITY: usize = 64;

/// Leader lease TTL (20 seconds), used as the queue `x-expires` argument.
pub const LEASE_TTL_MS: u64 = 20_000;

/// Leader lease renewal tick (5 seconds).
pub const LEASE_RENEW_INTERVAL_SECS: u64 = 5;

/// Default topic exchange name when none is configured.
pub const DEFAULT_EXCHANGE: &str = "thatdam";

/// Prefix for lease queues on the broker.
pub const LEASE_QUEUE_PREFIX: &str = "lock.ring.";
