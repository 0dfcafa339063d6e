//! Compile-time constant assertions.
//!
//! Each assertion verifies a relationship between constants that must hold
//! for correct system operation.

use super::bus::*;
use super::claims::*;
use super::network::*;
use super::node::*;
use super::plan::*;
use super::supervisor::*;
use super::tokens::*;

// ============================================================================
// Timeout Ordering
// ============================================================================

const _: () = assert!(HEALTH_PROBE_TIMEOUT_SECS <= HTTP_TIMEOUT_SECS);
const _: () = assert!(BACKOFF_INITIAL_SECS < BACKOFF_MAX_SECS);
const _: () = assert!(RESTART_BACKOFF_INITIAL_SECS < RESTART_BACKOFF_MAX_SECS);
const _: () = assert!(HTTP_TIMEOUT_SECS <= DISCOVERY_WINDOW_SECS);

// ============================================================================
// Lease Timing
// ============================================================================
// Renewal must fire several times within one TTL or the lease flaps.

const _: () = assert!(LEASE_RENEW_INTERVAL_SECS * 1000 * 3 < LEASE_TTL_MS);

// ============================================================================
// Token Lifetimes
// ============================================================================

const _: () = assert!(NJT_TTL_SECS < NAT_TTL_SECS);
const _: () = assert!(TOKEN_CLOCK_SKEW_SECS < NJT_TTL_SECS);

// ============================================================================
// Capacity Bounds
// ============================================================================

const _: () = assert!(MAX_AGENTS > 0);
const _: () = assert!(MAX_PENDING_CLAIMS > 0);
const _: () = assert!(CLAIM_KEEPALIVE_SECS < CLAIM_TTL_SECS);
const _: () = assert!(MAX_APPS_PER_PLAN > 0);
const _: () = assert!(MAX_PENDING_PUBLISHES > 0);
const _: () = assert!(SUBSCRIBER_CHANNEL_CAPACITY > 0);
const _: () = assert!(DEFAULT_AGENT_TTL_SECS >= 3);
const _: () = assert!(DEFAULT_HEALTH_INTERVAL_SECS < DEFAULT_HEALTH_TIMEOUT_SECS);

// ============================================================================
// Node Handshake
// ============================================================================
// A full registration pass must fit inside one default agent TTL.

const _: () = assert!(REGISTER_ATTEMPTS > 0);
const _: () = assert!(REGISTER_ATTEMPTS as u64 * (REGISTER_RETRY_PAUSE_SECS + HTTP_TIMEOUT_SECS) < DEFAULT_AGENT_TTL_SECS);
const _: () = assert!(MAX_HEARTBEAT_FAILURES > 0);
const _: () = assert!(LEADER_DISCOVERY_TICK_SECS >= DISCOVERY_WINDOW_SECS);
