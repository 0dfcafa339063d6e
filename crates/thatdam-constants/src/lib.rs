//! Centralized constants for the ThatDam control plane.
//!
//! Tiger Style: Constants are fixed and immutable, enforced at compile time.
//! Each constant has explicit bounds to prevent unbounded resource allocation.
//!
//! # Modules
//!
//! - [`network`]: Outbound HTTP timeouts, retry backoff, discovery ports
//! - [`supervisor`]: Agent registry bounds and heartbeat TTLs
//! - [`claims`]: Pairing claim lifetimes and capacity
//! - [`plan`]: Desired-plan sizes and health polling defaults
//! - [`bus`]: Publish queue bounds and leader lease timing
//! - [`tokens`]: Token lifetimes and clock skew
//! - [`node`]: Handshake retries and refresh cadence
//!
//! # Usage
//!
//! ```
//! use thatdam_constants::network::HTTP_TIMEOUT_SECS;
//! use thatdam_constants::supervisor::DEFAULT_AGENT_TTL_SECS;
//! ```

mod assertions;
pub mod bus;
pub mod claims;
pub mod network;
pub mod node;
pub mod plan;
pub mod supervisor;
pub mod tokens;
