//! ThatDam control plane.
//!
//! The libraries live in `crates/`; this package holds the two binaries
//! and the configuration layer they share:
//!
//! - `thatdam-supervisor`: registry, plans, claims, tokens and JWKS over HTTP
//! - `thatdam-node`: discovery, registration, plan application and leader election
//!
//! [`config::AppConfig`] merges defaults, an optional TOML file and the
//! environment into one value per process.

pub mod config;
pub mod shutdown;
pub mod telemetry;

pub use config::AppConfig;
pub use config::ConfigError;
pub use thatdam_auth as auth;
pub use thatdam_bus as bus;
pub use thatdam_claims as claims;
pub use thatdam_constants as constants;
pub use thatdam_node as node;
pub use thatdam_plan as plan;
pub use thatdam_policy as policy;
pub use thatdam_reconcile as reconcile;
pub use thatdam_supervisor as supervisor;
