//! ThatDam supervisor: the control-plane HTTP service.
//!
//! Nodes register, fetch desired plans, heartbeat and claim advisory
//! leadership here. Every request is gated by a [`PolicyEngine`]: the
//! caller is extracted from a bearer token or `X-API-Key`, mapped to an
//! [`Action`], and denied with 401 (no credentials) or 403 (insufficient
//! scope). Register and heartbeat publish lifecycle events on the bus.
//!
//! ```no_run
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! use std::sync::Arc;
//!
//! use thatdam_auth::TokenIssuer;
//! use thatdam_bus::{AuditLog, BusHandle};
//! use thatdam_supervisor::{SupervisorConfig, SupervisorServer, SupervisorState};
//! use tokio_util::sync::CancellationToken;
//!
//! let issuer = Arc::new(TokenIssuer::generate("k1", "https://auth.example", "thatdam")?);
//! let bus = BusHandle::in_process(AuditLog::new("data/audit.log"));
//! let state = Arc::new(SupervisorState::new(SupervisorConfig::default(), issuer, bus));
//! let cancel = CancellationToken::new();
//! let server = SupervisorServer::bind("127.0.0.1:8080", state, &cancel).await?;
//! server.wait().await?;
//! # Ok(())
//! # }
//! ```
//!
//! [`PolicyEngine`]: thatdam_policy::PolicyEngine
//! [`Action`]: thatdam_policy::Action

pub mod api;
pub mod config;
pub mod error;
pub mod events;
pub mod extract;
pub mod handlers;
pub mod leader;
pub mod plan;
pub mod registry;
pub mod router;
pub mod server;
pub mod state;
pub mod sweeper;

pub use config::SupervisorConfig;
pub use error::ApiError;
pub use error::RegistryError;
pub use leader::LeaderTable;
pub use registry::Agent;
pub use registry::AgentRegistry;
pub use registry::AgentStatus;
pub use router::build_router;
pub use server::ServeError;
pub use server::SupervisorServer;
pub use state::SupervisorState;
