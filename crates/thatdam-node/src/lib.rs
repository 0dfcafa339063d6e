//! ThatDam node agent.
//!
//! A node finds a supervisor, registers, fetches and applies its plan, then
//! heartbeats. When no supervisor answers it elects itself leader and,
//! optionally, hosts the supervisor for its peers.
//!
//! # Modules
//!
//! - [`handshake`]: The state machine
//! - [`discovery`]: Static, leader-file, mDNS, gossip and overlay backends
//! - [`client`]: Supervisor HTTP client
//! - [`token`]: Credential sources
//! - [`state`]: Atomic `cluster.json` store
//! - [`leader`]: Duties taken up on self-election
//! - [`health`]: Node-local health endpoint
//! - [`capabilities`]: Device probe
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use thatdam_node::run_node;
//! use thatdam_node::NoDuties;
//! use thatdam_node::NodeConfig;
//! use tokio_util::sync::CancellationToken;
//!
//! # async fn example() -> Result<(), thatdam_node::NodeError> {
//! let cancel = CancellationToken::new();
//! run_node(NodeConfig::from_env(), Arc::new(NoDuties), cancel).await?;
//! # Ok(())
//! # }
//! ```

pub mod capabilities;
pub mod client;
pub mod config;
pub mod discovery;
pub mod error;
pub mod handshake;
pub mod health;
pub mod leader;
pub mod runner;
pub mod state;
pub mod status;
pub mod token;

pub use client::Credential;
pub use client::SupervisorClient;
pub use config::NodeConfig;
pub use discovery::Discoverer;
pub use discovery::Discovery;
pub use discovery::Locate;
pub use error::ClientError;
pub use error::DiscoveryError;
pub use error::NodeError;
pub use handshake::Handshake;
pub use handshake::HandshakeTimings;
pub use health::HealthServer;
pub use leader::HostedSupervisor;
pub use leader::LeaderDuties;
pub use leader::Leadership;
pub use leader::LocalSupervisor;
pub use leader::NoDuties;
pub use leader::StandardDuties;
pub use runner::build_handshake;
pub use runner::run_node;
pub use state::ClusterRecord;
pub use state::Role;
pub use state::StateStore;
pub use status::HandshakeState;
pub use status::NodeStatus;
pub use token::TokenSource;
