//! Event bus for control-plane events.
//!
//! [`BusHandle`] is the single process-wide bus resource: created with
//! [`BusHandle::init`], torn down with [`BusHandle::close`], and passed
//! explicitly to whoever publishes. It wraps JSON [`Envelope`]s and picks a
//! transport from [`BusConfig`]:
//!
//! - AMQP topic exchange when a broker URL is configured, with a reconnect
//!   pump and a bounded retry queue that drops the oldest on overflow
//! - In-process fan-out otherwise
//!
//! The crate also hosts the advisory [`LeaderLease`] used for leader
//! election and the [`LeaseKeeper`] that renews it.

pub mod amqp;
pub mod audit;
pub mod config;
pub mod envelope;
pub mod error;
pub mod facade;
pub mod inproc;
pub mod lease;
pub mod retry;
pub mod topic;
pub mod transport;

pub use audit::AuditLog;
pub use config::BusConfig;
pub use envelope::Envelope;
pub use error::BusError;
pub use error::Result;
pub use facade::BusHandle;
pub use lease::AmqpLease;
pub use lease::InProcLease;
pub use lease::LeaderLease;
pub use lease::LeaseKeeper;
pub use transport::Transport;
