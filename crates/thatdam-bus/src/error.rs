//! Bus errors.

use snafu::Snafu;

pub type Result<T, E = BusError> = std::result::Result<T, E>;

#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum BusError {
    #[snafu(display("failed to encode envelope for {topic}: {source}"))]
    Encode { topic: String, source: serde_json::Error },

    #[snafu(display("failed to decode envelope: {source}"))]
    Decode { source: serde_json::Error },

    #[snafu(display("failed to connect to broker: {source}"))]
    Connect { source: lapin::Error },

    #[snafu(display("broker {op} failed: {source}"))]
    Amqp { op: &'static str, source: lapin::Error },

    /// No live broker connection.
    #[snafu(display("broker not connected"))]
    NotConnected,

    /// The transport was closed.
    #[snafu(display("bus closed"))]
    Closed,

    #[snafu(display("failed to encode audit entry for {topic}: {source}"))]
    AuditEncode { topic: String, source: serde_json::Error },

    #[snafu(display("failed to append audit entry to {path}: {source}"))]
    Audit { path: String, source: std::io::Error },
}
