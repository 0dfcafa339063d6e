//! Node-side errors.

use snafu::Snafu;

pub type Result<T, E = NodeError> = std::result::Result<T, E>;

/// Failures talking to the supervisor.
///
/// Transport failures (no HTTP response) are told apart from HTTP status
/// failures because the handshake reacts to them differently.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum ClientError {
    #[snafu(display("request to {url} failed: {source}"))]
    Transport { url: String, source: reqwest::Error },

    #[snafu(display("{url} returned {status}"))]
    Status { url: String, status: u16 },

    #[snafu(display("invalid response from {url}: {source}"))]
    Decode { url: String, source: reqwest::Error },

    #[snafu(display("failed to read token file {path}: {source}"))]
    TokenFile { path: String, source: std::io::Error },
}

impl ClientError {
    pub fn status(&self) -> Option<u16> {
        match self {
            ClientError::Status { status, .. } => Some(*status),
            _ => None,
        }
    }

    /// 401 or 403: credentials need refreshing.
    pub fn is_auth_rejection(&self) -> bool {
        matches!(self.status(), Some(401 | 403))
    }

    /// 401, 403 or 404: the supervisor no longer knows us.
    pub fn needs_reregistration(&self) -> bool {
        matches!(self.status(), Some(401 | 403 | 404))
    }

    pub fn is_transport(&self) -> bool {
        matches!(self, ClientError::Transport { .. })
    }
}

/// Failures of discovery backends.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum DiscoveryError {
    #[snafu(display("failed to run {program}: {source}"))]
    Command { program: String, source: std::io::Error },

    #[snafu(display("{program} exited with {code:?}"))]
    CommandFailed { program: String, code: Option<i32> },

    #[snafu(display("failed to parse {program} output: {source}"))]
    ParseOutput { program: String, source: serde_json::Error },

    #[snafu(display("failed to read leader file {path}: {source}"))]
    LeaderFile { path: String, source: std::io::Error },

    #[snafu(display("mdns: {source}"))]
    Mdns { source: mdns_sd::Error },

    #[snafu(display("unknown discovery backend {name:?}"))]
    UnknownBackend { name: String },
}

/// Errors that stop the node.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum NodeError {
    #[snafu(display("failed to read state file {path}: {source}"))]
    ReadState { path: String, source: std::io::Error },

    #[snafu(display("failed to parse state file {path}: {source}"))]
    ParseState { path: String, source: serde_json::Error },

    #[snafu(display("failed to write state file {path}: {source}"))]
    WriteState { path: String, source: std::io::Error },

    #[snafu(display("failed to encode state: {source}"))]
    EncodeState { source: serde_json::Error },

    #[snafu(display("leadership not taken: {reason}"))]
    Leadership { reason: String },

    #[snafu(display("failed to start hosted supervisor: {source}"))]
    HostSupervisor { source: thatdam_supervisor::ServeError },

    #[snafu(display("failed to bind node health endpoint {addr}: {source}"))]
    HealthBind { addr: String, source: std::io::Error },

    #[snafu(display("discovery setup failed: {source}"))]
    Discovery { source: DiscoveryError },

    #[snafu(display("leader lease: {source}"))]
    Bus { source: thatdam_bus::BusError },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_classification() {
        let unauthorized = ClientError::Status {
            url: "u".into(),
            status: 401,
        };
        assert!(unauthorized.is_auth_rejection());
        assert!(unauthorized.needs_reregistration());

        let missing = ClientError::Status {
            url: "u".into(),
            status: 404,
        };
        assert!(!missing.is_auth_rejection());
        assert!(missing.needs_reregistration());

        let server = ClientError::Status {
            url: "u".into(),
            status: 500,
        };
        assert!(!server.needs_reregistration());
        assert!(!server.is_transport());
    }
}
