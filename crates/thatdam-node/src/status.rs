//! Handshake state as seen from outside the loop.

use serde::Serialize;

use crate::state::Role;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum HandshakeState {
    #[default]
    Init,
    Discovering,
    Registering,
    Planning,
    Applying,
    Heartbeating,
    SelfElecting,
    Terminated,
}

impl HandshakeState {
    pub fn as_str(&self) -> &'static str {
        match self {
            HandshakeState::Init => "init",
            HandshakeState::Discovering => "discovering",
            HandshakeState::Registering => "registering",
            HandshakeState::Planning => "planning",
            HandshakeState::Applying => "applying",
            HandshakeState::Heartbeating => "heartbeating",
            HandshakeState::SelfElecting => "selfelecting",
            HandshakeState::Terminated => "terminated",
        }
    }
}

impl std::fmt::Display for HandshakeState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Published on the handshake's watch channel after every transition.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct NodeStatus {
    pub node_id: String,
    pub role: Role,
    pub epoch: u64,
    pub state: HandshakeState,
    /// Supervisor currently in use.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub supervisor: Option<String>,
}
