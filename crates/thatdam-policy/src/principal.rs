use std::collections::BTreeSet;

use serde::Deserialize;
use serde::Serialize;

/// Well-known scope names.
pub mod scopes {
    /// Register and heartbeat as a node.
    pub const REGISTER: &str = "thatdam:register";
    /// Read plans and the agent registry.
    pub const READ: &str = "thatdam:read";
    /// Apply bootstrap profiles.
    pub const APPLY: &str = "thatdam:apply";
    /// Administrative operations (leader claim, token minting).
    pub const ADMIN: &str = "thatdam:admin";
    /// Single scope carried by node join tokens.
    pub const NODE_JOIN: &str = "node:join";

    /// All `thatdam:*` scopes, granted to API key holders.
    pub const ALL_THATDAM: [&str; 4] = [REGISTER, READ, APPLY, ADMIN];
}

/// Authenticated subject of a request.
///
/// The anonymous principal has an empty `sub` and no scopes.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Principal {
    /// Subject identifier; empty for anonymous callers.
    pub sub: String,
    /// Granted scopes.
    #[serde(default)]
    pub scopes: BTreeSet<String>,
    /// Roles carried by the token.
    #[serde(default)]
    pub roles: Vec<String>,
    /// Tenant the token was issued for.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tenant: Option<String>,
}

impl Principal {
    /// The unauthenticated principal.
    pub fn anonymous() -> Self {
        Self::default()
    }

    /// Principal with the given subject and scopes.
    pub fn new<I, S>(sub: impl Into<String>, scopes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            sub: sub.into(),
            scopes: scopes.into_iter().map(Into::into).collect(),
            roles: Vec::new(),
            tenant: None,
        }
    }

    pub fn with_roles(mut self, roles: Vec<String>) -> Self {
        self.roles = roles;
        self
    }

    pub fn with_tenant(mut self, tenant: Option<String>) -> Self {
        self.tenant = tenant;
        self
    }

    pub fn is_anonymous(&self) -> bool {
        self.sub.is_empty()
    }

    pub fn has_scope(&self, scope: &str) -> bool {
        self.scopes.contains(scope)
    }
}
