use std::collections::BTreeMap;

use serde::Deserialize;
use serde::Serialize;

use crate::Action;
use crate::Principal;
use crate::principal::scopes;

/// Authorization gate consulted by every control-plane handler.
///
/// Implementations must be side-effect free and safe for concurrent calls.
pub trait PolicyEngine: Send + Sync {
    /// Decide whether `principal` may perform `action`.
    fn allow(&self, principal: &Principal, action: Action) -> bool;

    /// Feature flags surfaced for plan shaping.
    fn flags(&self) -> BTreeMap<String, bool>;
}

/// Toggles behind [`EnvPolicy`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PolicyConfig {
    /// Let anonymous nodes register (and receive camera-proxy plans).
    #[serde(default)]
    pub allow_anonymous_proxy: bool,
    /// Refuse plan reads from anonymous callers.
    #[serde(default)]
    pub require_auth_for_plan: bool,
    /// Require `thatdam:apply` for bootstrap application.
    #[serde(default)]
    pub require_auth_for_bootstrap: bool,
}

impl PolicyConfig {
    /// Read the toggles from `POLICY_*` environment variables.
    ///
    /// Unset or unparsable values are `false`.
    pub fn from_env() -> Self {
        let mut config = Self::default();
        config.apply_env_overrides();
        config
    }

    /// Override fields whose environment variable is set to a boolean.
    pub fn apply_env_overrides(&mut self) {
        if let Some(v) = env_bool("POLICY_ALLOW_ANONYMOUS_PROXY") {
            self.allow_anonymous_proxy = v;
        }
        if let Some(v) = env_bool("POLICY_REQUIRE_AUTH_FOR_PLAN") {
            self.require_auth_for_plan = v;
        }
        if let Some(v) = env_bool("POLICY_REQUIRE_AUTH_FOR_BOOTSTRAP") {
            self.require_auth_for_bootstrap = v;
        }
    }
}

fn env_bool(key: &str) -> Option<bool> {
    let raw = std::env::var(key).ok()?;
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "t" | "true" | "yes" | "on" => Some(true),
        "0" | "f" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

/// Environment-flag driven policy.
///
/// | action          | anonymous                     | authenticated                 |
/// |-----------------|-------------------------------|-------------------------------|
/// | register        | `allow_anonymous_proxy`       | `thatdam:register`            |
/// | heartbeat       | deny                          | `thatdam:register`            |
/// | plan.read       | `!require_auth_for_plan`      | `thatdam:read`                |
/// | bootstrap.apply | deny                          | `thatdam:apply` if required   |
/// | leader.claim    | deny                          | `thatdam:admin`               |
#[derive(Debug, Clone, Default)]
pub struct EnvPolicy {
    config: PolicyConfig,
}

impl EnvPolicy {
    pub fn new(config: PolicyConfig) -> Self {
        Self { config }
    }

    pub fn from_env() -> Self {
        Self::new(PolicyConfig::from_env())
    }

    pub fn config(&self) -> &PolicyConfig {
        &self.config
    }
}

impl PolicyEngine for EnvPolicy {
    fn allow(&self, principal: &Principal, action: Action) -> bool {
        if principal.is_anonymous() {
            return match action {
                Action::Register => self.config.allow_anonymous_proxy,
                Action::PlanRead => !self.config.require_auth_for_plan,
                Action::Heartbeat | Action::BootstrapApply | Action::LeaderClaim => false,
            };
        }

        match action {
            Action::Register | Action::Heartbeat => principal.has_scope(scopes::REGISTER),
            Action::PlanRead => principal.has_scope(scopes::READ),
            Action::BootstrapApply => {
                !self.config.require_auth_for_bootstrap || principal.has_scope(scopes::APPLY)
            }
            Action::LeaderClaim => principal.has_scope(scopes::ADMIN),
        }
    }

    fn flags(&self) -> BTreeMap<String, bool> {
        BTreeMap::from([
            ("allowAnonymousProxy".to_string(), self.config.allow_anonymous_proxy),
            ("requireAuthForPlan".to_string(), self.config.require_auth_for_plan),
            ("requireAuthForBootstrap".to_string(), self.config.require_auth_for_bootstrap),
        ])
    }
}
