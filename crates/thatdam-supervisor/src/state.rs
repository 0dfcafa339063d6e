//! Shared state behind every handler.

use std::sync::Arc;

use thatdam_auth::TokenIssuer;
use thatdam_auth::TokenValidator;
use thatdam_bus::BusHandle;
use thatdam_claims::ClaimStore;
use thatdam_plan::PlanTemplates;
use thatdam_policy::EnvPolicy;
use thatdam_policy::PolicyEngine;

use crate::config::SupervisorConfig;
use crate::events::EventPublisher;
use crate::leader::LeaderTable;
use crate::registry::AgentRegistry;

/// Everything a request handler may touch.
///
/// Built once at startup and shared as `Arc<SupervisorState>`.
pub struct SupervisorState {
    pub(crate) config: SupervisorConfig,
    pub(crate) policy: Arc<dyn PolicyEngine>,
    pub(crate) issuer: Arc<TokenIssuer>,
    pub(crate) validator: Arc<TokenValidator>,
    pub(crate) registry: Arc<AgentRegistry>,
    pub(crate) claims: Arc<ClaimStore>,
    pub(crate) leader: LeaderTable,
    pub(crate) templates: PlanTemplates,
    pub(crate) events: EventPublisher,
}

impl SupervisorState {
    /// State with the default policy and a validator over the issuer's own key.
    pub fn new(config: SupervisorConfig, issuer: Arc<TokenIssuer>, bus: BusHandle) -> Self {
        let validator = Arc::new(issuer.validator());
        let registry = Arc::new(AgentRegistry::new(config.agent_ttl()));
        let templates = PlanTemplates::with_plan_dir(config.plan_dir.clone());
        let events = EventPublisher::new(bus, config.event_prefix.clone());
        Self {
            config,
            policy: Arc::new(EnvPolicy::default()),
            issuer,
            validator,
            registry,
            claims: Arc::new(ClaimStore::new()),
            leader: LeaderTable::default(),
            templates,
            events,
        }
    }

    pub fn with_policy(mut self, policy: Arc<dyn PolicyEngine>) -> Self {
        self.policy = policy;
        self
    }

    /// Validate bearer tokens against another key source (e.g. remote JWKS).
    pub fn with_validator(mut self, validator: TokenValidator) -> Self {
        self.validator = Arc::new(validator);
        self
    }

    pub fn with_templates(mut self, templates: PlanTemplates) -> Self {
        self.templates = templates;
        self
    }

    pub fn with_claims(mut self, claims: Arc<ClaimStore>) -> Self {
        self.claims = claims;
        self
    }

    pub fn config(&self) -> &SupervisorConfig {
        &self.config
    }

    pub fn registry(&self) -> &Arc<AgentRegistry> {
        &self.registry
    }

    pub fn claims(&self) -> &Arc<ClaimStore> {
        &self.claims
    }

    pub fn issuer(&self) -> &Arc<TokenIssuer> {
        &self.issuer
    }

    pub fn bus(&self) -> &BusHandle {
        self.events.bus()
    }

    /// Whether anonymous callers may receive camera-proxy plans.
    pub(crate) fn allow_anonymous_proxy(&self) -> bool {
        self.policy.flags().get("allowAnonymousProxy").copied().unwrap_or(false)
    }
}
