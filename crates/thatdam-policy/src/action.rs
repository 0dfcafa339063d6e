use std::fmt;
use std::str::FromStr;

use serde::Deserialize;
use serde::Serialize;
use thiserror::Error;

/// Control-plane operations subject to authorization.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Action {
    #[serde(rename = "register")]
    Register,
    #[serde(rename = "plan.read")]
    PlanRead,
    #[serde(rename = "heartbeat")]
    Heartbeat,
    #[serde(rename = "bootstrap.apply")]
    BootstrapApply,
    #[serde(rename = "leader.claim")]
    LeaderClaim,
}

impl Action {
    /// Every action, in declaration order.
    pub const ALL: [Action; 5] = [
        Action::Register,
        Action::PlanRead,
        Action::Heartbeat,
        Action::BootstrapApply,
        Action::LeaderClaim,
    ];

    /// Wire name of the action.
    pub fn as_str(&self) -> &'static str {
        match self {
            Action::Register => "register",
            Action::PlanRead => "plan.read",
            Action::Heartbeat => "heartbeat",
            Action::BootstrapApply => "bootstrap.apply",
            Action::LeaderClaim => "leader.claim",
        }
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Returned when a string does not name a known action.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown action: {0}")]
pub struct ParseActionError(pub String);

impl FromStr for Action {
    type Err = ParseActionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Action::ALL
            .into_iter()
            .find(|a| a.as_str() == s)
            .ok_or_else(|| ParseActionError(s.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_action_round_trips_through_wire_name() {
        for action in Action::ALL {
            assert_eq!(action.as_str().parse::<Action>().unwrap(), action);
        }
    }

    #[test]
    fn test_unknown_action_rejected() {
        let err = "plan.write".parse::<Action>().unwrap_err();
        assert_eq!(err.to_string(), "unknown action: plan.write");
    }

    #[test]
    fn test_action_serde_uses_dotted_names() {
        let json = serde_json::to_string(&Action::LeaderClaim).unwrap();
        assert_eq!(json, "\"leader.claim\"");
        let back: Action = serde_json::from_str("\"plan.read\"").unwrap();
        assert_eq!(back, Action::PlanRead);
    }
}
