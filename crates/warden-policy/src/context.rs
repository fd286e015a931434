//! Evaluation context assembled by the caller before a policy run.
//!
//! The engine never reaches outside this struct. Everything a rule can
//! observe is gathered here up front, so evaluation stays deterministic
//! and side-effect free.

use serde::{Deserialize, Serialize};
use warden_types::{CapabilityId, RiskTier, SessionId, TrustState};

/// Snapshot of the facts a policy run is judged against.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PolicyContext {
    /// Capability the caller is attempting to exercise.
    pub capability_id: CapabilityId,
    /// Concrete operation within the capability, e.g. `execute`.
    pub action_id: String,
    /// Session this attempt belongs to, when one exists.
    pub session_id: Option<SessionId>,
    /// Risk tier taken from the capability definition.
    pub tier: RiskTier,
    /// Normalized risk score in `[0.0, 1.0]`.
    pub risk_score: f64,
    /// Whether the grant-store check already passed for this attempt.
    pub auth_allowed: bool,
    /// Short status string from the authorization layer, when available.
    pub auth_status: Option<String>,
    /// Whether a sandbox is available for side-effecting operations.
    pub sandbox_available: bool,
    /// Trust state of the agent, when the trust provider supplied one.
    pub trust_state: Option<TrustState>,
    /// How many times this agent has executed operations today.
    pub execution_count_today: i64,
}

impl PolicyContext {
    pub fn new(capability_id: CapabilityId, action_id: impl Into<String>, tier: RiskTier) -> Self {
        Self {
            capability_id,
            action_id: action_id.into(),
            session_id: None,
            tier,
            risk_score: 0.0,
            auth_allowed: true,
            auth_status: None,
            sandbox_available: true,
            trust_state: None,
            execution_count_today: 0,
        }
    }

    pub fn with_session(mut self, session_id: SessionId) -> Self {
        self.session_id = Some(session_id);
        self
    }

    pub fn with_risk_score(mut self, risk_score: f64) -> Self {
        self.risk_score = risk_score.clamp(0.0, 1.0);
        self
    }

    pub fn with_auth(mut self, allowed: bool, status: impl Into<String>) -> Self {
        self.auth_allowed = allowed;
        self.auth_status = Some(status.into());
        self
    }

    pub fn with_sandbox_available(mut self, available: bool) -> Self {
        self.sandbox_available = available;
        self
    }

    pub fn with_trust_state(mut self, trust_state: TrustState) -> Self {
        self.trust_state = Some(trust_state);
        self
    }

    pub fn with_execution_count(mut self, count: i64) -> Self {
        self.execution_count_today = count;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_risk_score_is_clamped() {
        let cap: CapabilityId = "action.shell.exec".parse().unwrap();
        let ctx = PolicyContext::new(cap, "execute", RiskTier::High).with_risk_score(1.7);
        assert_eq!(ctx.risk_score, 1.0);
    }
}
