//! Persisted record types: grants, invocation audit entries, governance
//! decisions and confirm-gated change requests.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::{
    AgentId, AuditEntryId, CapabilityId, ChangeRequestId, DecisionId, GovernanceStatus, GrantId,
    TimestampMs, Verdict,
};

/// A record authorizing an agent to invoke a capability.
///
/// Created by `grant`, destroyed by `revoke` (hard delete plus audit row),
/// and naturally expires when `expires_at` passes — expired rows are simply
/// excluded by queries, never physically reaped.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CapabilityGrant {
    pub grant_id: GrantId,
    pub agent_id: AgentId,
    pub capability_id: CapabilityId,
    pub granted_by: String,
    pub granted_at: TimestampMs,
    /// `None` = never expires
    pub expires_at: Option<TimestampMs>,
    /// `None` = unscoped (matches any scope)
    pub scope: Option<String>,
    pub reason: Option<String>,
    pub metadata: serde_json::Value,
}

impl CapabilityGrant {
    /// Whether this grant is active at `now`.
    pub fn is_active_at(&self, now: TimestampMs) -> bool {
        self.expires_at.map_or(true, |exp| exp > now)
    }

    /// Whether this grant covers the given scope: an unscoped grant
    /// matches anything, a scoped grant matches only its own scope.
    pub fn covers_scope(&self, scope: Option<&str>) -> bool {
        match (&self.scope, scope) {
            (None, _) => true,
            (Some(own), Some(given)) => own == given,
            (Some(_), None) => false,
        }
    }
}

/// One append-only audit row per permission check or grant mutation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InvocationRecord {
    pub id: AuditEntryId,
    pub agent_id: AgentId,
    pub capability_id: CapabilityId,
    /// `grant`, `revoke`, or the caller-supplied operation name
    pub operation: String,
    pub allowed: bool,
    pub reason: Option<String>,
    pub context: serde_json::Value,
    pub timestamp: TimestampMs,
}

/// A tracked governance decision, mutated only through the validated
/// transition function. Terminal statuses are never mutated again.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GovernanceDecisionRecord {
    pub id: DecisionId,
    pub agent_id: AgentId,
    pub capability_id: CapabilityId,
    pub status: GovernanceStatus,
    pub final_verdict: Verdict,
    pub created_at: TimestampMs,
    pub updated_at: TimestampMs,
}

/// Status of a store-backed confirm-gate change request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeRequestStatus {
    /// Awaiting the caller's explicit re-affirmation
    ConfirmRequired,
    /// Consumed exactly once on a successful resubmission
    Completed,
}

impl ChangeRequestStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ConfirmRequired => "confirm_required",
            Self::Completed => "completed",
        }
    }
}

impl fmt::Display for ChangeRequestStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A persisted change request backing the stateful confirm-gate variant.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChangeRequest {
    pub id: ChangeRequestId,
    pub agent_id: AgentId,
    /// Operation the caller must re-affirm
    pub operation: String,
    /// Hash binding the token to the exact request payload
    pub payload_hash: String,
    pub status: ChangeRequestStatus,
    pub created_at: TimestampMs,
    pub consumed_at: Option<TimestampMs>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn grant(expires_at: Option<TimestampMs>, scope: Option<&str>) -> CapabilityGrant {
        CapabilityGrant {
            grant_id: GrantId::new(),
            agent_id: AgentId::new("agentA"),
            capability_id: CapabilityId::parse("state.memory.read").unwrap(),
            granted_by: "admin".to_string(),
            granted_at: 1_000,
            expires_at,
            scope: scope.map(|s| s.to_string()),
            reason: None,
            metadata: serde_json::Value::Null,
        }
    }

    #[test]
    fn test_expiry_semantics() {
        assert!(grant(None, None).is_active_at(i64::MAX));
        assert!(grant(Some(2_000), None).is_active_at(1_999));
        assert!(!grant(Some(2_000), None).is_active_at(2_000));
        assert!(!grant(Some(2_000), None).is_active_at(3_000));
    }

    #[test]
    fn test_scope_matching() {
        let unscoped = grant(None, None);
        assert!(unscoped.covers_scope(None));
        assert!(unscoped.covers_scope(Some("project-x")));

        let scoped = grant(None, Some("project-x"));
        assert!(scoped.covers_scope(Some("project-x")));
        assert!(!scoped.covers_scope(Some("project-y")));
        assert!(!scoped.covers_scope(None));
    }
}
