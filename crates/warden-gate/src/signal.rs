//! Structured control signals raised at the boundary.
//!
//! Every non-allow outcome becomes exactly one [`GateSignal`]. All three
//! gate kinds share one soft, retryable conflict status at the transport
//! boundary; hard credential failures are a different status entirely and
//! never modeled as gates.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use warden_types::{CapabilityId, RiskTier, WardenError};

/// Which boundary raised the signal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GateKind {
    /// Caller identity is unestablished or mismatched. Recoverable by
    /// registering or confirming the identity out of band.
    Trust,
    /// High-risk operation needs one explicit re-affirmation, carried by a
    /// single-use confirm token bound to the request payload.
    Confirm,
    /// Denied by rule evaluation or by infrastructure unavailability.
    Policy,
}

impl GateKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            GateKind::Trust => "trust",
            GateKind::Confirm => "confirm",
            GateKind::Policy => "policy",
        }
    }
}

/// The gate error contract consumed by boundary collaborators.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GateSignal {
    pub error_code: String,
    pub gate: GateKind,
    pub message: String,
    /// Sorted map, so serialized signals are deterministic.
    pub context: BTreeMap<String, serde_json::Value>,
    pub capability_id: Option<CapabilityId>,
    pub risk_tier: Option<RiskTier>,
    /// Present on confirm gates only.
    pub confirm_token: Option<String>,
}

impl GateSignal {
    pub fn trust(message: impl Into<String>) -> Self {
        Self {
            error_code: "TRUST_GATE".to_string(),
            gate: GateKind::Trust,
            message: message.into(),
            context: BTreeMap::new(),
            capability_id: None,
            risk_tier: None,
            confirm_token: None,
        }
    }

    pub fn confirm(message: impl Into<String>, confirm_token: impl Into<String>) -> Self {
        Self {
            error_code: "CONFIRM_REQUIRED".to_string(),
            gate: GateKind::Confirm,
            message: message.into(),
            context: BTreeMap::new(),
            capability_id: None,
            risk_tier: None,
            confirm_token: Some(confirm_token.into()),
        }
    }

    pub fn policy(error_code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            error_code: error_code.into(),
            gate: GateKind::Policy,
            message: message.into(),
            context: BTreeMap::new(),
            capability_id: None,
            risk_tier: None,
            confirm_token: None,
        }
    }

    /// Store-not-initialized on a write path. A denial the operator can
    /// remediate by running the governed schema-initialize operation, not
    /// a crash.
    pub fn schema_not_ready(operation: impl Into<String>) -> Self {
        let operation = operation.into();
        Self::policy(
            "SCHEMA_NOT_READY",
            format!("persistent store is not initialized; '{operation}' cannot proceed"),
        )
        .with_context("operation", serde_json::Value::String(operation))
    }

    pub fn with_capability(mut self, capability_id: CapabilityId) -> Self {
        self.capability_id = Some(capability_id);
        self
    }

    pub fn with_risk_tier(mut self, risk_tier: RiskTier) -> Self {
        self.risk_tier = Some(risk_tier);
        self
    }

    pub fn with_context(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.context.insert(key.into(), value);
        self
    }

    /// Every gate kind is a soft, retryable conflict at the transport
    /// boundary.
    pub fn is_soft_conflict(&self) -> bool {
        true
    }

    /// Maps engine errors that have a gate representation. Errors without
    /// one (validation mistakes, internal faults) stay errors.
    pub fn from_error(error: &WardenError) -> Option<Self> {
        match error {
            WardenError::SchemaNotReady { operation } => {
                Some(Self::schema_not_ready(operation.clone()))
            }
            WardenError::PermissionDenied {
                agent_id,
                capability_id,
                operation,
                reason,
            } => {
                let mut signal = Self::policy("POLICY_DENIED", reason.clone())
                    .with_context(
                        "agent_id",
                        serde_json::Value::String(agent_id.clone()),
                    )
                    .with_context(
                        "operation",
                        serde_json::Value::String(operation.clone()),
                    );
                if let Ok(cap) = capability_id.parse::<CapabilityId>() {
                    signal = signal.with_capability(cap);
                }
                Some(signal)
            }
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_schema_not_ready_is_a_policy_gate() {
        let signal = GateSignal::schema_not_ready("grant");
        assert_eq!(signal.gate, GateKind::Policy);
        assert_eq!(signal.error_code, "SCHEMA_NOT_READY");
        assert!(signal.is_soft_conflict());
        assert_eq!(
            signal.context.get("operation"),
            Some(&serde_json::Value::String("grant".to_string()))
        );
    }

    #[test]
    fn test_confirm_signal_carries_token() {
        let signal = GateSignal::confirm("re-affirm this operation", "tok-123");
        assert_eq!(signal.gate, GateKind::Confirm);
        assert_eq!(signal.confirm_token.as_deref(), Some("tok-123"));
    }

    #[test]
    fn test_permission_denied_maps_to_policy_gate() {
        let err = WardenError::PermissionDenied {
            agent_id: "agent-1".to_string(),
            capability_id: "action.shell.exec".to_string(),
            operation: "execute".to_string(),
            reason: "no active grant".to_string(),
        };
        let signal = GateSignal::from_error(&err).unwrap();
        assert_eq!(signal.gate, GateKind::Policy);
        assert_eq!(signal.error_code, "POLICY_DENIED");
        assert_eq!(
            signal.capability_id.as_ref().map(|c| c.to_string()),
            Some("action.shell.exec".to_string())
        );
    }

    #[test]
    fn test_validation_errors_have_no_gate() {
        let err = WardenError::UnknownDomain {
            domain: "weather".to_string(),
        };
        assert!(GateSignal::from_error(&err).is_none());
    }
}
