//! Rule model: conditions, actions, and the rules that pair them.

use serde::{Deserialize, Serialize};
use warden_types::{RiskTier, TrustState, Verdict};

use crate::context::PolicyContext;

// ============================================================================
// Actions
// ============================================================================

/// What a rule does when its condition matches.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RuleAction {
    /// Explicitly allow. In first-match mode this short-circuits the run.
    Allow,
    /// Allow, but record a warning verdict.
    Warn,
    /// Require a human signoff before the operation proceeds.
    RequireSignoff,
    /// Block outright.
    Block,
}

impl RuleAction {
    pub fn verdict(&self) -> Verdict {
        match self {
            RuleAction::Allow => Verdict::Allow,
            RuleAction::Warn => Verdict::Warn,
            RuleAction::RequireSignoff => Verdict::RequireSignoff,
            RuleAction::Block => Verdict::Block,
        }
    }
}

// ============================================================================
// Conditions
// ============================================================================

/// Predicate over a [`PolicyContext`]. Conditions compose with `All`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RuleCondition {
    /// Matches every context. Useful for default-deny rule sets.
    Always,
    TrustStateIs(TrustState),
    TierIn(Vec<RiskTier>),
    TierAtLeast(RiskTier),
    RiskScoreBelow(f64),
    RiskScoreAtLeast(f64),
    /// The upstream authorization check did not pass.
    AuthDenied,
    SandboxUnavailable,
    ExecutionCountAtLeast(i64),
    /// Declarative comparison loaded from configuration.
    Field(FieldCondition),
    All(Vec<RuleCondition>),
}

impl RuleCondition {
    pub fn matches(&self, ctx: &PolicyContext) -> bool {
        match self {
            RuleCondition::Always => true,
            RuleCondition::TrustStateIs(state) => ctx.trust_state == Some(*state),
            RuleCondition::TierIn(tiers) => tiers.contains(&ctx.tier),
            RuleCondition::TierAtLeast(tier) => ctx.tier >= *tier,
            RuleCondition::RiskScoreBelow(limit) => ctx.risk_score < *limit,
            RuleCondition::RiskScoreAtLeast(limit) => ctx.risk_score >= *limit,
            RuleCondition::AuthDenied => !ctx.auth_allowed,
            RuleCondition::SandboxUnavailable => !ctx.sandbox_available,
            RuleCondition::ExecutionCountAtLeast(n) => ctx.execution_count_today >= *n,
            RuleCondition::Field(field) => field.matches(ctx),
            RuleCondition::All(conditions) => conditions.iter().all(|c| c.matches(ctx)),
        }
    }
}

// ============================================================================
// Declarative field conditions
// ============================================================================

/// Comparison operator for configured rules.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FieldOperator {
    #[serde(rename = "==")]
    Eq,
    #[serde(rename = "!=")]
    Ne,
    #[serde(rename = ">")]
    Gt,
    #[serde(rename = "<")]
    Lt,
    #[serde(rename = ">=")]
    Ge,
    #[serde(rename = "<=")]
    Le,
    #[serde(rename = "in")]
    In,
    #[serde(rename = "contains")]
    Contains,
}

/// `{field, operator, value}` predicate evaluated against a context field.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FieldCondition {
    pub field: String,
    pub operator: FieldOperator,
    pub value: serde_json::Value,
}

/// Context fields a configured rule may reference.
pub const KNOWN_FIELDS: &[&str] = &[
    "capability_id",
    "domain",
    "action_id",
    "tier",
    "risk_score",
    "auth_allowed",
    "auth_status",
    "sandbox_available",
    "trust_state",
    "execution_count_today",
];

impl FieldCondition {
    /// Resolves the named field to a JSON value for comparison.
    fn resolve(&self, ctx: &PolicyContext) -> Option<serde_json::Value> {
        let value = match self.field.as_str() {
            "capability_id" => serde_json::Value::String(ctx.capability_id.to_string()),
            "domain" => serde_json::Value::String(ctx.capability_id.domain().as_str().to_string()),
            "action_id" => serde_json::Value::String(ctx.action_id.clone()),
            "tier" => serde_json::Value::String(ctx.tier.as_str().to_string()),
            "risk_score" => serde_json::json!(ctx.risk_score),
            "auth_allowed" => serde_json::Value::Bool(ctx.auth_allowed),
            "auth_status" => match &ctx.auth_status {
                Some(s) => serde_json::Value::String(s.clone()),
                None => serde_json::Value::Null,
            },
            "sandbox_available" => serde_json::Value::Bool(ctx.sandbox_available),
            "trust_state" => match ctx.trust_state {
                Some(s) => serde_json::Value::String(s.as_str().to_string()),
                None => serde_json::Value::Null,
            },
            "execution_count_today" => serde_json::json!(ctx.execution_count_today),
            _ => return None,
        };
        Some(value)
    }

    pub fn matches(&self, ctx: &PolicyContext) -> bool {
        let Some(actual) = self.resolve(ctx) else {
            return false;
        };
        match self.operator {
            FieldOperator::Eq => actual == self.value,
            FieldOperator::Ne => actual != self.value,
            FieldOperator::Gt => compare_numbers(&actual, &self.value, |a, b| a > b),
            FieldOperator::Lt => compare_numbers(&actual, &self.value, |a, b| a < b),
            FieldOperator::Ge => compare_numbers(&actual, &self.value, |a, b| a >= b),
            FieldOperator::Le => compare_numbers(&actual, &self.value, |a, b| a <= b),
            FieldOperator::In => match &self.value {
                serde_json::Value::Array(items) => items.contains(&actual),
                _ => false,
            },
            FieldOperator::Contains => match (&actual, &self.value) {
                (serde_json::Value::String(haystack), serde_json::Value::String(needle)) => {
                    haystack.contains(needle.as_str())
                }
                _ => false,
            },
        }
    }
}

fn compare_numbers(
    actual: &serde_json::Value,
    expected: &serde_json::Value,
    op: impl Fn(f64, f64) -> bool,
) -> bool {
    match (actual.as_f64(), expected.as_f64()) {
        (Some(a), Some(b)) => op(a, b),
        _ => false,
    }
}

// ============================================================================
// Rules
// ============================================================================

/// A prioritized rule. Higher priority evaluates first.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PolicyRule {
    pub id: String,
    pub description: String,
    pub priority: u32,
    pub condition: RuleCondition,
    pub action: RuleAction,
}

impl PolicyRule {
    pub fn new(
        id: impl Into<String>,
        description: impl Into<String>,
        priority: u32,
        condition: RuleCondition,
        action: RuleAction,
    ) -> Self {
        Self {
            id: id.into(),
            description: description.into(),
            priority,
            condition,
            action,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use warden_types::CapabilityId;

    fn ctx() -> PolicyContext {
        let cap: CapabilityId = "action.shell.exec".parse().unwrap();
        PolicyContext::new(cap, "execute", RiskTier::High)
            .with_risk_score(0.6)
            .with_trust_state(TrustState::Stable)
    }

    #[test]
    fn test_tier_at_least_uses_ordering() {
        assert!(RuleCondition::TierAtLeast(RiskTier::Medium).matches(&ctx()));
        assert!(!RuleCondition::TierAtLeast(RiskTier::Critical).matches(&ctx()));
    }

    #[test]
    fn test_all_requires_every_member() {
        let cond = RuleCondition::All(vec![
            RuleCondition::TrustStateIs(TrustState::Stable),
            RuleCondition::RiskScoreAtLeast(0.9),
        ]);
        assert!(!cond.matches(&ctx()));
    }

    #[test]
    fn test_field_condition_on_domain() {
        let cond = FieldCondition {
            field: "domain".to_string(),
            operator: FieldOperator::Eq,
            value: serde_json::json!("action"),
        };
        assert!(cond.matches(&ctx()));
    }

    #[test]
    fn test_field_condition_in_operator() {
        let cond = FieldCondition {
            field: "tier".to_string(),
            operator: FieldOperator::In,
            value: serde_json::json!(["high", "critical"]),
        };
        assert!(cond.matches(&ctx()));
    }

    #[test]
    fn test_unknown_field_never_matches() {
        let cond = FieldCondition {
            field: "moon_phase".to_string(),
            operator: FieldOperator::Eq,
            value: serde_json::json!("full"),
        };
        assert!(!cond.matches(&ctx()));
    }

    #[test]
    fn test_numeric_comparison() {
        let cond = FieldCondition {
            field: "risk_score".to_string(),
            operator: FieldOperator::Ge,
            value: serde_json::json!(0.5),
        };
        assert!(cond.matches(&ctx()));
    }
}
