//! The evaluator: sorted rules, two evaluation modes, one result shape.

use serde::{Deserialize, Serialize};
use tracing::debug;
use warden_types::{now_ms, PolicyDecision, TimestampMs, Verdict};

use crate::builtin::builtin_rules;
use crate::context::PolicyContext;
use crate::rule::PolicyRule;

/// How the engine combines multiple matching rules.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EvaluationMode {
    /// The first matching rule in priority order decides.
    FirstMatch,
    /// Every matching rule is collected and the most restrictive
    /// verdict wins.
    EscalateAll,
}

/// Outcome of a policy run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PolicyDecisionResult {
    pub decision: PolicyDecision,
    pub final_verdict: Verdict,
    pub reason: String,
    /// Ids of the rules that matched, in priority order.
    pub rules_applied: Vec<String>,
    pub context: PolicyContext,
    pub decided_at: TimestampMs,
}

impl PolicyDecisionResult {
    pub fn is_allowed(&self) -> bool {
        self.final_verdict.is_allow_like()
    }
}

/// Priority-ordered rule engine.
///
/// Rules are sorted once at construction, highest priority first. Ties keep
/// insertion order, so built-ins stay ahead of configured rules at equal
/// priority.
#[derive(Debug, Clone)]
pub struct PolicyEngine {
    rules: Vec<PolicyRule>,
    mode: EvaluationMode,
}

impl PolicyEngine {
    /// Engine with the built-in rule set only.
    pub fn new(mode: EvaluationMode) -> Self {
        Self::with_rules(builtin_rules(), mode)
    }

    /// Engine with an explicit rule set and no built-ins.
    pub fn with_rules(rules: Vec<PolicyRule>, mode: EvaluationMode) -> Self {
        let mut rules = rules;
        rules.sort_by_key(|r| std::cmp::Reverse(r.priority));
        Self { rules, mode }
    }

    /// Built-ins merged with configured rules. A configured rule whose id
    /// matches a built-in replaces it, keeping the configured priority.
    pub fn with_configured(configured: Vec<PolicyRule>, mode: EvaluationMode) -> Self {
        let mut rules = builtin_rules();
        for rule in configured {
            if let Some(existing) = rules.iter_mut().find(|r| r.id == rule.id) {
                *existing = rule;
            } else {
                rules.push(rule);
            }
        }
        Self::with_rules(rules, mode)
    }

    pub fn mode(&self) -> EvaluationMode {
        self.mode
    }

    pub fn rule_count(&self) -> usize {
        self.rules.len()
    }

    pub fn evaluate(&self, context: &PolicyContext) -> PolicyDecisionResult {
        let result = match self.mode {
            EvaluationMode::FirstMatch => self.evaluate_first_match(context),
            EvaluationMode::EscalateAll => self.evaluate_escalate_all(context),
        };
        debug!(
            capability_id = %context.capability_id,
            verdict = ?result.final_verdict,
            rules = ?result.rules_applied,
            "policy evaluated"
        );
        result
    }

    fn evaluate_first_match(&self, context: &PolicyContext) -> PolicyDecisionResult {
        for rule in &self.rules {
            if rule.condition.matches(context) {
                return self.result(
                    rule.action.verdict(),
                    rule.description.clone(),
                    vec![rule.id.clone()],
                    context,
                );
            }
        }
        self.default_allow(context)
    }

    fn evaluate_escalate_all(&self, context: &PolicyContext) -> PolicyDecisionResult {
        let mut verdict = Verdict::Allow;
        let mut reason = String::new();
        let mut applied = Vec::new();

        for rule in &self.rules {
            if !rule.condition.matches(context) {
                continue;
            }
            applied.push(rule.id.clone());
            let candidate = rule.action.verdict();
            if candidate > verdict || reason.is_empty() {
                verdict = verdict.most_restrictive(candidate);
                reason = rule.description.clone();
            }
        }

        if applied.is_empty() {
            return self.default_allow(context);
        }
        if applied.len() > 1 {
            reason = format!("{reason} ({} rules matched)", applied.len());
        }
        self.result(verdict, reason, applied, context)
    }

    fn default_allow(&self, context: &PolicyContext) -> PolicyDecisionResult {
        self.result(
            Verdict::Allow,
            "no policy rule matched".to_string(),
            Vec::new(),
            context,
        )
    }

    fn result(
        &self,
        verdict: Verdict,
        reason: String,
        rules_applied: Vec<String>,
        context: &PolicyContext,
    ) -> PolicyDecisionResult {
        PolicyDecisionResult {
            decision: PolicyDecision::from(verdict),
            final_verdict: verdict,
            reason,
            rules_applied,
            context: context.clone(),
            decided_at: now_ms(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rule::{RuleAction, RuleCondition};
    use warden_types::{CapabilityId, RiskTier, TrustState};

    fn cap(id: &str) -> CapabilityId {
        id.parse().unwrap()
    }

    fn always(id: &str, priority: u32, action: RuleAction) -> PolicyRule {
        PolicyRule::new(id, format!("rule {id}"), priority, RuleCondition::Always, action)
    }

    #[test]
    fn test_first_match_takes_highest_priority_rule() {
        let engine = PolicyEngine::with_rules(
            vec![
                always("r2", 5, RuleAction::Allow),
                always("r1", 10, RuleAction::Block),
            ],
            EvaluationMode::FirstMatch,
        );
        let ctx = PolicyContext::new(cap("state.memory.read"), "read", RiskTier::Low);
        let result = engine.evaluate(&ctx);
        assert_eq!(result.final_verdict, Verdict::Block);
        assert_eq!(result.decision, PolicyDecision::Deny);
        assert_eq!(result.rules_applied, vec!["r1".to_string()]);
    }

    #[test]
    fn test_escalate_all_picks_most_restrictive() {
        let engine = PolicyEngine::with_rules(
            vec![
                always("warns", 10, RuleAction::Warn),
                always("blocks", 5, RuleAction::Block),
            ],
            EvaluationMode::EscalateAll,
        );
        let ctx = PolicyContext::new(cap("state.memory.read"), "read", RiskTier::Low);
        let result = engine.evaluate(&ctx);
        assert_eq!(result.final_verdict, Verdict::Block);
        assert_eq!(
            result.rules_applied,
            vec!["warns".to_string(), "blocks".to_string()]
        );
    }

    #[test]
    fn test_no_matching_rule_defaults_to_allow() {
        let engine = PolicyEngine::with_rules(
            vec![PolicyRule::new(
                "critical-only",
                "critical tier",
                10,
                RuleCondition::TierAtLeast(RiskTier::Critical),
                RuleAction::Block,
            )],
            EvaluationMode::FirstMatch,
        );
        let ctx = PolicyContext::new(cap("state.memory.read"), "read", RiskTier::Low);
        let result = engine.evaluate(&ctx);
        assert_eq!(result.final_verdict, Verdict::Allow);
        assert!(result.rules_applied.is_empty());
    }

    #[test]
    fn test_degrading_trust_blocks_before_tier_rules() {
        let engine = PolicyEngine::new(EvaluationMode::FirstMatch);
        let ctx = PolicyContext::new(cap("action.shell.exec"), "execute", RiskTier::High)
            .with_trust_state(TrustState::Degrading);
        let result = engine.evaluate(&ctx);
        assert_eq!(result.final_verdict, Verdict::Block);
        assert_eq!(
            result.rules_applied,
            vec!["trust-degrading-elevated-tier".to_string()]
        );
    }

    #[test]
    fn test_earning_trust_needs_signoff_on_medium_tier() {
        let engine = PolicyEngine::new(EvaluationMode::FirstMatch);
        let ctx = PolicyContext::new(cap("decision.plan.create"), "create", RiskTier::Medium)
            .with_trust_state(TrustState::Earning);
        let result = engine.evaluate(&ctx);
        assert_eq!(result.final_verdict, Verdict::RequireSignoff);
        assert_eq!(result.decision, PolicyDecision::RequireApproval);
    }

    #[test]
    fn test_stable_trust_fastpath_allows_medium_tier() {
        let engine = PolicyEngine::new(EvaluationMode::FirstMatch);
        let ctx = PolicyContext::new(cap("decision.plan.create"), "create", RiskTier::Medium)
            .with_trust_state(TrustState::Stable)
            .with_risk_score(0.1);
        let result = engine.evaluate(&ctx);
        assert_eq!(result.final_verdict, Verdict::Allow);
        assert_eq!(result.rules_applied, vec!["trust-stable-fastpath".to_string()]);
    }

    #[test]
    fn test_auth_denied_blocks() {
        let engine = PolicyEngine::new(EvaluationMode::FirstMatch);
        let ctx = PolicyContext::new(cap("state.memory.write"), "write", RiskTier::Low)
            .with_auth(false, "no active grant");
        let result = engine.evaluate(&ctx);
        assert_eq!(result.final_verdict, Verdict::Block);
        assert_eq!(result.rules_applied, vec!["auth-denied".to_string()]);
    }

    #[test]
    fn test_configured_rule_overrides_builtin_by_id() {
        let json = r#"{
            "rules": [
                {"id": "tier-high-warn", "description": "high tier blocked by site policy",
                 "condition": {"field": "tier", "operator": "==", "value": "high"},
                 "action": "block", "priority": 50}
            ]
        }"#;
        let configured = crate::config::load_rules(json).unwrap();
        let engine = PolicyEngine::with_configured(configured, EvaluationMode::FirstMatch);
        let ctx = PolicyContext::new(cap("action.network.fetch"), "fetch", RiskTier::High)
            .with_sandbox_available(true);
        let result = engine.evaluate(&ctx);
        assert_eq!(result.final_verdict, Verdict::Block);
        assert_eq!(result.rules_applied, vec!["tier-high-warn".to_string()]);
    }

    #[test]
    fn test_escalate_all_reason_names_match_count() {
        let engine = PolicyEngine::new(EvaluationMode::EscalateAll);
        let ctx = PolicyContext::new(cap("action.shell.exec"), "execute", RiskTier::High)
            .with_risk_score(0.9)
            .with_sandbox_available(false);
        let result = engine.evaluate(&ctx);
        assert_eq!(result.final_verdict, Verdict::RequireSignoff);
        assert!(result.rules_applied.len() >= 2);
        assert!(result.reason.contains("rules matched"));
    }
}
