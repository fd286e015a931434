//! Built-in rule set.
//!
//! Trust-state rules carry higher priority than the generic tier rules, so a
//! degrading agent is blocked on a high-tier operation before the tier rules
//! get a chance to soften the outcome to a warning.

use warden_types::{RiskTier, TrustState};

use crate::rule::{PolicyRule, RuleAction, RuleCondition};

/// Priority band for trust-state rules.
const TRUST_BAND: u32 = 90;
/// Priority band for authorization and tier rules.
const TIER_BAND: u32 = 50;

pub fn builtin_rules() -> Vec<PolicyRule> {
    vec![
        PolicyRule::new(
            "trust-degrading-elevated-tier",
            "degrading trust may not run medium or high tier operations",
            TRUST_BAND + 10,
            RuleCondition::All(vec![
                RuleCondition::TrustStateIs(TrustState::Degrading),
                RuleCondition::TierIn(vec![RiskTier::Medium, RiskTier::High]),
            ]),
            RuleAction::Block,
        ),
        PolicyRule::new(
            "trust-earning-medium-tier",
            "earning trust needs signoff for medium tier operations",
            TRUST_BAND + 5,
            RuleCondition::All(vec![
                RuleCondition::TrustStateIs(TrustState::Earning),
                RuleCondition::TierIn(vec![RiskTier::Medium]),
            ]),
            RuleAction::RequireSignoff,
        ),
        PolicyRule::new(
            "trust-stable-fastpath",
            "stable trust with low risk score passes medium tier directly",
            TRUST_BAND,
            RuleCondition::All(vec![
                RuleCondition::TrustStateIs(TrustState::Stable),
                RuleCondition::TierIn(vec![RiskTier::Medium]),
                RuleCondition::RiskScoreBelow(0.3),
            ]),
            RuleAction::Allow,
        ),
        PolicyRule::new(
            "auth-denied",
            "authorization check did not pass",
            TIER_BAND + 30,
            RuleCondition::AuthDenied,
            RuleAction::Block,
        ),
        PolicyRule::new(
            "tier-critical-signoff",
            "critical tier operations always need signoff",
            TIER_BAND + 10,
            RuleCondition::TierAtLeast(RiskTier::Critical),
            RuleAction::RequireSignoff,
        ),
        PolicyRule::new(
            "tier-high-unsandboxed",
            "high tier operations without a sandbox need signoff",
            TIER_BAND + 5,
            RuleCondition::All(vec![
                RuleCondition::TierAtLeast(RiskTier::High),
                RuleCondition::SandboxUnavailable,
            ]),
            RuleAction::RequireSignoff,
        ),
        PolicyRule::new(
            "tier-high-warn",
            "high tier operations are flagged for review",
            TIER_BAND,
            RuleCondition::TierAtLeast(RiskTier::High),
            RuleAction::Warn,
        ),
        PolicyRule::new(
            "risk-score-elevated",
            "elevated risk score is flagged for review",
            TIER_BAND - 5,
            RuleCondition::RiskScoreAtLeast(0.8),
            RuleAction::Warn,
        ),
        PolicyRule::new(
            "daily-execution-quota",
            "agent exceeded the daily execution quota",
            TIER_BAND - 10,
            RuleCondition::ExecutionCountAtLeast(500),
            RuleAction::Warn,
        ),
    ]
}
