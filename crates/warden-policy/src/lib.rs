//! Policy rule engine.
//!
//! Rules are evaluated in priority order against a [`PolicyContext`]
//! snapshot. Two modes exist: first-match (the highest-priority matching
//! rule decides) and escalate-all (every matching rule is collected and the
//! most restrictive verdict wins). The built-in set puts trust-state rules
//! above the generic tier rules; deployments layer their own rules on top
//! with [`config::load_rules`] and [`PolicyEngine::with_configured`].

pub mod builtin;
pub mod config;
pub mod context;
pub mod engine;
pub mod rule;

pub use builtin::builtin_rules;
pub use config::{load_rules, load_rules_file, ConfiguredRule};
pub use context::PolicyContext;
pub use engine::{EvaluationMode, PolicyDecisionResult, PolicyEngine};
pub use rule::{FieldCondition, FieldOperator, PolicyRule, RuleAction, RuleCondition};
