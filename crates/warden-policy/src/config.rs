//! Loading configured rules from JSON.
//!
//! A rule file is `{"rules": [...]}`. Malformed entries are skipped with a
//! warning rather than failing the whole load, so one bad rule cannot take
//! the engine down with it. A configured rule whose id collides with a
//! built-in rule replaces the built-in.

use serde::{Deserialize, Serialize};
use tracing::warn;
use warden_types::{Result, WardenError};

use crate::rule::{FieldCondition, PolicyRule, RuleAction, RuleCondition, KNOWN_FIELDS};

/// Declarative rule as it appears in a rule file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConfiguredRule {
    pub id: String,
    #[serde(default)]
    pub description: String,
    pub condition: FieldCondition,
    pub action: RuleAction,
    pub priority: u32,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
}

fn default_enabled() -> bool {
    true
}

impl ConfiguredRule {
    /// Checks the rule references a known field. Value/operator mismatches
    /// degrade to a non-matching condition at evaluation time; an unknown
    /// field is a configuration mistake and the rule is rejected.
    fn validate(&self) -> std::result::Result<(), String> {
        if self.id.trim().is_empty() {
            return Err("rule id is empty".to_string());
        }
        if !KNOWN_FIELDS.contains(&self.condition.field.as_str()) {
            return Err(format!("unknown field '{}'", self.condition.field));
        }
        Ok(())
    }

    fn into_rule(self) -> PolicyRule {
        PolicyRule::new(
            self.id,
            self.description,
            self.priority,
            RuleCondition::Field(self.condition),
            self.action,
        )
    }
}

#[derive(Debug, Deserialize)]
struct RuleFile {
    rules: Vec<serde_json::Value>,
}

/// Parses a rule file, skipping entries that fail to deserialize or
/// validate. Returns the surviving rules in file order.
pub fn load_rules(json: &str) -> Result<Vec<PolicyRule>> {
    let file: RuleFile = serde_json::from_str(json)
        .map_err(|e| WardenError::invalid_input("rules", format!("invalid rule file: {e}")))?;

    let mut rules = Vec::with_capacity(file.rules.len());
    for (index, entry) in file.rules.into_iter().enumerate() {
        let configured: ConfiguredRule = match serde_json::from_value(entry) {
            Ok(r) => r,
            Err(e) => {
                warn!(index, error = %e, "skipping malformed policy rule");
                continue;
            }
        };
        if let Err(reason) = configured.validate() {
            warn!(index, rule_id = %configured.id, %reason, "skipping invalid policy rule");
            continue;
        }
        if !configured.enabled {
            continue;
        }
        rules.push(configured.into_rule());
    }
    Ok(rules)
}

/// Reads and parses a rule file from disk.
pub fn load_rules_file(path: impl AsRef<std::path::Path>) -> Result<Vec<PolicyRule>> {
    let path = path.as_ref();
    let json = std::fs::read_to_string(path).map_err(|e| {
        WardenError::invalid_input("rules", format!("cannot read {}: {e}", path.display()))
    })?;
    load_rules(&json)
}
