//! Warden Catalog - Static capability taxonomy
//!
//! The catalog holds every capability definition the engine knows about.
//! Definitions are immutable once registered: domain, permission level and
//! risk tier are fixed at definition time. Grants, rules and aliases that
//! reference a capability id are validated against the catalog at the
//! point of use, never assumed valid.
//!
//! The catalog also enforces the Golden Path: each definition names the
//! domains it may and may not call into, and `allows_call_to` answers
//! whether a cross-domain call is permitted.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use warden_types::{
    CapabilityDomain, CapabilityId, PermissionLevel, Result, RiskTier, WardenError,
};

/// An immutable capability definition.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CapabilityDefinition {
    /// Unique id of the form `domain.category.operation`
    pub id: CapabilityId,
    /// Human description
    pub description: String,
    /// Coarse access level
    pub permission_level: PermissionLevel,
    /// Risk classification used by policy rules
    pub risk_tier: RiskTier,
    /// Capabilities this one depends on
    pub dependencies: Vec<CapabilityId>,
    /// Declared side effects (e.g. "writes_fs", "network_egress")
    pub side_effects: Vec<String>,
    /// Domains this capability may call into; empty means unrestricted
    pub allowed_call_domains: Vec<CapabilityDomain>,
    /// Domains this capability must never call into; beats the allow list
    pub forbidden_call_domains: Vec<CapabilityDomain>,
}

impl CapabilityDefinition {
    pub fn new(
        id: CapabilityId,
        description: impl Into<String>,
        permission_level: PermissionLevel,
        risk_tier: RiskTier,
    ) -> Self {
        Self {
            id,
            description: description.into(),
            permission_level,
            risk_tier,
            dependencies: vec![],
            side_effects: vec![],
            allowed_call_domains: vec![],
            forbidden_call_domains: vec![],
        }
    }

    /// Domain of the defining id.
    pub fn domain(&self) -> CapabilityDomain {
        self.id.domain()
    }

    pub fn with_dependency(mut self, dep: CapabilityId) -> Self {
        self.dependencies.push(dep);
        self
    }

    pub fn with_side_effect(mut self, effect: impl Into<String>) -> Self {
        self.side_effects.push(effect.into());
        self
    }

    pub fn with_allowed_call_domains(mut self, domains: Vec<CapabilityDomain>) -> Self {
        self.allowed_call_domains = domains;
        self
    }

    pub fn with_forbidden_call_domains(mut self, domains: Vec<CapabilityDomain>) -> Self {
        self.forbidden_call_domains = domains;
        self
    }

    /// Golden Path check: may a holder of this capability call into
    /// `target`? Forbidden always wins; an empty allow list is open.
    pub fn allows_call_to(&self, target: CapabilityDomain) -> bool {
        if self.forbidden_call_domains.contains(&target) {
            return false;
        }
        self.allowed_call_domains.is_empty() || self.allowed_call_domains.contains(&target)
    }

    fn validate(&self) -> Result<()> {
        if self.description.trim().is_empty() {
            return Err(WardenError::InvalidDefinition {
                capability_id: self.id.to_string(),
                reason: "description is required".to_string(),
            });
        }
        if let Some(domain) = self
            .allowed_call_domains
            .iter()
            .find(|d| self.forbidden_call_domains.contains(d))
        {
            return Err(WardenError::InvalidDefinition {
                capability_id: self.id.to_string(),
                reason: format!("domain '{domain}' is both allowed and forbidden"),
            });
        }
        if self.dependencies.contains(&self.id) {
            return Err(WardenError::InvalidDefinition {
                capability_id: self.id.to_string(),
                reason: "definition depends on itself".to_string(),
            });
        }
        Ok(())
    }
}

/// The capability catalog, loaded once at startup.
#[derive(Debug, Clone, Default)]
pub struct CapabilityCatalog {
    definitions: HashMap<CapabilityId, CapabilityDefinition>,
}

impl CapabilityCatalog {
    /// Empty catalog. Most callers want [`CapabilityCatalog::builtin`].
    pub fn new() -> Self {
        Self::default()
    }

    /// Catalog pre-loaded with the default taxonomy across all five
    /// domains, including the default Golden Path restrictions
    /// (Action must not call directly into State; Decision must not
    /// call directly into Action).
    pub fn builtin() -> Self {
        let mut catalog = Self::new();
        for def in builtin_definitions() {
            // Builtin definitions are statically valid.
            catalog
                .register(def)
                .expect("builtin capability definitions must be valid");
        }
        catalog
    }

    /// Register a definition. Fails if the id is already present or the
    /// definition is structurally invalid.
    pub fn register(&mut self, def: CapabilityDefinition) -> Result<()> {
        if self.definitions.contains_key(&def.id) {
            return Err(WardenError::DuplicateCapability {
                capability_id: def.id.to_string(),
            });
        }
        def.validate()?;
        self.definitions.insert(def.id.clone(), def);
        Ok(())
    }

    /// Look up a definition by id.
    pub fn get(&self, id: &CapabilityId) -> Option<&CapabilityDefinition> {
        self.definitions.get(id)
    }

    /// Look up a definition, rejecting orphaned references.
    pub fn require(&self, id: &CapabilityId) -> Result<&CapabilityDefinition> {
        self.get(id).ok_or_else(|| WardenError::UnknownCapability {
            capability_id: id.to_string(),
        })
    }

    pub fn contains(&self, id: &CapabilityId) -> bool {
        self.definitions.contains_key(id)
    }

    /// All definitions in a domain.
    pub fn list_by_domain(&self, domain: CapabilityDomain) -> Vec<&CapabilityDefinition> {
        let mut defs: Vec<_> = self
            .definitions
            .values()
            .filter(|d| d.domain() == domain)
            .collect();
        defs.sort_by(|a, b| a.id.as_str().cmp(b.id.as_str()));
        defs
    }

    /// All definitions, ordered by id.
    pub fn list_all(&self) -> Vec<&CapabilityDefinition> {
        let mut defs: Vec<_> = self.definitions.values().collect();
        defs.sort_by(|a, b| a.id.as_str().cmp(b.id.as_str()));
        defs
    }

    pub fn len(&self) -> usize {
        self.definitions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.definitions.is_empty()
    }
}

fn cap(id: &str) -> CapabilityId {
    CapabilityId::parse(id).expect("builtin capability id must be valid")
}

/// The default taxonomy.
fn builtin_definitions() -> Vec<CapabilityDefinition> {
    use CapabilityDomain::*;
    use PermissionLevel::*;
    use RiskTier::*;

    vec![
        // State
        CapabilityDefinition::new(
            cap("state.memory.read"),
            "Read agent memory entries",
            Read,
            Low,
        ),
        CapabilityDefinition::new(
            cap("state.memory.write"),
            "Write agent memory entries",
            Write,
            Medium,
        )
        .with_side_effect("writes_store"),
        CapabilityDefinition::new(
            cap("state.graph.read"),
            "Read the knowledge graph",
            Read,
            Low,
        ),
        // Decision
        CapabilityDefinition::new(
            cap("decision.plan.create"),
            "Create or revise an execution plan",
            Write,
            Medium,
        )
        .with_forbidden_call_domains(vec![Action]),
        CapabilityDefinition::new(
            cap("decision.plan.evaluate"),
            "Evaluate a plan against policy",
            Read,
            Low,
        )
        .with_forbidden_call_domains(vec![Action]),
        // Action
        CapabilityDefinition::new(
            cap("action.shell.exec"),
            "Execute a shell command",
            Execute,
            High,
        )
        .with_side_effect("process_spawn")
        .with_forbidden_call_domains(vec![State]),
        CapabilityDefinition::new(
            cap("action.network.fetch"),
            "Fetch a remote resource",
            Execute,
            Medium,
        )
        .with_side_effect("network_egress")
        .with_forbidden_call_domains(vec![State]),
        CapabilityDefinition::new(
            cap("action.file.write"),
            "Write files in the workspace",
            Write,
            High,
        )
        .with_side_effect("writes_fs")
        .with_forbidden_call_domains(vec![State]),
        // Governance
        CapabilityDefinition::new(
            cap("governance.grant.manage"),
            "Grant and revoke capabilities",
            Admin,
            Critical,
        ),
        CapabilityDefinition::new(
            cap("governance.schema.initialize"),
            "Initialize the persistent store schema",
            Admin,
            Critical,
        )
        .with_side_effect("writes_store"),
        CapabilityDefinition::new(
            cap("governance.decision.signoff"),
            "Record a human signoff on a tracked decision",
            Admin,
            High,
        ),
        // Evidence
        CapabilityDefinition::new(
            cap("evidence.trace.record"),
            "Record execution evidence",
            Write,
            Low,
        )
        .with_side_effect("writes_store"),
        CapabilityDefinition::new(
            cap("evidence.trace.read"),
            "Read recorded evidence",
            Read,
            Low,
        ),
    ]
}
