//! Capability ids, domains, permission levels, risk tiers and trust states.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::{Result, WardenError};

/// The five capability domains. Domains define the Golden Path: the
/// permitted inter-domain call graph that capabilities must respect.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CapabilityDomain {
    /// Memory and knowledge state
    State,
    /// Deliberation and planning
    Decision,
    /// Side-effecting execution
    Action,
    /// Policy, approvals and audit
    Governance,
    /// Evidence collection and verification
    Evidence,
}

impl CapabilityDomain {
    pub const ALL: [CapabilityDomain; 5] = [
        CapabilityDomain::State,
        CapabilityDomain::Decision,
        CapabilityDomain::Action,
        CapabilityDomain::Governance,
        CapabilityDomain::Evidence,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::State => "state",
            Self::Decision => "decision",
            Self::Action => "action",
            Self::Governance => "governance",
            Self::Evidence => "evidence",
        }
    }
}

impl fmt::Display for CapabilityDomain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for CapabilityDomain {
    type Err = WardenError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "state" => Ok(Self::State),
            "decision" => Ok(Self::Decision),
            "action" => Ok(Self::Action),
            "governance" => Ok(Self::Governance),
            "evidence" => Ok(Self::Evidence),
            other => Err(WardenError::UnknownDomain {
                domain: other.to_string(),
            }),
        }
    }
}

/// A validated capability id of the form `domain.category.operation`,
/// e.g. `state.memory.read`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct CapabilityId {
    id: String,
    domain: CapabilityDomain,
}

impl CapabilityId {
    /// Parse and validate a capability id. The first segment must name a
    /// known domain and all three segments must be non-empty.
    pub fn parse(s: &str) -> Result<Self> {
        let parts: Vec<&str> = s.split('.').collect();
        if parts.len() != 3 || parts.iter().any(|p| p.is_empty()) {
            return Err(WardenError::InvalidCapabilityId {
                id: s.to_string(),
                reason: "expected `domain.category.operation`".to_string(),
            });
        }
        let domain = parts[0].parse::<CapabilityDomain>()?;
        Ok(Self {
            id: s.to_string(),
            domain,
        })
    }

    pub fn as_str(&self) -> &str {
        &self.id
    }

    /// Domain segment of the id.
    pub fn domain(&self) -> CapabilityDomain {
        self.domain
    }

    /// Middle segment of the id.
    pub fn category(&self) -> &str {
        self.id.split('.').nth(1).unwrap_or_default()
    }

    /// Final segment of the id.
    pub fn operation(&self) -> &str {
        self.id.split('.').nth(2).unwrap_or_default()
    }
}

impl fmt::Display for CapabilityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.id)
    }
}

impl FromStr for CapabilityId {
    type Err = WardenError;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl TryFrom<String> for CapabilityId {
    type Error = WardenError;

    fn try_from(s: String) -> Result<Self> {
        Self::parse(&s)
    }
}

impl From<CapabilityId> for String {
    fn from(id: CapabilityId) -> Self {
        id.id
    }
}

/// Coarse access level of a capability.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PermissionLevel {
    Read,
    Write,
    Execute,
    Admin,
}

/// Coarse risk classification used by policy rules.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RiskTier {
    Low,
    Medium,
    High,
    Critical,
}

impl RiskTier {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
            Self::Critical => "critical",
        }
    }
}

impl fmt::Display for RiskTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for RiskTier {
    type Err = WardenError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "low" => Ok(Self::Low),
            "medium" => Ok(Self::Medium),
            "high" => Ok(Self::High),
            "critical" => Ok(Self::Critical),
            other => Err(WardenError::invalid_input(
                "risk_tier",
                format!("unknown tier '{other}'"),
            )),
        }
    }
}

/// An agent's evolving standing, affecting how strictly rules apply.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TrustState {
    /// New or recently reset agents building a track record
    Earning,
    /// Agents with a sustained clean record
    Stable,
    /// Agents with recent violations or anomalies
    Degrading,
}

impl TrustState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Earning => "earning",
            Self::Stable => "stable",
            Self::Degrading => "degrading",
        }
    }
}

impl fmt::Display for TrustState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
