//! Trust provider seam.
//!
//! The engine does not own trust bookkeeping; a collaborator implements
//! [`TrustProvider`] and the engine consumes its report per evaluation.

use std::collections::{HashMap, HashSet};

use async_trait::async_trait;
use warden_types::{AgentId, Result, TrustState};

/// What the trust subsystem knows about an agent at evaluation time.
#[derive(Debug, Clone)]
pub struct TrustReport {
    /// Whether the caller's verified identity is established. When false
    /// the evaluation never reaches policy and raises a trust gate.
    pub identity_verified: bool,
    /// Trust standing, when the provider tracks one for this agent.
    pub trust_state: Option<TrustState>,
}

impl TrustReport {
    pub fn verified() -> Self {
        Self {
            identity_verified: true,
            trust_state: None,
        }
    }
}

#[async_trait]
pub trait TrustProvider: Send + Sync {
    async fn report(&self, agent_id: &AgentId) -> Result<TrustReport>;
}

/// Fixed-table provider. Agents default to verified with no tracked trust
/// state; deployments without a trust subsystem use this as-is.
#[derive(Debug, Default)]
pub struct StaticTrustProvider {
    states: HashMap<String, TrustState>,
    unverified: HashSet<String>,
}

impl StaticTrustProvider {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_state(mut self, agent_id: impl Into<String>, state: TrustState) -> Self {
        self.states.insert(agent_id.into(), state);
        self
    }

    pub fn with_unverified(mut self, agent_id: impl Into<String>) -> Self {
        self.unverified.insert(agent_id.into());
        self
    }
}

#[async_trait]
impl TrustProvider for StaticTrustProvider {
    async fn report(&self, agent_id: &AgentId) -> Result<TrustReport> {
        Ok(TrustReport {
            identity_verified: !self.unverified.contains(agent_id.as_str()),
            trust_state: self.states.get(agent_id.as_str()).copied(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_static_provider_defaults_to_verified() {
        let provider = StaticTrustProvider::new();
        let report = provider.report(&AgentId::from("agent-x")).await.unwrap();
        assert!(report.identity_verified);
        assert!(report.trust_state.is_none());
    }

    #[tokio::test]
    async fn test_static_provider_tracks_configured_agents() {
        let provider = StaticTrustProvider::new()
            .with_state("agent-a", TrustState::Degrading)
            .with_unverified("agent-b");
        let a = provider.report(&AgentId::from("agent-a")).await.unwrap();
        assert_eq!(a.trust_state, Some(TrustState::Degrading));
        let b = provider.report(&AgentId::from("agent-b")).await.unwrap();
        assert!(!b.identity_verified);
    }
}
