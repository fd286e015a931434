//! The evaluation engine.
//!
//! One pipeline per request: resolve the capability (alias or id), build a
//! typed policy context from the catalog, grant store, audit history and
//! trust provider, run the rule engine, write the audit row, drive the
//! governance record for tracked verdicts, and hand back a gate signal
//! when the operation may not proceed as-is.
//!
//! The engine is built once at startup from explicit handles and passed by
//! reference. Tests construct an isolated instance against an in-memory
//! store.

pub mod trust;

use std::sync::Arc;

use tracing::{error, info, warn};

use warden_alias::{AliasExport, AliasResolver};
use warden_catalog::CapabilityCatalog;
use warden_db::{Database, DbError};
use warden_gate::{validate_resubmission, ConfirmTokenIssuer, GateSignal};
use warden_governance::{apply_transition, can_proceed_with_verdict, TransitionKind};
use warden_policy::{EvaluationMode, PolicyContext, PolicyDecisionResult, PolicyEngine};
use warden_types::{
    now_ms, AgentId, AuditEntryId, CapabilityId, DecisionId, GovernanceDecisionRecord,
    GovernanceStatus, InvocationRecord, PolicyDecision, Result, RiskTier, SessionId, Verdict,
    WardenError,
};

pub use trust::{StaticTrustProvider, TrustProvider, TrustReport};
pub use warden_grants::{GrantRequest, GrantStore};

const DAY_MS: i64 = 24 * 60 * 60 * 1000;

// ============================================================================
// Configuration
// ============================================================================

#[derive(Debug, Clone)]
pub struct EngineConfig {
    pub mode: EvaluationMode,
    /// Secret behind the confirm-token MAC key.
    pub confirm_secret: String,
    /// Whether a sandbox is available for side-effecting operations.
    pub sandbox_available: bool,
}

impl EngineConfig {
    pub fn new(confirm_secret: impl Into<String>) -> Self {
        Self {
            mode: EvaluationMode::FirstMatch,
            confirm_secret: confirm_secret.into(),
            sandbox_available: true,
        }
    }

    pub fn with_mode(mut self, mode: EvaluationMode) -> Self {
        self.mode = mode;
        self
    }

    pub fn with_sandbox_available(mut self, available: bool) -> Self {
        self.sandbox_available = available;
        self
    }

    /// Reads `WARDEN_CONFIRM_SECRET` and `WARDEN_EVALUATION_MODE`.
    pub fn from_env() -> Result<Self> {
        let secret = std::env::var("WARDEN_CONFIRM_SECRET").map_err(|_| {
            WardenError::invalid_input("WARDEN_CONFIRM_SECRET", "environment variable is not set")
        })?;
        let mode = match std::env::var("WARDEN_EVALUATION_MODE").as_deref() {
            Ok("escalate_all") => EvaluationMode::EscalateAll,
            _ => EvaluationMode::FirstMatch,
        };
        Ok(Self::new(secret).with_mode(mode))
    }
}

// ============================================================================
// Request / outcome
// ============================================================================

/// One evaluation attempt. `capability` accepts a canonical capability id
/// or an execution alias.
#[derive(Debug, Clone)]
pub struct EvaluationRequest {
    pub agent_id: AgentId,
    pub capability: String,
    pub action_id: String,
    pub session_id: Option<SessionId>,
    /// Request payload the confirm token is bound to.
    pub payload: serde_json::Value,
    /// Set on resubmission of a signoff-gated request.
    pub confirm: bool,
    pub confirm_token: Option<String>,
    pub reason: Option<String>,
}

impl EvaluationRequest {
    pub fn new(
        agent_id: impl Into<AgentId>,
        capability: impl Into<String>,
        action_id: impl Into<String>,
    ) -> Self {
        Self {
            agent_id: agent_id.into(),
            capability: capability.into(),
            action_id: action_id.into(),
            session_id: None,
            payload: serde_json::Value::Null,
            confirm: false,
            confirm_token: None,
            reason: None,
        }
    }

    pub fn with_session(mut self, session_id: SessionId) -> Self {
        self.session_id = Some(session_id);
        self
    }

    pub fn with_payload(mut self, payload: serde_json::Value) -> Self {
        self.payload = payload;
        self
    }

    pub fn with_confirmation(mut self, token: impl Into<String>, reason: impl Into<String>) -> Self {
        self.confirm = true;
        self.confirm_token = Some(token.into());
        self.reason = Some(reason.into());
        self
    }
}

/// What the caller gets back. `proceed` is the single authoritative
/// answer; everything else is explanation and follow-up material.
#[derive(Debug, Clone)]
pub struct EvaluationOutcome {
    pub result: PolicyDecisionResult,
    /// Present when the verdict is governance-tracked.
    pub decision_id: Option<DecisionId>,
    pub governance_status: Option<GovernanceStatus>,
    pub proceed: bool,
    pub block_reason: Option<String>,
    /// Present exactly when `proceed` is false.
    pub gate: Option<GateSignal>,
}

// ============================================================================
// Engine
// ============================================================================

pub struct Engine {
    db: Arc<Database>,
    catalog: Arc<CapabilityCatalog>,
    grants: Arc<GrantStore>,
    policy: PolicyEngine,
    aliases: AliasResolver,
    trust: Arc<dyn TrustProvider>,
    tokens: ConfirmTokenIssuer,
    sandbox_available: bool,
}

impl Engine {
    pub fn new(
        db: Arc<Database>,
        catalog: Arc<CapabilityCatalog>,
        grants: Arc<GrantStore>,
        policy: PolicyEngine,
        aliases: AliasResolver,
        trust: Arc<dyn TrustProvider>,
        config: EngineConfig,
    ) -> Self {
        Self {
            db,
            catalog,
            grants,
            policy,
            aliases,
            trust,
            tokens: ConfirmTokenIssuer::new(&config.confirm_secret),
            sandbox_available: config.sandbox_available,
        }
    }

    pub fn grants(&self) -> &GrantStore {
        &self.grants
    }

    pub fn catalog(&self) -> &CapabilityCatalog {
        &self.catalog
    }

    pub fn alias_export(&self) -> AliasExport {
        self.aliases.export()
    }

    /// Resolves a caller-facing name: a canonical capability id wins, then
    /// the alias layers.
    pub fn resolve_capability(&self, name: &str) -> Result<CapabilityId> {
        if let Ok(id) = name.parse::<CapabilityId>() {
            if self.catalog.contains(&id) {
                return Ok(id);
            }
        }
        self.aliases
            .resolve(name)
            .cloned()
            .ok_or_else(|| WardenError::UnknownCapability {
                capability_id: name.to_string(),
            })
    }

    pub async fn evaluate(&self, request: EvaluationRequest) -> Result<EvaluationOutcome> {
        let capability_id = self.resolve_capability(&request.capability)?;
        let definition = self.catalog.require(&capability_id)?;

        let trust = self
            .trust
            .report(&request.agent_id)
            .await
            .unwrap_or_else(|e| {
                warn!(agent_id = %request.agent_id, error = %e, "trust provider failed; treating agent as untracked");
                TrustReport::verified()
            });
        if !trust.identity_verified {
            let outcome = self.trust_gated(&request, &capability_id, definition.risk_tier);
            // denied attempts still leave a trail
            self.write_audit(&request, &capability_id, &outcome.result).await;
            return Ok(outcome);
        }

        let context = self
            .build_context(&request, &capability_id, definition.risk_tier, &trust)
            .await;
        let result = self.policy.evaluate(&context);
        self.write_audit(&request, &capability_id, &result).await;

        match result.final_verdict {
            Verdict::Allow | Verdict::Warn => Ok(EvaluationOutcome {
                result,
                decision_id: None,
                governance_status: None,
                proceed: true,
                block_reason: None,
                gate: None,
            }),
            Verdict::Block => self.settle_blocked(&request, &capability_id, result).await,
            Verdict::RequireSignoff => {
                self.settle_signoff(&request, &capability_id, result).await
            }
        }
    }

    // ------------------------------------------------------------------
    // Pipeline stages
    // ------------------------------------------------------------------

    async fn build_context(
        &self,
        request: &EvaluationRequest,
        capability_id: &CapabilityId,
        tier: RiskTier,
        trust: &TrustReport,
    ) -> PolicyContext {
        let auth_allowed = self
            .grants
            .has_capability_unaudited(&request.agent_id, capability_id, None)
            .await;

        let day_start = now_ms() / DAY_MS * DAY_MS;
        let execution_count = match self
            .db
            .audit_repo()
            .count_for_agent_since(&request.agent_id, day_start)
            .await
        {
            Ok(n) => n,
            Err(e) => {
                warn!(agent_id = %request.agent_id, error = %e, "audit count unavailable; assuming zero");
                0
            }
        };

        let mut context = PolicyContext::new(capability_id.clone(), request.action_id.clone(), tier)
            .with_risk_score(base_risk_score(tier))
            .with_auth(
                auth_allowed,
                if auth_allowed { "granted" } else { "no active grant" },
            )
            .with_sandbox_available(self.sandbox_available)
            .with_execution_count(execution_count);
        if let Some(session_id) = request.session_id.clone() {
            context = context.with_session(session_id);
        }
        if let Some(state) = trust.trust_state {
            context = context.with_trust_state(state);
        }
        context
    }

    async fn settle_blocked(
        &self,
        request: &EvaluationRequest,
        capability_id: &CapabilityId,
        result: PolicyDecisionResult,
    ) -> Result<EvaluationOutcome> {
        let record = self
            .open_decision(request, capability_id, &result)
            .await?;
        let status = apply_transition(
            record.status,
            TransitionKind::Block,
            result.final_verdict,
            false,
        )?;
        self.persist_transition(&record.id, status).await?;

        let tier = self.catalog.get(capability_id).map(|d| d.risk_tier);
        let mut gate = GateSignal::policy("POLICY_DENIED", result.reason.clone())
            .with_capability(capability_id.clone())
            .with_context(
                "rules_applied",
                serde_json::json!(result.rules_applied.clone()),
            )
            .with_context("decision_id", serde_json::json!(record.id.to_string()));
        if let Some(tier) = tier {
            gate = gate.with_risk_tier(tier);
        }

        let (proceed, block_reason) = can_proceed_with_verdict(status, result.final_verdict);
        Ok(EvaluationOutcome {
            result,
            decision_id: Some(record.id),
            governance_status: Some(status),
            proceed,
            block_reason,
            gate: Some(gate),
        })
    }

    async fn settle_signoff(
        &self,
        request: &EvaluationRequest,
        capability_id: &CapabilityId,
        result: PolicyDecisionResult,
    ) -> Result<EvaluationOutcome> {
        let record = self
            .open_decision(request, capability_id, &result)
            .await?;
        let token_operation = format!("{}:{}", capability_id, request.action_id);

        if request.confirm {
            let token = request.confirm_token.as_deref().unwrap_or_default();
            validate_resubmission(request.confirm, request.reason.as_deref().unwrap_or_default())?;
            match self.tokens.verify(token, &token_operation, &request.payload) {
                Ok(()) => {
                    let status = apply_transition(
                        record.status,
                        TransitionKind::Sign,
                        result.final_verdict,
                        true,
                    )?;
                    self.persist_transition(&record.id, status).await?;
                    info!(
                        decision_id = %record.id,
                        agent_id = %request.agent_id,
                        capability_id = %capability_id,
                        "signoff accepted"
                    );
                    let (proceed, block_reason) =
                        can_proceed_with_verdict(status, result.final_verdict);
                    return Ok(EvaluationOutcome {
                        result,
                        decision_id: Some(record.id),
                        governance_status: Some(status),
                        proceed,
                        block_reason,
                        gate: None,
                    });
                }
                Err(e) => {
                    warn!(
                        decision_id = %record.id,
                        agent_id = %request.agent_id,
                        error = %e,
                        "confirm token rejected"
                    );
                }
            }
        }

        let token = self.tokens.issue(&token_operation, &request.payload)?;
        let tier = self.catalog.get(capability_id).map(|d| d.risk_tier);
        let mut gate = GateSignal::confirm(
            format!(
                "'{}' needs an explicit signoff; resubmit with confirm=true, this token and a reason",
                capability_id
            ),
            token,
        )
        .with_capability(capability_id.clone())
        .with_context("decision_id", serde_json::json!(record.id.to_string()));
        if let Some(tier) = tier {
            gate = gate.with_risk_tier(tier);
        }

        let (proceed, block_reason) =
            can_proceed_with_verdict(record.status, result.final_verdict);
        Ok(EvaluationOutcome {
            result,
            decision_id: Some(record.id),
            governance_status: Some(record.status),
            proceed,
            block_reason,
            gate: Some(gate),
        })
    }

    fn trust_gated(
        &self,
        request: &EvaluationRequest,
        capability_id: &CapabilityId,
        tier: RiskTier,
    ) -> EvaluationOutcome {
        let reason = "caller identity is not established".to_string();
        let context = PolicyContext::new(
            capability_id.clone(),
            request.action_id.clone(),
            tier,
        )
        .with_auth(false, "identity unverified");
        let result = PolicyDecisionResult {
            decision: PolicyDecision::Deny,
            final_verdict: Verdict::Block,
            reason: reason.clone(),
            rules_applied: Vec::new(),
            context,
            decided_at: now_ms(),
        };
        let gate = GateSignal::trust(
            "caller identity is unestablished or mismatched; register or confirm it and retry",
        )
        .with_capability(capability_id.clone())
        .with_risk_tier(tier)
        .with_context("agent_id", serde_json::json!(request.agent_id.to_string()));
        EvaluationOutcome {
            result,
            decision_id: None,
            governance_status: None,
            proceed: false,
            block_reason: Some(reason),
            gate: Some(gate),
        }
    }

    async fn open_decision(
        &self,
        request: &EvaluationRequest,
        capability_id: &CapabilityId,
        result: &PolicyDecisionResult,
    ) -> Result<GovernanceDecisionRecord> {
        let now = now_ms();
        let superseded = self
            .db
            .decision_repo()
            .fail_superseded(&request.agent_id, capability_id, now)
            .await
            .map_err(|e| map_db(e, "open_decision"))?;
        if superseded > 0 {
            info!(
                agent_id = %request.agent_id,
                capability_id = %capability_id,
                count = superseded,
                "closed superseded pending decisions"
            );
        }
        let record = GovernanceDecisionRecord {
            id: DecisionId::new(),
            agent_id: request.agent_id.clone(),
            capability_id: capability_id.clone(),
            status: GovernanceStatus::Pending,
            final_verdict: result.final_verdict,
            created_at: now,
            updated_at: now,
        };
        self.db
            .decision_repo()
            .insert(&record)
            .await
            .map_err(|e| map_db(e, "open_decision"))?;
        Ok(record)
    }

    async fn persist_transition(
        &self,
        decision_id: &DecisionId,
        to: GovernanceStatus,
    ) -> Result<()> {
        let moved = self
            .db
            .decision_repo()
            .transition(decision_id, to, now_ms())
            .await
            .map_err(|e| map_db(e, "persist_transition"))?;
        if !moved {
            warn!(decision_id = %decision_id, to = %to, "decision row was not pending; transition skipped");
        }
        Ok(())
    }

    /// Best-effort audit write. The decision stands even if this fails.
    async fn write_audit(
        &self,
        request: &EvaluationRequest,
        capability_id: &CapabilityId,
        result: &PolicyDecisionResult,
    ) {
        let record = InvocationRecord {
            id: AuditEntryId::new(),
            agent_id: request.agent_id.clone(),
            capability_id: capability_id.clone(),
            operation: request.action_id.clone(),
            allowed: result.final_verdict.is_allow_like(),
            reason: Some(result.reason.clone()),
            context: serde_json::json!({
                "verdict": result.final_verdict.as_str(),
                "rules_applied": result.rules_applied,
            }),
            timestamp: result.decided_at,
        };
        if let Err(e) = self.db.audit_repo().append(&record).await {
            error!(
                agent_id = %request.agent_id,
                capability_id = %capability_id,
                error = %e,
                "audit write failed; decision stands but the trail has a gap"
            );
        }
    }
}

fn base_risk_score(tier: RiskTier) -> f64 {
    match tier {
        RiskTier::Low => 0.1,
        RiskTier::Medium => 0.4,
        RiskTier::High => 0.7,
        RiskTier::Critical => 0.9,
    }
}

fn map_db(error: DbError, operation: &str) -> WardenError {
    match error {
        DbError::SchemaNotReady => WardenError::SchemaNotReady {
            operation: operation.to_string(),
        },
        other => WardenError::store(other.to_string()),
    }
}
