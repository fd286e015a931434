//! Row models and conversions to domain records.
//!
//! SQLite has no native UUID or enum columns, so rows carry TEXT ids and
//! statuses plus INTEGER epoch-millisecond timestamps; conversion back to
//! the typed domain records validates everything and reports a corrupt
//! row rather than guessing.

use sqlx::FromRow;

use warden_types::{
    AgentId, AuditEntryId, CapabilityGrant, CapabilityId, ChangeRequest, ChangeRequestId,
    ChangeRequestStatus, DecisionId, GovernanceDecisionRecord, GovernanceStatus, GrantId,
    InvocationRecord, Verdict,
};

use crate::{DbError, DbResult};

/// Row in the `grants` table
#[derive(Debug, Clone, FromRow)]
pub struct GrantRow {
    pub grant_id: String,
    pub agent_id: String,
    pub capability_id: String,
    pub granted_by: String,
    pub granted_at: i64,
    pub expires_at: Option<i64>,
    pub scope: Option<String>,
    pub reason: Option<String>,
    pub metadata: String,
}

impl GrantRow {
    pub fn into_domain(self) -> DbResult<CapabilityGrant> {
        Ok(CapabilityGrant {
            grant_id: GrantId::parse(&self.grant_id)
                .map_err(|e| DbError::Corrupt(format!("grant_id '{}': {e}", self.grant_id)))?,
            agent_id: AgentId::new(self.agent_id),
            capability_id: parse_capability(&self.capability_id)?,
            granted_by: self.granted_by,
            granted_at: self.granted_at,
            expires_at: self.expires_at,
            scope: self.scope,
            reason: self.reason,
            metadata: serde_json::from_str(&self.metadata)?,
        })
    }
}

/// Row in the `audit_log` table
#[derive(Debug, Clone, FromRow)]
pub struct AuditRow {
    pub id: String,
    pub agent_id: String,
    pub capability_id: String,
    pub operation: String,
    pub allowed: bool,
    pub reason: Option<String>,
    pub context: String,
    pub timestamp: i64,
}

impl AuditRow {
    pub fn into_domain(self) -> DbResult<InvocationRecord> {
        Ok(InvocationRecord {
            id: AuditEntryId::parse(&self.id)
                .map_err(|e| DbError::Corrupt(format!("audit id '{}': {e}", self.id)))?,
            agent_id: AgentId::new(self.agent_id),
            capability_id: parse_capability(&self.capability_id)?,
            operation: self.operation,
            allowed: self.allowed,
            reason: self.reason,
            context: serde_json::from_str(&self.context)?,
            timestamp: self.timestamp,
        })
    }
}

/// Row in the `decisions` table
#[derive(Debug, Clone, FromRow)]
pub struct DecisionRow {
    pub id: String,
    pub agent_id: String,
    pub capability_id: String,
    pub status: String,
    pub final_verdict: String,
    pub created_at: i64,
    pub updated_at: i64,
}

impl DecisionRow {
    pub fn into_domain(self) -> DbResult<GovernanceDecisionRecord> {
        Ok(GovernanceDecisionRecord {
            id: DecisionId::parse(&self.id)
                .map_err(|e| DbError::Corrupt(format!("decision id '{}': {e}", self.id)))?,
            agent_id: AgentId::new(self.agent_id),
            capability_id: parse_capability(&self.capability_id)?,
            status: parse_status(&self.status)?,
            final_verdict: parse_verdict(&self.final_verdict)?,
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }
}

/// Row in the `change_requests` table
#[derive(Debug, Clone, FromRow)]
pub struct ChangeRequestRow {
    pub id: String,
    pub agent_id: String,
    pub operation: String,
    pub payload_hash: String,
    pub status: String,
    pub created_at: i64,
    pub consumed_at: Option<i64>,
}

impl ChangeRequestRow {
    pub fn into_domain(self) -> DbResult<ChangeRequest> {
        let status = match self.status.as_str() {
            "confirm_required" => ChangeRequestStatus::ConfirmRequired,
            "completed" => ChangeRequestStatus::Completed,
            other => {
                return Err(DbError::Corrupt(format!(
                    "change request status '{other}'"
                )))
            }
        };
        Ok(ChangeRequest {
            id: ChangeRequestId::parse(&self.id)
                .map_err(|e| DbError::Corrupt(format!("change request id '{}': {e}", self.id)))?,
            agent_id: AgentId::new(self.agent_id),
            operation: self.operation,
            payload_hash: self.payload_hash,
            status,
            created_at: self.created_at,
            consumed_at: self.consumed_at,
        })
    }
}

/// Row in the `alias_overrides` table
#[derive(Debug, Clone, FromRow)]
pub struct AliasRow {
    pub alias: String,
    pub capability_id: String,
    pub updated_at: i64,
}

fn parse_capability(raw: &str) -> DbResult<CapabilityId> {
    CapabilityId::parse(raw).map_err(|e| DbError::Corrupt(format!("capability_id '{raw}': {e}")))
}

fn parse_status(raw: &str) -> DbResult<GovernanceStatus> {
    match raw {
        "pending" => Ok(GovernanceStatus::Pending),
        "approved" => Ok(GovernanceStatus::Approved),
        "blocked" => Ok(GovernanceStatus::Blocked),
        "signed" => Ok(GovernanceStatus::Signed),
        "failed" => Ok(GovernanceStatus::Failed),
        other => Err(DbError::Corrupt(format!("governance status '{other}'"))),
    }
}

fn parse_verdict(raw: &str) -> DbResult<Verdict> {
    match raw {
        "allow" => Ok(Verdict::Allow),
        "warn" => Ok(Verdict::Warn),
        "require_signoff" => Ok(Verdict::RequireSignoff),
        "block" => Ok(Verdict::Block),
        other => Err(DbError::Corrupt(format!("verdict '{other}'"))),
    }
}
