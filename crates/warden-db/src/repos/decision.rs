//! Governance decision repository
//!
//! Rows are created PENDING and only ever move to a terminal status. The
//! status transition itself is validated by the governance state machine;
//! this repo additionally guards the write with a `status = 'pending'`
//! predicate so a concurrent transition can never overwrite a terminal
//! state.

use sqlx::SqlitePool;

use warden_types::{
    AgentId, CapabilityId, DecisionId, GovernanceDecisionRecord, GovernanceStatus, TimestampMs,
};

use crate::{DbResult, DecisionRow};

pub struct DecisionRepo {
    pool: SqlitePool,
}

impl DecisionRepo {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn insert(&self, record: &GovernanceDecisionRecord) -> DbResult<()> {
        sqlx::query(
            r#"
            INSERT INTO decisions (id, agent_id, capability_id, status, final_verdict, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(record.id.as_uuid().to_string())
        .bind(record.agent_id.as_str())
        .bind(record.capability_id.as_str())
        .bind(record.status.as_str())
        .bind(record.final_verdict.as_str())
        .bind(record.created_at)
        .bind(record.updated_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn get(&self, id: &DecisionId) -> DbResult<Option<DecisionRow>> {
        let row = sqlx::query_as::<_, DecisionRow>("SELECT * FROM decisions WHERE id = ?")
            .bind(id.as_uuid().to_string())
            .fetch_optional(&self.pool)
            .await?;
        Ok(row)
    }

    /// Move a pending decision to a terminal status. Returns `false` when
    /// the row is missing or already terminal.
    pub async fn transition(
        &self,
        id: &DecisionId,
        to: GovernanceStatus,
        updated_at: TimestampMs,
    ) -> DbResult<bool> {
        let result = sqlx::query(
            "UPDATE decisions SET status = ?, updated_at = ? WHERE id = ? AND status = 'pending'",
        )
        .bind(to.as_str())
        .bind(updated_at)
        .bind(id.as_uuid().to_string())
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() == 1)
    }

    /// Fail every still-pending decision for this agent and capability.
    /// A newer evaluation of the same pair supersedes them; without this,
    /// abandoned signoff rounds would sit in PENDING forever. Returns the
    /// number of rows closed.
    pub async fn fail_superseded(
        &self,
        agent_id: &AgentId,
        capability_id: &CapabilityId,
        updated_at: TimestampMs,
    ) -> DbResult<u64> {
        let result = sqlx::query(
            r#"
            UPDATE decisions SET status = 'failed', updated_at = ?
            WHERE agent_id = ? AND capability_id = ? AND status = 'pending'
            "#,
        )
        .bind(updated_at)
        .bind(agent_id.as_str())
        .bind(capability_id.as_str())
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected())
    }

    pub async fn list_pending(&self, limit: i64) -> DbResult<Vec<DecisionRow>> {
        let rows = sqlx::query_as::<_, DecisionRow>(
            "SELECT * FROM decisions WHERE status = 'pending' ORDER BY created_at ASC LIMIT ?",
        )
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }
}
