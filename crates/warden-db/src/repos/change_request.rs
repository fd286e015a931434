//! Change request repository (store-backed confirm gate)
//!
//! A change request is created `confirm_required` when a high-risk
//! operation first arrives, and consumed exactly once — the guarded
//! UPDATE below is the single-use enforcement.

use sqlx::SqlitePool;

use warden_types::{
    AgentId, ChangeRequest, ChangeRequestId, ChangeRequestStatus, TimestampMs, now_ms,
};

use crate::{ChangeRequestRow, DbResult};

pub struct ChangeRequestRepo {
    pool: SqlitePool,
}

impl ChangeRequestRepo {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Persist a new change request awaiting confirmation.
    pub async fn create(
        &self,
        agent_id: &AgentId,
        operation: &str,
        payload_hash: &str,
    ) -> DbResult<ChangeRequest> {
        let request = ChangeRequest {
            id: ChangeRequestId::new(),
            agent_id: agent_id.clone(),
            operation: operation.to_string(),
            payload_hash: payload_hash.to_string(),
            status: ChangeRequestStatus::ConfirmRequired,
            created_at: now_ms(),
            consumed_at: None,
        };
        sqlx::query(
            r#"
            INSERT INTO change_requests (id, agent_id, operation, payload_hash, status, created_at, consumed_at)
            VALUES (?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(request.id.as_uuid().to_string())
        .bind(request.agent_id.as_str())
        .bind(&request.operation)
        .bind(&request.payload_hash)
        .bind(request.status.as_str())
        .bind(request.created_at)
        .bind(request.consumed_at)
        .execute(&self.pool)
        .await?;
        Ok(request)
    }

    pub async fn get(&self, id: &ChangeRequestId) -> DbResult<Option<ChangeRequestRow>> {
        let row = sqlx::query_as::<_, ChangeRequestRow>("SELECT * FROM change_requests WHERE id = ?")
            .bind(id.as_uuid().to_string())
            .fetch_optional(&self.pool)
            .await?;
        Ok(row)
    }

    /// Consume a pending change request if its payload hash still matches
    /// the resubmitted request. Returns `false` when the request is
    /// missing, already consumed, or bound to a different payload.
    pub async fn consume(
        &self,
        id: &ChangeRequestId,
        payload_hash: &str,
        now: TimestampMs,
    ) -> DbResult<bool> {
        let result = sqlx::query(
            r#"
            UPDATE change_requests
            SET status = 'completed', consumed_at = ?
            WHERE id = ? AND status = 'confirm_required' AND payload_hash = ?
            "#,
        )
        .bind(now)
        .bind(id.as_uuid().to_string())
        .bind(payload_hash)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() == 1)
    }
}
