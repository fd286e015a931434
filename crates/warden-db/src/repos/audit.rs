//! Audit log repository
//!
//! The audit log is append-only: there is no update or delete path.

use sqlx::SqlitePool;

use warden_types::{AgentId, InvocationRecord, TimestampMs};

use crate::{AuditRow, DbResult};

pub struct AuditRepo {
    pool: SqlitePool,
}

impl AuditRepo {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Append one invocation record.
    pub async fn append(&self, record: &InvocationRecord) -> DbResult<()> {
        sqlx::query(
            r#"
            INSERT INTO audit_log (id, agent_id, capability_id, operation, allowed, reason, context, timestamp)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(record.id.as_uuid().to_string())
        .bind(record.agent_id.as_str())
        .bind(record.capability_id.as_str())
        .bind(&record.operation)
        .bind(record.allowed)
        .bind(&record.reason)
        .bind(serde_json::to_string(&record.context)?)
        .bind(record.timestamp)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn list_recent(&self, limit: i64) -> DbResult<Vec<AuditRow>> {
        let rows = sqlx::query_as::<_, AuditRow>(
            "SELECT * FROM audit_log ORDER BY timestamp DESC, id DESC LIMIT ?",
        )
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    pub async fn list_for_agent(&self, agent_id: &AgentId, limit: i64) -> DbResult<Vec<AuditRow>> {
        let rows = sqlx::query_as::<_, AuditRow>(
            "SELECT * FROM audit_log WHERE agent_id = ? ORDER BY timestamp DESC, id DESC LIMIT ?",
        )
        .bind(agent_id.as_str())
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    /// Operation-filtered audit rows for an agent, newest first.
    pub async fn list_for_agent_operation(
        &self,
        agent_id: &AgentId,
        operation: &str,
        limit: i64,
    ) -> DbResult<Vec<AuditRow>> {
        let rows = sqlx::query_as::<_, AuditRow>(
            r#"
            SELECT * FROM audit_log
            WHERE agent_id = ? AND operation = ?
            ORDER BY timestamp DESC, id DESC
            LIMIT ?
            "#,
        )
        .bind(agent_id.as_str())
        .bind(operation)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    /// Number of audited invocations for an agent since `since`. Feeds
    /// `execution_count_today` in the policy context.
    pub async fn count_for_agent_since(
        &self,
        agent_id: &AgentId,
        since: TimestampMs,
    ) -> DbResult<i64> {
        let count: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM audit_log WHERE agent_id = ? AND timestamp >= ?",
        )
        .bind(agent_id.as_str())
        .bind(since)
        .fetch_one(&self.pool)
        .await?;
        Ok(count)
    }
}
