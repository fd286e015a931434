//! Grant repository
//!
//! Grants are hard-deleted on revoke; expiry is purely logical, enforced
//! by the `expires_at` predicates here. Every mutation writes its audit
//! row in the same transaction.

use sqlx::SqlitePool;

use warden_types::{AgentId, AuditEntryId, CapabilityGrant, CapabilityId, TimestampMs};

use crate::{DbResult, GrantRow};

pub struct GrantRepo {
    pool: SqlitePool,
}

impl GrantRepo {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Insert a grant and its `grant` audit row in one transaction.
    pub async fn insert_with_audit(&self, grant: &CapabilityGrant) -> DbResult<()> {
        let mut tx = self.pool.begin().await?;

        sqlx::query(
            r#"
            INSERT INTO grants (grant_id, agent_id, capability_id, granted_by, granted_at,
                                expires_at, scope, reason, metadata)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(grant.grant_id.as_uuid().to_string())
        .bind(grant.agent_id.as_str())
        .bind(grant.capability_id.as_str())
        .bind(&grant.granted_by)
        .bind(grant.granted_at)
        .bind(grant.expires_at)
        .bind(&grant.scope)
        .bind(&grant.reason)
        .bind(serde_json::to_string(&grant.metadata)?)
        .execute(&mut *tx)
        .await?;

        let context = serde_json::json!({
            "grant_id": grant.grant_id.to_string(),
            "granted_by": grant.granted_by,
            "expires_at": grant.expires_at,
            "scope": grant.scope,
        });
        insert_audit_row(
            &mut tx,
            &grant.agent_id,
            &grant.capability_id,
            "grant",
            true,
            grant.reason.as_deref(),
            &context,
            grant.granted_at,
        )
        .await?;

        tx.commit().await?;
        Ok(())
    }

    /// Revoke the newest active grant matching agent + capability (+ scope
    /// if given): delete it and write a `revoke` audit row in one
    /// transaction. Returns `false` — and writes no audit row — when no
    /// matching active grant exists.
    pub async fn revoke_with_audit(
        &self,
        agent_id: &AgentId,
        capability_id: &CapabilityId,
        scope: Option<&str>,
        revoked_by: &str,
        reason: Option<&str>,
        now: TimestampMs,
    ) -> DbResult<bool> {
        let mut tx = self.pool.begin().await?;

        let row: Option<GrantRow> = if let Some(scope) = scope {
            sqlx::query_as::<_, GrantRow>(
                r#"
                SELECT * FROM grants
                WHERE agent_id = ? AND capability_id = ?
                  AND (expires_at IS NULL OR expires_at > ?)
                  AND scope = ?
                ORDER BY granted_at DESC
                LIMIT 1
                "#,
            )
            .bind(agent_id.as_str())
            .bind(capability_id.as_str())
            .bind(now)
            .bind(scope)
            .fetch_optional(&mut *tx)
            .await?
        } else {
            sqlx::query_as::<_, GrantRow>(
                r#"
                SELECT * FROM grants
                WHERE agent_id = ? AND capability_id = ?
                  AND (expires_at IS NULL OR expires_at > ?)
                ORDER BY granted_at DESC
                LIMIT 1
                "#,
            )
            .bind(agent_id.as_str())
            .bind(capability_id.as_str())
            .bind(now)
            .fetch_optional(&mut *tx)
            .await?
        };

        let Some(row) = row else {
            // Nothing to revoke: no audit row either.
            tx.rollback().await?;
            return Ok(false);
        };

        sqlx::query("DELETE FROM grants WHERE grant_id = ?")
            .bind(&row.grant_id)
            .execute(&mut *tx)
            .await?;

        let context = serde_json::json!({
            "grant_id": row.grant_id,
            "revoked_by": revoked_by,
            "scope": row.scope,
        });
        insert_audit_row(
            &mut tx,
            agent_id,
            capability_id,
            "revoke",
            true,
            reason,
            &context,
            now,
        )
        .await?;

        tx.commit().await?;
        Ok(true)
    }

    /// Find an active grant covering the given scope: unscoped grants
    /// match anything; scoped grants match only their own scope.
    pub async fn find_active(
        &self,
        agent_id: &AgentId,
        capability_id: &CapabilityId,
        scope: Option<&str>,
        now: TimestampMs,
    ) -> DbResult<Option<GrantRow>> {
        let row = if let Some(scope) = scope {
            sqlx::query_as::<_, GrantRow>(
                r#"
                SELECT * FROM grants
                WHERE agent_id = ? AND capability_id = ?
                  AND (expires_at IS NULL OR expires_at > ?)
                  AND (scope IS NULL OR scope = ?)
                ORDER BY granted_at DESC
                LIMIT 1
                "#,
            )
            .bind(agent_id.as_str())
            .bind(capability_id.as_str())
            .bind(now)
            .bind(scope)
            .fetch_optional(&self.pool)
            .await?
        } else {
            sqlx::query_as::<_, GrantRow>(
                r#"
                SELECT * FROM grants
                WHERE agent_id = ? AND capability_id = ?
                  AND (expires_at IS NULL OR expires_at > ?)
                  AND scope IS NULL
                ORDER BY granted_at DESC
                LIMIT 1
                "#,
            )
            .bind(agent_id.as_str())
            .bind(capability_id.as_str())
            .bind(now)
            .fetch_optional(&self.pool)
            .await?
        };
        Ok(row)
    }

    /// All grants for an agent, newest first.
    pub async fn list_for_agent(
        &self,
        agent_id: &AgentId,
        include_expired: bool,
        now: TimestampMs,
    ) -> DbResult<Vec<GrantRow>> {
        let rows = if include_expired {
            sqlx::query_as::<_, GrantRow>(
                "SELECT * FROM grants WHERE agent_id = ? ORDER BY granted_at DESC",
            )
            .bind(agent_id.as_str())
            .fetch_all(&self.pool)
            .await?
        } else {
            sqlx::query_as::<_, GrantRow>(
                r#"
                SELECT * FROM grants
                WHERE agent_id = ? AND (expires_at IS NULL OR expires_at > ?)
                ORDER BY granted_at DESC
                "#,
            )
            .bind(agent_id.as_str())
            .bind(now)
            .fetch_all(&self.pool)
            .await?
        };
        Ok(rows)
    }
}

#[allow(clippy::too_many_arguments)]
pub(crate) async fn insert_audit_row(
    tx: &mut sqlx::Transaction<'_, sqlx::Sqlite>,
    agent_id: &AgentId,
    capability_id: &CapabilityId,
    operation: &str,
    allowed: bool,
    reason: Option<&str>,
    context: &serde_json::Value,
    timestamp: TimestampMs,
) -> DbResult<()> {
    sqlx::query(
        r#"
        INSERT INTO audit_log (id, agent_id, capability_id, operation, allowed, reason, context, timestamp)
        VALUES (?, ?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(AuditEntryId::new().as_uuid().to_string())
    .bind(agent_id.as_str())
    .bind(capability_id.as_str())
    .bind(operation)
    .bind(allowed)
    .bind(reason)
    .bind(serde_json::to_string(context)?)
    .bind(timestamp)
    .execute(&mut **tx)
    .await?;
    Ok(())
}
