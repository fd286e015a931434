//! Persisted alias overrides (the highest-priority alias source)

use sqlx::SqlitePool;

use warden_types::{CapabilityId, now_ms};

use crate::{AliasRow, DbResult};

pub struct AliasRepo {
    pool: SqlitePool,
}

impl AliasRepo {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Insert or replace an alias override.
    pub async fn upsert(&self, alias: &str, capability_id: &CapabilityId) -> DbResult<()> {
        sqlx::query(
            r#"
            INSERT INTO alias_overrides (alias, capability_id, updated_at)
            VALUES (?, ?, ?)
            ON CONFLICT(alias) DO UPDATE SET
                capability_id = excluded.capability_id,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(alias)
        .bind(capability_id.as_str())
        .bind(now_ms())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn list_all(&self) -> DbResult<Vec<AliasRow>> {
        let rows =
            sqlx::query_as::<_, AliasRow>("SELECT * FROM alias_overrides ORDER BY alias ASC")
                .fetch_all(&self.pool)
                .await?;
        Ok(rows)
    }

    pub async fn remove(&self, alias: &str) -> DbResult<bool> {
        let result = sqlx::query("DELETE FROM alias_overrides WHERE alias = ?")
            .bind(alias)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() == 1)
    }
}
