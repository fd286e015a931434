//! Warden Database Layer
//!
//! SQLite persistence for the Warden engine: capability grants, the
//! append-only audit log, tracked governance decisions, confirm-gated
//! change requests and persisted alias overrides.
//!
//! # Schema lifecycle
//!
//! `Database::connect` opens the pool but does NOT create the schema —
//! schema initialization is itself a governed operation. Write paths
//! against an uninitialized store surface [`DbError::SchemaNotReady`],
//! which upper layers convert into a recoverable policy-gate denial
//! rather than a crash.
//!
//! # Repository Pattern
//!
//! Each domain has its own repository with CRUD and domain-specific
//! queries; multi-row writes (grant/revoke plus audit) run in one
//! transaction.

pub mod config;
pub mod error;
pub mod models;
pub mod repos;

use std::str::FromStr;

use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use tracing::info;

pub use config::DatabaseConfig;
pub use error::{DbError, DbResult};
pub use models::*;
pub use repos::*;

/// Tables created by [`Database::migrate`]. Split into one statement per
/// entry because SQLite prepares a single statement at a time.
const SCHEMA: &[&str] = &[
    r#"
    CREATE TABLE IF NOT EXISTS grants (
        grant_id TEXT PRIMARY KEY,
        agent_id TEXT NOT NULL,
        capability_id TEXT NOT NULL,
        granted_by TEXT NOT NULL,
        granted_at INTEGER NOT NULL,
        expires_at INTEGER,
        scope TEXT,
        reason TEXT,
        metadata TEXT NOT NULL DEFAULT 'null'
    )
    "#,
    "CREATE INDEX IF NOT EXISTS idx_grants_agent ON grants(agent_id, capability_id, granted_at)",
    r#"
    CREATE TABLE IF NOT EXISTS audit_log (
        id TEXT PRIMARY KEY,
        agent_id TEXT NOT NULL,
        capability_id TEXT NOT NULL,
        operation TEXT NOT NULL,
        allowed INTEGER NOT NULL,
        reason TEXT,
        context TEXT NOT NULL DEFAULT 'null',
        timestamp INTEGER NOT NULL
    )
    "#,
    "CREATE INDEX IF NOT EXISTS idx_audit_agent_ts ON audit_log(agent_id, timestamp)",
    r#"
    CREATE TABLE IF NOT EXISTS decisions (
        id TEXT PRIMARY KEY,
        agent_id TEXT NOT NULL,
        capability_id TEXT NOT NULL,
        status TEXT NOT NULL,
        final_verdict TEXT NOT NULL,
        created_at INTEGER NOT NULL,
        updated_at INTEGER NOT NULL
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS change_requests (
        id TEXT PRIMARY KEY,
        agent_id TEXT NOT NULL,
        operation TEXT NOT NULL,
        payload_hash TEXT NOT NULL,
        status TEXT NOT NULL,
        created_at INTEGER NOT NULL,
        consumed_at INTEGER
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS alias_overrides (
        alias TEXT PRIMARY KEY,
        capability_id TEXT NOT NULL,
        updated_at INTEGER NOT NULL
    )
    "#,
];

const REQUIRED_TABLES: &[&str] = &[
    "grants",
    "audit_log",
    "decisions",
    "change_requests",
    "alias_overrides",
];

/// Database connection pool
pub struct Database {
    pool: SqlitePool,
}

impl Database {
    /// Connect to SQLite. Does not initialize the schema.
    pub async fn connect(config: &DatabaseConfig) -> DbResult<Self> {
        info!("Connecting to SQLite: {}", config.database_url_masked());

        let options = SqliteConnectOptions::from_str(&config.database_url)
            .map_err(|e| DbError::Connection(e.to_string()))?
            .create_if_missing(true);

        let pool = SqlitePoolOptions::new()
            .max_connections(config.max_connections)
            .acquire_timeout(std::time::Duration::from_secs(config.acquire_timeout_secs))
            .connect_with(options)
            .await
            .map_err(|e| DbError::Connection(e.to_string()))?;

        info!("Connected to SQLite");
        Ok(Self { pool })
    }

    /// Ephemeral in-memory database with the schema already applied.
    /// Tests construct isolated instances this way instead of sharing
    /// global state.
    pub async fn in_memory() -> DbResult<Self> {
        let db = Self::connect(&DatabaseConfig::in_memory()).await?;
        db.migrate().await?;
        Ok(db)
    }

    /// Create all tables. Idempotent. This is the write path behind the
    /// governed initialize-schema operation.
    pub async fn migrate(&self) -> DbResult<()> {
        info!("Running database migrations...");
        for statement in SCHEMA {
            sqlx::query(statement)
                .execute(&self.pool)
                .await
                .map_err(|e| DbError::Migration(e.to_string()))?;
        }
        info!("Migrations complete");
        Ok(())
    }

    /// Whether every required table exists.
    pub async fn schema_ready(&self) -> DbResult<bool> {
        let count: i64 = sqlx::query_scalar(
            r#"
            SELECT COUNT(*) FROM sqlite_master
            WHERE type = 'table'
              AND name IN ('grants', 'audit_log', 'decisions', 'change_requests', 'alias_overrides')
            "#,
        )
        .fetch_one(&self.pool)
        .await?;
        Ok(count as usize == REQUIRED_TABLES.len())
    }

    /// Health check: one round-trip.
    pub async fn health_check(&self) -> DbResult<bool> {
        Ok(sqlx::query("SELECT 1").fetch_one(&self.pool).await.is_ok())
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    pub fn grant_repo(&self) -> GrantRepo {
        GrantRepo::new(self.pool.clone())
    }

    pub fn audit_repo(&self) -> AuditRepo {
        AuditRepo::new(self.pool.clone())
    }

    pub fn decision_repo(&self) -> DecisionRepo {
        DecisionRepo::new(self.pool.clone())
    }

    pub fn change_request_repo(&self) -> ChangeRequestRepo {
        ChangeRequestRepo::new(self.pool.clone())
    }

    pub fn alias_repo(&self) -> AliasRepo {
        AliasRepo::new(self.pool.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use warden_types::{
        AgentId, AuditEntryId, CapabilityGrant, CapabilityId, GovernanceDecisionRecord,
        GovernanceStatus, GrantId, InvocationRecord, Verdict, now_ms,
    };

    fn cap(id: &str) -> CapabilityId {
        CapabilityId::parse(id).unwrap()
    }

    fn sample_grant(agent: &str, capability: &str, expires_at: Option<i64>) -> CapabilityGrant {
        CapabilityGrant {
            grant_id: GrantId::new(),
            agent_id: AgentId::new(agent),
            capability_id: cap(capability),
            granted_by: "admin".to_string(),
            granted_at: now_ms(),
            expires_at,
            scope: None,
            reason: Some("test".to_string()),
            metadata: serde_json::Value::Null,
        }
    }

    #[tokio::test]
    async fn test_schema_not_ready_until_migrated() {
        let db = Database::connect(&DatabaseConfig::in_memory()).await.unwrap();
        assert!(!db.schema_ready().await.unwrap());

        let grant = sample_grant("agentA", "state.memory.read", None);
        let err = db.grant_repo().insert_with_audit(&grant).await.unwrap_err();
        assert!(matches!(err, DbError::SchemaNotReady));

        db.migrate().await.unwrap();
        assert!(db.schema_ready().await.unwrap());
        db.grant_repo().insert_with_audit(&grant).await.unwrap();
    }

    #[tokio::test]
    async fn test_grant_insert_writes_audit_row() {
        let db = Database::in_memory().await.unwrap();
        let grant = sample_grant("agentA", "state.memory.read", None);
        db.grant_repo().insert_with_audit(&grant).await.unwrap();

        let rows = db
            .audit_repo()
            .list_for_agent_operation(&grant.agent_id, "grant", 10)
            .await
            .unwrap();
        assert_eq!(rows.len(), 1);
        assert!(rows[0].allowed);
        assert_eq!(rows[0].capability_id, "state.memory.read");
    }

    #[tokio::test]
    async fn test_revoke_without_grant_writes_no_audit_row() {
        let db = Database::in_memory().await.unwrap();
        let agent = AgentId::new("agentA");
        let revoked = db
            .grant_repo()
            .revoke_with_audit(&agent, &cap("state.memory.read"), None, "admin", None, now_ms())
            .await
            .unwrap();
        assert!(!revoked);

        let rows = db
            .audit_repo()
            .list_for_agent_operation(&agent, "revoke", 10)
            .await
            .unwrap();
        assert!(rows.is_empty());
    }

    #[tokio::test]
    async fn test_revoke_deletes_newest_active_grant() {
        let db = Database::in_memory().await.unwrap();
        let agent = AgentId::new("agentA");
        let grant = sample_grant("agentA", "state.memory.read", None);
        db.grant_repo().insert_with_audit(&grant).await.unwrap();

        let revoked = db
            .grant_repo()
            .revoke_with_audit(&agent, &cap("state.memory.read"), None, "admin", None, now_ms())
            .await
            .unwrap();
        assert!(revoked);

        let active = db
            .grant_repo()
            .find_active(&agent, &cap("state.memory.read"), None, now_ms())
            .await
            .unwrap();
        assert!(active.is_none());

        let rows = db
            .audit_repo()
            .list_for_agent_operation(&agent, "revoke", 10)
            .await
            .unwrap();
        assert_eq!(rows.len(), 1);
    }

    #[tokio::test]
    async fn test_expired_grant_not_active() {
        let db = Database::in_memory().await.unwrap();
        let agent = AgentId::new("agentA");
        let grant = sample_grant("agentA", "state.memory.read", Some(now_ms() - 1_000));
        db.grant_repo().insert_with_audit(&grant).await.unwrap();

        let active = db
            .grant_repo()
            .find_active(&agent, &cap("state.memory.read"), None, now_ms())
            .await
            .unwrap();
        assert!(active.is_none());

        // Still visible when expired grants are included.
        let all = db.grant_repo().list_for_agent(&agent, true, now_ms()).await.unwrap();
        assert_eq!(all.len(), 1);
        let current = db.grant_repo().list_for_agent(&agent, false, now_ms()).await.unwrap();
        assert!(current.is_empty());
    }

    #[tokio::test]
    async fn test_scoped_grant_matching() {
        let db = Database::in_memory().await.unwrap();
        let agent = AgentId::new("agentA");
        let mut grant = sample_grant("agentA", "action.file.write", None);
        grant.scope = Some("project-x".to_string());
        db.grant_repo().insert_with_audit(&grant).await.unwrap();

        let hit = db
            .grant_repo()
            .find_active(&agent, &cap("action.file.write"), Some("project-x"), now_ms())
            .await
            .unwrap();
        assert!(hit.is_some());

        let miss = db
            .grant_repo()
            .find_active(&agent, &cap("action.file.write"), Some("project-y"), now_ms())
            .await
            .unwrap();
        assert!(miss.is_none());

        // A scoped grant does not satisfy an unscoped check.
        let unscoped = db
            .grant_repo()
            .find_active(&agent, &cap("action.file.write"), None, now_ms())
            .await
            .unwrap();
        assert!(unscoped.is_none());
    }

    #[tokio::test]
    async fn test_audit_count_since() {
        let db = Database::in_memory().await.unwrap();
        let agent = AgentId::new("agentA");
        let start = now_ms();
        for i in 0..3 {
            let record = InvocationRecord {
                id: AuditEntryId::new(),
                agent_id: agent.clone(),
                capability_id: cap("state.memory.read"),
                operation: "read_memory".to_string(),
                allowed: true,
                reason: None,
                context: serde_json::Value::Null,
                timestamp: start + i,
            };
            db.audit_repo().append(&record).await.unwrap();
        }
        let count = db.audit_repo().count_for_agent_since(&agent, start).await.unwrap();
        assert_eq!(count, 3);
    }

    #[tokio::test]
    async fn test_decision_transition_guards_terminal_state() {
        let db = Database::in_memory().await.unwrap();
        let record = GovernanceDecisionRecord {
            id: warden_types::DecisionId::new(),
            agent_id: AgentId::new("agentA"),
            capability_id: cap("action.shell.exec"),
            status: GovernanceStatus::Pending,
            final_verdict: Verdict::RequireSignoff,
            created_at: now_ms(),
            updated_at: now_ms(),
        };
        db.decision_repo().insert(&record).await.unwrap();

        assert!(db
            .decision_repo()
            .transition(&record.id, GovernanceStatus::Signed, now_ms())
            .await
            .unwrap());

        // Second transition hits a terminal row and is refused.
        assert!(!db
            .decision_repo()
            .transition(&record.id, GovernanceStatus::Failed, now_ms())
            .await
            .unwrap());

        let row = db.decision_repo().get(&record.id).await.unwrap().unwrap();
        assert_eq!(row.status, "signed");
    }

    #[tokio::test]
    async fn test_fail_superseded_closes_only_matching_pending_rows() {
        let db = Database::in_memory().await.unwrap();
        let agent = AgentId::new("agentA");
        let make = |capability: &str| GovernanceDecisionRecord {
            id: warden_types::DecisionId::new(),
            agent_id: agent.clone(),
            capability_id: cap(capability),
            status: GovernanceStatus::Pending,
            final_verdict: Verdict::RequireSignoff,
            created_at: now_ms(),
            updated_at: now_ms(),
        };
        let stale = make("action.shell.exec");
        let unrelated = make("state.memory.write");
        db.decision_repo().insert(&stale).await.unwrap();
        db.decision_repo().insert(&unrelated).await.unwrap();

        let closed = db
            .decision_repo()
            .fail_superseded(&agent, &cap("action.shell.exec"), now_ms())
            .await
            .unwrap();
        assert_eq!(closed, 1);

        let row = db.decision_repo().get(&stale.id).await.unwrap().unwrap();
        assert_eq!(row.status, "failed");
        let row = db.decision_repo().get(&unrelated.id).await.unwrap().unwrap();
        assert_eq!(row.status, "pending");
    }

    #[tokio::test]
    async fn test_change_request_consumed_exactly_once() {
        let db = Database::in_memory().await.unwrap();
        let agent = AgentId::new("agentA");
        let request = db
            .change_request_repo()
            .create(&agent, "initialize_schema", "abc123")
            .await
            .unwrap();

        // Wrong payload hash is refused.
        assert!(!db
            .change_request_repo()
            .consume(&request.id, "zzz999", now_ms())
            .await
            .unwrap());

        assert!(db
            .change_request_repo()
            .consume(&request.id, "abc123", now_ms())
            .await
            .unwrap());

        // Second consumption is refused.
        assert!(!db
            .change_request_repo()
            .consume(&request.id, "abc123", now_ms())
            .await
            .unwrap());
    }

    #[tokio::test]
    async fn test_alias_upsert_and_list() {
        let db = Database::in_memory().await.unwrap();
        let repo = db.alias_repo();
        repo.upsert("exec", &cap("action.shell.exec")).await.unwrap();
        repo.upsert("exec", &cap("action.network.fetch")).await.unwrap();

        let rows = repo.list_all().await.unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].capability_id, "action.network.fetch");

        assert!(repo.remove("exec").await.unwrap());
        assert!(!repo.remove("exec").await.unwrap());
    }
}
