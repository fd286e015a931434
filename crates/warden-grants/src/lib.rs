//! Warden Grants - Grant store and permission checks
//!
//! The grant store owns agent→capability grants and answers the two
//! permission questions:
//!
//! - [`GrantStore::has_capability`] — the non-raising query path,
//!   memoized through a TTL cache;
//! - [`GrantStore::check_capability`] — the enforcing path, which always
//!   writes one invocation audit row and raises
//!   [`WardenError::PermissionDenied`] on a negative answer.
//!
//! Audit writes are best-effort-durable: a failed audit write is logged
//! and surfaced as an operational gap but never aborts or reverses the
//! governed decision.

pub mod cache;

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use tracing::{error, warn};

use warden_catalog::CapabilityCatalog;
use warden_db::{Database, DbError};
use warden_types::{
    AgentId, AuditEntryId, CapabilityGrant, CapabilityId, GrantId, InvocationRecord, Result,
    TimestampMs, WardenError, now_ms,
};

pub use cache::{DEFAULT_TTL, PermissionCache};

/// Parameters for a new grant.
#[derive(Debug, Clone)]
pub struct GrantRequest {
    pub agent_id: AgentId,
    pub capability_id: CapabilityId,
    pub granted_by: String,
    pub reason: Option<String>,
    pub expires_at: Option<TimestampMs>,
    pub scope: Option<String>,
    pub metadata: serde_json::Value,
}

impl GrantRequest {
    pub fn new(
        agent_id: impl Into<AgentId>,
        capability_id: CapabilityId,
        granted_by: impl Into<String>,
    ) -> Self {
        Self {
            agent_id: agent_id.into(),
            capability_id,
            granted_by: granted_by.into(),
            reason: None,
            expires_at: None,
            scope: None,
            metadata: serde_json::Value::Null,
        }
    }

    pub fn with_reason(mut self, reason: impl Into<String>) -> Self {
        self.reason = Some(reason.into());
        self
    }

    pub fn with_expiry(mut self, expires_at: TimestampMs) -> Self {
        self.expires_at = Some(expires_at);
        self
    }

    pub fn with_scope(mut self, scope: impl Into<String>) -> Self {
        self.scope = Some(scope.into());
        self
    }

    pub fn with_metadata(mut self, metadata: serde_json::Value) -> Self {
        self.metadata = metadata;
        self
    }
}

/// Agent→capability grant store with TTL-cached permission checks.
pub struct GrantStore {
    db: Arc<Database>,
    catalog: Arc<CapabilityCatalog>,
    cache: PermissionCache,
    store_lookups: AtomicU64,
}

impl GrantStore {
    pub fn new(db: Arc<Database>, catalog: Arc<CapabilityCatalog>) -> Self {
        Self::with_cache_ttl(db, catalog, DEFAULT_TTL)
    }

    pub fn with_cache_ttl(
        db: Arc<Database>,
        catalog: Arc<CapabilityCatalog>,
        ttl: Duration,
    ) -> Self {
        Self {
            db,
            catalog,
            cache: PermissionCache::new(ttl),
            store_lookups: AtomicU64::new(0),
        }
    }

    /// Number of grant-store round-trips performed by permission checks.
    /// Cache hits do not increment this.
    pub fn store_lookups(&self) -> u64 {
        self.store_lookups.load(Ordering::Relaxed)
    }

    /// Grant a capability to an agent. Writes the grant row and its
    /// `grant` audit row in one transaction, then invalidates the agent's
    /// cache entries.
    pub async fn grant(&self, request: GrantRequest) -> Result<GrantId> {
        self.catalog.require(&request.capability_id)?;

        if let Some(expires_at) = request.expires_at {
            if expires_at <= now_ms() {
                return Err(WardenError::invalid_input(
                    "expires_at",
                    "expiry must be in the future",
                ));
            }
        }

        let grant = CapabilityGrant {
            grant_id: GrantId::new(),
            agent_id: request.agent_id.clone(),
            capability_id: request.capability_id,
            granted_by: request.granted_by,
            granted_at: now_ms(),
            expires_at: request.expires_at,
            scope: request.scope,
            reason: request.reason,
            metadata: request.metadata,
        };

        self.db
            .grant_repo()
            .insert_with_audit(&grant)
            .await
            .map_err(|e| map_db(e, "grant"))?;

        self.cache.invalidate_agent(grant.agent_id.as_str());
        Ok(grant.grant_id)
    }

    /// Revoke the newest active grant for agent + capability. Returns
    /// `false` when no matching active grant exists; that case writes no
    /// audit row.
    pub async fn revoke(
        &self,
        agent_id: &AgentId,
        capability_id: &CapabilityId,
        revoked_by: &str,
        reason: Option<&str>,
    ) -> Result<bool> {
        self.revoke_scoped(agent_id, capability_id, None, revoked_by, reason)
            .await
    }

    /// Scope-qualified revoke.
    pub async fn revoke_scoped(
        &self,
        agent_id: &AgentId,
        capability_id: &CapabilityId,
        scope: Option<&str>,
        revoked_by: &str,
        reason: Option<&str>,
    ) -> Result<bool> {
        self.catalog.require(capability_id)?;

        let revoked = self
            .db
            .grant_repo()
            .revoke_with_audit(agent_id, capability_id, scope, revoked_by, reason, now_ms())
            .await
            .map_err(|e| map_db(e, "revoke"))?;

        if revoked {
            self.cache.invalidate_agent(agent_id.as_str());
        }
        Ok(revoked)
    }

    /// Non-raising permission check with an invocation audit row.
    pub async fn has_capability(
        &self,
        agent_id: &AgentId,
        capability_id: &CapabilityId,
        scope: Option<&str>,
    ) -> bool {
        self.has_capability_inner(agent_id, capability_id, scope, false)
            .await
    }

    /// Non-raising permission check without an audit row; used by callers
    /// (like `check_capability`) that write their own.
    pub async fn has_capability_unaudited(
        &self,
        agent_id: &AgentId,
        capability_id: &CapabilityId,
        scope: Option<&str>,
    ) -> bool {
        self.has_capability_inner(agent_id, capability_id, scope, true)
            .await
    }

    async fn has_capability_inner(
        &self,
        agent_id: &AgentId,
        capability_id: &CapabilityId,
        scope: Option<&str>,
        suppress_audit: bool,
    ) -> bool {
        // Orphaned capability references are rejected, not assumed valid.
        if !self.catalog.contains(capability_id) {
            warn!(
                capability = %capability_id,
                "permission check against unknown capability"
            );
            return false;
        }

        let key = PermissionCache::key(agent_id.as_str(), capability_id.as_str(), scope);
        let allowed = match self.cache.get(&key) {
            Some(cached) => cached,
            None => {
                self.store_lookups.fetch_add(1, Ordering::Relaxed);
                match self
                    .db
                    .grant_repo()
                    .find_active(agent_id, capability_id, scope, now_ms())
                    .await
                {
                    Ok(row) => {
                        let allowed = row.is_some();
                        self.cache.insert(key, allowed);
                        allowed
                    }
                    Err(e) => {
                        // Never fail open: a store failure denies, and is
                        // not cached so recovery is immediate.
                        warn!(error = %e, agent = %agent_id, capability = %capability_id,
                              "grant lookup failed; denying");
                        false
                    }
                }
            }
        };

        if !suppress_audit {
            self.write_invocation_audit(
                agent_id,
                capability_id,
                "has_capability",
                allowed,
                None,
                serde_json::json!({ "scope": scope }),
            )
            .await;
        }
        allowed
    }

    /// Enforcing permission check. Always writes exactly one invocation
    /// audit row carrying `operation` and `context`, and raises
    /// [`WardenError::PermissionDenied`] when the agent lacks the
    /// capability.
    pub async fn check_capability(
        &self,
        agent_id: &AgentId,
        capability_id: &CapabilityId,
        operation: &str,
        context: Option<serde_json::Value>,
        scope: Option<&str>,
    ) -> Result<()> {
        let allowed = self
            .has_capability_unaudited(agent_id, capability_id, scope)
            .await;

        let reason = if allowed {
            None
        } else {
            Some("no active grant".to_string())
        };
        self.write_invocation_audit(
            agent_id,
            capability_id,
            operation,
            allowed,
            reason.as_deref(),
            context.unwrap_or(serde_json::Value::Null),
        )
        .await;

        if allowed {
            Ok(())
        } else {
            Err(WardenError::PermissionDenied {
                agent_id: agent_id.to_string(),
                capability_id: capability_id.to_string(),
                operation: operation.to_string(),
                reason: "no active grant".to_string(),
            })
        }
    }

    /// All grants for an agent, newest first.
    pub async fn list_agent_grants(
        &self,
        agent_id: &AgentId,
        include_expired: bool,
    ) -> Result<Vec<CapabilityGrant>> {
        let rows = self
            .db
            .grant_repo()
            .list_for_agent(agent_id, include_expired, now_ms())
            .await
            .map_err(|e| map_db(e, "list_agent_grants"))?;
        rows.into_iter()
            .map(|row| row.into_domain().map_err(|e| map_db(e, "list_agent_grants")))
            .collect()
    }

    /// Best-effort audit write: failure is logged and independently
    /// alertable, but the decision stands.
    async fn write_invocation_audit(
        &self,
        agent_id: &AgentId,
        capability_id: &CapabilityId,
        operation: &str,
        allowed: bool,
        reason: Option<&str>,
        context: serde_json::Value,
    ) {
        let record = InvocationRecord {
            id: AuditEntryId::new(),
            agent_id: agent_id.clone(),
            capability_id: capability_id.clone(),
            operation: operation.to_string(),
            allowed,
            reason: reason.map(|r| r.to_string()),
            context,
            timestamp: now_ms(),
        };
        if let Err(e) = self.db.audit_repo().append(&record).await {
            error!(
                error = %e,
                agent = %agent_id,
                capability = %capability_id,
                operation,
                "audit write failed; decision stands but the trail has a gap"
            );
        }
    }
}

fn map_db(e: DbError, operation: &str) -> WardenError {
    match e {
        DbError::SchemaNotReady => WardenError::SchemaNotReady {
            operation: operation.to_string(),
        },
        other => WardenError::store(other.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn store() -> GrantStore {
        let db = Arc::new(Database::in_memory().await.unwrap());
        let catalog = Arc::new(CapabilityCatalog::builtin());
        GrantStore::new(db, catalog)
    }

    fn cap(id: &str) -> CapabilityId {
        CapabilityId::parse(id).unwrap()
    }

    #[tokio::test]
    async fn test_grant_then_has_capability() {
        let store = store().await;
        let agent = AgentId::new("agentA");

        assert!(!store.has_capability(&agent, &cap("state.memory.read"), None).await);

        store
            .grant(GrantRequest::new("agentA", cap("state.memory.read"), "admin"))
            .await
            .unwrap();

        assert!(store.has_capability(&agent, &cap("state.memory.read"), None).await);
    }

    #[tokio::test]
    async fn test_grant_rejects_unknown_capability() {
        let store = store().await;
        let err = store
            .grant(GrantRequest::new(
                "agentA",
                cap("state.memory.purge"),
                "admin",
            ))
            .await
            .unwrap_err();
        assert!(matches!(err, WardenError::UnknownCapability { .. }));
    }

    #[tokio::test]
    async fn test_expired_grant_denied() {
        let store = store().await;
        let agent = AgentId::new("agentA");
        let err = store
            .grant(
                GrantRequest::new("agentA", cap("state.memory.read"), "admin")
                    .with_expiry(now_ms() - 1_000),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, WardenError::InvalidInput { .. }));
        assert!(!store.has_capability(&agent, &cap("state.memory.read"), None).await);
    }

    #[tokio::test]
    async fn test_cache_hit_skips_store_lookup() {
        let store = store().await;
        let agent = AgentId::new("agentA");
        store
            .grant(GrantRequest::new("agentA", cap("state.memory.read"), "admin"))
            .await
            .unwrap();

        assert!(store.has_capability(&agent, &cap("state.memory.read"), None).await);
        assert_eq!(store.store_lookups(), 1);

        // Within the TTL: same answer, no second round-trip.
        assert!(store.has_capability(&agent, &cap("state.memory.read"), None).await);
        assert_eq!(store.store_lookups(), 1);
    }

    #[tokio::test]
    async fn test_revoke_invalidates_cache() {
        let store = store().await;
        let agent = AgentId::new("agentA");
        store
            .grant(GrantRequest::new("agentA", cap("state.memory.read"), "admin"))
            .await
            .unwrap();
        assert!(store.has_capability(&agent, &cap("state.memory.read"), None).await);

        let revoked = store
            .revoke(&agent, &cap("state.memory.read"), "admin", None)
            .await
            .unwrap();
        assert!(revoked);

        // The revoke must be visible on the next call, not after TTL.
        assert!(!store.has_capability(&agent, &cap("state.memory.read"), None).await);
    }

    #[tokio::test]
    async fn test_revoke_without_grant_returns_false() {
        let store = store().await;
        let agent = AgentId::new("agentA");
        let revoked = store
            .revoke(&agent, &cap("state.memory.read"), "admin", None)
            .await
            .unwrap();
        assert!(!revoked);
    }

    #[tokio::test]
    async fn test_check_capability_raises_with_contract_fields() {
        let store = store().await;
        let agent = AgentId::new("agentA");
        let err = store
            .check_capability(&agent, &cap("action.shell.exec"), "exec", None, None)
            .await
            .unwrap_err();
        match err {
            WardenError::PermissionDenied {
                agent_id,
                capability_id,
                operation,
                reason,
            } => {
                assert_eq!(agent_id, "agentA");
                assert_eq!(capability_id, "action.shell.exec");
                assert_eq!(operation, "exec");
                assert!(!reason.is_empty());
            }
            other => panic!("expected PermissionDenied, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_scoped_grants() {
        let store = store().await;
        let agent = AgentId::new("agentA");
        store
            .grant(
                GrantRequest::new("agentA", cap("action.file.write"), "admin")
                    .with_scope("project-x"),
            )
            .await
            .unwrap();

        assert!(
            store
                .has_capability(&agent, &cap("action.file.write"), Some("project-x"))
                .await
        );
        assert!(
            !store
                .has_capability(&agent, &cap("action.file.write"), Some("project-y"))
                .await
        );
        assert!(!store.has_capability(&agent, &cap("action.file.write"), None).await);
    }

    #[tokio::test]
    async fn test_list_agent_grants_newest_first() {
        let store = store().await;
        let agent = AgentId::new("agentA");
        store
            .grant(GrantRequest::new("agentA", cap("state.memory.read"), "admin"))
            .await
            .unwrap();
        tokio::time::sleep(Duration::from_millis(5)).await;
        store
            .grant(GrantRequest::new("agentA", cap("state.memory.write"), "admin"))
            .await
            .unwrap();

        let grants = store.list_agent_grants(&agent, false).await.unwrap();
        assert_eq!(grants.len(), 2);
        assert_eq!(grants[0].capability_id, cap("state.memory.write"));
        assert_eq!(grants[1].capability_id, cap("state.memory.read"));
    }

    #[tokio::test]
    async fn test_schema_not_ready_surfaces_as_gateable_error() {
        let db = Arc::new(
            Database::connect(&warden_db::DatabaseConfig::in_memory())
                .await
                .unwrap(),
        );
        let catalog = Arc::new(CapabilityCatalog::builtin());
        let store = GrantStore::new(db, catalog);

        let err = store
            .grant(GrantRequest::new("agentA", cap("state.memory.read"), "admin"))
            .await
            .unwrap_err();
        assert!(matches!(err, WardenError::SchemaNotReady { .. }));
        assert_eq!(err.error_code(), "SCHEMA_NOT_READY");
    }
}
