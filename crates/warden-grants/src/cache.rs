//! TTL permission cache
//!
//! A simple expiring key→bool map over the grant store. Concurrent
//! duplicate fills on a miss are harmless — the lookup is idempotent —
//! so no blocking synchronization beyond the concurrent map itself.

use dashmap::DashMap;
use std::time::{Duration, Instant};

/// Default entry lifetime.
pub const DEFAULT_TTL: Duration = Duration::from_secs(60);

#[derive(Debug, Clone, Copy)]
struct CacheEntry {
    allowed: bool,
    expires_at: Instant,
}

/// Expiring agent+capability+scope → allowed map.
#[derive(Debug)]
pub struct PermissionCache {
    entries: DashMap<String, CacheEntry>,
    ttl: Duration,
}

impl PermissionCache {
    pub fn new(ttl: Duration) -> Self {
        Self {
            entries: DashMap::new(),
            ttl,
        }
    }

    /// Cache key. The agent segment leads so per-agent invalidation can
    /// match on prefix.
    pub fn key(agent_id: &str, capability_id: &str, scope: Option<&str>) -> String {
        format!("{}|{}|{}", agent_id, capability_id, scope.unwrap_or("-"))
    }

    pub fn get(&self, key: &str) -> Option<bool> {
        let entry = self.entries.get(key)?;
        if entry.expires_at <= Instant::now() {
            drop(entry);
            self.entries.remove(key);
            return None;
        }
        Some(entry.allowed)
    }

    pub fn insert(&self, key: String, allowed: bool) {
        self.entries.insert(
            key,
            CacheEntry {
                allowed,
                expires_at: Instant::now() + self.ttl,
            },
        );
    }

    /// Drop every entry for an agent. Called on grant/revoke so the next
    /// check observes the mutation.
    pub fn invalidate_agent(&self, agent_id: &str) {
        let prefix = format!("{agent_id}|");
        self.entries.retain(|key, _| !key.starts_with(&prefix));
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl Default for PermissionCache {
    fn default() -> Self {
        Self::new(DEFAULT_TTL)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hit_within_ttl() {
        let cache = PermissionCache::default();
        let key = PermissionCache::key("agentA", "state.memory.read", None);
        cache.insert(key.clone(), true);
        assert_eq!(cache.get(&key), Some(true));
    }

    #[test]
    fn test_expired_entry_is_a_miss() {
        let cache = PermissionCache::new(Duration::from_millis(0));
        let key = PermissionCache::key("agentA", "state.memory.read", None);
        cache.insert(key.clone(), true);
        assert_eq!(cache.get(&key), None);
        assert!(cache.is_empty());
    }

    #[test]
    fn test_invalidate_only_matching_agent() {
        let cache = PermissionCache::default();
        let a = PermissionCache::key("agentA", "state.memory.read", None);
        let b = PermissionCache::key("agentB", "state.memory.read", Some("project-x"));
        cache.insert(a.clone(), true);
        cache.insert(b.clone(), false);

        cache.invalidate_agent("agentA");
        assert_eq!(cache.get(&a), None);
        assert_eq!(cache.get(&b), Some(false));
    }
}
