//! Execution alias resolver.
//!
//! A small external-facing name like `exec` resolves to a canonical
//! capability id by merging three layers with strictly increasing
//! priority: compiled-in defaults, a declarative file override, and the
//! persisted store. Entries are validated against the catalog at merge
//! time; an entry naming an unknown capability is dropped with a warning.
//! A source that fails to load leaves its previous contents in place, so
//! resolution keeps serving the last successfully merged mapping.

use std::collections::BTreeMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tracing::{info, warn};
use warden_catalog::CapabilityCatalog;
use warden_db::AliasRepo;
use warden_types::{CapabilityId, Result, WardenError};

// ============================================================================
// Layers
// ============================================================================

/// Which layer an alias entry came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AliasSource {
    Builtin,
    File,
    Store,
}

impl AliasSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            AliasSource::Builtin => "builtin",
            AliasSource::File => "file",
            AliasSource::Store => "store",
        }
    }
}

/// Compiled-in defaults, the lowest-priority layer.
fn builtin_aliases() -> Vec<(&'static str, &'static str)> {
    vec![
        ("exec", "action.shell.exec"),
        ("fetch", "action.network.fetch"),
        ("write-file", "action.file.write"),
        ("remember", "state.memory.write"),
        ("recall", "state.memory.read"),
        ("plan", "decision.plan.create"),
        ("trace", "evidence.trace.record"),
    ]
}

/// Shape of an alias override file: `{"aliases": {"exec": "action.shell.exec"}}`.
#[derive(Debug, Deserialize)]
struct AliasFile {
    aliases: BTreeMap<String, String>,
}

// ============================================================================
// Resolver
// ============================================================================

/// One entry in the merged mapping.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AliasEntry {
    pub alias: String,
    pub capability_id: CapabilityId,
    pub source: AliasSource,
}

/// Deterministic snapshot of the merged mapping, usable as audit evidence.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AliasExport {
    /// Entries sorted by alias.
    pub entries: Vec<AliasEntry>,
    /// SHA-256 over the serialized entries.
    pub content_hash: String,
}

/// Layered alias resolver. Loads mutate; resolution reads the merged map.
pub struct AliasResolver {
    catalog: Arc<CapabilityCatalog>,
    file_layer: BTreeMap<String, String>,
    store_layer: BTreeMap<String, String>,
    /// Provider pins select which backend implements an alias. They never
    /// change what capability the alias maps to.
    provider_pins: BTreeMap<String, String>,
    merged: BTreeMap<String, AliasEntry>,
}

impl AliasResolver {
    pub fn new(catalog: Arc<CapabilityCatalog>) -> Self {
        let mut resolver = Self {
            catalog,
            file_layer: BTreeMap::new(),
            store_layer: BTreeMap::new(),
            provider_pins: BTreeMap::new(),
            merged: BTreeMap::new(),
        };
        resolver.remerge();
        resolver
    }

    /// Loads the file layer from JSON. On a parse failure the previous
    /// file layer stays in effect.
    pub fn load_file(&mut self, json: &str) -> Result<()> {
        let file: AliasFile = match serde_json::from_str(json) {
            Ok(f) => f,
            Err(e) => {
                warn!(error = %e, "alias file unreadable; keeping last known good mapping");
                return Err(WardenError::invalid_input(
                    "aliases",
                    format!("invalid alias file: {e}"),
                ));
            }
        };
        self.file_layer = file.aliases;
        self.remerge();
        Ok(())
    }

    /// Loads the store layer. On a store failure the previous store layer
    /// stays in effect and the error is reported.
    pub async fn load_store(&mut self, repo: &AliasRepo) -> Result<()> {
        let rows = match repo.list_all().await {
            Ok(rows) => rows,
            Err(e) => {
                warn!(error = %e, "alias store unreadable; keeping last known good mapping");
                return Err(WardenError::store(e.to_string()));
            }
        };
        self.store_layer = rows
            .into_iter()
            .map(|row| (row.alias, row.capability_id))
            .collect();
        self.remerge();
        Ok(())
    }

    /// Pins the provider backing an alias. The capability mapping is
    /// untouched.
    pub fn pin_provider(&mut self, alias: impl Into<String>, provider: impl Into<String>) {
        self.provider_pins.insert(alias.into(), provider.into());
    }

    pub fn provider_for(&self, alias: &str) -> Option<&str> {
        self.provider_pins.get(alias).map(String::as_str)
    }

    /// Reads provider pins from `WARDEN_ALIAS_PROVIDER_<ALIAS>` variables.
    /// `WARDEN_ALIAS_PROVIDER_EXEC=containerized` pins the `exec` provider.
    pub fn pin_providers_from_env(&mut self) {
        const PREFIX: &str = "WARDEN_ALIAS_PROVIDER_";
        for (key, value) in std::env::vars() {
            if let Some(alias) = key.strip_prefix(PREFIX) {
                self.pin_provider(alias.to_lowercase().replace('_', "-"), value);
            }
        }
    }

    /// Resolves an alias against the merged mapping.
    pub fn resolve(&self, alias: &str) -> Option<&CapabilityId> {
        self.merged.get(alias).map(|entry| &entry.capability_id)
    }

    pub fn len(&self) -> usize {
        self.merged.len()
    }

    pub fn is_empty(&self) -> bool {
        self.merged.is_empty()
    }

    /// Rebuilds the merged map, lowest priority first so later layers
    /// overwrite earlier ones. Validation happens here.
    fn remerge(&mut self) {
        let mut merged = BTreeMap::new();
        let builtin: Vec<(String, String)> = builtin_aliases()
            .into_iter()
            .map(|(a, c)| (a.to_string(), c.to_string()))
            .collect();
        let file: Vec<(String, String)> = self
            .file_layer
            .iter()
            .map(|(a, c)| (a.clone(), c.clone()))
            .collect();
        let store: Vec<(String, String)> = self
            .store_layer
            .iter()
            .map(|(a, c)| (a.clone(), c.clone()))
            .collect();

        for (source, entries) in [
            (AliasSource::Builtin, builtin),
            (AliasSource::File, file),
            (AliasSource::Store, store),
        ] {
            for (alias, raw_capability) in entries {
                let capability_id = match raw_capability.parse::<CapabilityId>() {
                    Ok(id) => id,
                    Err(e) => {
                        warn!(
                            alias = %alias,
                            capability_id = %raw_capability,
                            source = source.as_str(),
                            error = %e,
                            "dropping alias with malformed capability id"
                        );
                        continue;
                    }
                };
                if !self.catalog.contains(&capability_id) {
                    warn!(
                        alias = %alias,
                        capability_id = %capability_id,
                        source = source.as_str(),
                        "dropping alias pointing at unknown capability"
                    );
                    continue;
                }
                merged.insert(
                    alias.clone(),
                    AliasEntry {
                        alias,
                        capability_id,
                        source,
                    },
                );
            }
        }

        info!(entries = merged.len(), "alias mapping merged");
        self.merged = merged;
    }

    /// Deterministic export of the merged mapping with a content hash.
    pub fn export(&self) -> AliasExport {
        let entries: Vec<AliasEntry> = self.merged.values().cloned().collect();
        let mut hasher = Sha256::new();
        for entry in &entries {
            hasher.update(entry.alias.as_bytes());
            hasher.update(b"=");
            hasher.update(entry.capability_id.as_str().as_bytes());
            hasher.update(b"\n");
        }
        AliasExport {
            entries,
            content_hash: hex::encode(hasher.finalize()),
        }
    }
}
