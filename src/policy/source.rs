//! Configuration collaborator seam.
//!
//! The gate only ever reads a whole [`PolicyConfig`] from a source. Editing
//! happens elsewhere (an admin tool, a database); [`MemorySource`] models
//! that editable key-value/list store for embedding and tests.

use arc_swap::ArcSwap;
use std::path::PathBuf;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::{broadcast, watch};

use crate::config::loader::{load_settings, ConfigError};
use crate::policy::store::PolicyStore;
use crate::policy::types::{AccessRule, AddressRange, OriginOverride, PolicyConfig, RateLimitPolicy};

#[derive(Debug, Error)]
pub enum SourceError {
    #[error("failed to load policy: {0}")]
    Load(#[from] ConfigError),

    #[error("policy source unavailable: {0}")]
    Unavailable(String),
}

/// Anything that can hand over the current policy table.
pub trait PolicySource: Send + Sync {
    /// Read the full table.
    fn fetch(&self) -> Result<PolicyConfig, SourceError>;

    /// Human-readable identity for logs.
    fn describe(&self) -> String;
}

/// Reads the `[policy]` section of the gate's TOML config file.
///
/// Only the file's syntax and non-policy settings are checked here; an
/// invalid policy table is handed over as-is so the store rejects it with
/// the individual policy errors.
#[derive(Debug, Clone)]
pub struct FileSource {
    path: PathBuf,
}

impl FileSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl PolicySource for FileSource {
    fn fetch(&self) -> Result<PolicyConfig, SourceError> {
        Ok(load_settings(&self.path)?.policy)
    }

    fn describe(&self) -> String {
        format!("file:{}", self.path.display())
    }
}

/// In-process editable policy table.
///
/// Every write replaces the whole table, so a concurrent `fetch` sees either
/// the state before or after an edit. Each edit also bumps a generation
/// counter that [`MemorySource::subscribe`] receivers observe.
#[derive(Debug)]
pub struct MemorySource {
    table: ArcSwap<PolicyConfig>,
    changes: watch::Sender<u64>,
}

impl Default for MemorySource {
    fn default() -> Self {
        Self::new(PolicyConfig::default())
    }
}

impl MemorySource {
    pub fn new(config: PolicyConfig) -> Self {
        let (changes, _) = watch::channel(0);
        Self {
            table: ArcSwap::from_pointee(config),
            changes,
        }
    }

    /// Change notifications. The value is the number of edits so far.
    pub fn subscribe(&self) -> watch::Receiver<u64> {
        self.changes.subscribe()
    }

    pub fn generation(&self) -> u64 {
        *self.changes.borrow()
    }

    pub fn ranges(&self) -> Vec<AddressRange> {
        self.table.load().ranges.clone()
    }

    pub fn rules(&self) -> Vec<AccessRule> {
        self.table.load().rules.clone()
    }

    pub fn overrides(&self) -> Vec<OriginOverride> {
        self.table.load().overrides.clone()
    }

    /// Insert or replace a range by id.
    pub fn put_range(&self, range: AddressRange) {
        self.edit(|t| {
            t.ranges.retain(|r| r.id != range.id);
            t.ranges.push(range.clone());
        });
    }

    pub fn remove_range(&self, id: &str) {
        self.edit(|t| t.ranges.retain(|r| r.id != id));
    }

    /// Insert or replace a rule keyed by (path, method).
    pub fn put_rule(&self, rule: AccessRule) {
        self.edit(|t| {
            t.rules.retain(|r| !same_rule_key(r, &rule.path, &rule.method));
            t.rules.push(rule.clone());
        });
    }

    pub fn remove_rule(&self, path: &str, method: &str) {
        self.edit(|t| t.rules.retain(|r| !same_rule_key(r, path, method)));
    }

    pub fn set_rate_limit(&self, policy: RateLimitPolicy) {
        self.edit(|t| t.rate_limit = policy.clone());
    }

    /// Insert or replace an override by target.
    pub fn put_override(&self, ov: OriginOverride) {
        self.edit(|t| {
            t.overrides.retain(|o| o.target.trim() != ov.target.trim());
            t.overrides.push(ov.clone());
        });
    }

    pub fn remove_override(&self, target: &str) {
        self.edit(|t| t.overrides.retain(|o| o.target.trim() != target.trim()));
    }

    fn edit(&self, f: impl Fn(&mut PolicyConfig)) {
        self.table.rcu(|current| {
            let mut next = PolicyConfig::clone(current);
            f(&mut next);
            Arc::new(next)
        });
        self.changes.send_modify(|generation| *generation += 1);
    }
}

/// Reload `store` from `source` after every edit until `stop` fires.
///
/// Edits made while a reload runs coalesce into one more reload. A rejected
/// table leaves the previous snapshot active.
pub async fn follow_changes(source: Arc<MemorySource>, store: Arc<PolicyStore>, mut stop: broadcast::Receiver<()>) {
    let mut changes = source.subscribe();
    loop {
        tokio::select! {
            changed = changes.changed() => {
                if changed.is_err() {
                    break;
                }
                changes.borrow_and_update();
                // Failures are logged by the store.
                let _ = store.refresh(source.as_ref());
            }
            _ = stop.recv() => break,
        }
    }
}

fn same_rule_key(rule: &AccessRule, path: &str, method: &str) -> bool {
    use crate::policy::snapshot::normalize_path;
    normalize_path(&rule.path) == normalize_path(path) && rule.method.trim().eq_ignore_ascii_case(method.trim())
}

impl PolicySource for MemorySource {
    fn fetch(&self) -> Result<PolicyConfig, SourceError> {
        Ok(PolicyConfig::clone(&self.table.load()))
    }

    fn describe(&self) -> String {
        "memory".to_string()
    }
}
