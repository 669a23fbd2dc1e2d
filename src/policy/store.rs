//! Lock-free snapshot store.
//!
//! Readers call [`PolicyStore::get`] and receive an `Arc` to the current
//! snapshot; the load never blocks. Writers compile a whole new snapshot and
//! swap it in, so readers see either the old table or the new one, never a mix.

use arc_swap::ArcSwapOption;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use crate::error::GateError;
use crate::observability::metrics;
use crate::policy::snapshot::{PolicyError, PolicySnapshot};
use crate::policy::source::{PolicySource, SourceError};
use crate::policy::types::PolicyConfig;

/// Why a reload was refused. The active snapshot is untouched in every case.
#[derive(Debug, thiserror::Error)]
pub enum ReloadError {
    #[error(transparent)]
    Source(#[from] SourceError),

    #[error("policy rejected: {}", join_errors(.0))]
    Invalid(Vec<PolicyError>),
}

fn join_errors(errors: &[PolicyError]) -> String {
    errors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

/// Holds the active policy snapshot.
#[derive(Debug, Default)]
pub struct PolicyStore {
    current: ArcSwapOption<PolicySnapshot>,
    last_version: AtomicU64,
    /// Serializes writers so versions are stored in order.
    reload_lock: Mutex<()>,
}

impl PolicyStore {
    /// A store with nothing loaded. Every `get` fails until the first reload.
    pub fn empty() -> Self {
        Self::default()
    }

    /// A store primed with an initial snapshot.
    pub fn with_snapshot(snapshot: PolicySnapshot) -> Self {
        let store = Self::empty();
        store.reload(snapshot);
        store
    }

    /// Current snapshot, or `ConfigUnavailable` before the first load.
    pub fn get(&self) -> Result<Arc<PolicySnapshot>, GateError> {
        self.current.load_full().ok_or(GateError::ConfigUnavailable)
    }

    pub fn is_loaded(&self) -> bool {
        self.current.load().is_some()
    }

    /// Version of the active snapshot, if one is loaded.
    pub fn version(&self) -> Option<u64> {
        self.current.load().as_ref().map(|s| s.version())
    }

    /// Swap in a new snapshot and return the version it was given.
    pub fn reload(&self, mut snapshot: PolicySnapshot) -> u64 {
        let _guard = self
            .reload_lock
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());

        let version = self.last_version.fetch_add(1, Ordering::SeqCst) + 1;
        snapshot.version = version;

        tracing::info!(
            version,
            ranges = snapshot.ranges().len(),
            rules = snapshot.rule_count(),
            overrides = snapshot.overrides().len(),
            "Policy snapshot activated"
        );

        self.current.store(Some(Arc::new(snapshot)));
        metrics::record_policy_reload("ok", version);
        version
    }

    /// Compile `config` and swap it in. An invalid table leaves the current
    /// snapshot active.
    pub fn reload_from(&self, config: &PolicyConfig) -> Result<u64, ReloadError> {
        match PolicySnapshot::compile(config) {
            Ok(snapshot) => Ok(self.reload(snapshot)),
            Err(errors) => {
                metrics::record_policy_reload("invalid", self.version().unwrap_or(0));
                let err = ReloadError::Invalid(errors);
                tracing::error!(error = %err, "Policy reload failed. Keeping current snapshot.");
                Err(err)
            }
        }
    }

    /// Pull a fresh table from `source` and swap it in.
    pub fn refresh(&self, source: &dyn PolicySource) -> Result<u64, ReloadError> {
        let config = source.fetch().map_err(|e| {
            metrics::record_policy_reload("source_error", self.version().unwrap_or(0));
            tracing::error!(source = %source.describe(), error = %e, "Policy source unavailable");
            e
        })?;
        self.reload_from(&config)
    }
}
