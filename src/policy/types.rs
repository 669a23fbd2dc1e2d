//! Policy records as they are stored and edited.
//!
//! These are plain data: strings exactly as an operator wrote them. They are
//! checked and compiled into a [`PolicySnapshot`](super::PolicySnapshot)
//! before the gate ever reads them.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Category used when a rule names none.
pub const DEFAULT_CATEGORY: &str = "default";

/// The full policy table handed over by the configuration collaborator.
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct PolicyConfig {
    /// Ranges that make an origin "internal".
    pub ranges: Vec<AddressRange>,

    /// Per-(path, method) access rules.
    pub rules: Vec<AccessRule>,

    /// Ceiling defaults and category multipliers.
    pub rate_limit: RateLimitPolicy,

    /// Per-origin explicit ceilings.
    pub overrides: Vec<OriginOverride>,
}

/// A network range treated as internal.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct AddressRange {
    pub id: String,

    /// CIDR notation, v4 or v6 (e.g. "10.0.0.0/8", "fd00::/8").
    pub cidr: String,

    #[serde(default)]
    pub label: String,
}

/// Which origins may call one endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct AccessRule {
    /// Route template, matched literally after normalization.
    pub path: String,

    /// HTTP method, case-insensitive in the file.
    pub method: String,

    #[serde(default = "default_allow_internal")]
    pub allow_internal: bool,

    #[serde(default)]
    pub allow_external: bool,

    /// Rate-limit category. `None` means [`DEFAULT_CATEGORY`].
    #[serde(default)]
    pub category: Option<String>,

    /// Caller must hold at least one of these. Empty means no role check.
    #[serde(default)]
    pub required_roles: Vec<String>,
}

fn default_allow_internal() -> bool {
    true
}

impl AccessRule {
    /// Rule applied when nothing matches: internal callers only.
    pub fn fallback() -> Self {
        Self {
            path: String::new(),
            method: String::new(),
            allow_internal: true,
            allow_external: false,
            category: None,
            required_roles: Vec::new(),
        }
    }

    pub fn category(&self) -> &str {
        self.category.as_deref().unwrap_or(DEFAULT_CATEGORY)
    }

    /// True when no origin can ever pass the network check.
    pub fn is_unreachable(&self) -> bool {
        !self.allow_internal && !self.allow_external
    }
}

/// Default ceiling plus per-category multipliers.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct RateLimitPolicy {
    /// Requests per window when no override or multiplier applies.
    pub default_ceiling: u32,

    /// Category name to multiplier on `default_ceiling`.
    pub categories: BTreeMap<String, f64>,
}

impl Default for RateLimitPolicy {
    fn default() -> Self {
        Self {
            default_ceiling: 60,
            categories: BTreeMap::new(),
        }
    }
}

/// Explicit ceiling for one address or range.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct OriginOverride {
    /// Single address ("203.0.113.5") or CIDR ("203.0.113.0/24").
    pub target: String,

    /// Requests per window.
    pub ceiling: u32,

    #[serde(default)]
    pub label: String,
}
