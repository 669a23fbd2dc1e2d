//! Compiled, immutable policy snapshot.
//!
//! A snapshot is built once from a [`PolicyConfig`] and never mutated
//! afterwards. Readers hold it through an `Arc`, so a request that grabbed a
//! snapshot keeps deciding against it even if a reload lands meanwhile.

use axum::http::Method;
use ipnet::{IpNet, Ipv4Net, Ipv6Net};
use std::borrow::Cow;
use std::collections::HashMap;
use std::net::IpAddr;
use thiserror::Error;

use crate::net::classifier::{normalize_address, AddressClassifier};
use crate::policy::types::{AccessRule, PolicyConfig, RateLimitPolicy};

/// Problems found while compiling a policy table.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum PolicyError {
    #[error("range {id:?}: invalid CIDR {cidr:?}: {reason}")]
    InvalidCidr { id: String, cidr: String, reason: String },

    #[error("override target {target:?} is not an address or CIDR")]
    InvalidOverrideTarget { target: String },

    #[error("override {target:?}: ceiling must be at least 1")]
    ZeroOverrideCeiling { target: String },

    #[error("rule {path:?}: invalid HTTP method {method:?}")]
    InvalidMethod { path: String, method: String },

    #[error("duplicate rule for {method} {path}")]
    DuplicateRule { path: String, method: String },

    #[error("category {category:?}: multiplier {value} must be finite and positive")]
    InvalidMultiplier { category: String, value: f64 },

    #[error("default ceiling must be at least 1")]
    ZeroDefaultCeiling,
}

/// A compiled internal range.
#[derive(Debug, Clone)]
pub struct CompiledRange {
    pub id: String,
    pub net: IpNet,
}

/// A compiled origin override.
#[derive(Debug, Clone)]
pub struct CompiledOverride {
    pub net: IpNet,
    pub ceiling: u32,
    pub label: String,
}

/// Result of a rule lookup.
#[derive(Debug, Clone, Copy)]
pub struct RuleMatch<'a> {
    pub rule: &'a AccessRule,
    /// False when the safe fallback was used.
    pub explicit: bool,
}

/// Point-in-time view of every policy table the gate consults.
#[derive(Debug)]
pub struct PolicySnapshot {
    pub(crate) version: u64,
    ranges: Vec<CompiledRange>,
    rules: HashMap<String, HashMap<Method, AccessRule>>,
    fallback: AccessRule,
    rate_limit: RateLimitPolicy,
    /// Most specific first, then lowest ceiling.
    overrides: Vec<CompiledOverride>,
}

impl PolicySnapshot {
    /// Compile a policy table, collecting every error rather than stopping at the first.
    pub fn compile(config: &PolicyConfig) -> Result<Self, Vec<PolicyError>> {
        let mut errors = Vec::new();

        let mut ranges = Vec::with_capacity(config.ranges.len());
        for range in &config.ranges {
            match range.cidr.trim().parse::<IpNet>() {
                Ok(net) => ranges.push(CompiledRange {
                    id: range.id.clone(),
                    net: normalize_net(net),
                }),
                Err(e) => errors.push(PolicyError::InvalidCidr {
                    id: range.id.clone(),
                    cidr: range.cidr.clone(),
                    reason: e.to_string(),
                }),
            }
        }

        let mut rules: HashMap<String, HashMap<Method, AccessRule>> = HashMap::new();
        for rule in &config.rules {
            let method = match Method::from_bytes(rule.method.trim().to_ascii_uppercase().as_bytes()) {
                Ok(m) => m,
                Err(_) => {
                    errors.push(PolicyError::InvalidMethod {
                        path: rule.path.clone(),
                        method: rule.method.clone(),
                    });
                    continue;
                }
            };
            let path = normalize_path(&rule.path).into_owned();
            let by_method = rules.entry(path.clone()).or_default();
            if by_method.contains_key(&method) {
                errors.push(PolicyError::DuplicateRule {
                    path,
                    method: method.to_string(),
                });
                continue;
            }
            if rule.is_unreachable() {
                tracing::warn!(
                    path = %path,
                    method = %method,
                    "Rule allows neither internal nor external origins; endpoint is unreachable"
                );
            }
            let mut compiled = rule.clone();
            compiled.path = path;
            compiled.method = method.to_string();
            by_method.insert(method, compiled);
        }

        if config.rate_limit.default_ceiling == 0 {
            errors.push(PolicyError::ZeroDefaultCeiling);
        }
        for (category, value) in &config.rate_limit.categories {
            if !value.is_finite() || *value <= 0.0 {
                errors.push(PolicyError::InvalidMultiplier {
                    category: category.clone(),
                    value: *value,
                });
            }
        }

        let mut overrides = Vec::with_capacity(config.overrides.len());
        for ov in &config.overrides {
            let Some(net) = parse_target(&ov.target) else {
                errors.push(PolicyError::InvalidOverrideTarget {
                    target: ov.target.clone(),
                });
                continue;
            };
            if ov.ceiling == 0 {
                errors.push(PolicyError::ZeroOverrideCeiling {
                    target: ov.target.clone(),
                });
                continue;
            }
            overrides.push(CompiledOverride {
                net,
                ceiling: ov.ceiling,
                label: ov.label.clone(),
            });
        }
        overrides.sort_by(|a, b| {
            b.net
                .prefix_len()
                .cmp(&a.net.prefix_len())
                .then(a.ceiling.cmp(&b.ceiling))
        });

        if !errors.is_empty() {
            return Err(errors);
        }

        Ok(Self {
            version: 0,
            ranges,
            rules,
            fallback: AccessRule::fallback(),
            rate_limit: config.rate_limit.clone(),
            overrides,
        })
    }

    /// Version assigned by the store on reload. Zero until stored.
    pub fn version(&self) -> u64 {
        self.version
    }

    pub fn ranges(&self) -> &[CompiledRange] {
        &self.ranges
    }

    pub fn rate_limit(&self) -> &RateLimitPolicy {
        &self.rate_limit
    }

    pub fn overrides(&self) -> &[CompiledOverride] {
        &self.overrides
    }

    pub fn rule_count(&self) -> usize {
        self.rules.values().map(HashMap::len).sum()
    }

    /// Classifier bound to this snapshot's ranges.
    pub fn classifier(&self) -> AddressClassifier<'_> {
        AddressClassifier::new(&self.ranges)
    }

    /// Exact lookup by route template and method, falling back to
    /// internal-only when nothing is configured.
    pub fn lookup(&self, path: &str, method: &Method) -> RuleMatch<'_> {
        let path = normalize_path(path);
        match self.rules.get(path.as_ref()).and_then(|m| m.get(method)) {
            Some(rule) => RuleMatch { rule, explicit: true },
            None => RuleMatch {
                rule: &self.fallback,
                explicit: false,
            },
        }
    }

    /// Most specific override containing `addr`, if any.
    pub fn override_for(&self, addr: IpAddr) -> Option<&CompiledOverride> {
        let addr = normalize_address(addr);
        self.overrides.iter().find(|o| o.net.contains(&addr))
    }
}

/// Truncate host bits and fold an IPv4-mapped net (`::ffff:a.b.c.d/96+`)
/// into its IPv4 equivalent, matching how addresses are normalized.
pub fn normalize_net(net: IpNet) -> IpNet {
    if let IpNet::V6(v6) = net {
        if v6.prefix_len() >= 96 {
            if let Some(v4) = v6.addr().to_ipv4_mapped() {
                if let Ok(folded) = Ipv4Net::new(v4, v6.prefix_len() - 96) {
                    return IpNet::V4(folded.trunc());
                }
            }
        }
    }
    net.trunc()
}

/// Canonical form of a route template: leading slash, no trailing slash.
pub fn normalize_path(path: &str) -> Cow<'_, str> {
    let trimmed = path.trim();
    let stripped = if trimmed.len() > 1 {
        trimmed.trim_end_matches('/')
    } else {
        trimmed
    };
    if stripped.is_empty() {
        Cow::Borrowed("/")
    } else if stripped.starts_with('/') {
        Cow::Borrowed(stripped)
    } else {
        Cow::Owned(format!("/{stripped}"))
    }
}

fn parse_target(target: &str) -> Option<IpNet> {
    let target = target.trim();
    if target.contains('/') {
        target.parse::<IpNet>().ok().map(normalize_net)
    } else {
        match normalize_address(target.parse::<IpAddr>().ok()?) {
            IpAddr::V4(v4) => Ipv4Net::new(v4, 32).ok().map(IpNet::V4),
            IpAddr::V6(v6) => Ipv6Net::new(v6, 128).ok().map(IpNet::V6),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::policy::types::{AddressRange, OriginOverride};

    fn rule(path: &str, method: &str, internal: bool, external: bool) -> AccessRule {
        AccessRule {
            path: path.into(),
            method: method.into(),
            allow_internal: internal,
            allow_external: external,
            category: None,
            required_roles: vec![],
        }
    }

    #[test]
    fn test_lookup_exact_and_fallback() {
        let config = PolicyConfig {
            rules: vec![rule("/admin/settings/", "get", true, false)],
            ..Default::default()
        };
        let snap = PolicySnapshot::compile(&config).unwrap();

        let hit = snap.lookup("/admin/settings", &Method::GET);
        assert!(hit.explicit);
        assert_eq!(hit.rule.path, "/admin/settings");

        let miss = snap.lookup("/admin/settings", &Method::POST);
        assert!(!miss.explicit);
        assert!(miss.rule.allow_internal);
        assert!(!miss.rule.allow_external);
    }

    #[test]
    fn test_path_is_literal_not_prefix() {
        let config = PolicyConfig {
            rules: vec![rule("/api", "GET", true, true)],
            ..Default::default()
        };
        let snap = PolicySnapshot::compile(&config).unwrap();
        assert!(!snap.lookup("/api/users", &Method::GET).explicit);
        assert!(!snap.lookup("/API", &Method::GET).explicit);
    }

    #[test]
    fn test_compile_collects_all_errors() {
        let config = PolicyConfig {
            ranges: vec![
                AddressRange { id: "a".into(), cidr: "10.0.0.0/33".into(), label: String::new() },
                AddressRange { id: "b".into(), cidr: "not-a-cidr".into(), label: String::new() },
            ],
            rules: vec![rule("/x", "GET", true, false), rule("/x/", "get", true, true)],
            overrides: vec![OriginOverride { target: "bogus".into(), ceiling: 5, label: String::new() }],
            ..Default::default()
        };
        let errors = PolicySnapshot::compile(&config).unwrap_err();
        assert_eq!(errors.len(), 4);
        assert!(errors.iter().any(|e| matches!(e, PolicyError::DuplicateRule { .. })));
    }

    #[test]
    fn test_rejects_bad_multiplier() {
        let mut config = PolicyConfig::default();
        config.rate_limit.categories.insert("search".into(), 0.0);
        config.rate_limit.categories.insert("auth".into(), f64::NAN);
        let errors = PolicySnapshot::compile(&config).unwrap_err();
        assert_eq!(errors.len(), 2);
    }

    #[test]
    fn test_overrides_most_specific_first() {
        let config = PolicyConfig {
            overrides: vec![
                OriginOverride { target: "203.0.113.0/24".into(), ceiling: 100, label: String::new() },
                OriginOverride { target: "203.0.113.5".into(), ceiling: 5, label: String::new() },
            ],
            ..Default::default()
        };
        let snap = PolicySnapshot::compile(&config).unwrap();
        let hit = snap.override_for("203.0.113.5".parse().unwrap()).unwrap();
        assert_eq!(hit.ceiling, 5);
        let hit = snap.override_for("203.0.113.9".parse().unwrap()).unwrap();
        assert_eq!(hit.ceiling, 100);
        assert!(snap.override_for("198.51.100.1".parse().unwrap()).is_none());
    }

    #[test]
    fn test_mapped_range_matches_folded_address() {
        let config = PolicyConfig {
            ranges: vec![AddressRange { id: "m".into(), cidr: "::ffff:10.0.0.0/104".into(), label: String::new() }],
            ..Default::default()
        };
        let snap = PolicySnapshot::compile(&config).unwrap();
        assert_eq!(snap.ranges()[0].net, "10.0.0.0/8".parse::<IpNet>().unwrap());

        let c = snap.classifier().classify("[::ffff:10.1.2.3]:80", false, &[]);
        assert!(c.is_internal);
        assert!(snap.classifier().classify("10.9.9.9:80", false, &[]).is_internal);
        assert!(!snap.classifier().classify("11.0.0.1:80", false, &[]).is_internal);
    }

    #[test]
    fn test_mapped_override_matches_folded_address() {
        let config = PolicyConfig {
            overrides: vec![OriginOverride {
                target: "::ffff:203.0.113.0/120".into(),
                ceiling: 5,
                label: String::new(),
            }],
            ..Default::default()
        };
        let snap = PolicySnapshot::compile(&config).unwrap();
        let hit = snap.override_for("203.0.113.5".parse().unwrap()).unwrap();
        assert_eq!(hit.ceiling, 5);
        assert!(snap.override_for("::ffff:203.0.113.5".parse().unwrap()).is_some());
    }

    #[test]
    fn test_plain_ipv6_nets_are_left_alone() {
        let net: IpNet = "fd00::/8".parse().unwrap();
        assert_eq!(normalize_net(net), net);
        let short: IpNet = "2001:db8::/32".parse().unwrap();
        assert_eq!(normalize_net(short), short);
    }

    #[test]
    fn test_normalize_path() {
        assert_eq!(normalize_path("/a/b/"), "/a/b");
        assert_eq!(normalize_path("a"), "/a");
        assert_eq!(normalize_path("/"), "/");
        assert_eq!(normalize_path(""), "/");
        assert_eq!(normalize_path("///"), "/");
    }
}
