//! Role and network access decision.
//!
//! The role check runs first and short-circuits: a caller without a required
//! role is told `RoleDenied` even when the network check would also fail.

use std::collections::BTreeSet;

use crate::error::GateError;
use crate::policy::types::AccessRule;

/// Verdict for one request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    Allow,
    DenyRole,
    DenyNetwork,
}

impl Decision {
    pub fn is_allow(self) -> bool {
        self == Decision::Allow
    }

    pub fn into_result(self) -> Result<(), GateError> {
        match self {
            Decision::Allow => Ok(()),
            Decision::DenyRole => Err(GateError::RoleDenied),
            Decision::DenyNetwork => Err(GateError::NetworkDenied),
        }
    }
}

/// Combine caller roles, the resolved rule and the origin classification.
pub fn decide(
    caller_roles: &BTreeSet<String>,
    required_roles: &[String],
    rule: &AccessRule,
    is_internal: bool,
) -> Decision {
    if !required_roles.is_empty() && !required_roles.iter().any(|r| caller_roles.contains(r)) {
        return Decision::DenyRole;
    }

    let network_ok = if is_internal {
        rule.allow_internal
    } else {
        rule.allow_external
    };
    if !network_ok {
        return Decision::DenyNetwork;
    }

    Decision::Allow
}
