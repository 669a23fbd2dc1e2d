//! Gate outcome taxonomy.
//!
//! Every variant is a terminal, reported outcome of the gate. None of them
//! escape as a panic or an unhandled error; the HTTP layer renders them via
//! [`crate::http::response`].

use std::time::Duration;
use thiserror::Error;

/// Reasons a request can be stopped (or flagged) by the gate.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GateError {
    /// The origin address could not be parsed. The request continues as external.
    #[error("malformed origin address: {0:?}")]
    MalformedAddress(String),

    /// The caller holds none of the roles the endpoint requires.
    #[error("caller lacks a required role")]
    RoleDenied,

    /// The endpoint does not accept requests from the caller's network.
    #[error("origin network not permitted for this endpoint")]
    NetworkDenied,

    /// The origin exceeded its ceiling for the current window.
    #[error("rate limit exceeded, retry after {retry_after:?}")]
    RateLimited { retry_after: Duration, ceiling: u32 },

    /// No policy snapshot has been loaded yet.
    #[error("policy configuration not loaded")]
    ConfigUnavailable,
}

impl GateError {
    /// Stable machine-readable identifier used in logs and metrics.
    pub fn kind(&self) -> &'static str {
        match self {
            GateError::MalformedAddress(_) => "malformed_address",
            GateError::RoleDenied => "role_denied",
            GateError::NetworkDenied => "network_denied",
            GateError::RateLimited { .. } => "rate_limited",
            GateError::ConfigUnavailable => "config_unavailable",
        }
    }

    /// Kind exposed to clients. Role and network denials collapse into one
    /// value so a prober cannot tell which check failed.
    pub fn public_kind(&self) -> &'static str {
        match self {
            GateError::RoleDenied | GateError::NetworkDenied => "forbidden",
            other => other.kind(),
        }
    }

    /// Whether operators should be alerted. Everything else is routine traffic shaping.
    pub fn is_alerting(&self) -> bool {
        matches!(self, GateError::ConfigUnavailable)
    }

    /// Retry hint for rate-limited rejections.
    pub fn retry_after(&self) -> Option<Duration> {
        match self {
            GateError::RateLimited { retry_after, .. } => Some(*retry_after),
            _ => None,
        }
    }
}

/// Whole seconds for a `Retry-After` hint: rounded up, never zero.
pub fn retry_after_secs(d: Duration) -> u64 {
    let secs = d.as_secs() + u64::from(d.subsec_nanos() > 0);
    secs.max(1)
}
