//! Request gate: classification, access decision and rate limiting composed
//! into one pass per request.
//!
//! # State Machine
//! ```text
//! Received ──(no snapshot)──────────────────────────────▶ Rejected
//!    │
//!    ▼
//! Classified ─▶ Decided ──(DenyRole | DenyNetwork)──────▶ Rejected
//!                  │
//!                  ▼ Allow
//!              RateChecked ──(Limited)──────────────────▶ Rejected
//!                  │
//!                  ▼ Allowed
//!              Forwarded
//! ```
//!
//! A request only moves forward. One snapshot is taken in `Received` and used
//! for every later step, so a reload never changes the policy mid-request.

pub mod identity;
pub mod middleware;

use axum::http::Method;
use std::sync::Arc;
use std::time::Duration;

use crate::error::GateError;
use crate::net::classifier::{AddressSource, OriginKey};
use crate::policy::snapshot::PolicySnapshot;
use crate::policy::store::PolicyStore;
use crate::security::access::decide;
use crate::security::rate_limit::{resolve_ceiling, Ceiling, RateDecision, RateLimiter};

pub use identity::{roles_from_header, CallerIdentity};
pub use middleware::{gate_middleware, GateLayerState};

/// Per-request gate states.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GateState {
    Received,
    Classified,
    Decided,
    RateChecked,
    Forwarded,
    Rejected,
}

impl GateState {
    /// Legal forward transitions.
    pub fn can_advance_to(self, next: GateState) -> bool {
        use GateState::*;
        matches!(
            (self, next),
            (Received, Classified)
                | (Received, Rejected)
                | (Classified, Decided)
                | (Decided, RateChecked)
                | (Decided, Rejected)
                | (RateChecked, Forwarded)
                | (RateChecked, Rejected)
        )
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, GateState::Forwarded | GateState::Rejected)
    }
}

#[derive(Debug)]
struct Progress {
    state: GateState,
}

impl Progress {
    fn new() -> Self {
        Self {
            state: GateState::Received,
        }
    }

    fn advance(&mut self, next: GateState) {
        debug_assert!(
            self.state.can_advance_to(next),
            "illegal gate transition {:?} -> {:?}",
            self.state,
            next
        );
        self.state = next;
    }
}

/// What the transport and auth layers know about a request.
#[derive(Debug, Clone, Copy)]
pub struct GateRequest<'a> {
    /// Resolved route template, not the raw URL.
    pub route: &'a str,
    pub method: &'a Method,
    /// Transport peer address as text.
    pub peer: &'a str,
    /// Raw forwarded-address header values, in order.
    pub forwarded: &'a [&'a str],
    pub identity: &'a CallerIdentity,
}

/// A request that reached `Forwarded`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Admission {
    pub origin: OriginKey,
    pub is_internal: bool,
    pub address_source: AddressSource,
    pub category: String,
    pub ceiling: Ceiling,
    pub remaining: u32,
    pub reset_in: Duration,
    /// False when the internal-only fallback rule applied.
    pub explicit_rule: bool,
    pub policy_version: u64,
}

/// A request that ended in `Rejected`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Rejection {
    pub error: GateError,
    /// Last state reached before rejection.
    pub reached: GateState,
    pub origin: Option<OriginKey>,
}

/// The composed gate. Cheap to share behind an `Arc`.
pub struct RequestGate {
    store: Arc<PolicyStore>,
    limiter: Arc<RateLimiter>,
    trust_proxy_headers: bool,
}

impl RequestGate {
    pub fn new(store: Arc<PolicyStore>, limiter: Arc<RateLimiter>, trust_proxy_headers: bool) -> Self {
        Self {
            store,
            limiter,
            trust_proxy_headers,
        }
    }

    pub fn store(&self) -> &Arc<PolicyStore> {
        &self.store
    }

    pub fn limiter(&self) -> &Arc<RateLimiter> {
        &self.limiter
    }

    /// Run one request through the gate against the current snapshot.
    pub fn evaluate(&self, req: &GateRequest<'_>) -> Result<Admission, Rejection> {
        let snapshot = match self.store.get() {
            Ok(snapshot) => snapshot,
            Err(error) => {
                tracing::error!(
                    route = %req.route,
                    method = %req.method,
                    "No policy snapshot loaded; rejecting request"
                );
                return Err(Rejection {
                    error,
                    reached: GateState::Received,
                    origin: None,
                });
            }
        };
        self.evaluate_with(&snapshot, req)
    }

    /// Run one request through the gate against an explicit snapshot.
    pub fn evaluate_with(&self, snapshot: &PolicySnapshot, req: &GateRequest<'_>) -> Result<Admission, Rejection> {
        let mut progress = Progress::new();

        let classification = snapshot
            .classifier()
            .classify(req.peer, self.trust_proxy_headers, req.forwarded);
        progress.advance(GateState::Classified);
        let origin = classification.origin;

        let matched = snapshot.lookup(req.route, req.method);
        let rule = matched.rule;
        let decision = decide(
            &req.identity.roles,
            &rule.required_roles,
            rule,
            classification.is_internal,
        );
        progress.advance(GateState::Decided);

        if let Err(error) = decision.into_result() {
            progress.advance(GateState::Rejected);
            tracing::debug!(
                origin = %origin,
                internal = classification.is_internal,
                route = %req.route,
                method = %req.method,
                explicit_rule = matched.explicit,
                kind = error.kind(),
                "Request denied"
            );
            return Err(Rejection {
                error,
                reached: GateState::Decided,
                origin: Some(origin),
            });
        }

        let category = rule.category();
        let ceiling = resolve_ceiling(snapshot, &origin, category);
        let outcome = self.limiter.consume(&origin, category, ceiling.limit);
        progress.advance(GateState::RateChecked);

        match outcome {
            RateDecision::Limited { ceiling, retry_after } => {
                progress.advance(GateState::Rejected);
                tracing::debug!(
                    origin = %origin,
                    category,
                    ceiling,
                    retry_after_ms = retry_after.as_millis() as u64,
                    "Request rate limited"
                );
                Err(Rejection {
                    error: GateError::RateLimited { retry_after, ceiling },
                    reached: GateState::RateChecked,
                    origin: Some(origin),
                })
            }
            RateDecision::Allowed { remaining, reset_in, .. } => {
                progress.advance(GateState::Forwarded);
                Ok(Admission {
                    origin,
                    is_internal: classification.is_internal,
                    address_source: classification.source,
                    category: category.to_owned(),
                    ceiling,
                    remaining,
                    reset_in,
                    explicit_rule: matched.explicit,
                    policy_version: snapshot.version(),
                })
            }
        }
    }
}
