//! Caller identity handed over by the upstream authentication layer.
//!
//! The gate never authenticates anyone. It reads a [`CallerIdentity`] from
//! the request extensions; a request without one is anonymous (no roles).

use axum::{
    body::Body,
    extract::State,
    http::{HeaderName, Request},
    middleware::Next,
    response::Response,
};
use std::collections::BTreeSet;

/// Verified identity and role set of the caller.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CallerIdentity {
    pub subject: Option<String>,
    pub roles: BTreeSet<String>,
}

impl CallerIdentity {
    pub fn anonymous() -> Self {
        Self::default()
    }

    pub fn with_roles<I, S>(subject: impl Into<String>, roles: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            subject: Some(subject.into()),
            roles: roles.into_iter().map(Into::into).collect(),
        }
    }

    /// Parse a comma-separated role list. Blank entries are dropped.
    pub fn from_role_list(list: &str) -> Self {
        Self {
            subject: None,
            roles: list
                .split(',')
                .map(str::trim)
                .filter(|r| !r.is_empty())
                .map(str::to_owned)
                .collect(),
        }
    }
}

/// Fill in the caller's roles from a header written by a trusted
/// authenticating proxy in front of this service. An identity already placed
/// in the extensions by in-process auth wins.
pub async fn roles_from_header(
    State(header): State<HeaderName>,
    mut req: Request<Body>,
    next: Next,
) -> Response {
    if req.extensions().get::<CallerIdentity>().is_none() {
        let identity = req
            .headers()
            .get(&header)
            .and_then(|v| v.to_str().ok())
            .map(CallerIdentity::from_role_list)
            .unwrap_or_default();
        req.extensions_mut().insert(identity);
    }
    next.run(req).await
}
