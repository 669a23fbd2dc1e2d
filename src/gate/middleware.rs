//! Axum middleware running the gate in front of protected handlers.
//!
//! # Responsibilities
//! - Collect peer address, forwarded header values, route template, method
//!   and caller identity from the request
//! - Run the gate once
//! - Forward to the handler with an [`Admission`](crate::gate::Admission) in the extensions, or
//!   answer with a structured rejection

use axum::{
    body::Body,
    extract::{ConnectInfo, MatchedPath, State},
    http::{HeaderName, HeaderValue, Request},
    middleware::Next,
    response::{IntoResponse, Response},
};
use std::net::SocketAddr;
use std::sync::Arc;

use crate::gate::{CallerIdentity, GateRequest, RequestGate};
use crate::observability::metrics;

/// State for [`gate_middleware`].
#[derive(Clone)]
pub struct GateLayerState {
    pub gate: Arc<RequestGate>,
    /// Header carrying the forwarded-address chain (normally `x-forwarded-for`).
    pub forwarded_header: HeaderName,
}

pub async fn gate_middleware(
    State(state): State<GateLayerState>,
    mut request: Request<Body>,
    next: Next,
) -> Response {
    let verdict = {
        // No connect info means no trustworthy peer; the empty string
        // classifies as external.
        let peer = request
            .extensions()
            .get::<ConnectInfo<SocketAddr>>()
            .map(|ci| ci.0.to_string())
            .unwrap_or_default();

        let route = request
            .extensions()
            .get::<MatchedPath>()
            .map(|m| m.as_str())
            .unwrap_or_else(|| request.uri().path());

        let forwarded: Vec<&str> = request
            .headers()
            .get_all(&state.forwarded_header)
            .iter()
            // Unreadable values stay in place so they cannot shift the left-most entry.
            .map(|v| v.to_str().unwrap_or_default())
            .collect();

        let anonymous = CallerIdentity::anonymous();
        let identity = request.extensions().get::<CallerIdentity>().unwrap_or(&anonymous);

        state.gate.evaluate(&GateRequest {
            route,
            method: request.method(),
            peer: &peer,
            forwarded: &forwarded,
            identity,
        })
    };

    match verdict {
        Ok(admission) => {
            metrics::record_request("forwarded");
            let (limit, remaining) = (admission.ceiling.limit, admission.remaining);
            request.extensions_mut().insert(admission);

            let mut response = next.run(request).await;
            let headers = response.headers_mut();
            headers.insert("x-ratelimit-limit", HeaderValue::from(limit));
            headers.insert("x-ratelimit-remaining", HeaderValue::from(remaining));
            response
        }
        Err(rejection) => {
            metrics::record_request("rejected");
            metrics::record_rejection(rejection.error.kind());
            rejection.error.into_response()
        }
    }
}

