//! Rejection responses.
//!
//! # Responsibilities
//! - Map each gate outcome to a status code and JSON body
//! - Attach `Retry-After` to rate-limited responses
//!
//! # Design Decisions
//! - Role and network denials share status and body so callers cannot
//!   probe which check failed
//! - `MalformedAddress` never reaches here on its own; it degrades to external

use axum::{
    http::{HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;

use crate::error::{retry_after_secs, GateError};

/// JSON body of every rejection.
#[derive(Debug, Serialize)]
pub struct RejectionBody {
    pub error: &'static str,
    pub message: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub retry_after: Option<u64>,
}

impl GateError {
    pub fn status(&self) -> StatusCode {
        match self {
            GateError::RoleDenied | GateError::NetworkDenied | GateError::MalformedAddress(_) => {
                StatusCode::FORBIDDEN
            }
            GateError::RateLimited { .. } => StatusCode::TOO_MANY_REQUESTS,
            GateError::ConfigUnavailable => StatusCode::SERVICE_UNAVAILABLE,
        }
    }

    fn public_message(&self) -> &'static str {
        match self {
            GateError::RoleDenied | GateError::NetworkDenied | GateError::MalformedAddress(_) => {
                "Access to this endpoint is not permitted"
            }
            GateError::RateLimited { .. } => "Rate limit exceeded",
            GateError::ConfigUnavailable => "Access policy not loaded",
        }
    }
}

impl IntoResponse for GateError {
    fn into_response(self) -> Response {
        let retry_after = self.retry_after().map(retry_after_secs);
        let body = RejectionBody {
            error: self.public_kind(),
            message: self.public_message(),
            retry_after,
        };

        let mut response = (self.status(), Json(body)).into_response();

        if let GateError::RateLimited { ceiling, .. } = self {
            let headers = response.headers_mut();
            headers.insert("x-ratelimit-limit", HeaderValue::from(ceiling));
            headers.insert("x-ratelimit-remaining", HeaderValue::from(0u32));
            if let Some(secs) = retry_after {
                headers.insert("retry-after", HeaderValue::from(secs));
            }
        }

        response
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    async fn body_json(response: Response) -> serde_json::Value {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn test_denials_are_indistinguishable() {
        let role = GateError::RoleDenied.into_response();
        let network = GateError::NetworkDenied.into_response();
        assert_eq!(role.status(), StatusCode::FORBIDDEN);
        assert_eq!(network.status(), StatusCode::FORBIDDEN);
        assert_eq!(body_json(role).await, body_json(network).await);
    }

    #[tokio::test]
    async fn test_rate_limited_carries_retry_after() {
        let response = GateError::RateLimited {
            retry_after: Duration::from_millis(12_300),
            ceiling: 60,
        }
        .into_response();
        assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(response.headers()["retry-after"], "13");
        assert_eq!(response.headers()["x-ratelimit-limit"], "60");

        let body = body_json(response).await;
        assert_eq!(body["error"], "rate_limited");
        assert_eq!(body["retry_after"], 13);
    }

    #[tokio::test]
    async fn test_config_unavailable_is_503() {
        let response = GateError::ConfigUnavailable.into_response();
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
        let body = body_json(response).await;
        assert_eq!(body["error"], "config_unavailable");
        assert!(body.get("retry_after").is_none());
    }
}
