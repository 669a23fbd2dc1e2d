//! Shared fixtures for the integration tests.
#![allow(dead_code)]

use axum::{
    body::Body,
    extract::ConnectInfo,
    http::{Request, Response},
    routing::{delete, get},
    Router,
};
use serde_json::Value;
use std::net::SocketAddr;
use std::sync::Arc;
use tower::ServiceExt;

use netgate::config::GateConfig;
use netgate::policy::{AccessRule, AddressRange, MemorySource, PolicyConfig};
use netgate::security::ManualClock;
use netgate::GateServer;

pub const ADMIN_KEY: &str = "test-admin-key";

pub fn rule(path: &str, method: &str, internal: bool, external: bool) -> AccessRule {
    AccessRule {
        path: path.into(),
        method: method.into(),
        allow_internal: internal,
        allow_external: external,
        category: None,
        required_roles: vec![],
    }
}

/// Corporate range 10.0.0.0/8 and a handful of endpoints.
///
/// - `/admin/settings` GET: internal only, category `admin` (x10)
/// - `/admin/users/{id}` DELETE: internal only, role `admin`
/// - `/search` GET: everyone, category `search` (x0.5)
/// - `/public` GET: everyone, default ceiling 4
pub fn policy() -> PolicyConfig {
    let mut config = PolicyConfig {
        ranges: vec![AddressRange {
            id: "corp".into(),
            cidr: "10.0.0.0/8".into(),
            label: "corporate".into(),
        }],
        rules: vec![
            AccessRule {
                category: Some("admin".into()),
                ..rule("/admin/settings", "GET", true, false)
            },
            AccessRule {
                required_roles: vec!["admin".into()],
                ..rule("/admin/users/{id}", "DELETE", true, false)
            },
            AccessRule {
                category: Some("search".into()),
                ..rule("/search", "GET", true, true)
            },
            rule("/public", "GET", true, true),
        ],
        ..Default::default()
    };
    config.rate_limit.default_ceiling = 4;
    config.rate_limit.categories.insert("admin".into(), 10.0);
    config.rate_limit.categories.insert("search".into(), 0.5);
    config
}

pub fn config(policy: PolicyConfig) -> GateConfig {
    let mut config = GateConfig::default();
    config.admin.api_key = ADMIN_KEY.into();
    config.gate.roles_header = Some("x-roles".into());
    config.observability.metrics_enabled = false;
    config.policy = policy;
    config
}

/// Application the gate protects. Every handler just answers "ok".
pub fn app() -> Router {
    Router::new()
        .route("/admin/settings", get(|| async { "ok" }))
        .route("/admin/users/{id}", delete(|| async { "ok" }))
        .route("/search", get(|| async { "ok" }))
        .route("/public", get(|| async { "ok" }))
        .route("/unlisted", get(|| async { "ok" }))
}

pub struct Harness {
    pub server: GateServer,
    pub router: Router,
    pub source: Arc<MemorySource>,
    pub clock: Arc<ManualClock>,
}

pub fn harness(config: GateConfig) -> Harness {
    let source = Arc::new(MemorySource::new(config.policy.clone()));
    let clock = Arc::new(ManualClock::new());
    let server = GateServer::with_clock(config, source.clone(), app(), clock.clone());
    let router = server.router();
    Harness {
        server,
        router,
        source,
        clock,
    }
}

/// Send one request through `router` as if it arrived from `peer`.
pub async fn send(
    router: &Router,
    method: &str,
    path: &str,
    peer: &str,
    headers: &[(&str, &str)],
) -> Response<Body> {
    let mut builder = Request::builder().method(method).uri(path);
    for (name, value) in headers {
        builder = builder.header(*name, *value);
    }
    let mut request = builder.body(Body::empty()).unwrap();
    let addr: SocketAddr = format!("{peer}:40000").parse().unwrap();
    request.extensions_mut().insert(ConnectInfo(addr));
    router.clone().oneshot(request).await.unwrap()
}

pub async fn body_json(response: Response<Body>) -> Value {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

pub fn header<'a>(response: &'a Response<Body>, name: &str) -> Option<&'a str> {
    response.headers().get(name).and_then(|v| v.to_str().ok())
}
