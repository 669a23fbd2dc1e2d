//! HTTP server setup and configuration.
//!
//! # Responsibilities
//! - Wrap the protected application router with the gate middleware
//! - Wire up ambient middleware (tracing, timeout, request ID)
//! - Serve `/healthz` outside the gate
//! - Apply policy updates from the config watcher and signals
//! - Run the counter sweeper and the admin API
//! - Shut everything down on the shared broadcast

use axum::{
    extract::State,
    http::{header::HeaderName, StatusCode},
    middleware,
    response::IntoResponse,
    routing::get,
    Json, Router,
};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tower::ServiceBuilder;
use tower_http::{
    request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer},
    timeout::TimeoutLayer,
    trace::TraceLayer,
};

use crate::config::GateConfig;
use crate::gate::{gate_middleware, roles_from_header, GateLayerState, RequestGate};
use crate::lifecycle::shutdown::{wait_for, Shutdown};
use crate::policy::{PolicySource, PolicyStore};
use crate::security::clock::{Clock, SystemClock};
use crate::security::rate_limit::{run_sweeper, RateLimiter};

const X_FORWARDED_FOR: HeaderName = HeaderName::from_static("x-forwarded-for");

/// Shared state for the health and admin handlers.
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<PolicyStore>,
    pub limiter: Arc<RateLimiter>,
    /// Where `POST /admin/reload` pulls a fresh policy from.
    pub source: Arc<dyn PolicySource>,
    pub admin_key: Arc<str>,
    pub started_at: Instant,
}

/// The gate in front of an application router.
pub struct GateServer {
    config: GateConfig,
    state: AppState,
    gate: Arc<RequestGate>,
    app: Router,
}

impl GateServer {
    /// Build the server and load the initial policy from `config`.
    ///
    /// An invalid initial policy is logged and the store stays empty, so every
    /// gated request answers 503 until a valid reload arrives.
    pub fn new(config: GateConfig, source: Arc<dyn PolicySource>, app: Router) -> Self {
        Self::with_clock(config, source, app, Arc::new(SystemClock))
    }

    pub fn with_clock(config: GateConfig, source: Arc<dyn PolicySource>, app: Router, clock: Arc<dyn Clock>) -> Self {
        let store = Arc::new(PolicyStore::empty());
        if let Err(e) = store.reload_from(&config.policy) {
            tracing::error!(error = %e, "Initial policy is invalid; gated routes will answer 503");
        }

        let limiter = Arc::new(RateLimiter::with_clock(
            Duration::from_secs(config.gate.window_secs),
            clock,
        ));
        let gate = Arc::new(RequestGate::new(
            store.clone(),
            limiter.clone(),
            config.gate.trust_proxy_headers,
        ));

        let state = AppState {
            store,
            limiter,
            source,
            admin_key: Arc::from(config.admin.api_key.as_str()),
            started_at: Instant::now(),
        };

        Self {
            config,
            state,
            gate,
            app,
        }
    }

    pub fn state(&self) -> &AppState {
        &self.state
    }

    pub fn gate(&self) -> &Arc<RequestGate> {
        &self.gate
    }

    /// The public router: `/healthz` plus the gated application.
    #[allow(deprecated)]
    pub fn router(&self) -> Router {
        let forwarded_header = HeaderName::from_bytes(self.config.gate.forwarded_header.as_bytes())
            .unwrap_or(X_FORWARDED_FOR);
        let layer_state = GateLayerState {
            gate: self.gate.clone(),
            forwarded_header,
        };

        let mut gated = self
            .app
            .clone()
            .layer(middleware::from_fn_with_state(layer_state, gate_middleware));

        // Outermost so the identity is in place before the gate runs.
        if let Some(header) = self
            .config
            .gate
            .roles_header
            .as_deref()
            .and_then(|h| HeaderName::from_bytes(h.as_bytes()).ok())
        {
            gated = gated.layer(middleware::from_fn_with_state(header, roles_from_header));
        }

        let health = Router::new()
            .route("/healthz", get(healthz))
            .with_state(self.state.clone());

        health.merge(gated).layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(SetRequestIdLayer::x_request_id(MakeRequestUuid))
                .layer(PropagateRequestIdLayer::x_request_id())
                .layer(TimeoutLayer::new(Duration::from_secs(self.config.timeouts.request_secs))),
        )
    }

    pub fn admin_router(&self) -> Router {
        crate::admin::setup_admin_router(self.state.clone())
    }

    /// Serve until `shutdown` fires.
    ///
    /// `config_updates` carries freshly loaded configs from the watcher and
    /// the SIGHUP handler; only their `[policy]` tables are applied.
    pub async fn run(
        self,
        listener: TcpListener,
        admin_listener: Option<TcpListener>,
        mut config_updates: mpsc::UnboundedReceiver<GateConfig>,
        shutdown: &Shutdown,
    ) -> Result<(), std::io::Error> {
        let addr = listener.local_addr()?;
        tracing::info!(address = %addr, "HTTP server starting");

        tokio::spawn(run_sweeper(
            self.state.limiter.clone(),
            Duration::from_secs(self.config.gate.sweep_interval_secs),
            shutdown.subscribe(),
        ));

        let store = self.state.store.clone();
        let mut stop_reloads = shutdown.subscribe();
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    update = config_updates.recv() => match update {
                        // Failures are logged by the store; the old snapshot stays.
                        Some(config) => { let _ = store.reload_from(&config.policy); }
                        None => break,
                    },
                    _ = stop_reloads.recv() => break,
                }
            }
        });

        if let Some(admin_listener) = admin_listener {
            let admin_addr = admin_listener.local_addr()?;
            let admin_app = self.admin_router();
            let admin_stop = shutdown.subscribe();
            tracing::info!(address = %admin_addr, "Admin API starting");
            tokio::spawn(async move {
                if let Err(e) = axum::serve(admin_listener, admin_app)
                    .with_graceful_shutdown(wait_for(admin_stop))
                    .await
                {
                    tracing::error!(error = %e, "Admin API failed");
                }
            });
        }

        let app = self.router().into_make_service_with_connect_info::<SocketAddr>();
        axum::serve(listener, app)
            .with_graceful_shutdown(wait_for(shutdown.subscribe()))
            .await?;

        tracing::info!("HTTP server stopped");
        Ok(())
    }

    pub fn config(&self) -> &GateConfig {
        &self.config
    }
}

/// Liveness plus whether a policy is loaded. Never gated.
async fn healthz(State(state): State<AppState>) -> impl IntoResponse {
    let version = state.store.version();
    let status = if version.is_some() {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };
    (
        status,
        Json(serde_json::json!({
            "status": if version.is_some() { "ok" } else { "no_policy" },
            "policy_version": version,
        })),
    )
}
