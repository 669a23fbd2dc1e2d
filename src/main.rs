//! netgate server.
//!
//! ```text
//!     Client Request
//!     ──────────────▶ net/classifier ──▶ security/access ──▶ security/rate_limit ──▶ application
//!                       (internal?)        (roles, network)     (origin counter)
//!                             ▲                  ▲                    ▲
//!                             └──────── policy snapshot (ArcSwap) ────┘
//!                                               ▲
//!                           config watcher / SIGHUP / POST /admin/reload
//! ```
//!
//! The wrapped application here is a small echo service that reports what
//! the gate decided. Embedders build a [`GateServer`] around their own router.

use axum::{
    extract::Extension,
    http::{Method, Uri},
    Json, Router,
};
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::net::TcpListener;

use netgate::config::{load_settings, watcher::ConfigWatcher};
use netgate::gate::Admission;
use netgate::lifecycle::{spawn_signal_listener, SignalEvent, Shutdown};
use netgate::observability::{logging, metrics};
use netgate::policy::FileSource;
use netgate::GateServer;

#[derive(Parser)]
#[command(name = "netgate")]
#[command(about = "Network-based access control and rate limiting gate", long_about = None)]
struct Args {
    /// Path to the TOML configuration file.
    #[arg(short, long, default_value = "netgate.toml")]
    config: PathBuf,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();
    // Policy errors are left to the store so an invalid table fails closed.
    let config = load_settings(&args.config)?;

    logging::init_logging(&config.observability.log_level, config.observability.log_format);
    tracing::info!("netgate v{} starting", env!("CARGO_PKG_VERSION"));

    tracing::info!(
        bind_address = %config.listener.bind_address,
        trust_proxy_headers = config.gate.trust_proxy_headers,
        window_secs = config.gate.window_secs,
        ranges = config.policy.ranges.len(),
        rules = config.policy.rules.len(),
        "Configuration loaded"
    );

    if config.observability.metrics_enabled {
        match config.observability.metrics_address.parse() {
            Ok(addr) => {
                if let Err(e) = metrics::init_metrics(addr) {
                    tracing::error!(error = %e, "Failed to start metrics exporter");
                }
            }
            Err(_) => tracing::error!(
                metrics_address = %config.observability.metrics_address,
                "Failed to parse metrics address"
            ),
        }
    }

    let listener = TcpListener::bind(&config.listener.bind_address).await?;
    let admin_listener = if config.admin.enabled {
        Some(TcpListener::bind(&config.admin.bind_address).await?)
    } else {
        None
    };

    let (watcher, updates) = ConfigWatcher::new(&args.config);
    let reload_tx = watcher.sender();
    // Dropping the handle stops notifications.
    let _watch_handle = match watcher.run() {
        Ok(handle) => Some(handle),
        Err(e) => {
            tracing::warn!(error = %e, "Config watcher unavailable; reload with SIGHUP or the admin API");
            None
        }
    };

    let shutdown = Shutdown::new();
    let mut signals = spawn_signal_listener();
    {
        let shutdown = shutdown.clone();
        let path = args.config.clone();
        tokio::spawn(async move {
            while let Some(event) = signals.recv().await {
                match event {
                    SignalEvent::Reload => match load_settings(&path) {
                        Ok(config) => {
                            let _ = reload_tx.send(config);
                        }
                        Err(e) => {
                            metrics::record_policy_reload("invalid", 0);
                            tracing::error!(error = %e, "SIGHUP reload failed. Keeping current policy.");
                        }
                    },
                    SignalEvent::Terminate => {
                        tracing::info!("Shutdown signal received");
                        shutdown.trigger();
                        break;
                    }
                }
            }
        });
    }

    let source = Arc::new(FileSource::new(args.config.clone()));
    let server = GateServer::new(config, source, echo_app());
    server.run(listener, admin_listener, updates, &shutdown).await?;

    tracing::info!("Shutdown complete");
    Ok(())
}

fn echo_app() -> Router {
    Router::new().fallback(echo)
}

async fn echo(
    Extension(admission): Extension<Admission>,
    method: Method,
    uri: Uri,
) -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "method": method.as_str(),
        "path": uri.path(),
        "origin": admission.origin.to_string(),
        "internal": admission.is_internal,
        "category": admission.category,
        "ceiling": admission.ceiling.limit,
        "remaining": admission.remaining,
        "policy_version": admission.policy_version,
    }))
}
