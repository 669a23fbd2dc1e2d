use axum::{extract::State, http::StatusCode, Json};
use serde::{Deserialize, Serialize};

use crate::http::server::AppState;
use crate::policy::ReloadError;

#[derive(Debug, Serialize, Deserialize)]
pub struct SystemStatus {
    pub version: String,
    pub uptime_secs: u64,
    pub policy_loaded: bool,
    pub policy_version: Option<u64>,
    pub ranges: usize,
    pub rules: usize,
    pub overrides: usize,
    pub active_counters: usize,
    pub window_secs: u64,
    pub policy_source: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ReloadOutcome {
    pub reloaded: bool,
    pub policy_version: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

pub async fn get_status(State(state): State<AppState>) -> Json<SystemStatus> {
    let snapshot = state.store.get().ok();
    Json(SystemStatus {
        version: env!("CARGO_PKG_VERSION").to_string(),
        uptime_secs: state.started_at.elapsed().as_secs(),
        policy_loaded: snapshot.is_some(),
        policy_version: snapshot.as_ref().map(|s| s.version()),
        ranges: snapshot.as_ref().map_or(0, |s| s.ranges().len()),
        rules: snapshot.as_ref().map_or(0, |s| s.rule_count()),
        overrides: snapshot.as_ref().map_or(0, |s| s.overrides().len()),
        active_counters: state.limiter.active_counters(),
        window_secs: state.limiter.window().as_secs(),
        policy_source: state.source.describe(),
    })
}

/// Pull the policy from the configured source and swap it in.
pub async fn post_reload(State(state): State<AppState>) -> (StatusCode, Json<ReloadOutcome>) {
    let store = state.store.clone();
    let source = state.source.clone();
    // File sources do blocking I/O.
    let result = tokio::task::spawn_blocking(move || store.refresh(source.as_ref())).await;

    match result {
        Ok(Ok(version)) => (
            StatusCode::OK,
            Json(ReloadOutcome {
                reloaded: true,
                policy_version: Some(version),
                error: None,
            }),
        ),
        Ok(Err(e)) => {
            let status = match e {
                ReloadError::Invalid(_) => StatusCode::UNPROCESSABLE_ENTITY,
                ReloadError::Source(_) => StatusCode::BAD_GATEWAY,
            };
            (
                status,
                Json(ReloadOutcome {
                    reloaded: false,
                    policy_version: state.store.version(),
                    error: Some(e.to_string()),
                }),
            )
        }
        Err(join) => {
            tracing::error!(error = %join, "Reload task failed");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(ReloadOutcome {
                    reloaded: false,
                    policy_version: state.store.version(),
                    error: Some("reload task failed".to_string()),
                }),
            )
        }
    }
}
