//! Health check endpoints for the Autopilot Control Plane API.

use std::collections::BTreeMap;

use axum::{extract::State, Json};
use serde::{Deserialize, Serialize};

use crate::state::AppState;

/// Health check response.
#[derive(Debug, Serialize, Deserialize)]
pub struct HealthCheckResponse {
    /// Health status ("ok" or "draining")
    pub status: String,
}

/// Detailed health check response for the API.
#[derive(Debug, Serialize, Deserialize)]
pub struct ApiHealthResponse {
    pub status: String,

    pub server_name: String,

    /// Server uptime in seconds
    pub uptime_seconds: u64,

    /// Server version
    pub version: String,

    /// Run counts keyed by status
    pub runs: BTreeMap<String, usize>,
}

fn status(state: &AppState) -> String {
    if state.directory.is_closed() {
        "draining".to_string()
    } else {
        "ok".to_string()
    }
}

/// Basic health check endpoint.
///
/// `GET /health`
pub async fn health_check(State(state): State<AppState>) -> Json<HealthCheckResponse> {
    Json(HealthCheckResponse {
        status: status(&state),
    })
}

/// Detailed API health check endpoint.
///
/// `GET /api/health`
///
/// Reports uptime, version and how many runs are in each status.
pub async fn api_health(State(state): State<AppState>) -> Json<ApiHealthResponse> {
    let runs = state
        .directory
        .status_counts()
        .await
        .into_iter()
        .map(|(status, count)| (status.to_string(), count))
        .collect();

    Json(ApiHealthResponse {
        status: status(&state),
        server_name: state.config.server_name.clone(),
        uptime_seconds: state.uptime_seconds(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        runs,
    })
}
