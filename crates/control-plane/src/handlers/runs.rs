//! Run API handlers.
//!
//! Create, list and inspect runs, and record gate decisions.

use axum::{
    extract::{rejection::JsonRejection, Path, State},
    Json,
};
use serde::{Deserialize, Serialize};

use crate::engine::{GateDecision, RunSnapshot, RunSummary};
use crate::error::{AppError, AppResult};
use crate::result_ext::ResultExt;
use crate::state::AppState;

/// Response for run creation.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateRunResponse {
    pub run_id: String,
}

/// Gate decision request. Fields are optional so that missing ones
/// surface as validation errors instead of body rejections.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ApprovalRequest {
    pub gate: Option<String>,
    pub decision: Option<String>,
    pub note: Option<String>,
}

/// Response for a recorded decision.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApprovalResponse {
    pub status: String,
}

fn body<T>(payload: Result<Json<T>, JsonRejection>) -> AppResult<T> {
    payload
        .map(|Json(value)| value)
        .map_err(|rejection| AppError::Validation(rejection.body_text()))
}

/// Create a run.
///
/// POST /runs
pub async fn create(
    State(state): State<AppState>,
    payload: Result<Json<serde_json::Value>, JsonRejection>,
) -> AppResult<Json<CreateRunResponse>> {
    let input = body(payload)?;
    let run_id = state.directory.create(input).await.log_warn("creating run")?;
    Ok(Json(CreateRunResponse { run_id }))
}

/// List runs.
///
/// GET /runs
pub async fn list(State(state): State<AppState>) -> Json<Vec<RunSummary>> {
    Json(state.directory.list().await)
}

/// Get a run snapshot.
///
/// GET /runs/{run_id}
pub async fn get(
    State(state): State<AppState>,
    Path(run_id): Path<String>,
) -> AppResult<Json<RunSnapshot>> {
    Ok(Json(state.directory.get(&run_id).await?))
}

/// Record a gate decision.
///
/// POST /runs/{run_id}/approve
pub async fn approve(
    State(state): State<AppState>,
    Path(run_id): Path<String>,
    payload: Result<Json<ApprovalRequest>, JsonRejection>,
) -> AppResult<Json<ApprovalResponse>> {
    let request = body(payload)?;

    let (gate, decision) = match (request.gate.as_deref(), request.decision.as_deref()) {
        (Some(gate), Some(decision)) if !gate.is_empty() => (gate, decision),
        _ => {
            return Err(AppError::Validation(
                "gate and decision are required".to_string(),
            ))
        }
    };
    let decision: GateDecision = decision.parse()?;
    let note = request.note.filter(|n| !n.trim().is_empty());

    state
        .directory
        .decide(&run_id, gate, decision, note)
        .await
        .log_warn("recording approval")?;

    Ok(Json(ApprovalResponse {
        status: "success".to_string(),
    }))
}
