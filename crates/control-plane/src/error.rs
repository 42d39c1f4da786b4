//! Error types for the Autopilot Control Plane server.
//!
//! This module provides custom error types that implement `IntoResponse`
//! for seamless integration with Axum handlers.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

/// Application-level errors for the control plane.
///
/// None of these mutate run state: they are raised before any mutation or
/// instead of one.
#[derive(Error, Debug)]
pub enum AppError {
    /// Malformed boundary input
    #[error("Validation error: {0}")]
    Validation(String),

    /// Run id not known to the directory
    #[error("Run not found: {0}")]
    UnknownRun(String),

    /// Gate is not currently waiting for a decision
    #[error("Gate '{gate}' is not awaiting a decision in run {run_id}")]
    UnknownGate { run_id: String, gate: String },

    /// A decision for the gate was already recorded
    #[error("Decision already recorded for gate '{gate}' in run {run_id}")]
    DuplicateDecision { run_id: String, gate: String },

    /// Engine invariant violation
    #[error("Engine fault: {0}")]
    EngineFault(String),

    /// Internal server error
    #[error("Internal error: {0}")]
    Internal(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl AppError {
    /// HTTP status the error maps to.
    pub fn status_code(&self) -> StatusCode {
        match self {
            AppError::Validation(_) => StatusCode::BAD_REQUEST,
            AppError::UnknownRun(_) | AppError::UnknownGate { .. } => StatusCode::NOT_FOUND,
            AppError::DuplicateDecision { .. } => StatusCode::CONFLICT,
            AppError::EngineFault(_)
            | AppError::Internal(_)
            | AppError::Config(_)
            | AppError::Serialization(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        match &self {
            AppError::EngineFault(msg) => {
                tracing::error!(error = %msg, "Engine fault");
            }
            AppError::Internal(msg) => {
                tracing::error!(error = %msg, "Internal error");
            }
            AppError::Config(msg) => {
                tracing::error!(error = %msg, "Configuration error");
            }
            AppError::Serialization(e) => {
                tracing::error!(error = %e, "Serialization error");
            }
            _ => {}
        }

        let body = Json(json!({
            "error": self.to_string(),
            "status": status.as_u16()
        }));

        (status, body).into_response()
    }
}

/// Result type alias using AppError.
pub type AppResult<T> = Result<T, AppError>;

impl From<anyhow::Error> for AppError {
    fn from(err: anyhow::Error) -> Self {
        AppError::Internal(err.to_string())
    }
}

impl From<envy::Error> for AppError {
    fn from(err: envy::Error) -> Self {
        AppError::Config(err.to_string())
    }
}
