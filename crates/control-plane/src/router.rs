//! Route table for the control plane.

use axum::{
    routing::{get, post},
    Router,
};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::handlers;
use crate::state::AppState;

/// Build the application router with all routes.
pub fn build_router(state: AppState) -> Router {
    // Browser observers connect from other origins.
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let health_routes = Router::new()
        .route("/health", get(handlers::health_check))
        .route("/api/health", get(handlers::api_health));

    let run_routes = Router::new()
        .route("/runs", post(handlers::runs::create).get(handlers::runs::list))
        .route("/runs/{run_id}", get(handlers::runs::get))
        .route("/runs/{run_id}/events", get(handlers::events::stream))
        .route("/runs/{run_id}/approve", post(handlers::runs::approve));

    Router::new()
        .merge(health_routes)
        .merge(run_routes)
        .with_state(state)
        .layer(TraceLayer::new_for_http())
        .layer(cors)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use autopilot_tools::actions::steps;
    use autopilot_tools::github::GitHubConfig;
    use autopilot_tools::{create_default_registry, REQUIRED_INPUTS};
    use axum::body::{to_bytes, Body};
    use axum::http::{Request, StatusCode};
    use futures::StreamExt;
    use tower::ServiceExt;

    use crate::config::AppConfig;
    use crate::engine::StepRegistry;
    use crate::services::{default_collaborators, DirectoryOptions, RunDirectory};

    fn app_state() -> AppState {
        let config = AppConfig::default();
        let collaborators = default_collaborators(&config, &GitHubConfig::default()).unwrap();
        let directory = RunDirectory::new(
            StepRegistry::bug_to_pr(),
            create_default_registry(&collaborators),
            DirectoryOptions::from_config(&config, REQUIRED_INPUTS),
        );
        AppState::new(Arc::new(directory), config)
    }

    async fn send(
        app: &Router,
        method: &str,
        uri: &str,
        body: Option<serde_json::Value>,
    ) -> (StatusCode, serde_json::Value) {
        let builder = Request::builder().method(method).uri(uri);
        let request = match body {
            Some(json) => builder
                .header("content-type", "application/json")
                .body(Body::from(json.to_string()))
                .unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        };

        let response = app.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let json = serde_json::from_slice(&bytes).unwrap_or(serde_json::Value::Null);
        (status, json)
    }

    fn run_input() -> serde_json::Value {
        serde_json::json!({
            "issueUrl": "https://github.com/acme/widgets/issues/5",
            "repo": "acme/widgets",
        })
    }

    async fn wait_for_gate(state: &AppState, run_id: &str, gate: &str) {
        let mut events = Box::pin(state.directory.subscribe(run_id).await.unwrap());
        while let Some(item) = events.next().await {
            if item.kind() == "clarificationRequested" && item.payload()["gate"] == gate {
                return;
            }
        }
        panic!("gate {} never requested", gate);
    }

    #[tokio::test]
    async fn test_health() {
        let app = build_router(app_state());

        let (status, body) = send(&app, "GET", "/health", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "ok");

        let (status, body) = send(&app, "GET", "/api/health", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["server_name"], "autopilot-control-plane");
    }

    #[tokio::test]
    async fn test_create_requires_inputs() {
        let app = build_router(app_state());

        let (status, body) = send(
            &app,
            "POST",
            "/runs",
            Some(serde_json::json!({ "issueUrl": "https://github.com/a/b/issues/1" })),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["status"], 400);
        assert!(body["error"].as_str().unwrap().contains("issueUrl and repo are required"));

        let (status, _) = send(&app, "POST", "/runs", None).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_unknown_run_is_404() {
        let app = build_router(app_state());

        let (status, _) = send(&app, "GET", "/runs/nonexistent", None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);

        let (status, _) = send(&app, "GET", "/runs/nonexistent/events", None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);

        let (status, _) = send(
            &app,
            "POST",
            "/runs/nonexistent/approve",
            Some(serde_json::json!({ "gate": "propose-fix", "decision": "approve" })),
        )
        .await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_approve_validation() {
        let app = build_router(app_state());

        let (status, body) = send(
            &app,
            "POST",
            "/runs/any/approve",
            Some(serde_json::json!({ "gate": "propose-fix" })),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(body["error"].as_str().unwrap().contains("gate and decision are required"));

        let (status, _) = send(
            &app,
            "POST",
            "/runs/any/approve",
            Some(serde_json::json!({ "gate": "propose-fix", "decision": "maybe" })),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_bug_to_pr_end_to_end() {
        let state = app_state();
        let app = build_router(state.clone());

        let (status, body) = send(&app, "POST", "/runs", Some(run_input())).await;
        assert_eq!(status, StatusCode::OK);
        let run_id = body["runId"].as_str().unwrap().to_string();

        let (status, runs) = send(&app, "GET", "/runs", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(runs[0]["runId"], run_id.as_str());
        assert_eq!(runs[0]["repo"], "acme/widgets");

        let approve = format!("/runs/{}/approve", run_id);

        wait_for_gate(&state, &run_id, steps::PROPOSE_FIX).await;
        let (status, body) = send(
            &app,
            "POST",
            &approve,
            Some(serde_json::json!({
                "gate": steps::PROPOSE_FIX,
                "decision": "approve",
                "note": "go ahead",
            })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "success");

        let (status, _) = send(
            &app,
            "POST",
            &approve,
            Some(serde_json::json!({ "gate": steps::PROPOSE_FIX, "decision": "approve" })),
        )
        .await;
        assert_eq!(status, StatusCode::CONFLICT);

        wait_for_gate(&state, &run_id, steps::MERGE_PR).await;
        let (status, _) = send(
            &app,
            "POST",
            &approve,
            Some(serde_json::json!({ "gate": steps::MERGE_PR, "decision": "approve" })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);

        // The stream ends at `finished`, so the body can be read to completion.
        let response = app
            .clone()
            .oneshot(
                Request::builder()
                    .uri(format!("/runs/{}/events", run_id))
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let text = String::from_utf8(bytes.to_vec()).unwrap();
        assert!(text.contains("event: clarificationRequested"));
        assert!(text.contains("event: approvalRecorded"));
        assert!(text.trim_end().contains("event: finished"));

        let (status, run) = send(&app, "GET", &format!("/runs/{}", run_id), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(run["status"], "completed");
        assert!(run["steps"]
            .as_array()
            .unwrap()
            .iter()
            .all(|s| s["status"] == "success"));
        assert!(run["context"]["pullRequest"]["url"]
            .as_str()
            .unwrap()
            .starts_with("https://github.com/acme/widgets/pull/"));
        assert_eq!(run["context"]["finalized"]["notified"], true);
        assert!(run["proposals"].as_object().unwrap().is_empty());
        assert_eq!(run["decisions"][steps::PROPOSE_FIX]["note"], "go ahead");
    }

    #[tokio::test]
    async fn test_reject_over_http() {
        let state = app_state();
        let app = build_router(state.clone());

        let (_, body) = send(&app, "POST", "/runs", Some(run_input())).await;
        let run_id = body["runId"].as_str().unwrap().to_string();

        wait_for_gate(&state, &run_id, steps::PROPOSE_FIX).await;
        let (status, _) = send(
            &app,
            "POST",
            &format!("/runs/{}/approve", run_id),
            Some(serde_json::json!({ "gate": steps::PROPOSE_FIX, "decision": "reject" })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);

        let _ = state
            .directory
            .subscribe(&run_id)
            .await
            .unwrap()
            .collect::<Vec<_>>()
            .await;

        let (_, run) = send(&app, "GET", &format!("/runs/{}", run_id), None).await;
        assert_eq!(run["status"], "failed");
        let statuses: Vec<&str> = run["steps"]
            .as_array()
            .unwrap()
            .iter()
            .map(|s| s["status"].as_str().unwrap())
            .collect();
        assert_eq!(
            statuses,
            vec![
                "success", "success", "success", "rejected", "cancelled", "cancelled",
                "cancelled", "cancelled"
            ]
        );
        assert!(run["context"].get("pullRequest").is_none());
    }
}
