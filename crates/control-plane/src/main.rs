//! Autopilot Control Plane Server
//!
//! An async Rust server that drives bug-to-PR workflow runs, pausing at
//! approval gates and streaming progress to observers.

use std::net::SocketAddr;
use std::sync::Arc;

use tokio::net::TcpListener;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, Layer};

use autopilot_control_plane::{
    config::{AppConfig, GitHubConfig},
    engine::StepRegistry,
    result_ext::ResultExt,
    router::build_router,
    services::{default_collaborators, DirectoryOptions, RunDirectory},
    state::AppState,
};

/// Initialize tracing/logging.
fn init_tracing(json: bool) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        "info,autopilot_control_plane=debug,autopilot_tools=debug,tower_http=debug".into()
    });

    let fmt_layer = if json {
        tracing_subscriber::fmt::layer().json().boxed()
    } else {
        tracing_subscriber::fmt::layer().boxed()
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt_layer)
        .init();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables from .env file if present
    dotenvy::dotenv().ok();

    // Configuration is read before tracing so the log format can follow it.
    let app_config = AppConfig::from_env();
    let json_logs = app_config.as_ref().map(|c| c.log_json).unwrap_or(false);
    init_tracing(json_logs);

    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        "Starting Autopilot Control Plane"
    );

    let app_config = app_config.unwrap_or_else(|e| {
        tracing::warn!(error = %e, "Failed to load app config, using defaults");
        AppConfig::default()
    });

    let github_config = GitHubConfig::from_env().unwrap_or_else(|e| {
        tracing::warn!(error = %e, "Failed to load GitHub config, using defaults");
        GitHubConfig::default()
    });

    tracing::info!(
        host = %app_config.host,
        port = app_config.port,
        debug = app_config.debug,
        keepalive_secs = app_config.keepalive_secs,
        "Configuration loaded"
    );

    let collaborators = default_collaborators(&app_config, &github_config)?;
    let directory = Arc::new(RunDirectory::new(
        StepRegistry::bug_to_pr(),
        autopilot_tools::create_default_registry(&collaborators),
        DirectoryOptions::from_config(&app_config, autopilot_tools::REQUIRED_INPUTS),
    ));

    let state = AppState::new(directory.clone(), app_config.clone());
    let app = build_router(state);

    let addr: SocketAddr = app_config.bind_address().parse()?;
    let listener = TcpListener::bind(addr).await.log("binding listener")?;

    tracing::info!(address = %addr, "Server listening");

    // Runs are wound down before connections drain so open event streams
    // see `finished` and close.
    let shutdown_directory = directory.clone();
    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            shutdown_signal().await;
            shutdown_directory.shutdown().await;
        })
        .await?;

    directory.shutdown().await;
    tracing::info!("Server shutdown complete");

    Ok(())
}

/// Wait for shutdown signal (Ctrl+C or SIGTERM).
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::info!("Received Ctrl+C, starting graceful shutdown");
        }
        _ = terminate => {
            tracing::info!("Received SIGTERM, starting graceful shutdown");
        }
    }
}
