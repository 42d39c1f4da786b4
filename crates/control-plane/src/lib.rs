//! Autopilot Control Plane Library
//!
//! This crate provides the control plane server for the bug-to-PR
//! autopilot, handling:
//!
//! - **Run Execution**: Drive each run through its steps on its own task
//! - **Approval Gates**: Suspend runs until a human approves or rejects
//! - **Event Streaming**: Deliver ordered run events to live observers over SSE
//! - **Run Directory**: Create, list and inspect runs in memory
//!
//! ## Architecture
//!
//! Every run is owned by a single executor task. Observers read snapshots
//! published through a watch channel and follow a per-run broadcast
//! channel with bounded replay. Step side effects are bound declaratively
//! through `autopilot_tools::ActionRegistry`.
//!
//! ## Modules
//!
//! - [`config`]: Configuration loading from environment variables
//! - [`engine`]: Run state machine, gates, event channel and executor
//! - [`error`]: Custom error types with Axum integration
//! - [`handlers`]: HTTP route handlers
//! - [`services`]: Run directory and collaborator wiring
//! - [`state`]: Shared application state
//!
//! ## Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use autopilot_control_plane::{
//!     config::{AppConfig, GitHubConfig},
//!     engine::StepRegistry,
//!     router::build_router,
//!     services::{default_collaborators, DirectoryOptions, RunDirectory},
//!     state::AppState,
//! };
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = AppConfig::from_env()?;
//!     let collaborators = default_collaborators(&config, &GitHubConfig::from_env()?)?;
//!     let directory = RunDirectory::new(
//!         StepRegistry::bug_to_pr(),
//!         autopilot_tools::create_default_registry(&collaborators),
//!         DirectoryOptions::from_config(&config, autopilot_tools::REQUIRED_INPUTS),
//!     );
//!     let app = build_router(AppState::new(Arc::new(directory), config));
//!     // ... serve
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod engine;
pub mod error;
pub mod handlers;
pub mod result_ext;
pub mod router;
pub mod services;
pub mod state;

pub use error::{AppError, AppResult};
pub use result_ext::ResultExt;
