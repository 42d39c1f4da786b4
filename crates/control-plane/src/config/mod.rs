//! Configuration module for the Autopilot Control Plane server.
//!
//! This module provides configuration loading from environment variables
//! using the `envy` crate for type-safe environment variable parsing.
//! GitHub settings live with the client in `autopilot_tools::github`.

mod app;

pub use app::AppConfig;
pub use autopilot_tools::github::GitHubConfig;
