//! Application state for the Autopilot Control Plane server.
//!
//! This module defines the shared application state that is
//! passed to all handlers via Axum's state management.

use std::sync::Arc;
use std::time::Instant;

use crate::config::AppConfig;
use crate::services::RunDirectory;

/// Shared application state.
///
/// Cloned into every handler; the run directory is the single owner of
/// all run state and is shared behind an `Arc`.
#[derive(Clone)]
pub struct AppState {
    /// Registry of all runs
    pub directory: Arc<RunDirectory>,

    /// Application configuration
    pub config: Arc<AppConfig>,

    /// Server start time for uptime calculation
    pub start_time: Instant,
}

impl AppState {
    pub fn new(directory: Arc<RunDirectory>, config: AppConfig) -> Self {
        Self {
            directory,
            config: Arc::new(config),
            start_time: Instant::now(),
        }
    }

    /// Get the server uptime in seconds.
    pub fn uptime_seconds(&self) -> u64 {
        self.start_time.elapsed().as_secs()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::StepRegistry;
    use crate::services::DirectoryOptions;
    use autopilot_tools::ActionRegistry;

    #[test]
    fn test_uptime_starts_at_zero() {
        let directory = RunDirectory::new(
            StepRegistry::builder().build().unwrap(),
            ActionRegistry::new(),
            DirectoryOptions::default(),
        );
        let state = AppState::new(Arc::new(directory), AppConfig::default());
        assert_eq!(state.uptime_seconds(), 0);
        assert_eq!(state.config.port, 8000);
    }
}
