//! Application configuration for the Autopilot Control Plane server.

use serde::Deserialize;
use std::time::Duration;

/// Application configuration loaded from environment variables.
///
/// Environment variables are prefixed with `AUTOPILOT_`:
/// - `AUTOPILOT_HOST`: Server bind address (default: "0.0.0.0")
/// - `AUTOPILOT_PORT`: Server port (default: 8000)
/// - `AUTOPILOT_DEBUG`: Enable debug mode (default: false)
/// - `AUTOPILOT_SERVER_NAME`: Server name for identification
/// - `AUTOPILOT_LOG_JSON`: Emit JSON log lines (default: false)
/// - `AUTOPILOT_KEEPALIVE_SECS`: Idle window before an event stream keepalive (default: 30)
/// - `AUTOPILOT_EVENT_BUFFER`: Live events buffered per subscriber (default: 256)
/// - `AUTOPILOT_EVENT_HISTORY`: Events retained per run for late subscribers (default: 512)
/// - `AUTOPILOT_SHUTDOWN_GRACE_SECS`: Wait for runs to wind down on shutdown (default: 5)
/// - `AUTOPILOT_NOTIFY_WEBHOOK`: Webhook URL for run notifications (optional)
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    /// Server bind address
    #[serde(default = "default_host")]
    pub host: String,

    /// Server port
    #[serde(default = "default_port")]
    pub port: u16,

    /// Enable debug mode
    #[serde(default)]
    pub debug: bool,

    /// Server name for identification
    #[serde(default = "default_server_name")]
    pub server_name: String,

    /// Emit JSON formatted logs
    #[serde(default)]
    pub log_json: bool,

    #[serde(default = "default_keepalive_secs")]
    pub keepalive_secs: u64,

    #[serde(default = "default_event_buffer")]
    pub event_buffer: usize,

    #[serde(default = "default_event_history")]
    pub event_history: usize,

    #[serde(default = "default_shutdown_grace_secs")]
    pub shutdown_grace_secs: u64,

    /// Notification webhook (optional, logs notifications when absent)
    #[serde(default)]
    pub notify_webhook: Option<String>,
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8000
}

fn default_server_name() -> String {
    "autopilot-control-plane".to_string()
}

fn default_keepalive_secs() -> u64 {
    30
}

fn default_event_buffer() -> usize {
    256
}

fn default_event_history() -> usize {
    512
}

fn default_shutdown_grace_secs() -> u64 {
    5
}

impl AppConfig {
    /// Load configuration from environment variables.
    ///
    /// Environment variables are prefixed with `AUTOPILOT_`.
    pub fn from_env() -> Result<Self, envy::Error> {
        envy::prefixed("AUTOPILOT_").from_env::<AppConfig>()
    }

    /// Get the server bind address as a string suitable for `TcpListener::bind`.
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn keepalive(&self) -> Duration {
        Duration::from_secs(self.keepalive_secs.max(1))
    }

    pub fn shutdown_grace(&self) -> Duration {
        Duration::from_secs(self.shutdown_grace_secs)
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            debug: false,
            server_name: default_server_name(),
            log_json: false,
            keepalive_secs: default_keepalive_secs(),
            event_buffer: default_event_buffer(),
            event_history: default_event_history(),
            shutdown_grace_secs: default_shutdown_grace_secs(),
            notify_webhook: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = AppConfig::default();
        assert_eq!(config.host, "0.0.0.0");
        assert_eq!(config.port, 8000);
        assert!(!config.debug);
        assert_eq!(config.keepalive(), Duration::from_secs(30));
        assert!(config.notify_webhook.is_none());
    }

    #[test]
    fn test_bind_address() {
        let config = AppConfig::default();
        assert_eq!(config.bind_address(), "0.0.0.0:8000");
    }

    #[test]
    fn test_keepalive_never_zero() {
        let config = AppConfig {
            keepalive_secs: 0,
            ..AppConfig::default()
        };
        assert_eq!(config.keepalive(), Duration::from_secs(1));
    }
}
