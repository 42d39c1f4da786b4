//! HTTP handlers for the Autopilot Control Plane API.
//!
//! This module contains all route handlers organized by domain.

pub mod events;
pub mod health;
pub mod runs;

pub use health::{api_health, health_check};
