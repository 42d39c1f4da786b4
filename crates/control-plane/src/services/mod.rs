//! Service layer for the Autopilot Control Plane.
//!
//! Services own run state and collaborator wiring; handlers only
//! translate HTTP to and from them.

pub mod collaborators;
pub mod directory;

pub use collaborators::default_collaborators;
pub use directory::{DirectoryOptions, RunDirectory};
