//! Autopilot Tool Library
//!
//! Step actions and collaborator clients for bug-to-PR workflows.
//!
//! This crate provides:
//! - Step action binding with registry pattern
//! - Collaborator interfaces: issue tracker, source control, fix generator, notifier
//! - GitHub REST client with a simulated demo mode
//! - Template-based fix generation with Jinja2-compatible syntax
//! - The bound actions of the default bug-to-PR workflow

pub mod actions;
pub mod collaborators;
pub mod context;
pub mod error;
pub mod fix;
pub mod github;
pub mod notify;
pub mod registry;
pub mod result;

pub use actions::{create_default_registry, REQUIRED_INPUTS};
pub use collaborators::Collaborators;
pub use context::{ActionContext, ContextMap, NullSink, ProgressSink};
pub use error::ActionError;
pub use registry::{ActionRegistry, StepAction};
pub use result::ActionOutput;
