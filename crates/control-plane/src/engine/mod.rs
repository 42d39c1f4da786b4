//! Workflow execution engine.
//!
//! - **Channel**: per-run ordered event delivery with replay and keepalive
//! - **Gate**: one-shot approval gates the executor suspends on
//! - **Registry**: the ordered steps a run walks through
//! - **State**: run, step and decision records
//! - **Executor**: the sequential driver of one run

pub mod channel;
pub mod events;
pub mod executor;
pub mod gate;
pub mod registry;
pub mod state;

pub use channel::{ChannelOptions, EventChannel};
pub use events::{EventEnvelope, RunEvent, StreamItem};
pub use executor::WorkflowExecutor;
pub use gate::{GateBook, GateResolution};
pub use registry::{StepDefinition, StepRegistry};
pub use state::{
    Decision, GateDecision, Run, RunSnapshot, RunStatus, RunSummary, StepKind, StepState,
    StepStatus,
};
