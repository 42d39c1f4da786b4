//! Workflow executor.
//!
//! One executor drives one run from start to a terminal status. It owns
//! the [`Run`] outright; other tasks observe it through the snapshot
//! watch channel and the run's event channel.

use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use autopilot_tools::{ActionContext, ActionError, ActionOutput, ActionRegistry, ContextMap, ProgressSink};
use futures::FutureExt;
use tokio::sync::watch;
use tracing::{debug, error, info, warn};

use super::channel::EventChannel;
use super::events::RunEvent;
use super::gate::{GateBook, GateResolution, Resolution};
use super::registry::StepRegistry;
use super::state::{Run, RunSnapshot, RunStatus, StepKind, StepStatus};
use crate::error::AppError;

/// Forwards action progress to the run's event channel as `log` events.
struct ChannelSink {
    run_id: String,
    channel: Arc<EventChannel>,
}

impl ProgressSink for ChannelSink {
    fn log(&self, step: &str, message: &str, fields: ContextMap) {
        debug!(run_id = %self.run_id, step, message, "Action progress");
        self.channel.publish(RunEvent::Log {
            step: step.to_string(),
            message: message.to_string(),
            fields,
        });
    }
}

/// Sequential driver of a single run.
pub struct WorkflowExecutor {
    run: Run,
    registry: Arc<StepRegistry>,
    actions: ActionRegistry,
    channel: Arc<EventChannel>,
    gates: Arc<GateBook>,
    snapshots: Arc<watch::Sender<RunSnapshot>>,
    sink: Arc<ChannelSink>,
}

impl WorkflowExecutor {
    pub fn new(
        run: Run,
        registry: Arc<StepRegistry>,
        actions: ActionRegistry,
        channel: Arc<EventChannel>,
        gates: Arc<GateBook>,
        snapshots: Arc<watch::Sender<RunSnapshot>>,
    ) -> Self {
        let sink = Arc::new(ChannelSink {
            run_id: run.id.clone(),
            channel: channel.clone(),
        });
        Self {
            run,
            registry,
            actions,
            channel,
            gates,
            snapshots,
            sink,
        }
    }

    /// Run every step and return the terminal status.
    pub async fn execute(mut self) -> RunStatus {
        info!(run_id = %self.run.id, steps = self.registry.len(), "Run started");

        if let Err(e) = self.drive().await {
            error!(run_id = %self.run.id, error = %e, "Engine fault, failing run");
            self.abort(e.to_string());
        }

        info!(run_id = %self.run.id, status = %self.run.status, "Run finished");
        self.run.status
    }

    async fn drive(&mut self) -> Result<(), AppError> {
        self.run.set_status(RunStatus::Running)?;
        self.publish_state();

        let registry = self.registry.clone();
        for (index, step) in registry.iter().enumerate() {
            if self.run.status.is_terminal() {
                break;
            }

            self.run.set_step_status(index, StepStatus::Running)?;
            self.publish_state();

            match step.kind {
                StepKind::Ordinary => self.run_ordinary(index, &step.name).await?,
                StepKind::Gated => self.run_gated(index, &step.name).await?,
            }
        }

        if !self.run.status.is_terminal() {
            self.run.set_status(RunStatus::Completed)?;
            self.publish_state();
            self.publish_finished();
        }
        Ok(())
    }

    async fn run_ordinary(&mut self, index: usize, name: &str) -> Result<(), AppError> {
        debug!(run_id = %self.run.id, step = name, "Executing step");
        match self.invoke(name, None).await {
            Ok(output) => self.succeed(index, output),
            Err(e) => self.fail_step(index, name, e),
        }
    }

    async fn run_gated(&mut self, index: usize, name: &str) -> Result<(), AppError> {
        // Registered before the announcement so an immediate decision finds it.
        let wait = self.gates.open(name).await;

        self.run.set_step_status(index, StepStatus::Waiting)?;
        self.channel.publish(RunEvent::ClarificationRequested {
            gate: name.to_string(),
        });
        self.run.set_status(RunStatus::Paused)?;
        self.publish_state();
        info!(run_id = %self.run.id, gate = name, "Waiting for decision");

        let resolution = wait.resolved().await;
        info!(run_id = %self.run.id, gate = name, outcome = %resolution.outcome, "Gate resolved");

        match resolution.outcome {
            GateResolution::Approve => {
                self.run.set_status(RunStatus::Running)?;
                self.publish_state();
                self.publish_resolved(name, &resolution);

                if !self.actions.has(name) {
                    return self.succeed(index, ActionOutput::empty());
                }
                match self.invoke(name, resolution.note.clone()).await {
                    Ok(output) => self.succeed(index, output),
                    Err(e) => self.fail_step(index, name, e),
                }
            }
            GateResolution::Reject => {
                self.close_gate(index, name, StepStatus::Rejected, &resolution)
            }
            GateResolution::Cancelled => {
                self.close_gate(index, name, StepStatus::Cancelled, &resolution)
            }
        }
    }

    async fn invoke(&self, name: &str, note: Option<String>) -> Result<ActionOutput, ActionError> {
        let ctx = ActionContext::new(self.run.id.clone(), name)
            .with_input(self.run.input.clone())
            .with_applied(self.run.context.clone())
            .with_proposals(self.run.proposals.clone())
            .with_note(note)
            .with_progress(self.sink.clone());

        match AssertUnwindSafe(self.actions.execute(name, &ctx))
            .catch_unwind()
            .await
        {
            Ok(result) => result,
            Err(_) => Err(ActionError::ExecutionFailed(format!(
                "action for step '{}' panicked",
                name
            ))),
        }
    }

    fn succeed(&mut self, index: usize, output: ActionOutput) -> Result<(), AppError> {
        self.run.apply(output);
        self.run.set_step_status(index, StepStatus::Success)?;
        self.publish_state();
        Ok(())
    }

    fn fail_step(&mut self, index: usize, name: &str, error: ActionError) -> Result<(), AppError> {
        warn!(run_id = %self.run.id, step = name, error = %error, "Step failed");

        let message = error.to_string();
        self.run.set_step_status(index, StepStatus::Failed)?;
        self.run.set_step_error(index, message.clone());
        self.run.cancel_pending_after(index);
        self.run.error = Some(format!("step '{}' failed: {}", name, message));
        self.run.set_status(RunStatus::Failed)?;
        self.publish_state();
        self.publish_finished();
        Ok(())
    }

    /// End the run at a rejected or cancelled gate.
    fn close_gate(
        &mut self,
        index: usize,
        name: &str,
        status: StepStatus,
        resolution: &Resolution,
    ) -> Result<(), AppError> {
        self.run.set_step_status(index, status)?;
        self.run.cancel_pending_after(index);
        self.run.error = Some(format!("gate '{}' {}", name, status));
        self.run.set_status(RunStatus::Failed)?;
        self.publish_resolved(name, resolution);
        self.publish_state();
        self.publish_finished();
        Ok(())
    }

    /// Force the run to `failed` after an engine fault.
    fn abort(&mut self, reason: String) {
        self.run.abort(reason);
        self.publish_state();
        self.publish_finished();
    }

    fn publish_state(&self) {
        let snapshot = self.run.snapshot();
        let event = RunEvent::StateChanged {
            status: snapshot.status,
            steps: snapshot.steps.clone(),
        };
        self.snapshots.send_replace(snapshot);
        self.channel.publish(event);
    }

    fn publish_resolved(&self, gate: &str, resolution: &Resolution) {
        self.channel.publish(RunEvent::ClarificationResolved {
            gate: gate.to_string(),
            decision: resolution.outcome,
            note: resolution.note.clone(),
        });
    }

    fn publish_finished(&self) {
        self.channel.publish(RunEvent::Finished {
            status: self.run.status,
        });
    }
}
