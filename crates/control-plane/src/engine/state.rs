//! Run and step state.
//!
//! A [`Run`] is owned by its executor and mutated only there; every other
//! reader sees a [`RunSnapshot`] published through a watch channel.

use std::collections::BTreeMap;
use std::str::FromStr;

use autopilot_tools::{ActionOutput, ContextMap};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::registry::StepRegistry;
use crate::error::AppError;

/// Overall run status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunStatus {
    Created,
    Running,
    Paused,
    Completed,
    Failed,
}

impl RunStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }

    /// Whether `self -> next` is a legal run transition.
    pub fn can_transition(&self, next: RunStatus) -> bool {
        use RunStatus::*;
        matches!(
            (self, next),
            (Created, Running)
                | (Created, Failed)
                | (Running, Paused)
                | (Running, Completed)
                | (Running, Failed)
                | (Paused, Running)
                | (Paused, Failed)
        )
    }
}

impl std::fmt::Display for RunStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Created => write!(f, "created"),
            Self::Running => write!(f, "running"),
            Self::Paused => write!(f, "paused"),
            Self::Completed => write!(f, "completed"),
            Self::Failed => write!(f, "failed"),
        }
    }
}

/// Kind of step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StepKind {
    Ordinary,
    /// Suspends the run until a human decision arrives.
    Gated,
}

/// Status of a single step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StepStatus {
    Pending,
    Running,
    Waiting,
    Success,
    Failed,
    Rejected,
    Cancelled,
}

impl StepStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            Self::Success | Self::Failed | Self::Rejected | Self::Cancelled
        )
    }

    /// Whether `self -> next` is a legal transition for a step of `kind`.
    ///
    /// `waiting -> failed` covers an approved gate whose bound action fails;
    /// `waiting -> cancelled` covers a gate released by shutdown.
    pub fn can_transition(&self, next: StepStatus, kind: StepKind) -> bool {
        use StepStatus::*;
        match (self, next) {
            (Pending, Running) | (Pending, Cancelled) => true,
            (Running, Success) | (Running, Failed) => true,
            (Running, Waiting) => kind == StepKind::Gated,
            (Waiting, Success) | (Waiting, Rejected) | (Waiting, Failed) | (Waiting, Cancelled) => {
                kind == StepKind::Gated
            }
            _ => false,
        }
    }
}

impl std::fmt::Display for StepStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Pending => write!(f, "pending"),
            Self::Running => write!(f, "running"),
            Self::Waiting => write!(f, "waiting"),
            Self::Success => write!(f, "success"),
            Self::Failed => write!(f, "failed"),
            Self::Rejected => write!(f, "rejected"),
            Self::Cancelled => write!(f, "cancelled"),
        }
    }
}

/// Step entry of a run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StepState {
    pub name: String,
    pub kind: StepKind,
    pub status: StepStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub finished_at: Option<DateTime<Utc>>,
}

impl StepState {
    pub fn new(name: &str, kind: StepKind) -> Self {
        Self {
            name: name.to_string(),
            kind,
            status: StepStatus::Pending,
            error: None,
            started_at: None,
            finished_at: None,
        }
    }
}

/// A human decision on a gate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GateDecision {
    Approve,
    Reject,
}

impl FromStr for GateDecision {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "approve" => Ok(Self::Approve),
            "reject" => Ok(Self::Reject),
            other => Err(AppError::Validation(format!(
                "decision must be 'approve' or 'reject', got '{}'",
                other
            ))),
        }
    }
}

impl std::fmt::Display for GateDecision {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Approve => write!(f, "approve"),
            Self::Reject => write!(f, "reject"),
        }
    }
}

/// Decision recorded for a gate. Written once per gate per run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Decision {
    pub decision: GateDecision,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
    pub recorded_at: DateTime<Utc>,
}

/// Point-in-time copy of a run.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunSnapshot {
    pub run_id: String,
    pub input: serde_json::Value,
    pub status: RunStatus,
    pub steps: Vec<StepState>,
    /// Results already applied by completed steps.
    pub context: ContextMap,
    /// Proposals waiting to be applied.
    pub proposals: ContextMap,
    pub decisions: BTreeMap<String, Decision>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub created_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub finished_at: Option<DateTime<Utc>>,
}

impl RunSnapshot {
    pub fn step(&self, name: &str) -> Option<&StepState> {
        self.steps.iter().find(|s| s.name == name)
    }

    pub fn step_statuses(&self) -> Vec<StepStatus> {
        self.steps.iter().map(|s| s.status).collect()
    }

    /// Fail a snapshot whose executor is gone. Unfinished steps become
    /// `cancelled`.
    pub fn abort(&mut self, reason: impl Into<String>) {
        let now = Utc::now();
        cancel_unfinished(&mut self.steps, now);
        self.error = Some(reason.into());
        self.status = RunStatus::Failed;
        self.finished_at = Some(now);
    }
}

fn cancel_unfinished(steps: &mut [StepState], now: DateTime<Utc>) {
    for step in steps.iter_mut().filter(|s| !s.status.is_terminal()) {
        step.status = StepStatus::Cancelled;
        step.finished_at = Some(now);
    }
}

/// Listing entry for a run.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunSummary {
    pub run_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub issue_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub repo: Option<String>,
    pub status: RunStatus,
    pub created_at: DateTime<Utc>,
}

impl From<&RunSnapshot> for RunSummary {
    fn from(snapshot: &RunSnapshot) -> Self {
        let field = |name: &str| {
            snapshot
                .input
                .get(name)
                .and_then(|v| v.as_str())
                .map(str::to_string)
        };
        Self {
            run_id: snapshot.run_id.clone(),
            issue_url: field("issueUrl"),
            repo: field("repo"),
            status: snapshot.status,
            created_at: snapshot.created_at,
        }
    }
}

/// Mutable record of one workflow instance.
#[derive(Debug, Clone)]
pub struct Run {
    pub id: String,
    pub input: serde_json::Value,
    pub status: RunStatus,
    pub steps: Vec<StepState>,
    pub context: ContextMap,
    pub proposals: ContextMap,
    pub error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
}

impl Run {
    pub fn new(id: impl Into<String>, input: serde_json::Value, registry: &StepRegistry) -> Self {
        Self {
            id: id.into(),
            input,
            status: RunStatus::Created,
            steps: registry
                .iter()
                .map(|def| StepState::new(&def.name, def.kind))
                .collect(),
            context: ContextMap::new(),
            proposals: ContextMap::new(),
            error: None,
            created_at: Utc::now(),
            started_at: None,
            finished_at: None,
        }
    }

    /// Move the run to `next`, rejecting illegal transitions.
    pub fn set_status(&mut self, next: RunStatus) -> Result<(), AppError> {
        if !self.status.can_transition(next) {
            return Err(AppError::EngineFault(format!(
                "run {} cannot move from {} to {}",
                self.id, self.status, next
            )));
        }
        let now = Utc::now();
        if self.started_at.is_none() && next == RunStatus::Running {
            self.started_at = Some(now);
        }
        if next.is_terminal() {
            self.finished_at = Some(now);
        }
        self.status = next;
        Ok(())
    }

    /// Move step `index` to `next`, rejecting illegal transitions.
    pub fn set_step_status(&mut self, index: usize, next: StepStatus) -> Result<(), AppError> {
        let run_id = &self.id;
        let step = self.steps.get_mut(index).ok_or_else(|| {
            AppError::EngineFault(format!("run {} has no step at index {}", run_id, index))
        })?;
        if !step.status.can_transition(next, step.kind) {
            return Err(AppError::EngineFault(format!(
                "step '{}' of run {} cannot move from {} to {}",
                step.name, run_id, step.status, next
            )));
        }
        let now = Utc::now();
        if next == StepStatus::Running {
            step.started_at = Some(now);
        }
        if next.is_terminal() {
            step.finished_at = Some(now);
        }
        step.status = next;
        Ok(())
    }

    pub fn set_step_error(&mut self, index: usize, error: impl Into<String>) {
        if let Some(step) = self.steps.get_mut(index) {
            step.error = Some(error.into());
        }
    }

    /// Cancel every pending step after `index`.
    pub fn cancel_pending_after(&mut self, index: usize) {
        let now = Utc::now();
        for step in self.steps.iter_mut().skip(index + 1) {
            if step.status == StepStatus::Pending {
                step.status = StepStatus::Cancelled;
                step.finished_at = Some(now);
            }
        }
    }

    /// Force the run to `failed`, bypassing the transition rules.
    pub fn abort(&mut self, reason: impl Into<String>) {
        let now = Utc::now();
        cancel_unfinished(&mut self.steps, now);
        self.error = Some(reason.into());
        self.status = RunStatus::Failed;
        self.finished_at = Some(now);
    }

    /// Merge an action's output.
    ///
    /// Consumed proposals are removed in the same merge that records the
    /// applied results, so a proposal is never applied twice.
    pub fn apply(&mut self, output: ActionOutput) {
        for key in &output.consumed {
            self.proposals.remove(key);
        }
        self.context.extend(output.applied);
        self.proposals.extend(output.proposed);
    }

    /// Snapshot without decisions; the gate book owns those.
    pub fn snapshot(&self) -> RunSnapshot {
        RunSnapshot {
            run_id: self.id.clone(),
            input: self.input.clone(),
            status: self.status,
            steps: self.steps.clone(),
            context: self.context.clone(),
            proposals: self.proposals.clone(),
            decisions: BTreeMap::new(),
            error: self.error.clone(),
            created_at: self.created_at,
            started_at: self.started_at,
            finished_at: self.finished_at,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn registry() -> StepRegistry {
        StepRegistry::builder()
            .ordinary("A")
            .gated("B")
            .ordinary("C")
            .build()
            .unwrap()
    }

    #[test]
    fn test_run_status_transitions() {
        assert!(RunStatus::Created.can_transition(RunStatus::Running));
        assert!(RunStatus::Running.can_transition(RunStatus::Paused));
        assert!(RunStatus::Paused.can_transition(RunStatus::Running));
        assert!(!RunStatus::Completed.can_transition(RunStatus::Running));
        assert!(!RunStatus::Paused.can_transition(RunStatus::Completed));
    }

    #[test]
    fn test_step_status_transitions() {
        use StepStatus::*;
        assert!(Pending.can_transition(Running, StepKind::Ordinary));
        assert!(!Running.can_transition(Waiting, StepKind::Ordinary));
        assert!(Running.can_transition(Waiting, StepKind::Gated));
        assert!(Waiting.can_transition(Rejected, StepKind::Gated));
        assert!(!Success.can_transition(Running, StepKind::Ordinary));
        assert!(!Rejected.can_transition(Success, StepKind::Gated));
    }

    #[test]
    fn test_illegal_step_transition_is_engine_fault() {
        let mut run = Run::new("r", serde_json::json!({}), &registry());
        let err = run.set_step_status(0, StepStatus::Success).unwrap_err();
        assert!(matches!(err, AppError::EngineFault(_)));
        assert_eq!(run.steps[0].status, StepStatus::Pending);
    }

    #[test]
    fn test_cancel_pending_after() {
        let mut run = Run::new("r", serde_json::json!({}), &registry());
        run.set_step_status(0, StepStatus::Running).unwrap();
        run.set_step_status(0, StepStatus::Success).unwrap();
        run.set_step_status(1, StepStatus::Running).unwrap();
        run.set_step_status(1, StepStatus::Waiting).unwrap();
        run.set_step_status(1, StepStatus::Rejected).unwrap();
        run.cancel_pending_after(1);

        assert_eq!(
            run.snapshot().step_statuses(),
            vec![StepStatus::Success, StepStatus::Rejected, StepStatus::Cancelled]
        );
    }

    #[test]
    fn test_snapshot_abort_cancels_unfinished_steps() {
        let mut run = Run::new("r", serde_json::json!({}), &registry());
        run.set_status(RunStatus::Running).unwrap();
        run.set_step_status(0, StepStatus::Running).unwrap();
        run.set_step_status(0, StepStatus::Success).unwrap();
        run.set_step_status(1, StepStatus::Running).unwrap();

        let mut snapshot = run.snapshot();
        snapshot.abort("executor aborted");

        assert_eq!(snapshot.status, RunStatus::Failed);
        assert!(snapshot.finished_at.is_some());
        assert_eq!(snapshot.error.as_deref(), Some("executor aborted"));
        assert_eq!(
            snapshot.step_statuses(),
            vec![StepStatus::Success, StepStatus::Cancelled, StepStatus::Cancelled]
        );
    }

    #[test]
    fn test_apply_consumes_proposal() {
        let mut run = Run::new("r", serde_json::json!({}), &registry());
        run.apply(ActionOutput::proposed("fix", serde_json::json!({"files": []})));
        assert!(run.proposals.contains_key("fix"));

        run.apply(
            ActionOutput::applied("pullRequest", serde_json::json!({"number": 1})).consuming("fix"),
        );
        assert!(run.proposals.is_empty());
        assert_eq!(run.context["pullRequest"]["number"], 1);
    }

    #[test]
    fn test_timestamps() {
        let mut run = Run::new("r", serde_json::json!({}), &registry());
        assert!(run.started_at.is_none());
        run.set_status(RunStatus::Running).unwrap();
        assert!(run.started_at.is_some());
        run.set_status(RunStatus::Completed).unwrap();
        assert!(run.finished_at.is_some());
    }

    #[test]
    fn test_decision_parse() {
        assert_eq!("approve".parse::<GateDecision>().unwrap(), GateDecision::Approve);
        assert_eq!("reject".parse::<GateDecision>().unwrap(), GateDecision::Reject);
        assert!("maybe".parse::<GateDecision>().is_err());
    }

    #[test]
    fn test_summary_from_snapshot() {
        let run = Run::new(
            "r",
            serde_json::json!({"issueUrl": "https://github.com/a/b/issues/1", "repo": "a/b"}),
            &registry(),
        );
        let summary = RunSummary::from(&run.snapshot());
        assert_eq!(summary.repo.as_deref(), Some("a/b"));
        assert_eq!(summary.status, RunStatus::Created);

        let json = serde_json::to_value(&summary).unwrap();
        assert_eq!(json["runId"], "r");
        assert_eq!(json["status"], "created");
    }
}
