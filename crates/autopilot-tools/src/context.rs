//! Execution context handed to step actions.

use serde::de::DeserializeOwned;
use std::sync::Arc;

use crate::error::ActionError;

/// Key/value map used for run input, applied results and proposals.
pub type ContextMap = serde_json::Map<String, serde_json::Value>;

/// Receiver for progress messages an action emits while it runs.
///
/// The control plane implements this on top of a run's event channel so
/// that every message reaches live observers as a `log` event.
pub trait ProgressSink: Send + Sync {
    fn log(&self, step: &str, message: &str, fields: ContextMap);
}

/// Sink that discards progress messages.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullSink;

impl ProgressSink for NullSink {
    fn log(&self, _step: &str, _message: &str, _fields: ContextMap) {}
}

/// Read-only view of a run passed to a step action.
///
/// Contains everything an action needs:
/// - Run identity and the current step name
/// - The triggering input of the run
/// - Results applied by earlier steps
/// - Proposals waiting to be applied
/// - The approver's note, when the step is a gate
#[derive(Clone)]
pub struct ActionContext {
    /// Run identifier.
    pub run_id: String,

    /// Current step name.
    pub step: String,

    /// Triggering parameters of the run.
    pub input: serde_json::Value,

    /// Side-effect results already applied by earlier steps.
    pub applied: ContextMap,

    /// Proposals produced by earlier steps and not yet applied.
    pub proposals: ContextMap,

    /// Note attached to the approval of a gated step.
    pub note: Option<String>,

    progress: Arc<dyn ProgressSink>,
}

impl ActionContext {
    /// Create a context for a step with empty input and state.
    pub fn new(run_id: impl Into<String>, step: impl Into<String>) -> Self {
        Self {
            run_id: run_id.into(),
            step: step.into(),
            input: serde_json::Value::Object(ContextMap::new()),
            applied: ContextMap::new(),
            proposals: ContextMap::new(),
            note: None,
            progress: Arc::new(NullSink),
        }
    }

    /// Set the run input.
    pub fn with_input(mut self, input: serde_json::Value) -> Self {
        self.input = input;
        self
    }

    /// Set the applied results visible to the action.
    pub fn with_applied(mut self, applied: ContextMap) -> Self {
        self.applied = applied;
        self
    }

    /// Set the pending proposals visible to the action.
    pub fn with_proposals(mut self, proposals: ContextMap) -> Self {
        self.proposals = proposals;
        self
    }

    /// Set the approval note.
    pub fn with_note(mut self, note: Option<String>) -> Self {
        self.note = note;
        self
    }

    /// Route progress messages to the given sink.
    pub fn with_progress(mut self, progress: Arc<dyn ProgressSink>) -> Self {
        self.progress = progress;
        self
    }

    /// Get a string field of the run input.
    pub fn input_str(&self, name: &str) -> Option<&str> {
        self.input.get(name).and_then(|v| v.as_str())
    }

    /// Get a required string field of the run input.
    pub fn require_input_str(&self, name: &str) -> Result<&str, ActionError> {
        self.input_str(name)
            .ok_or_else(|| ActionError::MissingContext(format!("input.{}", name)))
    }

    /// Get an applied result.
    pub fn applied(&self, name: &str) -> Option<&serde_json::Value> {
        self.applied.get(name)
    }

    /// Deserialize a required applied result.
    pub fn require_applied<T: DeserializeOwned>(&self, name: &str) -> Result<T, ActionError> {
        let value = self
            .applied
            .get(name)
            .ok_or_else(|| ActionError::MissingContext(name.to_string()))?;
        Ok(serde_json::from_value(value.clone())?)
    }

    /// Deserialize a required proposal.
    pub fn require_proposal<T: DeserializeOwned>(&self, name: &str) -> Result<T, ActionError> {
        let value = self
            .proposals
            .get(name)
            .ok_or_else(|| ActionError::MissingContext(format!("proposals.{}", name)))?;
        Ok(serde_json::from_value(value.clone())?)
    }

    /// Publish a progress message.
    pub fn log(&self, message: impl AsRef<str>) {
        self.progress.log(&self.step, message.as_ref(), ContextMap::new());
    }

    /// Publish a progress message with extra structured fields.
    pub fn log_with(&self, message: impl AsRef<str>, fields: serde_json::Value) {
        let fields = match fields {
            serde_json::Value::Object(map) => map,
            other => {
                let mut map = ContextMap::new();
                map.insert("value".to_string(), other);
                map
            }
        };
        self.progress.log(&self.step, message.as_ref(), fields);
    }
}

impl std::fmt::Debug for ActionContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ActionContext")
            .field("run_id", &self.run_id)
            .field("step", &self.step)
            .field("input", &self.input)
            .field("applied", &self.applied.keys().collect::<Vec<_>>())
            .field("proposals", &self.proposals.keys().collect::<Vec<_>>())
            .field("note", &self.note)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[derive(Default)]
    struct Collect(Mutex<Vec<(String, String, ContextMap)>>);

    impl ProgressSink for Collect {
        fn log(&self, step: &str, message: &str, fields: ContextMap) {
            if let Ok(mut lines) = self.0.lock() {
                lines.push((step.to_string(), message.to_string(), fields));
            }
        }
    }

    #[test]
    fn test_context_input() {
        let ctx = ActionContext::new("run-1", "fetch-issue-details")
            .with_input(serde_json::json!({"issueUrl": "https://x", "repo": "o/r"}));

        assert_eq!(ctx.input_str("repo"), Some("o/r"));
        assert!(ctx.input_str("missing").is_none());
        assert!(matches!(
            ctx.require_input_str("missing"),
            Err(ActionError::MissingContext(_))
        ));
    }

    #[test]
    fn test_require_applied() {
        let mut applied = ContextMap::new();
        applied.insert("branch".to_string(), serde_json::json!("bugfix/x"));
        let ctx = ActionContext::new("run-1", "open-pr").with_applied(applied);

        let branch: String = ctx.require_applied("branch").unwrap();
        assert_eq!(branch, "bugfix/x");
        assert!(ctx.require_applied::<String>("issue").is_err());
        assert!(ctx.require_proposal::<String>("fix").is_err());
    }

    #[test]
    fn test_progress_is_forwarded() {
        let sink = Arc::new(Collect::default());
        let ctx = ActionContext::new("run-1", "create-branch").with_progress(sink.clone());

        ctx.log("Created branch");
        ctx.log_with("Will create", serde_json::json!({"file_path": "README.md"}));

        let lines = sink.0.lock().unwrap();
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0].0, "create-branch");
        assert_eq!(lines[1].2.get("file_path"), Some(&serde_json::json!("README.md")));
    }

    #[test]
    fn test_debug_hides_values() {
        let ctx = ActionContext::new("run-1", "finalize");
        let debug = format!("{:?}", ctx);
        assert!(debug.contains("finalize"));
    }
}
