use async_trait::async_trait;
use std::sync::Arc;

use super::{keys, steps};
use crate::collaborators::{FixGenerator, IssueDetails, RepoContext};
use crate::context::ActionContext;
use crate::error::ActionError;
use crate::registry::StepAction;
use crate::result::ActionOutput;

/// Generates the fix once the gate is approved.
///
/// The fix is stored as a proposal; `open-pr` applies it.
pub struct ProposeFixAction {
    fixes: Arc<dyn FixGenerator>,
}

impl ProposeFixAction {
    pub fn new(fixes: Arc<dyn FixGenerator>) -> Self {
        Self { fixes }
    }
}

#[async_trait]
impl StepAction for ProposeFixAction {
    fn step(&self) -> &'static str {
        steps::PROPOSE_FIX
    }

    async fn run(&self, ctx: &ActionContext) -> Result<ActionOutput, ActionError> {
        let issue: IssueDetails = ctx.require_applied(keys::ISSUE)?;
        let repo: RepoContext = ctx.require_applied(keys::REPOSITORY)?;

        if let Some(note) = ctx.note.as_deref() {
            ctx.log(format!("Approver note: {}", note));
        }

        let proposal = self.fixes.generate(&issue, &repo).await?;
        for file in &proposal.files {
            ctx.log_with(
                format!("Planned change: {}", file.path),
                serde_json::json!({ "path": file.path, "bytes": file.content.len() }),
            );
        }

        Ok(ActionOutput::proposed(keys::FIX, serde_json::to_value(&proposal)?))
    }
}

#[cfg(test)]
mod tests {
    use super::super::testing;
    use super::*;
    use crate::collaborators::FixProposal;

    #[tokio::test]
    async fn test_propose_fix() {
        let collaborators = testing::demo_collaborators();
        let issue = collaborators
            .issues
            .fetch_issue("https://github.com/acme/widgets/issues/5")
            .await
            .unwrap();
        let repo = collaborators
            .source_control
            .describe_repository("acme/widgets")
            .await
            .unwrap();

        let mut applied = crate::context::ContextMap::new();
        applied.insert(keys::ISSUE.to_string(), serde_json::to_value(&issue).unwrap());
        applied.insert(keys::REPOSITORY.to_string(), serde_json::to_value(&repo).unwrap());

        let sink = Arc::new(testing::RecordingSink::default());
        let ctx = testing::context(steps::PROPOSE_FIX)
            .with_applied(applied)
            .with_note(Some("looks fine".to_string()))
            .with_progress(sink.clone());

        let action = ProposeFixAction::new(collaborators.fixes);
        let output = action.run(&ctx).await.unwrap();

        assert!(output.applied.is_empty());
        let proposal: FixProposal =
            serde_json::from_value(output.proposed[keys::FIX].clone()).unwrap();
        assert_eq!(proposal.files.len(), 1);

        let messages = sink.messages.lock().unwrap();
        assert_eq!(messages[0], "Approver note: looks fine");
        assert!(messages[1].starts_with("Planned change: "));
    }

    #[tokio::test]
    async fn test_propose_fix_requires_issue() {
        let collaborators = testing::demo_collaborators();
        let action = ProposeFixAction::new(collaborators.fixes);
        let ctx = testing::context(steps::PROPOSE_FIX);

        let err = action.run(&ctx).await.unwrap_err();
        assert!(matches!(err, ActionError::MissingContext(ref k) if k == keys::ISSUE));
    }
}
