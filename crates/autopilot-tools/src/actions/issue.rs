use async_trait::async_trait;
use std::sync::Arc;

use super::{keys, steps};
use crate::collaborators::IssueTracker;
use crate::context::ActionContext;
use crate::error::ActionError;
use crate::registry::StepAction;
use crate::result::ActionOutput;

/// Fetches the issue named by the `issueUrl` input.
pub struct FetchIssueAction {
    issues: Arc<dyn IssueTracker>,
}

impl FetchIssueAction {
    pub fn new(issues: Arc<dyn IssueTracker>) -> Self {
        Self { issues }
    }
}

#[async_trait]
impl StepAction for FetchIssueAction {
    fn step(&self) -> &'static str {
        steps::FETCH_ISSUE
    }

    async fn run(&self, ctx: &ActionContext) -> Result<ActionOutput, ActionError> {
        let url = ctx.require_input_str("issueUrl")?;
        ctx.log(format!("Fetching issue from {}", url));

        let issue = self.issues.fetch_issue(url).await?;
        ctx.log_with(
            format!("Fetched issue: {}", issue.title),
            serde_json::json!({ "issueId": issue.id, "simulated": issue.simulated }),
        );

        Ok(ActionOutput::applied(keys::ISSUE, serde_json::to_value(&issue)?))
    }
}

#[cfg(test)]
mod tests {
    use super::super::testing;
    use super::*;
    use crate::collaborators::IssueDetails;

    #[tokio::test]
    async fn test_fetch_issue() {
        let collaborators = testing::demo_collaborators();
        let action = FetchIssueAction::new(collaborators.issues);
        let sink = Arc::new(testing::RecordingSink::default());
        let ctx = testing::context(steps::FETCH_ISSUE).with_progress(sink.clone());

        let output = action.run(&ctx).await.unwrap();
        let issue: IssueDetails =
            serde_json::from_value(output.applied[keys::ISSUE].clone()).unwrap();

        assert_eq!(issue.number, 5);
        assert_eq!(issue.repo, "acme/widgets");
        assert_eq!(sink.messages.lock().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_fetch_issue_requires_url() {
        let collaborators = testing::demo_collaborators();
        let action = FetchIssueAction::new(collaborators.issues);
        let ctx = ActionContext::new("run-1", steps::FETCH_ISSUE);

        let err = action.run(&ctx).await.unwrap_err();
        assert!(matches!(err, ActionError::MissingContext(_)));
    }
}
