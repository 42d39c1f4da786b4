use async_trait::async_trait;
use std::sync::Arc;

use super::{keys, steps};
use crate::collaborators::{IssueDetails, Notifier, PullRequest, SourceControl};
use crate::context::ActionContext;
use crate::error::ActionError;
use crate::registry::StepAction;
use crate::result::ActionOutput;

/// Channel finalize notifications are sent on.
pub const NOTIFY_CHANNEL: &str = "runs";

/// Comments on the original issue and sends a completion notification.
///
/// Both side effects are best-effort: failures are logged and reported in
/// the `finalized` result, never returned.
pub struct FinalizeAction {
    source_control: Arc<dyn SourceControl>,
    notifier: Arc<dyn Notifier>,
}

impl FinalizeAction {
    pub fn new(source_control: Arc<dyn SourceControl>, notifier: Arc<dyn Notifier>) -> Self {
        Self {
            source_control,
            notifier,
        }
    }
}

#[async_trait]
impl StepAction for FinalizeAction {
    fn step(&self) -> &'static str {
        steps::FINALIZE
    }

    async fn run(&self, ctx: &ActionContext) -> Result<ActionOutput, ActionError> {
        let issue: IssueDetails = ctx.require_applied(keys::ISSUE)?;
        let pr: Option<PullRequest> = ctx
            .applied(keys::PULL_REQUEST)
            .map(|v| serde_json::from_value(v.clone()))
            .transpose()?;

        let body = match &pr {
            Some(pr) => format!("Fixed in {} (merged).", pr.url),
            None => "The automated fix workflow has completed.".to_string(),
        };

        let commented = match self
            .source_control
            .comment_on_issue(&issue.repo, issue.number, &body)
            .await
        {
            Ok(_) => {
                ctx.log(format!("Commented on issue #{}", issue.number));
                true
            }
            Err(e) => {
                tracing::warn!(run_id = %ctx.run_id, error = %e, "Issue comment failed");
                ctx.log(format!("Issue comment failed: {}", e));
                false
            }
        };

        let payload = serde_json::json!({
            "runId": ctx.run_id,
            "issue": issue.url,
            "pullRequest": pr.as_ref().map(|p| p.url.clone()),
            "status": "completed",
        });
        let notified = match self.notifier.notify(NOTIFY_CHANNEL, &payload).await {
            Ok(()) => true,
            Err(e) => {
                tracing::warn!(run_id = %ctx.run_id, error = %e, "Notification failed");
                false
            }
        };

        Ok(ActionOutput::applied(
            keys::FINALIZED,
            serde_json::json!({ "commented": commented, "notified": notified }),
        ))
    }
}
