use async_trait::async_trait;
use std::sync::Arc;

use super::{keys, steps};
use crate::collaborators::SourceControl;
use crate::context::ActionContext;
use crate::error::ActionError;
use crate::registry::StepAction;
use crate::result::ActionOutput;

/// Describes the target repository named by the `repo` input.
pub struct AnalyzeRepositoryAction {
    source_control: Arc<dyn SourceControl>,
}

impl AnalyzeRepositoryAction {
    pub fn new(source_control: Arc<dyn SourceControl>) -> Self {
        Self { source_control }
    }
}

#[async_trait]
impl StepAction for AnalyzeRepositoryAction {
    fn step(&self) -> &'static str {
        steps::ANALYZE_REPOSITORY
    }

    async fn run(&self, ctx: &ActionContext) -> Result<ActionOutput, ActionError> {
        let repo = ctx.require_input_str("repo")?;
        ctx.log(format!("Analyzing repository {}", repo));

        let context = self.source_control.describe_repository(repo).await?;
        ctx.log_with(
            "Repository analyzed",
            serde_json::json!({
                "defaultBranch": context.default_branch,
                "languages": context.languages,
            }),
        );

        Ok(ActionOutput::applied(
            keys::REPOSITORY,
            serde_json::to_value(&context)?,
        ))
    }
}

/// Creates the working branch.
///
/// Uses the `branch` input when given, otherwise a generated name.
pub struct CreateBranchAction {
    source_control: Arc<dyn SourceControl>,
    base_branch: String,
}

impl CreateBranchAction {
    pub fn new(source_control: Arc<dyn SourceControl>, base_branch: String) -> Self {
        Self {
            source_control,
            base_branch,
        }
    }
}

#[async_trait]
impl StepAction for CreateBranchAction {
    fn step(&self) -> &'static str {
        steps::CREATE_BRANCH
    }

    async fn run(&self, ctx: &ActionContext) -> Result<ActionOutput, ActionError> {
        let repo = ctx.require_input_str("repo")?;
        let branch = self
            .source_control
            .create_branch(repo, &self.base_branch, ctx.input_str("branch"))
            .await?;

        ctx.log_with(
            format!("Created branch {}", branch.name),
            serde_json::json!({ "base": self.base_branch, "sha": branch.sha }),
        );

        Ok(ActionOutput::applied(keys::BRANCH, serde_json::to_value(&branch)?))
    }
}

#[cfg(test)]
mod tests {
    use super::super::testing;
    use super::*;
    use crate::collaborators::{BranchRef, RepoContext};

    #[tokio::test]
    async fn test_analyze_repository() {
        let collaborators = testing::demo_collaborators();
        let action = AnalyzeRepositoryAction::new(collaborators.source_control);
        let ctx = testing::context(steps::ANALYZE_REPOSITORY);

        let output = action.run(&ctx).await.unwrap();
        let repo: RepoContext =
            serde_json::from_value(output.applied[keys::REPOSITORY].clone()).unwrap();
        assert_eq!(repo.full_name, "acme/widgets");
        assert_eq!(repo.default_branch, "main");
    }

    #[tokio::test]
    async fn test_create_branch_uses_requested_name() {
        let collaborators = testing::demo_collaborators();
        let action = CreateBranchAction::new(collaborators.source_control, "main".to_string());
        let ctx = ActionContext::new("run-1", steps::CREATE_BRANCH).with_input(
            serde_json::json!({ "repo": "acme/widgets", "branch": "fix/issue-5" }),
        );

        let output = action.run(&ctx).await.unwrap();
        let branch: BranchRef =
            serde_json::from_value(output.applied[keys::BRANCH].clone()).unwrap();
        assert_eq!(branch.name, "fix/issue-5");
    }

    #[tokio::test]
    async fn test_create_branch_generates_name() {
        let collaborators = testing::demo_collaborators();
        let action = CreateBranchAction::new(collaborators.source_control, "main".to_string());
        let ctx = testing::context(steps::CREATE_BRANCH);

        let output = action.run(&ctx).await.unwrap();
        let branch: BranchRef =
            serde_json::from_value(output.applied[keys::BRANCH].clone()).unwrap();
        assert!(branch.name.starts_with("bugfix/auto-fix-"));
    }
}
