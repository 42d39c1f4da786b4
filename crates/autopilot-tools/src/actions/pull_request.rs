use async_trait::async_trait;
use std::sync::Arc;

use super::{keys, steps};
use crate::collaborators::{BranchRef, FixProposal, MergeResult, PullRequest, SourceControl};
use crate::context::ActionContext;
use crate::error::ActionError;
use crate::registry::StepAction;
use crate::result::ActionOutput;

/// Applies the approved fix: commits its files and opens the pull request.
pub struct OpenPullRequestAction {
    source_control: Arc<dyn SourceControl>,
    base_branch: String,
}

impl OpenPullRequestAction {
    pub fn new(source_control: Arc<dyn SourceControl>, base_branch: String) -> Self {
        Self {
            source_control,
            base_branch,
        }
    }
}

#[async_trait]
impl StepAction for OpenPullRequestAction {
    fn step(&self) -> &'static str {
        steps::OPEN_PR
    }

    async fn run(&self, ctx: &ActionContext) -> Result<ActionOutput, ActionError> {
        if let Some(existing) = ctx.applied(keys::PULL_REQUEST) {
            ctx.log("Pull request already opened, skipping");
            let mut output = ActionOutput::applied(keys::PULL_REQUEST, existing.clone());
            if ctx.proposals.contains_key(keys::FIX) {
                output = output.consuming(keys::FIX);
            }
            return Ok(output);
        }

        let repo = ctx.require_input_str("repo")?;
        let branch: BranchRef = ctx.require_applied(keys::BRANCH)?;
        let fix: FixProposal = ctx.require_proposal(keys::FIX)?;

        for file in &fix.files {
            let commit = self
                .source_control
                .commit_file(repo, &branch.name, file)
                .await?;
            ctx.log_with(
                format!("Committed {}", commit.path),
                serde_json::json!({ "sha": commit.sha, "branch": branch.name }),
            );
        }

        let pr = self
            .source_control
            .open_pull_request(repo, &self.base_branch, &branch.name, &fix.title, &fix.body)
            .await?;
        ctx.log_with(
            format!("Pull request #{} ready", pr.number),
            serde_json::json!({ "url": pr.url, "alreadyExisted": pr.already_existed }),
        );

        Ok(ActionOutput::applied(keys::PULL_REQUEST, serde_json::to_value(&pr)?)
            .consuming(keys::FIX))
    }
}

/// Merges the pull request once the gate is approved.
pub struct MergePullRequestAction {
    source_control: Arc<dyn SourceControl>,
}

impl MergePullRequestAction {
    pub fn new(source_control: Arc<dyn SourceControl>) -> Self {
        Self { source_control }
    }
}

#[async_trait]
impl StepAction for MergePullRequestAction {
    fn step(&self) -> &'static str {
        steps::MERGE_PR
    }

    async fn run(&self, ctx: &ActionContext) -> Result<ActionOutput, ActionError> {
        let repo = ctx.require_input_str("repo")?;
        let pr: PullRequest = ctx.require_applied(keys::PULL_REQUEST)?;

        let merge = self
            .source_control
            .merge_pull_request(repo, pr.number, &pr.title)
            .await?;
        if !merge.merged {
            return Err(ActionError::collaborator(
                "merge_pull_request",
                format!("pull request #{} not merged: {}", pr.number, merge.message),
            ));
        }

        ctx.log(format!("Merged pull request #{}", pr.number));
        Ok(ActionOutput::applied(keys::MERGE, serde_json::to_value(&merge)?))
    }
}

/// Confirms the merged pull request is reported as merged.
pub struct PostMergeCheckAction {
    source_control: Arc<dyn SourceControl>,
}

impl PostMergeCheckAction {
    pub fn new(source_control: Arc<dyn SourceControl>) -> Self {
        Self { source_control }
    }
}

#[async_trait]
impl StepAction for PostMergeCheckAction {
    fn step(&self) -> &'static str {
        steps::POST_MERGE_CHECK
    }

    async fn run(&self, ctx: &ActionContext) -> Result<ActionOutput, ActionError> {
        let repo = ctx.require_input_str("repo")?;
        let pr: PullRequest = ctx.require_applied(keys::PULL_REQUEST)?;
        let merge: MergeResult = ctx.require_applied(keys::MERGE)?;

        let state = self.source_control.pull_request_state(repo, pr.number).await?;
        if !state.merged {
            return Err(ActionError::ExecutionFailed(format!(
                "pull request #{} is {} and not merged",
                pr.number, state.state
            )));
        }

        ctx.log(format!("Verified merge of pull request #{}", pr.number));
        Ok(ActionOutput::applied(
            keys::POST_MERGE_CHECK,
            serde_json::json!({
                "merged": true,
                "state": state.state,
                "sha": merge.sha,
            }),
        ))
    }
}
