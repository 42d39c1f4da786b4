//! Interfaces of the external systems step actions talk to.
//!
//! The engine treats every collaborator as an opaque side-effecting
//! operation. Implementations live in [`crate::github`], [`crate::fix`]
//! and [`crate::notify`]; tests substitute their own.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::error::ActionError;

/// Parsed `https://github.com/<owner>/<repo>/issues/<number>` reference.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IssueReference {
    pub owner: String,
    pub repo: String,
    pub number: u64,
}

impl IssueReference {
    /// Parse an issue URL.
    pub fn parse(url: &str) -> Result<Self, ActionError> {
        let invalid = || ActionError::ExecutionFailed(format!("Invalid GitHub issue URL: {}", url));

        let path = url
            .trim_end_matches('/')
            .strip_prefix("https://github.com/")
            .or_else(|| url.strip_prefix("http://github.com/"))
            .ok_or_else(invalid)?;

        let parts: Vec<&str> = path.split('/').collect();
        match parts.as_slice() {
            [owner, repo, "issues", number, ..] if !owner.is_empty() && !repo.is_empty() => {
                let number = number.parse().map_err(|_| invalid())?;
                Ok(Self {
                    owner: owner.to_string(),
                    repo: repo.to_string(),
                    number,
                })
            }
            _ => Err(invalid()),
        }
    }

    /// `owner/repo` form.
    pub fn full_name(&self) -> String {
        format!("{}/{}", self.owner, self.repo)
    }
}

/// Issue fetched from the tracker.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IssueDetails {
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub body: String,
    pub repo: String,
    pub number: u64,
    #[serde(default)]
    pub labels: Vec<String>,
    pub url: String,
    #[serde(default)]
    pub simulated: bool,
}

/// Repository facts used as context for fix generation.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RepoContext {
    pub full_name: String,
    #[serde(default)]
    pub description: Option<String>,
    pub default_branch: String,
    #[serde(default)]
    pub languages: Vec<String>,
    #[serde(default)]
    pub topics: Vec<String>,
    #[serde(default)]
    pub simulated: bool,
}

/// Branch created for a fix.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BranchRef {
    pub name: String,
    pub sha: String,
    #[serde(default)]
    pub simulated: bool,
}

/// A single file written by a fix.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileChange {
    pub path: String,
    pub content: String,
    pub message: String,
}

/// Proposed fix awaiting approval and application.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FixProposal {
    pub files: Vec<FileChange>,
    pub title: String,
    pub body: String,
    pub kind: String,
}

/// Commit produced by writing a file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CommitRef {
    pub path: String,
    pub sha: String,
}

/// Pull request opened for a fix.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PullRequest {
    pub number: u64,
    pub url: String,
    pub title: String,
    #[serde(default)]
    pub already_existed: bool,
    #[serde(default)]
    pub simulated: bool,
}

/// Outcome of a merge request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MergeResult {
    pub merged: bool,
    #[serde(default)]
    pub sha: Option<String>,
    pub message: String,
}

/// Current state of a pull request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PullRequestState {
    pub number: u64,
    pub state: String,
    pub merged: bool,
}

/// Comment posted on an issue.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CommentRef {
    pub id: u64,
}

/// Issue retrieval.
#[async_trait]
pub trait IssueTracker: Send + Sync {
    async fn fetch_issue(&self, reference: &str) -> Result<IssueDetails, ActionError>;
}

/// Source-control operations.
#[async_trait]
pub trait SourceControl: Send + Sync {
    async fn describe_repository(&self, repo: &str) -> Result<RepoContext, ActionError>;

    /// Create `name`, or a generated `bugfix/auto-fix-*` branch, from `base`.
    async fn create_branch(
        &self,
        repo: &str,
        base: &str,
        name: Option<&str>,
    ) -> Result<BranchRef, ActionError>;

    async fn commit_file(
        &self,
        repo: &str,
        branch: &str,
        file: &FileChange,
    ) -> Result<CommitRef, ActionError>;

    async fn open_pull_request(
        &self,
        repo: &str,
        base: &str,
        head: &str,
        title: &str,
        body: &str,
    ) -> Result<PullRequest, ActionError>;

    async fn merge_pull_request(
        &self,
        repo: &str,
        number: u64,
        commit_title: &str,
    ) -> Result<MergeResult, ActionError>;

    async fn pull_request_state(
        &self,
        repo: &str,
        number: u64,
    ) -> Result<PullRequestState, ActionError>;

    async fn comment_on_issue(
        &self,
        repo: &str,
        number: u64,
        body: &str,
    ) -> Result<CommentRef, ActionError>;
}

/// Fix content generation.
#[async_trait]
pub trait FixGenerator: Send + Sync {
    async fn generate(
        &self,
        issue: &IssueDetails,
        repo: &RepoContext,
    ) -> Result<FixProposal, ActionError>;
}

/// Best-effort notification dispatch.
///
/// Callers log a returned error and carry on.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify(&self, channel: &str, payload: &serde_json::Value) -> Result<(), ActionError>;
}

/// The set of collaborators the default workflow actions use.
#[derive(Clone)]
pub struct Collaborators {
    pub issues: Arc<dyn IssueTracker>,
    pub source_control: Arc<dyn SourceControl>,
    pub fixes: Arc<dyn FixGenerator>,
    pub notifier: Arc<dyn Notifier>,
    /// Branch pull requests target.
    pub base_branch: String,
}

/// Branch name used when the caller does not pick one.
pub fn default_branch_name(now: DateTime<Utc>) -> String {
    format!("bugfix/auto-fix-{}", now.format("%Y%m%d_%H%M%S"))
}
