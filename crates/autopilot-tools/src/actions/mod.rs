//! Bound actions of the default bug-to-PR workflow.
//!
//! Each action reads what earlier steps applied, calls one collaborator,
//! and returns the result under a well-known context key.

mod finalize;
mod fix;
mod issue;
mod pull_request;
mod repository;

pub use finalize::FinalizeAction;
pub use fix::ProposeFixAction;
pub use issue::FetchIssueAction;
pub use pull_request::{MergePullRequestAction, OpenPullRequestAction, PostMergeCheckAction};
pub use repository::{AnalyzeRepositoryAction, CreateBranchAction};

use crate::collaborators::Collaborators;
use crate::registry::ActionRegistry;

/// Step names of the default workflow.
pub mod steps {
    pub const FETCH_ISSUE: &str = "fetch-issue-details";
    pub const ANALYZE_REPOSITORY: &str = "analyze-repository";
    pub const CREATE_BRANCH: &str = "create-branch";
    pub const PROPOSE_FIX: &str = "propose-fix";
    pub const OPEN_PR: &str = "open-pr";
    pub const MERGE_PR: &str = "merge-pr";
    pub const POST_MERGE_CHECK: &str = "post-merge-check";
    pub const FINALIZE: &str = "finalize";
}

/// Context keys written by the default workflow.
pub mod keys {
    pub const ISSUE: &str = "issue";
    pub const REPOSITORY: &str = "repository";
    pub const BRANCH: &str = "branch";
    /// Proposal key; consumed by `open-pr`.
    pub const FIX: &str = "fix";
    pub const PULL_REQUEST: &str = "pullRequest";
    pub const MERGE: &str = "merge";
    pub const POST_MERGE_CHECK: &str = "postMergeCheck";
    pub const FINALIZED: &str = "finalized";
}

/// Run input fields the default workflow requires.
pub const REQUIRED_INPUTS: &[&str] = &["issueUrl", "repo"];

/// Create a registry with every default workflow action bound.
pub fn create_default_registry(collaborators: &Collaborators) -> ActionRegistry {
    let mut registry = ActionRegistry::new();

    registry.register(FetchIssueAction::new(collaborators.issues.clone()));
    registry.register(AnalyzeRepositoryAction::new(
        collaborators.source_control.clone(),
    ));
    registry.register(CreateBranchAction::new(
        collaborators.source_control.clone(),
        collaborators.base_branch.clone(),
    ));
    registry.register(ProposeFixAction::new(collaborators.fixes.clone()));
    registry.register(OpenPullRequestAction::new(
        collaborators.source_control.clone(),
        collaborators.base_branch.clone(),
    ));
    registry.register(MergePullRequestAction::new(
        collaborators.source_control.clone(),
    ));
    registry.register(PostMergeCheckAction::new(
        collaborators.source_control.clone(),
    ));
    registry.register(FinalizeAction::new(
        collaborators.source_control.clone(),
        collaborators.notifier.clone(),
    ));

    registry
}
