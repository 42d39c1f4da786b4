//! GitHub REST implementation of the issue tracker and source control.
//!
//! Without a token the client runs in demo mode: every operation is
//! simulated locally and results carry `simulated: true`.

use async_trait::async_trait;
use base64::Engine as _;
use chrono::Utc;
use reqwest::{Method, RequestBuilder, Response, StatusCode};
use serde::Deserialize;
use std::time::Duration;

use crate::collaborators::{
    default_branch_name, BranchRef, CommentRef, CommitRef, FileChange, IssueDetails,
    IssueReference, IssueTracker, MergeResult, PullRequest, PullRequestState, RepoContext,
    SourceControl,
};
use crate::error::ActionError;

/// Token value treated as "no token" by test setups.
const MOCK_TOKEN: &str = "mock_token_for_testing";

const DEMO_SHA: &str = "0000000000000000000000000000000000000000";

/// GitHub configuration loaded from environment variables.
///
/// Environment variables are prefixed with `GITHUB_`:
/// - `GITHUB_TOKEN`: API token (absent selects demo mode)
/// - `GITHUB_API_BASE`: API base URL (default: "https://api.github.com")
/// - `GITHUB_BASE_BRANCH`: Branch fixes are based on (default: "main")
/// - `GITHUB_TIMEOUT_SECS`: Request timeout (default: 30)
#[derive(Debug, Clone, Deserialize)]
pub struct GitHubConfig {
    #[serde(default)]
    pub token: Option<String>,

    #[serde(default = "default_api_base")]
    pub api_base: String,

    #[serde(default = "default_base_branch")]
    pub base_branch: String,

    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_api_base() -> String {
    "https://api.github.com".to_string()
}

fn default_base_branch() -> String {
    "main".to_string()
}

fn default_timeout_secs() -> u64 {
    30
}

impl GitHubConfig {
    /// Load configuration from `GITHUB_`-prefixed environment variables.
    pub fn from_env() -> Result<Self, envy::Error> {
        envy::prefixed("GITHUB_").from_env::<GitHubConfig>()
    }

    /// Whether operations are simulated.
    pub fn is_demo(&self) -> bool {
        match self.token.as_deref() {
            None => true,
            Some(token) => token.trim().is_empty() || token == MOCK_TOKEN,
        }
    }
}

impl Default for GitHubConfig {
    fn default() -> Self {
        Self {
            token: None,
            api_base: default_api_base(),
            base_branch: default_base_branch(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

/// GitHub API client.
#[derive(Debug, Clone)]
pub struct GitHubClient {
    client: reqwest::Client,
    config: GitHubConfig,
}

impl GitHubClient {
    /// Create a new client.
    pub fn new(config: GitHubConfig) -> Result<Self, ActionError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .user_agent(concat!("autopilot/", env!("CARGO_PKG_VERSION")))
            .build()?;

        if config.is_demo() {
            tracing::warn!("GITHUB_TOKEN not set, GitHub operations will be simulated");
        }

        Ok(Self { client, config })
    }

    /// Whether operations are simulated.
    pub fn is_demo(&self) -> bool {
        self.config.is_demo()
    }

    fn request(&self, method: Method, path: &str) -> RequestBuilder {
        let url = format!("{}/{}", self.config.api_base.trim_end_matches('/'), path);
        let builder = self
            .client
            .request(method, url)
            .header("Accept", "application/vnd.github+json");
        match self.config.token.as_deref() {
            Some(token) => builder.bearer_auth(token),
            None => builder,
        }
    }

    async fn json(response: Response, operation: &str) -> Result<serde_json::Value, ActionError> {
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ActionError::collaborator(
                operation,
                format!("status {}: {}", status.as_u16(), truncate(&body, 200)),
            ));
        }
        Ok(response.json().await?)
    }

    async fn find_open_pull_request(
        &self,
        repo: &str,
        head: &str,
    ) -> Result<Option<PullRequest>, ActionError> {
        let owner = repo.split('/').next().unwrap_or_default();
        let response = self
            .request(Method::GET, &format!("repos/{}/pulls", repo))
            .query(&[("head", format!("{}:{}", owner, head)), ("state", "open".to_string())])
            .send()
            .await?;
        let pulls = Self::json(response, "list_pull_requests").await?;

        Ok(pulls
            .as_array()
            .and_then(|list| list.first())
            .map(|pr| PullRequest {
                number: pr["number"].as_u64().unwrap_or_default(),
                url: str_field(pr, "html_url"),
                title: str_field(pr, "title"),
                already_existed: true,
                simulated: false,
            }))
    }
}

#[async_trait]
impl IssueTracker for GitHubClient {
    async fn fetch_issue(&self, reference: &str) -> Result<IssueDetails, ActionError> {
        let parsed = IssueReference::parse(reference)?;
        let repo = parsed.full_name();

        if self.is_demo() {
            return Ok(IssueDetails {
                id: format!("{}#{}", repo, parsed.number),
                title: format!("Demo Issue #{}", parsed.number),
                body: "This is a demo issue for testing purposes.".to_string(),
                repo,
                number: parsed.number,
                labels: vec!["demo".to_string()],
                url: reference.to_string(),
                simulated: true,
            });
        }

        let response = self
            .request(
                Method::GET,
                &format!("repos/{}/issues/{}", repo, parsed.number),
            )
            .send()
            .await?;
        let issue = Self::json(response, "fetch_issue").await?;

        let labels = issue["labels"]
            .as_array()
            .map(|labels| {
                labels
                    .iter()
                    .filter_map(|l| l["name"].as_str().map(str::to_string))
                    .collect()
            })
            .unwrap_or_default();

        Ok(IssueDetails {
            id: format!("{}#{}", repo, parsed.number),
            title: str_field(&issue, "title"),
            body: str_field(&issue, "body"),
            repo,
            number: parsed.number,
            labels,
            url: reference.to_string(),
            simulated: false,
        })
    }
}

#[async_trait]
impl SourceControl for GitHubClient {
    async fn describe_repository(&self, repo: &str) -> Result<RepoContext, ActionError> {
        if self.is_demo() {
            return Ok(RepoContext {
                full_name: repo.to_string(),
                description: None,
                default_branch: self.config.base_branch.clone(),
                languages: Vec::new(),
                topics: Vec::new(),
                simulated: true,
            });
        }

        let response = self
            .request(Method::GET, &format!("repos/{}", repo))
            .send()
            .await?;
        let info = Self::json(response, "describe_repository").await?;

        let response = self
            .request(Method::GET, &format!("repos/{}/languages", repo))
            .send()
            .await?;
        let languages = Self::json(response, "list_languages").await?;
        let mut languages: Vec<(String, u64)> = languages
            .as_object()
            .map(|m| {
                m.iter()
                    .map(|(k, v)| (k.clone(), v.as_u64().unwrap_or_default()))
                    .collect()
            })
            .unwrap_or_default();
        languages.sort_by(|a, b| b.1.cmp(&a.1));

        Ok(RepoContext {
            full_name: repo.to_string(),
            description: info["description"].as_str().map(str::to_string),
            default_branch: info["default_branch"]
                .as_str()
                .unwrap_or(&self.config.base_branch)
                .to_string(),
            languages: languages.into_iter().map(|(name, _)| name).collect(),
            topics: info["topics"]
                .as_array()
                .map(|t| t.iter().filter_map(|v| v.as_str().map(str::to_string)).collect())
                .unwrap_or_default(),
            simulated: false,
        })
    }

    async fn create_branch(
        &self,
        repo: &str,
        base: &str,
        name: Option<&str>,
    ) -> Result<BranchRef, ActionError> {
        let name = name
            .map(str::to_string)
            .unwrap_or_else(|| default_branch_name(Utc::now()));

        if self.is_demo() {
            return Ok(BranchRef {
                name,
                sha: DEMO_SHA.to_string(),
                simulated: true,
            });
        }

        let response = self
            .request(Method::GET, &format!("repos/{}/git/ref/heads/{}", repo, base))
            .send()
            .await?;
        let base_ref = Self::json(response, "get_base_branch").await?;
        let sha = base_ref["object"]["sha"]
            .as_str()
            .ok_or_else(|| ActionError::collaborator("get_base_branch", "missing object.sha"))?
            .to_string();

        let response = self
            .request(Method::POST, &format!("repos/{}/git/refs", repo))
            .json(&serde_json::json!({
                "ref": format!("refs/heads/{}", name),
                "sha": sha,
            }))
            .send()
            .await?;
        Self::json(response, "create_branch").await?;

        Ok(BranchRef {
            name,
            sha,
            simulated: false,
        })
    }

    async fn commit_file(
        &self,
        repo: &str,
        branch: &str,
        file: &FileChange,
    ) -> Result<CommitRef, ActionError> {
        if self.is_demo() {
            return Ok(CommitRef {
                path: file.path.clone(),
                sha: DEMO_SHA.to_string(),
            });
        }

        let path = format!("repos/{}/contents/{}", repo, file.path);

        // Updating an existing file requires its blob sha.
        let existing = self
            .request(Method::GET, &path)
            .query(&[("ref", branch)])
            .send()
            .await?;
        let existing_sha = if existing.status() == StatusCode::OK {
            existing
                .json::<serde_json::Value>()
                .await?
                .get("sha")
                .and_then(|v| v.as_str())
                .map(str::to_string)
        } else {
            None
        };

        let mut body = serde_json::json!({
            "message": file.message,
            "content": base64::engine::general_purpose::STANDARD.encode(file.content.as_bytes()),
            "branch": branch,
        });
        if let Some(sha) = existing_sha {
            body["sha"] = serde_json::Value::String(sha);
        }

        let response = self.request(Method::PUT, &path).json(&body).send().await?;
        let written = Self::json(response, "commit_file").await?;

        Ok(CommitRef {
            path: file.path.clone(),
            sha: str_field(&written["content"], "sha"),
        })
    }

    async fn open_pull_request(
        &self,
        repo: &str,
        base: &str,
        head: &str,
        title: &str,
        body: &str,
    ) -> Result<PullRequest, ActionError> {
        if self.is_demo() {
            let number = (Utc::now().timestamp() % 1000).unsigned_abs();
            return Ok(PullRequest {
                number,
                url: format!("https://github.com/{}/pull/{}", repo, number),
                title: title.to_string(),
                already_existed: false,
                simulated: true,
            });
        }

        let response = self
            .request(Method::POST, &format!("repos/{}/pulls", repo))
            .json(&serde_json::json!({
                "title": title,
                "body": body,
                "head": head,
                "base": base,
            }))
            .send()
            .await?;

        if response.status() == StatusCode::UNPROCESSABLE_ENTITY {
            let error = response.text().await.unwrap_or_default();
            if error.contains("already exists") {
                if let Some(existing) = self.find_open_pull_request(repo, head).await? {
                    tracing::info!(repo, number = existing.number, "Reusing existing pull request");
                    return Ok(existing);
                }
            }
            return Err(ActionError::collaborator(
                "open_pull_request",
                format!("status 422: {}", truncate(&error, 200)),
            ));
        }

        let pr = Self::json(response, "open_pull_request").await?;
        Ok(PullRequest {
            number: pr["number"].as_u64().unwrap_or_default(),
            url: str_field(&pr, "html_url"),
            title: str_field(&pr, "title"),
            already_existed: false,
            simulated: false,
        })
    }

    async fn merge_pull_request(
        &self,
        repo: &str,
        number: u64,
        commit_title: &str,
    ) -> Result<MergeResult, ActionError> {
        if self.is_demo() {
            return Ok(MergeResult {
                merged: true,
                sha: Some(DEMO_SHA.to_string()),
                message: "Pull Request successfully merged (simulated)".to_string(),
            });
        }

        let response = self
            .request(Method::PUT, &format!("repos/{}/pulls/{}/merge", repo, number))
            .json(&serde_json::json!({
                "commit_title": commit_title,
                "merge_method": "squash",
            }))
            .send()
            .await?;
        let merged = Self::json(response, "merge_pull_request").await?;

        Ok(MergeResult {
            merged: merged["merged"].as_bool().unwrap_or(false),
            sha: merged["sha"].as_str().map(str::to_string),
            message: str_field(&merged, "message"),
        })
    }

    async fn pull_request_state(
        &self,
        repo: &str,
        number: u64,
    ) -> Result<PullRequestState, ActionError> {
        if self.is_demo() {
            return Ok(PullRequestState {
                number,
                state: "closed".to_string(),
                merged: true,
            });
        }

        let response = self
            .request(Method::GET, &format!("repos/{}/pulls/{}", repo, number))
            .send()
            .await?;
        let pr = Self::json(response, "pull_request_state").await?;

        Ok(PullRequestState {
            number,
            state: str_field(&pr, "state"),
            merged: pr["merged"].as_bool().unwrap_or(false),
        })
    }

    async fn comment_on_issue(
        &self,
        repo: &str,
        number: u64,
        body: &str,
    ) -> Result<CommentRef, ActionError> {
        if self.is_demo() {
            return Ok(CommentRef { id: 0 });
        }

        let response = self
            .request(Method::POST, &format!("repos/{}/issues/{}/comments", repo, number))
            .json(&serde_json::json!({ "body": body }))
            .send()
            .await?;
        let comment = Self::json(response, "comment_on_issue").await?;

        Ok(CommentRef {
            id: comment["id"].as_u64().unwrap_or_default(),
        })
    }
}

fn str_field(value: &serde_json::Value, name: &str) -> String {
    value[name].as_str().unwrap_or_default().to_string()
}

fn truncate(s: &str, max: usize) -> &str {
    match s.char_indices().nth(max) {
        Some((idx, _)) => &s[..idx],
        None => s,
    }
}
