//! Collaborator wiring for the default workflow.

use std::sync::Arc;

use autopilot_tools::collaborators::{Collaborators, Notifier};
use autopilot_tools::fix::TemplateFixGenerator;
use autopilot_tools::github::{GitHubClient, GitHubConfig};
use autopilot_tools::notify::{LogNotifier, WebhookNotifier};

use crate::config::AppConfig;
use crate::error::{AppError, AppResult};

/// Build the GitHub-backed collaborators.
///
/// Without a GitHub token every issue and source-control call is simulated.
pub fn default_collaborators(app: &AppConfig, github: &GitHubConfig) -> AppResult<Collaborators> {
    let client = Arc::new(
        GitHubClient::new(github.clone()).map_err(|e| AppError::Config(e.to_string()))?,
    );
    let fixes =
        Arc::new(TemplateFixGenerator::new().map_err(|e| AppError::Config(e.to_string()))?);

    let notifier: Arc<dyn Notifier> = match app.notify_webhook.as_deref() {
        Some(url) => {
            Arc::new(WebhookNotifier::new(url).map_err(|e| AppError::Config(e.to_string()))?)
        }
        None => Arc::new(LogNotifier),
    };

    tracing::info!(
        demo = client.is_demo(),
        base_branch = %github.base_branch,
        webhook = app.notify_webhook.is_some(),
        "Collaborators configured"
    );

    Ok(Collaborators {
        issues: client.clone(),
        source_control: client,
        fixes,
        notifier,
        base_branch: github.base_branch.clone(),
    })
}
