//! Step action error types.

use thiserror::Error;

/// Errors raised by a step action or one of its collaborators.
///
/// Any of these is terminal for the run that executed the action;
/// the engine records it as the failed step's error and never retries.
#[derive(Debug, Error)]
pub enum ActionError {
    /// No action is bound to the step.
    #[error("No action bound to step: {0}")]
    NotFound(String),

    /// Action execution failed.
    #[error("Execution failed: {0}")]
    ExecutionFailed(String),

    /// Configuration error.
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Template rendering error.
    #[error("Template error: {0}")]
    Template(String),

    /// HTTP request error.
    #[error("HTTP error: {0}")]
    Http(String),

    /// JSON serialization/deserialization error.
    #[error("JSON error: {0}")]
    Json(String),

    /// A collaborator reported an unsuccessful operation.
    #[error("{operation} failed: {message}")]
    Collaborator { operation: String, message: String },

    /// Data an earlier step should have produced is absent.
    #[error("Missing context entry '{0}'")]
    MissingContext(String),
}

impl ActionError {
    /// Build a collaborator failure for the named operation.
    pub fn collaborator(operation: impl Into<String>, message: impl Into<String>) -> Self {
        ActionError::Collaborator {
            operation: operation.into(),
            message: message.into(),
        }
    }
}

impl From<serde_json::Error> for ActionError {
    fn from(e: serde_json::Error) -> Self {
        ActionError::Json(e.to_string())
    }
}

impl From<reqwest::Error> for ActionError {
    fn from(e: reqwest::Error) -> Self {
        ActionError::Http(e.to_string())
    }
}

impl From<minijinja::Error> for ActionError {
    fn from(e: minijinja::Error) -> Self {
        ActionError::Template(e.to_string())
    }
}

impl From<envy::Error> for ActionError {
    fn from(e: envy::Error) -> Self {
        ActionError::Configuration(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = ActionError::NotFound("open-pr".to_string());
        assert_eq!(err.to_string(), "No action bound to step: open-pr");

        let err = ActionError::collaborator("create_branch", "status 404");
        assert_eq!(err.to_string(), "create_branch failed: status 404");
    }

    #[test]
    fn test_error_from_json() {
        let json_err = serde_json::from_str::<serde_json::Value>("{").unwrap_err();
        let err: ActionError = json_err.into();
        assert!(matches!(err, ActionError::Json(_)));
    }
}
