//! Step action registry and dispatch.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;

use crate::context::ActionContext;
use crate::error::ActionError;
use crate::result::ActionOutput;

/// Side-effecting operation bound to a workflow step.
#[async_trait]
pub trait StepAction: Send + Sync {
    /// Returns the name of the step this action is bound to.
    fn step(&self) -> &'static str;

    /// Execute the action against a read-only view of the run.
    async fn run(&self, ctx: &ActionContext) -> Result<ActionOutput, ActionError>;
}

/// Registry mapping step names to their bound actions.
///
/// Adding a step to a workflow means registering one more action here;
/// the executor never branches on step names.
#[derive(Clone)]
pub struct ActionRegistry {
    actions: HashMap<String, Arc<dyn StepAction>>,
}

impl ActionRegistry {
    /// Create a new empty action registry.
    pub fn new() -> Self {
        Self {
            actions: HashMap::new(),
        }
    }

    /// Register an action under the step it declares.
    pub fn register<A: StepAction + 'static>(&mut self, action: A) {
        let step = action.step().to_string();
        self.actions.insert(step, Arc::new(action));
    }

    /// Register an already shared action.
    pub fn register_arc(&mut self, action: Arc<dyn StepAction>) {
        self.actions.insert(action.step().to_string(), action);
    }

    /// Get the action bound to a step.
    pub fn get(&self, step: &str) -> Option<Arc<dyn StepAction>> {
        self.actions.get(step).cloned()
    }

    /// Check if a step has a bound action.
    pub fn has(&self, step: &str) -> bool {
        self.actions.contains_key(step)
    }

    /// List all bound step names.
    pub fn list(&self) -> Vec<&str> {
        let mut steps: Vec<&str> = self.actions.keys().map(|s| s.as_str()).collect();
        steps.sort_unstable();
        steps
    }

    /// Execute the action bound to a step.
    pub async fn execute(
        &self,
        step: &str,
        ctx: &ActionContext,
    ) -> Result<ActionOutput, ActionError> {
        let action = self
            .get(step)
            .ok_or_else(|| ActionError::NotFound(step.to_string()))?;
        action.run(ctx).await
    }
}

impl Default for ActionRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for ActionRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ActionRegistry")
            .field("actions", &self.list())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct MockAction;

    #[async_trait]
    impl StepAction for MockAction {
        fn step(&self) -> &'static str {
            "mock"
        }

        async fn run(&self, ctx: &ActionContext) -> Result<ActionOutput, ActionError> {
            Ok(ActionOutput::applied("seen", serde_json::json!(ctx.step)))
        }
    }

    #[test]
    fn test_registry_new() {
        let registry = ActionRegistry::new();
        assert!(registry.list().is_empty());
    }

    #[test]
    fn test_registry_register() {
        let mut registry = ActionRegistry::new();
        registry.register(MockAction);

        assert!(registry.has("mock"));
        assert!(!registry.has("unknown"));
        assert_eq!(registry.list(), vec!["mock"]);
    }

    #[tokio::test]
    async fn test_registry_execute() {
        let mut registry = ActionRegistry::new();
        registry.register(MockAction);

        let ctx = ActionContext::new("run-1", "mock");
        let output = registry.execute("mock", &ctx).await.unwrap();
        assert_eq!(output.applied.get("seen"), Some(&serde_json::json!("mock")));
    }

    #[tokio::test]
    async fn test_registry_execute_not_found() {
        let registry = ActionRegistry::new();
        let ctx = ActionContext::new("run-1", "unknown");
        let result = registry.execute("unknown", &ctx).await;
        assert!(matches!(result, Err(ActionError::NotFound(_))));
    }
}
