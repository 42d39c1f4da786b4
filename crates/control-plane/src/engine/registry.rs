//! Ordered step registry.

use std::collections::HashSet;

use autopilot_tools::actions::steps;

use super::state::StepKind;
use crate::error::AppError;

/// A named step of a workflow.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StepDefinition {
    pub name: String,
    pub kind: StepKind,
}

/// Ordered, immutable sequence of steps a run walks through.
#[derive(Debug, Clone)]
pub struct StepRegistry {
    steps: Vec<StepDefinition>,
}

impl StepRegistry {
    pub fn builder() -> StepRegistryBuilder {
        StepRegistryBuilder::default()
    }

    /// The bug-to-PR workflow.
    pub fn bug_to_pr() -> Self {
        Self {
            steps: vec![
                StepDefinition::ordinary(steps::FETCH_ISSUE),
                StepDefinition::ordinary(steps::ANALYZE_REPOSITORY),
                StepDefinition::ordinary(steps::CREATE_BRANCH),
                StepDefinition::gated(steps::PROPOSE_FIX),
                StepDefinition::ordinary(steps::OPEN_PR),
                StepDefinition::gated(steps::MERGE_PR),
                StepDefinition::ordinary(steps::POST_MERGE_CHECK),
                StepDefinition::ordinary(steps::FINALIZE),
            ],
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = &StepDefinition> {
        self.steps.iter()
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    pub fn gates(&self) -> impl Iterator<Item = &str> {
        self.steps
            .iter()
            .filter(|s| s.kind == StepKind::Gated)
            .map(|s| s.name.as_str())
    }
}

impl StepDefinition {
    pub fn ordinary(name: &str) -> Self {
        Self {
            name: name.to_string(),
            kind: StepKind::Ordinary,
        }
    }

    pub fn gated(name: &str) -> Self {
        Self {
            name: name.to_string(),
            kind: StepKind::Gated,
        }
    }
}

/// Builder for custom registries.
#[derive(Debug, Default)]
pub struct StepRegistryBuilder {
    steps: Vec<StepDefinition>,
}

impl StepRegistryBuilder {
    pub fn ordinary(mut self, name: &str) -> Self {
        self.steps.push(StepDefinition::ordinary(name));
        self
    }

    pub fn gated(mut self, name: &str) -> Self {
        self.steps.push(StepDefinition::gated(name));
        self
    }

    /// Step names must be unique and non-empty; gates are addressed by name.
    pub fn build(self) -> Result<StepRegistry, AppError> {
        let mut seen = HashSet::new();
        for step in &self.steps {
            if step.name.is_empty() {
                return Err(AppError::Config("step name must not be empty".to_string()));
            }
            if !seen.insert(step.name.as_str()) {
                return Err(AppError::Config(format!("duplicate step name '{}'", step.name)));
            }
        }
        Ok(StepRegistry { steps: self.steps })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bug_to_pr_gates() {
        let registry = StepRegistry::bug_to_pr();
        assert_eq!(registry.len(), 8);
        assert_eq!(
            registry.gates().collect::<Vec<_>>(),
            vec![steps::PROPOSE_FIX, steps::MERGE_PR]
        );
        assert_eq!(registry.iter().next().unwrap().name, steps::FETCH_ISSUE);
    }

    #[test]
    fn test_builder_rejects_duplicates() {
        let err = StepRegistry::builder()
            .ordinary("A")
            .gated("A")
            .build()
            .unwrap_err();
        assert!(matches!(err, AppError::Config(_)));
    }

    #[test]
    fn test_builder_preserves_order() {
        let registry = StepRegistry::builder()
            .ordinary("A")
            .gated("B")
            .ordinary("C")
            .build()
            .unwrap();
        let names: Vec<_> = registry.iter().map(|s| s.name.as_str()).collect();
        assert_eq!(names, vec!["A", "B", "C"]);
    }
}
