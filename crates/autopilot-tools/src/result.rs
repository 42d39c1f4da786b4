//! Step action result types.

use serde::{Deserialize, Serialize};

use crate::context::ContextMap;

/// Result of a successful step action.
///
/// Applied results and proposals are kept apart so that a proposal is
/// never mistaken for an effect that already happened. An action that
/// applies a proposal lists it in `consumed`; the engine removes it in
/// the same merge that records the applied result.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ActionOutput {
    /// Side-effect results to merge into the run context.
    #[serde(default, skip_serializing_if = "ContextMap::is_empty")]
    pub applied: ContextMap,

    /// Proposals to record for a later step.
    #[serde(default, skip_serializing_if = "ContextMap::is_empty")]
    pub proposed: ContextMap,

    /// Proposal keys that this action applied.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub consumed: Vec<String>,
}

impl ActionOutput {
    /// An output that changes nothing.
    pub fn empty() -> Self {
        Self::default()
    }

    /// An output with a single applied result.
    pub fn applied(key: impl Into<String>, value: serde_json::Value) -> Self {
        Self::empty().with_applied(key, value)
    }

    /// An output with a single proposal.
    pub fn proposed(key: impl Into<String>, value: serde_json::Value) -> Self {
        Self::empty().with_proposed(key, value)
    }

    /// Add an applied result.
    pub fn with_applied(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.applied.insert(key.into(), value);
        self
    }

    /// Add a proposal.
    pub fn with_proposed(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.proposed.insert(key.into(), value);
        self
    }

    /// Mark a proposal as applied.
    pub fn consuming(mut self, key: impl Into<String>) -> Self {
        self.consumed.push(key.into());
        self
    }

    /// Returns true if the output carries no changes.
    pub fn is_empty(&self) -> bool {
        self.applied.is_empty() && self.proposed.is_empty() && self.consumed.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_output_builders() {
        let output = ActionOutput::applied("branch", serde_json::json!("bugfix/a"))
            .with_proposed("fix", serde_json::json!({"files": []}))
            .consuming("draft");

        assert_eq!(output.applied.get("branch"), Some(&serde_json::json!("bugfix/a")));
        assert!(output.proposed.contains_key("fix"));
        assert_eq!(output.consumed, vec!["draft".to_string()]);
        assert!(!output.is_empty());
        assert!(ActionOutput::empty().is_empty());
    }

    #[test]
    fn test_output_serialization_skips_empty() {
        let output = ActionOutput::proposed("fix", serde_json::json!(1));
        let json = serde_json::to_string(&output).unwrap();
        assert!(json.contains("\"proposed\""));
        assert!(!json.contains("\"applied\""));
        assert!(!json.contains("\"consumed\""));
    }
}
