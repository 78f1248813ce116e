//! Task results returned by handlers.

use std::collections::HashMap;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::task::TaskSpec;

/// Outcome of a single handler invocation.
///
/// A result with `success == false` always carries a non-empty `error`;
/// the constructors guarantee it and [`TaskResult::is_well_formed`] checks it.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TaskResult {
    pub success: bool,
    /// Produced artifacts, in order
    #[serde(default)]
    pub artifacts: Vec<serde_json::Value>,
    /// Follow-up tasks proposed by the handler
    #[serde(default)]
    pub new_tasks: Vec<TaskSpec>,
    /// Human-readable notes
    #[serde(default)]
    pub messages: Vec<String>,
    #[serde(default)]
    pub metadata: HashMap<String, serde_json::Value>,
    /// Wall-clock time spent in the handler
    #[serde(default)]
    pub execution_time: Duration,
    #[serde(default)]
    pub error: Option<String>,
    /// Tokens (or equivalent resource units) consumed
    #[serde(default)]
    pub tokens_used: u64,
}

impl TaskResult {
    /// Successful result with the given artifacts.
    pub fn success(artifacts: Vec<serde_json::Value>) -> Self {
        Self {
            success: true,
            artifacts,
            ..Default::default()
        }
    }

    /// Failed result. An empty message is replaced so the error is never blank.
    pub fn failure(error: impl Into<String>) -> Self {
        let mut error = error.into();
        if error.trim().is_empty() {
            error = "unspecified handler error".to_string();
        }
        Self {
            success: false,
            error: Some(error),
            ..Default::default()
        }
    }

    pub fn with_artifact(mut self, artifact: serde_json::Value) -> Self {
        self.artifacts.push(artifact);
        self
    }

    pub fn with_new_task(mut self, spec: TaskSpec) -> Self {
        self.new_tasks.push(spec);
        self
    }

    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.messages.push(message.into());
        self
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.metadata.insert(key.into(), value);
        self
    }

    pub const fn with_tokens(mut self, tokens: u64) -> Self {
        self.tokens_used = tokens;
        self
    }

    pub const fn with_execution_time(mut self, elapsed: Duration) -> Self {
        self.execution_time = elapsed;
        self
    }

    /// Failed results must explain themselves.
    pub fn is_well_formed(&self) -> bool {
        self.success || self.error.as_deref().is_some_and(|e| !e.trim().is_empty())
    }

    /// Whether the handler produced anything the run can use.
    pub fn has_output(&self) -> bool {
        !self.artifacts.is_empty() || !self.new_tasks.is_empty()
    }

    /// Result lists a decomposition rather than work done on the task.
    pub fn is_plan(&self) -> bool {
        self.metadata
            .get("plan")
            .and_then(serde_json::Value::as_bool)
            .unwrap_or(false)
    }

    /// Result was produced by escalating an unanswered human review.
    pub fn is_escalation(&self) -> bool {
        self.metadata
            .get("escalated")
            .and_then(serde_json::Value::as_bool)
            .unwrap_or(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_failure_always_has_error() {
        let result = TaskResult::failure("");
        assert!(!result.success);
        assert!(result.is_well_formed());
        assert_eq!(result.error.as_deref(), Some("unspecified handler error"));
    }

    #[test]
    fn test_hand_built_failure_without_error_is_malformed() {
        let result = TaskResult::default();
        assert!(!result.is_well_formed());
    }

    #[test]
    fn test_has_output() {
        assert!(!TaskResult::success(vec![]).has_output());
        assert!(TaskResult::success(vec![json!("x")]).has_output());
        assert!(TaskResult::success(vec![])
            .with_new_task(TaskSpec::new("next", ""))
            .has_output());
    }

    #[test]
    fn test_escalation_flag() {
        let result = TaskResult::success(vec![]).with_metadata("escalated", json!(true));
        assert!(result.is_escalation());
        assert!(!TaskResult::success(vec![]).is_escalation());
    }
}
