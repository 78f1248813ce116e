//! Task domain model.
//!
//! Tasks are discrete units of work produced by decomposing a goal.
//! They form a tree through parent links, with optional sibling dependencies.

use std::collections::{BTreeSet, HashMap};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Status of a task in the execution pipeline.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    /// Task is admitted and waiting for dispatch
    #[default]
    Pending,
    /// Task has been dispatched to a handler
    InProgress,
    /// Task result was accepted by the verifier
    Completed,
    /// Task failed (handler error, timeout, rejection, or routing failure)
    Failed,
    /// Task was cancelled by termination or a failed dependency
    Cancelled,
}

impl TaskStatus {
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::InProgress => "in_progress",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Cancelled => "cancelled",
        }
    }

    #[allow(clippy::should_implement_trait)]
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "pending" => Some(Self::Pending),
            "in_progress" | "running" => Some(Self::InProgress),
            "completed" | "complete" => Some(Self::Completed),
            "failed" => Some(Self::Failed),
            "cancelled" | "canceled" => Some(Self::Cancelled),
            _ => None,
        }
    }

    /// Check if this is a terminal state.
    pub const fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Cancelled)
    }

    /// Valid transitions from this status.
    pub fn valid_transitions(&self) -> Vec<Self> {
        match self {
            Self::Pending => vec![Self::InProgress, Self::Failed, Self::Cancelled],
            Self::InProgress => vec![Self::Completed, Self::Failed, Self::Cancelled],
            Self::Completed | Self::Failed | Self::Cancelled => vec![],
        }
    }

    pub fn can_transition_to(&self, new_status: Self) -> bool {
        self.valid_transitions().contains(&new_status)
    }
}

impl std::fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Priority level for tasks.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskPriority {
    Low = 1,
    #[default]
    Normal = 2,
    High = 3,
    Critical = 4,
}

impl TaskPriority {
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::Normal => "normal",
            Self::High => "high",
            Self::Critical => "critical",
        }
    }

    #[allow(clippy::should_implement_trait)]
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "low" | "1" => Some(Self::Low),
            "normal" | "medium" | "2" => Some(Self::Normal),
            "high" | "3" => Some(Self::High),
            "critical" | "4" => Some(Self::Critical),
            _ => None,
        }
    }
}

/// A proposed task, as emitted by decomposition or by a handler's `new_tasks`.
///
/// The engine turns a proposal into a [`Task`] under the producing task.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TaskSpec {
    /// Short goal label
    pub objective: String,
    /// Execution context for the handler
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub priority: TaskPriority,
    /// Capability tags a handler must carry
    #[serde(default, alias = "requires")]
    pub required_tags: BTreeSet<String>,
    #[serde(default)]
    pub depends_on: BTreeSet<Uuid>,
    #[serde(default)]
    pub metadata: HashMap<String, serde_json::Value>,
}

impl TaskSpec {
    pub fn new(objective: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            objective: objective.into(),
            description: description.into(),
            ..Default::default()
        }
    }

    pub const fn with_priority(mut self, priority: TaskPriority) -> Self {
        self.priority = priority;
        self
    }

    pub fn with_tag(mut self, tag: impl Into<String>) -> Self {
        self.required_tags.insert(tag.into());
        self
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.metadata.insert(key.into(), value);
        self
    }
}

/// A unit of work tracked by the execution tree.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Task {
    /// Unique identifier
    pub id: Uuid,
    /// Short goal label
    pub objective: String,
    /// Execution context for the handler
    pub description: String,
    /// Current lifecycle status
    pub status: TaskStatus,
    pub priority: TaskPriority,
    /// Parent task, `None` for the root
    pub parent_id: Option<Uuid>,
    /// Tasks that must complete before this one may run
    pub depends_on: BTreeSet<Uuid>,
    /// Capability tags a handler must carry
    pub required_tags: BTreeSet<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    /// Free-form metadata (`human_review`, `decompose`, `tool`, `query`, ...)
    pub metadata: HashMap<String, serde_json::Value>,
}

impl Task {
    /// Create a root task for a goal.
    pub fn new(objective: impl Into<String>, description: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            objective: objective.into(),
            description: description.into(),
            status: TaskStatus::Pending,
            priority: TaskPriority::Normal,
            parent_id: None,
            depends_on: BTreeSet::new(),
            required_tags: BTreeSet::new(),
            created_at: now,
            updated_at: now,
            metadata: HashMap::new(),
        }
    }

    /// Materialize a proposal as a child of `parent_id`.
    pub fn from_spec(spec: TaskSpec, parent_id: Uuid) -> Self {
        let mut task = Self::new(spec.objective, spec.description);
        task.parent_id = Some(parent_id);
        task.priority = spec.priority;
        task.required_tags = spec.required_tags;
        task.depends_on = spec.depends_on;
        task.metadata = spec.metadata;
        task
    }

    pub const fn with_priority(mut self, priority: TaskPriority) -> Self {
        self.priority = priority;
        self
    }

    pub const fn with_parent(mut self, parent_id: Uuid) -> Self {
        self.parent_id = Some(parent_id);
        self
    }

    pub fn with_dependency(mut self, dependency: Uuid) -> Self {
        self.depends_on.insert(dependency);
        self
    }

    pub fn with_tag(mut self, tag: impl Into<String>) -> Self {
        self.required_tags.insert(tag.into());
        self
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.metadata.insert(key.into(), value);
        self
    }

    pub const fn is_root(&self) -> bool {
        self.parent_id.is_none()
    }

    /// Metadata flag lookup, `false` when absent or not a boolean.
    pub fn flag(&self, key: &str) -> bool {
        self.metadata
            .get(key)
            .and_then(serde_json::Value::as_bool)
            .unwrap_or(false)
    }

    /// Metadata string lookup.
    pub fn meta_str(&self, key: &str) -> Option<&str> {
        self.metadata.get(key).and_then(serde_json::Value::as_str)
    }

    /// Whether the task asks for a human reviewer.
    pub fn wants_human_review(&self) -> bool {
        self.priority == TaskPriority::Critical || self.flag("human_review")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_round_trip_names() {
        for status in [
            TaskStatus::Pending,
            TaskStatus::InProgress,
            TaskStatus::Completed,
            TaskStatus::Failed,
            TaskStatus::Cancelled,
        ] {
            assert_eq!(TaskStatus::from_str(status.as_str()), Some(status));
        }
        assert_eq!(TaskStatus::from_str("canceled"), Some(TaskStatus::Cancelled));
        assert_eq!(TaskStatus::from_str("bogus"), None);
    }

    #[test]
    fn test_terminal_states_have_no_exits() {
        for status in [TaskStatus::Completed, TaskStatus::Failed, TaskStatus::Cancelled] {
            assert!(status.is_terminal());
            assert!(status.valid_transitions().is_empty());
        }
        assert!(TaskStatus::Pending.can_transition_to(TaskStatus::InProgress));
        assert!(!TaskStatus::Pending.can_transition_to(TaskStatus::Completed));
        assert!(TaskStatus::InProgress.can_transition_to(TaskStatus::Completed));
    }

    #[test]
    fn test_priority_ordering() {
        assert!(TaskPriority::Low < TaskPriority::Normal);
        assert!(TaskPriority::Normal < TaskPriority::High);
        assert!(TaskPriority::High < TaskPriority::Critical);
        assert_eq!(TaskPriority::Critical as u8, 4);
    }

    #[test]
    fn test_from_spec_sets_lineage() {
        let parent = Task::new("goal", "the goal");
        let spec = TaskSpec::new("sub", "do part")
            .with_priority(TaskPriority::High)
            .with_tag("tool");
        let child = Task::from_spec(spec, parent.id);

        assert_eq!(child.parent_id, Some(parent.id));
        assert_eq!(child.priority, TaskPriority::High);
        assert!(child.required_tags.contains("tool"));
        assert_eq!(child.status, TaskStatus::Pending);
    }

    #[test]
    fn test_human_review_request() {
        let critical = Task::new("a", "b").with_priority(TaskPriority::Critical);
        assert!(critical.wants_human_review());

        let flagged = Task::new("a", "b").with_metadata("human_review", serde_json::json!(true));
        assert!(flagged.wants_human_review());

        assert!(!Task::new("a", "b").wants_human_review());
    }

    #[test]
    fn test_spec_accepts_requires_alias() {
        let spec: TaskSpec =
            serde_json::from_str(r#"{"objective":"x","requires":["search"]}"#).unwrap();
        assert!(spec.required_tags.contains("search"));
        assert_eq!(spec.priority, TaskPriority::Normal);
    }
}
