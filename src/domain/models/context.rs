//! Context handed to a handler alongside its task.

use serde::{Deserialize, Serialize};

use super::config::ContextSharing;
use super::report::ArtifactRecord;
use super::situation::Situation;

/// Immutable snapshot of what a handler may see beyond its own task.
///
/// Built by the engine's control loop before dispatch; what it contains
/// depends on the configured [`ContextSharing`] mode.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TaskContext {
    pub mode: ContextSharing,
    /// Objective of the root task
    pub goal: String,
    /// Objectives of the task's ancestors, parent first
    pub lineage: Vec<String>,
    /// Artifacts visible under `mode`
    pub artifacts: Vec<ArtifactRecord>,
    /// Merged `knowledge` entries from earlier results (shared mode only)
    pub knowledge: serde_json::Map<String, serde_json::Value>,
    pub situation: Situation,
}

impl TaskContext {
    /// Context that carries nothing but the goal.
    pub fn isolated(goal: impl Into<String>) -> Self {
        Self {
            mode: ContextSharing::Isolated,
            goal: goal.into(),
            ..Default::default()
        }
    }

    /// Render visible artifacts as prompt-ready text, one per line.
    pub fn artifact_digest(&self) -> String {
        self.artifacts
            .iter()
            .map(|record| match &record.value {
                serde_json::Value::String(s) => format!("- {s}"),
                other => format!("- {other}"),
            })
            .collect::<Vec<_>>()
            .join("\n")
    }
}
