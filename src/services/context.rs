//! Builds the context snapshot each handler invocation receives.

use crate::domain::models::report::ArtifactRecord;
use crate::domain::models::{ContextSharing, ExecutionTree, Situation, Task, TaskContext, TaskResult};

/// Assembles [`TaskContext`] values according to the sharing mode.
#[derive(Debug, Clone, Copy)]
pub struct ContextBuilder {
    mode: ContextSharing,
}

impl ContextBuilder {
    pub const fn new(mode: ContextSharing) -> Self {
        Self { mode }
    }

    pub fn build(
        &self,
        task: &Task,
        tree: &ExecutionTree,
        artifacts: &[ArtifactRecord],
        knowledge: &serde_json::Map<String, serde_json::Value>,
        situation: &Situation,
    ) -> TaskContext {
        let ancestors = tree.ancestors(task.id);
        let goal = ancestors
            .last()
            .and_then(|root| tree.get(*root))
            .map_or_else(|| task.objective.clone(), |root| root.objective.clone());

        let mut context = TaskContext {
            mode: self.mode,
            goal,
            situation: situation.clone(),
            ..Default::default()
        };

        match self.mode {
            ContextSharing::Isolated => {}
            ContextSharing::Hierarchical => {
                context.lineage = ancestors
                    .iter()
                    .filter_map(|id| tree.get(*id))
                    .map(|t| t.objective.clone())
                    .collect();
                context.artifacts = artifacts
                    .iter()
                    .filter(|record| ancestors.contains(&record.task_id))
                    .cloned()
                    .collect();
            }
            ContextSharing::Shared => {
                context.lineage = ancestors
                    .iter()
                    .filter_map(|id| tree.get(*id))
                    .map(|t| t.objective.clone())
                    .collect();
                context.artifacts = artifacts.to_vec();
                context.knowledge = knowledge.clone();
            }
        }

        context
    }
}

/// Fold a result's `knowledge` metadata object into the shared map.
/// Later entries overwrite earlier ones key by key.
pub fn merge_knowledge(
    knowledge: &mut serde_json::Map<String, serde_json::Value>,
    result: &TaskResult,
) {
    if let Some(serde_json::Value::Object(entries)) = result.metadata.get("knowledge") {
        for (key, value) in entries {
            knowledge.insert(key.clone(), value.clone());
        }
    }
}
