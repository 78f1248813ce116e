//! Reasoning-backed decomposer.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, warn};

use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::models::{Situation, Task};
use crate::domain::ports::{Decomposer, Decomposition, ReasoningBackend};
use crate::services::{parse_task_specs, FilterChain};

/// Asks a reasoning backend to split a task, then filters and parses the
/// reply into subtask proposals.
pub struct StructuredDecomposer {
    backend: Arc<dyn ReasoningBackend>,
    filters: FilterChain,
    max_subtasks: Option<usize>,
}

impl StructuredDecomposer {
    pub fn new(backend: Arc<dyn ReasoningBackend>) -> Self {
        Self {
            backend,
            filters: FilterChain::default(),
            max_subtasks: None,
        }
    }

    #[must_use]
    pub fn with_filters(mut self, filters: FilterChain) -> Self {
        self.filters = filters;
        self
    }

    /// Hint the backend toward at most `limit` subtasks.
    #[must_use]
    pub const fn with_max_subtasks(mut self, limit: usize) -> Self {
        self.max_subtasks = Some(limit);
        self
    }

    fn build_prompt(&self, task: &Task, situation: &Situation) -> String {
        let mut prompt = format!(
            "Decompose the objective below into independent subtasks.\nObjective: {}\n",
            task.objective
        );
        if !task.description.is_empty() {
            prompt.push_str(&format!("Details: {}\n", task.description));
        }
        prompt.push_str(&format!("Progress so far: {}\n", situation.summarize()));
        if let Some(limit) = self.max_subtasks {
            prompt.push_str(&format!("Propose at most {limit} subtasks.\n"));
        }
        prompt.push_str(
            "Reply with a JSON array of objects with fields \"objective\", \"description\", \
             optional \"priority\" (low|normal|high|critical) and optional \"requires\" \
             (list of capability tags). Reply with [] if the objective needs no split.",
        );
        prompt
    }
}

#[async_trait]
impl Decomposer for StructuredDecomposer {
    async fn decompose(&self, task: &Task, situation: &Situation) -> DomainResult<Decomposition> {
        let prompt = self.build_prompt(task, situation);
        let completion = self
            .backend
            .complete(&prompt)
            .await
            .map_err(|err| DomainError::DecompositionFailed(err.to_string()))?;

        let filtered = self.filters.apply(&completion.text);
        let subtasks = parse_task_specs(&filtered, &completion.text).inspect_err(|err| {
            warn!(task_id = %task.id, error = %err, "decomposition reply rejected");
        })?;

        debug!(task_id = %task.id, subtasks = subtasks.len(), "task decomposed");
        Ok(Decomposition {
            subtasks,
            tokens_used: completion.tokens_used,
        })
    }
}
