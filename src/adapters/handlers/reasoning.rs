//! Automated handler over a reasoning backend.

use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use serde_json::Value;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::domain::errors::HandlerError;
use crate::domain::models::{HandlerDescriptor, HandlerKind, Task, TaskContext, TaskResult};
use crate::domain::ports::{ReasoningBackend, TaskHandler};
use crate::services::{parse_task_specs, FilterChain};

/// Resolves tasks by prompting a reasoning backend.
///
/// The filtered answer becomes the artifact. An answer shaped as
/// `{"answer": ..., "subtasks": [...]}` also proposes subtasks.
pub struct ReasoningHandler {
    descriptor: HandlerDescriptor,
    backend: Arc<dyn ReasoningBackend>,
    filters: FilterChain,
}

impl ReasoningHandler {
    pub fn new(name: impl Into<String>, backend: Arc<dyn ReasoningBackend>) -> Self {
        Self {
            descriptor: HandlerDescriptor::new(name, HandlerKind::Reasoning),
            backend,
            filters: FilterChain::default(),
        }
    }

    #[must_use]
    pub fn with_capacity(mut self, capacity: usize) -> Self {
        self.descriptor = self.descriptor.with_capacity(capacity);
        self
    }

    #[must_use]
    pub fn with_capability(mut self, tag: impl Into<String>) -> Self {
        self.descriptor = self.descriptor.with_capability(tag);
        self
    }

    #[must_use]
    pub fn with_filters(mut self, filters: FilterChain) -> Self {
        self.filters = filters;
        self
    }

    fn build_prompt(task: &Task, context: &TaskContext) -> String {
        let mut prompt = format!("Objective: {}\n", task.objective);
        if !task.description.is_empty() {
            prompt.push_str(&format!("Details: {}\n", task.description));
        }
        if !context.goal.is_empty() && context.goal != task.objective {
            prompt.push_str(&format!("Overall goal: {}\n", context.goal));
        }
        if !context.lineage.is_empty() {
            prompt.push_str(&format!("Parent tasks: {}\n", context.lineage.join(" > ")));
        }
        if !context.artifacts.is_empty() {
            prompt.push_str("Known results:\n");
            prompt.push_str(&context.artifact_digest());
            prompt.push('\n');
        }
        if !context.knowledge.is_empty() {
            prompt.push_str(&format!(
                "Shared knowledge: {}\n",
                Value::Object(context.knowledge.clone())
            ));
        }
        prompt
    }

    fn interpret(filtered: &str, raw: &str) -> Result<TaskResult, HandlerError> {
        if let Ok(Value::Object(mut map)) = serde_json::from_str::<Value>(filtered) {
            if let Some(answer) = map.remove("answer") {
                let mut result = TaskResult::success(vec![answer]);
                if let Some(subtasks) = map.remove("subtasks") {
                    result.new_tasks = parse_task_specs(&subtasks.to_string(), raw)?;
                }
                return Ok(result);
            }
        }
        Ok(TaskResult::success(vec![Value::String(filtered.to_string())]))
    }
}

#[async_trait]
impl TaskHandler for ReasoningHandler {
    fn descriptor(&self) -> &HandlerDescriptor {
        &self.descriptor
    }

    async fn handle(
        &self,
        task: &Task,
        context: &TaskContext,
        cancel: &CancellationToken,
    ) -> Result<TaskResult, HandlerError> {
        let started = Instant::now();
        let prompt = Self::build_prompt(task, context);

        let completion = tokio::select! {
            biased;
            () = cancel.cancelled() => return Err(HandlerError::Cancelled),
            completion = self.backend.complete(&prompt) => completion?,
        };

        let filtered = self.filters.apply(&completion.text);
        if filtered.is_empty() {
            return Err(HandlerError::Transient(
                "reasoning backend returned no usable output".to_string(),
            ));
        }

        let result = Self::interpret(&filtered, &completion.text)?
            .with_tokens(completion.tokens_used)
            .with_message(format!("answered by {}", self.descriptor.name))
            .with_execution_time(started.elapsed());

        debug!(
            task_id = %task.id,
            handler = %self.descriptor.name,
            tokens = completion.tokens_used,
            proposals = result.new_tasks.len(),
            "reasoning handler finished"
        );
        Ok(result)
    }
}
