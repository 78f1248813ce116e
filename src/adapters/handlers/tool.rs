//! External tool handler.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{json, Value};
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::domain::errors::HandlerError;
use crate::domain::models::{HandlerDescriptor, HandlerKind, Task, TaskContext, TaskResult};
use crate::domain::ports::{TaskHandler, ToolExecutor};
use crate::services::RetryPolicy;

/// Runs the tool named by task metadata `tool` with metadata `params`.
///
/// Transient executor failures are retried here; once retries run out the
/// error is reported as fatal so the engine does not retry it again.
pub struct ToolHandler {
    descriptor: HandlerDescriptor,
    executor: Arc<dyn ToolExecutor>,
    retry: RetryPolicy,
}

impl ToolHandler {
    pub fn new(name: impl Into<String>, executor: Arc<dyn ToolExecutor>) -> Self {
        Self {
            descriptor: HandlerDescriptor::new(name, HandlerKind::Tool),
            executor,
            retry: RetryPolicy::default(),
        }
    }

    #[must_use]
    pub const fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    #[must_use]
    pub fn with_capacity(mut self, capacity: usize) -> Self {
        self.descriptor = self.descriptor.with_capacity(capacity);
        self
    }
}

#[async_trait]
impl TaskHandler for ToolHandler {
    fn descriptor(&self) -> &HandlerDescriptor {
        &self.descriptor
    }

    fn can_handle(&self, task: &Task) -> bool {
        self.descriptor.available && task.meta_str("tool").is_some()
    }

    async fn handle(
        &self,
        task: &Task,
        _context: &TaskContext,
        cancel: &CancellationToken,
    ) -> Result<TaskResult, HandlerError> {
        let tool = task
            .meta_str("tool")
            .ok_or_else(|| HandlerError::Fatal("task names no tool".to_string()))?;
        let params = task.metadata.get("params").cloned().unwrap_or(Value::Null);
        let executor = self.executor.as_ref();

        let output = self
            .retry
            .execute(cancel, |_| executor.execute(tool, &params))
            .await
            .map_err(|err| match err {
                HandlerError::Transient(message) => {
                    HandlerError::Fatal(format!("tool {tool} kept failing: {message}"))
                }
                other => other,
            })?;

        debug!(task_id = %task.id, tool, "tool finished");
        Ok(TaskResult::success(vec![json!({ "tool": tool, "output": output })])
            .with_message(format!("ran {tool}")))
    }
}
