//! Search handler.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::json;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::domain::errors::HandlerError;
use crate::domain::models::{
    HandlerDescriptor, HandlerKind, Task, TaskContext, TaskResult, TAG_SEARCH,
};
use crate::domain::ports::{SearchProvider, TaskHandler};

const DEFAULT_LIMIT: usize = 5;

/// Answers a task with search hits for metadata `query`, or the objective.
///
/// Only takes tasks that require the `search` tag or carry a `query`.
pub struct SearchHandler {
    descriptor: HandlerDescriptor,
    provider: Arc<dyn SearchProvider>,
    limit: usize,
}

impl SearchHandler {
    pub fn new(name: impl Into<String>, provider: Arc<dyn SearchProvider>) -> Self {
        Self {
            descriptor: HandlerDescriptor::new(name, HandlerKind::Search),
            provider,
            limit: DEFAULT_LIMIT,
        }
    }

    #[must_use]
    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = limit.max(1);
        self
    }

    #[must_use]
    pub fn with_capacity(mut self, capacity: usize) -> Self {
        self.descriptor = self.descriptor.with_capacity(capacity);
        self
    }
}

#[async_trait]
impl TaskHandler for SearchHandler {
    fn descriptor(&self) -> &HandlerDescriptor {
        &self.descriptor
    }

    fn can_handle(&self, task: &Task) -> bool {
        self.descriptor.available
            && (task.required_tags.contains(TAG_SEARCH) || task.meta_str("query").is_some())
    }

    async fn handle(
        &self,
        task: &Task,
        _context: &TaskContext,
        cancel: &CancellationToken,
    ) -> Result<TaskResult, HandlerError> {
        let query = task.meta_str("query").unwrap_or(&task.objective);

        let hits = tokio::select! {
            biased;
            () = cancel.cancelled() => return Err(HandlerError::Cancelled),
            hits = self.provider.search(query, self.limit) => hits?,
        };
        debug!(task_id = %task.id, query, hits = hits.len(), "search finished");

        if hits.is_empty() {
            return Ok(TaskResult::failure(format!("no results for \"{query}\"")));
        }

        let artifacts = hits
            .into_iter()
            .map(|hit| json!({ "title": hit.title, "url": hit.url, "snippet": hit.snippet }))
            .collect();
        Ok(TaskResult::success(artifacts).with_message(format!("searched \"{query}\"")))
    }
}
