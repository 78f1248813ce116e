//! Human-in-the-loop handler.

use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use serde_json::json;
use tokio::time::{interval, sleep, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::domain::errors::HandlerError;
use crate::domain::models::{
    HandlerDescriptor, HandlerKind, HumanConfig, Task, TaskContext, TaskResult,
};
use crate::domain::ports::{HumanChannel, TaskHandler};

/// Routes a task to a human reviewer and waits for the answer.
///
/// The reviewer is notified once, then polled every `poll_interval_ms`.
/// With escalation enabled, an unanswered review resolves after
/// `escalation_timeout_secs` as a successful result flagged `escalated`;
/// otherwise the wait ends after `max_wait_secs` with a timeout error.
pub struct HumanHandler {
    descriptor: HandlerDescriptor,
    human_id: String,
    channel: Arc<dyn HumanChannel>,
    config: HumanConfig,
}

impl HumanHandler {
    pub fn new(
        name: impl Into<String>,
        human_id: impl Into<String>,
        channel: Arc<dyn HumanChannel>,
        config: HumanConfig,
    ) -> Self {
        Self {
            descriptor: HandlerDescriptor::new(name, HandlerKind::Human),
            human_id: human_id.into(),
            channel,
            config,
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

    fn wait_limit(&self) -> Duration {
        let max_wait = Duration::from_secs(self.config.max_wait_secs);
        if self.config.escalation_enabled {
            Duration::from_secs(self.config.escalation_timeout_secs).min(max_wait)
        } else {
            max_wait
        }
    }

    fn escalation(&self, task: &Task, waited: Duration) -> TaskResult {
        TaskResult::success(vec![json!({
            "escalated": true,
            "task_id": task.id,
            "reviewer": self.human_id,
            "reason": format!("no response within {}s", waited.as_secs()),
        })])
        .with_metadata("escalated", json!(true))
        .with_message(format!("review by {} escalated", self.human_id))
    }
}

#[async_trait]
impl TaskHandler for HumanHandler {
    fn descriptor(&self) -> &HandlerDescriptor {
        &self.descriptor
    }

    async fn handle(
        &self,
        task: &Task,
        _context: &TaskContext,
        cancel: &CancellationToken,
    ) -> Result<TaskResult, HandlerError> {
        let started = Instant::now();
        if self.config.notification_enabled {
            self.channel.notify(&self.human_id, task).await?;
            info!(task_id = %task.id, reviewer = %self.human_id, "human reviewer notified");
        }

        let limit = self.wait_limit();
        let deadline = sleep(limit);
        tokio::pin!(deadline);
        let mut ticker = interval(Duration::from_millis(self.config.poll_interval_ms.max(1)));
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                biased;
                () = cancel.cancelled() => return Err(HandlerError::Cancelled),
                () = &mut deadline => break,
                _ = ticker.tick() => {
                    if let Some(response) = self.channel.poll(&self.human_id).await? {
                        info!(task_id = %task.id, reviewer = %self.human_id, "human response received");
                        return Ok(TaskResult::success(vec![json!({
                            "reviewer": self.human_id,
                            "response": response,
                        })])
                        .with_message(format!("reviewed by {}", self.human_id))
                        .with_execution_time(started.elapsed()));
                    }
                }
            }
        }

        if self.config.escalation_enabled {
            warn!(task_id = %task.id, reviewer = %self.human_id, waited = ?limit, "human review escalated");
            Ok(self
                .escalation(task, limit)
                .with_execution_time(started.elapsed()))
        } else {
            warn!(task_id = %task.id, reviewer = %self.human_id, waited = ?limit, "human review timed out");
            Err(HandlerError::Timeout(limit))
        }
    }
}
