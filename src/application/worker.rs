//! Bounded worker pool.
//!
//! Workers run one assignment each and report back over an unbounded channel
//! read only by the engine's control loop. They never touch the task tree.

use std::sync::Arc;
use std::time::{Duration, Instant};

use serde_json::json;
use tokio::sync::{mpsc, Semaphore};
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::domain::errors::{DomainError, DomainResult, HandlerError};
use crate::domain::models::{Situation, Task, TaskContext, TaskResult};
use crate::domain::ports::{Decomposer, Decomposition, TaskHandler};
use crate::services::RetryPolicy;

use super::events::EngineEvent;

/// What a worker runs.
pub(crate) enum Executor {
    /// Registered handler, by declaration index
    Handler {
        index: usize,
        handler: Arc<dyn TaskHandler>,
    },
    /// Task asked to be split further
    Decomposer(Arc<dyn Decomposer>),
}

impl Executor {
    pub(crate) fn label(&self) -> String {
        match self {
            Self::Handler { handler, .. } => handler.descriptor().name.clone(),
            Self::Decomposer(_) => "decomposer".to_string(),
        }
    }

    pub(crate) const fn handler_index(&self) -> Option<usize> {
        match self {
            Self::Handler { index, .. } => Some(*index),
            Self::Decomposer(_) => None,
        }
    }
}

/// One dispatched task.
pub(crate) struct Assignment {
    /// Dispatch order within the run
    pub seq: usize,
    pub task: Task,
    pub executor: Executor,
    pub context: TaskContext,
}

/// Result of one assignment, as seen by the control loop.
#[derive(Debug)]
pub(crate) struct WorkerOutcome {
    pub seq: usize,
    pub task_id: Uuid,
    pub handler_index: Option<usize>,
    pub result: Result<TaskResult, HandlerError>,
}

/// Sends a fallback outcome if the worker dies before reporting.
struct OutcomeGuard {
    tx: mpsc::UnboundedSender<WorkerOutcome>,
    seq: usize,
    task_id: Uuid,
    handler_index: Option<usize>,
    sent: bool,
}

impl OutcomeGuard {
    fn send(mut self, result: Result<TaskResult, HandlerError>) {
        self.sent = true;
        let _ = self.tx.send(WorkerOutcome {
            seq: self.seq,
            task_id: self.task_id,
            handler_index: self.handler_index,
            result,
        });
    }
}

impl Drop for OutcomeGuard {
    fn drop(&mut self) {
        if !self.sent {
            let _ = self.tx.send(WorkerOutcome {
                seq: self.seq,
                task_id: self.task_id,
                handler_index: self.handler_index,
                result: Err(HandlerError::Fatal("worker terminated unexpectedly".to_string())),
            });
        }
    }
}

/// Spawns assignments, at most `max_parallel` running at once.
pub(crate) struct WorkerPool {
    semaphore: Arc<Semaphore>,
    results_tx: mpsc::UnboundedSender<WorkerOutcome>,
    retry: RetryPolicy,
    task_timeout: Duration,
    decomposition_retries: u32,
    cancel: CancellationToken,
    events: Option<mpsc::Sender<EngineEvent>>,
}

impl WorkerPool {
    pub(crate) fn new(
        max_parallel: usize,
        retry: RetryPolicy,
        task_timeout: Duration,
        decomposition_retries: u32,
        cancel: CancellationToken,
        events: Option<mpsc::Sender<EngineEvent>>,
    ) -> (Self, mpsc::UnboundedReceiver<WorkerOutcome>) {
        let (results_tx, results_rx) = mpsc::unbounded_channel();
        let pool = Self {
            semaphore: Arc::new(Semaphore::new(max_parallel.max(1))),
            results_tx,
            retry,
            task_timeout,
            decomposition_retries,
            cancel,
            events,
        };
        (pool, results_rx)
    }

    pub(crate) fn spawn(&self, assignment: Assignment) {
        let guard = OutcomeGuard {
            tx: self.results_tx.clone(),
            seq: assignment.seq,
            task_id: assignment.task.id,
            handler_index: assignment.executor.handler_index(),
            sent: false,
        };
        let semaphore = Arc::clone(&self.semaphore);
        let retry = self.retry;
        let task_timeout = self.task_timeout;
        let decomposition_retries = self.decomposition_retries;
        let cancel = self.cancel.clone();
        let events = self.events.clone();

        tokio::spawn(async move {
            let result = tokio::select! {
                () = cancel.cancelled() => Err(HandlerError::Cancelled),
                result = run_assignment(
                    &assignment,
                    semaphore,
                    retry,
                    task_timeout,
                    decomposition_retries,
                    &cancel,
                    events.as_ref(),
                ) => result,
            };
            guard.send(result);
        });
    }
}

async fn run_assignment(
    assignment: &Assignment,
    semaphore: Arc<Semaphore>,
    retry: RetryPolicy,
    task_timeout: Duration,
    decomposition_retries: u32,
    cancel: &CancellationToken,
    events: Option<&mpsc::Sender<EngineEvent>>,
) -> Result<TaskResult, HandlerError> {
    let _permit = semaphore
        .acquire_owned()
        .await
        .map_err(|_| HandlerError::Fatal("worker pool closed".to_string()))?;

    let started = Instant::now();
    let task = &assignment.task;

    let result = match &assignment.executor {
        Executor::Handler { handler, .. } => {
            let handler = handler.as_ref();
            let context = &assignment.context;
            // Human handlers bound their own wait and escalate on expiry
            let bounded = !handler.descriptor().is_human();
            retry
                .execute(cancel, |attempt| async move {
                    if attempt > 0 {
                        if let Some(tx) = events {
                            let _ = tx
                                .send(EngineEvent::TaskRetrying {
                                    task_id: task.id,
                                    attempt,
                                })
                                .await;
                        }
                    }
                    if bounded {
                        timeout(task_timeout, handler.handle(task, context, cancel))
                            .await
                            .unwrap_or(Err(HandlerError::Timeout(task_timeout)))
                    } else {
                        handler.handle(task, context, cancel).await
                    }
                })
                .await
        }
        Executor::Decomposer(decomposer) => decompose_with_retries(
            decomposer.as_ref(),
            task,
            &assignment.context.situation,
            decomposition_retries,
        )
        .await
        .map(decomposition_result)
        .map_err(|err| HandlerError::Fatal(err.to_string())),
    };

    debug!(
        task_id = %task.id,
        elapsed = ?started.elapsed(),
        ok = result.is_ok(),
        "assignment finished"
    );

    result.map(|mut r| {
        if r.execution_time.is_zero() {
            r.execution_time = started.elapsed();
        }
        r
    })
}

/// Call the decomposer, retrying parse failures up to `retries` extra times.
pub(crate) async fn decompose_with_retries(
    decomposer: &dyn Decomposer,
    task: &Task,
    situation: &Situation,
    retries: u32,
) -> DomainResult<Decomposition> {
    let mut attempt = 0;
    loop {
        match decomposer.decompose(task, situation).await {
            Ok(decomposition) => return Ok(decomposition),
            Err(err @ DomainError::DecompositionParse { .. }) if attempt < retries => {
                attempt += 1;
                warn!(task_id = %task.id, attempt, error = %err, "decomposition output unparseable, retrying");
            }
            Err(err) => return Err(err),
        }
    }
}

/// Turn a decomposition into a task result: the subtasks as proposals plus
/// a plan artifact listing their objectives. The result is flagged as a plan
/// so it never counts toward goal coverage.
pub(crate) fn decomposition_result(decomposition: Decomposition) -> TaskResult {
    let mut result = TaskResult::success(vec![]).with_tokens(decomposition.tokens_used);
    if !decomposition.subtasks.is_empty() {
        let plan: Vec<&str> = decomposition
            .subtasks
            .iter()
            .map(|spec| spec.objective.as_str())
            .collect();
        result = result
            .with_artifact(json!({ "plan": plan }))
            .with_message(format!("decomposed into {} subtasks", plan.len()));
    }
    result = result.with_metadata("plan", json!(true));
    result.new_tasks = decomposition.subtasks;
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::models::TaskSpec;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicU32, Ordering};

    struct FlakyDecomposer {
        failures: u32,
        calls: AtomicU32,
    }

    #[async_trait]
    impl Decomposer for FlakyDecomposer {
        async fn decompose(&self, _task: &Task, _s: &Situation) -> DomainResult<Decomposition> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst);
            if call < self.failures {
                Err(DomainError::DecompositionParse {
                    reason: "bad".into(),
                    raw: "???".into(),
                })
            } else {
                Ok(Decomposition::new(vec![TaskSpec::new("a", "")]))
            }
        }
    }

    #[tokio::test]
    async fn test_decomposition_retries_parse_errors() {
        let decomposer = FlakyDecomposer {
            failures: 2,
            calls: AtomicU32::new(0),
        };
        let task = Task::new("goal", "");
        let result = decompose_with_retries(&decomposer, &task, &Situation::default(), 2).await;
        assert_eq!(result.unwrap().subtasks.len(), 1);
        assert_eq!(decomposer.calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_decomposition_retries_are_bounded() {
        let decomposer = FlakyDecomposer {
            failures: 5,
            calls: AtomicU32::new(0),
        };
        let task = Task::new("goal", "");
        let result = decompose_with_retries(&decomposer, &task, &Situation::default(), 1).await;
        assert!(matches!(result, Err(DomainError::DecompositionParse { .. })));
        assert_eq!(decomposer.calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_decomposition_result_carries_plan() {
        let result = decomposition_result(Decomposition {
            subtasks: vec![TaskSpec::new("one", ""), TaskSpec::new("two", "")],
            tokens_used: 42,
        });
        assert!(result.success);
        assert_eq!(result.new_tasks.len(), 2);
        assert_eq!(result.tokens_used, 42);
        assert_eq!(result.artifacts, vec![json!({"plan": ["one", "two"]})]);
        assert!(result.is_plan());
        assert_eq!(result.messages, vec!["decomposed into 2 subtasks".to_string()]);

        assert!(!decomposition_result(Decomposition::default()).has_output());
    }
}
