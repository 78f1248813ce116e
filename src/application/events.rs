//! Events streamed by the execution engine.

use serde::Serialize;
use uuid::Uuid;

use crate::domain::models::{ExecutionStrategy, RunOutcome, TerminationReason};

/// Progress notifications. Delivery is best-effort: a dropped receiver
/// never stalls or fails the run.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum EngineEvent {
    /// Run started.
    Started { root_id: Uuid, strategy: ExecutionStrategy },
    /// Root decomposition produced its first subtasks.
    Decomposed { task_id: Uuid, subtasks: usize },
    /// A scheduling round began.
    RoundStarted { iteration: u32, batch: usize },
    /// Task handed to a handler (or to the decomposer).
    TaskDispatched { task_id: Uuid, handler: String },
    /// Worker is retrying after a transient failure.
    TaskRetrying { task_id: Uuid, attempt: u32 },
    /// Task result accepted.
    TaskCompleted { task_id: Uuid, quality: f64 },
    /// Task resolved by escalating an unanswered human review.
    TaskEscalated { task_id: Uuid },
    /// Task failed.
    TaskFailed { task_id: Uuid, error: String },
    /// Task cancelled.
    TaskCancelled { task_id: Uuid },
    /// Proposed task refused by the tree.
    TaskRejected { parent_id: Uuid, objective: String, error: String },
    /// Round finished.
    RoundCompleted { iteration: u32, pending: usize, completed: usize, failed: usize },
    /// Loop detector fired.
    LoopDetected { iteration: u32 },
    /// Run finished.
    Finished { outcome: RunOutcome, reason: TerminationReason },
}
