//! Final run report and termination reasons.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::situation::Situation;
use super::task::TaskStatus;
use super::tree::ExecutionTree;

/// Why a run stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TerminationReason {
    #[serde(rename = "token_budget_exceeded")]
    TokenBudgetExceeded,
    #[serde(rename = "time_budget_exceeded")]
    TimeBudgetExceeded,
    #[serde(rename = "max_iterations_reached")]
    MaxIterationsReached,
    #[serde(rename = "queue exhausted")]
    QueueExhausted,
    #[serde(rename = "goal_satisfied")]
    GoalSatisfied,
    #[serde(rename = "loop_detected")]
    LoopDetected,
    #[serde(rename = "cancelled")]
    Cancelled,
    /// Open tasks remain but none can ever be dispatched
    #[serde(rename = "no_runnable_tasks")]
    NoRunnableTasks,
}

impl TerminationReason {
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::TokenBudgetExceeded => "token_budget_exceeded",
            Self::TimeBudgetExceeded => "time_budget_exceeded",
            Self::MaxIterationsReached => "max_iterations_reached",
            Self::QueueExhausted => "queue exhausted",
            Self::GoalSatisfied => "goal_satisfied",
            Self::LoopDetected => "loop_detected",
            Self::Cancelled => "cancelled",
            Self::NoRunnableTasks => "no_runnable_tasks",
        }
    }

    /// Budget limits stop a run early; they are not failures.
    pub const fn is_budget(&self) -> bool {
        matches!(
            self,
            Self::TokenBudgetExceeded | Self::TimeBudgetExceeded | Self::MaxIterationsReached
        )
    }
}

impl std::fmt::Display for TerminationReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Overall classification of a finished run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunOutcome {
    /// Work ran out or the goal was met, with no failures
    Converged,
    /// Stopped by a budget, or finished with failed or cancelled tasks
    Partial,
    /// Stopped by the loop detector
    LoopAborted,
    /// Stopped by an external cancellation request
    Cancelled,
}

impl RunOutcome {
    pub fn classify(reason: TerminationReason, counts: &StatusCounts) -> Self {
        match reason {
            TerminationReason::LoopDetected => Self::LoopAborted,
            TerminationReason::Cancelled => Self::Cancelled,
            TerminationReason::QueueExhausted | TerminationReason::GoalSatisfied
                if counts.failed == 0 && counts.cancelled == 0 =>
            {
                Self::Converged
            }
            _ => Self::Partial,
        }
    }

    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Converged => "converged",
            Self::Partial => "partial",
            Self::LoopAborted => "loop_aborted",
            Self::Cancelled => "cancelled",
        }
    }
}

/// Number of tasks in each status.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusCounts {
    pub pending: usize,
    pub in_progress: usize,
    pub completed: usize,
    pub failed: usize,
    pub cancelled: usize,
    pub total: usize,
}

impl StatusCounts {
    pub fn record(&mut self, status: TaskStatus) {
        match status {
            TaskStatus::Pending => self.pending += 1,
            TaskStatus::InProgress => self.in_progress += 1,
            TaskStatus::Completed => self.completed += 1,
            TaskStatus::Failed => self.failed += 1,
            TaskStatus::Cancelled => self.cancelled += 1,
        }
        self.total += 1;
    }

    pub const fn terminal(&self) -> usize {
        self.completed + self.failed + self.cancelled
    }
}

/// An artifact together with the task that produced it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArtifactRecord {
    pub task_id: Uuid,
    pub value: serde_json::Value,
}

/// A proposed task the tree refused to admit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RejectedInsertion {
    pub objective: String,
    /// Task that proposed it
    pub parent_id: Uuid,
    pub error: String,
}

/// Everything a caller gets back from a run, whatever the outcome.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionReport {
    pub root_id: Uuid,
    pub outcome: RunOutcome,
    pub reason: TerminationReason,
    pub counts: StatusCounts,
    pub artifacts: Vec<ArtifactRecord>,
    /// Tasks resolved by escalating an unanswered human review
    pub escalated: Vec<Uuid>,
    pub rejected: Vec<RejectedInsertion>,
    /// Advisory from the convergence manager at the time of termination
    pub intervention: Option<String>,
    pub progress: f64,
    pub situation: Situation,
    pub elapsed: Duration,
    pub tree: ExecutionTree,
}

impl ExecutionReport {
    pub const fn loop_detected(&self) -> bool {
        matches!(self.outcome, RunOutcome::LoopAborted)
    }
}
