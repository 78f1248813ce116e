//! Point-in-time view of a run, and the budgets it is judged against.

use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Snapshot of run progress, rebuilt by the engine after every transition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Situation {
    /// Non-terminal tasks, queued or in flight
    pub pending_tasks: usize,
    pub completed_tasks: usize,
    pub failed_tasks: usize,
    pub cancelled_tasks: usize,
    pub total_tokens_used: u64,
    /// Serialized size of accumulated artifacts, in bytes
    pub memory_usage_bytes: usize,
    pub elapsed: Duration,
    /// Tasks currently held by a handler
    pub active_agents: usize,
    /// Completed scheduling rounds
    pub iterations: u32,
    /// Fraction of the root goal judged satisfied, in `[0, 1]`
    pub goal_satisfaction: f64,
    pub last_update: DateTime<Utc>,
    pub status_summary: String,
}

impl Default for Situation {
    fn default() -> Self {
        Self {
            pending_tasks: 0,
            completed_tasks: 0,
            failed_tasks: 0,
            cancelled_tasks: 0,
            total_tokens_used: 0,
            memory_usage_bytes: 0,
            elapsed: Duration::ZERO,
            active_agents: 0,
            iterations: 0,
            goal_satisfaction: 0.0,
            last_update: Utc::now(),
            status_summary: "initializing".to_string(),
        }
    }
}

impl Situation {
    /// The counts the loop detector compares.
    pub const fn snapshot(&self) -> StateSnapshot {
        StateSnapshot {
            pending: self.pending_tasks,
            completed: self.completed_tasks,
            failed: self.failed_tasks,
            cancelled: self.cancelled_tasks,
        }
    }

    /// One-line summary, e.g. `3 pending, 5 completed, 1 failed, 0 cancelled`.
    pub fn summarize(&self) -> String {
        format!(
            "{} pending, {} completed, {} failed, {} cancelled",
            self.pending_tasks, self.completed_tasks, self.failed_tasks, self.cancelled_tasks
        )
    }
}

/// Status counts used for non-progress detection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct StateSnapshot {
    pub pending: usize,
    pub completed: usize,
    pub failed: usize,
    pub cancelled: usize,
}

impl StateSnapshot {
    /// Stable serialized form stored in the loop detector history.
    pub fn key(&self) -> String {
        format!(
            "p{}:c{}:f{}:x{}",
            self.pending, self.completed, self.failed, self.cancelled
        )
    }
}

/// Limits the convergence manager checks a [`Situation`] against.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Budgets {
    pub token_budget: u64,
    pub time_budget: Duration,
    pub max_iterations: u32,
    pub goal_satisfaction_threshold: f64,
}

impl Default for Budgets {
    fn default() -> Self {
        Self {
            token_budget: 1_000_000,
            time_budget: Duration::from_secs(3600),
            max_iterations: 200,
            goal_satisfaction_threshold: 0.95,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_snapshot_key_is_stable() {
        let situation = Situation {
            pending_tasks: 2,
            completed_tasks: 3,
            failed_tasks: 1,
            ..Default::default()
        };
        assert_eq!(situation.snapshot().key(), "p2:c3:f1:x0");
        assert_eq!(situation.snapshot().key(), situation.snapshot().key());
    }

    #[test]
    fn test_summary() {
        let situation = Situation {
            pending_tasks: 1,
            completed_tasks: 2,
            ..Default::default()
        };
        assert_eq!(situation.summarize(), "1 pending, 2 completed, 0 failed, 0 cancelled");
    }
}
