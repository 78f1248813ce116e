//! Convergence manager.
//!
//! Decides when a run must stop and how far along it is. Every function here
//! is pure over its inputs, so repeated calls with the same situation and
//! budgets always agree.

use crate::domain::models::{Budgets, Situation, TerminationReason};

/// Advisory returned when failures outpace completions.
pub const FAILURE_RATE_ADVISORY: &str =
    "failure rate exceeds completion rate — recommend escalation";

/// Termination and progress policy.
#[derive(Debug, Clone, Copy, Default)]
pub struct ConvergenceManager;

impl ConvergenceManager {
    pub const fn new() -> Self {
        Self
    }

    /// Check the situation against the budgets.
    ///
    /// Conditions are tested in a fixed order (tokens, time, iterations,
    /// exhausted queue, goal satisfaction) and the first that holds is
    /// reported.
    pub fn should_terminate(
        &self,
        situation: &Situation,
        budgets: &Budgets,
    ) -> (bool, Option<TerminationReason>) {
        let reason = if situation.total_tokens_used >= budgets.token_budget {
            Some(TerminationReason::TokenBudgetExceeded)
        } else if situation.elapsed >= budgets.time_budget {
            Some(TerminationReason::TimeBudgetExceeded)
        } else if situation.iterations >= budgets.max_iterations {
            Some(TerminationReason::MaxIterationsReached)
        } else if situation.pending_tasks == 0 && situation.completed_tasks > 0 {
            Some(TerminationReason::QueueExhausted)
        } else if situation.goal_satisfaction >= budgets.goal_satisfaction_threshold {
            Some(TerminationReason::GoalSatisfied)
        } else {
            None
        };
        (reason.is_some(), reason)
    }

    /// `completed / (completed + failed + pending)`, 0 before anything completes.
    #[allow(clippy::cast_precision_loss)]
    pub fn progress_score(&self, situation: &Situation) -> f64 {
        if situation.completed_tasks == 0 {
            return 0.0;
        }
        let denominator =
            situation.completed_tasks + situation.failed_tasks + situation.pending_tasks;
        situation.completed_tasks as f64 / denominator as f64
    }

    pub fn suggest_intervention(&self, situation: &Situation) -> Option<String> {
        (situation.failed_tasks > situation.completed_tasks)
            .then(|| FAILURE_RATE_ADVISORY.to_string())
    }
}
