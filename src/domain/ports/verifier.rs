//! Verification port.

use serde::{Deserialize, Serialize};

use crate::domain::models::report::ArtifactRecord;
use crate::domain::models::{Task, TaskResult};

/// Verdict on one task result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Verification {
    pub accepted: bool,
    /// Quality score in `[0, 1]`
    pub quality: f64,
    pub reason: String,
}

/// Scores task results and judges how much of the goal is covered.
pub trait ResultVerifier: Send + Sync {
    fn verify(&self, task: &Task, result: &TaskResult) -> Verification;

    /// Fraction of `goal` covered by `artifacts`, in `[0, 1]`.
    fn goal_satisfaction(&self, goal: &Task, artifacts: &[ArtifactRecord]) -> f64;
}
