//! Decomposition port.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::domain::errors::DomainResult;
use crate::domain::models::{Situation, Task, TaskSpec};

/// Subtasks proposed for one task, plus what it cost to produce them.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Decomposition {
    pub subtasks: Vec<TaskSpec>,
    pub tokens_used: u64,
}

impl Decomposition {
    pub const fn new(subtasks: Vec<TaskSpec>) -> Self {
        Self {
            subtasks,
            tokens_used: 0,
        }
    }
}

/// Turns a task into candidate subtasks.
///
/// Malformed output is reported as
/// [`DomainError::DecompositionParse`](crate::domain::errors::DomainError::DecompositionParse)
/// carrying the raw text; callers may retry a bounded number of times.
#[async_trait]
pub trait Decomposer: Send + Sync {
    async fn decompose(&self, task: &Task, situation: &Situation) -> DomainResult<Decomposition>;
}
