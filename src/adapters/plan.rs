//! File-driven decomposition for offline runs.
//!
//! A plan file lists the goal's subtasks, optional expansions for subtasks
//! flagged `decompose: true`, canned reasoning answers, search corpus, and
//! scripted reviewer replies:
//!
//! ```yaml
//! subtasks:
//!   - objective: gather sources
//!     requires: [search]
//!     metadata: { query: "rust async" }
//!   - objective: draft outline
//!     metadata: { decompose: true }
//! expansions:
//!   draft outline:
//!     - objective: write introduction
//! answers:
//!   write introduction: "Rust makes async safe."
//! ```

use std::collections::HashMap;
use std::path::Path;

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::domain::errors::DomainResult;
use crate::domain::models::{Situation, Task, TaskSpec};
use crate::domain::ports::{Decomposer, Decomposition, SearchHit};

/// Parsed plan file.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ScriptedPlan {
    /// Subtasks of the goal
    #[serde(default)]
    pub subtasks: Vec<TaskSpec>,
    /// Subtasks of further tasks, keyed by objective
    #[serde(default)]
    pub expansions: HashMap<String, Vec<TaskSpec>>,
    /// Reasoning answers, keyed by a fragment of the objective
    #[serde(default)]
    pub answers: HashMap<String, String>,
    #[serde(default)]
    pub search_hits: Vec<SearchHit>,
    #[serde(default)]
    pub human_responses: Vec<String>,
}

impl ScriptedPlan {
    /// Load a plan from YAML (JSON is accepted as YAML).
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read plan file {}", path.display()))?;
        serde_yaml::from_str(&content)
            .with_context(|| format!("Failed to parse plan file {}", path.display()))
    }
}

/// Decomposer that replays a [`ScriptedPlan`].
#[derive(Debug, Clone, Default)]
pub struct PlanDecomposer {
    plan: ScriptedPlan,
}

impl PlanDecomposer {
    pub const fn new(plan: ScriptedPlan) -> Self {
        Self { plan }
    }
}

#[async_trait]
impl Decomposer for PlanDecomposer {
    async fn decompose(&self, task: &Task, _situation: &Situation) -> DomainResult<Decomposition> {
        let subtasks = if task.is_root() {
            self.plan.subtasks.clone()
        } else {
            self.plan
                .expansions
                .get(&task.objective)
                .cloned()
                .unwrap_or_default()
        };
        Ok(Decomposition::new(subtasks))
    }
}
