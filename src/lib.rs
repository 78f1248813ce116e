//! Canopy - hierarchical task orchestration
//!
//! Canopy decomposes a goal into a tree of tasks and drives it to completion
//! over a pool of handlers (automated reasoning, human reviewers, tools,
//! search), under token, time, and iteration budgets.
//!
//! # Architecture
//!
//! - **Domain Layer** (`domain`): task tree, results, situation, configuration, ports
//! - **Service Layer** (`services`): routing, convergence, loop detection, verification,
//!   output filtering, retry, context building
//! - **Application Layer** (`application`): the execution engine and its worker pool
//! - **Adapters** (`adapters`): handlers and decomposers over the ports
//! - **Infrastructure Layer** (`infrastructure`): configuration loading and logging
//! - **CLI Layer** (`cli`): command-line interface
//!
//! # Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use canopy::adapters::{PlanDecomposer, ReasoningHandler, ScriptedPlan, ScriptedReasoning};
//! use canopy::{Config, ExecutionEngine, Task};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let engine = ExecutionEngine::new(
//!         Arc::new(Config::default()),
//!         Arc::new(PlanDecomposer::new(ScriptedPlan::default())),
//!     )
//!     .with_handler(Arc::new(ReasoningHandler::new(
//!         "reasoner",
//!         Arc::new(ScriptedReasoning::new()),
//!     )));
//!     let report = engine.run(Task::new("summarize the design", "")).await?;
//!     println!("{}", report.outcome.as_str());
//!     Ok(())
//! }
//! ```

pub mod adapters;
pub mod application;
pub mod cli;
pub mod domain;
pub mod infrastructure;
pub mod services;

// Re-export commonly used types for convenience
pub use application::{EngineEvent, ExecutionEngine};
pub use domain::errors::{DomainError, DomainResult, HandlerError};
pub use domain::models::{
    Config, ExecutionReport, ExecutionStrategy, ExecutionTree, RunOutcome, Situation, Task,
    TaskPriority, TaskResult, TaskSpec, TaskStatus, TerminationReason,
};
pub use domain::ports::{Decomposer, Decomposition, TaskHandler};
pub use infrastructure::config::{ConfigError, ConfigLoader};
