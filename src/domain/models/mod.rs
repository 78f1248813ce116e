//! Domain models for the canopy engine.

pub mod config;
pub mod context;
pub mod handler;
pub mod report;
pub mod result;
pub mod situation;
pub mod task;
pub mod tree;

pub use config::{
    Config, ContextSharing, ConvergenceConfig, ExecutionConfig, ExecutionStrategy, HandlerConfig,
    HumanConfig, LogFormat, LoggingConfig, ResourceConfig, RetryConfig, RotationPolicy,
};
pub use context::TaskContext;
pub use handler::{
    HandlerDescriptor, HandlerKind, TAG_HUMAN_REVIEW, TAG_REASONING, TAG_SEARCH, TAG_TOOL,
};
pub use report::{
    ArtifactRecord, ExecutionReport, RejectedInsertion, RunOutcome, StatusCounts,
    TerminationReason,
};
pub use result::TaskResult;
pub use situation::{Budgets, Situation, StateSnapshot};
pub use task::{Task, TaskPriority, TaskSpec, TaskStatus};
pub use tree::{DependencyState, ExecutionTree};
