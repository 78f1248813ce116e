use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::situation::Budgets;

/// Main configuration structure for canopy
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct Config {
    /// Budgets and capacity limits
    #[serde(default)]
    pub resources: ResourceConfig,

    /// Traversal and tree shape
    #[serde(default)]
    pub execution: ExecutionConfig,

    /// Termination and verification thresholds
    #[serde(default)]
    pub convergence: ConvergenceConfig,

    /// Human reviewer waits and escalation
    #[serde(default)]
    pub human: HumanConfig,

    /// Per-task timeout and retry policy
    #[serde(default)]
    pub handlers: HandlerConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl Config {
    /// Budgets handed to the convergence manager.
    pub fn budgets(&self) -> Budgets {
        Budgets {
            token_budget: self.resources.token_budget,
            time_budget: Duration::from_secs(self.resources.session_timeout_secs),
            max_iterations: self.resources.max_iterations,
            goal_satisfaction_threshold: self.convergence.goal_satisfaction_threshold,
        }
    }
}

/// Resource budgets
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct ResourceConfig {
    /// Total tokens a run may consume (> 0)
    #[serde(default = "default_token_budget")]
    pub token_budget: u64,

    /// Wall-clock limit for a run in seconds (> 0)
    #[serde(default = "default_session_timeout_secs")]
    pub session_timeout_secs: u64,

    /// Maximum tasks in flight at once (1-20)
    #[serde(default = "default_max_parallel_agents")]
    pub max_parallel_agents: usize,

    /// Maximum scheduling rounds (> 0)
    #[serde(default = "default_max_iterations")]
    pub max_iterations: u32,

    /// Maximum open (non-terminal) tasks in the tree (> 0)
    #[serde(default = "default_max_queue_length")]
    pub max_queue_length: usize,
}

const fn default_token_budget() -> u64 {
    1_000_000
}

const fn default_session_timeout_secs() -> u64 {
    3600
}

const fn default_max_parallel_agents() -> usize {
    5
}

const fn default_max_iterations() -> u32 {
    200
}

const fn default_max_queue_length() -> usize {
    100
}

impl Default for ResourceConfig {
    fn default() -> Self {
        Self {
            token_budget: default_token_budget(),
            session_timeout_secs: default_session_timeout_secs(),
            max_parallel_agents: default_max_parallel_agents(),
            max_iterations: default_max_iterations(),
            max_queue_length: default_max_queue_length(),
        }
    }
}

/// Traversal strategy over the pending queue.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExecutionStrategy {
    Dfs,
    Bfs,
    #[default]
    Hybrid,
}

impl ExecutionStrategy {
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Dfs => "dfs",
            Self::Bfs => "bfs",
            Self::Hybrid => "hybrid",
        }
    }

    #[allow(clippy::should_implement_trait)]
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "dfs" => Some(Self::Dfs),
            "bfs" => Some(Self::Bfs),
            "hybrid" => Some(Self::Hybrid),
            _ => None,
        }
    }
}

/// How much of the run's accumulated results a handler gets to see.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContextSharing {
    /// Artifacts of the task's ancestors
    #[default]
    Hierarchical,
    /// Every artifact plus the merged knowledge map
    Shared,
    /// The task alone
    Isolated,
}

impl ContextSharing {
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Hierarchical => "hierarchical",
            Self::Shared => "shared",
            Self::Isolated => "isolated",
        }
    }
}

/// Execution shape
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct ExecutionConfig {
    #[serde(default)]
    pub strategy: ExecutionStrategy,

    /// Deepest level a task may sit at; the root is level 0 (> 0)
    #[serde(default = "default_max_tree_depth")]
    pub max_tree_depth: usize,

    #[serde(default)]
    pub context_sharing: ContextSharing,

    /// Tasks taken per round by the hybrid strategy (> 0)
    #[serde(default = "default_branching_factor")]
    pub branching_factor: usize,

    /// Extra decomposition attempts after a parse failure (0-10)
    #[serde(default = "default_decomposition_retries")]
    pub decomposition_retries: u32,
}

const fn default_max_tree_depth() -> usize {
    10
}

const fn default_branching_factor() -> usize {
    3
}

const fn default_decomposition_retries() -> u32 {
    2
}

impl Default for ExecutionConfig {
    fn default() -> Self {
        Self {
            strategy: ExecutionStrategy::default(),
            max_tree_depth: default_max_tree_depth(),
            context_sharing: ContextSharing::default(),
            branching_factor: default_branching_factor(),
            decomposition_retries: default_decomposition_retries(),
        }
    }
}

/// Convergence and verification thresholds
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct ConvergenceConfig {
    /// Consult the convergence manager after each transition
    #[serde(default = "default_true")]
    pub enabled: bool,

    #[serde(default = "default_true")]
    pub loop_detection_enabled: bool,

    /// Snapshots kept by the loop detector (> 0)
    #[serde(default = "default_loop_window")]
    pub loop_window: usize,

    /// A snapshot seen more than this many times is a loop
    #[serde(default = "default_loop_repeat_threshold")]
    pub loop_repeat_threshold: usize,

    /// Minimum verifier quality for acceptance, in `[0, 1]`
    #[serde(default = "default_consensus_threshold")]
    pub consensus_threshold: f64,

    /// Goal satisfaction that ends the run, in `[0, 1]`
    #[serde(default = "default_goal_satisfaction_threshold")]
    pub goal_satisfaction_threshold: f64,
}

const fn default_true() -> bool {
    true
}

const fn default_loop_window() -> usize {
    20
}

const fn default_loop_repeat_threshold() -> usize {
    2
}

const fn default_consensus_threshold() -> f64 {
    0.8
}

const fn default_goal_satisfaction_threshold() -> f64 {
    0.95
}

impl Default for ConvergenceConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            loop_detection_enabled: true,
            loop_window: default_loop_window(),
            loop_repeat_threshold: default_loop_repeat_threshold(),
            consensus_threshold: default_consensus_threshold(),
            goal_satisfaction_threshold: default_goal_satisfaction_threshold(),
        }
    }
}

/// Human reviewer configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct HumanConfig {
    /// Wait before escalating an unanswered review (> 0)
    #[serde(default = "default_escalation_timeout_secs")]
    pub escalation_timeout_secs: u64,

    /// Hard limit on waiting for a response when escalation is off (> 0)
    #[serde(default = "default_max_wait_secs")]
    pub max_wait_secs: u64,

    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,

    #[serde(default = "default_true")]
    pub escalation_enabled: bool,

    #[serde(default = "default_true")]
    pub notification_enabled: bool,
}

const fn default_escalation_timeout_secs() -> u64 {
    1800
}

const fn default_max_wait_secs() -> u64 {
    3600
}

const fn default_poll_interval_ms() -> u64 {
    1000
}

impl Default for HumanConfig {
    fn default() -> Self {
        Self {
            escalation_timeout_secs: default_escalation_timeout_secs(),
            max_wait_secs: default_max_wait_secs(),
            poll_interval_ms: default_poll_interval_ms(),
            escalation_enabled: true,
            notification_enabled: true,
        }
    }
}

/// Handler invocation policy
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct HandlerConfig {
    /// Upper bound on a single handler invocation (> 0)
    #[serde(default = "default_task_timeout_secs")]
    pub task_timeout_secs: u64,

    #[serde(default)]
    pub retry: RetryConfig,
}

const fn default_task_timeout_secs() -> u64 {
    600
}

impl Default for HandlerConfig {
    fn default() -> Self {
        Self {
            task_timeout_secs: default_task_timeout_secs(),
            retry: RetryConfig::default(),
        }
    }
}

/// Retry policy configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct RetryConfig {
    /// Retries after the first attempt (0-10)
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    /// Initial backoff delay in milliseconds
    #[serde(default = "default_initial_backoff_ms")]
    pub initial_backoff_ms: u64,

    /// Maximum backoff delay in milliseconds
    #[serde(default = "default_max_backoff_ms")]
    pub max_backoff_ms: u64,
}

const fn default_max_retries() -> u32 {
    3
}

const fn default_initial_backoff_ms() -> u64 {
    100
}

const fn default_max_backoff_ms() -> u64 {
    10_000
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: default_max_retries(),
            initial_backoff_ms: default_initial_backoff_ms(),
            max_backoff_ms: default_max_backoff_ms(),
        }
    }
}

/// Log output format
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    Json,
    #[default]
    Pretty,
}

/// Log file rotation
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum RotationPolicy {
    #[default]
    Daily,
    Hourly,
    Never,
}

/// Logging configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct LoggingConfig {
    /// Log level: trace, debug, info, warn, error
    #[serde(default = "default_log_level")]
    pub level: String,

    #[serde(default)]
    pub format: LogFormat,

    /// Directory for rolling log files; stderr only when unset
    #[serde(default)]
    pub log_dir: Option<PathBuf>,

    #[serde(default)]
    pub rotation: RotationPolicy,

    #[serde(default = "default_true")]
    pub enable_stdout: bool,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: LogFormat::default(),
            log_dir: None,
            rotation: RotationPolicy::default(),
            enable_stdout: true,
        }
    }
}
