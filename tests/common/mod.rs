//! Common test utilities for integration tests
//!
//! Fixtures shared by the engine tests: a recording handler whose behaviour
//! is scripted per objective, plan-driven decomposers, and configuration
//! presets that keep runs fast and deterministic.

#![allow(dead_code)]

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use canopy::adapters::{PlanDecomposer, ScriptedPlan};
use canopy::domain::models::{
    Config, ExecutionStrategy, HandlerDescriptor, HandlerKind, Situation, TaskContext,
};
use canopy::domain::ports::{Decomposer, Decomposition};
use canopy::{
    DomainError, DomainResult, ExecutionReport, HandlerError, Task, TaskHandler, TaskResult,
    TaskSpec,
};
use serde_json::json;
use tokio::sync::Barrier;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

/// Setup test logging
///
/// Call this at the beginning of tests that need logging.
pub fn setup_test_logging() {
    use tracing_subscriber::fmt;

    let _ = fmt()
        .with_test_writer()
        .with_max_level(tracing::Level::DEBUG)
        .try_init();
}

/// Configuration for engine tests: goal-coverage stop disabled, fast retries.
pub fn test_config(strategy: ExecutionStrategy, max_parallel: usize) -> Config {
    let mut config = Config::default();
    config.execution.strategy = strategy;
    config.resources.max_parallel_agents = max_parallel;
    config.convergence.enabled = false;
    config.handlers.retry.initial_backoff_ms = 1;
    config.handlers.retry.max_backoff_ms = 5;
    config
}

/// Terminal counts never exceed what was admitted, and every admitted task
/// is accounted for once the run is over.
pub fn assert_counts_consistent(report: &ExecutionReport) {
    let counts = &report.counts;
    assert!(counts.completed + counts.failed + counts.cancelled <= counts.total);
    assert_eq!(counts.pending + counts.in_progress, 0);
    assert_eq!(counts.total, report.tree.len());
}

/// Decomposer that gives the goal `objectives` as subtasks.
pub fn plan(objectives: &[&str]) -> Arc<PlanDecomposer> {
    Arc::new(PlanDecomposer::new(ScriptedPlan {
        subtasks: objectives.iter().map(|o| TaskSpec::new(*o, "")).collect(),
        ..ScriptedPlan::default()
    }))
}

/// Decomposer that always fails.
pub struct BrokenDecomposer;

#[async_trait]
impl Decomposer for BrokenDecomposer {
    async fn decompose(&self, _task: &Task, _situation: &Situation) -> DomainResult<Decomposition> {
        Err(DomainError::DecompositionFailed("planner offline".to_string()))
    }
}

/// Handler that logs every objective it is given and answers
/// `done: <objective>` unless told otherwise.
pub struct RecordingHandler {
    descriptor: HandlerDescriptor,
    log: Mutex<Vec<String>>,
    ids: Mutex<HashMap<String, Uuid>>,
    active: AtomicUsize,
    peak: AtomicUsize,
    barrier: Option<Arc<Barrier>>,
    latency: Option<Duration>,
    tokens: u64,
    failing: HashSet<String>,
    flaky: HashMap<String, usize>,
    stalls: HashMap<String, Duration>,
    attempts: Mutex<HashMap<String, usize>>,
    answers: HashMap<String, String>,
    spawns: HashMap<String, Vec<(TaskSpec, Option<String>)>>,
}

impl RecordingHandler {
    pub fn new(name: &str) -> Self {
        Self {
            descriptor: HandlerDescriptor::new(name, HandlerKind::Reasoning),
            log: Mutex::new(Vec::new()),
            ids: Mutex::new(HashMap::new()),
            active: AtomicUsize::new(0),
            peak: AtomicUsize::new(0),
            barrier: None,
            latency: None,
            tokens: 0,
            failing: HashSet::new(),
            flaky: HashMap::new(),
            stalls: HashMap::new(),
            attempts: Mutex::new(HashMap::new()),
            answers: HashMap::new(),
            spawns: HashMap::new(),
        }
    }

    pub fn with_capacity(mut self, capacity: usize) -> Self {
        self.descriptor = self.descriptor.with_capacity(capacity);
        self
    }

    /// Every invocation waits until `parties` invocations are in flight.
    pub fn with_barrier(mut self, parties: usize) -> Self {
        self.barrier = Some(Arc::new(Barrier::new(parties)));
        self
    }

    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    pub fn with_tokens(mut self, tokens: u64) -> Self {
        self.tokens = tokens;
        self
    }

    pub fn failing(mut self, objective: &str) -> Self {
        self.failing.insert(objective.to_string());
        self
    }

    /// `objective` fails transiently `failures` times before it succeeds.
    pub fn flaky(mut self, objective: &str, failures: usize) -> Self {
        self.flaky.insert(objective.to_string(), failures);
        self
    }

    /// `objective` sleeps for `delay` before answering.
    pub fn stalling(mut self, objective: &str, delay: Duration) -> Self {
        self.stalls.insert(objective.to_string(), delay);
        self
    }

    pub fn answering(mut self, objective: &str, answer: &str) -> Self {
        self.answers.insert(objective.to_string(), answer.to_string());
        self
    }

    /// `objective` proposes `children` when it completes.
    pub fn spawning(mut self, objective: &str, children: &[&str]) -> Self {
        let entry = self.spawns.entry(objective.to_string()).or_default();
        entry.extend(children.iter().map(|c| (TaskSpec::new(*c, ""), None)));
        self
    }

    /// `objective` proposes `child`, depending on the task that ran `dependency`.
    pub fn spawning_after(mut self, objective: &str, child: &str, dependency: &str) -> Self {
        self.spawns
            .entry(objective.to_string())
            .or_default()
            .push((TaskSpec::new(child, ""), Some(dependency.to_string())));
        self
    }

    pub fn log(&self) -> Vec<String> {
        self.log.lock().unwrap().clone()
    }

    /// Number of times `objective` was handed to this handler.
    pub fn attempts(&self, objective: &str) -> usize {
        self.attempts
            .lock()
            .unwrap()
            .get(objective)
            .copied()
            .unwrap_or(0)
    }

    pub fn peak_concurrency(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }

    fn proposals(&self, objective: &str) -> Vec<TaskSpec> {
        let ids = self.ids.lock().unwrap();
        self.spawns
            .get(objective)
            .into_iter()
            .flatten()
            .map(|(spec, dependency)| {
                let mut spec = spec.clone();
                if let Some(id) = dependency.as_ref().and_then(|d| ids.get(d)) {
                    spec.depends_on.insert(*id);
                }
                spec
            })
            .collect()
    }
}

#[async_trait]
impl TaskHandler for RecordingHandler {
    fn descriptor(&self) -> &HandlerDescriptor {
        &self.descriptor
    }

    async fn handle(
        &self,
        task: &Task,
        _context: &TaskContext,
        cancel: &CancellationToken,
    ) -> Result<TaskResult, HandlerError> {
        self.log.lock().unwrap().push(task.objective.clone());
        let attempt = {
            let mut attempts = self.attempts.lock().unwrap();
            let count = attempts.entry(task.objective.clone()).or_insert(0);
            *count += 1;
            *count
        };
        self.ids
            .lock()
            .unwrap()
            .insert(task.objective.clone(), task.id);
        let now = self.active.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);

        let waited = async {
            if let Some(barrier) = &self.barrier {
                barrier.wait().await;
            }
            if let Some(latency) = self.latency {
                tokio::time::sleep(latency).await;
            }
            if let Some(stall) = self.stalls.get(&task.objective) {
                tokio::time::sleep(*stall).await;
            }
        };
        let cancelled = tokio::select! {
            biased;
            () = cancel.cancelled() => true,
            () = waited => false,
        };
        self.active.fetch_sub(1, Ordering::SeqCst);
        if cancelled {
            return Err(HandlerError::Cancelled);
        }

        if self
            .flaky
            .get(&task.objective)
            .is_some_and(|failures| attempt <= *failures)
        {
            return Err(HandlerError::Transient(format!(
                "{} hit a transient error",
                task.objective
            )));
        }

        if self.failing.contains(&task.objective) {
            return Ok(TaskResult::failure(format!("{} went wrong", task.objective)));
        }

        let answer = self
            .answers
            .get(&task.objective)
            .cloned()
            .unwrap_or_else(|| format!("done: {}", task.objective));
        let mut result = TaskResult::success(vec![json!(answer)]).with_tokens(self.tokens);
        result.new_tasks = self.proposals(&task.objective);
        Ok(result)
    }
}
