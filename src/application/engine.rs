//! Execution engine.
//!
//! A single control loop owns the task tree, the situation, and the loop
//! detector. Each round it takes a batch from the traversal queue, routes and
//! dispatches it to the worker pool, folds results back in as they arrive,
//! and admits newly proposed tasks only once the whole round has resolved.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::time::Instant;

use chrono::Utc;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::domain::errors::{DomainError, DomainResult, HandlerError};
use crate::domain::models::{
    ArtifactRecord, Budgets, Config, DependencyState, ExecutionReport, ExecutionTree,
    HandlerDescriptor, RejectedInsertion, RunOutcome, Situation, Task, TaskResult, TaskSpec,
    TaskStatus, TerminationReason,
};
use crate::domain::ports::{Decomposer, ResultVerifier, TaskHandler};
use crate::services::{
    merge_knowledge, ContextBuilder, ConvergenceManager, DefaultVerifier, LoopDetector,
    RetryPolicy, Route, TaskRouter,
};

use super::events::EngineEvent;
use super::traversal::TraversalQueue;
use super::worker::{
    decompose_with_retries, decomposition_result, Assignment, Executor, WorkerOutcome, WorkerPool,
};

/// Drives a goal to completion over a pool of handlers.
pub struct ExecutionEngine {
    config: Arc<Config>,
    handlers: Vec<Arc<dyn TaskHandler>>,
    decomposer: Arc<dyn Decomposer>,
    verifier: Arc<dyn ResultVerifier>,
    convergence: ConvergenceManager,
    events: Option<mpsc::Sender<EngineEvent>>,
}

impl ExecutionEngine {
    pub fn new(config: Arc<Config>, decomposer: Arc<dyn Decomposer>) -> Self {
        let verifier = Arc::new(DefaultVerifier::new(config.convergence.consensus_threshold));
        Self {
            config,
            handlers: Vec::new(),
            decomposer,
            verifier,
            convergence: ConvergenceManager::new(),
            events: None,
        }
    }

    /// Register a handler. Declaration order breaks routing ties.
    #[must_use]
    pub fn with_handler(mut self, handler: Arc<dyn TaskHandler>) -> Self {
        self.handlers.push(handler);
        self
    }

    #[must_use]
    pub fn with_verifier(mut self, verifier: Arc<dyn ResultVerifier>) -> Self {
        self.verifier = verifier;
        self
    }

    /// Stream progress events. A slow receiver applies backpressure;
    /// a dropped one is ignored.
    #[must_use]
    pub fn with_events(mut self, events: mpsc::Sender<EngineEvent>) -> Self {
        self.events = Some(events);
        self
    }

    pub fn handlers(&self) -> impl Iterator<Item = &HandlerDescriptor> {
        self.handlers.iter().map(|h| h.descriptor())
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Run `goal` to termination.
    pub async fn run(&self, goal: Task) -> DomainResult<ExecutionReport> {
        self.run_with_cancel(goal, CancellationToken::new()).await
    }

    /// Run `goal` until it terminates or `cancel` fires.
    ///
    /// Errors only when the goal cannot be admitted or its decomposition
    /// fails; every other outcome is described by the returned report.
    pub async fn run_with_cancel(
        &self,
        goal: Task,
        cancel: CancellationToken,
    ) -> DomainResult<ExecutionReport> {
        let mut run = Run::new(self, goal.id, cancel);
        run.tree.add(goal)?;

        info!(
            root_id = %run.root_id,
            strategy = self.config.execution.strategy.as_str(),
            handlers = self.handlers.len(),
            "run started"
        );
        run.emit(EngineEvent::Started {
            root_id: run.root_id,
            strategy: self.config.execution.strategy,
        })
        .await;

        run.seed().await?;
        run.drive().await;
        run.shutdown().await;

        let report = run.into_report(&self.convergence);
        info!(
            root_id = %report.root_id,
            outcome = report.outcome.as_str(),
            reason = %report.reason,
            completed = report.counts.completed,
            failed = report.counts.failed,
            cancelled = report.counts.cancelled,
            "run finished"
        );
        if let Some(tx) = &self.events {
            let _ = tx
                .send(EngineEvent::Finished {
                    outcome: report.outcome,
                    reason: report.reason,
                })
                .await;
        }
        Ok(report)
    }
}

/// Mutable state of one run, owned by the control loop.
struct Run<'a> {
    engine: &'a ExecutionEngine,
    root_id: Uuid,
    tree: ExecutionTree,
    queue: TraversalQueue,
    router: TaskRouter,
    loop_detector: LoopDetector,
    context_builder: ContextBuilder,
    budgets: Budgets,
    situation: Situation,
    artifacts: Vec<ArtifactRecord>,
    /// Artifacts from handler work, scored for goal coverage
    evidence: Vec<ArtifactRecord>,
    artifact_bytes: usize,
    knowledge: serde_json::Map<String, serde_json::Value>,
    goal_satisfaction: f64,
    escalated: Vec<Uuid>,
    rejected: Vec<RejectedInsertion>,
    tokens_used: u64,
    iterations: u32,
    started: Instant,
    deadline: tokio::time::Instant,
    in_flight: HashMap<Uuid, Option<usize>>,
    /// Proposals from this round, keyed by dispatch order
    proposals: BTreeMap<usize, (Uuid, Vec<TaskSpec>)>,
    next_seq: usize,
    stop: Option<TerminationReason>,
    pool: WorkerPool,
    results: mpsc::UnboundedReceiver<WorkerOutcome>,
    external: CancellationToken,
    workers: CancellationToken,
}

enum Wake {
    Outcome(Option<WorkerOutcome>),
    Cancelled,
    Deadline,
}

impl<'a> Run<'a> {
    fn new(engine: &'a ExecutionEngine, root_id: Uuid, external: CancellationToken) -> Self {
        let config = &engine.config;
        let workers = external.child_token();
        let (pool, results) = WorkerPool::new(
            config.resources.max_parallel_agents,
            RetryPolicy::from_config(&config.handlers.retry),
            std::time::Duration::from_secs(config.handlers.task_timeout_secs),
            config.execution.decomposition_retries,
            workers.clone(),
            engine.events.clone(),
        );

        let mut budgets = config.budgets();
        if !config.convergence.enabled {
            budgets.goal_satisfaction_threshold = f64::INFINITY;
        }

        Self {
            engine,
            root_id,
            tree: ExecutionTree::new(
                config.execution.max_tree_depth,
                config.resources.max_queue_length,
            ),
            queue: TraversalQueue::new(
                config.execution.strategy,
                config.execution.branching_factor,
            ),
            router: TaskRouter::new(engine.handlers.len()),
            loop_detector: LoopDetector::new(
                config.convergence.loop_window,
                config.convergence.loop_repeat_threshold,
            ),
            context_builder: ContextBuilder::new(config.execution.context_sharing),
            deadline: tokio::time::Instant::now() + budgets.time_budget,
            budgets,
            situation: Situation::default(),
            artifacts: Vec::new(),
            evidence: Vec::new(),
            artifact_bytes: 0,
            knowledge: serde_json::Map::new(),
            goal_satisfaction: 0.0,
            escalated: Vec::new(),
            rejected: Vec::new(),
            tokens_used: 0,
            iterations: 0,
            started: Instant::now(),
            in_flight: HashMap::new(),
            proposals: BTreeMap::new(),
            next_seq: 0,
            stop: None,
            pool,
            results,
            external,
            workers,
        }
    }

    async fn emit(&self, event: EngineEvent) {
        if let Some(tx) = &self.engine.events {
            let _ = tx.send(event).await;
        }
    }

    /// Decompose the goal. An empty decomposition leaves the goal itself
    /// queued for a handler.
    async fn seed(&mut self) -> DomainResult<()> {
        let root = self
            .tree
            .get(self.root_id)
            .cloned()
            .ok_or(DomainError::TaskNotFound(self.root_id))?;
        self.refresh_situation();

        let decomposition = match decompose_with_retries(
            self.engine.decomposer.as_ref(),
            &root,
            &self.situation,
            self.engine.config.execution.decomposition_retries,
        )
        .await
        {
            Ok(decomposition) => decomposition,
            Err(err) => {
                error!(root_id = %self.root_id, error = %err, "goal decomposition failed");
                let _ = self.tree.transition(self.root_id, TaskStatus::Failed);
                return Err(err);
            }
        };

        if decomposition.subtasks.is_empty() {
            self.tokens_used += decomposition.tokens_used;
            debug!(root_id = %self.root_id, "goal not decomposed, queueing it directly");
            self.queue.admit(&[self.root_id]);
            self.refresh_situation();
            return Ok(());
        }

        let subtasks = decomposition.subtasks.len();
        let seq = self.next_seq;
        self.next_seq += 1;
        self.tree.transition(self.root_id, TaskStatus::InProgress)?;
        let result = decomposition_result(decomposition);
        let verdict = self.engine.verifier.verify(&root, &result);
        if !verdict.accepted {
            error!(root_id = %self.root_id, reason = %verdict.reason, "goal plan rejected");
            let _ = self.tree.transition(self.root_id, TaskStatus::Failed);
            return Err(DomainError::DecompositionFailed(verdict.reason));
        }
        self.tokens_used += result.tokens_used;
        self.complete_task(self.root_id, result, seq);
        self.emit(EngineEvent::Decomposed {
            task_id: self.root_id,
            subtasks,
        })
        .await;

        let proposals = std::mem::take(&mut self.proposals);
        let mut admitted = Vec::new();
        for (parent, specs) in proposals.into_values() {
            admitted.extend(self.admit(parent, specs).await);
        }
        self.queue.admit(&admitted);

        self.refresh_situation();
        self.check_convergence();
        Ok(())
    }

    /// Scheduling rounds until something stops the run.
    async fn drive(&mut self) {
        while self.stop.is_none() {
            let tree = &self.tree;
            let batch = self
                .queue
                .next_batch(|id| tree.dependency_state(id) != DependencyState::Waiting);

            if batch.is_empty() {
                self.refresh_situation();
                self.check_convergence();
                if self.stop.is_none() {
                    warn!(
                        queued = self.queue.len(),
                        "no runnable tasks remain, stopping"
                    );
                    self.stop = Some(TerminationReason::NoRunnableTasks);
                }
                break;
            }

            self.emit(EngineEvent::RoundStarted {
                iteration: self.iterations + 1,
                batch: batch.len(),
            })
            .await;
            self.dispatch_round(batch).await;

            while !self.in_flight.is_empty() && self.stop.is_none() {
                self.wait_for_outcome().await;
            }
            if self.in_flight.is_empty() {
                self.finish_round().await;
            }
        }
    }

    async fn dispatch_round(&mut self, batch: Vec<Uuid>) {
        let engine = self.engine;
        for task_id in batch {
            if self.stop.is_some() {
                break;
            }
            let Some(task) = self.tree.get(task_id).cloned() else {
                continue;
            };

            if let DependencyState::Broken(dependency) = self.tree.dependency_state(task_id) {
                self.cancel_task(task_id, &format!("dependency {dependency} did not complete"))
                    .await;
                continue;
            }

            let executor = if task.flag("decompose") {
                Executor::Decomposer(Arc::clone(&engine.decomposer))
            } else {
                match self.select_handler(&task).await {
                    Some(executor) => executor,
                    None => continue,
                }
            };
            self.dispatch(task, executor).await;
        }
    }

    /// Route `task`, waiting for capacity when every match is busy.
    async fn select_handler(&mut self, task: &Task) -> Option<Executor> {
        let engine = self.engine;
        loop {
            match self.router.route(task, &engine.handlers) {
                Ok(Route::Assigned(index)) => {
                    return Some(Executor::Handler {
                        index,
                        handler: Arc::clone(&engine.handlers[index]),
                    });
                }
                Ok(Route::Busy) if !self.in_flight.is_empty() => {
                    self.wait_for_outcome().await;
                    if self.stop.is_some() {
                        return None;
                    }
                }
                Ok(Route::Busy) => {
                    self.fail_task(task.id, "matching handlers are saturated").await;
                    return None;
                }
                Err(err) => {
                    self.fail_task(task.id, &err.to_string()).await;
                    return None;
                }
            }
        }
    }

    async fn dispatch(&mut self, task: Task, executor: Executor) {
        if let Err(err) = self.tree.transition(task.id, TaskStatus::InProgress) {
            warn!(task_id = %task.id, error = %err, "cannot dispatch task");
            return;
        }
        let handler_index = executor.handler_index();
        if let Some(index) = handler_index {
            self.router.acquire(index);
        }

        let context = self.context_builder.build(
            &task,
            &self.tree,
            &self.artifacts,
            &self.knowledge,
            &self.situation,
        );
        let seq = self.next_seq;
        self.next_seq += 1;
        self.in_flight.insert(task.id, handler_index);

        let label = executor.label();
        info!(task_id = %task.id, objective = %task.objective, handler = %label, "dispatching task");
        self.emit(EngineEvent::TaskDispatched {
            task_id: task.id,
            handler: label,
        })
        .await;

        self.pool.spawn(Assignment {
            seq,
            task,
            executor,
            context,
        });
        self.refresh_situation();
    }

    async fn wait_for_outcome(&mut self) {
        let deadline = self.deadline;
        let wake = tokio::select! {
            outcome = self.results.recv() => Wake::Outcome(outcome),
            () = self.external.cancelled() => Wake::Cancelled,
            () = tokio::time::sleep_until(deadline) => Wake::Deadline,
        };

        match wake {
            Wake::Outcome(Some(outcome)) => self.apply_outcome(outcome).await,
            Wake::Outcome(None) => {}
            Wake::Cancelled => {
                info!("run cancelled by caller");
                self.set_stop(TerminationReason::Cancelled);
            }
            Wake::Deadline => {
                warn!("session time budget exhausted while waiting on handlers");
                self.set_stop(TerminationReason::TimeBudgetExceeded);
            }
        }
    }

    async fn apply_outcome(&mut self, outcome: WorkerOutcome) {
        self.in_flight.remove(&outcome.task_id);
        if let Some(index) = outcome.handler_index {
            self.router.release(index);
        }
        let task_id = outcome.task_id;
        let Some(task) = self.tree.get(task_id).cloned() else {
            return;
        };

        match outcome.result {
            Ok(result) => {
                self.tokens_used += result.tokens_used;
                if result.success && result.is_escalation() {
                    if self.complete_task(task_id, result, outcome.seq) {
                        info!(task_id = %task_id, "human review escalated");
                        self.escalated.push(task_id);
                        self.emit(EngineEvent::TaskEscalated { task_id }).await;
                    }
                } else {
                    let verdict = self.engine.verifier.verify(&task, &result);
                    if verdict.accepted {
                        if self.complete_task(task_id, result, outcome.seq) {
                            debug!(task_id = %task_id, quality = verdict.quality, "task completed");
                            self.emit(EngineEvent::TaskCompleted {
                                task_id,
                                quality: verdict.quality,
                            })
                            .await;
                        }
                    } else {
                        self.fail_task(task_id, &verdict.reason).await;
                    }
                }
            }
            Err(HandlerError::Cancelled) => self.cancel_task(task_id, "handler cancelled").await,
            Err(err) => self.fail_task(task_id, &err.to_string()).await,
        }

        self.refresh_situation();
        self.check_convergence();
    }

    /// Mark a task completed and keep what it produced. Returns false when
    /// the task had already reached a terminal state.
    fn complete_task(&mut self, task_id: Uuid, result: TaskResult, seq: usize) -> bool {
        if self.tree.transition(task_id, TaskStatus::Completed).is_err() {
            return false;
        }

        merge_knowledge(&mut self.knowledge, &result);
        let counts_as_evidence = !result.is_plan() && !result.artifacts.is_empty();
        for value in result.artifacts {
            self.artifact_bytes += value.to_string().len();
            let record = ArtifactRecord { task_id, value };
            if counts_as_evidence {
                self.evidence.push(record.clone());
            }
            self.artifacts.push(record);
        }
        if counts_as_evidence {
            if let Some(goal) = self.tree.get(self.root_id) {
                self.goal_satisfaction =
                    self.engine.verifier.goal_satisfaction(goal, &self.evidence);
            }
        }
        if !result.new_tasks.is_empty() {
            self.proposals.insert(seq, (task_id, result.new_tasks));
        }
        true
    }

    async fn fail_task(&mut self, task_id: Uuid, reason: &str) {
        if self.tree.transition(task_id, TaskStatus::Failed).is_ok() {
            warn!(task_id = %task_id, reason, "task failed");
            self.emit(EngineEvent::TaskFailed {
                task_id,
                error: reason.to_string(),
            })
            .await;
        }
    }

    /// Cancel `task_id` along with any open descendants.
    async fn cancel_task(&mut self, task_id: Uuid, reason: &str) {
        for cancelled in self.tree.cancel_subtree(task_id) {
            info!(task_id = %cancelled, reason, "task cancelled");
            self.emit(EngineEvent::TaskCancelled { task_id: cancelled })
                .await;
        }
    }

    /// Insert proposals under `parent`; rejected ones are logged and skipped.
    async fn admit(&mut self, parent: Uuid, specs: Vec<TaskSpec>) -> Vec<Uuid> {
        let mut admitted = Vec::with_capacity(specs.len());
        for spec in specs {
            let objective = spec.objective.clone();
            let task = Task::from_spec(spec, parent);
            let id = task.id;
            match self.tree.add(task) {
                Ok(depth) => {
                    debug!(task_id = %id, parent_id = %parent, depth, "task admitted");
                    admitted.push(id);
                }
                Err(err) => {
                    warn!(parent_id = %parent, objective = %objective, error = %err, "task rejected");
                    self.emit(EngineEvent::TaskRejected {
                        parent_id: parent,
                        objective: objective.clone(),
                        error: err.to_string(),
                    })
                    .await;
                    self.rejected.push(RejectedInsertion {
                        objective,
                        parent_id: parent,
                        error: err.to_string(),
                    });
                }
            }
        }
        admitted
    }

    /// Close a fully resolved round: admit its proposals in dispatch order,
    /// then check for loops and convergence. A stopped run admits nothing.
    async fn finish_round(&mut self) {
        if self.stop.is_none() {
            let proposals = std::mem::take(&mut self.proposals);
            let mut admitted = Vec::new();
            for (parent, specs) in proposals.into_values() {
                admitted.extend(self.admit(parent, specs).await);
            }
            self.queue.admit(&admitted);
        }

        self.iterations += 1;
        self.refresh_situation();
        self.emit(EngineEvent::RoundCompleted {
            iteration: self.iterations,
            pending: self.situation.pending_tasks,
            completed: self.situation.completed_tasks,
            failed: self.situation.failed_tasks,
        })
        .await;
        if self.stop.is_some() {
            return;
        }

        if self.engine.config.convergence.loop_detection_enabled {
            self.loop_detector.record(&self.situation.snapshot());
            if self.loop_detector.is_loop() {
                warn!(
                    iteration = self.iterations,
                    snapshot = %self.situation.snapshot().key(),
                    "loop detected, stopping"
                );
                self.emit(EngineEvent::LoopDetected {
                    iteration: self.iterations,
                })
                .await;
                self.set_stop(TerminationReason::LoopDetected);
                return;
            }
        }
        self.check_convergence();
    }

    /// Stop workers, settle outstanding results, cancel whatever is open.
    async fn shutdown(&mut self) {
        self.workers.cancel();
        while !self.in_flight.is_empty() {
            match self.results.recv().await {
                Some(outcome) => self.apply_outcome(outcome).await,
                None => break,
            }
        }

        self.queue.drain();
        self.proposals.clear();
        for task_id in self.tree.cancel_open() {
            self.emit(EngineEvent::TaskCancelled { task_id }).await;
        }
        self.refresh_situation();
    }

    fn refresh_situation(&mut self) {
        let counts = self.tree.status_counts();
        let awaiting: usize = self.proposals.values().map(|(_, specs)| specs.len()).sum();
        let mut situation = Situation {
            pending_tasks: counts.pending + counts.in_progress + awaiting,
            completed_tasks: counts.completed,
            failed_tasks: counts.failed,
            cancelled_tasks: counts.cancelled,
            total_tokens_used: self.tokens_used,
            memory_usage_bytes: self.artifact_bytes,
            elapsed: self.started.elapsed(),
            active_agents: self.in_flight.len(),
            iterations: self.iterations,
            goal_satisfaction: self.goal_satisfaction,
            last_update: Utc::now(),
            status_summary: String::new(),
        };
        situation.status_summary = situation.summarize();
        self.situation = situation;
    }

    fn check_convergence(&mut self) {
        if self.stop.is_some() {
            return;
        }
        if let (true, Some(reason)) = self
            .engine
            .convergence
            .should_terminate(&self.situation, &self.budgets)
        {
            info!(reason = %reason, summary = %self.situation.status_summary, "convergence reached");
            self.stop = Some(reason);
        }
    }

    fn set_stop(&mut self, reason: TerminationReason) {
        if self.stop.is_none() {
            self.stop = Some(reason);
        }
    }

    fn into_report(self, convergence: &ConvergenceManager) -> ExecutionReport {
        let counts = self.tree.status_counts();
        let reason = self.stop.unwrap_or(TerminationReason::NoRunnableTasks);
        ExecutionReport {
            root_id: self.root_id,
            outcome: RunOutcome::classify(reason, &counts),
            reason,
            counts,
            artifacts: self.artifacts,
            escalated: self.escalated,
            rejected: self.rejected,
            intervention: convergence.suggest_intervention(&self.situation),
            progress: convergence.progress_score(&self.situation),
            situation: self.situation,
            elapsed: self.started.elapsed(),
            tree: self.tree,
        }
    }
}
