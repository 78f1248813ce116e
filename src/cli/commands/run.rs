//! `canopy run`: drive a goal with the scripted offline adapters.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Args;
use serde::Serialize;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use uuid::Uuid;

use crate::adapters::{
    HumanHandler, InMemoryTools, PlanDecomposer, ReasoningHandler, ScriptedHumanChannel,
    ScriptedPlan, ScriptedReasoning, SearchHandler, StaticSearch, ToolHandler,
};
use crate::application::{EngineEvent, ExecutionEngine};
use crate::cli::output::table::TableFormatter;
use crate::cli::output::tree::render_execution_tree;
use crate::cli::output::{output, truncate, CommandOutput};
use crate::domain::models::{
    ArtifactRecord, Config, ExecutionReport, ExecutionStrategy, RejectedInsertion, RunOutcome,
    StatusCounts, Task, TerminationReason,
};
use crate::infrastructure::config::ConfigLoader;
use crate::services::RetryPolicy;

#[derive(Args, Debug)]
pub struct RunArgs {
    /// Goal to pursue
    pub goal: String,

    /// Additional context for the goal
    #[arg(short, long, default_value = "")]
    pub description: String,

    /// Traversal strategy (dfs, bfs, hybrid)
    #[arg(short, long)]
    pub strategy: Option<String>,

    /// Maximum tasks in flight at once
    #[arg(long)]
    pub max_parallel: Option<usize>,

    /// Maximum depth of the task tree
    #[arg(long)]
    pub max_depth: Option<usize>,

    /// Plan file scripting decomposition and handler replies
    #[arg(short, long)]
    pub plan: Option<PathBuf>,

    /// Stream engine events to stderr as JSON lines
    #[arg(long)]
    pub events: bool,

    /// List tasks as a table instead of a tree
    #[arg(long)]
    pub table: bool,
}

impl RunArgs {
    /// Apply command-line overrides on top of loaded configuration.
    pub fn apply(&self, config: &mut Config) -> Result<()> {
        if let Some(strategy) = &self.strategy {
            config.execution.strategy = ExecutionStrategy::from_str(strategy)
                .with_context(|| format!("Unknown strategy: {strategy} (expected dfs, bfs, hybrid)"))?;
        }
        if let Some(max_parallel) = self.max_parallel {
            config.resources.max_parallel_agents = max_parallel;
        }
        if let Some(max_depth) = self.max_depth {
            config.execution.max_tree_depth = max_depth;
        }
        ConfigLoader::validate(config)?;
        Ok(())
    }
}

/// Engine wired to the in-process adapters, scripted by `plan`.
pub fn build_engine(config: Arc<Config>, plan: ScriptedPlan) -> ExecutionEngine {
    let capacity = config.resources.max_parallel_agents;
    let retry = RetryPolicy::from_config(&config.handlers.retry);

    let reasoning = Arc::new(ScriptedReasoning::new().with_answers(plan.answers.clone()));
    let tools = Arc::new(InMemoryTools::with_echo());
    let search = Arc::new(StaticSearch::new(plan.search_hits.clone()));
    let reviewer = Arc::new(ScriptedHumanChannel::replying(
        plan.human_responses.clone(),
        1,
    ));
    let decomposer = Arc::new(PlanDecomposer::new(plan));

    ExecutionEngine::new(Arc::clone(&config), decomposer)
        .with_handler(Arc::new(
            ReasoningHandler::new("reasoner", reasoning).with_capacity(capacity),
        ))
        .with_handler(Arc::new(
            ToolHandler::new("tools", tools)
                .with_retry(retry)
                .with_capacity(capacity),
        ))
        .with_handler(Arc::new(
            SearchHandler::new("search", search).with_capacity(capacity),
        ))
        .with_handler(Arc::new(HumanHandler::new(
            "reviewer",
            "operator",
            reviewer,
            config.human.clone(),
        )))
}

#[derive(Debug, Serialize)]
pub struct RunOutput {
    pub root_id: Uuid,
    pub outcome: RunOutcome,
    pub reason: TerminationReason,
    pub counts: StatusCounts,
    pub progress: f64,
    pub elapsed_ms: u128,
    pub escalated: Vec<Uuid>,
    pub rejected: Vec<RejectedInsertion>,
    pub intervention: Option<String>,
    pub artifacts: Vec<ArtifactRecord>,
    #[serde(skip)]
    report: ExecutionReport,
    #[serde(skip)]
    table: bool,
}

impl From<ExecutionReport> for RunOutput {
    fn from(report: ExecutionReport) -> Self {
        Self {
            root_id: report.root_id,
            outcome: report.outcome,
            reason: report.reason,
            counts: report.counts,
            progress: report.progress,
            elapsed_ms: report.elapsed.as_millis(),
            escalated: report.escalated.clone(),
            rejected: report.rejected.clone(),
            intervention: report.intervention.clone(),
            artifacts: report.artifacts.clone(),
            report,
            table: false,
        }
    }
}

impl RunOutput {
    #[must_use]
    pub fn with_table(mut self, table: bool) -> Self {
        self.table = table;
        self
    }
}

impl CommandOutput for RunOutput {
    fn to_human(&self) -> String {
        let formatter = TableFormatter::new();
        let tasks = if self.table {
            formatter.format_tasks(&self.report.tree)
        } else {
            render_execution_tree(&self.report.tree, console::colors_enabled())
                .trim_end()
                .to_string()
        };
        let mut sections = vec![formatter.format_summary(&self.report), tasks];

        if !self.artifacts.is_empty() {
            let mut lines = vec![format!("Artifacts ({}):", self.artifacts.len())];
            for record in &self.artifacts {
                let text = match &record.value {
                    serde_json::Value::String(s) => s.clone(),
                    other => other.to_string(),
                };
                lines.push(format!(
                    "  [{}] {}",
                    &record.task_id.to_string()[..8],
                    truncate(&text, 100)
                ));
            }
            sections.push(lines.join("\n"));
        }

        if !self.rejected.is_empty() {
            let mut lines = vec!["Rejected proposals:".to_string()];
            for rejected in &self.rejected {
                lines.push(format!("  {}: {}", rejected.objective, rejected.error));
            }
            sections.push(lines.join("\n"));
        }

        sections.join("\n\n")
    }

    fn to_json(&self) -> serde_json::Value {
        let mut value = serde_json::to_value(self).unwrap_or_default();
        if let Some(map) = value.as_object_mut() {
            let tasks: Vec<&Task> = self
                .report
                .tree
                .path()
                .iter()
                .filter_map(|id| self.report.tree.get(*id))
                .collect();
            map.insert(
                "tasks".to_string(),
                serde_json::to_value(tasks).unwrap_or_default(),
            );
        }
        value
    }
}

pub async fn execute(args: RunArgs, mut config: Config, json_mode: bool) -> Result<()> {
    args.apply(&mut config)?;
    let plan = match &args.plan {
        Some(path) => ScriptedPlan::load(path)?,
        None => ScriptedPlan::default(),
    };
    let config = Arc::new(config);

    let cancel = CancellationToken::new();
    let interrupt = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("interrupt received, cancelling run");
            interrupt.cancel();
        }
    });

    let mut engine = build_engine(Arc::clone(&config), plan);
    let printer = if args.events {
        let (tx, rx) = mpsc::channel(256);
        engine = engine.with_events(tx);
        Some(tokio::spawn(print_events(rx)))
    } else {
        None
    };

    let goal = Task::new(args.goal.clone(), args.description.clone());
    info!(goal = %goal.objective, strategy = config.execution.strategy.as_str(), "starting run");
    let report = engine
        .run_with_cancel(goal, cancel)
        .await
        .context("Run failed")?;

    drop(engine);
    if let Some(printer) = printer {
        let _ = printer.await;
    }

    output(&RunOutput::from(report).with_table(args.table), json_mode);
    Ok(())
}

async fn print_events(mut rx: mpsc::Receiver<EngineEvent>) {
    while let Some(event) = rx.recv().await {
        if let Ok(line) = serde_json::to_string(&event) {
            eprintln!("{line}");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(strategy: Option<&str>) -> RunArgs {
        RunArgs {
            goal: "goal".to_string(),
            description: String::new(),
            strategy: strategy.map(str::to_string),
            max_parallel: Some(2),
            max_depth: Some(4),
            plan: None,
            events: false,
            table: false,
        }
    }

    #[test]
    fn test_overrides_applied() {
        let mut config = Config::default();
        args(Some("bfs")).apply(&mut config).unwrap();
        assert_eq!(config.execution.strategy, ExecutionStrategy::Bfs);
        assert_eq!(config.resources.max_parallel_agents, 2);
        assert_eq!(config.execution.max_tree_depth, 4);
    }

    #[test]
    fn test_unknown_strategy_rejected() {
        let mut config = Config::default();
        assert!(args(Some("random")).apply(&mut config).is_err());
    }

    #[test]
    fn test_out_of_range_override_rejected() {
        let mut config = Config::default();
        let mut bad = args(None);
        bad.max_parallel = Some(0);
        assert!(bad.apply(&mut config).is_err());
    }

    #[tokio::test]
    async fn test_unplanned_goal_runs_on_reasoner() {
        let engine = build_engine(Arc::new(Config::default()), ScriptedPlan::default());
        let report = engine
            .run(Task::new("summarize rust ownership", ""))
            .await
            .unwrap();

        assert_eq!(report.counts.total, 1);
        assert_eq!(report.counts.completed, 1);
        assert_eq!(report.outcome, RunOutcome::Converged);

        let out = RunOutput::from(report).with_table(true);
        assert_eq!(out.to_json()["tasks"].as_array().map(Vec::len), Some(1));
        assert!(out.to_human().contains("summarize rust ownership"));
    }
}
