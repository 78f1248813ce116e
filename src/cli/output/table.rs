//! Table output formatting for CLI commands
//!
//! Run summaries and per-task listings rendered with comfy-table.

use comfy_table::{presets, Attribute, Cell, Color, ContentArrangement, Table};

use crate::domain::models::{ExecutionReport, ExecutionTree, RunOutcome, TaskStatus};

use super::truncate;
use super::tree::{short_id, status_icon};

/// Table formatter for CLI output
pub struct TableFormatter {
    use_colors: bool,
    max_width: Option<u16>,
}

impl TableFormatter {
    pub fn new() -> Self {
        Self {
            use_colors: console::colors_enabled(),
            max_width: None,
        }
    }

    pub const fn with_config(use_colors: bool, max_width: Option<u16>) -> Self {
        Self {
            use_colors,
            max_width,
        }
    }

    fn create_base_table(&self) -> Table {
        let mut table = Table::new();
        table
            .load_preset(presets::UTF8_FULL_CONDENSED)
            .set_content_arrangement(ContentArrangement::Dynamic);
        if let Some(width) = self.max_width {
            table.set_width(width);
        }
        if !self.use_colors {
            table.force_no_tty();
        }
        table
    }

    /// Key/value summary of a finished run.
    pub fn format_summary(&self, report: &ExecutionReport) -> String {
        let mut table = self.create_base_table();
        table.set_header(header(&["Field", "Value"]));

        let outcome = Cell::new(report.outcome.as_str());
        let outcome = if self.use_colors {
            outcome.fg(outcome_color(report.outcome))
        } else {
            outcome
        };

        table.add_row(vec![Cell::new("Outcome"), outcome]);
        table.add_row(vec![Cell::new("Reason"), Cell::new(report.reason.as_str())]);
        table.add_row(vec![
            Cell::new("Tasks"),
            Cell::new(format!(
                "{} total, {} completed, {} failed, {} cancelled",
                report.counts.total,
                report.counts.completed,
                report.counts.failed,
                report.counts.cancelled
            )),
        ]);
        table.add_row(vec![
            Cell::new("Rounds"),
            Cell::new(report.situation.iterations),
        ]);
        table.add_row(vec![
            Cell::new("Tokens"),
            Cell::new(report.situation.total_tokens_used),
        ]);
        table.add_row(vec![
            Cell::new("Progress"),
            Cell::new(format!("{:.0}%", report.progress * 100.0)),
        ]);
        table.add_row(vec![
            Cell::new("Goal coverage"),
            Cell::new(format!("{:.0}%", report.situation.goal_satisfaction * 100.0)),
        ]);
        table.add_row(vec![
            Cell::new("Elapsed"),
            Cell::new(format!("{:.2}s", report.elapsed.as_secs_f64())),
        ]);
        if !report.escalated.is_empty() {
            table.add_row(vec![
                Cell::new("Escalated"),
                Cell::new(report.escalated.len()),
            ]);
        }
        if !report.rejected.is_empty() {
            table.add_row(vec![
                Cell::new("Rejected proposals"),
                Cell::new(report.rejected.len()),
            ]);
        }
        if let Some(advice) = &report.intervention {
            table.add_row(vec![Cell::new("Advice"), Cell::new(advice)]);
        }

        table.to_string()
    }

    /// One row per task, in admission order.
    pub fn format_tasks(&self, tree: &ExecutionTree) -> String {
        let mut table = self.create_base_table();
        table.set_header(header(&["ID", "Objective", "Status", "Depth", "Priority"]));

        for id in tree.path() {
            let Some(task) = tree.get(*id) else {
                continue;
            };
            let status = if self.use_colors {
                Cell::new(task.status.as_str()).fg(status_color(task.status))
            } else {
                Cell::new(format!("{} {}", status_icon(task.status), task.status.as_str()))
            };
            table.add_row(vec![
                Cell::new(short_id(task.id)),
                Cell::new(truncate(&task.objective, 48)),
                status,
                Cell::new(tree.depth(task.id).unwrap_or_default()),
                Cell::new(task.priority.as_str()),
            ]);
        }

        table.to_string()
    }
}

impl Default for TableFormatter {
    fn default() -> Self {
        Self::new()
    }
}

fn header(names: &[&str]) -> Vec<Cell> {
    names
        .iter()
        .map(|name| Cell::new(name).add_attribute(Attribute::Bold))
        .collect()
}

/// Map status to comfy-table color
pub const fn status_color(status: TaskStatus) -> Color {
    match status {
        TaskStatus::Completed => Color::Green,
        TaskStatus::InProgress => Color::Cyan,
        TaskStatus::Failed => Color::Red,
        TaskStatus::Cancelled => Color::DarkGrey,
        TaskStatus::Pending => Color::White,
    }
}

const fn outcome_color(outcome: RunOutcome) -> Color {
    match outcome {
        RunOutcome::Converged => Color::Green,
        RunOutcome::Partial => Color::Yellow,
        RunOutcome::LoopAborted => Color::Red,
        RunOutcome::Cancelled => Color::DarkGrey,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::models::Task;

    #[test]
    fn test_task_table_lists_every_task() {
        let mut tree = ExecutionTree::new(3, 10);
        let root = Task::new("root goal", "");
        let child = Task::new("child step", "").with_parent(root.id);
        tree.add(root).unwrap();
        tree.add(child).unwrap();

        let rendered = TableFormatter::with_config(false, Some(120)).format_tasks(&tree);
        assert!(rendered.contains("root goal"));
        assert!(rendered.contains("child step"));
        assert!(rendered.contains("○ pending"));
    }
}
