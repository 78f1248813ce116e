use console::style;
use uuid::Uuid;

use crate::domain::models::{ExecutionTree, TaskStatus};

use super::truncate;

/// Unicode box-drawing characters for tree visualization
const TREE_BRANCH: &str = "├── ";
const TREE_LAST: &str = "└── ";
const TREE_PIPE: &str = "│   ";
const TREE_SPACE: &str = "    ";

const OBJECTIVE_WIDTH: usize = 60;

/// Render every root of `tree` with its descendants, in admission order.
pub fn render_execution_tree(tree: &ExecutionTree, use_color: bool) -> String {
    let roots = tree.roots();
    let mut output = String::new();
    for (i, root) in roots.iter().enumerate() {
        render_node(tree, *root, 0, true, "", use_color, &mut output);
        if i + 1 < roots.len() {
            output.push('\n');
        }
    }
    output
}

fn render_node(
    tree: &ExecutionTree,
    task_id: Uuid,
    depth: usize,
    is_last: bool,
    prefix: &str,
    use_color: bool,
    output: &mut String,
) {
    let Some(task) = tree.get(task_id) else {
        output.push_str(&format!("{prefix}[Task not found: {task_id}]\n"));
        return;
    };

    let connector = if depth == 0 {
        ""
    } else if is_last {
        TREE_LAST
    } else {
        TREE_BRANCH
    };

    output.push_str(&format!(
        "{prefix}{connector}{} {} [{}]\n",
        render_status(task.status, use_color),
        truncate(&task.objective, OBJECTIVE_WIDTH),
        short_id(task.id)
    ));

    let children = tree.children(task_id);
    let child_prefix = if depth == 0 {
        String::new()
    } else if is_last {
        format!("{prefix}{TREE_SPACE}")
    } else {
        format!("{prefix}{TREE_PIPE}")
    };
    for (i, child) in children.iter().enumerate() {
        let last_child = i + 1 == children.len();
        render_node(
            tree,
            *child,
            depth + 1,
            last_child,
            &child_prefix,
            use_color,
            output,
        );
    }
}

/// Status icon, colored when `use_color` is set.
pub fn render_status(status: TaskStatus, use_color: bool) -> String {
    let icon = status_icon(status);
    if !use_color {
        return icon.to_string();
    }
    match status {
        TaskStatus::Completed => style(icon).green().to_string(),
        TaskStatus::InProgress => style(icon).cyan().to_string(),
        TaskStatus::Failed => style(icon).red().to_string(),
        TaskStatus::Cancelled => style(icon).dim().to_string(),
        TaskStatus::Pending => style(icon).white().to_string(),
    }
}

/// Map status to visual icon
pub const fn status_icon(status: TaskStatus) -> &'static str {
    match status {
        TaskStatus::Completed => "✓",
        TaskStatus::InProgress => "⟳",
        TaskStatus::Failed => "✗",
        TaskStatus::Cancelled => "⊘",
        TaskStatus::Pending => "○",
    }
}

/// First 8 characters of a UUID
pub fn short_id(id: Uuid) -> String {
    id.to_string()[..8].to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::models::Task;

    #[test]
    fn test_render_nested_tree() {
        let mut tree = ExecutionTree::new(5, 50);
        let root = Task::new("write report", "");
        let a = Task::new("research", "").with_parent(root.id);
        let b = Task::new("draft", "").with_parent(root.id);
        let a1 = Task::new("find sources", "").with_parent(a.id);
        let (root_id, a_id, b_id, a1_id) = (root.id, a.id, b.id, a1.id);
        for task in [root, a, b, a1] {
            tree.add(task).unwrap();
        }
        tree.transition(a1_id, TaskStatus::InProgress).unwrap();
        tree.transition(a1_id, TaskStatus::Completed).unwrap();

        let rendered = render_execution_tree(&tree, false);
        let lines: Vec<&str> = rendered.lines().collect();
        assert_eq!(lines.len(), 4);
        assert_eq!(lines[0], format!("○ write report [{}]", short_id(root_id)));
        assert_eq!(lines[1], format!("├── ○ research [{}]", short_id(a_id)));
        assert_eq!(lines[2], format!("│   └── ✓ find sources [{}]", short_id(a1_id)));
        assert_eq!(lines[3], format!("└── ○ draft [{}]", short_id(b_id)));
    }

    #[test]
    fn test_empty_tree_renders_nothing() {
        assert!(render_execution_tree(&ExecutionTree::new(3, 10), false).is_empty());
    }
}
