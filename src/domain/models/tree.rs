//! Execution tree: every task admitted during a run, its lineage, and the
//! order of admission.
//!
//! The tree is owned by the engine's control loop. Tasks are never removed;
//! they only move forward through [`TaskStatus`] until they are terminal.

use std::collections::{HashMap, VecDeque};

use chrono::Utc;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::errors::{DomainError, DomainResult};

use super::report::StatusCounts;
use super::task::{Task, TaskStatus};

/// Readiness of a task with respect to its dependencies.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DependencyState {
    /// Every dependency completed
    Satisfied,
    /// At least one dependency is still open
    Waiting,
    /// A dependency failed or was cancelled; the task can never run
    Broken(Uuid),
}

/// Task graph keyed by id, with parent→children adjacency and cached depths.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionTree {
    tasks: HashMap<Uuid, Task>,
    children: HashMap<Uuid, Vec<Uuid>>,
    depths: HashMap<Uuid, usize>,
    path: Vec<Uuid>,
    max_depth: usize,
    max_open: usize,
}

impl ExecutionTree {
    /// Create an empty tree. The root sits at depth 0; no task may sit deeper
    /// than `max_depth`, and at most `max_open` non-terminal tasks are held.
    pub fn new(max_depth: usize, max_open: usize) -> Self {
        Self {
            tasks: HashMap::new(),
            children: HashMap::new(),
            depths: HashMap::new(),
            path: Vec::new(),
            max_depth,
            max_open,
        }
    }

    /// Admit a task. Returns its depth.
    pub fn add(&mut self, task: Task) -> DomainResult<usize> {
        if self.tasks.contains_key(&task.id) {
            return Err(DomainError::DuplicateTaskId(task.id));
        }

        let depth = match task.parent_id {
            Some(parent) => {
                let parent_depth = self.depths.get(&parent).copied().ok_or(
                    DomainError::UnknownParent {
                        child: task.id,
                        parent,
                    },
                )?;
                parent_depth + 1
            }
            None => 0,
        };
        if depth > self.max_depth {
            return Err(DomainError::DepthExceeded {
                task: task.id,
                depth,
                max: self.max_depth,
            });
        }

        if let Some(missing) = task.depends_on.iter().find(|d| !self.tasks.contains_key(d)) {
            return Err(DomainError::UnknownDependency {
                task: task.id,
                dependency: *missing,
            });
        }

        if self.open_count() >= self.max_open {
            return Err(DomainError::QueueFull {
                limit: self.max_open,
            });
        }

        if let Some(parent) = task.parent_id {
            self.children.entry(parent).or_default().push(task.id);
        }
        self.depths.insert(task.id, depth);
        self.path.push(task.id);
        self.tasks.insert(task.id, task);
        Ok(depth)
    }

    pub fn get(&self, id: Uuid) -> Option<&Task> {
        self.tasks.get(&id)
    }

    pub fn contains(&self, id: Uuid) -> bool {
        self.tasks.contains_key(&id)
    }

    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    pub const fn max_depth(&self) -> usize {
        self.max_depth
    }

    /// Distance from the task to its root, `None` when unknown.
    pub fn depth(&self, id: Uuid) -> Option<usize> {
        self.depths.get(&id).copied()
    }

    /// Task ids in admission order.
    pub fn path(&self) -> &[Uuid] {
        &self.path
    }

    /// Tasks without a parent, in admission order.
    pub fn roots(&self) -> Vec<Uuid> {
        self.path
            .iter()
            .copied()
            .filter(|id| self.tasks.get(id).is_some_and(Task::is_root))
            .collect()
    }

    pub fn children(&self, id: Uuid) -> &[Uuid] {
        self.children.get(&id).map_or(&[], Vec::as_slice)
    }

    /// Parent first, root last.
    pub fn ancestors(&self, id: Uuid) -> Vec<Uuid> {
        let mut chain = Vec::new();
        let mut current = self.tasks.get(&id).and_then(|t| t.parent_id);
        while let Some(parent) = current {
            chain.push(parent);
            current = self.tasks.get(&parent).and_then(|t| t.parent_id);
        }
        chain
    }

    /// All descendants of `id` in breadth-first order, excluding `id`.
    pub fn subtree(&self, id: Uuid) -> Vec<Uuid> {
        let mut out = Vec::new();
        let mut queue: VecDeque<Uuid> = self.children(id).iter().copied().collect();
        while let Some(next) = queue.pop_front() {
            out.push(next);
            queue.extend(self.children(next).iter().copied());
        }
        out
    }

    /// Move a task to `status`. Returns the previous status.
    pub fn transition(&mut self, id: Uuid, status: TaskStatus) -> DomainResult<TaskStatus> {
        let task = self
            .tasks
            .get_mut(&id)
            .ok_or(DomainError::TaskNotFound(id))?;
        let from = task.status;
        if !from.can_transition_to(status) {
            return Err(DomainError::InvalidStateTransition {
                task: id,
                from: from.to_string(),
                to: status.to_string(),
            });
        }
        task.status = status;
        task.updated_at = Utc::now();
        Ok(from)
    }

    /// Cancel `id` and every open descendant. Returns the ids that changed.
    pub fn cancel_subtree(&mut self, id: Uuid) -> Vec<Uuid> {
        let mut targets = vec![id];
        targets.extend(self.subtree(id));
        self.cancel_all(&targets)
    }

    /// Cancel every non-terminal task. Returns the ids that changed.
    pub fn cancel_open(&mut self) -> Vec<Uuid> {
        let targets = self.path.clone();
        self.cancel_all(&targets)
    }

    fn cancel_all(&mut self, targets: &[Uuid]) -> Vec<Uuid> {
        targets
            .iter()
            .copied()
            .filter(|id| self.transition(*id, TaskStatus::Cancelled).is_ok())
            .collect()
    }

    pub fn dependency_state(&self, id: Uuid) -> DependencyState {
        let Some(task) = self.tasks.get(&id) else {
            return DependencyState::Waiting;
        };
        let mut waiting = false;
        for dep in &task.depends_on {
            match self.tasks.get(dep).map(|t| t.status) {
                Some(TaskStatus::Completed) => {}
                Some(TaskStatus::Failed | TaskStatus::Cancelled) | None => {
                    return DependencyState::Broken(*dep)
                }
                Some(_) => waiting = true,
            }
        }
        if waiting {
            DependencyState::Waiting
        } else {
            DependencyState::Satisfied
        }
    }

    /// Tasks not yet in a terminal state.
    pub fn open_count(&self) -> usize {
        self.tasks.values().filter(|t| !t.status.is_terminal()).count()
    }

    pub fn status_counts(&self) -> StatusCounts {
        let mut counts = StatusCounts::default();
        for task in self.tasks.values() {
            counts.record(task.status);
        }
        counts
    }

    /// Tasks in admission order.
    pub fn iter(&self) -> impl Iterator<Item = &Task> {
        self.path.iter().filter_map(|id| self.tasks.get(id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chain(tree: &mut ExecutionTree, length: usize) -> Vec<Uuid> {
        let root = Task::new("root", "");
        let mut ids = vec![root.id];
        tree.add(root).unwrap();
        for i in 1..length {
            let child = Task::new(format!("level {i}"), "").with_parent(ids[i - 1]);
            ids.push(child.id);
            tree.add(child).unwrap();
        }
        ids
    }

    #[test]
    fn test_add_records_path_and_depth() {
        let mut tree = ExecutionTree::new(5, 100);
        let ids = chain(&mut tree, 3);
        assert_eq!(tree.path(), ids.as_slice());
        assert_eq!(tree.depth(ids[0]), Some(0));
        assert_eq!(tree.depth(ids[2]), Some(2));
        assert_eq!(tree.children(ids[0]), &[ids[1]]);
        assert_eq!(tree.roots(), vec![ids[0]]);
    }

    #[test]
    fn test_duplicate_rejected() {
        let mut tree = ExecutionTree::new(5, 100);
        let task = Task::new("root", "");
        tree.add(task.clone()).unwrap();
        assert!(matches!(tree.add(task), Err(DomainError::DuplicateTaskId(_))));
        assert_eq!(tree.len(), 1);
    }

    #[test]
    fn test_unknown_parent_rejected() {
        let mut tree = ExecutionTree::new(5, 100);
        let orphan = Task::new("orphan", "").with_parent(Uuid::new_v4());
        assert!(matches!(tree.add(orphan), Err(DomainError::UnknownParent { .. })));
        assert!(tree.is_empty());
    }

    #[test]
    fn test_depth_exceeded_leaves_siblings_alone() {
        let mut tree = ExecutionTree::new(3, 100);
        let ids = chain(&mut tree, 4);
        let deepest = ids[3];
        assert_eq!(tree.depth(deepest), Some(3));

        let sibling = Task::new("sibling", "").with_parent(ids[2]);
        let sibling_id = sibling.id;
        tree.add(sibling).unwrap();

        let too_deep = Task::new("too deep", "").with_parent(deepest);
        let err = tree.add(too_deep).unwrap_err();
        assert!(matches!(err, DomainError::DepthExceeded { depth: 4, max: 3, .. }));
        assert!(tree.children(deepest).is_empty());
        assert_eq!(tree.get(sibling_id).unwrap().status, TaskStatus::Pending);
        assert_eq!(tree.len(), 5);
    }

    #[test]
    fn test_unknown_dependency_rejected() {
        let mut tree = ExecutionTree::new(5, 100);
        let task = Task::new("x", "").with_dependency(Uuid::new_v4());
        assert!(matches!(tree.add(task), Err(DomainError::UnknownDependency { .. })));
    }

    #[test]
    fn test_queue_full_counts_only_open_tasks() {
        let mut tree = ExecutionTree::new(5, 2);
        let ids = chain(&mut tree, 2);
        let extra = Task::new("extra", "").with_parent(ids[0]);
        assert!(matches!(tree.add(extra.clone()), Err(DomainError::QueueFull { limit: 2 })));

        tree.transition(ids[1], TaskStatus::InProgress).unwrap();
        tree.transition(ids[1], TaskStatus::Completed).unwrap();
        tree.add(extra).unwrap();
    }

    #[test]
    fn test_terminal_states_are_final() {
        let mut tree = ExecutionTree::new(5, 100);
        let ids = chain(&mut tree, 1);
        tree.transition(ids[0], TaskStatus::InProgress).unwrap();
        tree.transition(ids[0], TaskStatus::Failed).unwrap();
        assert!(tree.transition(ids[0], TaskStatus::Completed).is_err());
        assert!(tree.transition(ids[0], TaskStatus::Cancelled).is_err());
    }

    #[test]
    fn test_subtree_and_cancel() {
        let mut tree = ExecutionTree::new(5, 100);
        let ids = chain(&mut tree, 3);
        let side = Task::new("side", "").with_parent(ids[0]);
        let side_id = side.id;
        tree.add(side).unwrap();

        let subtree = tree.subtree(ids[0]);
        assert_eq!(subtree.len(), 3);
        assert!(subtree.contains(&side_id));

        tree.transition(side_id, TaskStatus::InProgress).unwrap();
        tree.transition(side_id, TaskStatus::Completed).unwrap();

        let cancelled = tree.cancel_subtree(ids[1]);
        assert_eq!(cancelled, vec![ids[1], ids[2]]);
        assert_eq!(tree.get(side_id).unwrap().status, TaskStatus::Completed);
        assert_eq!(tree.get(ids[0]).unwrap().status, TaskStatus::Pending);
    }

    #[test]
    fn test_ancestors() {
        let mut tree = ExecutionTree::new(5, 100);
        let ids = chain(&mut tree, 3);
        assert_eq!(tree.ancestors(ids[2]), vec![ids[1], ids[0]]);
        assert!(tree.ancestors(ids[0]).is_empty());
    }

    #[test]
    fn test_dependency_state() {
        let mut tree = ExecutionTree::new(5, 100);
        let root = Task::new("root", "");
        let root_id = root.id;
        tree.add(root).unwrap();
        let first = Task::new("first", "").with_parent(root_id);
        let first_id = first.id;
        tree.add(first).unwrap();
        let second = Task::new("second", "")
            .with_parent(root_id)
            .with_dependency(first_id);
        let second_id = second.id;
        tree.add(second).unwrap();

        assert_eq!(tree.dependency_state(second_id), DependencyState::Waiting);
        tree.transition(first_id, TaskStatus::InProgress).unwrap();
        tree.transition(first_id, TaskStatus::Failed).unwrap();
        assert_eq!(tree.dependency_state(second_id), DependencyState::Broken(first_id));
        assert_eq!(tree.dependency_state(root_id), DependencyState::Satisfied);
    }

    #[test]
    fn test_status_counts() {
        let mut tree = ExecutionTree::new(5, 100);
        let ids = chain(&mut tree, 3);
        tree.transition(ids[0], TaskStatus::InProgress).unwrap();
        tree.transition(ids[0], TaskStatus::Completed).unwrap();
        tree.transition(ids[1], TaskStatus::Failed).unwrap();

        let counts = tree.status_counts();
        assert_eq!(counts.completed, 1);
        assert_eq!(counts.failed, 1);
        assert_eq!(counts.pending, 1);
        assert_eq!(counts.total, 3);
    }
}
