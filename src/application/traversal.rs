//! Pending-task queue ordered by traversal strategy.

use std::collections::VecDeque;

use uuid::Uuid;

use crate::domain::models::ExecutionStrategy;

/// Queue of admitted, not yet dispatched tasks.
///
/// - BFS takes every ready task as one frontier; new tasks join at the back.
/// - DFS takes one task; its new subtasks jump ahead of queued siblings.
/// - Hybrid takes up to `branching_factor` tasks; their subtasks jump ahead,
///   so the next round continues inside the same branches.
///
/// Tasks that are not ready keep their position for a later round.
#[derive(Debug, Clone)]
pub struct TraversalQueue {
    strategy: ExecutionStrategy,
    branching_factor: usize,
    queue: VecDeque<Uuid>,
}

impl TraversalQueue {
    pub fn new(strategy: ExecutionStrategy, branching_factor: usize) -> Self {
        Self {
            strategy,
            branching_factor: branching_factor.max(1),
            queue: VecDeque::new(),
        }
    }

    pub const fn strategy(&self) -> ExecutionStrategy {
        self.strategy
    }

    fn batch_limit(&self) -> usize {
        match self.strategy {
            ExecutionStrategy::Bfs => usize::MAX,
            ExecutionStrategy::Dfs => 1,
            ExecutionStrategy::Hybrid => self.branching_factor,
        }
    }

    /// Remove and return the next unit of work. Only tasks for which
    /// `ready` holds are taken, scanning from the front.
    pub fn next_batch(&mut self, ready: impl Fn(Uuid) -> bool) -> Vec<Uuid> {
        let limit = self.batch_limit();
        let mut batch = Vec::new();
        let mut kept = VecDeque::with_capacity(self.queue.len());

        while let Some(id) = self.queue.pop_front() {
            if batch.len() < limit && ready(id) {
                batch.push(id);
            } else {
                kept.push_back(id);
            }
        }
        self.queue = kept;
        batch
    }

    /// Enqueue newly admitted tasks, preserving their relative order.
    pub fn admit(&mut self, ids: &[Uuid]) {
        match self.strategy {
            ExecutionStrategy::Bfs => self.queue.extend(ids.iter().copied()),
            ExecutionStrategy::Dfs | ExecutionStrategy::Hybrid => {
                for id in ids.iter().rev() {
                    self.queue.push_front(*id);
                }
            }
        }
    }

    /// Take everything still queued.
    pub fn drain(&mut self) -> Vec<Uuid> {
        self.queue.drain(..).collect()
    }

    pub fn len(&self) -> usize {
        self.queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }
}
