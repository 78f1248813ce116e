//! Capability-based task routing.
//!
//! Picks a handler for a task from the registered pool. Human reviewers are
//! preferred for critical or review-flagged tasks; otherwise the least-loaded
//! matching handler wins, with ties rotated through declaration order.

use std::sync::Arc;

use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::models::Task;
use crate::domain::ports::TaskHandler;

/// Outcome of a routing attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Route {
    /// Index of the chosen handler in declaration order
    Assigned(usize),
    /// Matching handlers exist but all are at capacity
    Busy,
}

/// Router state: per-handler load and the round-robin cursor.
#[derive(Debug, Clone)]
pub struct TaskRouter {
    in_flight: Vec<usize>,
    cursor: usize,
}

impl TaskRouter {
    pub fn new(handler_count: usize) -> Self {
        Self {
            in_flight: vec![0; handler_count],
            cursor: 0,
        }
    }

    /// Choose a handler for `task`.
    ///
    /// Returns [`DomainError::NoHandlerAvailable`] when no handler could ever
    /// serve the task, and [`Route::Busy`] when every match is saturated.
    pub fn route(
        &mut self,
        task: &Task,
        handlers: &[Arc<dyn TaskHandler>],
    ) -> DomainResult<Route> {
        let wants_review = task.wants_human_review();
        let matching: Vec<usize> = handlers
            .iter()
            .enumerate()
            .filter(|(_, handler)| {
                let descriptor = handler.descriptor();
                descriptor.available
                    && descriptor.covers(&task.required_tags)
                    && (!task.required_tags.is_empty() || !descriptor.is_human() || wants_review)
                    && handler.can_handle(task)
            })
            .map(|(index, _)| index)
            .collect();

        if matching.is_empty() {
            return Err(DomainError::NoHandlerAvailable {
                task: task.id,
                requires: describe_requirements(task),
            });
        }

        let free: Vec<usize> = matching
            .into_iter()
            .filter(|&index| self.load(index) < handlers[index].descriptor().capacity)
            .collect();
        if free.is_empty() {
            return Ok(Route::Busy);
        }

        let reviewers: Vec<usize> = if wants_review {
            free.iter()
                .copied()
                .filter(|&index| handlers[index].descriptor().is_human())
                .collect()
        } else {
            Vec::new()
        };
        let pool = if reviewers.is_empty() { free } else { reviewers };

        Ok(Route::Assigned(self.pick_least_loaded(&pool, handlers.len())))
    }

    fn pick_least_loaded(&mut self, pool: &[usize], handler_count: usize) -> usize {
        let min_load = pool.iter().map(|&index| self.load(index)).min().unwrap_or(0);
        let tied: Vec<usize> = pool
            .iter()
            .copied()
            .filter(|&index| self.load(index) == min_load)
            .collect();

        let chosen = tied
            .iter()
            .copied()
            .find(|&index| index >= self.cursor)
            .or_else(|| tied.first().copied())
            .unwrap_or(pool[0]);
        self.cursor = (chosen + 1) % handler_count.max(1);
        chosen
    }

    /// Record that handler `index` took a task.
    pub fn acquire(&mut self, index: usize) {
        if let Some(load) = self.in_flight.get_mut(index) {
            *load += 1;
        }
    }

    /// Record that handler `index` finished a task.
    pub fn release(&mut self, index: usize) {
        if let Some(load) = self.in_flight.get_mut(index) {
            *load = load.saturating_sub(1);
        }
    }

    pub fn load(&self, index: usize) -> usize {
        self.in_flight.get(index).copied().unwrap_or(0)
    }
}

fn describe_requirements(task: &Task) -> String {
    if task.required_tags.is_empty() {
        "any".to_string()
    } else {
        task.required_tags
            .iter()
            .map(String::as_str)
            .collect::<Vec<_>>()
            .join(", ")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::errors::HandlerError;
    use crate::domain::models::{
        HandlerDescriptor, HandlerKind, TaskContext, TaskPriority, TaskResult,
    };
    use async_trait::async_trait;
    use tokio_util::sync::CancellationToken;

    struct StubHandler {
        descriptor: HandlerDescriptor,
        accepts: bool,
    }

    #[async_trait]
    impl TaskHandler for StubHandler {
        fn descriptor(&self) -> &HandlerDescriptor {
            &self.descriptor
        }

        fn can_handle(&self, _task: &Task) -> bool {
            self.accepts
        }

        async fn handle(
            &self,
            _task: &Task,
            _context: &TaskContext,
            _cancel: &CancellationToken,
        ) -> Result<TaskResult, HandlerError> {
            Ok(TaskResult::success(vec![]))
        }
    }

    fn handler(descriptor: HandlerDescriptor) -> Arc<dyn TaskHandler> {
        Arc::new(StubHandler {
            descriptor,
            accepts: true,
        })
    }

    fn pool() -> Vec<Arc<dyn TaskHandler>> {
        vec![
            handler(HandlerDescriptor::new("reasoner-a", HandlerKind::Reasoning).with_capacity(4)),
            handler(HandlerDescriptor::new("reasoner-b", HandlerKind::Reasoning).with_capacity(4)),
            handler(HandlerDescriptor::new("reviewer", HandlerKind::Human)),
            handler(HandlerDescriptor::new("shell", HandlerKind::Tool)),
        ]
    }

    #[test]
    fn test_critical_prefers_human_review() {
        let handlers = pool();
        let mut router = TaskRouter::new(handlers.len());
        let task = Task::new("ship it", "").with_priority(TaskPriority::Critical);
        assert_eq!(router.route(&task, &handlers).unwrap(), Route::Assigned(2));
    }

    #[test]
    fn test_review_flag_prefers_human_review() {
        let handlers = pool();
        let mut router = TaskRouter::new(handlers.len());
        let task = Task::new("check", "").with_metadata("human_review", serde_json::json!(true));
        assert_eq!(router.route(&task, &handlers).unwrap(), Route::Assigned(2));
    }

    #[test]
    fn test_busy_reviewer_falls_back_to_automation() {
        let handlers = pool();
        let mut router = TaskRouter::new(handlers.len());
        router.acquire(2);
        let task = Task::new("ship it", "").with_priority(TaskPriority::Critical);
        assert!(matches!(router.route(&task, &handlers).unwrap(), Route::Assigned(0 | 1 | 3)));
    }

    #[test]
    fn test_untagged_tasks_skip_humans() {
        let handlers = pool();
        let mut router = TaskRouter::new(handlers.len());
        for _ in 0..8 {
            let Route::Assigned(index) = router.route(&Task::new("x", ""), &handlers).unwrap()
            else {
                panic!("expected assignment");
            };
            assert_ne!(index, 2);
        }
    }

    #[test]
    fn test_ties_rotate_in_declaration_order() {
        let handlers = pool();
        let mut router = TaskRouter::new(handlers.len());
        let task = Task::new("x", "").with_tag("reasoning");
        let picks: Vec<_> = (0..4)
            .map(|_| router.route(&task, &handlers).unwrap())
            .collect();
        assert_eq!(
            picks,
            vec![
                Route::Assigned(0),
                Route::Assigned(1),
                Route::Assigned(0),
                Route::Assigned(1)
            ]
        );
    }

    #[test]
    fn test_least_loaded_wins() {
        let handlers = pool();
        let mut router = TaskRouter::new(handlers.len());
        router.acquire(0);
        router.acquire(0);
        router.acquire(1);
        let task = Task::new("x", "").with_tag("reasoning");
        assert_eq!(router.route(&task, &handlers).unwrap(), Route::Assigned(1));
        router.release(0);
        router.release(0);
        assert_eq!(router.route(&task, &handlers).unwrap(), Route::Assigned(0));
    }

    #[test]
    fn test_saturated_handlers_are_busy() {
        let handlers = pool();
        let mut router = TaskRouter::new(handlers.len());
        router.acquire(3);
        let task = Task::new("run", "").with_tag("tool");
        assert_eq!(router.route(&task, &handlers).unwrap(), Route::Busy);
    }

    #[test]
    fn test_no_handler_available() {
        let handlers = pool();
        let mut router = TaskRouter::new(handlers.len());
        let task = Task::new("find", "").with_tag("search");
        let err = router.route(&task, &handlers).unwrap_err();
        assert!(matches!(err, DomainError::NoHandlerAvailable { .. }));
    }

    #[test]
    fn test_unavailable_and_unwilling_handlers_skipped() {
        let handlers: Vec<Arc<dyn TaskHandler>> = vec![
            handler(
                HandlerDescriptor::new("offline", HandlerKind::Reasoning).with_available(false),
            ),
            Arc::new(StubHandler {
                descriptor: HandlerDescriptor::new("picky", HandlerKind::Reasoning),
                accepts: false,
            }),
            handler(HandlerDescriptor::new("ready", HandlerKind::Reasoning)),
        ];
        let mut router = TaskRouter::new(handlers.len());
        assert_eq!(router.route(&Task::new("x", ""), &handlers).unwrap(), Route::Assigned(2));
    }
}
