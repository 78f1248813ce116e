//! Handler port - the contract every executor satisfies.

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use crate::domain::errors::HandlerError;
use crate::domain::models::context::TaskContext;
use crate::domain::models::{HandlerDescriptor, Task, TaskResult};

/// An executor that can resolve tasks: automated reasoning, human review,
/// tool execution, or search.
///
/// Implementations must report failure either through a failed
/// [`TaskResult`] or a [`HandlerError`], never as a silent partial success.
/// Long waits must watch `cancel` and return [`HandlerError::Cancelled`]
/// once it fires.
#[async_trait]
pub trait TaskHandler: Send + Sync {
    /// Identity and capability tags used by routing.
    fn descriptor(&self) -> &HandlerDescriptor;

    /// Pure predicate over the task; routing never dispatches when false.
    fn can_handle(&self, task: &Task) -> bool {
        let _ = task;
        self.descriptor().available
    }

    /// Resolve the task.
    async fn handle(
        &self,
        task: &Task,
        context: &TaskContext,
        cancel: &CancellationToken,
    ) -> Result<TaskResult, HandlerError>;
}
