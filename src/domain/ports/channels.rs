//! Side channels used by the handler adapters.
//!
//! These are the outermost seams of the system: a reasoning model, a human
//! notification/inbox pair, a tool runner, and a search provider.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::domain::errors::HandlerError;
use crate::domain::models::Task;

/// Text produced by a reasoning backend.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Completion {
    pub text: String,
    pub tokens_used: u64,
}

/// Backend that turns a prompt into text.
#[async_trait]
pub trait ReasoningBackend: Send + Sync {
    async fn complete(&self, prompt: &str) -> Result<Completion, HandlerError>;
}

/// Notification and inbox for a human reviewer.
#[async_trait]
pub trait HumanChannel: Send + Sync {
    /// Tell the reviewer a task is waiting for them.
    async fn notify(&self, human_id: &str, task: &Task) -> Result<(), HandlerError>;

    /// Non-blocking check for a response.
    async fn poll(&self, human_id: &str) -> Result<Option<String>, HandlerError>;
}

/// Runs a named external tool.
#[async_trait]
pub trait ToolExecutor: Send + Sync {
    async fn execute(
        &self,
        tool_name: &str,
        params: &serde_json::Value,
    ) -> Result<serde_json::Value, HandlerError>;
}

/// One search result.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchHit {
    pub title: String,
    pub url: String,
    pub snippet: String,
}

/// Web or document search.
#[async_trait]
pub trait SearchProvider: Send + Sync {
    async fn search(&self, query: &str, limit: usize) -> Result<Vec<SearchHit>, HandlerError>;
}
