//! Scripted channel backends for testing and offline runs.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{json, Value};
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::domain::errors::HandlerError;
use crate::domain::models::Task;
use crate::domain::ports::{
    Completion, HumanChannel, ReasoningBackend, SearchHit, SearchProvider, ToolExecutor,
};

/// Reasoning backend that replays queued completions.
///
/// Lookup order for each prompt: an answer whose key appears in the prompt,
/// then the next queued response, then an echo of the prompt's objective.
pub struct ScriptedReasoning {
    answers: HashMap<String, String>,
    queue: Arc<RwLock<VecDeque<Result<Completion, HandlerError>>>>,
    prompts: Arc<RwLock<Vec<String>>>,
    tokens_per_call: u64,
}

impl ScriptedReasoning {
    pub fn new() -> Self {
        Self {
            answers: HashMap::new(),
            queue: Arc::new(RwLock::new(VecDeque::new())),
            prompts: Arc::new(RwLock::new(Vec::new())),
            tokens_per_call: 10,
        }
    }

    /// Reply with `answer` whenever `key` occurs in the prompt.
    #[must_use]
    pub fn with_answer(mut self, key: impl Into<String>, answer: impl Into<String>) -> Self {
        self.answers.insert(key.into(), answer.into());
        self
    }

    #[must_use]
    pub fn with_answers(mut self, answers: HashMap<String, String>) -> Self {
        self.answers.extend(answers);
        self
    }

    #[must_use]
    pub const fn with_tokens_per_call(mut self, tokens: u64) -> Self {
        self.tokens_per_call = tokens;
        self
    }

    /// Queue a completion text.
    pub async fn push_text(&self, text: impl Into<String>) {
        self.queue.write().await.push_back(Ok(Completion {
            text: text.into(),
            tokens_used: self.tokens_per_call,
        }));
    }

    /// Queue a failure.
    pub async fn push_error(&self, error: HandlerError) {
        self.queue.write().await.push_back(Err(error));
    }

    /// Every prompt received so far.
    pub async fn prompts(&self) -> Vec<String> {
        self.prompts.read().await.clone()
    }
}

impl Default for ScriptedReasoning {
    fn default() -> Self {
        Self::new()
    }
}

fn objective_line(prompt: &str) -> &str {
    prompt
        .lines()
        .find_map(|line| line.strip_prefix("Objective: "))
        .unwrap_or_else(|| prompt.lines().next().unwrap_or_default())
}

#[async_trait]
impl ReasoningBackend for ScriptedReasoning {
    async fn complete(&self, prompt: &str) -> Result<Completion, HandlerError> {
        self.prompts.write().await.push(prompt.to_string());

        let matched = self
            .answers
            .iter()
            .filter(|(key, _)| prompt.contains(key.as_str()))
            .max_by_key(|(key, _)| key.len())
            .map(|(_, answer)| answer.clone());
        if let Some(text) = matched {
            return Ok(Completion {
                text,
                tokens_used: self.tokens_per_call,
            });
        }

        if let Some(queued) = self.queue.write().await.pop_front() {
            return queued;
        }

        Ok(Completion {
            text: format!("Completed: {}", objective_line(prompt)),
            tokens_used: self.tokens_per_call,
        })
    }
}

/// Human channel whose reviewer answers from a queue.
///
/// A reply becomes visible once the reviewer has been polled
/// `reply_after_polls` times since the last reply; an empty queue means the
/// reviewer never answers.
pub struct ScriptedHumanChannel {
    replies: Arc<RwLock<VecDeque<String>>>,
    reply_after_polls: u32,
    polls: AtomicU32,
    notified: Arc<RwLock<Vec<(String, Uuid)>>>,
}

impl ScriptedHumanChannel {
    /// Reviewer that never answers.
    pub fn silent() -> Self {
        Self::replying(Vec::<String>::new(), 0)
    }

    pub fn replying(replies: impl IntoIterator<Item = impl Into<String>>, after_polls: u32) -> Self {
        Self {
            replies: Arc::new(RwLock::new(replies.into_iter().map(Into::into).collect())),
            reply_after_polls: after_polls,
            polls: AtomicU32::new(0),
            notified: Arc::new(RwLock::new(Vec::new())),
        }
    }

    /// `(human_id, task_id)` pairs notified so far.
    pub async fn notifications(&self) -> Vec<(String, Uuid)> {
        self.notified.read().await.clone()
    }

    pub fn poll_count(&self) -> u32 {
        self.polls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl HumanChannel for ScriptedHumanChannel {
    async fn notify(&self, human_id: &str, task: &Task) -> Result<(), HandlerError> {
        self.notified
            .write()
            .await
            .push((human_id.to_string(), task.id));
        Ok(())
    }

    async fn poll(&self, _human_id: &str) -> Result<Option<String>, HandlerError> {
        let polls = self.polls.fetch_add(1, Ordering::SeqCst) + 1;
        if polls <= self.reply_after_polls {
            return Ok(None);
        }
        let reply = self.replies.write().await.pop_front();
        if reply.is_some() {
            self.polls.store(0, Ordering::SeqCst);
        }
        Ok(reply)
    }
}

type ToolFn = Box<dyn Fn(&Value) -> Result<Value, HandlerError> + Send + Sync>;

/// Tool executor backed by in-process closures.
pub struct InMemoryTools {
    tools: HashMap<String, ToolFn>,
    calls: AtomicU32,
}

impl InMemoryTools {
    pub fn new() -> Self {
        Self {
            tools: HashMap::new(),
            calls: AtomicU32::new(0),
        }
    }

    #[must_use]
    pub fn with_tool(
        mut self,
        name: impl Into<String>,
        tool: impl Fn(&Value) -> Result<Value, HandlerError> + Send + Sync + 'static,
    ) -> Self {
        self.tools.insert(name.into(), Box::new(tool));
        self
    }

    /// Executor with an `echo` tool that returns its parameters.
    pub fn with_echo() -> Self {
        Self::new().with_tool("echo", |params| Ok(json!({ "echo": params })))
    }

    pub fn call_count(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }
}

impl Default for InMemoryTools {
    fn default() -> Self {
        Self::with_echo()
    }
}

#[async_trait]
impl ToolExecutor for InMemoryTools {
    async fn execute(&self, tool_name: &str, params: &Value) -> Result<Value, HandlerError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let tool = self
            .tools
            .get(tool_name)
            .ok_or_else(|| HandlerError::Fatal(format!("unknown tool: {tool_name}")))?;
        tool(params)
    }
}

/// Search provider over a fixed corpus.
#[derive(Debug, Clone, Default)]
pub struct StaticSearch {
    hits: Vec<SearchHit>,
}

impl StaticSearch {
    pub const fn new(hits: Vec<SearchHit>) -> Self {
        Self { hits }
    }
}

#[async_trait]
impl SearchProvider for StaticSearch {
    /// Hits whose title or snippet contains any query word, case-insensitive.
    async fn search(&self, query: &str, limit: usize) -> Result<Vec<SearchHit>, HandlerError> {
        let words: Vec<String> = query
            .split_whitespace()
            .map(str::to_lowercase)
            .filter(|w| w.len() >= 3)
            .collect();

        Ok(self
            .hits
            .iter()
            .filter(|hit| {
                let haystack = format!("{} {}", hit.title, hit.snippet).to_lowercase();
                words.is_empty() || words.iter().any(|w| haystack.contains(w.as_str()))
            })
            .take(limit)
            .cloned()
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_scripted_reasoning_lookup_order() {
        let backend = ScriptedReasoning::new().with_answer("weather", "sunny");
        backend.push_text("queued").await;

        let answered = backend.complete("Objective: weather today").await.unwrap();
        assert_eq!(answered.text, "sunny");

        let queued = backend.complete("Objective: other").await.unwrap();
        assert_eq!(queued.text, "queued");

        let echoed = backend.complete("Objective: other").await.unwrap();
        assert_eq!(echoed.text, "Completed: other");
        assert_eq!(backend.prompts().await.len(), 3);
    }

    #[tokio::test]
    async fn test_scripted_reasoning_replays_errors() {
        let backend = ScriptedReasoning::new();
        backend
            .push_error(HandlerError::Transient("rate limited".into()))
            .await;
        assert!(backend.complete("x").await.is_err());
        assert!(backend.complete("x").await.is_ok());
    }

    #[tokio::test]
    async fn test_human_channel_replies_after_polls() {
        let channel = ScriptedHumanChannel::replying(["approved"], 2);
        let task = Task::new("review", "");
        channel.notify("alice", &task).await.unwrap();

        assert_eq!(channel.poll("alice").await.unwrap(), None);
        assert_eq!(channel.poll("alice").await.unwrap(), None);
        assert_eq!(
            channel.poll("alice").await.unwrap().as_deref(),
            Some("approved")
        );
        assert_eq!(
            channel.notifications().await,
            vec![("alice".to_string(), task.id)]
        );
    }

    #[tokio::test]
    async fn test_silent_human_never_replies() {
        let channel = ScriptedHumanChannel::silent();
        for _ in 0..5 {
            assert_eq!(channel.poll("bob").await.unwrap(), None);
        }
        assert_eq!(channel.poll_count(), 5);
    }

    #[tokio::test]
    async fn test_in_memory_tools() {
        let tools = InMemoryTools::with_echo();
        let output = tools.execute("echo", &json!({"a": 1})).await.unwrap();
        assert_eq!(output, json!({"echo": {"a": 1}}));

        let missing = tools.execute("nope", &Value::Null).await;
        assert!(matches!(missing, Err(HandlerError::Fatal(_))));
        assert_eq!(tools.call_count(), 2);
    }

    #[tokio::test]
    async fn test_static_search_filters_and_limits() {
        let hit = |title: &str| SearchHit {
            title: title.to_string(),
            url: format!("https://example.org/{title}"),
            snippet: String::new(),
        };
        let search = StaticSearch::new(vec![hit("rust async"), hit("rust traits"), hit("go")]);

        let hits = search.search("Rust", 10).await.unwrap();
        assert_eq!(hits.len(), 2);
        assert_eq!(search.search("rust", 1).await.unwrap().len(), 1);
        assert!(search.search("haskell", 10).await.unwrap().is_empty());
    }
}
