//! Pre-parse filters for model output, and the decomposition record parser.
//!
//! Filters are applied in order by a [`FilterChain`]. The default chain
//! strips reasoning blocks and then unwraps a fenced code block.
//!
//! Reasoning tags (`<think>` by default) follow this grammar:
//! - when a closing `</tag>` appears, everything up to and including its
//!   last occurrence is discarded
//! - otherwise an opening tag that is never closed discards the rest of
//!   the text

use std::sync::LazyLock;

use regex::Regex;
use serde::Deserialize;

use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::models::{TaskPriority, TaskSpec};

static FENCE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?s)```[A-Za-z0-9_-]*[ \t]*\r?\n?(.*?)```").expect("fence pattern is valid")
});

/// One stage of output sanitization.
pub trait OutputFilter: Send + Sync {
    fn name(&self) -> &str;

    fn apply(&self, input: &str) -> String;
}

/// Removes reasoning blocks delimited by `<tag>` and `</tag>`.
#[derive(Debug, Clone)]
pub struct ReasoningTagFilter {
    open: String,
    close: String,
}

impl ReasoningTagFilter {
    pub fn new(tag: &str) -> Self {
        Self {
            open: format!("<{tag}>"),
            close: format!("</{tag}>"),
        }
    }
}

impl Default for ReasoningTagFilter {
    fn default() -> Self {
        Self::new("think")
    }
}

impl OutputFilter for ReasoningTagFilter {
    fn name(&self) -> &str {
        "reasoning-tags"
    }

    fn apply(&self, input: &str) -> String {
        let kept = match input.rfind(&self.close) {
            Some(c) => &input[c + self.close.len()..],
            None => input.find(&self.open).map_or(input, |o| &input[..o]),
        };
        kept.trim().to_string()
    }
}

/// Keeps the body of the first fenced code block, if any.
#[derive(Debug, Clone, Copy, Default)]
pub struct CodeFenceFilter;

impl OutputFilter for CodeFenceFilter {
    fn name(&self) -> &str {
        "code-fence"
    }

    fn apply(&self, input: &str) -> String {
        FENCE_RE
            .captures(input)
            .and_then(|caps| caps.get(1))
            .map_or_else(|| input.trim().to_string(), |m| m.as_str().trim().to_string())
    }
}

/// Ordered sequence of filters.
pub struct FilterChain {
    filters: Vec<Box<dyn OutputFilter>>,
}

impl FilterChain {
    pub fn new() -> Self {
        Self {
            filters: Vec::new(),
        }
    }

    #[must_use]
    pub fn with(mut self, filter: impl OutputFilter + 'static) -> Self {
        self.filters.push(Box::new(filter));
        self
    }

    pub fn apply(&self, input: &str) -> String {
        self.filters
            .iter()
            .fold(input.to_string(), |text, filter| filter.apply(&text))
    }

    pub fn names(&self) -> Vec<&str> {
        self.filters.iter().map(|f| f.name()).collect()
    }
}

impl Default for FilterChain {
    fn default() -> Self {
        Self::new()
            .with(ReasoningTagFilter::default())
            .with(CodeFenceFilter)
    }
}

impl std::fmt::Debug for FilterChain {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FilterChain")
            .field("filters", &self.names())
            .finish()
    }
}

#[derive(Debug, Deserialize)]
struct RawRecord {
    objective: String,
    #[serde(default)]
    description: String,
    #[serde(default)]
    priority: Option<String>,
    #[serde(default)]
    requires: Vec<String>,
}

/// Parse filtered decomposition output into task proposals.
///
/// Accepts a JSON array of `{objective, description}` records, or an object
/// holding such an array under `subtasks` or `tasks`. `priority` and
/// `requires` are optional. `raw` is the unfiltered text, kept for diagnostics.
pub fn parse_task_specs(filtered: &str, raw: &str) -> DomainResult<Vec<TaskSpec>> {
    let parse_error = |reason: String| DomainError::DecompositionParse {
        reason,
        raw: raw.to_string(),
    };

    let value: serde_json::Value =
        serde_json::from_str(filtered).map_err(|e| parse_error(e.to_string()))?;

    let items = match value {
        serde_json::Value::Array(items) => items,
        serde_json::Value::Object(mut map) => match map
            .remove("subtasks")
            .or_else(|| map.remove("tasks"))
        {
            Some(serde_json::Value::Array(items)) => items,
            _ => return Err(parse_error("expected an array of task records".to_string())),
        },
        _ => return Err(parse_error("expected an array of task records".to_string())),
    };

    items
        .into_iter()
        .enumerate()
        .map(|(index, item)| {
            let record: RawRecord = serde_json::from_value(item)
                .map_err(|e| parse_error(format!("record {index}: {e}")))?;
            if record.objective.trim().is_empty() {
                return Err(parse_error(format!("record {index}: empty objective")));
            }
            let mut spec = TaskSpec::new(record.objective.trim(), record.description);
            if let Some(priority) = record.priority.as_deref().and_then(TaskPriority::from_str) {
                spec.priority = priority;
            }
            spec.required_tags.extend(record.requires);
            Ok(spec)
        })
        .collect()
}
