//! Handler descriptors used by routing.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

/// Capability tag for automated reasoning handlers.
pub const TAG_REASONING: &str = "reasoning";
/// Capability tag for human reviewers.
pub const TAG_HUMAN_REVIEW: &str = "human-review";
/// Capability tag for external tool execution.
pub const TAG_TOOL: &str = "tool";
/// Capability tag for search providers.
pub const TAG_SEARCH: &str = "search";

/// Broad family a handler belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HandlerKind {
    Reasoning,
    Human,
    Tool,
    Search,
}

impl HandlerKind {
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Reasoning => "reasoning",
            Self::Human => "human",
            Self::Tool => "tool",
            Self::Search => "search",
        }
    }

    /// Tag every handler of this kind carries.
    pub const fn default_tag(&self) -> &'static str {
        match self {
            Self::Reasoning => TAG_REASONING,
            Self::Human => TAG_HUMAN_REVIEW,
            Self::Tool => TAG_TOOL,
            Self::Search => TAG_SEARCH,
        }
    }
}

/// Identity, capabilities, and availability of one handler instance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HandlerDescriptor {
    pub name: String,
    pub kind: HandlerKind,
    pub capabilities: BTreeSet<String>,
    /// Unavailable handlers are never routed to
    pub available: bool,
    /// Maximum tasks this handler holds at once
    pub capacity: usize,
}

impl HandlerDescriptor {
    /// Descriptor carrying the kind's default tag, available, capacity 1.
    pub fn new(name: impl Into<String>, kind: HandlerKind) -> Self {
        let mut capabilities = BTreeSet::new();
        capabilities.insert(kind.default_tag().to_string());
        Self {
            name: name.into(),
            kind,
            capabilities,
            available: true,
            capacity: 1,
        }
    }

    pub fn with_capability(mut self, tag: impl Into<String>) -> Self {
        self.capabilities.insert(tag.into());
        self
    }

    pub fn with_capacity(mut self, capacity: usize) -> Self {
        self.capacity = capacity.max(1);
        self
    }

    pub const fn with_available(mut self, available: bool) -> Self {
        self.available = available;
        self
    }

    pub fn has_capability(&self, tag: &str) -> bool {
        self.capabilities.contains(tag)
    }

    pub fn covers(&self, required: &BTreeSet<String>) -> bool {
        required.is_subset(&self.capabilities)
    }

    pub fn is_human(&self) -> bool {
        self.has_capability(TAG_HUMAN_REVIEW)
    }
}
