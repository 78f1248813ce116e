//! Adapters for the engine's ports.
//!
//! - `handlers`: task handlers over reasoning, human, tool, and search channels
//! - `decomposition`: reasoning-backed decomposer
//! - `plan`: file-driven decomposition for offline runs
//! - `scripted`: in-process channel backends for tests and demos

pub mod decomposition;
pub mod handlers;
pub mod plan;
pub mod scripted;

pub use decomposition::StructuredDecomposer;
pub use handlers::{HumanHandler, ReasoningHandler, SearchHandler, ToolHandler};
pub use plan::{PlanDecomposer, ScriptedPlan};
pub use scripted::{InMemoryTools, ScriptedHumanChannel, ScriptedReasoning, StaticSearch};
