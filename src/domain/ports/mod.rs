//! Port trait definitions (Hexagonal Architecture)
//!
//! Interfaces the engine depends on and adapters implement:
//! - TaskHandler: executors that resolve tasks
//! - Decomposer: goal-to-subtask planning
//! - ReasoningBackend, HumanChannel, ToolExecutor, SearchProvider: side channels
//! - ResultVerifier: acceptance and goal coverage

pub mod channels;
pub mod decomposer;
pub mod handler;
pub mod verifier;

pub use channels::{
    Completion, HumanChannel, ReasoningBackend, SearchHit, SearchProvider, ToolExecutor,
};
pub use decomposer::{Decomposer, Decomposition};
pub use handler::TaskHandler;
pub use verifier::{ResultVerifier, Verification};
