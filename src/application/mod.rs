//! Application layer: the execution engine and its scheduling machinery.

pub mod engine;
pub mod events;
pub mod traversal;
pub(crate) mod worker;

pub use engine::ExecutionEngine;
pub use events::EngineEvent;
pub use traversal::TraversalQueue;
