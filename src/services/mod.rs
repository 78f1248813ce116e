pub mod context;
pub mod convergence;
pub mod loop_detector;
pub mod output_filter;
pub mod retry;
pub mod router;
pub mod verifier;

pub use context::{merge_knowledge, ContextBuilder};
pub use convergence::ConvergenceManager;
pub use loop_detector::LoopDetector;
pub use output_filter::{
    parse_task_specs, CodeFenceFilter, FilterChain, OutputFilter, ReasoningTagFilter,
};
pub use retry::RetryPolicy;
pub use router::{Route, TaskRouter};
pub use verifier::DefaultVerifier;
