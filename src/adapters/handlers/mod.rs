//! Task handlers.

pub mod human;
pub mod reasoning;
pub mod search;
pub mod tool;

pub use human::HumanHandler;
pub use reasoning::ReasoningHandler;
pub use search::SearchHandler;
pub use tool::ToolHandler;
