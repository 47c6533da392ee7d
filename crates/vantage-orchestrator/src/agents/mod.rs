//! Built-in agents.

pub mod insight;
pub mod prompt;

pub use insight::InsightAgent;
pub use prompt::PromptAgent;
