pub mod analyst;
pub mod summarize;
pub mod unified;

pub use analyst::Analyst;
pub use unified::{ChatOptions, UnifiedLlm};
