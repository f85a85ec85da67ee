//! Answer templates for docent.
//!
//! This crate provides:
//! - Built-in grounded-answer templates per output language
//! - YAML overrides from `.docent/prompts/`
//! - Handlebars rendering of question, passages and history

pub mod builder;
pub mod builtin;
pub mod loader;
pub mod types;

// Re-export main types
pub use builder::build_prompt;
pub use builtin::{builtin_template, DEFAULT_TEMPLATE_ID};
pub use loader::{list_templates, load_template};
pub use types::{
    BuiltPrompt, BuiltPromptMetadata, HistoryTurn, PromptPassage, PromptTemplate, PromptVariables,
};
