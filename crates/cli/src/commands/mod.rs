//! Command handlers for the docent CLI.

pub mod ask;
pub mod index;

pub use ask::AskCommand;
pub use index::IndexCommand;
