//! Retrieval-augmented answering.
//!
//! Grounds generation in retrieved passages and refuses to generate at all
//! when the evidence is too weak.

pub mod ask;
pub mod types;

pub use ask::KnowledgeService;
pub use types::{Answer, AskOptions, SourceRef};
