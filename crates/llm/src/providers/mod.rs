//! Concrete generation providers.

pub mod ollama;

pub use ollama::{OllamaClient, DEFAULT_OLLAMA_URL};
