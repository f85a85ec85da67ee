//! Embedding configuration types.

use docent_core::{AppError, AppResult};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Embedding settings for a knowledge base (`embedding:` in config.yaml).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct EmbeddingConfig {
    /// Provider name: "trigram" or "ollama"
    #[serde(default = "default_provider")]
    pub provider: String,

    /// Model identifier (provider-specific)
    #[serde(default = "default_model")]
    pub model: String,

    /// Embedding vector dimensions
    #[serde(default = "default_dimensions")]
    pub dimensions: usize,

    /// Texts per provider call during rebuild
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,

    /// Upper bound for one provider call
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,

    /// Provider endpoint override (Ollama base URL)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub endpoint: Option<String>,
}

fn default_provider() -> String {
    "trigram".to_string()
}

fn default_model() -> String {
    "trigram-v1".to_string()
}

fn default_dimensions() -> usize {
    384
}

fn default_batch_size() -> usize {
    32
}

fn default_timeout_secs() -> u64 {
    30
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: default_provider(),
            model: default_model(),
            dimensions: default_dimensions(),
            batch_size: default_batch_size(),
            timeout_secs: default_timeout_secs(),
            endpoint: None,
        }
    }
}

impl EmbeddingConfig {
    /// Bounded timeout applied to every embedding call.
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn validate(&self) -> AppResult<()> {
        if self.dimensions == 0 {
            return Err(AppError::Config(
                "embedding.dimensions must be greater than 0".to_string(),
            ));
        }
        if self.batch_size == 0 {
            return Err(AppError::Config(
                "embedding.batch_size must be greater than 0".to_string(),
            ));
        }
        if self.timeout_secs == 0 {
            return Err(AppError::Config(
                "embedding.timeout_secs must be greater than 0".to_string(),
            ));
        }
        Ok(())
    }

    /// Check that an existing index was built with a compatible embedding space.
    pub fn validate_consistency(&self, provider: &str, model: &str, dimensions: usize) -> AppResult<()> {
        if self.provider != provider {
            return Err(AppError::Knowledge(format!(
                "Provider mismatch: index built with '{}', configured '{}'",
                provider, self.provider
            )));
        }

        if self.model != model {
            return Err(AppError::Knowledge(format!(
                "Model mismatch: index built with '{}', configured '{}'",
                model, self.model
            )));
        }

        if self.dimensions != dimensions {
            return Err(AppError::Knowledge(format!(
                "Dimension mismatch: index has {}, configured {}",
                dimensions, self.dimensions
            )));
        }

        Ok(())
    }
}
