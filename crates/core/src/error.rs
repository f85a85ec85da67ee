//! Error types for docent.
//!
//! This module defines a unified error enum covering configuration, I/O,
//! provider, index lifecycle, prompt and serialization failures. The
//! variants carry enough detail for callers to tell retryable conditions
//! (a busy rebuild lock, a provider timeout) from fatal ones (a corrupt
//! index, a bad configuration).

use std::fmt;
use thiserror::Error;

/// Why a remote provider call (embedding, generation, re-rank) failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProviderFailure {
    /// The call did not complete within its bounded timeout.
    Timeout,
    /// The provider rejected the call because of rate limiting.
    RateLimited,
    /// Credentials were missing or rejected.
    AuthFailed,
    /// The provider could not be reached or returned a server error.
    Unavailable,
    /// The provider answered with something we could not use.
    InvalidResponse,
}

impl ProviderFailure {
    /// Classify an HTTP status code returned by a provider.
    pub fn from_status(status: u16) -> Self {
        match status {
            401 | 403 => Self::AuthFailed,
            408 | 504 => Self::Timeout,
            429 => Self::RateLimited,
            500..=599 => Self::Unavailable,
            _ => Self::InvalidResponse,
        }
    }

    fn as_str(&self) -> &'static str {
        match self {
            Self::Timeout => "timeout",
            Self::RateLimited => "rate limited",
            Self::AuthFailed => "authentication failed",
            Self::Unavailable => "unavailable",
            Self::InvalidResponse => "invalid response",
        }
    }
}

impl fmt::Display for ProviderFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Unified error type for docent.
///
/// All functions in the workspace return `Result<T, AppError>`.
/// We never panic; errors must be represented and propagated.
#[derive(Error, Debug)]
pub enum AppError {
    /// Configuration-related errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// I/O and filesystem errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Another process or task currently holds the rebuild lock
    #[error("Rebuild already in progress (held by {holder} for {age_secs}s)")]
    RebuildInProgress { holder: String, age_secs: u64 },

    /// The embedding provider failed or timed out
    #[error("Embedding provider error ({kind}): {message}")]
    EmbeddingProvider {
        kind: ProviderFailure,
        message: String,
    },

    /// The generation (or re-ranking) provider failed or timed out
    #[error("Generation provider error ({kind}): {message}")]
    Generation {
        kind: ProviderFailure,
        message: String,
    },

    /// Published index artifacts are missing, unreadable or inconsistent
    #[error("Corrupt index: {0}")]
    CorruptIndex(String),

    /// No index version has been published yet
    #[error("Index not built: {0}")]
    IndexNotBuilt(String),

    /// Knowledge base errors that fit no narrower category
    #[error("Knowledge error: {0}")]
    Knowledge(String),

    /// Prompt system errors
    #[error("Prompt error: {0}")]
    Prompt(String),

    /// Serialization/deserialization errors
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Generic errors
    #[error("{0}")]
    Other(String),
}

impl AppError {
    /// Shorthand for an embedding provider failure.
    pub fn embedding(kind: ProviderFailure, message: impl Into<String>) -> Self {
        AppError::EmbeddingProvider {
            kind,
            message: message.into(),
        }
    }

    /// Shorthand for a generation provider failure.
    pub fn generation(kind: ProviderFailure, message: impl Into<String>) -> Self {
        AppError::Generation {
            kind,
            message: message.into(),
        }
    }

    /// Whether retrying the same operation later may succeed.
    pub fn is_retryable(&self) -> bool {
        match self {
            AppError::RebuildInProgress { .. } | AppError::Io(_) => true,
            AppError::EmbeddingProvider { kind, .. } | AppError::Generation { kind, .. } => {
                matches!(
                    kind,
                    ProviderFailure::Timeout
                        | ProviderFailure::RateLimited
                        | ProviderFailure::Unavailable
                )
            }
            _ => false,
        }
    }

    /// Whether this is a provider timeout.
    pub fn is_timeout(&self) -> bool {
        matches!(
            self,
            AppError::EmbeddingProvider {
                kind: ProviderFailure::Timeout,
                ..
            } | AppError::Generation {
                kind: ProviderFailure::Timeout,
                ..
            }
        )
    }
}

impl From<serde_json::Error> for AppError {
    fn from(err: serde_json::Error) -> Self {
        AppError::Serialization(err.to_string())
    }
}

impl From<serde_yaml::Error> for AppError {
    fn from(err: serde_yaml::Error) -> Self {
        AppError::Serialization(err.to_string())
    }
}

/// Convenience type alias for Results with AppError.
pub type AppResult<T> = Result<T, AppError>;
