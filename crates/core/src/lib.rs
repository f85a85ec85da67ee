//! Docent Core Library
//!
//! This crate provides the foundational utilities shared by every docent crate:
//! - Error handling (`AppError`, `AppResult`, `ProviderFailure`)
//! - Logging infrastructure
//! - Global configuration management

pub mod config;
pub mod error;
pub mod logging;

// Re-export commonly used types
pub use config::AppConfig;
pub use error::{AppError, AppResult, ProviderFailure};
