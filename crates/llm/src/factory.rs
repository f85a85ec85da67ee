//! LLM provider factory.
//!
//! Resolves a provider name from configuration into a ready client.

use crate::client::LlmClient;
use crate::providers::{OllamaClient, DEFAULT_OLLAMA_URL};
use docent_core::{AppError, AppResult};
use std::sync::Arc;
use std::time::Duration;

/// Create an LLM client based on the provider name.
///
/// # Arguments
/// * `provider` - Provider identifier ("ollama")
/// * `endpoint` - Optional custom endpoint URL
/// * `timeout` - Per-request transport timeout
///
/// # Errors
/// Returns `AppError::Config` if no client exists for the provider.
pub fn create_client(
    provider: &str,
    endpoint: Option<&str>,
    timeout: Duration,
) -> AppResult<Arc<dyn LlmClient>> {
    match provider.to_lowercase().as_str() {
        "ollama" => {
            let base_url = endpoint.unwrap_or(DEFAULT_OLLAMA_URL);
            tracing::debug!(base_url, "Creating Ollama client");
            Ok(Arc::new(OllamaClient::with_base_url(base_url, timeout)))
        }
        _ => Err(AppError::Config(format!("Unknown provider: {}", provider))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TIMEOUT: Duration = Duration::from_secs(5);

    #[test]
    fn test_create_ollama_client() {
        let client = create_client("ollama", None, TIMEOUT).unwrap();
        assert_eq!(client.provider_name(), "ollama");
    }

    #[test]
    fn test_create_ollama_with_custom_endpoint() {
        let client = create_client("Ollama", Some("http://localhost:8080"), TIMEOUT);
        assert!(client.is_ok());
    }

    #[test]
    fn test_provider_without_client_is_unknown() {
        match create_client("openai", None, TIMEOUT) {
            Err(AppError::Config(msg)) => assert!(msg.contains("Unknown provider: openai")),
            _ => panic!("Expected config error for a provider with no client"),
        }
    }

    #[test]
    fn test_unknown_provider() {
        match create_client("unknown", None, TIMEOUT) {
            Err(AppError::Config(msg)) => assert!(msg.contains("Unknown provider")),
            _ => panic!("Expected config error for unknown provider"),
        }
    }
}
