//! Embedding generation.
//!
//! Every call the index makes to a provider goes through [`embed_bounded`],
//! which enforces a timeout and checks the shape of what comes back.

pub mod config;
pub mod provider;
pub mod providers;

pub use config::EmbeddingConfig;
pub use provider::{create_provider, EmbeddingProvider};

use docent_core::{AppError, AppResult, ProviderFailure};
use std::time::Duration;

/// Embed `texts` with a bounded wait.
///
/// Fails with `EmbeddingProvider { kind: Timeout }` when the provider does
/// not answer in time, and with `InvalidResponse` when it returns the wrong
/// number of vectors or vectors of the wrong length.
pub async fn embed_bounded(
    provider: &dyn EmbeddingProvider,
    texts: &[String],
    timeout: Duration,
) -> AppResult<Vec<Vec<f32>>> {
    if texts.is_empty() {
        return Ok(Vec::new());
    }

    let embeddings = tokio::time::timeout(timeout, provider.embed_batch(texts))
        .await
        .map_err(|_| {
            AppError::embedding(
                ProviderFailure::Timeout,
                format!(
                    "{} did not answer within {}ms",
                    provider.provider_name(),
                    timeout.as_millis()
                ),
            )
        })??;

    if embeddings.len() != texts.len() {
        return Err(AppError::embedding(
            ProviderFailure::InvalidResponse,
            format!(
                "Expected {} embeddings, got {}",
                texts.len(),
                embeddings.len()
            ),
        ));
    }

    let dimensions = provider.dimensions();
    if let Some(bad) = embeddings.iter().find(|e| e.len() != dimensions) {
        return Err(AppError::embedding(
            ProviderFailure::InvalidResponse,
            format!(
                "Unexpected embedding dimensions: got {}, expected {}",
                bad.len(),
                dimensions
            ),
        ));
    }

    Ok(embeddings)
}

/// Embed one query string with a bounded wait.
pub async fn embed_query(
    provider: &dyn EmbeddingProvider,
    query: &str,
    timeout: Duration,
) -> AppResult<Vec<f32>> {
    let mut embeddings = embed_bounded(provider, &[query.to_string()], timeout).await?;
    embeddings.pop().ok_or_else(|| {
        AppError::embedding(ProviderFailure::InvalidResponse, "No query embedding returned")
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embeddings::providers::TrigramProvider;

    #[derive(Debug)]
    struct SlowProvider;

    #[async_trait::async_trait]
    impl EmbeddingProvider for SlowProvider {
        fn provider_name(&self) -> &str {
            "slow"
        }

        fn model_name(&self) -> &str {
            "slow-v1"
        }

        fn dimensions(&self) -> usize {
            4
        }

        async fn embed_batch(&self, texts: &[String]) -> AppResult<Vec<Vec<f32>>> {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Ok(texts.iter().map(|_| vec![0.0; 4]).collect())
        }
    }

    #[derive(Debug)]
    struct ShortProvider;

    #[async_trait::async_trait]
    impl EmbeddingProvider for ShortProvider {
        fn provider_name(&self) -> &str {
            "short"
        }

        fn model_name(&self) -> &str {
            "short-v1"
        }

        fn dimensions(&self) -> usize {
            4
        }

        async fn embed_batch(&self, texts: &[String]) -> AppResult<Vec<Vec<f32>>> {
            Ok(texts.iter().map(|_| vec![0.0; 3]).collect())
        }
    }

    #[tokio::test]
    async fn test_timeout_is_typed() {
        let err = embed_query(&SlowProvider, "q", Duration::from_millis(20))
            .await
            .unwrap_err();
        assert!(err.is_timeout());
        assert!(err.is_retryable());
    }

    #[tokio::test]
    async fn test_wrong_dimensions_rejected() {
        let err = embed_query(&ShortProvider, "q", Duration::from_secs(1))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            AppError::EmbeddingProvider {
                kind: ProviderFailure::InvalidResponse,
                ..
            }
        ));
    }

    #[tokio::test]
    async fn test_bounded_batch() {
        let provider = TrigramProvider::new(64);
        let texts = vec!["one".to_string(), "two words".to_string()];
        let embeddings = embed_bounded(&provider, &texts, Duration::from_secs(1))
            .await
            .unwrap();
        assert_eq!(embeddings.len(), 2);
        assert!(embeddings.iter().all(|e| e.len() == 64));
    }
}
