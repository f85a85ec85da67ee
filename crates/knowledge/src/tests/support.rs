//! Fakes and fixtures shared by the cross-module tests.

use crate::config::KnowledgeBaseConfig;
use crate::embeddings::providers::TrigramProvider;
use crate::embeddings::EmbeddingProvider;
use crate::lifecycle::IndexManager;
use crate::rag::KnowledgeService;
use crate::types::SourceDocument;
use async_trait::async_trait;
use docent_core::{AppError, AppResult, ProviderFailure};
use docent_llm::{LlmClient, LlmRequest, LlmResponse, LlmUsage};
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

pub const INVOICE_DOC: &str = "# Invoice Inventory\n\nInvoice Inventory setup: to set up Invoice Inventory, open Settings, choose Modules and enable Invoice Inventory. Then configure the default warehouse for stock movements.";

pub const PAYROLL_DOC: &str = "# Payroll\n\nPayroll runs are scheduled monthly. Each employee record needs a salary structure and a bank account before the first run.";

pub const SETUP_QUESTION: &str = "How do I set up Invoice Inventory?";

pub const WEATHER_QUESTION: &str = "What is the weather today?";

pub fn product_corpus() -> Vec<SourceDocument> {
    vec![
        SourceDocument::new("invoice-inventory.md", INVOICE_DOC),
        SourceDocument::new("payroll.md", PAYROLL_DOC),
    ]
}

/// `count` one-chunk documents, each mentioning `marker`.
pub fn marked_corpus(marker: &str, count: usize) -> Vec<SourceDocument> {
    (0..count)
        .map(|i| {
            SourceDocument::new(
                format!("notes-{}.md", i),
                format!("# Release {}\n\n{} release notes for module {}.", i, marker, i),
            )
        })
        .collect()
}

/// Trigram embeddings with call counting, latency and failure injection.
#[derive(Debug)]
pub struct FakeEmbedder {
    inner: TrigramProvider,
    calls: AtomicUsize,
    fail_on_call: AtomicUsize,
    delay: Duration,
}

impl FakeEmbedder {
    pub fn new() -> Self {
        Self::with_delay(Duration::ZERO)
    }

    pub fn with_delay(delay: Duration) -> Self {
        Self {
            inner: TrigramProvider::new(384),
            calls: AtomicUsize::new(0),
            fail_on_call: AtomicUsize::new(0),
            delay,
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Make the `n`th call from now fail.
    pub fn fail_on_next(&self, n: usize) {
        self.fail_on_call.store(self.calls() + n, Ordering::SeqCst);
    }
}

#[async_trait]
impl EmbeddingProvider for FakeEmbedder {
    fn provider_name(&self) -> &str {
        "trigram"
    }

    fn model_name(&self) -> &str {
        self.inner.model_name()
    }

    fn dimensions(&self) -> usize {
        self.inner.dimensions()
    }

    async fn embed_batch(&self, texts: &[String]) -> AppResult<Vec<Vec<f32>>> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        if call == self.fail_on_call.load(Ordering::SeqCst) {
            return Err(AppError::embedding(
                ProviderFailure::Unavailable,
                format!("injected failure on call {}", call),
            ));
        }
        self.inner.embed_batch(texts).await
    }
}

/// Generation client that records calls.
///
/// Re-rank prompts (recognised by their system message) get `rating`;
/// everything else gets `answer`.
pub struct FakeLlm {
    calls: AtomicUsize,
    answer: String,
    rating: String,
    delay: Duration,
}

impl FakeLlm {
    pub fn new(answer: &str) -> Self {
        Self {
            calls: AtomicUsize::new(0),
            answer: answer.to_string(),
            rating: "8".to_string(),
            delay: Duration::ZERO,
        }
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl LlmClient for FakeLlm {
    fn provider_name(&self) -> &str {
        "fake"
    }

    async fn complete(&self, request: &LlmRequest) -> AppResult<LlmResponse> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }

        let is_rating = request
            .system
            .as_deref()
            .is_some_and(|system| system.contains("integer from 0"));
        let content = if is_rating { &self.rating } else { &self.answer };

        Ok(LlmResponse {
            content: content.clone(),
            model: request.model.clone(),
            usage: LlmUsage::new(10, 5),
        })
    }
}

pub fn test_config() -> KnowledgeBaseConfig {
    let mut config = KnowledgeBaseConfig::default();
    config.embedding.batch_size = 1;
    config.lifecycle.lock_timeout_secs = 5;
    config.generation.timeout_secs = 1;
    config
}

pub fn manager(dir: &Path, embedder: Arc<FakeEmbedder>, config: &KnowledgeBaseConfig) -> Arc<IndexManager> {
    Arc::new(IndexManager::new(dir, embedder, config))
}

pub fn service(
    dir: &Path,
    config: KnowledgeBaseConfig,
    manager: Arc<IndexManager>,
    llm: Arc<FakeLlm>,
) -> KnowledgeService {
    KnowledgeService::new(dir, config, manager, llm, "test-model")
}
