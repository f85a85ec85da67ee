//! Retrieval engine: embed the query, search one snapshot, optionally
//! re-rank.

use crate::config::RetrievalConfig;
use crate::embeddings::{embed_query, EmbeddingProvider};
use crate::index::IndexSnapshot;
pub use crate::index::ScoredChunk;
use crate::published::PublishedIndex;
use crate::rerank::Reranker;
use crate::types::IndexVersionId;
use docent_core::{AppError, AppResult};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

/// Which scale a result's scores are on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScoreKind {
    /// Cosine similarity between query and chunk embeddings
    Similarity,
    /// Re-ranker confidence in 0..1
    Rerank,
}

/// Ranked chunks, all drawn from one index version.
#[derive(Debug, Clone)]
pub struct RetrievalResult {
    pub version: IndexVersionId,
    pub hits: Vec<ScoredChunk>,
    pub score_kind: ScoreKind,
}

impl RetrievalResult {
    pub fn top_score(&self) -> Option<f32> {
        self.hits.first().map(|hit| hit.score)
    }

    pub fn is_empty(&self) -> bool {
        self.hits.is_empty()
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RetrievalOptions {
    pub top_k: usize,
    pub rerank: bool,
    /// Candidates searched per requested hit when re-ranking
    pub over_fetch_factor: usize,
}

impl RetrievalOptions {
    pub fn from_config(config: &RetrievalConfig) -> Self {
        Self {
            top_k: config.top_k,
            rerank: config.rerank,
            over_fetch_factor: config.over_fetch_factor,
        }
    }
}

impl Default for RetrievalOptions {
    fn default() -> Self {
        Self::from_config(&RetrievalConfig::default())
    }
}

pub struct Retriever {
    embedder: Arc<dyn EmbeddingProvider>,
    reranker: Option<Arc<dyn Reranker>>,
    embed_timeout: Duration,
}

impl Retriever {
    pub fn new(embedder: Arc<dyn EmbeddingProvider>, embed_timeout: Duration) -> Self {
        Self {
            embedder,
            reranker: None,
            embed_timeout,
        }
    }

    pub fn with_reranker(mut self, reranker: Arc<dyn Reranker>) -> Self {
        self.reranker = Some(reranker);
        self
    }

    /// Retrieve from whatever version is live when the call starts.
    pub async fn retrieve(
        &self,
        published: &PublishedIndex,
        query: &str,
        options: &RetrievalOptions,
    ) -> AppResult<RetrievalResult> {
        let snapshot = published.snapshot().ok_or_else(|| {
            AppError::IndexNotBuilt("No index version is published".to_string())
        })?;
        self.retrieve_from(&snapshot, query, options).await
    }

    /// Retrieve from a snapshot the caller already holds.
    ///
    /// Embedding failures propagate; an empty result always means the
    /// index had nothing to offer, never that retrieval broke.
    pub async fn retrieve_from(
        &self,
        snapshot: &Arc<IndexSnapshot>,
        query: &str,
        options: &RetrievalOptions,
    ) -> AppResult<RetrievalResult> {
        if options.top_k == 0 {
            return Err(AppError::Config("top_k must be at least 1".to_string()));
        }
        self.check_compatible(snapshot)?;

        let query_embedding = embed_query(self.embedder.as_ref(), query, self.embed_timeout).await?;

        let reranker = match (&self.reranker, options.rerank) {
            (Some(reranker), true) => Some(reranker),
            (None, true) => {
                debug!("Re-ranking requested but no re-ranker is configured");
                None
            }
            _ => None,
        };

        let fetch = if reranker.is_some() {
            options.top_k.saturating_mul(options.over_fetch_factor.max(1))
        } else {
            options.top_k
        };

        let mut candidates = snapshot.search(&query_embedding, fetch);
        debug!(
            version = %snapshot.version_id(),
            scores = ?candidates.iter().map(|c| c.score).collect::<Vec<_>>(),
            "Similarity candidates"
        );

        let mut score_kind = ScoreKind::Similarity;

        if let Some(reranker) = reranker.filter(|_| !candidates.is_empty()) {
            match reranker.score(query, &candidates).await {
                Ok(scores) if scores.len() == candidates.len() => {
                    apply_rerank(&mut candidates, &scores);
                    score_kind = ScoreKind::Rerank;
                    debug!(
                        reranker = reranker.name(),
                        scores = ?candidates.iter().map(|c| c.score).collect::<Vec<_>>(),
                        "Re-ranked candidates"
                    );
                }
                Ok(scores) => warn!(
                    "Re-ranker {} returned {} scores for {} candidates; keeping similarity order",
                    reranker.name(),
                    scores.len(),
                    candidates.len()
                ),
                Err(e) => warn!(
                    "Re-ranking with {} failed; keeping similarity order: {}",
                    reranker.name(),
                    e
                ),
            }
        }

        candidates.truncate(options.top_k);

        Ok(RetrievalResult {
            version: snapshot.version_id().clone(),
            hits: candidates,
            score_kind,
        })
    }

    /// Query vectors are only comparable with vectors from the same model.
    fn check_compatible(&self, snapshot: &IndexSnapshot) -> AppResult<()> {
        let meta = &snapshot.metadata;
        if meta.embedding_dimensions != self.embedder.dimensions()
            || meta.embedding_model_id != self.embedder.model_name()
        {
            return Err(AppError::Config(format!(
                "Index {} was built with {} ({} dimensions) but queries use {} ({} dimensions); rebuild the index",
                meta.version_id,
                meta.embedding_model_id,
                meta.embedding_dimensions,
                self.embedder.model_name(),
                self.embedder.dimensions()
            )));
        }
        Ok(())
    }
}

/// Replace scores and reorder, keeping similarity order among ties.
fn apply_rerank(candidates: &mut [ScoredChunk], scores: &[f32]) {
    for (candidate, score) in candidates.iter_mut().zip(scores) {
        candidate.score = if score.is_finite() { *score } else { 0.0 };
    }
    candidates.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(Ordering::Equal));
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embeddings::providers::TrigramProvider;
    use crate::types::{IndexMetadata, KnowledgeChunk, INDEX_FORMAT_VERSION};
    use async_trait::async_trait;
    use chrono::Utc;
    use docent_core::ProviderFailure;

    async fn snapshot(texts: &[&str]) -> Arc<IndexSnapshot> {
        let embedder = TrigramProvider::new(384);
        let owned: Vec<String> = texts.iter().map(|t| t.to_string()).collect();
        let vectors = embedder.embed_batch(&owned).await.unwrap();

        let chunks = owned
            .into_iter()
            .zip(vectors)
            .enumerate()
            .map(|(i, (text, embedding))| KnowledgeChunk {
                id: format!("doc.md#{}", i),
                position: i as u32,
                source_path: "doc.md".to_string(),
                section_title: None,
                section_anchor: None,
                text,
                embedding,
            })
            .collect::<Vec<_>>();

        Arc::new(IndexSnapshot::new(
            IndexMetadata {
                format_version: INDEX_FORMAT_VERSION,
                version_id: IndexVersionId::generate(),
                created_at: Utc::now(),
                corpus_hash: String::new(),
                document_count: 1,
                chunk_count: chunks.len(),
                embedding_provider: "trigram".to_string(),
                embedding_model_id: "trigram-v1".to_string(),
                embedding_dimensions: 384,
                chunk_size: 800,
                chunk_overlap: 120,
            },
            chunks,
        ))
    }

    fn retriever() -> Retriever {
        Retriever::new(Arc::new(TrigramProvider::new(384)), Duration::from_secs(5))
    }

    /// Prefers whichever candidate mentions "payroll".
    struct KeywordReranker;

    #[async_trait]
    impl Reranker for KeywordReranker {
        fn name(&self) -> &str {
            "keyword"
        }

        async fn score(&self, _query: &str, candidates: &[ScoredChunk]) -> AppResult<Vec<f32>> {
            Ok(candidates
                .iter()
                .map(|c| if c.chunk.text.contains("payroll") { 0.9 } else { 0.1 })
                .collect())
        }
    }

    struct BrokenReranker;

    #[async_trait]
    impl Reranker for BrokenReranker {
        fn name(&self) -> &str {
            "broken"
        }

        async fn score(&self, _query: &str, _candidates: &[ScoredChunk]) -> AppResult<Vec<f32>> {
            Err(AppError::generation(ProviderFailure::Unavailable, "down"))
        }
    }

    const DOCS: [&str; 3] = [
        "configure the default warehouse for stock movements",
        "monthly payroll runs need a salary structure",
        "warehouse stock transfer between locations",
    ];

    #[tokio::test]
    async fn test_similarity_order_and_version() {
        let snapshot = snapshot(&DOCS).await;
        let options = RetrievalOptions {
            top_k: 2,
            ..Default::default()
        };

        let result = retriever()
            .retrieve_from(&snapshot, "configure the warehouse", &options)
            .await
            .unwrap();

        assert_eq!(result.version, *snapshot.version_id());
        assert_eq!(result.score_kind, ScoreKind::Similarity);
        assert_eq!(result.hits.len(), 2);
        assert_eq!(result.hits[0].chunk.id, "doc.md#0");
        assert!(result.hits[0].score >= result.hits[1].score);
    }

    #[tokio::test]
    async fn test_rerank_reorders_over_fetched_candidates() {
        let snapshot = snapshot(&DOCS).await;
        let options = RetrievalOptions {
            top_k: 1,
            rerank: true,
            over_fetch_factor: 3,
        };

        let result = retriever()
            .with_reranker(Arc::new(KeywordReranker))
            .retrieve_from(&snapshot, "configure the warehouse", &options)
            .await
            .unwrap();

        assert_eq!(result.score_kind, ScoreKind::Rerank);
        assert_eq!(result.hits.len(), 1);
        assert_eq!(result.hits[0].chunk.id, "doc.md#1");
        assert_eq!(result.top_score(), Some(0.9));
    }

    #[tokio::test]
    async fn test_rerank_failure_falls_back() {
        let snapshot = snapshot(&DOCS).await;
        let options = RetrievalOptions {
            top_k: 2,
            rerank: true,
            over_fetch_factor: 2,
        };

        let result = retriever()
            .with_reranker(Arc::new(BrokenReranker))
            .retrieve_from(&snapshot, "configure the warehouse", &options)
            .await
            .unwrap();

        assert_eq!(result.score_kind, ScoreKind::Similarity);
        assert_eq!(result.hits.len(), 2);
        assert_eq!(result.hits[0].chunk.id, "doc.md#0");
    }

    #[tokio::test]
    async fn test_zero_top_k_rejected() {
        let snapshot = snapshot(&DOCS).await;
        let options = RetrievalOptions {
            top_k: 0,
            ..Default::default()
        };
        assert!(retriever()
            .retrieve_from(&snapshot, "anything", &options)
            .await
            .is_err());
    }

    #[tokio::test]
    async fn test_model_mismatch_rejected() {
        let snapshot = snapshot(&DOCS).await;
        let small = Retriever::new(Arc::new(TrigramProvider::new(64)), Duration::from_secs(5));

        let err = small
            .retrieve_from(&snapshot, "warehouse", &RetrievalOptions::default())
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Config(_)));
    }

    #[tokio::test]
    async fn test_unpublished_index() {
        let err = retriever()
            .retrieve(&PublishedIndex::new(), "warehouse", &RetrievalOptions::default())
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::IndexNotBuilt(_)));
    }
}
