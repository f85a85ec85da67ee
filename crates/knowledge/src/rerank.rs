//! Second-pass relevance scoring.

use crate::index::ScoredChunk;
use async_trait::async_trait;
use docent_core::{AppError, AppResult, ProviderFailure};
use docent_llm::{LlmClient, LlmRequest};
use std::sync::Arc;
use std::time::Duration;
use tracing::instrument;

/// Scores candidates for relevance to a query.
///
/// Scores are on a 0..1 scale, higher meaning more relevant, one per
/// candidate in input order.
#[async_trait]
pub trait Reranker: Send + Sync {
    fn name(&self) -> &str;

    async fn score(&self, query: &str, candidates: &[ScoredChunk]) -> AppResult<Vec<f32>>;
}

/// Asks the generation model to rate each candidate from 0 to 10.
pub struct LlmReranker {
    client: Arc<dyn LlmClient>,
    model: String,
    timeout: Duration,
}

const RATING_SYSTEM: &str = "You judge whether a documentation passage helps answer a question. \
Reply with a single integer from 0 (irrelevant) to 10 (directly answers it) and nothing else.";

/// Passages are cut to this many characters before rating.
const MAX_PASSAGE_CHARS: usize = 1200;

impl LlmReranker {
    pub fn new(client: Arc<dyn LlmClient>, model: impl Into<String>, timeout: Duration) -> Self {
        Self {
            client,
            model: model.into(),
            timeout,
        }
    }

    async fn rate(&self, query: &str, candidate: &ScoredChunk) -> AppResult<f32> {
        let passage: String = candidate.chunk.text.chars().take(MAX_PASSAGE_CHARS).collect();
        let prompt = format!("Question: {}\n\nPassage:\n{}\n\nRating:", query, passage);

        let request = LlmRequest::new(prompt, &self.model)
            .with_system(RATING_SYSTEM)
            .with_temperature(0.0)
            .with_max_tokens(4);

        let response = tokio::time::timeout(self.timeout, self.client.complete(&request))
            .await
            .map_err(|_| {
                AppError::generation(
                    ProviderFailure::Timeout,
                    format!("Re-rank call exceeded {}s", self.timeout.as_secs()),
                )
            })??;

        parse_rating(&response.content).ok_or_else(|| {
            AppError::generation(
                ProviderFailure::InvalidResponse,
                format!("Re-ranker returned no rating: {:?}", response.content),
            )
        })
    }
}

#[async_trait]
impl Reranker for LlmReranker {
    fn name(&self) -> &str {
        "llm"
    }

    #[instrument(skip(self, query, candidates), fields(candidates = candidates.len(), model = %self.model))]
    async fn score(&self, query: &str, candidates: &[ScoredChunk]) -> AppResult<Vec<f32>> {
        let mut scores = Vec::with_capacity(candidates.len());
        for candidate in candidates {
            scores.push(self.rate(query, candidate).await?);
        }
        Ok(scores)
    }
}

/// First number in the reply, clamped to 0..=10 and scaled to 0..1.
fn parse_rating(reply: &str) -> Option<f32> {
    let start = reply.find(|c: char| c.is_ascii_digit())?;
    let digits: String = reply[start..]
        .chars()
        .take_while(|c| c.is_ascii_digit() || *c == '.')
        .collect();
    let value: f32 = digits.trim_end_matches('.').parse().ok()?;
    Some(value.clamp(0.0, 10.0) / 10.0)
}
