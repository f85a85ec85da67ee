//! RAG answering orchestration.
//!
//! One question runs against one index snapshot from start to finish: the
//! cache key, the retrieval and the reported `index_version` all come from
//! the snapshot taken when the question arrived.

use crate::cache::{CacheKey, ResponseCache};
use crate::config::KnowledgeBaseConfig;
use crate::decision::is_sufficient_for;
use crate::index::ScoredChunk;
use crate::lifecycle::IndexManager;
use crate::rag::types::{Answer, AskOptions, SourceRef};
use crate::rerank::LlmReranker;
use crate::retrieval::{RetrievalOptions, RetrievalResult, Retriever};
use docent_core::{AppError, AppResult, ProviderFailure};
use docent_llm::{LlmClient, LlmRequest};
use docent_prompt::{build_prompt, load_template, HistoryTurn, PromptPassage, PromptTemplate, PromptVariables};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Maximum snippet length for source references.
const MAX_SNIPPET_LENGTH: usize = 150;

/// Answers questions against one knowledge base.
pub struct KnowledgeService {
    workspace: PathBuf,
    config: KnowledgeBaseConfig,
    manager: Arc<IndexManager>,
    retriever: Retriever,
    llm: Arc<dyn LlmClient>,
    generation_model: String,
    cache: ResponseCache<Answer>,
}

impl KnowledgeService {
    /// Wire a service around an opened index manager.
    ///
    /// Re-ranking uses the generation model; it only runs for questions
    /// that ask for it (or when the config enables it by default).
    pub fn new(
        workspace: impl Into<PathBuf>,
        config: KnowledgeBaseConfig,
        manager: Arc<IndexManager>,
        llm: Arc<dyn LlmClient>,
        generation_model: impl Into<String>,
    ) -> Self {
        let generation_model = generation_model.into();
        let reranker = LlmReranker::new(
            llm.clone(),
            generation_model.clone(),
            config.generation.timeout(),
        );
        let retriever = Retriever::new(manager.embedder().clone(), config.embedding.timeout())
            .with_reranker(Arc::new(reranker));

        Self {
            workspace: workspace.into(),
            cache: ResponseCache::from_config(&config.cache),
            config,
            manager,
            retriever,
            llm,
            generation_model,
        }
    }

    pub fn workspace(&self) -> &Path {
        &self.workspace
    }

    pub fn manager(&self) -> &Arc<IndexManager> {
        &self.manager
    }

    pub fn cache(&self) -> &ResponseCache<Answer> {
        &self.cache
    }

    /// Answer a question.
    ///
    /// Weak evidence yields a `not_found` answer without any generation
    /// call. Provider failures are errors; they never turn into an
    /// ungrounded answer.
    pub async fn ask(&self, options: AskOptions) -> AppResult<Answer> {
        let question = options.question.trim();
        if question.is_empty() {
            return Err(AppError::Knowledge("Question must not be empty".to_string()));
        }

        self.manager.refresh()?;
        let snapshot = self.manager.snapshot()?;

        let retrieval = RetrievalOptions {
            top_k: options.top_k.unwrap_or(self.config.retrieval.top_k),
            rerank: options.rerank.unwrap_or(self.config.retrieval.rerank),
            over_fetch_factor: self.config.retrieval.over_fetch_factor,
        };
        let generation = &self.config.generation;
        let language = options.language.as_deref().unwrap_or(&generation.language);
        let template_id = options.template.as_deref().unwrap_or(&generation.template);
        let template = load_template(&self.workspace, template_id, language)?;

        let key = CacheKey::new(question, snapshot.version_id().clone())
            .with_retrieval(retrieval.top_k, retrieval.rerank)
            .with_generation(generation.temperature, generation.max_tokens)
            .with_template(template.identity(), language)
            .with_history(&options.history);

        if let Some(hit) = self.cache.get(&key) {
            return Ok(cached(hit));
        }
        let _flight = self.cache.begin(&key).await;
        if let Some(hit) = self.cache.get(&key) {
            return Ok(cached(hit));
        }

        let result = self
            .retriever
            .retrieve_from(&snapshot, question, &retrieval)
            .await?;

        let answer = if is_sufficient_for(&result, &self.config.retrieval) {
            let text = self
                .generate(&template, question, &result, &options.history)
                .await?;
            tracing::info!(
                version = %result.version,
                top_score = ?result.top_score(),
                sources = result.hits.len(),
                "Answered from retrieved evidence"
            );
            Answer {
                text,
                not_found: false,
                sources: sources_for(&result.hits),
                index_version: result.version.clone(),
                top_score: result.top_score(),
                score_kind: result.score_kind,
                cached: false,
            }
        } else {
            tracing::info!(
                version = %result.version,
                top_score = ?result.top_score(),
                threshold = self.config.retrieval.threshold_for(result.score_kind),
                "Insufficient evidence; answering not found without generation"
            );
            Answer {
                text: template.not_found_message.clone(),
                not_found: true,
                sources: Vec::new(),
                index_version: result.version.clone(),
                top_score: result.top_score(),
                score_kind: result.score_kind,
                cached: false,
            }
        };

        self.cache.put(key, answer.clone());
        Ok(answer)
    }

    async fn generate(
        &self,
        template: &PromptTemplate,
        question: &str,
        result: &RetrievalResult,
        history: &[HistoryTurn],
    ) -> AppResult<String> {
        let variables = PromptVariables {
            question: question.to_string(),
            passages: result
                .hits
                .iter()
                .enumerate()
                .map(|(i, hit)| PromptPassage {
                    index: i + 1,
                    source: hit.chunk.source_path.clone(),
                    section: hit.chunk.section_title.clone(),
                    text: hit.chunk.text.clone(),
                })
                .collect(),
            history: history.to_vec(),
        };
        let built = build_prompt(template, &variables)?;

        let generation = &self.config.generation;
        let mut request = LlmRequest::new(built.user, &self.generation_model)
            .with_temperature(generation.temperature)
            .with_max_tokens(generation.max_tokens);
        if let Some(system) = built.system {
            request = request.with_system(system);
        }

        tracing::debug!(
            provider = self.llm.provider_name(),
            model = %self.generation_model,
            template = %built.metadata.template_identity,
            passages = built.metadata.passage_count,
            "Generating answer"
        );

        let timeout = generation.timeout();
        let response = tokio::time::timeout(timeout, self.llm.complete(&request))
            .await
            .map_err(|_| {
                AppError::generation(
                    ProviderFailure::Timeout,
                    format!("No answer within {}s", timeout.as_secs()),
                )
            })??;

        let text = response.content.trim();
        if text.is_empty() {
            return Err(AppError::generation(
                ProviderFailure::InvalidResponse,
                "Model returned an empty answer",
            ));
        }
        Ok(text.to_string())
    }
}

fn cached(mut answer: Answer) -> Answer {
    answer.cached = true;
    answer
}

/// One source per (path, anchor), in ranking order.
fn sources_for(hits: &[ScoredChunk]) -> Vec<SourceRef> {
    let mut seen = HashSet::new();
    hits.iter()
        .filter(|hit| seen.insert((hit.chunk.source_path.clone(), hit.chunk.section_anchor.clone())))
        .map(|hit| SourceRef {
            source_path: hit.chunk.source_path.clone(),
            section_title: hit.chunk.section_title.clone(),
            section_anchor: hit.chunk.section_anchor.clone(),
            snippet: truncate_snippet(&hit.chunk.text, MAX_SNIPPET_LENGTH),
            score: hit.score,
        })
        .collect()
}

/// Truncate to `max_chars` characters, preferring a word boundary.
fn truncate_snippet(text: &str, max_chars: usize) -> String {
    let text = text.trim();
    if text.chars().count() <= max_chars {
        return text.to_string();
    }

    let truncated: String = text.chars().take(max_chars).collect();
    match truncated.rfind(char::is_whitespace) {
        Some(last_space) if last_space > 0 => format!("{}...", truncated[..last_space].trim_end()),
        _ => format!("{}...", truncated),
    }
}
