//! Knowledge base management for docent.
//!
//! Builds versioned vector indexes from a documentation corpus, publishes
//! them atomically under a filesystem lock, and answers questions from the
//! live version with a relevance gate in front of generation.
//!
//! The free functions here are the entry points the CLI uses; they wire
//! configuration, providers and the index manager for one knowledge base.

pub mod cache;
pub mod chunker;
pub mod config;
pub mod corpus;
pub mod decision;
pub mod embeddings;
pub mod index;
pub mod lifecycle;
pub mod lock;
pub mod metadata;
pub mod parser;
pub mod progress;
pub mod published;
pub mod rag;
pub mod rerank;
pub mod retrieval;
pub mod types;

#[cfg(test)]
mod tests;

// Re-export commonly used types
pub use config::KnowledgeBaseConfig;
pub use corpus::{CorpusSource, DirectoryCorpus};
pub use decision::is_sufficient;
pub use lifecycle::{IndexManager, IndexStatus};
pub use lock::LockState;
pub use progress::{Phase, ProgressEvent, ProgressReporter};
pub use rag::{Answer, AskOptions, KnowledgeService, SourceRef};
pub use retrieval::{RetrievalOptions, RetrievalResult, Retriever, ScoreKind};
pub use types::{BuildParams, IndexMetadata, IndexVersionId, RebuildOutcome, RebuildStats};

use docent_core::{AppConfig, AppError, AppResult};
use docent_llm::create_client;
use std::path::Path;
use std::sync::Arc;

/// Load a base's config and build its index manager without loading the
/// published index (so a corrupt index can still be rebuilt over).
pub fn open_manager(workspace: &Path, base_name: &str) -> AppResult<(KnowledgeBaseConfig, IndexManager)> {
    config::validate_base_name(base_name)?;
    let config = config::load_config(workspace, base_name)?;
    let embedder = embeddings::create_provider(&config.embedding)?;

    let manager = IndexManager::new(config::get_base_dir(workspace, base_name), embedder, &config);
    manager.recover()?;
    Ok((config, manager))
}

/// Rebuild a knowledge base from `corpus_root`, or from the configured
/// `corpus.root` when none is given.
pub async fn rebuild(
    workspace: &Path,
    base_name: &str,
    corpus_root: Option<&Path>,
    force: bool,
    progress: &ProgressReporter,
) -> AppResult<RebuildOutcome> {
    let (config, manager) = open_manager(workspace, base_name)?;

    let root = match corpus_root {
        Some(root) => root.to_path_buf(),
        None => config.corpus_root(workspace).ok_or_else(|| {
            AppError::Config(format!(
                "No corpus for '{}': pass --path or set corpus.root in {:?}",
                base_name,
                config::get_config_path(workspace, base_name)
            ))
        })?,
    };

    let corpus = DirectoryCorpus::with_config(root, &config.corpus);
    let params = BuildParams::from_config(&config).with_force(force);

    manager.rebuild(&corpus, &params, progress).await
}

pub fn status(workspace: &Path, base_name: &str) -> AppResult<IndexStatus> {
    let (_, manager) = open_manager(workspace, base_name)?;
    manager.status()
}

pub fn rollback(workspace: &Path, base_name: &str) -> AppResult<IndexVersionId> {
    let (_, manager) = open_manager(workspace, base_name)?;
    manager.rollback()
}

/// Open a question-answering service over the published index.
///
/// Fails with `IndexNotBuilt` before the first rebuild and with a
/// mismatch error when the configured embedding model differs from the
/// one the index was built with.
pub fn open_service(workspace: &Path, base_name: &str, app: &AppConfig) -> AppResult<KnowledgeService> {
    config::validate_base_name(base_name)?;
    let config = config::load_config(workspace, base_name)?;
    let embedder = embeddings::create_provider(&config.embedding)?;

    let manager = IndexManager::open(config::get_base_dir(workspace, base_name), embedder, &config)?;
    let snapshot = manager.snapshot()?;
    let meta = &snapshot.metadata;
    config.embedding.validate_consistency(
        &meta.embedding_provider,
        &meta.embedding_model_id,
        meta.embedding_dimensions,
    )?;

    let llm = create_client(
        &app.provider,
        app.provider_endpoint(&app.provider).as_deref(),
        config.generation.timeout(),
    )?;
    let model = config
        .generation
        .model
        .clone()
        .unwrap_or_else(|| app.model.clone());

    tracing::debug!(
        base = base_name,
        version = %snapshot.version_id(),
        provider = %app.provider,
        model = %model,
        "Opened knowledge service"
    );

    Ok(KnowledgeService::new(workspace, config, Arc::new(manager), llm, model))
}
