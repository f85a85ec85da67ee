//! Knowledge base configuration management.
//!
//! Each base keeps its settings in `.docent/knowledge/<base>/config.yaml`.
//! Every section is optional; missing keys fall back to defaults.

use crate::embeddings::EmbeddingConfig;
use crate::retrieval::ScoreKind;
use docent_core::config::STATE_DIR;
use docent_core::{AppError, AppResult};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Full per-base configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct KnowledgeBaseConfig {
    #[serde(default)]
    pub corpus: CorpusConfig,

    #[serde(default)]
    pub chunking: ChunkingConfig,

    #[serde(default)]
    pub embedding: EmbeddingConfig,

    #[serde(default)]
    pub retrieval: RetrievalConfig,

    #[serde(default)]
    pub generation: GenerationConfig,

    #[serde(default)]
    pub lifecycle: LifecycleConfig,

    #[serde(default)]
    pub cache: CacheConfig,
}

/// Where the documents come from.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CorpusConfig {
    /// Corpus root; relative paths resolve against the workspace
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub root: Option<PathBuf>,

    #[serde(default = "default_extensions")]
    pub extensions: Vec<String>,

    /// Paths containing any of these substrings are skipped
    #[serde(default)]
    pub exclude: Vec<String>,
}

fn default_extensions() -> Vec<String> {
    ["md", "markdown", "txt", "html"]
        .iter()
        .map(|s| s.to_string())
        .collect()
}

impl Default for CorpusConfig {
    fn default() -> Self {
        Self {
            root: None,
            extensions: default_extensions(),
            exclude: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ChunkingConfig {
    /// Maximum chunk length in characters
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,

    #[serde(default = "default_chunk_overlap")]
    pub chunk_overlap: usize,
}

fn default_chunk_size() -> usize {
    800
}

fn default_chunk_overlap() -> usize {
    120
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            chunk_size: default_chunk_size(),
            chunk_overlap: default_chunk_overlap(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RetrievalConfig {
    #[serde(default = "default_top_k")]
    pub top_k: usize,

    #[serde(default)]
    pub rerank: bool,

    /// Candidates fetched per requested hit when re-ranking
    #[serde(default = "default_over_fetch_factor")]
    pub over_fetch_factor: usize,

    /// Minimum cosine similarity for evidence to count
    #[serde(default = "default_similarity_threshold")]
    pub similarity_threshold: f32,

    /// Minimum re-ranker confidence (0..1) for evidence to count
    #[serde(default = "default_rerank_threshold")]
    pub rerank_threshold: f32,
}

fn default_top_k() -> usize {
    5
}

fn default_over_fetch_factor() -> usize {
    2
}

fn default_similarity_threshold() -> f32 {
    0.20
}

fn default_rerank_threshold() -> f32 {
    0.5
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            top_k: default_top_k(),
            rerank: false,
            over_fetch_factor: default_over_fetch_factor(),
            similarity_threshold: default_similarity_threshold(),
            rerank_threshold: default_rerank_threshold(),
        }
    }
}

impl RetrievalConfig {
    /// Threshold on the same scale as the scores being judged.
    pub fn threshold_for(&self, kind: ScoreKind) -> f32 {
        match kind {
            ScoreKind::Similarity => self.similarity_threshold,
            ScoreKind::Rerank => self.rerank_threshold,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct GenerationConfig {
    /// Generation model; falls back to the global model when unset
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,

    #[serde(default = "default_temperature")]
    pub temperature: f32,

    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,

    #[serde(default = "default_generation_timeout_secs")]
    pub timeout_secs: u64,

    #[serde(default = "default_template")]
    pub template: String,

    #[serde(default = "default_language")]
    pub language: String,
}

fn default_temperature() -> f32 {
    0.3
}

fn default_max_tokens() -> u32 {
    1000
}

fn default_generation_timeout_secs() -> u64 {
    60
}

fn default_template() -> String {
    docent_prompt::DEFAULT_TEMPLATE_ID.to_string()
}

fn default_language() -> String {
    "en".to_string()
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            model: None,
            temperature: default_temperature(),
            max_tokens: default_max_tokens(),
            timeout_secs: default_generation_timeout_secs(),
            template: default_template(),
            language: default_language(),
        }
    }
}

impl GenerationConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LifecycleConfig {
    /// A lock older than twice this is considered abandoned
    #[serde(default = "default_lock_timeout_secs")]
    pub lock_timeout_secs: u64,

    /// Previous versions retained under `backups/`
    #[serde(default = "default_keep_backups")]
    pub keep_backups: usize,
}

fn default_lock_timeout_secs() -> u64 {
    600
}

fn default_keep_backups() -> usize {
    3
}

impl Default for LifecycleConfig {
    fn default() -> Self {
        Self {
            lock_timeout_secs: default_lock_timeout_secs(),
            keep_backups: default_keep_backups(),
        }
    }
}

impl LifecycleConfig {
    pub fn lock_timeout(&self) -> Duration {
        Duration::from_secs(self.lock_timeout_secs)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CacheConfig {
    #[serde(default = "default_capacity")]
    pub capacity: usize,

    #[serde(default = "default_ttl_secs")]
    pub ttl_secs: u64,
}

fn default_capacity() -> usize {
    256
}

fn default_ttl_secs() -> u64 {
    3600
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            capacity: default_capacity(),
            ttl_secs: default_ttl_secs(),
        }
    }
}

impl CacheConfig {
    pub fn ttl(&self) -> Duration {
        Duration::from_secs(self.ttl_secs)
    }
}

impl KnowledgeBaseConfig {
    /// Reject settings the pipeline cannot honour.
    pub fn validate(&self) -> AppResult<()> {
        if self.chunking.chunk_size == 0 {
            return Err(AppError::Config(
                "chunking.chunk_size must be greater than 0".to_string(),
            ));
        }
        if self.chunking.chunk_overlap >= self.chunking.chunk_size {
            return Err(AppError::Config(format!(
                "chunking.chunk_overlap ({}) must be smaller than chunk_size ({})",
                self.chunking.chunk_overlap, self.chunking.chunk_size
            )));
        }
        if self.retrieval.top_k == 0 {
            return Err(AppError::Config(
                "retrieval.top_k must be at least 1".to_string(),
            ));
        }
        if self.retrieval.over_fetch_factor == 0 {
            return Err(AppError::Config(
                "retrieval.over_fetch_factor must be at least 1".to_string(),
            ));
        }
        if !self.retrieval.similarity_threshold.is_finite()
            || !self.retrieval.rerank_threshold.is_finite()
        {
            return Err(AppError::Config(
                "retrieval thresholds must be finite numbers".to_string(),
            ));
        }
        if self.cache.capacity == 0 {
            return Err(AppError::Config(
                "cache.capacity must be at least 1".to_string(),
            ));
        }
        if !self.generation.temperature.is_finite() {
            return Err(AppError::Config(
                "generation.temperature must be a finite number".to_string(),
            ));
        }
        self.embedding.validate()
    }

    /// Resolve the corpus root against the workspace.
    pub fn corpus_root(&self, workspace: &Path) -> Option<PathBuf> {
        self.corpus.root.as_ref().map(|root| {
            if root.is_absolute() {
                root.clone()
            } else {
                workspace.join(root)
            }
        })
    }
}

/// Load knowledge base configuration.
///
/// Loads from `.docent/knowledge/<base>/config.yaml` if it exists,
/// otherwise returns defaults. The result is always validated.
pub fn load_config(workspace: &Path, base_name: &str) -> AppResult<KnowledgeBaseConfig> {
    let config_path = get_config_path(workspace, base_name);

    let config = if config_path.exists() {
        let content = fs::read_to_string(&config_path).map_err(|e| {
            AppError::Config(format!("Failed to read config at {:?}: {}", config_path, e))
        })?;

        let config: KnowledgeBaseConfig = serde_yaml::from_str(&content).map_err(|e| {
            AppError::Config(format!("Failed to parse config at {:?}: {}", config_path, e))
        })?;

        tracing::debug!("Loaded knowledge base config for '{}'", base_name);
        config
    } else {
        tracing::debug!(
            "Using default knowledge base config for '{}' (no config file found)",
            base_name
        );
        KnowledgeBaseConfig::default()
    };

    config.validate()?;
    Ok(config)
}

/// Save knowledge base configuration.
pub fn save_config(
    workspace: &Path,
    base_name: &str,
    config: &KnowledgeBaseConfig,
) -> AppResult<()> {
    let config_path = get_config_path(workspace, base_name);

    if let Some(parent) = config_path.parent() {
        fs::create_dir_all(parent)?;
    }

    let yaml = serde_yaml::to_string(config)?;
    fs::write(&config_path, yaml)?;

    tracing::debug!("Saved knowledge base config for '{}'", base_name);
    Ok(())
}

/// Get the base directory for a knowledge base.
pub fn get_base_dir(workspace: &Path, base_name: &str) -> PathBuf {
    workspace.join(STATE_DIR).join("knowledge").join(base_name)
}

/// Get the path to a base's config file.
pub fn get_config_path(workspace: &Path, base_name: &str) -> PathBuf {
    get_base_dir(workspace, base_name).join("config.yaml")
}

/// Base names may not escape the knowledge directory.
pub fn validate_base_name(base_name: &str) -> AppResult<()> {
    let valid = !base_name.is_empty()
        && base_name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_' || c == '.')
        && !base_name.starts_with('.');

    if valid {
        Ok(())
    } else {
        Err(AppError::Config(format!(
            "Invalid knowledge base name '{}': use letters, digits, '-', '_' or '.'",
            base_name
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_load_default_config() {
        let temp = TempDir::new().unwrap();
        let config = load_config(temp.path(), "docs").unwrap();

        assert_eq!(config.chunking.chunk_size, 800);
        assert_eq!(config.retrieval.top_k, 5);
        assert_eq!(config.lifecycle.lock_timeout_secs, 600);
        assert_eq!(config.generation.template, "rag.answer");
        assert_eq!(config.corpus.extensions.len(), 4);
    }

    #[test]
    fn test_save_and_load_config() {
        let temp = TempDir::new().unwrap();
        let mut config = KnowledgeBaseConfig::default();
        config.chunking.chunk_size = 1024;
        config.retrieval.rerank = true;

        save_config(temp.path(), "docs", &config).unwrap();

        let loaded = load_config(temp.path(), "docs").unwrap();
        assert_eq!(loaded, config);
    }

    #[test]
    fn test_partial_yaml() {
        let temp = TempDir::new().unwrap();
        let path = get_config_path(temp.path(), "docs");
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(
            &path,
            "retrieval:\n  top_k: 3\n  similarity_threshold: 0.35\ncache:\n  ttl_secs: 10\n",
        )
        .unwrap();

        let config = load_config(temp.path(), "docs").unwrap();
        assert_eq!(config.retrieval.top_k, 3);
        assert_eq!(config.retrieval.over_fetch_factor, 2);
        assert_eq!(config.cache.ttl(), Duration::from_secs(10));
        assert_eq!(config.cache.capacity, 256);
    }

    #[test]
    fn test_overlap_must_be_smaller_than_size() {
        let mut config = KnowledgeBaseConfig::default();
        config.chunking.chunk_overlap = config.chunking.chunk_size;
        assert!(matches!(config.validate(), Err(AppError::Config(_))));
    }

    #[test]
    fn test_threshold_follows_score_kind() {
        let retrieval = RetrievalConfig::default();
        assert_eq!(retrieval.threshold_for(ScoreKind::Similarity), 0.20);
        assert_eq!(retrieval.threshold_for(ScoreKind::Rerank), 0.5);
    }

    #[test]
    fn test_base_name_validation() {
        assert!(validate_base_name("product-docs_v2").is_ok());
        assert!(validate_base_name("../etc").is_err());
        assert!(validate_base_name(".hidden").is_err());
        assert!(validate_base_name("").is_err());
    }

    #[test]
    fn test_corpus_root_resolution() {
        let mut config = KnowledgeBaseConfig::default();
        assert!(config.corpus_root(Path::new("/ws")).is_none());

        config.corpus.root = Some(PathBuf::from("docs"));
        assert_eq!(
            config.corpus_root(Path::new("/ws")),
            Some(PathBuf::from("/ws/docs"))
        );
    }
}
