//! Corpus sources: where rebuilds read their documents from.

use crate::config::CorpusConfig;
use crate::parser::{extract_text, is_likely_text, ContentType};
use crate::types::SourceDocument;
use docent_core::{AppError, AppResult};
use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

/// A collection of documents to index.
pub trait CorpusSource: Send + Sync {
    /// Short description for logs and progress output.
    fn describe(&self) -> String;

    /// Load every document, sorted by path.
    fn load(&self) -> AppResult<Vec<SourceDocument>>;
}

/// Documents under a directory tree.
#[derive(Debug, Clone)]
pub struct DirectoryCorpus {
    root: PathBuf,
    extensions: Vec<String>,
    exclude: Vec<String>,
}

impl DirectoryCorpus {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self::with_config(root, &CorpusConfig::default())
    }

    pub fn with_config(root: impl Into<PathBuf>, config: &CorpusConfig) -> Self {
        Self {
            root: root.into(),
            extensions: config
                .extensions
                .iter()
                .map(|e| e.trim_start_matches('.').to_ascii_lowercase())
                .collect(),
            exclude: config.exclude.clone(),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn should_include(&self, relative: &str, path: &Path) -> bool {
        let ext_ok = path
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| self.extensions.contains(&e.to_ascii_lowercase()))
            .unwrap_or(false);

        ext_ok && !self.exclude.iter().any(|pattern| relative.contains(pattern.as_str()))
    }
}

impl CorpusSource for DirectoryCorpus {
    fn describe(&self) -> String {
        self.root.display().to_string()
    }

    fn load(&self) -> AppResult<Vec<SourceDocument>> {
        if !self.root.is_dir() {
            return Err(AppError::Knowledge(format!(
                "Corpus root is not a directory: {:?}",
                self.root
            )));
        }

        let mut documents = Vec::new();

        for entry in WalkDir::new(&self.root)
            .follow_links(false)
            .sort_by_file_name()
            .into_iter()
            // Hidden entries (including .docent itself) are never corpus content
            .filter_entry(|e| e.depth() == 0 || !e.file_name().to_string_lossy().starts_with('.'))
        {
            let entry = entry.map_err(|e| {
                AppError::Knowledge(format!("Failed to walk corpus {:?}: {}", self.root, e))
            })?;

            if !entry.file_type().is_file() {
                continue;
            }

            let path = entry.path();
            let relative = relative_path(&self.root, path);

            if !self.should_include(&relative, path) {
                continue;
            }

            let bytes = std::fs::read(path)?;
            let raw = match String::from_utf8(bytes) {
                Ok(raw) if is_likely_text(&raw) => raw,
                _ => {
                    tracing::warn!("Skipping likely binary file: {:?}", path);
                    continue;
                }
            };

            let content = extract_text(ContentType::from_path(path), &raw);
            if content.trim().is_empty() {
                tracing::debug!("Skipping empty document: {}", relative);
                continue;
            }

            documents.push(SourceDocument::new(relative, content));
        }

        documents.sort_by(|a, b| a.path.cmp(&b.path));

        tracing::debug!(
            "Loaded {} documents from {:?}",
            documents.len(),
            self.root
        );

        Ok(documents)
    }
}

/// In-memory corpus, mostly for embedding callers and tests.
impl CorpusSource for Vec<SourceDocument> {
    fn describe(&self) -> String {
        format!("{} in-memory documents", self.len())
    }

    fn load(&self) -> AppResult<Vec<SourceDocument>> {
        let mut documents = self.clone();
        documents.sort_by(|a, b| a.path.cmp(&b.path));
        Ok(documents)
    }
}

fn relative_path(root: &Path, path: &Path) -> String {
    let relative = path.strip_prefix(root).unwrap_or(path);
    relative
        .components()
        .map(|c| c.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join("/")
}

/// Content fingerprint of a corpus, independent of load order.
pub fn corpus_hash(documents: &[SourceDocument]) -> String {
    let mut sorted: Vec<&SourceDocument> = documents.iter().collect();
    sorted.sort_by(|a, b| a.path.cmp(&b.path));

    let mut hasher = Sha256::new();
    for doc in sorted {
        hasher.update(doc.path.as_bytes());
        hasher.update([0u8]);
        hasher.update(doc.content.as_bytes());
        hasher.update([0u8]);
    }
    format!("{:x}", hasher.finalize())
}
