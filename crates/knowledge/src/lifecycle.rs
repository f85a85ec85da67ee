//! Index lifecycle: build out of place, publish atomically, roll back.
//!
//! Layout under a knowledge base directory:
//!
//! ```text
//! index/               canonical published version
//! index.lock           rebuild lock
//! index.retiring       version being moved to backups by a publish
//! .build-<version>/    in-progress build, never read by queries
//! backups/<version>/   previous canonical versions
//! ```
//!
//! A rebuild holds the lock from start to finish, writes a complete version
//! into its build directory, then publishes with two renames: the current
//! `index/` into `backups/`, and the build directory into `index/`. Between
//! the two renames there is no `index/`; readers load the retiring version
//! from `backups/` instead, and [`IndexManager::recover`] puts it back if
//! the publisher crashed there.

use crate::chunker::chunk_document;
use crate::config::KnowledgeBaseConfig;
use crate::corpus::{corpus_hash, CorpusSource};
use crate::embeddings::{embed_bounded, EmbeddingProvider};
use crate::index::{load_index, write_index, IndexSnapshot};
use crate::lock::{IndexLock, LockState};
use crate::metadata::read_metadata;
use crate::progress::{Phase, ProgressReporter};
use crate::published::PublishedIndex;
use crate::types::{
    BuildParams, IndexMetadata, IndexVersionId, KnowledgeChunk, RebuildOutcome, RebuildStats,
    SourceDocument, INDEX_FORMAT_VERSION,
};
use chrono::Utc;
use docent_core::{AppError, AppResult};
use serde::Serialize;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};

pub const INDEX_DIR: &str = "index";
pub const BACKUPS_DIR: &str = "backups";
pub(crate) const RETIRING_FILE: &str = "index.retiring";
const BUILD_PREFIX: &str = ".build-";
pub(crate) const CORRUPT_PREFIX: &str = "corrupt-";
const LOAD_ATTEMPTS: usize = 3;

/// Snapshot of a knowledge base's lifecycle state.
#[derive(Debug, Clone, Serialize)]
pub struct IndexStatus {
    pub base_dir: PathBuf,
    pub published: Option<IndexMetadata>,
    pub lock: LockState,
    pub backups: Vec<IndexVersionId>,
    /// Unreadable indexes set aside by a publish, oldest first.
    pub corrupt_backups: Vec<String>,
}

/// Owns the on-disk versions of one knowledge base and the in-process
/// pointer to the live one.
#[derive(Debug)]
pub struct IndexManager {
    base_dir: PathBuf,
    embedder: Arc<dyn EmbeddingProvider>,
    embed_timeout: Duration,
    lock: IndexLock,
    keep_backups: usize,
    published: PublishedIndex,
}

impl IndexManager {
    /// Create a manager without touching the published index.
    pub fn new(
        base_dir: impl Into<PathBuf>,
        embedder: Arc<dyn EmbeddingProvider>,
        config: &KnowledgeBaseConfig,
    ) -> Self {
        let base_dir = base_dir.into();
        Self {
            lock: IndexLock::new(&base_dir, config.lifecycle.lock_timeout()),
            base_dir,
            embedder,
            embed_timeout: config.embedding.timeout(),
            keep_backups: config.lifecycle.keep_backups,
            published: PublishedIndex::new(),
        }
    }

    /// Create a manager, repair an interrupted publish and load the live
    /// version. A corrupt published index is an error, not an empty one.
    pub fn open(
        base_dir: impl Into<PathBuf>,
        embedder: Arc<dyn EmbeddingProvider>,
        config: &KnowledgeBaseConfig,
    ) -> AppResult<Self> {
        let manager = Self::new(base_dir, embedder, config);
        manager.recover()?;
        manager.load_published()?;
        Ok(manager)
    }

    pub fn base_dir(&self) -> &Path {
        &self.base_dir
    }

    pub fn index_dir(&self) -> PathBuf {
        self.base_dir.join(INDEX_DIR)
    }

    fn backups_dir(&self) -> PathBuf {
        self.base_dir.join(BACKUPS_DIR)
    }

    pub fn embedder(&self) -> &Arc<dyn EmbeddingProvider> {
        &self.embedder
    }

    pub fn published(&self) -> &PublishedIndex {
        &self.published
    }

    /// The live snapshot, or `IndexNotBuilt` if nothing was ever published.
    pub fn snapshot(&self) -> AppResult<Arc<IndexSnapshot>> {
        self.published.snapshot().ok_or_else(|| {
            AppError::IndexNotBuilt(format!(
                "No index has been published in {:?}; run `docent index rebuild` first",
                self.base_dir
            ))
        })
    }

    /// The version a publish moved out of `index/`: the one recorded in
    /// `index.retiring` if it is still backed up, else the newest backup.
    fn retiring_version(&self) -> AppResult<Option<IndexVersionId>> {
        let backups = self.backups()?;
        let recorded = fs::read_to_string(self.base_dir.join(RETIRING_FILE))
            .ok()
            .and_then(|raw| IndexVersionId::parse(raw.trim()))
            .filter(|version| backups.contains(version));
        Ok(recorded.or_else(|| backups.last().cloned()))
    }

    /// Put the retiring version back when a publish was interrupted between
    /// its two renames. Skipped while another holder has the lock, since
    /// that holder may be mid-publish.
    pub fn recover(&self) -> AppResult<Option<IndexVersionId>> {
        if self.index_dir().exists() {
            return Ok(None);
        }
        if self.retiring_version()?.is_none() {
            return Ok(None);
        }

        let _lock = match self.lock.acquire() {
            Ok(lock) => lock,
            Err(AppError::RebuildInProgress { holder, .. }) => {
                debug!("Skipping recovery while {} holds the lock", holder);
                return Ok(None);
            }
            Err(e) => return Err(e),
        };

        // Re-check under the lock
        if self.index_dir().exists() {
            return Ok(None);
        }
        let Some(version) = self.retiring_version()? else {
            return Ok(None);
        };

        fs::rename(self.backups_dir().join(version.as_str()), self.index_dir())?;
        self.clear_retiring();
        warn!(
            version = %version,
            "Index directory was missing; restored the interrupted publish's previous version"
        );
        Ok(Some(version))
    }

    /// Load the live version and make it current in this process.
    ///
    /// That is `index/`, or while a publish sits between its two renames,
    /// the retiring version in `backups/`. Directories moved by a concurrent
    /// publish mid-read are looked up again.
    pub fn load_published(&self) -> AppResult<Option<IndexVersionId>> {
        let index_dir = self.index_dir();
        let mut attempt = 0;

        loop {
            attempt += 1;
            let dir = if index_dir.exists() {
                index_dir.clone()
            } else {
                match self.retiring_version()? {
                    Some(version) => {
                        debug!(version = %version, "No index/ mid-publish; reading retiring version");
                        self.backups_dir().join(version.as_str())
                    }
                    None if index_dir.exists() && attempt < LOAD_ATTEMPTS => continue,
                    None => {
                        debug!("No published index in {:?}", self.base_dir);
                        return Ok(None);
                    }
                }
            };

            match load_index(&dir) {
                Ok(snapshot) => {
                    let version = snapshot.version_id().clone();
                    self.published.publish(Arc::new(snapshot));
                    return Ok(Some(version));
                }
                Err(e) if !dir.exists() && attempt < LOAD_ATTEMPTS => {
                    debug!("{:?} moved while loading ({}); retrying", dir, e);
                }
                Err(e) => return Err(e),
            }
        }
    }

    /// Pick up a version published by another process.
    ///
    /// Reads only the metadata unless the on-disk version differs from the
    /// live one. A missing `index/` keeps the current pointer: that is the
    /// instant between the two publish renames. A reader with no pointer yet
    /// loads the retiring version instead.
    pub fn refresh(&self) -> AppResult<Option<IndexVersionId>> {
        let index_dir = self.index_dir();
        let current = self.published.version();

        let on_disk = match read_metadata(&index_dir) {
            Ok(metadata) => metadata.version_id,
            // Not there, or renamed away while we were reading it
            Err(_) if !index_dir.exists() => {
                return match current {
                    Some(version) => Ok(Some(version)),
                    None => self.load_published(),
                };
            }
            Err(e) => return Err(e),
        };

        if current.as_ref() == Some(&on_disk) {
            return Ok(Some(on_disk));
        }

        info!(version = %on_disk, "Loading index version published elsewhere");
        self.load_published()
    }

    /// Build a new version from `corpus` and publish it.
    ///
    /// Fails fast with `RebuildInProgress` if another rebuild holds the
    /// lock. On any failure the previous version stays published and the
    /// build directory is removed.
    pub async fn rebuild(
        &self,
        corpus: &dyn CorpusSource,
        params: &BuildParams,
        progress: &ProgressReporter,
    ) -> AppResult<RebuildOutcome> {
        let start = Instant::now();
        let mut lock = self.lock.acquire()?;

        info!(
            corpus = %corpus.describe(),
            chunk_size = params.chunk_size,
            chunk_overlap = params.chunk_overlap,
            force = params.force,
            "Rebuild started"
        );

        self.remove_stale_builds();

        let documents = corpus.load()?;
        progress.emit(
            Phase::Discover,
            documents.len() as u64,
            Some(documents.len() as u64),
            format!("{} documents in {}", documents.len(), corpus.describe()),
        );

        if documents.is_empty() {
            return Err(AppError::Knowledge(format!(
                "Corpus {} contains no indexable documents",
                corpus.describe()
            )));
        }

        let hash = corpus_hash(&documents);

        if !params.force {
            if let Some(current) = self.unchanged_version(&hash, params)? {
                info!(version = %current, "Corpus unchanged; keeping published index");
                lock.release();
                return Ok(RebuildOutcome::Unchanged {
                    version_id: current,
                });
            }
        }

        let version_id = IndexVersionId::generate();
        let build_dir = self
            .base_dir
            .join(format!("{}{}", BUILD_PREFIX, version_id));

        let result = self
            .build_and_publish(&build_dir, &version_id, &documents, hash, params, progress)
            .await;

        match &result {
            Ok(_) => info!(
                version = %version_id,
                documents = documents.len(),
                duration_ms = start.elapsed().as_millis() as u64,
                "Rebuild published"
            ),
            Err(e) => {
                error!(version = %version_id, "Rebuild aborted: {}", e);
                if build_dir.exists() {
                    if let Err(cleanup) = fs::remove_dir_all(&build_dir) {
                        warn!("Failed to remove build directory {:?}: {}", build_dir, cleanup);
                    }
                }
            }
        }

        lock.release();

        let chunks_produced = result?;
        Ok(RebuildOutcome::Published(RebuildStats {
            version_id,
            documents_processed: documents.len(),
            chunks_produced,
            duration_ms: start.elapsed().as_millis() as u64,
        }))
    }

    /// Current version id when the corpus and build parameters match it.
    fn unchanged_version(
        &self,
        hash: &str,
        params: &BuildParams,
    ) -> AppResult<Option<IndexVersionId>> {
        let Ok(current) = read_metadata(&self.index_dir()) else {
            return Ok(None);
        };

        let same = current.corpus_hash == hash
            && current.chunk_size == params.chunk_size
            && current.chunk_overlap == params.chunk_overlap
            && current.embedding_provider == self.embedder.provider_name()
            && current.embedding_model_id == self.embedder.model_name()
            && current.embedding_dimensions == self.embedder.dimensions();

        if !same {
            return Ok(None);
        }

        if self.published.version().as_ref() != Some(&current.version_id) {
            self.load_published()?;
        }
        Ok(Some(current.version_id))
    }

    async fn build_and_publish(
        &self,
        build_dir: &Path,
        version_id: &IndexVersionId,
        documents: &[SourceDocument],
        corpus_hash: String,
        params: &BuildParams,
        progress: &ProgressReporter,
    ) -> AppResult<usize> {
        let mut chunks = chunk_documents(documents, params, progress)?;

        let total = chunks.len() as u64;
        let mut embedded = 0u64;
        for batch in chunks.chunks_mut(params.batch_size.max(1)) {
            let texts: Vec<String> = batch.iter().map(|c| c.text.clone()).collect();
            let vectors = embed_bounded(self.embedder.as_ref(), &texts, self.embed_timeout).await?;

            for (chunk, vector) in batch.iter_mut().zip(vectors) {
                chunk.embedding = vector;
            }

            embedded += batch.len() as u64;
            progress.emit(
                Phase::Embed,
                embedded,
                Some(total),
                format!("model={}", self.embedder.model_name()),
            );
        }

        let metadata = IndexMetadata {
            format_version: INDEX_FORMAT_VERSION,
            version_id: version_id.clone(),
            created_at: Utc::now(),
            corpus_hash,
            document_count: documents.len(),
            chunk_count: chunks.len(),
            embedding_provider: self.embedder.provider_name().to_string(),
            embedding_model_id: self.embedder.model_name().to_string(),
            embedding_dimensions: self.embedder.dimensions(),
            chunk_size: params.chunk_size,
            chunk_overlap: params.chunk_overlap,
        };

        write_index(build_dir, &metadata, &chunks)?;

        // Publish exactly what readers will load
        let snapshot = load_index(build_dir)?;
        progress.emit(Phase::Index, total, Some(total), "index written");

        self.promote(build_dir)?;
        self.published.publish(Arc::new(snapshot));
        self.prune_backups();

        progress.emit(Phase::Publish, 1, Some(1), version_id.to_string());
        Ok(chunks.len())
    }

    /// Move the current `index/` to backups and `dir` into its place.
    fn promote(&self, dir: &Path) -> AppResult<()> {
        let index_dir = self.index_dir();

        let backup = if index_dir.exists() {
            let name = match read_metadata(&index_dir) {
                Ok(metadata) => {
                    self.record_retiring(&metadata.version_id)?;
                    metadata.version_id.to_string()
                }
                Err(e) => {
                    warn!("Backing up unreadable index: {}", e);
                    format!("{}{}", CORRUPT_PREFIX, IndexVersionId::generate())
                }
            };
            let target = self.backups_dir().join(name);
            fs::create_dir_all(self.backups_dir())?;
            if target.exists() {
                fs::remove_dir_all(&target)?;
            }
            fs::rename(&index_dir, &target)?;
            Some(target)
        } else {
            None
        };

        if let Err(e) = fs::rename(dir, &index_dir) {
            if let Some(backup) = backup {
                if let Err(restore) = fs::rename(&backup, &index_dir) {
                    error!(
                        "Failed to restore {:?} after aborted publish: {}",
                        backup, restore
                    );
                }
            }
            return Err(e.into());
        }

        self.clear_retiring();
        Ok(())
    }

    fn record_retiring(&self, version: &IndexVersionId) -> AppResult<()> {
        let path = self.base_dir.join(RETIRING_FILE);
        let tmp = self.base_dir.join(format!("{}.tmp", RETIRING_FILE));
        fs::write(&tmp, version.as_str())?;
        fs::rename(&tmp, &path)?;
        Ok(())
    }

    fn clear_retiring(&self) {
        let path = self.base_dir.join(RETIRING_FILE);
        if let Err(e) = fs::remove_file(&path) {
            if e.kind() != std::io::ErrorKind::NotFound {
                warn!("Failed to remove {:?}: {}", path, e);
            }
        }
    }

    /// Restore the newest backup older than the live version.
    pub fn rollback(&self) -> AppResult<IndexVersionId> {
        let _lock = self.lock.acquire()?;

        let current = read_metadata(&self.index_dir()).ok().map(|m| m.version_id);
        let target = self
            .backups()?
            .into_iter()
            .rev()
            .find(|backup| current.as_ref().map_or(true, |c| backup < c))
            .ok_or_else(|| {
                AppError::Knowledge(format!(
                    "No backup older than {} to roll back to",
                    current
                        .as_ref()
                        .map(|c| c.to_string())
                        .unwrap_or_else(|| "the current index".to_string())
                ))
            })?;

        let backup_dir = self.backups_dir().join(target.as_str());
        // Refuse to promote a backup that would not load
        let snapshot = load_index(&backup_dir)?;

        self.promote(&backup_dir)?;
        self.published.publish(Arc::new(snapshot));

        info!(
            version = %target,
            previous = ?current.map(|c| c.to_string()),
            "Rolled back index"
        );
        Ok(target)
    }

    pub fn status(&self) -> AppResult<IndexStatus> {
        let index_dir = self.index_dir();
        let published = if index_dir.exists() {
            Some(read_metadata(&index_dir)?)
        } else {
            None
        };

        Ok(IndexStatus {
            base_dir: self.base_dir.clone(),
            published,
            lock: self.lock.inspect()?,
            backups: self.backups()?,
            corrupt_backups: self.corrupt_backups()?,
        })
    }

    /// Backup versions, oldest first.
    pub fn backups(&self) -> AppResult<Vec<IndexVersionId>> {
        let dir = self.backups_dir();
        if !dir.exists() {
            return Ok(Vec::new());
        }

        let mut versions: Vec<IndexVersionId> = fs::read_dir(&dir)?
            .filter_map(|entry| entry.ok())
            .filter(|entry| entry.path().is_dir())
            .filter_map(|entry| IndexVersionId::parse(&entry.file_name().to_string_lossy()))
            .collect();
        versions.sort();
        Ok(versions)
    }

    /// Names of set-aside unreadable indexes, oldest first.
    pub fn corrupt_backups(&self) -> AppResult<Vec<String>> {
        let dir = self.backups_dir();
        if !dir.exists() {
            return Ok(Vec::new());
        }

        let mut names: Vec<String> = fs::read_dir(&dir)?
            .filter_map(|entry| entry.ok())
            .filter(|entry| entry.path().is_dir())
            .map(|entry| entry.file_name().to_string_lossy().into_owned())
            .filter(|name| name.starts_with(CORRUPT_PREFIX))
            .collect();
        names.sort();
        Ok(names)
    }

    /// Keep the newest `keep_backups` versions, and as many corrupt ones.
    fn prune_backups(&self) {
        let listed = self.backups().and_then(|backups| {
            let corrupt = self.corrupt_backups()?;
            Ok((backups, corrupt))
        });
        let (backups, corrupt) = match listed {
            Ok(listed) => listed,
            Err(e) => {
                warn!("Failed to list backups: {}", e);
                return;
            }
        };

        let names = backups.iter().map(|version| version.as_str().to_string());
        for group in [names.collect::<Vec<_>>(), corrupt] {
            let excess = group.len().saturating_sub(self.keep_backups);
            for name in group.into_iter().take(excess) {
                let path = self.backups_dir().join(&name);
                match fs::remove_dir_all(&path) {
                    Ok(()) => debug!(backup = %name, "Pruned backup"),
                    Err(e) => warn!("Failed to prune backup {:?}: {}", path, e),
                }
            }
        }
    }

    /// Remove build directories left by crashed rebuilds. Only called with
    /// the lock held, so none of them belongs to a live build.
    fn remove_stale_builds(&self) {
        let Ok(entries) = fs::read_dir(&self.base_dir) else {
            return;
        };

        for entry in entries.filter_map(|e| e.ok()) {
            if entry.file_name().to_string_lossy().starts_with(BUILD_PREFIX) {
                let path = entry.path();
                warn!("Removing leftover build directory {:?}", path);
                if let Err(e) = fs::remove_dir_all(&path) {
                    warn!("Failed to remove {:?}: {}", path, e);
                }
            }
        }
    }
}

fn chunk_documents(
    documents: &[SourceDocument],
    params: &BuildParams,
    progress: &ProgressReporter,
) -> AppResult<Vec<KnowledgeChunk>> {
    let mut chunks = Vec::new();

    for (i, doc) in documents.iter().enumerate() {
        let spans = chunk_document(doc, params.chunk_size, params.chunk_overlap)?;
        for (n, span) in spans.into_iter().enumerate() {
            chunks.push(KnowledgeChunk {
                id: format!("{}#{}", doc.path, n),
                position: chunks.len() as u32,
                source_path: doc.path.clone(),
                section_title: span.section_title,
                section_anchor: span.section_anchor,
                text: span.text,
                embedding: Vec::new(),
            });
        }

        progress.emit(
            Phase::Chunk,
            (i + 1) as u64,
            Some(documents.len() as u64),
            format!("{} ({} chunks so far)", doc.path, chunks.len()),
        );
    }

    Ok(chunks)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embeddings::providers::TrigramProvider;
    use tempfile::TempDir;

    fn manager(dir: &Path) -> IndexManager {
        IndexManager::new(
            dir,
            Arc::new(TrigramProvider::new(64)),
            &KnowledgeBaseConfig::default(),
        )
    }

    fn corpus(text: &str) -> Vec<SourceDocument> {
        vec![SourceDocument::new("guide.md", format!("# Guide\n\n{}", text))]
    }

    #[tokio::test]
    async fn test_rebuild_publishes_and_backs_up() {
        let temp = TempDir::new().unwrap();
        let manager = manager(temp.path());
        let params = BuildParams::default();
        let progress = ProgressReporter::noop();

        let first = manager.rebuild(&corpus("alpha"), &params, &progress).await.unwrap();
        let second = manager.rebuild(&corpus("beta"), &params, &progress).await.unwrap();

        assert_ne!(first.version_id(), second.version_id());
        assert_eq!(manager.snapshot().unwrap().version_id(), second.version_id());
        assert_eq!(manager.backups().unwrap(), vec![first.version_id().clone()]);
        assert!(!manager.lock.path().exists());
    }

    #[tokio::test]
    async fn test_unchanged_corpus_short_circuits() {
        let temp = TempDir::new().unwrap();
        let manager = manager(temp.path());
        let params = BuildParams::default();
        let progress = ProgressReporter::noop();

        let first = manager.rebuild(&corpus("alpha"), &params, &progress).await.unwrap();
        let again = manager.rebuild(&corpus("alpha"), &params, &progress).await.unwrap();
        assert!(matches!(again, RebuildOutcome::Unchanged { .. }));
        assert_eq!(again.version_id(), first.version_id());

        let forced = manager
            .rebuild(&corpus("alpha"), &params.clone().with_force(true), &progress)
            .await
            .unwrap();
        assert!(matches!(forced, RebuildOutcome::Published(_)));
        assert_ne!(forced.version_id(), first.version_id());
    }

    #[tokio::test]
    async fn test_changed_parameters_rebuild() {
        let temp = TempDir::new().unwrap();
        let manager = manager(temp.path());
        let progress = ProgressReporter::noop();

        manager
            .rebuild(&corpus("alpha"), &BuildParams::default(), &progress)
            .await
            .unwrap();

        let params = BuildParams {
            chunk_size: 400,
            chunk_overlap: 40,
            ..Default::default()
        };
        let outcome = manager.rebuild(&corpus("alpha"), &params, &progress).await.unwrap();
        assert!(matches!(outcome, RebuildOutcome::Published(_)));
    }

    #[tokio::test]
    async fn test_empty_corpus_is_rejected() {
        let temp = TempDir::new().unwrap();
        let manager = manager(temp.path());

        let result = manager
            .rebuild(&Vec::<SourceDocument>::new(), &BuildParams::default(), &ProgressReporter::noop())
            .await;
        assert!(matches!(result, Err(AppError::Knowledge(_))));
        assert!(!manager.lock.path().exists());
    }

    #[tokio::test]
    async fn test_backups_are_pruned() {
        let temp = TempDir::new().unwrap();
        let mut config = KnowledgeBaseConfig::default();
        config.lifecycle.keep_backups = 1;
        let manager = IndexManager::new(temp.path(), Arc::new(TrigramProvider::new(64)), &config);
        let progress = ProgressReporter::noop();

        let mut versions = Vec::new();
        for text in ["one", "two", "three"] {
            let outcome = manager
                .rebuild(&corpus(text), &BuildParams::default(), &progress)
                .await
                .unwrap();
            versions.push(outcome.version_id().clone());
        }

        assert_eq!(manager.backups().unwrap(), vec![versions[1].clone()]);
    }

    #[tokio::test]
    async fn test_unreadable_index_is_set_aside_and_pruned() {
        let temp = TempDir::new().unwrap();
        let mut config = KnowledgeBaseConfig::default();
        config.lifecycle.keep_backups = 1;
        let manager = IndexManager::new(temp.path(), Arc::new(TrigramProvider::new(64)), &config);
        let progress = ProgressReporter::noop();

        fs::create_dir_all(temp.path().join(INDEX_DIR)).unwrap();
        manager
            .rebuild(&corpus("alpha"), &BuildParams::default(), &progress)
            .await
            .unwrap();

        let first = manager.status().unwrap().corrupt_backups;
        assert_eq!(first.len(), 1);
        assert!(first[0].starts_with(CORRUPT_PREFIX));
        assert!(manager.backups().unwrap().is_empty());

        // Break the live index again; only the newest set-aside copy is kept
        fs::remove_file(temp.path().join(INDEX_DIR).join(crate::metadata::METADATA_FILE)).unwrap();
        manager
            .rebuild(&corpus("beta"), &BuildParams::default(), &progress)
            .await
            .unwrap();

        let second = manager.status().unwrap().corrupt_backups;
        assert_eq!(second.len(), 1);
        assert_ne!(second, first);
    }

    #[tokio::test]
    async fn test_rollback_restores_previous() {
        let temp = TempDir::new().unwrap();
        let manager = manager(temp.path());
        let progress = ProgressReporter::noop();

        let first = manager
            .rebuild(&corpus("alpha"), &BuildParams::default(), &progress)
            .await
            .unwrap();
        let second = manager
            .rebuild(&corpus("beta"), &BuildParams::default(), &progress)
            .await
            .unwrap();

        let restored = manager.rollback().unwrap();
        assert_eq!(&restored, first.version_id());
        assert_eq!(manager.snapshot().unwrap().version_id(), first.version_id());
        assert_eq!(manager.backups().unwrap(), vec![second.version_id().clone()]);

        // Nothing older than the first build
        assert!(manager.rollback().is_err());
    }

    #[tokio::test]
    async fn test_recover_after_interrupted_publish() {
        let temp = TempDir::new().unwrap();
        let progress = ProgressReporter::noop();
        let first = {
            let manager = manager(temp.path());
            manager
                .rebuild(&corpus("alpha"), &BuildParams::default(), &progress)
                .await
                .unwrap()
        };

        // Crash after moving index/ to backups, before promoting the build
        let backups = temp.path().join(BACKUPS_DIR);
        fs::create_dir_all(&backups).unwrap();
        fs::rename(
            temp.path().join(INDEX_DIR),
            backups.join(first.version_id().as_str()),
        )
        .unwrap();

        let reopened = IndexManager::open(
            temp.path(),
            Arc::new(TrigramProvider::new(64)),
            &KnowledgeBaseConfig::default(),
        )
        .unwrap();
        assert_eq!(reopened.snapshot().unwrap().version_id(), first.version_id());
    }

    #[tokio::test]
    async fn test_leftover_builds_removed() {
        let temp = TempDir::new().unwrap();
        let leftover = temp.path().join(".build-20240101T000000000Z-deadbeef");
        fs::create_dir_all(&leftover).unwrap();

        let manager = manager(temp.path());
        manager
            .rebuild(&corpus("alpha"), &BuildParams::default(), &ProgressReporter::noop())
            .await
            .unwrap();
        assert!(!leftover.exists());
    }

    #[test]
    fn test_snapshot_before_build() {
        let temp = TempDir::new().unwrap();
        let manager = IndexManager::open(
            temp.path(),
            Arc::new(TrigramProvider::new(64)),
            &KnowledgeBaseConfig::default(),
        )
        .unwrap();
        assert!(matches!(manager.snapshot(), Err(AppError::IndexNotBuilt(_))));
        assert!(manager.status().unwrap().published.is_none());
    }

    #[test]
    fn test_corrupt_published_index_refuses_to_open() {
        let temp = TempDir::new().unwrap();
        fs::create_dir_all(temp.path().join(INDEX_DIR)).unwrap();

        let result = IndexManager::open(
            temp.path(),
            Arc::new(TrigramProvider::new(64)),
            &KnowledgeBaseConfig::default(),
        );
        assert!(matches!(result, Err(AppError::CorruptIndex(_))));
    }

    #[tokio::test]
    async fn test_refresh_sees_other_process_publish() {
        let temp = TempDir::new().unwrap();
        let reader = manager(temp.path());
        let writer = manager(temp.path());

        let outcome = writer
            .rebuild(&corpus("alpha"), &BuildParams::default(), &ProgressReporter::noop())
            .await
            .unwrap();

        assert!(reader.published().snapshot().is_none());
        assert_eq!(reader.refresh().unwrap().as_ref(), Some(outcome.version_id()));
        assert_eq!(reader.snapshot().unwrap().version_id(), outcome.version_id());
    }
}
