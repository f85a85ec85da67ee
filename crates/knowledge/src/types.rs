//! Knowledge system type definitions.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::atomic::{AtomicI64, Ordering};

use crate::config::KnowledgeBaseConfig;

/// Current on-disk index format.
pub const INDEX_FORMAT_VERSION: u32 = 2;

/// A document handed to the chunker.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceDocument {
    /// Path relative to the corpus root, `/`-separated
    pub path: String,

    /// Extracted text (HTML already stripped)
    pub content: String,
}

impl SourceDocument {
    pub fn new(path: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            content: content.into(),
        }
    }

    /// Whether headings in this document open sections.
    pub fn is_markdown(&self) -> bool {
        let lower = self.path.to_ascii_lowercase();
        lower.ends_with(".md") || lower.ends_with(".markdown")
    }
}

/// Immutable unit of indexed text.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KnowledgeChunk {
    /// Stable within one index build
    pub id: String,

    /// Position in build order
    pub position: u32,

    pub source_path: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub section_title: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub section_anchor: Option<String>,

    pub text: String,

    #[serde(skip)]
    pub embedding: Vec<f32>,
}

/// Identifier of one published index build.
///
/// Format: `YYYYMMDDTHHMMSSmmmZ-xxxxxxxx`. The timestamp prefix makes ids
/// sort by creation time; the random suffix keeps them unique.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct IndexVersionId(String);

impl IndexVersionId {
    /// Mint a fresh version id.
    ///
    /// Timestamps never repeat within a process, so ids minted here sort in
    /// minting order even when two builds land in the same millisecond.
    pub fn generate() -> Self {
        static LAST_MILLIS: AtomicI64 = AtomicI64::new(0);

        let now = Utc::now().timestamp_millis();
        let previous = LAST_MILLIS
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |last| {
                Some(now.max(last + 1))
            })
            .unwrap_or(now);
        let millis = now.max(previous + 1);

        let instant = DateTime::<Utc>::from_timestamp_millis(millis).unwrap_or_else(Utc::now);
        let stamp = instant.format("%Y%m%dT%H%M%S%3fZ");
        let suffix = uuid::Uuid::new_v4().simple().to_string();
        Self(format!("{}-{}", stamp, &suffix[..8]))
    }

    /// Parse a directory name back into a version id.
    pub fn parse(raw: &str) -> Option<Self> {
        let (stamp, suffix) = raw.split_once('-')?;
        let stamp_ok = stamp.len() == 19
            && stamp.as_bytes()[8] == b'T'
            && stamp.ends_with('Z')
            && stamp
                .chars()
                .enumerate()
                .all(|(i, c)| i == 8 || i == 18 || c.is_ascii_digit());
        let suffix_ok = suffix.len() == 8 && suffix.chars().all(|c| c.is_ascii_hexdigit());

        if stamp_ok && suffix_ok {
            Some(Self(raw.to_string()))
        } else {
            None
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for IndexVersionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Sidecar metadata describing one index build (`metadata.json`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexMetadata {
    pub format_version: u32,
    pub version_id: IndexVersionId,
    pub created_at: DateTime<Utc>,

    /// SHA-256 over the sorted (path, content) pairs of the corpus
    pub corpus_hash: String,

    pub document_count: usize,
    pub chunk_count: usize,
    pub embedding_provider: String,
    pub embedding_model_id: String,
    pub embedding_dimensions: usize,
    pub chunk_size: usize,
    pub chunk_overlap: usize,
}

/// Parameters of one rebuild.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuildParams {
    pub chunk_size: usize,
    pub chunk_overlap: usize,

    /// Texts per embedding call
    pub batch_size: usize,

    /// Rebuild even when the corpus and parameters are unchanged
    pub force: bool,
}

impl BuildParams {
    pub fn from_config(config: &KnowledgeBaseConfig) -> Self {
        Self {
            chunk_size: config.chunking.chunk_size,
            chunk_overlap: config.chunking.chunk_overlap,
            batch_size: config.embedding.batch_size,
            force: false,
        }
    }

    pub fn with_force(mut self, force: bool) -> Self {
        self.force = force;
        self
    }
}

impl Default for BuildParams {
    fn default() -> Self {
        Self::from_config(&KnowledgeBaseConfig::default())
    }
}

/// Build statistics reported by a successful rebuild.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RebuildStats {
    pub version_id: IndexVersionId,
    pub documents_processed: usize,
    pub chunks_produced: usize,
    pub duration_ms: u64,
}

/// What a rebuild did.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum RebuildOutcome {
    /// A new version was built and published
    Published(RebuildStats),

    /// The corpus and parameters match the live version; nothing was built
    Unchanged { version_id: IndexVersionId },
}

impl RebuildOutcome {
    /// Version live after the rebuild.
    pub fn version_id(&self) -> &IndexVersionId {
        match self {
            RebuildOutcome::Published(stats) => &stats.version_id,
            RebuildOutcome::Unchanged { version_id } => version_id,
        }
    }
}
