//! The published index pointer.

use crate::index::IndexSnapshot;
use crate::types::IndexVersionId;
use arc_swap::ArcSwapOption;
use std::sync::Arc;

/// Which index version is live in this process.
///
/// Readers take an `Arc` to the current snapshot and keep using it for the
/// whole query; a publish swaps the pointer without waiting for them.
#[derive(Debug, Default)]
pub struct PublishedIndex {
    current: ArcSwapOption<IndexSnapshot>,
}

impl PublishedIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of the live version, if any has been published.
    pub fn snapshot(&self) -> Option<Arc<IndexSnapshot>> {
        self.current.load_full()
    }

    pub fn version(&self) -> Option<IndexVersionId> {
        self.current
            .load()
            .as_ref()
            .map(|snapshot| snapshot.version_id().clone())
    }

    /// Make `snapshot` the live version. Returns the version it replaced.
    pub fn publish(&self, snapshot: Arc<IndexSnapshot>) -> Option<Arc<IndexSnapshot>> {
        let version = snapshot.version_id().clone();
        let previous = self.current.swap(Some(snapshot));
        tracing::debug!(
            version = %version,
            previous = ?previous.as_ref().map(|p| p.version_id().to_string()),
            "Published index pointer updated"
        );
        previous
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{IndexMetadata, INDEX_FORMAT_VERSION};
    use chrono::Utc;

    fn snapshot() -> Arc<IndexSnapshot> {
        Arc::new(IndexSnapshot::new(
            IndexMetadata {
                format_version: INDEX_FORMAT_VERSION,
                version_id: IndexVersionId::generate(),
                created_at: Utc::now(),
                corpus_hash: String::new(),
                document_count: 0,
                chunk_count: 0,
                embedding_provider: "trigram".to_string(),
                embedding_model_id: "trigram-v1".to_string(),
                embedding_dimensions: 3,
                chunk_size: 800,
                chunk_overlap: 120,
            },
            Vec::new(),
        ))
    }

    #[test]
    fn test_empty_until_published() {
        let published = PublishedIndex::new();
        assert!(published.snapshot().is_none());
        assert!(published.version().is_none());
    }

    #[test]
    fn test_readers_keep_their_snapshot() {
        let published = PublishedIndex::new();
        let first = snapshot();
        published.publish(first.clone());

        let held = published.snapshot().unwrap();
        let second = snapshot();
        let replaced = published.publish(second.clone()).unwrap();

        assert_eq!(replaced.version_id(), first.version_id());
        assert_eq!(held.version_id(), first.version_id());
        assert_eq!(published.version().as_ref(), Some(second.version_id()));
    }
}
