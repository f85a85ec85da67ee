//! Index metadata sidecar (`metadata.json`).

use crate::types::{IndexMetadata, INDEX_FORMAT_VERSION};
use docent_core::{AppError, AppResult};
use std::fs;
use std::path::Path;

pub const METADATA_FILE: &str = "metadata.json";

/// Read the metadata of the index version in `dir`.
///
/// Missing, unreadable or unparseable metadata is `CorruptIndex`: callers
/// must not serve a version they cannot describe.
pub fn read_metadata(dir: &Path) -> AppResult<IndexMetadata> {
    let path = dir.join(METADATA_FILE);

    let content = fs::read_to_string(&path)
        .map_err(|e| AppError::CorruptIndex(format!("Cannot read {:?}: {}", path, e)))?;

    let metadata: IndexMetadata = serde_json::from_str(&content)
        .map_err(|e| AppError::CorruptIndex(format!("Cannot parse {:?}: {}", path, e)))?;

    if metadata.format_version != INDEX_FORMAT_VERSION {
        return Err(AppError::CorruptIndex(format!(
            "{:?} has format version {}, expected {}",
            path, metadata.format_version, INDEX_FORMAT_VERSION
        )));
    }

    Ok(metadata)
}

/// Write metadata into `dir`, replacing any previous file in one rename.
pub fn write_metadata(dir: &Path, metadata: &IndexMetadata) -> AppResult<()> {
    let path = dir.join(METADATA_FILE);
    let tmp = dir.join(format!("{}.tmp", METADATA_FILE));

    let json = serde_json::to_string_pretty(metadata)?;
    fs::write(&tmp, json)?;
    fs::rename(&tmp, &path)?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::IndexVersionId;
    use chrono::Utc;
    use tempfile::TempDir;

    fn sample() -> IndexMetadata {
        IndexMetadata {
            format_version: INDEX_FORMAT_VERSION,
            version_id: IndexVersionId::generate(),
            created_at: Utc::now(),
            corpus_hash: "f00d".to_string(),
            document_count: 2,
            chunk_count: 7,
            embedding_provider: "trigram".to_string(),
            embedding_model_id: "trigram-v1".to_string(),
            embedding_dimensions: 384,
            chunk_size: 800,
            chunk_overlap: 120,
        }
    }

    #[test]
    fn test_roundtrip_leaves_no_tmp() {
        let temp = TempDir::new().unwrap();
        let meta = sample();

        write_metadata(temp.path(), &meta).unwrap();
        assert_eq!(read_metadata(temp.path()).unwrap(), meta);
        assert!(!temp.path().join("metadata.json.tmp").exists());
    }

    #[test]
    fn test_missing_is_corrupt() {
        let temp = TempDir::new().unwrap();
        assert!(matches!(
            read_metadata(temp.path()),
            Err(AppError::CorruptIndex(_))
        ));
    }

    #[test]
    fn test_garbage_is_corrupt() {
        let temp = TempDir::new().unwrap();
        fs::write(temp.path().join(METADATA_FILE), "{ not json").unwrap();
        assert!(matches!(
            read_metadata(temp.path()),
            Err(AppError::CorruptIndex(_))
        ));
    }

    #[test]
    fn test_future_format_is_corrupt() {
        let temp = TempDir::new().unwrap();
        let mut meta = sample();
        meta.format_version = INDEX_FORMAT_VERSION + 1;
        write_metadata(temp.path(), &meta).unwrap();

        assert!(matches!(
            read_metadata(temp.path()),
            Err(AppError::CorruptIndex(_))
        ));
    }
}
