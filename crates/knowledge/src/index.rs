//! SQLite-backed vector index.
//!
//! One index version is a directory holding `index.sqlite` (the chunks and
//! their embeddings) and `metadata.json`. Versions are written once, then
//! only ever read; queries run against an in-memory [`IndexSnapshot`].

use crate::metadata::{read_metadata, write_metadata, METADATA_FILE};
use crate::types::{IndexMetadata, IndexVersionId, KnowledgeChunk};
use docent_core::{AppError, AppResult};
use rusqlite::{params, Connection};
use std::cmp::Ordering;
use std::path::Path;

/// File name of the chunk database inside a version directory.
pub const INDEX_FILE: &str = "index.sqlite";

/// A chunk paired with its relevance score.
#[derive(Debug, Clone, PartialEq)]
pub struct ScoredChunk {
    pub chunk: KnowledgeChunk,
    pub score: f32,
}

/// A fully loaded, immutable index version.
#[derive(Debug)]
pub struct IndexSnapshot {
    pub metadata: IndexMetadata,
    chunks: Vec<KnowledgeChunk>,
}

impl IndexSnapshot {
    pub fn new(metadata: IndexMetadata, chunks: Vec<KnowledgeChunk>) -> Self {
        Self { metadata, chunks }
    }

    pub fn version_id(&self) -> &IndexVersionId {
        &self.metadata.version_id
    }

    pub fn chunks(&self) -> &[KnowledgeChunk] {
        &self.chunks
    }

    pub fn len(&self) -> usize {
        self.chunks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.chunks.is_empty()
    }

    /// Top `limit` chunks by cosine similarity, best first.
    pub fn search(&self, query: &[f32], limit: usize) -> Vec<ScoredChunk> {
        let mut scored: Vec<(usize, f32)> = self
            .chunks
            .iter()
            .enumerate()
            .map(|(i, chunk)| (i, cosine_similarity(query, &chunk.embedding)))
            .collect();

        // Ties keep build order so results are reproducible
        scored.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(Ordering::Equal).then(a.0.cmp(&b.0)));
        scored.truncate(limit);

        tracing::debug!(
            version = %self.metadata.version_id,
            "Retrieved {} chunks (requested top-{})",
            scored.len(),
            limit
        );

        scored
            .into_iter()
            .map(|(i, score)| ScoredChunk {
                chunk: self.chunks[i].clone(),
                score,
            })
            .collect()
    }
}

/// Write a complete index version into `dir`.
///
/// The directory must be private to the caller (a build location); the
/// metadata file is written last so a readable `metadata.json` implies a
/// complete chunk database.
pub fn write_index(dir: &Path, metadata: &IndexMetadata, chunks: &[KnowledgeChunk]) -> AppResult<()> {
    std::fs::create_dir_all(dir)?;

    let mut conn = Connection::open(dir.join(INDEX_FILE))
        .map_err(|e| AppError::Knowledge(format!("Failed to open SQLite index: {}", e)))?;

    conn.execute_batch(
        r#"
        CREATE TABLE IF NOT EXISTS chunks (
            id TEXT PRIMARY KEY,
            position INTEGER NOT NULL,
            source_path TEXT NOT NULL,
            section_title TEXT,
            section_anchor TEXT,
            text TEXT NOT NULL,
            embedding BLOB NOT NULL
        );

        CREATE INDEX IF NOT EXISTS idx_chunks_source ON chunks(source_path);

        CREATE TABLE IF NOT EXISTS index_meta (
            key TEXT PRIMARY KEY,
            value TEXT NOT NULL
        );
        "#,
    )
    .map_err(|e| AppError::Knowledge(format!("Failed to create tables: {}", e)))?;

    let tx = conn
        .transaction()
        .map_err(|e| AppError::Knowledge(format!("Failed to begin transaction: {}", e)))?;
    {
        let mut stmt = tx
            .prepare(
                "INSERT INTO chunks (id, position, source_path, section_title, section_anchor, text, embedding)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            )
            .map_err(|e| AppError::Knowledge(format!("Failed to prepare insert: {}", e)))?;

        for chunk in chunks {
            stmt.execute(params![
                chunk.id,
                chunk.position as i64,
                chunk.source_path,
                chunk.section_title,
                chunk.section_anchor,
                chunk.text,
                embedding_to_bytes(&chunk.embedding),
            ])
            .map_err(|e| AppError::Knowledge(format!("Failed to insert chunk: {}", e)))?;
        }

        tx.execute(
            "INSERT OR REPLACE INTO index_meta (key, value) VALUES ('version_id', ?1)",
            params![metadata.version_id.as_str()],
        )
        .map_err(|e| AppError::Knowledge(format!("Failed to stamp index version: {}", e)))?;
    }
    tx.commit()
        .map_err(|e| AppError::Knowledge(format!("Failed to commit index: {}", e)))?;

    write_metadata(dir, metadata)?;

    tracing::debug!("Wrote {} chunks to {:?}", chunks.len(), dir);
    Ok(())
}

/// Attempts at pairing `metadata.json` with the database of the same version
/// before giving up on a directory that keeps changing under the reader.
const LOAD_ATTEMPTS: usize = 3;

/// Load and validate the index version stored in `dir`.
///
/// Any inconsistency between metadata and chunk data is reported as
/// `CorruptIndex`; serving half-valid data is never an option. The metadata
/// and the database are read separately, so each database carries its own
/// version stamp: a mismatch means a publish swapped the directory between
/// the two reads, and the load starts over.
pub fn load_index(dir: &Path) -> AppResult<IndexSnapshot> {
    let mut attempt = 0;
    loop {
        attempt += 1;
        let metadata = read_metadata(dir)?;

        match load_chunks(dir, &metadata)? {
            Loaded::Chunks(chunks) => {
                tracing::debug!(
                    version = %metadata.version_id,
                    "Loaded {} chunks from {:?}",
                    chunks.len(),
                    dir
                );
                return Ok(IndexSnapshot::new(metadata, chunks));
            }
            Loaded::OtherVersion(stamped) if attempt < LOAD_ATTEMPTS => {
                tracing::debug!(
                    expected = %metadata.version_id,
                    found = %stamped,
                    "Index replaced while loading; retrying"
                );
            }
            Loaded::OtherVersion(stamped) => {
                return Err(AppError::CorruptIndex(format!(
                    "{:?}: {} describes {} but {} holds {}",
                    dir, METADATA_FILE, metadata.version_id, INDEX_FILE, stamped
                )));
            }
        }
    }
}

enum Loaded {
    Chunks(Vec<KnowledgeChunk>),
    OtherVersion(String),
}

fn load_chunks(dir: &Path, metadata: &IndexMetadata) -> AppResult<Loaded> {
    let db_path = dir.join(INDEX_FILE);
    if !db_path.is_file() {
        return Err(AppError::CorruptIndex(format!(
            "{:?} has {} but no {}",
            dir, METADATA_FILE, INDEX_FILE
        )));
    }

    let corrupt = |e: rusqlite::Error| AppError::CorruptIndex(format!("{:?}: {}", db_path, e));

    // One connection for the stamp and the rows: both come from the same file
    let conn = Connection::open_with_flags(&db_path, rusqlite::OpenFlags::SQLITE_OPEN_READ_ONLY)
        .map_err(corrupt)?;

    let stamped: String = conn
        .query_row(
            "SELECT value FROM index_meta WHERE key = 'version_id'",
            [],
            |row| row.get(0),
        )
        .map_err(corrupt)?;
    if stamped != metadata.version_id.as_str() {
        return Ok(Loaded::OtherVersion(stamped));
    }

    let mut stmt = conn
        .prepare(
            "SELECT id, position, source_path, section_title, section_anchor, text, embedding
             FROM chunks ORDER BY position",
        )
        .map_err(corrupt)?;

    let rows = stmt
        .query_map([], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, i64>(1)?,
                row.get::<_, String>(2)?,
                row.get::<_, Option<String>>(3)?,
                row.get::<_, Option<String>>(4)?,
                row.get::<_, String>(5)?,
                row.get::<_, Vec<u8>>(6)?,
            ))
        })
        .map_err(corrupt)?;

    let mut chunks = Vec::with_capacity(metadata.chunk_count);
    for row in rows {
        let (id, position, source_path, section_title, section_anchor, text, blob) =
            row.map_err(corrupt)?;

        let embedding = bytes_to_embedding(&blob)?;
        if embedding.len() != metadata.embedding_dimensions {
            return Err(AppError::CorruptIndex(format!(
                "Chunk {} has {} dimensions, metadata says {}",
                id,
                embedding.len(),
                metadata.embedding_dimensions
            )));
        }

        chunks.push(KnowledgeChunk {
            id,
            position: u32::try_from(position).map_err(|_| {
                AppError::CorruptIndex(format!("Invalid chunk position {}", position))
            })?,
            source_path,
            section_title,
            section_anchor,
            text,
            embedding,
        });
    }

    if chunks.len() != metadata.chunk_count {
        return Err(AppError::CorruptIndex(format!(
            "{} lists {} chunks but {} holds {}",
            METADATA_FILE,
            metadata.chunk_count,
            INDEX_FILE,
            chunks.len()
        )));
    }

    Ok(Loaded::Chunks(chunks))
}

/// Convert embedding vector to little-endian bytes for storage.
fn embedding_to_bytes(embedding: &[f32]) -> Vec<u8> {
    embedding.iter().flat_map(|v| v.to_le_bytes()).collect()
}

/// Convert stored bytes back to an embedding vector.
fn bytes_to_embedding(bytes: &[u8]) -> AppResult<Vec<f32>> {
    if bytes.len() % 4 != 0 {
        return Err(AppError::CorruptIndex(
            "Invalid embedding bytes length".to_string(),
        ));
    }

    Ok(bytes
        .chunks_exact(4)
        .map(|b| f32::from_le_bytes([b[0], b[1], b[2], b[3]]))
        .collect())
}

/// Calculate cosine similarity between two vectors.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() {
        return 0.0;
    }

    let dot_product: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();

    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }

    dot_product / (norm_a * norm_b)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::INDEX_FORMAT_VERSION;
    use chrono::Utc;
    use tempfile::TempDir;

    fn chunk(id: &str, position: u32, embedding: Vec<f32>) -> KnowledgeChunk {
        KnowledgeChunk {
            id: id.to_string(),
            position,
            source_path: "guide.md".to_string(),
            section_title: Some("Setup".to_string()),
            section_anchor: Some("setup".to_string()),
            text: format!("text of {}", id),
            embedding,
        }
    }

    fn metadata(chunk_count: usize, dims: usize) -> IndexMetadata {
        IndexMetadata {
            format_version: INDEX_FORMAT_VERSION,
            version_id: IndexVersionId::generate(),
            created_at: Utc::now(),
            corpus_hash: "abc".to_string(),
            document_count: 1,
            chunk_count,
            embedding_provider: "trigram".to_string(),
            embedding_model_id: "trigram-v1".to_string(),
            embedding_dimensions: dims,
            chunk_size: 800,
            chunk_overlap: 120,
        }
    }

    #[test]
    fn test_write_and_load() {
        let temp = TempDir::new().unwrap();
        let chunks = vec![
            chunk("c0", 0, vec![1.0, 0.0, 0.0]),
            chunk("c1", 1, vec![0.0, 1.0, 0.0]),
        ];
        let meta = metadata(2, 3);

        write_index(temp.path(), &meta, &chunks).unwrap();
        let snapshot = load_index(temp.path()).unwrap();

        assert_eq!(snapshot.metadata, meta);
        assert_eq!(snapshot.chunks(), chunks.as_slice());
    }

    #[test]
    fn test_search_orders_by_similarity() {
        let snapshot = IndexSnapshot::new(
            metadata(3, 3),
            vec![
                chunk("far", 0, vec![0.0, 0.0, 1.0]),
                chunk("near", 1, vec![0.9, 0.1, 0.0]),
                chunk("mid", 2, vec![0.5, 0.5, 0.0]),
            ],
        );

        let hits = snapshot.search(&[1.0, 0.0, 0.0], 2);
        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0].chunk.id, "near");
        assert_eq!(hits[1].chunk.id, "mid");
        assert!(hits[0].score > hits[1].score);
    }

    #[test]
    fn test_count_mismatch_is_corrupt() {
        let temp = TempDir::new().unwrap();
        write_index(temp.path(), &metadata(5, 3), &[chunk("c0", 0, vec![1.0, 0.0, 0.0])]).unwrap();

        assert!(matches!(
            load_index(temp.path()),
            Err(AppError::CorruptIndex(_))
        ));
    }

    #[test]
    fn test_dimension_mismatch_is_corrupt() {
        let temp = TempDir::new().unwrap();
        write_index(temp.path(), &metadata(1, 4), &[chunk("c0", 0, vec![1.0, 0.0, 0.0])]).unwrap();

        assert!(matches!(
            load_index(temp.path()),
            Err(AppError::CorruptIndex(_))
        ));
    }

    #[test]
    fn test_missing_database_is_corrupt() {
        let temp = TempDir::new().unwrap();
        write_index(temp.path(), &metadata(0, 3), &[]).unwrap();
        std::fs::remove_file(temp.path().join(INDEX_FILE)).unwrap();

        assert!(matches!(
            load_index(temp.path()),
            Err(AppError::CorruptIndex(_))
        ));
    }

    #[test]
    fn test_metadata_of_another_version_is_rejected() {
        let temp = TempDir::new().unwrap();
        let old_dir = temp.path().join("old");
        let new_dir = temp.path().join("new");
        let chunks = vec![chunk("c0", 0, vec![1.0, 0.0, 0.0])];
        let old_meta = metadata(1, 3);
        let new_meta = metadata(1, 3);
        write_index(&old_dir, &old_meta, &chunks).unwrap();
        write_index(&new_dir, &new_meta, &chunks).unwrap();

        // Old metadata next to the new database: same shape, different version
        std::fs::copy(old_dir.join(METADATA_FILE), new_dir.join(METADATA_FILE)).unwrap();

        match load_index(&new_dir) {
            Err(AppError::CorruptIndex(message)) => {
                assert!(message.contains(new_meta.version_id.as_str()));
            }
            other => panic!("expected CorruptIndex, got {:?}", other.map(|s| s.metadata)),
        }
    }

    #[test]
    fn test_cosine_similarity() {
        assert!((cosine_similarity(&[1.0, 0.0], &[1.0, 0.0]) - 1.0).abs() < 0.001);
        assert!(cosine_similarity(&[1.0, 0.0], &[0.0, 1.0]).abs() < 0.001);
        assert_eq!(cosine_similarity(&[1.0], &[1.0, 0.0]), 0.0);
        assert_eq!(cosine_similarity(&[0.0, 0.0], &[1.0, 0.0]), 0.0);
    }
}
