//! Tests for ranking correctness through a stored index.

use crate::decision::is_sufficient;
use crate::index::{load_index, write_index, IndexSnapshot};
use crate::retrieval::{RetrievalResult, ScoreKind};
use crate::types::{IndexMetadata, IndexVersionId, KnowledgeChunk, INDEX_FORMAT_VERSION};
use chrono::Utc;
use tempfile::TempDir;

#[cfg(test)]
mod tests {
    use super::*;

    /// Helper to create a test chunk with embedding.
    fn create_test_chunk(id: &str, position: u32, text: &str, embedding: Vec<f32>) -> KnowledgeChunk {
        KnowledgeChunk {
            id: id.to_string(),
            position,
            source_path: "guide.md".to_string(),
            section_title: None,
            section_anchor: None,
            text: text.to_string(),
            embedding,
        }
    }

    /// Helper to create a normalized embedding.
    fn normalize(v: &[f32]) -> Vec<f32> {
        let norm: f32 = v.iter().map(|x| x * x).sum::<f32>().sqrt();
        if norm > 0.0 {
            v.iter().map(|x| x / norm).collect()
        } else {
            v.to_vec()
        }
    }

    /// Write the chunks as a real index and load it back.
    fn stored(chunks: Vec<KnowledgeChunk>) -> (TempDir, IndexSnapshot) {
        let temp = TempDir::new().unwrap();
        let dims = chunks.first().map(|c| c.embedding.len()).unwrap_or(0);
        let meta = IndexMetadata {
            format_version: INDEX_FORMAT_VERSION,
            version_id: IndexVersionId::generate(),
            created_at: Utc::now(),
            corpus_hash: "test".to_string(),
            document_count: 1,
            chunk_count: chunks.len(),
            embedding_provider: "test".to_string(),
            embedding_model_id: "test-model".to_string(),
            embedding_dimensions: dims,
            chunk_size: 800,
            chunk_overlap: 120,
        };

        write_index(temp.path(), &meta, &chunks).unwrap();
        let snapshot = load_index(temp.path()).unwrap();
        (temp, snapshot)
    }

    fn as_result(snapshot: &IndexSnapshot, query: &[f32], limit: usize) -> RetrievalResult {
        RetrievalResult {
            version: snapshot.version_id().clone(),
            hits: snapshot.search(query, limit),
            score_kind: ScoreKind::Similarity,
        }
    }

    #[test]
    fn test_relevant_query_returns_high_scores() {
        let (_dir, snapshot) = stored(vec![
            create_test_chunk(
                "c1",
                0,
                "Invoice Inventory is enabled under Settings",
                normalize(&[1.0, 0.5, 0.2, 0.1]),
            ),
            create_test_chunk(
                "c2",
                1,
                "Payroll runs monthly",
                normalize(&[-0.3, -0.8, 0.4, -0.2]),
            ),
        ]);

        let results = snapshot.search(&normalize(&[0.9, 0.4, 0.3, 0.1]), 5);

        assert_eq!(results.len(), 2);
        assert_eq!(results[0].chunk.id, "c1", "Most relevant chunk should be first");
        assert!(
            results[0].score > 0.8,
            "Relevant chunk score should be high: {}",
            results[0].score
        );
        assert!(results[0].score > results[1].score, "Scores should be ordered");
    }

    #[test]
    fn test_unrelated_query_fails_the_gate() {
        let (_dir, snapshot) = stored(vec![create_test_chunk(
            "c1",
            0,
            "Invoice Inventory features",
            normalize(&[1.0, 0.0, 0.0, 0.0]),
        )]);

        // Orthogonal query: still returned, but far below any sane threshold
        let result = as_result(&snapshot, &normalize(&[0.0, 1.0, 0.0, 0.0]), 5);

        assert_eq!(result.hits.len(), 1);
        assert!(result.top_score().unwrap().abs() < 0.01);
        assert!(!is_sufficient(&result, 0.20));
    }

    #[test]
    fn test_scores_are_ordered_descending() {
        let (_dir, snapshot) = stored(vec![
            create_test_chunk("c1", 0, "Text A", normalize(&[1.0, 0.0, 0.0])),
            create_test_chunk("c2", 1, "Text B", normalize(&[0.7, 0.7, 0.0])),
            create_test_chunk("c3", 2, "Text C", normalize(&[0.0, 1.0, 0.0])),
            create_test_chunk("c4", 3, "Text D", normalize(&[-1.0, 0.0, 0.0])),
        ]);

        let results = snapshot.search(&normalize(&[1.0, 0.0, 0.0]), 10);

        for pair in results.windows(2) {
            assert!(
                pair[0].score >= pair[1].score,
                "Scores should be ordered: {} >= {}",
                pair[0].score,
                pair[1].score
            );
        }
        assert_eq!(results[0].chunk.id, "c1");
        assert!(results[0].score > 0.99, "Perfect match should have score near 1.0");
    }

    #[test]
    fn test_negative_similarity_ranks_last() {
        let (_dir, snapshot) = stored(vec![
            create_test_chunk("opposite", 0, "Opposite", normalize(&[-1.0, 0.0])),
            create_test_chunk("aligned", 1, "Aligned", normalize(&[1.0, 0.0])),
        ]);

        let result = as_result(&snapshot, &normalize(&[1.0, 0.0]), 2);

        assert_eq!(result.hits[0].chunk.id, "aligned");
        assert_eq!(result.hits[1].chunk.id, "opposite");
        assert!(result.hits[1].score < -0.99);
    }

    #[test]
    fn test_equal_scores_keep_corpus_order() {
        let (_dir, snapshot) = stored(vec![
            create_test_chunk("first", 0, "Same", normalize(&[0.5, 0.5])),
            create_test_chunk("second", 1, "Same", normalize(&[0.5, 0.5])),
            create_test_chunk("third", 2, "Same", normalize(&[0.5, 0.5])),
        ]);

        for _ in 0..5 {
            let ids: Vec<_> = snapshot
                .search(&normalize(&[1.0, 1.0]), 3)
                .into_iter()
                .map(|hit| hit.chunk.id)
                .collect();
            assert_eq!(ids, ["first", "second", "third"]);
        }
    }

    #[test]
    fn test_limit_truncates_after_ranking() {
        let (_dir, snapshot) = stored(vec![
            create_test_chunk("low", 0, "Low", normalize(&[0.1, 1.0])),
            create_test_chunk("high", 1, "High", normalize(&[1.0, 0.1])),
            create_test_chunk("mid", 2, "Mid", normalize(&[0.6, 0.6])),
        ]);

        let results = snapshot.search(&normalize(&[1.0, 0.0]), 2);

        assert_eq!(results.len(), 2);
        assert_eq!(results[0].chunk.id, "high");
        assert_eq!(results[1].chunk.id, "mid");
    }
}
