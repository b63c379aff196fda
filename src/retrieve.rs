//! Relevance retrieval: query embedding, index search, and post-filtering.
//!
//! The retriever over-fetches from the vector index so the score floor and
//! per-document cap still leave enough candidates, then truncates to
//! `top_k`. Zero hits above the floor is a valid outcome — the answer
//! generator handles "no context" on its own — so an empty
//! [`RetrievalResult`] is never an error.

use tracing::debug;

use crate::config::RetrievalConfig;
use crate::embedding::{embed_query, Embedder};
use crate::error::Result;
use crate::index::{SearchFilter, VectorIndex};
use crate::models::{RetrievalResult, ScoredChunk};
use std::collections::{HashMap, HashSet};

/// Embed `query` and return the ranked, filtered context set.
///
/// Pipeline: embed → search `top_k × overfetch_factor` → drop hits below
/// `score_floor` → cap hits per document at `max_chunks_per_doc` (0
/// disables the cap) → truncate to `top_k`.
pub async fn retrieve(
    embedder: &dyn Embedder,
    index: &dyn VectorIndex,
    query: &str,
    params: &RetrievalConfig,
    filter: &SearchFilter,
) -> Result<RetrievalResult> {
    let query_vec = embed_query(embedder, query).await?;

    let fetch_k = params.top_k.saturating_mul(params.overfetch_factor.max(1));
    let hits = index.search(&query_vec, fetch_k, filter).await?;
    debug!(candidates = hits.len(), fetch_k, "index search complete");

    let mut per_doc: HashMap<String, usize> = HashMap::new();
    let mut seen_chunks: HashSet<String> = HashSet::new();
    let mut ranked = Vec::with_capacity(params.top_k);

    for hit in hits {
        if hit.score < params.score_floor {
            // Hits arrive sorted by descending score; everything after
            // this one is below the floor too.
            break;
        }
        if !seen_chunks.insert(hit.chunk_id.clone()) {
            continue;
        }
        if params.max_chunks_per_doc > 0 {
            let count = per_doc.entry(hit.document_id.clone()).or_insert(0);
            if *count >= params.max_chunks_per_doc {
                continue;
            }
            *count += 1;
        }

        ranked.push(ScoredChunk {
            chunk_id: hit.chunk_id,
            document_id: hit.document_id,
            score: hit.score,
            text: hit.text,
        });
        if ranked.len() == params.top_k {
            break;
        }
    }

    Ok(RetrievalResult { hits: ranked })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::index::memory::MemoryIndex;
    use crate::index::IndexEntry;
    use async_trait::async_trait;

    /// Deterministic embedder: maps known words onto fixed unit vectors.
    struct FakeEmbedder;

    fn vector_for(text: &str) -> Vec<f32> {
        if text.contains("alpha") {
            vec![1.0, 0.0, 0.0]
        } else if text.contains("beta") {
            vec![0.0, 1.0, 0.0]
        } else {
            vec![0.0, 0.0, 1.0]
        }
    }

    #[async_trait]
    impl Embedder for FakeEmbedder {
        async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
            Ok(texts.iter().map(|t| vector_for(t)).collect())
        }
        fn model_name(&self) -> &str {
            "fake"
        }
        fn dims(&self) -> usize {
            3
        }
    }

    fn entry(chunk_id: &str, doc_id: &str, text: &str) -> IndexEntry {
        IndexEntry {
            chunk_id: chunk_id.to_string(),
            document_id: doc_id.to_string(),
            chunk_index: 0,
            text: text.to_string(),
            vector: vector_for(text),
        }
    }

    fn params(top_k: usize, floor: f32, cap: usize) -> RetrievalConfig {
        RetrievalConfig {
            top_k,
            overfetch_factor: 4,
            score_floor: floor,
            max_chunks_per_doc: cap,
        }
    }

    async fn seeded_index() -> MemoryIndex {
        let index = MemoryIndex::new();
        index
            .upsert(vec![
                entry("c1", "d1", "alpha one"),
                entry("c2", "d1", "alpha two"),
                entry("c3", "d1", "alpha three"),
                entry("c4", "d2", "alpha four"),
                entry("c5", "d2", "beta one"),
            ])
            .await
            .unwrap();
        index
    }

    #[tokio::test]
    async fn test_scores_non_increasing_and_bounded_by_top_k() {
        let index = seeded_index().await;
        let result = retrieve(
            &FakeEmbedder,
            &index,
            "alpha",
            &params(3, 0.0, 0),
            &SearchFilter::default(),
        )
        .await
        .unwrap();
        assert_eq!(result.hits.len(), 3);
        for pair in result.hits.windows(2) {
            assert!(pair[0].score >= pair[1].score);
        }
    }

    #[tokio::test]
    async fn test_score_floor_discards_low_confidence() {
        let index = seeded_index().await;
        let result = retrieve(
            &FakeEmbedder,
            &index,
            "beta",
            &params(5, 0.5, 0),
            &SearchFilter::default(),
        )
        .await
        .unwrap();
        // Only c5 points in the beta direction.
        assert_eq!(result.hits.len(), 1);
        assert_eq!(result.hits[0].chunk_id, "c5");
    }

    #[tokio::test]
    async fn test_per_document_cap() {
        let index = seeded_index().await;
        let result = retrieve(
            &FakeEmbedder,
            &index,
            "alpha",
            &params(5, 0.5, 2),
            &SearchFilter::default(),
        )
        .await
        .unwrap();
        let d1_count = result
            .hits
            .iter()
            .filter(|h| h.document_id == "d1")
            .count();
        assert!(d1_count <= 2);
        // The cap frees a slot for d2's alpha chunk.
        assert!(result.hits.iter().any(|h| h.document_id == "d2"));
    }

    #[tokio::test]
    async fn test_no_matches_is_empty_not_error() {
        let index = MemoryIndex::new();
        let result = retrieve(
            &FakeEmbedder,
            &index,
            "gamma",
            &params(5, 0.5, 0),
            &SearchFilter::default(),
        )
        .await
        .unwrap();
        assert!(result.is_empty());
    }

    #[tokio::test]
    async fn test_no_duplicate_chunk_ids() {
        let index = seeded_index().await;
        let result = retrieve(
            &FakeEmbedder,
            &index,
            "alpha",
            &params(5, 0.0, 0),
            &SearchFilter::default(),
        )
        .await
        .unwrap();
        let mut ids: Vec<&str> = result.hits.iter().map(|h| h.chunk_id.as_str()).collect();
        ids.sort();
        let before = ids.len();
        ids.dedup();
        assert_eq!(ids.len(), before);
    }
}
