//! In-memory [`VectorIndex`] for tests and development.
//!
//! Entries live in a `Vec` behind `std::sync::RwLock`; search is
//! brute-force cosine similarity over all stored vectors. The `Vec`
//! preserves insertion order, which gives the stable tie-break the
//! search contract requires — an upsert of an existing chunk id replaces
//! the entry in place, keeping its original position.

use std::sync::RwLock;

use async_trait::async_trait;

use crate::embedding::cosine_similarity;
use crate::error::{PipelineError, Result};

use super::{IndexEntry, IndexHit, SearchFilter, VectorIndex};

#[derive(Default)]
pub struct MemoryIndex {
    entries: RwLock<Vec<IndexEntry>>,
}

impl MemoryIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of entries currently stored (test helper).
    pub fn len(&self) -> usize {
        self.entries
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl VectorIndex for MemoryIndex {
    async fn upsert(&self, entries: Vec<IndexEntry>) -> Result<()> {
        let mut stored = self
            .entries
            .write()
            .map_err(|_| PipelineError::IndexUnavailable("index lock poisoned".to_string()))?;
        for entry in entries {
            match stored.iter_mut().find(|e| e.chunk_id == entry.chunk_id) {
                Some(existing) => *existing = entry,
                None => stored.push(entry),
            }
        }
        Ok(())
    }

    async fn search(
        &self,
        query_vector: &[f32],
        top_k: usize,
        filter: &SearchFilter,
    ) -> Result<Vec<IndexHit>> {
        let stored = self
            .entries
            .read()
            .map_err(|_| PipelineError::IndexUnavailable("index lock poisoned".to_string()))?;

        let mut hits: Vec<IndexHit> = stored
            .iter()
            .filter(|e| filter.allows(&e.document_id))
            .map(|e| IndexHit {
                chunk_id: e.chunk_id.clone(),
                document_id: e.document_id.clone(),
                score: cosine_similarity(query_vector, &e.vector),
                text: e.text.clone(),
            })
            .collect();

        // Stable sort: equal scores keep insertion order.
        hits.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        hits.truncate(top_k);
        Ok(hits)
    }

    async fn delete(&self, chunk_ids: &[String]) -> Result<()> {
        let mut stored = self
            .entries
            .write()
            .map_err(|_| PipelineError::IndexUnavailable("index lock poisoned".to_string()))?;
        stored.retain(|e| !chunk_ids.contains(&e.chunk_id));
        Ok(())
    }
}
