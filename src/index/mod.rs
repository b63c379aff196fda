//! Vector index abstraction.
//!
//! The [`VectorIndex`] trait covers the three operations the pipeline
//! needs — upsert, nearest-neighbor search, delete — enabling pluggable
//! backends:
//!
//! - [`memory::MemoryIndex`] — brute-force cosine over in-process vectors,
//!   used by tests and development.
//! - [`sqlite::SqliteIndex`] — vectors persisted as BLOBs in the main
//!   database; similarity computed in-process.
//! - [`qdrant::QdrantIndex`] — remote Qdrant collection over its HTTP API.
//!
//! A backend that cannot be reached must fail with
//! [`IndexUnavailable`](crate::error::PipelineError::IndexUnavailable),
//! never an empty result set, so connectivity failures stay distinguishable
//! from "no matches".

pub mod memory;
pub mod qdrant;
pub mod sqlite;

use async_trait::async_trait;
use std::collections::HashSet;

use crate::error::Result;

/// One (chunk → vector) entry held by the index. Metadata carries enough
/// to filter by document and to assemble context without a store
/// round-trip.
#[derive(Debug, Clone)]
pub struct IndexEntry {
    pub chunk_id: String,
    pub document_id: String,
    pub chunk_index: i64,
    pub text: String,
    pub vector: Vec<f32>,
}

/// A ranked search hit.
#[derive(Debug, Clone)]
pub struct IndexHit {
    pub chunk_id: String,
    pub document_id: String,
    pub score: f32,
    pub text: String,
}

/// Restricts a search to a subset of documents.
#[derive(Debug, Clone, Default)]
pub struct SearchFilter {
    /// Only return chunks from these documents, when set.
    pub document_ids: Option<HashSet<String>>,
    /// Never return chunks from these documents.
    pub exclude_document_ids: HashSet<String>,
}

impl SearchFilter {
    pub fn allows(&self, document_id: &str) -> bool {
        if self.exclude_document_ids.contains(document_id) {
            return false;
        }
        match &self.document_ids {
            Some(ids) => ids.contains(document_id),
            None => true,
        }
    }
}

/// Abstract vector index backend.
#[async_trait]
pub trait VectorIndex: Send + Sync {
    /// Insert or replace entries. Idempotent: re-upserting a chunk id
    /// replaces its vector and metadata atomically.
    async fn upsert(&self, entries: Vec<IndexEntry>) -> Result<()>;

    /// Return at most `top_k` hits ordered by descending similarity.
    /// Ties break by chunk insertion order (stable).
    async fn search(
        &self,
        query_vector: &[f32],
        top_k: usize,
        filter: &SearchFilter,
    ) -> Result<Vec<IndexHit>>;

    /// Remove entries. Deleting an absent id is not an error.
    async fn delete(&self, chunk_ids: &[String]) -> Result<()>;
}
