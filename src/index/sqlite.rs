//! SQLite-backed [`VectorIndex`].
//!
//! Vectors are stored as little-endian f32 BLOBs in the `index_entries`
//! table of the main database; similarity is computed in-process over all
//! rows. Row order (rowid) preserves insertion order for the stable
//! tie-break, and `ON CONFLICT ... DO UPDATE` keeps the rowid on replace.
//!
//! Suitable for the single-node deployments the CLI targets; swap in the
//! Qdrant backend when the corpus outgrows a brute-force scan.

use async_trait::async_trait;
use sqlx::{Row, SqlitePool};

use crate::embedding::{blob_to_vec, cosine_similarity, vec_to_blob};
use crate::error::Result;

use super::{IndexEntry, IndexHit, SearchFilter, VectorIndex};

pub struct SqliteIndex {
    pool: SqlitePool,
}

impl SqliteIndex {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl VectorIndex for SqliteIndex {
    async fn upsert(&self, entries: Vec<IndexEntry>) -> Result<()> {
        let mut tx = self.pool.begin().await?;
        for entry in &entries {
            sqlx::query(
                r#"
                INSERT INTO index_entries (chunk_id, document_id, chunk_index, text, vector)
                VALUES (?, ?, ?, ?, ?)
                ON CONFLICT(chunk_id) DO UPDATE SET
                    document_id = excluded.document_id,
                    chunk_index = excluded.chunk_index,
                    text = excluded.text,
                    vector = excluded.vector
                "#,
            )
            .bind(&entry.chunk_id)
            .bind(&entry.document_id)
            .bind(entry.chunk_index)
            .bind(&entry.text)
            .bind(vec_to_blob(&entry.vector))
            .execute(&mut *tx)
            .await?;
        }
        tx.commit().await?;
        Ok(())
    }

    async fn search(
        &self,
        query_vector: &[f32],
        top_k: usize,
        filter: &SearchFilter,
    ) -> Result<Vec<IndexHit>> {
        let rows = sqlx::query(
            "SELECT chunk_id, document_id, text, vector FROM index_entries ORDER BY rowid",
        )
        .fetch_all(&self.pool)
        .await?;

        let mut hits: Vec<IndexHit> = rows
            .iter()
            .filter_map(|row| {
                let document_id: String = row.get("document_id");
                if !filter.allows(&document_id) {
                    return None;
                }
                let blob: Vec<u8> = row.get("vector");
                let vector = blob_to_vec(&blob);
                Some(IndexHit {
                    chunk_id: row.get("chunk_id"),
                    document_id,
                    score: cosine_similarity(query_vector, &vector),
                    text: row.get("text"),
                })
            })
            .collect();

        hits.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        hits.truncate(top_k);
        Ok(hits)
    }

    async fn delete(&self, chunk_ids: &[String]) -> Result<()> {
        if chunk_ids.is_empty() {
            return Ok(());
        }
        let placeholders = vec!["?"; chunk_ids.len()].join(", ");
        let sql = format!("DELETE FROM index_entries WHERE chunk_id IN ({placeholders})");
        let mut query = sqlx::query(&sql);
        for id in chunk_ids {
            query = query.bind(id);
        }
        query.execute(&self.pool).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db;

    async fn test_pool() -> SqlitePool {
        let pool = SqlitePool::connect("sqlite::memory:").await.unwrap();
        db::run_migrations(&pool).await.unwrap();
        pool
    }

    fn entry(chunk_id: &str, doc_id: &str, vector: Vec<f32>) -> IndexEntry {
        IndexEntry {
            chunk_id: chunk_id.to_string(),
            document_id: doc_id.to_string(),
            chunk_index: 0,
            text: format!("text of {chunk_id}"),
            vector,
        }
    }

    #[tokio::test]
    async fn test_upsert_search_delete_roundtrip() {
        let index = SqliteIndex::new(test_pool().await);
        index
            .upsert(vec![
                entry("c1", "d1", vec![1.0, 0.0]),
                entry("c2", "d2", vec![0.0, 1.0]),
            ])
            .await
            .unwrap();

        let hits = index
            .search(&[1.0, 0.0], 10, &SearchFilter::default())
            .await
            .unwrap();
        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0].chunk_id, "c1");
        assert!(hits[0].score > hits[1].score);

        index.delete(&["c1".to_string()]).await.unwrap();
        let hits = index
            .search(&[1.0, 0.0], 10, &SearchFilter::default())
            .await
            .unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].chunk_id, "c2");

        // Idempotent delete
        index.delete(&["c1".to_string()]).await.unwrap();
    }

    #[tokio::test]
    async fn test_upsert_replaces_atomically() {
        let index = SqliteIndex::new(test_pool().await);
        index
            .upsert(vec![entry("c1", "d1", vec![1.0, 0.0])])
            .await
            .unwrap();
        let mut replacement = entry("c1", "d1", vec![0.0, 1.0]);
        replacement.text = "replaced".to_string();
        index.upsert(vec![replacement]).await.unwrap();

        let hits = index
            .search(&[0.0, 1.0], 10, &SearchFilter::default())
            .await
            .unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].text, "replaced");
        assert!((hits[0].score - 1.0).abs() < 1e-6);
    }
}
