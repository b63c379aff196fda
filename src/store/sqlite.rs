//! SQLite-backed store implementations over `sqlx`.
//!
//! Maps each store operation onto the schema created by
//! [`db::run_migrations`](crate::db::run_migrations). Turn ordering uses
//! the `turns` rowid, which is strictly increasing per insert even when
//! two turns land within the same second.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{Row, SqlitePool};

use crate::error::{PipelineError, Result};
use crate::models::{ChunkRecord, ChunkStatus, Document, DocumentStatus, Role, Turn};

use super::{DocumentStore, TurnStore};

pub struct SqliteDocumentStore {
    pool: SqlitePool,
}

impl SqliteDocumentStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

fn ts_to_datetime(ts: i64) -> DateTime<Utc> {
    DateTime::from_timestamp(ts, 0).unwrap_or_default()
}

fn row_to_chunk(row: &sqlx::sqlite::SqliteRow) -> ChunkRecord {
    let status: String = row.get("status");
    ChunkRecord {
        id: row.get("id"),
        document_id: row.get("document_id"),
        chunk_index: row.get("chunk_index"),
        text: row.get("text"),
        start_offset: row.get("start_offset"),
        end_offset: row.get("end_offset"),
        hash: row.get("hash"),
        status: ChunkStatus::parse(&status).unwrap_or(ChunkStatus::Pending),
    }
}

#[async_trait]
impl DocumentStore for SqliteDocumentStore {
    async fn insert_document(&self, doc: &Document) -> Result<()> {
        sqlx::query(
            "INSERT INTO documents (id, filename, owner, uploaded_at, status) VALUES (?, ?, ?, ?, ?)",
        )
        .bind(&doc.id)
        .bind(&doc.filename)
        .bind(&doc.owner)
        .bind(doc.uploaded_at.timestamp())
        .bind(doc.status.as_str())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn get_document(&self, id: &str) -> Result<Option<Document>> {
        let row = sqlx::query(
            "SELECT id, filename, owner, uploaded_at, status FROM documents WHERE id = ?",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(|row| {
            let status: String = row.get("status");
            Document {
                id: row.get("id"),
                filename: row.get("filename"),
                owner: row.get("owner"),
                uploaded_at: ts_to_datetime(row.get("uploaded_at")),
                status: DocumentStatus::parse(&status).unwrap_or(DocumentStatus::Pending),
            }
        }))
    }

    async fn set_document_status(&self, id: &str, status: DocumentStatus) -> Result<()> {
        let result = sqlx::query("UPDATE documents SET status = ? WHERE id = ?")
            .bind(status.as_str())
            .bind(id)
            .execute(&self.pool)
            .await?;
        if result.rows_affected() == 0 {
            return Err(PipelineError::NotFound(format!("document {id}")));
        }
        Ok(())
    }

    async fn list_documents(&self) -> Result<Vec<Document>> {
        let rows = sqlx::query(
            "SELECT id, filename, owner, uploaded_at, status FROM documents
             ORDER BY uploaded_at DESC, id",
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .iter()
            .map(|row| {
                let status: String = row.get("status");
                Document {
                    id: row.get("id"),
                    filename: row.get("filename"),
                    owner: row.get("owner"),
                    uploaded_at: ts_to_datetime(row.get("uploaded_at")),
                    status: DocumentStatus::parse(&status).unwrap_or(DocumentStatus::Pending),
                }
            })
            .collect())
    }

    async fn insert_chunks(&self, chunks: &[ChunkRecord]) -> Result<()> {
        let mut tx = self.pool.begin().await?;
        for chunk in chunks {
            sqlx::query(
                r#"
                INSERT INTO chunks (id, document_id, chunk_index, text, start_offset, end_offset, hash, status)
                VALUES (?, ?, ?, ?, ?, ?, ?, ?)
                "#,
            )
            .bind(&chunk.id)
            .bind(&chunk.document_id)
            .bind(chunk.chunk_index)
            .bind(&chunk.text)
            .bind(chunk.start_offset)
            .bind(chunk.end_offset)
            .bind(&chunk.hash)
            .bind(chunk.status.as_str())
            .execute(&mut *tx)
            .await?;
        }
        tx.commit().await?;
        Ok(())
    }

    async fn get_chunks(&self, document_id: &str) -> Result<Vec<ChunkRecord>> {
        let rows = sqlx::query(
            "SELECT id, document_id, chunk_index, text, start_offset, end_offset, hash, status
             FROM chunks WHERE document_id = ? ORDER BY chunk_index",
        )
        .bind(document_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.iter().map(row_to_chunk).collect())
    }

    async fn set_chunk_status(&self, chunk_ids: &[String], status: ChunkStatus) -> Result<()> {
        if chunk_ids.is_empty() {
            return Ok(());
        }
        let placeholders = vec!["?"; chunk_ids.len()].join(", ");
        let sql = format!("UPDATE chunks SET status = ? WHERE id IN ({placeholders})");
        let mut query = sqlx::query(&sql).bind(status.as_str());
        for id in chunk_ids {
            query = query.bind(id);
        }
        query.execute(&self.pool).await?;
        Ok(())
    }
}

pub struct SqliteTurnStore {
    pool: SqlitePool,
}

impl SqliteTurnStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl TurnStore for SqliteTurnStore {
    async fn append_turn(&self, session_id: &str, turn: &Turn) -> Result<()> {
        let cited = serde_json::to_string(&turn.cited_chunk_ids)
            .map_err(|e| PipelineError::Store(e.into()))?;
        sqlx::query(
            "INSERT INTO turns (session_id, role, text, created_at, cited_chunk_ids) VALUES (?, ?, ?, ?, ?)",
        )
        .bind(session_id)
        .bind(turn.role.as_str())
        .bind(&turn.text)
        .bind(turn.created_at.timestamp())
        .bind(cited)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn list_turns(&self, session_id: &str, limit: Option<usize>) -> Result<Vec<Turn>> {
        let rows = match limit {
            Some(n) => {
                sqlx::query(
                    "SELECT role, text, created_at, cited_chunk_ids FROM turns
                     WHERE session_id = ? ORDER BY id DESC LIMIT ?",
                )
                .bind(session_id)
                .bind(n as i64)
                .fetch_all(&self.pool)
                .await?
            }
            None => {
                sqlx::query(
                    "SELECT role, text, created_at, cited_chunk_ids FROM turns
                     WHERE session_id = ? ORDER BY id DESC",
                )
                .bind(session_id)
                .fetch_all(&self.pool)
                .await?
            }
        };

        let mut turns: Vec<Turn> = rows
            .iter()
            .map(|row| {
                let role: String = row.get("role");
                let cited: String = row.get("cited_chunk_ids");
                Turn {
                    role: Role::parse(&role).unwrap_or(Role::User),
                    text: row.get("text"),
                    created_at: ts_to_datetime(row.get("created_at")),
                    cited_chunk_ids: serde_json::from_str(&cited).unwrap_or_default(),
                }
            })
            .collect();
        turns.reverse();
        Ok(turns)
    }

    async fn count_turns(&self, session_id: &str) -> Result<usize> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM turns WHERE session_id = ?")
            .bind(session_id)
            .fetch_one(&self.pool)
            .await?;
        Ok(count as usize)
    }

    async fn remove_oldest(&self, session_id: &str, n: usize) -> Result<()> {
        sqlx::query(
            "DELETE FROM turns WHERE id IN
             (SELECT id FROM turns WHERE session_id = ? ORDER BY id ASC LIMIT ?)",
        )
        .bind(session_id)
        .bind(n as i64)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn clear_session(&self, session_id: &str) -> Result<()> {
        sqlx::query("DELETE FROM turns WHERE session_id = ?")
            .bind(session_id)
            .execute(&self.pool)
            .await?;
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

    #[tokio::test]
    async fn test_document_roundtrip() {
        let store = SqliteDocumentStore::new(test_pool().await);
        let doc = Document {
            id: "d1".to_string(),
            filename: "report.txt".to_string(),
            owner: Some("alice".to_string()),
            uploaded_at: Utc::now(),
            status: DocumentStatus::Pending,
        };
        store.insert_document(&doc).await.unwrap();
        store
            .set_document_status("d1", DocumentStatus::Indexed)
            .await
            .unwrap();
        let got = store.get_document("d1").await.unwrap().unwrap();
        assert_eq!(got.filename, "report.txt");
        assert_eq!(got.owner.as_deref(), Some("alice"));
        assert_eq!(got.status, DocumentStatus::Indexed);
    }

    #[tokio::test]
    async fn test_missing_document_is_none_and_update_not_found() {
        let store = SqliteDocumentStore::new(test_pool().await);
        assert!(store.get_document("nope").await.unwrap().is_none());
        let err = store
            .set_document_status("nope", DocumentStatus::Failed)
            .await
            .unwrap_err();
        assert!(matches!(err, PipelineError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_chunk_roundtrip_ordered() {
        let pool = test_pool().await;
        let store = SqliteDocumentStore::new(pool);
        let doc = Document {
            id: "d1".to_string(),
            filename: "a.txt".to_string(),
            owner: None,
            uploaded_at: Utc::now(),
            status: DocumentStatus::Pending,
        };
        store.insert_document(&doc).await.unwrap();

        let mk = |i: i64| ChunkRecord {
            id: format!("c{i}"),
            document_id: "d1".to_string(),
            chunk_index: i,
            text: format!("chunk {i}"),
            start_offset: i * 10,
            end_offset: i * 10 + 10,
            hash: format!("h{i}"),
            status: ChunkStatus::Pending,
        };
        store.insert_chunks(&[mk(1), mk(0), mk(2)]).await.unwrap();

        store
            .set_chunk_status(&["c0".to_string(), "c1".to_string()], ChunkStatus::Indexed)
            .await
            .unwrap();

        let chunks = store.get_chunks("d1").await.unwrap();
        assert_eq!(chunks.len(), 3);
        assert_eq!(chunks[0].chunk_index, 0);
        assert_eq!(chunks[0].status, ChunkStatus::Indexed);
        assert_eq!(chunks[2].status, ChunkStatus::Pending);
    }

    #[tokio::test]
    async fn test_turn_append_list_roundtrip() {
        let store = SqliteTurnStore::new(test_pool().await);
        store
            .append_turn("s1", &Turn::user("hello"))
            .await
            .unwrap();
        store
            .append_turn(
                "s1",
                &Turn::assistant("hi there", vec!["c1".to_string()]),
            )
            .await
            .unwrap();

        let turns = store.list_turns("s1", None).await.unwrap();
        assert_eq!(turns.len(), 2);
        assert_eq!(turns[0].role, Role::User);
        assert_eq!(turns[0].text, "hello");
        assert_eq!(turns[1].role, Role::Assistant);
        assert_eq!(turns[1].cited_chunk_ids, vec!["c1".to_string()]);
    }

    #[tokio::test]
    async fn test_remove_oldest_and_clear() {
        let store = SqliteTurnStore::new(test_pool().await);
        for i in 0..6 {
            store
                .append_turn("s1", &Turn::user(format!("q{i}")))
                .await
                .unwrap();
        }
        store.remove_oldest("s1", 2).await.unwrap();
        let turns = store.list_turns("s1", None).await.unwrap();
        assert_eq!(turns.len(), 4);
        assert_eq!(turns[0].text, "q2");

        store.clear_session("s1").await.unwrap();
        assert_eq!(store.count_turns("s1").await.unwrap(), 0);
        store.clear_session("s1").await.unwrap();
    }
}
