//! Persistent record stores for documents, chunks, and session turns.
//!
//! The pipeline never owns a schema beyond these traits; backends map the
//! operations onto whatever storage they have. Two implementations ship:
//! [`memory`] (tests and development) and [`sqlite`] (the CLI's default,
//! over `sqlx`).
//!
//! Implementations must be `Send + Sync` to work with async runtimes.

pub mod memory;
pub mod sqlite;

use async_trait::async_trait;

use crate::error::Result;
use crate::models::{ChunkRecord, ChunkStatus, Document, DocumentStatus, Turn};

/// Storage for document and chunk records.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    async fn insert_document(&self, doc: &Document) -> Result<()>;

    /// `None` for an unknown id; soft-deleted documents are still returned
    /// (their status says so).
    async fn get_document(&self, id: &str) -> Result<Option<Document>>;

    async fn set_document_status(&self, id: &str, status: DocumentStatus) -> Result<()>;

    /// All documents, most recently uploaded first.
    async fn list_documents(&self) -> Result<Vec<Document>>;

    async fn insert_chunks(&self, chunks: &[ChunkRecord]) -> Result<()>;

    /// All chunks of a document, ordered by chunk index.
    async fn get_chunks(&self, document_id: &str) -> Result<Vec<ChunkRecord>>;

    async fn set_chunk_status(&self, chunk_ids: &[String], status: ChunkStatus) -> Result<()>;
}

/// Append-only turn log per session, with FIFO trimming.
///
/// Sessions exist implicitly: appending to an unseen session id creates
/// it, and clearing an unknown session is a no-op.
#[async_trait]
pub trait TurnStore: Send + Sync {
    async fn append_turn(&self, session_id: &str, turn: &Turn) -> Result<()>;

    /// Most recent `limit` turns (all when `None`), oldest first.
    async fn list_turns(&self, session_id: &str, limit: Option<usize>) -> Result<Vec<Turn>>;

    async fn count_turns(&self, session_id: &str) -> Result<usize>;

    /// Drop the `n` oldest turns of a session.
    async fn remove_oldest(&self, session_id: &str, n: usize) -> Result<()>;

    /// Remove all turns for the session. Idempotent.
    async fn clear_session(&self, session_id: &str) -> Result<()>;
}
