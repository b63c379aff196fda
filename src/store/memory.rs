//! In-memory store implementations for tests and development.
//!
//! `HashMap`s and `Vec`s behind `std::sync::RwLock`; every future is
//! immediately ready.

use std::collections::HashMap;
use std::sync::RwLock;

use anyhow::anyhow;
use async_trait::async_trait;

use crate::error::{PipelineError, Result};
use crate::models::{ChunkRecord, ChunkStatus, Document, DocumentStatus, Turn};

use super::{DocumentStore, TurnStore};

#[derive(Default)]
pub struct MemoryDocumentStore {
    docs: RwLock<HashMap<String, Document>>,
    chunks: RwLock<Vec<ChunkRecord>>,
}

impl MemoryDocumentStore {
    pub fn new() -> Self {
        Self::default()
    }
}

fn poisoned() -> PipelineError {
    PipelineError::Store(anyhow!("store lock poisoned"))
}

#[async_trait]
impl DocumentStore for MemoryDocumentStore {
    async fn insert_document(&self, doc: &Document) -> Result<()> {
        let mut docs = self.docs.write().map_err(|_| poisoned())?;
        docs.insert(doc.id.clone(), doc.clone());
        Ok(())
    }

    async fn get_document(&self, id: &str) -> Result<Option<Document>> {
        let docs = self.docs.read().map_err(|_| poisoned())?;
        Ok(docs.get(id).cloned())
    }

    async fn set_document_status(&self, id: &str, status: DocumentStatus) -> Result<()> {
        let mut docs = self.docs.write().map_err(|_| poisoned())?;
        match docs.get_mut(id) {
            Some(doc) => {
                doc.status = status;
                Ok(())
            }
            None => Err(PipelineError::NotFound(format!("document {id}"))),
        }
    }

    async fn list_documents(&self) -> Result<Vec<Document>> {
        let docs = self.docs.read().map_err(|_| poisoned())?;
        let mut all: Vec<Document> = docs.values().cloned().collect();
        all.sort_by(|a, b| b.uploaded_at.cmp(&a.uploaded_at).then(a.id.cmp(&b.id)));
        Ok(all)
    }

    async fn insert_chunks(&self, chunks: &[ChunkRecord]) -> Result<()> {
        let mut stored = self.chunks.write().map_err(|_| poisoned())?;
        stored.extend(chunks.iter().cloned());
        Ok(())
    }

    async fn get_chunks(&self, document_id: &str) -> Result<Vec<ChunkRecord>> {
        let stored = self.chunks.read().map_err(|_| poisoned())?;
        let mut chunks: Vec<ChunkRecord> = stored
            .iter()
            .filter(|c| c.document_id == document_id)
            .cloned()
            .collect();
        chunks.sort_by_key(|c| c.chunk_index);
        Ok(chunks)
    }

    async fn set_chunk_status(&self, chunk_ids: &[String], status: ChunkStatus) -> Result<()> {
        let mut stored = self.chunks.write().map_err(|_| poisoned())?;
        for chunk in stored.iter_mut() {
            if chunk_ids.contains(&chunk.id) {
                chunk.status = status;
            }
        }
        Ok(())
    }
}

#[derive(Default)]
pub struct MemoryTurnStore {
    sessions: RwLock<HashMap<String, Vec<Turn>>>,
}

impl MemoryTurnStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl TurnStore for MemoryTurnStore {
    async fn append_turn(&self, session_id: &str, turn: &Turn) -> Result<()> {
        let mut sessions = self.sessions.write().map_err(|_| poisoned())?;
        sessions
            .entry(session_id.to_string())
            .or_default()
            .push(turn.clone());
        Ok(())
    }

    async fn list_turns(&self, session_id: &str, limit: Option<usize>) -> Result<Vec<Turn>> {
        let sessions = self.sessions.read().map_err(|_| poisoned())?;
        let turns = sessions.get(session_id).cloned().unwrap_or_default();
        match limit {
            Some(n) if n < turns.len() => Ok(turns[turns.len() - n..].to_vec()),
            _ => Ok(turns),
        }
    }

    async fn count_turns(&self, session_id: &str) -> Result<usize> {
        let sessions = self.sessions.read().map_err(|_| poisoned())?;
        Ok(sessions.get(session_id).map(|t| t.len()).unwrap_or(0))
    }

    async fn remove_oldest(&self, session_id: &str, n: usize) -> Result<()> {
        let mut sessions = self.sessions.write().map_err(|_| poisoned())?;
        if let Some(turns) = sessions.get_mut(session_id) {
            turns.drain(..n.min(turns.len()));
        }
        Ok(())
    }

    async fn clear_session(&self, session_id: &str) -> Result<()> {
        let mut sessions = self.sessions.write().map_err(|_| poisoned())?;
        sessions.remove(session_id);
        Ok(())
    }
}
