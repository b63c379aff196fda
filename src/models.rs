//! Core data models used throughout the pipeline.
//!
//! These types represent the documents, chunks, conversation turns, and
//! retrieval results that flow through ingestion and query answering.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Lifecycle status of a document as it moves through ingestion.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DocumentStatus {
    Pending,
    Chunked,
    Indexed,
    Failed,
    Deleted,
}

impl DocumentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            DocumentStatus::Pending => "pending",
            DocumentStatus::Chunked => "chunked",
            DocumentStatus::Indexed => "indexed",
            DocumentStatus::Failed => "failed",
            DocumentStatus::Deleted => "deleted",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(DocumentStatus::Pending),
            "chunked" => Some(DocumentStatus::Chunked),
            "indexed" => Some(DocumentStatus::Indexed),
            "failed" => Some(DocumentStatus::Failed),
            "deleted" => Some(DocumentStatus::Deleted),
            _ => None,
        }
    }
}

/// Index status of a single chunk. A chunk becomes `indexed` only after
/// its vector upsert succeeded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChunkStatus {
    Pending,
    Indexed,
    Failed,
}

impl ChunkStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ChunkStatus::Pending => "pending",
            ChunkStatus::Indexed => "indexed",
            ChunkStatus::Failed => "failed",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(ChunkStatus::Pending),
            "indexed" => Some(ChunkStatus::Indexed),
            "failed" => Some(ChunkStatus::Failed),
            _ => None,
        }
    }
}

/// An uploaded document record.
#[derive(Debug, Clone, Serialize)]
pub struct Document {
    pub id: String,
    pub filename: String,
    pub owner: Option<String>,
    pub uploaded_at: DateTime<Utc>,
    pub status: DocumentStatus,
}

/// Raw upload handed to the ingestion flow before extraction.
#[derive(Debug, Clone)]
pub struct NewDocument {
    pub filename: String,
    pub owner: Option<String>,
    pub content_type: String,
    pub bytes: Vec<u8>,
}

/// A persisted chunk of a document's extracted text.
///
/// `start_offset`/`end_offset` are character positions into the extracted
/// text. Start offsets are strictly increasing per document; consecutive
/// chunks overlap by at most the configured overlap size.
#[derive(Debug, Clone, Serialize)]
pub struct ChunkRecord {
    pub id: String,
    pub document_id: String,
    pub chunk_index: i64,
    pub text: String,
    pub start_offset: i64,
    pub end_offset: i64,
    pub hash: String,
    pub status: ChunkStatus,
}

/// Speaker role within a conversation session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Assistant => "assistant",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "user" => Some(Role::User),
            "assistant" => Some(Role::Assistant),
            _ => None,
        }
    }
}

/// One message within a session.
///
/// Assistant turns carry the chunk ids that were included in the prompt
/// context, for citation and audit.
#[derive(Debug, Clone, Serialize)]
pub struct Turn {
    pub role: Role,
    pub text: String,
    pub created_at: DateTime<Utc>,
    pub cited_chunk_ids: Vec<String>,
}

impl Turn {
    pub fn user(text: impl Into<String>) -> Self {
        Turn {
            role: Role::User,
            text: text.into(),
            created_at: Utc::now(),
            cited_chunk_ids: Vec::new(),
        }
    }

    pub fn assistant(text: impl Into<String>, cited_chunk_ids: Vec<String>) -> Self {
        Turn {
            role: Role::Assistant,
            text: text.into(),
            created_at: Utc::now(),
            cited_chunk_ids,
        }
    }
}

/// A single ranked hit from retrieval.
#[derive(Debug, Clone, Serialize)]
pub struct ScoredChunk {
    pub chunk_id: String,
    pub document_id: String,
    pub score: f32,
    pub text: String,
}

/// Ranked retrieval output: scores non-increasing, chunk ids unique.
///
/// An empty result is a valid outcome (nothing matched above the score
/// floor), not an error.
#[derive(Debug, Clone, Default, Serialize)]
pub struct RetrievalResult {
    pub hits: Vec<ScoredChunk>,
}

impl RetrievalResult {
    pub fn is_empty(&self) -> bool {
        self.hits.is_empty()
    }
}

/// Final answer returned to the caller, with the chunk ids whose text
/// informed it.
#[derive(Debug, Clone, Serialize)]
pub struct Answer {
    pub text: String,
    pub citations: Vec<String>,
}
