//! The ingestion and query-answering pipeline.
//!
//! [`Pipeline`] wires the stores, the vector index, the embedder, and the
//! optional chat model together. Construction is plain dependency
//! injection; the CLI assembles the production graph and tests assemble
//! in-memory ones.
//!
//! # Ingestion flow
//!
//! upload → document record (`pending`) → extract → chunk → chunk records
//! (`chunked`) → embed and upsert batch-wise → document `indexed`.
//!
//! The document flips to `indexed` only after every batch upserted.
//! A mid-flight failure marks the document `failed` and leaves the
//! batches already committed in place; re-ingesting is the recovery path.
//!
//! # Answer flow
//!
//! history → retrieve → assemble context → generate (or extract) →
//! persist the user/assistant pair atomically. If generation fails, the
//! user turn is still recorded before the error surfaces.

use std::sync::Arc;

use chrono::Utc;
use sha2::{Digest, Sha256};
use tracing::{info, warn};
use uuid::Uuid;

use crate::config::Config;
use crate::context;
use crate::embedding::Embedder;
use crate::error::{PipelineError, Result};
use crate::extract::TextExtractor;
use crate::generate::{self, extractive_answer, ChatModel};
use crate::index::{IndexEntry, SearchFilter, VectorIndex};
use crate::memory::{format_history, ConversationManager};
use crate::models::{
    Answer, ChunkRecord, ChunkStatus, Document, DocumentStatus, NewDocument, Turn,
};
use crate::retrieve::retrieve;
use crate::store::DocumentStore;

pub struct Pipeline {
    docs: Arc<dyn DocumentStore>,
    index: Arc<dyn VectorIndex>,
    embedder: Arc<dyn Embedder>,
    chat: Option<Arc<dyn ChatModel>>,
    extractor: Arc<dyn TextExtractor>,
    conversations: ConversationManager,
    config: Config,
}

impl Pipeline {
    pub fn new(
        docs: Arc<dyn DocumentStore>,
        index: Arc<dyn VectorIndex>,
        embedder: Arc<dyn Embedder>,
        chat: Option<Arc<dyn ChatModel>>,
        extractor: Arc<dyn TextExtractor>,
        conversations: ConversationManager,
        config: Config,
    ) -> Self {
        Self {
            docs,
            index,
            embedder,
            chat,
            extractor,
            conversations,
            config,
        }
    }

    /// Ingest an upload end to end. Returns the document record in its
    /// final state (`indexed` on success).
    pub async fn ingest(&self, upload: NewDocument) -> Result<Document> {
        let mut doc = Document {
            id: Uuid::new_v4().to_string(),
            filename: upload.filename.clone(),
            owner: upload.owner.clone(),
            uploaded_at: Utc::now(),
            status: DocumentStatus::Pending,
        };
        self.docs.insert_document(&doc).await?;
        info!(document_id = %doc.id, filename = %doc.filename, "ingestion started");

        match self.ingest_inner(&doc, &upload).await {
            Ok(chunk_count) => {
                self.docs
                    .set_document_status(&doc.id, DocumentStatus::Indexed)
                    .await?;
                doc.status = DocumentStatus::Indexed;
                info!(document_id = %doc.id, chunks = chunk_count, "ingestion complete");
                Ok(doc)
            }
            Err(e) => {
                warn!(document_id = %doc.id, error = %e, "ingestion failed");
                self.mark_failed(&doc.id).await;
                Err(e)
            }
        }
    }

    async fn ingest_inner(&self, doc: &Document, upload: &NewDocument) -> Result<usize> {
        let text = self
            .extractor
            .extract(&upload.bytes, &upload.content_type)?;

        let spans = crate::chunk::chunk_text(
            &text,
            self.config.chunking.max_chunk_size,
            self.config.chunking.overlap_size,
        )?;

        let records: Vec<ChunkRecord> = spans
            .iter()
            .map(|span| ChunkRecord {
                id: Uuid::new_v4().to_string(),
                document_id: doc.id.clone(),
                chunk_index: span.index,
                text: span.text.clone(),
                start_offset: span.start as i64,
                end_offset: span.end as i64,
                hash: format!("{:x}", Sha256::digest(span.text.as_bytes())),
                status: ChunkStatus::Pending,
            })
            .collect();

        self.docs.insert_chunks(&records).await?;
        self.docs
            .set_document_status(&doc.id, DocumentStatus::Chunked)
            .await?;

        // Embed and upsert batch by batch; chunks become indexed only
        // after their batch's upsert succeeded, so a mid-flight failure
        // leaves committed batches queryable and uncommitted ones pending.
        for batch in records.chunks(self.config.embedding.batch_size.max(1)) {
            let texts: Vec<String> = batch.iter().map(|c| c.text.clone()).collect();
            let vectors = self.embedder.embed(&texts).await?;

            let entries: Vec<IndexEntry> = batch
                .iter()
                .zip(vectors)
                .map(|(chunk, vector)| IndexEntry {
                    chunk_id: chunk.id.clone(),
                    document_id: chunk.document_id.clone(),
                    chunk_index: chunk.chunk_index,
                    text: chunk.text.clone(),
                    vector,
                })
                .collect();
            self.index.upsert(entries).await?;

            let ids: Vec<String> = batch.iter().map(|c| c.id.clone()).collect();
            self.docs.set_chunk_status(&ids, ChunkStatus::Indexed).await?;
        }

        Ok(records.len())
    }

    async fn mark_failed(&self, document_id: &str) {
        if let Err(e) = self
            .docs
            .set_document_status(document_id, DocumentStatus::Failed)
            .await
        {
            warn!(document_id, error = %e, "could not mark document failed");
        }
    }

    /// Answer `question` within a session, persisting both turns.
    pub async fn answer(&self, session_id: &str, question: &str) -> Result<Answer> {
        let history = self
            .conversations
            .history(session_id, self.config.memory.history_turns)
            .await?;

        let retrieval = retrieve(
            self.embedder.as_ref(),
            self.index.as_ref(),
            question,
            &self.config.retrieval,
            &SearchFilter::default(),
        )
        .await?;

        let history_len = format_history(&history).chars().count();
        let assembled = context::assemble(&retrieval, history_len, self.config.context.budget_chars);
        info!(
            session_id,
            hits = retrieval.hits.len(),
            context_chunks = assembled.included_chunk_ids.len(),
            "context assembled"
        );

        let text = match &self.chat {
            Some(model) => {
                match generate::generate(model.as_ref(), question, &assembled, &history).await {
                    Ok(text) => text,
                    Err(e) => {
                        // The question was received even though the answer
                        // never materialized; record it before surfacing.
                        self.conversations
                            .append(session_id, &Turn::user(question))
                            .await?;
                        return Err(e);
                    }
                }
            }
            None => {
                let included_texts: Vec<String> = retrieval
                    .hits
                    .iter()
                    .filter(|h| assembled.included_chunk_ids.contains(&h.chunk_id))
                    .map(|h| h.text.clone())
                    .collect();
                extractive_answer(question, &included_texts)
            }
        };

        let citations = assembled.included_chunk_ids.clone();
        self.conversations
            .append_exchange(
                session_id,
                &Turn::user(question),
                &Turn::assistant(text.clone(), citations.clone()),
            )
            .await?;

        Ok(Answer { text, citations })
    }

    /// Remove a document from retrieval and mark it deleted.
    ///
    /// The index delete runs first: if the index is unreachable the
    /// document's status is untouched and the chunks stay queryable,
    /// so a retry later leaves no orphaned vectors.
    pub async fn delete_document(&self, document_id: &str) -> Result<()> {
        let doc = self
            .docs
            .get_document(document_id)
            .await?
            .ok_or_else(|| PipelineError::NotFound(format!("document {document_id}")))?;

        if doc.status == DocumentStatus::Deleted {
            return Ok(());
        }

        let chunk_ids: Vec<String> = self
            .docs
            .get_chunks(document_id)
            .await?
            .into_iter()
            .map(|c| c.id)
            .collect();

        self.index.delete(&chunk_ids).await?;
        self.docs
            .set_document_status(document_id, DocumentStatus::Deleted)
            .await?;
        info!(document_id, chunks = chunk_ids.len(), "document deleted");
        Ok(())
    }

    /// All chunk records of a document, ordered by chunk index.
    pub async fn get_chunks(&self, document_id: &str) -> Result<Vec<ChunkRecord>> {
        self.docs
            .get_document(document_id)
            .await?
            .ok_or_else(|| PipelineError::NotFound(format!("document {document_id}")))?;
        self.docs.get_chunks(document_id).await
    }

    pub async fn get_document(&self, document_id: &str) -> Result<Option<Document>> {
        self.docs.get_document(document_id).await
    }

    /// All documents, most recently uploaded first.
    pub async fn list_documents(&self) -> Result<Vec<Document>> {
        self.docs.list_documents().await
    }

    /// Drop all conversation history for a session. Idempotent.
    pub async fn clear_session(&self, session_id: &str) -> Result<()> {
        self.conversations.clear(session_id).await?;
        info!(session_id, "session cleared");
        Ok(())
    }

    /// Most recent turns of a session, oldest first.
    pub async fn session_history(&self, session_id: &str) -> Result<Vec<Turn>> {
        self.conversations
            .history(session_id, self.config.memory.max_turns)
            .await
    }
}
