//! End-to-end pipeline tests over in-memory backends.
//!
//! Embedding and chat are faked deterministically; everything else is
//! the real ingestion and answering flow.

use std::sync::Arc;

use async_trait::async_trait;

use docqa::config::{
    ChunkingConfig, Config, ContextConfig, DbConfig, EmbeddingConfig, GenerationConfig,
    IndexConfig, MemoryConfig, RetrievalConfig,
};
use docqa::embedding::Embedder;
use docqa::error::{PipelineError, Result};
use docqa::extract::PlainTextExtractor;
use docqa::generate::{ChatModel, NO_CONTEXT_ANSWER};
use docqa::index::memory::MemoryIndex;
use docqa::memory::ConversationManager;
use docqa::models::{ChunkStatus, DocumentStatus, NewDocument, Role};
use docqa::pipeline::Pipeline;
use docqa::store::memory::{MemoryDocumentStore, MemoryTurnStore};

/// Deterministic embedder: maps keyword families onto fixed unit vectors.
struct FakeEmbedder;

fn vector_for(text: &str) -> Vec<f32> {
    let lower = text.to_lowercase();
    if lower.contains("alpha") {
        vec![1.0, 0.0, 0.0]
    } else if lower.contains("beta") {
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

/// Embedder that always fails, as a provider outage would.
struct FailingEmbedder;

#[async_trait]
impl Embedder for FailingEmbedder {
    async fn embed(&self, _texts: &[String]) -> Result<Vec<Vec<f32>>> {
        Err(PipelineError::Embedding("provider down".to_string()))
    }
    fn model_name(&self) -> &str {
        "failing"
    }
    fn dims(&self) -> usize {
        3
    }
}

struct FakeChat {
    reply: String,
}

#[async_trait]
impl ChatModel for FakeChat {
    async fn complete(&self, _prompt: &str) -> Result<String> {
        Ok(self.reply.clone())
    }
}

struct FailingChat;

#[async_trait]
impl ChatModel for FailingChat {
    async fn complete(&self, _prompt: &str) -> Result<String> {
        Err(PipelineError::Generation("model down".to_string()))
    }
}

fn test_config() -> Config {
    Config {
        db: DbConfig {
            path: "/tmp/docqa-test-unused.sqlite".into(),
        },
        chunking: ChunkingConfig {
            max_chunk_size: 200,
            overlap_size: 20,
        },
        retrieval: RetrievalConfig {
            top_k: 5,
            overfetch_factor: 4,
            score_floor: 0.25,
            max_chunks_per_doc: 3,
        },
        context: ContextConfig { budget_chars: 4000 },
        memory: MemoryConfig {
            max_turns: 20,
            history_turns: 10,
        },
        embedding: EmbeddingConfig::default(),
        generation: GenerationConfig::default(),
        index: IndexConfig::default(),
    }
}

struct Harness {
    pipeline: Pipeline,
}

fn harness(embedder: Arc<dyn Embedder>, chat: Option<Arc<dyn ChatModel>>) -> Harness {
    let docs = Arc::new(MemoryDocumentStore::new());
    let turns = Arc::new(MemoryTurnStore::new());
    let config = test_config();
    let conversations = ConversationManager::new(turns, config.memory.max_turns);
    let pipeline = Pipeline::new(
        docs,
        Arc::new(MemoryIndex::new()),
        embedder,
        chat,
        Arc::new(PlainTextExtractor),
        conversations,
        config,
    );
    Harness { pipeline }
}

fn upload(text: &str) -> NewDocument {
    NewDocument {
        filename: "notes.txt".to_string(),
        owner: Some("tester".to_string()),
        content_type: "text/plain".to_string(),
        bytes: text.as_bytes().to_vec(),
    }
}

const ALPHA_DOC: &str = "The alpha subsystem handles ingestion. It validates uploads first.\n\n\
    The beta subsystem is unrelated and deals with billing exports instead.";

#[tokio::test]
async fn test_ingest_marks_document_and_chunks_indexed() {
    let h = harness(Arc::new(FakeEmbedder), None);
    let doc = h.pipeline.ingest(upload(ALPHA_DOC)).await.unwrap();

    assert_eq!(doc.status, DocumentStatus::Indexed);
    let chunks = h.pipeline.get_chunks(&doc.id).await.unwrap();
    assert!(!chunks.is_empty());
    for chunk in &chunks {
        assert_eq!(chunk.status, ChunkStatus::Indexed);
        assert!(!chunk.hash.is_empty());
    }
}

#[tokio::test]
async fn test_ingest_then_answer_cites_retrieved_chunks() {
    let h = harness(Arc::new(FakeEmbedder), None);
    h.pipeline.ingest(upload(ALPHA_DOC)).await.unwrap();

    let answer = h
        .pipeline
        .answer("s1", "what does the alpha subsystem do?")
        .await
        .unwrap();

    assert!(!answer.citations.is_empty());
    assert!(answer.text.to_lowercase().contains("alpha"));

    let history = h.pipeline.session_history("s1").await.unwrap();
    assert_eq!(history.len(), 2);
    assert_eq!(history[0].role, Role::User);
    assert_eq!(history[1].role, Role::Assistant);
    assert_eq!(history[1].cited_chunk_ids, answer.citations);
}

#[tokio::test]
async fn test_answer_with_chat_model_uses_model_reply() {
    let chat = Arc::new(FakeChat {
        reply: "Alpha validates uploads before ingestion.".to_string(),
    });
    let h = harness(Arc::new(FakeEmbedder), Some(chat));
    h.pipeline.ingest(upload(ALPHA_DOC)).await.unwrap();

    let answer = h.pipeline.answer("s1", "tell me about alpha").await.unwrap();
    assert_eq!(answer.text, "Alpha validates uploads before ingestion.");
    assert!(!answer.citations.is_empty());
}

#[tokio::test]
async fn test_answer_without_context_still_records_both_turns() {
    let h = harness(Arc::new(FakeEmbedder), None);
    // Nothing ingested; the gamma-direction query matches nothing.
    let answer = h.pipeline.answer("s1", "anything?").await.unwrap();
    assert_eq!(answer.text, NO_CONTEXT_ANSWER);
    assert!(answer.citations.is_empty());

    let history = h.pipeline.session_history("s1").await.unwrap();
    assert_eq!(history.len(), 2);
}

#[tokio::test]
async fn test_generation_failure_preserves_user_turn() {
    let h = harness(Arc::new(FakeEmbedder), Some(Arc::new(FailingChat)));
    h.pipeline.ingest(upload(ALPHA_DOC)).await.unwrap();

    let err = h.pipeline.answer("s1", "about alpha?").await.unwrap_err();
    assert!(matches!(err, PipelineError::Generation(_)));

    let history = h.pipeline.session_history("s1").await.unwrap();
    assert_eq!(history.len(), 1);
    assert_eq!(history[0].role, Role::User);
    assert_eq!(history[0].text, "about alpha?");
}

#[tokio::test]
async fn test_failed_embedding_marks_document_failed() {
    let h = harness(Arc::new(FailingEmbedder), None);
    let err = h.pipeline.ingest(upload(ALPHA_DOC)).await.unwrap_err();
    assert!(matches!(err, PipelineError::Embedding(_)));

    // The document record exists, marked failed, with its chunks still
    // pending (never indexed).
    let docs = h.pipeline.list_documents().await.unwrap();
    assert_eq!(docs.len(), 1);
    assert_eq!(docs[0].status, DocumentStatus::Failed);

    let chunks = h.pipeline.get_chunks(&docs[0].id).await.unwrap();
    assert!(!chunks.is_empty());
    for chunk in &chunks {
        assert_eq!(chunk.status, ChunkStatus::Pending);
    }
}

#[tokio::test]
async fn test_delete_removes_document_from_retrieval() {
    let h = harness(Arc::new(FakeEmbedder), None);
    let doc = h.pipeline.ingest(upload(ALPHA_DOC)).await.unwrap();

    let before = h.pipeline.answer("s1", "alpha subsystem?").await.unwrap();
    assert!(!before.citations.is_empty());

    h.pipeline.delete_document(&doc.id).await.unwrap();
    let stored = h.pipeline.get_document(&doc.id).await.unwrap().unwrap();
    assert_eq!(stored.status, DocumentStatus::Deleted);

    let after = h.pipeline.answer("s2", "alpha subsystem?").await.unwrap();
    assert!(after.citations.is_empty());

    // Deleting again is a no-op, not an error.
    h.pipeline.delete_document(&doc.id).await.unwrap();
}

#[tokio::test]
async fn test_unknown_document_operations_are_not_found() {
    let h = harness(Arc::new(FakeEmbedder), None);
    let err = h.pipeline.delete_document("missing").await.unwrap_err();
    assert!(matches!(err, PipelineError::NotFound(_)));
    let err = h.pipeline.get_chunks("missing").await.unwrap_err();
    assert!(matches!(err, PipelineError::NotFound(_)));
}

#[tokio::test]
async fn test_clear_session_forgets_history() {
    let h = harness(Arc::new(FakeEmbedder), None);
    h.pipeline.ingest(upload(ALPHA_DOC)).await.unwrap();
    h.pipeline.answer("s1", "alpha?").await.unwrap();
    assert!(!h.pipeline.session_history("s1").await.unwrap().is_empty());

    h.pipeline.clear_session("s1").await.unwrap();
    assert!(h.pipeline.session_history("s1").await.unwrap().is_empty());

    // Clearing an unknown session is fine.
    h.pipeline.clear_session("never-seen").await.unwrap();
}

#[tokio::test]
async fn test_follow_up_question_carries_history_to_the_model() {
    struct PromptCapture {
        prompts: std::sync::Mutex<Vec<String>>,
    }

    #[async_trait]
    impl ChatModel for PromptCapture {
        async fn complete(&self, prompt: &str) -> Result<String> {
            self.prompts.lock().unwrap().push(prompt.to_string());
            Ok("Scripted reply.".to_string())
        }
    }

    let capture = Arc::new(PromptCapture {
        prompts: std::sync::Mutex::new(Vec::new()),
    });
    let h = harness(Arc::new(FakeEmbedder), Some(capture.clone()));
    h.pipeline.ingest(upload(ALPHA_DOC)).await.unwrap();

    h.pipeline.answer("s1", "first alpha question").await.unwrap();
    h.pipeline.answer("s1", "and a follow-up?").await.unwrap();

    let prompts = capture.prompts.lock().unwrap();
    assert_eq!(prompts.len(), 2);
    assert!(!prompts[0].contains("Previous conversation:"));
    assert!(prompts[1].contains("Previous conversation:"));
    assert!(prompts[1].contains("first alpha question"));
}
