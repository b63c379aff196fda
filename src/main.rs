//! # docqa CLI
//!
//! The `docqa` binary drives the document question-answering pipeline:
//! database initialization, ingestion, asking questions with session
//! memory, chunk inspection, deletion, and session clearing.
//!
//! ## Usage
//!
//! ```bash
//! docqa --config ./config/docqa.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `docqa init` | Create the SQLite database and run schema migrations |
//! | `docqa ingest <path>` | Chunk, embed, and index a document |
//! | `docqa ask "<question>"` | Answer a question against the index |
//! | `docqa docs` | List documents and their ingestion status |
//! | `docqa chunks <id>` | List a document's stored chunks |
//! | `docqa delete <id>` | Remove a document from retrieval |
//! | `docqa clear-session <id>` | Forget a conversation |

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Context as _;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use docqa::config::{self, Config};
use docqa::db;
use docqa::embedding::{DisabledEmbedder, Embedder, OpenAiEmbedder};
use docqa::extract::PlainTextExtractor;
use docqa::generate::{ChatModel, OpenAiChat};
use docqa::index::{memory::MemoryIndex, qdrant::QdrantIndex, sqlite::SqliteIndex, VectorIndex};
use docqa::memory::ConversationManager;
use docqa::models::NewDocument;
use docqa::pipeline::Pipeline;
use docqa::store::sqlite::{SqliteDocumentStore, SqliteTurnStore};

/// docqa — a session-aware question answering backend for documents.
///
/// All commands accept a `--config` flag pointing to a TOML configuration
/// file. See `config/docqa.example.toml` for a full example.
#[derive(Parser)]
#[command(
    name = "docqa",
    about = "docqa — session-aware retrieval-augmented question answering for documents",
    version,
    long_about = "docqa ingests documents into an embedding index and answers questions \
    against them with conversation memory and chunk citations. Storage is SQLite; the \
    vector index can live in the same database or in a remote Qdrant collection."
)]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(long, global = true, default_value = "./config/docqa.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

/// Top-level CLI commands.
#[derive(Subcommand)]
enum Commands {
    /// Initialize the database schema.
    ///
    /// Creates the SQLite database file and all required tables
    /// (documents, chunks, turns, index_entries). Idempotent.
    Init,

    /// Ingest a document: extract, chunk, embed, and index it.
    ///
    /// Prints the new document id on success. Markdown and plain text
    /// are supported; the content type is inferred from the extension.
    Ingest {
        /// Path to the file to ingest.
        path: PathBuf,

        /// Owner recorded on the document, if any.
        #[arg(long)]
        owner: Option<String>,
    },

    /// Ask a question against the indexed documents.
    ///
    /// Retrieves relevant chunks, assembles context, generates an
    /// answer, and records both turns in the session.
    Ask {
        /// The question to answer.
        question: String,

        /// Session id carrying the conversation history.
        #[arg(long, default_value = "default")]
        session: String,
    },

    /// List all documents with their ingestion status.
    Docs,

    /// List a document's stored chunks in order.
    Chunks {
        /// Document UUID.
        id: String,
    },

    /// Remove a document from retrieval and mark it deleted.
    Delete {
        /// Document UUID.
        id: String,
    },

    /// Forget all conversation history for a session.
    ClearSession {
        /// Session id to clear.
        id: String,
    },
}

fn build_embedder(cfg: &Config) -> anyhow::Result<Arc<dyn Embedder>> {
    match cfg.embedding.provider.as_str() {
        "openai" => Ok(Arc::new(OpenAiEmbedder::new(&cfg.embedding)?)),
        _ => Ok(Arc::new(DisabledEmbedder)),
    }
}

fn build_chat(cfg: &Config) -> anyhow::Result<Option<Arc<dyn ChatModel>>> {
    match cfg.generation.provider.as_str() {
        "openai" => Ok(Some(Arc::new(OpenAiChat::new(&cfg.generation)?))),
        _ => Ok(None),
    }
}

fn build_index(cfg: &Config, pool: &sqlx::SqlitePool) -> anyhow::Result<Arc<dyn VectorIndex>> {
    match cfg.index.backend.as_str() {
        "memory" => Ok(Arc::new(MemoryIndex::new())),
        "qdrant" => {
            let url = cfg
                .index
                .url
                .as_deref()
                .context("index.url required for qdrant backend")?;
            let api_key = match &cfg.index.api_key_env {
                Some(var) => Some(
                    std::env::var(var)
                        .with_context(|| format!("environment variable {var} not set"))?,
                ),
                None => None,
            };
            Ok(Arc::new(QdrantIndex::new(
                url,
                &cfg.index.collection,
                api_key,
            )?))
        }
        _ => Ok(Arc::new(SqliteIndex::new(pool.clone()))),
    }
}

async fn build_pipeline(cfg: &Config) -> anyhow::Result<Pipeline> {
    let pool = db::connect(&cfg.db.path).await?;
    db::run_migrations(&pool).await?;

    let index = build_index(cfg, &pool)?;
    let embedder = build_embedder(cfg)?;
    let chat = build_chat(cfg)?;
    let docs = Arc::new(SqliteDocumentStore::new(pool.clone()));
    let turns = Arc::new(SqliteTurnStore::new(pool));
    let conversations = ConversationManager::new(turns, cfg.memory.max_turns);

    Ok(Pipeline::new(
        docs,
        index,
        embedder,
        chat,
        Arc::new(PlainTextExtractor),
        conversations,
        cfg.clone(),
    ))
}

fn content_type_for(path: &Path) -> &'static str {
    match path.extension().and_then(|e| e.to_str()) {
        Some("md") | Some("markdown") => "text/markdown",
        _ => "text/plain",
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let cfg = config::load_config(&cli.config)?;

    match cli.command {
        Commands::Init => {
            let pool = db::connect(&cfg.db.path).await?;
            db::run_migrations(&pool).await?;
            println!("Database initialized at {}", cfg.db.path.display());
        }
        Commands::Ingest { path, owner } => {
            let bytes = std::fs::read(&path)
                .with_context(|| format!("failed to read {}", path.display()))?;
            let filename = path
                .file_name()
                .and_then(|n| n.to_str())
                .unwrap_or("upload")
                .to_string();
            let upload = NewDocument {
                filename,
                owner,
                content_type: content_type_for(&path).to_string(),
                bytes,
            };

            let pipeline = build_pipeline(&cfg).await?;
            let doc = pipeline.ingest(upload).await?;
            let chunks = pipeline.get_chunks(&doc.id).await?;
            println!("Ingested {} ({} chunks)", doc.id, chunks.len());
        }
        Commands::Ask { question, session } => {
            let pipeline = build_pipeline(&cfg).await?;
            let answer = pipeline.answer(&session, &question).await?;
            println!("{}", answer.text);
            if !answer.citations.is_empty() {
                println!("\nSources: {}", answer.citations.join(", "));
            }
        }
        Commands::Docs => {
            let pipeline = build_pipeline(&cfg).await?;
            for doc in pipeline.list_documents().await? {
                println!(
                    "{} {} {} ({})",
                    doc.id,
                    doc.status.as_str(),
                    doc.filename,
                    doc.owner.as_deref().unwrap_or("-")
                );
            }
        }
        Commands::Chunks { id } => {
            let pipeline = build_pipeline(&cfg).await?;
            let chunks = pipeline.get_chunks(&id).await?;
            for chunk in chunks {
                let preview: String = chunk.text.chars().take(80).collect();
                println!(
                    "[{}] {} ({}..{}) {} {}",
                    chunk.chunk_index,
                    chunk.id,
                    chunk.start_offset,
                    chunk.end_offset,
                    chunk.status.as_str(),
                    preview.replace('\n', " ")
                );
            }
        }
        Commands::Delete { id } => {
            let pipeline = build_pipeline(&cfg).await?;
            pipeline.delete_document(&id).await?;
            println!("Deleted {id}");
        }
        Commands::ClearSession { id } => {
            let pipeline = build_pipeline(&cfg).await?;
            pipeline.clear_session(&id).await?;
            println!("Cleared session {id}");
        }
    }

    Ok(())
}
