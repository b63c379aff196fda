//! # docqa
//!
//! A document question-answering backend: ingest documents into an
//! embedding index, then answer questions against them with session
//! memory and citations.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────┐   ┌───────────────┐   ┌───────────────┐
//! │ Uploads  │──▶│   Pipeline     │──▶│ SQLite + Vec   │
//! │ txt / md │   │ Chunk+Embed   │   │ Index backend │
//! └──────────┘   └───────┬───────┘   └──────┬────────┘
//!                        │                  │
//!                   ┌────▼─────┐      ┌─────▼─────┐
//!                   │ Sessions │◀────▶│ Retrieval │
//!                   │ (turns)  │      │ + Answer  │
//!                   └──────────┘      └───────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```bash
//! docqa init                        # create database
//! docqa ingest ./notes.md           # chunk, embed, index
//! docqa ask "what are the notes about?" --session alice
//! docqa chunks <document-id>        # inspect stored chunks
//! docqa delete <document-id>        # remove from retrieval
//! docqa clear-session alice         # forget the conversation
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`models`] | Core data types |
//! | [`extract`] | Upload-to-text extraction seam |
//! | [`chunk`] | Overlapping-window text chunking |
//! | [`embedding`] | Embedding provider abstraction |
//! | [`index`] | Vector index backends (memory, sqlite, qdrant) |
//! | [`retrieve`] | Ranked, filtered relevance retrieval |
//! | [`context`] | Prompt context assembly under a budget |
//! | [`memory`] | Per-session conversation history |
//! | [`generate`] | Answer generation and extraction fallback |
//! | [`pipeline`] | End-to-end ingestion and answering |
//! | [`store`] | Document, chunk, and turn persistence |
//! | [`db`] | Database connection and migrations |

pub mod chunk;
pub mod config;
pub mod context;
pub mod db;
pub mod embedding;
pub mod error;
pub mod extract;
pub mod generate;
pub mod index;
pub mod memory;
pub mod models;
pub mod pipeline;
pub mod retrieve;
pub mod store;
