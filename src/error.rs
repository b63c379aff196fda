//! Pipeline error taxonomy.
//!
//! Each variant names the stage that failed, so callers can distinguish
//! a bad upload from a flaky embedding provider from an unreachable
//! index. [`PipelineError::IndexUnavailable`] exists precisely so that
//! connectivity failures never masquerade as empty search results.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum PipelineError {
    /// The chunker rejected its input or parameters.
    #[error("chunking failed: {0}")]
    Chunking(String),

    /// Text extraction rejected the upload.
    #[error("extraction failed: {0}")]
    Extraction(String),

    /// The embedding provider failed after retries.
    #[error("embedding failed: {0}")]
    Embedding(String),

    /// The vector index backend could not be reached or errored.
    /// Distinct from an empty result set, which is a valid outcome.
    #[error("vector index unavailable: {0}")]
    IndexUnavailable(String),

    /// The answer generator failed after retries and sanitization.
    #[error("generation failed: {0}")]
    Generation(String),

    /// A referenced record does not exist.
    #[error("not found: {0}")]
    NotFound(String),

    /// Storage-layer failure (database, filesystem).
    #[error("store error: {0}")]
    Store(#[from] anyhow::Error),
}

impl From<sqlx::Error> for PipelineError {
    fn from(e: sqlx::Error) -> Self {
        PipelineError::Store(e.into())
    }
}

pub type Result<T> = std::result::Result<T, PipelineError>;
