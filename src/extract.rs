//! Text extraction seam.
//!
//! Extraction is an external collaborator invoked before chunking:
//! connectors supply bytes plus a content type, and an extractor returns
//! plain UTF-8 text. Binary formats (PDF, OOXML) belong behind this trait
//! in their own implementations; the pipeline only depends on the trait.

use crate::error::{PipelineError, Result};

/// Converts raw uploaded bytes into plain text.
pub trait TextExtractor: Send + Sync {
    fn extract(&self, bytes: &[u8], content_type: &str) -> Result<String>;
}

/// Extractor for plain-text content types (`text/plain`, `text/markdown`).
pub struct PlainTextExtractor;

impl TextExtractor for PlainTextExtractor {
    fn extract(&self, bytes: &[u8], content_type: &str) -> Result<String> {
        match content_type {
            "text/plain" | "text/markdown" => {
                let text = std::str::from_utf8(bytes)
                    .map_err(|e| PipelineError::Extraction(format!("invalid UTF-8: {e}")))?;
                Ok(text.to_string())
            }
            other => Err(PipelineError::Extraction(format!(
                "unsupported content-type: {other}"
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plain_text_passthrough() {
        let out = PlainTextExtractor
            .extract(b"hello world", "text/plain")
            .unwrap();
        assert_eq!(out, "hello world");
    }

    #[test]
    fn test_unsupported_content_type() {
        let err = PlainTextExtractor
            .extract(b"%PDF-1.4", "application/pdf")
            .unwrap_err();
        assert!(matches!(err, PipelineError::Extraction(_)));
    }

    #[test]
    fn test_invalid_utf8_is_an_error() {
        let err = PlainTextExtractor
            .extract(&[0xff, 0xfe, 0x00], "text/plain")
            .unwrap_err();
        assert!(matches!(err, PipelineError::Extraction(_)));
    }
}
