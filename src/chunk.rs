//! Overlapping-window text chunker.
//!
//! Splits extracted document text into passages of at most `max_chunk_size`
//! characters, where consecutive passages share exactly `overlap_size`
//! trailing/leading characters so context survives the cut points.
//!
//! Cuts prefer semantic boundaries inside the window — paragraph breaks
//! (`\n\n`), then sentence ends (`.`/`!`/`?` followed by whitespace), then
//! line breaks — and fall back to a hard cut at the window edge when no
//! boundary leaves room for the overlap. All positions are character
//! offsets, so multi-byte UTF-8 input is never split mid-character.
//!
//! # Guarantees
//!
//! - Every chunk is at most `max_chunk_size` characters long.
//! - `chunk[i+1].start == chunk[i].end - overlap_size` for every
//!   consecutive pair, so start offsets are strictly increasing.
//! - Stripping the first `overlap_size` characters from every chunk after
//!   the first and concatenating reconstructs the input exactly.
//!
//! Chunking is a pure function over the input text; persistence and id
//! assignment happen in the ingestion pipeline.

use crate::error::{PipelineError, Result};

/// A chunk produced by [`chunk_text`]: contiguous character span of the
/// source text plus its position in the chunk sequence.
#[derive(Debug, Clone, PartialEq)]
pub struct ChunkSpan {
    pub index: i64,
    pub text: String,
    /// Character offset of the first character, inclusive.
    pub start: usize,
    /// Character offset past the last character, exclusive.
    pub end: usize,
}

/// Split `text` into overlapping chunks.
///
/// # Errors
///
/// Returns [`PipelineError::Chunking`] if `text` is empty or
/// `max_chunk_size <= overlap_size` (the window could never advance).
pub fn chunk_text(text: &str, max_chunk_size: usize, overlap_size: usize) -> Result<Vec<ChunkSpan>> {
    if text.is_empty() {
        return Err(PipelineError::Chunking("input text is empty".to_string()));
    }
    if max_chunk_size <= overlap_size {
        return Err(PipelineError::Chunking(format!(
            "max_chunk_size ({max_chunk_size}) must be greater than overlap_size ({overlap_size})"
        )));
    }

    let chars: Vec<char> = text.chars().collect();
    let len = chars.len();
    let mut chunks = Vec::new();
    let mut start = 0usize;

    loop {
        let window_end = (start + max_chunk_size).min(len);
        if window_end == len {
            chunks.push(make_span(&chars, chunks.len() as i64, start, len));
            break;
        }

        // A boundary is only usable if it leaves the next window a fresh
        // start: end must exceed start + overlap_size or the cursor stalls.
        let end = find_boundary(&chars, start + overlap_size, window_end).unwrap_or(window_end);

        chunks.push(make_span(&chars, chunks.len() as i64, start, end));
        start = end - overlap_size;
    }

    Ok(chunks)
}

fn make_span(chars: &[char], index: i64, start: usize, end: usize) -> ChunkSpan {
    ChunkSpan {
        index,
        text: chars[start..end].iter().collect(),
        start,
        end,
    }
}

/// Find the best cut position in `(min_end, window_end]`, preferring
/// paragraph breaks, then sentence ends, then line breaks.
///
/// A returned position `e` means "cut after `chars[e-1]`".
fn find_boundary(chars: &[char], min_end: usize, window_end: usize) -> Option<usize> {
    let mut sentence: Option<usize> = None;
    let mut newline: Option<usize> = None;

    for e in (min_end + 1..=window_end).rev() {
        if e >= 2 && chars[e - 1] == '\n' && chars[e - 2] == '\n' {
            return Some(e);
        }
        if sentence.is_none()
            && e >= 2
            && matches!(chars[e - 2], '.' | '!' | '?')
            && chars[e - 1].is_whitespace()
        {
            sentence = Some(e);
        }
        if newline.is_none() && chars[e - 1] == '\n' {
            newline = Some(e);
        }
    }

    sentence.or(newline)
}
