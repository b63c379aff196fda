//! Prompt context assembly under a character budget.
//!
//! Packs retrieved chunks into a single context block in rank order,
//! stopping before the block would exceed the budget. The budget is
//! measured in characters, the same unit the answer generator's prompt
//! limit uses, and the conversation history already claimed for the
//! prompt is subtracted up front.
//!
//! Near-identical chunks (exact match after whitespace normalization)
//! are included only once. The ids actually included are recorded for
//! citation on the assistant turn.

use std::collections::HashSet;

use crate::models::RetrievalResult;

/// Separator between chunk blocks in the assembled context.
const BLOCK_SEPARATOR: &str = "\n\n";

/// The packed context plus the chunk ids that made it in.
#[derive(Debug, Clone, Default)]
pub struct AssembledContext {
    pub text: String,
    pub included_chunk_ids: Vec<String>,
}

impl AssembledContext {
    pub fn is_empty(&self) -> bool {
        self.included_chunk_ids.is_empty()
    }
}

/// Greedily pack `result` into a context string of at most
/// `budget - history_len` characters.
pub fn assemble(result: &RetrievalResult, history_len: usize, budget: usize) -> AssembledContext {
    let effective_budget = budget.saturating_sub(history_len);

    let mut text = String::new();
    let mut included = Vec::new();
    let mut seen: HashSet<String> = HashSet::new();

    for hit in &result.hits {
        let normalized = normalize_whitespace(&hit.text);
        if normalized.is_empty() || !seen.insert(normalized) {
            continue;
        }

        let block = format!("[relevance {:.3}] {}", hit.score, hit.text);
        let added_len = if text.is_empty() {
            block.chars().count()
        } else {
            BLOCK_SEPARATOR.len() + block.chars().count()
        };

        if text.chars().count() + added_len > effective_budget {
            break;
        }

        if !text.is_empty() {
            text.push_str(BLOCK_SEPARATOR);
        }
        text.push_str(&block);
        included.push(hit.chunk_id.clone());
    }

    AssembledContext {
        text,
        included_chunk_ids: included,
    }
}

/// Collapse all whitespace runs to single spaces and trim.
fn normalize_whitespace(s: &str) -> String {
    s.split_whitespace().collect::<Vec<_>>().join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ScoredChunk;

    fn hit(chunk_id: &str, score: f32, text: &str) -> ScoredChunk {
        ScoredChunk {
            chunk_id: chunk_id.to_string(),
            document_id: "d1".to_string(),
            score,
            text: text.to_string(),
        }
    }

    #[test]
    fn test_includes_in_rank_order_until_budget() {
        let result = RetrievalResult {
            hits: vec![
                hit("c1", 0.9, &"a".repeat(100)),
                hit("c2", 0.8, &"b".repeat(100)),
                hit("c3", 0.7, &"c".repeat(100)),
            ],
        };
        // Each block is ~118 chars with its relevance prefix; budget fits two.
        let ctx = assemble(&result, 0, 260);
        assert_eq!(ctx.included_chunk_ids, vec!["c1", "c2"]);
        assert!(ctx.text.contains("aaa"));
        assert!(ctx.text.contains("bbb"));
        assert!(!ctx.text.contains("ccc"));
    }

    #[test]
    fn test_history_reserves_budget() {
        let result = RetrievalResult {
            hits: vec![hit("c1", 0.9, &"a".repeat(100))],
        };
        let ctx = assemble(&result, 500, 520);
        assert!(ctx.is_empty());
    }

    #[test]
    fn test_deduplicates_whitespace_variants() {
        let result = RetrievalResult {
            hits: vec![
                hit("c1", 0.9, "same   text here"),
                hit("c2", 0.8, "same text\n\nhere"),
                hit("c3", 0.7, "different text"),
            ],
        };
        let ctx = assemble(&result, 0, 10_000);
        assert_eq!(ctx.included_chunk_ids, vec!["c1", "c3"]);
    }

    #[test]
    fn test_empty_retrieval_yields_empty_context() {
        let ctx = assemble(&RetrievalResult::default(), 0, 1000);
        assert!(ctx.is_empty());
        assert!(ctx.text.is_empty());
    }

    #[test]
    fn test_included_ids_subset_of_hits() {
        let result = RetrievalResult {
            hits: vec![
                hit("c1", 0.9, "first chunk"),
                hit("c2", 0.8, "second chunk"),
            ],
        };
        let ctx = assemble(&result, 0, 10_000);
        for id in &ctx.included_chunk_ids {
            assert!(result.hits.iter().any(|h| &h.chunk_id == id));
        }
    }
}
