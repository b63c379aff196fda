//! Answer generation from assembled context and conversation history.
//!
//! The [`ChatModel`] trait wraps the single completion call the pipeline
//! needs. The prompt template is deterministic: given the same context,
//! history, and question, the model receives byte-identical input.
//!
//! Model output is treated as untrusted text. [`generate`] strips code
//! fences and JSON wrappers, retries once with a stricter instruction when
//! the reply comes back empty or still wrapped, and surfaces
//! [`PipelineError::Generation`] if the retry fails too.
//!
//! When no chat model is configured (or as a deliberate choice), the
//! [`extractive_answer`] fallback builds an answer from the retrieved
//! chunk sentences that best overlap the question, with no model call.

use async_trait::async_trait;
use std::collections::HashSet;
use std::time::Duration;
use tracing::warn;

use crate::config::GenerationConfig;
use crate::context::AssembledContext;
use crate::error::{PipelineError, Result};
use crate::memory::format_history;
use crate::models::Turn;

/// Answer returned when the context has nothing relevant in it.
pub const NO_CONTEXT_ANSWER: &str =
    "I don't have any relevant information in the indexed documents to answer that.";

/// A chat completion backend.
#[async_trait]
pub trait ChatModel: Send + Sync {
    /// Run one completion for `prompt` and return the raw model text.
    async fn complete(&self, prompt: &str) -> Result<String>;
}

/// Build the answer prompt from context, history, and the user question.
pub fn build_prompt(question: &str, context: &AssembledContext, history: &[Turn]) -> String {
    let mut prompt = String::new();

    prompt.push_str(
        "You are a helpful assistant that answers questions based on the provided document \
         context. Answer using only the information in the context. If the context does not \
         contain the information needed, say so plainly.\n\n",
    );

    if context.is_empty() {
        prompt.push_str("Context: (no relevant documents found)\n\n");
    } else {
        prompt.push_str("Context:\n");
        prompt.push_str(&context.text);
        prompt.push_str("\n\n");
    }

    if !history.is_empty() {
        prompt.push_str("Previous conversation:\n");
        prompt.push_str(&format_history(history));
        prompt.push_str("\n\n");
    }

    prompt.push_str("User Question: ");
    prompt.push_str(question);
    prompt.push_str("\n\nAnswer:");
    prompt
}

/// Instruction appended on retry when the first reply was empty or wrapped.
const RETRY_SUFFIX: &str =
    "\n\nRespond with plain prose only. Do not use code fences, JSON, or any other wrapper.";

/// Produce an answer via `model`, sanitizing and retrying once on a
/// degenerate reply.
pub async fn generate(
    model: &dyn ChatModel,
    question: &str,
    context: &AssembledContext,
    history: &[Turn],
) -> Result<String> {
    let prompt = build_prompt(question, context, history);

    let raw = model.complete(&prompt).await?;
    if let Some(text) = strip_wrapper(&raw) {
        return Ok(text);
    }

    warn!("model reply was empty or wrapped; retrying with stricter instruction");
    let raw = model.complete(&format!("{prompt}{RETRY_SUFFIX}")).await?;
    strip_wrapper(&raw).ok_or_else(|| {
        PipelineError::Generation("model returned an empty or malformed reply twice".to_string())
    })
}

/// Unwrap a raw model reply into plain answer text.
///
/// Strips surrounding whitespace, a single Markdown code fence, and a
/// one-field JSON object keyed `answer` or `response`. Returns `None`
/// when nothing usable remains.
fn strip_wrapper(raw: &str) -> Option<String> {
    let mut text = raw.trim().to_string();

    if text.starts_with("```") {
        let inner: Vec<&str> = text.lines().collect();
        if inner.len() >= 2 && inner[inner.len() - 1].trim_start().starts_with("```") {
            text = inner[1..inner.len() - 1].join("\n").trim().to_string();
        }
    }

    if text.starts_with('{') && text.ends_with('}') {
        if let Ok(value) = serde_json::from_str::<serde_json::Value>(&text) {
            for key in ["answer", "response"] {
                if let Some(answer) = value.get(key).and_then(|v| v.as_str()) {
                    text = answer.trim().to_string();
                    break;
                }
            }
        }
    }

    if text.is_empty() {
        None
    } else {
        Some(text)
    }
}

/// Model-free fallback: stitch an answer from the context sentences that
/// share the most keywords with the question.
pub fn extractive_answer(question: &str, chunk_texts: &[String]) -> String {
    if chunk_texts.is_empty() {
        return NO_CONTEXT_ANSWER.to_string();
    }

    let query_words: HashSet<String> = question
        .to_lowercase()
        .split(|c: char| !c.is_alphanumeric())
        .filter(|w| w.len() > 2)
        .map(|w| w.to_string())
        .collect();

    let mut scored: Vec<(usize, &str)> = Vec::new();
    for text in chunk_texts {
        for sentence in split_sentences(text) {
            let overlap = sentence
                .to_lowercase()
                .split(|c: char| !c.is_alphanumeric())
                .filter(|w| query_words.contains(*w))
                .count();
            if overlap > 0 {
                scored.push((overlap, sentence));
            }
        }
    }

    if scored.is_empty() {
        // Nothing overlaps the question keywords; lead with the
        // top-ranked chunk so the caller still sees what was found.
        let lead: String = chunk_texts[0].chars().take(300).collect();
        return format!("Based on the indexed documents: {}", lead.trim());
    }

    scored.sort_by(|a, b| b.0.cmp(&a.0));
    let answer = scored
        .iter()
        .take(3)
        .map(|(_, s)| s.trim())
        .collect::<Vec<_>>()
        .join(" ");
    format!("Based on the indexed documents: {answer}")
}

/// Split on sentence-ending punctuation, keeping the punctuation.
fn split_sentences(text: &str) -> Vec<&str> {
    let mut sentences = Vec::new();
    let mut start = 0;
    let bytes = text.char_indices().collect::<Vec<_>>();
    for (i, (pos, c)) in bytes.iter().enumerate() {
        if matches!(c, '.' | '!' | '?') {
            let next_is_boundary = bytes
                .get(i + 1)
                .map(|(_, nc)| nc.is_whitespace())
                .unwrap_or(true);
            if next_is_boundary {
                let end = pos + c.len_utf8();
                let sentence = text[start..end].trim();
                if !sentence.is_empty() {
                    sentences.push(&text[start..end]);
                }
                start = end;
            }
        }
    }
    let tail = text[start..].trim();
    if !tail.is_empty() {
        sentences.push(&text[start..]);
    }
    sentences
}

/// Chat backend using the OpenAI completions API.
///
/// Calls `POST /v1/chat/completions`. The API key is read from
/// `OPENAI_API_KEY` at construction time. Retry policy matches the
/// embedding client: 429 and 5xx retried with exponential backoff,
/// other 4xx fail immediately.
pub struct OpenAiChat {
    client: reqwest::Client,
    api_key: String,
    model: String,
    max_tokens: u32,
    temperature: f32,
    max_retries: u32,
}

impl OpenAiChat {
    pub fn new(config: &GenerationConfig) -> anyhow::Result<Self> {
        let model = config
            .model
            .clone()
            .ok_or_else(|| anyhow::anyhow!("generation.model required for OpenAI provider"))?;
        let api_key = std::env::var("OPENAI_API_KEY")
            .map_err(|_| anyhow::anyhow!("OPENAI_API_KEY environment variable not set"))?;

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;

        Ok(Self {
            client,
            api_key,
            model,
            max_tokens: config.max_tokens,
            temperature: config.temperature,
            max_retries: config.max_retries,
        })
    }
}

#[async_trait]
impl ChatModel for OpenAiChat {
    async fn complete(&self, prompt: &str) -> Result<String> {
        let body = serde_json::json!({
            "model": self.model,
            "max_tokens": self.max_tokens,
            "temperature": self.temperature,
            "messages": [{"role": "user", "content": prompt}],
        });

        let mut last_err: Option<String> = None;

        for attempt in 0..=self.max_retries {
            if attempt > 0 {
                let delay = Duration::from_secs(1 << (attempt - 1).min(5));
                warn!(attempt, delay_secs = delay.as_secs(), "retrying completion");
                tokio::time::sleep(delay).await;
            }

            let resp = self
                .client
                .post("https://api.openai.com/v1/chat/completions")
                .header("Authorization", format!("Bearer {}", self.api_key))
                .header("Content-Type", "application/json")
                .json(&body)
                .send()
                .await;

            match resp {
                Ok(response) => {
                    let status = response.status();

                    if status.is_success() {
                        let json: serde_json::Value = response.json().await.map_err(|e| {
                            PipelineError::Generation(format!("invalid response body: {e}"))
                        })?;
                        return parse_completion_response(&json);
                    }

                    if status.as_u16() == 429 || status.is_server_error() {
                        let body_text = response.text().await.unwrap_or_default();
                        last_err = Some(format!("API error {status}: {body_text}"));
                        continue;
                    }

                    let body_text = response.text().await.unwrap_or_default();
                    return Err(PipelineError::Generation(format!(
                        "API error {status}: {body_text}"
                    )));
                }
                Err(e) => {
                    last_err = Some(e.to_string());
                    continue;
                }
            }
        }

        Err(PipelineError::Generation(
            last_err.unwrap_or_else(|| "completion failed after retries".to_string()),
        ))
    }
}

fn parse_completion_response(json: &serde_json::Value) -> Result<String> {
    json.get("choices")
        .and_then(|c| c.as_array())
        .and_then(|c| c.first())
        .and_then(|c| c.get("message"))
        .and_then(|m| m.get("content"))
        .and_then(|t| t.as_str())
        .map(|t| t.to_string())
        .ok_or_else(|| PipelineError::Generation("response missing message content".to_string()))
}
