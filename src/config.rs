use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub db: DbConfig,
    #[serde(default)]
    pub chunking: ChunkingConfig,
    #[serde(default)]
    pub retrieval: RetrievalConfig,
    #[serde(default)]
    pub context: ContextConfig,
    #[serde(default)]
    pub memory: MemoryConfig,
    #[serde(default)]
    pub embedding: EmbeddingConfig,
    #[serde(default)]
    pub generation: GenerationConfig,
    #[serde(default)]
    pub index: IndexConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DbConfig {
    pub path: PathBuf,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ChunkingConfig {
    #[serde(default = "default_max_chunk_size")]
    pub max_chunk_size: usize,
    #[serde(default = "default_overlap_size")]
    pub overlap_size: usize,
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            max_chunk_size: default_max_chunk_size(),
            overlap_size: default_overlap_size(),
        }
    }
}

fn default_max_chunk_size() -> usize {
    1000
}
fn default_overlap_size() -> usize {
    100
}

#[derive(Debug, Deserialize, Clone)]
pub struct RetrievalConfig {
    #[serde(default = "default_top_k")]
    pub top_k: usize,
    /// Multiplier applied to `top_k` when querying the index, so the
    /// score floor and per-document cap have candidates to discard.
    #[serde(default = "default_overfetch_factor")]
    pub overfetch_factor: usize,
    /// Hits scoring below this are dropped. Business tuning value.
    #[serde(default = "default_score_floor")]
    pub score_floor: f32,
    /// Maximum chunks kept per document; 0 disables the cap.
    #[serde(default = "default_max_chunks_per_doc")]
    pub max_chunks_per_doc: usize,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            top_k: default_top_k(),
            overfetch_factor: default_overfetch_factor(),
            score_floor: default_score_floor(),
            max_chunks_per_doc: default_max_chunks_per_doc(),
        }
    }
}

fn default_top_k() -> usize {
    5
}
fn default_overfetch_factor() -> usize {
    4
}
fn default_score_floor() -> f32 {
    0.25
}
fn default_max_chunks_per_doc() -> usize {
    3
}

#[derive(Debug, Deserialize, Clone)]
pub struct ContextConfig {
    /// Prompt context budget, in characters (the same unit the answer
    /// generator's prompt limit uses).
    #[serde(default = "default_budget_chars")]
    pub budget_chars: usize,
}

impl Default for ContextConfig {
    fn default() -> Self {
        Self {
            budget_chars: default_budget_chars(),
        }
    }
}

fn default_budget_chars() -> usize {
    4000
}

#[derive(Debug, Deserialize, Clone)]
pub struct MemoryConfig {
    /// Maximum turns retained per session; oldest evicted first.
    #[serde(default = "default_max_turns")]
    pub max_turns: usize,
    /// Turns handed to the answer generator per query.
    #[serde(default = "default_history_turns")]
    pub history_turns: usize,
}

impl Default for MemoryConfig {
    fn default() -> Self {
        Self {
            max_turns: default_max_turns(),
            history_turns: default_history_turns(),
        }
    }
}

fn default_max_turns() -> usize {
    20
}
fn default_history_turns() -> usize {
    10
}

#[derive(Debug, Deserialize, Clone)]
pub struct EmbeddingConfig {
    #[serde(default = "default_disabled")]
    pub provider: String,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub dims: Option<usize>,
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    #[serde(default = "default_embed_retries")]
    pub max_retries: u32,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: "disabled".to_string(),
            model: None,
            dims: None,
            batch_size: default_batch_size(),
            max_retries: default_embed_retries(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

impl EmbeddingConfig {
    pub fn is_enabled(&self) -> bool {
        self.provider != "disabled"
    }
}

fn default_disabled() -> String {
    "disabled".to_string()
}
fn default_batch_size() -> usize {
    64
}
fn default_embed_retries() -> u32 {
    3
}
fn default_timeout_secs() -> u64 {
    30
}

#[derive(Debug, Deserialize, Clone)]
pub struct GenerationConfig {
    /// `"openai"` or `"extractive"` (no model call; answers are pulled
    /// straight from retrieved chunk text).
    #[serde(default = "default_gen_provider")]
    pub provider: String,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
    #[serde(default = "default_temperature")]
    pub temperature: f32,
    #[serde(default = "default_gen_retries")]
    pub max_retries: u32,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            provider: default_gen_provider(),
            model: None,
            max_tokens: default_max_tokens(),
            temperature: default_temperature(),
            max_retries: default_gen_retries(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

fn default_gen_provider() -> String {
    "extractive".to_string()
}
fn default_max_tokens() -> u32 {
    500
}
fn default_temperature() -> f32 {
    0.7
}
fn default_gen_retries() -> u32 {
    2
}

#[derive(Debug, Deserialize, Clone)]
pub struct IndexConfig {
    /// `"sqlite"` (vectors in the main database), `"memory"`, or `"qdrant"`.
    #[serde(default = "default_index_backend")]
    pub backend: String,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default = "default_collection")]
    pub collection: String,
    /// Environment variable holding the Qdrant API key, if any.
    #[serde(default)]
    pub api_key_env: Option<String>,
}

impl Default for IndexConfig {
    fn default() -> Self {
        Self {
            backend: default_index_backend(),
            url: None,
            collection: default_collection(),
            api_key_env: None,
        }
    }
}

fn default_index_backend() -> String {
    "sqlite".to_string()
}
fn default_collection() -> String {
    "documents".to_string()
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let config: Config = toml::from_str(&content).with_context(|| "Failed to parse config file")?;

    if config.chunking.max_chunk_size == 0 {
        anyhow::bail!("chunking.max_chunk_size must be > 0");
    }
    if config.chunking.overlap_size >= config.chunking.max_chunk_size {
        anyhow::bail!("chunking.overlap_size must be < chunking.max_chunk_size");
    }

    if config.retrieval.top_k == 0 {
        anyhow::bail!("retrieval.top_k must be >= 1");
    }
    if config.retrieval.overfetch_factor == 0 {
        anyhow::bail!("retrieval.overfetch_factor must be >= 1");
    }
    if !(0.0..=1.0).contains(&config.retrieval.score_floor) {
        anyhow::bail!("retrieval.score_floor must be in [0.0, 1.0]");
    }

    if config.memory.max_turns < 2 {
        anyhow::bail!("memory.max_turns must be >= 2 (one user/assistant pair)");
    }

    if config.embedding.is_enabled() {
        if config.embedding.model.is_none() {
            anyhow::bail!(
                "embedding.model must be specified when provider is '{}'",
                config.embedding.provider
            );
        }
        if config.embedding.dims.is_none() || config.embedding.dims == Some(0) {
            anyhow::bail!(
                "embedding.dims must be > 0 when provider is '{}'",
                config.embedding.provider
            );
        }
    }

    match config.embedding.provider.as_str() {
        "disabled" | "openai" => {}
        other => anyhow::bail!(
            "Unknown embedding provider: '{}'. Must be disabled or openai.",
            other
        ),
    }

    match config.generation.provider.as_str() {
        "extractive" => {}
        "openai" => {
            if config.generation.model.is_none() {
                anyhow::bail!("generation.model must be specified when provider is 'openai'");
            }
        }
        other => anyhow::bail!(
            "Unknown generation provider: '{}'. Must be extractive or openai.",
            other
        ),
    }

    match config.index.backend.as_str() {
        "sqlite" | "memory" => {}
        "qdrant" => {
            if config.index.url.is_none() {
                anyhow::bail!("index.url must be specified when backend is 'qdrant'");
            }
        }
        other => anyhow::bail!(
            "Unknown index backend: '{}'. Must be sqlite, memory, or qdrant.",
            other
        ),
    }

    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_config(content: &str) -> tempfile::NamedTempFile {
        let mut f = tempfile::NamedTempFile::new().unwrap();
        f.write_all(content.as_bytes()).unwrap();
        f
    }

    #[test]
    fn test_minimal_config_defaults() {
        let f = write_config("[db]\npath = \"/tmp/docqa.sqlite\"\n");
        let cfg = load_config(f.path()).unwrap();
        assert_eq!(cfg.chunking.max_chunk_size, 1000);
        assert_eq!(cfg.chunking.overlap_size, 100);
        assert_eq!(cfg.retrieval.top_k, 5);
        assert_eq!(cfg.index.backend, "sqlite");
        assert!(!cfg.embedding.is_enabled());
    }

    #[test]
    fn test_overlap_must_be_smaller_than_chunk() {
        let f = write_config(
            "[db]\npath = \"/tmp/docqa.sqlite\"\n[chunking]\nmax_chunk_size = 100\noverlap_size = 100\n",
        );
        assert!(load_config(f.path()).is_err());
    }

    #[test]
    fn test_openai_embedding_requires_model_and_dims() {
        let f = write_config(
            "[db]\npath = \"/tmp/docqa.sqlite\"\n[embedding]\nprovider = \"openai\"\n",
        );
        assert!(load_config(f.path()).is_err());
    }

    #[test]
    fn test_qdrant_requires_url() {
        let f =
            write_config("[db]\npath = \"/tmp/docqa.sqlite\"\n[index]\nbackend = \"qdrant\"\n");
        assert!(load_config(f.path()).is_err());
    }
}
