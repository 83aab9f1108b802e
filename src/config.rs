use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub documents: DocumentsConfig,
    #[serde(default)]
    pub retrieval: RetrievalConfig,
    #[serde(default)]
    pub embedding: EmbeddingConfig,
    #[serde(default)]
    pub synthesis: SynthesisConfig,
    #[serde(default)]
    pub chat: ChatConfig,
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub auth: AuthConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DocumentsConfig {
    /// Flat directory containing the office documents to ingest.
    pub dir: PathBuf,
    /// Extra filename globs to skip, on top of the built-in manifest exclusions.
    #[serde(default)]
    pub exclude_globs: Vec<String>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct RetrievalConfig {
    /// Grounding mode: `truncate` (corpus prefix) or `semantic` (top-k chunks).
    #[serde(default = "default_mode")]
    pub mode: String,
    /// Character budget for truncate mode. Characters, not tokens: non-Latin
    /// scripts consume more tokens per character, so keep this conservative
    /// relative to the synthesis model's input limit.
    #[serde(default = "default_truncate_budget")]
    pub truncate_budget: usize,
    /// Number of chunks returned per query in semantic mode.
    #[serde(default = "default_top_k")]
    pub top_k: usize,
    /// Target chunk size in characters.
    #[serde(default = "default_chunk_chars")]
    pub chunk_chars: usize,
    /// Characters of each chunk repeated at the start of the next one.
    #[serde(default = "default_overlap_chars")]
    pub overlap_chars: usize,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            mode: default_mode(),
            truncate_budget: default_truncate_budget(),
            top_k: default_top_k(),
            chunk_chars: default_chunk_chars(),
            overlap_chars: default_overlap_chars(),
        }
    }
}

fn default_mode() -> String {
    "truncate".to_string()
}
fn default_truncate_budget() -> usize {
    15_000
}
fn default_top_k() -> usize {
    6
}
fn default_chunk_chars() -> usize {
    1_200
}
fn default_overlap_chars() -> usize {
    200
}

#[derive(Debug, Deserialize, Clone)]
pub struct EmbeddingConfig {
    #[serde(default = "default_provider")]
    pub provider: String,
    #[serde(default = "default_embedding_base_url")]
    pub base_url: String,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub dims: Option<usize>,
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    /// Name of the environment variable holding the API key.
    #[serde(default = "default_embedding_key_env")]
    pub api_key_env: String,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: default_provider(),
            base_url: default_embedding_base_url(),
            model: None,
            dims: None,
            batch_size: default_batch_size(),
            max_retries: default_max_retries(),
            timeout_secs: default_timeout_secs(),
            api_key_env: default_embedding_key_env(),
        }
    }
}

impl EmbeddingConfig {
    pub fn is_enabled(&self) -> bool {
        self.provider != "disabled"
    }
}

fn default_provider() -> String {
    "disabled".to_string()
}
fn default_embedding_base_url() -> String {
    "https://api.openai.com/v1".to_string()
}
fn default_batch_size() -> usize {
    64
}
fn default_max_retries() -> u32 {
    5
}
fn default_timeout_secs() -> u64 {
    30
}
fn default_embedding_key_env() -> String {
    "OPENAI_API_KEY".to_string()
}

#[derive(Debug, Deserialize, Clone)]
pub struct SynthesisConfig {
    /// OpenAI-compatible API root, e.g. `https://api.groq.com/openai/v1`.
    #[serde(default = "default_synthesis_base_url")]
    pub base_url: String,
    #[serde(default = "default_synthesis_model")]
    pub model: String,
    #[serde(default = "default_temperature")]
    pub temperature: f64,
    #[serde(default = "default_synthesis_timeout_secs")]
    pub timeout_secs: u64,
    /// Name of the environment variable holding the API key.
    #[serde(default = "default_synthesis_key_env")]
    pub api_key_env: String,
}

impl Default for SynthesisConfig {
    fn default() -> Self {
        Self {
            base_url: default_synthesis_base_url(),
            model: default_synthesis_model(),
            temperature: default_temperature(),
            timeout_secs: default_synthesis_timeout_secs(),
            api_key_env: default_synthesis_key_env(),
        }
    }
}

fn default_synthesis_base_url() -> String {
    "https://api.groq.com/openai/v1".to_string()
}
fn default_synthesis_model() -> String {
    "llama-3.3-70b-versatile".to_string()
}
fn default_temperature() -> f64 {
    0.1
}
fn default_synthesis_timeout_secs() -> u64 {
    60
}
fn default_synthesis_key_env() -> String {
    "GROQ_API_KEY".to_string()
}

#[derive(Debug, Deserialize, Clone)]
pub struct ChatConfig {
    /// How many trailing conversation turns are kept in the prompt payload.
    #[serde(default = "default_history_window")]
    pub history_window: usize,
    /// Override for the system instruction. Must contain `{context}`, which
    /// is replaced with the grounding text at assembly time.
    #[serde(default)]
    pub system_instruction: Option<String>,
}

impl Default for ChatConfig {
    fn default() -> Self {
        Self {
            history_window: default_history_window(),
            system_instruction: None,
        }
    }
}

fn default_history_window() -> usize {
    3
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    #[serde(default = "default_bind")]
    pub bind: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
        }
    }
}

fn default_bind() -> String {
    "127.0.0.1:8080".to_string()
}

#[derive(Debug, Deserialize, Clone)]
pub struct AuthConfig {
    /// Name of the environment variable holding the shared access password.
    #[serde(default = "default_password_env")]
    pub password_env: String,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            password_env: default_password_env(),
        }
    }
}

fn default_password_env() -> String {
    "DESKQA_PASSWORD".to_string()
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let config: Config = toml::from_str(&content).with_context(|| "Failed to parse config file")?;
    validate(&config)?;
    Ok(config)
}

fn validate(config: &Config) -> Result<()> {
    match config.retrieval.mode.as_str() {
        "truncate" | "semantic" => {}
        other => anyhow::bail!(
            "Unknown retrieval mode: '{}'. Must be truncate or semantic.",
            other
        ),
    }

    if config.retrieval.truncate_budget == 0 {
        anyhow::bail!("retrieval.truncate_budget must be > 0");
    }
    if config.retrieval.top_k == 0 {
        anyhow::bail!("retrieval.top_k must be >= 1");
    }
    if config.retrieval.chunk_chars == 0 {
        anyhow::bail!("retrieval.chunk_chars must be > 0");
    }
    if config.retrieval.overlap_chars >= config.retrieval.chunk_chars {
        anyhow::bail!("retrieval.overlap_chars must be smaller than retrieval.chunk_chars");
    }

    match config.embedding.provider.as_str() {
        "disabled" | "openai" => {}
        other => anyhow::bail!(
            "Unknown embedding provider: '{}'. Must be disabled or openai.",
            other
        ),
    }

    if config.retrieval.mode == "semantic" {
        if !config.embedding.is_enabled() {
            anyhow::bail!("retrieval.mode = \"semantic\" requires an [embedding] provider");
        }
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

    if !(0.0..=2.0).contains(&config.synthesis.temperature) {
        anyhow::bail!("synthesis.temperature must be in [0.0, 2.0]");
    }

    if config.chat.history_window == 0 {
        anyhow::bail!("chat.history_window must be >= 1");
    }
    if let Some(ref instruction) = config.chat.system_instruction {
        if !instruction.contains("{context}") {
            anyhow::bail!("chat.system_instruction must contain a {{context}} placeholder");
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(toml_str: &str) -> Result<Config> {
        let config: Config = toml::from_str(toml_str)?;
        validate(&config)?;
        Ok(config)
    }

    #[test]
    fn minimal_config_uses_defaults() {
        let config = parse("[documents]\ndir = \"./docs\"\n").unwrap();
        assert_eq!(config.retrieval.mode, "truncate");
        assert_eq!(config.retrieval.truncate_budget, 15_000);
        assert_eq!(config.chat.history_window, 3);
        assert!(!config.embedding.is_enabled());
    }

    #[test]
    fn semantic_mode_requires_embedding_provider() {
        let err = parse(
            "[documents]\ndir = \"./docs\"\n[retrieval]\nmode = \"semantic\"\n",
        )
        .unwrap_err();
        assert!(err.to_string().contains("semantic"));
    }

    #[test]
    fn semantic_mode_with_provider_is_accepted() {
        let config = parse(
            r#"
            [documents]
            dir = "./docs"
            [retrieval]
            mode = "semantic"
            [embedding]
            provider = "openai"
            model = "text-embedding-3-small"
            dims = 1536
            "#,
        )
        .unwrap();
        assert!(config.embedding.is_enabled());
        assert_eq!(config.embedding.dims, Some(1536));
    }

    #[test]
    fn overlap_must_stay_below_chunk_size() {
        let err = parse(
            "[documents]\ndir = \"./docs\"\n[retrieval]\nchunk_chars = 100\noverlap_chars = 100\n",
        )
        .unwrap_err();
        assert!(err.to_string().contains("overlap_chars"));
    }

    #[test]
    fn system_instruction_needs_context_placeholder() {
        let err = parse(
            "[documents]\ndir = \"./docs\"\n[chat]\nsystem_instruction = \"answer nicely\"\n",
        )
        .unwrap_err();
        assert!(err.to_string().contains("{context}"));
    }
}
