//! TOML configuration.
//!
//! The whole process reads one [`Config`], loaded once at startup by
//! [`load_config`] and passed by reference to every component. Relative
//! paths are resolved against `paths.base_dir` during loading so nothing
//! downstream has to know where the config file lived.

use anyhow::{bail, Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    #[serde(default)]
    pub paths: PathsConfig,
    #[serde(default)]
    pub index: IndexConfig,
    #[serde(default)]
    pub chunking: ChunkingConfig,
    #[serde(default)]
    pub ingest: IngestConfig,
    #[serde(default)]
    pub retrieval: RetrievalConfig,
    #[serde(default)]
    pub embedding: EmbeddingConfig,
    #[serde(default)]
    pub chat: ChatConfig,
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub watch: WatchConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct PathsConfig {
    #[serde(default = "default_base_dir")]
    pub base_dir: PathBuf,
    #[serde(default = "default_export_dir")]
    pub export_dir: PathBuf,
    #[serde(default = "default_index_dir")]
    pub index_dir: PathBuf,
    #[serde(default = "default_live_log")]
    pub live_log: PathBuf,
    #[serde(default = "default_cursor")]
    pub cursor: PathBuf,
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            base_dir: default_base_dir(),
            export_dir: default_export_dir(),
            index_dir: default_index_dir(),
            live_log: default_live_log(),
            cursor: default_cursor(),
        }
    }
}

fn default_base_dir() -> PathBuf {
    PathBuf::from(".")
}
fn default_export_dir() -> PathBuf {
    PathBuf::from("chat_export")
}
fn default_index_dir() -> PathBuf {
    PathBuf::from("index")
}
fn default_live_log() -> PathBuf {
    PathBuf::from("data/conversations.jsonl")
}
fn default_cursor() -> PathBuf {
    PathBuf::from("data/conversations_ingest_state.json")
}

impl PathsConfig {
    /// SQLite file holding the vector index.
    pub fn index_db(&self) -> PathBuf {
        self.index_dir.join("index.sqlite")
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct IndexConfig {
    #[serde(default = "default_collection")]
    pub collection: String,
}

impl Default for IndexConfig {
    fn default() -> Self {
        Self {
            collection: default_collection(),
        }
    }
}

fn default_collection() -> String {
    "chat_history".to_string()
}

#[derive(Debug, Deserialize, Clone)]
pub struct ChunkingConfig {
    #[serde(default = "default_max_chars")]
    pub max_chars: usize,
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            max_chars: default_max_chars(),
        }
    }
}

fn default_max_chars() -> usize {
    1000
}

#[derive(Debug, Deserialize, Clone)]
pub struct IngestConfig {
    #[serde(default = "default_export_batch_size")]
    pub export_batch_size: usize,
    #[serde(default = "default_live_batch_size")]
    pub live_batch_size: usize,
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            export_batch_size: default_export_batch_size(),
            live_batch_size: default_live_batch_size(),
        }
    }
}

fn default_export_batch_size() -> usize {
    128
}
fn default_live_batch_size() -> usize {
    64
}

#[derive(Debug, Deserialize, Clone)]
pub struct RetrievalConfig {
    #[serde(default = "default_top_k")]
    pub top_k: usize,
    #[serde(default = "default_max_context_chars")]
    pub max_context_chars: usize,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            top_k: default_top_k(),
            max_context_chars: default_max_context_chars(),
        }
    }
}

fn default_top_k() -> usize {
    8
}
fn default_max_context_chars() -> usize {
    8000
}

#[derive(Debug, Deserialize, Clone)]
pub struct EmbeddingConfig {
    #[serde(default = "default_provider")]
    pub provider: String,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub dims: Option<usize>,
    /// Base URL override (OpenAI-compatible servers such as LM Studio, or Ollama).
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default = "default_embed_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: default_provider(),
            model: None,
            dims: None,
            url: None,
            timeout_secs: default_embed_timeout_secs(),
        }
    }
}

fn default_provider() -> String {
    "disabled".to_string()
}
fn default_embed_timeout_secs() -> u64 {
    30
}

impl EmbeddingConfig {
    pub fn is_enabled(&self) -> bool {
        self.provider != "disabled"
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct ChatConfig {
    #[serde(default = "default_chat_base_url")]
    pub base_url: String,
    #[serde(default = "default_chat_model")]
    pub model: String,
    /// Name of the environment variable holding the bearer token.
    #[serde(default = "default_api_key_env")]
    pub api_key_env: String,
    #[serde(default = "default_chat_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default = "default_temperature")]
    pub temperature: f32,
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
}

impl Default for ChatConfig {
    fn default() -> Self {
        Self {
            base_url: default_chat_base_url(),
            model: default_chat_model(),
            api_key_env: default_api_key_env(),
            timeout_secs: default_chat_timeout_secs(),
            temperature: default_temperature(),
            max_tokens: default_max_tokens(),
        }
    }
}

fn default_chat_base_url() -> String {
    "http://localhost:1234/v1".to_string()
}
fn default_chat_model() -> String {
    "openai/gpt-oss-20b".to_string()
}
fn default_api_key_env() -> String {
    "LM_API_KEY".to_string()
}
fn default_chat_timeout_secs() -> u64 {
    300
}
fn default_temperature() -> f32 {
    0.3
}
fn default_max_tokens() -> u32 {
    1024
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
    "127.0.0.1:8001".to_string()
}

#[derive(Debug, Deserialize, Clone)]
pub struct WatchConfig {
    #[serde(default = "default_poll_secs")]
    pub poll_secs: u64,
}

impl Default for WatchConfig {
    fn default() -> Self {
        Self {
            poll_secs: default_poll_secs(),
        }
    }
}

fn default_poll_secs() -> u64 {
    5
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    parse_config(&content)
}

/// Parse, resolve, and validate a config from TOML text.
pub fn parse_config(content: &str) -> Result<Config> {
    let mut config: Config =
        toml::from_str(content).with_context(|| "Failed to parse config file")?;

    config.paths.resolve();
    validate(&config)?;

    Ok(config)
}

impl PathsConfig {
    fn resolve(&mut self) {
        self.base_dir = expand_home(&self.base_dir);
        let base = self.base_dir.clone();
        for path in [
            &mut self.export_dir,
            &mut self.index_dir,
            &mut self.live_log,
            &mut self.cursor,
        ] {
            let expanded = expand_home(path);
            *path = if expanded.is_absolute() {
                expanded
            } else {
                base.join(expanded)
            };
        }
    }
}

fn expand_home(path: &Path) -> PathBuf {
    match path.strip_prefix("~") {
        Ok(rest) => match dirs::home_dir() {
            Some(home) => home.join(rest),
            None => path.to_path_buf(),
        },
        Err(_) => path.to_path_buf(),
    }
}

fn validate(config: &Config) -> Result<()> {
    if config.chunking.max_chars == 0 {
        bail!("chunking.max_chars must be > 0");
    }

    if config.ingest.export_batch_size == 0 || config.ingest.live_batch_size == 0 {
        bail!("ingest batch sizes must be > 0");
    }

    if config.retrieval.top_k == 0 {
        bail!("retrieval.top_k must be >= 1");
    }

    if config.retrieval.max_context_chars == 0 {
        bail!("retrieval.max_context_chars must be > 0");
    }

    if config.index.collection.trim().is_empty() {
        bail!("index.collection must not be empty");
    }

    if config.embedding.is_enabled() {
        if config.embedding.dims.is_none() || config.embedding.dims == Some(0) {
            bail!(
                "embedding.dims must be > 0 when provider is '{}'",
                config.embedding.provider
            );
        }
        if config.embedding.model.is_none() {
            bail!(
                "embedding.model must be specified when provider is '{}'",
                config.embedding.provider
            );
        }
    }

    match config.embedding.provider.as_str() {
        "disabled" | "openai" | "ollama" => {}
        other => bail!(
            "Unknown embedding provider: '{}'. Must be disabled, openai, or ollama.",
            other
        ),
    }

    if config.watch.poll_secs == 0 {
        bail!("watch.poll_secs must be > 0");
    }

    Ok(())
}
