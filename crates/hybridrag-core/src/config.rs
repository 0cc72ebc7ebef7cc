//! Layered configuration loader and path helpers.
//!
//! Uses Figment to merge `config.toml` + `config.<env>.toml` + `APP_*` env vars
//! (nested keys separated by `__`). `Settings` is the typed view the rest of
//! the workspace consumes; every field has a default.
use figment::{
    providers::{Env, Format, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use std::env;
use std::path::{Path, PathBuf};

use crate::document::TextSource;
use crate::error::{Error, Result};

pub struct Config {
    figment: Figment,
}

impl Config {
    pub fn load() -> Result<Self> {
        let env_name = env::var("RUST_ENV").unwrap_or_else(|_| "dev".to_string());

        let mut figment = Figment::new().merge(Toml::file("config.toml"));
        match env_name.as_str() {
            "dev" | "development" => figment = figment.merge(Toml::file("config.dev.toml")),
            "prod" | "production" => figment = figment.merge(Toml::file("config.prod.toml")),
            "test" | "testing" => figment = figment.merge(Toml::file("config.test.toml")),
            other => tracing::debug!(env = other, "no environment-specific config file"),
        }
        figment = figment.merge(Env::prefixed("APP_").split("__"));
        Ok(Self::from_figment(figment))
    }

    pub fn from_figment(figment: Figment) -> Self {
        Self { figment }
    }

    pub fn get<T>(&self, key: &str) -> Result<T>
    where
        T: serde::de::DeserializeOwned,
    {
        self.figment
            .extract_inner(key)
            .map_err(|e| Error::config(format!("failed to get '{key}': {e}")))
    }

    /// Typed settings, validated.
    pub fn settings(&self) -> Result<Settings> {
        let mut settings: Settings = self
            .figment
            .extract()
            .map_err(|e| Error::config(format!("invalid settings: {e}")))?;
        if settings.embedding.api_key.is_none() {
            settings.embedding.api_key = env::var("OPENAI_API_KEY").ok().filter(|k| !k.is_empty());
        }
        settings.validate()?;
        Ok(settings)
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub data: DataSettings,
    pub chunking: ChunkingSettings,
    pub embedding: EmbeddingSettings,
    pub index: IndexSettings,
    pub bm25: Bm25Settings,
    pub hybrid: HybridSettings,
    pub eval: EvalSettings,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DataSettings {
    pub documents: Option<String>,
    pub gold: Option<String>,
    pub db_dir: String,
    pub text_source: TextSource,
}

impl Default for DataSettings {
    fn default() -> Self {
        Self { documents: None, gold: None, db_dir: "data/lancedb".into(), text_source: TextSource::Auto }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChunkMode {
    #[default]
    Chars,
    Tokens,
}

pub const DEFAULT_CHAR_CHUNK: usize = 500;
pub const DEFAULT_CHAR_OVERLAP: usize = 50;
pub const DEFAULT_TOKEN_CHUNK: usize = 2048;
pub const DEFAULT_TOKEN_OVERLAP: usize = 100;

/// Unset `size`/`overlap` take the defaults of the selected mode.
/// `size = 0` keeps every document whole.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ChunkingSettings {
    pub size: Option<usize>,
    pub overlap: Option<usize>,
    pub mode: ChunkMode,
    pub tokenizer_path: Option<String>,
}

impl ChunkingSettings {
    pub fn resolved_size(&self) -> Option<usize> {
        let default = match self.mode {
            ChunkMode::Chars => DEFAULT_CHAR_CHUNK,
            ChunkMode::Tokens => DEFAULT_TOKEN_CHUNK,
        };
        Some(self.size.unwrap_or(default)).filter(|&n| n > 0)
    }

    pub fn resolved_overlap(&self) -> usize {
        self.overlap.unwrap_or(match self.mode {
            ChunkMode::Chars => DEFAULT_CHAR_OVERLAP,
            ChunkMode::Tokens => DEFAULT_TOKEN_OVERLAP,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProviderKind {
    Openai,
    Fake,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EmbeddingSettings {
    pub provider: ProviderKind,
    pub model: String,
    pub base_url: String,
    #[serde(skip_serializing)]
    pub api_key: Option<String>,
    /// Asks the provider to truncate vectors to this size.
    pub dimensions: Option<usize>,
    /// Output dimensionality. Falls back to `dimensions`, then a per-provider default.
    pub dim: Option<usize>,
    pub max_batch_size: usize,
    /// Rate-limit retries after the first request.
    pub max_retries: u32,
    pub base_delay_ms: u64,
    pub request_timeout_secs: u64,
}

impl Default for EmbeddingSettings {
    fn default() -> Self {
        Self {
            provider: ProviderKind::Fake,
            model: "text-embedding-3-large".into(),
            base_url: "https://api.openai.com/v1".into(),
            api_key: None,
            dimensions: None,
            dim: None,
            max_batch_size: 2048,
            max_retries: 5,
            base_delay_ms: 1000,
            request_timeout_secs: 60,
        }
    }
}

impl EmbeddingSettings {
    pub fn resolved_dim(&self) -> usize {
        self.dim.or(self.dimensions).unwrap_or(match self.provider {
            ProviderKind::Openai => 3072,
            ProviderKind::Fake => 256,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IdStrategy {
    Random,
    Deterministic,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct IndexSettings {
    pub collection: String,
    pub data_source: String,
    pub upsert_batch_size: usize,
    pub timeout_secs: u64,
    pub payload_fields: Vec<String>,
    pub id_strategy: IdStrategy,
}

impl Default for IndexSettings {
    fn default() -> Self {
        Self {
            collection: "documents".into(),
            data_source: "default".into(),
            upsert_batch_size: 100,
            timeout_secs: 300,
            payload_fields: Vec::new(),
            id_strategy: IdStrategy::Random,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SparseBackend {
    Okapi,
    Tantivy,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Bm25Settings {
    pub k1: f32,
    pub b: f32,
    pub epsilon: f32,
    pub backend: SparseBackend,
}

impl Default for Bm25Settings {
    fn default() -> Self {
        Self { k1: 1.5, b: 0.75, epsilon: 0.25, backend: SparseBackend::Okapi }
    }
}

/// Which identity the fused ranking groups by.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FuseBy {
    PointId,
    DocId,
    Field(String),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HybridSettings {
    pub top_k: usize,
    pub initial_fetch_limit: usize,
    pub semantic_weight: f64,
    pub bm25_weight: f64,
    pub over_fetch_factor: usize,
    pub rrf_k: f64,
    pub fuse_by: FuseBy,
}

impl Default for HybridSettings {
    fn default() -> Self {
        Self {
            top_k: 5,
            initial_fetch_limit: 25,
            semantic_weight: 0.7,
            bm25_weight: 0.3,
            over_fetch_factor: 3,
            rrf_k: 60.0,
            fuse_by: FuseBy::PointId,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EvalSettings {
    pub k_values: Vec<usize>,
    pub id_field: String,
    pub output: Option<String>,
}

impl Default for EvalSettings {
    fn default() -> Self {
        Self { k_values: vec![1, 3, 5], id_field: "doc_id".into(), output: None }
    }
}

impl Settings {
    /// Rejects settings that would fail later, before any I/O.
    pub fn validate(&self) -> Result<()> {
        crate::chunker::window_step(self.chunking.resolved_size(), self.chunking.resolved_overlap())?;
        if self.chunking.mode == ChunkMode::Tokens && self.chunking.tokenizer_path.is_none() {
            return Err(Error::config("chunking.mode = tokens requires chunking.tokenizer_path"));
        }
        if self.embedding.provider == ProviderKind::Openai && self.embedding.api_key.is_none() {
            return Err(Error::config("embedding.provider = openai requires an API key (OPENAI_API_KEY)"));
        }
        if self.embedding.max_batch_size == 0 {
            return Err(Error::config("embedding.max_batch_size must be at least 1"));
        }
        if self.embedding.resolved_dim() == 0 {
            return Err(Error::config("embedding dimension must be at least 1"));
        }
        if self.index.upsert_batch_size == 0 {
            return Err(Error::config("index.upsert_batch_size must be at least 1"));
        }
        if self.index.collection.trim().is_empty() {
            return Err(Error::config("index.collection must not be empty"));
        }
        if self.hybrid.top_k == 0 || self.hybrid.over_fetch_factor == 0 {
            return Err(Error::config("hybrid.top_k and hybrid.over_fetch_factor must be at least 1"));
        }
        if self.hybrid.rrf_k < 0.0 {
            return Err(Error::config("hybrid.rrf_k must not be negative"));
        }
        if self.eval.k_values.contains(&0) {
            return Err(Error::config("eval.k_values must be positive"));
        }
        Ok(())
    }
}

/// Expand a user-provided path string:
/// - Expands leading '~' to the user's home directory
/// - Expands ${VAR} and $VAR environment variables
/// - Returns a PathBuf without attempting to canonicalize
pub fn expand_path<S: AsRef<str>>(input: S) -> PathBuf {
    let s = input.as_ref();
    let expanded_env = shellexpand::env(s).unwrap_or(std::borrow::Cow::Borrowed(s));
    let expanded = shellexpand::tilde(&expanded_env);
    PathBuf::from(expanded.as_ref())
}

/// Resolve a possibly relative path against a given base directory after expansion.
pub fn resolve_with_base<S: AsRef<str>>(base: &Path, p: S) -> PathBuf {
    let p = expand_path(p);
    if p.is_absolute() {
        p
    } else {
        base.join(p)
    }
}
