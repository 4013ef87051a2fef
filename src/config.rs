use serde::Deserialize;
use std::path::{Path, PathBuf};

use crate::error::{Error, Result};

#[derive(Debug, Deserialize, Clone, Default)]
pub struct Config {
    #[serde(default)]
    pub data: DataConfig,
    #[serde(default)]
    pub embedding: EmbeddingConfig,
    #[serde(default)]
    pub index: IndexConfig,
    #[serde(default)]
    pub retrieval: RetrievalConfig,
    #[serde(default)]
    pub answer: AnswerConfig,
    #[serde(default)]
    pub server: ServerConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DataConfig {
    /// Directory scanned for `*.csv` sources.
    #[serde(default = "default_data_dir")]
    pub dir: PathBuf,
    /// Intermediate JSONL file written by `documents` and read by `ingest`.
    #[serde(default = "default_documents_path")]
    pub documents: PathBuf,
}

impl Default for DataConfig {
    fn default() -> Self {
        Self {
            dir: default_data_dir(),
            documents: default_documents_path(),
        }
    }
}

fn default_data_dir() -> PathBuf {
    PathBuf::from("data")
}
fn default_documents_path() -> PathBuf {
    PathBuf::from("data/documents.jsonl")
}

#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum EmbeddingBackend {
    Disabled,
    Hash,
    Openai,
    Gemini,
    Local,
}

#[derive(Debug, Deserialize, Clone)]
pub struct EmbeddingConfig {
    #[serde(default = "default_provider")]
    pub provider: EmbeddingBackend,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub dims: Option<usize>,
    /// Base URL override for HTTP providers.
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: default_provider(),
            model: None,
            dims: None,
            url: None,
            timeout_secs: default_timeout_secs(),
        }
    }
}

fn default_provider() -> EmbeddingBackend {
    EmbeddingBackend::Disabled
}
fn default_timeout_secs() -> u64 {
    30
}

impl EmbeddingConfig {
    pub fn is_enabled(&self) -> bool {
        self.provider != EmbeddingBackend::Disabled
    }
}

#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum IndexBackend {
    /// In-process only. Rejected by [`load_config`]: each command is its own
    /// process, so nothing ingested would survive to a later query.
    Memory,
    Qdrant,
    Sqlite,
}

/// How vector ids are derived during ingestion.
#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum IdScheme {
    /// The Nth document of a run gets id N.
    #[default]
    Position,
    /// Hash of source, disease and content; independent of input order.
    ContentHash,
}

#[derive(Debug, Deserialize, Clone)]
pub struct IndexConfig {
    #[serde(default = "default_backend")]
    pub backend: IndexBackend,
    #[serde(default = "default_collection")]
    pub collection: String,
    /// Qdrant REST endpoint.
    #[serde(default = "default_qdrant_url")]
    pub url: String,
    /// SQLite database file for the hybrid backend.
    #[serde(default = "default_db_path")]
    pub path: PathBuf,
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    #[serde(default)]
    pub id_scheme: IdScheme,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for IndexConfig {
    fn default() -> Self {
        Self {
            backend: default_backend(),
            collection: default_collection(),
            url: default_qdrant_url(),
            path: default_db_path(),
            batch_size: default_batch_size(),
            id_scheme: IdScheme::default(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

fn default_backend() -> IndexBackend {
    IndexBackend::Sqlite
}
fn default_collection() -> String {
    "medical_diseases".to_string()
}
fn default_qdrant_url() -> String {
    "http://localhost:6333".to_string()
}
fn default_db_path() -> PathBuf {
    PathBuf::from("data/medrag.sqlite")
}
fn default_batch_size() -> usize {
    64
}

#[derive(Debug, Deserialize, Clone)]
pub struct RetrievalConfig {
    /// Used whenever a caller asks for zero or a negative number of results.
    #[serde(default = "default_max_results")]
    pub default_max_results: usize,
    /// Weight of the vector channel in hybrid search (0 = lexical only).
    #[serde(default = "default_hybrid_alpha")]
    pub hybrid_alpha: f64,
    #[serde(default = "default_candidate_k")]
    pub candidate_k: usize,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            default_max_results: default_max_results(),
            hybrid_alpha: default_hybrid_alpha(),
            candidate_k: default_candidate_k(),
        }
    }
}

fn default_max_results() -> usize {
    5
}
fn default_hybrid_alpha() -> f64 {
    0.6
}
fn default_candidate_k() -> usize {
    80
}

#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum AnswerBackend {
    Disabled,
    Gemini,
}

#[derive(Debug, Deserialize, Clone)]
pub struct AnswerConfig {
    #[serde(default = "default_answer_provider")]
    pub provider: AnswerBackend,
    #[serde(default = "default_answer_model")]
    pub model: String,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default = "default_answer_timeout")]
    pub timeout_secs: u64,
}

impl Default for AnswerConfig {
    fn default() -> Self {
        Self {
            provider: default_answer_provider(),
            model: default_answer_model(),
            url: None,
            timeout_secs: default_answer_timeout(),
        }
    }
}

fn default_answer_provider() -> AnswerBackend {
    AnswerBackend::Disabled
}
fn default_answer_model() -> String {
    "gemini-2.0-flash-001".to_string()
}
fn default_answer_timeout() -> u64 {
    60
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
    "127.0.0.1:8000".to_string()
}

pub fn load_config(path: &Path) -> Result<Config> {
    if !path.is_file() {
        return Err(Error::MissingSource(path.to_path_buf()));
    }
    let content = std::fs::read_to_string(path)?;
    parse_config(&content)
}

pub fn parse_config(content: &str) -> Result<Config> {
    let config: Config = toml::from_str(content)
        .map_err(|e| Error::Config(format!("failed to parse config: {}", e)))?;
    validate(&config)?;
    Ok(config)
}

fn validate(config: &Config) -> Result<()> {
    if config.index.batch_size == 0 {
        return Err(Error::Config("index.batch_size must be > 0".to_string()));
    }
    if config.index.backend == IndexBackend::Memory {
        return Err(Error::Config(
            "index.backend = \"memory\" is a library/test-only backend and does not persist \
             between commands; use \"sqlite\" or \"qdrant\""
                .to_string(),
        ));
    }
    if config.index.collection.trim().is_empty() {
        return Err(Error::Config("index.collection must not be empty".to_string()));
    }
    if config.retrieval.default_max_results == 0 {
        return Err(Error::Config(
            "retrieval.default_max_results must be >= 1".to_string(),
        ));
    }
    if !(0.0..=1.0).contains(&config.retrieval.hybrid_alpha) {
        return Err(Error::Config(
            "retrieval.hybrid_alpha must be in [0.0, 1.0]".to_string(),
        ));
    }

    match config.embedding.provider {
        EmbeddingBackend::Openai | EmbeddingBackend::Gemini => {
            if config.embedding.model.is_none() {
                return Err(Error::Config(format!(
                    "embedding.model must be specified when provider is '{:?}'",
                    config.embedding.provider
                )));
            }
            if matches!(config.embedding.dims, None | Some(0)) {
                return Err(Error::Config(format!(
                    "embedding.dims must be > 0 when provider is '{:?}'",
                    config.embedding.provider
                )));
            }
        }
        EmbeddingBackend::Hash => {
            if config.embedding.dims == Some(0) {
                return Err(Error::Config("embedding.dims must be > 0".to_string()));
            }
        }
        EmbeddingBackend::Disabled | EmbeddingBackend::Local => {}
    }

    Ok(())
}
