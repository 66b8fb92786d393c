use serde::Deserialize;
use std::env;
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// Errors encountered while loading configuration from environment variables.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Required environment variable was not provided.
    #[error("Missing environment variable: {0}")]
    MissingVariable(String),
    /// Environment variable contained a value that could not be parsed.
    #[error("Invalid value for environment variable: {0}")]
    InvalidValue(String),
}

/// Runtime configuration for an ingestion pass.
#[derive(Debug, Clone)]
pub struct Config {
    /// Base URL of the remote file store API.
    pub source_base_url: String,
    /// Optional bearer token for the remote file store.
    pub source_api_token: Option<String>,
    /// Identifier of the remote collection (folder) to mirror.
    pub source_collection_id: String,
    /// Base URL of the Qdrant instance that stores embeddings.
    pub qdrant_url: String,
    /// Name of the Qdrant collection used for chunk storage.
    pub qdrant_collection_name: String,
    /// Optional API key required to access Qdrant.
    pub qdrant_api_key: Option<String>,
    /// Embedding provider used to generate vector representations.
    pub embedding_provider: EmbeddingProvider,
    /// Optional override for the provider's embeddings endpoint base URL.
    pub embedding_base_url: Option<String>,
    /// Optional API key passed to the embedding endpoint.
    pub embedding_api_key: Option<String>,
    /// Embedding model identifier passed to the provider.
    pub embedding_model: String,
    /// Dimensionality of the produced vectors.
    pub embedding_dimension: usize,
    /// Target chunk window in characters.
    pub chunk_size: usize,
    /// Characters shared between adjacent chunks.
    pub chunk_overlap: usize,
    /// Location of the persisted ingestion ledger.
    pub ledger_path: PathBuf,
    /// Per-call timeout applied to extraction, embedding, and HTTP requests.
    pub request_timeout: Duration,
    /// Upper bound on embedding attempts per file before giving up.
    pub max_retries: usize,
    /// Number of files processed concurrently within one pass.
    pub ingest_concurrency: usize,
    /// Command invoked for image OCR (fed bytes on stdin, read on stdout).
    pub ocr_command: String,
}

/// Supported embedding backends for the ingestion pipeline.
#[derive(Clone, Copy, Debug, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum EmbeddingProvider {
    /// Local Ollama runtime (OpenAI-compatible embeddings route).
    Ollama,
    /// Hosted OpenAI embeddings API.
    OpenAI,
}

impl EmbeddingProvider {
    /// Default embeddings base URL when `EMBEDDING_BASE_URL` is not set.
    pub fn default_base_url(self) -> &'static str {
        match self {
            Self::Ollama => "http://127.0.0.1:11434/v1",
            Self::OpenAI => "https://api.openai.com/v1",
        }
    }
}

const DEFAULT_CHUNK_SIZE: usize = 800;
const DEFAULT_CHUNK_OVERLAP: usize = 100;
const DEFAULT_LEDGER_PATH: &str = "data/ingestion_ledger.json";
const DEFAULT_TIMEOUT_SECS: u64 = 30;
const DEFAULT_MAX_RETRIES: usize = 3;
const DEFAULT_CONCURRENCY: usize = 4;
const DEFAULT_OCR_COMMAND: &str = "tesseract";

impl Config {
    /// Load `.env` (when present) and build the configuration from the
    /// environment, performing validation along the way.
    pub fn load() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();
        let config = Self::from_env()?;
        tracing::debug!(
            source = %config.source_base_url,
            collection = %config.source_collection_id,
            qdrant = %config.qdrant_url,
            provider = ?config.embedding_provider,
            "Loaded configuration"
        );
        Ok(config)
    }

    /// Build the configuration from environment variables alone.
    pub fn from_env() -> Result<Self, ConfigError> {
        Ok(Self {
            source_base_url: load_env("SOURCE_BASE_URL")?,
            source_api_token: load_env_optional("SOURCE_API_TOKEN"),
            source_collection_id: load_env("SOURCE_COLLECTION_ID")?,
            qdrant_url: load_env("QDRANT_URL")?,
            qdrant_collection_name: load_env("QDRANT_COLLECTION_NAME")?,
            qdrant_api_key: load_env_optional("QDRANT_API_KEY"),
            embedding_provider: load_env("EMBEDDING_PROVIDER")?
                .parse()
                .map_err(|()| ConfigError::InvalidValue("EMBEDDING_PROVIDER".to_string()))?,
            embedding_base_url: load_env_optional("EMBEDDING_BASE_URL"),
            embedding_api_key: load_env_optional("EMBEDDING_API_KEY"),
            embedding_model: load_env("EMBEDDING_MODEL")?,
            embedding_dimension: parse_env("EMBEDDING_DIMENSION", load_env("EMBEDDING_DIMENSION")?)?,
            chunk_size: parse_env_or("CHUNK_SIZE", DEFAULT_CHUNK_SIZE)?,
            chunk_overlap: parse_env_or("CHUNK_OVERLAP", DEFAULT_CHUNK_OVERLAP)?,
            ledger_path: load_env_optional("LEDGER_PATH")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from(DEFAULT_LEDGER_PATH)),
            request_timeout: Duration::from_secs(parse_env_or(
                "REQUEST_TIMEOUT_SECS",
                DEFAULT_TIMEOUT_SECS,
            )?),
            max_retries: parse_env_or("MAX_RETRIES", DEFAULT_MAX_RETRIES)?,
            ingest_concurrency: parse_env_or("INGEST_CONCURRENCY", DEFAULT_CONCURRENCY)?,
            ocr_command: load_env_optional("OCR_COMMAND")
                .unwrap_or_else(|| DEFAULT_OCR_COMMAND.to_string()),
        })
    }

    /// Embeddings base URL, falling back to the provider default.
    pub fn embedding_endpoint(&self) -> &str {
        self.embedding_base_url
            .as_deref()
            .unwrap_or_else(|| self.embedding_provider.default_base_url())
    }
}

fn load_env(key: &str) -> Result<String, ConfigError> {
    env::var(key).map_err(|_| ConfigError::MissingVariable(key.to_string()))
}

fn load_env_optional(key: &str) -> Option<String> {
    env::var(key).ok().filter(|value| !value.trim().is_empty())
}

fn parse_env<T: std::str::FromStr>(key: &str, value: String) -> Result<T, ConfigError> {
    value
        .parse()
        .map_err(|_| ConfigError::InvalidValue(key.to_string()))
}

fn parse_env_or<T: std::str::FromStr>(key: &str, default: T) -> Result<T, ConfigError> {
    match load_env_optional(key) {
        Some(value) => parse_env(key, value),
        None => Ok(default),
    }
}

impl std::str::FromStr for EmbeddingProvider {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "ollama" => Ok(Self::Ollama),
            "openai" => Ok(Self::OpenAI),
            _ => Err(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn provider_parses_case_insensitively() {
        assert_eq!("Ollama".parse(), Ok(EmbeddingProvider::Ollama));
        assert_eq!("OPENAI".parse(), Ok(EmbeddingProvider::OpenAI));
        assert_eq!("chroma".parse::<EmbeddingProvider>(), Err(()));
    }

    #[test]
    fn provider_default_base_urls() {
        assert!(
            EmbeddingProvider::Ollama
                .default_base_url()
                .contains("11434")
        );
        assert!(
            EmbeddingProvider::OpenAI
                .default_base_url()
                .contains("openai.com")
        );
    }
}
