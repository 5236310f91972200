use std::env;
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
    /// Chunk overlap must stay below the chunk window size.
    #[error("CHUNK_OVERLAP ({overlap}) must be smaller than CHUNK_SIZE ({size})")]
    OverlapTooLarge {
        /// Configured chunk window size in characters.
        size: usize,
        /// Configured overlap in characters.
        overlap: usize,
    },
}

/// Runtime configuration for the Pagescout server.
///
/// Loaded once at process start and passed down into the services that need
/// it; nothing reads the environment after startup.
#[derive(Debug, Clone)]
pub struct Config {
    /// SQLx connection string for the record store (e.g. `sqlite:data/pagescout.db`).
    pub database_url: String,
    /// Base URL of the Qdrant instance that stores chunk embeddings.
    pub qdrant_url: String,
    /// Name of the Qdrant collection used for chunk vectors.
    pub qdrant_collection_name: String,
    /// Optional API key required to access Qdrant.
    pub qdrant_api_key: Option<String>,
    /// Base URL of the OpenAI-compatible API used for embeddings and inference.
    pub openai_base_url: String,
    /// Optional bearer token for the OpenAI-compatible API.
    pub openai_api_key: Option<String>,
    /// Embedding model identifier.
    pub embedding_model: String,
    /// Dimensionality of the produced vectors.
    pub embedding_dimension: usize,
    /// Chat model used for page-range inference.
    pub inference_model: String,
    /// Base URL of the document discovery (custom search) API.
    pub search_base_url: String,
    /// API key for the discovery service.
    pub search_api_key: Option<String>,
    /// Search engine identifier for the discovery service.
    pub search_engine_id: Option<String>,
    /// Chunk window size in characters.
    pub chunk_size: usize,
    /// Chunk overlap in characters; always smaller than `chunk_size`.
    pub chunk_overlap: usize,
    /// Page-count ceiling above which a document is rejected.
    pub max_pdf_pages: usize,
    /// Download size ceiling for a single PDF, in bytes.
    pub max_pdf_bytes: usize,
    /// Wall-clock ceiling for fetching one PDF.
    pub fetch_timeout: Duration,
    /// Wall-clock ceiling for text extraction of one PDF.
    pub extract_timeout: Duration,
    /// Number of documents processed concurrently.
    pub worker_count: usize,
    /// Number of snippets retrieved per document for inference.
    pub retrieval_top_k: usize,
    /// Time-to-live for cached relevance results.
    pub cache_ttl: Duration,
    /// Optional override for the HTTP server port.
    pub server_port: Option<u16>,
}

impl Config {
    /// Load configuration from environment variables, performing validation along the way.
    pub fn from_env() -> Result<Self, ConfigError> {
        let config = Self {
            database_url: load_env_optional("DATABASE_URL")
                .unwrap_or_else(|| "sqlite:data/pagescout.db".to_string()),
            qdrant_url: load_env("QDRANT_URL")?,
            qdrant_collection_name: load_env("QDRANT_COLLECTION_NAME")?,
            qdrant_api_key: load_env_optional("QDRANT_API_KEY"),
            openai_base_url: load_env_optional("OPENAI_BASE_URL")
                .unwrap_or_else(|| "https://api.openai.com/v1".to_string()),
            openai_api_key: load_env_optional("OPENAI_API_KEY"),
            embedding_model: load_env_optional("EMBEDDING_MODEL")
                .unwrap_or_else(|| "text-embedding-3-small".to_string()),
            embedding_dimension: parse_env("EMBEDDING_DIMENSION", 1536)?,
            inference_model: load_env_optional("INFERENCE_MODEL")
                .unwrap_or_else(|| "gpt-4".to_string()),
            search_base_url: load_env_optional("SEARCH_BASE_URL")
                .unwrap_or_else(|| "https://www.googleapis.com/customsearch/v1".to_string()),
            search_api_key: load_env_optional("SEARCH_API_KEY"),
            search_engine_id: load_env_optional("SEARCH_ENGINE_ID"),
            chunk_size: parse_env("CHUNK_SIZE", 900)?,
            chunk_overlap: parse_env("CHUNK_OVERLAP", 200)?,
            max_pdf_pages: parse_env("MAX_PDF_PAGES", 300)?,
            max_pdf_bytes: parse_env("MAX_PDF_BYTES", 50 * 1024 * 1024)?,
            fetch_timeout: Duration::from_secs(parse_env("FETCH_TIMEOUT_SECS", 30)?),
            extract_timeout: Duration::from_secs(parse_env("EXTRACT_TIMEOUT_SECS", 30)?),
            worker_count: parse_env("WORKER_COUNT", 4)?,
            retrieval_top_k: parse_env("RETRIEVAL_TOP_K", 10)?,
            cache_ttl: Duration::from_secs(parse_env("CACHE_TTL_SECS", 24 * 60 * 60)?),
            server_port: load_env_optional("SERVER_PORT")
                .map(|value| {
                    value
                        .parse()
                        .map_err(|_| ConfigError::InvalidValue("SERVER_PORT".into()))
                })
                .transpose()?,
        };
        config.validate()?;
        Ok(config)
    }

    /// Reject combinations that would misbehave at runtime.
    fn validate(&self) -> Result<(), ConfigError> {
        if self.chunk_size == 0 {
            return Err(ConfigError::InvalidValue("CHUNK_SIZE".into()));
        }
        if self.chunk_overlap >= self.chunk_size {
            return Err(ConfigError::OverlapTooLarge {
                size: self.chunk_size,
                overlap: self.chunk_overlap,
            });
        }
        if self.max_pdf_pages == 0 {
            return Err(ConfigError::InvalidValue("MAX_PDF_PAGES".into()));
        }
        if self.embedding_dimension == 0 {
            return Err(ConfigError::InvalidValue("EMBEDDING_DIMENSION".into()));
        }
        if self.worker_count == 0 {
            return Err(ConfigError::InvalidValue("WORKER_COUNT".into()));
        }
        Ok(())
    }
}

fn load_env(key: &str) -> Result<String, ConfigError> {
    env::var(key).map_err(|_| ConfigError::MissingVariable(key.to_string()))
}

fn load_env_optional(key: &str) -> Option<String> {
    env::var(key).ok().filter(|value| !value.trim().is_empty())
}

fn parse_env<T: std::str::FromStr>(key: &str, default: T) -> Result<T, ConfigError> {
    match load_env_optional(key) {
        Some(value) => value
            .parse()
            .map_err(|_| ConfigError::InvalidValue(key.to_string())),
        None => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base_config() -> Config {
        Config {
            database_url: "sqlite::memory:".into(),
            qdrant_url: "http://127.0.0.1:6333".into(),
            qdrant_collection_name: "chunks".into(),
            qdrant_api_key: None,
            openai_base_url: "http://127.0.0.1:1".into(),
            openai_api_key: None,
            embedding_model: "text-embedding-3-small".into(),
            embedding_dimension: 8,
            inference_model: "gpt-4".into(),
            search_base_url: "http://127.0.0.1:1".into(),
            search_api_key: None,
            search_engine_id: None,
            chunk_size: 900,
            chunk_overlap: 200,
            max_pdf_pages: 300,
            max_pdf_bytes: 1024,
            fetch_timeout: Duration::from_secs(1),
            extract_timeout: Duration::from_secs(1),
            worker_count: 4,
            retrieval_top_k: 10,
            cache_ttl: Duration::from_secs(60),
            server_port: None,
        }
    }

    #[test]
    fn accepts_default_chunking() {
        assert!(base_config().validate().is_ok());
    }

    #[test]
    fn rejects_overlap_not_smaller_than_window() {
        let mut config = base_config();
        config.chunk_overlap = config.chunk_size;
        let error = config.validate().unwrap_err();
        assert!(matches!(
            error,
            ConfigError::OverlapTooLarge {
                size: 900,
                overlap: 900
            }
        ));
    }

    #[test]
    fn rejects_zero_worker_count() {
        let mut config = base_config();
        config.worker_count = 0;
        assert!(config.validate().is_err());
    }
}
