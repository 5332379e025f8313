use std::env;
use std::path::PathBuf;
use std::str::FromStr;
use thiserror::Error;

/// Errors encountered while loading configuration from environment variables.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Environment variable contained a value that could not be parsed.
    #[error("Invalid value for environment variable {key}: {value:?}")]
    InvalidValue {
        /// Variable name.
        key: String,
        /// Raw value found in the environment.
        value: String,
    },
    /// Values parsed individually but are inconsistent with each other.
    #[error("Invalid configuration: {0}")]
    Inconsistent(String),
}

/// Runtime configuration for the RAG server.
#[derive(Debug, Clone)]
pub struct Config {
    /// Base URL of the Ollama runtime serving generations.
    pub ollama_base_url: String,
    /// Generation model requested from Ollama.
    pub ollama_model: String,
    /// Sampling temperature passed with every generation.
    pub llm_temperature: f32,
    /// Upper bound on a single generation round trip, in seconds.
    pub llm_timeout_secs: u64,
    /// Base URL of the Qdrant REST endpoint.
    pub qdrant_url: String,
    /// Optional API key required to access Qdrant.
    pub qdrant_api_key: Option<String>,
    /// Name of the Qdrant collection holding document chunks.
    pub qdrant_collection_name: String,
    /// Embedding backend used for documents and questions.
    pub embedding_provider: EmbeddingProvider,
    /// Embedding model identifier passed to the provider.
    pub embedding_model: String,
    /// Dimensionality of the produced vectors.
    pub embedding_dimension: usize,
    /// Target chunk length in characters.
    pub chunk_size: usize,
    /// Characters shared between consecutive chunks.
    pub chunk_overlap: usize,
    /// Minimum similarity a retrieved chunk needs to be used as context.
    pub retrieval_score_threshold: f32,
    /// `top_k` applied when a query omits it.
    pub default_top_k: usize,
    /// Hard ceiling applied to any requested `top_k`.
    pub max_top_k: usize,
    /// Largest accepted upload body, in bytes.
    pub max_upload_bytes: usize,
    /// Interface the HTTP server binds to.
    pub app_host: String,
    /// Port the HTTP server binds to.
    pub app_port: u16,
    /// Optional directory of static frontend assets; moves the API under `/api`.
    pub static_dir: Option<PathBuf>,
    /// Refuse to serve when Qdrant cannot be prepared at boot.
    pub strict_startup: bool,
}

/// Supported embedding backends.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum EmbeddingProvider {
    /// Local ONNX model executed through fastembed.
    FastEmbed,
    /// Deterministic hashed vectors; no model download required.
    Hash,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            ollama_base_url: "http://localhost:11434".into(),
            ollama_model: "llama3.1".into(),
            llm_temperature: 0.2,
            llm_timeout_secs: 60,
            qdrant_url: "http://localhost:6333".into(),
            qdrant_api_key: None,
            qdrant_collection_name: "documents".into(),
            embedding_provider: EmbeddingProvider::FastEmbed,
            embedding_model: "sentence-transformers/all-MiniLM-L6-v2".into(),
            embedding_dimension: 384,
            chunk_size: 500,
            chunk_overlap: 50,
            retrieval_score_threshold: 0.6,
            default_top_k: 5,
            max_top_k: 50,
            max_upload_bytes: 25 * 1024 * 1024,
            app_host: "0.0.0.0".into(),
            app_port: 8000,
            static_dir: None,
            strict_startup: true,
        }
    }
}

impl Config {
    /// Load configuration from environment variables, falling back to local-development
    /// defaults for anything unset, and validate the result.
    pub fn from_env() -> Result<Self, ConfigError> {
        let defaults = Self::default();
        let qdrant_url = match load_env_optional("QDRANT_URL") {
            Some(url) => url,
            None => {
                let host = load_env_optional("QDRANT_HOST").unwrap_or_else(|| "localhost".into());
                let port: u16 = parse_env("QDRANT_PORT", 6333)?;
                format!("http://{host}:{port}")
            }
        };

        let config = Self {
            ollama_base_url: load_env_optional("OLLAMA_BASE_URL")
                .unwrap_or(defaults.ollama_base_url),
            ollama_model: load_env_optional("OLLAMA_MODEL").unwrap_or(defaults.ollama_model),
            llm_temperature: parse_env("LLM_TEMPERATURE", defaults.llm_temperature)?,
            llm_timeout_secs: parse_env("LLM_TIMEOUT_SECS", defaults.llm_timeout_secs)?,
            qdrant_url,
            qdrant_api_key: load_env_optional("QDRANT_API_KEY"),
            qdrant_collection_name: load_env_optional("QDRANT_COLLECTION_NAME")
                .unwrap_or(defaults.qdrant_collection_name),
            embedding_provider: parse_env("EMBEDDING_PROVIDER", defaults.embedding_provider)?,
            embedding_model: load_env_optional("EMBEDDING_MODEL")
                .unwrap_or(defaults.embedding_model),
            embedding_dimension: parse_env("EMBEDDING_DIMENSION", defaults.embedding_dimension)?,
            chunk_size: parse_env("CHUNK_SIZE", defaults.chunk_size)?,
            chunk_overlap: parse_env("CHUNK_OVERLAP", defaults.chunk_overlap)?,
            retrieval_score_threshold: parse_env(
                "RETRIEVAL_SCORE_THRESHOLD",
                defaults.retrieval_score_threshold,
            )?,
            default_top_k: parse_env("DEFAULT_TOP_K", defaults.default_top_k)?,
            max_top_k: parse_env("MAX_TOP_K", defaults.max_top_k)?,
            max_upload_bytes: parse_env("MAX_UPLOAD_BYTES", defaults.max_upload_bytes)?,
            app_host: load_env_optional("APP_HOST").unwrap_or(defaults.app_host),
            app_port: parse_env("APP_PORT", defaults.app_port)?,
            static_dir: load_env_optional("STATIC_DIR").map(PathBuf::from),
            strict_startup: parse_bool_env("RAG_STRICT_STARTUP", defaults.strict_startup)?,
        };
        config.validate()?;
        Ok(config)
    }

    /// Check cross-field constraints that individual parsing cannot catch.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.embedding_dimension == 0 {
            return Err(ConfigError::Inconsistent(
                "EMBEDDING_DIMENSION must be greater than zero".into(),
            ));
        }
        if self.chunk_size == 0 {
            return Err(ConfigError::Inconsistent(
                "CHUNK_SIZE must be greater than zero".into(),
            ));
        }
        if self.chunk_overlap >= self.chunk_size {
            return Err(ConfigError::Inconsistent(format!(
                "CHUNK_OVERLAP ({}) must be smaller than CHUNK_SIZE ({})",
                self.chunk_overlap, self.chunk_size
            )));
        }
        if !(0.0..=1.0).contains(&self.retrieval_score_threshold) {
            return Err(ConfigError::Inconsistent(
                "RETRIEVAL_SCORE_THRESHOLD must lie within [0, 1]".into(),
            ));
        }
        if self.default_top_k == 0 || self.max_top_k < self.default_top_k {
            return Err(ConfigError::Inconsistent(
                "DEFAULT_TOP_K must be in 1..=MAX_TOP_K".into(),
            ));
        }
        Ok(())
    }
}

fn load_env_optional(key: &str) -> Option<String> {
    env::var(key).ok().filter(|value| !value.trim().is_empty())
}

fn parse_env<T: FromStr>(key: &str, default: T) -> Result<T, ConfigError> {
    match load_env_optional(key) {
        Some(value) => value.trim().parse().map_err(|_| ConfigError::InvalidValue {
            key: key.to_string(),
            value,
        }),
        None => Ok(default),
    }
}

fn parse_bool_env(key: &str, default: bool) -> Result<bool, ConfigError> {
    match load_env_optional(key) {
        Some(value) => match value.trim().to_lowercase().as_str() {
            "1" | "true" | "yes" | "on" => Ok(true),
            "0" | "false" | "no" | "off" => Ok(false),
            _ => Err(ConfigError::InvalidValue {
                key: key.to_string(),
                value,
            }),
        },
        None => Ok(default),
    }
}

impl FromStr for EmbeddingProvider {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "fastembed" => Ok(Self::FastEmbed),
            "hash" => Ok(Self::Hash),
            _ => Err(()),
        }
    }
}

/// Merge `.env` (when present) into the process environment. Variables already set win.
///
/// Returns the path of the file that was loaded.
pub fn load_dotenv() -> Option<PathBuf> {
    dotenvy::dotenv().ok()
}

/// Read the process environment into a validated [`Config`].
///
/// Call [`load_dotenv`] first when `.env` files should be honoured.
pub fn load() -> Result<Config, ConfigError> {
    let config = Config::from_env()?;
    tracing::debug!(
        qdrant_url = %config.qdrant_url,
        collection = %config.qdrant_collection_name,
        ollama_url = %config.ollama_base_url,
        ollama_model = %config.ollama_model,
        embedding_provider = ?config.embedding_provider,
        embedding_model = %config.embedding_model,
        "Loaded configuration"
    );
    Ok(config)
}
