use serde::Deserialize;
use std::env;
use std::path::PathBuf;
use std::str::FromStr;
use std::sync::OnceLock;
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

/// Runtime configuration for the docchat server.
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    /// API key for OpenAI-compatible embedding and chat endpoints.
    pub openai_api_key: Option<String>,
    /// Base URL of the OpenAI-compatible API.
    pub openai_base_url: String,
    /// Base URL of a local Ollama runtime.
    pub ollama_url: String,
    /// Embedding provider used to vectorize chunks and questions.
    pub embedding_provider: EmbeddingProvider,
    /// Embedding model identifier passed to the provider.
    pub embedding_model: String,
    /// Vector size produced by the deterministic `hash` provider.
    pub embedding_dimension: usize,
    /// Language model provider used to answer questions.
    pub generation_provider: GenerationProvider,
    /// Chat model identifier.
    pub generation_model: String,
    /// Token budget for generated answers.
    pub generation_max_tokens: u32,
    /// Target chunk size in characters.
    pub chunk_size: usize,
    /// Characters shared between adjacent chunks.
    pub chunk_overlap: usize,
    /// Chunks retrieved per question.
    pub retrieval_top_k: usize,
    /// Root directory holding uploads and persisted indexes.
    pub data_dir: PathBuf,
    /// Age after which a session is purged.
    pub session_expiry_secs: u64,
    /// Period between expiry sweeps.
    pub sweep_interval_secs: u64,
    /// Maximum accepted upload body, in bytes.
    pub max_upload_bytes: usize,
    /// Timeout applied to outbound embedding and generation requests.
    pub http_timeout_secs: u64,
    /// Optional override for the HTTP server port.
    pub server_port: Option<u16>,
}

/// Supported embedding backends.
#[derive(Clone, Copy, Debug, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum EmbeddingProvider {
    /// Hosted OpenAI embeddings API.
    OpenAI,
    /// Local Ollama runtime.
    Ollama,
    /// Deterministic offline hashing embedder.
    Hash,
}

/// Supported answer generation backends.
#[derive(Clone, Copy, Debug, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum GenerationProvider {
    /// Hosted OpenAI chat completions API.
    OpenAI,
    /// Local Ollama runtime.
    Ollama,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            openai_api_key: None,
            openai_base_url: "https://api.openai.com/v1".into(),
            ollama_url: "http://127.0.0.1:11434".into(),
            embedding_provider: EmbeddingProvider::OpenAI,
            embedding_model: "text-embedding-3-small".into(),
            embedding_dimension: 256,
            generation_provider: GenerationProvider::OpenAI,
            generation_model: "gpt-3.5-turbo".into(),
            generation_max_tokens: 2048,
            chunk_size: 500,
            chunk_overlap: 100,
            retrieval_top_k: 5,
            data_dir: PathBuf::from("./data"),
            session_expiry_secs: 3600,
            sweep_interval_secs: 600,
            max_upload_bytes: 50 * 1024 * 1024,
            http_timeout_secs: 120,
            server_port: None,
        }
    }
}

impl Config {
    /// Load configuration from environment variables, performing validation along the way.
    pub fn from_env() -> Result<Self, ConfigError> {
        let config = Self::from_env_lenient()?;
        config.validate()?;
        Ok(config)
    }

    /// Parse environment variables without checking provider credentials or value ranges.
    ///
    /// Offline tooling such as the purge command only needs the storage settings.
    pub fn from_env_lenient() -> Result<Self, ConfigError> {
        let defaults = Self::default();
        let config = Self {
            openai_api_key: load_env_optional("OPENAI_API_KEY"),
            openai_base_url: load_env_optional("OPENAI_BASE_URL")
                .unwrap_or(defaults.openai_base_url),
            ollama_url: load_env_optional("OLLAMA_URL").unwrap_or(defaults.ollama_url),
            embedding_provider: parse_env("EMBEDDING_PROVIDER")?
                .unwrap_or(defaults.embedding_provider),
            embedding_model: load_env_optional("EMBEDDING_MODEL")
                .unwrap_or(defaults.embedding_model),
            embedding_dimension: parse_env("EMBEDDING_DIMENSION")?
                .unwrap_or(defaults.embedding_dimension),
            generation_provider: parse_env("GENERATION_PROVIDER")?
                .unwrap_or(defaults.generation_provider),
            generation_model: load_env_optional("GENERATION_MODEL")
                .unwrap_or(defaults.generation_model),
            generation_max_tokens: parse_env("GENERATION_MAX_TOKENS")?
                .unwrap_or(defaults.generation_max_tokens),
            chunk_size: parse_env("CHUNK_SIZE")?.unwrap_or(defaults.chunk_size),
            chunk_overlap: parse_env("CHUNK_OVERLAP")?.unwrap_or(defaults.chunk_overlap),
            retrieval_top_k: parse_env("RETRIEVAL_TOP_K")?.unwrap_or(defaults.retrieval_top_k),
            data_dir: load_env_optional("DATA_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.data_dir),
            session_expiry_secs: parse_env("SESSION_EXPIRY_SECS")?
                .unwrap_or(defaults.session_expiry_secs),
            sweep_interval_secs: parse_env("SWEEP_INTERVAL_SECS")?
                .unwrap_or(defaults.sweep_interval_secs),
            max_upload_bytes: parse_env("MAX_UPLOAD_BYTES")?
                .unwrap_or(defaults.max_upload_bytes),
            http_timeout_secs: parse_env("HTTP_TIMEOUT_SECS")?
                .unwrap_or(defaults.http_timeout_secs),
            server_port: parse_env("SERVER_PORT")?,
        };
        Ok(config)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        let needs_openai_key = self.embedding_provider == EmbeddingProvider::OpenAI
            || self.generation_provider == GenerationProvider::OpenAI;
        if needs_openai_key && self.openai_api_key.is_none() {
            return Err(ConfigError::MissingVariable("OPENAI_API_KEY".into()));
        }
        if self.chunk_size == 0 {
            return Err(ConfigError::InvalidValue("CHUNK_SIZE".into()));
        }
        if self.embedding_provider == EmbeddingProvider::Hash && self.embedding_dimension == 0 {
            return Err(ConfigError::InvalidValue("EMBEDDING_DIMENSION".into()));
        }
        if self.sweep_interval_secs == 0 {
            return Err(ConfigError::InvalidValue("SWEEP_INTERVAL_SECS".into()));
        }
        Ok(())
    }

    /// Session time-to-live.
    pub fn session_expiry(&self) -> Duration {
        Duration::from_secs(self.session_expiry_secs)
    }

    /// Period between sweeps.
    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_secs)
    }

    /// Timeout for outbound HTTP requests.
    pub fn http_timeout(&self) -> Duration {
        Duration::from_secs(self.http_timeout_secs)
    }
}

fn load_env_optional(key: &str) -> Option<String> {
    env::var(key).ok().filter(|value| !value.trim().is_empty())
}

fn parse_env<T: FromStr>(key: &str) -> Result<Option<T>, ConfigError> {
    load_env_optional(key)
        .map(|value| {
            value
                .trim()
                .parse()
                .map_err(|_| ConfigError::InvalidValue(key.to_string()))
        })
        .transpose()
}

impl FromStr for EmbeddingProvider {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "openai" => Ok(Self::OpenAI),
            "ollama" => Ok(Self::Ollama),
            "hash" => Ok(Self::Hash),
            _ => Err(()),
        }
    }
}

impl FromStr for GenerationProvider {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "openai" => Ok(Self::OpenAI),
            "ollama" => Ok(Self::Ollama),
            _ => Err(()),
        }
    }
}

/// Global configuration cache populated during process start.
pub static CONFIG: OnceLock<Config> = OnceLock::new();

/// Retrieve the loaded configuration, panicking if initialization has not occurred.
pub fn get_config() -> &'static Config {
    CONFIG.get().expect("Config not initialized")
}

/// Load configuration from the environment and install it in the global cache.
pub fn init_config() {
    dotenvy::dotenv().ok();
    let config = Config::from_env().expect("Failed to load config from environment");
    tracing::debug!(
        data_dir = %config.data_dir.display(),
        embedding_provider = ?config.embedding_provider,
        embedding_model = %config.embedding_model,
        generation_provider = ?config.generation_provider,
        generation_model = %config.generation_model,
        server_port = ?config.server_port,
        "Loaded configuration"
    );
    CONFIG.set(config).expect("Failed to set config");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn providers_parse_case_insensitively() {
        assert_eq!("OpenAI".parse(), Ok(EmbeddingProvider::OpenAI));
        assert_eq!("hash".parse(), Ok(EmbeddingProvider::Hash));
        assert_eq!("OLLAMA".parse(), Ok(GenerationProvider::Ollama));
        assert!("faiss".parse::<EmbeddingProvider>().is_err());
    }

    #[test]
    fn defaults_follow_documented_values() {
        let config = Config::default();
        assert_eq!(config.chunk_size, 500);
        assert_eq!(config.chunk_overlap, 100);
        assert_eq!(config.retrieval_top_k, 5);
        assert_eq!(config.generation_model, "gpt-3.5-turbo");
        assert_eq!(config.generation_max_tokens, 2048);
        assert_eq!(config.session_expiry(), Duration::from_secs(3600));
        assert_eq!(config.sweep_interval(), Duration::from_secs(600));
    }

    #[test]
    fn validate_requires_openai_key_for_openai_providers() {
        let config = Config::default();
        assert!(matches!(
            config.validate(),
            Err(ConfigError::MissingVariable(name)) if name == "OPENAI_API_KEY"
        ));

        let offline = Config {
            embedding_provider: EmbeddingProvider::Hash,
            generation_provider: GenerationProvider::Ollama,
            ..Config::default()
        };
        assert!(offline.validate().is_ok());
    }

    #[test]
    fn validate_rejects_zero_chunk_size() {
        let config = Config {
            openai_api_key: Some("sk-test".into()),
            chunk_size: 0,
            ..Config::default()
        };
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidValue(name)) if name == "CHUNK_SIZE"
        ));
    }
}
