use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::SiftError;
use crate::types::ChunkingStrategy;

/// Smallest `chunk_size` accepted for ingestion.
pub const MIN_CHUNK_SIZE: usize = 100;

/// Top-level configuration loaded from `.sift.toml`.
///
/// Resolution order: CLI flags > config file > defaults.
///
/// # Examples
///
/// ```
/// use sift_core::SiftConfig;
///
/// let config = SiftConfig::default();
/// assert_eq!(config.ingest.chunk_size, 1000);
/// assert_eq!(config.search.top_k, 5);
/// ```
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SiftConfig {
    /// Embedding provider settings.
    #[serde(default)]
    pub embedding: EmbeddingConfig,
    /// Chunking settings used during ingestion.
    #[serde(default)]
    pub ingest: IngestConfig,
    /// Query defaults.
    #[serde(default)]
    pub search: SearchConfig,
    /// Locations of the persisted index and metadata artifacts.
    #[serde(default)]
    pub store: StoreConfig,
}

impl SiftConfig {
    /// Load configuration from a TOML file at `path`.
    ///
    /// # Errors
    ///
    /// Returns [`SiftError::Io`] if the file cannot be read, or
    /// [`SiftError::Toml`] if the content is not valid TOML.
    ///
    /// # Examples
    ///
    /// ```no_run
    /// use sift_core::SiftConfig;
    /// use std::path::Path;
    ///
    /// let config = SiftConfig::from_file(Path::new(".sift.toml")).unwrap();
    /// ```
    pub fn from_file(path: &Path) -> Result<Self, SiftError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml(&content)
    }

    /// Parse configuration from a TOML string.
    ///
    /// # Errors
    ///
    /// Returns [`SiftError::Toml`] if parsing fails.
    ///
    /// # Examples
    ///
    /// ```
    /// use sift_core::SiftConfig;
    ///
    /// let toml = r#"
    /// [search]
    /// top_k = 10
    /// "#;
    /// let config = SiftConfig::from_toml(toml).unwrap();
    /// assert_eq!(config.search.top_k, 10);
    /// ```
    pub fn from_toml(content: &str) -> Result<Self, SiftError> {
        let config: Self = toml::from_str(content)?;
        Ok(config)
    }
}

/// Which embedding backend to talk to.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EmbeddingProviderKind {
    /// A local Ollama server.
    #[default]
    Ollama,
    /// The hosted OpenAI embeddings API.
    OpenAi,
}

/// Embedding provider configuration.
///
/// # Examples
///
/// ```
/// use sift_core::{EmbeddingConfig, EmbeddingProviderKind};
///
/// let config = EmbeddingConfig::default();
/// assert_eq!(config.provider, EmbeddingProviderKind::Ollama);
/// assert_eq!(config.model, "mistral");
/// assert_eq!(config.timeout_secs, 30);
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmbeddingConfig {
    /// Backend (default: `ollama`).
    #[serde(default)]
    pub provider: EmbeddingProviderKind,
    /// Model name (default: `"mistral"`).
    #[serde(default = "default_embedding_model")]
    pub model: String,
    /// Override for the provider base URL.
    pub base_url: Option<String>,
    /// API key for hosted providers.
    pub api_key: Option<String>,
    /// Per-request timeout in seconds (default: 30).
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_embedding_model() -> String {
    "mistral".into()
}

fn default_timeout_secs() -> u64 {
    30
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: EmbeddingProviderKind::default(),
            model: default_embedding_model(),
            base_url: None,
            api_key: None,
            timeout_secs: default_timeout_secs(),
        }
    }
}

/// Chunking configuration consumed by the ingestion path.
///
/// # Examples
///
/// ```
/// use sift_core::{ChunkingStrategy, IngestConfig};
///
/// let config = IngestConfig::default();
/// assert_eq!(config.chunking_strategy, ChunkingStrategy::Length);
/// assert_eq!(config.chunk_overlap, 200);
/// assert!(config.validate().is_ok());
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IngestConfig {
    /// How documents are split (default: `length`).
    #[serde(default)]
    pub chunking_strategy: ChunkingStrategy,
    /// Chunk length in characters for length-based chunking (default: 1000).
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,
    /// Characters shared between consecutive chunks (default: 200).
    #[serde(default = "default_chunk_overlap")]
    pub chunk_overlap: usize,
}

fn default_chunk_size() -> usize {
    1000
}

fn default_chunk_overlap() -> usize {
    200
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            chunking_strategy: ChunkingStrategy::default(),
            chunk_size: default_chunk_size(),
            chunk_overlap: default_chunk_overlap(),
        }
    }
}

impl IngestConfig {
    /// Check the chunk sizing bounds.
    ///
    /// # Errors
    ///
    /// Returns [`SiftError::Config`] if `chunk_size` is below
    /// [`MIN_CHUNK_SIZE`] or `chunk_overlap` is not smaller than `chunk_size`.
    pub fn validate(&self) -> Result<(), SiftError> {
        if self.chunk_size < MIN_CHUNK_SIZE {
            return Err(SiftError::config(
                "ingest",
                format!(
                    "chunk_size must be at least {MIN_CHUNK_SIZE}, got {}",
                    self.chunk_size
                ),
            ));
        }
        if self.chunk_overlap >= self.chunk_size {
            return Err(SiftError::config(
                "ingest",
                format!(
                    "chunk_overlap ({}) must be smaller than chunk_size ({})",
                    self.chunk_overlap, self.chunk_size
                ),
            ));
        }
        Ok(())
    }
}

/// Query defaults, overridable per request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchConfig {
    /// Number of nearest neighbours to fetch (default: 5).
    #[serde(default = "default_top_k")]
    pub top_k: usize,
    /// Minimum score a result must reach (default: 0.0, keep everything).
    #[serde(default)]
    pub score_threshold: f32,
}

fn default_top_k() -> usize {
    5
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            top_k: default_top_k(),
            score_threshold: 0.0,
        }
    }
}

/// Artifact locations.
///
/// # Examples
///
/// ```
/// use sift_core::StoreConfig;
///
/// let config = StoreConfig::default();
/// assert!(config.index_path.ends_with("vector_store.idx"));
/// assert!(config.metadata_path.ends_with("metadata.db"));
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    /// Vector index artifact (default: `.sift/vector_store.idx`).
    #[serde(default = "default_index_path")]
    pub index_path: PathBuf,
    /// Metadata artifact (default: `.sift/metadata.db`).
    #[serde(default = "default_metadata_path")]
    pub metadata_path: PathBuf,
}

fn default_index_path() -> PathBuf {
    PathBuf::from(".sift/vector_store.idx")
}

fn default_metadata_path() -> PathBuf {
    PathBuf::from(".sift/metadata.db")
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            index_path: default_index_path(),
            metadata_path: default_metadata_path(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_has_expected_values() {
        let config = SiftConfig::default();
        assert_eq!(config.embedding.provider, EmbeddingProviderKind::Ollama);
        assert_eq!(config.embedding.model, "mistral");
        assert!(config.embedding.base_url.is_none());
        assert!(config.embedding.api_key.is_none());
        assert_eq!(config.ingest.chunking_strategy, ChunkingStrategy::Length);
        assert_eq!(config.ingest.chunk_size, 1000);
        assert_eq!(config.ingest.chunk_overlap, 200);
        assert_eq!(config.search.top_k, 5);
        assert_eq!(config.search.score_threshold, 0.0);
        assert_eq!(
            config.store.index_path,
            PathBuf::from(".sift/vector_store.idx")
        );
    }

    #[test]
    fn parse_full_toml() {
        let toml = r#"
[embedding]
provider = "openai"
model = "text-embedding-3-small"
api_key = "sk-test"
timeout_secs = 5

[ingest]
chunking_strategy = "headings"
chunk_size = 500
chunk_overlap = 50

[search]
top_k = 3
score_threshold = 0.25

[store]
index_path = "data/vectors.idx"
metadata_path = "data/meta.db"
"#;
        let config = SiftConfig::from_toml(toml).unwrap();
        assert_eq!(config.embedding.provider, EmbeddingProviderKind::OpenAi);
        assert_eq!(config.embedding.api_key.as_deref(), Some("sk-test"));
        assert_eq!(config.embedding.timeout_secs, 5);
        assert_eq!(config.ingest.chunking_strategy, ChunkingStrategy::Headings);
        assert_eq!(config.ingest.chunk_size, 500);
        assert_eq!(config.search.top_k, 3);
        assert_eq!(config.search.score_threshold, 0.25);
        assert_eq!(config.store.metadata_path, PathBuf::from("data/meta.db"));
    }

    #[test]
    fn empty_toml_gives_defaults() {
        let config = SiftConfig::from_toml("").unwrap();
        assert_eq!(config.ingest.chunk_size, 1000);
        assert_eq!(config.embedding.model, "mistral");
    }

    #[test]
    fn invalid_toml_returns_error() {
        let result = SiftConfig::from_toml("{{invalid}}");
        assert!(result.is_err());
    }

    #[test]
    fn unknown_provider_is_rejected() {
        let result = SiftConfig::from_toml("[embedding]\nprovider = \"cohere\"\n");
        assert!(result.is_err());
    }

    #[test]
    fn validate_rejects_small_chunk_size() {
        let config = IngestConfig {
            chunk_size: 99,
            chunk_overlap: 0,
            ..IngestConfig::default()
        };
        let err = config.validate().unwrap_err().to_string();
        assert!(err.contains("99"), "error should name the value: {err}");
    }

    #[test]
    fn validate_rejects_overlap_not_below_size() {
        let config = IngestConfig {
            chunk_size: 200,
            chunk_overlap: 200,
            ..IngestConfig::default()
        };
        assert!(matches!(
            config.validate(),
            Err(SiftError::Config { op: "ingest", .. })
        ));
    }
}
