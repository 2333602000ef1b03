//! Embedding provider contract and its HTTP backends.
//!
//! Two backends are available: a local Ollama server and the hosted OpenAI
//! embeddings API. Which one is used is decided once, from configuration,
//! by [`provider_from_config`]. Every failure is reported as
//! [`SiftError::Embedding`].

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use sift_core::{EmbeddingConfig, EmbeddingProviderKind, SiftError};

const OLLAMA_BASE_URL: &str = "http://localhost:11434";
const OPENAI_BASE_URL: &str = "https://api.openai.com";
const OPENAI_BATCH_SIZE: usize = 64;

/// Maps text to fixed-length vectors.
///
/// Implementations must return one vector per input, in input order.
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    /// Model identifier, for diagnostics.
    fn model(&self) -> &str;

    /// Embed a single text.
    async fn embed_one(&self, text: &str) -> Result<Vec<f32>, SiftError>;

    /// Embed several texts, preserving order.
    async fn embed_many(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, SiftError>;
}

/// Build the provider selected by `config.provider`.
///
/// # Errors
///
/// Returns [`SiftError::Config`] if the timeout is zero or the hosted
/// provider has no API key, or [`SiftError::Embedding`] if the HTTP client
/// cannot be built.
///
/// # Examples
///
/// ```
/// use sift_core::EmbeddingConfig;
/// use sift_index::embedding::provider_from_config;
///
/// let provider = provider_from_config(&EmbeddingConfig::default()).unwrap();
/// assert_eq!(provider.model(), "mistral");
/// ```
pub fn provider_from_config(
    config: &EmbeddingConfig,
) -> Result<Arc<dyn EmbeddingProvider>, SiftError> {
    match config.provider {
        EmbeddingProviderKind::Ollama => Ok(Arc::new(OllamaProvider::with_config(config)?)),
        EmbeddingProviderKind::OpenAi => Ok(Arc::new(OpenAiProvider::with_config(config)?)),
    }
}

fn build_client(timeout_secs: u64) -> Result<reqwest::Client, SiftError> {
    if timeout_secs == 0 {
        return Err(SiftError::config(
            "embedding",
            "timeout_secs must be at least 1, got 0",
        ));
    }
    reqwest::Client::builder()
        .timeout(Duration::from_secs(timeout_secs))
        .build()
        .map_err(|e| SiftError::Embedding(format!("failed to create HTTP client: {e}")))
}

fn request_error(url: &str, e: &reqwest::Error) -> SiftError {
    if e.is_timeout() {
        SiftError::Embedding(format!("request to {url} timed out"))
    } else {
        SiftError::Embedding(format!("HTTP request to {url} failed: {e}"))
    }
}

async fn check_status(
    provider: &str,
    response: reqwest::Response,
) -> Result<reqwest::Response, SiftError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response
        .text()
        .await
        .unwrap_or_else(|_| "unable to read response body".into());
    Err(SiftError::Embedding(format!(
        "{provider} returned {status}: {body}"
    )))
}

fn check_count(expected: usize, actual: usize) -> Result<(), SiftError> {
    if expected != actual {
        return Err(SiftError::Embedding(format!(
            "expected {expected} embeddings, provider returned {actual}"
        )));
    }
    Ok(())
}

/// Client for a local Ollama server (`/api/embeddings`).
///
/// # Examples
///
/// ```
/// use sift_index::embedding::{EmbeddingProvider, OllamaProvider};
///
/// let provider = OllamaProvider::new("http://localhost:11434", "nomic-embed-text").unwrap();
/// assert_eq!(provider.model(), "nomic-embed-text");
/// ```
pub struct OllamaProvider {
    client: reqwest::Client,
    base_url: String,
    model: String,
}

impl std::fmt::Debug for OllamaProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OllamaProvider")
            .field("base_url", &self.base_url)
            .field("model", &self.model)
            .finish_non_exhaustive()
    }
}

#[derive(Serialize)]
struct OllamaRequest<'a> {
    model: &'a str,
    prompt: &'a str,
}

#[derive(Deserialize)]
struct OllamaResponse {
    embedding: Vec<f32>,
}

impl OllamaProvider {
    /// Create a provider with the default 30 second timeout.
    ///
    /// # Errors
    ///
    /// Returns [`SiftError::Embedding`] if the HTTP client cannot be built.
    pub fn new(base_url: &str, model: &str) -> Result<Self, SiftError> {
        Self::with_config(&EmbeddingConfig {
            provider: EmbeddingProviderKind::Ollama,
            base_url: Some(base_url.to_string()),
            model: model.to_string(),
            ..EmbeddingConfig::default()
        })
    }

    /// Create a provider from an [`EmbeddingConfig`].
    ///
    /// # Errors
    ///
    /// Returns [`SiftError::Config`] for a zero timeout.
    pub fn with_config(config: &EmbeddingConfig) -> Result<Self, SiftError> {
        let base_url = config
            .base_url
            .as_deref()
            .unwrap_or(OLLAMA_BASE_URL)
            .trim_end_matches('/')
            .to_string();
        Ok(Self {
            client: build_client(config.timeout_secs)?,
            base_url,
            model: config.model.clone(),
        })
    }
}

#[async_trait]
impl EmbeddingProvider for OllamaProvider {
    fn model(&self) -> &str {
        &self.model
    }

    async fn embed_one(&self, text: &str) -> Result<Vec<f32>, SiftError> {
        let url = format!("{}/api/embeddings", self.base_url);
        let request = OllamaRequest {
            model: &self.model,
            prompt: text,
        };

        let response = self
            .client
            .post(&url)
            .json(&request)
            .send()
            .await
            .map_err(|e| request_error(&url, &e))?;
        let response = check_status("Ollama", response).await?;

        let body: OllamaResponse = response
            .json()
            .await
            .map_err(|e| SiftError::Embedding(format!("failed to parse Ollama response: {e}")))?;
        if body.embedding.is_empty() {
            return Err(SiftError::Embedding(format!(
                "Ollama returned an empty embedding for model '{}'",
                self.model
            )));
        }
        Ok(body.embedding)
    }

    /// Ollama's `/api/embeddings` takes one prompt, so texts are sent one
    /// request at a time.
    async fn embed_many(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, SiftError> {
        let mut embeddings = Vec::with_capacity(texts.len());
        for text in texts {
            embeddings.push(self.embed_one(text).await?);
        }
        tracing::debug!(count = embeddings.len(), model = %self.model, "embedded batch via Ollama");
        Ok(embeddings)
    }
}

/// Client for the OpenAI embeddings API (`/v1/embeddings`).
///
/// # Examples
///
/// ```
/// use sift_index::embedding::{EmbeddingProvider, OpenAiProvider};
///
/// let provider = OpenAiProvider::new("sk-test", "text-embedding-3-small").unwrap();
/// assert_eq!(provider.model(), "text-embedding-3-small");
/// ```
pub struct OpenAiProvider {
    client: reqwest::Client,
    api_key: String,
    base_url: String,
    model: String,
}

impl std::fmt::Debug for OpenAiProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OpenAiProvider")
            .field("base_url", &self.base_url)
            .field("model", &self.model)
            .finish_non_exhaustive()
    }
}

#[derive(Serialize)]
struct OpenAiRequest<'a> {
    model: &'a str,
    input: &'a [String],
}

#[derive(Deserialize)]
struct OpenAiResponse {
    data: Vec<OpenAiDataItem>,
}

#[derive(Deserialize)]
struct OpenAiDataItem {
    embedding: Vec<f32>,
    #[serde(default)]
    index: Option<usize>,
}

impl OpenAiProvider {
    /// Create a provider with the given API key and default settings.
    ///
    /// # Errors
    ///
    /// Returns [`SiftError::Embedding`] if the HTTP client cannot be built.
    pub fn new(api_key: &str, model: &str) -> Result<Self, SiftError> {
        Self::with_config(&EmbeddingConfig {
            provider: EmbeddingProviderKind::OpenAi,
            api_key: Some(api_key.to_string()),
            model: model.to_string(),
            ..EmbeddingConfig::default()
        })
    }

    /// Create a provider from an [`EmbeddingConfig`].
    ///
    /// Falls back to the `OPENAI_API_KEY` env var if no key is configured.
    ///
    /// # Errors
    ///
    /// Returns [`SiftError::Config`] if no API key is available.
    pub fn with_config(config: &EmbeddingConfig) -> Result<Self, SiftError> {
        let api_key = config
            .api_key
            .clone()
            .or_else(|| std::env::var("OPENAI_API_KEY").ok())
            .ok_or_else(|| {
                SiftError::config(
                    "embedding",
                    "OpenAI API key not found: set embedding.api_key in .sift.toml or OPENAI_API_KEY",
                )
            })?;
        let base_url = config
            .base_url
            .as_deref()
            .unwrap_or(OPENAI_BASE_URL)
            .trim_end_matches('/')
            .to_string();

        Ok(Self {
            client: build_client(config.timeout_secs)?,
            api_key,
            base_url,
            model: config.model.clone(),
        })
    }

    async fn embed_batch(&self, batch: &[String]) -> Result<Vec<Vec<f32>>, SiftError> {
        let url = format!("{}/v1/embeddings", self.base_url);
        let request = OpenAiRequest {
            model: &self.model,
            input: batch,
        };

        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(&request)
            .send()
            .await
            .map_err(|e| request_error(&url, &e))?;
        let response = check_status("OpenAI", response).await?;

        let body: OpenAiResponse = response
            .json()
            .await
            .map_err(|e| SiftError::Embedding(format!("failed to parse OpenAI response: {e}")))?;
        let embeddings = ordered_embeddings(body);
        check_count(batch.len(), embeddings.len())?;
        Ok(embeddings)
    }
}

fn ordered_embeddings(mut body: OpenAiResponse) -> Vec<Vec<f32>> {
    body.data.sort_by_key(|item| item.index.unwrap_or(usize::MAX));
    body.data.into_iter().map(|item| item.embedding).collect()
}

#[async_trait]
impl EmbeddingProvider for OpenAiProvider {
    fn model(&self) -> &str {
        &self.model
    }

    async fn embed_one(&self, text: &str) -> Result<Vec<f32>, SiftError> {
        let mut embeddings = self.embed_batch(&[text.to_string()]).await?;
        embeddings
            .pop()
            .ok_or_else(|| SiftError::Embedding("empty response from OpenAI".into()))
    }

    async fn embed_many(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, SiftError> {
        let mut all = Vec::with_capacity(texts.len());
        for batch in texts.chunks(OPENAI_BATCH_SIZE) {
            all.extend(self.embed_batch(batch).await?);
        }
        tracing::debug!(count = all.len(), model = %self.model, "embedded batch via OpenAI");
        Ok(all)
    }
}
