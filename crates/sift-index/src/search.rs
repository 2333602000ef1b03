//! Query-time retrieval: embed, search, join metadata, threshold, filter.

use std::collections::BTreeMap;
use std::sync::Arc;

use sift_core::{Metadata, SearchConfig, SearchResponse, SearchResult, SiftError};

use crate::embedding::EmbeddingProvider;
use crate::store::VectorStore;

/// A retrieval query.
#[derive(Debug, Clone, PartialEq)]
pub struct SearchRequest {
    /// Natural-language query text.
    pub query: String,
    /// Maximum number of neighbours to consider.
    pub top_k: usize,
    /// Minimum score a result must reach.
    pub score_threshold: f32,
    /// Key/value pairs every result's metadata must match.
    pub metadata_filters: BTreeMap<String, String>,
}

impl SearchRequest {
    /// A request using the `top_k` and threshold from `config`, with no filters.
    pub fn new(query: impl Into<String>, config: &SearchConfig) -> Self {
        Self {
            query: query.into(),
            top_k: config.top_k,
            score_threshold: config.score_threshold,
            metadata_filters: BTreeMap::new(),
        }
    }

    /// Check `top_k` and the threshold without embedding anything.
    ///
    /// # Errors
    ///
    /// Returns [`SiftError::Config`] for `top_k == 0` or a non-finite
    /// threshold.
    pub fn validate(&self) -> Result<(), SiftError> {
        if self.top_k == 0 {
            return Err(SiftError::config("search", "top_k must be at least 1, got 0"));
        }
        if !self.score_threshold.is_finite() {
            return Err(SiftError::config(
                "search",
                format!("score_threshold must be finite, got {}", self.score_threshold),
            ));
        }
        Ok(())
    }
}

/// Map a squared Euclidean distance to a similarity score in `(0, 1]`.
///
/// Larger distances give strictly smaller scores.
///
/// # Examples
///
/// ```
/// use sift_index::search::score_from_distance;
///
/// assert_eq!(score_from_distance(0.0), 1.0);
/// assert_eq!(score_from_distance(1.0), 0.5);
/// assert!(score_from_distance(4.0) < score_from_distance(1.0));
/// ```
pub fn score_from_distance(distance: f32) -> f32 {
    1.0 / (1.0 + distance.max(0.0))
}

/// Whether `metadata` satisfies every filter.
///
/// String values must be equal to the filter value. Other JSON values are
/// compared by their JSON text, so `"3"` matches the number `3`.
///
/// # Examples
///
/// ```
/// use std::collections::BTreeMap;
/// use serde_json::json;
/// use sift_core::Metadata;
/// use sift_index::search::matches_filters;
///
/// let mut metadata = Metadata::new();
/// metadata.insert("file_origin".into(), json!("a.md"));
/// metadata.insert("chunk_index".into(), json!(3));
///
/// let mut filters = BTreeMap::new();
/// filters.insert("chunk_index".to_string(), "3".to_string());
/// assert!(matches_filters(&metadata, &filters));
///
/// filters.insert("file_origin".to_string(), "b.md".to_string());
/// assert!(!matches_filters(&metadata, &filters));
/// ```
pub fn matches_filters(metadata: &Metadata, filters: &BTreeMap<String, String>) -> bool {
    filters.iter().all(|(key, expected)| match metadata.get(key) {
        Some(serde_json::Value::String(s)) => s == expected,
        Some(other) => other.to_string() == *expected,
        None => false,
    })
}

/// Answers [`SearchRequest`]s against a shared [`VectorStore`].
pub struct Retriever {
    store: Arc<VectorStore>,
    embedder: Arc<dyn EmbeddingProvider>,
}

impl std::fmt::Debug for Retriever {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Retriever")
            .field("store", &self.store)
            .field("model", &self.embedder.model())
            .finish()
    }
}

impl Retriever {
    pub fn new(store: Arc<VectorStore>, embedder: Arc<dyn EmbeddingProvider>) -> Self {
        Self { store, embedder }
    }

    /// Run a query.
    ///
    /// Results keep the index's nearest-first order. Identifiers without
    /// metadata are skipped. An empty store yields an empty response.
    ///
    /// # Errors
    ///
    /// - [`SiftError::Config`] for `top_k == 0` or a non-finite threshold,
    ///   checked before the query is embedded
    /// - [`SiftError::Embedding`] if the provider fails
    /// - [`SiftError::DimensionMismatch`] if the query embedding does not
    ///   match the stored vectors
    pub async fn search(&self, request: &SearchRequest) -> Result<SearchResponse, SiftError> {
        request.validate()?;

        let query_embedding = self.embedder.embed_one(&request.query).await?;
        let hits = self.store.search_entries(&query_embedding, request.top_k)?;
        let candidates = hits.len();

        let mut results = Vec::with_capacity(candidates);
        for (neighbor, entry) in hits {
            let Some(entry) = entry else {
                tracing::warn!(id = neighbor.id, "no metadata for vector, skipping");
                continue;
            };
            let score = score_from_distance(neighbor.distance);
            if score < request.score_threshold {
                continue;
            }
            if !matches_filters(&entry.metadata, &request.metadata_filters) {
                continue;
            }
            let document_id = entry
                .metadata
                .get("file_origin")
                .and_then(|v| v.as_str())
                .map(str::to_string);
            results.push(SearchResult {
                id: neighbor.id,
                text: entry.chunk_text,
                score,
                distance: neighbor.distance,
                document_id,
                metadata: entry.metadata,
            });
        }

        tracing::debug!(
            query = %request.query,
            candidates,
            returned = results.len(),
            "search complete"
        );
        Ok(SearchResponse {
            total_results: results.len(),
            results,
            query_embedding,
        })
    }
}
