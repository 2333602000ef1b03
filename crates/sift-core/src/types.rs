use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Identifier of a stored vector and its metadata entry.
///
/// Assigned in insertion order starting at 0 and never reused.
pub type VectorId = u64;

/// Arbitrary key/value metadata attached to a chunk.
pub type Metadata = BTreeMap<String, serde_json::Value>;

/// How a document is split into chunks.
///
/// # Examples
///
/// ```
/// use sift_core::ChunkingStrategy;
///
/// let strategy: ChunkingStrategy = "headings".parse().unwrap();
/// assert_eq!(strategy, ChunkingStrategy::Headings);
/// assert_eq!(strategy.to_string(), "headings");
/// ```
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChunkingStrategy {
    /// Fixed-size character windows with overlap.
    #[default]
    Length,
    /// One chunk per markdown heading (levels 1-3).
    Headings,
}

impl fmt::Display for ChunkingStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ChunkingStrategy::Length => write!(f, "length"),
            ChunkingStrategy::Headings => write!(f, "headings"),
        }
    }
}

impl FromStr for ChunkingStrategy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "length" => Ok(ChunkingStrategy::Length),
            "headings" => Ok(ChunkingStrategy::Headings),
            other => Err(format!("unknown chunking strategy: {other}")),
        }
    }
}

/// A single retrieval hit.
///
/// # Examples
///
/// ```
/// use sift_core::{Metadata, SearchResult};
///
/// let result = SearchResult {
///     id: 4,
///     text: "Rust has no garbage collector.".into(),
///     score: 0.8,
///     distance: 0.25,
///     document_id: Some("rust.md".into()),
///     metadata: Metadata::new(),
/// };
/// assert!(result.score > 0.5);
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchResult {
    /// Identifier of the matched vector.
    pub id: VectorId,
    /// Chunk text.
    pub text: String,
    /// Similarity in `(0, 1]`, higher is closer.
    pub score: f32,
    /// Squared Euclidean distance to the query.
    pub distance: f32,
    /// Source document, taken from the `file_origin` metadata key.
    pub document_id: Option<String>,
    /// Merged document and chunk metadata.
    pub metadata: Metadata,
}

/// Results of a retrieval query.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchResponse {
    /// Retained hits, nearest first.
    pub results: Vec<SearchResult>,
    /// Number of retained hits.
    pub total_results: usize,
    /// Embedding of the query text.
    pub query_embedding: Vec<f32>,
}

/// Output format for CLI subcommands.
///
/// Implements [`FromStr`] so it can be used directly with `clap` argument parsing.
///
/// # Examples
///
/// ```
/// use sift_core::OutputFormat;
///
/// let fmt: OutputFormat = "json".parse().unwrap();
/// assert_eq!(fmt, OutputFormat::Json);
///
/// let fmt: OutputFormat = "md".parse().unwrap();
/// assert_eq!(fmt, OutputFormat::Markdown);
/// ```
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    /// Human-readable summaries.
    #[default]
    Text,
    /// Machine-readable JSON with camelCase keys.
    Json,
    /// Markdown-formatted output.
    Markdown,
}

impl fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OutputFormat::Text => write!(f, "text"),
            OutputFormat::Json => write!(f, "json"),
            OutputFormat::Markdown => write!(f, "markdown"),
        }
    }
}

impl FromStr for OutputFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "text" => Ok(OutputFormat::Text),
            "json" => Ok(OutputFormat::Json),
            "markdown" | "md" => Ok(OutputFormat::Markdown),
            other => Err(format!("unknown output format: {other}")),
        }
    }
}
