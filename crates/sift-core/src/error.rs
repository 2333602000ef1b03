use std::path::PathBuf;

/// Errors that can occur across the sift workspace.
///
/// Each variant names the failing operation and the offending value so the
/// message is useful on its own. Library crates use this type directly; the
/// binary reports them through `miette`.
///
/// # Examples
///
/// ```
/// use sift_core::SiftError;
///
/// let err = SiftError::config("search", "top_k must be at least 1, got 0");
/// assert!(err.to_string().contains("top_k"));
/// ```
#[derive(Debug, thiserror::Error, miette::Diagnostic)]
pub enum SiftError {
    /// Invalid caller-supplied parameters.
    #[error("{op}: invalid configuration: {message}")]
    #[diagnostic(code(sift::config))]
    Config {
        /// Operation that rejected the parameters.
        op: &'static str,
        /// What was wrong, including the offending value.
        message: String,
    },

    /// A vector does not have the dimension the index was created with.
    #[error("{op}: dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch {
        /// Operation that received the vector.
        op: &'static str,
        /// Dimension established by the index.
        expected: usize,
        /// Dimension of the offending vector.
        actual: usize,
    },

    /// An add was attempted with zero vectors.
    #[error("{op}: batch is empty")]
    EmptyBatch {
        /// Operation that received the batch.
        op: &'static str,
    },

    /// Parallel add inputs disagree in length.
    #[error(
        "add: batch length mismatch: {chunks} chunks, {vectors} vectors, {metadatas} metadata entries"
    )]
    BatchLengthMismatch {
        /// Number of chunk texts.
        chunks: usize,
        /// Number of vectors.
        vectors: usize,
        /// Number of metadata maps.
        metadatas: usize,
    },

    /// An identifier was written to the metadata store twice.
    #[error("put: duplicate identifier {id}")]
    DuplicateIdentifier {
        /// The reused identifier.
        id: u64,
    },

    /// A metadata lookup missed.
    #[error("get: identifier {id} not found")]
    NotFound {
        /// The missing identifier.
        id: u64,
    },

    /// Embedding provider failure.
    #[error("embedding error: {0}")]
    #[diagnostic(
        code(sift::embedding),
        help("check that the provider is running and [embedding] in .sift.toml points at it")
    )]
    Embedding(String),

    /// A source document could not be read or parsed.
    #[error("load_document: cannot read {}: {message}", .path.display())]
    Document {
        /// The offending file.
        path: PathBuf,
        /// What went wrong.
        message: String,
    },

    /// Persistence artifacts are missing, unreadable or disagree.
    #[error("load: corrupt state in {}: {message}", .artifact.display())]
    #[diagnostic(
        code(sift::corrupt_state),
        help("remove both store artifacts and re-run `sift ingest`")
    )]
    CorruptState {
        /// The artifact that failed.
        artifact: PathBuf,
        /// What was wrong with it.
        message: String,
    },

    /// Metadata database failure.
    #[error("database error: {0}")]
    Database(String),

    /// Filesystem I/O failure.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization / deserialization failure.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// YAML front matter parse failure.
    #[error("front matter parse error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// TOML deserialization failure.
    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),
}

impl SiftError {
    /// Shorthand for [`SiftError::Config`].
    pub fn config(op: &'static str, message: impl Into<String>) -> Self {
        Self::Config {
            op,
            message: message.into(),
        }
    }

    /// Shorthand for [`SiftError::Document`].
    pub fn document(path: impl Into<PathBuf>, message: impl Into<String>) -> Self {
        Self::Document {
            path: path.into(),
            message: message.into(),
        }
    }

    /// Shorthand for [`SiftError::CorruptState`].
    pub fn corrupt(artifact: impl Into<PathBuf>, message: impl Into<String>) -> Self {
        Self::CorruptState {
            artifact: artifact.into(),
            message: message.into(),
        }
    }
}
