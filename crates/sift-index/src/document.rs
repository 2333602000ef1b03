//! Document loading: plain text and markdown with YAML front matter.

use std::path::{Path, PathBuf};

use sift_core::{Metadata, SiftError};

use crate::chunker::clean_code_blocks;

/// Files larger than this are skipped during discovery (10 MB).
const MAX_FILE_SIZE: u64 = 10 * 1_048_576;

/// Raw text plus document-level metadata, ready for chunking.
#[derive(Debug, Clone, PartialEq)]
pub struct Document {
    /// Document identifier (the file name).
    pub id: String,
    /// Text to chunk.
    pub text: String,
    /// Document-level metadata, e.g. parsed front matter.
    pub metadata: Metadata,
    /// Whether the text is markdown, which enables heading chunking.
    pub structured: bool,
}

/// Supported source formats, detected from the file extension.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DocumentKind {
    Markdown,
    PlainText,
}

impl DocumentKind {
    /// Detect the kind from a path's extension, if supported.
    ///
    /// # Examples
    ///
    /// ```
    /// use std::path::Path;
    /// use sift_index::document::DocumentKind;
    ///
    /// assert_eq!(DocumentKind::from_path(Path::new("a.md")), Some(DocumentKind::Markdown));
    /// assert_eq!(DocumentKind::from_path(Path::new("a.TXT")), Some(DocumentKind::PlainText));
    /// assert_eq!(DocumentKind::from_path(Path::new("a.pdf")), None);
    /// ```
    pub fn from_path(path: &Path) -> Option<Self> {
        let ext = path.extension()?.to_str()?.to_lowercase();
        match ext.as_str() {
            "md" | "markdown" => Some(DocumentKind::Markdown),
            "txt" => Some(DocumentKind::PlainText),
            _ => None,
        }
    }
}

impl Document {
    /// A plain-text document with no metadata.
    pub fn plain(id: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            text: text.into(),
            metadata: Metadata::new(),
            structured: false,
        }
    }

    /// A markdown body without front matter; code fences are cleaned.
    pub fn markdown(id: impl Into<String>, body: &str) -> Self {
        Self {
            id: id.into(),
            text: clean_code_blocks(body),
            metadata: Metadata::new(),
            structured: true,
        }
    }

    /// Parse a markdown source, lifting YAML front matter into metadata.
    ///
    /// # Errors
    ///
    /// Returns [`SiftError::Yaml`] if the front matter is not a YAML mapping.
    ///
    /// # Examples
    ///
    /// ```
    /// use sift_index::document::Document;
    ///
    /// let source = "---\ntitle: Hello\n---\n# Body\ntext";
    /// let doc = Document::parse_markdown("post.md", source).unwrap();
    /// assert_eq!(doc.metadata["title"], "Hello");
    /// assert_eq!(doc.text, "# Body\ntext");
    /// ```
    pub fn parse_markdown(id: impl Into<String>, source: &str) -> Result<Self, SiftError> {
        let (metadata, body) = match split_front_matter(source) {
            Some((yaml, body)) => (parse_front_matter(yaml)?, body),
            None => (Metadata::new(), source),
        };
        let mut doc = Self::markdown(id, body);
        doc.metadata = metadata;
        Ok(doc)
    }
}

/// Read a document from disk.
///
/// # Errors
///
/// Returns [`SiftError::Config`] for unsupported extensions, or
/// [`SiftError::Document`] naming `path` if the file cannot be read as UTF-8
/// or its front matter is malformed.
pub fn load_document(path: &Path) -> Result<Document, SiftError> {
    let kind = DocumentKind::from_path(path).ok_or_else(|| {
        SiftError::config(
            "load_document",
            format!("unsupported file type: {}", path.display()),
        )
    })?;
    let id = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string());
    let content =
        std::fs::read_to_string(path).map_err(|e| SiftError::document(path, e.to_string()))?;

    match kind {
        DocumentKind::Markdown => Document::parse_markdown(id, &content)
            .map_err(|e| SiftError::document(path, e.to_string())),
        DocumentKind::PlainText => Ok(Document::plain(id, content)),
    }
}

/// Find supported documents under `root`, respecting `.gitignore`.
///
/// A file path is returned as-is. Results are sorted so ingestion order is
/// stable across runs.
///
/// # Errors
///
/// Returns [`SiftError::Io`] if `root` does not exist.
pub fn discover_documents(root: &Path) -> Result<Vec<PathBuf>, SiftError> {
    let meta = std::fs::metadata(root)?;
    if meta.is_file() {
        return Ok(vec![root.to_path_buf()]);
    }

    let mut files = Vec::new();
    for entry in ignore::WalkBuilder::new(root).build() {
        let entry = match entry {
            Ok(e) => e,
            Err(e) => {
                tracing::debug!(error = %e, "skipping unreadable entry");
                continue;
            }
        };
        if !entry.file_type().is_some_and(|t| t.is_file()) {
            continue;
        }
        let path = entry.path();
        if DocumentKind::from_path(path).is_none() {
            continue;
        }
        match std::fs::metadata(path) {
            Ok(m) if m.len() <= MAX_FILE_SIZE => files.push(path.to_path_buf()),
            Ok(_) => tracing::debug!(path = %path.display(), "skipping oversized file"),
            Err(_) => continue,
        }
    }

    files.sort();
    Ok(files)
}

fn split_front_matter(source: &str) -> Option<(&str, &str)> {
    let rest = source
        .strip_prefix("---\n")
        .or_else(|| source.strip_prefix("---\r\n"))?;

    let mut offset = 0;
    for line in rest.split_inclusive('\n') {
        if line.trim_end() == "---" {
            return Some((&rest[..offset], &rest[offset + line.len()..]));
        }
        offset += line.len();
    }
    None
}

fn parse_front_matter(yaml: &str) -> Result<Metadata, SiftError> {
    if yaml.trim().is_empty() {
        return Ok(Metadata::new());
    }
    Ok(serde_yaml::from_str(yaml)?)
}
