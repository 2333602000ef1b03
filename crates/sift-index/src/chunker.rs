//! Text chunking for embedding.
//!
//! Two strategies: fixed-size character windows with overlap, and markdown
//! heading sections (levels 1-3). Fenced code blocks in markdown are
//! rewritten into a plain marker form before either strategy runs.

use std::sync::OnceLock;

use regex::Regex;
use serde::{Deserialize, Serialize};
use sift_core::{ChunkingStrategy, IngestConfig, SiftError};

use crate::document::Document;

/// Opening marker written in place of a code fence.
pub const CODE_BLOCK_START: &str = "--- CODE BLOCK ---";

/// Closing marker written in place of a code fence.
pub const CODE_BLOCK_END: &str = "--- END CODE BLOCK ---";

/// Deepest heading level that starts a new section.
const MAX_HEADING_LEVEL: usize = 3;

/// A span of document text that is embedded and retrieved as a unit.
///
/// # Examples
///
/// ```
/// use sift_index::chunker::Chunk;
///
/// let chunk = Chunk {
///     text: "## Install\ncargo install sift".into(),
///     document_id: "README.md".into(),
///     index: 1,
///     heading: Some("## Install".into()),
/// };
/// assert_eq!(chunk.index, 1);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Chunk {
    /// Chunk content.
    pub text: String,
    /// Identifier of the source document (its file name).
    pub document_id: String,
    /// Position of the chunk within its document, from 0.
    pub index: usize,
    /// Heading line the chunk sits under, for heading-based chunking.
    pub heading: Option<String>,
}

/// Splits documents according to an [`IngestConfig`].
///
/// # Examples
///
/// ```
/// use sift_core::IngestConfig;
/// use sift_index::chunker::Chunker;
/// use sift_index::document::Document;
///
/// let chunker = Chunker::new(&IngestConfig::default()).unwrap();
/// let doc = Document::plain("notes.txt", "short note");
/// let chunks = chunker.chunk_document(&doc).unwrap();
/// assert_eq!(chunks.len(), 1);
/// assert_eq!(chunks[0].document_id, "notes.txt");
/// ```
#[derive(Debug, Clone)]
pub struct Chunker {
    strategy: ChunkingStrategy,
    chunk_size: usize,
    chunk_overlap: usize,
}

impl Chunker {
    /// Build a chunker, validating the sizing parameters.
    ///
    /// # Errors
    ///
    /// Returns [`SiftError::Config`] if the config is out of bounds.
    pub fn new(config: &IngestConfig) -> Result<Self, SiftError> {
        config.validate()?;
        Ok(Self {
            strategy: config.chunking_strategy,
            chunk_size: config.chunk_size,
            chunk_overlap: config.chunk_overlap,
        })
    }

    /// The configured strategy.
    pub fn strategy(&self) -> ChunkingStrategy {
        self.strategy
    }

    /// Split a document into chunks.
    ///
    /// The heading strategy only applies to structured (markdown) documents;
    /// anything else is split by length.
    ///
    /// # Errors
    ///
    /// Returns [`SiftError::Config`] if length chunking rejects the sizing.
    pub fn chunk_document(&self, document: &Document) -> Result<Vec<Chunk>, SiftError> {
        let sections = match self.strategy {
            ChunkingStrategy::Headings if document.structured => heading_sections(&document.text),
            _ => chunk_by_length(&document.text, self.chunk_size, self.chunk_overlap)?
                .into_iter()
                .map(|text| Section {
                    heading: None,
                    text,
                })
                .collect(),
        };

        Ok(sections
            .into_iter()
            .enumerate()
            .map(|(index, section)| Chunk {
                text: section.text,
                document_id: document.id.clone(),
                index,
                heading: section.heading,
            })
            .collect())
    }
}

/// Split `text` into windows of `chunk_size` characters.
///
/// Windows start at `0, step, 2*step, ...` where
/// `step = chunk_size - chunk_overlap`, until the start reaches the end of
/// the text. The last window may be shorter. Sizes count Unicode scalar
/// values, not bytes.
///
/// # Errors
///
/// Returns [`SiftError::Config`] if `chunk_size` is zero or `chunk_overlap`
/// is not smaller than `chunk_size`.
///
/// # Examples
///
/// ```
/// use sift_index::chunker::chunk_by_length;
///
/// let chunks = chunk_by_length("abcdefghij", 4, 1).unwrap();
/// assert_eq!(chunks, vec!["abcd", "defg", "ghij", "j"]);
/// ```
pub fn chunk_by_length(
    text: &str,
    chunk_size: usize,
    chunk_overlap: usize,
) -> Result<Vec<String>, SiftError> {
    if chunk_size == 0 {
        return Err(SiftError::config(
            "chunk_by_length",
            "chunk_size must be positive, got 0",
        ));
    }
    if chunk_overlap >= chunk_size {
        return Err(SiftError::config(
            "chunk_by_length",
            format!("chunk_overlap ({chunk_overlap}) must be smaller than chunk_size ({chunk_size})"),
        ));
    }

    // Byte offset of every char boundary, including the end of the text.
    let bounds: Vec<usize> = text
        .char_indices()
        .map(|(i, _)| i)
        .chain(std::iter::once(text.len()))
        .collect();
    let char_count = bounds.len() - 1;
    let step = chunk_size - chunk_overlap;

    let mut chunks = Vec::with_capacity(char_count.div_ceil(step));
    let mut start = 0;
    while start < char_count {
        let end = (start + chunk_size).min(char_count);
        chunks.push(text[bounds[start]..bounds[end]].to_string());
        start += step;
    }
    Ok(chunks)
}

/// Split markdown into one chunk per heading of level 1-3.
///
/// Each chunk is the heading line plus the body up to the next heading of
/// level 1-3. Body text before the first heading becomes its own chunk.
/// Chunks are trimmed and empty ones dropped.
///
/// # Examples
///
/// ```
/// use sift_index::chunker::chunk_by_headings;
///
/// let chunks = chunk_by_headings("intro\n# A\nbody1\n## B\nbody2");
/// assert_eq!(chunks, vec!["intro", "# A\nbody1", "## B\nbody2"]);
/// ```
pub fn chunk_by_headings(text: &str) -> Vec<String> {
    heading_sections(text)
        .into_iter()
        .map(|section| section.text)
        .collect()
}

/// Rewrite fenced code blocks into plain marker form.
///
/// ```` ```lang\n<code>\n``` ```` becomes
/// `"\n--- CODE BLOCK ---\n<code>\n--- END CODE BLOCK ---\n"` with the code
/// trimmed. Applying it twice gives the same result as applying it once.
///
/// # Examples
///
/// ```
/// use sift_index::chunker::clean_code_blocks;
///
/// let cleaned = clean_code_blocks("before\n```rust\nfn main() {}\n```\nafter");
/// assert_eq!(
///     cleaned,
///     "before\n\n--- CODE BLOCK ---\nfn main() {}\n--- END CODE BLOCK ---\n\nafter"
/// );
/// ```
pub fn clean_code_blocks(text: &str) -> String {
    code_fence_pattern()
        .replace_all(text, |caps: &regex::Captures<'_>| {
            format!(
                "\n{CODE_BLOCK_START}\n{}\n{CODE_BLOCK_END}\n",
                caps[1].trim()
            )
        })
        .into_owned()
}

fn code_fence_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"(?s)```\w*\n(.*?)\n```").unwrap())
}

struct Section {
    heading: Option<String>,
    text: String,
}

fn heading_sections(text: &str) -> Vec<Section> {
    let mut sections = Vec::new();
    let mut heading: Option<String> = None;
    let mut current = String::new();

    for line in text.split_inclusive('\n') {
        if is_heading(line) {
            push_section(&mut sections, heading.take(), &current);
            current.clear();
            heading = Some(line.trim_end().to_string());
        }
        current.push_str(line);
    }
    push_section(&mut sections, heading, &current);

    sections
}

fn push_section(sections: &mut Vec<Section>, heading: Option<String>, raw: &str) {
    let text = raw.trim();
    if !text.is_empty() {
        sections.push(Section {
            heading,
            text: text.to_string(),
        });
    }
}

fn is_heading(line: &str) -> bool {
    let level = line.bytes().take_while(|&b| b == b'#').count();
    (1..=MAX_HEADING_LEVEL).contains(&level) && line[level..].starts_with(' ')
}
