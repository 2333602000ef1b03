//! Document ingestion: chunk, embed, and commit to the store.

use std::path::Path;
use std::sync::Arc;

use serde::Serialize;
use sift_core::{Metadata, SiftError};

use crate::chunker::Chunker;
use crate::document::{discover_documents, load_document, Document};
use crate::embedding::EmbeddingProvider;
use crate::store::VectorStore;

/// Counts from an ingestion run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct IngestReport {
    /// Documents that produced at least one chunk.
    pub documents: usize,
    /// Chunks added to the store.
    pub chunks: usize,
    /// Discovered files that could not be read and were skipped.
    pub skipped: usize,
}

impl IngestReport {
    fn absorb(&mut self, other: IngestReport) {
        self.documents += other.documents;
        self.chunks += other.chunks;
        self.skipped += other.skipped;
    }
}

/// Feeds documents into a [`VectorStore`].
pub struct Ingestor {
    store: Arc<VectorStore>,
    embedder: Arc<dyn EmbeddingProvider>,
    chunker: Chunker,
}

impl std::fmt::Debug for Ingestor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Ingestor")
            .field("model", &self.embedder.model())
            .field("chunker", &self.chunker)
            .finish()
    }
}

impl Ingestor {
    pub fn new(
        store: Arc<VectorStore>,
        embedder: Arc<dyn EmbeddingProvider>,
        chunker: Chunker,
    ) -> Self {
        Self {
            store,
            embedder,
            chunker,
        }
    }

    /// Chunk, embed and store one document.
    ///
    /// Every chunk gets the document's metadata plus `file_origin`,
    /// `chunk_index` and, for heading chunks, `heading`. All chunks are
    /// embedded before anything is stored, so a provider failure leaves the
    /// store untouched. Does not save.
    ///
    /// # Errors
    ///
    /// Returns [`SiftError::Embedding`] if the provider fails, or any error
    /// from [`VectorStore::add`].
    pub async fn ingest_document(&self, document: &Document) -> Result<IngestReport, SiftError> {
        let chunks = self.chunker.chunk_document(document)?;
        if chunks.is_empty() {
            tracing::debug!(document = %document.id, "no chunks, skipping");
            return Ok(IngestReport::default());
        }

        let texts: Vec<String> = chunks.iter().map(|c| c.text.clone()).collect();
        let vectors = self.embedder.embed_many(&texts).await?;

        let metadatas: Vec<Metadata> = chunks
            .iter()
            .map(|chunk| {
                let mut metadata = document.metadata.clone();
                metadata.insert("file_origin".into(), document.id.clone().into());
                metadata.insert("chunk_index".into(), chunk.index.into());
                if let Some(heading) = &chunk.heading {
                    metadata.insert("heading".into(), heading.clone().into());
                }
                metadata
            })
            .collect();

        let count = texts.len();
        let start = self.store.add(texts, &vectors, metadatas)?;
        tracing::info!(document = %document.id, chunks = count, start, "ingested document");

        Ok(IngestReport {
            documents: 1,
            chunks: count,
            skipped: 0,
        })
    }

    /// Ingest a file, or every supported file under a directory, then save.
    ///
    /// When walking a directory, files that cannot be read are logged,
    /// counted in [`IngestReport::skipped`] and passed over.
    ///
    /// # Errors
    ///
    /// Returns the load error when `path` is a single unreadable file. An
    /// ingest failure (e.g. [`SiftError::Embedding`]) stops the run; the
    /// documents committed before it are saved first.
    pub async fn ingest_path(&self, path: &Path) -> Result<IngestReport, SiftError> {
        let files = discover_documents(path)?;
        let walking = path.is_dir();
        tracing::info!(path = %path.display(), files = files.len(), "ingesting");

        let mut report = IngestReport::default();
        for file in &files {
            let document = match load_document(file) {
                Ok(document) => document,
                Err(e) if walking => {
                    tracing::warn!(path = %file.display(), error = %e, "skipping document");
                    report.skipped += 1;
                    continue;
                }
                Err(e) => return Err(e),
            };
            match self.ingest_document(&document).await {
                Ok(done) => report.absorb(done),
                Err(e) => {
                    if report.chunks > 0 {
                        self.store.save()?;
                    }
                    return Err(e);
                }
            }
        }

        self.store.save()?;
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::persist::ArtifactPaths;
    use async_trait::async_trait;
    use serde_json::json;
    use sift_core::{ChunkingStrategy, IngestConfig};

    /// Embeds each text as `[len, 1.0]`.
    struct LengthEmbedder;

    #[async_trait]
    impl EmbeddingProvider for LengthEmbedder {
        fn model(&self) -> &str {
            "length"
        }

        async fn embed_one(&self, text: &str) -> Result<Vec<f32>, SiftError> {
            Ok(vec![text.chars().count() as f32, 1.0])
        }

        async fn embed_many(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, SiftError> {
            let mut out = Vec::with_capacity(texts.len());
            for text in texts {
                out.push(self.embed_one(text).await?);
            }
            Ok(out)
        }
    }

    struct DownEmbedder;

    #[async_trait]
    impl EmbeddingProvider for DownEmbedder {
        fn model(&self) -> &str {
            "down"
        }

        async fn embed_one(&self, _text: &str) -> Result<Vec<f32>, SiftError> {
            Err(SiftError::Embedding("connection refused".into()))
        }

        async fn embed_many(&self, _texts: &[String]) -> Result<Vec<Vec<f32>>, SiftError> {
            Err(SiftError::Embedding("connection refused".into()))
        }
    }

    fn store_in(dir: &tempfile::TempDir) -> Arc<VectorStore> {
        Arc::new(VectorStore::new(ArtifactPaths::new(
            dir.path().join(".sift/vs.idx"),
            dir.path().join(".sift/meta.db"),
        )))
    }

    fn headings_chunker() -> Chunker {
        Chunker::new(&IngestConfig {
            chunking_strategy: ChunkingStrategy::Headings,
            ..IngestConfig::default()
        })
        .unwrap()
    }

    #[tokio::test]
    async fn chunks_carry_document_and_chunk_metadata() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_in(&dir);
        let ingestor = Ingestor::new(store.clone(), Arc::new(LengthEmbedder), headings_chunker());

        let source = "---\nauthor: kim\n---\nintro\n# A\nbody1\n## B\nbody2";
        let doc = Document::parse_markdown("guide.md", source).unwrap();
        let report = ingestor.ingest_document(&doc).await.unwrap();
        assert_eq!(report.documents, 1);
        assert_eq!(report.chunks, 3);

        let first = store.get(0).unwrap();
        assert_eq!(first.chunk_text, "intro");
        assert_eq!(first.metadata["author"], "kim");
        assert_eq!(first.metadata["file_origin"], "guide.md");
        assert_eq!(first.metadata["chunk_index"], 0);
        assert!(!first.metadata.contains_key("heading"));

        let second = store.get(1).unwrap();
        assert_eq!(second.chunk_text, "# A\nbody1");
        assert_eq!(second.metadata["heading"], json!("# A"));
        assert_eq!(second.metadata["chunk_index"], 1);
    }

    #[tokio::test]
    async fn chunk_fields_override_front_matter() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_in(&dir);
        let chunker = Chunker::new(&IngestConfig::default()).unwrap();
        let ingestor = Ingestor::new(store.clone(), Arc::new(LengthEmbedder), chunker);

        let source = "---\nfile_origin: fake.md\n---\nbody";
        let doc = Document::parse_markdown("real.md", source).unwrap();
        ingestor.ingest_document(&doc).await.unwrap();
        assert_eq!(store.get(0).unwrap().metadata["file_origin"], "real.md");
    }

    #[tokio::test]
    async fn embedding_failure_leaves_store_unchanged() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_in(&dir);
        let chunker = Chunker::new(&IngestConfig::default()).unwrap();
        let ingestor = Ingestor::new(store.clone(), Arc::new(DownEmbedder), chunker);

        let err = ingestor
            .ingest_document(&Document::plain("a.txt", "some text"))
            .await
            .unwrap_err();
        assert!(matches!(err, SiftError::Embedding(_)));
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn empty_document_is_a_no_op() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_in(&dir);
        let chunker = Chunker::new(&IngestConfig::default()).unwrap();
        let ingestor = Ingestor::new(store.clone(), Arc::new(DownEmbedder), chunker);

        let report = ingestor.ingest_document(&Document::plain("e.txt", "")).await.unwrap();
        assert_eq!(report, IngestReport::default());
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn ingest_path_walks_directory_and_saves() {
        let dir = tempfile::tempdir().unwrap();
        let docs = dir.path().join("docs");
        std::fs::create_dir_all(docs.join("nested")).unwrap();
        std::fs::write(docs.join("one.md"), "# One\nfirst").unwrap();
        std::fs::write(docs.join("nested/two.txt"), "second").unwrap();
        std::fs::write(docs.join("skip.bin"), "binary").unwrap();

        let store = store_in(&dir);
        let ingestor = Ingestor::new(store.clone(), Arc::new(LengthEmbedder), headings_chunker());
        let report = ingestor.ingest_path(&docs).await.unwrap();

        assert_eq!(
            report,
            IngestReport {
                documents: 2,
                chunks: 2,
                skipped: 0
            }
        );
        assert!(store.paths().index.exists());
        assert!(store.paths().metadata.exists());

        let reloaded = VectorStore::open(store.paths().clone()).unwrap();
        assert_eq!(reloaded.len(), 2);
        // "nested/" sorts before "one.md".
        assert_eq!(reloaded.get(0).unwrap().metadata["file_origin"], "two.txt");
        assert_eq!(reloaded.get(1).unwrap().metadata["heading"], "# One");
    }

    #[tokio::test]
    async fn unreadable_file_in_directory_is_skipped() {
        let dir = tempfile::tempdir().unwrap();
        let docs = dir.path().join("docs");
        std::fs::create_dir_all(&docs).unwrap();
        std::fs::write(docs.join("a_good.md"), "# Good\nmarkdown").unwrap();
        std::fs::write(docs.join("b_good.txt"), "plain text").unwrap();
        std::fs::write(docs.join("c_latin1.txt"), b"caf\xE9").unwrap();

        let store = store_in(&dir);
        let chunker = Chunker::new(&IngestConfig::default()).unwrap();
        let ingestor = Ingestor::new(store.clone(), Arc::new(LengthEmbedder), chunker);
        let report = ingestor.ingest_path(&docs).await.unwrap();

        assert_eq!(report.documents, 2);
        assert_eq!(report.skipped, 1);
        let reloaded = VectorStore::open(store.paths().clone()).unwrap();
        assert_eq!(reloaded.len(), 2);
    }

    #[tokio::test]
    async fn unreadable_single_file_names_the_file() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("latin1.txt");
        std::fs::write(&file, b"caf\xE9").unwrap();

        let store = store_in(&dir);
        let chunker = Chunker::new(&IngestConfig::default()).unwrap();
        let ingestor = Ingestor::new(store.clone(), Arc::new(LengthEmbedder), chunker);
        match ingestor.ingest_path(&file).await {
            Err(SiftError::Document { path, .. }) => assert_eq!(path, file),
            other => panic!("expected Document error, got {other:?}"),
        }
    }

    /// Fails on any text containing "offline".
    struct FlakyEmbedder;

    #[async_trait]
    impl EmbeddingProvider for FlakyEmbedder {
        fn model(&self) -> &str {
            "flaky"
        }

        async fn embed_one(&self, text: &str) -> Result<Vec<f32>, SiftError> {
            if text.contains("offline") {
                return Err(SiftError::Embedding("provider went away".into()));
            }
            Ok(vec![text.len() as f32])
        }

        async fn embed_many(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, SiftError> {
            let mut out = Vec::with_capacity(texts.len());
            for text in texts {
                out.push(self.embed_one(text).await?);
            }
            Ok(out)
        }
    }

    #[tokio::test]
    async fn embedding_failure_mid_run_keeps_earlier_documents() {
        let dir = tempfile::tempdir().unwrap();
        let docs = dir.path().join("docs");
        std::fs::create_dir_all(&docs).unwrap();
        std::fs::write(docs.join("a.txt"), "first document").unwrap();
        std::fs::write(docs.join("b.txt"), "went offline here").unwrap();
        std::fs::write(docs.join("c.txt"), "never reached").unwrap();

        let store = store_in(&dir);
        let chunker = Chunker::new(&IngestConfig::default()).unwrap();
        let ingestor = Ingestor::new(store.clone(), Arc::new(FlakyEmbedder), chunker);
        let err = ingestor.ingest_path(&docs).await.unwrap_err();
        assert!(matches!(err, SiftError::Embedding(_)));

        let reloaded = VectorStore::open(store.paths().clone()).unwrap();
        assert_eq!(reloaded.len(), 1);
        assert_eq!(reloaded.get(0).unwrap().chunk_text, "first document");
    }

    #[tokio::test]
    async fn unsupported_single_file_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("scan.pdf");
        std::fs::write(&file, "%PDF").unwrap();

        let store = store_in(&dir);
        let chunker = Chunker::new(&IngestConfig::default()).unwrap();
        let ingestor = Ingestor::new(store.clone(), Arc::new(LengthEmbedder), chunker);
        assert!(matches!(
            ingestor.ingest_path(&file).await,
            Err(SiftError::Config { .. })
        ));
        assert!(!store.paths().index.exists());
    }
}
