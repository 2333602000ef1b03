//! Local semantic retrieval: chunking, embeddings, and exact vector search.
//!
//! Documents are split into chunks, embedded through an
//! [`embedding::EmbeddingProvider`], and stored in a [`store::VectorStore`]
//! that pairs a brute-force L2 index with per-chunk metadata. The
//! [`search::Retriever`] answers natural-language queries against that store
//! with score thresholds and metadata filters.

pub mod chunker;
pub mod document;
pub mod embedding;
pub mod ingest;
pub mod metadata;
pub mod persist;
pub mod search;
pub mod store;
pub mod vector;
