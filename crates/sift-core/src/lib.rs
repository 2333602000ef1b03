//! Core types, configuration, and error handling for sift.
//!
//! This crate provides the shared foundation used by the other sift crates:
//! - [`SiftError`]: unified error type using `thiserror`
//! - [`SiftConfig`]: configuration loaded from `.sift.toml`
//! - Shared types: [`SearchResult`], [`SearchResponse`], [`ChunkingStrategy`],
//!   [`Metadata`], [`OutputFormat`]

mod config;
mod error;
mod types;

pub use config::{
    EmbeddingConfig, EmbeddingProviderKind, IngestConfig, SearchConfig, SiftConfig, StoreConfig,
    MIN_CHUNK_SIZE,
};
pub use error::SiftError;
pub use types::{
    ChunkingStrategy, Metadata, OutputFormat, SearchResponse, SearchResult, VectorId,
};

/// A convenience `Result` type for sift operations.
pub type Result<T> = std::result::Result<T, SiftError>;
