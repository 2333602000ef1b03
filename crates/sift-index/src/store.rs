//! The vector store: index and metadata behind a single reader/writer lock.
//!
//! Adds and saves take the lock exclusively; searches and lookups share it.
//! An add either changes both the index and the metadata store or neither.

use parking_lot::RwLock;
use serde::Serialize;
use sift_core::{Metadata, SiftError, VectorId};

use crate::metadata::{MetadataEntry, MetadataStore};
use crate::persist::{self, ArtifactPaths};
use crate::vector::{FlatIndex, Neighbor, VectorIndex};

#[derive(Debug, Default)]
struct State {
    index: FlatIndex,
    metadata: MetadataStore,
}

/// Summary of a store, as reported by `sift stats`.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StoreStats {
    pub vectors: usize,
    pub dimension: Option<usize>,
    pub index_path: String,
    pub metadata_path: String,
}

/// Shared handle over the vector index and its metadata.
///
/// Wrap in an `Arc` to share between the ingestor and the retriever.
///
/// # Examples
///
/// ```
/// use sift_core::Metadata;
/// use sift_index::persist::ArtifactPaths;
/// use sift_index::store::VectorStore;
///
/// let store = VectorStore::new(ArtifactPaths::new("idx", "meta.db"));
/// let start = store
///     .add(
///         vec!["alpha".into(), "beta".into()],
///         &[vec![0.0, 0.0], vec![1.0, 1.0]],
///         vec![Metadata::new(), Metadata::new()],
///     )
///     .unwrap();
/// assert_eq!(start, 0);
/// assert_eq!(store.get(1).unwrap().chunk_text, "beta");
/// ```
#[derive(Debug)]
pub struct VectorStore {
    paths: ArtifactPaths,
    inner: RwLock<State>,
}

impl VectorStore {
    /// An empty store that will persist to `paths`.
    pub fn new(paths: ArtifactPaths) -> Self {
        Self {
            paths,
            inner: RwLock::new(State::default()),
        }
    }

    /// Create a store and load any artifacts already at `paths`.
    ///
    /// # Errors
    ///
    /// See [`VectorStore::load`].
    pub fn open(paths: ArtifactPaths) -> Result<Self, SiftError> {
        let store = Self::new(paths);
        store.load()?;
        Ok(store)
    }

    /// Assemble a store without cross-checking index and metadata.
    #[cfg(test)]
    pub(crate) fn from_parts(
        paths: ArtifactPaths,
        index: FlatIndex,
        metadata: MetadataStore,
    ) -> Self {
        Self {
            paths,
            inner: RwLock::new(State { index, metadata }),
        }
    }

    pub fn paths(&self) -> &ArtifactPaths {
        &self.paths
    }

    /// Append a batch of chunks with their vectors and metadata.
    ///
    /// Returns the identifier of the first vector; the batch occupies
    /// `[start, start + chunks.len())`. Each metadata entry stores the chunk
    /// text alongside the caller's metadata.
    ///
    /// # Errors
    ///
    /// - [`SiftError::BatchLengthMismatch`] if the three inputs differ in length
    /// - [`SiftError::EmptyBatch`] if they are empty
    /// - [`SiftError::DimensionMismatch`] if any vector has the wrong length
    /// - [`SiftError::DuplicateIdentifier`] if a reserved id already has metadata
    ///
    /// The store is unchanged on every error.
    pub fn add(
        &self,
        chunks: Vec<String>,
        vectors: &[Vec<f32>],
        metadatas: Vec<Metadata>,
    ) -> Result<VectorId, SiftError> {
        if chunks.len() != vectors.len() || chunks.len() != metadatas.len() {
            return Err(SiftError::BatchLengthMismatch {
                chunks: chunks.len(),
                vectors: vectors.len(),
                metadatas: metadatas.len(),
            });
        }
        if chunks.is_empty() {
            return Err(SiftError::EmptyBatch { op: "add" });
        }

        let mut state = self.inner.write();
        let next = state.index.len() as VectorId;
        let reserved = next..next + chunks.len() as VectorId;
        if let Some(id) = reserved.into_iter().find(|id| state.metadata.contains(*id)) {
            return Err(SiftError::DuplicateIdentifier { id });
        }

        // The index validates every vector before storing any.
        let start = state.index.add(vectors)?;
        for (offset, (chunk, metadata)) in chunks.into_iter().zip(metadatas).enumerate() {
            state.metadata.put(start + offset as VectorId, chunk, metadata)?;
        }

        tracing::debug!(start, count = vectors.len(), "added batch");
        Ok(start)
    }

    /// Nearest stored vectors to `query`; see [`VectorIndex::search`].
    ///
    /// # Errors
    ///
    /// Returns [`SiftError::Config`] for `k == 0` or
    /// [`SiftError::DimensionMismatch`] for a query of the wrong length.
    pub fn search(&self, query: &[f32], k: usize) -> Result<Vec<Neighbor>, SiftError> {
        self.inner.read().index.search(query, k)
    }

    /// A copy of the metadata entry for `id`.
    ///
    /// # Errors
    ///
    /// Returns [`SiftError::NotFound`] if `id` has no entry.
    pub fn get(&self, id: VectorId) -> Result<MetadataEntry, SiftError> {
        self.inner.read().metadata.get(id).cloned()
    }

    /// Nearest neighbours paired with their metadata, read under one lock.
    ///
    /// A concurrent add cannot land between the search and the lookups.
    /// The entry is `None` for an identifier without metadata.
    ///
    /// # Errors
    ///
    /// As [`VectorStore::search`].
    pub fn search_entries(
        &self,
        query: &[f32],
        k: usize,
    ) -> Result<Vec<(Neighbor, Option<MetadataEntry>)>, SiftError> {
        let state = self.inner.read();
        let neighbors = state.index.search(query, k)?;
        Ok(neighbors
            .into_iter()
            .map(|n| {
                let entry = state.metadata.get(n.id).ok().cloned();
                (n, entry)
            })
            .collect())
    }

    pub fn len(&self) -> usize {
        self.inner.read().index.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Vector dimension, or `None` before the first add.
    pub fn dimension(&self) -> Option<usize> {
        self.inner.read().index.dimension()
    }

    pub fn stats(&self) -> StoreStats {
        let state = self.inner.read();
        StoreStats {
            vectors: state.index.len(),
            dimension: state.index.dimension(),
            index_path: self.paths.index.display().to_string(),
            metadata_path: self.paths.metadata.display().to_string(),
        }
    }

    /// Persist both artifacts. Serialised with [`VectorStore::add`].
    ///
    /// # Errors
    ///
    /// Returns [`SiftError::Io`] or [`SiftError::Database`] on write failure.
    pub fn save(&self) -> Result<(), SiftError> {
        let state = self.inner.write();
        persist::save(&self.paths, &state.index, &state.metadata)
    }

    /// Replace in-memory state with the persisted artifacts.
    ///
    /// Missing artifacts yield an empty store. State is only replaced when
    /// both artifacts load and agree, so a failed load leaves the store as
    /// it was. Loading twice gives the same state.
    ///
    /// # Errors
    ///
    /// Returns [`SiftError::CorruptState`] naming the offending artifact.
    pub fn load(&self) -> Result<(), SiftError> {
        let mut state = self.inner.write();
        match persist::load(&self.paths)? {
            Some((index, metadata)) => {
                state.index = index;
                state.metadata = metadata;
            }
            None => {
                tracing::debug!(
                    index = %self.paths.index.display(),
                    "no artifacts, starting empty"
                );
                *state = State::default();
            }
        }
        Ok(())
    }
}
