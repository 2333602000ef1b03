//! Write-once metadata keyed by vector identifier.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use sift_core::{Metadata, SiftError, VectorId};

/// Chunk text and metadata stored for one vector.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MetadataEntry {
    /// The chunk text that was embedded.
    pub chunk_text: String,
    /// Merged document and chunk metadata.
    pub metadata: Metadata,
}

/// Mapping from [`VectorId`] to [`MetadataEntry`].
///
/// Entries are written once and never updated or removed, mirroring the
/// append-only vector index.
///
/// # Examples
///
/// ```
/// use sift_core::Metadata;
/// use sift_index::metadata::MetadataStore;
///
/// let mut store = MetadataStore::new();
/// store.put(0, "hello".into(), Metadata::new()).unwrap();
/// assert_eq!(store.get(0).unwrap().chunk_text, "hello");
/// assert!(store.put(0, "again".into(), Metadata::new()).is_err());
/// ```
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MetadataStore {
    entries: BTreeMap<VectorId, MetadataEntry>,
}

impl MetadataStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Associate an entry with `id`.
    ///
    /// # Errors
    ///
    /// Returns [`SiftError::DuplicateIdentifier`] if `id` already has an
    /// entry; the existing entry is left untouched.
    pub fn put(
        &mut self,
        id: VectorId,
        chunk_text: String,
        metadata: Metadata,
    ) -> Result<(), SiftError> {
        if self.entries.contains_key(&id) {
            return Err(SiftError::DuplicateIdentifier { id });
        }
        self.entries.insert(
            id,
            MetadataEntry {
                chunk_text,
                metadata,
            },
        );
        Ok(())
    }

    /// Look up the entry for `id`.
    ///
    /// # Errors
    ///
    /// Returns [`SiftError::NotFound`] if there is none.
    pub fn get(&self, id: VectorId) -> Result<&MetadataEntry, SiftError> {
        self.entries.get(&id).ok_or(SiftError::NotFound { id })
    }

    /// Whether `id` has an entry.
    pub fn contains(&self, id: VectorId) -> bool {
        self.entries.contains_key(&id)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Entries in identifier order.
    pub fn iter(&self) -> impl Iterator<Item = (VectorId, &MetadataEntry)> {
        self.entries.iter().map(|(id, entry)| (*id, entry))
    }
}

impl FromIterator<(VectorId, MetadataEntry)> for MetadataStore {
    fn from_iter<T: IntoIterator<Item = (VectorId, MetadataEntry)>>(iter: T) -> Self {
        Self {
            entries: iter.into_iter().collect(),
        }
    }
}
