//! Exact nearest-neighbour vector index.
//!
//! [`VectorIndex`] is the add/search contract the rest of the crate codes
//! against. [`FlatIndex`] implements it by brute force: every query is
//! compared against every stored vector using squared Euclidean distance,
//! so rankings are exact.

use std::cmp::Ordering;

use serde::{Deserialize, Serialize};
use sift_core::{SiftError, VectorId};

/// A search hit: vector identifier and squared Euclidean distance.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Neighbor {
    /// Identifier of the stored vector.
    pub id: VectorId,
    /// Squared Euclidean distance to the query.
    pub distance: f32,
}

/// Append-only vector index with k-nearest-neighbour search.
pub trait VectorIndex {
    /// Dimension fixed by the first add, or `None` while empty.
    fn dimension(&self) -> Option<usize>;

    /// Number of stored vectors.
    fn len(&self) -> usize;

    /// Whether no vectors are stored.
    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Append `vectors` and return the identifier of the first one.
    ///
    /// The batch receives the contiguous block
    /// `[start, start + vectors.len())`. Nothing is stored unless every
    /// vector is valid.
    ///
    /// # Errors
    ///
    /// Returns [`SiftError::EmptyBatch`] for an empty slice, or
    /// [`SiftError::DimensionMismatch`] if any vector's length differs from
    /// the index dimension.
    fn add(&mut self, vectors: &[Vec<f32>]) -> Result<VectorId, SiftError>;

    /// Return up to `k` nearest vectors, nearest first.
    ///
    /// Equal distances are ordered by lower identifier.
    ///
    /// # Errors
    ///
    /// Returns [`SiftError::Config`] if `k` is zero, or
    /// [`SiftError::DimensionMismatch`] if the query has the wrong length.
    fn search(&self, query: &[f32], k: usize) -> Result<Vec<Neighbor>, SiftError>;
}

/// Brute-force index over a single contiguous `f32` buffer.
///
/// # Examples
///
/// ```
/// use sift_index::vector::{FlatIndex, VectorIndex};
///
/// let mut index = FlatIndex::new();
/// let start = index
///     .add(&[vec![0.0, 0.0], vec![1.0, 0.0], vec![0.0, 2.0], vec![5.0, 5.0]])
///     .unwrap();
/// assert_eq!(start, 0);
///
/// let hits = index.search(&[0.0, 0.0], 3).unwrap();
/// let ids: Vec<u64> = hits.iter().map(|h| h.id).collect();
/// let distances: Vec<f32> = hits.iter().map(|h| h.distance).collect();
/// assert_eq!(ids, vec![0, 1, 2]);
/// assert_eq!(distances, vec![0.0, 1.0, 4.0]);
/// ```
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FlatIndex {
    dimension: Option<usize>,
    data: Vec<f32>,
}

impl FlatIndex {
    /// Create an empty index; the dimension is set by the first add.
    pub fn new() -> Self {
        Self::default()
    }

    /// Rebuild an index from its raw parts.
    ///
    /// # Errors
    ///
    /// Returns [`SiftError::Config`] if `dimension` is zero or `data` is not
    /// a whole number of vectors.
    pub fn from_raw(dimension: usize, data: Vec<f32>) -> Result<Self, SiftError> {
        if dimension == 0 {
            return Err(SiftError::config("from_raw", "dimension must be positive"));
        }
        if data.len() % dimension != 0 {
            return Err(SiftError::config(
                "from_raw",
                format!(
                    "{} values is not a multiple of dimension {dimension}",
                    data.len()
                ),
            ));
        }
        Ok(Self {
            dimension: Some(dimension),
            data,
        })
    }

    /// The stored vector with identifier `id`.
    pub fn vector(&self, id: VectorId) -> Option<&[f32]> {
        let dim = self.dimension?;
        let start = usize::try_from(id).ok()?.checked_mul(dim)?;
        self.data.get(start..start + dim)
    }

    /// All stored components, vector after vector.
    pub fn as_slice(&self) -> &[f32] {
        &self.data
    }

    fn check_dimension(&self, op: &'static str, actual: usize) -> Result<(), SiftError> {
        match self.dimension {
            Some(expected) if expected != actual => Err(SiftError::DimensionMismatch {
                op,
                expected,
                actual,
            }),
            _ => Ok(()),
        }
    }
}

impl VectorIndex for FlatIndex {
    fn dimension(&self) -> Option<usize> {
        self.dimension
    }

    fn len(&self) -> usize {
        match self.dimension {
            Some(dim) => self.data.len() / dim,
            None => 0,
        }
    }

    fn add(&mut self, vectors: &[Vec<f32>]) -> Result<VectorId, SiftError> {
        let Some(first) = vectors.first() else {
            return Err(SiftError::EmptyBatch { op: "add" });
        };
        if first.is_empty() {
            return Err(SiftError::config(
                "add",
                "vectors must have at least one component",
            ));
        }
        let dim = self.dimension.unwrap_or(first.len());
        for vector in vectors {
            if vector.len() != dim {
                return Err(SiftError::DimensionMismatch {
                    op: "add",
                    expected: dim,
                    actual: vector.len(),
                });
            }
        }

        let start = self.len() as VectorId;
        self.dimension = Some(dim);
        self.data.reserve(vectors.len() * dim);
        for vector in vectors {
            self.data.extend_from_slice(vector);
        }
        Ok(start)
    }

    fn search(&self, query: &[f32], k: usize) -> Result<Vec<Neighbor>, SiftError> {
        if k == 0 {
            return Err(SiftError::config("search", "k must be at least 1, got 0"));
        }
        let Some(dim) = self.dimension else {
            return Ok(Vec::new());
        };
        self.check_dimension("search", query.len())?;

        let mut hits: Vec<Neighbor> = self
            .data
            .chunks_exact(dim)
            .enumerate()
            .map(|(i, stored)| Neighbor {
                id: i as VectorId,
                distance: squared_l2(query, stored),
            })
            .collect();

        if hits.len() > k {
            hits.select_nth_unstable_by(k - 1, nearest_first);
            hits.truncate(k);
        }
        hits.sort_unstable_by(nearest_first);
        Ok(hits)
    }
}

fn nearest_first(a: &Neighbor, b: &Neighbor) -> Ordering {
    a.distance
        .total_cmp(&b.distance)
        .then_with(|| a.id.cmp(&b.id))
}

fn squared_l2(a: &[f32], b: &[f32]) -> f32 {
    a.iter()
        .zip(b)
        .map(|(x, y)| {
            let d = x - y;
            d * d
        })
        .sum()
}
