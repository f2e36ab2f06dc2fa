//! Vector index trait.
//!
//! An index is built once over a fixed set of unit-normalized vectors and then
//! queried by inner product. Positions returned by [`VectorIndex::search`] are
//! the offsets of the vectors passed to [`VectorIndex::build`].
//!
//! # Available Implementations
//!
//! | Index | Use Case | Feature |
//! |-------|----------|---------|
//! | `FlatIndex` | Exact brute-force search | always |
//! | `UsearchIndex` | Approximate HNSW search over large vocabularies | `usearch-hnsw` |

use crate::Result;

/// Nearest-neighbor index over inner-product similarity.
pub trait VectorIndex: Send + Sync {
    /// Creates an empty index for vectors of the given dimension.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::InvalidInput`] for a zero dimension, or a backend error.
    fn with_dimensions(dimensions: usize) -> Result<Self>
    where
        Self: Sized;

    /// Returns the vector dimension.
    fn dimensions(&self) -> usize;

    /// Replaces the index contents with `vectors`.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::DimensionMismatch`] if any vector has the wrong length.
    fn build(&mut self, vectors: &[Vec<f32>]) -> Result<()>;

    /// Returns up to `k` `(position, score)` pairs, score descending.
    ///
    /// Equal scores keep ascending position order. An empty index yields an
    /// empty result.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::DimensionMismatch`] if the query has the wrong length.
    fn search(&self, query: &[f32], k: usize) -> Result<Vec<(usize, f32)>>;

    /// Returns the number of indexed vectors.
    fn len(&self) -> usize;

    /// Returns `true` if nothing is indexed.
    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
