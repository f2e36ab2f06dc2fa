//! usearch HNSW index.
//!
//! Approximate inner-product search for large concept vocabularies. Only
//! compiled with the `usearch-hnsw` feature.

use crate::storage::traits::VectorIndex;
use crate::{Error, Result};
use usearch::{Index, IndexOptions, MetricKind, ScalarKind};

/// HNSW connectivity parameter (M).
const HNSW_CONNECTIVITY: usize = 16;

/// HNSW expansion factor for construction (`ef_construction`).
const HNSW_EXPANSION_ADD: usize = 128;

/// HNSW expansion factor for search (`ef`).
const HNSW_EXPANSION_SEARCH: usize = 64;

/// HNSW index keyed by vector position.
pub struct UsearchIndex {
    dimensions: usize,
    index: Index,
}

impl UsearchIndex {
    fn options(dimensions: usize) -> IndexOptions {
        IndexOptions {
            dimensions,
            metric: MetricKind::IP,
            quantization: ScalarKind::F32,
            connectivity: HNSW_CONNECTIVITY,
            expansion_add: HNSW_EXPANSION_ADD,
            expansion_search: HNSW_EXPANSION_SEARCH,
            multi: false,
        }
    }

    fn validate(&self, vector: &[f32]) -> Result<()> {
        if vector.len() != self.dimensions {
            return Err(Error::DimensionMismatch {
                expected: self.dimensions,
                actual: vector.len(),
            });
        }
        Ok(())
    }
}

fn usearch_error(operation: &str, e: impl std::fmt::Display) -> Error {
    Error::OperationFailed {
        operation: operation.to_string(),
        cause: e.to_string(),
    }
}

impl VectorIndex for UsearchIndex {
    fn with_dimensions(dimensions: usize) -> Result<Self> {
        if dimensions == 0 {
            return Err(Error::InvalidInput(
                "index dimension must be positive".to_string(),
            ));
        }
        let index = Index::new(&Self::options(dimensions))
            .map_err(|e| usearch_error("create_usearch_index", e))?;
        Ok(Self { dimensions, index })
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }

    fn build(&mut self, vectors: &[Vec<f32>]) -> Result<()> {
        for vector in vectors {
            self.validate(vector)?;
        }

        self.index
            .reset()
            .map_err(|e| usearch_error("usearch_reset", e))?;
        self.index
            .reserve(vectors.len())
            .map_err(|e| usearch_error("reserve_usearch_capacity", e))?;

        for (pos, vector) in vectors.iter().enumerate() {
            self.index
                .add(pos as u64, vector.as_slice())
                .map_err(|e| usearch_error("usearch_add", e))?;
        }
        Ok(())
    }

    fn search(&self, query: &[f32], k: usize) -> Result<Vec<(usize, f32)>> {
        self.validate(query)?;
        if k == 0 || self.index.size() == 0 {
            return Ok(Vec::new());
        }

        let matches = self
            .index
            .search(query, k)
            .map_err(|e| usearch_error("usearch_search", e))?;

        // Inner-product distance is 1 - dot.
        #[allow(clippy::cast_possible_truncation)]
        let mut results: Vec<(usize, f32)> = matches
            .keys
            .iter()
            .zip(matches.distances.iter())
            .map(|(&key, &distance)| (key as usize, 1.0 - distance))
            .collect();

        results.sort_by(|a, b| b.1.total_cmp(&a.1).then(a.0.cmp(&b.0)));
        Ok(results)
    }

    fn len(&self) -> usize {
        self.index.size()
    }
}
