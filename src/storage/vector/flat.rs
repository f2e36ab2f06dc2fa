//! Exact inner-product index.

use crate::storage::traits::VectorIndex;
use crate::{Error, Result};

/// Brute-force index holding all vectors in one contiguous buffer.
///
/// Search is O(n·d); results are exact.
#[derive(Debug, Clone)]
pub struct FlatIndex {
    dimensions: usize,
    data: Vec<f32>,
}

impl FlatIndex {
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

impl VectorIndex for FlatIndex {
    fn with_dimensions(dimensions: usize) -> Result<Self> {
        if dimensions == 0 {
            return Err(Error::InvalidInput(
                "index dimension must be positive".to_string(),
            ));
        }
        Ok(Self {
            dimensions,
            data: Vec::new(),
        })
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }

    fn build(&mut self, vectors: &[Vec<f32>]) -> Result<()> {
        for vector in vectors {
            self.validate(vector)?;
        }
        self.data = vectors.iter().flatten().copied().collect();
        Ok(())
    }

    fn search(&self, query: &[f32], k: usize) -> Result<Vec<(usize, f32)>> {
        self.validate(query)?;

        let mut scored: Vec<(usize, f32)> = self
            .data
            .chunks_exact(self.dimensions)
            .enumerate()
            .map(|(pos, row)| (pos, row.iter().zip(query).map(|(a, b)| a * b).sum()))
            .collect();

        // Stable sort keeps ascending position order among equal scores.
        scored.sort_by(|a, b| b.1.total_cmp(&a.1));
        scored.truncate(k);
        Ok(scored)
    }

    fn len(&self) -> usize {
        self.data.len() / self.dimensions
    }
}
