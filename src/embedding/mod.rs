//! Text embedding.
//!
//! Every vector handed to the scoring and index layers is unit-normalized, so
//! inner product equals cosine similarity.

// Hash-based pseudo-embeddings cast between integer and float domains.
#![allow(clippy::cast_precision_loss)]
#![allow(clippy::cast_possible_truncation)]

mod fastembed;

pub use fastembed::FastEmbedEmbedder;

use crate::{Error, Result};

/// Default embedding dimensions (all-MiniLM-L6-v2).
pub const DEFAULT_DIMENSIONS: usize = 384;

/// Trait for embedding generators.
pub trait Embedder: Send + Sync {
    /// Returns the embedding dimensions.
    fn dimensions(&self) -> usize;

    /// Generates a normalized embedding for the given text.
    ///
    /// # Errors
    ///
    /// Returns an error if embedding generation fails.
    fn embed(&self, text: &str) -> Result<Vec<f32>>;

    /// Generates embeddings for multiple texts.
    ///
    /// # Errors
    ///
    /// Returns an error if embedding generation fails.
    fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>> {
        texts.iter().map(|t| self.embed(t)).collect()
    }
}

/// Encodes `texts` in chunks of `batch_size`, checking every vector's length.
///
/// # Errors
///
/// Returns [`Error::DimensionMismatch`] if the backend returns a vector of the
/// wrong length, or the backend's own error.
pub fn encode_batched<E: Embedder + ?Sized>(
    embedder: &E,
    texts: &[&str],
    batch_size: usize,
) -> Result<Vec<Vec<f32>>> {
    let expected = embedder.dimensions();
    let mut vectors = Vec::with_capacity(texts.len());

    for chunk in texts.chunks(batch_size.max(1)) {
        let batch = embedder.embed_batch(chunk)?;
        if batch.len() != chunk.len() {
            return Err(Error::OperationFailed {
                operation: "embed_batch".to_string(),
                cause: format!("expected {} vectors, got {}", chunk.len(), batch.len()),
            });
        }
        for vector in batch {
            if vector.len() != expected {
                return Err(Error::DimensionMismatch {
                    expected,
                    actual: vector.len(),
                });
            }
            vectors.push(vector);
        }
    }

    Ok(vectors)
}

/// Scales a vector to unit length in place. Zero vectors are left unchanged.
pub fn normalize(vector: &mut [f32]) {
    let norm_sq: f32 = vector.iter().map(|x| x * x).sum();
    if norm_sq <= 0.0 {
        return;
    }
    let inv_norm = norm_sq.sqrt().recip();
    for v in vector.iter_mut() {
        *v *= inv_norm;
    }
}
