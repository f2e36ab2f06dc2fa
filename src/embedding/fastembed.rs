//! FastEmbed-based embedder.
//!
//! With the `fastembed-embeddings` feature this runs all-MiniLM-L6-v2 through
//! fastembed-rs. Without it, a deterministic hash-based pseudo-embedding keeps
//! the pipeline usable for tests and offline runs.

use super::{DEFAULT_DIMENSIONS, Embedder};
use crate::Result;

/// Default number of texts per backend call.
const DEFAULT_BATCH_SIZE: usize = 32;

#[cfg(feature = "fastembed-embeddings")]
mod native {
    use super::{DEFAULT_BATCH_SIZE, DEFAULT_DIMENSIONS, Embedder, Result};
    use crate::Error;
    use std::panic::{AssertUnwindSafe, catch_unwind};
    use std::sync::{Mutex, OnceLock};
    use std::time::Instant;

    static EMBEDDING_MODEL: OnceLock<Mutex<fastembed::TextEmbedding>> = OnceLock::new();

    /// `FastEmbed` embedder using all-MiniLM-L6-v2.
    ///
    /// The model is loaded lazily on the first embed call and shared by all
    /// instances in the process.
    pub struct FastEmbedEmbedder {
        batch_size: usize,
    }

    impl FastEmbedEmbedder {
        /// Embedding dimensions of the model.
        pub const DEFAULT_DIMENSIONS: usize = DEFAULT_DIMENSIONS;

        /// Creates an embedder with the default batch size.
        #[must_use]
        pub const fn new() -> Self {
            Self {
                batch_size: DEFAULT_BATCH_SIZE,
            }
        }

        /// Sets the number of texts encoded per model call.
        #[must_use]
        pub const fn with_batch_size(mut self, batch_size: usize) -> Self {
            self.batch_size = if batch_size == 0 { 1 } else { batch_size };
            self
        }

        /// Returns the model name.
        #[must_use]
        pub const fn model_name(&self) -> &'static str {
            "all-MiniLM-L6-v2"
        }

        fn get_model() -> Result<&'static Mutex<fastembed::TextEmbedding>> {
            if let Some(model) = EMBEDDING_MODEL.get() {
                return Ok(model);
            }

            tracing::info!("Loading embedding model (first use)...");
            let start = Instant::now();

            let options = fastembed::InitOptions::new(fastembed::EmbeddingModel::AllMiniLML6V2)
                .with_show_download_progress(false);
            let model =
                fastembed::TextEmbedding::try_new(options).map_err(|e| Error::OperationFailed {
                    operation: "load_embedding_model".to_string(),
                    cause: e.to_string(),
                })?;

            tracing::info!(
                elapsed_ms = u64::try_from(start.elapsed().as_millis()).unwrap_or(u64::MAX),
                model = "all-MiniLM-L6-v2",
                "Embedding model loaded"
            );

            let _ = EMBEDDING_MODEL.set(Mutex::new(model));
            EMBEDDING_MODEL.get().ok_or_else(|| Error::OperationFailed {
                operation: "get_embedding_model".to_string(),
                cause: "model initialization race".to_string(),
            })
        }

        fn run(&self, texts: Vec<String>, operation: &str) -> Result<Vec<Vec<f32>>> {
            let model = Self::get_model()?;
            let count = texts.len();
            let batch_size = self.batch_size;

            // ONNX runtime can panic on malformed inputs.
            let result = catch_unwind(AssertUnwindSafe(|| {
                let mut guard = model.lock().map_err(|e| Error::OperationFailed {
                    operation: operation.to_string(),
                    cause: e.to_string(),
                })?;
                guard
                    .embed(texts, Some(batch_size))
                    .map_err(|e| Error::OperationFailed {
                        operation: operation.to_string(),
                        cause: e.to_string(),
                    })
            }));

            result.map_err(|panic_info| {
                let panic_msg = panic_info
                    .downcast_ref::<&str>()
                    .map(|s| (*s).to_string())
                    .or_else(|| panic_info.downcast_ref::<String>().cloned())
                    .unwrap_or_else(|| "unknown panic".to_string());
                tracing::error!(panic_message = %panic_msg, count, "ONNX runtime panicked");
                Error::OperationFailed {
                    operation: operation.to_string(),
                    cause: format!("ONNX runtime panic: {panic_msg}"),
                }
            })?
        }
    }

    impl Default for FastEmbedEmbedder {
        fn default() -> Self {
            Self::new()
        }
    }

    impl Embedder for FastEmbedEmbedder {
        fn dimensions(&self) -> usize {
            Self::DEFAULT_DIMENSIONS
        }

        fn embed(&self, text: &str) -> Result<Vec<f32>> {
            self.run(vec![text.to_string()], "embed")?
                .into_iter()
                .next()
                .ok_or_else(|| Error::OperationFailed {
                    operation: "embed".to_string(),
                    cause: "no embedding returned from model".to_string(),
                })
        }

        fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>> {
            if texts.is_empty() {
                return Ok(Vec::new());
            }
            let owned = texts.iter().map(|s| (*s).to_string()).collect();
            self.run(owned, "embed_batch")
        }
    }
}

#[cfg(not(feature = "fastembed-embeddings"))]
mod fallback {
    use super::{DEFAULT_BATCH_SIZE, DEFAULT_DIMENSIONS, Embedder, Result};
    use crate::embedding::normalize;
    use std::collections::hash_map::DefaultHasher;
    use std::hash::{Hash, Hasher};

    /// Hash-based pseudo-embedder.
    ///
    /// Texts sharing words get correlated vectors, but there is no semantic
    /// similarity. Enable `fastembed-embeddings` for real embeddings.
    pub struct FastEmbedEmbedder {
        dimensions: usize,
        batch_size: usize,
    }

    impl FastEmbedEmbedder {
        /// Embedding dimensions of the real model.
        pub const DEFAULT_DIMENSIONS: usize = DEFAULT_DIMENSIONS;

        /// Creates an embedder with the default dimensions.
        #[must_use]
        pub const fn new() -> Self {
            Self::with_dimensions(DEFAULT_DIMENSIONS)
        }

        /// Creates an embedder with custom dimensions.
        #[must_use]
        pub const fn with_dimensions(dimensions: usize) -> Self {
            Self {
                dimensions,
                batch_size: DEFAULT_BATCH_SIZE,
            }
        }

        /// Sets the batch size. Only recorded; hashing is per text.
        #[must_use]
        pub const fn with_batch_size(mut self, batch_size: usize) -> Self {
            self.batch_size = if batch_size == 0 { 1 } else { batch_size };
            self
        }

        /// Returns the model name.
        #[must_use]
        pub const fn model_name(&self) -> &'static str {
            "hash-pseudo-embedding"
        }

        fn pseudo_embed(&self, text: &str) -> Vec<f32> {
            const MAX_WORDS: usize = 1000;
            let mut embedding = vec![0.0f32; self.dimensions];
            if self.dimensions == 0 {
                return embedding;
            }

            for (i, word) in text.split_whitespace().take(MAX_WORDS).enumerate() {
                let mut hasher = DefaultHasher::new();
                word.to_lowercase().hash(&mut hasher);
                Self::distribute_hash(&mut embedding, hasher.finish(), i);
            }

            normalize(&mut embedding);
            embedding
        }

        fn distribute_hash(embedding: &mut [f32], hash: u64, word_idx: usize) {
            let dimensions = embedding.len();
            for j in 0..8 {
                let idx = ((hash >> (j * 8)) as usize + word_idx) % dimensions;
                let value = ((hash >> (j * 4)) & 0xFF) as f32 / 255.0 - 0.5;
                embedding[idx] += value;
            }
        }
    }

    impl Default for FastEmbedEmbedder {
        fn default() -> Self {
            Self::new()
        }
    }

    impl Embedder for FastEmbedEmbedder {
        fn dimensions(&self) -> usize {
            self.dimensions
        }

        fn embed(&self, text: &str) -> Result<Vec<f32>> {
            tracing::trace!(batch_size = self.batch_size, "Using pseudo-embedding fallback");
            Ok(self.pseudo_embed(text))
        }
    }
}

#[cfg(feature = "fastembed-embeddings")]
pub use native::FastEmbedEmbedder;

#[cfg(not(feature = "fastembed-embeddings"))]
pub use fallback::FastEmbedEmbedder;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_embedder_creation() {
        let embedder = FastEmbedEmbedder::new();
        assert_eq!(embedder.dimensions(), FastEmbedEmbedder::DEFAULT_DIMENSIONS);
    }

    #[test]
    fn test_embed_batch_empty_list() {
        let embedder = FastEmbedEmbedder::default();
        let result = embedder.embed_batch(&[]).unwrap();
        assert!(result.is_empty());
    }

    #[cfg(not(feature = "fastembed-embeddings"))]
    mod fallback_tests {
        use super::*;

        #[test]
        fn test_pseudo_embedding_is_normalized_and_deterministic() {
            let embedder = FastEmbedEmbedder::with_dimensions(64);
            let a = embedder.embed("essential hypertension").unwrap();
            let b = embedder.embed("Essential Hypertension").unwrap();
            assert_eq!(a.len(), 64);
            assert_eq!(a, b);

            let magnitude: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
            assert!((magnitude - 1.0).abs() < 1e-4);
        }

        #[test]
        fn test_empty_text_is_zero_vector() {
            let embedder = FastEmbedEmbedder::with_dimensions(8).with_batch_size(0);
            let v = embedder.embed("").unwrap();
            assert!(v.iter().all(|x| *x == 0.0));
        }
    }

    #[cfg(feature = "fastembed-embeddings")]
    mod fastembed_tests {
        use super::*;

        #[test]
        fn test_embed_normalized() {
            let embedder = FastEmbedEmbedder::new();
            let emb = embedder.embed("Test embedding normalization").unwrap();
            assert_eq!(emb.len(), FastEmbedEmbedder::DEFAULT_DIMENSIONS);
            let magnitude: f32 = emb.iter().map(|x| x * x).sum::<f32>().sqrt();
            assert!((magnitude - 1.0).abs() < 0.01);
        }
    }
}
