//! # patient-kg
//!
//! Per-patient medical knowledge graph assembly.
//!
//! A patient's EHR context is fused with a controlled medical ontology and
//! biomedical literature into weighted, typed `(head, relation, tail)` triples.
//!
//! ## Pipeline
//!
//! - [`services::FusionService`] retrieves the top ontology concepts and
//!   literature items for a patient context and scores them
//!   (similarity for concepts, similarity blended with recency for articles).
//! - [`services::TripleExtractor`] turns the context plus abstracts into
//!   structured triples through a generative backend, recovering the JSON
//!   array from noisy output.
//! - [`services::GraphMerger`] deduplicates ontology-derived triples, attaches
//!   weights, merges the extracted triples and optionally persists them.
//!
//! ## Example
//!
//! ```rust,ignore
//! use patient_kg::services::{FusionService, GraphMerger, OntologyStore, TripleExtractor};
//!
//! let store = OntologyStore::open(&config.ontology)?;
//! let fusion = FusionService::new(embedder, Arc::new(store), literature, config.scoring);
//! let fused = fusion.fuse(&context, config.k_ontology, config.k_literature)?;
//!
//! let merger = GraphMerger::new(TripleExtractor::new(llm));
//! let triples = merger.merge("P1", &fused, &context)?;
//! ```

#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]
#![warn(missing_docs)]
#![forbid(unsafe_code)]
#![allow(clippy::multiple_crate_versions)]

use thiserror::Error as ThisError;

pub mod config;
pub mod embedding;
pub mod literature;
pub mod llm;
pub mod models;
pub mod observability;
pub mod services;
pub mod storage;

pub use config::{LiteratureQueryMode, PipelineConfig, ScoringConfig};
pub use embedding::Embedder;
pub use literature::LiteratureSource;
pub use llm::LlmProvider;
pub use models::{
    FusionResult, LiteratureHit, LiteratureRecord, OntologyHit, RelationRecord, Triple,
    TripleSource,
};
pub use services::{FusionService, GraphMerger, OntologyStore, TripleExtractor};
pub use storage::VectorIndex;

/// Error type for knowledge graph assembly.
///
/// # Error Variant Triggers
///
/// | Variant | Raised When |
/// |---------|-------------|
/// | `InvalidInput` | Missing identity parameters, zero dimensions, invalid config values |
/// | `SourceUnavailable` | Ontology files missing, literature API unreachable or non-2xx, artifact I/O |
/// | `MalformedOutput` | Generated text has no locatable JSON array |
/// | `OutputParse` | The located array is not valid JSON triple records |
/// | `DimensionMismatch` | Vectors of unequal length compared or indexed |
/// | `CapabilityUnavailable` | Code mapping requested with no mapper configured |
/// | `OperationFailed` | Embedding backends, serialization, other internal failures |
#[derive(Debug, ThisError)]
pub enum Error {
    /// Invalid input was provided.
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// A file or network source could not be read.
    ///
    /// Raised when:
    /// - An ontology source file is missing or unreadable
    /// - The literature API cannot be reached or returns a non-2xx status
    /// - A generative backend request fails at the transport level
    /// - A triple artifact cannot be written
    #[error("source '{resource}' unavailable: {cause}")]
    SourceUnavailable {
        /// The file path or endpoint that failed.
        resource: String,
        /// The underlying cause.
        cause: String,
    },

    /// Generated text did not contain a locatable JSON array.
    #[error("malformed generative output: {reason}")]
    MalformedOutput {
        /// Why the array could not be located.
        reason: String,
        /// The raw generated text.
        raw: String,
    },

    /// The located JSON array could not be parsed into triple records.
    #[error("failed to parse generative output: {cause}")]
    OutputParse {
        /// The parser error.
        cause: String,
        /// The raw generated text.
        raw: String,
    },

    /// Two vectors of different dimensions were compared.
    #[error("dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch {
        /// Expected dimensionality.
        expected: usize,
        /// Actual dimensionality.
        actual: usize,
    },

    /// A required capability was not supplied and could not be initialized.
    #[error("capability unavailable: {0}")]
    CapabilityUnavailable(String),

    /// An operation failed.
    #[error("operation '{operation}' failed: {cause}")]
    OperationFailed {
        /// The operation that failed.
        operation: String,
        /// The underlying cause.
        cause: String,
    },
}

impl Error {
    /// Returns the raw generated text for malformed-output errors.
    #[must_use]
    pub fn raw_output(&self) -> Option<&str> {
        match self {
            Self::MalformedOutput { raw, .. } | Self::OutputParse { raw, .. } => Some(raw),
            _ => None,
        }
    }
}

/// Result type alias for knowledge graph operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Returns the current calendar year (UTC).
#[must_use]
pub fn current_year() -> i32 {
    use chrono::Datelike;
    chrono::Utc::now().year()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = Error::InvalidInput("test error".to_string());
        assert_eq!(err.to_string(), "invalid input: test error");

        let err = Error::SourceUnavailable {
            resource: "concept.txt".to_string(),
            cause: "not found".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "source 'concept.txt' unavailable: not found"
        );

        let err = Error::DimensionMismatch {
            expected: 3,
            actual: 2,
        };
        assert_eq!(err.to_string(), "dimension mismatch: expected 3, got 2");
    }

    #[test]
    fn test_raw_output_only_for_generation_errors() {
        let err = Error::MalformedOutput {
            reason: "no '['".to_string(),
            raw: "hello".to_string(),
        };
        assert_eq!(err.raw_output(), Some("hello"));

        let err = Error::CapabilityUnavailable("mapper".to_string());
        assert!(err.raw_output().is_none());
    }

    #[test]
    fn test_current_year_is_plausible() {
        assert!(current_year() >= 2024);
    }
}
