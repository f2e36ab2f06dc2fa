//! Ontology relation records.

use serde::{Deserialize, Serialize};

/// A weighted relation between two ontology concepts.
///
/// Immutable once loaded from the static relation file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RelationRecord {
    /// Relation type (e.g. `may_treat`).
    pub relation: String,
    /// First concept identifier.
    pub concept_id_1: String,
    /// Second concept identifier.
    pub concept_id_2: String,
    /// Relation weight (1.0 when the source field was unparsable).
    pub weight: f64,
}

impl RelationRecord {
    /// Returns true if the concept appears at either endpoint.
    #[must_use]
    pub fn touches(&self, concept_id: &str) -> bool {
        self.concept_id_1 == concept_id || self.concept_id_2 == concept_id
    }
}

/// A clinical code resolved to an ontology concept.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CodeMatch {
    /// The external clinical code (e.g. ICD-10-CM).
    pub code: String,
    /// The ontology concept identifier.
    pub concept_id: String,
    /// The concept's lower-cased name.
    pub name: String,
}
