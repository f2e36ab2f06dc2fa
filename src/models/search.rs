//! Retrieval hits and fusion results.

use serde::{Deserialize, Serialize};

/// An ontology concept retrieved for a patient context.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OntologyHit {
    /// Concept identifier.
    pub concept_id: String,
    /// Canonical (lower-cased) concept name.
    pub name: String,
    /// Inner-product similarity to the query vector.
    pub score: f64,
}

/// A literature item as returned by the literature source.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LiteratureRecord {
    /// Source identifier.
    pub id: String,
    /// Article title.
    pub title: String,
    /// Abstract text, segments joined by a single space.
    #[serde(rename = "abstract")]
    pub abstract_text: String,
    /// Publication year, if known.
    pub year: Option<i32>,
}

/// A scored literature item.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LiteratureHit {
    /// Source identifier.
    pub id: String,
    /// Article title.
    pub title: String,
    /// Abstract text.
    #[serde(rename = "abstract")]
    pub abstract_text: String,
    /// Publication year, if known.
    pub year: Option<i32>,
    /// Similarity blended with recency.
    pub score: f64,
}

impl LiteratureHit {
    /// Attaches a score to a fetched record.
    #[must_use]
    pub fn from_record(record: LiteratureRecord, score: f64) -> Self {
        Self {
            id: record.id,
            title: record.title,
            abstract_text: record.abstract_text,
            year: record.year,
            score,
        }
    }
}

/// Ranked retrieval output for one patient context.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FusionResult {
    /// Ontology concepts in similarity order.
    pub ontology_hits: Vec<OntologyHit>,
    /// Literature items, score descending.
    pub literature_hits: Vec<LiteratureHit>,
    /// Plain-text relation statements touching the retrieved concepts.
    pub ontology_facts: Vec<String>,
}

impl FusionResult {
    /// Score of the highest-ranked literature hit.
    #[must_use]
    pub fn top_literature_score(&self) -> Option<f64> {
        self.literature_hits.first().map(|hit| hit.score)
    }

    /// Abstracts of all literature hits, in rank order.
    #[must_use]
    pub fn abstracts(&self) -> Vec<&str> {
        self.literature_hits
            .iter()
            .map(|hit| hit.abstract_text.as_str())
            .collect()
    }
}
