//! Knowledge graph triples.
//!
//! A [`Triple`] is a directed labeled edge `head --relation--> tail`. Entity
//! types live in `head_type` / `tail_type`; once finalized, `head` and `tail`
//! carry plain identifiers with no `Type:` prefix.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Evidence source of a triple.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum TripleSource {
    /// Patient electronic health record.
    Ehr,
    /// Controlled medical ontology.
    Umls,
    /// Biomedical literature.
    PubMed,
    /// Any other source label.
    Other(String),
}

impl TripleSource {
    /// Returns the canonical label.
    #[must_use]
    pub fn as_str(&self) -> &str {
        match self {
            Self::Ehr => "EHR",
            Self::Umls => "UMLS",
            Self::PubMed => "PubMed",
            Self::Other(label) => label,
        }
    }
}

impl From<String> for TripleSource {
    fn from(value: String) -> Self {
        match value.to_lowercase().as_str() {
            "ehr" => Self::Ehr,
            "umls" => Self::Umls,
            "pubmed" => Self::PubMed,
            _ => Self::Other(value),
        }
    }
}

impl From<TripleSource> for String {
    fn from(value: TripleSource) -> Self {
        match value {
            TripleSource::Other(label) => label,
            other => other.as_str().to_string(),
        }
    }
}

impl fmt::Display for TripleSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Well-known node types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EntityType {
    /// Patient identifier.
    Patient,
    /// Disease or condition.
    Disease,
    /// Drug.
    Drug,
    /// Clinical symptom.
    Symptom,
    /// Laboratory result (with units).
    LabResult,
    /// Treatment such as surgery or chemotherapy.
    Treatment,
    /// Adverse drug effect.
    SideEffect,
    /// Care severity (ICU, inpatient, outpatient).
    Severity,
}

impl EntityType {
    /// All well-known entity types.
    pub const ALL: [Self; 8] = [
        Self::Patient,
        Self::Disease,
        Self::Drug,
        Self::Symptom,
        Self::LabResult,
        Self::Treatment,
        Self::SideEffect,
        Self::Severity,
    ];

    /// Returns the type label.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Patient => "Patient",
            Self::Disease => "Disease",
            Self::Drug => "Drug",
            Self::Symptom => "Symptom",
            Self::LabResult => "LabResult",
            Self::Treatment => "Treatment",
            Self::SideEffect => "SideEffect",
            Self::Severity => "Severity",
        }
    }
}

/// Well-known edge labels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RelationType {
    /// Patient → Disease.
    HasDisease,
    /// Patient → Drug.
    UsedDrug,
    /// Drug → Disease.
    Treats,
    /// Drug → `SideEffect`.
    CausesSideEffect,
    /// Disease → Symptom.
    HasSymptom,
    /// Patient → `LabResult`.
    HasLabResult,
    /// Patient → Treatment.
    ReceivedTreatment,
    /// Temporal ordering.
    Before,
    /// Temporal ordering.
    After,
}

impl RelationType {
    /// All well-known relation types.
    pub const ALL: [Self; 9] = [
        Self::HasDisease,
        Self::UsedDrug,
        Self::Treats,
        Self::CausesSideEffect,
        Self::HasSymptom,
        Self::HasLabResult,
        Self::ReceivedTreatment,
        Self::Before,
        Self::After,
    ];

    /// Returns the relation label.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::HasDisease => "HAS_DISEASE",
            Self::UsedDrug => "USED_DRUG",
            Self::Treats => "TREATS",
            Self::CausesSideEffect => "CAUSES_SIDE_EFFECT",
            Self::HasSymptom => "HAS_SYMPTOM",
            Self::HasLabResult => "HAS_LAB_RESULT",
            Self::ReceivedTreatment => "RECEIVED_TREATMENT",
            Self::Before => "BEFORE",
            Self::After => "AFTER",
        }
    }
}

/// A typed, weighted knowledge graph edge.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Triple {
    /// Head entity identifier.
    pub head: String,
    /// Head entity type.
    pub head_type: String,
    /// Relation label.
    pub relation: String,
    /// Tail entity identifier.
    pub tail: String,
    /// Tail entity type.
    pub tail_type: String,
    /// ISO date of the underlying event, if known.
    pub timestamp: Option<String>,
    /// Evidence source.
    pub source: TripleSource,
    /// Relevance weight, if scored.
    pub weight: Option<f64>,
}

impl Triple {
    /// Creates an unweighted triple with no timestamp.
    #[must_use]
    pub fn new(
        head: impl Into<String>,
        head_type: impl Into<String>,
        relation: impl Into<String>,
        tail: impl Into<String>,
        tail_type: impl Into<String>,
        source: TripleSource,
    ) -> Self {
        Self {
            head: head.into(),
            head_type: head_type.into(),
            relation: relation.into(),
            tail: tail.into(),
            tail_type: tail_type.into(),
            timestamp: None,
            source,
            weight: None,
        }
    }

    /// Creates a triple from well-known types.
    #[must_use]
    pub fn typed(
        head: impl Into<String>,
        head_type: EntityType,
        relation: RelationType,
        tail: impl Into<String>,
        tail_type: EntityType,
        source: TripleSource,
    ) -> Self {
        Self::new(
            head,
            head_type.as_str(),
            relation.as_str(),
            tail,
            tail_type.as_str(),
            source,
        )
    }

    /// Sets the timestamp.
    #[must_use]
    pub fn with_timestamp(mut self, timestamp: Option<String>) -> Self {
        self.timestamp = timestamp;
        self
    }

    /// Sets the weight.
    #[must_use]
    pub const fn with_weight(mut self, weight: Option<f64>) -> Self {
        self.weight = weight;
        self
    }
}

impl fmt::Display for Triple {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "({}:{}) -[{}]-> ({}:{}) [{}]",
            self.head_type, self.head, self.relation, self.tail_type, self.tail, self.source
        )
    }
}
