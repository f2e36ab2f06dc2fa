//! Data models for knowledge graph assembly.
//!
//! Triples are the durable output; hits and fusion results are ephemeral
//! per-patient retrieval products.

mod ontology;
mod patient;
mod search;
mod triple;

pub use ontology::{CodeMatch, RelationRecord};
pub use patient::{ClinicalCode, EhrVisit, PatientFields};
pub use search::{FusionResult, LiteratureHit, LiteratureRecord, OntologyHit};
pub use triple::{EntityType, RelationType, Triple, TripleSource};
