//! Pipeline services.
//!
//! - [`OntologyStore`]: concepts, names, relations and code mapping
//! - [`FusionService`]: ontology and literature retrieval with scoring
//! - [`TripleExtractor`]: triples from generated text
//! - [`GraphMerger`]: the final weighted triple list per patient

pub mod ehr;
pub mod fusion;
pub mod graph_merger;
pub mod ontology;
pub mod scoring;
pub mod triple_extraction;

pub use ehr::{ehr_to_triples, patient_context};
pub use fusion::FusionService;
pub use graph_merger::GraphMerger;
pub use ontology::{CodeMapper, OntologySnapshot, OntologyStore, TableCodeMapper};
pub use scoring::{combined_score, combined_score_at, recency_weight, similarity};
pub use triple_extraction::{ExtractedTriple, TripleExtractor};
