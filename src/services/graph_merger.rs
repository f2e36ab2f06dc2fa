//! Graph merging.
//!
//! Joins ontology-derived triples with triples extracted from literature into
//! one weighted list per patient.

use super::triple_extraction::TripleExtractor;
use crate::llm::RetryPolicy;
use crate::models::{EntityType, FusionResult, RelationType, Triple, TripleSource};
use crate::storage::TripleArtifactStore;
use crate::{Error, Result};
use std::collections::HashSet;
use std::time::Instant;
use tracing::instrument;

/// Merges fusion output into a patient's triple list.
pub struct GraphMerger {
    extractor: TripleExtractor,
    retry: RetryPolicy,
    artifacts: Option<TripleArtifactStore>,
}

impl GraphMerger {
    /// Creates a merger with no retries and no persistence.
    #[must_use]
    pub fn new(extractor: TripleExtractor) -> Self {
        Self {
            extractor,
            retry: RetryPolicy::none(),
            artifacts: None,
        }
    }

    /// Sets the retry policy for the extraction call.
    #[must_use]
    pub const fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Persists extractor-derived triples to `artifacts` after each successful merge.
    #[must_use]
    pub fn with_artifacts(mut self, artifacts: TripleArtifactStore) -> Self {
        self.artifacts = Some(artifacts);
        self
    }

    /// Builds the patient's triples: ontology-derived first, then extractor-derived.
    ///
    /// Ontology hits become `Patient -HAS_DISEASE-> concept` triples, one per
    /// distinct concept id, weighted by similarity. Extracted triples are
    /// labelled `PubMed` and weighted by the top literature score.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidInput`] for an empty patient id, the extractor's
    /// error, or [`Error::SourceUnavailable`] if persisting artifacts fails.
    #[instrument(
        skip(self, fused, context),
        fields(operation = "graph_merger.merge", ontology_hits = fused.ontology_hits.len(), literature_hits = fused.literature_hits.len())
    )]
    pub fn merge(&self, patient_id: &str, fused: &FusionResult, context: &str) -> Result<Vec<Triple>> {
        if patient_id.trim().is_empty() {
            return Err(Error::InvalidInput("patient id must not be empty".to_string()));
        }

        let start = Instant::now();
        let result = (|| {
            let ontology_triples = ontology_triples(patient_id, fused);

            let abstracts = fused.abstracts();
            let weight = fused.top_literature_score();
            let extracted: Vec<Triple> = self
                .extractor
                .extract_with_policy(context, &abstracts, &fused.ontology_facts, &self.retry)?
                .into_iter()
                .map(|record| record.into_triple(TripleSource::PubMed, weight))
                .collect();

            if let Some(artifacts) = &self.artifacts {
                artifacts.persist(patient_id, &extracted)?;
            }

            metrics::counter!("graph_merge_triples_total", "source" => "UMLS")
                .increment(ontology_triples.len() as u64);
            metrics::counter!("graph_merge_triples_total", "source" => "PubMed")
                .increment(extracted.len() as u64);

            let mut triples = ontology_triples;
            triples.extend(extracted);
            Ok(triples)
        })();

        let status = if result.is_ok() { "success" } else { "error" };
        metrics::histogram!("graph_merge_duration_ms", "status" => status)
            .record(start.elapsed().as_secs_f64() * 1000.0);

        if let Ok(triples) = &result {
            tracing::info!(patient_id, triples = triples.len(), "Merged patient graph");
        }
        result
    }
}

/// One `HAS_DISEASE` triple per distinct concept id, first occurrence wins.
fn ontology_triples(patient_id: &str, fused: &FusionResult) -> Vec<Triple> {
    let mut seen = HashSet::new();
    fused
        .ontology_hits
        .iter()
        .filter(|hit| seen.insert(hit.concept_id.as_str()))
        .map(|hit| {
            Triple::typed(
                patient_id,
                EntityType::Patient,
                RelationType::HasDisease,
                hit.concept_id.as_str(),
                EntityType::Disease,
                TripleSource::Umls,
            )
            .with_weight(Some(hit.score))
        })
        .collect()
}
