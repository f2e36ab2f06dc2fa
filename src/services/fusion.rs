//! Retrieval fusion.
//!
//! Retrieves the ontology concepts closest to a patient context, attaches
//! their relation facts, and ranks literature by similarity blended with
//! recency.

use super::ontology::OntologyStore;
use super::scoring;
use crate::config::{LiteratureQueryMode, ScoringConfig};
use crate::embedding::{Embedder, encode_batched};
use crate::literature::LiteratureSource;
use crate::models::{FusionResult, LiteratureHit, LiteratureRecord, OntologyHit, PatientFields};
use crate::storage::{FlatIndex, VectorIndex};
use crate::{Error, Result};
use std::collections::HashSet;
use std::sync::{Arc, OnceLock};
use std::time::Instant;
use tracing::instrument;

/// Relation facts rendered per retrieved concept.
pub const FACTS_PER_CONCEPT: usize = 2;

/// Default number of texts per embedding call.
pub const DEFAULT_BATCH_SIZE: usize = 32;

/// Fuses ontology and literature retrieval for a patient context.
///
/// The concept index is built on first use and reused for the lifetime of
/// the service.
pub struct FusionService<I: VectorIndex = FlatIndex> {
    embedder: Arc<dyn Embedder>,
    ontology: Arc<OntologyStore>,
    literature: Arc<dyn LiteratureSource>,
    scoring: ScoringConfig,
    batch_size: usize,
    query_mode: LiteratureQueryMode,
    reference_year: Option<i32>,
    concept_index: OnceLock<I>,
}

impl FusionService<FlatIndex> {
    /// Creates a fusion service over an exact inner-product index.
    #[must_use]
    pub fn new(
        embedder: Arc<dyn Embedder>,
        ontology: Arc<OntologyStore>,
        literature: Arc<dyn LiteratureSource>,
        scoring: ScoringConfig,
    ) -> Self {
        Self::with_index_backend(embedder, ontology, literature, scoring)
    }
}

impl<I: VectorIndex> FusionService<I> {
    /// Creates a fusion service whose concept index uses backend `I`.
    #[must_use]
    pub fn with_index_backend(
        embedder: Arc<dyn Embedder>,
        ontology: Arc<OntologyStore>,
        literature: Arc<dyn LiteratureSource>,
        scoring: ScoringConfig,
    ) -> Self {
        Self {
            embedder,
            ontology,
            literature,
            scoring,
            batch_size: DEFAULT_BATCH_SIZE,
            query_mode: LiteratureQueryMode::default(),
            reference_year: None,
            concept_index: OnceLock::new(),
        }
    }

    /// Sets the embedding batch size.
    #[must_use]
    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size.max(1);
        self
    }

    /// Sets how literature queries are formed.
    #[must_use]
    pub const fn with_query_mode(mut self, mode: LiteratureQueryMode) -> Self {
        self.query_mode = mode;
        self
    }

    /// Pins the reference year for recency scoring (defaults to the current year).
    #[must_use]
    pub const fn with_reference_year(mut self, year: i32) -> Self {
        self.reference_year = Some(year);
        self
    }

    /// Returns the ontology store.
    #[must_use]
    pub fn ontology(&self) -> &OntologyStore {
        &self.ontology
    }

    /// Retrieves and scores evidence for `context`, querying literature with
    /// the whole context.
    ///
    /// # Errors
    ///
    /// Returns an error if embedding, index search or the literature source fails.
    #[instrument(skip(self, context), fields(operation = "fusion.fuse"))]
    pub fn fuse(&self, context: &str, k_ontology: usize, k_literature: usize) -> Result<FusionResult> {
        self.run(context, &[context], k_ontology, k_literature)
    }

    /// Like [`fuse`](Self::fuse), but forms literature queries from the
    /// patient's concept names when the service is in per-concept mode.
    ///
    /// Falls back to the whole context when the fields carry no names.
    ///
    /// # Errors
    ///
    /// Returns an error if embedding, index search or the literature source fails.
    #[instrument(skip(self, context, patient_fields), fields(operation = "fusion.fuse_with_fields"))]
    pub fn fuse_with_fields(
        &self,
        context: &str,
        patient_fields: &PatientFields,
        k_ontology: usize,
        k_literature: usize,
    ) -> Result<FusionResult> {
        let names = match self.query_mode {
            LiteratureQueryMode::WholeContext => Vec::new(),
            LiteratureQueryMode::PerConcept => patient_fields.concept_names(),
        };
        if names.is_empty() {
            return self.run(context, &[context], k_ontology, k_literature);
        }
        let queries: Vec<&str> = names.iter().map(String::as_str).collect();
        self.run(context, &queries, k_ontology, k_literature)
    }

    fn run(
        &self,
        context: &str,
        queries: &[&str],
        k_ontology: usize,
        k_literature: usize,
    ) -> Result<FusionResult> {
        let start = Instant::now();
        let result = (|| {
            let query_vector = self.embed_query(context)?;
            let ontology_hits = self.retrieve_concepts(&query_vector, k_ontology)?;
            let ontology_facts = ontology_hits
                .iter()
                .flat_map(|hit| self.ontology.relation_facts(&hit.concept_id, FACTS_PER_CONCEPT))
                .collect();
            let literature_hits = self.retrieve_literature(&query_vector, queries, k_literature)?;

            Ok(FusionResult {
                ontology_hits,
                literature_hits,
                ontology_facts,
            })
        })();

        let status = if result.is_ok() { "success" } else { "error" };
        metrics::counter!("fusion_requests_total", "status" => status).increment(1);
        metrics::histogram!("fusion_duration_ms", "status" => status)
            .record(start.elapsed().as_secs_f64() * 1000.0);

        if let Ok(fused) = &result {
            tracing::debug!(
                ontology_hits = fused.ontology_hits.len(),
                literature_hits = fused.literature_hits.len(),
                facts = fused.ontology_facts.len(),
                "Fusion complete"
            );
        }
        result
    }

    fn embed_query(&self, context: &str) -> Result<Vec<f32>> {
        let vector = self.embedder.embed(context)?;
        let expected = self.embedder.dimensions();
        if vector.len() != expected {
            return Err(Error::DimensionMismatch {
                expected,
                actual: vector.len(),
            });
        }
        Ok(vector)
    }

    fn retrieve_concepts(&self, query: &[f32], k: usize) -> Result<Vec<OntologyHit>> {
        let concepts = self.ontology.concepts();
        if k == 0 || concepts.is_empty() {
            return Ok(Vec::new());
        }

        let index = self.concept_index()?;
        index
            .search(query, k)?
            .into_iter()
            .map(|(position, score)| {
                let concept_id = concepts.get(position).ok_or_else(|| Error::OperationFailed {
                    operation: "concept_search".to_string(),
                    cause: format!("index returned unknown position {position}"),
                })?;
                Ok(OntologyHit {
                    concept_id: concept_id.clone(),
                    name: self.ontology.concept_name(concept_id).to_string(),
                    score: f64::from(score),
                })
            })
            .collect()
    }

    fn concept_index(&self) -> Result<&I> {
        if let Some(index) = self.concept_index.get() {
            return Ok(index);
        }
        let built = self.build_concept_index()?;
        Ok(self.concept_index.get_or_init(|| built))
    }

    fn build_concept_index(&self) -> Result<I> {
        let start = Instant::now();
        let names: Vec<&str> = self
            .ontology
            .concepts()
            .iter()
            .map(|id| self.ontology.concept_name(id))
            .collect();

        let vectors = encode_batched(self.embedder.as_ref(), &names, self.batch_size)?;
        let mut index = I::with_dimensions(self.embedder.dimensions())?;
        index.build(&vectors)?;

        tracing::info!(
            concepts = names.len(),
            elapsed_ms = u64::try_from(start.elapsed().as_millis()).unwrap_or(u64::MAX),
            "Built concept index"
        );
        Ok(index)
    }

    fn retrieve_literature(
        &self,
        query_vector: &[f32],
        queries: &[&str],
        k: usize,
    ) -> Result<Vec<LiteratureHit>> {
        if k == 0 {
            return Ok(Vec::new());
        }

        let cap = k * queries.len().max(1);
        let mut seen = HashSet::new();
        let mut ids = Vec::new();
        for query in queries {
            for id in self.literature.search(query, k)?.into_iter().take(k) {
                if ids.len() >= cap {
                    break;
                }
                if seen.insert(id.clone()) {
                    ids.push(id);
                }
            }
        }

        if ids.is_empty() {
            return Ok(Vec::new());
        }

        let records = self.literature.fetch(&ids)?;
        self.score_records(query_vector, records)
    }

    fn score_records(
        &self,
        query_vector: &[f32],
        records: Vec<LiteratureRecord>,
    ) -> Result<Vec<LiteratureHit>> {
        let reference_year = self.reference_year.unwrap_or_else(crate::current_year);
        let abstracts: Vec<&str> = records.iter().map(|r| r.abstract_text.as_str()).collect();
        let vectors = encode_batched(self.embedder.as_ref(), &abstracts, self.batch_size)?;

        let mut hits = records
            .into_iter()
            .zip(&vectors)
            .map(|(record, vector)| {
                let similarity = scoring::similarity(query_vector, vector)?;
                let year = record.year.unwrap_or(reference_year);
                let score =
                    scoring::combined_score_at(similarity, year, reference_year, &self.scoring);
                Ok(LiteratureHit::from_record(record, score))
            })
            .collect::<Result<Vec<_>>>()?;

        hits.sort_by(|a, b| b.score.total_cmp(&a.score));
        Ok(hits)
    }
}
