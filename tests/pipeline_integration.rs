//! End-to-end pipeline tests over on-disk ontology fixtures.
//!
//! Embedding, literature and generation backends are in-process doubles.

// Integration tests use expect/unwrap for simplicity - panics are acceptable in tests
#![allow(clippy::expect_used, clippy::unwrap_used)]

use patient_kg::config::{OntologyConfig, ScoringConfig};
use patient_kg::embedding::{Embedder, normalize};
use patient_kg::llm::LlmProvider;
use patient_kg::models::{FusionResult, LiteratureRecord, OntologyHit, Triple, TripleSource};
use patient_kg::services::{FusionService, GraphMerger, OntologyStore, TripleExtractor};
use patient_kg::storage::TripleArtifactStore;
use patient_kg::{Error, LiteratureSource, Result};
use std::collections::HashMap;
use std::fs;
use std::path::Path;
use std::sync::{Arc, Mutex};
use tempfile::TempDir;

/// Three-axis bag-of-keywords embedder: hypertension, asthma, lisinopril.
///
/// Texts of the form `sim:<x>` embed to `[x, sqrt(1 - x²), 0]`, so their
/// similarity to a pure hypertension query is exactly `x`.
struct KeywordEmbedder;

impl Embedder for KeywordEmbedder {
    fn dimensions(&self) -> usize {
        3
    }

    fn embed(&self, text: &str) -> Result<Vec<f32>> {
        if let Some(value) = text.strip_prefix("sim:") {
            let x: f32 = value.parse().unwrap();
            return Ok(vec![x, (1.0 - x * x).sqrt(), 0.0]);
        }
        let lower = text.to_lowercase();
        let mut vector = vec![
            lower.matches("hypertens").count() as f32,
            lower.matches("asthma").count() as f32,
            lower.matches("lisinopril").count() as f32,
        ];
        normalize(&mut vector);
        Ok(vector)
    }
}

#[derive(Default)]
struct StubLiterature {
    ids: Vec<String>,
    records: Vec<LiteratureRecord>,
}

impl LiteratureSource for StubLiterature {
    fn search(&self, _term: &str, limit: usize) -> Result<Vec<String>> {
        Ok(self.ids.iter().take(limit).cloned().collect())
    }

    fn fetch(&self, ids: &[String]) -> Result<Vec<LiteratureRecord>> {
        Ok(self
            .records
            .iter()
            .filter(|r| ids.contains(&r.id))
            .cloned()
            .collect())
    }
}

struct ScriptedLlm {
    reply: String,
    prompts: Mutex<Vec<String>>,
}

impl ScriptedLlm {
    fn new(reply: &str) -> Arc<Self> {
        Arc::new(Self {
            reply: reply.to_string(),
            prompts: Mutex::new(Vec::new()),
        })
    }
}

impl LlmProvider for ScriptedLlm {
    fn name(&self) -> &'static str {
        "scripted"
    }

    fn complete(&self, prompt: &str) -> Result<String> {
        self.prompts.lock().unwrap().push(prompt.to_string());
        Ok(self.reply.clone())
    }
}

fn write_ontology(dir: &Path) {
    fs::write(dir.join("concept.txt"), "C1\nC2\nC3\n").unwrap();
    fs::write(
        dir.join("concept_name.txt"),
        "C1\tHypertension\nC2\tAsthma\nC3\tLisinopril\n",
    )
    .unwrap();
    fs::write(dir.join("relation.txt"), "treats\n").unwrap();
    fs::write(dir.join("umls.csv"), "treats\tC3\tC1\t0.9\n").unwrap();
}

fn record(id: &str, text: &str, year: Option<i32>) -> LiteratureRecord {
    LiteratureRecord {
        id: id.to_string(),
        title: format!("Article {id}"),
        abstract_text: text.to_string(),
        year,
    }
}

fn open_store(data: &TempDir, cache: Option<&TempDir>) -> Arc<OntologyStore> {
    let config = OntologyConfig {
        data_dir: data.path().to_path_buf(),
        cache_dir: cache.map(|c| c.path().to_path_buf()),
    };
    Arc::new(OntologyStore::open(&config).unwrap())
}

const EXTRACTED: &str = r#"Here are the triples:
```json
[
  {"head": "Patient:P1", "head_type": "Patient", "relation": "USED_DRUG", "tail": "Drug:lisinopril", "tail_type": "Drug", "timestamp": "2024-06-02", "source": "EHR"},
  {"head": "Drug:lisinopril", "head_type": "Drug", "relation": "TREATS", "tail": "Disease:hypertension", "tail_type": "Disease", "source": "PubMed"}
]
```"#;

#[test]
fn test_fuse_then_merge_end_to_end() {
    let data = TempDir::new().unwrap();
    let out = TempDir::new().unwrap();
    write_ontology(data.path());

    let literature = StubLiterature {
        ids: vec!["100".to_string(), "200".to_string()],
        records: vec![
            record("100", "Asthma exacerbations in adults.", Some(2000)),
            record("200", "Lisinopril in hypertension.", None),
        ],
    };
    let fusion = FusionService::new(
        Arc::new(KeywordEmbedder),
        open_store(&data, None),
        Arc::new(literature),
        ScoringConfig::default(),
    );

    let context = "PatientID: P1; Conditions: [hypertension]; Drugs: [lisinopril]; Procedures: []";
    let fused = fusion.fuse(context, 1, 5).unwrap();

    // Query is equidistant from hypertension and lisinopril; index order breaks the tie.
    assert_eq!(fused.ontology_hits.len(), 1);
    assert_eq!(fused.ontology_hits[0].concept_id, "C1");
    assert_eq!(fused.ontology_facts, ["lisinopril treats hypertension"]);
    let ids: Vec<&str> = fused.literature_hits.iter().map(|h| h.id.as_str()).collect();
    assert_eq!(ids, ["200", "100"]);

    let llm = ScriptedLlm::new(EXTRACTED);
    let store = TripleArtifactStore::new(out.path());
    let merger = GraphMerger::new(TripleExtractor::new(Arc::clone(&llm) as Arc<dyn LlmProvider>))
        .with_artifacts(store.clone());
    let triples = merger.merge("P1", &fused, context).unwrap();

    assert_eq!(triples.len(), 3);
    assert_eq!(triples[0].source, TripleSource::Umls);
    assert_eq!(triples[0].tail, "C1");
    assert!(triples[1..].iter().all(|t| t.source == TripleSource::PubMed));
    assert!(
        triples
            .iter()
            .all(|t| !t.head.contains(':') && !t.tail.contains(':'))
    );
    let top = fused.literature_hits[0].score;
    assert!(triples[1..].iter().all(|t| t.weight == Some(top)));

    let prompt = &llm.prompts.lock().unwrap()[0];
    assert!(prompt.contains("Lisinopril in hypertension.\n---\nAsthma exacerbations in adults."));

    let persisted = store.load("P1").unwrap();
    assert_eq!(persisted.len(), 2);
    assert!(persisted.iter().all(|t| t.source == TripleSource::PubMed));
}

#[test]
fn test_single_ontology_hit_with_empty_abstracts() {
    let merger = GraphMerger::new(TripleExtractor::new(ScriptedLlm::new("[]")));
    let fused = FusionResult {
        ontology_hits: vec![OntologyHit {
            concept_id: "C1".to_string(),
            name: "hypertension".to_string(),
            score: 0.92,
        }],
        ..FusionResult::default()
    };

    let triples = merger.merge("P1", &fused, "PatientID: P1").unwrap();
    let json = serde_json::to_value(&triples).unwrap();
    assert_eq!(
        json,
        serde_json::json!([{
            "head": "P1",
            "head_type": "Patient",
            "relation": "HAS_DISEASE",
            "tail": "C1",
            "tail_type": "Disease",
            "timestamp": null,
            "source": "UMLS",
            "weight": 0.92
        }])
    );
}

#[test]
fn test_duplicate_ontology_hits_emit_one_triple() {
    let merger = GraphMerger::new(TripleExtractor::new(ScriptedLlm::new("[]")));
    let hit = OntologyHit {
        concept_id: "C1".to_string(),
        name: "hypertension".to_string(),
        score: 0.9,
    };
    let fused = FusionResult {
        ontology_hits: vec![hit.clone(), hit],
        ..FusionResult::default()
    };

    let triples = merger.merge("P1", &fused, "ctx").unwrap();
    let has_disease: Vec<&Triple> = triples
        .iter()
        .filter(|t| t.relation == "HAS_DISEASE" && t.tail == "C1")
        .collect();
    assert_eq!(has_disease.len(), 1);
}

#[test]
fn test_literature_ranked_by_combined_score() {
    let data = TempDir::new().unwrap();
    fs::write(data.path().join("concept.txt"), "").unwrap();
    fs::write(data.path().join("concept_name.txt"), "").unwrap();
    fs::write(data.path().join("relation.txt"), "").unwrap();
    fs::write(data.path().join("umls.csv"), "").unwrap();

    // 0.7 * sim + 0.3 at the reference year gives 0.4, 0.9 and 0.6.
    let literature = StubLiterature {
        ids: vec!["a".to_string(), "b".to_string(), "c".to_string()],
        records: vec![
            record("a", "sim:0.142857142", Some(2024)),
            record("b", "sim:0.857142857", Some(2024)),
            record("c", "sim:0.428571428", Some(2024)),
        ],
    };
    let fusion = FusionService::new(
        Arc::new(KeywordEmbedder),
        open_store(&data, None),
        Arc::new(literature),
        ScoringConfig::default(),
    )
    .with_reference_year(2024);

    let fused = fusion.fuse("hypertension", 5, 3).unwrap();
    assert!(fused.ontology_hits.is_empty());

    let scores: Vec<f64> = fused.literature_hits.iter().map(|h| h.score).collect();
    for (got, want) in scores.iter().zip([0.9, 0.6, 0.4]) {
        assert!((got - want).abs() < 1e-5, "{scores:?}");
    }
    let ids: Vec<&str> = fused.literature_hits.iter().map(|h| h.id.as_str()).collect();
    assert_eq!(ids, ["b", "c", "a"]);
}

#[test]
fn test_malformed_generation_fails_merge() {
    let out = TempDir::new().unwrap();
    let store = TripleArtifactStore::new(out.path());
    let merger = GraphMerger::new(TripleExtractor::new(ScriptedLlm::new(
        "I'm sorry, I can't produce triples for this patient.",
    )))
    .with_artifacts(store.clone());

    let err = merger
        .merge("P1", &FusionResult::default(), "ctx")
        .unwrap_err();
    assert!(matches!(err, Error::MalformedOutput { .. }));
    assert!(err.raw_output().unwrap().contains("I'm sorry"));
    assert!(store.load("P1").unwrap().is_empty());
}

#[test]
fn test_unparseable_generation_is_a_parse_error() {
    let merger = GraphMerger::new(TripleExtractor::new(ScriptedLlm::new(
        "[{\"head\": \"P1\", \"relation\": }]",
    )));
    let err = merger
        .merge("P1", &FusionResult::default(), "ctx")
        .unwrap_err();
    assert!(matches!(err, Error::OutputParse { .. }));
}

#[test]
fn test_ontology_snapshots_written_to_cache_dir() {
    let data = TempDir::new().unwrap();
    let cache = TempDir::new().unwrap();
    write_ontology(data.path());

    let store = open_store(&data, Some(&cache));
    assert_eq!(store.concepts().len(), 3);

    for name in [
        "concepts.json",
        "concept_names.json",
        "relation_types.json",
        "relation_triples.json",
    ] {
        assert!(cache.path().join(name).exists(), "missing {name}");
    }
    assert!(!data.path().join("concepts.json").exists());

    // Reopening reads the snapshots even with the sources gone.
    fs::remove_dir_all(data.path()).unwrap();
    let reopened = open_store(&data, Some(&cache));
    let names: HashMap<&str, &str> = reopened
        .concepts()
        .iter()
        .map(|id| (id.as_str(), reopened.concept_name(id)))
        .collect();
    assert_eq!(names["C3"], "lisinopril");
}
