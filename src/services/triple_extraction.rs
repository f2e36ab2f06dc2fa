//! Triple extraction from generated text.
//!
//! The extractor prompts a generative backend with the patient context,
//! literature abstracts and ontology facts, then recovers a JSON array of
//! triple records from the free-form reply in two stages:
//!
//! 1. [`locate_json_array`] finds the span from the first `[` to the last `]`
//!    ([`Error::MalformedOutput`] when there is none).
//! 2. [`parse_json_array`] parses that span ([`Error::OutputParse`] when it is
//!    not an array of triple records).
//!
//! `Type:` prefixes are then stripped from `head` and `tail`.

use crate::llm::{LlmProvider, RetryPolicy};
use crate::models::{EntityType, RelationType, Triple, TripleSource};
use crate::{Error, Result};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Deserializer, Serialize};
use std::fmt::Write as _;
use std::sync::Arc;
use std::time::Instant;
use tracing::instrument;

/// Separator between abstracts in the prompt.
const ABSTRACT_SEPARATOR: &str = "\n---\n";

/// Matches `<EntityType>:<id>` for the known entity labels, any case.
/// Group 1 is the identifier.
static TYPE_PREFIX: Lazy<Option<Regex>> = Lazy::new(|| {
    let labels: Vec<&str> = EntityType::ALL.iter().map(EntityType::as_str).collect();
    Regex::new(&format!(r"(?i)^\s*(?:{})\s*:\s*(\S.*?)\s*$", labels.join("|"))).ok()
});

const SYSTEM_SECTION: &str = "\
SYSTEM:
You extract medical knowledge graph triples.
Combine the patient's EHR context with the literature abstracts and ontology
facts below to infer every relevant entity-relation triple.

OUTPUT RULES:
- Reply with a single ```json code fence holding a JSON array of objects.
- Write nothing outside the code fence.
- Emit one object per inferred triple; the array may hold many.
- Every object has: head, head_type, relation, tail, tail_type, source,
  and optionally timestamp (YYYY-MM-DD).
";

const INFERENCE_SECTION: &str = "\
INFERENCE REQUIREMENTS:
1. Infer from both the EHR context and the abstracts. Never copy the example values.
2. Include every triple you can infer for the patient.
3. Set \"source\" to \"EHR\" or \"PubMed\".
4. When a value appears in both sources, keep the more specific one.
";

const FORMAT_EXAMPLE: &str = r#"FORMAT EXAMPLE (placeholders only):
```json
[
  {
    "head": "Patient:<PatientID>",
    "head_type": "Patient",
    "relation": "<RELATION>",
    "tail": "<EntityType>:<Code_or_Name_or_Value>",
    "tail_type": "<EntityType>",
    "timestamp": "<YYYY-MM-DD>",
    "source": "<EHR_or_PubMed>"
  }
]
```"#;

const fn entity_hint(entity: EntityType) -> &'static str {
    match entity {
        EntityType::Patient => "patient identifier",
        EntityType::Disease => "disease or condition",
        EntityType::Drug => "drug",
        EntityType::Symptom => "clinical symptom",
        EntityType::LabResult => "lab result with units",
        EntityType::Treatment => "treatment such as surgery, chemotherapy, radiotherapy",
        EntityType::SideEffect => "adverse drug reaction",
        EntityType::Severity => "care severity such as ICU, inpatient, outpatient",
    }
}

const fn relation_hint(relation: RelationType) -> &'static str {
    match relation {
        RelationType::HasDisease => "patient -> disease",
        RelationType::UsedDrug => "patient -> drug",
        RelationType::Treats => "drug -> disease",
        RelationType::CausesSideEffect => "drug -> side effect",
        RelationType::HasSymptom => "disease -> symptom",
        RelationType::HasLabResult => "patient -> lab result",
        RelationType::ReceivedTreatment => "patient -> treatment",
        RelationType::Before | RelationType::After => "time ordering",
    }
}

/// A triple record recovered from generated text.
///
/// Optional fields stay `None` when the backend omitted them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExtractedTriple {
    /// Head entity identifier.
    #[serde(deserialize_with = "scalar_string")]
    pub head: String,
    /// Head entity type.
    pub head_type: String,
    /// Relation label.
    pub relation: String,
    /// Tail entity identifier.
    #[serde(deserialize_with = "scalar_string")]
    pub tail: String,
    /// Tail entity type.
    pub tail_type: String,
    /// Event date, if given.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<String>,
    /// Source label claimed by the backend, if given.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
}

impl ExtractedTriple {
    /// Converts into a [`Triple`] with the given source and weight.
    #[must_use]
    pub fn into_triple(self, source: TripleSource, weight: Option<f64>) -> Triple {
        Triple::new(
            self.head,
            self.head_type,
            self.relation,
            self.tail,
            self.tail_type,
            source,
        )
        .with_timestamp(self.timestamp)
        .with_weight(weight)
    }
}

fn scalar_string<'de, D>(deserializer: D) -> std::result::Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    match serde_json::Value::deserialize(deserializer)? {
        serde_json::Value::String(s) => Ok(s),
        serde_json::Value::Number(n) => Ok(n.to_string()),
        other => Err(<D::Error as serde::de::Error>::custom(format!(
            "expected a string or number, got {other}"
        ))),
    }
}

/// Builds the extraction prompt.
#[must_use]
pub fn build_prompt(context: &str, abstracts: &[&str], facts: &[String]) -> String {
    let mut prompt = String::with_capacity(4096);
    prompt.push_str(SYSTEM_SECTION);

    prompt.push_str("\nUSER INPUT (do not modify):\nPatient Context:\n");
    prompt.push_str(context);
    prompt.push_str("\n\nPubMed Abstracts:\n");
    prompt.push_str(&abstracts.join(ABSTRACT_SEPARATOR));
    if !facts.is_empty() {
        prompt.push_str("\n\nOntology Facts:\n");
        prompt.push_str(&facts.join("\n"));
    }

    prompt.push_str("\n\nENTITY TYPES (nodes):\n");
    for entity in EntityType::ALL {
        let _ = writeln!(prompt, "- {:<18} {}", entity.as_str(), entity_hint(entity));
    }

    prompt.push_str("\nRELATION TYPES (edges):\n");
    for relation in RelationType::ALL {
        let _ = writeln!(prompt, "- {:<22} ({})", relation.as_str(), relation_hint(relation));
    }

    prompt.push('\n');
    prompt.push_str(INFERENCE_SECTION);
    prompt.push('\n');
    prompt.push_str(FORMAT_EXAMPLE);
    prompt
}

/// Returns the span from the first `[` to the last `]`, inclusive.
///
/// # Errors
///
/// Returns [`Error::MalformedOutput`] if either bracket is missing or the last
/// `]` precedes the first `[`.
pub fn locate_json_array(raw: &str) -> Result<&str> {
    let malformed = |reason: &str| Error::MalformedOutput {
        reason: reason.to_string(),
        raw: raw.to_string(),
    };

    let start = raw.find('[').ok_or_else(|| malformed("no '[' in output"))?;
    let end = raw.rfind(']').ok_or_else(|| malformed("no ']' in output"))?;
    if end < start {
        return Err(malformed("last ']' precedes first '['"));
    }
    Ok(&raw[start..=end])
}

/// Parses a located span as triple records.
///
/// Doubled braces (`{{`, `}}`) left by templated generations are collapsed
/// and the parse retried once.
///
/// # Errors
///
/// Returns [`Error::OutputParse`] carrying `raw` if neither attempt parses.
pub fn parse_json_array(candidate: &str, raw: &str) -> Result<Vec<ExtractedTriple>> {
    let first_error = match serde_json::from_str(candidate) {
        Ok(records) => return Ok(records),
        Err(e) => e,
    };

    if candidate.contains("{{") || candidate.contains("}}") {
        let collapsed = candidate.replace("{{", "{").replace("}}", "}");
        if let Ok(records) = serde_json::from_str(&collapsed) {
            tracing::debug!("Parsed output after collapsing doubled braces");
            return Ok(records);
        }
    }

    Err(Error::OutputParse {
        cause: first_error.to_string(),
        raw: raw.to_string(),
    })
}

/// Removes leading entity-type prefixes (`Disease:I10` becomes `I10`).
///
/// Only the known entity labels count as prefixes, matched case-insensitively,
/// and stacked prefixes are all removed. Other `word:` forms such as
/// `BP: 150/95` or URLs are identifiers and pass through unchanged.
#[must_use]
pub fn strip_type_prefix(value: &str) -> String {
    let Some(re) = TYPE_PREFIX.as_ref() else {
        return value.to_string();
    };

    let mut current = value;
    while let Some(id) = re.captures(current).and_then(|caps| caps.get(1)) {
        current = id.as_str();
    }
    current.to_string()
}

/// Recovers triple records from raw generated text.
///
/// # Errors
///
/// Returns [`Error::MalformedOutput`] or [`Error::OutputParse`].
pub fn parse_output(raw: &str) -> Result<Vec<ExtractedTriple>> {
    let candidate = locate_json_array(raw)?;
    let mut records = parse_json_array(candidate, raw)?;
    for record in &mut records {
        record.head = strip_type_prefix(&record.head);
        record.tail = strip_type_prefix(&record.tail);
    }
    Ok(records)
}

/// Extracts triples through a generative backend.
#[derive(Clone)]
pub struct TripleExtractor {
    llm: Arc<dyn LlmProvider>,
}

impl TripleExtractor {
    /// Creates an extractor over `llm`.
    #[must_use]
    pub fn new(llm: Arc<dyn LlmProvider>) -> Self {
        Self { llm }
    }

    /// Runs one extraction. No retry is attempted.
    ///
    /// # Errors
    ///
    /// Returns the backend's error, [`Error::MalformedOutput`] or [`Error::OutputParse`].
    #[instrument(
        skip(self, context, abstracts, facts),
        fields(operation = "triple_extraction.extract", provider = self.llm.name(), abstracts = abstracts.len())
    )]
    pub fn extract(
        &self,
        context: &str,
        abstracts: &[&str],
        facts: &[String],
    ) -> Result<Vec<ExtractedTriple>> {
        let start = Instant::now();
        let prompt = build_prompt(context, abstracts, facts);
        let result = self.llm.complete(&prompt).and_then(|raw| parse_output(&raw));

        let status = match &result {
            Ok(_) => "success",
            Err(Error::MalformedOutput { .. }) => "malformed",
            Err(Error::OutputParse { .. }) => "parse_error",
            Err(_) => "backend_error",
        };
        metrics::counter!("triple_extraction_total", "status" => status).increment(1);
        metrics::histogram!("triple_extraction_duration_ms", "status" => status)
            .record(start.elapsed().as_secs_f64() * 1000.0);

        match &result {
            Ok(records) => tracing::debug!(triples = records.len(), "Extracted triples"),
            Err(e) => tracing::warn!(error = %e, "Triple extraction failed"),
        }
        result
    }

    /// Runs [`extract`](Self::extract) under a caller-supplied retry policy.
    ///
    /// # Errors
    ///
    /// Returns the last attempt's error.
    pub fn extract_with_policy(
        &self,
        context: &str,
        abstracts: &[&str],
        facts: &[String],
        policy: &RetryPolicy,
    ) -> Result<Vec<ExtractedTriple>> {
        policy.run("triple_extraction", || self.extract(context, abstracts, facts))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;
    use std::time::Duration;
    use test_case::test_case;

    struct ScriptedLlm {
        replies: Mutex<Vec<Result<String>>>,
        prompts: Mutex<Vec<String>>,
    }

    impl ScriptedLlm {
        fn new(replies: Vec<Result<String>>) -> Self {
            Self {
                replies: Mutex::new(replies),
                prompts: Mutex::new(Vec::new()),
            }
        }
    }

    impl LlmProvider for ScriptedLlm {
        fn name(&self) -> &'static str {
            "scripted"
        }

        fn complete(&self, prompt: &str) -> Result<String> {
            self.prompts.lock().unwrap().push(prompt.to_string());
            self.replies.lock().unwrap().remove(0)
        }
    }

    const RECORD: &str = r#"{"head":"Patient:P1","head_type":"Patient","relation":"HAS_DISEASE","tail":"Disease:I10","tail_type":"Disease","source":"EHR"}"#;

    #[test]
    fn test_locate_ignores_surrounding_prose() {
        let raw = format!("Sure! Here you go:\n```json\n[{RECORD}]\n```\nDone.");
        let span = locate_json_array(&raw).unwrap();
        assert!(span.starts_with('['));
        assert!(span.ends_with(']'));
    }

    #[test_case("no brackets here" ; "no brackets")]
    #[test_case("only [ opening" ; "missing close")]
    #[test_case("only ] closing" ; "missing open")]
    #[test_case("] reversed [" ; "reversed")]
    fn test_locate_malformed(raw: &str) {
        let err = locate_json_array(raw).unwrap_err();
        assert!(matches!(err, Error::MalformedOutput { .. }), "{err:?}");
        assert_eq!(err.raw_output(), Some(raw));
    }

    #[test]
    fn test_parse_error_is_distinct() {
        let err = parse_output("prefix [not json] suffix").unwrap_err();
        assert!(matches!(err, Error::OutputParse { .. }));
        assert_eq!(err.raw_output(), Some("prefix [not json] suffix"));
    }

    #[test]
    fn test_parse_rejects_missing_required_field() {
        let raw = r#"[{"head":"P1","head_type":"Patient","relation":"HAS_DISEASE","tail_type":"Disease"}]"#;
        assert!(matches!(parse_output(raw), Err(Error::OutputParse { .. })));
    }

    #[test]
    fn test_parse_collapses_doubled_braces() {
        let raw = r#"[{{"head":"P1","head_type":"Patient","relation":"USED_DRUG","tail":"D1","tail_type":"Drug"}}]"#;
        let records = parse_output(raw).unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].tail, "D1");
        assert!(records[0].timestamp.is_none());
        assert!(records[0].source.is_none());
    }

    #[test]
    fn test_numeric_identifiers_are_stringified() {
        let raw = r#"[{"head":123456,"head_type":"Patient","relation":"HAS_LAB_RESULT","tail":7.5,"tail_type":"LabResult","timestamp":null}]"#;
        let records = parse_output(raw).unwrap();
        assert_eq!(records[0].head, "123456");
        assert_eq!(records[0].tail, "7.5");
        assert!(records[0].timestamp.is_none());
    }

    #[test]
    fn test_empty_array_is_valid() {
        assert!(parse_output("nothing to report: []").unwrap().is_empty());
    }

    #[test]
    fn test_prefixes_stripped() {
        let records = parse_output(&format!("[{RECORD}]")).unwrap();
        assert_eq!(records[0].head, "P1");
        assert_eq!(records[0].tail, "I10");
        assert_eq!(records[0].source.as_deref(), Some("EHR"));
    }

    #[test_case("Patient:P1", "P1" ; "patient")]
    #[test_case("Disease: I10", "I10" ; "space after colon")]
    #[test_case("LabResult:Glu=180 mg/dL", "Glu=180 mg/dL" ; "value with spaces")]
    #[test_case("lisinopril", "lisinopril" ; "no prefix")]
    #[test_case("12:30", "12:30" ; "numeric prefix kept")]
    #[test_case("Drug:", "Drug:" ; "empty identifier kept")]
    #[test_case("disease:I10", "I10" ; "label case ignored")]
    #[test_case("Patient:Patient:P1", "P1" ; "stacked prefixes")]
    #[test_case("LabResult:BP: 150/95", "BP: 150/95" ; "inner non type colon kept")]
    #[test_case("Hypertension: stage 2", "Hypertension: stage 2" ; "concept name kept")]
    #[test_case("BP: 150/95", "BP: 150/95" ; "measurement kept")]
    #[test_case("https://doi.org/10.1/x", "https://doi.org/10.1/x" ; "url kept")]
    fn test_strip_type_prefix(input: &str, expected: &str) {
        let stripped = strip_type_prefix(input);
        assert_eq!(stripped, expected);
        assert_eq!(strip_type_prefix(&stripped), stripped);
    }

    #[test]
    fn test_prompt_lists_inputs_and_vocabulary() {
        let facts = vec!["lisinopril treats hypertension".to_string()];
        let prompt = build_prompt("PatientID: P1", &["abstract one", "abstract two"], &facts);

        assert!(prompt.contains("Patient Context:\nPatientID: P1"));
        assert!(prompt.contains("abstract one\n---\nabstract two"));
        assert!(prompt.contains("Ontology Facts:\nlisinopril treats hypertension"));
        for entity in EntityType::ALL {
            assert!(prompt.contains(entity.as_str()));
        }
        for relation in RelationType::ALL {
            assert!(prompt.contains(relation.as_str()));
        }
    }

    #[test]
    fn test_prompt_without_facts_or_abstracts() {
        let prompt = build_prompt("ctx", &[], &[]);
        assert!(prompt.contains("PubMed Abstracts:\n\n"));
        assert!(!prompt.contains("Ontology Facts:"));
    }

    #[test]
    fn test_extract_does_not_retry() {
        let llm = Arc::new(ScriptedLlm::new(vec![
            Ok("I cannot help with that.".to_string()),
            Ok(format!("[{RECORD}]")),
        ]));
        let extractor = TripleExtractor::new(Arc::clone(&llm) as Arc<dyn LlmProvider>);

        let result = extractor.extract("ctx", &[], &[]);
        assert!(matches!(result, Err(Error::MalformedOutput { .. })));
        assert_eq!(llm.prompts.lock().unwrap().len(), 1);
    }

    #[test]
    fn test_extract_with_policy_retries_until_success() {
        let llm = Arc::new(ScriptedLlm::new(vec![
            Ok("garbage".to_string()),
            Ok(format!("```json\n[{RECORD}]\n```")),
        ]));
        let extractor = TripleExtractor::new(Arc::clone(&llm) as Arc<dyn LlmProvider>);
        let policy = RetryPolicy::new(2, Duration::ZERO);

        let records = extractor.extract_with_policy("ctx", &["abs"], &[], &policy).unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(llm.prompts.lock().unwrap().len(), 2);
    }

    #[test]
    fn test_backend_error_propagates() {
        let llm = Arc::new(ScriptedLlm::new(vec![Err(Error::SourceUnavailable {
            resource: "http://localhost:11434".to_string(),
            cause: "connection refused".to_string(),
        })]));
        let extractor = TripleExtractor::new(llm);
        assert!(matches!(
            extractor.extract("ctx", &[], &[]),
            Err(Error::SourceUnavailable { .. })
        ));
    }

    #[test]
    fn test_into_triple() {
        let record = parse_output(&format!("[{RECORD}]")).unwrap().remove(0);
        let triple = record.into_triple(TripleSource::PubMed, Some(0.5));
        assert_eq!(triple.head, "P1");
        assert_eq!(triple.source, TripleSource::PubMed);
        assert_eq!(triple.weight, Some(0.5));
    }
}
