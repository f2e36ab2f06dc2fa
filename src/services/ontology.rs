//! Ontology store.
//!
//! Loads the controlled vocabulary from four tab-separated source files:
//!
//! | File | Content |
//! |------|---------|
//! | `concept.txt` | one concept id per line |
//! | `concept_name.txt` | `<id>\t<name>`, names lowercased on load |
//! | `relation.txt` | one relation type per line |
//! | `umls.csv` | `<relation>\t<concept_1>\t<concept_2>\t<weight>` |
//!
//! Each parsed table is cached as a JSON snapshot through
//! [`cache_or_build`]. The loaded [`OntologySnapshot`] is immutable and can be
//! shared across threads.

use crate::config::OntologyConfig;
use crate::models::{CodeMatch, RelationRecord};
use crate::storage::cache_or_build;
use crate::{Error, Result};
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::instrument;

/// Concept ids source file.
pub const CONCEPT_FILE: &str = "concept.txt";
/// Concept names source file.
pub const CONCEPT_NAME_FILE: &str = "concept_name.txt";
/// Relation types source file.
pub const RELATION_TYPE_FILE: &str = "relation.txt";
/// Relation triples source file.
pub const RELATION_TRIPLE_FILE: &str = "umls.csv";
/// Optional clinical code to concept mapping table.
pub const CODE_MAPPING_FILE: &str = "code_mapping.tsv";

/// Weight used when a relation row carries no parseable weight.
const DEFAULT_RELATION_WEIGHT: f64 = 1.0;

/// Maps clinical codes to ontology concept ids.
pub trait CodeMapper: Send + Sync {
    /// Returns `(code, concept_id)` pairs for the codes that map.
    ///
    /// Unmapped codes are omitted. Output follows input order.
    ///
    /// # Errors
    ///
    /// Returns an error if the mapping backend fails.
    fn map_codes(&self, codes: &[String]) -> Result<Vec<(String, String)>>;
}

/// Code mapper backed by an in-memory table.
#[derive(Debug, Clone, Default)]
pub struct TableCodeMapper {
    table: HashMap<String, String>,
}

impl TableCodeMapper {
    /// Builds a mapper from `(code, concept_id)` pairs. The first pair for a code wins.
    #[must_use]
    pub fn from_pairs<I, C, K>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (C, K)>,
        C: Into<String>,
        K: Into<String>,
    {
        let mut table = HashMap::new();
        for (code, concept) in pairs {
            table.entry(code.into()).or_insert_with(|| concept.into());
        }
        Self { table }
    }

    /// Loads a `<code>\t<concept_id>` table.
    ///
    /// # Errors
    ///
    /// Returns [`Error::SourceUnavailable`] if the file cannot be read.
    pub fn load(path: &Path) -> Result<Self> {
        let pairs = read_tsv(path)?
            .into_iter()
            .filter_map(|fields| match fields.as_slice() {
                [code, concept, ..] if !code.is_empty() && !concept.is_empty() => {
                    Some((code.clone(), concept.clone()))
                },
                _ => None,
            });
        Ok(Self::from_pairs(pairs))
    }

    /// Returns the number of mapped codes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.table.len()
    }

    /// Returns true if nothing is mapped.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.table.is_empty()
    }
}

impl CodeMapper for TableCodeMapper {
    fn map_codes(&self, codes: &[String]) -> Result<Vec<(String, String)>> {
        Ok(codes
            .iter()
            .filter_map(|code| {
                self.table
                    .get(code.trim())
                    .map(|concept| (code.clone(), concept.clone()))
            })
            .collect())
    }
}

/// Parsed ontology tables.
#[derive(Debug, Clone, Default)]
pub struct OntologySnapshot {
    concepts: Vec<String>,
    concept_names: HashMap<String, String>,
    relation_types: Vec<String>,
    relations: Vec<RelationRecord>,
    adjacency: HashMap<String, Vec<usize>>,
}

impl OntologySnapshot {
    /// Creates a snapshot from already-parsed tables.
    #[must_use]
    pub fn new(
        concepts: Vec<String>,
        concept_names: HashMap<String, String>,
        relation_types: Vec<String>,
        relations: Vec<RelationRecord>,
    ) -> Self {
        let mut snapshot = Self {
            concepts,
            concept_names,
            relation_types,
            relations,
            adjacency: HashMap::new(),
        };
        snapshot.index_relations();
        snapshot
    }

    /// Loads every table from `data_dir`, caching snapshots in `cache_dir`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::SourceUnavailable`] if a source file is missing and no
    /// snapshot exists for it.
    pub fn load(data_dir: &Path, cache_dir: &Path) -> Result<Self> {
        Ok(Self::new(
            load_concepts(data_dir, cache_dir)?,
            load_concept_names(data_dir, cache_dir)?,
            load_relation_types(data_dir, cache_dir)?,
            load_relation_triples(data_dir, cache_dir)?,
        ))
    }

    fn index_relations(&mut self) {
        let mut adjacency: HashMap<String, Vec<usize>> = HashMap::new();
        for (position, record) in self.relations.iter().enumerate() {
            adjacency
                .entry(record.concept_id_1.clone())
                .or_default()
                .push(position);
            if record.concept_id_2 != record.concept_id_1 {
                adjacency
                    .entry(record.concept_id_2.clone())
                    .or_default()
                    .push(position);
            }
        }
        self.adjacency = adjacency;
    }
}

/// Read-only ontology access: concepts, names, relations and code mapping.
pub struct OntologyStore {
    snapshot: OntologySnapshot,
    mapper: Option<Box<dyn CodeMapper>>,
}

impl std::fmt::Debug for OntologyStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OntologyStore")
            .field("concepts", &self.snapshot.concepts.len())
            .field("relations", &self.snapshot.relations.len())
            .field("has_code_mapper", &self.mapper.is_some())
            .finish()
    }
}

impl OntologyStore {
    /// Opens the ontology described by `config`.
    ///
    /// A `code_mapping.tsv` next to the source files is loaded as the code
    /// mapper when present.
    ///
    /// # Errors
    ///
    /// Returns [`Error::SourceUnavailable`] if a source file is missing and no
    /// snapshot exists for it.
    #[instrument(skip(config), fields(data_dir = %config.data_dir.display()))]
    pub fn open(config: &OntologyConfig) -> Result<Self> {
        let snapshot = OntologySnapshot::load(&config.data_dir, config.cache_dir())?;
        let mut store = Self::from_snapshot(snapshot);

        let mapping_path = config.data_dir.join(CODE_MAPPING_FILE);
        if mapping_path.exists() {
            let mapper = TableCodeMapper::load(&mapping_path)?;
            tracing::debug!(codes = mapper.len(), "Loaded code mapping table");
            store = store.with_code_mapper(Box::new(mapper));
        }

        tracing::info!(
            concepts = store.snapshot.concepts.len(),
            relations = store.snapshot.relations.len(),
            "Ontology loaded"
        );
        Ok(store)
    }

    /// Wraps an in-memory snapshot. No code mapper is attached.
    #[must_use]
    pub const fn from_snapshot(snapshot: OntologySnapshot) -> Self {
        Self {
            snapshot,
            mapper: None,
        }
    }

    /// Attaches a code mapper.
    #[must_use]
    pub fn with_code_mapper(mut self, mapper: Box<dyn CodeMapper>) -> Self {
        self.mapper = Some(mapper);
        self
    }

    /// Returns all concept ids in file order.
    #[must_use]
    pub fn concepts(&self) -> &[String] {
        &self.snapshot.concepts
    }

    /// Returns all relation types in file order.
    #[must_use]
    pub fn relation_types(&self) -> &[String] {
        &self.snapshot.relation_types
    }

    /// Returns the number of relation records.
    #[must_use]
    pub fn relation_count(&self) -> usize {
        self.snapshot.relations.len()
    }

    /// Returns the lowercased name of a concept, if it has one.
    #[must_use]
    pub fn name_of(&self, concept_id: &str) -> Option<&str> {
        self.snapshot.concept_names.get(concept_id).map(String::as_str)
    }

    /// Returns the concept name, falling back to the id itself.
    #[must_use]
    pub fn concept_name<'a>(&'a self, concept_id: &'a str) -> &'a str {
        self.name_of(concept_id).unwrap_or(concept_id)
    }

    /// Returns every relation touching `concept_id` on either side, in file order.
    #[must_use]
    pub fn query_relations(&self, concept_id: &str) -> Vec<&RelationRecord> {
        self.snapshot
            .adjacency
            .get(concept_id)
            .map(|positions| {
                positions
                    .iter()
                    .filter_map(|&p| self.snapshot.relations.get(p))
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Renders up to `limit` relations of a concept as `"<name> <relation> <name>"`.
    #[must_use]
    pub fn relation_facts(&self, concept_id: &str, limit: usize) -> Vec<String> {
        self.query_relations(concept_id)
            .into_iter()
            .take(limit)
            .map(|record| {
                format!(
                    "{} {} {}",
                    self.concept_name(&record.concept_id_1),
                    record.relation,
                    self.concept_name(&record.concept_id_2)
                )
            })
            .collect()
    }

    /// Maps clinical codes to named ontology concepts.
    ///
    /// Codes whose concept has no name are dropped.
    ///
    /// # Errors
    ///
    /// Returns [`Error::CapabilityUnavailable`] if no code mapper is attached.
    pub fn query_by_codes(&self, codes: &[String]) -> Result<Vec<CodeMatch>> {
        let mapper = self.mapper.as_ref().ok_or_else(|| {
            Error::CapabilityUnavailable("no clinical code mapper configured".to_string())
        })?;

        Ok(mapper
            .map_codes(codes)?
            .into_iter()
            .filter_map(|(code, concept_id)| {
                let name = self.name_of(&concept_id)?.to_string();
                Some(CodeMatch {
                    code,
                    concept_id,
                    name,
                })
            })
            .collect())
    }
}

/// Loads concept ids, one per non-empty line.
///
/// # Errors
///
/// Returns [`Error::SourceUnavailable`] if the source is missing and not cached.
pub fn load_concepts(data_dir: &Path, cache_dir: &Path) -> Result<Vec<String>> {
    cache_or_build(&cache_dir.join("concepts.json"), || {
        read_lines(&data_dir.join(CONCEPT_FILE))
    })
}

/// Loads `id → lowercased name`. Lines without a tab are skipped.
///
/// # Errors
///
/// Returns [`Error::SourceUnavailable`] if the source is missing and not cached.
pub fn load_concept_names(data_dir: &Path, cache_dir: &Path) -> Result<HashMap<String, String>> {
    cache_or_build(&cache_dir.join("concept_names.json"), || {
        let names = read_lines(&data_dir.join(CONCEPT_NAME_FILE))?
            .into_iter()
            .filter_map(|line| {
                line.split_once('\t')
                    .map(|(id, name)| (id.trim().to_string(), name.trim().to_lowercase()))
            })
            .collect();
        Ok(names)
    })
}

/// Loads relation type labels, one per non-empty line.
///
/// # Errors
///
/// Returns [`Error::SourceUnavailable`] if the source is missing and not cached.
pub fn load_relation_types(data_dir: &Path, cache_dir: &Path) -> Result<Vec<String>> {
    cache_or_build(&cache_dir.join("relation_types.json"), || {
        read_lines(&data_dir.join(RELATION_TYPE_FILE))
    })
}

/// Loads relation triples.
///
/// Rows with fewer than four fields are skipped. An unparseable weight
/// becomes `1.0`.
///
/// # Errors
///
/// Returns [`Error::SourceUnavailable`] if the source is missing and not cached.
pub fn load_relation_triples(data_dir: &Path, cache_dir: &Path) -> Result<Vec<RelationRecord>> {
    cache_or_build(&cache_dir.join("relation_triples.json"), || {
        let records = read_tsv(&data_dir.join(RELATION_TRIPLE_FILE))?
            .into_iter()
            .filter_map(|fields| match fields.as_slice() {
                [relation, c1, c2, weight, ..] => Some(RelationRecord {
                    relation: relation.clone(),
                    concept_id_1: c1.clone(),
                    concept_id_2: c2.clone(),
                    weight: weight.parse().unwrap_or(DEFAULT_RELATION_WEIGHT),
                }),
                _ => None,
            })
            .collect();
        Ok(records)
    })
}

fn source_unavailable(path: &Path, cause: impl ToString) -> Error {
    Error::SourceUnavailable {
        resource: path.display().to_string(),
        cause: cause.to_string(),
    }
}

fn read_lines(path: &Path) -> Result<Vec<String>> {
    let content = fs::read_to_string(path).map_err(|e| source_unavailable(path, e))?;
    Ok(content
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(str::to_string)
        .collect())
}

fn read_tsv(path: &Path) -> Result<Vec<Vec<String>>> {
    let mut reader = csv::ReaderBuilder::new()
        .delimiter(b'\t')
        .has_headers(false)
        .flexible(true)
        .quoting(false)
        .from_path(path)
        .map_err(|e| source_unavailable(path, e))?;

    let mut rows = Vec::new();
    for record in reader.records() {
        let record = record.map_err(|e| source_unavailable(path, e))?;
        rows.push(record.iter().map(|field| field.trim().to_string()).collect());
    }
    Ok(rows)
}

/// Returns the source file paths for a data directory.
#[must_use]
pub fn source_files(data_dir: &Path) -> [PathBuf; 4] {
    [
        data_dir.join(CONCEPT_FILE),
        data_dir.join(CONCEPT_NAME_FILE),
        data_dir.join(RELATION_TYPE_FILE),
        data_dir.join(RELATION_TRIPLE_FILE),
    ]
}
