//! Per-patient triple artifacts.
//!
//! Each triple is written to `<root>/<patient_id>/<relation>_<tail>.json`.
//! Names are sanitized so ids cannot escape the output directory; a name that
//! had to change carries a digest suffix so distinct ids never share a file.

use super::write_atomic;
use sha2::{Digest, Sha256};
use crate::models::Triple;
use crate::{Error, Result};
use std::fs;
use std::path::{Path, PathBuf};

/// Filesystem store for per-patient triple artifacts.
#[derive(Debug, Clone)]
pub struct TripleArtifactStore {
    root: PathBuf,
}

impl TripleArtifactStore {
    /// Creates a store rooted at `root`.
    #[must_use]
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Returns the root directory.
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Returns the directory holding a patient's artifacts.
    #[must_use]
    pub fn patient_dir(&self, patient_id: &str) -> PathBuf {
        self.root.join(safe_component(patient_id))
    }

    /// Returns the artifact path for one triple.
    #[must_use]
    pub fn artifact_path(&self, patient_id: &str, triple: &Triple) -> PathBuf {
        self.patient_dir(patient_id).join(format!(
            "{}_{}.json",
            safe_component(&triple.relation),
            safe_component(&triple.tail)
        ))
    }

    /// Writes each triple as its own JSON file. Returns the written paths.
    ///
    /// Triples sharing `(relation, tail)` overwrite each other; the last wins.
    ///
    /// # Errors
    ///
    /// Returns [`Error::SourceUnavailable`] if a directory or file cannot be written.
    pub fn persist(&self, patient_id: &str, triples: &[Triple]) -> Result<Vec<PathBuf>> {
        if triples.is_empty() {
            return Ok(Vec::new());
        }

        let dir = self.patient_dir(patient_id);
        fs::create_dir_all(&dir).map_err(|e| Error::SourceUnavailable {
            resource: dir.display().to_string(),
            cause: e.to_string(),
        })?;

        let mut written = Vec::with_capacity(triples.len());
        for triple in triples {
            let path = self.artifact_path(patient_id, triple);
            let json =
                serde_json::to_vec_pretty(triple).map_err(|e| Error::OperationFailed {
                    operation: "serialize_triple".to_string(),
                    cause: e.to_string(),
                })?;
            write_atomic(&path, &json).map_err(|e| Error::SourceUnavailable {
                resource: path.display().to_string(),
                cause: e.to_string(),
            })?;
            written.push(path);
        }

        tracing::debug!(patient_id, count = written.len(), dir = %dir.display(), "Persisted triple artifacts");
        Ok(written)
    }

    /// Reads back all artifacts of a patient, sorted by file name.
    ///
    /// # Errors
    ///
    /// Returns [`Error::SourceUnavailable`] if the directory or a file cannot be
    /// read, or [`Error::OperationFailed`] if a file is not a triple.
    pub fn load(&self, patient_id: &str) -> Result<Vec<Triple>> {
        let dir = self.patient_dir(patient_id);
        if !dir.exists() {
            return Ok(Vec::new());
        }

        let unavailable = |path: &Path, e: std::io::Error| Error::SourceUnavailable {
            resource: path.display().to_string(),
            cause: e.to_string(),
        };

        let mut paths: Vec<PathBuf> = fs::read_dir(&dir)
            .map_err(|e| unavailable(&dir, e))?
            .filter_map(std::result::Result::ok)
            .map(|entry| entry.path())
            .filter(|p| p.extension().is_some_and(|ext| ext == "json"))
            .collect();
        paths.sort();

        paths
            .iter()
            .map(|path| {
                let bytes = fs::read(path).map_err(|e| unavailable(path, e))?;
                serde_json::from_slice(&bytes).map_err(|e| Error::OperationFailed {
                    operation: "deserialize_triple".to_string(),
                    cause: format!("{}: {e}", path.display()),
                })
            })
            .collect()
    }
}

/// Longest sanitized name kept before the digest suffix.
const MAX_COMPONENT_CHARS: usize = 120;

/// Replaces every character other than Unicode alphanumerics, `-` and `_`
/// with `_`.
///
/// A name that had to change gets `-<digest>` appended (first 8 bytes of the
/// SHA-256 of the raw value), so distinct raw values stay distinct files.
fn safe_component(raw: &str) -> String {
    let cleaned: String = raw
        .chars()
        .map(|c| {
            if c.is_alphanumeric() || c == '-' || c == '_' {
                c
            } else {
                '_'
            }
        })
        .take(MAX_COMPONENT_CHARS)
        .collect();

    if !cleaned.is_empty() && cleaned == raw {
        return cleaned;
    }

    let digest = Sha256::digest(raw.as_bytes());
    let suffix = hex::encode(&digest[..8]);
    if cleaned.is_empty() {
        format!("_-{suffix}")
    } else {
        format!("{cleaned}-{suffix}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::TripleSource;

    fn triple(relation: &str, tail: &str) -> Triple {
        Triple::new("P1", "Patient", relation, tail, "Disease", TripleSource::PubMed)
            .with_weight(Some(0.8))
    }

    #[test]
    fn test_persist_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let store = TripleArtifactStore::new(dir.path());

        let triples = vec![triple("HAS_DISEASE", "I10"), triple("USED_DRUG", "metformin")];
        let paths = store.persist("P1", &triples).unwrap();

        assert_eq!(paths.len(), 2);
        assert!(dir.path().join("P1").join("HAS_DISEASE_I10.json").exists());
        assert!(dir.path().join("P1").join("USED_DRUG_metformin.json").exists());

        let loaded = store.load("P1").unwrap();
        assert_eq!(loaded, triples);
    }

    #[test]
    fn test_names_are_path_safe() {
        let store = TripleArtifactStore::new("/out");
        let path = store.artifact_path("../P1", &triple("HAS/DISEASE", "a b/../c"));

        assert_eq!(path.parent().unwrap().parent(), Some(Path::new("/out")));
        let dir = path.parent().unwrap().file_name().unwrap().to_str().unwrap();
        assert!(dir.starts_with("___P1-"), "{dir}");
        let file = path.file_name().unwrap().to_str().unwrap();
        assert!(file.starts_with("HAS_DISEASE-"), "{file}");
        assert!(!file.contains('/'));
    }

    #[test]
    fn test_clean_names_kept_verbatim() {
        assert_eq!(safe_component("E11_9"), "E11_9");
        assert_eq!(safe_component("高血壓"), "高血壓");
        assert_eq!(safe_component("metformin-xr"), "metformin-xr");
    }

    #[test]
    fn test_sanitized_names_get_stable_suffix() {
        let first = safe_component("E11.9");
        assert_eq!(first, safe_component("E11.9"));
        assert!(first.starts_with("E11_9-"));
        assert_eq!(first.len(), "E11_9-".len() + 16);
        assert_ne!(safe_component("a/b"), safe_component("a.b"));
        assert!(safe_component("").starts_with("_-"));
    }

    #[test]
    fn test_distinct_tails_never_share_a_file() {
        let dir = tempfile::tempdir().unwrap();
        let store = TripleArtifactStore::new(dir.path());

        let triples = vec![
            triple("HAS_DISEASE", "高血壓"),
            triple("HAS_DISEASE", "糖尿病"),
            triple("HAS_DISEASE", "E11.9"),
            triple("HAS_DISEASE", "E11_9"),
        ];
        let paths = store.persist("P1", &triples).unwrap();

        let unique: std::collections::HashSet<&PathBuf> = paths.iter().collect();
        assert_eq!(unique.len(), 4);

        let mut tails: Vec<String> = store.load("P1").unwrap().into_iter().map(|t| t.tail).collect();
        tails.sort();
        let mut expected: Vec<String> = triples.into_iter().map(|t| t.tail).collect();
        expected.sort();
        assert_eq!(tails, expected);
    }

    #[test]
    fn test_same_key_overwrites() {
        let dir = tempfile::tempdir().unwrap();
        let store = TripleArtifactStore::new(dir.path());

        let first = triple("TREATS", "I10");
        let second = triple("TREATS", "I10").with_weight(Some(0.1));
        store.persist("P1", &[first, second.clone()]).unwrap();

        assert_eq!(store.load("P1").unwrap(), vec![second]);
    }

    #[test]
    fn test_empty_persist_creates_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let store = TripleArtifactStore::new(dir.path());
        assert!(store.persist("P1", &[]).unwrap().is_empty());
        assert!(!dir.path().join("P1").exists());
        assert!(store.load("P1").unwrap().is_empty());
    }
}
