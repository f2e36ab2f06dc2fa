//! Cache-or-build snapshots.
//!
//! Parsing large ontology files is slow, so each parsed table is written to a
//! JSON snapshot next to the sources (or in a configured cache directory).
//! Later process starts read the snapshot instead.

use super::write_atomic;
use crate::Result;
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::fs;
use std::path::Path;

/// Returns the snapshot at `cache_path`, or runs `build` and writes one.
///
/// An unreadable or corrupt snapshot is rebuilt. A snapshot that cannot be
/// written only logs a warning; the built value is still returned.
///
/// # Errors
///
/// Returns whatever `build` returns.
pub fn cache_or_build<T, F>(cache_path: &Path, build: F) -> Result<T>
where
    T: Serialize + DeserializeOwned,
    F: FnOnce() -> Result<T>,
{
    if cache_path.exists() {
        match read_snapshot(cache_path) {
            Ok(value) => {
                tracing::debug!(path = %cache_path.display(), "Loaded snapshot");
                return Ok(value);
            },
            Err(e) => {
                tracing::warn!(
                    path = %cache_path.display(),
                    error = %e,
                    "Discarding unreadable snapshot"
                );
            },
        }
    }

    let value = build()?;

    match serde_json::to_vec(&value) {
        Ok(bytes) => {
            if let Err(e) = write_atomic(cache_path, &bytes) {
                tracing::warn!(
                    path = %cache_path.display(),
                    error = %e,
                    "Failed to write snapshot"
                );
            }
        },
        Err(e) => {
            tracing::warn!(path = %cache_path.display(), error = %e, "Failed to serialize snapshot");
        },
    }

    Ok(value)
}

fn read_snapshot<T: DeserializeOwned>(path: &Path) -> std::result::Result<T, String> {
    let bytes = fs::read(path).map_err(|e| e.to_string())?;
    serde_json::from_slice(&bytes).map_err(|e| e.to_string())
}
