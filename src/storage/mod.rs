//! Storage layer.
//!
//! - **Vector**: nearest-neighbor indexes over unit-normalized embeddings
//! - **Snapshot**: cache-or-build JSON snapshots of parsed ontology tables
//! - **Artifacts**: per-patient triple files

pub mod artifacts;
pub mod snapshot;
pub mod traits;
pub mod vector;

pub use artifacts::TripleArtifactStore;
pub use snapshot::cache_or_build;
pub use traits::VectorIndex;
pub use vector::FlatIndex;
#[cfg(feature = "usearch-hnsw")]
pub use vector::UsearchIndex;

use std::fs;
use std::io::{self, Write};
use std::path::Path;

/// Writes `bytes` to `path` through a sibling temp file and a rename.
///
/// Readers never observe a partially written file.
pub(crate) fn write_atomic(path: &Path, bytes: &[u8]) -> io::Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }

    let mut tmp_name = path.file_name().unwrap_or_default().to_os_string();
    tmp_name.push(format!(".{}.tmp", std::process::id()));
    let tmp_path = path.with_file_name(tmp_name);

    let result = (|| {
        let mut file = fs::File::create(&tmp_path)?;
        file.write_all(bytes)?;
        file.sync_all()?;
        fs::rename(&tmp_path, path)
    })();

    if result.is_err() {
        let _ = fs::remove_file(&tmp_path);
    }
    result
}
