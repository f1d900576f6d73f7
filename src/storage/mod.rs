//! Run Output Storage
//!
//! Two kinds of files leave a run:
//!
//! - **Artifacts**: one JSON blob per completed unit, named by unit index,
//!   plus one `.metadata` blob per output directory (see [`ArtifactStore`]).
//! - **Lists**: newline-delimited unit identifiers (unit list input, done
//!   and error lists). Done/error lists are append-merged as a set union so
//!   reruns and parallel workers never duplicate entries.

pub mod artifacts;
pub mod lists;

pub use artifacts::{ArtifactFormat, ArtifactStore};
pub use lists::{append_merge, read_list, write_list, OutcomeLists};

use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};

static TMP_COUNTER: AtomicU64 = AtomicU64::new(0);

/// Storage errors
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("serialization error on {path}: {source}")]
    Serialization {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

impl StorageError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    pub(crate) fn serialization(path: impl Into<PathBuf>, source: serde_json::Error) -> Self {
        Self::Serialization {
            path: path.into(),
            source,
        }
    }
}

/// Write a file atomically (temp file alongside the target, then rename).
///
/// Temp names are unique per call, so concurrent writers of the same target
/// never share one; the last rename wins.
pub(crate) fn write_atomic(path: &std::path::Path, bytes: &[u8]) -> Result<(), StorageError> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent).map_err(|e| StorageError::io(parent, e))?;
        }
    }
    let mut tmp_name = path.file_name().map(|n| n.to_os_string()).unwrap_or_default();
    tmp_name.push(format!(
        ".{}.{}.tmp",
        std::process::id(),
        TMP_COUNTER.fetch_add(1, Ordering::Relaxed)
    ));
    let tmp_path = path.with_file_name(tmp_name);

    std::fs::write(&tmp_path, bytes).map_err(|e| StorageError::io(&tmp_path, e))?;
    std::fs::rename(&tmp_path, path).map_err(|e| StorageError::io(path, e))?;
    Ok(())
}
