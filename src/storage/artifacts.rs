//! Per-unit artifact files.
//!
//! Layout of one output directory:
//!
//! ```text
//! {dir}/
//!   .metadata          run metadata (JSON, zstd when compressed)
//!   0.json             artifact of unit 0
//!   1.json
//!   ...                (or N.json.zst when compressed)
//! ```

use super::{write_atomic, StorageError};
use crate::pipeline::Metadata;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

const METADATA_FILE: &str = ".metadata";
const ZSTD_LEVEL: i32 = 3;

/// On-disk encoding of artifacts.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ArtifactFormat {
    #[default]
    Json,
    JsonZstd,
}

impl ArtifactFormat {
    pub const fn from_compress(compress: bool) -> Self {
        if compress {
            Self::JsonZstd
        } else {
            Self::Json
        }
    }

    pub const fn extension(self) -> &'static str {
        match self {
            Self::Json => "json",
            Self::JsonZstd => "json.zst",
        }
    }
}

/// One directory of per-unit artifacts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArtifactStore {
    dir: PathBuf,
    format: ArtifactFormat,
}

impl ArtifactStore {
    pub fn new(dir: impl Into<PathBuf>, format: ArtifactFormat) -> Self {
        Self {
            dir: dir.into(),
            format,
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub const fn format(&self) -> ArtifactFormat {
        self.format
    }

    /// Create the directory if it does not exist yet.
    pub fn ensure_dir(&self) -> Result<(), StorageError> {
        if !self.dir.exists() {
            info!(dir = %self.dir.display(), "Creating output directory");
            std::fs::create_dir_all(&self.dir).map_err(|e| StorageError::io(&self.dir, e))?;
        }
        Ok(())
    }

    pub fn path_for(&self, index: usize) -> PathBuf {
        self.dir.join(format!("{index}.{}", self.format.extension()))
    }

    pub fn metadata_path(&self) -> PathBuf {
        self.dir.join(METADATA_FILE)
    }

    pub fn exists(&self, index: usize) -> bool {
        self.path_for(index).exists()
    }

    /// Persist the artifact of unit `index`, replacing any previous one.
    pub fn save<T: Serialize + ?Sized>(&self, index: usize, value: &T) -> Result<PathBuf, StorageError> {
        let path = self.path_for(index);
        self.write_value(&path, value)?;
        debug!(path = %path.display(), "Artifact saved");
        Ok(path)
    }

    /// Load the artifact of unit `index`.
    ///
    /// Returns `None` when the file is missing or holds `null`.
    pub fn load<T: DeserializeOwned>(&self, index: usize) -> Result<Option<T>, StorageError> {
        let path = self.path_for(index);
        if !path.exists() {
            return Ok(None);
        }
        self.read_value(&path)
    }

    pub fn save_metadata(&self, metadata: &Metadata) -> Result<PathBuf, StorageError> {
        let path = self.metadata_path();
        self.write_value(&path, metadata)?;
        info!(path = %path.display(), keys = metadata.len(), "Metadata saved");
        Ok(path)
    }

    pub fn load_metadata(&self) -> Result<Option<Metadata>, StorageError> {
        let path = self.metadata_path();
        if !path.exists() {
            return Ok(None);
        }
        self.read_value(&path)
    }

    fn write_value<T: Serialize + ?Sized>(&self, path: &Path, value: &T) -> Result<(), StorageError> {
        let json = serde_json::to_vec(value).map_err(|e| StorageError::serialization(path, e))?;
        let bytes = match self.format {
            ArtifactFormat::Json => json,
            ArtifactFormat::JsonZstd => {
                zstd::encode_all(json.as_slice(), ZSTD_LEVEL).map_err(|e| StorageError::io(path, e))?
            }
        };
        write_atomic(path, &bytes)
    }

    fn read_value<T: DeserializeOwned>(&self, path: &Path) -> Result<Option<T>, StorageError> {
        let raw = std::fs::read(path).map_err(|e| StorageError::io(path, e))?;
        let json = match self.format {
            ArtifactFormat::Json => raw,
            ArtifactFormat::JsonZstd => {
                zstd::decode_all(raw.as_slice()).map_err(|e| StorageError::io(path, e))?
            }
        };
        serde_json::from_slice(&json).map_err(|e| StorageError::serialization(path, e))
    }
}
