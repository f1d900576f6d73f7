//! Recording loaders.

use super::{AcquisitionError, Recording};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Source of raw recordings, keyed by unit identifier.
pub trait RecordingLoader: Send + Sync {
    fn load(&self, unit: &str) -> Result<Recording, AcquisitionError>;
}

/// Recordings held in memory.
#[derive(Debug, Clone, Default)]
pub struct InMemoryLoader {
    recordings: HashMap<String, Recording>,
}

impl InMemoryLoader {
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_recording(mut self, unit: impl Into<String>, recording: Recording) -> Self {
        self.recordings.insert(unit.into(), recording);
        self
    }

    pub fn insert(&mut self, unit: impl Into<String>, recording: Recording) {
        self.recordings.insert(unit.into(), recording);
    }
}

impl RecordingLoader for InMemoryLoader {
    fn load(&self, unit: &str) -> Result<Recording, AcquisitionError> {
        self.recordings
            .get(unit)
            .cloned()
            .ok_or_else(|| AcquisitionError::NotFound(unit.to_string()))
    }
}

/// Recordings stored as `{dir}/{unit}.json`.
///
/// A unit given as a path is looked up by its file name.
#[derive(Debug, Clone)]
pub struct JsonDirLoader {
    dir: PathBuf,
}

impl JsonDirLoader {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    fn path_for(&self, unit: &str) -> PathBuf {
        let name = Path::new(unit)
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or(unit);
        self.dir.join(format!("{name}.json"))
    }
}

impl RecordingLoader for JsonDirLoader {
    fn load(&self, unit: &str) -> Result<Recording, AcquisitionError> {
        let path = self.path_for(unit);
        if !path.exists() {
            return Err(AcquisitionError::NotFound(path.display().to_string()));
        }
        let raw = std::fs::read(&path).map_err(|source| AcquisitionError::Io {
            path: path.clone(),
            source,
        })?;
        let recording: Recording = serde_json::from_slice(&raw).map_err(|source| AcquisitionError::Decode {
            path: path.clone(),
            source,
        })?;
        recording.validate()?;
        debug!(path = %path.display(), channels = recording.channel_count(), "Recording loaded");
        Ok(recording)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_in_memory_loader() {
        let loader = InMemoryLoader::new().with_recording("u1", Recording::new(10));
        assert_eq!(loader.load("u1").unwrap().nsamps, 10);
        assert!(matches!(loader.load("u2"), Err(AcquisitionError::NotFound(_))));
    }

    #[test]
    fn test_json_dir_loader_uses_basename() {
        let tmp = tempfile::tempdir().unwrap();
        let rec = Recording::new(3).with_channel(0, vec![1.0, 2.0, 3.0]).unwrap();
        std::fs::write(
            tmp.path().join("100.200.ar1.json"),
            serde_json::to_vec(&rec).unwrap(),
        )
        .unwrap();

        let loader = JsonDirLoader::new(tmp.path());
        assert_eq!(loader.load("/raw/season/100.200.ar1").unwrap(), rec);
        assert!(matches!(loader.load("missing"), Err(AcquisitionError::NotFound(_))));
    }
}
