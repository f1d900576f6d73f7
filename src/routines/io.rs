//! Artifact loading, saving and inspection.

use crate::pipeline::{
    DataStore, ExecutionSignal, Metadata, Routine, RoutineError, RunContext, StoreKey, UnitContext,
};
use crate::storage::ArtifactStore;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::any::Any;
use std::fmt::Debug;
use tracing::{debug, info};

// ============================================================================
// LoadData
// ============================================================================

/// Loads `{dir}/{index}.json[.zst]` into a store key.
///
/// Vetoes the unit when the artifact is missing or holds `null`. A corrupt
/// artifact fails the unit.
pub struct LoadData<T> {
    artifacts: ArtifactStore,
    key: StoreKey<T>,
    metadata: Option<Metadata>,
}

impl<T> LoadData<T> {
    pub fn new(artifacts: ArtifactStore, key: StoreKey<T>) -> Self {
        Self {
            artifacts,
            key,
            metadata: None,
        }
    }

    /// Metadata found next to the artifacts at initialize.
    pub fn source_metadata(&self) -> Option<&Metadata> {
        self.metadata.as_ref()
    }
}

impl<T: DeserializeOwned + Any + Send> Routine for LoadData<T> {
    fn name(&self) -> &str {
        "LoadData"
    }

    fn initialize(&mut self, _run: &RunContext<'_>) -> Result<(), RoutineError> {
        if !self.artifacts.dir().is_dir() {
            return Err(RoutineError::Config(format!(
                "input directory {} does not exist",
                self.artifacts.dir().display()
            )));
        }
        self.metadata = self.artifacts.load_metadata()?;
        if let Some(meta) = &self.metadata {
            info!(
                dir = %self.artifacts.dir().display(),
                keys = meta.len(),
                "Loaded source metadata"
            );
        }
        Ok(())
    }

    fn execute(
        &mut self,
        unit: &UnitContext<'_>,
        store: &mut DataStore,
    ) -> Result<ExecutionSignal, RoutineError> {
        let index = unit.index();
        if !self.artifacts.exists(index) {
            info!(index, unit = unit.id(), "[LoadData] Artifact not found, skipping unit");
            return Ok(ExecutionSignal::Veto);
        }
        match self.artifacts.load::<T>(index)? {
            Some(value) => {
                store.put(&self.key, value);
                Ok(ExecutionSignal::Continue)
            }
            None => {
                info!(index, unit = unit.id(), "[LoadData] Artifact is empty, skipping unit");
                Ok(ExecutionSignal::Veto)
            }
        }
    }
}

// ============================================================================
// SaveData
// ============================================================================

/// Persists a store key per unit and the run metadata at finalize.
pub struct SaveData<T> {
    artifacts: ArtifactStore,
    key: StoreKey<T>,
    saved: usize,
}

impl<T> SaveData<T> {
    pub fn new(artifacts: ArtifactStore, key: StoreKey<T>) -> Self {
        Self {
            artifacts,
            key,
            saved: 0,
        }
    }

    pub const fn saved(&self) -> usize {
        self.saved
    }
}

impl<T: Serialize + Any + Send> Routine for SaveData<T> {
    fn name(&self) -> &str {
        "SaveData"
    }

    fn initialize(&mut self, _run: &RunContext<'_>) -> Result<(), RoutineError> {
        self.artifacts.ensure_dir()?;
        Ok(())
    }

    fn execute(
        &mut self,
        unit: &UnitContext<'_>,
        store: &mut DataStore,
    ) -> Result<ExecutionSignal, RoutineError> {
        let value = store.get(&self.key)?;
        let path = self.artifacts.save(unit.index(), value)?;
        debug!(index = unit.index(), path = %path.display(), key = %self.key, "Saved");
        self.saved += 1;
        Ok(ExecutionSignal::Continue)
    }

    fn finalize(&mut self, run: &RunContext<'_>) -> Result<(), RoutineError> {
        self.artifacts.save_metadata(run.metadata)?;
        info!(
            dir = %self.artifacts.dir().display(),
            saved = self.saved,
            worker = run.worker,
            "[SaveData] Finished"
        );
        Ok(())
    }
}

// ============================================================================
// LogKey
// ============================================================================

/// Debug-prints a store key for every unit.
pub struct LogKey<T> {
    key: StoreKey<T>,
}

impl<T> LogKey<T> {
    pub fn new(key: StoreKey<T>) -> Self {
        Self { key }
    }
}

impl<T: Debug + Any + Send> Routine for LogKey<T> {
    fn name(&self) -> &str {
        "LogKey"
    }

    fn execute(
        &mut self,
        unit: &UnitContext<'_>,
        store: &mut DataStore,
    ) -> Result<ExecutionSignal, RoutineError> {
        let value = store.get(&self.key)?;
        debug!(index = unit.index(), key = %self.key, value = ?value, "Store value");
        Ok(ExecutionSignal::Continue)
    }
}
