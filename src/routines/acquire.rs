//! Raw recording loading and cut compilation.

use crate::acquisition::{AcquisitionError, FlagDetector, Recording, RecordingLoader};
use crate::cuts::ChannelCuts;
use crate::pipeline::{
    DataStore, ExecutionSignal, Routine, RoutineError, RunContext, StoreKey, UnitContext,
};
use crate::storage::ArtifactStore;
use std::sync::Arc;
use tracing::{debug, warn};

/// Reads a unit's raw recording through a [`RecordingLoader`].
///
/// A recording the loader does not know vetoes the unit.
pub struct LoadRecording {
    loader: Arc<dyn RecordingLoader>,
    key: StoreKey<Recording>,
}

impl LoadRecording {
    pub fn new(loader: Arc<dyn RecordingLoader>, key: StoreKey<Recording>) -> Self {
        Self { loader, key }
    }
}

impl Routine for LoadRecording {
    fn name(&self) -> &str {
        "LoadRecording"
    }

    fn execute(
        &mut self,
        unit: &UnitContext<'_>,
        store: &mut DataStore,
    ) -> Result<ExecutionSignal, RoutineError> {
        match self.loader.load(unit.id()) {
            Ok(recording) => {
                debug!(
                    index = unit.index(),
                    nsamps = recording.nsamps,
                    channels = recording.channel_count(),
                    "Recording loaded"
                );
                store.put(&self.key, recording);
                Ok(ExecutionSignal::Continue)
            }
            Err(AcquisitionError::NotFound(what)) => {
                warn!(index = unit.index(), unit = unit.id(), missing = %what, "Recording not found, skipping unit");
                Ok(ExecutionSignal::Veto)
            }
            Err(e) => Err(e.into()),
        }
    }
}

/// Turns a stored recording into per-channel cuts.
pub struct CompileCuts {
    detector: Box<dyn FlagDetector>,
    input: StoreKey<Recording>,
    output: StoreKey<ChannelCuts>,
    save: Option<ArtifactStore>,
}

impl CompileCuts {
    pub fn new(
        detector: Box<dyn FlagDetector>,
        input: StoreKey<Recording>,
        output: StoreKey<ChannelCuts>,
    ) -> Self {
        Self {
            detector,
            input,
            output,
            save: None,
        }
    }

    /// Also persist the cuts of every unit.
    #[must_use]
    pub fn with_save(mut self, artifacts: ArtifactStore) -> Self {
        self.save = Some(artifacts);
        self
    }
}

impl Routine for CompileCuts {
    fn name(&self) -> &str {
        "CompileCuts"
    }

    fn initialize(&mut self, _run: &RunContext<'_>) -> Result<(), RoutineError> {
        if let Some(artifacts) = &self.save {
            artifacts.ensure_dir()?;
        }
        Ok(())
    }

    fn execute(
        &mut self,
        unit: &UnitContext<'_>,
        store: &mut DataStore,
    ) -> Result<ExecutionSignal, RoutineError> {
        let cuts = self.detector.detect(store.get(&self.input)?);
        debug!(
            index = unit.index(),
            channels = cuts.channel_count(),
            intervals = cuts.interval_count(),
            "Cuts compiled"
        );
        if let Some(artifacts) = &self.save {
            artifacts.save(unit.index(), &cuts)?;
        }
        store.put(&self.output, cuts);
        Ok(ExecutionSignal::Continue)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::acquisition::{InMemoryLoader, ThresholdFlagDetector};
    use crate::pipeline::Metadata;
    use crate::routines::keys;
    use crate::storage::ArtifactFormat;

    fn spiky_recording() -> Recording {
        let samples: Vec<f64> = (0..500).map(|i| if i == 250 { 50.0 } else { 0.0 }).collect();
        Recording::new(500)
            .with_channel(0, samples.clone())
            .unwrap()
            .with_channel(1, samples)
            .unwrap()
    }

    #[test]
    fn test_load_then_compile() {
        let tmp = tempfile::tempdir().unwrap();
        let meta = Metadata::new();
        let loader = Arc::new(InMemoryLoader::new().with_recording("u0", spiky_recording()));

        let mut load = LoadRecording::new(loader, keys::RECORDING);
        let mut compile = CompileCuts::new(
            Box::new(ThresholdFlagDetector::default()),
            keys::RECORDING,
            keys::CUTS,
        )
        .with_save(ArtifactStore::new(tmp.path(), ArtifactFormat::Json));
        compile
            .initialize(&RunContext {
                metadata: &meta,
                unit_count: 1,
                worker: 0,
            })
            .unwrap();

        let unit = UnitContext::new(0, "u0", false, &meta);
        let mut store = DataStore::new();
        assert_eq!(load.execute(&unit, &mut store).unwrap(), ExecutionSignal::Continue);
        assert_eq!(compile.execute(&unit, &mut store).unwrap(), ExecutionSignal::Continue);

        let cuts = store.get(&keys::CUTS).unwrap();
        assert_eq!(cuts.channel_count(), 2);
        assert!(tmp.path().join("0.json").exists());
    }

    #[test]
    fn test_unknown_recording_vetoes() {
        let meta = Metadata::new();
        let mut load = LoadRecording::new(Arc::new(InMemoryLoader::new()), keys::RECORDING);
        let unit = UnitContext::new(3, "nope", false, &meta);
        assert_eq!(
            load.execute(&unit, &mut DataStore::new()).unwrap(),
            ExecutionSignal::Veto
        );
    }
}
