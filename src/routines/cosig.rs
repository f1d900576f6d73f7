//! Cut cleaning, coincidence detection and event extraction routines.

use crate::coincidence::{CoincidenceDetector, CoincidenceSet};
use crate::cuts::ChannelCuts;
use crate::events::{Event, EventExtractor};
use crate::geometry::PixelCatalog;
use crate::pipeline::{
    DataStore, ExecutionSignal, Routine, RoutineError, RunContext, StoreKey, UnitContext,
};
use crate::storage::ArtifactStore;
use std::sync::Arc;
use tracing::debug;

// ============================================================================
// CleanCuts
// ============================================================================

/// Trims cuts near the recording edges and removes a second cut set.
///
/// Reads and rewrites `key` in place.
pub struct CleanCuts {
    key: StoreKey<ChannelCuts>,
    edge_threshold: Option<usize>,
    remove: Option<(ArtifactStore, usize)>,
}

impl CleanCuts {
    pub fn new(key: StoreKey<ChannelCuts>) -> Self {
        Self {
            key,
            edge_threshold: None,
            remove: None,
        }
    }

    /// Drop intervals starting within `threshold` samples of the start or
    /// ending within `threshold` samples of the end.
    #[must_use]
    pub fn trim_edges(mut self, threshold: usize) -> Self {
        self.edge_threshold = Some(threshold);
        self
    }

    /// Drop intervals overlapping the unit's cuts from `artifacts`, widened
    /// by `buffer` samples.
    #[must_use]
    pub fn remove_from(mut self, artifacts: ArtifactStore, buffer: usize) -> Self {
        self.remove = Some((artifacts, buffer));
        self
    }
}

impl Routine for CleanCuts {
    fn name(&self) -> &str {
        "CleanCuts"
    }

    fn initialize(&mut self, _run: &RunContext<'_>) -> Result<(), RoutineError> {
        if let Some((artifacts, _)) = &self.remove {
            if !artifacts.dir().is_dir() {
                return Err(RoutineError::Config(format!(
                    "removal cut directory {} does not exist",
                    artifacts.dir().display()
                )));
            }
        }
        Ok(())
    }

    fn execute(
        &mut self,
        unit: &UnitContext<'_>,
        store: &mut DataStore,
    ) -> Result<ExecutionSignal, RoutineError> {
        let mut cuts = store.take(&self.key)?;
        let before = cuts.interval_count();

        if let Some(threshold) = self.edge_threshold {
            cuts = cuts.trim_edges(threshold);
        }
        if let Some((artifacts, buffer)) = &self.remove {
            match artifacts.load::<ChannelCuts>(unit.index())? {
                Some(to_remove) => cuts = cuts.difference(&to_remove, *buffer),
                None => debug!(index = unit.index(), "No removal cuts for unit"),
            }
        }

        debug!(
            index = unit.index(),
            before,
            after = cuts.interval_count(),
            "Cuts cleaned"
        );
        store.put(&self.key, cuts);
        Ok(ExecutionSignal::Continue)
    }
}

// ============================================================================
// FindCoincidences
// ============================================================================

/// Combines channel cuts into per-pixel coincidences.
///
/// The pixel map is chosen by the unit's array name.
pub struct FindCoincidences {
    catalog: Arc<PixelCatalog>,
    detector: CoincidenceDetector,
    input: StoreKey<ChannelCuts>,
    output: StoreKey<CoincidenceSet>,
    save: Option<ArtifactStore>,
}

impl FindCoincidences {
    pub fn new(
        catalog: Arc<PixelCatalog>,
        detector: CoincidenceDetector,
        input: StoreKey<ChannelCuts>,
        output: StoreKey<CoincidenceSet>,
    ) -> Self {
        Self {
            catalog,
            detector,
            input,
            output,
            save: None,
        }
    }

    /// Also persist the coincidences of every unit.
    #[must_use]
    pub fn with_save(mut self, artifacts: ArtifactStore) -> Self {
        self.save = Some(artifacts);
        self
    }
}

impl Routine for FindCoincidences {
    fn name(&self) -> &str {
        "FindCoincidences"
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
        let array = unit.array().unwrap_or_default();
        let grouping = self
            .catalog
            .resolve(array)
            .ok_or_else(|| RoutineError::NoPixelMap(array.to_string()))?;

        let coincidences = self.detector.detect(store.get(&self.input)?, grouping);
        debug!(
            index = unit.index(),
            array,
            pixels = coincidences.len(),
            "Coincidences found"
        );
        if let Some(artifacts) = &self.save {
            artifacts.save(unit.index(), &coincidences)?;
        }
        store.put(&self.output, coincidences);
        Ok(ExecutionSignal::Continue)
    }
}

// ============================================================================
// FindEvents
// ============================================================================

/// Extracts events from the unit's coincidences.
pub struct FindEvents {
    extractor: EventExtractor,
    input: StoreKey<CoincidenceSet>,
    output: StoreKey<Vec<Event>>,
}

impl FindEvents {
    pub fn new(
        extractor: EventExtractor,
        input: StoreKey<CoincidenceSet>,
        output: StoreKey<Vec<Event>>,
    ) -> Self {
        Self {
            extractor,
            input,
            output,
        }
    }
}

impl Routine for FindEvents {
    fn name(&self) -> &str {
        "FindEvents"
    }

    fn execute(
        &mut self,
        unit: &UnitContext<'_>,
        store: &mut DataStore,
    ) -> Result<ExecutionSignal, RoutineError> {
        let events = self.extractor.extract(unit.index(), store.get(&self.input)?);
        debug!(index = unit.index(), events = events.len(), "Events extracted");
        store.put(&self.output, events);
        Ok(ExecutionSignal::Continue)
    }
}
