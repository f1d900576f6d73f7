//! Concrete pipeline routines.
//!
//! ## Standard event pipeline
//!
//! ```text
//! LoadData<ChannelCuts>   cuts_dir/{index}.json        ─▶ "cuts"
//! CleanCuts               "cuts"                       ─▶ "cuts"
//! FindCoincidences        "cuts" + pixel map           ─▶ "cosig"
//! FindEvents              "cosig"                      ─▶ "events"
//! NPixelFilter            "events"                     ─▶ "events"
//! DurationFilter          "events"                     ─▶ "events"
//! NEventsFilter           "events"
//! SaveData<Vec<Event>>    "events"                     ─▶ output.dir/{index}.json
//! ```

pub mod acquire;
pub mod cosig;
pub mod filters;
pub mod io;

pub use acquire::{CompileCuts, LoadRecording};
pub use cosig::{CleanCuts, FindCoincidences, FindEvents};
pub use filters::{DurationFilter, FilterStats, NEventsFilter, NPixelFilter, UnitSelector};
pub use io::{LoadData, LogKey, SaveData};

use crate::coincidence::CoincidenceDetector;
use crate::config::RunConfig;
use crate::events::EventExtractor;
use crate::geometry::PixelCatalog;
use crate::pipeline::{PipelineError, Routine, StoreKey, TodLoop};
use crate::storage::ArtifactStore;
use std::sync::Arc;

/// Well-known store keys shared by the built-in routines.
pub mod keys {
    use crate::acquisition::Recording;
    use crate::coincidence::CoincidenceSet;
    use crate::cuts::ChannelCuts;
    use crate::events::Event;
    use crate::pipeline::StoreKey;

    /// Raw samples, written by `LoadRecording`, read by `CompileCuts`.
    pub const RECORDING: StoreKey<Recording> = StoreKey::new_static("tod_data");

    /// Per-channel cuts, written by `LoadData`/`CompileCuts`, rewritten by
    /// `CleanCuts`, read by `FindCoincidences`.
    pub const CUTS: StoreKey<ChannelCuts> = StoreKey::new_static("cuts");

    /// Per-pixel coincidences, written by `FindCoincidences`, read by
    /// `FindEvents`.
    pub const COSIG: StoreKey<CoincidenceSet> = StoreKey::new_static("cosig");

    /// Events, written by `FindEvents`, narrowed by the event filters, read
    /// by `SaveData`.
    pub const EVENTS: StoreKey<Vec<Event>> = StoreKey::new_static("events");
}

/// Routines of the standard event pipeline, in execution order.
pub fn standard_pipeline(config: &RunConfig, catalog: Arc<PixelCatalog>) -> Vec<Box<dyn Routine>> {
    let cuts_key = StoreKey::new(config.input.cuts_key.clone());
    let filters = &config.events.filters;

    let mut clean = CleanCuts::new(cuts_key.clone());
    if config.cleaning.trim_edges {
        clean = clean.trim_edges(config.cleaning.edge_threshold);
    }
    if let Some(dir) = &config.cleaning.remove_dir {
        clean = clean.remove_from(
            ArtifactStore::new(dir, config.input.format()),
            config.cleaning.remove_buffer,
        );
    }

    let mut coincidences = FindCoincidences::new(
        catalog,
        CoincidenceDetector::new(config.coincidence.strict, config.coincidence.polarized),
        cuts_key.clone(),
        keys::COSIG,
    );
    if config.coincidence.save {
        coincidences = coincidences.with_save(ArtifactStore::new(
            &config.coincidence.output_dir,
            config.output.format(),
        ));
    }

    vec![
        Box::new(LoadData::new(
            ArtifactStore::new(&config.input.cuts_dir, config.input.format()),
            cuts_key,
        )),
        Box::new(clean),
        Box::new(coincidences),
        Box::new(FindEvents::new(
            EventExtractor::new(config.events.trailing_peak),
            keys::COSIG,
            keys::EVENTS,
        )),
        Box::new(NPixelFilter::new(filters.min_pixels, filters.max_pixels, keys::EVENTS)),
        Box::new(DurationFilter::new(filters.min_duration, filters.max_duration, keys::EVENTS)),
        Box::new(NEventsFilter::new(filters.max_events, keys::EVENTS)),
        Box::new(SaveData::new(
            ArtifactStore::new(&config.output.dir, config.output.format()),
            keys::EVENTS,
        )),
    ]
}

/// Engine running the standard pipeline over the configured unit list.
///
/// Outcome lists are attached when configured; parallel workers use
/// [`TodLoop::run_shard`] and leave them to the coordinator.
pub fn standard_engine(config: &RunConfig, catalog: Arc<PixelCatalog>) -> Result<TodLoop, PipelineError> {
    let unit_list = config.run.unit_list.as_ref().ok_or(PipelineError::NoUnitList)?;

    let mut engine = TodLoop::new();
    engine.add_unit_list(unit_list)?;
    engine.set_abspath(config.run.abspath);
    engine.add_skip(config.run.skip.iter().copied());
    engine.add_metadata("config", config)?;
    if let Some(lists) = config.outcome_lists() {
        engine.record_outcomes_to(lists);
    }
    engine.add_routines(standard_pipeline(config, catalog));
    Ok(engine)
}
