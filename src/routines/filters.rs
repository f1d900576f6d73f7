//! Event and unit filters.
//!
//! Event filters drop events outside `[min, max)` and veto the unit when no
//! event is left. Each keeps run-wide counts and logs them at finalize.

use crate::events::Event;
use crate::pipeline::{
    DataStore, ExecutionSignal, Routine, RoutineError, RunContext, StoreKey, UnitContext,
};
use crate::storage::read_list;
use std::collections::HashSet;
use std::path::Path;
use tracing::{debug, info};

/// Run-wide event counts of one filter.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FilterStats {
    pub events_processed: usize,
    pub events_passed: usize,
    pub units_vetoed: usize,
}

fn retain_events<F>(
    name: &str,
    key: &StoreKey<Vec<Event>>,
    stats: &mut FilterStats,
    unit: &UnitContext<'_>,
    store: &mut DataStore,
    keep: F,
) -> Result<ExecutionSignal, RoutineError>
where
    F: Fn(&Event) -> bool,
{
    let events = store.get_mut(key)?;
    let before = events.len();
    events.retain(|e| keep(e));

    stats.events_processed += before;
    stats.events_passed += events.len();

    if events.is_empty() {
        stats.units_vetoed += 1;
        debug!(index = unit.index(), filter = name, before, "No events passed, vetoing unit");
        return Ok(ExecutionSignal::Veto);
    }
    debug!(index = unit.index(), filter = name, "Events passed {} / {}", events.len(), before);
    Ok(ExecutionSignal::Continue)
}

fn log_totals(name: &str, stats: &FilterStats) {
    info!(
        filter = name,
        processed = stats.events_processed,
        passed = stats.events_passed,
        units_vetoed = stats.units_vetoed,
        "Filter totals"
    );
}

// ============================================================================
// NPixelFilter
// ============================================================================

/// Keeps events with `min <= |pixels_affected| < max`.
pub struct NPixelFilter {
    min_pixels: usize,
    max_pixels: usize,
    key: StoreKey<Vec<Event>>,
    stats: FilterStats,
}

impl NPixelFilter {
    pub fn new(min_pixels: usize, max_pixels: usize, key: StoreKey<Vec<Event>>) -> Self {
        Self {
            min_pixels,
            max_pixels,
            key,
            stats: FilterStats::default(),
        }
    }

    pub const fn stats(&self) -> FilterStats {
        self.stats
    }
}

impl Routine for NPixelFilter {
    fn name(&self) -> &str {
        "NPixelFilter"
    }

    fn execute(
        &mut self,
        unit: &UnitContext<'_>,
        store: &mut DataStore,
    ) -> Result<ExecutionSignal, RoutineError> {
        let range = self.min_pixels..self.max_pixels;
        retain_events("NPixelFilter", &self.key, &mut self.stats, unit, store, |e| {
            range.contains(&e.pixels_affected.len())
        })
    }

    fn finalize(&mut self, _run: &RunContext<'_>) -> Result<(), RoutineError> {
        log_totals(self.name(), &self.stats);
        Ok(())
    }
}

// ============================================================================
// DurationFilter
// ============================================================================

/// Keeps events with `min <= duration < max`.
pub struct DurationFilter {
    min_duration: usize,
    max_duration: usize,
    key: StoreKey<Vec<Event>>,
    stats: FilterStats,
}

impl DurationFilter {
    pub fn new(min_duration: usize, max_duration: usize, key: StoreKey<Vec<Event>>) -> Self {
        Self {
            min_duration,
            max_duration,
            key,
            stats: FilterStats::default(),
        }
    }

    pub const fn stats(&self) -> FilterStats {
        self.stats
    }
}

impl Routine for DurationFilter {
    fn name(&self) -> &str {
        "DurationFilter"
    }

    fn execute(
        &mut self,
        unit: &UnitContext<'_>,
        store: &mut DataStore,
    ) -> Result<ExecutionSignal, RoutineError> {
        let range = self.min_duration..self.max_duration;
        retain_events("DurationFilter", &self.key, &mut self.stats, unit, store, |e| {
            range.contains(&e.duration)
        })
    }

    fn finalize(&mut self, _run: &RunContext<'_>) -> Result<(), RoutineError> {
        log_totals(self.name(), &self.stats);
        Ok(())
    }
}

// ============================================================================
// NEventsFilter
// ============================================================================

/// Vetoes units with more than `max_events` events (usually a glitchy
/// recording rather than real signal).
pub struct NEventsFilter {
    max_events: usize,
    key: StoreKey<Vec<Event>>,
    vetoed: usize,
}

impl NEventsFilter {
    pub fn new(max_events: usize, key: StoreKey<Vec<Event>>) -> Self {
        Self {
            max_events,
            key,
            vetoed: 0,
        }
    }
}

impl Routine for NEventsFilter {
    fn name(&self) -> &str {
        "NEventsFilter"
    }

    fn execute(
        &mut self,
        unit: &UnitContext<'_>,
        store: &mut DataStore,
    ) -> Result<ExecutionSignal, RoutineError> {
        let count = store.get(&self.key)?.len();
        if count > self.max_events {
            self.vetoed += 1;
            debug!(index = unit.index(), count, max = self.max_events, "Too many events, vetoing unit");
            return Ok(ExecutionSignal::Veto);
        }
        Ok(ExecutionSignal::Continue)
    }

    fn finalize(&mut self, _run: &RunContext<'_>) -> Result<(), RoutineError> {
        info!(filter = "NEventsFilter", units_vetoed = self.vetoed, "Filter totals");
        Ok(())
    }
}

// ============================================================================
// UnitSelector
// ============================================================================

/// Vetoes every unit whose name is not in an allow-list.
pub struct UnitSelector {
    allowed: HashSet<String>,
}

impl UnitSelector {
    pub fn new<I, S>(allowed: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            allowed: allowed.into_iter().map(Into::into).collect(),
        }
    }

    pub fn from_list(path: &Path) -> Result<Self, RoutineError> {
        Ok(Self::new(read_list(path)?))
    }
}

impl Routine for UnitSelector {
    fn name(&self) -> &str {
        "UnitSelector"
    }

    fn execute(
        &mut self,
        unit: &UnitContext<'_>,
        _store: &mut DataStore,
    ) -> Result<ExecutionSignal, RoutineError> {
        if self.allowed.contains(unit.name()) {
            Ok(ExecutionSignal::Continue)
        } else {
            Ok(ExecutionSignal::Veto)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::Metadata;
    use crate::routines::keys;
    use std::collections::BTreeSet;

    fn event(start: usize, duration: usize, pixels: &[u32]) -> Event {
        Event {
            id: Event::event_id(0, start),
            start,
            end: start + duration,
            duration,
            number_of_pixels: pixels.len() as f64,
            pixels_affected: pixels.iter().copied().collect::<BTreeSet<_>>(),
        }
    }

    fn store_with(events: Vec<Event>) -> DataStore {
        let mut store = DataStore::new();
        store.put(&keys::EVENTS, events);
        store
    }

    #[test]
    fn test_npixel_filter_half_open_bounds() {
        let meta = Metadata::new();
        let unit = UnitContext::new(0, "u", false, &meta);
        let mut filter = NPixelFilter::new(2, 4, keys::EVENTS);
        let mut store = store_with(vec![
            event(0, 5, &[1]),
            event(10, 5, &[1, 2]),
            event(20, 5, &[1, 2, 3]),
            event(30, 5, &[1, 2, 3, 4]),
        ]);

        assert_eq!(filter.execute(&unit, &mut store).unwrap(), ExecutionSignal::Continue);
        let kept: Vec<usize> = store.get(&keys::EVENTS).unwrap().iter().map(|e| e.start).collect();
        assert_eq!(kept, vec![10, 20]);
        assert_eq!(
            filter.stats(),
            FilterStats {
                events_processed: 4,
                events_passed: 2,
                units_vetoed: 0
            }
        );
    }

    #[test]
    fn test_duration_filter_vetoes_when_empty() {
        let meta = Metadata::new();
        let unit = UnitContext::new(0, "u", false, &meta);
        let mut filter = DurationFilter::new(1, 10, keys::EVENTS);
        let mut store = store_with(vec![event(0, 10, &[1]), event(20, 50, &[1])]);

        assert_eq!(filter.execute(&unit, &mut store).unwrap(), ExecutionSignal::Veto);
        assert_eq!(filter.stats().units_vetoed, 1);
    }

    #[test]
    fn test_nevents_filter() {
        let meta = Metadata::new();
        let unit = UnitContext::new(0, "u", false, &meta);
        let mut filter = NEventsFilter::new(2, keys::EVENTS);

        let mut two = store_with(vec![event(0, 1, &[1]), event(5, 1, &[1])]);
        assert_eq!(filter.execute(&unit, &mut two).unwrap(), ExecutionSignal::Continue);

        let mut three = store_with(vec![event(0, 1, &[1]), event(5, 1, &[1]), event(9, 1, &[1])]);
        assert_eq!(filter.execute(&unit, &mut three).unwrap(), ExecutionSignal::Veto);
    }

    #[test]
    fn test_unit_selector_matches_basename() {
        let meta = Metadata::new();
        let mut selector = UnitSelector::new(["1.2.ar1"]);
        let mut store = DataStore::new();

        let listed = UnitContext::new(0, "/data/1.2.ar1", true, &meta);
        let other = UnitContext::new(1, "/data/1.3.ar1", true, &meta);
        assert_eq!(selector.execute(&listed, &mut store).unwrap(), ExecutionSignal::Continue);
        assert_eq!(selector.execute(&other, &mut store).unwrap(), ExecutionSignal::Veto);
    }
}
