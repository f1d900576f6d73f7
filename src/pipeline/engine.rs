//! Sequential pipeline engine.

use super::{
    DataStore, ExecutionSignal, Metadata, PipelineError, Routine, RoutineError, RunContext,
    UnitContext,
};
use crate::storage::{read_list, OutcomeLists};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::ops::Range;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::path::Path;
use tracing::{debug, error, info, warn};

/// Metadata key holding the unit list.
pub const METADATA_LIST_KEY: &str = "list";

// ============================================================================
// Outcomes
// ============================================================================

/// Terminal state of one unit.
#[derive(Debug)]
pub enum UnitOutcome {
    Completed,
    Vetoed { routine: String },
    Failed { routine: String, error: RoutineError },
}

/// A unit that failed, as recorded in the run report.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnitFailure {
    pub index: usize,
    pub unit: String,
    pub routine: String,
    pub kind: String,
    pub message: String,
}

/// Summary of one run (or one shard of a run).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunReport {
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    /// Units that went through the routine chain (skips excluded)
    pub processed: usize,
    pub done: Vec<String>,
    pub errors: Vec<String>,
    pub vetoed: Vec<String>,
    pub skipped: Vec<usize>,
    pub failures: Vec<UnitFailure>,
    /// Routines whose `finalize` failed
    pub finalize_failures: Vec<String>,
}

impl RunReport {
    fn started() -> Self {
        let now = Utc::now();
        Self {
            started_at: now,
            finished_at: now,
            processed: 0,
            done: Vec::new(),
            errors: Vec::new(),
            vetoed: Vec::new(),
            skipped: Vec::new(),
            failures: Vec::new(),
            finalize_failures: Vec::new(),
        }
    }

    /// Fold another report into this one.
    ///
    /// Done and error lists become sorted set unions.
    pub fn merge(&mut self, other: Self) {
        self.started_at = self.started_at.min(other.started_at);
        self.finished_at = self.finished_at.max(other.finished_at);
        self.processed += other.processed;
        self.done.extend(other.done);
        self.errors.extend(other.errors);
        self.vetoed.extend(other.vetoed);
        self.skipped.extend(other.skipped);
        self.failures.extend(other.failures);
        self.finalize_failures.extend(other.finalize_failures);

        for list in [&mut self.done, &mut self.errors, &mut self.vetoed] {
            list.sort();
            list.dedup();
        }
        self.skipped.sort_unstable();
        self.skipped.dedup();
    }

    pub fn done_set(&self) -> BTreeSet<&str> {
        self.done.iter().map(String::as_str).collect()
    }

    pub fn error_set(&self) -> BTreeSet<&str> {
        self.errors.iter().map(String::as_str).collect()
    }

    pub fn elapsed(&self) -> chrono::Duration {
        self.finished_at - self.started_at
    }
}

impl Default for RunReport {
    fn default() -> Self {
        Self::started()
    }
}

// ============================================================================
// Engine
// ============================================================================

/// Runs an ordered list of routines over every unit of a unit list.
#[derive(Default)]
pub struct TodLoop {
    routines: Vec<Box<dyn Routine>>,
    units: Vec<String>,
    skip: BTreeSet<usize>,
    abspath: bool,
    metadata: Metadata,
    outcome_lists: Option<OutcomeLists>,
    worker: usize,
}

impl TodLoop {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_routine(&mut self, routine: Box<dyn Routine>) {
        info!(routine = routine.name(), position = self.routines.len(), "Added routine");
        self.routines.push(routine);
    }

    #[must_use]
    pub fn with_routine<R: Routine + 'static>(mut self, routine: R) -> Self {
        self.add_routine(Box::new(routine));
        self
    }

    pub fn add_routines<I: IntoIterator<Item = Box<dyn Routine>>>(&mut self, routines: I) {
        for routine in routines {
            self.add_routine(routine);
        }
    }

    pub fn routine_names(&self) -> Vec<&str> {
        self.routines.iter().map(|r| r.name()).collect()
    }

    /// Replace the unit list. The list is also recorded in the metadata.
    pub fn set_units(&mut self, units: Vec<String>) {
        self.metadata
            .insert(METADATA_LIST_KEY.to_string(), serde_json::json!(units));
        self.units = units;
    }

    /// Load the unit list from a newline-delimited file.
    pub fn add_unit_list(&mut self, path: &Path) -> Result<usize, PipelineError> {
        let units = read_list(path)?;
        info!(path = %path.display(), units = units.len(), "Loaded unit list");
        let count = units.len();
        self.set_units(units);
        Ok(count)
    }

    /// Whether unit identifiers are paths (names are then basenames).
    pub fn set_abspath(&mut self, abspath: bool) {
        self.abspath = abspath;
    }

    /// Exclude unit indices from the run without marking them.
    pub fn add_skip<I: IntoIterator<Item = usize>>(&mut self, indices: I) {
        self.skip.extend(indices);
    }

    pub fn add_metadata<V: Serialize>(&mut self, key: &str, value: V) -> Result<(), PipelineError> {
        let value = serde_json::to_value(value).map_err(|source| PipelineError::Metadata {
            key: key.to_string(),
            source,
        })?;
        self.metadata.insert(key.to_string(), value);
        Ok(())
    }

    pub fn metadata(&self) -> &Metadata {
        &self.metadata
    }

    /// Append-merge done/error lists to these files after [`run`](Self::run).
    pub fn record_outcomes_to(&mut self, lists: OutcomeLists) {
        self.outcome_lists = Some(lists);
    }

    pub fn set_worker(&mut self, worker: usize) {
        self.worker = worker;
    }

    pub fn units(&self) -> &[String] {
        &self.units
    }

    pub fn unit_count(&self) -> usize {
        self.units.len()
    }

    /// Process units `[start, end)` (`end` defaults to the list length) and
    /// persist the done/error lists if configured.
    pub fn run(&mut self, start: usize, end: Option<usize>) -> Result<RunReport, PipelineError> {
        let end = end.unwrap_or(self.units.len());
        let report = self.run_shard(start..end)?;

        if let Some(lists) = &self.outcome_lists {
            lists.record(&report.done, &report.errors)?;
        }
        info!(
            processed = report.processed,
            done = report.done.len(),
            errors = report.errors.len(),
            vetoed = report.vetoed.len(),
            skipped = report.skipped.len(),
            elapsed_ms = report.elapsed().num_milliseconds(),
            "Run complete"
        );
        Ok(report)
    }

    /// Process a range of units without touching the list files.
    pub fn run_shard(&mut self, range: Range<usize>) -> Result<RunReport, PipelineError> {
        if range.start > range.end || range.end > self.units.len() {
            return Err(PipelineError::RangeOutOfBounds {
                start: range.start,
                end: range.end,
                units: self.units.len(),
            });
        }

        let mut report = RunReport::started();
        self.initialize()?;

        for index in range {
            if self.skip.contains(&index) {
                info!(index, unit = %self.units[index], "Skipping unit");
                report.skipped.push(index);
                continue;
            }

            report.processed += 1;
            let unit = self.units[index].clone();
            match self.process_unit(index) {
                UnitOutcome::Completed => report.done.push(unit),
                UnitOutcome::Vetoed { routine } => {
                    debug!(index, unit = %unit, routine = %routine, "Unit vetoed");
                    report.vetoed.push(unit);
                }
                UnitOutcome::Failed { routine, error } => {
                    error!(
                        index,
                        unit = %unit,
                        routine = %routine,
                        kind = error.kind(),
                        error = %error,
                        "Unit failed"
                    );
                    report.failures.push(UnitFailure {
                        index,
                        unit: unit.clone(),
                        routine,
                        kind: error.kind().to_string(),
                        message: error.to_string(),
                    });
                    report.errors.push(unit);
                }
            }
        }

        report.finalize_failures = self.finalize();
        report.finished_at = Utc::now();
        Ok(report)
    }

    fn initialize(&mut self) -> Result<(), PipelineError> {
        let Self {
            routines,
            units,
            metadata,
            worker,
            ..
        } = self;
        let ctx = RunContext {
            metadata,
            unit_count: units.len(),
            worker: *worker,
        };
        for routine in routines.iter_mut() {
            debug!(routine = routine.name(), "Initializing routine");
            routine
                .initialize(&ctx)
                .map_err(|source| PipelineError::Initialization {
                    routine: routine.name().to_string(),
                    source,
                })?;
        }
        Ok(())
    }

    /// Every routine is finalized even if an earlier one fails.
    fn finalize(&mut self) -> Vec<String> {
        let Self {
            routines,
            units,
            metadata,
            worker,
            ..
        } = self;
        let ctx = RunContext {
            metadata,
            unit_count: units.len(),
            worker: *worker,
        };
        let mut failed = Vec::new();
        for routine in routines.iter_mut() {
            if let Err(e) = routine.finalize(&ctx) {
                warn!(routine = routine.name(), error = %e, "Routine finalize failed");
                failed.push(routine.name().to_string());
            }
        }
        failed
    }

    /// Run the routine chain on one unit with a fresh store.
    fn process_unit(&mut self, index: usize) -> UnitOutcome {
        let Self {
            routines,
            units,
            abspath,
            metadata,
            ..
        } = self;
        let unit = UnitContext::new(index, &units[index], *abspath, metadata);
        debug!(index, unit = unit.id(), "Processing unit");

        let mut store = DataStore::new();
        for routine in routines.iter_mut() {
            let result = catch_unwind(AssertUnwindSafe(|| routine.execute(&unit, &mut store)));
            match result {
                Ok(Ok(ExecutionSignal::Continue)) => {}
                Ok(Ok(ExecutionSignal::Veto)) => {
                    return UnitOutcome::Vetoed {
                        routine: routine.name().to_string(),
                    }
                }
                Ok(Err(error)) => {
                    return UnitOutcome::Failed {
                        routine: routine.name().to_string(),
                        error,
                    }
                }
                Err(payload) => {
                    return UnitOutcome::Failed {
                        routine: routine.name().to_string(),
                        error: RoutineError::Panicked(panic_message(payload.as_ref())),
                    }
                }
            }
        }
        UnitOutcome::Completed
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    payload
        .downcast_ref::<&str>()
        .map(|s| (*s).to_string())
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "unknown panic payload".to_string())
}
