//! Routine trait and the contexts passed to it.

use super::{DataStore, Metadata, RoutineError};
use std::path::Path;

/// Outcome of one routine on one unit.
#[must_use]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecutionSignal {
    /// Hand the unit to the next routine
    Continue,
    /// Stop processing this unit; later routines do not run
    Veto,
}

/// Run-wide view handed to `initialize` and `finalize`.
#[derive(Debug, Clone, Copy)]
pub struct RunContext<'a> {
    pub metadata: &'a Metadata,
    pub unit_count: usize,
    /// Worker number in parallel mode, 0 otherwise
    pub worker: usize,
}

/// The unit currently being processed.
#[derive(Debug, Clone, Copy)]
pub struct UnitContext<'a> {
    index: usize,
    id: &'a str,
    abspath: bool,
    metadata: &'a Metadata,
}

impl<'a> UnitContext<'a> {
    pub const fn new(index: usize, id: &'a str, abspath: bool, metadata: &'a Metadata) -> Self {
        Self {
            index,
            id,
            abspath,
            metadata,
        }
    }

    /// Position of the unit in the unit list.
    pub const fn index(&self) -> usize {
        self.index
    }

    /// Identifier exactly as listed.
    pub const fn id(&self) -> &'a str {
        self.id
    }

    /// Identifier without its directory when the list holds paths.
    pub fn name(&self) -> &'a str {
        if self.abspath {
            Path::new(self.id)
                .file_name()
                .and_then(|n| n.to_str())
                .unwrap_or(self.id)
        } else {
            self.id
        }
    }

    /// Array segment of a dotted unit name.
    ///
    /// `1408760013.1408780831.ar1` gives `ar1`; `1408760013.1408780831.ar1.zip`
    /// gives `ar1` as well since the last field carries no array tag.
    pub fn array(&self) -> Option<&'a str> {
        let fields: Vec<&'a str> = self.name().split('.').collect();
        match fields.as_slice() {
            [.., last] if last.to_ascii_lowercase().contains("ar") => Some(*last),
            [.., second_last, _] => Some(*second_last),
            _ => None,
        }
    }

    pub const fn metadata(&self) -> &'a Metadata {
        self.metadata
    }
}

/// One stage of a pipeline.
///
/// The engine calls `initialize` once per run in registration order, then
/// `execute` once per unit until a routine vetoes or fails, then `finalize`
/// once per run in registration order.
pub trait Routine: Send {
    /// Name used in logs and errors
    fn name(&self) -> &str;

    /// Prepare run-wide state. An error aborts the run.
    fn initialize(&mut self, _run: &RunContext<'_>) -> Result<(), RoutineError> {
        Ok(())
    }

    /// Process one unit, reading and writing the unit's store.
    fn execute(
        &mut self,
        unit: &UnitContext<'_>,
        store: &mut DataStore,
    ) -> Result<ExecutionSignal, RoutineError>;

    /// Release run-wide state. Errors are logged and counted.
    fn finalize(&mut self, _run: &RunContext<'_>) -> Result<(), RoutineError> {
        Ok(())
    }
}
