//! Pipeline error types.

use crate::acquisition::AcquisitionError;
use crate::geometry::GeometryError;
use crate::storage::StorageError;

/// Failure raised by a routine.
///
/// Returned from `execute` it fails the current unit only; returned from
/// `initialize` it aborts the run.
#[derive(Debug, thiserror::Error)]
pub enum RoutineError {
    #[error("store key '{key}' is missing (expected {expected})")]
    MissingKey { key: String, expected: &'static str },

    #[error("store key '{key}' does not hold a {expected}")]
    TypeMismatch { key: String, expected: &'static str },

    #[error("invalid routine configuration: {0}")]
    Config(String),

    #[error("no pixel map for array '{0}'")]
    NoPixelMap(String),

    #[error("routine panicked: {0}")]
    Panicked(String),

    #[error(transparent)]
    Storage(#[from] StorageError),

    #[error(transparent)]
    Acquisition(#[from] AcquisitionError),

    #[error(transparent)]
    Geometry(#[from] GeometryError),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl RoutineError {
    /// Short classification used in logs and run reports.
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::MissingKey { .. } => "missing_key",
            Self::TypeMismatch { .. } => "type_mismatch",
            Self::Config(_) => "config",
            Self::NoPixelMap(_) => "no_pixel_map",
            Self::Panicked(_) => "panic",
            Self::Storage(_) => "storage",
            Self::Acquisition(_) => "acquisition",
            Self::Geometry(_) => "geometry",
            Self::Other(_) => "other",
        }
    }
}

/// Run-level failure.
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error("routine '{routine}' failed to initialize: {source}")]
    Initialization {
        routine: String,
        #[source]
        source: RoutineError,
    },

    #[error("no unit list configured")]
    NoUnitList,

    #[error("unit range [{start}, {end}) is outside the unit list ({units} units)")]
    RangeOutOfBounds { start: usize, end: usize, units: usize },

    #[error("invalid metadata value for '{key}': {source}")]
    Metadata {
        key: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("worker task failed: {0}")]
    Worker(String),

    #[error(transparent)]
    Storage(#[from] StorageError),
}
