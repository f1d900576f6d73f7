//! TODLoop: batch routine pipeline over multi-channel detector recordings
//!
//! A run walks an ordered list of recording units and drives each one through
//! a chain of routines sharing a per-unit data store. The built-in routines
//! turn per-channel cut intervals into per-pixel coincidences and then into
//! events that are filtered and saved.
//!
//! ## Layout
//!
//! - **cuts**: half-open interval algebra and per-channel cut sets
//! - **geometry**: channel-to-pixel maps, keyed by array name
//! - **coincidence**: combines channel cuts into per-pixel coincidences
//! - **events**: occupancy histogram and event extraction
//! - **pipeline**: routine lifecycle, data store, sequential and parallel engines
//! - **routines**: the concrete routines and the standard event pipeline
//! - **acquisition**: raw recording loading and threshold flagging
//! - **storage**: per-unit artifacts and done/error lists
//! - **config**: TOML run configuration

pub mod acquisition;
pub mod coincidence;
pub mod config;
pub mod cuts;
pub mod events;
pub mod geometry;
pub mod pipeline;
pub mod routines;
pub mod storage;
pub mod synthetic;

pub use coincidence::{CoincidenceDetector, CoincidenceSet};
pub use config::RunConfig;
pub use cuts::{ChannelCuts, ChannelId, Interval, IntervalSet};
pub use events::{Event, EventExtractor, TrailingPeak};
pub use geometry::{PixelCatalog, PixelId, PixelMap};
pub use pipeline::{
    DataStore, ExecutionSignal, ParallelRunner, PipelineError, Routine, RoutineError, RunReport,
    StoreKey, TodLoop, UnitContext,
};
