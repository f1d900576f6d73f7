//! Batch Pipeline
//!
//! ## Unit lifecycle
//!
//! ```text
//! initialize(all routines, registration order)
//!   for each unit in [start, end) not in the skip list:
//!     Pending ─▶ Running ─┬─▶ Completed   (every routine returned Continue)
//!                         ├─▶ Vetoed      (a routine returned Veto)
//!                         └─▶ Failed      (a routine returned Err or panicked)
//! finalize(all routines, registration order)
//! append-merge done/error lists
//! ```
//!
//! Each unit gets a fresh [`DataStore`], dropped before the next unit
//! starts. A veto or failure stops the remaining routines for that unit only.
//! Only `initialize` errors abort a run.

mod engine;
mod error;
pub mod parallel;
mod routine;
mod store;

pub use engine::{RunReport, TodLoop, UnitFailure, UnitOutcome, METADATA_LIST_KEY};
pub use error::{PipelineError, RoutineError};
pub use parallel::{partition, ParallelRunner, ShardReport};
pub use routine::{ExecutionSignal, Routine, RunContext, UnitContext};
pub use store::{DataStore, Metadata, StoreKey};
