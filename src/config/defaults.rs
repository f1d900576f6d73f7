//! Default values for the run configuration.
//!
//! Grouped by config section.

// ============================================================================
// Config Discovery
// ============================================================================

/// Environment variable naming the config file.
pub const CONFIG_ENV_VAR: &str = "TODLOOP_CONFIG";

/// Config file looked up in the working directory.
pub const LOCAL_CONFIG_FILE: &str = "todloop.toml";

// ============================================================================
// [run]
// ============================================================================

pub const WORKERS: usize = 1;

// ============================================================================
// [input] / [output]
// ============================================================================

/// Directory holding per-unit cut artifacts.
pub const CUTS_DIR: &str = "outputs/cuts";

/// Store key the loaded cuts are placed under.
pub const CUTS_KEY: &str = "cuts";

/// Directory receiving per-unit coincidence artifacts.
pub const COSIG_DIR: &str = "outputs/cosigs";

/// Directory receiving per-unit event artifacts.
pub const EVENTS_DIR: &str = "outputs/events";

// ============================================================================
// [events.filters]
// ============================================================================

/// Lower bound (inclusive) on pixels affected per event.
pub const MIN_PIXELS: usize = 0;

/// Upper bound (exclusive) on pixels affected per event.
pub const MAX_PIXELS: usize = 100;

/// Lower bound (inclusive) on event duration in samples.
pub const MIN_DURATION: usize = 1;

/// Upper bound (exclusive) on event duration in samples.
pub const MAX_DURATION: usize = 100;

/// Units with more events than this are vetoed.
pub const MAX_EVENTS: usize = 100;
