//! Run Configuration - everything a batch run needs, as TOML
//!
//! Every section has defaults, so an empty file (or no file) is a valid
//! configuration for the standard event pipeline.

use super::defaults;
use super::validation::{validate_ranges, validate_unknown_keys};
use crate::cuts::EDGE_TRIM_SAMPLES;
use crate::events::TrailingPeak;
use crate::storage::{ArtifactFormat, OutcomeLists};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{info, warn};

// ============================================================================
// Top-Level Config
// ============================================================================

/// Root configuration of a run.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RunConfig {
    /// Unit list, range and parallelism
    #[serde(default)]
    pub run: RunSection,

    /// Where per-unit cuts are read from
    #[serde(default)]
    pub input: InputSection,

    /// Channel grouping source
    #[serde(default)]
    pub geometry: GeometrySection,

    /// Cut cleaning before coincidence detection
    #[serde(default)]
    pub cleaning: CleaningSection,

    /// Coincidence policy
    #[serde(default)]
    pub coincidence: CoincidenceSection,

    /// Event extraction and filters
    #[serde(default)]
    pub events: EventsSection,

    /// Where events are written
    #[serde(default)]
    pub output: OutputSection,
}

impl RunConfig {
    /// Load configuration using the standard search order:
    /// 1. `explicit` (the `--config` flag), errors are fatal
    /// 2. `$TODLOOP_CONFIG`
    /// 3. `./todloop.toml`
    /// 4. Built-in defaults
    pub fn load(explicit: Option<&Path>) -> Result<Self, ConfigError> {
        if let Some(path) = explicit {
            let config = Self::load_from_file(path)?;
            info!(path = %path.display(), "Loaded run config from --config");
            return Ok(config);
        }

        if let Ok(path) = std::env::var(defaults::CONFIG_ENV_VAR) {
            let p = PathBuf::from(&path);
            if p.exists() {
                match Self::load_from_file(&p) {
                    Ok(config) => {
                        info!(path = %p.display(), "Loaded run config from TODLOOP_CONFIG");
                        return Ok(config);
                    }
                    Err(e) => {
                        warn!(path = %p.display(), error = %e, "Failed to load config from TODLOOP_CONFIG, falling back");
                    }
                }
            } else {
                warn!(path = %path, "TODLOOP_CONFIG points to non-existent file, falling back");
            }
        }

        let local = PathBuf::from(defaults::LOCAL_CONFIG_FILE);
        if local.exists() {
            match Self::load_from_file(&local) {
                Ok(config) => {
                    info!("Loaded run config from ./todloop.toml");
                    return Ok(config);
                }
                Err(e) => {
                    warn!(error = %e, "Failed to load ./todloop.toml, using defaults");
                }
            }
        }

        info!("No todloop.toml found, using built-in defaults");
        Ok(Self::default())
    }

    /// Load and validate a TOML file.
    pub fn load_from_file(path: &Path) -> Result<Self, ConfigError> {
        let contents =
            std::fs::read_to_string(path).map_err(|e| ConfigError::Io(path.to_path_buf(), e))?;
        Self::from_toml_str(&contents, path)
    }

    /// Parse and validate TOML text. `origin` only labels errors.
    pub fn from_toml_str(contents: &str, origin: &Path) -> Result<Self, ConfigError> {
        // Two-pass: unknown keys first (warnings only)
        for w in validate_unknown_keys(contents) {
            warn!("{}", w);
        }

        let config: Self =
            toml::from_str(contents).map_err(|e| ConfigError::Parse(origin.to_path_buf(), e))?;
        config.validate()?;
        Ok(config)
    }

    pub fn to_toml(&self) -> Result<String, ConfigError> {
        Ok(toml::to_string_pretty(self)?)
    }

    /// Range checks. Errors are fatal, warnings are logged.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let (errors, warnings) = validate_ranges(self);
        for w in &warnings {
            warn!("{}", w);
        }
        if errors.is_empty() {
            Ok(())
        } else {
            Err(ConfigError::Validation(errors))
        }
    }

    /// Done/error list files, when both are configured.
    pub fn outcome_lists(&self) -> Option<OutcomeLists> {
        match (&self.run.done_list, &self.run.error_list) {
            (Some(done), Some(errors)) => Some(OutcomeLists::new(done, errors)),
            _ => None,
        }
    }
}

// ============================================================================
// Error Type
// ============================================================================

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Config I/O error ({0:?}): {1}")]
    Io(PathBuf, #[source] std::io::Error),

    #[error("Config parse error ({0:?}): {1}")]
    Parse(PathBuf, #[source] toml::de::Error),

    #[error("Config serialization error: {0}")]
    Serialize(#[from] toml::ser::Error),

    #[error("Config validation failed:\n  - {}", .0.join("\n  - "))]
    Validation(Vec<String>),
}

// ============================================================================
// [run]
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunSection {
    /// Newline-delimited unit identifiers
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub unit_list: Option<PathBuf>,

    /// Unit identifiers are file paths
    #[serde(default)]
    pub abspath: bool,

    /// First unit index (inclusive)
    #[serde(default)]
    pub start: usize,

    /// Last unit index (exclusive), defaults to the list length
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end: Option<usize>,

    /// Unit indices excluded from the run
    #[serde(default)]
    pub skip: Vec<usize>,

    #[serde(default = "default_workers")]
    pub workers: usize,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub done_list: Option<PathBuf>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_list: Option<PathBuf>,
}

fn default_workers() -> usize {
    defaults::WORKERS
}

impl Default for RunSection {
    fn default() -> Self {
        Self {
            unit_list: None,
            abspath: false,
            start: 0,
            end: None,
            skip: Vec::new(),
            workers: default_workers(),
            done_list: None,
            error_list: None,
        }
    }
}

// ============================================================================
// [input]
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InputSection {
    #[serde(default = "default_cuts_dir")]
    pub cuts_dir: PathBuf,

    /// Store key the loaded cuts are placed under
    #[serde(default = "default_cuts_key")]
    pub cuts_key: String,

    /// Cut artifacts are zstd-compressed
    #[serde(default)]
    pub compressed: bool,
}

fn default_cuts_dir() -> PathBuf {
    PathBuf::from(defaults::CUTS_DIR)
}
fn default_cuts_key() -> String {
    defaults::CUTS_KEY.to_string()
}

impl Default for InputSection {
    fn default() -> Self {
        Self {
            cuts_dir: default_cuts_dir(),
            cuts_key: default_cuts_key(),
            compressed: false,
        }
    }
}

impl InputSection {
    pub const fn format(&self) -> ArtifactFormat {
        ArtifactFormat::from_compress(self.compressed)
    }
}

// ============================================================================
// [geometry]
// ============================================================================

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GeometrySection {
    /// Pixel catalog TOML (see `geometry`)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pixel_map: Option<PathBuf>,
}

// ============================================================================
// [cleaning]
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CleaningSection {
    /// Drop cuts near either end of the recording
    #[serde(default = "default_true")]
    pub trim_edges: bool,

    #[serde(default = "default_edge_threshold")]
    pub edge_threshold: usize,

    /// Second cut set (same layout as `input.cuts_dir`) whose intervals are
    /// removed from the input cuts
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub remove_dir: Option<PathBuf>,

    /// Widening applied to removed intervals
    #[serde(default)]
    pub remove_buffer: usize,
}

fn default_true() -> bool {
    true
}
fn default_edge_threshold() -> usize {
    EDGE_TRIM_SAMPLES
}

impl Default for CleaningSection {
    fn default() -> Self {
        Self {
            trim_edges: true,
            edge_threshold: default_edge_threshold(),
            remove_dir: None,
            remove_buffer: 0,
        }
    }
}

// ============================================================================
// [coincidence]
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CoincidenceSection {
    /// Require two channels in both bands
    #[serde(default = "default_true")]
    pub strict: bool,

    /// Accept a flag in either polarization of a band
    #[serde(default)]
    pub polarized: bool,

    /// Persist coincidence sets
    #[serde(default)]
    pub save: bool,

    #[serde(default = "default_cosig_dir")]
    pub output_dir: PathBuf,
}

fn default_cosig_dir() -> PathBuf {
    PathBuf::from(defaults::COSIG_DIR)
}

impl Default for CoincidenceSection {
    fn default() -> Self {
        Self {
            strict: true,
            polarized: false,
            save: false,
            output_dir: default_cosig_dir(),
        }
    }
}

// ============================================================================
// [events]
// ============================================================================

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventsSection {
    /// Handling of a run still open at the last sample
    #[serde(default)]
    pub trailing_peak: TrailingPeak,

    #[serde(default)]
    pub filters: FilterSection,
}

/// Event filter bounds. Lower bounds inclusive, upper bounds exclusive.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FilterSection {
    #[serde(default = "default_min_pixels")]
    pub min_pixels: usize,
    #[serde(default = "default_max_pixels")]
    pub max_pixels: usize,
    #[serde(default = "default_min_duration")]
    pub min_duration: usize,
    #[serde(default = "default_max_duration")]
    pub max_duration: usize,
    /// Units with more events are vetoed
    #[serde(default = "default_max_events")]
    pub max_events: usize,
}

fn default_min_pixels() -> usize {
    defaults::MIN_PIXELS
}
fn default_max_pixels() -> usize {
    defaults::MAX_PIXELS
}
fn default_min_duration() -> usize {
    defaults::MIN_DURATION
}
fn default_max_duration() -> usize {
    defaults::MAX_DURATION
}
fn default_max_events() -> usize {
    defaults::MAX_EVENTS
}

impl Default for FilterSection {
    fn default() -> Self {
        Self {
            min_pixels: default_min_pixels(),
            max_pixels: default_max_pixels(),
            min_duration: default_min_duration(),
            max_duration: default_max_duration(),
            max_events: default_max_events(),
        }
    }
}

// ============================================================================
// [output]
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutputSection {
    #[serde(default = "default_events_dir")]
    pub dir: PathBuf,

    /// zstd-compress artifacts and metadata
    #[serde(default)]
    pub compress: bool,
}

fn default_events_dir() -> PathBuf {
    PathBuf::from(defaults::EVENTS_DIR)
}

impl Default for OutputSection {
    fn default() -> Self {
        Self {
            dir: default_events_dir(),
            compress: false,
        }
    }
}

impl OutputSection {
    pub const fn format(&self) -> ArtifactFormat {
        ArtifactFormat::from_compress(self.compress)
    }
}
