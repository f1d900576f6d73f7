//! Run Configuration Module
//!
//! ## Loading Order
//!
//! 1. `--config` on the command line
//! 2. `TODLOOP_CONFIG` environment variable (path to TOML file)
//! 3. `todloop.toml` in the current working directory
//! 4. Built-in defaults
//!
//! ## Usage
//!
//! ```ignore
//! // In main():
//! config::init(RunConfig::load(cli.config.as_deref())?);
//!
//! // Anywhere else:
//! let workers = config::get().run.workers;
//! ```

pub mod defaults;
mod run_config;
pub mod validation;

pub use run_config::*;

use std::sync::OnceLock;

static RUN_CONFIG: OnceLock<RunConfig> = OnceLock::new();

/// Install the process-wide run configuration. Later calls are ignored.
pub fn init(config: RunConfig) {
    if RUN_CONFIG.set(config).is_err() {
        tracing::warn!("config::init() called more than once, ignoring");
    }
}

/// Process-wide run configuration.
///
/// Falls back to (and installs) the defaults if `init()` was never called.
pub fn get() -> &'static RunConfig {
    RUN_CONFIG.get_or_init(|| {
        tracing::warn!("config::get() before config::init(), using defaults");
        RunConfig::default()
    })
}

pub fn is_initialized() -> bool {
    RUN_CONFIG.get().is_some()
}
