//! TODLoop command line
//!
//! # Usage
//!
//! ```bash
//! # Generate a synthetic run with known events
//! todloop simulate --out ./demo --units 20
//!
//! # Process it
//! todloop run --config ./demo/todloop.toml --workers 4
//!
//! # Validate a config without running
//! todloop check-config --config ./demo/todloop.toml
//! ```
//!
//! # Environment Variables
//!
//! - `TODLOOP_CONFIG`: Path to the run config when `--config` is not given
//! - `RUST_LOG`: Logging level (default: info)

use anyhow::{bail, Context, Result};
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use todloop::config::{self, RunConfig};
use todloop::geometry::PixelCatalog;
use todloop::pipeline::{ParallelRunner, RunReport};
use todloop::routines::standard_engine;
use todloop::storage::{read_list, ArtifactFormat};
use todloop::synthetic::{self, SyntheticConfig};
use tracing::{info, warn};

// ============================================================================
// CLI Arguments
// ============================================================================

#[derive(Parser, Debug)]
#[command(name = "todloop")]
#[command(about = "Batch coincidence and event detection over detector recordings")]
#[command(version)]
struct CliArgs {
    /// Emit logs as JSON lines
    #[arg(long, global = true)]
    log_json: bool,

    #[command(subcommand)]
    command: SubCommand,
}

#[derive(clap::Subcommand, Debug)]
enum SubCommand {
    /// Run the standard event pipeline over the configured unit list
    Run {
        /// Path to todloop.toml (otherwise TODLOOP_CONFIG, then ./todloop.toml)
        #[arg(long, env = "TODLOOP_CONFIG")]
        config: Option<PathBuf>,

        /// First unit index, overrides run.start
        #[arg(long)]
        start: Option<usize>,

        /// End unit index (exclusive), overrides run.end
        #[arg(long)]
        end: Option<usize>,

        /// Number of parallel workers, overrides run.workers
        #[arg(short, long)]
        workers: Option<usize>,
    },

    /// Load and validate a config, then print it with defaults filled in
    CheckConfig {
        #[arg(long, env = "TODLOOP_CONFIG")]
        config: Option<PathBuf>,
    },

    /// Write a synthetic run (cuts, pixel map, unit list and config)
    Simulate {
        /// Output directory
        #[arg(long)]
        out: PathBuf,

        #[arg(long, default_value = "10")]
        units: usize,

        #[arg(long, default_value = "16")]
        pixels: u32,

        #[arg(long, default_value = "42")]
        seed: u64,

        /// Write zstd-compressed cut artifacts
        #[arg(long)]
        compress: bool,
    },
}

// ============================================================================
// Subcommands
// ============================================================================

fn load_catalog(config: &RunConfig) -> Result<Arc<PixelCatalog>> {
    let Some(path) = &config.geometry.pixel_map else {
        bail!("geometry.pixel_map is not set; the coincidence step needs a pixel map");
    };
    let catalog = PixelCatalog::load(path)
        .with_context(|| format!("loading pixel map {}", path.display()))?;
    Ok(Arc::new(catalog))
}

async fn run(
    explicit: Option<PathBuf>,
    start: Option<usize>,
    end: Option<usize>,
    workers: Option<usize>,
) -> Result<RunReport> {
    let mut loaded = RunConfig::load(explicit.as_deref()).context("loading run config")?;
    if let Some(start) = start {
        loaded.run.start = start;
    }
    if end.is_some() {
        loaded.run.end = end;
    }
    if let Some(workers) = workers {
        loaded.run.workers = workers;
    }
    loaded.validate()?;
    config::init(loaded);
    let cfg = config::get();

    let catalog = load_catalog(cfg)?;
    let run = &cfg.run;

    if run.workers <= 1 {
        let mut engine = standard_engine(cfg, catalog)?;
        info!(
            units = engine.unit_count(),
            routines = ?engine.routine_names(),
            "[TodLoop] Sequential run"
        );
        return Ok(engine.run(run.start, run.end)?);
    }

    let unit_list = run
        .unit_list
        .as_ref()
        .context("run.unit_list is not set")?;
    let unit_count = read_list(unit_list)?.len();
    let end = run.end.unwrap_or(unit_count);

    // Lists are written once by the runner, not per shard
    let mut runner = ParallelRunner::new(run.workers, move |_worker| {
        let cfg = config::get();
        let mut shard_config = cfg.clone();
        shard_config.run.done_list = None;
        shard_config.run.error_list = None;
        standard_engine(&shard_config, Arc::clone(&catalog))
    });
    if let Some(lists) = cfg.outcome_lists() {
        runner = runner.with_outcome_lists(lists);
    }
    Ok(runner.run(run.start, end).await?)
}

fn check_config(explicit: Option<PathBuf>) -> Result<()> {
    let loaded = RunConfig::load(explicit.as_deref()).context("loading run config")?;
    if loaded.geometry.pixel_map.is_some() {
        let catalog = load_catalog(&loaded)?;
        info!(arrays = ?catalog.arrays().collect::<Vec<_>>(), "Pixel map OK");
    } else {
        warn!("geometry.pixel_map is not set, `todloop run` will refuse to start");
    }
    if let Some(list) = &loaded.run.unit_list {
        let units = read_list(list)?;
        info!(units = units.len(), list = %list.display(), "Unit list OK");
    }
    println!("{}", loaded.to_toml()?);
    Ok(())
}

fn simulate(out: PathBuf, units: usize, pixels: u32, seed: u64, compress: bool) -> Result<()> {
    let generated = synthetic::generate(&SyntheticConfig {
        units,
        pixels,
        seed,
        ..Default::default()
    })?;
    let planted: usize = generated.injected.iter().map(Vec::len).sum();
    let layout = synthetic::write(&generated, &out, ArtifactFormat::from_compress(compress))?;
    info!(events = planted, config = %layout.config.display(), "Simulation ready");
    println!("todloop run --config {}", layout.config.display());
    Ok(())
}

// ============================================================================
// Main
// ============================================================================

#[tokio::main]
async fn main() -> Result<()> {
    let args = CliArgs::parse();

    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    if args.log_json {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .with_target(false)
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(false)
            .init();
    }

    match args.command {
        SubCommand::Run {
            config,
            start,
            end,
            workers,
        } => {
            let report = run(config, start, end, workers).await?;
            for failure in &report.failures {
                warn!(
                    index = failure.index,
                    unit = %failure.unit,
                    routine = %failure.routine,
                    "{}",
                    failure.message
                );
            }
            info!(
                done = report.done.len(),
                errors = report.errors.len(),
                vetoed = report.vetoed.len(),
                "Finished"
            );
        }
        SubCommand::CheckConfig { config } => check_config(config)?,
        SubCommand::Simulate {
            out,
            units,
            pixels,
            seed,
            compress,
        } => simulate(out, units, pixels, seed, compress)?,
    }
    Ok(())
}
