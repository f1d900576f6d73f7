//! Synthetic Run Generator
//!
//! Produces per-unit cut artifacts with known coincident events, a pixel map
//! and a unit list, for demos (`todloop simulate`) and end-to-end tests.
//!
//! Pixel `p` owns channels `4p..4p+4`: `f1 = [4p, 4p+1]`, `f2 = [4p+2, 4p+3]`,
//! and its id is `4p`. An injected event flags the same interval on all four
//! channels of every participating pixel, so it survives the strictest
//! coincidence policy. Noise cuts land on single channels and never survive
//! an intersection within a band.

use crate::config::RunConfig;
use crate::cuts::{ChannelCuts, ChannelId, IntervalSet, EDGE_TRIM_SAMPLES};
use crate::geometry::{GeometryError, PixelCatalog, PixelId, PixelMap};
use crate::storage::{write_list, ArtifactFormat, ArtifactStore};
use anyhow::{Context, Result};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};
use tracing::info;

/// Samples kept free of events at both ends so edge trimming leaves them.
const EDGE_MARGIN: usize = 2 * EDGE_TRIM_SAMPLES;

/// Generator settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyntheticConfig {
    pub units: usize,
    pub nsamps: usize,
    pub pixels: u32,
    pub events_per_unit: usize,
    /// Single-channel noise cuts per channel
    pub noise_per_channel: usize,
    pub max_event_duration: usize,
    pub array: String,
    pub seed: u64,
}

impl Default for SyntheticConfig {
    fn default() -> Self {
        Self {
            units: 10,
            nsamps: 20_000,
            pixels: 16,
            events_per_unit: 3,
            noise_per_channel: 2,
            max_event_duration: 40,
            array: "ar1".to_string(),
            seed: 42,
        }
    }
}

/// An event planted in a unit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InjectedEvent {
    pub start: usize,
    pub end: usize,
    pub pixels: BTreeSet<PixelId>,
}

/// Everything generated for one synthetic run.
#[derive(Debug, Clone)]
pub struct SyntheticRun {
    pub units: Vec<String>,
    pub cuts: Vec<ChannelCuts>,
    pub injected: Vec<Vec<InjectedEvent>>,
    pub map: PixelMap,
}

/// Files written by [`write`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyntheticLayout {
    pub cuts_dir: PathBuf,
    pub pixel_map: PathBuf,
    pub unit_list: PathBuf,
    pub config: PathBuf,
}

pub const fn pixel_channels(pixel_index: u32) -> ([ChannelId; 2], [ChannelId; 2]) {
    let base = pixel_index * 4;
    ([base, base + 1], [base + 2, base + 3])
}

pub fn pixel_map(pixels: u32) -> Result<PixelMap, GeometryError> {
    (0..pixels).try_fold(PixelMap::new(), |map, p| {
        let (f1, f2) = pixel_channels(p);
        map.with_pixel(f1[0], &f1, &f2)
    })
}

pub fn generate(config: &SyntheticConfig) -> Result<SyntheticRun> {
    let map = pixel_map(config.pixels)?;
    let mut rng = StdRng::seed_from_u64(config.seed);
    let pixel_indices: Vec<u32> = (0..config.pixels).collect();
    let usable = config.nsamps.saturating_sub(2 * EDGE_MARGIN);
    let slot = usable / config.events_per_unit.max(1);
    let max_duration = config.max_event_duration.min(slot / 2).max(1);

    let mut units = Vec::with_capacity(config.units);
    let mut cuts = Vec::with_capacity(config.units);
    let mut injected = Vec::with_capacity(config.units);

    for u in 0..config.units {
        let ctime = 1_400_000_000 + u * 1_000;
        units.push(format!("{ctime}.{}.{}", ctime + 600, config.array));

        let mut per_channel: BTreeMap<ChannelId, Vec<(usize, usize)>> = BTreeMap::new();
        let mut events = Vec::new();

        if slot > 2 && !pixel_indices.is_empty() {
            for e in 0..config.events_per_unit {
                let duration = rng.gen_range(1..=max_duration);
                let slot_start = EDGE_MARGIN + e * slot;
                let start = rng.gen_range(slot_start..slot_start + slot - duration);
                let n_pixels = rng.gen_range(1..=pixel_indices.len().min(6));

                let mut pixels = BTreeSet::new();
                for &p in pixel_indices.choose_multiple(&mut rng, n_pixels) {
                    let (f1, f2) = pixel_channels(p);
                    for ch in f1.into_iter().chain(f2) {
                        per_channel.entry(ch).or_default().push((start, start + duration));
                    }
                    pixels.insert(f1[0]);
                }
                events.push(InjectedEvent {
                    start,
                    end: start + duration,
                    pixels,
                });
            }
        }

        for ch in 0..config.pixels * 4 {
            for _ in 0..config.noise_per_channel {
                let len = rng.gen_range(1..=10);
                if config.nsamps > len {
                    let start = rng.gen_range(0..config.nsamps - len);
                    per_channel.entry(ch).or_default().push((start, start + len));
                }
            }
        }

        let mut unit_cuts = ChannelCuts::new(config.nsamps);
        for (ch, ranges) in per_channel {
            unit_cuts.insert(ch, IntervalSet::from_ranges(ranges));
        }
        cuts.push(unit_cuts);
        injected.push(events);
    }

    Ok(SyntheticRun {
        units,
        cuts,
        injected,
        map,
    })
}

/// Write a generated run under `out` and a ready-to-use `todloop.toml`.
pub fn write(run: &SyntheticRun, out: &Path, format: ArtifactFormat) -> Result<SyntheticLayout> {
    let layout = SyntheticLayout {
        cuts_dir: out.join("cuts"),
        pixel_map: out.join("pixels.toml"),
        unit_list: out.join("units.txt"),
        config: out.join("todloop.toml"),
    };

    let artifacts = ArtifactStore::new(&layout.cuts_dir, format);
    artifacts.ensure_dir()?;
    for (index, cuts) in run.cuts.iter().enumerate() {
        artifacts
            .save(index, cuts)
            .with_context(|| format!("writing synthetic cuts for unit {index}"))?;
    }

    let catalog = PixelCatalog::single(run.map.clone());
    std::fs::write(&layout.pixel_map, catalog.to_toml_string()?)
        .with_context(|| format!("writing {}", layout.pixel_map.display()))?;
    write_list(&layout.unit_list, &run.units)?;

    let mut config = RunConfig::default();
    config.run.unit_list = Some(layout.unit_list.clone());
    config.run.done_list = Some(out.join("done.txt"));
    config.run.error_list = Some(out.join("errors.txt"));
    config.input.cuts_dir = layout.cuts_dir.clone();
    config.input.compressed = format == ArtifactFormat::JsonZstd;
    config.geometry.pixel_map = Some(layout.pixel_map.clone());
    config.output.dir = out.join("events");
    std::fs::write(&layout.config, config.to_toml()?)
        .with_context(|| format!("writing {}", layout.config.display()))?;

    info!(
        out = %out.display(),
        units = run.units.len(),
        pixels = run.map.len(),
        "Synthetic run written"
    );
    Ok(layout)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::coincidence::CoincidenceDetector;
    use crate::events::EventExtractor;

    #[test]
    fn test_generation_is_deterministic() {
        let config = SyntheticConfig {
            units: 3,
            ..Default::default()
        };
        let a = generate(&config).unwrap();
        let b = generate(&config).unwrap();
        assert_eq!(a.cuts, b.cuts);
        assert_eq!(a.units, b.units);
        assert_eq!(a.units[0], "1400000000.1400000600.ar1");
    }

    #[test]
    fn test_injected_events_are_recovered() {
        let config = SyntheticConfig {
            units: 4,
            seed: 7,
            ..Default::default()
        };
        let run = generate(&config).unwrap();
        let detector = CoincidenceDetector::default();

        for (index, cuts) in run.cuts.iter().enumerate() {
            let cosig = detector.detect(&cuts.trim_edges(EDGE_TRIM_SAMPLES), &run.map);
            let events = EventExtractor::default().extract(index, &cosig);
            let found: Vec<(usize, usize)> = events.iter().map(|e| (e.start, e.end)).collect();
            let expected: Vec<(usize, usize)> =
                run.injected[index].iter().map(|e| (e.start, e.end)).collect();
            assert_eq!(found, expected);
            for (event, planted) in events.iter().zip(&run.injected[index]) {
                assert_eq!(event.pixels_affected, planted.pixels);
            }
        }
    }

    #[test]
    fn test_pixel_map_groups_four_channels_per_pixel() {
        let map = pixel_map(3).unwrap();
        assert_eq!(map.len(), 3);
        assert!(pixel_map(0).unwrap().is_empty());
    }

    #[test]
    fn test_write_layout() {
        let tmp = tempfile::tempdir().unwrap();
        let run = generate(&SyntheticConfig {
            units: 2,
            pixels: 4,
            ..Default::default()
        })
        .unwrap();
        let layout = write(&run, tmp.path(), ArtifactFormat::Json).unwrap();

        assert!(layout.cuts_dir.join("1.json").exists());
        let catalog = PixelCatalog::load(&layout.pixel_map).unwrap();
        assert_eq!(catalog.resolve("ar1"), Some(&run.map));
        let config = RunConfig::load_from_file(&layout.config).unwrap();
        assert_eq!(config.run.unit_list, Some(layout.unit_list));
    }
}
