//! Flag detection: raw samples to per-channel cuts.

use super::Recording;
use crate::cuts::{ChannelCuts, IntervalSet};
use serde::{Deserialize, Serialize};
use statrs::statistics::Statistics;

/// Produces flagged intervals from a raw recording.
pub trait FlagDetector: Send + Sync {
    fn detect(&self, recording: &Recording) -> ChannelCuts;
}

/// Flags samples more than `n_sigma` standard deviations from the channel
/// mean.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ThresholdFlagDetector {
    pub n_sigma: f64,
    /// Runs shorter than this are ignored
    pub min_samples: usize,
    /// Samples added on both sides of every kept run
    pub pad: usize,
}

impl Default for ThresholdFlagDetector {
    fn default() -> Self {
        Self {
            n_sigma: 5.0,
            min_samples: 1,
            pad: 0,
        }
    }
}

impl ThresholdFlagDetector {
    pub fn channel_cuts(&self, samples: &[f64]) -> IntervalSet {
        let nsamps = samples.len();
        if nsamps < 2 {
            return IntervalSet::empty();
        }
        let mean = samples.iter().mean();
        let std_dev = samples.iter().std_dev();
        if !std_dev.is_finite() || std_dev <= 0.0 {
            return IntervalSet::empty();
        }

        let limit = self.n_sigma * std_dev;
        let mask: Vec<bool> = samples.iter().map(|x| (x - mean).abs() > limit).collect();
        IntervalSet::from_mask(&mask)
            .iter()
            .filter(|iv| iv.len() >= self.min_samples)
            .map(|iv| (iv.start.saturating_sub(self.pad), (iv.end + self.pad).min(nsamps)))
            .collect()
    }
}

impl FlagDetector for ThresholdFlagDetector {
    fn detect(&self, recording: &Recording) -> ChannelCuts {
        let mut cuts = ChannelCuts::new(recording.nsamps);
        for (&channel, samples) in &recording.channels {
            let set = self.channel_cuts(samples);
            if !set.is_empty() {
                cuts.insert(channel, set);
            }
        }
        cuts
    }
}
