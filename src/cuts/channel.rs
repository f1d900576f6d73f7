//! Per-channel cut collections for one recording.

use super::IntervalSet;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Detector channel identifier.
pub type ChannelId = u32;

/// A cut reaching past the end of its recording.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("channel {channel} has a cut ending at sample {end}, past the recording length {nsamps}")]
pub struct CutOutOfRange {
    pub channel: ChannelId,
    pub end: usize,
    pub nsamps: usize,
}

/// Flagged intervals of every channel of one recording.
///
/// Channels absent from the map have no cuts. Deserialization rejects any
/// cut ending past `nsamps`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "RawChannelCuts")]
pub struct ChannelCuts {
    /// Recording length in samples
    pub nsamps: usize,
    /// Cuts keyed by channel
    #[serde(default)]
    pub cuts: BTreeMap<ChannelId, IntervalSet>,
}

impl ChannelCuts {
    pub fn new(nsamps: usize) -> Self {
        Self {
            nsamps,
            cuts: BTreeMap::new(),
        }
    }

    /// Builder-style insert, mostly for tests and synthetic data.
    #[must_use]
    pub fn with_channel(mut self, channel: ChannelId, set: IntervalSet) -> Self {
        self.cuts.insert(channel, set);
        self
    }

    pub fn insert(&mut self, channel: ChannelId, set: IntervalSet) {
        self.cuts.insert(channel, set);
    }

    /// Cuts of one channel, `None` if the channel was never flagged.
    pub fn get(&self, channel: ChannelId) -> Option<&IntervalSet> {
        self.cuts.get(&channel)
    }

    /// Cuts of one channel, empty if the channel is unknown.
    pub fn channel_or_empty(&self, channel: ChannelId) -> IntervalSet {
        self.cuts.get(&channel).cloned().unwrap_or_default()
    }

    pub fn channel_count(&self) -> usize {
        self.cuts.len()
    }

    /// Total number of intervals across all channels.
    pub fn interval_count(&self) -> usize {
        self.cuts.values().map(IntervalSet::len).sum()
    }

    /// Every cut must lie within `[0, nsamps)`.
    pub fn check_bounds(&self) -> Result<(), CutOutOfRange> {
        match self
            .cuts
            .iter()
            .find(|(_, set)| set.last_end() > self.nsamps)
        {
            Some((&channel, set)) => Err(CutOutOfRange {
                channel,
                end: set.last_end(),
                nsamps: self.nsamps,
            }),
            None => Ok(()),
        }
    }

    /// Remove, channel by channel, every interval overlapping `to_remove`
    /// (widened by `buffer`). Channels missing from `to_remove` are untouched.
    #[must_use]
    pub fn difference(&self, to_remove: &Self, buffer: usize) -> Self {
        let cuts = self
            .cuts
            .iter()
            .map(|(&ch, set)| {
                let cleaned = match to_remove.cuts.get(&ch) {
                    Some(remove) => set.difference(remove, buffer),
                    None => set.clone(),
                };
                (ch, cleaned)
            })
            .collect();
        Self {
            nsamps: self.nsamps,
            cuts,
        }
    }

    /// Apply [`IntervalSet::trim_edges`] to every channel.
    #[must_use]
    pub fn trim_edges(&self, threshold: usize) -> Self {
        let cuts = self
            .cuts
            .iter()
            .map(|(&ch, set)| (ch, set.trim_edges(self.nsamps, threshold)))
            .collect();
        Self {
            nsamps: self.nsamps,
            cuts,
        }
    }
}

#[derive(Deserialize)]
struct RawChannelCuts {
    nsamps: usize,
    #[serde(default)]
    cuts: BTreeMap<ChannelId, IntervalSet>,
}

impl TryFrom<RawChannelCuts> for ChannelCuts {
    type Error = CutOutOfRange;

    fn try_from(raw: RawChannelCuts) -> Result<Self, Self::Error> {
        let cuts = Self {
            nsamps: raw.nsamps,
            cuts: raw.cuts,
        };
        cuts.check_bounds()?;
        Ok(cuts)
    }
}
