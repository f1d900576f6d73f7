//! Coincidence Detection
//!
//! Combines the per-channel cuts of every pixel into a single interval set of
//! samples where the pixel's channels jointly report a flag.
//!
//! ## Combination policy
//!
//! | f1 | f2 | strict | within a band                               | across bands          |
//! |----|----|--------|---------------------------------------------|-----------------------|
//! | 2  | 2  | yes    | `union` if polarized, else `intersect`      | `intersect`           |
//! | 1  | 2  | no     | f2 combined as above                        | `intersect(f1, f2')`  |
//! | 2  | 1  | no     | f1 combined as above                        | `intersect(f1', f2)`  |
//! | 1  | 1  | no     | none                                        | `intersect(f1, f2)`   |
//!
//! Any other shape excludes the pixel. An unpolarized glitch has to show up
//! in both polarizations of a band; a polarized one may appear in either.

use crate::cuts::{ChannelCuts, IntervalSet};
use crate::geometry::{ChannelGrouping, PixelId};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::debug;

/// Per-pixel coincident cuts for one recording. Empty entries are pruned.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CoincidenceSet {
    /// Recording length in samples
    pub nsamps: usize,
    /// Coincident intervals keyed by pixel
    #[serde(default)]
    pub pixels: BTreeMap<PixelId, IntervalSet>,
}

impl CoincidenceSet {
    pub fn new(nsamps: usize) -> Self {
        Self {
            nsamps,
            pixels: BTreeMap::new(),
        }
    }

    /// Insert a pixel's set, dropping it if empty.
    pub fn insert(&mut self, pixel: PixelId, set: IntervalSet) {
        if set.is_empty() {
            self.pixels.remove(&pixel);
        } else {
            self.pixels.insert(pixel, set);
        }
    }

    pub fn get(&self, pixel: PixelId) -> Option<&IntervalSet> {
        self.pixels.get(&pixel)
    }

    pub fn len(&self) -> usize {
        self.pixels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pixels.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (PixelId, &IntervalSet)> {
        self.pixels.iter().map(|(&p, s)| (p, s))
    }
}

/// Policy-driven combiner of channel cuts into pixel coincidences.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CoincidenceDetector {
    /// Require all four channels (2 + 2) to be present
    pub strict: bool,
    /// Accept a flag in either polarization of a band
    pub polarized: bool,
}

impl Default for CoincidenceDetector {
    fn default() -> Self {
        Self {
            strict: true,
            polarized: false,
        }
    }
}

impl CoincidenceDetector {
    pub const fn new(strict: bool, polarized: bool) -> Self {
        Self { strict, polarized }
    }

    fn combine_band(&self, a: &IntervalSet, b: &IntervalSet) -> IntervalSet {
        if self.polarized {
            a.union(b)
        } else {
            a.intersect(b)
        }
    }

    /// Combine the cuts of one pixel given per band.
    ///
    /// Returns `None` when the band shapes exclude the pixel.
    pub fn combine_pixel(&self, f1: &[IntervalSet], f2: &[IntervalSet]) -> Option<IntervalSet> {
        match (f1, f2) {
            ([f1a, f1b], [f2a, f2b]) => {
                Some(self.combine_band(f1a, f1b).intersect(&self.combine_band(f2a, f2b)))
            }
            _ if self.strict => None,
            ([f1a], [f2a, f2b]) => Some(f1a.intersect(&self.combine_band(f2a, f2b))),
            ([f1a, f1b], [f2a]) => Some(self.combine_band(f1a, f1b).intersect(f2a)),
            ([f1a], [f2a]) => Some(f1a.intersect(f2a)),
            _ => None,
        }
    }

    /// Compute coincident cuts for every pixel of the grouping.
    ///
    /// Channels without cuts count as never flagged.
    pub fn detect(&self, cuts: &ChannelCuts, grouping: &dyn ChannelGrouping) -> CoincidenceSet {
        let mut result = CoincidenceSet::new(cuts.nsamps);
        let mut excluded = 0usize;

        for pixel in grouping.pixel_ids() {
            let f1: Vec<IntervalSet> = grouping
                .low_freq_channels(pixel)
                .into_iter()
                .map(|ch| cuts.channel_or_empty(ch))
                .collect();
            let f2: Vec<IntervalSet> = grouping
                .high_freq_channels(pixel)
                .into_iter()
                .map(|ch| cuts.channel_or_empty(ch))
                .collect();

            match self.combine_pixel(&f1, &f2) {
                Some(set) => result.insert(pixel, set),
                None => excluded += 1,
            }
        }

        debug!(
            strict = self.strict,
            polarized = self.polarized,
            pixels_with_coincidences = result.len(),
            pixels_excluded = excluded,
            "Coincidence detection complete"
        );
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::PixelMap;

    fn set(ranges: &[(usize, usize)]) -> IntervalSet {
        IntervalSet::from_ranges(ranges.iter().copied())
    }

    fn four_channel_cuts() -> ChannelCuts {
        ChannelCuts::new(100)
            .with_channel(0, set(&[(10, 20), (50, 60)]))
            .with_channel(1, set(&[(15, 25), (70, 80)]))
            .with_channel(2, set(&[(12, 18), (52, 58)]))
            .with_channel(3, set(&[(16, 30), (75, 78)]))
    }

    fn full_pixel_map() -> PixelMap {
        PixelMap::new().with_pixel(0, &[0, 1], &[2, 3]).unwrap()
    }

    #[test]
    fn test_strict_unpolarized_is_full_intersection() {
        let cuts = four_channel_cuts();
        let detector = CoincidenceDetector::new(true, false);
        let result = detector.detect(&cuts, &full_pixel_map());

        let expected = set(&[(10, 20), (50, 60)])
            .intersect(&set(&[(15, 25), (70, 80)]))
            .intersect(&set(&[(12, 18), (52, 58)]).intersect(&set(&[(16, 30), (75, 78)])));
        assert_eq!(result.get(0), Some(&expected));
        assert_eq!(expected, set(&[(16, 18)]));
    }

    #[test]
    fn test_strict_polarized_unions_within_band() {
        let cuts = four_channel_cuts();
        let detector = CoincidenceDetector::new(true, true);
        let result = detector.detect(&cuts, &full_pixel_map());

        // f1 = [10,25) [50,60) [70,80); f2 = [12,30) [52,58) [75,78)
        assert_eq!(result.get(0), Some(&set(&[(12, 25), (52, 58), (75, 78)])));
    }

    #[test]
    fn test_strict_excludes_partial_pixel() {
        let cuts = four_channel_cuts();
        let map = PixelMap::new().with_pixel(0, &[0], &[2, 3]).unwrap();
        for polarized in [false, true] {
            let result = CoincidenceDetector::new(true, polarized).detect(&cuts, &map);
            assert!(result.get(0).is_none());
        }
    }

    #[test]
    fn test_loose_shapes() {
        let cuts = four_channel_cuts();
        let detector = CoincidenceDetector::new(false, false);

        let one_two = PixelMap::new().with_pixel(0, &[0], &[2, 3]).unwrap();
        assert_eq!(detector.detect(&cuts, &one_two).get(0), Some(&set(&[(16, 18)])));

        let two_one = PixelMap::new().with_pixel(0, &[0, 1], &[2]).unwrap();
        assert_eq!(detector.detect(&cuts, &two_one).get(0), Some(&set(&[(15, 18)])));

        let one_one = PixelMap::new().with_pixel(0, &[1], &[3]).unwrap();
        assert_eq!(
            detector.detect(&cuts, &one_one).get(0),
            Some(&set(&[(16, 25), (75, 78)]))
        );

        let zero_two = PixelMap::new().with_pixel(0, &[], &[2, 3]).unwrap();
        assert!(detector.detect(&cuts, &zero_two).is_empty());
    }

    #[test]
    fn test_excluded_channel_demotes_pixel_shape() {
        let cuts = four_channel_cuts();
        let map = full_pixel_map().with_excluded([1]);
        assert!(CoincidenceDetector::new(true, false).detect(&cuts, &map).is_empty());
        assert!(!CoincidenceDetector::new(false, false).detect(&cuts, &map).is_empty());
    }

    #[test]
    fn test_empty_results_are_pruned() {
        let cuts = ChannelCuts::new(100)
            .with_channel(0, set(&[(10, 20)]))
            .with_channel(1, set(&[(10, 20)]))
            .with_channel(2, set(&[(40, 50)]))
            .with_channel(3, set(&[(40, 50)]));
        let result = CoincidenceDetector::default().detect(&cuts, &full_pixel_map());
        assert!(result.is_empty());
        assert_eq!(result.nsamps, 100);
    }

    #[test]
    fn test_missing_channel_cuts_count_as_unflagged() {
        let cuts = ChannelCuts::new(100).with_channel(0, set(&[(10, 20)]));
        let map = PixelMap::new().with_pixel(0, &[0], &[2]).unwrap();
        assert!(CoincidenceDetector::new(false, true).detect(&cuts, &map).is_empty());
    }
}
