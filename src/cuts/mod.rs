//! Flagged-Sample Interval Algebra
//!
//! A cut is a contiguous run of samples flagged as anomalous on one channel.
//! [`IntervalSet`] holds the cuts of a single channel as sorted, merged,
//! half-open `[start, end)` intervals over the recording timeline.
//!
//! ## Combination
//!
//! `union` and `intersect` rasterize both operands to an occupancy mask over
//! `max(lastEnd)` samples, combine the masks, and convert back. Inputs coming
//! from independent detection passes may overlap arbitrarily; going through
//! the mask always yields a normalized result.
//!
//! All operations return new sets.

mod channel;

pub use channel::{ChannelCuts, ChannelId, CutOutOfRange};

use serde::{Deserialize, Serialize};

/// Samples at each recording edge inside which cuts are discarded by default.
pub const EDGE_TRIM_SAMPLES: usize = 100;

// ============================================================================
// Interval
// ============================================================================

/// Half-open sample range `[start, end)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Interval {
    pub start: usize,
    pub end: usize,
}

impl Interval {
    pub const fn new(start: usize, end: usize) -> Self {
        Self { start, end }
    }

    /// Number of samples covered.
    pub const fn len(&self) -> usize {
        self.end.saturating_sub(self.start)
    }

    pub const fn is_empty(&self) -> bool {
        self.end <= self.start
    }

    pub const fn contains(&self, sample: usize) -> bool {
        self.start <= sample && sample < self.end
    }

    /// True if this interval shares at least one sample with `[start, end)`.
    pub const fn overlaps(&self, start: usize, end: usize) -> bool {
        self.start < end && start < self.end
    }
}

// ============================================================================
// IntervalSet
// ============================================================================

/// Ordered, non-overlapping, non-touching set of flagged intervals.
///
/// Serializes as a list of `[start, end]` pairs. Deserialization normalizes,
/// so hand-written artifacts with unsorted or overlapping rows are accepted.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "Vec<(usize, usize)>", into = "Vec<(usize, usize)>")]
pub struct IntervalSet {
    intervals: Vec<Interval>,
}

impl IntervalSet {
    pub const fn empty() -> Self {
        Self {
            intervals: Vec::new(),
        }
    }

    /// Build a normalized set from arbitrary `(start, end)` ranges.
    ///
    /// Empty ranges are dropped; overlapping or touching ranges are merged.
    pub fn from_ranges<I>(ranges: I) -> Self
    where
        I: IntoIterator<Item = (usize, usize)>,
    {
        let mut raw: Vec<Interval> = ranges
            .into_iter()
            .filter(|&(s, e)| e > s)
            .map(|(s, e)| Interval::new(s, e))
            .collect();
        raw.sort_unstable();

        let mut intervals: Vec<Interval> = Vec::with_capacity(raw.len());
        for iv in raw {
            match intervals.last_mut() {
                Some(last) if iv.start <= last.end => last.end = last.end.max(iv.end),
                _ => intervals.push(iv),
            }
        }
        Self { intervals }
    }

    /// Convert an occupancy mask back into intervals.
    pub fn from_mask(mask: &[bool]) -> Self {
        let mut intervals = Vec::new();
        let mut open: Option<usize> = None;
        for (t, &flagged) in mask.iter().enumerate() {
            match (flagged, open) {
                (true, None) => open = Some(t),
                (false, Some(start)) => {
                    intervals.push(Interval::new(start, t));
                    open = None;
                }
                _ => {}
            }
        }
        if let Some(start) = open {
            intervals.push(Interval::new(start, mask.len()));
        }
        Self { intervals }
    }

    /// Rasterize to a boolean mask of length `nsamps`.
    ///
    /// Intervals reaching past `nsamps` are clipped.
    pub fn to_mask(&self, nsamps: usize) -> Vec<bool> {
        let mut mask = vec![false; nsamps];
        for iv in &self.intervals {
            let end = iv.end.min(nsamps);
            if iv.start < end {
                mask[iv.start..end].fill(true);
            }
        }
        mask
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Interval> {
        self.intervals.iter()
    }

    pub fn as_slice(&self) -> &[Interval] {
        &self.intervals
    }

    /// Number of intervals (not samples).
    pub fn len(&self) -> usize {
        self.intervals.len()
    }

    pub fn is_empty(&self) -> bool {
        self.intervals.is_empty()
    }

    /// End of the last interval, 0 for an empty set.
    pub fn last_end(&self) -> usize {
        self.intervals.last().map_or(0, |iv| iv.end)
    }

    /// Total number of flagged samples.
    pub fn covered_samples(&self) -> usize {
        self.intervals.iter().map(Interval::len).sum()
    }

    /// Membership test for a single sample.
    pub fn contains_sample(&self, sample: usize) -> bool {
        self.intervals.iter().any(|iv| iv.contains(sample))
    }

    /// True if any interval shares a sample with `[start, end)`.
    ///
    /// Equivalent to `(start..end).any(|t| self.contains_sample(t))`.
    pub fn overlaps_range(&self, start: usize, end: usize) -> bool {
        self.intervals.iter().any(|iv| iv.overlaps(start, end))
    }

    /// Samples flagged in either set.
    pub fn union(&self, other: &Self) -> Self {
        if self.is_empty() {
            return other.clone();
        }
        if other.is_empty() {
            return self.clone();
        }
        self.combine(other, |a, b| a || b)
    }

    /// Samples flagged in both sets.
    pub fn intersect(&self, other: &Self) -> Self {
        if self.is_empty() || other.is_empty() {
            return Self::empty();
        }
        self.combine(other, |a, b| a && b)
    }

    fn combine(&self, other: &Self, op: impl Fn(bool, bool) -> bool) -> Self {
        let nsamps = self.last_end().max(other.last_end());
        let lhs = self.to_mask(nsamps);
        let rhs = other.to_mask(nsamps);
        let mask: Vec<bool> = lhs.iter().zip(&rhs).map(|(&a, &b)| op(a, b)).collect();
        Self::from_mask(&mask)
    }

    /// Drop every interval that overlaps any interval of `to_remove`, where
    /// each interval of `to_remove` is widened by `buffer` samples on both
    /// sides. Intervals touching a widened interval are dropped as well.
    ///
    /// Whole intervals are removed, never split.
    pub fn difference(&self, to_remove: &Self, buffer: usize) -> Self {
        let intervals = self
            .intervals
            .iter()
            .filter(|a| {
                to_remove
                    .iter()
                    .all(|r| a.end + buffer < r.start || a.start > r.end + buffer)
            })
            .copied()
            .collect();
        Self { intervals }
    }

    /// Drop intervals starting within `threshold` samples of the beginning or
    /// ending within `threshold` samples of `nsamps`.
    pub fn trim_edges(&self, nsamps: usize, threshold: usize) -> Self {
        let intervals = self
            .intervals
            .iter()
            .filter(|iv| iv.start > threshold && iv.end + threshold < nsamps)
            .copied()
            .collect();
        Self { intervals }
    }
}

impl From<Vec<(usize, usize)>> for IntervalSet {
    fn from(ranges: Vec<(usize, usize)>) -> Self {
        Self::from_ranges(ranges)
    }
}

impl From<IntervalSet> for Vec<(usize, usize)> {
    fn from(set: IntervalSet) -> Self {
        set.intervals.iter().map(|iv| (iv.start, iv.end)).collect()
    }
}

impl FromIterator<(usize, usize)> for IntervalSet {
    fn from_iter<T: IntoIterator<Item = (usize, usize)>>(iter: T) -> Self {
        Self::from_ranges(iter)
    }
}

impl<'a> IntoIterator for &'a IntervalSet {
    type Item = &'a Interval;
    type IntoIter = std::slice::Iter<'a, Interval>;

    fn into_iter(self) -> Self::IntoIter {
        self.intervals.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    fn set(ranges: &[(usize, usize)]) -> IntervalSet {
        IntervalSet::from_ranges(ranges.iter().copied())
    }

    fn random_set(rng: &mut StdRng, nsamps: usize) -> IntervalSet {
        let n = rng.gen_range(0..8);
        (0..n)
            .map(|_| {
                let start = rng.gen_range(0..nsamps);
                let len = rng.gen_range(1..20);
                (start, (start + len).min(nsamps))
            })
            .collect()
    }

    #[test]
    fn test_from_ranges_normalizes() {
        let s = set(&[(10, 20), (0, 5), (15, 25), (25, 30), (40, 40)]);
        assert_eq!(s.as_slice(), &[Interval::new(0, 5), Interval::new(10, 30)]);
    }

    #[test]
    fn test_mask_round_trip() {
        let s = set(&[(2, 5), (7, 9)]);
        let mask = s.to_mask(12);
        assert_eq!(
            mask,
            vec![false, false, true, true, true, false, false, true, true, false, false, false]
        );
        assert_eq!(IntervalSet::from_mask(&mask), s);
    }

    #[test]
    fn test_mask_open_at_end() {
        let s = IntervalSet::from_mask(&[false, true, true]);
        assert_eq!(s.as_slice(), &[Interval::new(1, 3)]);
    }

    #[test]
    fn test_union_and_intersect() {
        let a = set(&[(0, 10), (20, 30)]);
        let b = set(&[(5, 25)]);
        assert_eq!(a.union(&b), set(&[(0, 30)]));
        assert_eq!(a.intersect(&b), set(&[(5, 10), (20, 25)]));
    }

    #[test]
    fn test_empty_operand_short_circuit() {
        let b = set(&[(3, 8)]);
        let empty = IntervalSet::empty();
        assert_eq!(empty.union(&b), b);
        assert_eq!(b.union(&empty), b);
        assert!(empty.intersect(&b).is_empty());
        assert!(b.intersect(&empty).is_empty());
    }

    #[test]
    fn test_algebraic_properties_random() {
        let mut rng = StdRng::seed_from_u64(42);
        for _ in 0..500 {
            let a = random_set(&mut rng, 200);
            let b = random_set(&mut rng, 200);

            assert_eq!(a.union(&b), b.union(&a));
            assert_eq!(a.intersect(&b), b.intersect(&a));
            assert_eq!(a.intersect(&a.union(&b)), a);

            let n = a.last_end().max(1);
            assert_eq!(IntervalSet::from_mask(&a.to_mask(n)), a);
        }
    }

    #[test]
    fn test_contains_sample_half_open() {
        let s = set(&[(2, 5)]);
        assert!(!s.contains_sample(1));
        assert!(s.contains_sample(2));
        assert!(s.contains_sample(4));
        assert!(!s.contains_sample(5));
    }

    #[test]
    fn test_overlaps_range_matches_per_sample_scan() {
        let mut rng = StdRng::seed_from_u64(7);
        for _ in 0..200 {
            let s = random_set(&mut rng, 100);
            let start = rng.gen_range(0..100);
            let end = start + rng.gen_range(0..15);
            let scanned = (start..end).any(|t| s.contains_sample(t));
            assert_eq!(s.overlaps_range(start, end), scanned);
        }
    }

    #[test]
    fn test_difference_drops_whole_overlapping_intervals() {
        let a = set(&[(0, 10), (20, 30), (50, 60)]);
        let r = set(&[(25, 26)]);
        assert_eq!(a.difference(&r, 0), set(&[(0, 10), (50, 60)]));
    }

    #[test]
    fn test_difference_with_buffer() {
        let a = set(&[(0, 10), (20, 30)]);
        let r = set(&[(13, 16)]);
        assert_eq!(a.difference(&r, 0), a);
        // widened to [10, 19]: touches (0, 10) but not (20, 30)
        assert_eq!(a.difference(&r, 3), set(&[(20, 30)]));
        assert!(a.difference(&r, 10).is_empty());
    }

    #[test]
    fn test_trim_edges() {
        let a = set(&[(50, 60), (150, 160), (900, 950), (950 + 2, 1000)]);
        let trimmed = a.trim_edges(1000, EDGE_TRIM_SAMPLES);
        assert_eq!(trimmed, set(&[(150, 160)]));
    }

    #[test]
    fn test_trim_edges_boundaries_are_strict() {
        // start == threshold and end + threshold == nsamps are both dropped
        let edges = set(&[(100, 110), (890, 900)]);
        assert!(edges.trim_edges(1000, 100).is_empty());

        let inside = set(&[(101, 110), (890, 899)]);
        assert_eq!(inside.trim_edges(1000, 100), inside);
    }

    #[test]
    fn test_serde_normalizes_on_read() {
        let s: IntervalSet = serde_json::from_str("[[10, 20], [0, 5], [18, 22]]").unwrap();
        assert_eq!(s, set(&[(0, 5), (10, 22)]));
        assert_eq!(serde_json::to_string(&s).unwrap(), "[[0,5],[10,22]]");
    }
}
