//! Event Extraction
//!
//! Turns per-pixel coincidences into discrete events:
//!
//! ```text
//! CoincidenceSet ──▶ OccupancyHistogram ──▶ Peaks ──▶ Events
//!                    hist[t] = #pixels      maximal     id, span,
//!                    flagged at t           runs > 0    affected pixels
//! ```
//!
//! A peak carries `pixel_count`, the histogram maximum inside the run (the
//! instantaneous occupancy). An event additionally carries
//! `pixels_affected`, every pixel flagged anywhere in the run. The two are
//! independent and may disagree: pixels that fire one after another inside
//! a run raise the set size without raising the maximum.

use crate::coincidence::CoincidenceSet;
use crate::geometry::PixelId;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// What to do with a run that is still nonzero at the last histogram sample.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TrailingPeak {
    /// Close the run at the end of the histogram and emit it
    #[default]
    Close,
    /// Discard the unterminated run
    Drop,
}

// ============================================================================
// Histogram
// ============================================================================

/// Number of distinct pixels flagged at each sample.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OccupancyHistogram {
    counts: Vec<u32>,
}

impl OccupancyHistogram {
    /// Build the histogram over `coincidences.nsamps` samples.
    ///
    /// Intervals past the recording length are clipped.
    pub fn from_coincidences(coincidences: &CoincidenceSet) -> Self {
        let nsamps = coincidences.nsamps;
        let mut counts = vec![0u32; nsamps];
        for (_, set) in coincidences.iter() {
            for iv in set {
                let end = iv.end.min(nsamps);
                if iv.start < end {
                    for c in &mut counts[iv.start..end] {
                        *c += 1;
                    }
                }
            }
        }
        Self { counts }
    }

    pub fn from_counts(counts: Vec<u32>) -> Self {
        Self { counts }
    }

    pub fn as_slice(&self) -> &[u32] {
        &self.counts
    }

    pub fn len(&self) -> usize {
        self.counts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.counts.is_empty()
    }

    pub fn max(&self) -> u32 {
        self.counts.iter().copied().max().unwrap_or(0)
    }

    pub fn peaks(&self, trailing: TrailingPeak) -> Vec<Peak> {
        find_peaks(&self.counts, trailing)
    }
}

// ============================================================================
// Peaks
// ============================================================================

/// Maximal run of nonzero occupancy `[start, end)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Peak {
    pub start: usize,
    pub end: usize,
    pub duration: usize,
    /// Maximum histogram value inside the run
    pub pixel_count: u32,
}

impl Peak {
    fn from_run(hist: &[u32], start: usize, end: usize) -> Self {
        Self {
            start,
            end,
            duration: end - start,
            pixel_count: hist[start..end].iter().copied().max().unwrap_or(0),
        }
    }
}

/// Scan a histogram left to right for runs of nonzero values.
///
/// A run opens at the first nonzero sample after a zero (or at index 0) and
/// closes at the next zero. A run reaching the end is handled by `trailing`.
pub fn find_peaks(hist: &[u32], trailing: TrailingPeak) -> Vec<Peak> {
    let mut peaks = Vec::new();
    let mut open: Option<usize> = None;

    for (t, &count) in hist.iter().enumerate() {
        match (count > 0, open) {
            (true, None) => open = Some(t),
            (false, Some(start)) => {
                peaks.push(Peak::from_run(hist, start, t));
                open = None;
            }
            _ => {}
        }
    }

    if let (Some(start), TrailingPeak::Close) = (open, trailing) {
        peaks.push(Peak::from_run(hist, start, hist.len()));
    }
    peaks
}

// ============================================================================
// Events
// ============================================================================

/// One physical event seen by several pixels at once.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    /// `"{unit_index}.{start}"`, unique within a run
    pub id: String,
    pub start: usize,
    pub end: usize,
    pub duration: usize,
    /// Peak occupancy, see [`Peak::pixel_count`]
    pub number_of_pixels: f64,
    /// Every pixel flagged somewhere in `[start, end)`
    pub pixels_affected: BTreeSet<PixelId>,
}

impl Event {
    pub fn event_id(unit_index: usize, start: usize) -> String {
        format!("{unit_index}.{start}")
    }
}

/// Pixels whose coincident cuts contain any sample of `[start, end)`.
pub fn pixels_affected(coincidences: &CoincidenceSet, start: usize, end: usize) -> BTreeSet<PixelId> {
    coincidences
        .iter()
        .filter(|(_, set)| set.overlaps_range(start, end))
        .map(|(pixel, _)| pixel)
        .collect()
}

/// Histogram → peaks → events for one unit.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EventExtractor {
    pub trailing: TrailingPeak,
}

impl EventExtractor {
    pub const fn new(trailing: TrailingPeak) -> Self {
        Self { trailing }
    }

    pub fn extract(&self, unit_index: usize, coincidences: &CoincidenceSet) -> Vec<Event> {
        let hist = OccupancyHistogram::from_coincidences(coincidences);
        hist.peaks(self.trailing)
            .into_iter()
            .map(|peak| Event {
                id: Event::event_id(unit_index, peak.start),
                start: peak.start,
                end: peak.end,
                duration: peak.duration,
                number_of_pixels: f64::from(peak.pixel_count),
                pixels_affected: pixels_affected(coincidences, peak.start, peak.end),
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cuts::IntervalSet;

    fn set(ranges: &[(usize, usize)]) -> IntervalSet {
        IntervalSet::from_ranges(ranges.iter().copied())
    }

    #[test]
    fn test_find_peaks_reference_histogram() {
        let hist = [0, 0, 1, 1, 1, 0, 0, 2, 2, 0];
        let peaks = find_peaks(&hist, TrailingPeak::Close);
        assert_eq!(
            peaks,
            vec![
                Peak { start: 2, end: 5, duration: 3, pixel_count: 1 },
                Peak { start: 7, end: 9, duration: 2, pixel_count: 2 },
            ]
        );
        assert_eq!(find_peaks(&hist, TrailingPeak::Drop), peaks);
    }

    #[test]
    fn test_trailing_peak_policy() {
        let hist = [0, 1, 0, 3, 2];
        assert_eq!(
            find_peaks(&hist, TrailingPeak::Close),
            vec![
                Peak { start: 1, end: 2, duration: 1, pixel_count: 1 },
                Peak { start: 3, end: 5, duration: 2, pixel_count: 3 },
            ]
        );
        assert_eq!(
            find_peaks(&hist, TrailingPeak::Drop),
            vec![Peak { start: 1, end: 2, duration: 1, pixel_count: 1 }]
        );
    }

    #[test]
    fn test_peak_at_index_zero() {
        let peaks = find_peaks(&[2, 1, 0], TrailingPeak::Drop);
        assert_eq!(peaks, vec![Peak { start: 0, end: 2, duration: 2, pixel_count: 2 }]);
    }

    #[test]
    fn test_empty_histogram_yields_no_peaks() {
        assert!(find_peaks(&[], TrailingPeak::Close).is_empty());
        assert!(find_peaks(&[0, 0, 0], TrailingPeak::Close).is_empty());
    }

    #[test]
    fn test_histogram_counts_distinct_pixels() {
        let mut cs = CoincidenceSet::new(10);
        cs.insert(1, set(&[(2, 5)]));
        cs.insert(2, set(&[(7, 9)]));
        cs.insert(3, set(&[(7, 9), (20, 30)]));

        let hist = OccupancyHistogram::from_coincidences(&cs);
        assert_eq!(hist.as_slice(), &[0, 0, 1, 1, 1, 0, 0, 2, 2, 0]);
        assert_eq!(hist.max(), 2);
    }

    #[test]
    fn test_extract_events() {
        let mut cs = CoincidenceSet::new(10);
        cs.insert(1, set(&[(2, 5)]));
        cs.insert(2, set(&[(7, 9)]));
        cs.insert(3, set(&[(7, 9)]));

        let events = EventExtractor::default().extract(42, &cs);
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].id, "42.2");
        assert_eq!(events[0].duration, 3);
        assert_eq!(events[0].pixels_affected, BTreeSet::from([1]));
        assert_eq!(events[1].id, "42.7");
        assert!((events[1].number_of_pixels - 2.0).abs() < f64::EPSILON);
        assert_eq!(events[1].pixels_affected, BTreeSet::from([2, 3]));
    }

    #[test]
    fn test_pixel_count_and_affected_set_are_independent() {
        // Three pixels fire one after another inside one run.
        let mut cs = CoincidenceSet::new(12);
        cs.insert(1, set(&[(1, 3)]));
        cs.insert(2, set(&[(3, 5)]));
        cs.insert(3, set(&[(5, 7)]));

        let events = EventExtractor::default().extract(0, &cs);
        assert_eq!(events.len(), 1);
        assert!((events[0].number_of_pixels - 1.0).abs() < f64::EPSILON);
        assert_eq!(events[0].pixels_affected.len(), 3);
    }

    #[test]
    fn test_pixels_affected_matches_per_sample_scan() {
        let mut cs = CoincidenceSet::new(50);
        cs.insert(1, set(&[(2, 4), (30, 33)]));
        cs.insert(2, set(&[(10, 12)]));
        cs.insert(5, set(&[(3, 11)]));

        for (start, end) in [(0, 5), (4, 10), (11, 31), (33, 50)] {
            let scanned: BTreeSet<PixelId> = (start..end)
                .flat_map(|t| cs.iter().filter(move |(_, s)| s.contains_sample(t)).map(|(p, _)| p))
                .collect();
            assert_eq!(pixels_affected(&cs, start, end), scanned);
        }
    }

    #[test]
    fn test_trailing_event_closed_at_recording_end() {
        let mut cs = CoincidenceSet::new(10);
        cs.insert(4, set(&[(8, 12)]));

        let closed = EventExtractor::new(TrailingPeak::Close).extract(3, &cs);
        assert_eq!(closed.len(), 1);
        assert_eq!((closed[0].start, closed[0].end), (8, 10));

        assert!(EventExtractor::new(TrailingPeak::Drop).extract(3, &cs).is_empty());
    }

    #[test]
    fn test_event_json_shape() {
        let event = Event {
            id: "1.5".to_string(),
            start: 5,
            end: 8,
            duration: 3,
            number_of_pixels: 2.0,
            pixels_affected: BTreeSet::from([3, 1]),
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["pixels_affected"], serde_json::json!([1, 3]));
        assert_eq!(json["number_of_pixels"], serde_json::json!(2.0));
    }
}
