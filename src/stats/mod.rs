//! Statistics kernel
//!
//! Pure numeric primitives shared by the detectors. Every function is total:
//! empty or degenerate input yields neutral values instead of an error, so a
//! threshold built from missing data simply flags nothing.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::BTreeMap;

/// Descriptive statistics for a set of values
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct Stats {
    pub count: usize,
    pub sum: f64,
    pub mean: f64,
    pub min: f64,
    pub max: f64,
    pub median: f64,
    /// Population standard deviation
    pub std: f64,
}

/// First and third quartile with their spread
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct Quartiles {
    pub q1: f64,
    pub q3: f64,
    pub iqr: f64,
}

/// Statistics for one trailing window of a rolling scan
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct RollingWindow {
    /// Index of the last value in the window
    pub index: usize,
    pub mean: f64,
    pub variance: f64,
    pub std: f64,
}

/// A hole in a time series larger than the expected interval allows
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Gap {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    pub expected_intervals: i64,
    pub actual_interval_seconds: f64,
    pub missing_intervals: i64,
}

/// Calculate basic statistics; empty input gives an all-zero result
pub fn stats(values: &[f64]) -> Stats {
    if values.is_empty() {
        return Stats::default();
    }

    let count = values.len();
    let sum: f64 = values.iter().sum();
    let mean = sum / count as f64;
    let min = values.iter().copied().fold(f64::INFINITY, f64::min);
    let max = values.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    let variance = values.iter().map(|x| (x - mean).powi(2)).sum::<f64>() / count as f64;

    Stats {
        count,
        sum,
        mean,
        min,
        max,
        median: percentile(values, 50.0),
        std: variance.sqrt(),
    }
}

/// Percentile (0-100) with linear interpolation between closest ranks
pub fn percentile(values: &[f64], p: f64) -> f64 {
    if values.is_empty() {
        return 0.0;
    }

    let mut sorted = values.to_vec();
    sorted.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
    percentile_sorted(&sorted, p)
}

fn percentile_sorted(sorted: &[f64], p: f64) -> f64 {
    let q = p.clamp(0.0, 100.0) / 100.0;
    let position = (sorted.len() - 1) as f64 * q;
    let lo = position.floor() as usize;
    let hi = position.ceil() as usize;

    if lo == hi {
        return sorted[lo];
    }

    let fraction = position - lo as f64;
    sorted[lo] + (sorted[hi] - sorted[lo]) * fraction
}

/// Interquartile range using interpolated quartiles
pub fn iqr(values: &[f64]) -> Quartiles {
    if values.is_empty() {
        return Quartiles::default();
    }

    let q1 = percentile(values, 25.0);
    let q3 = percentile(values, 75.0);

    Quartiles { q1, q3, iqr: q3 - q1 }
}

/// Standard score; zero when the distribution has no spread
pub fn z_score(value: f64, mean: f64, std: f64) -> f64 {
    if std == 0.0 {
        return 0.0;
    }
    (value - mean) / std
}

/// Percentile over strictly positive values only
///
/// Idle intervals reporting zero would otherwise drag a low percentile to 0.
pub fn non_zero_percentile(values: &[f64], p: f64) -> f64 {
    let non_zero: Vec<f64> = values.iter().copied().filter(|v| *v > 0.0).collect();
    percentile(&non_zero, p)
}

/// Mean and variance of every full trailing window of `window` values
///
/// Windows are produced lazily so a scan can stop at the first match.
pub fn rolling_variance(values: &[f64], window: usize) -> impl Iterator<Item = RollingWindow> + '_ {
    let first = if window == 0 { values.len() } else { window - 1 };

    (first..values.len()).map(move |index| {
        let slice = &values[index + 1 - window..=index];
        let summary = stats(slice);
        RollingWindow {
            index,
            mean: summary.mean,
            variance: summary.std * summary.std,
            std: summary.std,
        }
    })
}

/// Find gaps between consecutive timestamps wider than the expected interval
///
/// A 10% tolerance absorbs jitter in meter clocks. Interval counts round
/// half to even, so a gap of exactly 2.5 intervals counts as 2.
pub fn find_gaps(timestamps: &[DateTime<Utc>], expected_interval_seconds: u32) -> Vec<Gap> {
    if expected_interval_seconds == 0 {
        return Vec::new();
    }

    let expected = expected_interval_seconds as f64;

    timestamps
        .windows(2)
        .filter_map(|pair| {
            let actual = (pair[1] - pair[0]).num_milliseconds() as f64 / 1000.0;
            if actual <= expected * 1.1 {
                return None;
            }

            let expected_intervals = (actual / expected).round_ties_even() as i64;
            Some(Gap {
                start: pair[0],
                end: pair[1],
                expected_intervals,
                actual_interval_seconds: actual,
                missing_intervals: expected_intervals - 1,
            })
        })
        .collect()
}

/// Completeness percentage; zero when nothing was expected
pub fn completeness(actual: usize, expected: usize) -> f64 {
    if expected == 0 {
        return 0.0;
    }
    actual as f64 / expected as f64 * 100.0
}

/// Group items by key, preserving input order within each group
pub fn group_by<T, K, F>(items: &[T], mut key_fn: F) -> BTreeMap<K, Vec<&T>>
where
    K: Ord,
    F: FnMut(&T) -> K,
{
    let mut groups: BTreeMap<K, Vec<&T>> = BTreeMap::new();
    for item in items {
        groups.entry(key_fn(item)).or_default().push(item);
    }
    groups
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    fn approx(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-9
    }

    #[test]
    fn test_stats_basic() {
        let values: Vec<f64> = (1..=10).map(|v| v as f64).collect();
        let s = stats(&values);

        assert_eq!(s.count, 10);
        assert!(approx(s.sum, 55.0));
        assert!(approx(s.mean, 5.5));
        assert!(approx(s.median, 5.5));
        assert_eq!(s.min, 1.0);
        assert_eq!(s.max, 10.0);
        // Population std of 1..=10
        assert!(approx(s.std, 8.25_f64.sqrt()));
    }

    #[test]
    fn test_stats_empty_is_zero() {
        let s = stats(&[]);
        assert_eq!(s, Stats::default());
        assert_eq!(s.count, 0);
        assert_eq!(s.mean, 0.0);
        assert_eq!(s.std, 0.0);
    }

    #[test]
    fn test_percentile_interpolation() {
        let values: Vec<f64> = (1..=10).map(|v| v as f64).collect();
        assert!(approx(percentile(&values, 25.0), 3.25));
        assert!(approx(percentile(&values, 75.0), 7.75));
        assert_eq!(percentile(&[], 50.0), 0.0);
        assert_eq!(percentile(&[4.2], 95.0), 4.2);
    }

    #[test]
    fn test_percentile_bounds_are_min_and_max() {
        let samples: [&[f64]; 4] = [
            &[3.0, 1.0, 2.0],
            &[7.5],
            &[-2.0, 10.0, 10.0, 0.5, 8.0],
            &[0.1, 0.2, 0.30000000000000004, 99.9],
        ];
        for values in samples {
            let s = stats(values);
            assert_eq!(percentile(values, 0.0), s.min);
            assert_eq!(percentile(values, 100.0), s.max);
        }
    }

    #[test]
    fn test_iqr_spread_is_exact_difference() {
        for values in [vec![1.0, 2.0, 3.0, 4.0], vec![10.0, 10.0, 10.0, 10.0, 20.0], vec![0.3, 0.1, 0.7]] {
            let q = iqr(&values);
            assert_eq!(q.q3 - q.q1, q.iqr);
        }
        assert_eq!(iqr(&[]), Quartiles::default());
    }

    #[test]
    fn test_z_score() {
        assert_eq!(z_score(15.0, 10.0, 0.0), 0.0);
        assert!(approx(z_score(15.0, 10.0, 2.5), 2.0));
        assert!(approx(z_score(5.0, 10.0, 2.5), -2.0));
    }

    #[test]
    fn test_non_zero_percentile() {
        // Zeros are dropped: 5th percentile of [5, 6, 7]
        let p5 = non_zero_percentile(&[0.0, 0.0, 5.0, 6.0, 7.0], 5.0);
        assert!(approx(p5, 5.1));
        assert_eq!(non_zero_percentile(&[0.0, -1.0], 5.0), 0.0);
    }

    #[test]
    fn test_rolling_variance() {
        let values = [1.0, 1.0, 1.0, 5.0];
        let windows: Vec<RollingWindow> = rolling_variance(&values, 3).collect();

        assert_eq!(windows.len(), 2);
        assert_eq!(windows[0].index, 2);
        assert_eq!(windows[0].variance, 0.0);
        assert!(approx(windows[0].mean, 1.0));
        assert_eq!(windows[1].index, 3);
        assert!(windows[1].variance > 0.0);

        assert_eq!(rolling_variance(&values, 5).count(), 0);
        assert_eq!(rolling_variance(&values, 0).count(), 0);
        assert_eq!(rolling_variance(&values, 1).count(), 4);
    }

    #[test]
    fn test_find_gaps_three_hours() {
        let start = Utc.with_ymd_and_hms(2024, 1, 15, 0, 0, 0).unwrap();
        let timestamps = vec![
            start,
            start + Duration::minutes(15),
            start + Duration::minutes(15) + Duration::hours(3),
            start + Duration::minutes(30) + Duration::hours(3),
        ];

        let gaps = find_gaps(&timestamps, 900);
        assert_eq!(gaps.len(), 1);
        assert_eq!(gaps[0].expected_intervals, 12);
        assert_eq!(gaps[0].missing_intervals, 11);
        assert_eq!(gaps[0].actual_interval_seconds, 10800.0);
        assert_eq!(gaps[0].start, timestamps[1]);
        assert_eq!(gaps[0].end, timestamps[2]);
    }

    #[test]
    fn test_find_gaps_half_intervals_round_to_even() {
        let start = Utc.with_ymd_and_hms(2024, 1, 15, 0, 0, 0).unwrap();

        let gaps = find_gaps(&[start, start + Duration::seconds(2250)], 900);
        assert_eq!(gaps.len(), 1);
        assert_eq!(gaps[0].expected_intervals, 2);
        assert_eq!(gaps[0].missing_intervals, 1);

        let gaps = find_gaps(&[start, start + Duration::seconds(3150)], 900);
        assert_eq!(gaps[0].expected_intervals, 4);
        assert_eq!(gaps[0].missing_intervals, 3);
    }

    #[test]
    fn test_find_gaps_tolerates_jitter() {
        let start = Utc.with_ymd_and_hms(2024, 1, 15, 0, 0, 0).unwrap();
        let timestamps = vec![start, start + Duration::seconds(980)];
        assert!(find_gaps(&timestamps, 900).is_empty());
        assert!(find_gaps(&timestamps, 0).is_empty());
        assert!(find_gaps(&[], 900).is_empty());
    }

    #[test]
    fn test_completeness() {
        assert_eq!(completeness(50, 100), 50.0);
        assert_eq!(completeness(10, 0), 0.0);
    }

    #[test]
    fn test_group_by() {
        let items = [1, 2, 3, 4, 5, 6];
        let groups = group_by(&items, |v| v % 3);

        assert_eq!(groups.len(), 3);
        assert_eq!(groups[&0], vec![&3, &6]);
        assert_eq!(groups[&1], vec![&1, &4]);
    }
}
