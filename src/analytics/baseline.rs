//! Baseline profiles keyed by hour of week
//!
//! A profile summarizes what "normal" load looked like in each of the 168
//! hours of the week during the baseline period. The anomaly and spike
//! detectors each build their own profile with their own parameters; profiles
//! are never shared between detectors or cached between runs.

use crate::calendar;
use crate::core::Reading;
use crate::stats::{self, Quartiles, Stats};
use chrono_tz::Tz;
use serde::Serialize;
use std::collections::BTreeMap;

/// Statistical summary of one hour-of-week bucket for anomaly detection
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HourProfile {
    #[serde(flatten)]
    pub stats: Stats,
    #[serde(flatten)]
    pub quartiles: Quartiles,
    /// `q3 + iqr_multiplier * iqr`
    pub upper_threshold: f64,
}

/// Reference load of one hour-of-week bucket for spike detection
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SpikeReference {
    /// Load at the configured high percentile
    pub high_percentile_kw: f64,
    pub median_kw: f64,
    pub count: usize,
}

/// Hour-of-week key to anomaly summary. Hours without samples are absent.
pub type AnomalyProfile = BTreeMap<u32, HourProfile>;

/// Hour-of-week key to spike reference. Hours without samples are absent.
pub type SpikeProfile = BTreeMap<u32, SpikeReference>;

/// Usable power values grouped by local hour of week; empty buckets are dropped
pub fn hourly_power(readings: &[Reading], tz: Tz) -> BTreeMap<u32, Vec<f64>> {
    stats::group_by(readings, |r| calendar::local_hour_of_week(&r.timestamp, tz))
        .into_iter()
        .filter_map(|(hour, bucket)| {
            let powers: Vec<f64> = bucket.iter().filter_map(|r| r.power()).collect();
            if powers.is_empty() {
                None
            } else {
                Some((hour, powers))
            }
        })
        .collect()
}

/// Build the IQR profile used by anomaly detection
pub fn build_anomaly_profile(readings: &[Reading], tz: Tz, iqr_multiplier: f64) -> AnomalyProfile {
    hourly_power(readings, tz)
        .into_iter()
        .map(|(hour, powers)| {
            let quartiles = stats::iqr(&powers);
            let profile = HourProfile {
                stats: stats::stats(&powers),
                quartiles,
                upper_threshold: quartiles.q3 + iqr_multiplier * quartiles.iqr,
            };
            (hour, profile)
        })
        .collect()
}

/// Build the high-percentile profile used by spike detection
pub fn build_spike_profile(readings: &[Reading], tz: Tz, baseline_percentile: f64) -> SpikeProfile {
    hourly_power(readings, tz)
        .into_iter()
        .map(|(hour, powers)| {
            let reference = SpikeReference {
                high_percentile_kw: stats::percentile(&powers, baseline_percentile),
                median_kw: stats::percentile(&powers, 50.0),
                count: powers.len(),
            };
            (hour, reference)
        })
        .collect()
}
