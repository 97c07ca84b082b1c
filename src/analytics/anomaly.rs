//! Anomaly detection
//!
//! Each report reading is compared with the IQR fence of its hour of week in
//! the baseline. Readings over the fence are folded into events; short or
//! low-energy events are dropped.

use super::baseline::{build_anomaly_profile, AnomalyProfile};
use super::events::{self, FlaggedInterval, GapTolerance};
use crate::calendar;
use crate::core::{find_baseline, ChannelSeries, Config, HoursContext, Reading, Result};
use crate::stats;
use chrono::{DateTime, Duration, Utc};
use chrono_tz::Tz;
use serde::Serialize;

/// Flagged readings less than this far apart belong to the same event
const EVENT_GAP_HOURS: i64 = 2;

/// Interval length assumed when averaging excess power over an event.
/// Fixed at 15 minutes regardless of the data resolution.
const EVENT_AVERAGING_INTERVAL_HOURS: f64 = 0.25;

/// A report reading above its hour's fence
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AnomalousReading {
    pub ts: DateTime<Utc>,
    pub power: f64,
    pub baseline_median: f64,
    pub threshold: f64,
    pub excess_kw: f64,
    pub excess_kwh: f64,
    pub z_score: f64,
    pub is_business_hours: bool,
}

impl FlaggedInterval for AnomalousReading {
    fn timestamp(&self) -> DateTime<Utc> {
        self.ts
    }

    fn power(&self) -> f64 {
        self.power
    }

    fn excess_kwh(&self) -> f64 {
        self.excess_kwh
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AnomalyEvent {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    pub peak_power: f64,
    pub total_excess_kwh: f64,
    pub avg_excess_kw: f64,
    pub intervals: usize,
    pub duration: String,
    /// Taken from the first reading of the event
    pub context: HoursContext,
    pub max_z_score: f64,
    pub above_z_score_threshold: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChannelAnomalies {
    pub channel_id: String,
    pub channel_name: String,
    pub anomaly_count: usize,
    pub total_excess_kwh: f64,
    pub events: Vec<AnomalyEvent>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TimelineEntry {
    pub channel_id: String,
    pub channel_name: String,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    pub peak_power: f64,
    pub excess_kwh: f64,
    pub context: HoursContext,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AnomalyReport {
    pub channels_with_anomalies: usize,
    pub total_anomaly_events: usize,
    pub total_excess_kwh: f64,
    /// Sorted by total excess kWh, highest first
    pub results: Vec<ChannelAnomalies>,
    /// Every kept event across the site in start order
    pub timeline: Vec<TimelineEntry>,
    pub warnings: Vec<String>,
}

/// Flag report readings that exceed the fence of their hour of week
///
/// Readings whose hour has no baseline, or that carry no power value, are skipped.
pub fn flag_anomalies(
    readings: &[Reading],
    profile: &AnomalyProfile,
    config: &Config,
    tz: Tz,
    interval_seconds: u32,
) -> Vec<AnomalousReading> {
    let interval_hours = calendar::interval_hours(interval_seconds);

    readings
        .iter()
        .filter_map(|reading| {
            let power = reading.power()?;
            let hour = profile.get(&calendar::local_hour_of_week(&reading.timestamp, tz))?;
            if power <= hour.upper_threshold {
                return None;
            }

            let excess_kw = power - hour.stats.median;
            Some(AnomalousReading {
                ts: reading.timestamp,
                power,
                baseline_median: hour.stats.median,
                threshold: hour.upper_threshold,
                excess_kw,
                excess_kwh: excess_kw * interval_hours,
                z_score: stats::z_score(power, hour.stats.mean, hour.stats.std),
                is_business_hours: calendar::is_local_business_hours(&reading.timestamp, tz, &config.business_hours),
            })
        })
        .collect()
}

/// Fold flagged readings into events and keep the material ones
pub fn group_anomaly_events(flagged: &[AnomalousReading], config: &Config) -> Vec<AnomalyEvent> {
    let settings = &config.anomaly;

    events::group_consecutive(flagged, GapTolerance::Below(Duration::hours(EVENT_GAP_HOURS)))
        .into_iter()
        .filter(|run| run.intervals() >= settings.min_consecutive_intervals)
        .map(|run| {
            let total_excess_kwh = run.total_excess_kwh();
            let max_z_score = run
                .readings
                .iter()
                .map(|r| r.z_score)
                .fold(f64::NEG_INFINITY, f64::max);

            AnomalyEvent {
                start: run.start(),
                end: run.end(),
                peak_power: run.peak_power(),
                total_excess_kwh,
                avg_excess_kw: total_excess_kwh / (run.intervals() as f64 * EVENT_AVERAGING_INTERVAL_HOURS),
                intervals: run.intervals(),
                duration: format!("{} intervals", run.intervals()),
                context: HoursContext::from_business_hours(run.first().is_business_hours),
                max_z_score,
                above_z_score_threshold: max_z_score >= settings.z_score_threshold,
            }
        })
        .filter(|event| event.total_excess_kwh >= settings.min_excess_kwh)
        .collect()
}

/// Detect anomaly events for one channel against its baseline readings
pub fn detect_anomalies(
    channel: &ChannelSeries,
    baseline: &[Reading],
    config: &Config,
    tz: Tz,
    interval_seconds: u32,
) -> ChannelAnomalies {
    let profile = build_anomaly_profile(baseline, tz, config.anomaly.iqr_multiplier);
    let flagged = flag_anomalies(&channel.readings, &profile, config, tz, interval_seconds);
    let events = group_anomaly_events(&flagged, config);

    log::debug!(
        "{}: {} reading(s) over threshold, {} event(s) kept",
        channel.channel_id,
        flagged.len(),
        events.len()
    );

    ChannelAnomalies {
        channel_id: channel.channel_id.clone(),
        channel_name: channel.channel_name.clone(),
        anomaly_count: events.len(),
        total_excess_kwh: events.iter().map(|e| e.total_excess_kwh).sum(),
        events,
    }
}

/// Detect anomalies across a site
///
/// Channels without baseline readings are skipped with a warning.
pub fn analyze_anomalies(
    channels: &[ChannelSeries],
    baselines: &[ChannelSeries],
    config: &Config,
    interval_seconds: u32,
) -> Result<AnomalyReport> {
    let tz = config.tz()?;
    let mut warnings = Vec::new();
    let mut results = Vec::new();

    for channel in channels {
        let Some(baseline) = find_baseline(baselines, &channel.channel_id) else {
            let warning = format!(
                "No baseline data for channel {}, skipping anomaly detection",
                channel.channel_id
            );
            log::warn!("{}", warning);
            warnings.push(warning);
            continue;
        };

        let result = detect_anomalies(channel, &baseline.readings, config, tz, interval_seconds);
        if result.anomaly_count > 0 {
            results.push(result);
        }
    }

    results.sort_by(|a, b| b.total_excess_kwh.total_cmp(&a.total_excess_kwh));

    let total_anomaly_events: usize = results.iter().map(|r| r.anomaly_count).sum();
    let total_excess_kwh: f64 = results.iter().map(|r| r.total_excess_kwh).sum();

    log::info!(
        "Anomalies: {} event(s) across {} channel(s)",
        total_anomaly_events,
        results.len()
    );

    Ok(AnomalyReport {
        channels_with_anomalies: results.len(),
        total_anomaly_events,
        total_excess_kwh,
        timeline: build_timeline(&results),
        results,
        warnings,
    })
}

fn build_timeline(results: &[ChannelAnomalies]) -> Vec<TimelineEntry> {
    let mut timeline: Vec<TimelineEntry> = results
        .iter()
        .flat_map(|channel| {
            channel.events.iter().map(move |event| TimelineEntry {
                channel_id: channel.channel_id.clone(),
                channel_name: channel.channel_name.clone(),
                start: event.start,
                end: event.end,
                peak_power: event.peak_power,
                excess_kwh: event.total_excess_kwh,
                context: event.context,
            })
        })
        .collect();

    timeline.sort_by_key(|entry| entry.start);
    timeline
}
