//! Spike detection
//!
//! Flags short bursts of demand well above the high end of normal load for
//! the hour of week. An absolute kW floor keeps small meters from reporting
//! trivial spikes; the site total channel gets a higher floor.

use super::baseline::{build_spike_profile, SpikeProfile};
use super::events::{group_consecutive, FlaggedInterval, GapTolerance};
use crate::calendar;
use crate::core::{find_baseline, ChannelSeries, Config, Reading, Result};
use chrono::{DateTime, Duration, Utc};
use chrono_tz::Tz;
use serde::Serialize;

/// Spikes listed in the site-wide top list
pub const DEFAULT_TOP_SPIKES: usize = 10;

/// A report reading over the spike threshold
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SpikeReading {
    pub ts: DateTime<Utc>,
    pub power: f64,
    /// Baseline load at the configured percentile for this hour of week
    pub baseline_kw: f64,
    pub threshold: f64,
    pub excess_kw: f64,
    pub excess_kwh: f64,
}

impl FlaggedInterval for SpikeReading {
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
pub struct SpikeEvent {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    pub peak_power: f64,
    pub total_excess_kwh: f64,
    pub intervals: usize,
    pub duration: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChannelSpikes {
    pub channel_id: String,
    pub channel_name: String,
    pub spike_count: usize,
    /// Highest peak across the channel's events, 0 when there are none
    pub peak_power: f64,
    pub events: Vec<SpikeEvent>,
}

/// An event in the site-wide top list
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TopSpike {
    pub channel_id: String,
    pub channel_name: String,
    #[serde(flatten)]
    pub event: SpikeEvent,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SpikeReport {
    pub channels_with_spikes: usize,
    pub total_spike_events: usize,
    pub total_excess_kwh: f64,
    /// Sorted by peak power, highest first
    pub results: Vec<ChannelSpikes>,
    pub top_spikes: Vec<TopSpike>,
    pub warnings: Vec<String>,
}

/// Flag readings above `max(reference * multiplier, floor)` and above the floor itself
pub fn flag_spikes(
    readings: &[Reading],
    profile: &SpikeProfile,
    config: &Config,
    tz: Tz,
    interval_seconds: u32,
    floor_kw: f64,
) -> Vec<SpikeReading> {
    let interval_hours = calendar::interval_hours(interval_seconds);
    let multiplier = config.spike.multiplier;

    readings
        .iter()
        .filter_map(|reading| {
            let power = reading.power()?;
            let reference = profile.get(&calendar::local_hour_of_week(&reading.timestamp, tz))?;

            let threshold = (reference.high_percentile_kw * multiplier).max(floor_kw);
            if power <= threshold || power <= floor_kw {
                return None;
            }

            let excess_kw = power - reference.high_percentile_kw;
            Some(SpikeReading {
                ts: reading.timestamp,
                power,
                baseline_kw: reference.high_percentile_kw,
                threshold,
                excess_kw,
                excess_kwh: excess_kw * interval_hours,
            })
        })
        .collect()
}

/// Fold spikes no more than two intervals apart into events
pub fn group_spike_events(spikes: &[SpikeReading], interval_seconds: u32) -> Vec<SpikeEvent> {
    let tolerance = GapTolerance::AtMost(Duration::seconds(2 * interval_seconds as i64));

    group_consecutive(spikes, tolerance)
        .into_iter()
        .map(|run| SpikeEvent {
            start: run.start(),
            end: run.end(),
            peak_power: run.peak_power(),
            total_excess_kwh: run.total_excess_kwh(),
            intervals: run.intervals(),
            duration: format!("{} intervals", run.intervals()),
        })
        .collect()
}

/// Detect spike events for one channel against its baseline readings
pub fn detect_spikes(
    channel: &ChannelSeries,
    baseline: &[Reading],
    config: &Config,
    tz: Tz,
    interval_seconds: u32,
    is_site_total: bool,
) -> ChannelSpikes {
    let settings = &config.spike;
    let floor_kw = if is_site_total {
        settings.site_min_kw
    } else {
        settings.submeter_min_kw
    };

    let profile = build_spike_profile(baseline, tz, settings.baseline_percentile);
    let spikes = flag_spikes(&channel.readings, &profile, config, tz, interval_seconds, floor_kw);
    let events: Vec<SpikeEvent> = group_spike_events(&spikes, interval_seconds)
        .into_iter()
        .filter(|event| event.intervals >= settings.min_duration)
        .collect();

    log::debug!(
        "{}: {} spike reading(s), {} event(s) kept (floor {} kW)",
        channel.channel_id,
        spikes.len(),
        events.len(),
        floor_kw
    );

    ChannelSpikes {
        channel_id: channel.channel_id.clone(),
        channel_name: channel.channel_name.clone(),
        spike_count: events.len(),
        peak_power: events.iter().map(|e| e.peak_power).fold(0.0, f64::max),
        events,
    }
}

/// Detect spikes across a site
///
/// `site_channel_id` marks the whole-building meter, which is held to the
/// site floor instead of the submeter floor.
pub fn analyze_spikes(
    channels: &[ChannelSeries],
    baselines: &[ChannelSeries],
    config: &Config,
    interval_seconds: u32,
    site_channel_id: Option<&str>,
) -> Result<SpikeReport> {
    let tz = config.tz()?;
    let mut warnings = Vec::new();
    let mut results = Vec::new();

    for channel in channels {
        let Some(baseline) = find_baseline(baselines, &channel.channel_id) else {
            let warning = format!(
                "No baseline data for channel {}, skipping spike detection",
                channel.channel_id
            );
            log::warn!("{}", warning);
            warnings.push(warning);
            continue;
        };

        let is_site_total = site_channel_id == Some(channel.channel_id.as_str());
        let result = detect_spikes(channel, &baseline.readings, config, tz, interval_seconds, is_site_total);
        if result.spike_count > 0 {
            results.push(result);
        }
    }

    results.sort_by(|a, b| b.peak_power.total_cmp(&a.peak_power));

    let total_spike_events: usize = results.iter().map(|r| r.spike_count).sum();
    let total_excess_kwh: f64 = results
        .iter()
        .flat_map(|r| r.events.iter())
        .map(|e| e.total_excess_kwh)
        .sum();

    log::info!(
        "Spikes: {} event(s) across {} channel(s)",
        total_spike_events,
        results.len()
    );

    Ok(SpikeReport {
        channels_with_spikes: results.len(),
        total_spike_events,
        total_excess_kwh,
        top_spikes: top_spikes(&results, DEFAULT_TOP_SPIKES),
        results,
        warnings,
    })
}

/// The `count` highest-peak events across all channels
pub fn top_spikes(results: &[ChannelSpikes], count: usize) -> Vec<TopSpike> {
    let mut all: Vec<TopSpike> = results
        .iter()
        .flat_map(|channel| {
            channel.events.iter().map(move |event| TopSpike {
                channel_id: channel.channel_id.clone(),
                channel_name: channel.channel_name.clone(),
                event: event.clone(),
            })
        })
        .collect();

    all.sort_by(|a, b| b.event.peak_power.total_cmp(&a.event.peak_power));
    all.truncate(count);
    all
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analytics::fixtures::{local, reading, series};
    use chrono_tz::America::New_York;

    const INTERVAL: u32 = 900;

    /// Four weeks of constant load
    fn flat_baseline(kw: f64) -> Vec<Reading> {
        let start = local(2024, 1, 1, 0, 0);
        (0..(4 * 7 * 96))
            .map(|slot| reading(start + Duration::minutes(15 * slot), Some(kw)))
            .collect()
    }

    fn spike(ts: DateTime<Utc>, power: f64) -> SpikeReading {
        SpikeReading {
            ts,
            power,
            baseline_kw: 10.0,
            threshold: 15.0,
            excess_kw: power - 10.0,
            excess_kwh: (power - 10.0) * 0.25,
        }
    }

    #[test]
    fn test_threshold_uses_multiplier_and_floor() {
        let config = Config::default();
        let profile = build_spike_profile(&flat_baseline(10.0), New_York, 95.0);
        let at = local(2024, 1, 30, 14, 0);
        let readings = vec![
            reading(at, Some(14.0)),
            reading(at + Duration::minutes(15), Some(16.0)),
        ];

        let submeter = flag_spikes(&readings, &profile, &config, New_York, INTERVAL, config.spike.submeter_min_kw);
        assert_eq!(submeter.len(), 1);
        assert_eq!(submeter[0].power, 16.0);
        assert_eq!(submeter[0].threshold, 15.0);
        assert_eq!(submeter[0].excess_kw, 6.0);
        assert_eq!(submeter[0].excess_kwh, 1.5);

        // Site total floor of 20 kW dominates 10 x 1.5
        let site = flag_spikes(&readings, &profile, &config, New_York, INTERVAL, config.spike.site_min_kw);
        assert!(site.is_empty());
    }

    #[test]
    fn test_floor_applies_to_quiet_meters() {
        let config = Config::default();
        let profile = build_spike_profile(&flat_baseline(2.0), New_York, 95.0);
        let at = local(2024, 1, 30, 14, 0);
        let readings = vec![
            reading(at, Some(4.9)),
            reading(at + Duration::minutes(15), Some(5.0)),
            reading(at + Duration::minutes(30), Some(6.0)),
        ];

        let flagged = flag_spikes(&readings, &profile, &config, New_York, INTERVAL, 5.0);
        assert_eq!(flagged.len(), 1);
        assert_eq!(flagged[0].threshold, 5.0);
    }

    #[test]
    fn test_grouping_tolerance_is_two_intervals() {
        let t0 = local(2024, 1, 30, 14, 0);
        let spikes = vec![
            spike(t0, 30.0),
            spike(t0 + Duration::minutes(10), 45.0),
            spike(t0 + Duration::minutes(50), 25.0),
        ];

        let events = group_spike_events(&spikes, INTERVAL);
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].intervals, 2);
        assert_eq!(events[0].peak_power, 45.0);
        assert!((events[0].total_excess_kwh - (20.0 + 35.0) * 0.25).abs() < 1e-9);
        assert_eq!(events[1].intervals, 1);
        assert_eq!(events[1].duration, "1 intervals");

        // Exactly 2 x 900 s still joins
        let spikes = vec![spike(t0, 30.0), spike(t0 + Duration::seconds(1800), 30.0)];
        assert_eq!(group_spike_events(&spikes, INTERVAL).len(), 1);
    }

    #[test]
    fn test_min_duration_filters_events() {
        let mut config = Config::default();
        config.spike.min_duration = 2;

        let mut powers = vec![Some(10.0); 96];
        powers[40] = Some(40.0);
        powers[60] = Some(40.0);
        powers[61] = Some(42.0);
        let channel = series("rtu", local(2024, 1, 29, 0, 0), INTERVAL, &powers);

        let result = detect_spikes(&channel, &flat_baseline(10.0), &config, New_York, INTERVAL, false);
        assert_eq!(result.spike_count, 1);
        assert_eq!(result.events[0].intervals, 2);
        assert_eq!(result.peak_power, 42.0);
    }

    #[test]
    fn test_site_report_ordering() {
        let config = Config::default();
        let report_start = local(2024, 1, 29, 0, 0);

        let mut pump = vec![Some(10.0); 96];
        pump[10] = Some(30.0);
        pump[50] = Some(35.0);
        let mut chiller = vec![Some(10.0); 96];
        chiller[20] = Some(80.0);
        let mut site = vec![Some(10.0); 96];
        site[30] = Some(19.0);

        let channels = vec![
            series("pump", report_start, INTERVAL, &pump),
            series("chiller", report_start, INTERVAL, &chiller),
            series("main", report_start, INTERVAL, &site),
        ];
        let baselines: Vec<ChannelSeries> = ["pump", "chiller", "main"]
            .iter()
            .map(|id| ChannelSeries::new(id, id, flat_baseline(10.0)))
            .collect();

        let report = analyze_spikes(&channels, &baselines, &config, INTERVAL, Some("main")).unwrap();

        // 19 kW on the site meter stays under the 20 kW site floor
        assert_eq!(report.channels_with_spikes, 2);
        assert_eq!(report.total_spike_events, 3);
        assert_eq!(report.results[0].channel_id, "chiller");
        assert!((report.total_excess_kwh - (20.0 + 25.0 + 70.0) * 0.25).abs() < 1e-9);

        let peaks: Vec<f64> = report.top_spikes.iter().map(|s| s.event.peak_power).collect();
        assert_eq!(peaks, vec![80.0, 35.0, 30.0]);
        assert!(report.warnings.is_empty());

        assert_eq!(top_spikes(&report.results, 1).len(), 1);
    }
}
