//! After-hours waste
//!
//! Compares off-hours consumption in the report week against the low end of
//! off-hours load seen during the baseline weeks. Anything above that floor
//! is treated as avoidable.

use crate::calendar;
use crate::core::{find_baseline, ChannelSeries, Config, Reading, Result};
use crate::pricing::TariffEngine;
use crate::stats;
use chrono::{DateTime, Utc};
use chrono_tz::Tz;
use serde::Serialize;

/// Excess intervals kept per channel as detail
const MAX_EXCESS_INTERVALS: usize = 10;

/// Channels exposed as top contributors
const TOP_METERS: usize = 10;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AfterHoursBaseline {
    pub kw: f64,
    pub source: String,
}

/// Off-hours consumption in the report period
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AfterHoursWeek {
    pub total_after_hours_kwh: f64,
    pub excess_after_hours_kwh: f64,
    pub avg_power_kw: f64,
    pub max_power_kw: f64,
    pub min_power_kw: f64,
    pub intervals: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AfterHoursImpact {
    pub excess_kwh: f64,
    pub excess_cost: f64,
    /// Share of after-hours energy that was excess, in percent
    pub percent_of_total: f64,
}

/// One off-hours interval running above the floor
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExcessInterval {
    pub ts: DateTime<Utc>,
    pub power_kw: f64,
    pub baseline_power_kw: f64,
    pub excess_kw: f64,
    pub excess_kwh: f64,
}

/// After-hours analysis of a single channel
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AfterHoursResult {
    pub channel_id: String,
    pub channel_name: String,
    pub baseline: AfterHoursBaseline,
    pub this_week: AfterHoursWeek,
    pub impact: AfterHoursImpact,
    pub excess_intervals: Vec<ExcessInterval>,
    pub is_significant: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AfterHoursSummary {
    pub total_meters_with_excess: usize,
    pub total_excess_kwh: f64,
    pub total_excess_cost: f64,
    pub estimated_annual_cost: f64,
}

/// Site-wide after-hours result; only significant channels are listed
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AfterHoursReport {
    pub top_meters: Vec<AfterHoursResult>,
    /// Sorted by excess kWh, highest first
    pub all_meters: Vec<AfterHoursResult>,
    pub summary: AfterHoursSummary,
    pub warnings: Vec<String>,
}

/// Expected off-hours floor: low percentile of off-hours baseline load above the noise threshold
pub fn after_hours_baseline_kw(baseline: &[Reading], config: &Config, tz: Tz) -> f64 {
    let settings = &config.after_hours;
    let powers: Vec<f64> = baseline
        .iter()
        .filter(|r| !calendar::is_local_business_hours(&r.timestamp, tz, &config.business_hours))
        .filter_map(Reading::power)
        .filter(|p| *p > settings.min_power_threshold)
        .collect();

    stats::non_zero_percentile(&powers, settings.baseline_percentile)
}

/// Measure after-hours waste for one channel against its baseline readings
pub fn calculate_after_hours_waste(
    channel: &ChannelSeries,
    baseline: &[Reading],
    config: &Config,
    tz: Tz,
    interval_seconds: u32,
) -> AfterHoursResult {
    let settings = &config.after_hours;
    let tariff = TariffEngine::new(&config.tariff);
    let interval_hours = calendar::interval_hours(interval_seconds);
    let baseline_kw = after_hours_baseline_kw(baseline, config, tz);

    let after_hours: Vec<(&Reading, f64)> = channel
        .powered()
        .filter(|(r, _)| !calendar::is_local_business_hours(&r.timestamp, tz, &config.business_hours))
        .collect();

    let mut total_kwh = 0.0;
    let mut excess_total_kwh = 0.0;
    let mut excess_intervals = Vec::new();

    for (reading, power) in &after_hours {
        total_kwh += power * interval_hours;

        let excess_kw = (power - baseline_kw).max(0.0);
        let excess_kwh = excess_kw * interval_hours;
        excess_total_kwh += excess_kwh;

        if excess_kw > settings.min_power_threshold && excess_intervals.len() < MAX_EXCESS_INTERVALS {
            excess_intervals.push(ExcessInterval {
                ts: reading.timestamp,
                power_kw: *power,
                baseline_power_kw: baseline_kw,
                excess_kw,
                excess_kwh,
            });
        }
    }

    let powers: Vec<f64> = after_hours.iter().map(|(_, p)| *p).collect();
    let summary = stats::stats(&powers);
    let percent_of_total = if total_kwh > 0.0 {
        excess_total_kwh / total_kwh * 100.0
    } else {
        0.0
    };

    AfterHoursResult {
        channel_id: channel.channel_id.clone(),
        channel_name: channel.channel_name.clone(),
        baseline: AfterHoursBaseline {
            kw: baseline_kw,
            source: format!("{}th percentile of after-hours baseline", settings.baseline_percentile),
        },
        this_week: AfterHoursWeek {
            total_after_hours_kwh: total_kwh,
            excess_after_hours_kwh: excess_total_kwh,
            avg_power_kw: summary.mean,
            max_power_kw: summary.max,
            min_power_kw: summary.min,
            intervals: after_hours.len(),
        },
        impact: AfterHoursImpact {
            excess_kwh: excess_total_kwh,
            excess_cost: tariff.calculate_cost(excess_total_kwh),
            percent_of_total,
        },
        excess_intervals,
        is_significant: excess_total_kwh >= settings.min_excess_kwh,
    }
}

/// Measure after-hours waste across a site
///
/// Channels without baseline readings are skipped with a warning.
pub fn analyze_after_hours_waste(
    channels: &[ChannelSeries],
    baselines: &[ChannelSeries],
    config: &Config,
    interval_seconds: u32,
) -> Result<AfterHoursReport> {
    let tz = config.tz()?;
    let tariff = TariffEngine::new(&config.tariff);
    let mut warnings = Vec::new();
    let mut results = Vec::new();

    for channel in channels {
        let Some(baseline) = find_baseline(baselines, &channel.channel_id) else {
            let warning = format!(
                "No baseline data for channel {}, skipping after-hours analysis",
                channel.channel_id
            );
            log::warn!("{}", warning);
            warnings.push(warning);
            continue;
        };

        let result = calculate_after_hours_waste(channel, &baseline.readings, config, tz, interval_seconds);
        if result.is_significant {
            results.push(result);
        }
    }

    results.sort_by(|a, b| b.impact.excess_kwh.total_cmp(&a.impact.excess_kwh));

    let total_excess_kwh: f64 = results.iter().map(|r| r.impact.excess_kwh).sum();
    let total_excess_cost: f64 = results.iter().map(|r| r.impact.excess_cost).sum();

    log::info!(
        "After-hours waste: {} meter(s) with {:.1} kWh excess",
        results.len(),
        total_excess_kwh
    );

    Ok(AfterHoursReport {
        top_meters: results.iter().take(TOP_METERS).cloned().collect(),
        summary: AfterHoursSummary {
            total_meters_with_excess: results.len(),
            total_excess_kwh,
            total_excess_cost,
            estimated_annual_cost: tariff.annualize(total_excess_cost),
        },
        all_meters: results,
        warnings,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analytics::fixtures::{local, reading, series};
    use chrono_tz::America::New_York;

    const INTERVAL: u32 = 900;

    /// Baseline of Saturday readings with the given after-hours powers
    fn weekend_baseline(powers: &[f64]) -> Vec<Reading> {
        powers
            .iter()
            .enumerate()
            .map(|(i, p)| reading(local(2024, 1, 13, 1, 0) + chrono::Duration::minutes(15 * i as i64), Some(*p)))
            .collect()
    }

    #[test]
    fn test_baseline_floor_scenario() {
        let baseline = weekend_baseline(&[0.0, 0.0, 5.0, 6.0, 7.0]);
        let kw = after_hours_baseline_kw(&baseline, &Config::default(), New_York);
        assert!((kw - 5.1).abs() < 1e-9);
    }

    #[test]
    fn test_business_hours_readings_do_not_set_the_floor() {
        // Monday 10:00 is business hours; only the 03:00 reading counts
        let baseline = vec![
            reading(local(2024, 1, 8, 10, 0), Some(1.0)),
            reading(local(2024, 1, 8, 3, 0), Some(8.0)),
        ];
        let kw = after_hours_baseline_kw(&baseline, &Config::default(), New_York);
        assert_eq!(kw, 8.0);
    }

    #[test]
    fn test_single_interval_excess_scenario() {
        let baseline = weekend_baseline(&[0.0, 0.0, 5.0, 6.0, 7.0]);
        // Tuesday 02:00 local
        let channel = series("rtu-2", local(2024, 1, 16, 2, 0), INTERVAL, &[Some(20.0)]);
        let config = Config::default();

        let result = calculate_after_hours_waste(&channel, &baseline, &config, New_York, INTERVAL);

        assert!((result.impact.excess_kwh - 3.725).abs() < 1e-9);
        assert!((result.this_week.total_after_hours_kwh - 5.0).abs() < 1e-9);
        assert!((result.impact.excess_cost - 3.725 * 0.12).abs() < 1e-9);
        assert!((result.impact.percent_of_total - 74.5).abs() < 1e-9);
        assert_eq!(result.this_week.intervals, 1);
        assert_eq!(result.excess_intervals.len(), 1);
        assert!((result.excess_intervals[0].excess_kw - 14.9).abs() < 1e-9);
        assert!(!result.is_significant);
        assert_eq!(result.baseline.source, "5th percentile of after-hours baseline");
    }

    #[test]
    fn test_business_hours_load_is_ignored() {
        let baseline = weekend_baseline(&[2.0, 2.0, 2.0]);
        // Monday 09:00 to 11:00 local, well inside business hours
        let channel = series("rtu-2", local(2024, 1, 15, 9, 0), INTERVAL, &[Some(50.0); 8]);

        let result = calculate_after_hours_waste(&channel, &baseline, &Config::default(), New_York, INTERVAL);
        assert_eq!(result.this_week.intervals, 0);
        assert_eq!(result.impact.excess_kwh, 0.0);
        assert_eq!(result.impact.percent_of_total, 0.0);
    }

    #[test]
    fn test_excess_intervals_are_capped() {
        let baseline = weekend_baseline(&[1.0, 1.0, 1.0]);
        // 40 Saturday intervals at 10 kW
        let channel = series("rtu-2", local(2024, 1, 20, 0, 0), INTERVAL, &[Some(10.0); 40]);

        let result = calculate_after_hours_waste(&channel, &baseline, &Config::default(), New_York, INTERVAL);
        assert_eq!(result.excess_intervals.len(), MAX_EXCESS_INTERVALS);
        assert!((result.impact.excess_kwh - 90.0).abs() < 1e-9);
        assert!(result.is_significant);
    }

    #[test]
    fn test_site_report_excludes_channels_at_or_below_floor() {
        let config = Config::default();
        let start = local(2024, 1, 20, 0, 0);

        let report_data = vec![
            series("quiet", start, INTERVAL, &[Some(3.0); 40]),
            series("small", start, INTERVAL, &[Some(6.0); 40]),
            series("large", start, INTERVAL, &[Some(12.0); 40]),
            series("orphan", start, INTERVAL, &[Some(99.0); 40]),
        ];
        let baseline_data = vec![
            ChannelSeries::new("quiet", "quiet", weekend_baseline(&[3.0, 3.0, 3.0])),
            ChannelSeries::new("small", "small", weekend_baseline(&[4.0, 4.0, 4.0])),
            ChannelSeries::new("large", "large", weekend_baseline(&[2.0, 2.0, 2.0])),
        ];

        let report = analyze_after_hours_waste(&report_data, &baseline_data, &config, INTERVAL).unwrap();

        // small: 2 kW x 10 h = 20 kWh, large: 10 kW x 10 h = 100 kWh
        assert_eq!(report.summary.total_meters_with_excess, 2);
        assert_eq!(report.all_meters[0].channel_id, "large");
        assert_eq!(report.all_meters[1].channel_id, "small");
        assert!(report.top_meters.iter().all(|m| m.channel_id != "quiet"));
        assert!((report.summary.total_excess_kwh - 120.0).abs() < 1e-9);
        assert!((report.summary.total_excess_cost - 14.4).abs() < 1e-9);
        assert!((report.summary.estimated_annual_cost - 14.4 * 52.0).abs() < 1e-6);

        assert_eq!(report.warnings.len(), 1);
        assert!(report.warnings[0].contains("orphan"));
    }

    #[test]
    fn test_at_or_below_floor_is_zero_excess() {
        let baseline = weekend_baseline(&[5.0, 5.0, 5.0, 5.0]);
        let channel = series("flat", local(2024, 1, 20, 0, 0), INTERVAL, &[Some(5.0), Some(4.0), Some(2.5)]);

        let result = calculate_after_hours_waste(&channel, &baseline, &Config::default(), New_York, INTERVAL);
        assert_eq!(result.impact.excess_kwh, 0.0);
        assert!(result.excess_intervals.is_empty());
    }

    #[test]
    fn test_invalid_timezone_fails_fast() {
        let config = Config { timezone: "Mars/Olympus_Mons".to_string(), ..Config::default() };
        assert!(analyze_after_hours_waste(&[], &[], &config, INTERVAL).is_err());
    }
}
