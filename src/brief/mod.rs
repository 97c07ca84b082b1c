//! Weekly brief assembly
//!
//! Runs every detector over one site, synthesizes the quick wins and wraps
//! the results with headline findings, savings totals and data-quality
//! figures.

use crate::analytics::{
    analyze_after_hours_waste, analyze_anomalies, analyze_site_sensor_health, analyze_spikes, generate_quick_wins,
    AfterHoursReport, AnomalyReport, Findings, QuickWin, SensorHealthReport, SpikeReport,
};
use crate::calendar::{self, Period};
use crate::core::{find_baseline, ChannelSeries, Config, Error, Result};
use crate::pricing::TariffEngine;
use crate::stats;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Anomaly events needed before they make the headline
const HEADLINE_ANOMALY_EVENTS: usize = 5;

/// Weekly kWh above which anomalies or after-hours waste count as a risk
const RISK_EXCESS_KWH: f64 = 100.0;

/// Weekly after-hours kWh above which optimization is listed as an opportunity
const OPPORTUNITY_EXCESS_KWH: f64 = 50.0;

fn default_interval_seconds() -> u32 { 900 }

/// Report window as supplied by the caller
#[derive(Debug, Clone, Deserialize)]
pub struct PeriodInput {
    #[serde(deserialize_with = "calendar::deserialize_timestamp")]
    pub start: DateTime<Utc>,
    #[serde(deserialize_with = "calendar::deserialize_timestamp")]
    pub end: DateTime<Utc>,
}

/// Site input document: report and baseline readings per channel
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SiteDocument {
    pub report_data: Vec<ChannelSeries>,
    #[serde(default)]
    pub baseline_data: Vec<ChannelSeries>,
    #[serde(default = "default_interval_seconds")]
    pub interval_seconds: u32,
    #[serde(default)]
    pub site_channel_id: Option<String>,
    #[serde(default)]
    pub period: Option<PeriodInput>,
}

impl SiteDocument {
    /// Resolve the report period (the last complete week when absent) into a request
    pub fn into_request(self, config: &Config, now: DateTime<Utc>) -> Result<BriefRequest> {
        let tz = config.tz()?;
        let period = match self.period {
            Some(input) => {
                if input.end < input.start {
                    return Err(Error::Config(format!(
                        "Report period ends ({}) before it starts ({})",
                        input.end, input.start
                    )));
                }
                Period {
                    start: input.start.with_timezone(&tz),
                    end: input.end.with_timezone(&tz),
                }
            }
            None => calendar::last_complete_week(tz, now)?,
        };

        Ok(BriefRequest {
            report_data: self.report_data,
            baseline_data: self.baseline_data,
            interval_seconds: self.interval_seconds,
            site_channel_id: self.site_channel_id,
            period,
            now,
        })
    }
}

/// Everything needed to produce one brief
#[derive(Debug, Clone)]
pub struct BriefRequest {
    pub report_data: Vec<ChannelSeries>,
    pub baseline_data: Vec<ChannelSeries>,
    pub interval_seconds: u32,
    /// Channel carrying the whole-building total, if any
    pub site_channel_id: Option<String>,
    pub period: Period,
    /// Reference instant for staleness checks
    pub now: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PeriodInfo {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    pub timezone: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BaselineInfo {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    pub weeks_count: u32,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BriefMetadata {
    pub generated_at: DateTime<Utc>,
    pub report_version: &'static str,
    pub period: PeriodInfo,
    pub baseline: BaselineInfo,
    pub data_resolution: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PotentialSavings {
    pub weekly_kwh: f64,
    pub weekly_cost: f64,
    pub estimated_annual: f64,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BriefSummary {
    pub headline: Vec<String>,
    pub top_risks: Vec<String>,
    pub top_opportunities: Vec<String>,
    pub total_potential_savings: PotentialSavings,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BriefSections {
    pub sensor_health: SensorHealthReport,
    pub after_hours_waste: AfterHoursReport,
    pub anomalies: AnomalyReport,
    pub spikes: SpikeReport,
    pub quick_wins: Vec<QuickWin>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DataQuality {
    pub channels_analyzed: usize,
    /// Mean report-period completeness across channels, in percent
    pub avg_completeness: f64,
    /// Channels whose baseline is too sparse to trust fully
    pub baseline_coverage: Vec<String>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WeeklyBrief {
    pub metadata: BriefMetadata,
    pub summary: BriefSummary,
    pub sections: BriefSections,
    pub data_quality: DataQuality,
}

/// Produce the weekly brief for one site
pub fn generate_weekly_brief(request: &BriefRequest, config: &Config) -> Result<WeeklyBrief> {
    let tariff = TariffEngine::new(&config.tariff);
    let baseline = calendar::baseline_period(&request.period.start, config.baseline.weeks_count)?;
    let interval = request.interval_seconds;

    log::info!(
        "Generating brief for {} to {} ({} channel(s), {}s resolution)",
        request.period.start,
        request.period.end,
        request.report_data.len(),
        interval
    );

    let sensor_health = analyze_site_sensor_health(&request.report_data, config, interval, request.now);
    let after_hours_waste = analyze_after_hours_waste(&request.report_data, &request.baseline_data, config, interval)?;
    let anomalies = analyze_anomalies(&request.report_data, &request.baseline_data, config, interval)?;
    let spikes = analyze_spikes(
        &request.report_data,
        &request.baseline_data,
        config,
        interval,
        request.site_channel_id.as_deref(),
    )?;

    let findings = Findings {
        sensor_health: Some(&sensor_health),
        after_hours: Some(&after_hours_waste),
        anomalies: Some(&anomalies),
        spikes: Some(&spikes),
    };
    let quick_wins = generate_quick_wins(&findings, config);

    let summary = BriefSummary {
        headline: headline(&sensor_health, &after_hours_waste, &anomalies),
        top_risks: top_risks(&sensor_health, &after_hours_waste, &anomalies),
        top_opportunities: top_opportunities(&after_hours_waste, &spikes),
        total_potential_savings: potential_savings(&after_hours_waste, &anomalies, &tariff),
    };

    let data_quality = DataQuality {
        channels_analyzed: request.report_data.len(),
        avg_completeness: average_completeness(&request.report_data, &request.period, interval),
        baseline_coverage: baseline_coverage(request, &baseline, config),
    };

    Ok(WeeklyBrief {
        metadata: BriefMetadata {
            generated_at: request.now,
            report_version: env!("CARGO_PKG_VERSION"),
            period: PeriodInfo {
                start: request.period.start_utc(),
                end: request.period.end_utc(),
                timezone: config.timezone.clone(),
            },
            baseline: BaselineInfo {
                start: baseline.start_utc(),
                end: baseline.end_utc(),
                weeks_count: config.baseline.weeks_count,
            },
            data_resolution: format!("{}s ({}min)", interval, interval / 60),
        },
        summary,
        sections: BriefSections {
            sensor_health,
            after_hours_waste,
            anomalies,
            spikes,
            quick_wins,
        },
        data_quality,
    })
}

fn headline(sensor_health: &SensorHealthReport, after_hours: &AfterHoursReport, anomalies: &AnomalyReport) -> Vec<String> {
    let mut lines = Vec::new();

    if sensor_health.high_severity > 0 {
        lines.push(format!("{} critical data quality issue(s) detected", sensor_health.high_severity));
    }
    if after_hours.summary.total_excess_kwh > 0.0 {
        lines.push(format!(
            "${:.0}/week in after-hours waste identified",
            after_hours.summary.total_excess_cost
        ));
    }
    if anomalies.total_anomaly_events > HEADLINE_ANOMALY_EVENTS {
        lines.push(format!("{} unusual consumption events detected", anomalies.total_anomaly_events));
    }

    if lines.is_empty() {
        lines.push("No significant issues detected this week".to_string());
    }
    lines
}

fn top_risks(sensor_health: &SensorHealthReport, after_hours: &AfterHoursReport, anomalies: &AnomalyReport) -> Vec<String> {
    let mut risks = Vec::new();

    if sensor_health.high_severity > 0 {
        risks.push(format!("Missing data on {} channel(s)", sensor_health.high_severity));
    }
    if anomalies.total_excess_kwh > RISK_EXCESS_KWH {
        risks.push(format!("Significant unexpected consumption: {:.0} kWh", anomalies.total_excess_kwh));
    }
    if after_hours.summary.total_excess_kwh > RISK_EXCESS_KWH {
        risks.push(format!(
            "High after-hours waste: {:.0} kWh/week",
            after_hours.summary.total_excess_kwh
        ));
    }

    if risks.is_empty() {
        risks.push("No significant risks identified".to_string());
    }
    risks
}

fn top_opportunities(after_hours: &AfterHoursReport, spikes: &SpikeReport) -> Vec<String> {
    let mut opportunities = Vec::new();

    if after_hours.summary.total_excess_kwh > OPPORTUNITY_EXCESS_KWH {
        opportunities.push(format!(
            "After-hours optimization: ${:.0}/year potential",
            after_hours.summary.estimated_annual_cost
        ));
    }
    if spikes.total_spike_events > 0 {
        opportunities.push(format!(
            "Demand spike reduction: {} events to investigate",
            spikes.total_spike_events
        ));
    }

    if opportunities.is_empty() {
        opportunities.push("Continue monitoring for optimization opportunities".to_string());
    }
    opportunities
}

fn potential_savings(after_hours: &AfterHoursReport, anomalies: &AnomalyReport, tariff: &TariffEngine) -> PotentialSavings {
    let weekly_cost = after_hours.summary.total_excess_cost + tariff.calculate_cost(anomalies.total_excess_kwh);

    PotentialSavings {
        weekly_kwh: after_hours.summary.total_excess_kwh + anomalies.total_excess_kwh,
        weekly_cost,
        estimated_annual: tariff.annualize(weekly_cost),
    }
}

fn average_completeness(channels: &[ChannelSeries], period: &Period, interval_seconds: u32) -> f64 {
    if channels.is_empty() {
        return 0.0;
    }

    let period_intervals = calendar::expected_interval_count(period.start_utc(), period.end_utc(), interval_seconds);
    let total: f64 = channels
        .iter()
        .map(|c| stats::completeness(c.readings.len(), c.expected_intervals.unwrap_or(period_intervals)))
        .sum();

    total / channels.len() as f64
}

fn baseline_coverage(request: &BriefRequest, baseline: &Period, config: &Config) -> Vec<String> {
    let expected = calendar::expected_interval_count(baseline.start_utc(), baseline.end_utc(), request.interval_seconds);
    let minimum = config.baseline.min_completeness;

    request
        .report_data
        .iter()
        .filter_map(|channel| find_baseline(&request.baseline_data, &channel.channel_id))
        .filter_map(|series| {
            let completeness = stats::completeness(series.readings.len(), expected);
            if completeness >= minimum {
                return None;
            }

            let warning = format!(
                "Baseline for channel {} is {:.1}% complete (minimum {:.0}%)",
                series.channel_id, completeness, minimum
            );
            log::warn!("{}", warning);
            Some(warning)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analytics::fixtures::{local, series};
    use chrono::Duration;

    const INTERVAL: u32 = 900;
    const WEEK: usize = 7 * 96;

    /// Office load starting Monday 00:00: busy weekdays 07-18, a steady
    /// night base with a small bump every third hour
    fn office_load(slots: usize, night_kw: f64) -> Vec<Option<f64>> {
        (0..slots)
            .map(|slot| {
                let hour = (slot % 96) / 4;
                let weekday = (slot / 96) % 7;
                if weekday < 5 && (7..18).contains(&hour) {
                    Some(30.0 + (slot % 3) as f64)
                } else if slot % 12 == 0 {
                    Some(night_kw + 0.5)
                } else {
                    Some(night_kw)
                }
            })
            .collect()
    }

    fn request(report_night_kw: f64) -> BriefRequest {
        let config = Config::default();
        let baseline_start = local(2024, 1, 1, 0, 0);
        let report_start = local(2024, 1, 29, 0, 0);
        let tz = config.tz().unwrap();

        BriefRequest {
            report_data: vec![
                series("ahu-1", report_start, INTERVAL, &office_load(WEEK, report_night_kw)),
                series("lights", report_start, INTERVAL, &office_load(WEEK, 2.0)),
            ],
            baseline_data: vec![
                series("ahu-1", baseline_start, INTERVAL, &office_load(4 * WEEK, 2.0)),
                series("lights", baseline_start, INTERVAL, &office_load(2 * WEEK, 2.0)),
            ],
            interval_seconds: INTERVAL,
            site_channel_id: None,
            period: Period {
                start: report_start.with_timezone(&tz),
                end: (report_start + Duration::weeks(1) - Duration::seconds(1)).with_timezone(&tz),
            },
            now: report_start + Duration::weeks(1),
        }
    }

    #[test]
    fn test_quiet_site() {
        let brief = generate_weekly_brief(&request(2.0), &Config::default()).unwrap();

        assert_eq!(brief.summary.headline, vec!["No significant issues detected this week"]);
        assert_eq!(brief.summary.top_risks, vec!["No significant risks identified"]);
        assert_eq!(
            brief.summary.top_opportunities,
            vec!["Continue monitoring for optimization opportunities"]
        );
        assert!(brief.sections.quick_wins.is_empty());
        assert_eq!(brief.data_quality.channels_analyzed, 2);
        assert!((brief.data_quality.avg_completeness - 100.0).abs() < 1e-9);
        assert_eq!(brief.metadata.data_resolution, "900s (15min)");
        assert_eq!(brief.metadata.baseline.start, local(2024, 1, 1, 0, 0));
    }

    #[test]
    fn test_baseline_coverage_warning() {
        let brief = generate_weekly_brief(&request(2.0), &Config::default()).unwrap();

        // "lights" only has two of four baseline weeks
        assert_eq!(brief.data_quality.baseline_coverage.len(), 1);
        assert!(brief.data_quality.baseline_coverage[0].contains("lights"));
        assert!(brief.data_quality.baseline_coverage[0].contains("50.0%"));
    }

    #[test]
    fn test_after_hours_waste_reaches_summary() {
        let config = Config::default();
        let brief = generate_weekly_brief(&request(6.0), &config).unwrap();

        let waste = &brief.sections.after_hours_waste.summary;
        assert_eq!(waste.total_meters_with_excess, 1);
        assert!(waste.total_excess_kwh > RISK_EXCESS_KWH);

        assert!(brief.summary.headline[0].ends_with("/week in after-hours waste identified"));
        assert!(brief.summary.top_risks.iter().any(|r| r.starts_with("High after-hours waste")));
        assert!(brief.summary.top_opportunities[0].starts_with("After-hours optimization"));

        let savings = &brief.summary.total_potential_savings;
        assert!(savings.weekly_kwh >= waste.total_excess_kwh);
        assert!((savings.estimated_annual - savings.weekly_cost * 52.0).abs() < 1e-6);

        assert!(!brief.sections.quick_wins.is_empty());
        assert!(brief.sections.quick_wins.len() <= config.quick_wins.max_count);
    }

    #[test]
    fn test_site_document_defaults_to_last_complete_week() {
        let json = r#"{
            "reportData": [{"channelId": "m1", "channelName": "Main", "readings": [{"ts": "2024-01-29T05:00:00Z", "P": 4.0}]}],
            "siteChannelId": "m1"
        }"#;
        let document: SiteDocument = serde_json::from_str(json).unwrap();
        assert_eq!(document.interval_seconds, 900);

        let now = local(2024, 2, 7, 12, 0);
        let request = document.into_request(&Config::default(), now).unwrap();
        assert_eq!(request.period.start_utc(), local(2024, 1, 29, 0, 0));
        assert_eq!(request.site_channel_id.as_deref(), Some("m1"));
        assert!(request.baseline_data.is_empty());
    }

    #[test]
    fn test_site_document_rejects_inverted_period() {
        let json = r#"{
            "reportData": [],
            "period": {"start": "2024-01-29T00:00:00Z", "end": "2024-01-22T00:00:00Z"}
        }"#;
        let document: SiteDocument = serde_json::from_str(json).unwrap();
        assert!(matches!(
            document.into_request(&Config::default(), Utc::now()),
            Err(Error::Config(_))
        ));
    }
}
