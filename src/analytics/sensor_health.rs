//! Sensor and communications health
//!
//! Data-quality checks that need no baseline: gaps in the series, overall
//! completeness, stuck (flatlined) sensors and meters that stopped reporting.

use crate::core::{ChannelSeries, Config, Severity, SensorHealthConfig};
use crate::stats;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::fmt;

/// Gaps missing more than this many intervals are high severity
const HIGH_SEVERITY_MISSING_INTERVALS: i64 = 10;

/// Completeness (%) below which a low-completeness issue is high severity
const HIGH_SEVERITY_COMPLETENESS_PCT: f64 = 50.0;

/// A flat window must average above this kW to count as stuck rather than off
const FLATLINE_MIN_MEAN_KW: f64 = 0.1;

/// Hours of silence after which a stale meter is high severity
const HIGH_SEVERITY_STALE_HOURS: f64 = 24.0;

/// Example channel names listed per summary entry
const SUMMARY_EXAMPLE_CHANNELS: usize = 3;

/// Kind of data-quality issue
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum IssueType {
    MissingData,
    LowCompleteness,
    Flatline,
    StaleData,
}

impl IssueType {
    pub fn as_str(self) -> &'static str {
        match self {
            IssueType::MissingData => "missing_data",
            IssueType::LowCompleteness => "low_completeness",
            IssueType::Flatline => "flatline",
            IssueType::StaleData => "stale_data",
        }
    }
}

impl fmt::Display for IssueType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Type-specific fields of an issue
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum IssueDetail {
    #[serde(rename_all = "camelCase")]
    MissingData {
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        missing_intervals: i64,
        duration_hours: f64,
    },
    #[serde(rename_all = "camelCase")]
    LowCompleteness {
        completeness_pct: f64,
        missing_count: i64,
    },
    #[serde(rename_all = "camelCase")]
    Flatline {
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        mean_power_kw: f64,
        variance: f64,
    },
    #[serde(rename_all = "camelCase")]
    StaleData {
        last_reading: DateTime<Utc>,
        hours_since: f64,
        source: &'static str,
    },
}

impl IssueDetail {
    pub fn issue_type(&self) -> IssueType {
        match self {
            IssueDetail::MissingData { .. } => IssueType::MissingData,
            IssueDetail::LowCompleteness { .. } => IssueType::LowCompleteness,
            IssueDetail::Flatline { .. } => IssueType::Flatline,
            IssueDetail::StaleData { .. } => IssueType::StaleData,
        }
    }
}

/// A data-quality finding for one channel
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Issue {
    pub severity: Severity,
    pub channel_id: String,
    pub channel_name: String,
    #[serde(flatten)]
    pub detail: IssueDetail,
    pub description: String,
}

impl Issue {
    fn new(channel: &ChannelSeries, severity: Severity, detail: IssueDetail, description: String) -> Self {
        Self {
            severity,
            channel_id: channel.channel_id.clone(),
            channel_name: channel.channel_name.clone(),
            detail,
            description,
        }
    }

    pub fn issue_type(&self) -> IssueType {
        self.detail.issue_type()
    }
}

/// Issues of one type across the site
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct IssueSummary {
    #[serde(rename = "type")]
    pub issue_type: IssueType,
    pub count: usize,
    pub affected_channels: usize,
    pub example_channels: Vec<String>,
    pub description: String,
}

/// Site-wide sensor health result
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SensorHealthReport {
    pub total_issues: usize,
    pub high_severity: usize,
    pub medium_severity: usize,
    pub low_severity: usize,
    /// Sorted by severity, most urgent first
    pub issues: Vec<Issue>,
    pub summary: Vec<IssueSummary>,
}

impl SensorHealthReport {
    pub fn issues_of(&self, issue_type: IssueType) -> impl Iterator<Item = &Issue> {
        self.issues.iter().filter(move |i| i.issue_type() == issue_type)
    }
}

/// Run all health checks on one channel's report-period readings
pub fn analyze_sensor_health(
    channel: &ChannelSeries,
    config: &SensorHealthConfig,
    interval_seconds: u32,
    now: DateTime<Utc>,
) -> Vec<Issue> {
    let mut issues = Vec::new();

    check_gaps(channel, config, interval_seconds, &mut issues);
    check_completeness(channel, config, &mut issues);
    check_flatline(channel, config, interval_seconds, &mut issues);
    check_staleness(channel, config, now, &mut issues);

    log::debug!("{}: {} sensor health issue(s)", channel.channel_id, issues.len());
    issues
}

fn check_gaps(channel: &ChannelSeries, config: &SensorHealthConfig, interval_seconds: u32, issues: &mut Vec<Issue>) {
    let timestamps: Vec<DateTime<Utc>> = channel.readings.iter().map(|r| r.timestamp).collect();

    for gap in stats::find_gaps(&timestamps, interval_seconds) {
        if gap.missing_intervals < config.gap_multiplier as i64 {
            continue;
        }

        let severity = if gap.missing_intervals > HIGH_SEVERITY_MISSING_INTERVALS {
            Severity::High
        } else {
            Severity::Medium
        };
        let duration_hours = gap.actual_interval_seconds / 3600.0;
        let description = format!("Missing {} intervals ({:.1}h gap)", gap.missing_intervals, duration_hours);

        issues.push(Issue::new(
            channel,
            severity,
            IssueDetail::MissingData {
                start: gap.start,
                end: gap.end,
                missing_intervals: gap.missing_intervals,
                duration_hours,
            },
            description,
        ));
    }
}

fn check_completeness(channel: &ChannelSeries, config: &SensorHealthConfig, issues: &mut Vec<Issue>) {
    let actual = channel.readings.len();
    let expected = channel.expected_intervals.unwrap_or(actual);
    let completeness = stats::completeness(actual, expected);

    if completeness >= 100.0 - config.missing_threshold_pct {
        return;
    }

    let severity = if completeness < HIGH_SEVERITY_COMPLETENESS_PCT {
        Severity::High
    } else {
        Severity::Medium
    };
    let missing_count = expected as i64 - actual as i64;
    let description = format!(
        "Only {:.1}% data completeness (missing {} intervals)",
        completeness, missing_count
    );

    issues.push(Issue::new(
        channel,
        severity,
        IssueDetail::LowCompleteness { completeness_pct: completeness, missing_count },
        description,
    ));
}

/// Report the first window of near-constant non-zero power, if any
fn check_flatline(channel: &ChannelSeries, config: &SensorHealthConfig, interval_seconds: u32, issues: &mut Vec<Issue>) {
    if interval_seconds == 0 {
        return;
    }

    let (timestamps, powers): (Vec<DateTime<Utc>>, Vec<f64>) =
        channel.powered().map(|(r, p)| (r.timestamp, p)).unzip();

    let window = (config.flatline_hours * 3600.0 / interval_seconds as f64) as usize;
    if powers.is_empty() || window == 0 || powers.len() < window {
        return;
    }

    let flat = stats::rolling_variance(&powers, window)
        .find(|w| w.variance < config.flatline_variance_threshold && w.mean > FLATLINE_MIN_MEAN_KW);

    if let Some(w) = flat {
        let description = format!(
            "Flatlined at {:.2} kW for {}+ hours (possible stuck sensor)",
            w.mean, config.flatline_hours
        );

        issues.push(Issue::new(
            channel,
            Severity::Medium,
            IssueDetail::Flatline {
                start: timestamps[w.index + 1 - window],
                end: timestamps[w.index],
                mean_power_kw: w.mean,
                variance: w.variance,
            },
            description,
        ));
    }
}

fn check_staleness(channel: &ChannelSeries, config: &SensorHealthConfig, now: DateTime<Utc>, issues: &mut Vec<Issue>) {
    let Some(last) = channel.readings.last() else {
        return;
    };

    let hours_since = (now - last.timestamp).num_seconds() as f64 / 3600.0;
    if hours_since <= config.stale_hours {
        return;
    }

    let severity = if hours_since > HIGH_SEVERITY_STALE_HOURS {
        Severity::High
    } else {
        Severity::Low
    };
    let description = format!(
        "No data for {:.1} hours (last: {})",
        hours_since,
        last.timestamp.format("%Y-%m-%d %H:%M:%S")
    );

    issues.push(Issue::new(
        channel,
        severity,
        IssueDetail::StaleData {
            last_reading: last.timestamp,
            hours_since,
            source: "inferred_from_timestamps",
        },
        description,
    ));
}

/// Run the health checks across every channel of a site
pub fn analyze_site_sensor_health(
    channels: &[ChannelSeries],
    config: &Config,
    interval_seconds: u32,
    now: DateTime<Utc>,
) -> SensorHealthReport {
    let mut issues: Vec<Issue> = channels
        .iter()
        .flat_map(|channel| analyze_sensor_health(channel, &config.sensor_health, interval_seconds, now))
        .collect();

    // Stable: channel order is kept within a severity
    issues.sort_by_key(|i| i.severity);

    let count = |severity: Severity| issues.iter().filter(|i| i.severity == severity).count();
    let report = SensorHealthReport {
        total_issues: issues.len(),
        high_severity: count(Severity::High),
        medium_severity: count(Severity::Medium),
        low_severity: count(Severity::Low),
        summary: summarize(&issues),
        issues,
    };

    log::info!(
        "Sensor health: {} issue(s), {} high severity",
        report.total_issues,
        report.high_severity
    );
    report
}

/// Group issues by type in order of first appearance
fn summarize(issues: &[Issue]) -> Vec<IssueSummary> {
    let mut groups: Vec<(IssueType, usize, Vec<&str>)> = Vec::new();

    for issue in issues {
        let issue_type = issue.issue_type();
        let index = match groups.iter().position(|(t, _, _)| *t == issue_type) {
            Some(index) => index,
            None => {
                groups.push((issue_type, 0, Vec::new()));
                groups.len() - 1
            }
        };

        let (_, count, channels) = &mut groups[index];
        *count += 1;
        if !channels.contains(&issue.channel_name.as_str()) {
            channels.push(issue.channel_name.as_str());
        }
    }

    groups
        .into_iter()
        .map(|(issue_type, count, channels)| {
            let examples: Vec<String> = channels
                .iter()
                .take(SUMMARY_EXAMPLE_CHANNELS)
                .map(|name| name.to_string())
                .collect();
            let more = if channels.len() > SUMMARY_EXAMPLE_CHANNELS {
                format!(" and {} more", channels.len() - SUMMARY_EXAMPLE_CHANNELS)
            } else {
                String::new()
            };

            IssueSummary {
                issue_type,
                count,
                affected_channels: channels.len(),
                description: format!(
                    "{} {} issue(s) affecting {} channel(s): {}{}",
                    count,
                    issue_type,
                    channels.len(),
                    examples.join(", "),
                    more
                ),
                example_channels: examples,
            }
        })
        .collect()
}
