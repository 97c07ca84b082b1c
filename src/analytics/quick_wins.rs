//! Quick-win recommendations
//!
//! Rule-based synthesis over the detector reports. Each rule emits at most one
//! kind of recommendation when its finding is material; the combined list is
//! ranked by priority, then by weekly energy at stake.

use super::after_hours::AfterHoursReport;
use super::anomaly::AnomalyReport;
use super::sensor_health::{IssueType, SensorHealthReport};
use super::spike::SpikeReport;
use crate::core::{Confidence, Config, Priority, Severity};
use crate::pricing::TariffEngine;
use serde::{Serialize, Serializer};

/// After-hours meters considered for individual recommendations
const TOP_WASTE_METERS: usize = 3;

/// Weekly excess above which an after-hours meter is high priority
const HIGH_PRIORITY_WASTE_KWH: f64 = 100.0;

/// After-hours intervals needed for a high-confidence estimate
const HIGH_CONFIDENCE_INTERVALS: usize = 100;

/// Excess in the top anomaly event above which it is high priority
const HIGH_PRIORITY_ANOMALY_KWH: f64 = 50.0;

/// Affected channels named in the sensor-issue description
const NAMED_CHANNELS: usize = 3;

/// Detector reports fed to the synthesizer; absent reports contribute nothing
#[derive(Debug, Clone, Copy, Default)]
pub struct Findings<'a> {
    pub sensor_health: Option<&'a SensorHealthReport>,
    pub after_hours: Option<&'a AfterHoursReport>,
    pub anomalies: Option<&'a AnomalyReport>,
    pub spikes: Option<&'a SpikeReport>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum QuickWinType {
    AfterHoursWaste,
    SensorHealth,
    Anomaly,
    Spike,
    Summary,
}

/// Weekly energy at stake; sensor problems have no meaningful figure
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum WeeklyKwh {
    Kwh(f64),
    NotApplicable,
}

impl WeeklyKwh {
    /// Value used for ranking; not-applicable ranks as zero
    pub fn sort_value(self) -> f64 {
        match self {
            WeeklyKwh::Kwh(kwh) => kwh,
            WeeklyKwh::NotApplicable => 0.0,
        }
    }
}

impl Serialize for WeeklyKwh {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            WeeklyKwh::Kwh(kwh) => serializer.serialize_f64(*kwh),
            WeeklyKwh::NotApplicable => serializer.serialize_str("N/A"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct QuickWinImpact {
    pub weekly_kwh: WeeklyKwh,
    pub weekly_cost: f64,
    pub annual_cost: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub additional_note: Option<String>,
}

impl QuickWinImpact {
    fn energy(weekly_kwh: f64, weekly_cost: f64, annual_cost: f64) -> Self {
        Self {
            weekly_kwh: WeeklyKwh::Kwh(weekly_kwh),
            weekly_cost,
            annual_cost,
            description: None,
            additional_note: None,
        }
    }

    fn data_quality(description: &str) -> Self {
        Self {
            weekly_kwh: WeeklyKwh::NotApplicable,
            weekly_cost: 0.0,
            annual_cost: 0.0,
            description: Some(description.to_string()),
            additional_note: None,
        }
    }
}

/// A prioritized, actionable recommendation
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct QuickWin {
    pub title: String,
    #[serde(rename = "type")]
    pub win_type: QuickWinType,
    pub priority: Priority,
    pub impact: QuickWinImpact,
    pub description: String,
    pub recommendations: Vec<String>,
    pub confidence: Confidence,
    pub owner: String,
    pub effort: String,
}

fn actions(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| s.to_string()).collect()
}

/// Build the ranked recommendation list, at most `quickWins.maxCount` long
pub fn generate_quick_wins(findings: &Findings<'_>, config: &Config) -> Vec<QuickWin> {
    let tariff = TariffEngine::new(&config.tariff);
    let mut wins = Vec::new();

    if let Some(report) = findings.after_hours {
        after_hours_wins(report, config, &tariff, &mut wins);
    }
    if let Some(report) = findings.sensor_health {
        wins.extend(communication_win(report));
    }
    if let Some(report) = findings.anomalies {
        wins.extend(anomaly_win(report, &tariff));
    }
    if let Some(report) = findings.spikes {
        wins.extend(spike_win(report, &tariff));
    }
    if let Some(report) = findings.sensor_health {
        wins.extend(flatline_win(report));
    }
    if let Some(report) = findings.after_hours {
        wins.extend(site_summary_win(report));
    }

    wins.sort_by(|a, b| {
        a.priority
            .cmp(&b.priority)
            .then_with(|| b.impact.weekly_kwh.sort_value().total_cmp(&a.impact.weekly_kwh.sort_value()))
    });
    wins.truncate(config.quick_wins.max_count);

    log::debug!("Generated {} quick win(s)", wins.len());
    wins
}

fn after_hours_wins(report: &AfterHoursReport, config: &Config, tariff: &TariffEngine, wins: &mut Vec<QuickWin>) {
    let material = report
        .top_meters
        .iter()
        .take(TOP_WASTE_METERS)
        .filter(|meter| meter.impact.excess_kwh >= config.quick_wins.min_weekly_impact);

    for meter in material {
        let excess_kwh = meter.impact.excess_kwh;
        let total_kwh = meter.this_week.total_after_hours_kwh;
        let excess_pct = if total_kwh > 0.0 {
            excess_kwh / total_kwh * 100.0
        } else {
            0.0
        };

        wins.push(QuickWin {
            title: format!("Reduce overnight base load on {}", meter.channel_name),
            win_type: QuickWinType::AfterHoursWaste,
            priority: if excess_kwh > HIGH_PRIORITY_WASTE_KWH {
                Priority::High
            } else {
                Priority::Medium
            },
            impact: QuickWinImpact::energy(
                excess_kwh,
                meter.impact.excess_cost,
                tariff.annualize(meter.impact.excess_cost),
            ),
            description: format!(
                "{} is consuming {:.1} kW on average during after-hours, {:.0}% above baseline. \
                 This suggests equipment running unnecessarily or at higher than needed levels.",
                meter.channel_name, meter.this_week.avg_power_kw, excess_pct
            ),
            recommendations: actions(&[
                "Verify equipment schedules match actual occupancy",
                "Check for HVAC systems running outside business hours",
                "Look for computers/servers left on unnecessarily",
                "Consider adding occupancy sensors or time-based controls",
            ]),
            confidence: if meter.this_week.intervals > HIGH_CONFIDENCE_INTERVALS {
                Confidence::High
            } else {
                Confidence::Medium
            },
            owner: "Facilities Manager".to_string(),
            effort: "Low to Medium".to_string(),
        });
    }
}

fn communication_win(report: &SensorHealthReport) -> Option<QuickWin> {
    if report.high_severity == 0 {
        return None;
    }

    let mut affected: Vec<&str> = Vec::new();
    for issue in report.issues.iter().filter(|i| i.severity == Severity::High) {
        if !affected.contains(&issue.channel_name.as_str()) {
            affected.push(issue.channel_name.as_str());
        }
    }
    if affected.is_empty() {
        return None;
    }

    let named: Vec<&str> = affected.iter().take(NAMED_CHANNELS).copied().collect();

    Some(QuickWin {
        title: format!("Fix data communication issues on {} meter(s)", affected.len()),
        win_type: QuickWinType::SensorHealth,
        priority: Priority::High,
        impact: QuickWinImpact::data_quality("Missing data prevents accurate monitoring and may hide energy waste"),
        description: format!(
            "{} meter(s) have high-severity data issues: {}. \
             This prevents accurate energy monitoring and may be hiding consumption anomalies.",
            affected.len(),
            named.join(", ")
        ),
        recommendations: actions(&[
            "Check network connectivity and power to affected meters",
            "Verify meter configuration and data logging settings",
            "Contact meter vendor if issues persist",
            "Consider replacing meters with repeated failures",
        ]),
        confidence: Confidence::High,
        owner: "Energy Manager / Facilities".to_string(),
        effort: "Medium".to_string(),
    })
}

/// Recommendation for the channel with the most anomaly excess, based on its first event
fn anomaly_win(report: &AnomalyReport, tariff: &TariffEngine) -> Option<QuickWin> {
    if report.total_anomaly_events == 0 {
        return None;
    }

    let channel = report.results.first()?;
    let event = channel.events.first()?;
    let excess_kwh = event.total_excess_kwh;

    Some(QuickWin {
        title: format!("Investigate recurring spikes on {}", channel.channel_name),
        win_type: QuickWinType::Anomaly,
        priority: if excess_kwh > HIGH_PRIORITY_ANOMALY_KWH {
            Priority::High
        } else {
            Priority::Medium
        },
        impact: QuickWinImpact::energy(excess_kwh, tariff.calculate_cost(excess_kwh), tariff.annual_cost(excess_kwh)),
        description: format!(
            "{} showed {} anomalous event(s) this week, consuming {:.1} kWh above normal patterns. \
             Peak was {:.1} kW during {}.",
            channel.channel_name,
            channel.anomaly_count,
            excess_kwh,
            event.peak_power,
            event.context.as_str()
        ),
        recommendations: actions(&[
            "Review equipment operation logs for this time period",
            "Check if new equipment was added or settings changed",
            "Verify load is appropriate for operational needs",
            "Consider load shifting if during peak demand periods",
        ]),
        confidence: Confidence::Medium,
        owner: "Operations / Energy Manager".to_string(),
        effort: "Medium".to_string(),
    })
}

fn spike_win(report: &SpikeReport, tariff: &TariffEngine) -> Option<QuickWin> {
    let top = report.top_spikes.first()?;
    let excess_kwh = top.event.total_excess_kwh;

    let mut impact = QuickWinImpact::energy(excess_kwh, tariff.calculate_cost(excess_kwh), tariff.annual_cost(excess_kwh));
    impact.additional_note = Some(tariff.demand_charge_note(top.event.peak_power));

    Some(QuickWin {
        title: format!("Reduce demand spikes on {}", top.channel_name),
        win_type: QuickWinType::Spike,
        priority: Priority::Medium,
        impact,
        description: format!(
            "{} experienced spikes up to {:.1} kW. \
             This may indicate short-cycling, simultaneous equipment starts, or undersized equipment.",
            top.channel_name, top.event.peak_power
        ),
        recommendations: actions(&[
            "Stagger start times for large equipment",
            "Check for short-cycling HVAC or refrigeration",
            "Consider soft-start controllers for motors",
            "Verify equipment is properly sized",
        ]),
        confidence: Confidence::Medium,
        owner: "Facilities Manager".to_string(),
        effort: "Medium to High".to_string(),
    })
}

fn flatline_win(report: &SensorHealthReport) -> Option<QuickWin> {
    let count = report.issues_of(IssueType::Flatline).count();
    if count == 0 {
        return None;
    }

    Some(QuickWin {
        title: format!("Check stuck sensors ({} detected)", count),
        win_type: QuickWinType::SensorHealth,
        priority: Priority::Low,
        impact: QuickWinImpact::data_quality("Stuck sensors provide inaccurate data for decision-making"),
        description: format!(
            "{} sensor(s) appear flatlined (stuck at constant value). \
             This typically indicates sensor failure or configuration issues.",
            count
        ),
        recommendations: actions(&[
            "Inspect physical sensors for damage or disconnection",
            "Reset or recalibrate affected meters",
            "Replace sensors if recalibration fails",
        ]),
        confidence: Confidence::High,
        owner: "Facilities / Maintenance".to_string(),
        effort: "Low".to_string(),
    })
}

fn site_summary_win(report: &AfterHoursReport) -> Option<QuickWin> {
    let summary = &report.summary;
    if summary.total_excess_kwh <= 0.0 {
        return None;
    }

    Some(QuickWin {
        title: "Overall after-hours optimization opportunity".to_string(),
        win_type: QuickWinType::Summary,
        priority: Priority::High,
        impact: QuickWinImpact::energy(
            summary.total_excess_kwh,
            summary.total_excess_cost,
            summary.estimated_annual_cost,
        ),
        description: format!(
            "Site-wide after-hours consumption is {:.0} kWh/week above baseline. \
             This represents a significant optimization opportunity.",
            summary.total_excess_kwh
        ),
        recommendations: actions(&[
            "Conduct comprehensive after-hours walk-through",
            "Review and update all equipment schedules",
            "Implement building automation or occupancy-based controls",
            "Set up weekly monitoring to track progress",
        ]),
        confidence: Confidence::High,
        owner: "Energy Manager / Facilities Director".to_string(),
        effort: "Medium".to_string(),
    })
}
