//! Common types used across the analytics engine

use crate::calendar;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A single telemetry sample from a meter channel
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Reading {
    /// Sample instant; accepts epoch seconds or ISO-8601 on input
    #[serde(rename = "ts", alias = "timestamp", deserialize_with = "calendar::deserialize_timestamp")]
    pub timestamp: DateTime<Utc>,
    /// Instantaneous power in kW
    #[serde(default, alias = "P", alias = "power_kw")]
    pub power_kw: Option<f64>,
    /// Interval energy in kWh
    #[serde(default, alias = "E", alias = "energy_kwh", skip_serializing_if = "Option::is_none")]
    pub energy_kwh: Option<f64>,
    #[serde(default, alias = "V", skip_serializing_if = "Option::is_none")]
    pub voltage: Option<f64>,
    #[serde(default, alias = "I", skip_serializing_if = "Option::is_none")]
    pub current: Option<f64>,
    #[serde(default, alias = "PF", skip_serializing_if = "Option::is_none")]
    pub power_factor: Option<f64>,
}

impl Reading {
    pub fn new(timestamp: DateTime<Utc>, power_kw: Option<f64>) -> Self {
        Self {
            timestamp,
            power_kw,
            energy_kwh: None,
            voltage: None,
            current: None,
            power_factor: None,
        }
    }

    /// Power in kW if present and a real number
    pub fn power(&self) -> Option<f64> {
        self.power_kw.filter(|p| p.is_finite())
    }
}

/// Readings for one channel over one period
///
/// Readings must be sorted by timestamp; detectors do not re-sort.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChannelSeries {
    #[serde(alias = "channel_id")]
    pub channel_id: String,
    #[serde(alias = "channel_name")]
    pub channel_name: String,
    /// Expected number of intervals in the period, when the caller knows it
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expected_intervals: Option<usize>,
    #[serde(default)]
    pub readings: Vec<Reading>,
}

impl ChannelSeries {
    pub fn new(channel_id: &str, channel_name: &str, readings: Vec<Reading>) -> Self {
        Self {
            channel_id: channel_id.to_string(),
            channel_name: channel_name.to_string(),
            expected_intervals: None,
            readings,
        }
    }

    pub fn with_expected_intervals(mut self, expected: usize) -> Self {
        self.expected_intervals = Some(expected);
        self
    }

    /// Readings that carry a usable power value, paired with that value
    pub fn powered(&self) -> impl Iterator<Item = (&Reading, f64)> {
        self.readings.iter().filter_map(|r| r.power().map(|p| (r, p)))
    }
}

/// Find the baseline series matching a report channel
pub fn find_baseline<'a>(baselines: &'a [ChannelSeries], channel_id: &str) -> Option<&'a ChannelSeries> {
    baselines
        .iter()
        .find(|b| b.channel_id == channel_id && !b.readings.is_empty())
}

/// Three-step level used for issue severity, recommendation priority and confidence.
///
/// Ordering follows urgency: `High < Medium < Low`, so an ascending sort puts
/// the most urgent items first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Level {
    High,
    Medium,
    Low,
}

impl Level {
    pub fn as_str(self) -> &'static str {
        match self {
            Level::High => "high",
            Level::Medium => "medium",
            Level::Low => "low",
        }
    }
}

pub type Severity = Level;
pub type Priority = Level;
pub type Confidence = Level;

/// Whether an event started inside or outside business hours
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HoursContext {
    BusinessHours,
    AfterHours,
}

impl HoursContext {
    pub fn from_business_hours(is_business: bool) -> Self {
        if is_business {
            HoursContext::BusinessHours
        } else {
            HoursContext::AfterHours
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            HoursContext::BusinessHours => "business_hours",
            HoursContext::AfterHours => "after_hours",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_level_ordering() {
        let mut levels = vec![Level::Low, Level::High, Level::Medium, Level::High];
        levels.sort();
        assert_eq!(levels, vec![Level::High, Level::High, Level::Medium, Level::Low]);
        assert!(Level::High < Level::Medium);
        assert!(Level::Medium < Level::Low);
    }

    #[test]
    fn test_reading_deserialize_aliases() {
        let reading: Reading =
            serde_json::from_str(r#"{"ts": "2024-01-15T10:00:00Z", "P": 12.5, "E": 3.1}"#).unwrap();
        assert_eq!(reading.power_kw, Some(12.5));
        assert_eq!(reading.energy_kwh, Some(3.1));
        assert_eq!(reading.timestamp.to_rfc3339(), "2024-01-15T10:00:00+00:00");

        let reading: Reading = serde_json::from_str(r#"{"ts": 1705312800, "power_kw": null}"#).unwrap();
        assert_eq!(reading.power(), None);
        assert_eq!(reading.timestamp.timestamp(), 1705312800);
    }

    #[test]
    fn test_power_skips_nan() {
        let reading = Reading::new(Utc::now(), Some(f64::NAN));
        assert_eq!(reading.power(), None);
    }

    #[test]
    fn test_find_baseline_skips_empty() {
        let baselines = vec![
            ChannelSeries::new("a", "A", Vec::new()),
            ChannelSeries::new("b", "B", vec![Reading::new(Utc::now(), Some(1.0))]),
        ];
        assert!(find_baseline(&baselines, "a").is_none());
        assert!(find_baseline(&baselines, "b").is_some());
        assert!(find_baseline(&baselines, "c").is_none());
    }
}
