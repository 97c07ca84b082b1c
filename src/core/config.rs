//! Configuration management
//!
//! Every tunable threshold has a default. Callers override any subset of them
//! with a partial document that is merged one level deep over the defaults.

use crate::core::{Error, Result};
use chrono::Weekday;
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fs;
use std::path::{Path, PathBuf};

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Config {
    /// IANA timezone used for hour-of-week and business-hours classification
    #[serde(default = "default_timezone")]
    pub timezone: String,
    #[serde(default)]
    pub business_hours: BusinessHours,
    #[serde(default)]
    pub baseline: BaselineConfig,
    #[serde(default)]
    pub sensor_health: SensorHealthConfig,
    #[serde(default)]
    pub after_hours: AfterHoursConfig,
    #[serde(default)]
    pub anomaly: AnomalyConfig,
    #[serde(default)]
    pub spike: SpikeConfig,
    #[serde(default)]
    pub quick_wins: QuickWinsConfig,
    #[serde(default)]
    pub tariff: TariffConfig,
}

fn default_timezone() -> String { "America/New_York".to_string() }

impl Default for Config {
    fn default() -> Self {
        Self {
            timezone: default_timezone(),
            business_hours: BusinessHours::default(),
            baseline: BaselineConfig::default(),
            sensor_health: SensorHealthConfig::default(),
            after_hours: AfterHoursConfig::default(),
            anomaly: AnomalyConfig::default(),
            spike: SpikeConfig::default(),
            quick_wins: QuickWinsConfig::default(),
            tariff: TariffConfig::default(),
        }
    }
}

impl Config {
    /// Get the default configuration file path
    pub fn config_path() -> Result<PathBuf> {
        let config_dir = dirs::config_dir()
            .ok_or_else(|| Error::Config("Could not determine config directory".to_string()))?;

        Ok(config_dir.join("energy-brief").join("config.toml"))
    }

    /// Load overrides from a TOML file and merge them over the defaults
    pub fn load(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }

    /// Load the file at [`Config::config_path`] if present, defaults otherwise
    pub fn load_default() -> Result<Self> {
        let path = Self::config_path()?;

        if !path.exists() {
            log::debug!("No configuration file at {}, using defaults", path.display());
            return Ok(Self::default());
        }

        log::info!("Loading configuration from {}", path.display());
        Self::load(&path)
    }

    /// Parse a TOML override document and merge it over the defaults
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let overrides: Value = toml::from_str(content)
            .map_err(|e| Error::Config(format!("Failed to parse config: {}", e)))?;
        Self::merge(&overrides)
    }

    /// Merge a partial override document over the defaults
    pub fn merge(overrides: &Value) -> Result<Self> {
        Self::default().merged_with(overrides)
    }

    /// Merge a partial override document over this configuration.
    ///
    /// Top-level keys whose current value and override are both objects are
    /// merged key by key; anything else is replaced wholesale. Keys that the
    /// configuration does not recognize are ignored.
    pub fn merged_with(&self, overrides: &Value) -> Result<Self> {
        let Value::Object(patch) = overrides else {
            return Err(Error::Config("Configuration overrides must be an object".to_string()));
        };

        let mut base = serde_json::to_value(self)
            .map_err(|e| Error::Serialization(e.to_string()))?;

        if let Value::Object(target) = &mut base {
            for (key, value) in patch {
                match (target.get_mut(key), value) {
                    (Some(Value::Object(existing)), Value::Object(nested)) => {
                        for (nested_key, nested_value) in nested {
                            existing.insert(nested_key.clone(), nested_value.clone());
                        }
                    }
                    _ => {
                        target.insert(key.clone(), value.clone());
                    }
                }
            }
        }

        serde_json::from_value(base)
            .map_err(|e| Error::Config(format!("Invalid configuration override: {}", e)))
    }

    /// Resolve the configured timezone
    pub fn tz(&self) -> Result<Tz> {
        self.timezone
            .parse::<Tz>()
            .map_err(|e| Error::Config(format!("Unknown timezone '{}': {}", self.timezone, e)))
    }
}

/// Business hours window for a single day, in local hours `[start, end)`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BusinessWindow {
    pub start: u32,
    pub end: u32,
}

/// Weekly business hours schedule. `None` marks the whole day as after-hours.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BusinessHours {
    #[serde(default = "default_weekday_window")]
    pub monday: Option<BusinessWindow>,
    #[serde(default = "default_weekday_window")]
    pub tuesday: Option<BusinessWindow>,
    #[serde(default = "default_weekday_window")]
    pub wednesday: Option<BusinessWindow>,
    #[serde(default = "default_weekday_window")]
    pub thursday: Option<BusinessWindow>,
    #[serde(default = "default_weekday_window")]
    pub friday: Option<BusinessWindow>,
    #[serde(default)]
    pub saturday: Option<BusinessWindow>,
    #[serde(default)]
    pub sunday: Option<BusinessWindow>,
}

fn default_weekday_window() -> Option<BusinessWindow> {
    Some(BusinessWindow { start: 7, end: 18 })
}

impl BusinessHours {
    /// Window configured for the given weekday
    pub fn window(&self, day: Weekday) -> Option<BusinessWindow> {
        match day {
            Weekday::Mon => self.monday,
            Weekday::Tue => self.tuesday,
            Weekday::Wed => self.wednesday,
            Weekday::Thu => self.thursday,
            Weekday::Fri => self.friday,
            Weekday::Sat => self.saturday,
            Weekday::Sun => self.sunday,
        }
    }
}

impl Default for BusinessHours {
    fn default() -> Self {
        Self {
            monday: default_weekday_window(),
            tuesday: default_weekday_window(),
            wednesday: default_weekday_window(),
            thursday: default_weekday_window(),
            friday: default_weekday_window(),
            saturday: None,
            sunday: None,
        }
    }
}

/// Baseline period parameters
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BaselineConfig {
    /// Number of weeks preceding the report week
    #[serde(default = "default_weeks_count")]
    pub weeks_count: u32,
    /// Minimum baseline completeness (%) before a coverage warning is raised
    #[serde(default = "default_min_completeness")]
    pub min_completeness: f64,
}

fn default_weeks_count() -> u32 { 4 }
fn default_min_completeness() -> f64 { 70.0 }

impl Default for BaselineConfig {
    fn default() -> Self {
        Self {
            weeks_count: default_weeks_count(),
            min_completeness: default_min_completeness(),
        }
    }
}

/// Sensor and communications health thresholds
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SensorHealthConfig {
    /// Minimum missing intervals for a gap to be reported
    #[serde(default = "default_gap_multiplier")]
    pub gap_multiplier: u32,
    /// Hours since the last reading before a meter is stale
    #[serde(default = "default_stale_hours")]
    pub stale_hours: f64,
    /// Allowed missing data (%) before completeness is flagged
    #[serde(default = "default_missing_threshold_pct")]
    pub missing_threshold_pct: f64,
    /// Window length (hours) for flatline detection
    #[serde(default = "default_flatline_hours")]
    pub flatline_hours: f64,
    /// Variance (kW²) below which a window counts as flat
    #[serde(default = "default_flatline_variance_threshold")]
    pub flatline_variance_threshold: f64,
}

fn default_gap_multiplier() -> u32 { 2 }
fn default_stale_hours() -> f64 { 2.0 }
fn default_missing_threshold_pct() -> f64 { 10.0 }
fn default_flatline_hours() -> f64 { 6.0 }
fn default_flatline_variance_threshold() -> f64 { 0.01 }

impl Default for SensorHealthConfig {
    fn default() -> Self {
        Self {
            gap_multiplier: default_gap_multiplier(),
            stale_hours: default_stale_hours(),
            missing_threshold_pct: default_missing_threshold_pct(),
            flatline_hours: default_flatline_hours(),
            flatline_variance_threshold: default_flatline_variance_threshold(),
        }
    }
}

/// After-hours waste parameters
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AfterHoursConfig {
    /// Percentile of baseline after-hours load treated as the expected floor
    #[serde(default = "default_after_hours_percentile")]
    pub baseline_percentile: f64,
    /// Readings at or below this kW are ignored when building the floor
    #[serde(default = "default_min_power_threshold")]
    pub min_power_threshold: f64,
    /// Weekly excess kWh needed for a channel to be significant
    #[serde(default = "default_after_hours_min_excess")]
    pub min_excess_kwh: f64,
}

fn default_after_hours_percentile() -> f64 { 5.0 }
fn default_min_power_threshold() -> f64 { 0.1 }
fn default_after_hours_min_excess() -> f64 { 10.0 }

impl Default for AfterHoursConfig {
    fn default() -> Self {
        Self {
            baseline_percentile: default_after_hours_percentile(),
            min_power_threshold: default_min_power_threshold(),
            min_excess_kwh: default_after_hours_min_excess(),
        }
    }
}

/// Anomaly detection parameters
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnomalyConfig {
    /// Threshold is `q3 + iqr_multiplier * iqr`
    #[serde(default = "default_iqr_multiplier")]
    pub iqr_multiplier: f64,
    #[serde(default = "default_z_score_threshold")]
    pub z_score_threshold: f64,
    #[serde(default = "default_min_consecutive_intervals")]
    pub min_consecutive_intervals: usize,
    #[serde(default = "default_anomaly_min_excess")]
    pub min_excess_kwh: f64,
}

fn default_iqr_multiplier() -> f64 { 3.0 }
fn default_z_score_threshold() -> f64 { 3.0 }
fn default_min_consecutive_intervals() -> usize { 3 }
fn default_anomaly_min_excess() -> f64 { 5.0 }

impl Default for AnomalyConfig {
    fn default() -> Self {
        Self {
            iqr_multiplier: default_iqr_multiplier(),
            z_score_threshold: default_z_score_threshold(),
            min_consecutive_intervals: default_min_consecutive_intervals(),
            min_excess_kwh: default_anomaly_min_excess(),
        }
    }
}

/// Spike detection parameters
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SpikeConfig {
    /// Percentile of baseline load per hour-of-week treated as "normal"
    #[serde(default = "default_spike_percentile")]
    pub baseline_percentile: f64,
    #[serde(default = "default_spike_multiplier")]
    pub multiplier: f64,
    /// Absolute floor (kW) for submeters
    #[serde(default = "default_submeter_min_kw")]
    pub submeter_min_kw: f64,
    /// Absolute floor (kW) for the site total channel
    #[serde(default = "default_site_min_kw")]
    pub site_min_kw: f64,
    /// Minimum event length in intervals
    #[serde(default = "default_min_duration")]
    pub min_duration: usize,
}

fn default_spike_percentile() -> f64 { 95.0 }
fn default_spike_multiplier() -> f64 { 1.5 }
fn default_submeter_min_kw() -> f64 { 5.0 }
fn default_site_min_kw() -> f64 { 20.0 }
fn default_min_duration() -> usize { 1 }

impl Default for SpikeConfig {
    fn default() -> Self {
        Self {
            baseline_percentile: default_spike_percentile(),
            multiplier: default_spike_multiplier(),
            submeter_min_kw: default_submeter_min_kw(),
            site_min_kw: default_site_min_kw(),
            min_duration: default_min_duration(),
        }
    }
}

/// Recommendation list bounds
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QuickWinsConfig {
    #[serde(default = "default_max_count")]
    pub max_count: usize,
    /// Minimum weekly kWh for a per-meter after-hours recommendation
    #[serde(default = "default_min_weekly_impact")]
    pub min_weekly_impact: f64,
}

fn default_max_count() -> usize { 10 }
fn default_min_weekly_impact() -> f64 { 10.0 }

impl Default for QuickWinsConfig {
    fn default() -> Self {
        Self {
            max_count: default_max_count(),
            min_weekly_impact: default_min_weekly_impact(),
        }
    }
}

/// Energy tariff
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TariffConfig {
    /// Rate per kWh
    #[serde(default = "default_rate")]
    pub default_rate: f64,
    /// Demand charge per kW of monthly peak, if the tariff has one
    #[serde(default)]
    pub demand_charge: Option<f64>,
}

fn default_rate() -> f64 { 0.12 }

impl Default for TariffConfig {
    fn default() -> Self {
        Self {
            default_rate: default_rate(),
            demand_charge: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_defaults() {
        let config = Config::default();

        assert_eq!(config.timezone, "America/New_York");
        assert_eq!(config.baseline.weeks_count, 4);
        assert_eq!(config.sensor_health.gap_multiplier, 2);
        assert_eq!(config.anomaly.min_consecutive_intervals, 3);
        assert_eq!(config.spike.site_min_kw, 20.0);
        assert_eq!(config.quick_wins.max_count, 10);
        assert_eq!(config.tariff.demand_charge, None);
        assert_eq!(config.business_hours.window(Weekday::Mon), Some(BusinessWindow { start: 7, end: 18 }));
        assert_eq!(config.business_hours.window(Weekday::Sun), None);
    }

    #[test]
    fn test_merge_nested_section_key_by_key() {
        let config = Config::merge(&json!({
            "anomaly": { "iqrMultiplier": 1.5 },
            "tariff": { "demandCharge": 12.5 },
        }))
        .unwrap();

        assert_eq!(config.anomaly.iqr_multiplier, 1.5);
        // Untouched siblings keep their defaults
        assert_eq!(config.anomaly.min_excess_kwh, 5.0);
        assert_eq!(config.tariff.default_rate, 0.12);
        assert_eq!(config.tariff.demand_charge, Some(12.5));
    }

    #[test]
    fn test_merge_business_hours() {
        let config = Config::merge(&json!({
            "businessHours": {
                "saturday": { "start": 9, "end": 13 },
                "friday": null,
            },
        }))
        .unwrap();

        assert_eq!(config.business_hours.window(Weekday::Sat), Some(BusinessWindow { start: 9, end: 13 }));
        assert_eq!(config.business_hours.window(Weekday::Fri), None);
        assert_eq!(config.business_hours.window(Weekday::Mon), Some(BusinessWindow { start: 7, end: 18 }));
    }

    #[test]
    fn test_merge_ignores_unknown_keys() {
        let config = Config::merge(&json!({
            "output": { "includeCharts": false },
            "spike": { "multiplier": 2.0, "unknownKnob": 7 },
        }))
        .unwrap();

        assert_eq!(config.spike.multiplier, 2.0);
    }

    #[test]
    fn test_merge_rejects_bad_types() {
        let result = Config::merge(&json!({ "quickWins": { "maxCount": "lots" } }));
        assert!(matches!(result, Err(Error::Config(_))));

        let result = Config::merge(&json!([1, 2, 3]));
        assert!(matches!(result, Err(Error::Config(_))));
    }

    #[test]
    fn test_merge_scalar_replaces_wholesale() {
        let config = Config::merge(&json!({ "timezone": "Europe/Paris" })).unwrap();
        assert_eq!(config.timezone, "Europe/Paris");
        assert_eq!(config.tz().unwrap(), chrono_tz::Europe::Paris);
    }

    #[test]
    fn test_from_toml() {
        let config = Config::from_toml_str(
            r#"
            timezone = "America/Chicago"

            [sensorHealth]
            staleHours = 6

            [quickWins]
            maxCount = 5
            "#,
        )
        .unwrap();

        assert_eq!(config.timezone, "America/Chicago");
        assert_eq!(config.sensor_health.stale_hours, 6.0);
        assert_eq!(config.sensor_health.flatline_hours, 6.0);
        assert_eq!(config.quick_wins.max_count, 5);
    }

    #[test]
    fn test_load_from_file() {
        let dir = std::env::temp_dir();
        let path = dir.join(format!("energy-brief-config-{}.toml", std::process::id()));
        fs::write(&path, "timezone = \"Europe/Paris\"\n\n[anomaly]\niqrMultiplier = 2.5\n").unwrap();

        let loaded = Config::load(&path);
        fs::remove_file(&path).unwrap();
        let config = loaded.unwrap();

        assert_eq!(config.timezone, "Europe/Paris");
        assert_eq!(config.anomaly.iqr_multiplier, 2.5);
        assert_eq!(config.anomaly.min_consecutive_intervals, 3);

        // Gone now
        assert!(matches!(Config::load(&path), Err(Error::Io(_))));

        let broken = dir.join(format!("energy-brief-broken-{}.toml", std::process::id()));
        fs::write(&broken, "[anomaly\niqrMultiplier = ").unwrap();
        let loaded = Config::load(&broken);
        fs::remove_file(&broken).unwrap();
        assert!(matches!(loaded, Err(Error::Config(_))));
    }

    #[test]
    fn test_unknown_timezone() {
        let config = Config { timezone: "Mars/Olympus_Mons".to_string(), ..Default::default() };
        assert!(matches!(config.tz(), Err(Error::Config(_))));
    }
}
