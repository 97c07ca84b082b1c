//! Analytics module - baseline profiling, detectors and recommendations

pub mod after_hours;
pub mod anomaly;
pub mod baseline;
pub mod events;
pub mod quick_wins;
pub mod sensor_health;
pub mod spike;

pub use after_hours::{analyze_after_hours_waste, calculate_after_hours_waste, AfterHoursReport, AfterHoursResult};
pub use anomaly::{analyze_anomalies, detect_anomalies, AnomalyEvent, AnomalyReport, ChannelAnomalies};
pub use baseline::{build_anomaly_profile, build_spike_profile, AnomalyProfile, HourProfile, SpikeProfile};
pub use quick_wins::{generate_quick_wins, Findings, QuickWin, QuickWinType, WeeklyKwh};
pub use sensor_health::{analyze_sensor_health, analyze_site_sensor_health, Issue, IssueType, SensorHealthReport};
pub use spike::{analyze_spikes, detect_spikes, top_spikes, ChannelSpikes, SpikeEvent, SpikeReport};
