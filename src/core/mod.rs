//! Core module - configuration, errors, and common types

mod config;
mod error;
mod types;

pub use config::{Config, BusinessHours, BusinessWindow, BaselineConfig, SensorHealthConfig, AfterHoursConfig, AnomalyConfig, SpikeConfig, QuickWinsConfig, TariffConfig};
pub use error::{Error, Result};
pub use types::{Reading, ChannelSeries, Level, Severity, Priority, Confidence, HoursContext, find_baseline};
