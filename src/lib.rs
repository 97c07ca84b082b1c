//! Energy brief library
//!
//! Weekly analytics for building energy meters: baseline profiling, sensor
//! health, after-hours waste, anomaly and spike detection, and ranked
//! recommendations.

pub mod analytics;
pub mod brief;
pub mod calendar;
pub mod core;
pub mod pricing;
pub mod stats;
