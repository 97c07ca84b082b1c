//! Folding flagged readings into events
//!
//! Detectors flag individual readings, then collapse runs of flagged readings
//! that sit close together in time into one event. How close is "close" is
//! chosen by each detector through [`GapTolerance`].

use chrono::{DateTime, Duration, Utc};

/// A reading that a detector has flagged
pub trait FlaggedInterval {
    fn timestamp(&self) -> DateTime<Utc>;

    /// Power in kW at the flagged instant
    fn power(&self) -> f64;

    /// Energy above the detector's reference for this interval
    fn excess_kwh(&self) -> f64;
}

/// Rule deciding whether two consecutive flagged readings share an event
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GapTolerance {
    /// Gap must be strictly shorter than the duration
    Below(Duration),
    /// Gap may equal the duration
    AtMost(Duration),
}

impl GapTolerance {
    pub fn joins(&self, gap: Duration) -> bool {
        match *self {
            GapTolerance::Below(limit) => gap < limit,
            GapTolerance::AtMost(limit) => gap <= limit,
        }
    }
}

/// A run of consecutive flagged readings
#[derive(Debug, Clone, Copy)]
pub struct EventRun<'a, T> {
    pub readings: &'a [T],
}

impl<'a, T: FlaggedInterval> EventRun<'a, T> {
    pub fn start(&self) -> DateTime<Utc> {
        self.readings[0].timestamp()
    }

    pub fn end(&self) -> DateTime<Utc> {
        self.readings[self.readings.len() - 1].timestamp()
    }

    /// Number of readings folded into the run
    pub fn intervals(&self) -> usize {
        self.readings.len()
    }

    pub fn peak_power(&self) -> f64 {
        self.readings
            .iter()
            .map(FlaggedInterval::power)
            .fold(f64::NEG_INFINITY, f64::max)
    }

    pub fn total_excess_kwh(&self) -> f64 {
        self.readings.iter().map(FlaggedInterval::excess_kwh).sum()
    }

    pub fn first(&self) -> &'a T {
        &self.readings[0]
    }
}

/// Split time-ordered flagged readings into runs. Every run is non-empty.
pub fn group_consecutive<T: FlaggedInterval>(flagged: &[T], tolerance: GapTolerance) -> Vec<EventRun<'_, T>> {
    let mut runs = Vec::new();
    if flagged.is_empty() {
        return runs;
    }

    let mut run_start = 0;
    for i in 1..flagged.len() {
        let gap = flagged[i].timestamp() - flagged[i - 1].timestamp();
        if !tolerance.joins(gap) {
            runs.push(EventRun { readings: &flagged[run_start..i] });
            run_start = i;
        }
    }
    runs.push(EventRun { readings: &flagged[run_start..] });

    runs
}
