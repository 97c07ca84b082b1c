//! Calendar kernel
//!
//! Timestamp parsing, hour-of-week bucketing, business-hours classification
//! and report/baseline period derivation. All local-time questions are asked
//! in the site timezone.

use crate::core::{BusinessHours, Error, Result};
use chrono::{DateTime, Datelike, Duration, NaiveDate, NaiveDateTime, NaiveTime, TimeZone, Timelike, Utc};
use chrono_tz::Tz;
use serde::{Deserialize, Deserializer, Serialize};

/// A closed time range in the site timezone
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Period {
    pub start: DateTime<Tz>,
    pub end: DateTime<Tz>,
}

impl Period {
    pub fn start_utc(&self) -> DateTime<Utc> {
        self.start.with_timezone(&Utc)
    }

    pub fn end_utc(&self) -> DateTime<Utc> {
        self.end.with_timezone(&Utc)
    }
}

/// A timestamp as it arrives from ingestion
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum RawTimestamp {
    Seconds(i64),
    Fractional(f64),
    Text(String),
}

/// Parse epoch seconds or an ISO-8601 string into a UTC instant
pub fn parse_timestamp(raw: &RawTimestamp) -> Result<DateTime<Utc>> {
    match raw {
        RawTimestamp::Seconds(secs) => Utc
            .timestamp_opt(*secs, 0)
            .single()
            .ok_or_else(|| Error::Timestamp(format!("epoch seconds out of range: {}", secs))),
        RawTimestamp::Fractional(secs) => {
            if !secs.is_finite() {
                return Err(Error::Timestamp(format!("epoch seconds not finite: {}", secs)));
            }
            let whole = secs.floor();
            let nanos = ((secs - whole) * 1e9).round().min(999_999_999.0) as u32;
            Utc.timestamp_opt(whole as i64, nanos)
                .single()
                .ok_or_else(|| Error::Timestamp(format!("epoch seconds out of range: {}", secs)))
        }
        RawTimestamp::Text(text) => parse_timestamp_str(text),
    }
}

/// Parse an ISO-8601 string; strings without an offset are taken as UTC
pub fn parse_timestamp_str(text: &str) -> Result<DateTime<Utc>> {
    let text = text.trim();

    if let Ok(parsed) = DateTime::parse_from_rfc3339(text) {
        return Ok(parsed.with_timezone(&Utc));
    }

    if let Ok(parsed) = DateTime::parse_from_str(text, "%Y-%m-%d %H:%M:%S%.f%:z") {
        return Ok(parsed.with_timezone(&Utc));
    }

    for format in ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M"] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(text, format) {
            return Ok(Utc.from_utc_datetime(&naive));
        }
    }

    Err(Error::Timestamp(format!("unrecognized timestamp '{}'", text)))
}

/// Serde adapter for timestamp fields that accept epoch seconds or ISO strings
pub fn deserialize_timestamp<'de, D>(deserializer: D) -> std::result::Result<DateTime<Utc>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = RawTimestamp::deserialize(deserializer)?;
    parse_timestamp(&raw).map_err(serde::de::Error::custom)
}

/// Hour of week in `[0, 167]`: Monday 00:00 is 0, Sunday 23:00 is 167
pub fn hour_of_week<T: TimeZone>(ts: &DateTime<T>) -> u32 {
    ts.weekday().num_days_from_monday() * 24 + ts.hour()
}

/// Hour of week of a UTC instant as seen in the site timezone
pub fn local_hour_of_week(ts: &DateTime<Utc>, tz: Tz) -> u32 {
    hour_of_week(&ts.with_timezone(&tz))
}

/// Whether a local timestamp falls inside the configured business hours
pub fn is_business_hours<T: TimeZone>(ts: &DateTime<T>, hours: &BusinessHours) -> bool {
    match hours.window(ts.weekday()) {
        Some(window) => window.start <= ts.hour() && ts.hour() < window.end,
        None => false,
    }
}

/// Business-hours check for a UTC instant in the site timezone
pub fn is_local_business_hours(ts: &DateTime<Utc>, tz: Tz, hours: &BusinessHours) -> bool {
    is_business_hours(&ts.with_timezone(&tz), hours)
}

/// Duration of one interval in hours
pub fn interval_hours(interval_seconds: u32) -> f64 {
    interval_seconds as f64 / 3600.0
}

/// The last complete Monday 00:00:00 to Sunday 23:59:59 week before `now`
pub fn last_complete_week(tz: Tz, now: DateTime<Utc>) -> Result<Period> {
    let local = now.with_timezone(&tz);
    let days_back = local.weekday().num_days_from_monday() as i64 + 7;
    let monday = local.date_naive() - Duration::days(days_back);
    let sunday = monday + Duration::days(6);

    Ok(Period {
        start: localize(tz, monday, start_of_day())?,
        end: localize(tz, sunday, end_of_day())?,
    })
}

/// Baseline window of `weeks_count` weeks ending the day before the report starts
pub fn baseline_period(report_start: &DateTime<Tz>, weeks_count: u32) -> Result<Period> {
    let tz = report_start.timezone();
    let end_date = report_start.date_naive() - Duration::days(1);
    let span_days = (weeks_count as i64 * 7 - 1).max(0);
    let start_date = end_date - Duration::days(span_days);

    Ok(Period {
        start: localize(tz, start_date, start_of_day())?,
        end: localize(tz, end_date, end_of_day())?,
    })
}

/// Timestamps a perfectly complete series would carry over `[start, end]`
pub fn expected_timestamps(start: DateTime<Utc>, end: DateTime<Utc>, interval_seconds: u32) -> Vec<DateTime<Utc>> {
    let count = expected_interval_count(start, end, interval_seconds);
    let step = Duration::seconds(interval_seconds as i64);

    (0..count).map(|i| start + step * i as i32).collect()
}

/// Number of intervals a complete series would carry over `[start, end]`
pub fn expected_interval_count(start: DateTime<Utc>, end: DateTime<Utc>, interval_seconds: u32) -> usize {
    if interval_seconds == 0 || end < start {
        return 0;
    }
    ((end - start).num_seconds() / interval_seconds as i64) as usize + 1
}

fn start_of_day() -> NaiveTime {
    NaiveTime::default()
}

fn end_of_day() -> NaiveTime {
    NaiveTime::from_hms_opt(23, 59, 59).unwrap_or_default()
}

/// Attach the site timezone to a wall-clock time, stepping past DST gaps
fn localize(tz: Tz, date: NaiveDate, time: NaiveTime) -> Result<DateTime<Tz>> {
    let naive = date.and_time(time);

    tz.from_local_datetime(&naive)
        .earliest()
        .or_else(|| tz.from_local_datetime(&(naive + Duration::hours(1))).earliest())
        .ok_or_else(|| Error::Timestamp(format!("local time {} does not exist in {}", naive, tz.name())))
}
