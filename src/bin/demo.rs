//! Energy Brief - Demo CLI
//!
//! Builds a synthetic five-week office site with a handful of injected
//! problems and prints the resulting weekly brief to the console.

use anyhow::{Context, Result};
use chrono::{DateTime, Datelike, Duration, TimeZone, Timelike, Utc, Weekday};
use chrono_tz::Tz;

use energy_brief_lib::brief::{generate_weekly_brief, BriefRequest};
use energy_brief_lib::calendar::{self, Period};
use energy_brief_lib::core::{ChannelSeries, Config, Reading};

const INTERVAL_SECONDS: u32 = 900;

/// Problems injected into the report week
#[derive(Clone, Copy)]
enum Channel {
    /// Night setback stops working on weeknights; runs hot early Tuesday
    Hvac,
    /// Stuck sensor on Saturday
    Lighting,
    /// Logger drops out for three hours on Thursday
    PlugLoads,
    /// Dishwasher booster bursts on Wednesday afternoon
    Kitchen,
}

impl Channel {
    fn id(self) -> &'static str {
        match self {
            Channel::Hvac => "hvac",
            Channel::Lighting => "lighting",
            Channel::PlugLoads => "plug_loads",
            Channel::Kitchen => "kitchen",
        }
    }

    fn name(self) -> &'static str {
        match self {
            Channel::Hvac => "HVAC - Rooftop Units",
            Channel::Lighting => "Lighting Panel LP-1",
            Channel::PlugLoads => "Plug Loads Floor 2",
            Channel::Kitchen => "Kitchen",
        }
    }

    /// Normal load in kW at a local wall-clock time
    fn normal_kw(self, weekday: Weekday, hour: u32) -> f64 {
        let open = !matches!(weekday, Weekday::Sat | Weekday::Sun) && (7..18).contains(&hour);
        match (self, open) {
            (Channel::Hvac, true) => 40.0,
            (Channel::Hvac, false) => 8.0,
            (Channel::Lighting, true) => 12.0,
            (Channel::Lighting, false) => 2.0,
            (Channel::PlugLoads, true) => 15.0,
            (Channel::PlugLoads, false) => 4.0,
            (Channel::Kitchen, true) => 6.0,
            (Channel::Kitchen, false) => 1.0,
        }
    }

    /// Report-week load, or `None` where the meter recorded nothing
    fn report_kw(self, weekday: Weekday, hour: u32, normal: f64) -> Option<f64> {
        match (self, weekday, hour) {
            (Channel::Hvac, Weekday::Tue, 2..=4) => Some(30.0),
            (Channel::Hvac, Weekday::Mon | Weekday::Tue | Weekday::Wed | Weekday::Thu | Weekday::Fri, h)
                if !(7..18).contains(&h) =>
            {
                Some(11.0)
            }
            (Channel::PlugLoads, Weekday::Thu, 10..=12) => None,
            (Channel::Kitchen, Weekday::Wed, 14) => Some(60.0),
            _ => Some(normal),
        }
    }

    fn is_stuck(self, weekday: Weekday, hour: u32) -> bool {
        matches!(self, Channel::Lighting) && weekday == Weekday::Sat && (8..18).contains(&hour)
    }
}

const CHANNELS: [Channel; 4] = [Channel::Hvac, Channel::Lighting, Channel::PlugLoads, Channel::Kitchen];

/// Small repeating wobble so healthy meters never look flat
fn wobble(slot: usize) -> f64 {
    ((slot * 7) % 5) as f64 * 0.2 - 0.4
}

fn slots(start: DateTime<Utc>, end: DateTime<Utc>) -> impl Iterator<Item = (usize, DateTime<Utc>)> {
    let step = Duration::seconds(INTERVAL_SECONDS as i64);
    (0..)
        .map(move |i| (i, start + step * i as i32))
        .take_while(move |(_, ts)| *ts < end)
}

/// Per-channel series plus the site total, summed from the submeters
fn build_site(tz: Tz, start: DateTime<Utc>, end: DateTime<Utc>, with_faults: bool) -> Vec<ChannelSeries> {
    let mut channels: Vec<ChannelSeries> = CHANNELS
        .iter()
        .map(|c| ChannelSeries::new(c.id(), c.name(), Vec::new()))
        .collect();
    let mut site = ChannelSeries::new("site_total", "Main Service", Vec::new());

    for (slot, ts) in slots(start, end) {
        let local = ts.with_timezone(&tz);
        let (weekday, hour) = (local.weekday(), local.hour());
        let mut total = 0.0;

        for (channel, series) in CHANNELS.iter().zip(channels.iter_mut()) {
            let normal = channel.normal_kw(weekday, hour);
            let power = if !with_faults {
                Some(normal + wobble(slot))
            } else if channel.is_stuck(weekday, hour) {
                Some(normal)
            } else {
                channel.report_kw(weekday, hour, normal).map(|kw| kw + wobble(slot))
            };

            match power {
                Some(kw) => {
                    total += kw;
                    series.readings.push(Reading::new(ts, Some(kw)));
                }
                // Dropped samples never reach the logger
                None => total += normal,
            }
        }
        site.readings.push(Reading::new(ts, Some(total)));
    }

    channels.push(site);
    channels
}

fn main() -> Result<()> {
    // Initialize logging
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    println!("==============================================");
    println!("   Energy Brief - Demo CLI");
    println!("==============================================\n");

    let config = Config::default();
    let tz = config.tz()?;

    // 1. Report window
    println!("[1/3] Resolving report and baseline windows...");
    let period = Period {
        start: tz.with_ymd_and_hms(2026, 2, 16, 0, 0, 0).single().context("ambiguous report start")?,
        end: tz.with_ymd_and_hms(2026, 2, 23, 0, 0, 0).single().context("ambiguous report end")?,
    };
    let baseline = calendar::baseline_period(&period.start, config.baseline.weeks_count)?;
    println!("      Report:   {} -> {}", period.start, period.end);
    println!("      Baseline: {} -> {} ({} weeks)\n", baseline.start, baseline.end, config.baseline.weeks_count);

    // 2. Synthetic data
    println!("[2/3] Generating synthetic meter data...");
    let report_data = build_site(tz, period.start_utc(), period.end_utc(), true);
    let baseline_data = build_site(tz, baseline.start_utc(), baseline.end_utc(), false);
    for series in &report_data {
        println!("      {:<22} {:>5} readings", series.channel_name, series.readings.len());
    }
    println!();

    // 3. Brief
    println!("[3/3] Running analytics...\n");
    let request = BriefRequest {
        report_data,
        baseline_data,
        interval_seconds: INTERVAL_SECONDS,
        site_channel_id: Some("site_total".to_string()),
        now: period.end_utc() + Duration::hours(1),
        period,
    };
    let brief = generate_weekly_brief(&request, &config)?;

    println!("=== Headline ===\n");
    for line in &brief.summary.headline {
        println!("  - {}", line);
    }
    if !brief.summary.top_risks.is_empty() {
        println!("\n  Risks:");
        for risk in &brief.summary.top_risks {
            println!("    ! {}", risk);
        }
    }
    if !brief.summary.top_opportunities.is_empty() {
        println!("\n  Opportunities:");
        for opportunity in &brief.summary.top_opportunities {
            println!("    + {}", opportunity);
        }
    }

    let sections = &brief.sections;
    println!("\n=== Findings ===\n");
    println!(
        "  Sensor issues:      {} ({} high, {} medium, {} low)",
        sections.sensor_health.total_issues,
        sections.sensor_health.high_severity,
        sections.sensor_health.medium_severity,
        sections.sensor_health.low_severity
    );
    for summary in &sections.sensor_health.summary {
        println!("    {:<16} {}", summary.issue_type, summary.description);
    }
    println!(
        "  After-hours excess: {:.1} kWh across {} meter(s)",
        sections.after_hours_waste.summary.total_excess_kwh, sections.after_hours_waste.summary.total_meters_with_excess
    );
    println!(
        "  Anomaly events:     {} ({:.1} kWh excess)",
        sections.anomalies.total_anomaly_events, sections.anomalies.total_excess_kwh
    );
    println!("  Spike events:       {}", sections.spikes.total_spike_events);
    for spike in sections.spikes.top_spikes.iter().take(3) {
        println!(
            "    {:<22} peak {:>6.1} kW at {}",
            spike.channel_name, spike.event.peak_power, spike.event.start
        );
    }

    println!("\n=== Quick Wins ===\n");
    for (i, win) in sections.quick_wins.iter().enumerate() {
        println!("  {}. [{}] {}", i + 1, win.priority.as_str(), win.title);
        println!("     Owner: {} | Effort: {} | Confidence: {}", win.owner, win.effort, win.confidence.as_str());
        if win.impact.annual_cost > 0.0 {
            println!("     Impact: ${:.2}/week, ${:.0}/year", win.impact.weekly_cost, win.impact.annual_cost);
        }
    }

    let savings = &brief.summary.total_potential_savings;
    println!("\n=== Potential Savings ===\n");
    println!("  Weekly energy: {:.1} kWh", savings.weekly_kwh);
    println!("  Weekly cost:   ${:.2}", savings.weekly_cost);
    println!("  Annual cost:   ${:.0}", savings.estimated_annual);

    println!("\n  Data quality: {} channels, {:.1}% average completeness", brief.data_quality.channels_analyzed, brief.data_quality.avg_completeness);

    println!("\n==============================================\n");
    Ok(())
}
