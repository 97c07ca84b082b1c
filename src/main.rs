//! Energy Brief - command line entry point
//!
//! Reads a site document with report and baseline readings, runs the weekly
//! analytics and writes the brief as JSON.

use anyhow::{Context, Result};
use chrono::Utc;
use clap::Parser;
use energy_brief_lib::brief::{generate_weekly_brief, SiteDocument};
use energy_brief_lib::core::Config;
use std::fs;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "energy-brief", version, about = "Weekly energy analytics brief for a metered site")]
struct Args {
    /// Site document: {reportData, baselineData, intervalSeconds, siteChannelId?, period?}
    #[arg(long)]
    input: PathBuf,
    /// TOML configuration overrides (defaults to the user config file when present)
    #[arg(long)]
    config: Option<PathBuf>,
    /// Inline JSON overrides applied last, e.g. '{"tariff": {"defaultRate": 0.18}}'
    #[arg(long)]
    overrides: Option<String>,
    /// Output path for the brief (stdout when omitted)
    #[arg(long)]
    output: Option<PathBuf>,
}

fn load_config(args: &Args) -> Result<Config> {
    let mut config = match &args.config {
        Some(path) => Config::load(path).with_context(|| format!("loading config {}", path.display()))?,
        None => Config::load_default().context("loading default config")?,
    };

    if let Some(raw) = &args.overrides {
        let overrides: serde_json::Value = serde_json::from_str(raw).context("parsing --overrides JSON")?;
        config = config.merged_with(&overrides)?;
    }

    config.tz()?;
    Ok(config)
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = Args::parse();
    let config = load_config(&args)?;

    let raw = fs::read_to_string(&args.input).with_context(|| format!("reading {}", args.input.display()))?;
    let document: SiteDocument =
        serde_json::from_str(&raw).with_context(|| format!("parsing site document {}", args.input.display()))?;

    let request = document.into_request(&config, Utc::now())?;
    let brief = generate_weekly_brief(&request, &config)?;
    let json = serde_json::to_string_pretty(&brief)?;

    match &args.output {
        Some(path) => {
            fs::write(path, json).with_context(|| format!("writing {}", path.display()))?;
            log::info!("Brief written to {}", path.display());
        }
        None => println!("{}", json),
    }

    Ok(())
}
