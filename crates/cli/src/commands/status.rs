//! Status CLI command.
//!
//! Shows, per entity, how old the stored dataset is and what a refresh
//! would do with it. Never contacts the data provider.

use super::{load_config, resolve_entities};
use anyhow::{Context, Result};
use chrono::Utc;
use clap::Args;
use market_sync_coordinator::{FetchOrchestrator, FreshnessVerdict};
use market_sync_data::CsvStorage;
use market_sync_provider::HttpDailyBarClient;
use std::sync::Arc;

/// Arguments for the status command.
#[derive(Args, Debug, Clone)]
pub struct StatusArgs {
    /// Comma-separated entities to inspect (defaults to `entities` in config)
    #[arg(long, value_delimiter = ',')]
    pub symbols: Vec<String>,

    /// Config file path
    #[arg(short, long, default_value = "config/Config.toml")]
    pub config: String,

    /// Config profile, loaded from Config.{profile}.toml next to the config file
    #[arg(long)]
    pub profile: Option<String>,

    /// Data directory override
    #[arg(long)]
    pub data_dir: Option<String>,
}

/// Runs the status command.
///
/// # Errors
/// Returns an error if configuration is invalid or no entities are given.
pub async fn run_status(args: StatusArgs) -> Result<()> {
    let config = load_config(&args.config, args.profile.as_deref(), args.data_dir.as_deref())?;
    let entities = resolve_entities(&args.symbols, &config)?;

    let storage = Arc::new(CsvStorage::from_config(&config.storage));
    let client = Arc::new(
        HttpDailyBarClient::from_config(&config.provider)
            .context("Failed to build data provider client")?,
    );
    let orchestrator = FetchOrchestrator::from_config(client, storage, &config)?;

    let verdicts = orchestrator.plan(&entities, Utc::now()).await?;
    print_status_report(&config.storage.data_dir, &verdicts);

    Ok(())
}

fn planned_action(verdict: &FreshnessVerdict) -> &'static str {
    if !verdict.needs_update {
        "skip"
    } else if verdict.needs_full_refresh {
        "full"
    } else {
        "incremental"
    }
}

fn format_age(days: f64) -> String {
    if days.is_finite() {
        format!("{days:.2}")
    } else {
        "N/A".to_string()
    }
}

fn print_status_report(data_dir: &str, verdicts: &[(String, FreshnessVerdict)]) {
    println!();
    println!("{}", "=".repeat(76));
    println!("DATA FRESHNESS ({data_dir})");
    println!("{}", "=".repeat(76));
    println!(
        "{:<16} {:<20} {:>12} {:>10} {:>12}",
        "Entity", "Reason", "Last Date", "Age (d)", "Next Run"
    );
    println!("{}", "-".repeat(76));

    for (entity, verdict) in verdicts {
        println!(
            "{:<16} {:<20} {:>12} {:>10} {:>12}",
            entity,
            verdict.reason.as_str(),
            verdict
                .last_date
                .map_or_else(|| "N/A".to_string(), |d| d.to_string()),
            format_age(verdict.days_since_update),
            planned_action(verdict)
        );
    }

    let stale = verdicts.iter().filter(|(_, v)| v.needs_update).count();
    println!();
    println!("{} of {} entities need an update", stale, verdicts.len());
    println!();
}
