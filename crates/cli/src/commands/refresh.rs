//! Refresh CLI command.
//!
//! Brings every configured entity's daily dataset up to date, fetching only
//! what is missing, and fails the process when too many entities fail.

use super::{load_config, resolve_entities};
use anyhow::{bail, Context, Result};
use clap::Args;
use market_sync_coordinator::{
    CoordinationResult, FetchOrchestrator, FetchOutcome, FreshnessEvaluator, OrchestratorSettings,
};
use market_sync_core::AppConfig;
use market_sync_data::CsvStorage;
use market_sync_provider::HttpDailyBarClient;
use std::sync::Arc;

/// Arguments for the refresh command.
#[derive(Args, Debug, Clone)]
pub struct RefreshArgs {
    /// Comma-separated entities to refresh (defaults to `entities` in config)
    #[arg(long, value_delimiter = ',')]
    pub symbols: Vec<String>,

    /// Config file path
    #[arg(short, long, default_value = "config/Config.toml")]
    pub config: String,

    /// Config profile, loaded from Config.{profile}.toml next to the config file
    #[arg(long)]
    pub profile: Option<String>,

    /// Upper bound on simultaneous fetches (the smallest declared limit wins)
    #[arg(long)]
    pub max_concurrency: Option<usize>,

    /// Abort the run after this many seconds; unfinished entities fail
    #[arg(long)]
    pub timeout_secs: Option<u64>,

    /// Minimum fraction of entities that must succeed (0.0 - 1.0)
    #[arg(long)]
    pub min_success_rate: Option<f64>,

    /// Data directory override
    #[arg(long)]
    pub data_dir: Option<String>,

    /// Optional log file path (logs to file instead of stderr)
    #[arg(long)]
    pub log_file: Option<String>,
}

impl RefreshArgs {
    fn apply_overrides(&self, config: &mut AppConfig) {
        if let Some(rate) = self.min_success_rate {
            config.coordinator.min_success_rate = rate;
        }
        if let Some(secs) = self.timeout_secs {
            config.coordinator.run_timeout_secs = Some(secs);
        }
    }
}

/// Runs the refresh command.
///
/// # Errors
/// Returns an error if configuration is invalid, no entities are given, the
/// coordinator cannot run, or the run's success rate is below the minimum.
pub async fn run_refresh(args: RefreshArgs) -> Result<()> {
    let mut config = load_config(&args.config, args.profile.as_deref(), args.data_dir.as_deref())?;
    args.apply_overrides(&mut config);
    let entities = resolve_entities(&args.symbols, &config)?;

    let mut settings = OrchestratorSettings::from_config(&config.coordinator)?;
    if let Some(max) = args.max_concurrency {
        settings = settings.with_max_concurrency(max);
    }

    let storage = Arc::new(CsvStorage::from_config(&config.storage));
    let client = HttpDailyBarClient::from_config(&config.provider)
        .context("Failed to build data provider client")?;
    let evaluator = FreshnessEvaluator::from_config(
        storage.clone(),
        &config.freshness,
        config.coordinator.incremental_window_days,
    );

    tracing::info!(
        "Refreshing {} entities into {} from {}",
        entities.len(),
        config.storage.data_dir,
        client.base_url()
    );

    let orchestrator = FetchOrchestrator::new(Arc::new(client), storage, evaluator, settings);
    let result = orchestrator.run(&entities).await?;

    print_report(&result);

    if !result.overall_success {
        bail!(
            "Refresh failed: success rate {:.1}% is below the minimum {:.1}%",
            result.success_rate * 100.0,
            orchestrator.settings().min_success_rate * 100.0
        );
    }

    Ok(())
}

fn format_outcome_row(outcome: &FetchOutcome) -> String {
    format!(
        "{:<16} {:<8} {:<12} {:>8} {:<20}",
        outcome.entity,
        if outcome.success { "ok" } else { "FAILED" },
        outcome.action.map_or("-", |a| a.as_str()),
        outcome.rows_added,
        outcome.freshness.map_or("-", |r| r.as_str()),
    )
}

fn print_report(result: &CoordinationResult) {
    println!();
    println!("{}", "=".repeat(70));
    println!("REFRESH REPORT");
    println!("{}", "=".repeat(70));
    println!(
        "{:<16} {:<8} {:<12} {:>8} {:<20}",
        "Entity", "Status", "Action", "Rows", "Freshness"
    );
    println!("{}", "-".repeat(70));

    for outcome in &result.outcomes {
        println!("{}", format_outcome_row(outcome));
    }

    let failures: Vec<&FetchOutcome> = result.failures().collect();
    if !failures.is_empty() {
        println!();
        println!("Failures:");
        for outcome in failures {
            println!(
                "  {} [{}] {}",
                outcome.entity,
                outcome.error_category.map_or("unknown", |c| c.as_str()),
                outcome.error_message.as_deref().unwrap_or("")
            );
        }
    }

    println!();
    println!("{}", result.summary());
    println!();
}
