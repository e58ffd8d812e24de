use clap::{Parser, Subcommand};

mod commands;

use commands::{RefreshArgs, StatusArgs};

#[derive(Parser)]
#[command(name = "market-sync")]
#[command(about = "Keeps per-symbol daily market data current", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Fetch missing daily bars for stale entities
    Refresh(RefreshArgs),
    /// Show the freshness of stored datasets without fetching
    Status(StatusArgs),
}

fn env_filter() -> tracing_subscriber::EnvFilter {
    tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    match &cli.command {
        Commands::Refresh(RefreshArgs {
            log_file: Some(path),
            ..
        }) => {
            let file = std::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)?;
            tracing_subscriber::fmt()
                .with_env_filter(env_filter())
                .with_ansi(false)
                .with_writer(std::sync::Mutex::new(file))
                .init();
        }
        _ => {
            tracing_subscriber::fmt().with_env_filter(env_filter()).init();
        }
    }

    match cli.command {
        Commands::Refresh(args) => {
            commands::run_refresh(args).await?;
        }
        Commands::Status(args) => {
            commands::run_status(args).await?;
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_refresh_flags() {
        let cli = Cli::try_parse_from([
            "market-sync",
            "refresh",
            "--symbols",
            "AAPL,MSFT,BTC-USD",
            "--max-concurrency",
            "2",
            "--timeout-secs",
            "600",
            "--min-success-rate",
            "0.75",
            "--log-file",
            "refresh.log",
        ])
        .unwrap();

        let Commands::Refresh(args) = cli.command else {
            panic!("expected refresh");
        };
        assert_eq!(args.symbols, vec!["AAPL", "MSFT", "BTC-USD"]);
        assert_eq!(args.max_concurrency, Some(2));
        assert_eq!(args.timeout_secs, Some(600));
        assert_eq!(args.min_success_rate, Some(0.75));
        assert_eq!(args.config, "config/Config.toml");
        assert_eq!(args.log_file.as_deref(), Some("refresh.log"));
    }

    #[test]
    fn test_parse_status_defaults() {
        let cli = Cli::try_parse_from(["market-sync", "status", "--profile", "dev"]).unwrap();

        let Commands::Status(args) = cli.command else {
            panic!("expected status");
        };
        assert!(args.symbols.is_empty());
        assert_eq!(args.profile.as_deref(), Some("dev"));
    }
}
