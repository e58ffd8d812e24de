//! CLI commands for the market data sync engine.

pub mod refresh;
pub mod status;

pub use refresh::{run_refresh, RefreshArgs};
pub use status::{run_status, StatusArgs};

use anyhow::{bail, Context, Result};
use market_sync_core::{AppConfig, ConfigLoader};

/// Loads configuration and applies a data directory override.
fn load_config(path: &str, profile: Option<&str>, data_dir: Option<&str>) -> Result<AppConfig> {
    let mut config = ConfigLoader::load_from(path, profile)
        .with_context(|| format!("Cannot load config {path}"))?;
    if let Some(dir) = data_dir {
        config.storage.data_dir = dir.to_string();
    }
    Ok(config)
}

/// Entities from `--symbols`, falling back to `entities` in config.
fn resolve_entities(symbols: &[String], config: &AppConfig) -> Result<Vec<String>> {
    let source = if symbols.is_empty() {
        &config.entities
    } else {
        symbols
    };

    let entities: Vec<String> = source
        .iter()
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect();

    if entities.is_empty() {
        bail!("No entities to process: pass --symbols or set `entities` in the config file");
    }
    Ok(entities)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config_with(entities: &[&str]) -> AppConfig {
        AppConfig {
            entities: entities.iter().map(|e| e.to_string()).collect(),
            ..AppConfig::default()
        }
    }

    #[test]
    fn test_symbols_take_precedence() {
        let config = config_with(&["SPY", "QQQ"]);
        let symbols = vec!["AAPL".to_string(), " MSFT ".to_string()];

        let entities = resolve_entities(&symbols, &config).unwrap();
        assert_eq!(entities, vec!["AAPL", "MSFT"]);
    }

    #[test]
    fn test_falls_back_to_config() {
        let config = config_with(&["SPY", "QQQ"]);
        let entities = resolve_entities(&[], &config).unwrap();
        assert_eq!(entities, vec!["SPY", "QQQ"]);
    }

    #[test]
    fn test_empty_entity_set_is_error() {
        let config = config_with(&[]);
        let err = resolve_entities(&["  ".to_string()], &config).unwrap_err();
        assert!(err.to_string().contains("No entities"));
    }

    #[test]
    fn test_missing_config_file_yields_defaults() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("Config.toml");

        let config = load_config(path.to_str().unwrap(), None, Some("/srv/bars")).unwrap();
        assert_eq!(config.storage.data_dir, "/srv/bars");
        assert_eq!(config.coordinator.default_max_concurrency, 3);
    }
}
