use crate::config::AppConfig;
use anyhow::{Context, Result};
use figment::{
    providers::{Env, Format, Json, Toml},
    Figment,
};
use std::path::Path;

/// Prefix for environment overrides, e.g. `MARKET_SYNC_COORDINATOR__MIN_SUCCESS_RATE`.
pub const ENV_PREFIX: &str = "MARKET_SYNC_";

pub struct ConfigLoader;

impl ConfigLoader {
    /// Loads application configuration by merging TOML, environment variables, and JSON.
    ///
    /// # Errors
    ///
    /// Returns an error if configuration files cannot be read or parsed.
    pub fn load() -> Result<AppConfig> {
        Self::load_from("config/Config.toml", None)
    }

    /// Loads application configuration with a specific profile.
    ///
    /// # Errors
    ///
    /// Returns an error if configuration files cannot be read or parsed.
    pub fn load_with_profile(profile: &str) -> Result<AppConfig> {
        Self::load_from("config/Config.toml", Some(profile))
    }

    /// Loads configuration rooted at an explicit TOML file.
    ///
    /// A profile file sits next to the base file as `Config.{profile}.toml`,
    /// and `Config.json` in the same directory is joined last. Missing files
    /// are skipped, so an empty directory yields the defaults.
    ///
    /// # Errors
    ///
    /// Returns an error if a present file cannot be parsed or a value has the wrong type.
    pub fn load_from(path: impl AsRef<Path>, profile: Option<&str>) -> Result<AppConfig> {
        let path = path.as_ref();
        let dir = path.parent().unwrap_or_else(|| Path::new("."));

        let mut figment = Figment::new().merge(Toml::file(path));

        if let Some(profile) = profile {
            figment = figment.merge(Toml::file(dir.join(format!("Config.{profile}.toml"))));
        }

        let config: AppConfig = figment
            .merge(Env::prefixed(ENV_PREFIX).split("__"))
            .join(Json::file(dir.join("Config.json")))
            .extract()
            .with_context(|| format!("Failed to load configuration from {}", path.display()))?;

        tracing::debug!(
            "Loaded configuration from {} (profile: {})",
            path.display(),
            profile.unwrap_or("none")
        );

        Ok(config)
    }
}
