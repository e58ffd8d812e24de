use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Default number of simultaneous fetches when no fragment declares a limit.
pub const DEFAULT_MAX_CONCURRENCY: usize = 3;

/// Minimum fraction of entities that must succeed for a run to pass.
pub const DEFAULT_MIN_SUCCESS_RATE: f64 = 0.6;

/// Datasets older than this many days are refetched in full instead of patched.
pub const DEFAULT_INCREMENTAL_WINDOW_DAYS: f64 = 30.0;

/// Lookback used for full refreshes (five years of daily bars).
pub const DEFAULT_FULL_LOOKBACK_DAYS: i64 = 5 * 365;

/// Staleness threshold for entities without an override.
pub const DEFAULT_THRESHOLD_DAYS: f64 = 1.0;

/// Threshold for continuously traded pairs.
pub const CONTINUOUS_MARKET_THRESHOLD_DAYS: f64 = 0.5;

/// Stored files smaller than this are treated as corrupted.
pub const DEFAULT_MIN_FILE_BYTES: u64 = 100;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub coordinator: CoordinatorConfig,
    pub freshness: FreshnessConfig,
    pub storage: StorageConfig,
    pub provider: ProviderConfig,
    /// Entities refreshed when none are given on the command line.
    pub entities: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CoordinatorConfig {
    pub default_max_concurrency: usize,
    pub min_success_rate: f64,
    /// Upper bound on the wall-clock time of a whole run.
    pub run_timeout_secs: Option<u64>,
    pub full_lookback_days: i64,
    pub incremental_window_days: f64,
    /// Directory scanned for fragments declaring `max_concurrency`.
    pub fragments_dir: Option<String>,
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        Self {
            default_max_concurrency: DEFAULT_MAX_CONCURRENCY,
            min_success_rate: DEFAULT_MIN_SUCCESS_RATE,
            run_timeout_secs: None,
            full_lookback_days: DEFAULT_FULL_LOOKBACK_DAYS,
            incremental_window_days: DEFAULT_INCREMENTAL_WINDOW_DAYS,
            fragments_dir: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FreshnessConfig {
    pub default_threshold_days: f64,
    pub min_file_bytes: u64,
    /// Exact entity overrides, e.g. `SPY = 2.0`.
    pub symbol_overrides: BTreeMap<String, f64>,
    /// Overrides by entity suffix, e.g. `"-USD" = 0.5`.
    pub suffix_overrides: BTreeMap<String, f64>,
}

impl Default for FreshnessConfig {
    fn default() -> Self {
        let mut suffix_overrides = BTreeMap::new();
        suffix_overrides.insert("-USD".to_string(), CONTINUOUS_MARKET_THRESHOLD_DAYS);
        suffix_overrides.insert("USDT".to_string(), CONTINUOUS_MARKET_THRESHOLD_DAYS);

        Self {
            default_threshold_days: DEFAULT_THRESHOLD_DAYS,
            min_file_bytes: DEFAULT_MIN_FILE_BYTES,
            symbol_overrides: BTreeMap::new(),
            suffix_overrides,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    pub data_dir: String,
    /// Keep a `.bak` copy of the previous file after a successful write.
    pub keep_backup: bool,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            data_dir: "data/daily".to_string(),
            keep_backup: true,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ProviderConfig {
    pub base_url: String,
    pub api_key: Option<String>,
    pub requests_per_minute: u32,
    pub timeout_secs: u64,
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:8900".to_string(),
            api_key: None,
            requests_per_minute: 60,
            timeout_secs: 30,
        }
    }
}
