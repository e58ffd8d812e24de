//! Freshness classification of stored datasets.
//!
//! Decides per entity whether the stored data can be kept, patched with an
//! incremental fetch, or must be refetched in full. Anything unexpected
//! while inspecting storage resolves to a full refresh.

use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use market_sync_core::config::{
    FreshnessConfig, DEFAULT_INCREMENTAL_WINDOW_DAYS, DEFAULT_MIN_FILE_BYTES,
};
use market_sync_core::{Dataset, PersistenceGateway, StorageError};
use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

const SECONDS_PER_DAY: f64 = 86_400.0;

/// Maximum staleness per entity, in days.
///
/// Lookup order: exact symbol override, then the longest matching suffix
/// override, then the default. Matching ignores ASCII case.
#[derive(Debug, Clone)]
pub struct ThresholdPolicy {
    default_days: f64,
    symbol_overrides: BTreeMap<String, f64>,
    suffix_overrides: BTreeMap<String, f64>,
}

impl ThresholdPolicy {
    #[must_use]
    pub fn new(default_days: f64) -> Self {
        Self {
            default_days,
            symbol_overrides: BTreeMap::new(),
            suffix_overrides: BTreeMap::new(),
        }
    }

    #[must_use]
    pub fn from_config(config: &FreshnessConfig) -> Self {
        let mut policy = Self::new(config.default_threshold_days);
        for (symbol, days) in &config.symbol_overrides {
            policy = policy.with_symbol(symbol, *days);
        }
        for (suffix, days) in &config.suffix_overrides {
            policy = policy.with_suffix(suffix, *days);
        }
        policy
    }

    #[must_use]
    pub fn with_symbol(mut self, symbol: &str, days: f64) -> Self {
        self.symbol_overrides.insert(symbol.trim().to_ascii_uppercase(), days);
        self
    }

    #[must_use]
    pub fn with_suffix(mut self, suffix: &str, days: f64) -> Self {
        self.suffix_overrides.insert(suffix.trim().to_ascii_uppercase(), days);
        self
    }

    #[must_use]
    pub fn threshold_for(&self, entity: &str) -> f64 {
        let key = entity.trim().to_ascii_uppercase();

        if let Some(days) = self.symbol_overrides.get(&key) {
            return *days;
        }

        self.suffix_overrides
            .iter()
            .filter(|(suffix, _)| !suffix.is_empty() && key.ends_with(suffix.as_str()))
            .max_by_key(|(suffix, _)| suffix.len())
            .map_or(self.default_days, |(_, days)| *days)
    }
}

impl Default for ThresholdPolicy {
    fn default() -> Self {
        Self::from_config(&FreshnessConfig::default())
    }
}

/// Why an entity does or does not need fetching.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum FreshnessReason {
    NoExistingData,
    CorruptedFile,
    EmptyDataset,
    NoDateColumn,
    DataFresh,
    IncrementalUpdate,
    DataStale,
    AnalysisError,
}

impl FreshnessReason {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::NoExistingData => "no_existing_data",
            Self::CorruptedFile => "corrupted_file",
            Self::EmptyDataset => "empty_dataset",
            Self::NoDateColumn => "no_date_column",
            Self::DataFresh => "data_fresh",
            Self::IncrementalUpdate => "incremental_update",
            Self::DataStale => "data_stale",
            Self::AnalysisError => "analysis_error",
        }
    }
}

impl fmt::Display for FreshnessReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Classification of one entity's stored dataset.
///
/// Constructors keep `needs_full_refresh ⇒ needs_update` and
/// `reason == DataFresh ⇔ !needs_update`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FreshnessVerdict {
    pub needs_update: bool,
    pub needs_full_refresh: bool,
    pub reason: FreshnessReason,
    pub last_date: Option<NaiveDate>,
    /// Fractional days since `last_date`; infinite when there is no usable data.
    pub days_since_update: f64,
}

impl FreshnessVerdict {
    #[must_use]
    pub fn full_refresh(reason: FreshnessReason) -> Self {
        Self {
            needs_update: true,
            needs_full_refresh: true,
            reason,
            last_date: None,
            days_since_update: f64::INFINITY,
        }
    }

    /// Classifies a known last date against `threshold` and the incremental window.
    #[must_use]
    pub fn from_age(
        last_date: NaiveDate,
        days_since_update: f64,
        threshold: f64,
        incremental_window_days: f64,
    ) -> Self {
        let (needs_update, needs_full_refresh, reason) = if days_since_update <= threshold {
            (false, false, FreshnessReason::DataFresh)
        } else if days_since_update <= incremental_window_days {
            (true, false, FreshnessReason::IncrementalUpdate)
        } else {
            (true, true, FreshnessReason::DataStale)
        };

        Self {
            needs_update,
            needs_full_refresh,
            reason,
            last_date: Some(last_date),
            days_since_update,
        }
    }
}

/// Fractional days between midnight UTC of `last_date` and `now`.
#[must_use]
pub fn days_between(last_date: NaiveDate, now: DateTime<Utc>) -> f64 {
    let start = last_date.and_time(NaiveTime::MIN).and_utc();
    (now - start).num_seconds() as f64 / SECONDS_PER_DAY
}

pub struct FreshnessEvaluator {
    gateway: Arc<dyn PersistenceGateway>,
    policy: ThresholdPolicy,
    min_file_bytes: u64,
    incremental_window_days: f64,
}

impl FreshnessEvaluator {
    #[must_use]
    pub fn new(gateway: Arc<dyn PersistenceGateway>, policy: ThresholdPolicy) -> Self {
        Self {
            gateway,
            policy,
            min_file_bytes: DEFAULT_MIN_FILE_BYTES,
            incremental_window_days: DEFAULT_INCREMENTAL_WINDOW_DAYS,
        }
    }

    #[must_use]
    pub fn from_config(
        gateway: Arc<dyn PersistenceGateway>,
        freshness: &FreshnessConfig,
        incremental_window_days: f64,
    ) -> Self {
        Self::new(gateway, ThresholdPolicy::from_config(freshness))
            .with_min_file_bytes(freshness.min_file_bytes)
            .with_incremental_window_days(incremental_window_days)
    }

    #[must_use]
    pub fn with_min_file_bytes(mut self, min_file_bytes: u64) -> Self {
        self.min_file_bytes = min_file_bytes;
        self
    }

    #[must_use]
    pub fn with_incremental_window_days(mut self, days: f64) -> Self {
        self.incremental_window_days = days;
        self
    }

    /// Classifies the stored dataset for `entity` as of `now`.
    pub async fn evaluate(&self, entity: &str, now: DateTime<Utc>) -> FreshnessVerdict {
        self.inspect(entity, now).await.0
    }

    /// Like [`evaluate`](Self::evaluate), also returning the dataset that
    /// was read so callers can merge into it without reading twice.
    pub async fn inspect(
        &self,
        entity: &str,
        now: DateTime<Utc>,
    ) -> (FreshnessVerdict, Option<Dataset>) {
        match self.try_inspect(entity, now).await {
            Ok(inspection) => inspection,
            Err(StorageError::MissingDateColumn { .. }) => {
                (FreshnessVerdict::full_refresh(FreshnessReason::NoDateColumn), None)
            }
            Err(err) => {
                tracing::warn!("Freshness check failed for {}: {}", entity, err);
                (FreshnessVerdict::full_refresh(FreshnessReason::AnalysisError), None)
            }
        }
    }

    async fn try_inspect(
        &self,
        entity: &str,
        now: DateTime<Utc>,
    ) -> Result<(FreshnessVerdict, Option<Dataset>), StorageError> {
        let Some(size) = self.gateway.stored_size(entity).await? else {
            return Ok((FreshnessVerdict::full_refresh(FreshnessReason::NoExistingData), None));
        };
        if size < self.min_file_bytes {
            return Ok((FreshnessVerdict::full_refresh(FreshnessReason::CorruptedFile), None));
        }

        let Some(dataset) = self.gateway.read_existing(entity).await? else {
            return Ok((FreshnessVerdict::full_refresh(FreshnessReason::NoExistingData), None));
        };
        let Some(last_date) = dataset.last_date() else {
            return Ok((FreshnessVerdict::full_refresh(FreshnessReason::EmptyDataset), None));
        };

        let verdict = FreshnessVerdict::from_age(
            last_date,
            days_between(last_date, now),
            self.policy.threshold_for(entity),
            self.incremental_window_days,
        );
        Ok((verdict, Some(dataset)))
    }
}
