//! Bounded-concurrency refresh of many entities.
//!
//! Every entity runs in its own task behind a shared semaphore. Tasks never
//! touch shared state: each sends exactly one outcome over a channel and the
//! run loop is the only consumer. A failing or panicking task is isolated to
//! its own entity.

use crate::classifier::{ErrorCategory, ErrorClassifier};
use crate::clock::{Clock, SystemClock};
use crate::concurrency::ConcurrencyPlanner;
use crate::error::{CoordinatorError, EntityError};
use crate::freshness::{FreshnessEvaluator, FreshnessVerdict};
use crate::observer::{RunObserver, TracingObserver};
use crate::outcome::{CoordinationResult, FetchAction, FetchOutcome, OutcomeAggregator};
use chrono::{DateTime, Duration as ChronoDuration, NaiveDate, Utc};
use market_sync_core::config::{
    CoordinatorConfig, DEFAULT_FULL_LOOKBACK_DAYS, DEFAULT_MAX_CONCURRENCY,
    DEFAULT_MIN_SUCCESS_RATE,
};
use market_sync_core::{AppConfig, Dataset, FetchClient, FetchError, PersistenceGateway};
use market_sync_data::{DataMerger, MergeReport};
use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{mpsc, Semaphore};
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};

/// Run-level knobs for [`FetchOrchestrator`].
#[derive(Debug, Clone)]
pub struct OrchestratorSettings {
    /// Pool size when nothing declares a limit.
    pub default_max_concurrency: usize,
    /// Declared `max_concurrency` values; the smallest wins.
    pub declared_limits: Vec<usize>,
    pub min_success_rate: f64,
    pub run_timeout: Option<Duration>,
    pub full_lookback_days: i64,
}

impl Default for OrchestratorSettings {
    fn default() -> Self {
        Self {
            default_max_concurrency: DEFAULT_MAX_CONCURRENCY,
            declared_limits: Vec::new(),
            min_success_rate: DEFAULT_MIN_SUCCESS_RATE,
            run_timeout: None,
            full_lookback_days: DEFAULT_FULL_LOOKBACK_DAYS,
        }
    }
}

impl OrchestratorSettings {
    /// Builds settings from config, reading concurrency fragments if a
    /// fragments directory is configured.
    ///
    /// # Errors
    /// Returns an error if a fragment cannot be read or a value is out of range.
    pub fn from_config(config: &CoordinatorConfig) -> Result<Self, CoordinatorError> {
        let declared_limits = match &config.fragments_dir {
            Some(dir) => ConcurrencyPlanner::discover(Path::new(dir))?
                .into_iter()
                .map(|limit| limit.max_concurrency)
                .collect(),
            None => Vec::new(),
        };

        let settings = Self {
            default_max_concurrency: config.default_max_concurrency,
            declared_limits,
            min_success_rate: config.min_success_rate,
            run_timeout: config.run_timeout_secs.map(Duration::from_secs),
            full_lookback_days: config.full_lookback_days,
        };
        settings.validate()?;
        Ok(settings)
    }

    /// Adds one more `max_concurrency` declaration.
    #[must_use]
    pub fn with_max_concurrency(mut self, max_concurrency: usize) -> Self {
        self.declared_limits.push(max_concurrency);
        self
    }

    #[must_use]
    pub fn with_min_success_rate(mut self, rate: f64) -> Self {
        self.min_success_rate = rate;
        self
    }

    #[must_use]
    pub fn with_run_timeout(mut self, timeout: Duration) -> Self {
        self.run_timeout = Some(timeout);
        self
    }

    #[must_use]
    pub fn configured_max(&self) -> Option<usize> {
        ConcurrencyPlanner::most_conservative(&self.declared_limits)
    }

    /// # Errors
    /// Returns [`CoordinatorError::InvalidSetting`] for out-of-range values.
    pub fn validate(&self) -> Result<(), CoordinatorError> {
        if !(0.0..=1.0).contains(&self.min_success_rate) {
            return Err(CoordinatorError::InvalidSetting(format!(
                "min_success_rate must be within [0, 1], got {}",
                self.min_success_rate
            )));
        }
        if self.full_lookback_days < 1 {
            return Err(CoordinatorError::InvalidSetting(format!(
                "full_lookback_days must be at least 1, got {}",
                self.full_lookback_days
            )));
        }
        if self.run_timeout.is_some_and(|t| t.is_zero()) {
            return Err(CoordinatorError::InvalidSetting(
                "run_timeout must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }
}

/// Everything one entity task needs. Cheap to clone into each task.
#[derive(Clone)]
struct EntityWorker {
    client: Arc<dyn FetchClient>,
    gateway: Arc<dyn PersistenceGateway>,
    evaluator: Arc<FreshnessEvaluator>,
    observer: Arc<dyn RunObserver>,
    clock: Arc<dyn Clock>,
    full_lookback_days: i64,
}

impl EntityWorker {
    async fn process(&self, entity: &str) -> FetchOutcome {
        let now = self.clock.now();
        let today = now.date_naive();

        let (verdict, existing) = self.evaluator.inspect(entity, now).await;
        self.observer.entity_evaluated(entity, &verdict);

        if !verdict.needs_update {
            debug!("{} is fresh ({:.2} days old), skipping", entity, verdict.days_since_update);
            return FetchOutcome::succeeded(entity, FetchAction::Skipped, 0, verdict.reason);
        }

        let (action, result) = match verdict.last_date {
            Some(last_date) if !verdict.needs_full_refresh => (
                FetchAction::Incremental,
                self.incremental(entity, last_date, existing, today).await,
            ),
            _ => (FetchAction::Full, self.full_refresh(entity, today).await),
        };

        match result {
            Ok(rows_added) => FetchOutcome::succeeded(entity, action, rows_added, verdict.reason),
            Err(err) => FetchOutcome::failed_with_category(
                entity,
                err.to_string(),
                ErrorClassifier::categorize(&err),
            )
            .during(action, verdict.reason),
        }
    }

    async fn full_refresh(&self, entity: &str, today: NaiveDate) -> Result<usize, EntityError> {
        let start = today - ChronoDuration::days(self.full_lookback_days);
        debug!("{}: full fetch {} to {}", entity, start, today);

        let records = self.client.fetch_full(entity, start, today).await?;
        if records.is_empty() {
            return Err(FetchError::no_data(entity).into());
        }

        let report = DataMerger::merge(None, Dataset::new(records));
        self.persist(entity, &report).await?;
        Ok(report.rows_added)
    }

    async fn incremental(
        &self,
        entity: &str,
        last_date: NaiveDate,
        existing: Option<Dataset>,
        today: NaiveDate,
    ) -> Result<usize, EntityError> {
        let Some(since) = last_date.succ_opt().filter(|since| *since <= today) else {
            debug!("{}: nothing to fetch after {}", entity, last_date);
            return Ok(0);
        };
        debug!("{}: incremental fetch {} to {}", entity, since, today);

        let records = self.client.fetch_incremental(entity, since, today).await?;
        if records.is_empty() {
            info!("{}: no new records since {}", entity, last_date);
            return Ok(0);
        }

        let existing = match existing {
            Some(dataset) => Some(dataset),
            None => self.gateway.read_existing(entity).await?,
        };

        let report = DataMerger::merge(existing.as_ref(), Dataset::new(records));
        if report.rows_added == 0 {
            debug!(
                "{}: all {} fetched records already stored",
                entity, report.duplicates_dropped
            );
            return Ok(0);
        }

        self.persist(entity, &report).await?;
        Ok(report.rows_added)
    }

    async fn persist(&self, entity: &str, report: &MergeReport) -> Result<(), EntityError> {
        let receipt = self.gateway.write_atomic(entity, &report.dataset).await?;
        debug!(
            "{}: stored {} records ({} bytes), {} added, {} duplicates dropped",
            entity,
            receipt.records,
            receipt.size_bytes,
            report.rows_added,
            report.duplicates_dropped
        );
        Ok(())
    }
}

/// Coordinates freshness checks, fetches and writes for a set of entities.
pub struct FetchOrchestrator {
    worker: EntityWorker,
    settings: OrchestratorSettings,
}

impl FetchOrchestrator {
    #[must_use]
    pub fn new(
        client: Arc<dyn FetchClient>,
        gateway: Arc<dyn PersistenceGateway>,
        evaluator: FreshnessEvaluator,
        settings: OrchestratorSettings,
    ) -> Self {
        Self {
            worker: EntityWorker {
                client,
                gateway,
                evaluator: Arc::new(evaluator),
                observer: Arc::new(TracingObserver),
                clock: Arc::new(SystemClock),
                full_lookback_days: settings.full_lookback_days,
            },
            settings,
        }
    }

    /// Wires an orchestrator from application config.
    ///
    /// # Errors
    /// Returns an error if the coordinator settings are invalid.
    pub fn from_config(
        client: Arc<dyn FetchClient>,
        gateway: Arc<dyn PersistenceGateway>,
        config: &AppConfig,
    ) -> Result<Self, CoordinatorError> {
        let settings = OrchestratorSettings::from_config(&config.coordinator)?;
        let evaluator = FreshnessEvaluator::from_config(
            Arc::clone(&gateway),
            &config.freshness,
            config.coordinator.incremental_window_days,
        );
        Ok(Self::new(client, gateway, evaluator, settings))
    }

    #[must_use]
    pub fn with_observer(mut self, observer: Arc<dyn RunObserver>) -> Self {
        self.worker.observer = observer;
        self
    }

    #[must_use]
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.worker.clock = clock;
        self
    }

    #[must_use]
    pub fn settings(&self) -> &OrchestratorSettings {
        &self.settings
    }

    /// Normalizes the entity set and rejects entities the gateway would store
    /// in the same place.
    fn prepare_entities(&self, entities: &[String]) -> Result<Vec<String>, CoordinatorError> {
        let entities = normalize_entities(entities);
        if entities.is_empty() {
            return Err(CoordinatorError::NoEntities);
        }

        let mut owners: BTreeMap<String, &str> = BTreeMap::new();
        for entity in &entities {
            let key = self.worker.gateway.storage_key(entity);
            if let Some(first) = owners.get(&key) {
                return Err(CoordinatorError::StorageCollision {
                    first: (*first).to_string(),
                    second: entity.clone(),
                    key,
                });
            }
            owners.insert(key, entity);
        }

        Ok(entities)
    }

    /// Freshness verdict for each entity, without fetching anything.
    ///
    /// # Errors
    /// Returns [`CoordinatorError::NoEntities`] for an empty entity set and
    /// [`CoordinatorError::StorageCollision`] when two entities share storage.
    pub async fn plan(
        &self,
        entities: &[String],
        now: DateTime<Utc>,
    ) -> Result<Vec<(String, FreshnessVerdict)>, CoordinatorError> {
        let entities = self.prepare_entities(entities)?;

        let mut verdicts = Vec::with_capacity(entities.len());
        for entity in entities {
            let verdict = self.worker.evaluator.evaluate(&entity, now).await;
            verdicts.push((entity, verdict));
        }
        Ok(verdicts)
    }

    /// Refreshes every entity and aggregates the outcomes.
    ///
    /// Entity failures never fail the run; they are reported in the result.
    ///
    /// # Errors
    /// Returns an error for an empty entity set, invalid settings, entities
    /// sharing a storage key, or if the worker pool breaks down.
    pub async fn run(&self, entities: &[String]) -> Result<CoordinationResult, CoordinatorError> {
        self.settings.validate()?;
        let entities = self.prepare_entities(entities)?;

        let concurrency = ConcurrencyPlanner::plan(
            entities.len(),
            self.settings.configured_max(),
            self.settings.default_max_concurrency,
        );
        let observer = &self.worker.observer;
        observer.run_started(&entities, concurrency);

        let started = Instant::now();
        let deadline = self
            .settings
            .run_timeout
            .map(|limit| tokio::time::Instant::now() + limit);

        let permits = Arc::new(Semaphore::new(concurrency));
        let (tx, mut rx) = mpsc::channel(entities.len());
        let mut tasks = JoinSet::new();

        for entity in &entities {
            let worker = self.worker.clone();
            let permits = Arc::clone(&permits);
            let tx = tx.clone();
            let entity = entity.clone();

            tasks.spawn(async move {
                let message = match permits.acquire_owned().await {
                    Ok(_permit) => Ok(worker.process(&entity).await),
                    Err(e) => Err(CoordinatorError::WorkerPool(e.to_string())),
                };
                // the receiver is gone once the deadline has passed
                let _ = tx.send(message).await;
            });
        }
        drop(tx);

        let mut outcomes: BTreeMap<String, FetchOutcome> = BTreeMap::new();
        let collect = async {
            while let Some(message) = rx.recv().await {
                let outcome = message?;
                observer.entity_completed(&outcome);
                outcomes.insert(outcome.entity.clone(), outcome);
            }
            Ok::<(), CoordinatorError>(())
        };

        let timed_out = match deadline {
            Some(deadline) => match tokio::time::timeout_at(deadline, collect).await {
                Ok(collected) => {
                    collected?;
                    false
                }
                Err(_) => true,
            },
            None => {
                collect.await?;
                false
            }
        };

        if timed_out {
            warn!(
                "Run deadline reached with {} of {} entities completed, aborting the rest",
                outcomes.len(),
                entities.len()
            );
            tasks.abort_all();
        }

        while let Some(joined) = tasks.join_next().await {
            if let Err(e) = joined {
                if e.is_panic() {
                    error!("Fetch task panicked: {}", e);
                }
            }
        }

        // outcomes sent right at the deadline are still valid
        while let Ok(Ok(outcome)) = rx.try_recv() {
            observer.entity_completed(&outcome);
            outcomes.insert(outcome.entity.clone(), outcome);
        }

        for entity in &entities {
            if outcomes.contains_key(entity) {
                continue;
            }
            let outcome = if timed_out {
                FetchOutcome::failed_with_category(
                    entity,
                    format!("run deadline reached before {entity} completed"),
                    ErrorCategory::ServiceUnavailable,
                )
            } else {
                FetchOutcome::failed_with_category(
                    entity,
                    format!("fetch task for {entity} terminated without reporting an outcome"),
                    ErrorCategory::ServiceError,
                )
            };
            observer.entity_completed(&outcome);
            outcomes.insert(entity.clone(), outcome);
        }

        let duration_seconds = started.elapsed().as_secs_f64();
        let result = OutcomeAggregator::new(self.settings.min_success_rate)
            .aggregate(outcomes.into_values().collect(), duration_seconds);

        observer.run_finished(&result);
        Ok(result)
    }
}

/// Trims names, drops blanks and repeats, keeps first-seen order.
fn normalize_entities(entities: &[String]) -> Vec<String> {
    let mut seen = BTreeSet::new();
    entities
        .iter()
        .map(|e| e.trim())
        .filter(|e| !e.is_empty() && seen.insert(e.to_string()))
        .map(str::to_string)
        .collect()
}
