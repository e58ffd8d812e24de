//! Refresh coordination for the market data sync engine.
//!
//! Decides per entity whether stored daily data is fresh, needs an
//! incremental patch or a full refetch, runs the fetches with bounded
//! concurrency and folds the per-entity outcomes into a run verdict.

pub mod classifier;
pub mod clock;
pub mod concurrency;
pub mod error;
pub mod freshness;
pub mod observer;
pub mod orchestrator;
pub mod outcome;

pub use classifier::{ErrorCategory, ErrorClassifier};
pub use clock::{Clock, FixedClock, SystemClock};
pub use concurrency::{ConcurrencyPlanner, FragmentLimit};
pub use error::{CoordinatorError, EntityError};
pub use freshness::{days_between, FreshnessEvaluator, FreshnessReason, FreshnessVerdict, ThresholdPolicy};
pub use observer::{RunObserver, TracingObserver};
pub use orchestrator::{FetchOrchestrator, OrchestratorSettings};
pub use outcome::{CoordinationResult, FetchAction, FetchOutcome, OutcomeAggregator};
