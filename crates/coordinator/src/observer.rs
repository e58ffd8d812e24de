//! Progress hooks for coordination runs.

use crate::freshness::FreshnessVerdict;
use crate::outcome::{CoordinationResult, FetchOutcome};

/// Receives progress notifications. All methods default to no-ops.
///
/// Called from worker tasks, so implementations must be thread-safe.
pub trait RunObserver: Send + Sync {
    fn run_started(&self, _entities: &[String], _concurrency: usize) {}

    fn entity_evaluated(&self, _entity: &str, _verdict: &FreshnessVerdict) {}

    fn entity_completed(&self, _outcome: &FetchOutcome) {}

    fn run_finished(&self, _result: &CoordinationResult) {}
}

/// Logs progress through `tracing`.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingObserver;

impl RunObserver for TracingObserver {
    fn run_started(&self, entities: &[String], concurrency: usize) {
        tracing::info!(
            "Starting refresh of {} entities with concurrency {}",
            entities.len(),
            concurrency
        );
    }

    fn entity_evaluated(&self, entity: &str, verdict: &FreshnessVerdict) {
        tracing::debug!(
            entity = %entity,
            reason = %verdict.reason,
            days_since_update = verdict.days_since_update,
            "Freshness evaluated"
        );
    }

    fn entity_completed(&self, outcome: &FetchOutcome) {
        if outcome.success {
            tracing::info!(
                "{}: {} ({} rows added)",
                outcome.entity,
                outcome.action.map_or("done", |a| a.as_str()),
                outcome.rows_added
            );
        } else {
            tracing::warn!(
                "{}: failed [{}] {}",
                outcome.entity,
                outcome.error_category.map_or("unknown", |c| c.as_str()),
                outcome.error_message.as_deref().unwrap_or("")
            );
        }
    }

    fn run_finished(&self, result: &CoordinationResult) {
        if result.overall_success {
            tracing::info!("Refresh finished: {}", result.summary());
        } else {
            tracing::error!("Refresh finished: {}", result.summary());
        }
    }
}
