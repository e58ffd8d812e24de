//! Per-entity outcomes and their aggregation into a run result.

use crate::classifier::{ErrorCategory, ErrorClassifier};
use crate::freshness::FreshnessReason;
use market_sync_core::config::DEFAULT_MIN_SUCCESS_RATE;
use serde::Serialize;
use std::collections::BTreeSet;
use std::fmt;

/// What the coordinator did for an entity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum FetchAction {
    /// Stored data was fresh; nothing was fetched.
    Skipped,
    Incremental,
    Full,
}

impl FetchAction {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Skipped => "skipped",
            Self::Incremental => "incremental",
            Self::Full => "full",
        }
    }
}

impl fmt::Display for FetchAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Result of processing one entity.
///
/// A failed outcome always carries a message and a category; a successful
/// one carries neither.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FetchOutcome {
    pub entity: String,
    pub success: bool,
    pub action: Option<FetchAction>,
    pub rows_added: usize,
    pub freshness: Option<FreshnessReason>,
    pub error_message: Option<String>,
    pub error_category: Option<ErrorCategory>,
}

impl FetchOutcome {
    #[must_use]
    pub fn succeeded(
        entity: impl Into<String>,
        action: FetchAction,
        rows_added: usize,
        freshness: FreshnessReason,
    ) -> Self {
        Self {
            entity: entity.into(),
            success: true,
            action: Some(action),
            rows_added,
            freshness: Some(freshness),
            error_message: None,
            error_category: None,
        }
    }

    /// Failed outcome; the category is derived from the message.
    #[must_use]
    pub fn failed(entity: impl Into<String>, message: impl Into<String>) -> Self {
        let message = message.into();
        let category = ErrorClassifier::classify(&message);
        Self::failed_with_category(entity, message, category)
    }

    #[must_use]
    pub fn failed_with_category(
        entity: impl Into<String>,
        message: impl Into<String>,
        category: ErrorCategory,
    ) -> Self {
        Self {
            entity: entity.into(),
            success: false,
            action: None,
            rows_added: 0,
            freshness: None,
            error_message: Some(message.into()),
            error_category: Some(category),
        }
    }

    /// Records which path was attempted before the failure.
    #[must_use]
    pub fn during(mut self, action: FetchAction, freshness: FreshnessReason) -> Self {
        self.action = Some(action);
        self.freshness = Some(freshness);
        self
    }
}

/// Summary of a whole coordination run.
#[derive(Debug, Clone, Serialize)]
pub struct CoordinationResult {
    pub successful_entities: BTreeSet<String>,
    pub failed_entities: BTreeSet<String>,
    /// One outcome per entity, sorted by entity.
    pub outcomes: Vec<FetchOutcome>,
    pub success_rate: f64,
    pub overall_success: bool,
    pub duration_seconds: f64,
}

impl CoordinationResult {
    #[must_use]
    pub fn total(&self) -> usize {
        self.successful_entities.len() + self.failed_entities.len()
    }

    pub fn failures(&self) -> impl Iterator<Item = &FetchOutcome> {
        self.outcomes.iter().filter(|o| !o.success)
    }

    /// One-line human summary.
    #[must_use]
    pub fn summary(&self) -> String {
        format!(
            "{}/{} entities succeeded ({:.1}%) in {:.2}s: {}",
            self.successful_entities.len(),
            self.total(),
            self.success_rate * 100.0,
            self.duration_seconds,
            if self.overall_success { "OK" } else { "FAILED" }
        )
    }
}

/// Folds outcomes into a [`CoordinationResult`].
#[derive(Debug, Clone, Copy)]
pub struct OutcomeAggregator {
    min_success_rate: f64,
}

impl Default for OutcomeAggregator {
    fn default() -> Self {
        Self::new(DEFAULT_MIN_SUCCESS_RATE)
    }
}

impl OutcomeAggregator {
    #[must_use]
    pub fn new(min_success_rate: f64) -> Self {
        Self { min_success_rate }
    }

    /// An entity reported as both succeeded and failed counts as failed.
    /// The rate is 0 for an empty run and the threshold check is inclusive.
    #[must_use]
    pub fn aggregate(&self, outcomes: Vec<FetchOutcome>, duration_seconds: f64) -> CoordinationResult {
        let mut failed_entities = BTreeSet::new();
        for outcome in outcomes.iter().filter(|o| !o.success) {
            failed_entities.insert(outcome.entity.clone());
        }

        let successful_entities: BTreeSet<String> = outcomes
            .iter()
            .filter(|o| o.success && !failed_entities.contains(&o.entity))
            .map(|o| o.entity.clone())
            .collect();

        let total = successful_entities.len() + failed_entities.len();
        let success_rate = if total == 0 {
            0.0
        } else {
            successful_entities.len() as f64 / total as f64
        };

        let mut outcomes = outcomes;
        outcomes.sort_by(|a, b| a.entity.cmp(&b.entity));

        CoordinationResult {
            successful_entities,
            failed_entities,
            outcomes,
            success_rate,
            overall_success: success_rate >= self.min_success_rate,
            duration_seconds,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ok(entity: &str) -> FetchOutcome {
        FetchOutcome::succeeded(entity, FetchAction::Full, 10, FreshnessReason::NoExistingData)
    }

    fn err(entity: &str) -> FetchOutcome {
        FetchOutcome::failed(entity, "connection refused")
    }

    fn mixed(successes: usize, failures: usize) -> Vec<FetchOutcome> {
        let mut outcomes: Vec<_> = (0..successes).map(|i| ok(&format!("OK{i}"))).collect();
        outcomes.extend((0..failures).map(|i| err(&format!("BAD{i}"))));
        outcomes
    }

    #[test]
    fn test_failed_outcome_is_classified() {
        let outcome = FetchOutcome::failed("AAA", "401 Unauthorized");
        assert!(!outcome.success);
        assert_eq!(outcome.error_category, Some(ErrorCategory::Authentication));
        assert_eq!(outcome.error_message.as_deref(), Some("401 Unauthorized"));

        let outcome = ok("AAA");
        assert!(outcome.error_message.is_none());
        assert!(outcome.error_category.is_none());
    }

    #[test]
    fn test_threshold_is_inclusive() {
        let aggregator = OutcomeAggregator::new(0.6);

        let result = aggregator.aggregate(mixed(6, 4), 1.0);
        assert!((result.success_rate - 0.6).abs() < 1e-12);
        assert!(result.overall_success);

        let result = aggregator.aggregate(mixed(5, 5), 1.0);
        assert!((result.success_rate - 0.5).abs() < 1e-12);
        assert!(!result.overall_success);
    }

    #[test]
    fn test_empty_run() {
        let result = OutcomeAggregator::default().aggregate(Vec::new(), 0.0);
        assert_eq!(result.success_rate, 0.0);
        assert!(!result.overall_success);
        assert_eq!(result.total(), 0);
    }

    #[test]
    fn test_sets_are_disjoint() {
        let outcomes = vec![ok("AAA"), err("AAA"), ok("BBB")];
        let result = OutcomeAggregator::default().aggregate(outcomes, 0.5);

        assert!(result.failed_entities.contains("AAA"));
        assert!(!result.successful_entities.contains("AAA"));
        assert!(result.successful_entities.contains("BBB"));
        assert!(result.successful_entities.is_disjoint(&result.failed_entities));
    }

    #[test]
    fn test_outcomes_sorted_and_failures_listed() {
        let outcomes = vec![err("ZZZ"), ok("MMM"), ok("AAA")];
        let result = OutcomeAggregator::default().aggregate(outcomes, 2.0);

        let order: Vec<&str> = result.outcomes.iter().map(|o| o.entity.as_str()).collect();
        assert_eq!(order, vec!["AAA", "MMM", "ZZZ"]);

        let failures: Vec<&str> = result.failures().map(|o| o.entity.as_str()).collect();
        assert_eq!(failures, vec!["ZZZ"]);
        assert_eq!(result.failures().next().unwrap().error_category, Some(ErrorCategory::Network));
    }

    #[test]
    fn test_summary_line() {
        let result = OutcomeAggregator::new(0.5).aggregate(mixed(3, 1), 1.25);
        let summary = result.summary();
        assert!(summary.starts_with("3/4 entities succeeded (75.0%)"));
        assert!(summary.ends_with("OK"));
    }
}
