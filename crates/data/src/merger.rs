//! Date-keyed merge of freshly fetched bars into a stored dataset.
//!
//! Existing rows always win: an incoming record whose date is already
//! present is dropped, never overwritten. The output is ascending by date
//! with unique dates, so applying the same batch twice is a no-op.

use market_sync_core::{DailyRecord, Dataset};
use std::collections::BTreeMap;

/// Result of a merge, with counts for logging.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MergeReport {
    pub dataset: Dataset,
    /// Incoming records that made it into the output.
    pub rows_added: usize,
    /// Incoming records dropped because their date was already taken.
    pub duplicates_dropped: usize,
}

pub struct DataMerger;

impl DataMerger {
    /// Merges `incoming` into `existing`.
    ///
    /// With no existing dataset the incoming batch is adopted as-is, after
    /// sorting and dropping repeated dates (first occurrence kept).
    #[must_use]
    pub fn merge(existing: Option<&Dataset>, incoming: Dataset) -> MergeReport {
        let mut by_date: BTreeMap<_, DailyRecord> = BTreeMap::new();

        if let Some(existing) = existing {
            for record in existing.records() {
                by_date.entry(record.date).or_insert_with(|| record.clone());
            }
        }

        let mut rows_added = 0;
        let mut duplicates_dropped = 0;
        for record in incoming.into_records() {
            if by_date.contains_key(&record.date) {
                duplicates_dropped += 1;
            } else {
                by_date.insert(record.date, record);
                rows_added += 1;
            }
        }

        MergeReport {
            dataset: Dataset::new(by_date.into_values().collect()),
            rows_added,
            duplicates_dropped,
        }
    }
}
