use crate::error::{FetchError, StorageError};
use crate::record::{DailyRecord, Dataset};
use async_trait::async_trait;
use chrono::NaiveDate;

/// Source of daily bars for an entity.
///
/// Implementations own transport concerns (auth, throttling, retries) and
/// return records already normalized to [`DailyRecord`].
#[async_trait]
pub trait FetchClient: Send + Sync {
    /// Fetches the full history window `[start, end]`.
    async fn fetch_full(
        &self,
        entity: &str,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<DailyRecord>, FetchError>;

    /// Fetches records dated `since` through `end`. An empty result is not an error.
    async fn fetch_incremental(
        &self,
        entity: &str,
        since: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<DailyRecord>, FetchError>;
}

/// Outcome of a successful atomic write.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WriteReceipt {
    pub size_bytes: u64,
    pub records: usize,
}

/// Durable per-entity dataset storage.
#[async_trait]
pub trait PersistenceGateway: Send + Sync {
    /// Identifies where `entity` is stored. Two entities with the same key
    /// would overwrite each other.
    fn storage_key(&self, entity: &str) -> String {
        entity.trim().to_string()
    }

    /// Size of the stored dataset in bytes, or `None` when nothing is stored.
    async fn stored_size(&self, entity: &str) -> Result<Option<u64>, StorageError>;

    /// Reads the stored dataset, or `None` when nothing is stored.
    async fn read_existing(&self, entity: &str) -> Result<Option<Dataset>, StorageError>;

    /// Replaces the stored dataset atomically, keeping a backup of the
    /// previous version and verifying the written content.
    async fn write_atomic(
        &self,
        entity: &str,
        dataset: &Dataset,
    ) -> Result<WriteReceipt, StorageError>;
}
