//! CSV-backed persistence for per-entity daily datasets.
//!
//! One file per entity under the data directory, header
//! `date,open,high,low,close,volume`. Writes go through a temp file and a
//! rename, with the previous file copied to `.bak` first and the result
//! re-read before the write is reported as successful.

use market_sync_core::config::StorageConfig;
use market_sync_core::{DailyRecord, Dataset, PersistenceGateway, StorageError, WriteReceipt};
use async_trait::async_trait;
use csv::{ReaderBuilder, StringRecord, Trim, WriterBuilder};
use std::fs::{self, File};
use std::io;
use std::path::{Path, PathBuf};

pub struct CsvStorage {
    data_dir: PathBuf,
    keep_backup: bool,
}

impl CsvStorage {
    #[must_use]
    pub fn new(data_dir: impl Into<PathBuf>) -> Self {
        Self {
            data_dir: data_dir.into(),
            keep_backup: true,
        }
    }

    #[must_use]
    pub fn from_config(config: &StorageConfig) -> Self {
        Self::new(&config.data_dir).with_keep_backup(config.keep_backup)
    }

    /// Whether the `.bak` copy survives a successful write.
    #[must_use]
    pub fn with_keep_backup(mut self, keep_backup: bool) -> Self {
        self.keep_backup = keep_backup;
        self
    }

    /// File holding the dataset for `entity`.
    #[must_use]
    pub fn path_for(&self, entity: &str) -> PathBuf {
        self.data_dir.join(format!("{}.csv", file_stem(entity)))
    }

    #[must_use]
    pub fn backup_path_for(&self, entity: &str) -> PathBuf {
        self.data_dir.join(format!("{}.csv.bak", file_stem(entity)))
    }

    /// Reads a dataset file, matching column names case-insensitively.
    ///
    /// # Errors
    /// Returns `MissingDateColumn` when the header has no `date` column,
    /// `Io` when the file cannot be opened, and `Parse` for malformed rows.
    pub fn read_dataset(path: &Path) -> Result<Dataset, StorageError> {
        let mut reader = ReaderBuilder::new()
            .trim(Trim::All)
            .flexible(false)
            .from_path(path)
            .map_err(|e| StorageError::io(path, io::Error::from(e)))?;

        let headers = reader
            .headers()
            .map_err(|e| StorageError::parse(path, e.to_string()))?
            .clone();
        let normalized: StringRecord = headers
            .iter()
            .map(|h| h.trim_start_matches('\u{feff}').to_ascii_lowercase())
            .collect();

        if !normalized.iter().any(|h| h == "date") {
            return Err(StorageError::MissingDateColumn {
                path: path.to_path_buf(),
            });
        }
        reader.set_headers(normalized);

        let records = reader
            .deserialize::<DailyRecord>()
            .collect::<Result<Vec<_>, _>>()
            .map_err(|e| StorageError::parse(path, e.to_string()))?;

        Ok(Dataset::new(records))
    }

    /// Writes `dataset` to `path` atomically.
    ///
    /// # Errors
    /// Returns `Io` on filesystem failures and `Verification` when the file
    /// read back differs from what was written; in that case the backup, if
    /// any, has been restored.
    pub fn write_dataset(
        path: &Path,
        backup: &Path,
        dataset: &Dataset,
        keep_backup: bool,
    ) -> Result<WriteReceipt, StorageError> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|e| StorageError::io(parent, e))?;
        }

        let had_previous = path.exists();
        if had_previous {
            fs::copy(path, backup).map_err(|e| StorageError::io(backup, e))?;
        }

        let tmp = path.with_extension("csv.tmp");
        write_csv(&tmp, dataset)?;
        fs::rename(&tmp, path).map_err(|e| StorageError::io(path, e))?;

        if let Err(err) = verify_written(path, dataset) {
            if had_previous {
                tracing::warn!("Restoring {} from backup after failed verification", path.display());
                fs::copy(backup, path).map_err(|e| StorageError::io(path, e))?;
            }
            return Err(err);
        }

        if had_previous && !keep_backup {
            fs::remove_file(backup).map_err(|e| StorageError::io(backup, e))?;
        }

        let size_bytes = fs::metadata(path)
            .map_err(|e| StorageError::io(path, e))?
            .len();

        Ok(WriteReceipt {
            size_bytes,
            records: dataset.len(),
        })
    }
}

fn write_csv(path: &Path, dataset: &Dataset) -> Result<(), StorageError> {
    let file = File::create(path).map_err(|e| StorageError::io(path, e))?;
    let mut writer = WriterBuilder::new().has_headers(false).from_writer(file);

    // Header is written explicitly so empty datasets keep the schema.
    writer
        .write_record(DailyRecord::COLUMNS)
        .map_err(|e| StorageError::io(path, io::Error::from(e)))?;
    for record in dataset.records() {
        writer
            .serialize(record)
            .map_err(|e| StorageError::io(path, io::Error::from(e)))?;
    }

    let file = writer
        .into_inner()
        .map_err(|e| StorageError::io(path, e.into_error()))?;
    file.sync_all().map_err(|e| StorageError::io(path, e))
}

fn verify_written(path: &Path, expected: &Dataset) -> Result<(), StorageError> {
    let written = CsvStorage::read_dataset(path)?;

    if written.len() != expected.len() {
        return Err(StorageError::verification(
            path,
            format!("record count {} != {}", written.len(), expected.len()),
        ));
    }
    if written.last_date() != expected.last_date() {
        return Err(StorageError::verification(
            path,
            format!(
                "last date {:?} != {:?}",
                written.last_date(),
                expected.last_date()
            ),
        ));
    }
    Ok(())
}

/// Maps an entity to its file stem by percent-encoding everything outside
/// `[A-Za-z0-9-._~]`, e.g. `^GSPC` → `%5EGSPC`, `BTC/USD` → `BTC%2FUSD`.
///
/// Distinct entities always get distinct stems.
#[must_use]
pub fn file_stem(entity: &str) -> String {
    urlencoding::encode(entity.trim()).into_owned()
}

async fn run_blocking<T, F>(task: F) -> Result<T, StorageError>
where
    T: Send + 'static,
    F: FnOnce() -> Result<T, StorageError> + Send + 'static,
{
    tokio::task::spawn_blocking(task)
        .await
        .map_err(|e| StorageError::Task(e.to_string()))?
}

#[async_trait]
impl PersistenceGateway for CsvStorage {
    fn storage_key(&self, entity: &str) -> String {
        file_stem(entity)
    }

    async fn stored_size(&self, entity: &str) -> Result<Option<u64>, StorageError> {
        let path = self.path_for(entity);
        match tokio::fs::metadata(&path).await {
            Ok(meta) => Ok(Some(meta.len())),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(StorageError::io(path, e)),
        }
    }

    async fn read_existing(&self, entity: &str) -> Result<Option<Dataset>, StorageError> {
        let path = self.path_for(entity);
        if !path.exists() {
            return Ok(None);
        }
        run_blocking(move || CsvStorage::read_dataset(&path).map(Some)).await
    }

    async fn write_atomic(
        &self,
        entity: &str,
        dataset: &Dataset,
    ) -> Result<WriteReceipt, StorageError> {
        let path = self.path_for(entity);
        let backup = self.backup_path_for(entity);
        let dataset = dataset.clone();
        let keep_backup = self.keep_backup;

        let receipt = run_blocking(move || {
            CsvStorage::write_dataset(&path, &backup, &dataset, keep_backup)
        })
        .await?;

        tracing::debug!(
            "Wrote {} records ({} bytes) for {}",
            receipt.records,
            receipt.size_bytes,
            entity
        );
        Ok(receipt)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use rust_decimal_macros::dec;
    use tempfile::TempDir;

    fn day(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 1, d).unwrap()
    }

    fn bar(d: u32) -> DailyRecord {
        DailyRecord::new(day(d), dec!(100.25), dec!(101), dec!(99.5), dec!(100.75), dec!(12345))
    }

    #[test]
    fn test_file_stem() {
        assert_eq!(file_stem("AAPL"), "AAPL");
        assert_eq!(file_stem(" BRK.B "), "BRK.B");
        assert_eq!(file_stem("BTC-USD"), "BTC-USD");
        assert_eq!(file_stem("^GSPC"), "%5EGSPC");
        assert_eq!(file_stem("BTC/USD"), "BTC%2FUSD");
        assert_eq!(file_stem("GC=F"), "GC%3DF");
    }

    #[test]
    fn test_lookalike_entities_get_distinct_files() {
        let storage = CsvStorage::new("data");

        for (a, b) in [("BTC/USD", "BTC_USD"), ("^GSPC", "_GSPC"), ("A%2FB", "A/B")] {
            assert_ne!(storage.path_for(a), storage.path_for(b), "{a} vs {b}");
            assert_ne!(storage.storage_key(a), storage.storage_key(b), "{a} vs {b}");
        }
    }

    #[tokio::test]
    async fn test_lookalike_entities_keep_separate_datasets() {
        let dir = TempDir::new().unwrap();
        let storage = CsvStorage::new(dir.path());

        storage.write_atomic("BTC/USD", &Dataset::new(vec![bar(9)])).await.unwrap();
        storage
            .write_atomic("BTC_USD", &Dataset::new(vec![bar(9), bar(10)]))
            .await
            .unwrap();

        assert_eq!(storage.read_existing("BTC/USD").await.unwrap().unwrap().len(), 1);
        assert_eq!(storage.read_existing("BTC_USD").await.unwrap().unwrap().len(), 2);
        assert!(!storage.backup_path_for("BTC_USD").exists());
    }

    #[tokio::test]
    async fn test_absent_entity_reads_as_none() {
        let dir = TempDir::new().unwrap();
        let storage = CsvStorage::new(dir.path());

        assert_eq!(storage.stored_size("NOPE").await.unwrap(), None);
        assert!(storage.read_existing("NOPE").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_write_then_read_preserves_schema_and_order() {
        let dir = TempDir::new().unwrap();
        let storage = CsvStorage::new(dir.path());
        let dataset = Dataset::new(vec![bar(9), bar(10)]);

        let receipt = storage.write_atomic("AAA", &dataset).await.unwrap();
        assert_eq!(receipt.records, 2);
        assert_eq!(storage.stored_size("AAA").await.unwrap(), Some(receipt.size_bytes));

        let contents = fs::read_to_string(storage.path_for("AAA")).unwrap();
        let mut lines = contents.lines();
        assert_eq!(lines.next(), Some("date,open,high,low,close,volume"));
        assert_eq!(lines.next(), Some("2024-01-09,100.25,101,99.5,100.75,12345"));

        let read_back = storage.read_existing("AAA").await.unwrap().unwrap();
        assert_eq!(read_back, dataset);
    }

    #[tokio::test]
    async fn test_overwrite_keeps_backup_of_previous_version() {
        let dir = TempDir::new().unwrap();
        let storage = CsvStorage::new(dir.path());

        storage.write_atomic("AAA", &Dataset::new(vec![bar(9)])).await.unwrap();
        storage
            .write_atomic("AAA", &Dataset::new(vec![bar(9), bar(10)]))
            .await
            .unwrap();

        let backup = CsvStorage::read_dataset(&storage.backup_path_for("AAA")).unwrap();
        assert_eq!(backup.len(), 1);
        assert!(!storage.path_for("AAA").with_extension("csv.tmp").exists());
    }

    #[tokio::test]
    async fn test_backup_removed_when_not_kept() {
        let dir = TempDir::new().unwrap();
        let storage = CsvStorage::new(dir.path()).with_keep_backup(false);

        storage.write_atomic("AAA", &Dataset::new(vec![bar(9)])).await.unwrap();
        storage.write_atomic("AAA", &Dataset::new(vec![bar(10)])).await.unwrap();

        assert!(!storage.backup_path_for("AAA").exists());
    }

    #[test]
    fn test_missing_date_column_is_reported() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("X.csv");
        fs::write(&path, "timestamp,open,high,low,close,volume\n1,1,1,1,1,1\n").unwrap();

        let err = CsvStorage::read_dataset(&path).unwrap_err();
        assert!(matches!(err, StorageError::MissingDateColumn { .. }));
    }

    #[test]
    fn test_mixed_case_headers_and_extra_columns_are_accepted() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("X.csv");
        fs::write(
            &path,
            "Date,Open,High,Low,Close,Adj Close,Volume\n2024-01-10 00:00:00,1,2,0.5,1.5,1.4,10\n",
        )
        .unwrap();

        let dataset = CsvStorage::read_dataset(&path).unwrap();
        assert_eq!(dataset.len(), 1);
        assert_eq!(dataset.last_date(), Some(day(10)));
        assert_eq!(dataset.records()[0].close, dec!(1.5));
    }

    #[test]
    fn test_malformed_row_is_parse_error() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("X.csv");
        fs::write(&path, "date,open,high,low,close,volume\nnot-a-date,1,2,3,4,5\n").unwrap();

        let err = CsvStorage::read_dataset(&path).unwrap_err();
        assert!(matches!(err, StorageError::Parse { .. }));
    }

    #[test]
    fn test_header_only_file_is_empty_dataset() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("X.csv");
        fs::write(&path, "date,open,high,low,close,volume\n").unwrap();

        let dataset = CsvStorage::read_dataset(&path).unwrap();
        assert!(dataset.is_empty());
    }
}
