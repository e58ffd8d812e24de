//! Dataset storage and merging for the market data sync engine.
//!
//! This crate provides:
//! - `DataMerger` for idempotent, date-keyed merges of daily bars
//! - `CsvStorage`, a `PersistenceGateway` keeping one CSV file per entity

pub mod csv_storage;
pub mod merger;

pub use csv_storage::{file_stem, CsvStorage};
pub use merger::{DataMerger, MergeReport};
