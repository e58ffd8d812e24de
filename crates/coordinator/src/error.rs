//! Error types for coordination runs.
//!
//! [`CoordinatorError`] aborts a run: the coordinator itself cannot proceed.
//! [`EntityError`] stays inside one entity's task and becomes a failed
//! outcome instead of propagating.

use market_sync_core::{FetchError, StorageError};
use std::path::PathBuf;
use thiserror::Error;

/// Run-aborting infrastructure failures.
#[derive(Debug, Error)]
pub enum CoordinatorError {
    /// The entity set was empty.
    #[error("no entities to process; configure `entities` or pass --symbols")]
    NoEntities,

    /// A concurrency fragment exists but cannot be parsed.
    #[error("invalid concurrency fragment {}: {message}", path.display())]
    Fragment {
        /// Fragment file.
        path: PathBuf,
        /// Parser message.
        message: String,
    },

    /// The fragments directory could not be listed.
    #[error("cannot read concurrency fragments in {}: {source}", path.display())]
    FragmentDir {
        /// Directory that was scanned.
        path: PathBuf,
        /// Underlying error.
        #[source]
        source: std::io::Error,
    },

    /// Two entities would be stored in the same place.
    #[error("entities {first:?} and {second:?} share storage key {key:?}")]
    StorageCollision {
        first: String,
        second: String,
        key: String,
    },

    /// A setting is outside its valid range.
    #[error("invalid setting: {0}")]
    InvalidSetting(String),

    /// The bounded worker pool stopped handing out permits.
    #[error("worker pool closed: {0}")]
    WorkerPool(String),
}

/// Failures local to one entity's fetch/merge/persist path.
#[derive(Debug, Error)]
pub enum EntityError {
    #[error(transparent)]
    Fetch(#[from] FetchError),

    #[error(transparent)]
    Storage(#[from] StorageError),
}
