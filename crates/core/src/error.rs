//! Error types for the fetch client and persistence seams.

use std::path::PathBuf;
use thiserror::Error;

/// Errors surfaced by a [`FetchClient`](crate::traits::FetchClient).
#[derive(Debug, Error)]
pub enum FetchError {
    /// Provider answered but returned no bars for the requested window.
    #[error("no data returned for {entity}")]
    NoData {
        /// Entity that came back empty.
        entity: String,
    },

    /// Transport-level failure.
    #[error("network error: {0}")]
    Network(String),

    /// Request timeout.
    #[error("request timeout: {0}")]
    Timeout(String),

    /// Credentials were rejected.
    #[error("authentication error: {0}")]
    Authentication(String),

    /// Provider throttled the request.
    #[error("rate limit exceeded: {0}")]
    RateLimit(String),

    /// Provider is down or overloaded.
    #[error("service unavailable: {0}")]
    Unavailable(String),

    /// Any other non-success response.
    #[error("API error: {status_code} - {message}")]
    Api {
        /// HTTP status code.
        status_code: u16,
        /// Response body or reason.
        message: String,
    },

    /// Response body could not be decoded into daily bars.
    #[error("malformed response: {0}")]
    Malformed(String),
}

impl FetchError {
    /// Creates a no-data error.
    pub fn no_data(entity: impl Into<String>) -> Self {
        Self::NoData {
            entity: entity.into(),
        }
    }

    /// Creates an API error from status code and message.
    pub fn api(status_code: u16, message: impl Into<String>) -> Self {
        Self::Api {
            status_code,
            message: message.into(),
        }
    }
}

/// Errors surfaced by a [`PersistenceGateway`](crate::traits::PersistenceGateway).
#[derive(Debug, Error)]
pub enum StorageError {
    /// The stored file has a header without a `date` column.
    #[error("dataset has no date column: {}", path.display())]
    MissingDateColumn {
        /// File that was inspected.
        path: PathBuf,
    },

    /// Filesystem failure.
    #[error("I/O error on {}: {source}", path.display())]
    Io {
        /// File being read or written.
        path: PathBuf,
        /// Underlying error.
        #[source]
        source: std::io::Error,
    },

    /// Stored content could not be parsed into daily records.
    #[error("invalid dataset content in {}: {message}", path.display())]
    Parse {
        /// File being read.
        path: PathBuf,
        /// Parser message.
        message: String,
    },

    /// Re-reading the written file did not match what was written.
    #[error("post-write verification failed for {}: {message}", path.display())]
    Verification {
        /// File that was written.
        path: PathBuf,
        /// What did not match.
        message: String,
    },

    /// The blocking storage task did not finish.
    #[error("storage task failed: {0}")]
    Task(String),
}

impl StorageError {
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    pub fn parse(path: impl Into<PathBuf>, message: impl Into<String>) -> Self {
        Self::Parse {
            path: path.into(),
            message: message.into(),
        }
    }

    pub fn verification(path: impl Into<PathBuf>, message: impl Into<String>) -> Self {
        Self::Verification {
            path: path.into(),
            message: message.into(),
        }
    }
}
