//! Maps failure messages to coarse categories for logs and reports.
//!
//! Matching is case-insensitive substring search over fixed keyword sets,
//! checked in priority order; the first category with a hit wins. Typed
//! entity errors map straight from their variant and only fall back to the
//! keyword search for free-form text that carries no entity name.

use crate::error::EntityError;
use market_sync_core::{FetchError, StorageError};
use serde::Serialize;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum ErrorCategory {
    InfrastructureLogging,
    Network,
    Authentication,
    RateLimit,
    DataValidation,
    ServiceUnavailable,
    ServiceError,
    Unknown,
}

impl ErrorCategory {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::InfrastructureLogging => "infrastructure_logging",
            Self::Network => "network",
            Self::Authentication => "authentication",
            Self::RateLimit => "rate_limit",
            Self::DataValidation => "data_validation",
            Self::ServiceUnavailable => "service_unavailable",
            Self::ServiceError => "service_error",
            Self::Unknown => "unknown",
        }
    }
}

impl fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

const INFRASTRUCTURE_KEYWORDS: &[&str] = &[
    "logging",
    "logger",
    "log handler",
    "log file",
    "subscriber",
    "i/o operation on closed file",
];

const NETWORK_KEYWORDS: &[&str] = &[
    "timeout",
    "timed out",
    "connection",
    "network",
    "dns",
    "unreachable",
    "socket",
    "reset by peer",
    "certificate",
];

const AUTHENTICATION_KEYWORDS: &[&str] = &[
    "401",
    "403",
    "unauthorized",
    "forbidden",
    "authentication",
    "api key",
    "invalid token",
    "credential",
];

const RATE_LIMIT_KEYWORDS: &[&str] = &["429", "rate limit", "too many requests", "throttl", "quota"];

const DATA_VALIDATION_KEYWORDS: &[&str] = &[
    "no data",
    "invalid",
    "validation",
    "malformed",
    "parse",
    "no date column",
    "missing column",
    "verification failed",
    "not found",
    "delisted",
];

const SERVICE_UNAVAILABLE_KEYWORDS: &[&str] = &[
    "503",
    "502",
    "504",
    "unavailable",
    "bad gateway",
    "maintenance",
    "temporarily",
];

const PRIORITY: &[(ErrorCategory, &[&str])] = &[
    (ErrorCategory::InfrastructureLogging, INFRASTRUCTURE_KEYWORDS),
    (ErrorCategory::Network, NETWORK_KEYWORDS),
    (ErrorCategory::Authentication, AUTHENTICATION_KEYWORDS),
    (ErrorCategory::RateLimit, RATE_LIMIT_KEYWORDS),
    (ErrorCategory::DataValidation, DATA_VALIDATION_KEYWORDS),
    (ErrorCategory::ServiceUnavailable, SERVICE_UNAVAILABLE_KEYWORDS),
];

pub struct ErrorClassifier;

impl ErrorClassifier {
    #[must_use]
    pub fn classify(message: &str) -> ErrorCategory {
        let message = message.trim();
        if message.is_empty() {
            return ErrorCategory::Unknown;
        }

        let lowered = message.to_lowercase();
        PRIORITY
            .iter()
            .find(|(_, keywords)| keywords.iter().any(|k| lowered.contains(k)))
            .map_or(ErrorCategory::ServiceError, |(category, _)| *category)
    }

    /// Category of a typed entity failure.
    ///
    /// Entity names and file paths never take part in the decision, so an
    /// entity like `4403.T` cannot look like an HTTP 403.
    #[must_use]
    pub fn categorize(err: &EntityError) -> ErrorCategory {
        match err {
            EntityError::Fetch(err) => Self::categorize_fetch(err),
            EntityError::Storage(err) => Self::categorize_storage(err),
        }
    }

    fn categorize_fetch(err: &FetchError) -> ErrorCategory {
        match err {
            FetchError::NoData { .. } | FetchError::Malformed(_) => ErrorCategory::DataValidation,
            FetchError::Network(_) | FetchError::Timeout(_) => ErrorCategory::Network,
            FetchError::Authentication(_) => ErrorCategory::Authentication,
            FetchError::RateLimit(_) => ErrorCategory::RateLimit,
            FetchError::Unavailable(_) => ErrorCategory::ServiceUnavailable,
            FetchError::Api {
                status_code,
                message,
            } => match status_code {
                401 | 403 => ErrorCategory::Authentication,
                429 => ErrorCategory::RateLimit,
                502..=504 => ErrorCategory::ServiceUnavailable,
                _ => Self::classify(message),
            },
        }
    }

    fn categorize_storage(err: &StorageError) -> ErrorCategory {
        match err {
            StorageError::MissingDateColumn { .. }
            | StorageError::Parse { .. }
            | StorageError::Verification { .. } => ErrorCategory::DataValidation,
            StorageError::Io { source, .. } => Self::classify(&source.to_string()),
            StorageError::Task(message) => Self::classify(message),
        }
    }
}
