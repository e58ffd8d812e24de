//! Sizing of the fetch worker pool.
//!
//! Any number of configuration fragments may declare `max_concurrency`;
//! the smallest declared value wins so no consumer's rate-limit
//! expectation is exceeded.

use crate::error::CoordinatorError;
use figment::{
    providers::{Format, Json, Toml},
    Figment,
};
use serde::Deserialize;
use std::path::{Path, PathBuf};

/// A `max_concurrency` declaration found in one fragment file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FragmentLimit {
    /// Fragment file stem, e.g. `reports` for `reports.toml`.
    pub name: String,
    pub max_concurrency: usize,
}

#[derive(Debug, Default, Deserialize)]
struct ConcurrencyFragment {
    max_concurrency: Option<usize>,
}

pub struct ConcurrencyPlanner;

impl ConcurrencyPlanner {
    /// Number of fetches allowed in flight at once.
    ///
    /// Returns `min(entity_count, configured_max or default)`, never less
    /// than 1 when there is at least one entity.
    #[must_use]
    pub fn plan(entity_count: usize, configured_max: Option<usize>, default: usize) -> usize {
        if entity_count == 0 {
            return 0;
        }
        configured_max.unwrap_or(default).clamp(1, entity_count)
    }

    /// Most conservative of the declared limits. Zero is not a usable limit
    /// and is ignored.
    #[must_use]
    pub fn most_conservative(values: &[usize]) -> Option<usize> {
        values.iter().copied().filter(|v| *v > 0).min()
    }

    /// Scans `dir` for `*.toml` and `*.json` fragments declaring `max_concurrency`.
    ///
    /// A missing directory yields no limits. Fragments without the key
    /// contribute nothing.
    ///
    /// # Errors
    /// Returns an error if the directory cannot be listed or a fragment
    /// cannot be parsed.
    pub fn discover(dir: &Path) -> Result<Vec<FragmentLimit>, CoordinatorError> {
        if !dir.exists() {
            tracing::debug!("No concurrency fragments directory at {}", dir.display());
            return Ok(Vec::new());
        }

        let entries = std::fs::read_dir(dir).map_err(|source| CoordinatorError::FragmentDir {
            path: dir.to_path_buf(),
            source,
        })?;

        let mut paths: Vec<PathBuf> = entries
            .filter_map(Result::ok)
            .map(|entry| entry.path())
            .filter(|path| {
                path.is_file()
                    && matches!(
                        path.extension().and_then(|e| e.to_str()),
                        Some("toml" | "json")
                    )
            })
            .collect();
        paths.sort();

        let mut limits = Vec::new();
        for path in paths {
            let figment = match path.extension().and_then(|e| e.to_str()) {
                Some("json") => Figment::from(Json::file(&path)),
                _ => Figment::from(Toml::file(&path)),
            };

            let fragment: ConcurrencyFragment =
                figment.extract().map_err(|e| CoordinatorError::Fragment {
                    path: path.clone(),
                    message: e.to_string(),
                })?;

            if let Some(max_concurrency) = fragment.max_concurrency {
                let name = path
                    .file_stem()
                    .map(|s| s.to_string_lossy().into_owned())
                    .unwrap_or_default();
                tracing::debug!("Fragment {} declares max_concurrency = {}", name, max_concurrency);
                limits.push(FragmentLimit {
                    name,
                    max_concurrency,
                });
            }
        }

        Ok(limits)
    }
}
