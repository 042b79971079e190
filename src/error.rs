use std::path::PathBuf;

use serde::Serialize;
use thiserror::Error;

/// Failure of a single fetch attempt against one remote source
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize)]
#[serde(tag = "kind", content = "detail", rename_all = "snake_case")]
pub enum FetchError {
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Rate limited: retry after {retry_after_secs:?} seconds")]
    RateLimited { retry_after_secs: Option<u64> },

    #[error("Network error: {0}")]
    NetworkFailure(String),

    #[error("Parse failure: {0}")]
    ParseFailure(String),

    #[error("Timed out")]
    Timeout,
}

impl From<reqwest::Error> for FetchError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            FetchError::Timeout
        } else if e.is_decode() {
            FetchError::ParseFailure(e.to_string())
        } else {
            FetchError::NetworkFailure(e.to_string())
        }
    }
}

#[derive(Debug, Error)]
pub enum CacheError {
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("Cache lock poisoned")]
    LockPoisoned,
}

/// Configuration problems. These are the only fatal errors and are raised
/// before any fetch begins.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config file {path}: {message}")]
    Parse { path: PathBuf, message: String },

    #[error("invalid value for {field}: {message}")]
    InvalidValue {
        field: &'static str,
        message: String,
    },

    #[error("invalid pattern '{pattern}' for source '{source_pattern}': {message}")]
    InvalidPattern {
        source_pattern: String,
        pattern: String,
        message: String,
    },

    #[error("invalid URL '{url}' for source '{source_pattern}': {message}")]
    InvalidUrl {
        source_pattern: String,
        url: String,
        message: String,
    },
}

impl ConfigError {
    pub fn invalid_value(field: &'static str, message: impl Into<String>) -> Self {
        ConfigError::InvalidValue {
            field,
            message: message.into(),
        }
    }
}

#[derive(Debug, Error)]
pub enum InventoryError {
    #[error("failed to read inventory {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse inventory {path}: {message}")]
    Parse { path: PathBuf, message: String },
}
