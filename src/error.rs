//! Application error types for sheet-gist-sync
//!
//! This module defines the error taxonomy shared by the GitHub client, the
//! spreadsheet source, the notifier and the sync loop.
//! All error types use `thiserror` for ergonomic error handling.

use thiserror::Error;

use crate::config::ConfigError;

/// Errors returned by the GitHub API client and the gist store
#[derive(Debug, Error, Clone, PartialEq)]
pub enum ApiError {
    /// The API answered with a non-2xx status that is not a rate-limit signal
    #[error("GitHub API rejected the request (HTTP {status}): {message}")]
    Rejected { status: u16, message: String },

    /// The rate limit stayed exhausted for every allowed retry
    #[error("Rate limit still exhausted after {attempts} attempts")]
    RateLimitRetriesExhausted { attempts: u32 },

    /// Request timed out
    #[error("GitHub API request timed out")]
    Timeout,

    /// Generic network error
    #[error("Network error: {0}")]
    Network(String),

    /// The response could not be decoded
    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    /// The request body could not be encoded
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// Client settings that cannot be turned into a request
    #[error("Invalid client configuration: {0}")]
    InvalidConfig(String),
}

impl ApiError {
    /// HTTP status of a rejected call, if any
    pub fn status(&self) -> Option<u16> {
        match self {
            ApiError::Rejected { status, .. } => Some(*status),
            _ => None,
        }
    }
}

/// Errors raised while fetching or parsing the spreadsheet export
#[derive(Debug, Error, Clone, PartialEq)]
pub enum FetchError {
    /// Request timed out
    #[error("Source request timed out")]
    Timeout,

    /// Generic network error
    #[error("Network error: {0}")]
    Network(String),

    /// The export endpoint answered with a non-2xx status
    #[error("Source returned HTTP {0}")]
    Status(u16),

    /// The export has fewer records than the configured header offset
    #[error("Header row not found")]
    MissingHeader,

    /// A required column is absent from the header row
    #[error("Missing column: {0}")]
    MissingColumn(String),

    /// A data record does not match the header layout
    #[error("Malformed record at line {line}: {reason}")]
    Malformed { line: u64, reason: String },

    /// The CSV reader failed
    #[error("CSV error: {0}")]
    Csv(String),
}

/// Notification sink errors
#[derive(Debug, Error, Clone, PartialEq)]
pub enum NotifyError {
    /// Generic network error
    #[error("Network error: {0}")]
    Network(String),

    /// The sink answered with a non-2xx status
    #[error("Notification rejected: HTTP {0}")]
    Rejected(u16),
}

/// Errors that end a single sync tick
#[derive(Debug, Error, Clone, PartialEq)]
pub enum SyncError {
    /// The source could not be fetched or parsed
    #[error("Fetch failed: {0}")]
    Fetch(#[from] FetchError),

    /// The gist write failed
    #[error("Publish failed: {0}")]
    Publish(#[from] ApiError),

    /// Fetching the sheet exceeded its time budget
    #[error("Fetch timed out after {0} seconds")]
    TimedOut(u64),

    /// The scheduler is no longer accepting requests
    #[error("Scheduler not running")]
    SchedulerStopped,
}

/// Application-level error type
///
/// This is the error type used by the binary. It aggregates all
/// domain-specific error types.
#[derive(Debug, Error)]
pub enum AppError {
    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// GitHub API error
    #[error("GitHub error: {0}")]
    Api(#[from] ApiError),

    /// Source error
    #[error("Source error: {0}")]
    Fetch(#[from] FetchError),

    /// Sync error
    #[error("Sync error: {0}")]
    Sync(#[from] SyncError),

    /// Logging initialization error
    #[error("Logging error: {0}")]
    Logging(String),

    /// Local I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
