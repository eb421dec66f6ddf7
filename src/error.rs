//! Error types for fieldsync
//!
//! A sync pass can fail in three ways: the upstream service could not be reached
//! (`Transport`), it answered with something we cannot use (`Schema`), or the local
//! store rejected a statement (`Store`). Everything else is ambient plumbing.

use crate::scheduler::backoff::{RetryDecision, RetryableError};
use crate::scheduler::JobKind;
use thiserror::Error;

/// Result type alias for fieldsync operations
pub type Result<T> = std::result::Result<T, SyncError>;

/// Error type for fieldsync operations
#[derive(Error, Debug)]
pub enum SyncError {
    /// Remote fetch unreachable, timed out or answered with a non-2xx status
    #[error("Transport error: {0}")]
    Transport(String),

    /// Snapshot missing expected fields or carrying malformed values
    #[error("Schema error: {0}")]
    Schema(String),

    /// Statement, transaction or commit failure
    #[error("Store error in `{statement}`: {source}")]
    Store {
        statement: String,
        #[source]
        source: rusqlite::Error,
    },

    /// A pass for this job is already in flight
    #[error("Job {0} is already running")]
    Busy(JobKind),

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// YAML parsing errors
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// Blocking task panicked or was cancelled
    #[error("Task join error: {0}")]
    Join(#[from] tokio::task::JoinError),

    /// Other errors
    #[error("{0}")]
    Other(String),
}

impl SyncError {
    /// Short label used for metrics and log fields
    pub fn kind(&self) -> &'static str {
        match self {
            SyncError::Transport(_) => "transport_error",
            SyncError::Schema(_) => "schema_error",
            SyncError::Store { .. } => "store_error",
            SyncError::Busy(_) => "busy",
            SyncError::Config(_) => "config_error",
            SyncError::Io(_) => "io_error",
            SyncError::Yaml(_) => "yaml_error",
            SyncError::Join(_) => "join_error",
            SyncError::Other(_) => "other_error",
        }
    }
}

impl From<serde_json::Error> for SyncError {
    fn from(e: serde_json::Error) -> Self {
        SyncError::Schema(e.to_string())
    }
}

impl From<reqwest::Error> for SyncError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_decode() {
            SyncError::Schema(format!("undecodable response body: {}", e))
        } else {
            SyncError::Transport(e.to_string())
        }
    }
}

/// Attach the failing statement to a rusqlite error
pub trait StoreContext<T> {
    fn statement(self, statement: &str) -> Result<T>;
}

impl<T> StoreContext<T> for std::result::Result<T, rusqlite::Error> {
    fn statement(self, statement: &str) -> Result<T> {
        self.map_err(|source| SyncError::Store {
            statement: compact_statement(statement),
            source,
        })
    }
}

/// Collapse whitespace so multi-line SQL reads well in a single log line
fn compact_statement(statement: &str) -> String {
    statement.split_whitespace().collect::<Vec<_>>().join(" ")
}

impl RetryableError for SyncError {
    fn retry_decision(&self) -> RetryDecision {
        match self {
            // The upstream is struggling: space the next attempts out
            SyncError::Transport(_) => RetryDecision::Backoff,
            // Busy means another pass is doing the work already
            SyncError::Busy(_) => RetryDecision::NoRetry,
            SyncError::Schema(_)
            | SyncError::Store { .. }
            | SyncError::Config(_)
            | SyncError::Io(_)
            | SyncError::Yaml(_)
            | SyncError::Join(_)
            | SyncError::Other(_) => RetryDecision::NextTick,
        }
    }
}
