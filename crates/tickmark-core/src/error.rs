//! Core error types for tickmark-core.
//!
//! This module defines the error hierarchy using thiserror. Note that most
//! failures never propagate out of the scheduler path: the tracker downgrades
//! them to local decisions (skip a cycle, stop a timer, reject an input) so
//! one malformed document or storage hiccup cannot abort unrelated timers.

use std::path::PathBuf;
use thiserror::Error;

/// Core error type for tickmark-core.
#[derive(Error, Debug)]
pub enum CoreError {
    /// Document access errors
    #[error("Document error: {0}")]
    Document(#[from] DocumentError),

    /// Analytics ledger errors
    #[error("Ledger error: {0}")]
    Ledger(#[from] LedgerError),

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Validation errors
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    /// IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization/deserialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Generic errors with context
    #[error("{0}")]
    Custom(String),
}

/// Document access errors.
#[derive(Error, Debug)]
pub enum DocumentError {
    /// A line index is past the end of the document
    #[error("Line {line} out of range (document has {len} lines)")]
    LineOutOfRange { line: usize, len: usize },

    /// A replacement span does not fit the addressed line
    #[error("Span {start}..{end} out of range on line {line}")]
    SpanOutOfRange {
        line: usize,
        start: usize,
        end: usize,
    },

    /// A marker id no longer resolves anywhere after an exhaustive scan
    #[error("No marker with id '{id}' found in document")]
    MarkerNotFound { id: String },

    /// Reading the persisted document failed
    #[error("Failed to read document at {path}: {source}")]
    ReadFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Writing the persisted document failed
    #[error("Failed to write document at {path}: {source}")]
    WriteFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Analytics ledger errors.
#[derive(Error, Debug)]
pub enum LedgerError {
    /// Failed to load the ledger file
    #[error("Failed to load ledger from {path}: {message}")]
    LoadFailed { path: PathBuf, message: String },

    /// Failed to save the ledger file
    #[error("Failed to save ledger to {path}: {message}")]
    SaveFailed { path: PathBuf, message: String },
}

/// Configuration errors.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Failed to load configuration
    #[error("Failed to load configuration from {path}: {message}")]
    LoadFailed { path: PathBuf, message: String },

    /// Failed to save configuration
    #[error("Failed to save configuration to {path}: {message}")]
    SaveFailed { path: PathBuf, message: String },

    /// Unknown or malformed configuration key/value
    #[error("Invalid configuration value for '{key}': {message}")]
    InvalidValue { key: String, message: String },
}

/// Validation errors. Rejected before any state or ledger mutation.
#[derive(Error, Debug)]
pub enum ValidationError {
    /// A user-supplied period total is negative
    #[error("Adjustment total must be non-negative, got {value}")]
    NegativeTotal { value: i64 },

    /// Invalid time range
    #[error("Invalid time range: end ({end}) must not precede start ({start})")]
    InvalidTimeRange {
        start: chrono::DateTime<chrono::Utc>,
        end: chrono::DateTime<chrono::Utc>,
    },
}

/// Result type alias for CoreError
pub type Result<T, E = CoreError> = std::result::Result<T, E>;
