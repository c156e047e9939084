//! Error taxonomy for goldcheck.

use std::path::PathBuf;

/// Errors produced while reading a draw table.
#[derive(Debug, thiserror::Error)]
pub enum DrawTableError {
    #[error("draw table has no header row")]
    MissingHeader,

    #[error("row {row} has {found} columns, header has {expected}")]
    RaggedRow {
        row: usize,
        expected: usize,
        found: usize,
    },

    #[error("row {row} column {column}: not a number: {value:?}")]
    NotANumber {
        row: usize,
        column: String,
        value: String,
    },

    #[error("csv error: {0}")]
    Csv(#[from] csv::Error),
}

/// goldcheck errors.
#[derive(Debug, thiserror::Error)]
pub enum HarnessError {
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("failed to read draws from {path}: {source}")]
    Draws {
        path: PathBuf,
        #[source]
        source: DrawTableError,
    },

    #[error("no gold record at {0}")]
    GoldNotFound(PathBuf),

    #[error("malformed gold record {path} line {line}: {reason}")]
    MalformedGold {
        path: PathBuf,
        line: usize,
        reason: String,
    },

    #[error("malformed timing table {path} line {line}: {reason}")]
    MalformedTimings {
        path: PathBuf,
        line: usize,
        reason: String,
    },

    #[error("timing tables disagree: {0}")]
    TimingMismatch(String),

    #[error("failed to spawn '{command}': {source}")]
    Spawn {
        command: String,
        #[source]
        source: std::io::Error,
    },

    #[error("'{command}' exited with code {code}")]
    BuildFailed { command: String, code: i32 },

    #[error("worker task failed: {0}")]
    Worker(String),

    #[error("report error: {0}")]
    Report(String),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for goldcheck operations.
pub type Result<T> = std::result::Result<T, HarnessError>;
