//! Error types for the lap-times ETL pipeline.
//!
//! Every failure is fatal to a run, so a single enum covers the whole crate.
//! Conversions from the underlying crates are provided via `#[from]` so `?`
//! works across the storage, execution and configuration layers.

use std::path::PathBuf;

use arrow::datatypes::{DataType, Schema};
use arrow::error::ArrowError;
use thiserror::Error;

/// Errors raised while reading, transforming or writing record sets.
#[derive(Debug, Error)]
pub enum EtlError {
    /// An input file could not be opened.
    #[error("Source unavailable: {}: {source}", .path.display())]
    SourceUnavailable {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// A row's field count does not match the header's column count.
    #[error(
        "Malformed row at {}:{line}: expected {expected} fields, found {found}",
        .path.display()
    )]
    MalformedRow {
        path: PathBuf,
        line: u64,
        expected: usize,
        found: usize,
    },

    /// A referenced column does not exist in the record set.
    #[error("Column '{column}' not found (available: {available:?})")]
    MissingColumn {
        column: String,
        available: Vec<String>,
    },

    /// The cast kernel cannot convert between the two types at all.
    /// Individual unparsable values are turned into nulls instead.
    #[error("Cannot cast {from} to {to}: {reason}")]
    TypeCastFailure {
        from: DataType,
        to: DataType,
        reason: String,
    },

    /// The output could not be written.
    #[error("Sink unavailable: {}: {reason}", .path.display())]
    SinkUnavailable { path: PathBuf, reason: String },

    /// A key or group column has a type the hash tables do not handle.
    #[error("Unsupported {context} type: {data_type}")]
    UnsupportedType {
        context: &'static str,
        data_type: DataType,
    },

    /// A transform was requested that cannot be planned.
    #[error("Invalid plan: {0}")]
    InvalidPlan(String),

    /// Columns and schema of a batch disagree.
    #[error("Invalid record batch: {0}")]
    InvalidBatch(String),

    /// Low-level delimited text error (bad UTF-8, I/O while streaming).
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    /// Arrow compute kernel error.
    #[error("Arrow error: {0}")]
    Arrow(#[from] ArrowError),

    /// Configuration file could not be loaded.
    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),

    /// Configuration loaded but holds an invalid value.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

impl EtlError {
    /// Build a [`EtlError::MissingColumn`] listing the columns that do exist.
    pub fn missing_column(column: impl Into<String>, schema: &Schema) -> Self {
        EtlError::MissingColumn {
            column: column.into(),
            available: schema.fields().iter().map(|f| f.name().clone()).collect(),
        }
    }
}

/// Result type used throughout the crate.
pub type EtlResult<T> = Result<T, EtlError>;
