// AirQ - Air Quality Index engine
// Copyright (c) 2025 David Martin Venti
//
// Dual-licensed under AGPL-3.0 and Commercial License.
// See LICENSE file for details.

//! Error types for AirQ
//!
//! Everything here is a startup-time failure: a malformed breakpoint table or
//! engine configuration. Per-sample problems never surface as errors; they are
//! logged and turn into missing values.

use thiserror::Error;

/// Result type alias for AirQ operations
pub type Result<T> = std::result::Result<T, AqiError>;

/// Main error type for AirQ operations
#[derive(Error, Debug)]
pub enum AqiError {
    /// Breakpoint table could not be decoded
    #[error("Parse error: {0}")]
    Parse(#[from] ParseError),

    /// Pollutant or indicator identifier is not known
    #[error("Unknown pollutant: {0}")]
    UnknownPollutant(String),

    /// Engine configuration is inconsistent
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// CSV reader error
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    /// JSON configuration error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Errors while decoding a breakpoint table
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ParseError {
    /// Table has no header or no rows
    #[error("Empty breakpoint table")]
    EmptyTable,

    /// Row key is not `<int>～<int>`
    #[error("Invalid AQI bucket key '{0}'")]
    InvalidBucketKey(String),

    /// Cell is not `<number> - <number>`
    #[error("Invalid range '{value}' in column {column}")]
    InvalidRange { column: String, value: String },

    /// Range bounds are not strictly increasing
    #[error("Range {low} - {high} in column {column} is not increasing")]
    DegenerateRange {
        column: String,
        low: f64,
        high: f64,
    },

    /// Consecutive segments overlap or go backwards
    #[error("Column {column} is not monotonic at row {row}")]
    NonMonotonic { column: String, row: usize },

    /// A row carries a different number of cells than the header
    #[error("Row {row} has {actual} cells, header has {expected}")]
    CountMismatch {
        row: usize,
        expected: usize,
        actual: usize,
    },

    /// Column has no applicable bucket at all
    #[error("Column {0} has no applicable ranges")]
    EmptyColumn(String),
}
