//! Error types for VRSI Analytics

use thiserror::Error;

/// Errors that can occur during session analysis.
///
/// Degenerate-but-valid inputs (zero-duration deltas, empty groups, zero interactions)
/// never produce an error; they resolve to documented zero values instead.
#[derive(Debug, Error)]
pub enum AnalysisError {
    #[error("Failed to parse session input: {0}")]
    ParseError(String),

    #[error("Invalid JSON: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("Missing required column '{column}' in {table} table")]
    MissingColumn { table: String, column: String },

    #[error("Timestamps are not monotonic in {table}: {previous} followed by {current} at frame {frame_id}")]
    NonMonotonicTimestamps {
        table: String,
        frame_id: u64,
        previous: f64,
        current: f64,
    },

    #[error("Events are not ordered in {source_name}: {previous} followed by {current} at event #{position}")]
    UnorderedEvents {
        source_name: String,
        position: usize,
        previous: f64,
        current: f64,
    },

    #[error("Invalid timestamp {value} at frame {frame_id} in {table}")]
    InvalidTimestamp {
        table: String,
        frame_id: u64,
        value: f64,
    },

    #[error("Duplicate frame id {frame_id} in {table}")]
    DuplicateFrame { table: String, frame_id: u64 },

    #[error("Empty input: {0}")]
    EmptyStream(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Fixation classifier failed: {0}")]
    Classifier(String),

    #[error("Invariant violated: {0}")]
    InvariantViolation(String),
}

impl AnalysisError {
    pub(crate) fn missing_column(table: &str, column: &str) -> Self {
        AnalysisError::MissingColumn {
            table: table.to_string(),
            column: column.to_string(),
        }
    }
}
