//! Error types for query log records.

use thiserror::Error;

/// Errors raised while parsing or encoding query log records.
#[derive(Error, Debug)]
pub enum RecordError {
    /// Entry could not be decoded from its JSON form.
    #[error("invalid query log entry: {0}")]
    Decode(#[source] serde_json::Error),

    /// Message could not be encoded for the broker.
    #[error("failed to encode query log message: {0}")]
    Encode(#[source] serde_json::Error),
}

/// Result type alias for record operations.
pub type RecordResult<T> = Result<T, RecordError>;
