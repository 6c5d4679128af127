//! Publish error types.

use thiserror::Error;

/// Publish error type.
#[derive(Error, Debug)]
pub enum PublishError {
    /// Broker could not be reached, or the transport broke.
    #[error("broker unreachable: {0}")]
    Connect(String),

    /// Broker refused to open a session (bad credentials, unknown vhost).
    #[error("session refused with HTTP {status}: {body}")]
    SessionRefused { status: u16, body: String },

    /// Session was already closed.
    #[error("session closed")]
    Closed,

    /// Output sink failed.
    #[error("output error: {0}")]
    Io(#[from] std::io::Error),

    /// Publisher could not be built from configuration.
    #[error("publisher configuration error: {0}")]
    Config(String),

    /// Broker refused a publish for reasons that have nothing to do with the
    /// message (overloaded, restarting, credentials revoked).
    #[error("broker unavailable, HTTP {status}: {body}")]
    Unavailable { status: u16, body: String },

    /// Broker rejected this message.
    #[error("publish rejected with HTTP {status}: {body}")]
    Rejected { status: u16, body: String },

    /// Message reached the exchange but no queue was bound for it.
    #[error("message was not routed to any queue")]
    Unroutable,

    /// Broker answered with something we could not read.
    #[error("invalid broker response: {0}")]
    InvalidResponse(String),

    /// Record could not be turned into a payload.
    #[error("failed to encode record: {0}")]
    Encode(String),
}

impl PublishError {
    /// Whether the failure concerns the session rather than the record.
    ///
    /// Session-level failures hand the whole remaining batch back to the
    /// queue untouched; record-level failures count against the record.
    pub fn is_session_level(&self) -> bool {
        matches!(
            self,
            PublishError::Connect(_)
                | PublishError::SessionRefused { .. }
                | PublishError::Unavailable { .. }
                | PublishError::Closed
                | PublishError::Io(_)
                | PublishError::Config(_)
        )
    }
}

/// Result type alias using PublishError.
pub type PublishResult<T> = Result<T, PublishError>;
