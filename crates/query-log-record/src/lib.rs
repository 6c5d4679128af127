//! DNS query log records.
//!
//! [`QueryLogEntry`] is what the DNS host hands over for every answered
//! query. [`QueryLogMessage`] is the flattened JSON document published to
//! the broker.

mod entry;
mod error;
mod message;

pub use entry::{QueryLogEntry, Question, ResponseSummary, ResponseType, TransportProtocol};
pub use error::{RecordError, RecordResult};
pub use message::{QueryLogMessage, ZONE_TRANSFER_ANSWER};
