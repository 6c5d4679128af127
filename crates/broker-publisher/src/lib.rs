//! Broker publishing.
//!
//! A [`Publisher`] opens a [`PublisherSession`] per batch. Sessions publish
//! one serialized record at a time and are closed when the batch ends.
//!
//! Failures are split in two classes (see [`PublishError::is_session_level`]):
//! session-level failures mean the broker could not be reached and say
//! nothing about the record, record-level failures are charged to the record.
//!
//! Implementations:
//! - [`HttpPublisher`]: the broker's HTTP management API
//! - [`StdoutPublisher`]: one line per payload, for dry runs

mod error;
mod http;
mod publisher;
mod stdout;

pub use error::{PublishError, PublishResult};
pub use http::{HttpPublisher, HttpPublisherConfig};
pub use publisher::{Publisher, PublisherSession};
pub use stdout::StdoutPublisher;
