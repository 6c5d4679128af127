//! Batch drain worker: ships buffered query log entries to the broker.
//!
//! Producers hand entries to a [`QueryLogRelay`], which keeps them in a
//! failure-aware [`requeue_queue::RequeueQueue`]. A timer task wakes on a
//! fixed interval and runs a [`DrainLoop`] cycle: pull a batch, open a
//! publisher session, publish record by record, reconcile failures.
//!
//! # Core Invariants
//!
//! 1. **Non-blocking admission**: `submit` never waits on the broker
//! 2. **Single-flight**: at most one cycle runs at a time
//! 3. **Unreachable broker loses nothing**: a session-level failure returns
//!    every unpublished record unchanged, attempt counters included
//! 4. **Bounded retries**: a record-level failure bumps the attempt counter
//!    and goes through the queue's admission rules
//! 5. **No record left behind**: a cycle only ends early once every record
//!    at the head was already tried in that cycle
//!
//! # Architecture
//!
//! ```text
//! producers -> submit -> RequeueQueue -> DrainLoop -> PublisherSession -> broker
//!                             ^              |
//!                             |__ requeue ___|  (record-level failure)
//!                             |__ return  ___|  (session-level failure)
//! ```

pub mod drain;
mod payload;
pub mod relay;

#[cfg(test)]
mod tests;

pub use drain::{BatchOutcome, CycleReport, DrainLoop};
pub use payload::WirePayload;
pub use relay::QueryLogRelay;
