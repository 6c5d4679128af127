//! Failure-aware requeue queue.
//!
//! This crate provides:
//! - Record: a payload plus the number of failed publish attempts
//! - Policy / SharedPolicy: admission, eviction and batching knobs
//! - RequeueQueue: FIFO that admits fresh records unconditionally and polices retries
//!
//! Fresh traffic goes through [`RequeueQueue::submit`] and is never rejected
//! while the relay is enabled. Records that failed to publish come back
//! through [`RequeueQueue::requeue`], which applies the poison threshold and
//! the size limit.

mod policy;
mod queue;
mod record;

pub use policy::{Policy, SharedPolicy};
pub use queue::{QueueStats, RequeueQueue};
pub use record::Record;
