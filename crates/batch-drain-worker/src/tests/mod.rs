//! Behaviour tests for the drain worker.
//!
//! - `harness.rs`            - Scripted publisher, test payload and builders
//! - `batch.rs`              - Publishing, per-record failures and the retry counter
//! - `connection_failure.rs` - Session-level failures never lose or age records
//! - `single_flight.rs`      - One cycle at a time, producers never blocked
//! - `scheduling.rs`         - Timer task: cold start, fixed interval, inter-batch mode
//! - `lifecycle.rs`          - Relay start, reconfiguration and shutdown
