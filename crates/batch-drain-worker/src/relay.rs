//! Relay facade owning the queue, the policy and the drain loop task.

use crate::{CycleReport, DrainLoop, WirePayload};
use broker_publisher::Publisher;
use parking_lot::Mutex;
use query_log_record::QueryLogEntry;
use requeue_queue::{Policy, QueueStats, Record, RequeueQueue, SharedPolicy};
use std::sync::Arc;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tracing::{debug, info};

/// Handle on a running timer task.
struct Worker {
    shutdown: oneshot::Sender<()>,
    handle: JoinHandle<()>,
}

/// Buffers query log entries and ships them to the broker.
///
/// Producers call [`QueryLogRelay::submit`] from any thread; it never waits
/// on the broker. The timer task is started with [`QueryLogRelay::start`]
/// and stopped with [`QueryLogRelay::shutdown`] or by a reconfiguration
/// that disables the relay.
pub struct QueryLogRelay<P: WirePayload = QueryLogEntry> {
    policy: SharedPolicy,
    queue: Arc<RequeueQueue<P>>,
    drain: Arc<DrainLoop<P>>,
    worker: Mutex<Option<Worker>>,
}

impl<P: WirePayload> QueryLogRelay<P> {
    pub fn new(policy: Policy, publisher: Arc<dyn Publisher>) -> Self {
        let policy = SharedPolicy::new(policy);
        let queue = Arc::new(RequeueQueue::new(policy.clone()));
        let drain = Arc::new(DrainLoop::new(Arc::clone(&queue), publisher));

        Self {
            policy,
            queue,
            drain,
            worker: Mutex::new(None),
        }
    }

    /// Hand over a fresh entry. Discarded while the relay is disabled.
    pub fn submit(&self, payload: P) {
        self.queue.submit(Record::new(payload));
    }

    /// Start the timer task if enabled and not already running.
    ///
    /// Must be called from within a tokio runtime. Returns whether a new task
    /// was spawned.
    pub fn start(&self) -> bool {
        if !self.policy.is_enabled() {
            debug!("relay disabled, not starting drain loop");
            return false;
        }

        let mut worker = self.worker.lock();
        if worker.as_ref().is_some_and(|w| !w.handle.is_finished()) {
            return false;
        }

        let (shutdown, rx) = oneshot::channel();
        let handle = Arc::clone(&self.drain).spawn(rx);
        *worker = Some(Worker { shutdown, handle });
        true
    }

    /// Atomically replace the policy.
    ///
    /// Enabling starts the timer task, disabling signals it to stop after
    /// any in-flight cycle. Resident records are kept either way.
    pub fn reconfigure(&self, policy: Policy) {
        let enabled = policy.enabled;
        let previous = self.policy.replace(policy);
        info!(
            enabled,
            was_enabled = previous.enabled,
            "relay policy replaced"
        );

        if enabled {
            self.start();
        } else if let Some(worker) = self.worker.lock().take() {
            let _ = worker.shutdown.send(());
        }
    }

    /// Run one drain cycle now. Skipped if a cycle is already in flight.
    pub async fn flush_now(&self) -> CycleReport {
        self.drain.run_cycle().await
    }

    /// Disable the relay and wait for the timer task to stop.
    ///
    /// An in-flight cycle completes; resident records are left unflushed.
    pub async fn shutdown(&self) {
        self.policy.disable();

        let worker = self.worker.lock().take();
        if let Some(worker) = worker {
            let _ = worker.shutdown.send(());
            if let Err(e) = worker.handle.await {
                debug!(error = %e, "drain loop task ended abnormally");
            }
        }

        info!(unflushed = self.queue.len(), "relay shut down");
    }

    /// Whether the timer task is alive.
    pub fn is_running(&self) -> bool {
        self.worker
            .lock()
            .as_ref()
            .is_some_and(|w| !w.handle.is_finished())
    }

    pub fn policy(&self) -> Arc<Policy> {
        self.policy.load()
    }

    pub fn queue_len(&self) -> usize {
        self.queue.len()
    }

    pub fn stats(&self) -> QueueStats {
        self.queue.stats()
    }
}

impl<P: WirePayload> Drop for QueryLogRelay<P> {
    fn drop(&mut self) {
        self.policy.disable();
        if let Some(worker) = self.worker.get_mut().take() {
            let _ = worker.shutdown.send(());
        }
    }
}
