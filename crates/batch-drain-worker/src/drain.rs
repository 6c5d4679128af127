//! The drain loop.
//!
//! One cycle pulls batches from the queue and publishes them through a fresh
//! publisher session per batch. Cycles are single-flight: a cycle requested
//! while another one runs is skipped, whether it came from the timer or from
//! a manual trigger.
//!
//! Each cycle is a numbered pass and stamps the records it pulls, which lets
//! it drain every record it has not tried yet without looping over the ones
//! that just failed.

use crate::WirePayload;
use broker_publisher::{PublishError, Publisher, PublisherSession};
use futures_util::FutureExt;
use requeue_queue::{Policy, Record, RequeueQueue};
use std::collections::VecDeque;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{oneshot, Mutex};
use tokio::task::JoinHandle;
use tokio::time::sleep;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// What happened to one batch.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BatchOutcome {
    /// Records pulled from the queue.
    pub pulled: usize,
    pub published: usize,
    /// Failed records accepted back by the queue.
    pub requeued: usize,
    /// Failed records the queue refused (poisoned or overflow).
    pub dropped: usize,
    /// Records handed back untouched after a session-level failure.
    pub returned: usize,
    pub session_failed: bool,
}

/// Totals for one cycle.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CycleReport {
    /// Another cycle was running; nothing was done.
    pub skipped: bool,
    pub batches: usize,
    pub published: usize,
    pub requeued: usize,
    pub dropped: usize,
    pub returned: usize,
    pub session_failed: bool,
}

impl CycleReport {
    fn skipped() -> Self {
        Self {
            skipped: true,
            ..Self::default()
        }
    }

    fn absorb(&mut self, outcome: &BatchOutcome) {
        self.batches += 1;
        self.published += outcome.published;
        self.requeued += outcome.requeued;
        self.dropped += outcome.dropped;
        self.returned += outcome.returned;
        self.session_failed |= outcome.session_failed;
    }

    /// Whether any record was pulled.
    pub fn did_work(&self) -> bool {
        self.batches > 0
    }
}

/// Drains a [`RequeueQueue`] into a [`Publisher`].
pub struct DrainLoop<P> {
    queue: Arc<RequeueQueue<P>>,
    publisher: Arc<dyn Publisher>,
    /// Held for the whole cycle.
    in_flight: Mutex<()>,
    /// Number of the current or last cycle. Records pulled are stamped with it.
    pass: AtomicU64,
}

impl<P: WirePayload> DrainLoop<P> {
    pub fn new(queue: Arc<RequeueQueue<P>>, publisher: Arc<dyn Publisher>) -> Self {
        Self {
            queue,
            publisher,
            in_flight: Mutex::new(()),
            pass: AtomicU64::new(0),
        }
    }

    pub fn queue(&self) -> &Arc<RequeueQueue<P>> {
        &self.queue
    }

    /// Run one cycle unless another one is in flight.
    ///
    /// With a zero inter-batch delay the cycle keeps pulling batches until
    /// the queue is empty. Records that failed and came back are not tried a
    /// second time in the same cycle: once everything the next pull would
    /// return was already pulled by this cycle, it ends and those records
    /// wait for the next firing.
    pub async fn run_cycle(&self) -> CycleReport {
        let Ok(_guard) = self.in_flight.try_lock() else {
            debug!("drain cycle already in flight, skipping");
            return CycleReport::skipped();
        };

        let pass = self.pass.fetch_add(1, Ordering::SeqCst) + 1;
        let mut report = CycleReport::default();

        loop {
            let policy = self.queue.policy().load();
            if !policy.enabled {
                break;
            }

            let outcome = self.run_batch(&policy).await;
            if outcome.pulled == 0 {
                break;
            }
            report.absorb(&outcome);

            if !policy.drains_continuously() {
                break;
            }
            if self
                .queue
                .next_pull_all(policy.batch_max_size, |r| r.last_pass() == pass)
            {
                if !self.queue.is_empty() {
                    debug!(pass, "remaining records already tried in this cycle");
                }
                break;
            }
        }

        if report.did_work() {
            let stats = self.queue.stats();
            info!(
                batches = report.batches,
                published = report.published,
                requeued = report.requeued,
                dropped = report.dropped,
                returned = report.returned,
                resident = stats.resident,
                "drain cycle finished"
            );
            debug!(
                submitted = stats.submitted,
                requeued = stats.requeued,
                poisoned = stats.poisoned,
                overflowed = stats.overflowed,
                evicted = stats.evicted,
                returned = stats.returned,
                "queue totals"
            );
        }

        report
    }

    /// Pull one batch and publish it.
    ///
    /// Records still unpublished when the session fails, or when publishing
    /// panics, go back to the queue untouched. The session is closed on every
    /// path once opened.
    pub async fn run_batch(&self, policy: &Policy) -> BatchOutcome {
        let pass = self.pass.load(Ordering::SeqCst);
        let mut pending: VecDeque<Record<P>> = self
            .queue
            .drain_up_to(policy.batch_max_size)
            .into_iter()
            .map(|record| record.pulled_in(pass))
            .collect();
        if pending.is_empty() {
            return BatchOutcome::default();
        }

        let batch_id = Uuid::new_v4();
        let mut outcome = BatchOutcome {
            pulled: pending.len(),
            ..BatchOutcome::default()
        };

        let mut session = match self.publisher.open().await {
            Ok(session) => session,
            Err(e) => {
                warn!(
                    batch_id = %batch_id,
                    publisher = self.publisher.name(),
                    records = outcome.pulled,
                    error = %e,
                    "failed to open publisher session, returning batch"
                );
                outcome.returned = outcome.pulled;
                outcome.session_failed = true;
                self.queue.return_unchanged(pending);
                return outcome;
            }
        };

        debug!(batch_id = %batch_id, records = outcome.pulled, "publishing batch");

        let published = AssertUnwindSafe(self.publish_pending(
            &mut pending,
            session.as_mut(),
            &batch_id,
            &mut outcome,
        ))
        .catch_unwind()
        .await;

        match published {
            Ok(None) => {}
            Ok(Some(e)) => warn!(
                batch_id = %batch_id,
                returned = pending.len(),
                error = %e,
                "publisher session failed mid-batch, returning remaining records"
            ),
            Err(_) => warn!(
                batch_id = %batch_id,
                returned = pending.len(),
                "publishing panicked mid-batch, returning remaining records"
            ),
        }

        if !pending.is_empty() {
            outcome.returned = pending.len();
            outcome.session_failed = true;
            self.queue.return_unchanged(pending);
        }

        if let Err(e) = session.close().await {
            debug!(batch_id = %batch_id, error = %e, "failed to close publisher session");
        }

        outcome
    }

    /// Publish from the front of `pending` until it is empty or the session
    /// fails.
    ///
    /// A record leaves `pending` only once its outcome is settled, so on a
    /// session failure or a panic `pending` holds exactly the unpublished
    /// records.
    async fn publish_pending(
        &self,
        pending: &mut VecDeque<Record<P>>,
        session: &mut dyn PublisherSession,
        batch_id: &Uuid,
        outcome: &mut BatchOutcome,
    ) -> Option<PublishError> {
        loop {
            let wire = match pending.front() {
                Some(record) => record.payload().to_wire(),
                None => return None,
            };
            let result = match wire {
                Ok(bytes) => session.publish_one(&bytes).await,
                Err(e) => Err(e),
            };

            match result {
                Err(e) if e.is_session_level() => return Some(e),
                result => {
                    let Some(record) = pending.pop_front() else {
                        return None;
                    };
                    match result {
                        Ok(()) => outcome.published += 1,
                        Err(e) => self.retry_later(record, &e, batch_id, outcome),
                    }
                }
            }
        }
    }

    fn retry_later(
        &self,
        record: Record<P>,
        error: &PublishError,
        batch_id: &Uuid,
        outcome: &mut BatchOutcome,
    ) {
        let retry = record.into_retry();
        let attempts = retry.attempt_count();

        if self.queue.requeue(retry) {
            outcome.requeued += 1;
            debug!(batch_id = %batch_id, attempts, error = %error, "publish failed, record requeued");
        } else {
            outcome.dropped += 1;
            debug!(batch_id = %batch_id, attempts, error = %error, "publish failed, record dropped");
        }
    }

    /// Spawn the timer task.
    ///
    /// The first cycle runs one cold delay after the call, each following
    /// one a cold delay after the previous cycle ended, plus the post-failure
    /// delay when the broker was unreachable. The task ends on shutdown or
    /// once the policy is disabled; a cycle in flight always completes.
    pub fn spawn(self: Arc<Self>, mut shutdown: oneshot::Receiver<()>) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut delay = self.queue.policy().load().cold_delay;
            info!(first_cycle_ms = delay.as_millis() as u64, "drain loop started");

            loop {
                tokio::select! {
                    _ = &mut shutdown => {
                        info!("drain loop received shutdown signal");
                        break;
                    }
                    _ = sleep(delay) => {
                        if !self.queue.policy().is_enabled() {
                            info!("relay disabled, drain loop stopping");
                            break;
                        }

                        let report = self.run_cycle().await;
                        delay = next_delay(&self.queue.policy().load(), &report);
                    }
                }
            }

            debug!("drain loop task stopped");
        })
    }
}

fn next_delay(policy: &Policy, report: &CycleReport) -> Duration {
    if report.session_failed {
        policy.cold_delay.saturating_add(policy.post_failure_delay)
    } else {
        policy.cold_delay
    }
}
