//! The requeue queue.

use crate::{Policy, Record, SharedPolicy};
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::{debug, trace, warn};

/// Counters describing what the queue has done since creation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct QueueStats {
    /// Fresh records admitted.
    pub submitted: u64,
    /// Failed records accepted back.
    pub requeued: u64,
    /// Records dropped for exceeding the failure limit.
    pub poisoned: u64,
    /// Failed records refused because the queue was full.
    pub overflowed: u64,
    /// Residents dropped to make room for a failed record.
    pub evicted: u64,
    /// Records handed back untouched after a session-level failure.
    pub returned: u64,
    /// Records currently resident.
    pub resident: usize,
}

#[derive(Default)]
struct Counters {
    submitted: AtomicU64,
    requeued: AtomicU64,
    poisoned: AtomicU64,
    overflowed: AtomicU64,
    evicted: AtomicU64,
    returned: AtomicU64,
}

impl Counters {
    fn bump(counter: &AtomicU64, by: u64) {
        counter.fetch_add(by, Ordering::Relaxed);
    }
}

/// In-memory FIFO shared between producers and the drain loop.
///
/// All operations take one short internal lock and never block on I/O.
pub struct RequeueQueue<P> {
    policy: SharedPolicy,
    records: Mutex<VecDeque<Record<P>>>,
    counters: Counters,
}

impl<P> RequeueQueue<P> {
    pub fn new(policy: SharedPolicy) -> Self {
        Self {
            policy,
            records: Mutex::new(VecDeque::new()),
            counters: Counters::default(),
        }
    }

    /// Handle to the policy this queue reads.
    pub fn policy(&self) -> &SharedPolicy {
        &self.policy
    }

    /// Admit a fresh record.
    ///
    /// Never rejects while enabled; the size limit only applies to retries.
    /// While disabled the record is discarded.
    pub fn submit(&self, record: Record<P>) {
        if !self.policy.is_enabled() {
            trace!("relay disabled, discarding record");
            return;
        }

        self.records.lock().push_back(record);
        Counters::bump(&self.counters.submitted, 1);
    }

    /// Put a record whose publish failed back into the queue.
    ///
    /// Returns `false` when the record was dropped, either because it
    /// exceeded the failure limit or because the queue was full.
    pub fn requeue(&self, record: Record<P>) -> bool {
        let policy = self.policy.load();

        if policy.is_poisoned(record.attempt_count()) {
            Counters::bump(&self.counters.poisoned, 1);
            debug!(
                attempts = record.attempt_count(),
                "dropping record that exceeded the failure limit"
            );
            return false;
        }

        let mut records = self.records.lock();

        if let Some(max_size) = policy.max_queue_size {
            if records.len() >= max_size && !policy.bypass_size_limits_on_requeue {
                if !policy.eject_oldest_on_requeue_overflow {
                    drop(records);
                    Counters::bump(&self.counters.overflowed, 1);
                    warn!(max_size, "queue full, dropping failed record");
                    return false;
                }

                if records.pop_front().is_some() {
                    Counters::bump(&self.counters.evicted, 1);
                    warn!(max_size, "queue full, evicted oldest record");
                }
            }
        }

        records.push_back(record);
        drop(records);
        Counters::bump(&self.counters.requeued, 1);
        true
    }

    /// Remove up to `n` records from the head.
    ///
    /// Poisoned records met on the way are dropped and do not count towards `n`.
    pub fn drain_up_to(&self, n: usize) -> Vec<Record<P>> {
        let policy = self.policy.load();
        let mut batch = Vec::with_capacity(n.min(64));
        let mut poisoned = 0u64;

        {
            let mut records = self.records.lock();
            while batch.len() < n {
                let Some(record) = records.pop_front() else {
                    break;
                };
                if policy.is_poisoned(record.attempt_count()) {
                    poisoned += 1;
                    continue;
                }
                batch.push(record);
            }
        }

        if poisoned > 0 {
            Counters::bump(&self.counters.poisoned, poisoned);
            debug!(count = poisoned, "dropped poisoned records while draining");
        }

        batch
    }

    /// Whether every record the next `drain_up_to(n)` would return satisfies
    /// `f`.
    ///
    /// Poisoned residents are skipped, as the pull would skip them. True when
    /// nothing would be returned.
    pub fn next_pull_all(&self, n: usize, f: impl Fn(&Record<P>) -> bool) -> bool {
        let policy = self.policy.load();
        self.records
            .lock()
            .iter()
            .filter(|record| !policy.is_poisoned(record.attempt_count()))
            .take(n)
            .all(f)
    }

    /// Put records back at the tail in their original order.
    ///
    /// No counters are touched and no policy is applied.
    pub fn return_unchanged(&self, batch: impl IntoIterator<Item = Record<P>>) {
        let mut records = self.records.lock();
        let before = records.len();
        records.extend(batch);
        let returned = (records.len() - before) as u64;
        drop(records);

        Counters::bump(&self.counters.returned, returned);
    }

    /// Number of resident records.
    pub fn len(&self) -> usize {
        self.records.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.lock().is_empty()
    }

    /// Snapshot of the counters.
    pub fn stats(&self) -> QueueStats {
        QueueStats {
            submitted: self.counters.submitted.load(Ordering::Relaxed),
            requeued: self.counters.requeued.load(Ordering::Relaxed),
            poisoned: self.counters.poisoned.load(Ordering::Relaxed),
            overflowed: self.counters.overflowed.load(Ordering::Relaxed),
            evicted: self.counters.evicted.load(Ordering::Relaxed),
            returned: self.counters.returned.load(Ordering::Relaxed),
            resident: self.len(),
        }
    }
}

impl<P> Default for RequeueQueue<P> {
    fn default() -> Self {
        Self::new(SharedPolicy::new(Policy::default()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    fn queue_with(policy: Policy) -> RequeueQueue<u32> {
        RequeueQueue::new(SharedPolicy::new(policy))
    }

    fn bounded(max: usize, bypass: bool, eject: bool) -> Policy {
        Policy {
            max_queue_size: Some(max),
            max_failures: None,
            bypass_size_limits_on_requeue: bypass,
            eject_oldest_on_requeue_overflow: eject,
            ..Policy::default()
        }
    }

    fn payloads(batch: &[Record<u32>]) -> Vec<u32> {
        batch.iter().map(|r| *r.payload()).collect()
    }

    #[test]
    fn submit_ignores_size_limit() {
        let queue = queue_with(bounded(2, false, false));
        for i in 0..10 {
            queue.submit(Record::new(i));
        }
        assert_eq!(queue.len(), 10);
        assert_eq!(queue.stats().submitted, 10);
    }

    #[test]
    fn submit_discards_while_disabled() {
        let queue = queue_with(Policy {
            enabled: false,
            ..Policy::default()
        });
        queue.submit(Record::new(1));
        assert!(queue.is_empty());
        assert_eq!(queue.stats().submitted, 0);
    }

    #[test]
    fn strict_bound_rejects_once_full() {
        let queue = queue_with(bounded(10, false, false));
        for i in 0..9 {
            assert!(queue.requeue(Record::new(i)));
        }

        assert!(queue.requeue(Record::new(9)));
        assert!(!queue.requeue(Record::new(10)));

        assert_eq!(queue.len(), 10);
        let stats = queue.stats();
        assert_eq!(stats.requeued, 10);
        assert_eq!(stats.overflowed, 1);
    }

    #[test]
    fn rejected_requeue_leaves_residents_untouched() {
        let queue = queue_with(bounded(3, false, false));
        for i in 0..3 {
            queue.requeue(Record::new(i));
        }
        assert!(!queue.requeue(Record::new(99)));
        assert_eq!(payloads(&queue.drain_up_to(10)), vec![0, 1, 2]);
    }

    #[test]
    fn eviction_drops_oldest_first() {
        let queue = queue_with(bounded(10, false, true));
        for i in 0..9 {
            queue.requeue(Record::new(i));
        }

        assert!(queue.requeue(Record::new(9)));
        assert!(queue.requeue(Record::new(10)));
        assert!(queue.requeue(Record::new(11)));

        assert_eq!(queue.len(), 10);
        let drained = payloads(&queue.drain_up_to(10));
        assert_eq!(drained, (2..12).collect::<Vec<_>>());
        assert_eq!(queue.stats().evicted, 2);
    }

    #[test]
    fn bypass_ignores_limit_with_or_without_eviction() {
        for eject in [false, true] {
            let queue = queue_with(bounded(10, true, eject));
            for i in 0..20 {
                assert!(queue.requeue(Record::new(i)));
            }
            assert_eq!(queue.len(), 20);
            assert_eq!(queue.stats().evicted, 0);
        }
    }

    #[test]
    fn unbounded_accepts_everything() {
        for eject in [false, true] {
            let queue = queue_with(Policy {
                eject_oldest_on_requeue_overflow: eject,
                ..Policy::default()
            });
            for i in 0..35 {
                assert!(queue.requeue(Record::new(i)));
            }
            assert_eq!(queue.len(), 35);
        }
    }

    #[test]
    fn poison_threshold_on_requeue() {
        let queue = queue_with(Policy {
            max_failures: Some(3),
            ..Policy::default()
        });

        assert!(queue.requeue(Record::with_attempts(1, 3)));
        assert!(!queue.requeue(Record::with_attempts(2, 4)));

        assert_eq!(queue.len(), 1);
        assert_eq!(queue.stats().poisoned, 1);
    }

    #[test]
    fn poison_check_comes_before_eviction() {
        let queue = queue_with(Policy {
            max_failures: Some(0),
            ..bounded(1, false, true)
        });
        queue.requeue(Record::new(1));

        assert!(!queue.requeue(Record::with_attempts(2, 1)));
        assert_eq!(payloads(&queue.drain_up_to(5)), vec![1]);
        assert_eq!(queue.stats().evicted, 0);
    }

    #[test]
    fn zero_failures_allowed_still_admits_fresh_retry_count() {
        let queue = queue_with(Policy {
            max_failures: Some(0),
            ..Policy::default()
        });
        assert!(queue.requeue(Record::new(7)));
        assert!(!queue.requeue(Record::new(8).into_retry()));
    }

    #[test]
    fn drain_skips_poisoned_without_counting_them() {
        let shared = SharedPolicy::new(Policy::default());
        let queue: RequeueQueue<u32> = RequeueQueue::new(shared.clone());

        queue.submit(Record::with_attempts(1, 0));
        queue.submit(Record::with_attempts(2, 5));
        queue.submit(Record::with_attempts(3, 1));
        queue.submit(Record::with_attempts(4, 9));
        queue.submit(Record::with_attempts(5, 0));

        // Tightened after admission: residents with more than 1 failure are now poisoned.
        shared.replace(Policy {
            max_failures: Some(1),
            ..Policy::default()
        });

        let batch = queue.drain_up_to(2);
        assert_eq!(payloads(&batch), vec![1, 3]);
        assert_eq!(queue.stats().poisoned, 1);

        let rest = queue.drain_up_to(10);
        assert_eq!(payloads(&rest), vec![5]);
        assert_eq!(queue.stats().poisoned, 2);
        assert!(queue.is_empty());
    }

    #[test]
    fn drain_respects_cap_and_order() {
        let queue: RequeueQueue<u32> = RequeueQueue::default();
        for i in 0..5 {
            queue.submit(Record::new(i));
        }
        assert_eq!(payloads(&queue.drain_up_to(3)), vec![0, 1, 2]);
        assert_eq!(payloads(&queue.drain_up_to(3)), vec![3, 4]);
        assert!(queue.drain_up_to(3).is_empty());
    }

    #[test]
    fn next_pull_all_looks_at_what_drain_would_return() {
        let queue = queue_with(Policy {
            max_failures: Some(1),
            ..Policy::default()
        });
        queue.submit(Record::with_attempts(0, 5));
        queue.submit(Record::new(1).pulled_in(3));
        queue.submit(Record::new(2));

        // Poisoned head is skipped, 1 was pulled in pass 3, 2 was not.
        assert!(queue.next_pull_all(1, |r| r.last_pass() == 3));
        assert!(!queue.next_pull_all(2, |r| r.last_pass() == 3));
        // Looking ahead drops nothing.
        assert_eq!(queue.len(), 3);
        assert_eq!(queue.stats().poisoned, 0);

        let empty: RequeueQueue<u32> = RequeueQueue::default();
        assert!(empty.next_pull_all(4, |_| false));
    }

    #[test]
    fn return_unchanged_keeps_counters_and_ignores_limits() {
        let queue = queue_with(Policy {
            max_failures: Some(0),
            ..bounded(1, false, false)
        });
        queue.submit(Record::new(0));
        let batch = vec![
            Record::with_attempts(1, 0),
            Record::with_attempts(2, 0),
        ];

        queue.return_unchanged(batch);

        assert_eq!(queue.len(), 3);
        let drained = queue.drain_up_to(10);
        assert_eq!(payloads(&drained), vec![0, 1, 2]);
        assert!(drained.iter().all(|r| r.attempt_count() == 0));
        assert_eq!(queue.stats().returned, 2);
    }

    #[test]
    fn concurrent_submits_are_all_admitted() {
        let queue: Arc<RequeueQueue<u32>> = Arc::new(RequeueQueue::default());
        let handles: Vec<_> = (0..8)
            .map(|t| {
                let queue = Arc::clone(&queue);
                thread::spawn(move || {
                    for i in 0..500 {
                        queue.submit(Record::new(t * 1000 + i));
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }
        assert_eq!(queue.len(), 4000);
    }
}
