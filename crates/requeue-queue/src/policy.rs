//! Queue and sender policy.

use parking_lot::RwLock;
use relay_config_and_utils::Config;
use std::sync::Arc;
use std::time::Duration;

/// Admission, eviction and batching knobs.
///
/// A policy is never mutated after construction. Reconfiguration builds a new
/// value and swaps it in through [`SharedPolicy::replace`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Policy {
    /// Gate on fresh admission and on the drain loop.
    pub enabled: bool,
    /// Resident limit on the retry path, `None` for unbounded.
    pub max_queue_size: Option<usize>,
    /// Highest attempt count still allowed in the queue, `None` for unlimited.
    pub max_failures: Option<u32>,
    pub bypass_size_limits_on_requeue: bool,
    pub eject_oldest_on_requeue_overflow: bool,
    /// Maximum records pulled per batch, at least 1.
    pub batch_max_size: usize,
    /// Zero drains until empty within a cycle; otherwise one batch per cycle.
    pub inter_batch_delay: Duration,
    /// Fixed delay between the end of one cycle and the start of the next.
    pub cold_delay: Duration,
    /// Added to `cold_delay` after a session-level failure.
    pub post_failure_delay: Duration,
}

impl Default for Policy {
    fn default() -> Self {
        Self::from_config(&Config::default())
    }
}

impl Policy {
    /// Build a policy from validated configuration.
    ///
    /// Negative limits map to `None`.
    pub fn from_config(config: &Config) -> Self {
        Self {
            enabled: config.enabled,
            max_queue_size: usize::try_from(config.queue_max_size).ok(),
            max_failures: u32::try_from(config.queue_max_failures).ok(),
            bypass_size_limits_on_requeue: config.queue_failures_bypass_size_limits,
            eject_oldest_on_requeue_overflow: config.queue_failures_eject_oldest_on_requeue,
            batch_max_size: config.sender_batch_max_size.max(1),
            inter_batch_delay: Duration::from_millis(config.sender_inter_batch_delay_ms),
            cold_delay: Duration::from_millis(config.sender_cold_delay_ms),
            post_failure_delay: Duration::from_millis(config.sender_post_failure_delay_ms),
        }
    }

    /// Whether a record with `attempt_count` failures must be dropped.
    pub fn is_poisoned(&self, attempt_count: u32) -> bool {
        self.max_failures
            .is_some_and(|max_failures| attempt_count > max_failures)
    }

    /// Whether one cycle keeps draining until the queue is empty.
    pub fn drains_continuously(&self) -> bool {
        self.inter_batch_delay.is_zero()
    }
}

/// Process-wide handle to the current [`Policy`].
///
/// Readers take a cheap `Arc` snapshot; the snapshot stays consistent for as
/// long as they hold it, even if a new policy is swapped in meanwhile.
#[derive(Debug, Clone)]
pub struct SharedPolicy {
    current: Arc<RwLock<Arc<Policy>>>,
}

impl SharedPolicy {
    pub fn new(policy: Policy) -> Self {
        Self {
            current: Arc::new(RwLock::new(Arc::new(policy))),
        }
    }

    /// Snapshot of the current policy.
    pub fn load(&self) -> Arc<Policy> {
        Arc::clone(&self.current.read())
    }

    /// Atomically swap in a new policy, returning the previous one.
    pub fn replace(&self, policy: Policy) -> Arc<Policy> {
        std::mem::replace(&mut *self.current.write(), Arc::new(policy))
    }

    /// Swap in a copy of the current policy with `enabled` cleared.
    pub fn disable(&self) -> Arc<Policy> {
        let mut guard = self.current.write();
        let disabled = Policy {
            enabled: false,
            ..Policy::clone(&guard)
        };
        std::mem::replace(&mut *guard, Arc::new(disabled))
    }

    pub fn is_enabled(&self) -> bool {
        self.current.read().enabled
    }
}

impl Default for SharedPolicy {
    fn default() -> Self {
        Self::new(Policy::default())
    }
}
