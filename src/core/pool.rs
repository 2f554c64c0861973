//! Elastic worker pool backed by dedicated OS threads.
//!
//! Workers pull items from a shared [`TaskQueue`] and make their own scale
//! decisions: a worker that observes backlog reserves a population slot and
//! spawns one sibling, a worker that polls an empty queue releases its slot
//! and retires. There is no supervisor thread; the pool converges between
//! `min_workers` and `max_workers` purely through these per-worker
//! observations.
//!
//! # Design
//!
//! - **Self-reported population**: the live worker count is a single shared
//!   atomic, incremented and decremented only by workers about themselves
//! - **Bounded transitions**: slot reservation and release go through
//!   compare-and-swap loops, so the count never leaves `min..=max` while
//!   the pool is running, and each observation changes it by at most one
//! - **Panic isolation**: a panicking item is caught at the worker
//!   boundary and counted as failed; the worker keeps serving
//! - **Cooperative shutdown**: `shutdown` flips a flag and returns;
//!   each worker observes it at its next loop iteration and exits

use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use tracing::{debug, info, warn};

use crate::config::PoolConfig;
use crate::core::error::{PoolError, QueueError};
use crate::core::queue::TaskQueue;
use crate::core::runner::{CallerBudget, QuotaRunner, RunOutcome};

/// A unit of work submitted to the pool.
///
/// Wraps an opaque action together with the budget of the caller it runs
/// for. Untagged items execute directly on the worker; tagged items execute
/// under the pool's [`QuotaRunner`].
pub struct WorkItem {
    action: Box<dyn FnOnce() + Send + 'static>,
    budget: Option<Arc<CallerBudget>>,
}

impl WorkItem {
    /// Wrap an action as an untagged work item.
    pub fn new(action: impl FnOnce() + Send + 'static) -> Self {
        Self {
            action: Box::new(action),
            budget: None,
        }
    }

    /// Wrap an action as work charged to `budget` when executed.
    pub fn for_caller(action: impl FnOnce() + Send + 'static, budget: Arc<CallerBudget>) -> Self {
        Self {
            action: Box::new(action),
            budget: Some(budget),
        }
    }

    fn into_parts(self) -> (Box<dyn FnOnce() + Send + 'static>, Option<Arc<CallerBudget>>) {
        (self.action, self.budget)
    }
}

impl std::fmt::Debug for WorkItem {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkItem")
            .field("budgeted", &self.budget.is_some())
            .finish_non_exhaustive()
    }
}

/// Statistics about pool population and throughput.
#[derive(Debug, Clone, Default)]
pub struct PoolStats {
    /// Workers currently alive (self-reported).
    pub live_workers: usize,

    /// Configured population floor.
    pub min_workers: usize,

    /// Configured population ceiling.
    pub max_workers: usize,

    /// Items waiting in the queue.
    pub queue_depth: usize,

    /// Items currently executing.
    pub active_items: u64,

    /// Items that ran to completion.
    pub completed_items: u64,

    /// Items that panicked during execution.
    pub failed_items: u64,

    /// Budgeted items whose caller ran out of budget mid-execution.
    pub abandoned_items: u64,

    /// Workers spawned over the pool's lifetime, initial population included.
    pub spawned_workers: u64,

    /// Workers that retired after polling an idle queue.
    pub retired_workers: u64,
}

/// Internal counters for pool statistics (thread-safe).
#[derive(Debug, Default)]
pub(crate) struct PoolCounters {
    pub active_items: AtomicU64,
    pub completed_items: AtomicU64,
    pub failed_items: AtomicU64,
    pub abandoned_items: AtomicU64,
    pub spawned_workers: AtomicU64,
    pub retired_workers: AtomicU64,
}

impl PoolCounters {
    /// Get a snapshot of current statistics.
    pub fn snapshot(&self, live: usize, min: usize, max: usize, queue_depth: usize) -> PoolStats {
        PoolStats {
            live_workers: live,
            min_workers: min,
            max_workers: max,
            queue_depth,
            active_items: self.active_items.load(Ordering::Relaxed),
            completed_items: self.completed_items.load(Ordering::Relaxed),
            failed_items: self.failed_items.load(Ordering::Relaxed),
            abandoned_items: self.abandoned_items.load(Ordering::Relaxed),
            spawned_workers: self.spawned_workers.load(Ordering::Relaxed),
            retired_workers: self.retired_workers.load(Ordering::Relaxed),
        }
    }
}

/// State shared between the pool handle and every worker thread.
struct PoolShared {
    queue: TaskQueue<WorkItem>,
    runner: QuotaRunner,
    counters: PoolCounters,
    /// Live worker population. Mutated only by workers about themselves,
    /// plus the initial reservation in `start`.
    live: AtomicUsize,
    min_workers: usize,
    max_workers: usize,
    poll_interval: Duration,
    shutdown: AtomicBool,
    next_worker_id: AtomicU64,
}

/// Elastic pool of worker threads draining a [`TaskQueue`].
///
/// Start it with [`ElasticPool::start`], keep a queue handle for
/// submitting, and call [`ElasticPool::shutdown`] when done. Dropping the
/// pool signals shutdown as well; workers are never joined, they retire on
/// their own within one poll interval.
pub struct ElasticPool {
    shared: Arc<PoolShared>,
}

impl ElasticPool {
    /// Start a pool of `config.min_workers` workers against `queue`.
    ///
    /// The pool keeps its own handle to the queue; the caller retains
    /// theirs for submitting work.
    ///
    /// # Errors
    ///
    /// Returns [`PoolError::InvalidConfig`] if the configuration fails
    /// validation.
    pub fn start(config: &PoolConfig, queue: TaskQueue<WorkItem>) -> Result<Self, PoolError> {
        config.validate().map_err(PoolError::InvalidConfig)?;

        let shared = Arc::new(PoolShared {
            queue,
            runner: QuotaRunner::from_config(config),
            counters: PoolCounters::default(),
            live: AtomicUsize::new(0),
            min_workers: config.min_workers,
            max_workers: config.max_workers,
            poll_interval: config.poll_interval(),
            shutdown: AtomicBool::new(false),
            next_worker_id: AtomicU64::new(0),
        });

        for _ in 0..config.min_workers {
            shared.live.fetch_add(1, Ordering::AcqRel);
            spawn_worker(Arc::clone(&shared));
        }

        info!(
            min_workers = config.min_workers,
            max_workers = config.max_workers,
            poll_interval_ms = config.poll_interval_ms,
            "Elastic pool started"
        );

        Ok(Self { shared })
    }

    /// Handle to the queue this pool consumes from.
    #[must_use]
    pub fn queue(&self) -> &TaskQueue<WorkItem> {
        &self.shared.queue
    }

    /// Number of workers currently alive (self-reported).
    #[must_use]
    pub fn live_workers(&self) -> usize {
        self.shared.live.load(Ordering::Acquire)
    }

    /// Get current pool statistics.
    #[must_use]
    pub fn stats(&self) -> PoolStats {
        self.shared.counters.snapshot(
            self.live_workers(),
            self.shared.min_workers,
            self.shared.max_workers,
            self.shared.queue.len(),
        )
    }

    /// Broadcast the stop signal and return without waiting.
    ///
    /// Workers observe the signal at their next loop iteration, decrement
    /// the population counter, and exit. In-flight work is not awaited and
    /// items still queued are left behind. Calling this more than once is
    /// a no-op.
    pub fn shutdown(&self) {
        if self.shared.shutdown.swap(true, Ordering::AcqRel) {
            return; // Already shut down
        }
        info!("Elastic pool shutting down");
    }
}

impl Drop for ElasticPool {
    fn drop(&mut self) {
        // Signal shutdown but don't join workers; they observe the flag
        // within one poll interval and exit on their own.
        if !self.shared.shutdown.swap(true, Ordering::AcqRel) {
            debug!("Elastic pool dropped without explicit shutdown, workers will retire");
        }
    }
}

/// Reserve a population slot, failing once `live` has reached `max`.
fn reserve_worker_slot(live: &AtomicUsize, max: usize) -> bool {
    live.fetch_update(Ordering::AcqRel, Ordering::Acquire, |count| {
        (count < max).then_some(count + 1)
    })
    .is_ok()
}

/// Release a population slot, failing once `live` has dropped to `min`.
fn release_worker_slot(live: &AtomicUsize, min: usize) -> bool {
    live.fetch_update(Ordering::AcqRel, Ordering::Acquire, |count| {
        (count > min).then_some(count - 1)
    })
    .is_ok()
}

/// Spawn a worker thread into an already-reserved population slot.
fn spawn_worker(shared: Arc<PoolShared>) {
    let worker_id = shared.next_worker_id.fetch_add(1, Ordering::Relaxed);
    shared.counters.spawned_workers.fetch_add(1, Ordering::Relaxed);

    thread::Builder::new()
        .name(format!("tidepool-worker-{worker_id}"))
        .spawn(move || worker_loop(&shared, worker_id))
        .expect("Failed to spawn worker thread");
}

/// Per-worker event loop: race an item against the poll tick, scale on
/// what was observed, exit on shutdown.
fn worker_loop(shared: &Arc<PoolShared>, worker_id: u64) {
    debug!(worker_id = worker_id, "Worker thread started");

    loop {
        if shared.shutdown.load(Ordering::Acquire) {
            shared.live.fetch_sub(1, Ordering::AcqRel);
            debug!(worker_id = worker_id, "Worker observed shutdown, exiting");
            break;
        }

        match shared.queue.take_timeout(shared.poll_interval) {
            Ok(item) => {
                // Backlog behind this item: fan out one sibling, then
                // execute. A received item is always executed.
                if !shared.queue.is_empty() && reserve_worker_slot(&shared.live, shared.max_workers)
                {
                    spawn_worker(Arc::clone(shared));
                }
                execute_item(shared, worker_id, item);
            }
            Err(QueueError::Timeout) => {
                if !shared.queue.is_empty() {
                    if reserve_worker_slot(&shared.live, shared.max_workers) {
                        spawn_worker(Arc::clone(shared));
                    }
                } else if release_worker_slot(&shared.live, shared.min_workers) {
                    shared.counters.retired_workers.fetch_add(1, Ordering::Relaxed);
                    debug!(worker_id = worker_id, "Worker retiring, queue idle");
                    break;
                }
            }
            Err(_) => {
                // Queue closed and drained; nothing left to serve.
                shared.live.fetch_sub(1, Ordering::AcqRel);
                debug!(worker_id = worker_id, "Worker queue closed, exiting");
                break;
            }
        }
    }
}

/// Execute one item, isolating panics and routing budgeted work through
/// the quota runner.
fn execute_item(shared: &PoolShared, worker_id: u64, item: WorkItem) {
    shared.counters.active_items.fetch_add(1, Ordering::Relaxed);
    let (action, budget) = item.into_parts();

    match budget {
        Some(budget) => {
            debug!(
                worker_id = worker_id,
                caller = %budget.id(),
                "Worker executing budgeted item"
            );
            match shared.runner.run(action, &budget) {
                RunOutcome::Completed => {
                    shared.counters.completed_items.fetch_add(1, Ordering::Relaxed);
                }
                RunOutcome::Abandoned => {
                    shared.counters.abandoned_items.fetch_add(1, Ordering::Relaxed);
                    debug!(
                        worker_id = worker_id,
                        caller = %budget.id(),
                        "Worker abandoned budgeted item"
                    );
                }
            }
        }
        None => {
            if panic::catch_unwind(AssertUnwindSafe(action)).is_ok() {
                shared.counters.completed_items.fetch_add(1, Ordering::Relaxed);
            } else {
                shared.counters.failed_items.fetch_add(1, Ordering::Relaxed);
                warn!(worker_id = worker_id, "Work item panicked, worker continues");
            }
        }
    }

    shared.counters.active_items.fetch_sub(1, Ordering::Relaxed);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reserve_slot_respects_max() {
        let live = AtomicUsize::new(2);
        assert!(reserve_worker_slot(&live, 3));
        assert_eq!(live.load(Ordering::Acquire), 3);
        assert!(!reserve_worker_slot(&live, 3));
        assert_eq!(live.load(Ordering::Acquire), 3);
    }

    #[test]
    fn test_release_slot_respects_min() {
        let live = AtomicUsize::new(2);
        assert!(release_worker_slot(&live, 1));
        assert_eq!(live.load(Ordering::Acquire), 1);
        assert!(!release_worker_slot(&live, 1));
        assert_eq!(live.load(Ordering::Acquire), 1);
    }

    #[test]
    fn test_slot_accounting_under_contention() {
        let live = Arc::new(AtomicUsize::new(0));
        let mut handles = Vec::new();
        for _ in 0..8 {
            let live = Arc::clone(&live);
            handles.push(thread::spawn(move || {
                let mut reserved = 0;
                for _ in 0..1000 {
                    if reserve_worker_slot(&live, 5) {
                        reserved += 1;
                        release_worker_slot(&live, 0);
                    }
                }
                reserved
            }));
        }
        for handle in handles {
            handle.join().unwrap();
        }
        // Every reservation was paired with a release.
        assert_eq!(live.load(Ordering::Acquire), 0);
    }

    #[test]
    fn test_pool_counters_snapshot() {
        let counters = PoolCounters::default();
        counters.completed_items.fetch_add(7, Ordering::Relaxed);
        counters.failed_items.fetch_add(2, Ordering::Relaxed);
        counters.spawned_workers.fetch_add(3, Ordering::Relaxed);

        let stats = counters.snapshot(3, 1, 4, 12);
        assert_eq!(stats.live_workers, 3);
        assert_eq!(stats.min_workers, 1);
        assert_eq!(stats.max_workers, 4);
        assert_eq!(stats.queue_depth, 12);
        assert_eq!(stats.completed_items, 7);
        assert_eq!(stats.failed_items, 2);
        assert_eq!(stats.spawned_workers, 3);
    }

    #[test]
    fn test_start_rejects_invalid_config() {
        let config = PoolConfig {
            max_workers: 0,
            ..PoolConfig::default()
        };
        let result = ElasticPool::start(&config, TaskQueue::new(4));
        assert!(matches!(result, Err(PoolError::InvalidConfig(_))));
    }

    #[test]
    fn test_work_item_debug_reports_budget_tag() {
        let plain = WorkItem::new(|| ());
        assert!(format!("{plain:?}").contains("budgeted: false"));

        let budget = Arc::new(CallerBudget::new(false));
        let tagged = WorkItem::for_caller(|| (), budget);
        assert!(format!("{tagged:?}").contains("budgeted: true"));
    }
}
