//! Quota-gated execution of work on behalf of budgeted callers.
//!
//! The runner executes a unit of work on a dedicated thread and samples its
//! wall-clock runtime at a fixed cadence, charging each sample slice to the
//! owning caller's cumulative budget. Free-tier callers whose cumulative
//! usage reaches the budget limit are abandoned: `run` returns, the caller
//! is no longer waited on, and the work itself is left to finish in the
//! background.
//!
//! # Design
//!
//! - **Completion races the sampler**: the work thread signals a bounded
//!   channel; the runner blocks in `recv_timeout` so a completion wins the
//!   race against the next sample tick
//! - **Charge on tick only**: usage is accounted when a tick fires, never
//!   at completion, so work that finishes between ticks is free
//! - **Abandon, never interrupt**: an over-budget caller stops being waited
//!   on, but the work thread runs to its natural end

use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::thread;
use std::time::{Duration, Instant};

use crossbeam_channel::{bounded, RecvTimeoutError};
use tracing::{debug, warn};
use uuid::Uuid;

use crate::config::PoolConfig;

/// Opaque identifier for a caller session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CallerId(Uuid);

impl CallerId {
    /// Generate a fresh random identifier.
    #[must_use]
    pub fn random() -> Self {
        Self(Uuid::new_v4())
    }
}

impl std::fmt::Display for CallerId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.0.fmt(f)
    }
}

/// Per-caller execution-time account, shared across that caller's work.
///
/// The budget lives as long as the caller session and accumulates usage
/// from every quota-gated run charged to it. The premium flag never
/// changes after construction.
#[derive(Debug)]
pub struct CallerBudget {
    id: CallerId,
    premium: bool,
    used_ms: AtomicU64,
}

impl CallerBudget {
    /// Create a budget for a new caller session with a generated id.
    #[must_use]
    pub fn new(premium: bool) -> Self {
        Self::with_id(CallerId::random(), premium)
    }

    /// Create a budget for a caller with a known id.
    #[must_use]
    pub fn with_id(id: CallerId, premium: bool) -> Self {
        Self {
            id,
            premium,
            used_ms: AtomicU64::new(0),
        }
    }

    /// Identifier of the owning caller.
    #[must_use]
    pub fn id(&self) -> CallerId {
        self.id
    }

    /// Whether the caller is premium tier and exempt from abandonment.
    #[must_use]
    pub fn is_premium(&self) -> bool {
        self.premium
    }

    /// Cumulative execution time charged to this caller so far.
    #[must_use]
    pub fn time_used(&self) -> Duration {
        Duration::from_millis(self.used_ms.load(Ordering::Relaxed))
    }

    /// Charge a sample slice and return the new cumulative total.
    pub(crate) fn record_usage(&self, slice: Duration) -> Duration {
        let slice_ms = slice.as_millis() as u64;
        let total_ms = self.used_ms.fetch_add(slice_ms, Ordering::Relaxed) + slice_ms;
        Duration::from_millis(total_ms)
    }
}

/// Outcome of a quota-gated run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunOutcome {
    /// The work signaled completion while the caller was still waited on.
    Completed,
    /// The caller's budget ran out; the work was left running unobserved.
    Abandoned,
}

/// Executes work under a caller's execution-time budget.
///
/// The runner itself is stateless apart from its two tuning knobs, so one
/// instance can serve any number of callers concurrently.
#[derive(Debug, Clone)]
pub struct QuotaRunner {
    budget_limit: Duration,
    sample_interval: Duration,
}

impl QuotaRunner {
    /// Create a runner that abandons free-tier callers at `budget_limit`
    /// cumulative usage, sampling every `sample_interval`.
    #[must_use]
    pub fn new(budget_limit: Duration, sample_interval: Duration) -> Self {
        Self {
            budget_limit,
            sample_interval,
        }
    }

    /// Create a runner from pool configuration.
    #[must_use]
    pub fn from_config(config: &PoolConfig) -> Self {
        Self::new(config.budget_limit(), config.sample_interval())
    }

    /// Execute `work` on a dedicated thread, charging wall-clock samples to
    /// `caller` until the work completes or the budget runs out.
    ///
    /// Premium callers are charged but never abandoned. A panic inside
    /// `work` is caught on the work thread and reported as a completion;
    /// it never crosses into the calling worker.
    pub fn run<F>(&self, work: F, caller: &CallerBudget) -> RunOutcome
    where
        F: FnOnce() + Send + 'static,
    {
        let (done_tx, done_rx) = bounded::<()>(1);

        thread::Builder::new()
            .name("tidepool-run".into())
            .spawn(move || {
                if panic::catch_unwind(AssertUnwindSafe(work)).is_err() {
                    warn!("Quota-gated work panicked");
                }
                // Receiver may already have abandoned the wait.
                let _ = done_tx.send(());
            })
            .expect("Failed to spawn work thread");

        let mut last_sample = Instant::now();
        loop {
            match done_rx.recv_timeout(self.sample_interval) {
                Ok(()) => return RunOutcome::Completed,
                Err(RecvTimeoutError::Timeout) => {
                    let now = Instant::now();
                    let total = caller.record_usage(now.duration_since(last_sample));
                    last_sample = now;

                    if !caller.is_premium() && total >= self.budget_limit {
                        debug!(
                            caller = %caller.id(),
                            used_ms = total.as_millis() as u64,
                            "Caller over budget, abandoning wait"
                        );
                        return RunOutcome::Abandoned;
                    }
                }
                Err(RecvTimeoutError::Disconnected) => {
                    warn!(caller = %caller.id(), "Work thread exited without completion signal");
                    return RunOutcome::Completed;
                }
            }
        }
    }
}
