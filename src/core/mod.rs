//! Core concurrency-control components: queue, pool, and quota runner.

pub mod error;
pub mod pool;
pub mod queue;
pub mod runner;

pub use error::{AppResult, PoolError, QueueError};
pub use pool::{ElasticPool, PoolStats, WorkItem};
pub use queue::TaskQueue;
pub use runner::{CallerBudget, CallerId, QuotaRunner, RunOutcome};
