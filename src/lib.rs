//! # Tidepool
//!
//! An in-process adaptive concurrency control core: a bounded handoff
//! queue, an elastically-sized worker pool, and a per-caller
//! execution-time budget.
//!
//! Tidepool accepts opaque units of work, executes them on a pool of OS
//! threads that grows and shrinks with backlog, and enforces a cumulative
//! wall-clock budget per caller that distinguishes unrestricted premium
//! callers from quota-limited free callers. Persistence, routing, and
//! marshaling are left to the surrounding application; this crate is only
//! the scheduling core.
//!
//! ## Core Problem Solved
//!
//! Request-driven services with expensive, unpredictable work need three
//! things from their execution layer:
//!
//! - **Backpressure**: a full system should slow producers down instead of
//!   buffering without bound or dropping work
//! - **Elasticity**: concurrency should track backlog, not sit at a
//!   hand-tuned constant that is wrong at both ends of the load curve
//! - **Fair spend**: callers on a free tier get a cumulative execution-time
//!   budget; once it is spent, the system stops waiting on their work
//!
//! ## Key Features
//!
//! - **Bounded FIFO handoff**: `submit` blocks while the queue is full,
//!   `take` drains remaining items even after close
//! - **Self-scaling workers**: each worker observes backlog on its own
//!   poll cadence and spawns or retires itself; population stays within
//!   `min_workers..=max_workers` via atomic slot accounting
//! - **Quota-gated execution**: budgeted work is sampled at a fixed
//!   cadence; free callers over budget are abandoned without interrupting
//!   the work itself
//! - **Panic isolation**: a panicking item is caught and counted at the
//!   worker boundary, never taking the worker with it
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use tidepool::config::PoolConfig;
//! use tidepool::core::{CallerBudget, ElasticPool, TaskQueue, WorkItem};
//!
//! let config = PoolConfig::default();
//! let queue = TaskQueue::new(config.queue_capacity);
//! let pool = ElasticPool::start(&config, queue.clone())?;
//!
//! // Untagged work runs directly on a worker.
//! queue.submit(WorkItem::new(|| println!("hello")))?;
//!
//! // Budgeted work runs under the caller's cumulative time budget.
//! let caller = Arc::new(CallerBudget::new(false));
//! queue.submit(WorkItem::for_caller(|| expensive(), caller))?;
//!
//! pool.shutdown();
//! ```
//!
//! For complete examples, see:
//! - `tests/elastic_pool_test.rs` - Full integration tests
//! - `README.md` - Comprehensive documentation

#![deny(warnings)]
#![deny(missing_docs)]
#![deny(unsafe_code)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]

/// Core concurrency-control components: queue, pool, and quota runner.
pub mod core;
/// Configuration models for the pool, queue, and quota runner.
pub mod config;
/// Shared utilities.
pub mod util;
