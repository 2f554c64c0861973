//! Configuration models for the pool, queue, and quota runner.

pub mod pool;

pub use pool::PoolConfig;
