//! Task backend adapters.

pub mod worker_pool;

pub use worker_pool::WorkerPoolTaskBackend;
