//! Infrastructure layer for `mcp-refcache`.
//!
//! Concrete adapters for the ports `refcache-domain` defines: storage
//! backends, size measurers and tokenizers, preview strategies, the
//! worker-pool task backend, layered configuration, and structured logging
//! setup.

pub mod config;
pub mod logging;
pub mod preview;
pub mod size;
pub mod storage;
pub mod task;

pub use config::RefcacheConfig;
pub use preview::DefaultPreviewGenerator;
pub use size::{ByteMeasurer, TokenMeasurer};
pub use storage::{MemoryStorage, RedisStorage, SqliteStorage};
pub use task::WorkerPoolTaskBackend;
