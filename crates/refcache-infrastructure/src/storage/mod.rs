//! Storage backend implementations: in-memory, embedded SQLite, and Redis.

pub mod memory;
pub mod redis;
pub mod sqlite;

pub use memory::MemoryStorage;
pub use redis::RedisStorage;
pub use sqlite::SqliteStorage;
