//! Storage backend port.
//!
//! Mirrors `CacheProvider` in the teacher's domain layer: an `async_trait`
//! over `Send + Sync` object-safe operations, keys treated as opaque.

use async_trait::async_trait;

use crate::error::Result;
use crate::value_objects::entry::Entry;

/// A pluggable storage backend for cache entries.
///
/// Six operations exactly per §4.5. Keys are printable strings ≤ 512 octets;
/// the backend never inspects key structure — namespace/canonical-key
/// construction is the reference store's responsibility, not the backend's.
#[async_trait]
pub trait StorageBackend: Send + Sync + std::fmt::Debug {
    /// Return the entry stored at `key`, iff present and unexpired.
    async fn get(&self, key: &str) -> Result<Option<Entry>>;

    /// Replace any existing entry stored at `key`.
    async fn set(&self, key: &str, entry: Entry) -> Result<()>;

    /// Remove the entry at `key`. Returns `true` iff something was removed.
    async fn delete(&self, key: &str) -> Result<bool>;

    /// Equivalent to `get(key).is_some()`, but backends may implement this
    /// more cheaply than a full fetch.
    async fn exists(&self, key: &str) -> Result<bool>;

    /// Remove every entry, or only those whose stored namespace matches
    /// `namespace`. Returns the number of entries removed.
    async fn clear(&self, namespace: Option<&str>) -> Result<u64>;

    /// List keys, filtered by stored namespace if `namespace` is given.
    async fn keys(&self, namespace: Option<&str>) -> Result<Vec<String>>;

    /// A short, stable identifier for this backend, used only in log fields
    /// and `cache_stats()` output (mirrors `CacheProvider::provider_name` in
    /// the teacher; not part of the distilled spec's storage contract).
    fn backend_name(&self) -> &'static str;
}
